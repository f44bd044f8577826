use crate::ipc::error::err;
use crate::ipc::types::AppState;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value};

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db(e: impl std::fmt::Display) -> Self {
        Self::new("db_query_failed", e.to_string())
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn require_db(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Class ids arrive either as JSON integers or as string-encoded integers.
pub fn parse_class_id(raw: Option<&Value>) -> Result<Option<i64>, String> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| n.to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| s.clone()),
        Some(other) => Err(other.to_string()),
    }
}

pub fn require_class_id(params: &Value) -> Result<i64, HandlerErr> {
    match parse_class_id(params.get("classId")) {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(HandlerErr::bad_params("missing classId")),
        Err(raw) => Err(HandlerErr::bad_params("classId must be an integer")
            .with_details(json!({ "classId": raw }))),
    }
}

pub fn require_class(conn: &Connection, class_id: i64) -> Result<(), HandlerErr> {
    match crate::store::class_exists(conn, class_id) {
        Ok(true) => Ok(()),
        Ok(false) => Err(HandlerErr::new("not_found", "class not found")
            .with_details(json!({ "classId": class_id }))),
        Err(e) => Err(HandlerErr::db(e)),
    }
}

/// Calendar date in `YYYY-MM-DD` form; `key` names the param in the error.
pub fn parse_date(key: &str, raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)).with_details(json!({ key: raw }))
    })
}
