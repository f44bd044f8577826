use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, parse_date, require_class, require_class_id, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::matcher::{self, RosterEntry};
use crate::store;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn save_attendance(
    conn: &Connection,
    class_id: i64,
    date: NaiveDate,
    split: &matcher::AttendanceSplit,
) -> Result<usize, HandlerErr> {
    let date = date.format("%Y-%m-%d").to_string();
    let marked_at = db::now_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let statuses = split
        .present
        .iter()
        .map(|id| (*id, "present"))
        .chain(split.absent.iter().map(|id| (*id, "absent")));
    let mut saved = 0usize;
    for (student_id, status) in statuses {
        tx.execute(
            "INSERT INTO attendance(student_id, class_id, date, status, marked_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, class_id, date) DO UPDATE SET
               status = excluded.status,
               marked_at = excluded.marked_at",
            (student_id, class_id, &date, status, &marked_at),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "attendance" }))
        })?;
        saved += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(saved)
}

fn roll_numbers(ids: &[i64], by_id: &HashMap<i64, &str>) -> Vec<String> {
    ids.iter()
        .filter_map(|id| by_id.get(id).map(|r| r.to_string()))
        .collect()
}

fn attendance_quick_entry(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = require_class_id(params)?;
    let text = params
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing text"))?;
    let date = get_optional_str(params, "date")
        .map(|d| parse_date("date", &d))
        .transpose()?;
    require_class(conn, class_id)?;

    let roster: Vec<RosterEntry> = store::class_roster(conn, class_id).map_err(HandlerErr::db)?;
    let split = matcher::quick_entry(text, &roster);
    let by_id: HashMap<i64, &str> = roster.iter().map(|e| (e.id, e.roll_number.as_str())).collect();

    let saved = match date {
        Some(date) => save_attendance(conn, class_id, date, &split)?,
        None => 0,
    };
    if !split.unmatched.is_empty() {
        tracing::debug!(class_id, unmatched = split.unmatched.len(), "quick entry had unknown roll numbers");
    }

    Ok(json!({
        "matched": split.present.len(),
        "present": roll_numbers(&split.present, &by_id),
        "absent": roll_numbers(&split.absent, &by_id),
        "unmatched": split.unmatched,
        "saved": saved,
    }))
}

fn handle_attendance_quick_entry(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match attendance_quick_entry(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.quickEntry" => Some(handle_attendance_quick_entry(state, req)),
        _ => None,
    }
}
