use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{get_optional_str, require_class, require_class_id, require_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::matcher::{self, ExtractedPair, ExtractionReconciliation};
use crate::store;
use rusqlite::Connection;
use serde_json::{json, Value};

/// Highest mark a mid-term sheet can carry.
pub const MAX_EXAM_MARK: f64 = 28.0;

const SEMESTERS: [&str; 2] = ["semester1", "semester2"];
const EXAM_TYPES: [&str; 2] = ["mid1", "mid2"];

struct ExamKey {
    semester: String,
    exam_type: String,
    academic_year: String,
}

#[derive(Debug, PartialEq)]
struct Rejected {
    index: usize,
    roll_number: Value,
    marks: Value,
    reason: &'static str,
}

fn mark_value(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Splits raw extraction output into usable pairs and rejects.
fn screen_pairs(raw: &[Value]) -> (Vec<ExtractedPair>, Vec<Rejected>) {
    let mut pairs = Vec::new();
    let mut rejected = Vec::new();
    for (index, item) in raw.iter().enumerate() {
        let roll = item.get("rollNumber").cloned().unwrap_or(Value::Null);
        let marks = item.get("marks").cloned().unwrap_or(Value::Null);
        let identifier = roll.as_str().map(str::trim).unwrap_or("");
        let reason = if identifier.is_empty() {
            Some("missing roll number")
        } else {
            match mark_value(item.get("marks")) {
                None => Some("marks must be a number"),
                Some(v) if !v.is_finite() => Some("marks must be a number"),
                Some(v) if !(0.0..=MAX_EXAM_MARK).contains(&v) => Some("marks out of range"),
                Some(v) => {
                    pairs.push(ExtractedPair {
                        identifier: identifier.to_string(),
                        value: v,
                    });
                    None
                }
            }
        };
        if let Some(reason) = reason {
            rejected.push(Rejected {
                index,
                roll_number: roll,
                marks,
                reason,
            });
        }
    }
    (pairs, rejected)
}

fn unmatched_warning(unmatched: &[String]) -> Option<String> {
    if unmatched.is_empty() {
        return None;
    }
    Some(format!(
        "{} roll number(s) from the image were not found in this class: {}",
        unmatched.len(),
        unmatched.join(", ")
    ))
}

fn exam_key(params: &Value) -> Result<Option<ExamKey>, HandlerErr> {
    let semester = get_optional_str(params, "semester");
    let exam_type = get_optional_str(params, "examType");
    let academic_year = get_optional_str(params, "academicYear");

    if let Some(s) = semester.as_deref() {
        if !SEMESTERS.contains(&s) {
            return Err(HandlerErr::bad_params("invalid semester").with_details(json!({ "semester": s })));
        }
    }
    if let Some(t) = exam_type.as_deref() {
        if !EXAM_TYPES.contains(&t) {
            return Err(HandlerErr::bad_params("invalid examType").with_details(json!({ "examType": t })));
        }
    }

    match (semester, exam_type, academic_year) {
        (Some(semester), Some(exam_type), Some(academic_year)) => Ok(Some(ExamKey {
            semester,
            exam_type,
            academic_year,
        })),
        _ => Ok(None),
    }
}

fn save_marks(
    conn: &Connection,
    class_id: i64,
    key: &ExamKey,
    reconciled: &ExtractionReconciliation,
) -> Result<usize, HandlerErr> {
    let updated_at = db::now_rfc3339();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for update in &reconciled.updates {
        tx.execute(
            "INSERT INTO exam_marks(student_id, class_id, semester, exam_type, academic_year, marks, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, class_id, semester, exam_type, academic_year) DO UPDATE SET
               marks = excluded.marks,
               updated_at = excluded.updated_at",
            (
                update.student_id,
                class_id,
                &key.semester,
                &key.exam_type,
                &key.academic_year,
                update.value,
                &updated_at,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "exam_marks" }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(reconciled.updates.len())
}

fn marks_apply_extracted(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = require_class_id(params)?;
    let raw = params
        .get("pairs")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("missing pairs"))?;
    let key = exam_key(params)?;
    require_class(conn, class_id)?;

    let roster = store::class_roster(conn, class_id).map_err(HandlerErr::db)?;
    let (pairs, rejected) = screen_pairs(raw);
    let reconciled = matcher::reconcile_extracted(&pairs, &roster);

    let saved = match &key {
        Some(key) => save_marks(conn, class_id, key, &reconciled)?,
        None => 0,
    };
    tracing::info!(
        class_id,
        matched = reconciled.updates.len(),
        unmatched = reconciled.unmatched.len(),
        rejected = rejected.len(),
        saved,
        "extracted marks reconciled"
    );

    let updates: Vec<Value> = reconciled
        .updates
        .iter()
        .map(|u| json!({ "studentId": u.student_id, "rollNumber": u.roll_number, "marks": u.value }))
        .collect();
    let rejected: Vec<Value> = rejected
        .into_iter()
        .map(|r| json!({ "index": r.index, "rollNumber": r.roll_number, "marks": r.marks, "reason": r.reason }))
        .collect();

    let mut result = json!({
        "matched": updates.len(),
        "updates": updates,
        "unmatched": reconciled.unmatched,
        "untouched": reconciled.untouched.len(),
        "rejected": rejected,
        "saved": saved,
    });
    if let Some(warning) = unmatched_warning(&reconciled.unmatched) {
        result["warning"] = json!(warning);
    }
    Ok(result)
}

fn handle_marks_apply_extracted(state: &mut AppState, req: &Request) -> Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match marks_apply_extracted(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<Value> {
    match req.method.as_str() {
        "marks.applyExtracted" => Some(handle_marks_apply_extracted(state, req)),
        _ => None,
    }
}
