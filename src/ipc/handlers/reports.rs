use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_optional_str, parse_date, require_class, require_class_id, require_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;

/// Inclusive date window. Either end may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DateRange {
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
}

impl DateRange {
    fn bounds(&self) -> (Option<String>, Option<String>) {
        let fmt = |d: NaiveDate| d.format("%Y-%m-%d").to_string();
        (self.start.map(fmt), self.end.map(fmt))
    }
}

fn parse_range(params: &serde_json::Value) -> Result<DateRange, HandlerErr> {
    let start = get_optional_str(params, "startDate")
        .map(|d| parse_date("startDate", &d))
        .transpose()?;
    let end = get_optional_str(params, "endDate")
        .map(|d| parse_date("endDate", &d))
        .transpose()?;
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            return Err(HandlerErr::bad_params("endDate is before startDate"));
        }
    }
    Ok(DateRange { start, end })
}

/// Present share of recorded days, rounded to two decimals. No records is 0.
fn attendance_percentage(total_days: i64, present_days: i64) -> f64 {
    if total_days <= 0 {
        return 0.0;
    }
    let pct = present_days as f64 / total_days as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudentAttendance {
    id: i64,
    roll_number: String,
    name: String,
    total_days: i64,
    present_days: i64,
    absent_days: i64,
    percentage: f64,
}

// Late counts as attended.
const ATTENDED: &str = "a.status IN ('present', 'late')";

fn class_summary(conn: &Connection, class_id: i64, range: DateRange) -> Result<Vec<StudentAttendance>, HandlerErr> {
    let (start, end) = range.bounds();
    let sql = format!(
        "SELECT s.id, s.roll_number, s.name,
                COUNT(a.id),
                COALESCE(SUM(CASE WHEN {ATTENDED} THEN 1 ELSE 0 END), 0)
         FROM students s
         LEFT JOIN attendance a
           ON a.student_id = s.id
          AND a.class_id = ?1
          AND (?2 IS NULL OR a.date >= ?2)
          AND (?3 IS NULL OR a.date <= ?3)
         WHERE s.class_id = ?1
         GROUP BY s.id, s.roll_number, s.name
         ORDER BY s.roll_number"
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map((class_id, &start, &end), |r| {
            let total_days: i64 = r.get(3)?;
            let present_days: i64 = r.get(4)?;
            Ok(StudentAttendance {
                id: r.get(0)?,
                roll_number: r.get(1)?,
                name: r.get(2)?,
                total_days,
                present_days,
                absent_days: total_days - present_days,
                percentage: attendance_percentage(total_days, present_days),
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;
    Ok(rows)
}

fn reports_class_summary(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = require_class_id(params)?;
    let range = parse_range(params)?;
    require_class(conn, class_id)?;

    let students = class_summary(conn, class_id, range)?;
    tracing::debug!(class_id, students = students.len(), "attendance summary built");
    Ok(json!({
        "classId": class_id,
        "totalStudents": students.len(),
        "students": students,
    }))
}

fn reports_student_percentage(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| HandlerErr::bad_params("missing studentId"))?;
    let class_id = crate::ipc::helpers::parse_class_id(params.get("classId"))
        .map_err(|raw| HandlerErr::bad_params("classId must be an integer").with_details(json!({ "classId": raw })))?;
    let range = parse_range(params)?;

    let known = conn
        .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| r.get::<_, i64>(0))
        .optional()
        .map_err(HandlerErr::db)?;
    if known.is_none() {
        return Err(HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id })));
    }

    let (start, end) = range.bounds();
    let (total_days, present_days): (i64, i64) = conn
        .query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN {ATTENDED} THEN 1 ELSE 0 END), 0)
                 FROM attendance a
                 WHERE a.student_id = ?1
                   AND (?2 IS NULL OR a.class_id = ?2)
                   AND (?3 IS NULL OR a.date >= ?3)
                   AND (?4 IS NULL OR a.date <= ?4)"
            ),
            (student_id, class_id, &start, &end),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(HandlerErr::db)?;

    Ok(json!({
        "studentId": student_id,
        "totalDays": total_days,
        "presentDays": present_days,
        "absentDays": total_days - present_days,
        "percentage": attendance_percentage(total_days, present_days),
    }))
}

fn handle_reports_class_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match reports_class_summary(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_reports_student_percentage(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    match reports_student_percentage(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classSummary" => Some(handle_reports_class_summary(state, req)),
        "reports.studentPercentage" => Some(handle_reports_student_percentage(state, req)),
        _ => None,
    }
}
