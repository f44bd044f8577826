use crate::db;
use crate::import::RosterRecord;
use crate::matcher::{normalize_identifier, RosterEntry};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(i64),
    /// Another record already holds the roll number.
    Conflict,
}

/// What the import pipeline needs from persistence. `create_if_absent` must be
/// atomic: a losing concurrent writer sees `Conflict`, never an overwrite.
pub trait RosterStore {
    fn exists_by_identifier(&self, roll_number: &str) -> anyhow::Result<bool>;
    fn create_if_absent(&mut self, record: &RosterRecord) -> anyhow::Result<CreateOutcome>;
}

pub struct SqliteRosterStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteRosterStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl RosterStore for SqliteRosterStore<'_> {
    fn exists_by_identifier(&self, roll_number: &str) -> anyhow::Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM students WHERE roll_key = ?",
                [normalize_identifier(roll_number)],
                |r| r.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn create_if_absent(&mut self, record: &RosterRecord) -> anyhow::Result<CreateOutcome> {
        let inserted = self.conn.execute(
            "INSERT INTO students(class_id, registration_no, admission_no, roll_number, roll_key, name, email, gender, second_language, group_tag, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(roll_key) DO NOTHING",
            (
                record.class_id,
                &record.registration_no,
                &record.admission_no,
                &record.roll_number,
                normalize_identifier(&record.roll_number),
                &record.name,
                &record.email,
                &record.gender,
                &record.second_language,
                &record.group_tag,
                db::now_rfc3339(),
            ),
        )?;
        if inserted == 0 {
            return Ok(CreateOutcome::Conflict);
        }
        Ok(CreateOutcome::Created(self.conn.last_insert_rowid()))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: i64,
    pub name: String,
    pub subject: Option<String>,
    pub student_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: i64,
    pub class_id: i64,
    pub roll_number: String,
    pub registration_no: Option<String>,
    pub admission_no: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub second_language: Option<String>,
    pub group: Option<String>,
}

pub fn class_exists(conn: &Connection, class_id: i64) -> anyhow::Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn create_class(conn: &Connection, name: &str, subject: Option<&str>) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO classes(name, subject, created_at) VALUES(?, ?, ?)",
        (name, subject, db::now_rfc3339()),
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.subject, (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
         FROM classes c
         ORDER BY c.id",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                subject: r.get(2)?,
                student_count: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_students(conn: &Connection, class_id: i64) -> anyhow::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, roll_number, registration_no, admission_no, name, email, gender, second_language, group_tag
         FROM students
         WHERE class_id = ?
         ORDER BY roll_number",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                class_id: r.get(1)?,
                roll_number: r.get(2)?,
                registration_no: r.get(3)?,
                admission_no: r.get(4)?,
                name: r.get(5)?,
                email: r.get(6)?,
                gender: r.get(7)?,
                second_language: r.get(8)?,
                group: r.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Roster in roll-number order, reduced to what identifier matching needs.
pub fn class_roster(conn: &Connection, class_id: i64) -> anyhow::Result<Vec<RosterEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, roll_number FROM students WHERE class_id = ? ORDER BY roll_number",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(RosterEntry {
                id: r.get(0)?,
                roll_number: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
