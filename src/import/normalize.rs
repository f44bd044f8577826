use super::columns::ResolvedFields;
use serde::Serialize;

pub const MISSING_NAME_REASON: &str = "Missing required field: Name";

/// Canonical form of one imported student row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRecord {
    pub registration_no: Option<String>,
    pub admission_no: Option<String>,
    /// Never empty.
    pub roll_number: String,
    /// Never empty.
    pub name: String,
    pub gender: Option<String>,
    pub second_language: Option<String>,
    pub email: Option<String>,
    pub group_tag: Option<String>,
    pub class_id: i64,
}

/// Row echo attached to ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowData {
    pub registration_no: Option<String>,
    pub roll_number: Option<String>,
    pub admission_no: Option<String>,
    pub name: Option<String>,
    pub gender: Option<String>,
    pub second_language: Option<String>,
}

impl RosterRecord {
    pub fn row_data(&self) -> RowData {
        RowData {
            registration_no: self.registration_no.clone(),
            roll_number: Some(self.roll_number.clone()),
            admission_no: self.admission_no.clone(),
            name: Some(self.name.clone()),
            gender: self.gender.clone(),
            second_language: self.second_language.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowDisposition {
    /// Nothing identifying on the row; not counted anywhere.
    Skipped,
    Invalid { data: RowData, reason: String },
    Ready(RosterRecord),
}

/// Per-batch context shared by every row.
#[derive(Debug, Clone)]
pub struct NormalizeContext {
    pub class_id: i64,
    pub group_tag: Option<String>,
    /// Stamped into synthetic roll numbers; injected so tests are deterministic.
    pub seed: u64,
}

pub fn synthetic_roll_number(seed: u64, row_index: usize) -> String {
    format!("STUDENT-{}-{}", seed, row_index)
}

/// `row_index` is 1-based over data rows.
pub fn normalize_row(fields: ResolvedFields, row_index: usize, ctx: &NormalizeContext) -> RowDisposition {
    let ResolvedFields {
        registration_no,
        admission_no,
        name,
        gender,
        second_language,
    } = fields;

    let source_id = registration_no.clone().or_else(|| admission_no.clone());

    let Some(name) = name else {
        if source_id.is_none() {
            return RowDisposition::Skipped;
        }
        return RowDisposition::Invalid {
            data: RowData {
                registration_no,
                roll_number: source_id,
                admission_no,
                name: None,
                gender,
                second_language,
            },
            reason: MISSING_NAME_REASON.to_string(),
        };
    };

    let roll_number = source_id.unwrap_or_else(|| synthetic_roll_number(ctx.seed, row_index));
    RowDisposition::Ready(RosterRecord {
        registration_no,
        admission_no,
        roll_number,
        name,
        gender,
        second_language,
        email: None,
        group_tag: ctx.group_tag.clone(),
        class_id: ctx.class_id,
    })
}
