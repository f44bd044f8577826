use super::normalize::RowData;
use serde::Serialize;

pub const IMPORT_COMPLETED: &str = "Import completed";
pub const DUPLICATE_REASON: &str = "Duplicate roll number";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Created,
    Duplicate,
    Invalid,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRowOutcome {
    pub row_index: usize,
    pub kind: OutcomeKind,
    pub reason: Option<String>,
    pub data: Option<RowData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub data: RowData,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub message: String,
    pub success: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<RowError>>,
}

/// Every row of a batch ends up here exactly once.
#[derive(Debug, Default)]
pub struct ReconciliationLedger {
    outcomes: Vec<ImportRowOutcome>,
}

impl ReconciliationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_created(&mut self, row_index: usize, data: RowData) {
        self.push(row_index, OutcomeKind::Created, None, Some(data));
    }

    pub fn record_duplicate(&mut self, row_index: usize, data: RowData) {
        self.push(
            row_index,
            OutcomeKind::Duplicate,
            Some(DUPLICATE_REASON.to_string()),
            Some(data),
        );
    }

    pub fn record_invalid(&mut self, row_index: usize, data: RowData, reason: impl Into<String>) {
        self.push(row_index, OutcomeKind::Invalid, Some(reason.into()), Some(data));
    }

    pub fn record_skipped(&mut self, row_index: usize) {
        self.push(row_index, OutcomeKind::Skipped, None, None);
    }

    fn push(
        &mut self,
        row_index: usize,
        kind: OutcomeKind,
        reason: Option<String>,
        data: Option<RowData>,
    ) {
        self.outcomes.push(ImportRowOutcome {
            row_index,
            kind,
            reason,
            data,
        });
    }

    pub fn outcomes(&self) -> &[ImportRowOutcome] {
        &self.outcomes
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.iter().filter(|o| o.kind == kind).count()
    }

    pub fn success_count(&self) -> usize {
        self.count(OutcomeKind::Created)
    }

    pub fn failed_count(&self) -> usize {
        self.count(OutcomeKind::Duplicate) + self.count(OutcomeKind::Invalid)
    }

    pub fn finalize(self) -> ImportSummary {
        let success = self.success_count();
        let failed = self.failed_count();
        let errors = self
            .outcomes
            .into_iter()
            .filter(|o| matches!(o.kind, OutcomeKind::Duplicate | OutcomeKind::Invalid))
            .filter_map(|o| {
                Some(RowError {
                    row: o.row_index,
                    data: o.data?,
                    error: o.reason.unwrap_or_default(),
                })
            })
            .collect::<Vec<_>>();
        ImportSummary {
            message: IMPORT_COMPLETED.to_string(),
            success,
            failed,
            errors: (!errors.is_empty()).then_some(errors),
        }
    }
}
