use super::columns::{ColumnAliasTable, COLUMN_ALIASES};
use super::error::ImportError;
use super::ledger::{ImportSummary, OutcomeKind, ReconciliationLedger};
use super::normalize::{normalize_row, NormalizeContext, RosterRecord, RowDisposition};
use super::tabular::{RowMap, RowSource, SourceFormat};
use super::upload::StagedUpload;
use crate::store::{CreateOutcome, RosterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPhase {
    Idle,
    Parsing,
    RowProcessing,
    Finalizing,
    Done,
    /// Unsupported format; no row was looked at.
    Aborted,
    /// Something escaped the row loop. Rows already persisted stay persisted.
    Failed,
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub class_id: i64,
    pub group: Option<String>,
}

/// Runs one import batch. Rows are handled strictly in order: a row's create
/// has committed before the next row's existence check, which is what makes
/// duplicates inside one file detectable.
pub struct ImportOrchestrator<'s, S: RosterStore + ?Sized> {
    store: &'s mut S,
    aliases: ColumnAliasTable,
    seed: u64,
    phase: ImportPhase,
}

impl<'s, S: RosterStore + ?Sized> ImportOrchestrator<'s, S> {
    pub fn new(store: &'s mut S, seed: u64) -> Self {
        Self {
            store,
            aliases: COLUMN_ALIASES,
            seed,
            phase: ImportPhase::Idle,
        }
    }

    pub fn phase(&self) -> ImportPhase {
        self.phase
    }

    /// Consumes the upload; it is released before this returns, whatever the outcome.
    pub fn run(
        &mut self,
        upload: StagedUpload,
        request: &ImportRequest,
    ) -> Result<ImportSummary, ImportError> {
        tracing::debug!(
            class_id = request.class_id,
            file = upload.original_name(),
            bytes = upload.size(),
            "import started"
        );
        let result = self.process(&upload, request);
        upload.release();
        match &result {
            Ok(summary) => tracing::info!(
                class_id = request.class_id,
                success = summary.success,
                failed = summary.failed,
                "import completed"
            ),
            Err(e) => tracing::warn!(
                class_id = request.class_id,
                phase = ?self.phase(),
                error = %e,
                "import aborted"
            ),
        }
        result
    }

    fn enter(&mut self, next: ImportPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "import phase");
        self.phase = next;
    }

    fn process(
        &mut self,
        upload: &StagedUpload,
        request: &ImportRequest,
    ) -> Result<ImportSummary, ImportError> {
        self.enter(ImportPhase::Parsing);
        let opened = SourceFormat::from_file_name(upload.original_name())
            .and_then(|format| RowSource::open(upload.path(), format));
        let rows = match opened {
            Ok(rows) => rows,
            Err(e) => {
                let terminal = match &e {
                    ImportError::UnsupportedFormat { file_name } => {
                        tracing::debug!(%file_name, "unsupported upload format");
                        ImportPhase::Aborted
                    }
                    _ => ImportPhase::Failed,
                };
                self.enter(terminal);
                return Err(e);
            }
        };

        self.enter(ImportPhase::RowProcessing);
        let ctx = NormalizeContext {
            class_id: request.class_id,
            group_tag: request.group.clone().filter(|g| !g.trim().is_empty()),
            seed: self.seed,
        };
        let mut ledger = ReconciliationLedger::new();
        for (i, row) in rows.enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    self.enter(ImportPhase::Failed);
                    return Err(e);
                }
            };
            self.process_row(&mut ledger, i + 1, &row, &ctx);
        }

        self.enter(ImportPhase::Finalizing);
        let rows = ledger.outcomes().len();
        let skipped = ledger.count(OutcomeKind::Skipped);
        let summary = ledger.finalize();
        tracing::debug!(rows, skipped, "import ledger finalized");
        self.enter(ImportPhase::Done);
        Ok(summary)
    }

    fn process_row(
        &mut self,
        ledger: &mut ReconciliationLedger,
        row_index: usize,
        row: &RowMap,
        ctx: &NormalizeContext,
    ) {
        match normalize_row(self.aliases.resolve(row), row_index, ctx) {
            RowDisposition::Skipped => ledger.record_skipped(row_index),
            RowDisposition::Invalid { data, reason } => {
                tracing::debug!(row = row_index, %reason, "row invalid");
                ledger.record_invalid(row_index, data, reason);
            }
            RowDisposition::Ready(record) => self.persist(ledger, row_index, record),
        }
    }

    fn persist(&mut self, ledger: &mut ReconciliationLedger, row_index: usize, record: RosterRecord) {
        let data = record.row_data();
        match self.store.exists_by_identifier(&record.roll_number) {
            Ok(true) => {
                tracing::debug!(row = row_index, roll_number = %record.roll_number, "duplicate roll number");
                ledger.record_duplicate(row_index, data);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                ledger.record_invalid(row_index, data, e.to_string());
                return;
            }
        }
        match self.store.create_if_absent(&record) {
            Ok(CreateOutcome::Created(student_id)) => {
                tracing::debug!(row = row_index, student_id, "student created");
                ledger.record_created(row_index, data);
            }
            // Lost a race against another writer between the check and the insert.
            Ok(CreateOutcome::Conflict) => ledger.record_duplicate(row_index, data),
            Err(e) => {
                tracing::debug!(row = row_index, error = %e, "create failed");
                ledger.record_invalid(row_index, data, e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::normalize_identifier;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Default)]
    struct MemoryRosterStore {
        records: Vec<RosterRecord>,
        /// exists() says no but the insert collides.
        racing: HashSet<String>,
        failing: HashSet<String>,
    }

    impl RosterStore for MemoryRosterStore {
        fn exists_by_identifier(&self, roll_number: &str) -> anyhow::Result<bool> {
            let key = normalize_identifier(roll_number);
            Ok(self
                .records
                .iter()
                .any(|r| normalize_identifier(&r.roll_number) == key))
        }

        fn create_if_absent(&mut self, record: &RosterRecord) -> anyhow::Result<CreateOutcome> {
            let key = normalize_identifier(&record.roll_number);
            if self.failing.contains(&key) {
                anyhow::bail!("disk I/O error");
            }
            if self.racing.contains(&key) || self.exists_by_identifier(&key)? {
                return Ok(CreateOutcome::Conflict);
            }
            self.records.push(record.clone());
            Ok(CreateOutcome::Created(self.records.len() as i64))
        }
    }

    fn temp_dir(prefix: &str) -> PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    fn request() -> ImportRequest {
        ImportRequest {
            class_id: 1,
            group: Some("A".into()),
        }
    }

    fn run_csv(
        store: &mut MemoryRosterStore,
        dir: &std::path::Path,
        text: &str,
    ) -> (Result<ImportSummary, ImportError>, ImportPhase, PathBuf) {
        let upload = StagedUpload::stage_bytes(dir, "roster.csv", text.as_bytes(), 1 << 20).expect("stage");
        let staged = upload.path().to_path_buf();
        let mut orch = ImportOrchestrator::new(store, 42);
        let res = orch.run(upload, &request());
        (res, orch.phase(), staged)
    }

    #[test]
    fn blank_name_row_fails_and_others_are_created() {
        let dir = temp_dir("rosterd-orch-scenario-a");
        let mut store = MemoryRosterStore::default();
        let (res, phase, staged) = run_csv(
            &mut store,
            &dir,
            "Regd.No.,Name of the Student\nR1,Asha\nR2,\nR3,Ravi\n",
        );
        let summary = res.expect("summary");
        assert_eq!(phase, ImportPhase::Done);
        assert_eq!((summary.success, summary.failed), (2, 1));
        let errors = summary.errors.expect("errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].row, 2);
        assert_eq!(errors[0].error, "Missing required field: Name");
        assert!(!staged.exists());
        assert_eq!(store.records[1].group_tag.as_deref(), Some("A"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn second_row_with_same_roll_number_is_duplicate() {
        let dir = temp_dir("rosterd-orch-scenario-b");
        let mut store = MemoryRosterStore::default();
        let (res, _, _) = run_csv(&mut store, &dir, "Regd.No.,Name\nR1,Asha\nr1 ,Ravi\n");
        let summary = res.expect("summary");
        assert_eq!((summary.success, summary.failed), (1, 1));
        let errors = summary.errors.expect("errors");
        assert_eq!(errors[0].row, 2);
        assert_eq!(errors[0].error, "Duplicate roll number");
        assert_eq!(store.records.len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn rerun_turns_every_success_into_a_duplicate() {
        let dir = temp_dir("rosterd-orch-rerun");
        let mut store = MemoryRosterStore::default();
        let text = "Admn.No.,Name\nA1,Asha\nA2,Ravi\n";
        let (first, _, _) = run_csv(&mut store, &dir, text);
        assert_eq!(first.expect("first").success, 2);
        let (second, _, _) = run_csv(&mut store, &dir, text);
        let second = second.expect("second");
        assert_eq!((second.success, second.failed), (0, 2));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn skipped_rows_are_invisible_and_synthetic_ids_use_the_seed() {
        let dir = temp_dir("rosterd-orch-skip");
        let mut store = MemoryRosterStore::default();
        let (res, _, _) = run_csv(&mut store, &dir, "Name,G\n,M\nAsha,F\n");
        let summary = res.expect("summary");
        assert_eq!((summary.success, summary.failed), (1, 0));
        assert!(summary.errors.is_none());
        assert_eq!(store.records[0].roll_number, "STUDENT-42-2");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn lost_race_is_duplicate_and_store_failure_is_invalid() {
        let dir = temp_dir("rosterd-orch-store");
        let mut store = MemoryRosterStore::default();
        store.racing.insert("R1".into());
        store.failing.insert("R2".into());
        let (res, phase, _) = run_csv(&mut store, &dir, "Regd.No.,Name\nR1,Asha\nR2,Ravi\nR3,Mina\n");
        let summary = res.expect("summary");
        assert_eq!(phase, ImportPhase::Done);
        assert_eq!((summary.success, summary.failed), (1, 2));
        let errors = summary.errors.expect("errors");
        assert_eq!(errors[0].error, "Duplicate roll number");
        assert_eq!(errors[1].error, "disk I/O error");
        assert_eq!(errors[1].data.roll_number.as_deref(), Some("R2"));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unsupported_format_aborts_and_releases_upload() {
        let dir = temp_dir("rosterd-orch-format");
        let mut store = MemoryRosterStore::default();
        let upload = StagedUpload::stage_bytes(&dir, "roster.pdf", b"Name\nAsha\n", 1 << 20).expect("stage");
        let staged = upload.path().to_path_buf();
        let mut orch = ImportOrchestrator::new(&mut store, 1);
        let err = orch.run(upload, &request()).expect_err("format error");
        match &err {
            ImportError::UnsupportedFormat { file_name } => assert_eq!(file_name, "roster.pdf"),
            other => panic!("expected unsupported format, got {other:?}"),
        }
        assert_eq!(orch.phase(), ImportPhase::Aborted);
        assert!(!staged.exists());
        assert!(store.records.is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_workbook_fails_and_releases_upload() {
        let dir = temp_dir("rosterd-orch-corrupt");
        let mut store = MemoryRosterStore::default();
        let upload =
            StagedUpload::stage_bytes(&dir, "roster.xlsx", b"definitely not a workbook", 1 << 20).expect("stage");
        let staged = upload.path().to_path_buf();
        let mut orch = ImportOrchestrator::new(&mut store, 1);
        let err = orch.run(upload, &request()).expect_err("workbook error");
        assert_eq!(err.status(), 500);
        assert_eq!(orch.phase(), ImportPhase::Failed);
        assert!(!staged.exists());
        let _ = std::fs::remove_dir_all(dir);
    }
}
