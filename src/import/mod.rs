//! Roster import: uploaded tabular file in, per-row outcome ledger out.
//!
//! bytes -> [`tabular`] rows -> [`columns`] resolved fields ->
//! [`normalize`] records -> store -> [`ledger`] summary.

mod columns;
mod error;
mod ledger;
mod normalize;
mod orchestrator;
mod tabular;
mod upload;

pub use error::ImportError;
pub use ledger::ImportSummary;
pub use normalize::RosterRecord;
pub use orchestrator::{ImportOrchestrator, ImportRequest};
pub use upload::{StagedUpload, UPLOADS_DIR};
