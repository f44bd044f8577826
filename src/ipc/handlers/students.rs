use crate::import::{ImportError, ImportOrchestrator, ImportRequest, ImportSummary, StagedUpload, UPLOADS_DIR};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{get_optional_str, parse_class_id, require_class, require_class_id, require_db};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, SqliteRosterStore};
use base64::Engine;
use serde_json::json;
use std::path::{Path, PathBuf};

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        Err(e) => return e.response(&req.id),
    };
    let class_id = match require_class_id(&req.params) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = require_class(conn, class_id) {
        return e.response(&req.id);
    }

    match store::list_students(conn, class_id) {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

enum UploadSource {
    Inline(String),
    Path(PathBuf),
}

fn upload_source(params: &serde_json::Value) -> Option<UploadSource> {
    if let Some(b64) = params.get("contentBase64").and_then(|v| v.as_str()) {
        return Some(UploadSource::Inline(b64.to_string()));
    }
    get_optional_str(params, "inPath").map(|p| UploadSource::Path(PathBuf::from(p)))
}

/// Byte length `b64` decodes to, assuming it is well formed.
fn decoded_len(b64: &str) -> u64 {
    let padding = b64.bytes().rev().take_while(|b| *b == b'=').count();
    ((b64.len() - padding) as u64) * 3 / 4
}

/// Refuses oversized payloads before spending memory on decoding them.
fn decode_upload(b64: &str, max_bytes: u64) -> Result<Vec<u8>, ImportError> {
    let b64 = b64.trim();
    let size = decoded_len(b64);
    if size > max_bytes {
        return Err(ImportError::UploadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(b64)?)
}

fn stage_upload(
    uploads: &Path,
    file_name: &str,
    source: &UploadSource,
    max_bytes: u64,
) -> Result<StagedUpload, ImportError> {
    match source {
        UploadSource::Inline(b64) => {
            let bytes = decode_upload(b64, max_bytes)?;
            StagedUpload::stage_bytes(uploads, file_name, &bytes, max_bytes)
        }
        UploadSource::Path(p) => StagedUpload::stage_file(uploads, file_name, p, max_bytes),
    }
}

fn students_import(state: &AppState, params: &serde_json::Value) -> Result<ImportSummary, ImportError> {
    let (Some(conn), Some(workspace)) = (state.db.as_ref(), state.workspace.as_ref()) else {
        return Err(ImportError::Store(anyhow::anyhow!("select a workspace first")));
    };

    let source = upload_source(params).ok_or(ImportError::MissingFile)?;
    let class_id = parse_class_id(params.get("classId"))
        .map_err(ImportError::InvalidClassId)?
        .ok_or(ImportError::MissingClassId)?;

    // The format tag comes from the original name, never from the staged path.
    let file_name = get_optional_str(params, "fileName")
        .or_else(|| match &source {
            UploadSource::Path(p) => p.file_name().map(|n| n.to_string_lossy().to_string()),
            UploadSource::Inline(_) => None,
        })
        .unwrap_or_default();

    let upload = stage_upload(
        &workspace.join(UPLOADS_DIR),
        &file_name,
        &source,
        state.config.max_upload_bytes,
    )?;

    // Dropping `upload` on these early returns removes the staged copy.
    match store::class_exists(conn, class_id) {
        Ok(true) => {}
        Ok(false) => return Err(ImportError::ClassNotFound(class_id)),
        Err(e) => return Err(ImportError::Store(e)),
    }

    let request = ImportRequest {
        class_id,
        group: get_optional_str(params, "group"),
    };
    let seed = chrono::Utc::now().timestamp_millis().unsigned_abs();
    let mut roster = SqliteRosterStore::new(conn);
    ImportOrchestrator::new(&mut roster, seed).run(upload, &request)
}

fn handle_students_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_db(state) {
        return e.response(&req.id);
    }
    match students_import(state, &req.params) {
        Ok(summary) => match serde_json::to_value(&summary) {
            Ok(v) => ok(&req.id, v),
            Err(e) => err(&req.id, "import_failed", e.to_string(), Some(json!({ "status": 500 }))),
        },
        Err(e) => err(
            &req.id,
            e.code(),
            e.to_string(),
            Some(json!({ "status": e.status() })),
        ),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.import" => Some(handle_students_import(state, req)),
        _ => None,
    }
}
