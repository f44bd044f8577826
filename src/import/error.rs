use thiserror::Error;

/// Batch-level import failures. Row-scoped problems never show up here; they
/// are recorded in the ledger instead.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("No file uploaded")]
    MissingFile,
    #[error("Class ID is required")]
    MissingClassId,
    #[error("classId must be an integer: {0}")]
    InvalidClassId(String),
    #[error("invalid contentBase64: {0}")]
    InvalidContent(#[from] base64::DecodeError),
    #[error("class not found: {0}")]
    ClassNotFound(i64),
    #[error("upload of {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge { size: u64, limit: u64 },
    #[error("Invalid file format. Only CSV and Excel files are supported")]
    UnsupportedFormat { file_name: String },
    #[error("failed to stage upload: {0}")]
    Upload(#[source] std::io::Error),
    #[error("failed to read delimited text: {0}")]
    Delimited(#[from] csv::Error),
    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl ImportError {
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::MissingFile
            | ImportError::MissingClassId
            | ImportError::InvalidClassId(_)
            | ImportError::InvalidContent(_) => "bad_params",
            ImportError::ClassNotFound(_) => "not_found",
            ImportError::UploadTooLarge { .. } => "upload_too_large",
            ImportError::UnsupportedFormat { .. } => "unsupported_format",
            ImportError::Upload(_)
            | ImportError::Delimited(_)
            | ImportError::Workbook(_)
            | ImportError::Store(_) => "import_failed",
        }
    }

    /// HTTP-equivalent status for the failure.
    pub fn status(&self) -> u16 {
        match self {
            ImportError::MissingFile
            | ImportError::MissingClassId
            | ImportError::InvalidClassId(_)
            | ImportError::InvalidContent(_)
            | ImportError::UnsupportedFormat { .. } => 400,
            ImportError::ClassNotFound(_) => 404,
            ImportError::UploadTooLarge { .. } => 413,
            ImportError::Upload(_)
            | ImportError::Delimited(_)
            | ImportError::Workbook(_)
            | ImportError::Store(_) => 500,
        }
    }
}
