use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("unknown dataset '{id}' (known datasets: {known})")]
    #[diagnostic(help("run `kira-rd list` to see every dataset in the catalog"))]
    UnknownDataset { id: String, known: String },

    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("download produced an empty file: {0}")]
    EmptyDownload(PathBuf),

    #[error("download too small: {actual} bytes < expected minimum {min} bytes")]
    DownloadTooSmall { actual: u64, min: u64 },

    #[error("insufficient disk space: {required} bytes required, {available} bytes available")]
    InsufficientSpace { required: u64, available: u64 },

    #[error("archive extraction failed: {0}")]
    Archive(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl KiraError {
    pub fn is_transient(&self) -> bool {
        match self {
            KiraError::Http(_) | KiraError::EmptyDownload(_) | KiraError::DownloadTooSmall { .. } => {
                true
            }
            KiraError::HttpStatus { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}
