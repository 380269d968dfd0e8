use thiserror::Error;

use crate::annotation::AnnotationId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditorError {
    #[error("Page {page} failed to render: {reason}")]
    RasterizationFailure { page: u32, reason: String },

    #[error("Rasterizer unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Signature {id} failed to decode: {reason}")]
    SignatureDecodeFailure { id: AnnotationId, reason: String },

    #[error("Export failed: {0}")]
    ExportFailure(String),

    #[error("Page {0} does not exist")]
    UnknownPage(u32),

    #[error("Page {0} appears more than once")]
    DuplicatePage(u32),

    #[error("Invalid page size {width}x{height}")]
    InvalidPageSize { width: f64, height: f64 },

    #[error("Invalid style: {0}")]
    InvalidStyle(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EditorError {
    fn from(e: serde_json::Error) -> Self {
        EditorError::Serialization(e.to_string())
    }
}
