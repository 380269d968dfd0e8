use inksign_core::EditorError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExportError {
    #[error("Page {page} could not be composited: {reason}")]
    Page { page: u32, reason: String },

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    #[error("Nothing to export: every page failed")]
    NoPages,
}

impl ExportError {
    /// Page this error is about, if any
    pub fn page(&self) -> Option<u32> {
        match self {
            ExportError::Page { page, .. } => Some(*page),
            _ => None,
        }
    }
}

impl From<lopdf::Error> for ExportError {
    fn from(e: lopdf::Error) -> Self {
        ExportError::Pdf(e.to_string())
    }
}

impl From<png::DecodingError> for ExportError {
    fn from(e: png::DecodingError) -> Self {
        ExportError::Decode(e.to_string())
    }
}

impl From<ExportError> for EditorError {
    fn from(e: ExportError) -> Self {
        EditorError::ExportFailure(e.to_string())
    }
}
