//! Flattened PDF export for InkSign sessions
//!
//! Reads a [`DocumentSession`] (page rasters plus image-space annotations),
//! composites every page and writes a new PDF with lopdf. The session is
//! never modified.

pub mod compose;
pub mod error;
pub mod fonts;
pub mod pdf;
pub mod raster;

use inksign_core::{DocumentSession, EditorError, ExportConfig, ExportPolicy, Exporter};
use tracing::{info, warn};

pub use compose::{compose_page, ComposedPage, TextRun};
pub use error::ExportError;
pub use pdf::{assemble, Placement};
pub use raster::Bitmap;

/// A page left out of a `SkipFailed` export
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPage {
    pub page: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub skipped: Vec<SkippedPage>,
}

#[derive(Debug, Clone, Default)]
pub struct PdfExporter {
    config: ExportConfig,
}

impl PdfExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export every page in session order
    pub fn export_document(&self, session: &DocumentSession) -> Result<ExportOutcome, ExportError> {
        let page_size = self.config.page_size();
        let store = session.annotations();

        let mut composed = Vec::with_capacity(session.page_count());
        let mut skipped = Vec::new();
        for slot in session.pages() {
            let annotations = store.on_page(slot.number);
            match compose_page(slot, &annotations) {
                Ok(page) => composed.push(page),
                Err(e) => match self.config.policy {
                    ExportPolicy::Strict => {
                        warn!(page = slot.number, error = %e, "Export aborted");
                        return Err(e);
                    }
                    ExportPolicy::SkipFailed => {
                        warn!(page = slot.number, error = %e, "Skipping page");
                        skipped.push(SkippedPage {
                            page: slot.number,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        if composed.is_empty() {
            return Err(ExportError::NoPages);
        }

        let bytes = assemble(&composed, page_size)?;
        info!(
            pages = composed.len(),
            skipped = skipped.len(),
            bytes = bytes.len(),
            "Exported PDF"
        );
        Ok(ExportOutcome {
            bytes,
            page_count: composed.len(),
            skipped,
        })
    }
}

impl Exporter for PdfExporter {
    fn export(&self, session: &DocumentSession) -> Result<Vec<u8>, EditorError> {
        Ok(self.export_document(session)?.bytes)
    }
}
