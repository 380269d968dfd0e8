//! Document session: ordered pages plus the annotation store
//!
//! Pages arrive from an external rasterizer. Until a page renders it is a
//! `Loading` placeholder; a failed render leaves an `Unavailable`
//! placeholder and the rest of the document keeps working. Blank pages can
//! be inserted anywhere and get a fresh page number.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::annotation::{AnnotationId, AnnotationKind};
use crate::config::RasterConfig;
use crate::error::EditorError;
use crate::geometry::{Point, Size};
use crate::model::AnnotationStore;

/// Largest side accepted for a synthetic page, in image units
pub const MAX_PAGE_DIMENSION: f64 = 16_384.0;

fn check_page_size(size: Size) -> Result<(), EditorError> {
    if size.is_empty() || size.width > MAX_PAGE_DIMENSION || size.height > MAX_PAGE_DIMENSION {
        return Err(EditorError::InvalidPageSize {
            width: size.width,
            height: size.height,
        });
    }
    Ok(())
}

/// Encoded page raster as produced by the rasterizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum PageBitmap {
    DataUrl(String),
    Png(Vec<u8>),
}

/// Intrinsic raster of one page. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageImage {
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub bitmap: PageBitmap,
}

impl PageImage {
    pub fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PageContent {
    Rendered { image: PageImage },
    /// Synthetic page with no raster
    Blank { size: Size },
    /// Waiting for the rasterizer. Size is known when the host read it from
    /// the document before rendering.
    Loading { size: Option<Size> },
    /// The rasterizer gave up on this page
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSlot {
    pub number: u32,
    pub content: PageContent,
}

impl PageSlot {
    /// Image-space size, when known
    pub fn size(&self) -> Option<Size> {
        match &self.content {
            PageContent::Rendered { image } => Some(image.size()),
            PageContent::Blank { size } => Some(*size),
            PageContent::Loading { size } => *size,
            PageContent::Unavailable { .. } => None,
        }
    }

    pub fn image(&self) -> Option<&PageImage> {
        match &self.content {
            PageContent::Rendered { image } => Some(image),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self.content, PageContent::Blank { .. })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.content, PageContent::Loading { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerMode {
    #[default]
    Interactive,
    /// Rasterizer could not start; the host only offers the original file
    DownloadOnly,
}

// ============ Rasterizer seam ============

/// Output of one successful page render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    pub width: u32,
    pub height: u32,
    pub bitmap: PageBitmap,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("Page {page} failed to render: {reason}")]
    PageFailed { page: u32, reason: String },

    #[error("Page {page} timed out after {timeout_ms} ms")]
    Timeout { page: u32, timeout_ms: u32 },

    #[error("Rasterizer unavailable: {0}")]
    WorkerUnavailable(String),
}

impl From<RasterError> for EditorError {
    fn from(e: RasterError) -> Self {
        match e {
            RasterError::PageFailed { page, reason } => {
                EditorError::RasterizationFailure { page, reason }
            }
            RasterError::Timeout { page, timeout_ms } => EditorError::RasterizationFailure {
                page,
                reason: format!("timed out after {} ms", timeout_ms),
            },
            RasterError::WorkerUnavailable(reason) => EditorError::WorkerUnavailable(reason),
        }
    }
}

/// External page rasterizer (pdf.js in the browser)
pub trait Rasterizer {
    fn render(&mut self, page: u32, scale: f64) -> Result<RenderedPage, RasterError>;
}

/// What a [`load_pages`] run did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub rendered: Vec<u32>,
    pub failed: Vec<u32>,
    /// Set when the rasterizer reported itself unavailable and loading stopped
    pub worker_unavailable: bool,
}

/// Render every `Loading` page in batches of `config.batch_size`.
///
/// A failing page becomes a placeholder and loading continues. A worker
/// failure switches the session to download-only and stops.
pub fn load_pages<R: Rasterizer + ?Sized>(
    session: &mut DocumentSession,
    rasterizer: &mut R,
    config: &RasterConfig,
) -> LoadReport {
    let mut report = LoadReport::default();

    for batch in session.loading_batches(config.batch_size) {
        debug!(?batch, "rendering page batch");
        for page in batch {
            let result = rasterizer.render(page, config.scale);
            match session.apply_render(page, result) {
                Ok(()) => report.rendered.push(page),
                Err(EditorError::WorkerUnavailable(_)) => {
                    report.worker_unavailable = true;
                    return report;
                }
                Err(_) => report.failed.push(page),
            }
        }
    }
    report
}

// ============ Session ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSession {
    id: String,
    pages: Vec<PageSlot>,
    annotations: AnnotationStore,
    mode: ViewerMode,
}

impl DocumentSession {
    /// Session for a freshly loaded file with `page_count` pages still to render
    pub fn new(page_count: u32) -> Self {
        let pages = (1..=page_count)
            .map(|number| PageSlot {
                number,
                content: PageContent::Loading { size: None },
            })
            .collect();
        Self::with_pages(pages)
    }

    /// Session whose pages are already rendered
    pub fn from_images(images: Vec<PageImage>) -> Result<Self, EditorError> {
        let pages: Vec<PageSlot> = images
            .into_iter()
            .map(|image| PageSlot {
                number: image.page,
                content: PageContent::Rendered { image },
            })
            .collect();
        check_pages(&pages)?;
        Ok(Self::with_pages(pages))
    }

    fn with_pages(pages: Vec<PageSlot>) -> Self {
        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            pages,
            annotations: AnnotationStore::new(),
            mode: ViewerMode::Interactive,
        };
        info!(id = %session.id, pages = session.pages.len(), "document session created");
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> ViewerMode {
        self.mode
    }

    pub fn pages(&self) -> &[PageSlot] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page numbers in display order
    pub fn page_order(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.number).collect()
    }

    pub fn page(&self, number: u32) -> Option<&PageSlot> {
        self.pages.iter().find(|p| p.number == number)
    }

    pub fn has_page(&self, number: u32) -> bool {
        self.page(number).is_some()
    }

    pub fn page_size(&self, number: u32) -> Option<Size> {
        self.page(number).and_then(PageSlot::size)
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationStore {
        &mut self.annotations
    }

    /// Add an annotation after checking its page exists
    pub fn add_annotation(
        &mut self,
        page: u32,
        position: Point,
        size: Size,
        kind: AnnotationKind,
    ) -> Result<AnnotationId, EditorError> {
        if !self.has_page(page) {
            return Err(EditorError::UnknownPage(page));
        }
        self.annotations.add(page, position, size, kind)
    }

    /// Commit the pending draft at an image-space point on `page`
    pub fn place_pending(
        &mut self,
        page: u32,
        point: Point,
    ) -> Result<Option<AnnotationId>, EditorError> {
        let Some(slot) = self.page(page) else {
            return Err(EditorError::UnknownPage(page));
        };
        // Unknown size: place without clamping
        let bounds = slot
            .size()
            .unwrap_or(Size::new(f64::INFINITY, f64::INFINITY));
        self.annotations.place_pending(page, point, bounds)
    }

    /// Record the rasterizer's answer for one page
    pub fn apply_render(
        &mut self,
        page: u32,
        result: Result<RenderedPage, RasterError>,
    ) -> Result<(), EditorError> {
        let Some(slot) = self.pages.iter_mut().find(|p| p.number == page) else {
            return Err(EditorError::UnknownPage(page));
        };
        let result = match result {
            Ok(r) if r.width == 0 || r.height == 0 => Err(RasterError::PageFailed {
                page,
                reason: format!("empty raster {}x{}", r.width, r.height),
            }),
            other => other,
        };

        match result {
            Ok(rendered) => {
                slot.content = PageContent::Rendered {
                    image: PageImage {
                        page,
                        width: rendered.width,
                        height: rendered.height,
                        bitmap: rendered.bitmap,
                    },
                };
                debug!(page, width = rendered.width, height = rendered.height, "page rendered");
                Ok(())
            }
            Err(RasterError::WorkerUnavailable(reason)) => {
                self.mark_worker_unavailable(&reason);
                Err(EditorError::WorkerUnavailable(reason))
            }
            Err(e) => {
                warn!(page, error = %e, "page render failed");
                slot.content = PageContent::Unavailable {
                    reason: e.to_string(),
                };
                Err(e.into())
            }
        }
    }

    /// Degrade the viewer to download-only
    pub fn mark_worker_unavailable(&mut self, reason: &str) {
        if self.mode != ViewerMode::DownloadOnly {
            warn!(reason, "rasterizer unavailable, switching to download-only");
        }
        self.mode = ViewerMode::DownloadOnly;
    }

    /// Pages still waiting for the rasterizer, chunked into batches
    pub fn loading_batches(&self, batch_size: usize) -> Vec<Vec<u32>> {
        let loading: Vec<u32> = self
            .pages
            .iter()
            .filter(|p| p.is_loading())
            .map(|p| p.number)
            .collect();
        loading
            .chunks(batch_size.max(1))
            .map(<[u32]>::to_vec)
            .collect()
    }

    fn next_page_number(&self) -> u32 {
        self.pages.iter().map(|p| p.number).max().unwrap_or(0) + 1
    }

    /// Insert a blank page at `index` in display order (clamped to the end).
    /// Returns its page number.
    pub fn insert_blank_page_at(&mut self, index: usize, size: Size) -> Result<u32, EditorError> {
        check_page_size(size)?;
        let number = self.next_page_number();
        let index = index.min(self.pages.len());
        self.pages.insert(
            index,
            PageSlot {
                number,
                content: PageContent::Blank { size },
            },
        );
        debug!(number, index, "blank page inserted");
        Ok(number)
    }

    /// Insert a blank page right after page `after`
    pub fn insert_blank_page_after(&mut self, after: u32, size: Size) -> Result<u32, EditorError> {
        let index = self
            .pages
            .iter()
            .position(|p| p.number == after)
            .ok_or(EditorError::UnknownPage(after))?;
        self.insert_blank_page_at(index + 1, size)
    }

    /// Remove a page and every annotation on it
    pub fn remove_page(&mut self, number: u32) -> bool {
        let Some(index) = self.pages.iter().position(|p| p.number == number) else {
            return false;
        };
        self.pages.remove(index);
        let dropped = self.annotations.remove_page(number);
        debug!(number, dropped, "page removed");
        true
    }

    /// Move a page to `to_index` in display order
    pub fn move_page(&mut self, number: u32, to_index: usize) -> bool {
        let Some(from) = self.pages.iter().position(|p| p.number == number) else {
            return false;
        };
        let slot = self.pages.remove(from);
        let to = to_index.min(self.pages.len());
        self.pages.insert(to, slot);
        true
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let mut session: DocumentSession = serde_json::from_str(json)?;
        check_pages(&session.pages)?;
        // Re-run store validation and id bookkeeping
        let store_json = serde_json::to_string(&session.annotations)?;
        session.annotations = AnnotationStore::from_json(&store_json)?;
        if let Some(orphan) = session
            .annotations
            .iter()
            .find(|a| !session.has_page(a.page))
        {
            return Err(EditorError::UnknownPage(orphan.page));
        }
        Ok(session)
    }
}

/// Page numbers are unique and every known size is drawable
fn check_pages(pages: &[PageSlot]) -> Result<(), EditorError> {
    let mut seen = std::collections::BTreeSet::new();
    for slot in pages {
        if !seen.insert(slot.number) {
            return Err(EditorError::DuplicatePage(slot.number));
        }
        match &slot.content {
            PageContent::Blank { size } => check_page_size(*size)?,
            PageContent::Rendered { image } if image.width == 0 || image.height == 0 => {
                return Err(EditorError::InvalidPageSize {
                    width: image.width as f64,
                    height: image.height as f64,
                });
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{ShapeKind, ShapeStyle};
    use pretty_assertions::assert_eq;

    fn rendered(width: u32, height: u32) -> RenderedPage {
        RenderedPage {
            width,
            height,
            bitmap: PageBitmap::Png(vec![0x89, b'P', b'N', b'G']),
        }
    }

    fn shape() -> AnnotationKind {
        AnnotationKind::Shape {
            shape: ShapeKind::Rectangle,
            style: ShapeStyle::default(),
        }
    }

    /// Fails on pages listed in `fail`, reports the worker dead on `dead`
    struct FakeRasterizer {
        fail: Vec<u32>,
        dead: Option<u32>,
        calls: Vec<u32>,
    }

    impl Rasterizer for FakeRasterizer {
        fn render(&mut self, page: u32, _scale: f64) -> Result<RenderedPage, RasterError> {
            self.calls.push(page);
            if self.dead == Some(page) {
                return Err(RasterError::WorkerUnavailable("worker crashed".into()));
            }
            if self.fail.contains(&page) {
                return Err(RasterError::PageFailed {
                    page,
                    reason: "corrupt stream".into(),
                });
            }
            Ok(rendered(800, 1000))
        }
    }

    #[test]
    fn test_new_session_pages_are_loading() {
        let session = DocumentSession::new(3);
        assert_eq!(session.page_order(), vec![1, 2, 3]);
        assert!(session.pages().iter().all(PageSlot::is_loading));
        assert_eq!(session.mode(), ViewerMode::Interactive);
        assert!(!session.id().is_empty());
    }

    #[test]
    fn test_add_to_unknown_page_rejected() {
        let mut session = DocumentSession::new(2);
        let err = session
            .add_annotation(5, Point::default(), Size::new(10.0, 10.0), shape())
            .unwrap_err();
        assert_eq!(err, EditorError::UnknownPage(5));
        // placeholders are valid targets
        assert!(session
            .add_annotation(2, Point::default(), Size::new(10.0, 10.0), shape())
            .is_ok());
    }

    #[test]
    fn test_blank_page_after_first() {
        let mut session = DocumentSession::new(2);
        let number = session
            .insert_blank_page_after(1, Size::new(800.0, 1000.0))
            .unwrap();
        assert_eq!(number, 3);
        assert_eq!(session.page_order(), vec![1, 3, 2]);
        assert!(session.page(3).unwrap().is_blank());
        assert_eq!(session.page_size(3), Some(Size::new(800.0, 1000.0)));
        assert!(session
            .insert_blank_page_after(9, Size::new(1.0, 1.0))
            .is_err());
    }

    #[test]
    fn test_load_pages_degrades_failed_page() {
        let mut session = DocumentSession::new(4);
        let mut raster = FakeRasterizer {
            fail: vec![2],
            dead: None,
            calls: vec![],
        };
        let report = load_pages(&mut session, &mut raster, &RasterConfig::default());
        assert_eq!(report.rendered, vec![1, 3, 4]);
        assert_eq!(report.failed, vec![2]);
        assert!(!report.worker_unavailable);
        assert!(matches!(
            session.page(2).unwrap().content,
            PageContent::Unavailable { .. }
        ));
        assert_eq!(session.page_size(1), Some(Size::new(800.0, 1000.0)));
        assert_eq!(session.mode(), ViewerMode::Interactive);
    }

    #[test]
    fn test_worker_unavailable_switches_mode_and_stops() {
        let mut session = DocumentSession::new(5);
        let mut raster = FakeRasterizer {
            fail: vec![],
            dead: Some(2),
            calls: vec![],
        };
        let report = load_pages(&mut session, &mut raster, &RasterConfig::default());
        assert!(report.worker_unavailable);
        assert_eq!(report.rendered, vec![1]);
        assert_eq!(raster.calls, vec![1, 2]);
        assert_eq!(session.mode(), ViewerMode::DownloadOnly);
    }

    #[test]
    fn test_loading_batches() {
        let mut session = DocumentSession::new(7);
        session.apply_render(3, Ok(rendered(10, 10))).unwrap();
        assert_eq!(
            session.loading_batches(3),
            vec![vec![1, 2, 4], vec![5, 6, 7]]
        );
        assert_eq!(session.loading_batches(0).len(), 6);
    }

    #[test]
    fn test_timeout_maps_to_rasterization_failure() {
        let mut session = DocumentSession::new(1);
        let err = session
            .apply_render(
                1,
                Err(RasterError::Timeout {
                    page: 1,
                    timeout_ms: 15_000,
                }),
            )
            .unwrap_err();
        assert!(matches!(err, EditorError::RasterizationFailure { page: 1, .. }));
    }

    #[test]
    fn test_remove_page_drops_annotations() {
        let mut session = DocumentSession::new(2);
        session
            .add_annotation(2, Point::default(), Size::new(10.0, 10.0), shape())
            .unwrap();
        assert!(session.remove_page(2));
        assert!(session.annotations().is_empty());
        assert!(!session.remove_page(2));
    }

    #[test]
    fn test_move_page() {
        let mut session = DocumentSession::new(3);
        assert!(session.move_page(3, 0));
        assert_eq!(session.page_order(), vec![3, 1, 2]);
    }

    #[test]
    fn test_blank_page_rejects_undrawable_sizes() {
        let mut session = DocumentSession::new(1);
        for size in [
            Size::new(0.0, 0.0),
            Size::new(f64::NAN, -5.0),
            Size::new(f64::INFINITY, 1e12),
            Size::new(612.0, MAX_PAGE_DIMENSION + 1.0),
        ] {
            let err = session.insert_blank_page_after(1, size).unwrap_err();
            assert!(matches!(err, EditorError::InvalidPageSize { .. }), "{:?}", size);
        }
        assert_eq!(session.page_count(), 1);
        assert_eq!(session.insert_blank_page_at(0, Size::new(612.0, 792.0)), Ok(2));
    }

    #[test]
    fn test_empty_raster_leaves_page_unavailable() {
        let mut session = DocumentSession::new(1);
        let err = session.apply_render(1, Ok(rendered(0, 1000))).unwrap_err();
        assert!(matches!(err, EditorError::RasterizationFailure { page: 1, .. }));
        assert!(matches!(
            session.page(1).unwrap().content,
            PageContent::Unavailable { .. }
        ));
    }

    #[test]
    fn test_from_images_rejects_duplicate_numbers() {
        let image = |page| PageImage {
            page,
            width: 80,
            height: 100,
            bitmap: PageBitmap::Png(vec![1]),
        };
        assert!(DocumentSession::from_images(vec![image(1), image(2)]).is_ok());
        assert_eq!(
            DocumentSession::from_images(vec![image(1), image(1)]).unwrap_err(),
            EditorError::DuplicatePage(1)
        );
    }

    #[test]
    fn test_from_json_rejects_orphans_and_bad_pages() {
        let mut session = DocumentSession::new(2);
        session
            .add_annotation(2, Point::new(1.0, 1.0), Size::new(20.0, 20.0), shape())
            .unwrap();
        let json = session.to_json().unwrap();
        assert!(DocumentSession::from_json(&json).is_ok());

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["pages"].as_array_mut().unwrap().pop();
        assert_eq!(
            DocumentSession::from_json(&value.to_string()).unwrap_err(),
            EditorError::UnknownPage(2)
        );

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["pages"][1]["number"] = serde_json::json!(1);
        assert_eq!(
            DocumentSession::from_json(&value.to_string()).unwrap_err(),
            EditorError::DuplicatePage(1)
        );

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["pages"][0]["content"] =
            serde_json::json!({"state": "blank", "size": {"width": 0.0, "height": 792.0}});
        assert!(matches!(
            DocumentSession::from_json(&value.to_string()).unwrap_err(),
            EditorError::InvalidPageSize { .. }
        ));
    }

    #[test]
    fn test_place_pending_on_rendered_page() {
        use crate::annotation::PendingPlacement;
        let mut session = DocumentSession::new(1);
        session.apply_render(1, Ok(rendered(800, 1000))).unwrap();
        session
            .annotations_mut()
            .begin_placement(PendingPlacement::new(Size::new(100.0, 100.0), shape()).unwrap());
        let id = session
            .place_pending(1, Point::new(790.0, 990.0))
            .unwrap()
            .unwrap();
        let placed = session.annotations().get(id).unwrap();
        assert_eq!(placed.position, Point::new(700.0, 900.0));
    }
}
