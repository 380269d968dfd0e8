//! Editor facade
//!
//! Joins the document session, the interaction controller, the redraw
//! scheduler and the signature cache behind one owner. The host forwards DOM
//! events here, arms whatever [`ScheduleRequest`] comes back, and replays the
//! display list from [`Editor::render_page`] when a frame fires.
//!
//! `I` is the host's decoded image type (an `HtmlImageElement` in the
//! browser, `()` in tests).

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::annotation::{AnnotationId, AnnotationKind, PendingPlacement, SignatureImage};
use crate::cache::{Fingerprint, SignatureCache};
use crate::config::EditorConfig;
use crate::coords::CoordinateMapper;
use crate::document::DocumentSession;
use crate::error::EditorError;
use crate::geometry::{Point, Rect};
use crate::interaction::{Action, InteractionController, Key, Modifiers, PageView, Tool};
use crate::model::AnnotationPatch;
use crate::render::{render_overlay, OverlayScene, RenderOutput};
use crate::schedule::{RedrawReason, RedrawReasons, RedrawScheduler, ScheduleRequest};

/// Turns a finished session into a downloadable document
pub trait Exporter {
    fn export(&self, session: &DocumentSession) -> Result<Vec<u8>, EditorError>;
}

pub struct Editor<I> {
    config: EditorConfig,
    session: DocumentSession,
    controller: InteractionController,
    scheduler: RedrawScheduler,
    cache: SignatureCache<I>,
    views: BTreeMap<u32, PageView>,
    device_pixel_ratio: f64,
    dirty: RedrawReasons,
}

impl<I> Editor<I> {
    pub fn new(session: DocumentSession, config: EditorConfig) -> Self {
        Self {
            controller: InteractionController::new(config.interaction.clone()),
            scheduler: RedrawScheduler::new(config.render.debounce_ms),
            config,
            session,
            cache: SignatureCache::new(),
            views: BTreeMap::new(),
            device_pixel_ratio: 1.0,
            dirty: RedrawReasons::default(),
        }
    }

    /// Replace the session after a new file load. Everything derived from
    /// the old document is dropped.
    pub fn load(&mut self, session: DocumentSession) {
        info!(id = session.id(), pages = session.page_count(), "document loaded");
        self.session = session;
        self.cache.clear();
        self.views.clear();
        self.controller.set_tool(Tool::Select);
        self.scheduler.reset();
        self.invalidate(RedrawReason::PageChanged);
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    /// Mutable session access. Callers that change annotations should follow
    /// up with [`invalidate`](Self::invalidate).
    pub fn session_mut(&mut self) -> &mut DocumentSession {
        &mut self.session
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn cache(&self) -> &SignatureCache<I> {
        &self.cache
    }

    // ============ Redraw ============

    pub fn invalidate(&mut self, reason: RedrawReason) {
        self.dirty.insert(reason);
    }

    /// Hand accumulated invalidations to the scheduler
    pub fn flush_redraw(&mut self, now: f64) -> ScheduleRequest {
        let dirty = std::mem::take(&mut self.dirty);
        self.scheduler.request_all(dirty, now)
    }

    pub fn on_timer(&mut self) -> ScheduleRequest {
        self.scheduler.on_timer()
    }

    /// Animation frame callback. `Some` means paint now.
    pub fn on_frame(&mut self, now: f64) -> Option<RedrawReasons> {
        self.scheduler.on_frame(now)
    }

    pub fn set_device_pixel_ratio(&mut self, dpr: f64) {
        if dpr.is_finite() && dpr > 0.0 && dpr != self.device_pixel_ratio {
            self.device_pixel_ratio = dpr;
            self.invalidate(RedrawReason::WindowResized);
        }
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    // ============ Viewport ============

    /// Record where the page image element currently sits on screen
    pub fn update_view(
        &mut self,
        page: u32,
        container: Rect,
        reason: RedrawReason,
    ) -> Result<(), EditorError> {
        let slot = self.session.page(page).ok_or(EditorError::UnknownPage(page))?;
        let image = slot.size().unwrap_or_default();
        let view = PageView::new(page, CoordinateMapper::new(container, image));
        if self.views.get(&page) != Some(&view) {
            self.views.insert(page, view);
            self.invalidate(reason);
        }
        Ok(())
    }

    /// Page scrolled out of view or unmounted
    pub fn drop_view(&mut self, page: u32) -> bool {
        self.views.remove(&page).is_some()
    }

    pub fn view(&self, page: u32) -> Option<&PageView> {
        self.views.get(&page)
    }

    // ============ Input ============

    pub fn set_tool(&mut self, tool: Tool) -> Vec<Action> {
        self.controller.set_tool(tool)
    }

    /// Arm a draft and switch to its placement tool
    pub fn begin_placement(&mut self, draft: PendingPlacement) -> Vec<Action> {
        let tool = match draft.kind {
            AnnotationKind::Signature { .. } => Tool::Signature,
            AnnotationKind::Text { .. } => Tool::Text,
            AnnotationKind::FormField { .. } => Tool::FormField,
            AnnotationKind::Shape { .. } => Tool::Shape,
            AnnotationKind::Line { .. } => Tool::Line,
        };
        self.session.annotations_mut().begin_placement(draft);
        self.controller.set_tool(tool)
    }

    pub fn pointer_down(&mut self, page: u32, pt: Point, time_ms: f64, modifiers: Modifiers) -> Vec<Action> {
        let Some(view) = self.views.get(&page).copied() else {
            return Vec::new();
        };
        let actions = self.controller.pointer_down(
            self.session.annotations_mut(),
            &view,
            pt,
            time_ms,
            modifiers,
        );
        let actions = self.handle_placement(actions);
        self.absorb(&actions);
        actions
    }

    pub fn pointer_move(&mut self, page: u32, pt: Point) -> Vec<Action> {
        let Some(view) = self.views.get(&page).copied() else {
            return Vec::new();
        };
        let actions = self
            .controller
            .pointer_move(self.session.annotations_mut(), &view, pt);
        self.absorb(&actions);
        actions
    }

    pub fn pointer_up(&mut self, page: u32, pt: Point) -> Vec<Action> {
        let Some(view) = self.views.get(&page).copied() else {
            self.controller.cancel_gesture();
            return Vec::new();
        };
        let actions = self.controller.pointer_up(self.session.annotations(), &view, pt);
        self.absorb(&actions);
        actions
    }

    pub fn pointer_cancel(&mut self) {
        self.controller.cancel_gesture();
    }

    pub fn key_down(&mut self, key: &str) -> Vec<Action> {
        let actions = self
            .controller
            .key_down(self.session.annotations_mut(), Key::from_dom(key));
        self.absorb(&actions);
        actions
    }

    /// Place the pending draft for placement clicks. Clicks with nothing
    /// armed pass through for the host to handle.
    fn handle_placement(&mut self, actions: Vec<Action>) -> Vec<Action> {
        let mut out = Vec::with_capacity(actions.len());
        for action in actions {
            let Action::PlacementClick { page, point } = action else {
                out.push(action);
                continue;
            };
            if self.session.annotations().pending().is_none() {
                out.push(action);
                continue;
            }
            match self.session.place_pending(page, point) {
                Ok(Some(id)) => {
                    out.push(Action::Placed { id });
                    out.push(Action::SelectionChanged { primary: Some(id) });
                    out.push(Action::RenderNeeded);
                    out.extend(self.controller.set_tool(Tool::Select));
                }
                Ok(None) => out.push(action),
                Err(e) => {
                    warn!(page, error = %e, "placement rejected");
                    out.push(action);
                }
            }
        }
        out
    }

    fn absorb(&mut self, actions: &[Action]) {
        for action in actions {
            match action {
                Action::RenderNeeded | Action::Moved { .. } | Action::Resized { .. } => {
                    self.invalidate(RedrawReason::AnnotationsChanged)
                }
                Action::SelectionChanged { .. } => self.invalidate(RedrawReason::SelectionChanged),
                Action::Deleted { id, .. } => {
                    self.cache.invalidate(*id);
                    self.invalidate(RedrawReason::AnnotationsChanged);
                }
                _ => {}
            }
        }
    }

    // ============ Annotation commands ============

    pub fn update_annotation(&mut self, id: AnnotationId, patch: &AnnotationPatch) -> Result<bool, EditorError> {
        let changed = self.session.annotations_mut().update(id, patch)?;
        if changed {
            self.invalidate(RedrawReason::AnnotationsChanged);
        }
        Ok(changed)
    }

    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        let removed = self.session.annotations_mut().remove(id).is_some();
        if removed {
            self.cache.invalidate(id);
            self.invalidate(RedrawReason::AnnotationsChanged);
        }
        removed
    }

    pub fn bring_to_front(&mut self, id: AnnotationId) -> bool {
        let changed = self.session.annotations_mut().bring_to_front(id);
        if changed {
            self.invalidate(RedrawReason::AnnotationsChanged);
        }
        changed
    }

    pub fn send_to_back(&mut self, id: AnnotationId) -> bool {
        let changed = self.session.annotations_mut().send_to_back(id);
        if changed {
            self.invalidate(RedrawReason::AnnotationsChanged);
        }
        changed
    }

    /// Duplicate by the configured offset and select the copy
    pub fn duplicate(&mut self, id: AnnotationId) -> Option<AnnotationId> {
        let offset = self.config.interaction.duplicate_offset;
        let store = self.session.annotations_mut();
        let copy = store.duplicate(id, offset)?;
        store.select(copy);
        self.invalidate(RedrawReason::AnnotationsChanged);
        Some(copy)
    }

    // ============ Signature decode ============

    /// Start decoding a signature the renderer asked for. Returns the payload
    /// and the fingerprint to hand back with the result.
    pub fn begin_decode(&mut self, id: AnnotationId) -> Option<(Fingerprint, SignatureImage)> {
        let image = match &self.session.annotations().get(id)?.kind {
            AnnotationKind::Signature { image, .. } => image.clone(),
            _ => return None,
        };
        let fingerprint = self.cache.begin_decode(id, &image)?;
        Some((fingerprint, image))
    }

    /// Decode finished. Stale results are dropped.
    pub fn complete_decode(&mut self, id: AnnotationId, fingerprint: Fingerprint, result: Result<I, String>) -> bool {
        if let Err(reason) = &result {
            let err = EditorError::SignatureDecodeFailure {
                id,
                reason: reason.clone(),
            };
            warn!(error = %err, "signature skipped");
        }
        let accepted = self.cache.complete(id, fingerprint, result);
        if accepted {
            self.invalidate(RedrawReason::ImageDecoded);
        }
        accepted
    }

    /// Drop a failed decode so the next frame retries it
    pub fn retry_decode(&mut self, id: AnnotationId) -> bool {
        let dropped = self.cache.invalidate(id);
        if dropped {
            self.invalidate(RedrawReason::ImageDecoded);
        }
        dropped
    }

    // ============ Output ============

    /// Display list for one page. Empty when the page has no view yet.
    pub fn render_page(&self, page: u32) -> RenderOutput {
        let Some(view) = self.views.get(&page) else {
            return RenderOutput::default();
        };
        render_overlay(&OverlayScene {
            store: self.session.annotations(),
            page,
            mapper: &view.mapper,
            cache: &self.cache,
            config: &self.config.render,
            handle_size: self.config.interaction.handle_size,
            device_pixel_ratio: self.device_pixel_ratio,
        })
    }

    /// Export through `exporter`. The session is only read.
    pub fn export<E: Exporter + ?Sized>(&self, exporter: &E) -> Result<Vec<u8>, EditorError> {
        info!(id = self.session.id(), "export started");
        match exporter.export(&self.session) {
            Ok(bytes) => {
                info!(bytes = bytes.len(), "export finished");
                Ok(bytes)
            }
            Err(e) => {
                warn!(error = %e, "export failed");
                Err(e)
            }
        }
    }
}
