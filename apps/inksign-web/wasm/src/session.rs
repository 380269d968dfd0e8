//! Browser session: the editor plus the DOM glue around it
//!
//! The host renders pages with pdf.js, hands the rasters over and attaches
//! one `<img>` and one overlay `<canvas>` per page. From then on pointer,
//! keyboard, scroll and resize events are handled here; the host only hears
//! about edits through the action callback.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use inksign_core::{
    Action, AnnotationId, AnnotationKind, AnnotationPatch, Color, DocumentSession, Editor,
    EditorConfig, EditorError, ExportPolicy, FieldSize, FieldType, LineStyle, Modifiers,
    PageBitmap, PageContent, PendingPlacement, Point, RasterError, RedrawReason, RenderedPage, ShapeKind, ShapeStyle,
    SignatureImage, Size, SurfaceLayout, TextStyle, Tool, ViewerMode,
};
use inksign_export::{ExportOutcome, PdfExporter};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{Event, HtmlCanvasElement, HtmlImageElement, KeyboardEvent, PointerEvent};

use crate::canvas::OverlaySurface;
use crate::viewport::{self, EventListener, FrameLoop, ResizeWatch};

// ============================================================
// Pure helpers (testable without a browser)
// ============================================================

fn parse_config(json: Option<String>) -> Result<EditorConfig, String> {
    match json {
        Some(json) if !json.trim().is_empty() => {
            EditorConfig::from_json(&json).map_err(|e| e.to_string())
        }
        _ => Ok(EditorConfig::default()),
    }
}

fn parse_tool(name: &str) -> Result<Tool, String> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .map_err(|_| format!("Unknown tool: {}", name))
}

fn parse_policy(name: Option<String>, default: ExportPolicy) -> Result<ExportPolicy, String> {
    match name {
        Some(name) => serde_json::from_value(serde_json::Value::String(name.clone()))
            .map_err(|_| format!("Unknown export policy: {}", name)),
        None => Ok(default),
    }
}

fn parse_style<T: Default + for<'de> Deserialize<'de>>(json: Option<String>) -> Result<T, String> {
    match json {
        Some(json) if !json.trim().is_empty() => {
            serde_json::from_str(&json).map_err(|e| format!("Invalid style JSON: {}", e))
        }
        _ => Ok(T::default()),
    }
}

fn signature_draft(data_url: &str, width: f64, height: f64) -> Result<PendingPlacement, String> {
    PendingPlacement::new(
        Size::new(width, height),
        AnnotationKind::Signature {
            image: SignatureImage::DataUrl(data_url.to_string()),
            border: None,
        },
    )
    .map_err(|e| e.to_string())
}

fn text_draft(content: &str, style: TextStyle) -> Result<PendingPlacement, String> {
    // Initial box from the text itself; the user resizes afterwards
    let lines = content.lines().count().max(1) as f64;
    let longest = content.lines().map(|l| l.chars().count()).max().unwrap_or(0).max(4) as f64;
    let size = Size::new(
        longest * style.font_size * 0.6,
        lines * style.font_size * inksign_core::render::LINE_HEIGHT,
    );
    PendingPlacement::new(
        size,
        AnnotationKind::Text {
            content: content.to_string(),
            style,
        },
    )
    .map_err(|e| e.to_string())
}

fn form_field_draft(
    field_type: &str,
    label: &str,
    required: bool,
    size: &str,
) -> Result<PendingPlacement, String> {
    let field_type: FieldType = serde_json::from_value(serde_json::Value::String(field_type.into()))
        .map_err(|_| format!("Unknown field type: {}", field_type))?;
    let size_class: FieldSize = serde_json::from_value(serde_json::Value::String(size.into()))
        .map_err(|_| format!("Unknown field size: {}", size))?;
    Ok(PendingPlacement::form_field(field_type, label, required, size_class))
}

fn shape_draft(kind: &str, width: f64, height: f64, style: ShapeStyle) -> Result<PendingPlacement, String> {
    let shape: ShapeKind = serde_json::from_value(serde_json::Value::String(kind.into()))
        .map_err(|_| format!("Unknown shape: {}", kind))?;
    PendingPlacement::new(Size::new(width, height), AnnotationKind::Shape { shape, style })
        .map_err(|e| e.to_string())
}

fn line_draft(width: f64, style: LineStyle) -> Result<PendingPlacement, String> {
    // Line boxes are as tall as the stroke plus some grab room
    let height = (style.stroke_width * 3.0).max(8.0);
    PendingPlacement::new(Size::new(width, height), AnnotationKind::Line { style })
        .map_err(|e| e.to_string())
}

fn export_session(
    editor: &Editor<HtmlImageElement>,
    policy: ExportPolicy,
) -> Result<ExportOutcome, String> {
    let mut config = editor.config().export.clone();
    config.policy = policy;
    PdfExporter::new(config)
        .export_document(editor.session())
        .map_err(|e| e.to_string())
}

/// Payload of a rejected render promise, when the host sends a structured one
#[derive(Debug, Serialize, Deserialize)]
struct RenderFailure {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Payload of a fulfilled render promise
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderSuccess {
    width: u32,
    height: u32,
    data_url: String,
}

fn render_failure(page: u32, failure: RenderFailure, timeout_ms: u32) -> RasterError {
    let message = failure.message.unwrap_or_else(|| "render failed".to_string());
    match failure.kind.as_deref() {
        Some("timeout") => RasterError::Timeout { page, timeout_ms },
        Some("worker") => RasterError::WorkerUnavailable(message),
        _ => RasterError::PageFailed {
            page,
            reason: message,
        },
    }
}

/// Rejection the session raises itself when a render overruns its budget
fn timeout_failure(page: u32, timeout_ms: u32) -> RenderFailure {
    RenderFailure {
        kind: Some("timeout".to_string()),
        message: Some(format!("page {} did not render within {} ms", page, timeout_ms)),
    }
}

fn page_state_name(content: &PageContent) -> &'static str {
    match content {
        PageContent::Rendered { .. } => "rendered",
        PageContent::Blank { .. } => "blank",
        PageContent::Loading { .. } => "loading",
        PageContent::Unavailable { .. } => "unavailable",
    }
}

/// Only a missing page is the caller's fault; a failed raster is recorded
fn render_failed_result(result: Result<(), EditorError>) -> Result<(), String> {
    match result {
        Err(e @ EditorError::UnknownPage(_)) => Err(e.to_string()),
        _ => Ok(()),
    }
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Report a failure that should not abort the surrounding handler
fn warn_on_err<T, E: Into<JsValue>>(context: &str, result: Result<T, E>) {
    if let Err(e) = result {
        web_sys::console::warn_2(&context.into(), &e.into());
    }
}

/// Race `render` against a timer that rejects with a timeout failure.
/// A zero budget leaves the render unbounded.
fn with_timeout(render: js_sys::Promise, page: u32, timeout_ms: u32) -> Result<js_sys::Promise, JsValue> {
    if timeout_ms == 0 {
        return Ok(render);
    }
    let window = viewport::window()?;
    let reason = to_js(&timeout_failure(page, timeout_ms))?;
    let delay = timeout_ms.min(i32::MAX as u32) as i32;
    let mut armed = Ok(0);
    let timer = js_sys::Promise::new(&mut |_resolve, reject| {
        armed = window.set_timeout_with_callback_and_timeout_and_arguments_1(&reject, delay, &reason);
    });
    armed?;
    Ok(js_sys::Promise::race(&js_sys::Array::of2(&render, &timer)))
}

// ============================================================
// Shared state
// ============================================================

struct PageSurface {
    surface: OverlaySurface,
    _listeners: Vec<EventListener>,
}

struct Inner {
    editor: Editor<HtmlImageElement>,
    surfaces: BTreeMap<u32, PageSurface>,
    frames: Option<FrameLoop>,
    resize: Option<ResizeWatch>,
    window_listeners: Vec<EventListener>,
    action_callback: Option<js_sys::Function>,
}

type Shared = Rc<RefCell<Inner>>;

impl Inner {
    fn new(editor: Editor<HtmlImageElement>) -> Self {
        Self {
            editor,
            surfaces: BTreeMap::new(),
            frames: None,
            resize: None,
            window_listeners: Vec::new(),
            action_callback: None,
        }
    }

    /// Hand pending invalidations to the scheduler and arm what it asks for
    fn schedule(&mut self) {
        let request = self.editor.flush_redraw(viewport::now());
        if let Some(frames) = &self.frames {
            if let Err(e) = frames.arm(request) {
                web_sys::console::warn_2(&"Failed to schedule redraw".into(), &e);
            }
        }
    }

    /// Re-read every attached page's on-screen rect
    fn sync_views(&mut self, reason: RedrawReason) {
        if let Some(window) = web_sys::window() {
            self.editor.set_device_pixel_ratio(window.device_pixel_ratio());
        }
        let rects: Vec<(u32, inksign_core::Rect)> = self
            .surfaces
            .iter()
            .map(|(page, s)| (*page, s.surface.image_rect()))
            .collect();
        for (page, rect) in rects {
            warn_on_err(
                "Failed to update page view",
                self.editor.update_view(page, rect, reason).map_err(js_err),
            );
        }
        self.schedule();
    }

    /// Push the cursor and pointer routing to every overlay. Outside select
    /// mode the overlay lets clicks through to the page image.
    fn apply_input(&self, actions: &[Action]) {
        let cursor = actions.iter().rev().find_map(|a| match a {
            Action::SetCursor { cursor } => Some(*cursor),
            _ => None,
        });
        let captures = self.editor.controller().captures_pointer();
        for (page, s) in &self.surfaces {
            let applied = s.surface.set_pointer_events(captures).and_then(|_| match cursor {
                Some(cursor) => s.surface.set_cursor(cursor.css()),
                None => Ok(()),
            });
            warn_on_err(&format!("Page {} input styles failed", page), applied);
        }
    }

    /// Paint every attached page. Returns signatures that still need decoding.
    fn paint(&mut self, now: f64) -> Vec<AnnotationId> {
        let mut requests = Vec::new();
        if self.editor.on_frame(now).is_none() {
            return requests;
        }
        let dpr = self.editor.device_pixel_ratio();
        for (page, s) in &self.surfaces {
            let Some(view) = self.editor.view(*page) else {
                continue;
            };
            let layout = SurfaceLayout::new(view.mapper.container(), dpr);
            let out = self.editor.render_page(*page);
            let painted = s
                .surface
                .layout(&layout)
                .and_then(|_| s.surface.replay(&out.commands, self.editor.cache()));
            if let Err(e) = painted {
                web_sys::console::warn_2(&format!("Page {} overlay failed", page).into(), &e);
            }
            requests.extend(out.decode_requests);
        }
        requests
    }
}

/// Deliver actions to the host callback. Must run with no borrow held:
/// the callback may call straight back into the session.
fn notify(callback: Option<js_sys::Function>, actions: &[Action]) {
    let Some(callback) = callback else {
        return;
    };
    if actions.is_empty() {
        return;
    }
    match to_js(&actions) {
        Ok(value) => {
            if let Err(e) = callback.call1(&JsValue::NULL, &value) {
                web_sys::console::warn_2(&"Action callback threw".into(), &e);
            }
        }
        Err(e) => web_sys::console::warn_1(&e),
    }
}

fn start_decode(weak: &Weak<RefCell<Inner>>, inner: &mut Inner, id: AnnotationId) {
    let Some((fingerprint, image)) = inner.editor.begin_decode(id) else {
        return;
    };
    let src = match image {
        SignatureImage::DataUrl(url) => url,
        SignatureImage::Png(bytes) => format!("data:image/png;base64,{}", BASE64.encode(bytes)),
    };
    let img = match HtmlImageElement::new() {
        Ok(img) => img,
        Err(_) => {
            inner
                .editor
                .complete_decode(id, fingerprint, Err("could not create image".into()));
            return;
        }
    };

    let on_load = {
        let weak = weak.clone();
        let img = img.clone();
        Closure::once_into_js(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.borrow_mut();
            inner.editor.complete_decode(id, fingerprint, Ok(img));
            inner.schedule();
        })
    };
    let on_error = {
        let weak = weak.clone();
        Closure::once_into_js(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = shared.borrow_mut();
            inner
                .editor
                .complete_decode(id, fingerprint, Err("image failed to load".into()));
            inner.schedule();
        })
    };
    img.set_onload(Some(on_load.unchecked_ref()));
    img.set_onerror(Some(on_error.unchecked_ref()));
    img.set_src(&src);
}

fn on_frame(weak: &Weak<RefCell<Inner>>, now: f64) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let mut inner = shared.borrow_mut();
    let requests = inner.paint(now);
    for id in requests {
        start_decode(weak, &mut inner, id);
    }
    // Decode failures invalidate synchronously
    inner.schedule();
}

fn on_timer(weak: &Weak<RefCell<Inner>>) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let mut inner = shared.borrow_mut();
    let request = inner.editor.on_timer();
    if let Some(frames) = &inner.frames {
        warn_on_err("Failed to schedule redraw", frames.arm(request));
    }
}

fn on_layout_change(weak: &Weak<RefCell<Inner>>, reason: RedrawReason) {
    if let Some(shared) = weak.upgrade() {
        shared.borrow_mut().sync_views(reason);
    }
}

fn on_pointer(weak: &Weak<RefCell<Inner>>, page: u32, kind: &str, event: Event) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let Ok(ev) = event.dyn_into::<PointerEvent>() else {
        return;
    };
    let pt = Point::new(ev.client_x() as f64, ev.client_y() as f64);

    let (actions, callback) = {
        let mut inner = shared.borrow_mut();
        // Positions can go stale between scroll events
        let rect = inner.surfaces.get(&page).map(|s| s.surface.image_rect());
        if let Some(rect) = rect {
            warn_on_err(
                "Failed to update page view",
                inner.editor.update_view(page, rect, RedrawReason::Scrolled).map_err(js_err),
            );
        }
        let actions = match kind {
            "pointerdown" => {
                let modifiers = Modifiers {
                    shift: ev.shift_key(),
                };
                // Placement clicks arrive through the image; only overlay drags capture
                let selecting = inner.editor.controller().captures_pointer();
                let actions = inner.editor.pointer_down(page, pt, ev.time_stamp(), modifiers);
                if selecting && inner.editor.controller().captures_pointer() {
                    if let Some(s) = inner.surfaces.get(&page) {
                        warn_on_err(
                            "Failed to capture pointer",
                            s.surface.canvas().set_pointer_capture(ev.pointer_id()),
                        );
                    }
                }
                actions
            }
            "pointermove" => inner.editor.pointer_move(page, pt),
            "pointerup" => {
                if let Some(s) = inner.surfaces.get(&page) {
                    let canvas = s.surface.canvas();
                    if canvas.has_pointer_capture(ev.pointer_id()) {
                        warn_on_err(
                            "Failed to release pointer",
                            canvas.release_pointer_capture(ev.pointer_id()),
                        );
                    }
                }
                inner.editor.pointer_up(page, pt)
            }
            _ => {
                inner.editor.pointer_cancel();
                Vec::new()
            }
        };
        inner.apply_input(&actions);
        inner.schedule();
        (actions, inner.action_callback.clone())
    };
    notify(callback, &actions);
}

fn on_key(weak: &Weak<RefCell<Inner>>, event: Event) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let Ok(ev) = event.dyn_into::<KeyboardEvent>() else {
        return;
    };
    // Keys typed into form controls belong to them
    let typing = ev
        .target()
        .and_then(|t| t.dyn_into::<web_sys::Element>().ok())
        .map(|el| matches!(el.tag_name().as_str(), "INPUT" | "TEXTAREA" | "SELECT"))
        .unwrap_or(false);
    if typing {
        return;
    }
    let (actions, callback) = {
        let mut inner = shared.borrow_mut();
        let actions = inner.editor.key_down(&ev.key());
        inner.apply_input(&actions);
        inner.schedule();
        (actions, inner.action_callback.clone())
    };
    notify(callback, &actions);
}

// ============================================================
// JS API
// ============================================================

/// One open document with its overlay editor
#[wasm_bindgen]
pub struct AnnotatorSession {
    inner: Shared,
}

#[wasm_bindgen]
impl AnnotatorSession {
    /// Create a session for a document with `page_count` pages to render.
    /// `config_json` may be omitted or hold any subset of the config keys.
    #[wasm_bindgen(constructor)]
    pub fn new(page_count: u32, config_json: Option<String>) -> Result<AnnotatorSession, JsValue> {
        let config = parse_config(config_json).map_err(|e| JsValue::from_str(&e))?;
        Self::with_session(DocumentSession::new(page_count), config)
    }

    /// Restore a session saved with `toJson`
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str, config_json: Option<String>) -> Result<AnnotatorSession, JsValue> {
        let config = parse_config(config_json).map_err(|e| JsValue::from_str(&e))?;
        let session = DocumentSession::from_json(json).map_err(js_err)?;
        Self::with_session(session, config)
    }

    /// Callback signature: (actions: Action[]) => void
    #[wasm_bindgen(js_name = setActionCallback)]
    pub fn set_action_callback(&self, callback: js_sys::Function) {
        self.inner.borrow_mut().action_callback = Some(callback);
    }

    #[wasm_bindgen(getter)]
    pub fn id(&self) -> String {
        self.inner.borrow().editor.session().id().to_string()
    }

    #[wasm_bindgen(getter, js_name = pageCount)]
    pub fn page_count(&self) -> u32 {
        self.inner.borrow().editor.session().page_count() as u32
    }

    /// Page numbers in display order
    #[wasm_bindgen(js_name = pageOrder)]
    pub fn page_order(&self) -> Vec<u32> {
        self.inner.borrow().editor.session().page_order()
    }

    /// `"interactive"` or `"download_only"`
    #[wasm_bindgen(getter)]
    pub fn mode(&self) -> String {
        match self.inner.borrow().editor.session().mode() {
            ViewerMode::Interactive => "interactive".to_string(),
            ViewerMode::DownloadOnly => "download_only".to_string(),
        }
    }

    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self) -> Result<String, JsValue> {
        self.inner.borrow().editor.session().to_json().map_err(js_err)
    }

    // ============ Page loading ============

    /// Store a rendered page
    #[wasm_bindgen(js_name = applyRender)]
    pub fn apply_render(&self, page: u32, width: u32, height: u32, data_url: String) -> Result<(), JsValue> {
        let mut inner = self.inner.borrow_mut();
        let rendered = RenderedPage {
            width,
            height,
            bitmap: PageBitmap::DataUrl(data_url),
        };
        inner.editor.session_mut().apply_render(page, Ok(rendered)).map_err(js_err)?;
        inner.editor.invalidate(RedrawReason::PageChanged);
        inner.sync_views(RedrawReason::PageChanged);
        Ok(())
    }

    /// The rasterizer gave up on one page; it shows as unavailable.
    /// Throws only for a page the session does not have.
    #[wasm_bindgen(js_name = renderFailed)]
    pub fn render_failed(&self, page: u32, reason: String) -> Result<(), JsValue> {
        let mut inner = self.inner.borrow_mut();
        let result = inner
            .editor
            .session_mut()
            .apply_render(page, Err(RasterError::PageFailed { page, reason }));
        render_failed_result(result).map_err(|e| JsValue::from_str(&e))?;
        inner.editor.invalidate(RedrawReason::PageChanged);
        inner.schedule();
        Ok(())
    }

    /// `"loading" | "rendered" | "blank" | "unavailable"`, or undefined for
    /// an unknown page
    #[wasm_bindgen(js_name = pageState)]
    pub fn page_state(&self, page: u32) -> Option<String> {
        let inner = self.inner.borrow();
        let slot = inner.editor.session().page(page)?;
        Some(page_state_name(&slot.content).to_string())
    }

    /// The rasterizer could not start at all
    #[wasm_bindgen(js_name = workerUnavailable)]
    pub fn worker_unavailable(&self, reason: String) {
        self.inner
            .borrow_mut()
            .editor
            .session_mut()
            .mark_worker_unavailable(&reason);
    }

    /// Render every pending page through `render_fn(page, scale)`, which
    /// returns a promise of `{ width, height, dataUrl }`. Rejections with
    /// `{ kind: "timeout" | "worker", message }` are classified; anything
    /// else counts as a page failure. A render still pending after
    /// `raster.timeout_ms` counts as a timeout. Pages within a batch render
    /// concurrently. Resolves to `{ rendered, failed, workerUnavailable }`.
    #[wasm_bindgen(js_name = loadPages)]
    pub fn load_pages(&self, render_fn: js_sys::Function) -> js_sys::Promise {
        let shared = Rc::clone(&self.inner);
        future_to_promise(async move {
            let (batches, scale, timeout_ms) = {
                let inner = shared.borrow();
                let raster = &inner.editor.config().raster;
                (
                    inner.editor.session().loading_batches(raster.batch_size),
                    raster.scale,
                    raster.timeout_ms,
                )
            };

            let mut rendered = Vec::new();
            let mut failed = Vec::new();
            let mut worker_unavailable = false;

            'batches: for batch in batches {
                let promises = js_sys::Array::new();
                for page in &batch {
                    let value = render_fn.call2(&JsValue::NULL, &JsValue::from(*page), &JsValue::from(scale))?;
                    let render = js_sys::Promise::resolve(&value);
                    let raced = with_timeout(render, *page, timeout_ms)?;
                    promises.push(&raced);
                }
                let settled = JsFuture::from(js_sys::Promise::all_settled(&promises)).await?;
                let settled = js_sys::Array::from(&settled);

                let mut inner = shared.borrow_mut();
                for (page, outcome) in batch.iter().copied().zip(settled.iter()) {
                    let status = js_sys::Reflect::get(&outcome, &"status".into())?;
                    let result = if status.as_string().as_deref() == Some("fulfilled") {
                        let value = js_sys::Reflect::get(&outcome, &"value".into())?;
                        match serde_wasm_bindgen::from_value::<RenderSuccess>(value) {
                            Ok(ok) => Ok(RenderedPage {
                                width: ok.width,
                                height: ok.height,
                                bitmap: PageBitmap::DataUrl(ok.data_url),
                            }),
                            Err(e) => Err(RasterError::PageFailed {
                                page,
                                reason: format!("bad render result: {}", e),
                            }),
                        }
                    } else {
                        let reason = js_sys::Reflect::get(&outcome, &"reason".into())?;
                        let failure = serde_wasm_bindgen::from_value::<RenderFailure>(reason.clone())
                            .unwrap_or(RenderFailure {
                                kind: None,
                                message: reason.as_string(),
                            });
                        Err(render_failure(page, failure, timeout_ms))
                    };

                    match inner.editor.session_mut().apply_render(page, result) {
                        Ok(()) => rendered.push(page),
                        Err(EditorError::WorkerUnavailable(_)) => {
                            worker_unavailable = true;
                        }
                        Err(_) => failed.push(page),
                    }
                }
                inner.sync_views(RedrawReason::PageChanged);
                if worker_unavailable {
                    break 'batches;
                }
            }

            let report = js_sys::Object::new();
            js_sys::Reflect::set(&report, &"rendered".into(), &to_js(&rendered)?)?;
            js_sys::Reflect::set(&report, &"failed".into(), &to_js(&failed)?)?;
            js_sys::Reflect::set(
                &report,
                &"workerUnavailable".into(),
                &JsValue::from_bool(worker_unavailable),
            )?;
            Ok(report.into())
        })
    }

    // ============ Pages ============

    /// Overlay `canvas` on `image` for `page` and start tracking it
    #[wasm_bindgen(js_name = attachPage)]
    pub fn attach_page(&self, page: u32, image: HtmlImageElement, canvas: HtmlCanvasElement) -> Result<(), JsValue> {
        let weak = Rc::downgrade(&self.inner);
        let mut listeners = Vec::new();
        for kind in ["pointerdown", "pointermove", "pointerup", "pointercancel"] {
            let w = weak.clone();
            listeners.push(EventListener::new(&canvas, kind, move |ev| {
                on_pointer(&w, page, kind, ev)
            })?);
        }
        {
            let w = weak.clone();
            listeners.push(EventListener::new(&image, "load", move |_| {
                on_layout_change(&w, RedrawReason::ImageResized)
            })?);
        }
        {
            // Placement clicks fall through the overlay onto the image
            let w = weak.clone();
            listeners.push(EventListener::new(&image, "pointerdown", move |ev| {
                on_pointer(&w, page, "pointerdown", ev)
            })?);
        }

        let surface = OverlaySurface::new(canvas, image)?;
        let mut inner = self.inner.borrow_mut();
        if !inner.editor.session().has_page(page) {
            return Err(js_err(EditorError::UnknownPage(page)));
        }
        if let Some(resize) = &inner.resize {
            resize.observe(surface.image());
        }
        inner.surfaces.insert(
            page,
            PageSurface {
                surface,
                _listeners: listeners,
            },
        );
        inner.apply_input(&[]);
        inner.sync_views(RedrawReason::PageChanged);
        Ok(())
    }

    /// Stop tracking a page (unmounted or virtualized away)
    #[wasm_bindgen(js_name = detachPage)]
    pub fn detach_page(&self, page: u32) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(removed) = inner.surfaces.remove(&page) else {
            return false;
        };
        if let Some(resize) = &inner.resize {
            resize.unobserve(removed.surface.image());
        }
        inner.editor.drop_view(page);
        true
    }

    /// Insert a blank page after `after`; returns the new page number
    #[wasm_bindgen(js_name = insertBlankPageAfter)]
    pub fn insert_blank_page_after(&self, after: u32, width: f64, height: f64) -> Result<u32, JsValue> {
        let mut inner = self.inner.borrow_mut();
        let number = inner
            .editor
            .session_mut()
            .insert_blank_page_after(after, Size::new(width, height))
            .map_err(js_err)?;
        inner.editor.invalidate(RedrawReason::PageChanged);
        inner.schedule();
        Ok(number)
    }

    #[wasm_bindgen(js_name = removePage)]
    pub fn remove_page(&self, page: u32) -> bool {
        let mut inner = self.inner.borrow_mut();
        let removed = inner.editor.session_mut().remove_page(page);
        if removed {
            inner.surfaces.remove(&page);
            inner.editor.drop_view(page);
            inner.editor.invalidate(RedrawReason::PageChanged);
            inner.schedule();
        }
        removed
    }

    #[wasm_bindgen(js_name = movePage)]
    pub fn move_page(&self, page: u32, to_index: usize) -> bool {
        self.inner
            .borrow_mut()
            .editor
            .session_mut()
            .move_page(page, to_index)
    }

    // ============ Tools and placement ============

    /// `"select" | "signature" | "text" | "form_field" | "shape" | "line"`
    #[wasm_bindgen(js_name = setTool)]
    pub fn set_tool(&self, tool: &str) -> Result<JsValue, JsValue> {
        let tool = parse_tool(tool).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.set_tool(tool))
    }

    #[wasm_bindgen(getter)]
    pub fn tool(&self) -> String {
        match self.inner.borrow().editor.controller().tool() {
            Tool::Select => "select",
            Tool::Signature => "signature",
            Tool::Text => "text",
            Tool::FormField => "form_field",
            Tool::Shape => "shape",
            Tool::Line => "line",
        }
        .to_string()
    }

    /// Arm a signature for the next click
    #[wasm_bindgen(js_name = placeSignature)]
    pub fn place_signature(&self, data_url: &str, width: f64, height: f64) -> Result<JsValue, JsValue> {
        let draft = signature_draft(data_url, width, height).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.begin_placement(draft))
    }

    #[wasm_bindgen(js_name = placeText)]
    pub fn place_text(&self, content: &str, style_json: Option<String>) -> Result<JsValue, JsValue> {
        let style: TextStyle = parse_style(style_json).map_err(|e| JsValue::from_str(&e))?;
        let draft = text_draft(content, style).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.begin_placement(draft))
    }

    /// `field_type`: `"checkbox" | "text_field" | "signature_field"`,
    /// `size`: `"small" | "medium" | "large"`
    #[wasm_bindgen(js_name = placeFormField)]
    pub fn place_form_field(
        &self,
        field_type: &str,
        label: &str,
        required: bool,
        size: &str,
    ) -> Result<JsValue, JsValue> {
        let draft = form_field_draft(field_type, label, required, size).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.begin_placement(draft))
    }

    /// `kind`: `"rectangle" | "ellipse" | "roundedrectangle"`
    #[wasm_bindgen(js_name = placeShape)]
    pub fn place_shape(
        &self,
        kind: &str,
        width: f64,
        height: f64,
        style_json: Option<String>,
    ) -> Result<JsValue, JsValue> {
        let style: ShapeStyle = parse_style(style_json).map_err(|e| JsValue::from_str(&e))?;
        let draft = shape_draft(kind, width, height, style).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.begin_placement(draft))
    }

    #[wasm_bindgen(js_name = placeLine)]
    pub fn place_line(&self, width: f64, style_json: Option<String>) -> Result<JsValue, JsValue> {
        let style: LineStyle = parse_style(style_json).map_err(|e| JsValue::from_str(&e))?;
        let draft = line_draft(width, style).map_err(|e| JsValue::from_str(&e))?;
        self.run(|editor| editor.begin_placement(draft))
    }

    // ============ Editing ============

    /// Partial update; see `AnnotationPatch` for the accepted keys
    #[wasm_bindgen(js_name = updateAnnotation)]
    pub fn update_annotation(&self, id: u64, patch_json: &str) -> Result<bool, JsValue> {
        let patch: AnnotationPatch = serde_json::from_str(patch_json)
            .map_err(|e| JsValue::from_str(&format!("Invalid patch JSON: {}", e)))?;
        let mut inner = self.inner.borrow_mut();
        let changed = inner
            .editor
            .update_annotation(AnnotationId(id), &patch)
            .map_err(js_err)?;
        inner.schedule();
        Ok(changed)
    }

    #[wasm_bindgen(js_name = removeAnnotation)]
    pub fn remove_annotation(&self, id: u64) -> bool {
        self.mutate(|editor| editor.remove_annotation(AnnotationId(id)))
    }

    #[wasm_bindgen(js_name = bringToFront)]
    pub fn bring_to_front(&self, id: u64) -> bool {
        self.mutate(|editor| editor.bring_to_front(AnnotationId(id)))
    }

    #[wasm_bindgen(js_name = sendToBack)]
    pub fn send_to_back(&self, id: u64) -> bool {
        self.mutate(|editor| editor.send_to_back(AnnotationId(id)))
    }

    /// Returns the copy's id
    pub fn duplicate(&self, id: u64) -> Option<u64> {
        self.mutate(|editor| editor.duplicate(AnnotationId(id)))
            .map(|copy| copy.0)
    }

    /// Color a text or shape selection, e.g. `"#ff0000"`
    #[wasm_bindgen(js_name = setColor)]
    pub fn set_color(&self, id: u64, color: &str) -> Result<bool, JsValue> {
        let color: Color = color.parse().map_err(js_err)?;
        let patch = AnnotationPatch {
            style: Some(inksign_core::StylePatch {
                color: Some(color),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut inner = self.inner.borrow_mut();
        let changed = inner
            .editor
            .update_annotation(AnnotationId(id), &patch)
            .map_err(js_err)?;
        inner.schedule();
        Ok(changed)
    }

    /// Every annotation, as plain objects
    pub fn annotations(&self) -> Result<JsValue, JsValue> {
        let inner = self.inner.borrow();
        let list: Vec<_> = inner.editor.session().annotations().iter().collect();
        to_js(&list)
    }

    /// Selected ids, primary first
    pub fn selection(&self) -> Vec<u64> {
        let inner = self.inner.borrow();
        let selection = inner.editor.session().annotations().selection();
        let primary = selection.primary();
        primary
            .into_iter()
            .chain(selection.ids().filter(|id| Some(*id) != primary))
            .map(|id| id.0)
            .collect()
    }

    /// Drop a failed signature decode so it is retried on the next frame
    #[wasm_bindgen(js_name = retrySignature)]
    pub fn retry_signature(&self, id: u64) -> bool {
        self.mutate(|editor| editor.retry_decode(AnnotationId(id)))
    }

    // ============ Export ============

    /// Flatten into a new PDF. `policy`: `"strict"` (default from config)
    /// or `"skip_failed"`. Resolves to `{ bytes: Uint8Array, skipped: [...] }`.
    #[wasm_bindgen(js_name = exportPdf)]
    pub fn export_pdf(&self, policy: Option<String>) -> Result<JsValue, JsValue> {
        let inner = self.inner.borrow();
        let policy = parse_policy(policy, inner.editor.config().export.policy)
            .map_err(|e| JsValue::from_str(&e))?;
        let outcome = export_session(&inner.editor, policy)
            .map_err(|e| JsValue::from_str(&format!("Export failed: {}", e)))?;

        let bytes = js_sys::Uint8Array::new_with_length(outcome.bytes.len() as u32);
        bytes.copy_from(&outcome.bytes);
        let skipped = js_sys::Array::new();
        for s in &outcome.skipped {
            let entry = js_sys::Object::new();
            js_sys::Reflect::set(&entry, &"page".into(), &JsValue::from(s.page))?;
            js_sys::Reflect::set(&entry, &"reason".into(), &JsValue::from_str(&s.reason))?;
            skipped.push(&entry);
        }
        let result = js_sys::Object::new();
        js_sys::Reflect::set(&result, &"bytes".into(), &bytes)?;
        js_sys::Reflect::set(&result, &"skipped".into(), &skipped)?;
        Ok(result.into())
    }
}

impl AnnotatorSession {
    fn with_session(session: DocumentSession, config: EditorConfig) -> Result<AnnotatorSession, JsValue> {
        let inner: Shared = Rc::new(RefCell::new(Inner::new(Editor::new(session, config))));
        let weak = Rc::downgrade(&inner);

        let frames = {
            let (wf, wt) = (weak.clone(), weak.clone());
            FrameLoop::new(move |ts| on_frame(&wf, ts), move || on_timer(&wt))
        };
        let resize = {
            let w = weak.clone();
            ResizeWatch::new(move || on_layout_change(&w, RedrawReason::ImageResized))?
        };

        let window = viewport::window()?;
        let listeners = vec![
            {
                let w = weak.clone();
                EventListener::passive_capture(&window, "scroll", move |_| {
                    on_layout_change(&w, RedrawReason::Scrolled)
                })?
            },
            {
                let w = weak.clone();
                EventListener::new(&window, "resize", move |_| {
                    on_layout_change(&w, RedrawReason::WindowResized)
                })?
            },
            {
                let w = weak.clone();
                EventListener::new(&window, "keydown", move |ev| on_key(&w, ev))?
            },
        ];

        {
            let mut i = inner.borrow_mut();
            i.frames = Some(frames);
            i.resize = Some(resize);
            i.window_listeners = listeners;
        }
        web_sys::console::log_1(&"InkSign session ready".into());
        Ok(AnnotatorSession { inner })
    }

    /// Run an editor call that yields actions, then schedule
    fn run(&self, f: impl FnOnce(&mut Editor<HtmlImageElement>) -> Vec<Action>) -> Result<JsValue, JsValue> {
        let mut inner = self.inner.borrow_mut();
        let actions = f(&mut inner.editor);
        inner.apply_input(&actions);
        inner.schedule();
        to_js(&actions)
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut Editor<HtmlImageElement>) -> T) -> T {
        let mut inner = self.inner.borrow_mut();
        let result = f(&mut inner.editor);
        inner.schedule();
        result
    }
}
