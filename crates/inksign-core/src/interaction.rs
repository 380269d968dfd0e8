//! Pointer and keyboard handling for the overlay
//!
//! [`InteractionController`] is a small state machine (idle, dragging,
//! resizing). Handlers mutate the [`AnnotationStore`] directly and return the
//! [`Action`]s the host has to react to (repaint, cursor, edit box, placement).
//! Pointer positions are screen space; everything committed is image space.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::{Annotation, AnnotationCategory, AnnotationId, AnnotationKind};
use crate::config::InteractionConfig;
use crate::coords::CoordinateMapper;
use crate::geometry::{Point, Rect};
use crate::model::AnnotationStore;

/// Extra screen px around a line for hit-testing
const LINE_HIT_SLOP: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Signature,
    Text,
    FormField,
    Shape,
    Line,
}

impl Tool {
    pub fn is_placement(self) -> bool {
        self != Tool::Select
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeHandle {
    pub const BOX: [ResizeHandle; 8] = [
        ResizeHandle::Nw,
        ResizeHandle::N,
        ResizeHandle::Ne,
        ResizeHandle::E,
        ResizeHandle::Se,
        ResizeHandle::S,
        ResizeHandle::Sw,
        ResizeHandle::W,
    ];
    pub const LINE: [ResizeHandle; 2] = [ResizeHandle::W, ResizeHandle::E];

    /// Handles offered for an annotation. Lines only stretch horizontally.
    pub fn for_annotation(a: &Annotation) -> &'static [ResizeHandle] {
        if a.is_line() {
            &Self::LINE
        } else {
            &Self::BOX
        }
    }

    /// Point on `bounds` the handle sits on
    pub fn anchor(self, bounds: Rect) -> Point {
        let c = bounds.center();
        match self {
            ResizeHandle::N => Point::new(c.x, bounds.y),
            ResizeHandle::Ne => Point::new(bounds.right(), bounds.y),
            ResizeHandle::E => Point::new(bounds.right(), c.y),
            ResizeHandle::Se => Point::new(bounds.right(), bounds.bottom()),
            ResizeHandle::S => Point::new(c.x, bounds.bottom()),
            ResizeHandle::Sw => Point::new(bounds.x, bounds.bottom()),
            ResizeHandle::W => Point::new(bounds.x, c.y),
            ResizeHandle::Nw => Point::new(bounds.x, bounds.y),
        }
    }

    /// Square of side `size` centered on the anchor
    pub fn rect(self, bounds: Rect, size: f64) -> Rect {
        let p = self.anchor(bounds);
        Rect::new(p.x - size / 2.0, p.y - size / 2.0, size, size)
    }

    fn moves_left(self) -> bool {
        matches!(self, ResizeHandle::W | ResizeHandle::Nw | ResizeHandle::Sw)
    }

    fn moves_right(self) -> bool {
        matches!(self, ResizeHandle::E | ResizeHandle::Ne | ResizeHandle::Se)
    }

    fn moves_top(self) -> bool {
        matches!(self, ResizeHandle::N | ResizeHandle::Ne | ResizeHandle::Nw)
    }

    fn moves_bottom(self) -> bool {
        matches!(self, ResizeHandle::S | ResizeHandle::Se | ResizeHandle::Sw)
    }

    pub fn cursor(self) -> Cursor {
        match self {
            ResizeHandle::N | ResizeHandle::S => Cursor::NsResize,
            ResizeHandle::E | ResizeHandle::W => Cursor::EwResize,
            ResizeHandle::Ne | ResizeHandle::Sw => Cursor::NeswResize,
            ResizeHandle::Nw | ResizeHandle::Se => Cursor::NwseResize,
        }
    }
}

/// New bounds for dragging `handle` by an image-space delta measured from the
/// resize start. The edge opposite the handle stays put and no produced
/// dimension drops below `min`. Lines keep their height.
pub fn apply_resize(start: Rect, handle: ResizeHandle, dx: f64, dy: f64, min: f64, is_line: bool) -> Rect {
    let mut left = start.x;
    let mut top = start.y;
    let mut right = start.right();
    let mut bottom = start.bottom();

    if handle.moves_left() {
        left += dx;
    }
    if handle.moves_right() {
        right += dx;
    }
    if !is_line {
        if handle.moves_top() {
            top += dy;
        }
        if handle.moves_bottom() {
            bottom += dy;
        }
    }

    // Only the axes the handle drags are floored
    let horizontal = handle.moves_left() || handle.moves_right();
    let vertical = !is_line && (handle.moves_top() || handle.moves_bottom());

    if horizontal && right - left < min {
        if handle.moves_left() {
            left = right - min;
        } else {
            right = left + min;
        }
    }
    if vertical && bottom - top < min {
        if handle.moves_top() {
            top = bottom - min;
        } else {
            bottom = top + min;
        }
    }

    Rect::new(left, top, right - left, bottom - top)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cursor {
    #[default]
    Default,
    Crosshair,
    Grab,
    Grabbing,
    Pointer,
    NsResize,
    EwResize,
    NeswResize,
    NwseResize,
}

impl Cursor {
    /// CSS `cursor` value
    pub fn css(self) -> &'static str {
        match self {
            Cursor::Default => "default",
            Cursor::Crosshair => "crosshair",
            Cursor::Grab => "grab",
            Cursor::Grabbing => "grabbing",
            Cursor::Pointer => "pointer",
            Cursor::NsResize => "ns-resize",
            Cursor::EwResize => "ew-resize",
            Cursor::NeswResize => "nesw-resize",
            Cursor::NwseResize => "nwse-resize",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Delete,
    Backspace,
    Escape,
    Other,
}

impl Key {
    /// Map a DOM `KeyboardEvent.key` value
    pub fn from_dom(key: &str) -> Self {
        match key {
            "Delete" => Key::Delete,
            "Backspace" => Key::Backspace,
            "Escape" | "Esc" => Key::Escape,
            _ => Key::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    #[serde(default)]
    pub shift: bool,
}

/// What the host has to do after an input event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    RenderNeeded,
    SetCursor { cursor: Cursor },
    SelectionChanged { primary: Option<AnnotationId> },
    Moved { id: AnnotationId, position: Point },
    Resized { id: AnnotationId, bounds: Rect },
    Deleted { id: AnnotationId, category: AnnotationCategory },
    /// Double click on a text label: open an editor over it
    EditRequested { id: AnnotationId },
    /// Click with a placement tool, already converted to image space
    PlacementClick { page: u32, point: Point },
    /// The pending draft was committed
    Placed { id: AnnotationId },
    PlacementCancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InputState {
    #[default]
    Idle,
    Dragging {
        id: AnnotationId,
        /// Last pointer position, screen space
        anchor: Point,
    },
    Resizing {
        id: AnnotationId,
        handle: ResizeHandle,
        start_pointer: Point,
        /// Image-space bounds at resize start
        start: Rect,
    },
}

/// The page under the pointer and its current screen transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageView {
    pub page: u32,
    pub mapper: CoordinateMapper,
}

impl PageView {
    pub fn new(page: u32, mapper: CoordinateMapper) -> Self {
        Self { page, mapper }
    }

    /// Screen-space hit area of an annotation
    pub fn screen_bounds(&self, a: &Annotation) -> Rect {
        let r = self.mapper.image_rect_to_screen(a.bounds());
        if a.is_line() {
            let y = r.center().y;
            Rect::new(r.x, y, r.width, 0.0).inflate(LINE_HIT_SLOP)
        } else {
            r
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LastClick {
    id: AnnotationId,
    at: Point,
    time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    config: InteractionConfig,
    tool: Tool,
    state: InputState,
    cursor: Cursor,
    last_click: Option<LastClick>,
}

impl InteractionController {
    pub fn new(config: InteractionConfig) -> Self {
        Self {
            config,
            tool: Tool::Select,
            state: InputState::Idle,
            cursor: Cursor::Default,
            last_click: None,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The overlay takes pointer events only in select mode; otherwise they
    /// fall through to the page image underneath
    pub fn captures_pointer(&self) -> bool {
        self.tool == Tool::Select
    }

    pub fn set_tool(&mut self, tool: Tool) -> Vec<Action> {
        self.tool = tool;
        self.state = InputState::Idle;
        self.last_click = None;
        let mut actions = Vec::new();
        let cursor = if tool.is_placement() {
            Cursor::Crosshair
        } else {
            Cursor::Default
        };
        self.set_cursor(cursor, &mut actions);
        actions
    }

    fn set_cursor(&mut self, cursor: Cursor, actions: &mut Vec<Action>) {
        if self.cursor != cursor {
            self.cursor = cursor;
            actions.push(Action::SetCursor { cursor });
        }
    }

    /// Topmost hit, scanning categories in priority order
    pub fn hit_test(&self, store: &AnnotationStore, view: &PageView, pt: Point) -> Option<AnnotationId> {
        let candidates = store.on_page(view.page);
        AnnotationCategory::HIT_ORDER.iter().find_map(|category| {
            candidates
                .iter()
                .rev()
                .filter(|a| a.category() == *category && !a.hidden)
                .find(|a| view.screen_bounds(a).contains(pt))
                .map(|a| a.id)
        })
    }

    /// Handle of the primary selection under `pt`
    pub fn handle_at(
        &self,
        store: &AnnotationStore,
        view: &PageView,
        pt: Point,
    ) -> Option<(AnnotationId, ResizeHandle)> {
        let id = store.primary_selection()?;
        let a = store.get(id)?;
        if a.page != view.page || a.hidden || !a.is_resizable() {
            return None;
        }
        let bounds = view.mapper.image_rect_to_screen(a.bounds());
        ResizeHandle::for_annotation(a)
            .iter()
            .find(|h| h.rect(bounds, self.config.handle_size).inflate(2.0).contains(pt))
            .map(|h| (id, *h))
    }

    pub fn pointer_down(
        &mut self,
        store: &mut AnnotationStore,
        view: &PageView,
        pt: Point,
        time_ms: f64,
        modifiers: Modifiers,
    ) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.tool.is_placement() {
            actions.push(Action::PlacementClick {
                page: view.page,
                point: view.mapper.screen_to_image(pt.x, pt.y),
            });
            return actions;
        }
        if !view.mapper.is_ready() {
            return actions;
        }

        if let Some((id, handle)) = self.handle_at(store, view, pt) {
            if let Some(a) = store.get(id) {
                self.state = InputState::Resizing {
                    id,
                    handle,
                    start_pointer: pt,
                    start: a.bounds(),
                };
                debug!(%id, ?handle, "resize started");
                self.set_cursor(handle.cursor(), &mut actions);
                return actions;
            }
        }

        let Some(id) = self.hit_test(store, view, pt) else {
            self.last_click = None;
            if store.clear_selection() {
                actions.push(Action::SelectionChanged { primary: None });
                actions.push(Action::RenderNeeded);
            }
            return actions;
        };

        if modifiers.shift {
            store.toggle_selection(id);
            actions.push(Action::SelectionChanged {
                primary: store.primary_selection(),
            });
            actions.push(Action::RenderNeeded);
            return actions;
        }

        let Some(a) = store.get(id) else {
            return actions;
        };
        let is_text = matches!(a.kind, AnnotationKind::Text { .. });
        let locked = a.locked;

        if is_text && self.is_double_click(id, pt, time_ms) {
            self.last_click = None;
            self.state = InputState::Idle;
            actions.push(Action::EditRequested { id });
            return actions;
        }
        self.last_click = Some(LastClick {
            id,
            at: pt,
            time_ms,
        });

        if store.primary_selection() != Some(id) || store.selection().len() > 1 {
            store.select(id);
            actions.push(Action::SelectionChanged { primary: Some(id) });
            actions.push(Action::RenderNeeded);
        }
        if !locked {
            self.state = InputState::Dragging { id, anchor: pt };
            self.set_cursor(Cursor::Grabbing, &mut actions);
        }
        actions
    }

    fn is_double_click(&self, id: AnnotationId, pt: Point, time_ms: f64) -> bool {
        match self.last_click {
            Some(last) => {
                last.id == id
                    && time_ms - last.time_ms <= self.config.double_click_ms
                    && time_ms >= last.time_ms
                    && last.at.distance_to(pt) <= self.config.double_click_distance
            }
            None => false,
        }
    }

    pub fn pointer_move(&mut self, store: &mut AnnotationStore, view: &PageView, pt: Point) -> Vec<Action> {
        let mut actions = Vec::new();
        match self.state {
            InputState::Idle => {
                let cursor = self.hover_cursor(store, view, pt);
                self.set_cursor(cursor, &mut actions);
            }
            InputState::Dragging { id, anchor } => {
                let Some(a) = store.get(id) else {
                    self.state = InputState::Idle;
                    return actions;
                };
                let mapper = &view.mapper;
                let screen = mapper.image_to_screen(a.position.x, a.position.y);
                let moved = screen.offset(pt.x - anchor.x, pt.y - anchor.y);
                let position = mapper.screen_to_image(moved.x, moved.y);
                if store.move_to(id, position) {
                    actions.push(Action::Moved { id, position });
                    actions.push(Action::RenderNeeded);
                }
                self.state = InputState::Dragging { id, anchor: pt };
            }
            InputState::Resizing {
                id,
                handle,
                start_pointer,
                start,
            } => {
                let Some(is_line) = store.get(id).map(Annotation::is_line) else {
                    self.state = InputState::Idle;
                    return actions;
                };
                let (dx, dy) = view
                    .mapper
                    .screen_delta_to_image(pt.x - start_pointer.x, pt.y - start_pointer.y);
                let bounds = apply_resize(start, handle, dx, dy, self.config.min_dimension, is_line);
                if store.set_bounds(id, bounds) {
                    actions.push(Action::Resized { id, bounds });
                    actions.push(Action::RenderNeeded);
                }
            }
        }
        actions
    }

    fn hover_cursor(&self, store: &AnnotationStore, view: &PageView, pt: Point) -> Cursor {
        if self.tool.is_placement() {
            return Cursor::Crosshair;
        }
        if let Some((_, handle)) = self.handle_at(store, view, pt) {
            return handle.cursor();
        }
        match self.hit_test(store, view, pt).and_then(|id| store.get(id)) {
            Some(a) if a.locked => Cursor::Pointer,
            Some(_) => Cursor::Grab,
            None => Cursor::Default,
        }
    }

    pub fn pointer_up(&mut self, store: &AnnotationStore, view: &PageView, pt: Point) -> Vec<Action> {
        let mut actions = Vec::new();
        if let InputState::Dragging { id, .. } | InputState::Resizing { id, .. } = self.state {
            debug!(%id, "gesture finished");
        }
        self.state = InputState::Idle;
        let cursor = self.hover_cursor(store, view, pt);
        self.set_cursor(cursor, &mut actions);
        actions
    }

    /// Pointer left the surface or capture was lost mid-gesture
    pub fn cancel_gesture(&mut self) {
        self.state = InputState::Idle;
    }

    pub fn key_down(&mut self, store: &mut AnnotationStore, key: Key) -> Vec<Action> {
        let mut actions = Vec::new();
        match key {
            Key::Delete | Key::Backspace => {
                if store.selection().is_empty() {
                    return actions;
                }
                self.state = InputState::Idle;
                for removed in store.remove_selected() {
                    actions.push(Action::Deleted {
                        id: removed.id,
                        category: removed.category(),
                    });
                }
                actions.push(Action::SelectionChanged { primary: None });
                actions.push(Action::RenderNeeded);
            }
            Key::Escape => {
                if store.cancel_placement().is_some() {
                    actions.push(Action::PlacementCancelled);
                    actions.extend(self.set_tool(Tool::Select));
                } else if store.clear_selection() {
                    self.state = InputState::Idle;
                    actions.push(Action::SelectionChanged { primary: None });
                    actions.push(Action::RenderNeeded);
                }
            }
            Key::Other => {}
        }
        actions
    }
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(InteractionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{LineStyle, ShapeKind, ShapeStyle, SignatureImage, TextStyle};
    use crate::geometry::Size;
    use pretty_assertions::assert_eq;

    fn view() -> PageView {
        PageView::new(1, CoordinateMapper::identity(Point::new(0.0, 0.0), Size::new(800.0, 1000.0)))
    }

    fn signature(store: &mut AnnotationStore, x: f64, y: f64) -> AnnotationId {
        store
            .add(
                1,
                Point::new(x, y),
                Size::new(200.0, 80.0),
                AnnotationKind::Signature {
                    image: SignatureImage::DataUrl("data:image/png;base64,AAAA".into()),
                    border: None,
                },
            )
            .unwrap()
    }

    fn text(store: &mut AnnotationStore, x: f64, y: f64) -> AnnotationId {
        store
            .add(
                1,
                Point::new(x, y),
                Size::new(200.0, 40.0),
                AnnotationKind::Text {
                    content: "Hello".into(),
                    style: TextStyle::default(),
                },
            )
            .unwrap()
    }

    fn down(c: &mut InteractionController, s: &mut AnnotationStore, x: f64, y: f64, t: f64) -> Vec<Action> {
        c.pointer_down(s, &view(), Point::new(x, y), t, Modifiers::default())
    }

    #[test]
    fn test_signature_wins_over_text_on_top() {
        let mut store = AnnotationStore::new();
        let sig = signature(&mut store, 100.0, 100.0);
        // text added later has a higher z, but signatures are tested first
        text(&mut store, 100.0, 100.0);
        let c = InteractionController::default();
        assert_eq!(c.hit_test(&store, &view(), Point::new(150.0, 120.0)), Some(sig));
    }

    #[test]
    fn test_topmost_within_category() {
        let mut store = AnnotationStore::new();
        let low = signature(&mut store, 100.0, 100.0);
        let high = signature(&mut store, 150.0, 100.0);
        let c = InteractionController::default();
        assert_eq!(c.hit_test(&store, &view(), Point::new(200.0, 120.0)), Some(high));
        store.bring_to_front(low);
        assert_eq!(c.hit_test(&store, &view(), Point::new(200.0, 120.0)), Some(low));
    }

    #[test]
    fn test_drag_then_resize_scenario() {
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();

        down(&mut c, &mut store, 150.0, 120.0, 0.0);
        assert!(matches!(c.state(), InputState::Dragging { .. }));
        assert_eq!(store.primary_selection(), Some(id));
        c.pointer_move(&mut store, &view(), Point::new(175.0, 120.0));
        c.pointer_move(&mut store, &view(), Point::new(200.0, 120.0));
        c.pointer_up(&store, &view(), Point::new(200.0, 120.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(150.0, 100.0));
        assert_eq!(c.state(), InputState::Idle);

        // se handle sits at (350, 180)
        down(&mut c, &mut store, 350.0, 180.0, 1000.0);
        assert!(matches!(
            c.state(),
            InputState::Resizing {
                handle: ResizeHandle::Se,
                ..
            }
        ));
        c.pointer_move(&mut store, &view(), Point::new(370.0, 190.0));
        c.pointer_up(&store, &view(), Point::new(370.0, 190.0));
        let a = store.get(id).unwrap();
        assert_eq!(a.size, Size::new(220.0, 90.0));
        assert_eq!(a.position, Point::new(150.0, 100.0));
    }

    #[test]
    fn test_drag_clamped_to_page() {
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();
        down(&mut c, &mut store, 150.0, 120.0, 0.0);
        c.pointer_move(&mut store, &view(), Point::new(-5000.0, -5000.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(0.0, 0.0));
    }

    #[test]
    fn test_nw_resize_keeps_opposite_corner() {
        let start = Rect::new(100.0, 100.0, 200.0, 80.0);
        let r = apply_resize(start, ResizeHandle::Nw, 30.0, 20.0, 10.0, false);
        assert_eq!(r, Rect::new(130.0, 120.0, 170.0, 60.0));
        assert_eq!(r.right(), start.right());
        assert_eq!(r.bottom(), start.bottom());

        // collapsing past the floor pins to min size against the fixed edge
        let r = apply_resize(start, ResizeHandle::Nw, 500.0, 500.0, 10.0, false);
        assert_eq!(r, Rect::new(290.0, 170.0, 10.0, 10.0));
    }

    #[test]
    fn test_edge_resize_leaves_undersized_cross_axis() {
        // Box already thinner than the floor on both axes
        let start = Rect::new(20.0, 20.0, 6.0, 4.0);
        let r = apply_resize(start, ResizeHandle::E, 30.0, 0.0, 10.0, false);
        assert_eq!(r, Rect::new(20.0, 20.0, 36.0, 4.0));
        let r = apply_resize(start, ResizeHandle::S, 0.0, 1.0, 10.0, false);
        assert_eq!(r, Rect::new(20.0, 20.0, 6.0, 10.0));
        // corners still floor both
        let r = apply_resize(start, ResizeHandle::Se, 0.0, 0.0, 10.0, false);
        assert_eq!(r, Rect::new(20.0, 20.0, 10.0, 10.0));
    }

    #[test]
    fn test_line_resize_only_changes_width() {
        let start = Rect::new(0.0, 50.0, 100.0, 0.0);
        let r = apply_resize(start, ResizeHandle::E, 40.0, 90.0, 10.0, true);
        assert_eq!(r, Rect::new(0.0, 50.0, 140.0, 0.0));
        let r = apply_resize(start, ResizeHandle::W, 200.0, 0.0, 10.0, true);
        assert_eq!(r.width, 10.0);
        assert_eq!(r.right(), 100.0);
    }

    #[test]
    fn test_double_click_text_requests_edit() {
        let mut store = AnnotationStore::new();
        let id = text(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();

        down(&mut c, &mut store, 120.0, 110.0, 1000.0);
        c.pointer_up(&store, &view(), Point::new(120.0, 110.0));
        let actions = down(&mut c, &mut store, 122.0, 111.0, 1200.0);
        assert!(actions.contains(&Action::EditRequested { id }));
        assert_eq!(c.state(), InputState::Idle);
    }

    #[test]
    fn test_slow_second_click_drags() {
        let mut store = AnnotationStore::new();
        let id = text(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();
        down(&mut c, &mut store, 120.0, 110.0, 1000.0);
        c.pointer_up(&store, &view(), Point::new(120.0, 110.0));
        let actions = down(&mut c, &mut store, 120.0, 110.0, 1400.0);
        assert!(!actions.contains(&Action::EditRequested { id }));
        assert!(matches!(c.state(), InputState::Dragging { .. }));
    }

    #[test]
    fn test_far_second_click_is_not_double() {
        let mut store = AnnotationStore::new();
        let id = text(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();
        down(&mut c, &mut store, 120.0, 110.0, 1000.0);
        c.pointer_up(&store, &view(), Point::new(120.0, 110.0));
        let actions = down(&mut c, &mut store, 150.0, 110.0, 1100.0);
        assert!(!actions.contains(&Action::EditRequested { id }));
    }

    #[test]
    fn test_miss_clears_selection() {
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        store.select(id);
        let mut c = InteractionController::default();
        let actions = down(&mut c, &mut store, 700.0, 900.0, 0.0);
        assert!(actions.contains(&Action::SelectionChanged { primary: None }));
        assert!(store.selection().is_empty());
        assert_eq!(c.state(), InputState::Idle);
    }

    #[test]
    fn test_placement_tool_forwards_click() {
        let mut store = AnnotationStore::new();
        signature(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();
        let actions = c.set_tool(Tool::Text);
        assert_eq!(actions, vec![Action::SetCursor { cursor: Cursor::Crosshair }]);
        assert!(!c.captures_pointer());

        // even over an annotation the click goes to placement
        let actions = down(&mut c, &mut store, 150.0, 120.0, 0.0);
        assert_eq!(
            actions,
            vec![Action::PlacementClick {
                page: 1,
                point: Point::new(150.0, 120.0)
            }]
        );
        assert!(store.selection().is_empty());
    }

    #[test]
    fn test_delete_removes_selected_once() {
        let mut store = AnnotationStore::new();
        let sig = signature(&mut store, 100.0, 100.0);
        let txt = text(&mut store, 400.0, 400.0);
        store.select(sig);
        let mut c = InteractionController::default();

        let actions = c.key_down(&mut store, Key::from_dom("Delete"));
        assert!(actions.contains(&Action::Deleted {
            id: sig,
            category: AnnotationCategory::Signature
        }));
        assert!(store.get(sig).is_none());
        assert!(store.get(txt).is_some());
        assert_eq!(store.count_in(AnnotationCategory::Signature), 0);
        assert_eq!(store.count_in(AnnotationCategory::Text), 1);
        assert!(store.selection().is_empty());

        // nothing selected: no-op
        assert!(c.key_down(&mut store, Key::Backspace).is_empty());
    }

    #[test]
    fn test_escape_cancels_placement_first() {
        use crate::annotation::PendingPlacement;
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        store.select(id);
        store.begin_placement(
            PendingPlacement::new(
                Size::new(50.0, 50.0),
                AnnotationKind::Shape {
                    shape: ShapeKind::Ellipse,
                    style: ShapeStyle::default(),
                },
            )
            .unwrap(),
        );
        let mut c = InteractionController::default();
        c.set_tool(Tool::Shape);

        let actions = c.key_down(&mut store, Key::Escape);
        assert!(actions.contains(&Action::PlacementCancelled));
        assert_eq!(c.tool(), Tool::Select);
        assert!(store.is_selected(id));

        c.key_down(&mut store, Key::Escape);
        assert!(store.selection().is_empty());
    }

    #[test]
    fn test_locked_selects_but_does_not_drag() {
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        store
            .update(
                id,
                &crate::model::AnnotationPatch {
                    locked: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let mut c = InteractionController::default();
        down(&mut c, &mut store, 150.0, 120.0, 0.0);
        assert_eq!(store.primary_selection(), Some(id));
        assert_eq!(c.state(), InputState::Idle);
        c.pointer_move(&mut store, &view(), Point::new(300.0, 300.0));
        assert_eq!(store.get(id).unwrap().position, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_form_field_has_no_handles() {
        use crate::annotation::{FieldSize, FieldType, PendingPlacement};
        let mut store = AnnotationStore::new();
        let draft = PendingPlacement::form_field(FieldType::TextField, "Name", true, FieldSize::Medium);
        let id = store.add(1, Point::new(100.0, 100.0), draft.size, draft.kind).unwrap();
        store.select(id);
        let c = InteractionController::default();
        // bottom-right corner of a 180x30 field
        assert!(c.handle_at(&store, &view(), Point::new(280.0, 130.0)).is_none());
    }

    #[test]
    fn test_line_hit_with_slop() {
        let mut store = AnnotationStore::new();
        let id = store
            .add(
                1,
                Point::new(100.0, 100.0),
                Size::new(200.0, 0.0),
                AnnotationKind::Line {
                    style: LineStyle::default(),
                },
            )
            .unwrap();
        let c = InteractionController::default();
        assert_eq!(c.hit_test(&store, &view(), Point::new(150.0, 103.0)), Some(id));
        assert_eq!(c.hit_test(&store, &view(), Point::new(150.0, 110.0)), None);
    }

    #[test]
    fn test_hover_cursors() {
        let mut store = AnnotationStore::new();
        let id = signature(&mut store, 100.0, 100.0);
        let mut c = InteractionController::default();
        let actions = c.pointer_move(&mut store, &view(), Point::new(150.0, 120.0));
        assert_eq!(actions, vec![Action::SetCursor { cursor: Cursor::Grab }]);
        // unchanged cursor is not re-sent
        assert!(c.pointer_move(&mut store, &view(), Point::new(151.0, 120.0)).is_empty());

        store.select(id);
        c.pointer_move(&mut store, &view(), Point::new(300.0, 140.0));
        assert_eq!(c.cursor(), Cursor::EwResize);
        c.pointer_move(&mut store, &view(), Point::new(700.0, 700.0));
        assert_eq!(c.cursor(), Cursor::Default);
        assert_eq!(Cursor::NwseResize.css(), "nwse-resize");
    }

    #[test]
    fn test_shift_click_builds_multi_selection() {
        let mut store = AnnotationStore::new();
        let a = signature(&mut store, 100.0, 100.0);
        let b = signature(&mut store, 400.0, 400.0);
        let mut c = InteractionController::default();
        down(&mut c, &mut store, 150.0, 120.0, 0.0);
        c.pointer_up(&store, &view(), Point::new(150.0, 120.0));
        c.pointer_down(&mut store, &view(), Point::new(450.0, 420.0), 500.0, Modifiers { shift: true });
        assert!(store.is_selected(a) && store.is_selected(b));

        let actions = c.key_down(&mut store, Key::Delete);
        let deleted = actions
            .iter()
            .filter(|a| matches!(a, Action::Deleted { .. }))
            .count();
        assert_eq!(deleted, 2);
        assert!(store.is_empty());
    }
}
