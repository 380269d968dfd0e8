//! Annotation store
//!
//! Owns every placed annotation, the current selection and the single
//! pending-placement slot. Mutations are synchronous; the renderer reads the
//! store directly on its next frame.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::{
    field_footprint, Annotation, AnnotationCategory, AnnotationId, AnnotationKind, Color,
    FieldSize, FontStyle, FontWeight, PendingPlacement, SignatureImage, TextAlign,
    TextDecoration,
};
use crate::error::EditorError;
use crate::geometry::{Point, Rect, Size};

/// Lowest z-index `send_to_back` will assign
pub const Z_BASELINE: i64 = 0;

/// Partial style update, merged into whichever style record the variant has
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StylePatch {
    /// Text color, stroke color, or border color
    pub color: Option<Color>,
    pub fill: Option<Color>,
    pub clear_fill: bool,
    pub stroke_width: Option<f64>,
    pub border_radius: Option<f64>,
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<FontStyle>,
    pub decoration: Option<TextDecoration>,
    pub align: Option<TextAlign>,
}

/// Partial annotation update. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationPatch {
    pub position: Option<Point>,
    pub size: Option<Size>,
    pub rotation: Option<f64>,
    pub locked: Option<bool>,
    pub hidden: Option<bool>,
    pub content: Option<String>,
    pub label: Option<String>,
    pub required: Option<bool>,
    pub checked: Option<bool>,
    pub size_class: Option<FieldSize>,
    pub image: Option<SignatureImage>,
    pub style: Option<StylePatch>,
}

impl AnnotationPatch {
    pub fn move_to(position: Point) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn bounds(rect: Rect) -> Self {
        Self {
            position: Some(rect.origin()),
            size: Some(rect.size()),
            ..Default::default()
        }
    }

    fn apply(&self, a: &mut Annotation) {
        if let Some(p) = self.position {
            a.position = p;
        }
        if let Some(s) = self.size {
            a.size = s;
        }
        if let Some(r) = self.rotation {
            a.rotation = r;
        }
        if let Some(l) = self.locked {
            a.locked = l;
        }
        if let Some(h) = self.hidden {
            a.hidden = h;
        }

        match &mut a.kind {
            AnnotationKind::Signature { image, border } => {
                if let Some(new_image) = &self.image {
                    *image = new_image.clone();
                }
                if let (Some(style), Some(border)) = (&self.style, border.as_mut()) {
                    if let Some(c) = style.color {
                        border.stroke = c;
                    }
                    if let Some(w) = style.stroke_width {
                        border.stroke_width = w;
                    }
                }
            }
            AnnotationKind::Text { content, style } => {
                if let Some(c) = &self.content {
                    *content = c.clone();
                }
                if let Some(patch) = &self.style {
                    if let Some(c) = patch.color {
                        style.color = c;
                    }
                    if let Some(f) = &patch.font_family {
                        style.font_family = f.clone();
                    }
                    if let Some(s) = patch.font_size {
                        style.font_size = s;
                    }
                    if let Some(w) = patch.font_weight {
                        style.font_weight = w;
                    }
                    if let Some(s) = patch.font_style {
                        style.font_style = s;
                    }
                    if let Some(d) = patch.decoration {
                        style.decoration = d;
                    }
                    if let Some(al) = patch.align {
                        style.align = al;
                    }
                }
            }
            AnnotationKind::FormField {
                field_type,
                label,
                required,
                size_class,
                checked,
                style,
            } => {
                if let Some(l) = &self.label {
                    *label = l.clone();
                }
                if let Some(r) = self.required {
                    *required = r;
                }
                if let Some(c) = self.checked {
                    *checked = c;
                }
                if let Some(class) = self.size_class {
                    *size_class = class;
                    a.size = field_footprint(*field_type, class);
                }
                if let Some(patch) = &self.style {
                    if let Some(c) = patch.color {
                        style.border = c;
                    }
                    if let Some(w) = patch.stroke_width {
                        style.border_width = w;
                    }
                    if let Some(r) = patch.border_radius {
                        style.border_radius = r;
                    }
                    if patch.clear_fill {
                        style.fill = None;
                    } else if let Some(f) = patch.fill {
                        style.fill = Some(f);
                    }
                }
            }
            AnnotationKind::Shape { style, .. } => {
                if let Some(patch) = &self.style {
                    if let Some(c) = patch.color {
                        style.stroke = c;
                    }
                    if let Some(w) = patch.stroke_width {
                        style.stroke_width = w;
                    }
                    if let Some(r) = patch.border_radius {
                        style.border_radius = r;
                    }
                    if patch.clear_fill {
                        style.fill = None;
                    } else if let Some(f) = patch.fill {
                        style.fill = Some(f);
                    }
                }
            }
            AnnotationKind::Line { style } => {
                if let Some(patch) = &self.style {
                    if let Some(c) = patch.color {
                        style.stroke = c;
                    }
                    if let Some(w) = patch.stroke_width {
                        style.stroke_width = w;
                    }
                }
            }
        }
    }
}

/// Selected annotation ids. `primary` is the one handles are drawn for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    ids: BTreeSet<AnnotationId>,
    primary: Option<AnnotationId>,
}

impl Selection {
    pub fn primary(&self) -> Option<AnnotationId> {
        self.primary
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = AnnotationId> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn set_single(&mut self, id: AnnotationId) {
        self.ids.clear();
        self.ids.insert(id);
        self.primary = Some(id);
    }

    fn insert(&mut self, id: AnnotationId) {
        self.ids.insert(id);
        self.primary = Some(id);
    }

    fn remove(&mut self, id: AnnotationId) -> bool {
        let removed = self.ids.remove(&id);
        if self.primary == Some(id) {
            self.primary = self.ids.iter().next_back().copied();
        }
        removed
    }

    fn clear(&mut self) -> bool {
        let had = !self.ids.is_empty();
        self.ids.clear();
        self.primary = None;
        had
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationStore {
    next_id: u64,
    annotations: Vec<Annotation>,
    #[serde(skip)]
    selection: Selection,
    #[serde(skip)]
    pending: Option<PendingPlacement>,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an annotation on top of its page's stack
    pub fn add(
        &mut self,
        page: u32,
        position: Point,
        size: Size,
        kind: AnnotationKind,
    ) -> Result<AnnotationId, EditorError> {
        check_geometry(position, size, &kind)?;
        kind.validate()?;

        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        let z_index = self.max_z(page, None).map_or(Z_BASELINE, |z| z + 1);

        self.annotations.push(Annotation {
            id,
            page,
            position,
            size,
            z_index,
            rotation: 0.0,
            locked: false,
            hidden: false,
            kind,
        });
        debug!(%id, page, z_index, "annotation added");
        Ok(id)
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == id)
    }

    fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|a| a.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.iter()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn count_in(&self, category: AnnotationCategory) -> usize {
        self.annotations
            .iter()
            .filter(|a| a.category() == category)
            .count()
    }

    /// Annotations of one page in paint order: z ascending, ties by insertion
    pub fn on_page(&self, page: u32) -> Vec<&Annotation> {
        let mut list: Vec<&Annotation> = self.annotations.iter().filter(|a| a.page == page).collect();
        list.sort_by_key(|a| a.z_index);
        list
    }

    /// Topmost visible annotation on `page` whose bounds contain `point`
    pub fn topmost_at(&self, page: u32, point: Point) -> Option<&Annotation> {
        self.annotations
            .iter()
            .enumerate()
            .filter(|(_, a)| a.page == page && !a.hidden && a.bounds().contains(point))
            .max_by_key(|(idx, a)| (a.z_index, *idx))
            .map(|(_, a)| a)
    }

    /// Apply a partial update. The result is validated before it is committed;
    /// an unknown id is a no-op returning `Ok(false)`.
    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) -> Result<bool, EditorError> {
        let Some(current) = self.get(id) else {
            return Ok(false);
        };
        let mut next = current.clone();
        patch.apply(&mut next);
        next.kind.validate()?;
        if next.size.is_empty() && !next.is_line() {
            return Err(EditorError::InvalidStyle(format!(
                "Annotation size must be positive, got {}x{}",
                next.size.width, next.size.height
            )));
        }
        if let Some(slot) = self.get_mut(id) {
            *slot = next;
        }
        Ok(true)
    }

    pub fn move_to(&mut self, id: AnnotationId, position: Point) -> bool {
        match self.get_mut(id) {
            Some(a) => {
                a.position = position;
                true
            }
            None => false,
        }
    }

    /// Set position and size together
    pub fn set_bounds(&mut self, id: AnnotationId, rect: Rect) -> bool {
        match self.get_mut(id) {
            Some(a) => {
                a.position = rect.origin();
                a.size = rect.size();
                true
            }
            None => false,
        }
    }

    /// Remove an annotation, dropping it from the selection if needed
    pub fn remove(&mut self, id: AnnotationId) -> Option<Annotation> {
        let pos = self.annotations.iter().position(|a| a.id == id)?;
        let removed = self.annotations.remove(pos);
        self.selection.remove(id);
        debug!(%id, category = ?removed.category(), "annotation removed");
        Some(removed)
    }

    /// Remove every selected annotation
    pub fn remove_selected(&mut self) -> Vec<Annotation> {
        let ids: Vec<AnnotationId> = self.selection.ids().collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Drop every annotation placed on `page`
    pub fn remove_page(&mut self, page: u32) -> usize {
        let ids: Vec<AnnotationId> = self
            .annotations
            .iter()
            .filter(|a| a.page == page)
            .map(|a| a.id)
            .collect();
        ids.iter().filter(|id| self.remove(**id).is_some()).count()
    }

    fn max_z(&self, page: u32, except: Option<AnnotationId>) -> Option<i64> {
        self.annotations
            .iter()
            .filter(|a| a.page == page && Some(a.id) != except)
            .map(|a| a.z_index)
            .max()
    }

    fn min_z(&self, page: u32, except: Option<AnnotationId>) -> Option<i64> {
        self.annotations
            .iter()
            .filter(|a| a.page == page && Some(a.id) != except)
            .map(|a| a.z_index)
            .min()
    }

    /// Raise above every sibling on the same page
    pub fn bring_to_front(&mut self, id: AnnotationId) -> bool {
        let Some(page) = self.get(id).map(|a| a.page) else {
            return false;
        };
        if let Some(max) = self.max_z(page, Some(id)) {
            if let Some(a) = self.get_mut(id) {
                a.z_index = max + 1;
            }
        }
        true
    }

    /// Lower below every sibling on the same page. Never goes under
    /// [`Z_BASELINE`]; siblings are lifted instead.
    pub fn send_to_back(&mut self, id: AnnotationId) -> bool {
        let Some(page) = self.get(id).map(|a| a.page) else {
            return false;
        };
        let Some(min) = self.min_z(page, Some(id)) else {
            return true;
        };

        let mut target = min - 1;
        if target < Z_BASELINE {
            let lift = Z_BASELINE - target;
            for a in self
                .annotations
                .iter_mut()
                .filter(|a| a.page == page && a.id != id)
            {
                a.z_index += lift;
            }
            target = Z_BASELINE;
        }
        if let Some(a) = self.get_mut(id) {
            a.z_index = target;
        }
        true
    }

    /// Clone an annotation, shifted by `offset` on both axes, on top of its page
    pub fn duplicate(&mut self, id: AnnotationId, offset: f64) -> Option<AnnotationId> {
        let source = self.get(id)?.clone();
        let new_id = AnnotationId(self.next_id);
        self.next_id += 1;
        let z_index = self.max_z(source.page, None).map_or(Z_BASELINE, |z| z + 1);

        self.annotations.push(Annotation {
            id: new_id,
            position: source.position.offset(offset, offset),
            z_index,
            ..source
        });
        Some(new_id)
    }

    // ============ Selection ============

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn primary_selection(&self) -> Option<AnnotationId> {
        self.selection.primary()
    }

    pub fn is_selected(&self, id: AnnotationId) -> bool {
        self.selection.contains(id)
    }

    /// Replace the selection with `id`. Unknown ids are ignored.
    pub fn select(&mut self, id: AnnotationId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.selection.set_single(id);
        true
    }

    /// Grow the selection for batch operations
    pub fn add_to_selection(&mut self, id: AnnotationId) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.selection.insert(id);
        true
    }

    pub fn toggle_selection(&mut self, id: AnnotationId) -> bool {
        if self.selection.contains(id) {
            self.selection.remove(id)
        } else {
            self.add_to_selection(id)
        }
    }

    /// Returns true if anything was selected
    pub fn clear_selection(&mut self) -> bool {
        self.selection.clear()
    }

    // ============ Pending placement ============

    /// Arm the placement slot, replacing any earlier draft
    pub fn begin_placement(&mut self, draft: PendingPlacement) {
        self.pending = Some(draft);
    }

    pub fn pending(&self) -> Option<&PendingPlacement> {
        self.pending.as_ref()
    }

    pub fn cancel_placement(&mut self) -> Option<PendingPlacement> {
        self.pending.take()
    }

    /// Commit the pending draft centered on `point`, kept inside a page of
    /// `page_size`. The placed annotation becomes the selection.
    pub fn place_pending(
        &mut self,
        page: u32,
        point: Point,
        page_size: Size,
    ) -> Result<Option<AnnotationId>, EditorError> {
        let Some(draft) = self.pending.take() else {
            return Ok(None);
        };
        let max_x = (page_size.width - draft.size.width).max(0.0);
        let max_y = (page_size.height - draft.size.height).max(0.0);
        let position = Point::new(
            (point.x - draft.size.width / 2.0).clamp(0.0, max_x),
            (point.y - draft.size.height / 2.0).clamp(0.0, max_y),
        );
        let id = self.add(page, position, draft.size, draft.kind)?;
        self.selection.set_single(id);
        Ok(Some(id))
    }

    // ============ Persistence ============

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let mut store: AnnotationStore = serde_json::from_str(json)?;
        let mut seen = BTreeSet::new();
        for a in &store.annotations {
            if !seen.insert(a.id) {
                return Err(EditorError::Serialization(format!(
                    "Duplicate annotation id {}",
                    a.id
                )));
            }
            check_geometry(a.position, a.size, &a.kind)?;
            a.kind.validate()?;
            if !a.rotation.is_finite() {
                return Err(EditorError::InvalidStyle(format!(
                    "Annotation {} has a non-finite rotation",
                    a.id
                )));
            }
        }
        let max_id = store.annotations.iter().map(|a| a.id.0 + 1).max().unwrap_or(0);
        store.next_id = store.next_id.max(max_id);
        Ok(store)
    }
}

/// Boxes need a positive finite size. Lines are a stretch of width; their
/// height is only grab room and may be zero.
fn check_geometry(position: Point, size: Size, kind: &AnnotationKind) -> Result<(), EditorError> {
    if !(position.x.is_finite() && position.y.is_finite()) {
        return Err(EditorError::InvalidStyle(format!(
            "Annotation position must be finite, got ({}, {})",
            position.x, position.y
        )));
    }
    let ok = match kind {
        AnnotationKind::Line { .. } => {
            size.width.is_finite() && size.width > 0.0 && size.height.is_finite() && size.height >= 0.0
        }
        _ => !size.is_empty(),
    };
    if ok {
        Ok(())
    } else {
        Err(EditorError::InvalidStyle(format!(
            "Annotation size must be positive, got {}x{}",
            size.width, size.height
        )))
    }
}
