//! Immediate-mode overlay renderer
//!
//! [`render_overlay`] turns the annotations of one page into a display list in
//! canvas-local CSS pixels. The host replays the list onto a 2D context after
//! sizing the canvas from [`SurfaceLayout`]. Nothing here touches the DOM.

use serde::{Deserialize, Serialize};

use crate::annotation::{
    Annotation, AnnotationId, AnnotationKind, Color, FieldType, ShapeKind, TextAlign,
    TextDecoration,
};
use crate::cache::{CacheStatus, SignatureCache};
use crate::config::RenderConfig;
use crate::coords::CoordinateMapper;
use crate::geometry::{Point, Rect};
use crate::interaction::ResizeHandle;
use crate::model::AnnotationStore;

/// Line height as a multiple of font size
pub const LINE_HEIGHT: f64 = 1.2;

const PLACEHOLDER: Color = Color::rgb(0x94, 0xa3, 0xb8);
const REQUIRED_MARK: Color = Color::rgb(0xdc, 0x26, 0x26);
const LABEL_COLOR: Color = Color::rgb(0x47, 0x55, 0x69);

/// Overlay canvas placement: covers the page image element exactly
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceLayout {
    /// CSS rect of the page image element
    pub css: Rect,
    pub device_pixel_ratio: f64,
}

impl SurfaceLayout {
    pub fn new(css: Rect, device_pixel_ratio: f64) -> Self {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            css,
            device_pixel_ratio: dpr,
        }
    }

    pub fn backing_width(&self) -> u32 {
        (self.css.width.max(0.0) * self.device_pixel_ratio).round() as u32
    }

    pub fn backing_height(&self) -> u32 {
        (self.css.height.max(0.0) * self.device_pixel_ratio).round() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
    /// `[dash, gap]` in CSS px
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dash: Option<[f64; 2]>,
}

impl Stroke {
    pub fn solid(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(color: Color, width: f64) -> Self {
        Self {
            color,
            width,
            dash: Some([4.0, 3.0]),
        }
    }
}

/// One canvas operation. Coordinates are canvas-local CSS pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Reset the transform to `scale` and clear the backing store
    Begin { scale: f64, width: f64, height: f64 },
    Save,
    Restore,
    /// Rotate about `center`
    Rotate { center: Point, degrees: f64 },
    Rect {
        rect: Rect,
        radius: f64,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Ellipse {
        rect: Rect,
        fill: Option<Color>,
        stroke: Option<Stroke>,
    },
    Line { from: Point, to: Point, stroke: Stroke },
    Polyline { points: Vec<Point>, stroke: Stroke },
    /// Text drawn with a top baseline from `origin`, one line per entry
    Text {
        lines: Vec<String>,
        origin: Point,
        font: String,
        size_px: f64,
        color: Color,
        align: TextAlign,
        decoration: TextDecoration,
    },
    /// Decoded signature bitmap, looked up by the host in its cache
    Image { id: AnnotationId, rect: Rect },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderOutput {
    pub commands: Vec<DrawCommand>,
    /// Signatures whose payload has not been decoded yet
    pub decode_requests: Vec<AnnotationId>,
}

/// Everything a frame depends on
pub struct OverlayScene<'a, T> {
    pub store: &'a AnnotationStore,
    pub page: u32,
    pub mapper: &'a CoordinateMapper,
    pub cache: &'a SignatureCache<T>,
    pub config: &'a RenderConfig,
    pub handle_size: f64,
    pub device_pixel_ratio: f64,
}

/// Paint one page's overlay
pub fn render_overlay<T>(scene: &OverlayScene<'_, T>) -> RenderOutput {
    let mapper = scene.mapper;
    let container = mapper.container();
    let mut out = RenderOutput::default();
    let dpr = SurfaceLayout::new(container, scene.device_pixel_ratio).device_pixel_ratio;

    out.commands.push(DrawCommand::Begin {
        scale: dpr,
        width: container.width.max(0.0),
        height: container.height.max(0.0),
    });
    if !mapper.is_ready() {
        return out;
    }

    let to_local = |image_rect: Rect| {
        let r = mapper.image_rect_to_screen(image_rect);
        Rect::new(r.x - container.x, r.y - container.y, r.width, r.height)
    };
    let scale = mapper.scale();

    for a in scene.store.on_page(scene.page) {
        if a.hidden {
            continue;
        }
        let rect = to_local(a.bounds());
        let rotated = a.rotation != 0.0;
        if rotated {
            out.commands.push(DrawCommand::Save);
            out.commands.push(DrawCommand::Rotate {
                center: rect.center(),
                degrees: a.rotation,
            });
        }

        paint_annotation(a, rect, scale, scene.cache, &mut out);

        if scene.store.is_selected(a.id) {
            paint_selection(a, rect, scene, scene.store.primary_selection() == Some(a.id), &mut out);
        }
        if rotated {
            out.commands.push(DrawCommand::Restore);
        }
    }
    out
}

fn paint_annotation<T>(
    a: &Annotation,
    rect: Rect,
    scale: f64,
    cache: &SignatureCache<T>,
    out: &mut RenderOutput,
) {
    match &a.kind {
        AnnotationKind::Signature { image, border } => {
            match cache.status(a.id, image) {
                CacheStatus::Ready(_) => out.commands.push(DrawCommand::Image { id: a.id, rect }),
                CacheStatus::Failed(_) => {}
                CacheStatus::Pending => out.commands.push(placeholder(rect)),
                CacheStatus::Missing => {
                    out.commands.push(placeholder(rect));
                    out.decode_requests.push(a.id);
                }
            }
            if let Some(border) = border {
                out.commands.push(DrawCommand::Rect {
                    rect,
                    radius: 0.0,
                    fill: None,
                    stroke: Some(Stroke::solid(border.stroke, border.stroke_width * scale)),
                });
            }
        }
        AnnotationKind::Text { content, style } => {
            let size_px = style.font_size * scale;
            let x = match style.align {
                TextAlign::Left => rect.x,
                TextAlign::Center => rect.center().x,
                TextAlign::Right => rect.right(),
            };
            out.commands.push(DrawCommand::Text {
                lines: content.lines().map(str::to_string).collect(),
                origin: Point::new(x, rect.y),
                font: style.css_font(size_px),
                size_px,
                color: style.color,
                align: style.align,
                decoration: style.decoration,
            });
        }
        AnnotationKind::FormField {
            field_type,
            label,
            required,
            checked,
            style,
            ..
        } => {
            out.commands.push(DrawCommand::Rect {
                rect,
                radius: style.border_radius * scale,
                fill: style.fill,
                stroke: Some(Stroke::solid(style.border, (style.border_width * scale).max(1.0))),
            });
            match field_type {
                FieldType::Checkbox => {
                    if *checked {
                        out.commands.push(DrawCommand::Polyline {
                            points: checkmark(rect),
                            stroke: Stroke::solid(style.border, (rect.width * 0.12).max(1.5)),
                        });
                    }
                }
                FieldType::TextField | FieldType::SignatureField => {
                    let size_px = (rect.height * 0.4).clamp(8.0, 16.0);
                    let pad = rect.height * 0.2;
                    if matches!(field_type, FieldType::SignatureField) {
                        let base_y = rect.bottom() - pad;
                        out.commands.push(DrawCommand::Line {
                            from: Point::new(rect.x + pad, base_y),
                            to: Point::new(rect.right() - pad, base_y),
                            stroke: Stroke::solid(LABEL_COLOR, 1.0),
                        });
                    }
                    out.commands.push(DrawCommand::Text {
                        lines: vec![label.clone()],
                        origin: Point::new(rect.x + pad, rect.y + pad),
                        font: format!("normal normal {:.2}px Helvetica", size_px),
                        size_px,
                        color: LABEL_COLOR,
                        align: TextAlign::Left,
                        decoration: TextDecoration::None,
                    });
                }
            }
            if *required {
                out.commands.push(DrawCommand::Ellipse {
                    rect: Rect::new(rect.right() - 5.0, rect.y - 1.0, 6.0, 6.0),
                    fill: Some(REQUIRED_MARK),
                    stroke: None,
                });
            }
        }
        AnnotationKind::Shape { shape, style } => {
            let stroke = Some(Stroke::solid(style.stroke, style.stroke_width * scale));
            let cmd = match shape {
                ShapeKind::Ellipse => DrawCommand::Ellipse {
                    rect,
                    fill: style.fill,
                    stroke,
                },
                ShapeKind::Rectangle | ShapeKind::RoundedRectangle => DrawCommand::Rect {
                    rect,
                    radius: if matches!(shape, ShapeKind::RoundedRectangle) {
                        style.border_radius * scale
                    } else {
                        0.0
                    },
                    fill: style.fill,
                    stroke,
                },
            };
            out.commands.push(cmd);
        }
        AnnotationKind::Line { style } => {
            let (from, to) = line_endpoints(rect);
            out.commands.push(DrawCommand::Line {
                from,
                to,
                stroke: Stroke::solid(style.stroke, style.stroke_width * scale),
            });
        }
    }
}

fn paint_selection<T>(
    a: &Annotation,
    rect: Rect,
    scene: &OverlayScene<'_, T>,
    primary: bool,
    out: &mut RenderOutput,
) {
    let color = scene.config.selection_color;
    let width = scene.config.selection_width;
    let outline = if a.is_line() {
        Rect::new(rect.x, rect.center().y, rect.width, 0.0).inflate(width + 2.0)
    } else {
        rect.inflate(width)
    };
    out.commands.push(DrawCommand::Rect {
        rect: outline,
        radius: 0.0,
        fill: None,
        stroke: Some(if a.locked {
            Stroke::dashed(color, width)
        } else {
            Stroke::solid(color, width)
        }),
    });

    if primary && a.is_resizable() {
        for handle in ResizeHandle::for_annotation(a) {
            out.commands.push(DrawCommand::Rect {
                rect: handle.rect(rect, scene.handle_size),
                radius: 0.0,
                fill: Some(scene.config.handle_fill),
                stroke: Some(Stroke::solid(color, 1.0)),
            });
        }
    }
}

fn placeholder(rect: Rect) -> DrawCommand {
    DrawCommand::Rect {
        rect,
        radius: 0.0,
        fill: None,
        stroke: Some(Stroke::dashed(PLACEHOLDER, 1.0)),
    }
}

/// A line annotation is a horizontal segment through its box's vertical center
pub fn line_endpoints(rect: Rect) -> (Point, Point) {
    let y = rect.center().y;
    (Point::new(rect.x, y), Point::new(rect.right(), y))
}

fn checkmark(rect: Rect) -> Vec<Point> {
    vec![
        Point::new(rect.x + rect.width * 0.2, rect.y + rect.height * 0.55),
        Point::new(rect.x + rect.width * 0.42, rect.y + rect.height * 0.75),
        Point::new(rect.x + rect.width * 0.8, rect.y + rect.height * 0.28),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{
        FieldSize, LineStyle, PendingPlacement, ShapeStyle, SignatureImage, TextStyle,
    };
    use crate::geometry::Size;
    use pretty_assertions::assert_eq;

    fn mapper() -> CoordinateMapper {
        // 800x1000 page shown at half size, container at (100, 50)
        CoordinateMapper::new(Rect::new(100.0, 50.0, 400.0, 500.0), Size::new(800.0, 1000.0))
    }

    fn shape(store: &mut AnnotationStore, x: f64) -> AnnotationId {
        store
            .add(
                1,
                Point::new(x, 100.0),
                Size::new(100.0, 50.0),
                AnnotationKind::Shape {
                    shape: ShapeKind::Rectangle,
                    style: ShapeStyle::default(),
                },
            )
            .unwrap()
    }

    fn render(store: &AnnotationStore, cache: &SignatureCache<()>) -> RenderOutput {
        let m = mapper();
        let config = RenderConfig::default();
        render_overlay(&OverlayScene {
            store,
            page: 1,
            mapper: &m,
            cache,
            config: &config,
            handle_size: 8.0,
            device_pixel_ratio: 2.0,
        })
    }

    fn rects(out: &RenderOutput) -> Vec<Rect> {
        out.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Rect { rect, .. } => Some(*rect),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_surface_layout_backing_store() {
        let layout = SurfaceLayout::new(Rect::new(0.0, 0.0, 400.5, 300.0), 2.0);
        assert_eq!(layout.backing_width(), 801);
        assert_eq!(layout.backing_height(), 600);
        assert_eq!(SurfaceLayout::new(Rect::default(), f64::NAN).device_pixel_ratio, 1.0);
    }

    #[test]
    fn test_commands_are_canvas_local_and_scaled() {
        let mut store = AnnotationStore::new();
        shape(&mut store, 200.0);
        let out = render(&store, &SignatureCache::new());

        assert_eq!(
            out.commands[0],
            DrawCommand::Begin {
                scale: 2.0,
                width: 400.0,
                height: 500.0
            }
        );
        assert_eq!(rects(&out), vec![Rect::new(100.0, 50.0, 50.0, 25.0)]);
    }

    #[test]
    fn test_paint_order_follows_z() {
        let mut store = AnnotationStore::new();
        let a = shape(&mut store, 0.0);
        shape(&mut store, 200.0);
        store.bring_to_front(a);
        let out = render(&store, &SignatureCache::new());
        let r = rects(&out);
        // `a` now paints last
        assert_eq!(r.last().unwrap().x, 0.0);
    }

    #[test]
    fn test_hidden_not_painted() {
        let mut store = AnnotationStore::new();
        let a = shape(&mut store, 0.0);
        store
            .update(
                a,
                &crate::model::AnnotationPatch {
                    hidden: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let out = render(&store, &SignatureCache::new());
        assert_eq!(out.commands.len(), 1);
    }

    #[test]
    fn test_selection_border_and_handles() {
        let mut store = AnnotationStore::new();
        let a = shape(&mut store, 0.0);
        store.select(a);
        let out = render(&store, &SignatureCache::new());
        // shape + outline + 8 handles
        assert_eq!(rects(&out).len(), 10);

        // Locked: outline but no handles
        store
            .update(
                a,
                &crate::model::AnnotationPatch {
                    locked: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let out = render(&store, &SignatureCache::new());
        assert_eq!(rects(&out).len(), 2);
    }

    #[test]
    fn test_line_has_two_handles() {
        let mut store = AnnotationStore::new();
        let id = store
            .add(
                1,
                Point::new(0.0, 0.0),
                Size::new(200.0, 10.0),
                AnnotationKind::Line {
                    style: LineStyle::default(),
                },
            )
            .unwrap();
        store.select(id);
        let out = render(&store, &SignatureCache::new());
        // outline + w/e handles
        assert_eq!(rects(&out).len(), 3);
        assert!(out.commands.iter().any(|c| matches!(
            c,
            DrawCommand::Line { from, to, .. } if from.y == to.y && to.x - from.x == 100.0
        )));
    }

    #[test]
    fn test_signature_decode_states() {
        let mut store = AnnotationStore::new();
        let image = SignatureImage::DataUrl("data:image/png;base64,AAAA".into());
        let id = store
            .add(
                1,
                Point::new(0.0, 0.0),
                Size::new(200.0, 80.0),
                AnnotationKind::Signature {
                    image: image.clone(),
                    border: None,
                },
            )
            .unwrap();

        let mut cache: SignatureCache<()> = SignatureCache::new();
        let out = render(&store, &cache);
        assert_eq!(out.decode_requests, vec![id]);

        let fp = cache.begin_decode(id, &image).unwrap();
        let out = render(&store, &cache);
        assert!(out.decode_requests.is_empty());

        cache.complete(id, fp, Ok(()));
        let out = render(&store, &cache);
        assert!(out
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::Image { id: i, .. } if *i == id)));

        // Failed decode: nothing drawn, annotation kept
        let mut failed: SignatureCache<()> = SignatureCache::new();
        let fp = failed.begin_decode(id, &image).unwrap();
        failed.complete(id, fp, Err("broken".into()));
        let out = render(&store, &failed);
        assert_eq!(out.commands.len(), 1);
        assert!(store.get(id).is_some());
    }

    #[test]
    fn test_text_lines_and_font_scale() {
        let mut store = AnnotationStore::new();
        store
            .add(
                1,
                Point::new(0.0, 0.0),
                Size::new(200.0, 80.0),
                AnnotationKind::Text {
                    content: "Line one\nLine two".into(),
                    style: TextStyle {
                        font_size: 20.0,
                        ..TextStyle::default()
                    },
                },
            )
            .unwrap();
        let out = render(&store, &SignatureCache::new());
        match &out.commands[1] {
            DrawCommand::Text { lines, size_px, .. } => {
                assert_eq!(lines.len(), 2);
                assert_eq!(*size_px, 10.0);
            }
            other => panic!("Expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_checked_checkbox_draws_mark() {
        use crate::annotation::FieldType;
        let mut store = AnnotationStore::new();
        let draft = PendingPlacement::form_field(FieldType::Checkbox, "Agree", false, FieldSize::Large);
        let id = store.add(1, Point::default(), draft.size, draft.kind).unwrap();
        let out = render(&store, &SignatureCache::new());
        assert!(!out.commands.iter().any(|c| matches!(c, DrawCommand::Polyline { .. })));

        store
            .update(
                id,
                &crate::model::AnnotationPatch {
                    checked: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let out = render(&store, &SignatureCache::new());
        assert!(out.commands.iter().any(|c| matches!(c, DrawCommand::Polyline { .. })));
    }

    #[test]
    fn test_not_ready_mapper_draws_nothing() {
        let mut store = AnnotationStore::new();
        shape(&mut store, 0.0);
        let m = CoordinateMapper::new(Rect::default(), Size::new(800.0, 1000.0));
        let config = RenderConfig::default();
        let cache: SignatureCache<()> = SignatureCache::new();
        let out = render_overlay(&OverlayScene {
            store: &store,
            page: 1,
            mapper: &m,
            cache: &cache,
            config: &config,
            handle_size: 8.0,
            device_pixel_ratio: 1.0,
        });
        assert_eq!(out.commands.len(), 1);
    }
}
