//! Flattening one page: page raster plus every visible annotation
//!
//! Everything with a bitmap representation (signatures, shapes, lines, form
//! field chrome) is painted into the raster in image space. Text is kept
//! aside as [`TextRun`]s so it lands in the PDF as real text.

use inksign_core::{
    Annotation, AnnotationKind, Color, FieldType, PageContent, PageSlot, Point, Rect, ShapeKind,
    TextAlign, TextDecoration, TextStyle,
};
use tracing::{debug, warn};

use crate::error::ExportError;
use crate::fonts::{pdf_font_name, text_width};
use crate::raster::{in_ellipse, in_rounded_rect, rgba, segment_distance, Bitmap};

/// Line height as a multiple of font size, same as the on-screen overlay
const LINE_HEIGHT: f64 = 1.2;
/// Baseline offset from the top of a line box, as a multiple of font size
const ASCENT: f64 = 0.8;

const LABEL_COLOR: Color = Color::rgb(0x47, 0x55, 0x69);
const REQUIRED_MARK: Color = Color::rgb(0xdc, 0x26, 0x26);

/// One line of text, positioned in image space
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    /// Left end of the baseline
    pub origin: Point,
    pub size: f64,
    pub font: &'static str,
    pub color: Color,
    pub decoration: TextDecoration,
    /// Estimated advance, for decoration lines
    pub width: f64,
    /// Clockwise degrees about `pivot`
    pub rotation: f64,
    pub pivot: Point,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedPage {
    pub number: u32,
    pub bitmap: Bitmap,
    pub texts: Vec<TextRun>,
}

/// Flatten `annotations` (already in paint order) onto the page
pub fn compose_page(slot: &PageSlot, annotations: &[&Annotation]) -> Result<ComposedPage, ExportError> {
    let page_error = |reason: String| ExportError::Page {
        page: slot.number,
        reason,
    };

    let mut bitmap = match &slot.content {
        PageContent::Rendered { image } => {
            let bitmap = Bitmap::decode_page(&image.bitmap).map_err(|e| page_error(e.to_string()))?;
            // Annotations live in the recorded pixel space
            if bitmap.width != image.width || bitmap.height != image.height {
                warn!(
                    page = slot.number,
                    "Raster is {}x{}, session recorded {}x{}; rescaling",
                    bitmap.width,
                    bitmap.height,
                    image.width,
                    image.height
                );
                bitmap.resample(image.width, image.height)
            } else {
                bitmap
            }
        }
        PageContent::Blank { size } => {
            Bitmap::white(size.width.round().max(1.0) as u32, size.height.round().max(1.0) as u32)
        }
        PageContent::Loading { .. } => return Err(page_error("page image is not loaded".into())),
        PageContent::Unavailable { reason } => return Err(page_error(reason.clone())),
    };

    let mut texts = Vec::new();
    for a in annotations.iter().filter(|a| a.page == slot.number && !a.hidden) {
        paint(&mut bitmap, a, &mut texts).map_err(|e| page_error(format!("{}: {}", a.id, e)))?;
    }

    debug!(
        page = slot.number,
        annotations = annotations.len(),
        texts = texts.len(),
        "Composed page"
    );
    Ok(ComposedPage {
        number: slot.number,
        bitmap,
        texts,
    })
}

fn paint(bitmap: &mut Bitmap, a: &Annotation, texts: &mut Vec<TextRun>) -> Result<(), ExportError> {
    let rect = a.bounds();
    let rot = a.rotation;

    match &a.kind {
        AnnotationKind::Signature { image, border } => {
            let sig = Bitmap::decode_signature(image)?;
            let (w, h) = (rect.width, rect.height);
            bitmap.paint(rect, rot, |x, y| Some(sig.sample(x, y, w, h)));
            if let Some(border) = border {
                stroke_box(bitmap, rect, rot, 0.0, border.stroke, border.stroke_width);
            }
        }
        AnnotationKind::Text { content, style } => {
            texts.extend(text_runs(content, style, rect, rot));
        }
        AnnotationKind::FormField {
            field_type,
            label,
            required,
            checked,
            style,
            ..
        } => {
            if let Some(fill) = style.fill {
                fill_box(bitmap, rect, rot, style.border_radius, fill);
            }
            stroke_box(bitmap, rect, rot, style.border_radius, style.border, style.border_width.max(1.0));
            match field_type {
                FieldType::Checkbox => {
                    if *checked {
                        let (w, h) = (rect.width, rect.height);
                        let pts = [(0.2 * w, 0.55 * h), (0.42 * w, 0.75 * h), (0.8 * w, 0.28 * h)];
                        let half = (w * 0.12).max(1.5) / 2.0;
                        let color = rgba(style.border);
                        bitmap.paint(rect, rot, |x, y| {
                            let d = segment_distance(x, y, pts[0], pts[1])
                                .min(segment_distance(x, y, pts[1], pts[2]));
                            (d <= half).then_some(color)
                        });
                    }
                }
                FieldType::TextField | FieldType::SignatureField => {
                    let size = (rect.height * 0.4).clamp(8.0, 16.0);
                    let pad = rect.height * 0.2;
                    if *field_type == FieldType::SignatureField {
                        let y = rect.height - pad;
                        let (x0, x1) = (pad, rect.width - pad);
                        let color = rgba(LABEL_COLOR);
                        bitmap.paint(rect, rot, |x, py| {
                            ((py - y).abs() <= 0.5 && x >= x0 && x <= x1).then_some(color)
                        });
                    }
                    let label_style = TextStyle {
                        font_family: "Helvetica".into(),
                        font_size: size,
                        color: LABEL_COLOR,
                        ..TextStyle::default()
                    };
                    let inner = Rect::new(rect.x + pad, rect.y + pad, rect.width - 2.0 * pad, rect.height);
                    let mut runs = text_runs(label, &label_style, inner, 0.0);
                    for run in &mut runs {
                        run.rotation = rot;
                        run.pivot = rect.center();
                    }
                    texts.extend(runs);
                }
            }
            if *required {
                let dot = Rect::new(rect.right() - 5.0, rect.y - 1.0, 6.0, 6.0);
                let color = rgba(REQUIRED_MARK);
                bitmap.paint(dot, 0.0, |x, y| in_ellipse(x, y, 6.0, 6.0, 0.0).then_some(color));
            }
        }
        AnnotationKind::Shape { shape, style } => {
            let radius = match shape {
                ShapeKind::RoundedRectangle => style.border_radius,
                _ => 0.0,
            };
            match shape {
                ShapeKind::Ellipse => {
                    if let Some(fill) = style.fill {
                        let c = rgba(fill);
                        let (w, h) = (rect.width, rect.height);
                        bitmap.paint(rect, rot, |x, y| in_ellipse(x, y, w, h, 0.0).then_some(c));
                    }
                    let half = style.stroke_width / 2.0;
                    let outer = rect.inflate(half);
                    let (w, h) = (rect.width, rect.height);
                    let c = rgba(style.stroke);
                    bitmap.paint(outer, rot, |x, y| {
                        let (x, y) = (x - half, y - half);
                        (in_ellipse(x, y, w, h, -half) && !in_ellipse(x, y, w, h, half)).then_some(c)
                    });
                }
                ShapeKind::Rectangle | ShapeKind::RoundedRectangle => {
                    if let Some(fill) = style.fill {
                        fill_box(bitmap, rect, rot, radius, fill);
                    }
                    stroke_box(bitmap, rect, rot, radius, style.stroke, style.stroke_width);
                }
            }
        }
        AnnotationKind::Line { style } => {
            let half = style.stroke_width / 2.0;
            // Band around the horizontal center line
            let band = Rect::new(rect.x, rect.center().y - half, rect.width, style.stroke_width);
            let c = rgba(style.stroke);
            if rot == 0.0 {
                bitmap.paint(band, 0.0, |_, _| Some(c));
            } else {
                let (w, h) = (rect.width, rect.height);
                bitmap.paint(rect.inflate(half), rot, |x, y| {
                    let d = segment_distance(x - half, y - half, (0.0, h / 2.0), (w, h / 2.0));
                    (d <= half).then_some(c)
                });
            }
        }
    }
    Ok(())
}

fn fill_box(bitmap: &mut Bitmap, rect: Rect, rot: f64, radius: f64, color: Color) {
    let c = rgba(color);
    let (w, h) = (rect.width, rect.height);
    bitmap.paint(rect, rot, |x, y| in_rounded_rect(x, y, w, h, radius, 0.0).then_some(c));
}

/// Stroke centered on the box edge, like a canvas `strokeRect`
fn stroke_box(bitmap: &mut Bitmap, rect: Rect, rot: f64, radius: f64, color: Color, width: f64) {
    if width <= 0.0 {
        return;
    }
    let half = width / 2.0;
    let c = rgba(color);
    let (w, h) = (rect.width, rect.height);
    bitmap.paint(rect.inflate(half), rot, |x, y| {
        let (x, y) = (x - half, y - half);
        (in_rounded_rect(x, y, w, h, radius, -half) && !in_rounded_rect(x, y, w, h, radius, half))
            .then_some(c)
    });
}

fn text_runs(content: &str, style: &TextStyle, rect: Rect, rotation: f64) -> Vec<TextRun> {
    let size = style.font_size;
    let font = pdf_font_name(style);
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.is_empty())
        .map(|(i, line)| {
            let width = text_width(line, style, size);
            let x = match style.align {
                TextAlign::Left => rect.x,
                TextAlign::Center => rect.center().x - width / 2.0,
                TextAlign::Right => rect.right() - width,
            };
            let y = rect.y + i as f64 * size * LINE_HEIGHT + size * ASCENT;
            TextRun {
                text: line.to_string(),
                origin: Point::new(x, y),
                size,
                font,
                color: style.color,
                decoration: style.decoration,
                width,
                rotation,
                pivot: rect.center(),
            }
        })
        .collect()
}

/// Fonts a set of runs needs, deduplicated in first-use order
pub fn fonts_used(runs: &[TextRun]) -> Vec<&'static str> {
    let mut fonts: Vec<&'static str> = Vec::new();
    for run in runs {
        if !fonts.contains(&run.font) {
            fonts.push(run.font);
        }
    }
    fonts
}

#[cfg(test)]
mod tests {
    use super::*;
    use inksign_core::{
        AnnotationId, FieldSize, FieldStyle, LineStyle, PageBitmap, PageImage, ShapeStyle,
        SignatureImage, Size,
    };
    use pretty_assertions::assert_eq;

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data: Vec<u8> = (0..width * height).flat_map(|_| rgba).collect();
            writer.write_image_data(&data).unwrap();
        }
        out
    }

    fn rendered(number: u32, w: u32, h: u32) -> PageSlot {
        PageSlot {
            number,
            content: PageContent::Rendered {
                image: PageImage {
                    page: number,
                    width: w,
                    height: h,
                    bitmap: PageBitmap::Png(png_bytes(w, h, [255, 255, 255, 255])),
                },
            },
        }
    }

    fn annotation(id: u64, rect: Rect, kind: AnnotationKind) -> Annotation {
        Annotation {
            id: AnnotationId(id),
            page: 1,
            position: rect.origin(),
            size: rect.size(),
            z_index: id as i64,
            rotation: 0.0,
            locked: false,
            hidden: false,
            kind,
        }
    }

    #[test]
    fn test_signature_is_painted_into_raster() {
        let slot = rendered(1, 40, 40);
        let sig = annotation(
            1,
            Rect::new(10.0, 10.0, 10.0, 10.0),
            AnnotationKind::Signature {
                image: SignatureImage::Png(png_bytes(2, 2, [0, 0, 255, 255])),
                border: None,
            },
        );
        let page = compose_page(&slot, &[&sig]).unwrap();
        assert_eq!(page.bitmap.pixel(15, 15), [0, 0, 255, 255]);
        assert_eq!(page.bitmap.pixel(5, 5), [255, 255, 255, 255]);
        assert!(page.texts.is_empty());
    }

    #[test]
    fn test_bad_signature_fails_the_page() {
        let slot = rendered(1, 20, 20);
        let sig = annotation(
            7,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            AnnotationKind::Signature {
                image: SignatureImage::DataUrl("data:image/png;base64,AAAA".into()),
                border: None,
            },
        );
        let err = compose_page(&slot, &[&sig]).unwrap_err();
        assert_eq!(err.page(), Some(1));
        assert!(err.to_string().contains("#7"));
    }

    #[test]
    fn test_hidden_annotations_are_skipped() {
        let slot = rendered(1, 20, 20);
        let mut shape = annotation(
            1,
            Rect::new(0.0, 0.0, 20.0, 20.0),
            AnnotationKind::Shape {
                shape: ShapeKind::Rectangle,
                style: ShapeStyle {
                    fill: Some(Color::BLACK),
                    ..ShapeStyle::default()
                },
            },
        );
        shape.hidden = true;
        let page = compose_page(&slot, &[&shape]).unwrap();
        assert_eq!(page.bitmap.pixel(10, 10), [255, 255, 255, 255]);
    }

    #[test]
    fn test_text_becomes_runs_with_alignment() {
        let slot = PageSlot {
            number: 1,
            content: PageContent::Blank {
                size: Size::new(200.0, 200.0),
            },
        };
        let text = annotation(
            1,
            Rect::new(10.0, 20.0, 100.0, 50.0),
            AnnotationKind::Text {
                content: "Hello\nWorld".into(),
                style: TextStyle {
                    font_family: "Courier".into(),
                    font_size: 10.0,
                    align: TextAlign::Right,
                    ..TextStyle::default()
                },
            },
        );
        let page = compose_page(&slot, &[&text]).unwrap();
        assert_eq!(page.bitmap.width, 200);
        assert_eq!(page.texts.len(), 2);
        assert_eq!(page.texts[0].font, "Courier");
        // right aligned: 5 chars * 0.6 * 10 = 30 wide
        assert!((page.texts[0].origin.x - 80.0).abs() < 1e-9);
        assert!((page.texts[0].origin.y - 28.0).abs() < 1e-9);
        assert!((page.texts[1].origin.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_line_and_checkbox() {
        let slot = rendered(1, 60, 60);
        let line = annotation(
            1,
            Rect::new(0.0, 0.0, 60.0, 10.0),
            AnnotationKind::Line {
                style: LineStyle {
                    stroke: Color::BLACK,
                    stroke_width: 2.0,
                },
            },
        );
        let checkbox = annotation(
            2,
            Rect::new(30.0, 30.0, 20.0, 20.0),
            AnnotationKind::FormField {
                field_type: FieldType::Checkbox,
                label: "Agree".into(),
                required: false,
                size_class: FieldSize::Medium,
                checked: true,
                style: FieldStyle {
                    fill: None,
                    ..FieldStyle::default()
                },
            },
        );
        let page = compose_page(&slot, &[&line, &checkbox]).unwrap();
        assert_eq!(page.bitmap.pixel(30, 5), [0, 0, 0, 255]);
        assert_eq!(page.bitmap.pixel(30, 8), [255, 255, 255, 255]);
        // elbow of the checkmark at (0.42, 0.75) of the box
        let elbow = page.bitmap.pixel(38, 45);
        assert!(elbow[0] < 200, "got {:?}", elbow);
        assert!(page.texts.is_empty());
    }

    #[test]
    fn test_unloaded_and_unavailable_pages_fail() {
        let loading = PageSlot {
            number: 3,
            content: PageContent::Loading { size: None },
        };
        assert_eq!(compose_page(&loading, &[]).unwrap_err().page(), Some(3));

        let gone = PageSlot {
            number: 4,
            content: PageContent::Unavailable {
                reason: "worker crashed".into(),
            },
        };
        let err = compose_page(&gone, &[]).unwrap_err();
        assert!(err.to_string().contains("worker crashed"));
    }

    #[test]
    fn test_fonts_used_dedup() {
        let run = |font| TextRun {
            text: "x".into(),
            origin: Point::default(),
            size: 10.0,
            font,
            color: Color::BLACK,
            decoration: TextDecoration::None,
            width: 5.0,
            rotation: 0.0,
            pivot: Point::default(),
        };
        let runs = vec![run("Helvetica"), run("Courier"), run("Helvetica")];
        assert_eq!(fonts_used(&runs), vec!["Helvetica", "Courier"]);
    }

    #[test]
    fn test_mismatched_raster_is_rescaled_to_recorded_size() {
        let mut slot = rendered(1, 80, 100);
        if let PageContent::Rendered { image } = &mut slot.content {
            image.bitmap = PageBitmap::Png(png_bytes(40, 50, [255, 255, 255, 255]));
        }
        let line = annotation(
            3,
            Rect::new(40.0, 80.0, 40.0, 4.0),
            AnnotationKind::Line {
                style: LineStyle::default(),
            },
        );
        let page = compose_page(&slot, &[&line]).unwrap();
        assert_eq!((page.bitmap.width, page.bitmap.height), (80, 100));
        // painted where the session put it, not clipped by the smaller raster
        assert_eq!(page.bitmap.pixel(60, 82), [0, 0, 0, 255]);
        assert_eq!(page.bitmap.pixel(20, 82), [255, 255, 255, 255]);
    }
}
