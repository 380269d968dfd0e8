//! PDF assembly from composed pages
//!
//! Each page raster becomes one DeviceRGB image XObject, fitted with
//! `object-fit: contain` semantics onto the output page and centered. Text
//! runs are drawn on top with base-14 fonts.

use std::collections::BTreeMap;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use inksign_core::{Size, TextDecoration};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use crate::compose::{fonts_used, ComposedPage, TextRun};
use crate::error::ExportError;
use crate::fonts::encode_win_ansi;

/// Where a raster of `image` pixels lands on a page of `page` points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    pub fn contain(image_width: u32, image_height: u32, page: Size) -> Self {
        let (iw, ih) = (image_width.max(1) as f64, image_height.max(1) as f64);
        let scale = (page.width / iw).min(page.height / ih);
        let (width, height) = (iw * scale, ih * scale);
        Self {
            scale,
            offset_x: (page.width - width) / 2.0,
            offset_y: (page.height - height) / 2.0,
            width,
            height,
        }
    }

    /// Image-space point (y down) to PDF user space (y up)
    pub fn to_pdf(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.offset_x + x * self.scale,
            self.offset_y + self.height - y * self.scale,
        )
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

fn translate(x: f64, y: f64) -> Vec<Object> {
    vec![real(1.0), real(0.0), real(0.0), real(1.0), real(x), real(y)]
}

fn op(name: &str, operands: Vec<Object>) -> Operation {
    Operation::new(name, operands)
}

/// Build the output document
pub fn assemble(pages: &[ComposedPage], page_size: Size) -> Result<Vec<u8>, ExportError> {
    if pages.is_empty() {
        return Err(ExportError::NoPages);
    }

    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut font_ids: BTreeMap<&'static str, ObjectId> = BTreeMap::new();
    let mut kids = Vec::with_capacity(pages.len());

    for page in pages {
        let placement = Placement::contain(page.bitmap.width, page.bitmap.height, page_size);

        let image_id = doc.add_object(image_xobject(page)?);

        let fonts = fonts_used(&page.texts);
        let mut font_resources = Dictionary::new();
        for (i, name) in fonts.iter().enumerate() {
            let id = *font_ids.entry(*name).or_insert_with(|| {
                doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => *name,
                    "Encoding" => "WinAnsiEncoding",
                })
            });
            font_resources.set(format!("F{}", i + 1), Object::Reference(id));
        }

        let content = page_content(page, &placement, &fonts);
        let content_bytes = content.encode()?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

        let resources = dictionary! {
            "XObject" => dictionary! { "Im0" => Object::Reference(image_id) },
            "Font" => font_resources,
        };

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                real(page_size.width),
                real(page_size.height),
            ],
            "Resources" => resources,
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page_id));
        debug!(page = page.number, texts = page.texts.len(), "Added page to output");
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    Ok(buffer)
}

fn image_xobject(page: &ComposedPage) -> Result<Stream, ExportError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&page.bitmap.to_rgb())
        .and_then(|_| encoder.flush())
        .map_err(|e| ExportError::Pdf(e.to_string()))?;
    let data = encoder.finish().map_err(|e| ExportError::Pdf(e.to_string()))?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => page.bitmap.width as i64,
        "Height" => page.bitmap.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(Stream::new(dict, data).with_compression(false))
}

fn page_content(page: &ComposedPage, placement: &Placement, fonts: &[&'static str]) -> Content {
    let mut ops = vec![
        op("q", vec![]),
        op(
            "cm",
            vec![
                real(placement.width),
                Object::Integer(0),
                Object::Integer(0),
                real(placement.height),
                real(placement.offset_x),
                real(placement.offset_y),
            ],
        ),
        op("Do", vec![Object::Name(b"Im0".to_vec())]),
        op("Q", vec![]),
    ];

    for run in &page.texts {
        let font_index = fonts.iter().position(|f| *f == run.font).unwrap_or(0) + 1;
        text_ops(run, placement, font_index, &mut ops);
    }
    Content { operations: ops }
}

fn text_ops(run: &TextRun, placement: &Placement, font_index: usize, ops: &mut Vec<Operation>) {
    let (x, y) = placement.to_pdf(run.origin.x, run.origin.y);
    let size = run.size * placement.scale;
    let width = run.width * placement.scale;
    let (r, g, b) = run.color.to_unit_rgb();

    ops.push(op("q", vec![]));
    if run.rotation != 0.0 {
        // Clockwise on screen is negative in y-up space
        let (px, py) = placement.to_pdf(run.pivot.x, run.pivot.y);
        let (sin, cos) = (-run.rotation.to_radians()).sin_cos();
        ops.push(op("cm", translate(px, py)));
        ops.push(op(
            "cm",
            vec![real(cos), real(sin), real(-sin), real(cos), real(0.0), real(0.0)],
        ));
        ops.push(op("cm", translate(-px, -py)));
    }
    ops.push(op("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]));
    ops.push(op("BT", vec![]));
    ops.push(op(
        "Tf",
        vec![Object::Name(format!("F{}", font_index).into_bytes()), real(size)],
    ));
    ops.push(op("Td", vec![real(x), real(y)]));
    ops.push(op(
        "Tj",
        vec![Object::String(
            encode_win_ansi(&run.text),
            lopdf::StringFormat::Literal,
        )],
    ));
    ops.push(op("ET", vec![]));

    let bar = match run.decoration {
        TextDecoration::None => None,
        TextDecoration::Underline => Some(y - size * 0.12),
        TextDecoration::Strikethrough => Some(y + size * 0.28),
    };
    if let Some(bar_y) = bar {
        let thickness = (size * 0.06).max(0.5);
        ops.push(op("re", vec![real(x), real(bar_y), real(width), real(thickness)]));
        ops.push(op("f", vec![]));
    }
    ops.push(op("Q", vec![]));
}
