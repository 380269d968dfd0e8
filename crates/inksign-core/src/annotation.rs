//! Annotation data model
//!
//! Every placed object is an [`Annotation`]: common geometry and flags plus a
//! tagged [`AnnotationKind`] carrying only the style fields its variant uses.
//! Geometry is always in image space of the page it belongs to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EditorError;
use crate::geometry::{Point, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// RGBA color, serialized as `#RRGGBB` or `#RRGGBBAA`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const SELECTION: Color = Color::rgb(0x25, 0x63, 0xeb);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Components in the 0-1 range, as PDF color operators expect
    pub fn to_unit_rgb(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }

    /// CSS color string for canvas fill/stroke styles
    pub fn to_css(self) -> String {
        if self.a == 255 {
            format!("rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            format!(
                "rgba({}, {}, {}, {:.3})",
                self.r,
                self.g,
                self.b,
                self.a as f64 / 255.0
            )
        }
    }
}

impl FromStr for Color {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(EditorError::InvalidStyle(format!("Invalid color: {}", s)));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| EditorError::InvalidStyle(format!("Invalid color: {}", s)))
        };
        match hex.len() {
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color::rgba(channel(0)?, channel(2)?, channel(4)?, channel(6)?)),
            _ => Err(EditorError::InvalidStyle(format!("Invalid color: {}", s))),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = EditorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        if c.a == 255 {
            format!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", c.r, c.g, c.b, c.a)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDecoration {
    #[default]
    None,
    Underline,
    Strikethrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStyle {
    pub font_family: String,
    pub font_size: f64,
    #[serde(default)]
    pub font_weight: FontWeight,
    #[serde(default)]
    pub font_style: FontStyle,
    #[serde(default)]
    pub decoration: TextDecoration,
    pub color: Color,
    #[serde(default)]
    pub align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_family: "Helvetica".to_string(),
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            decoration: TextDecoration::None,
            color: Color::BLACK,
            align: TextAlign::Left,
        }
    }
}

impl TextStyle {
    /// CSS `font` shorthand at the given pixel size
    pub fn css_font(&self, size_px: f64) -> String {
        let style = match self.font_style {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
        };
        let weight = match self.font_weight {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        };
        format!("{} {} {:.2}px {}", style, weight, size_px, self.font_family)
    }

    fn validate(&self) -> Result<(), EditorError> {
        if self.font_family.trim().is_empty() {
            return Err(EditorError::InvalidStyle("Font family must not be empty".into()));
        }
        positive("font size", self.font_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
    RoundedRectangle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeStyle {
    #[serde(default)]
    pub fill: Option<Color>,
    pub stroke: Color,
    pub stroke_width: f64,
    #[serde(default)]
    pub border_radius: f64,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: Color::BLACK,
            stroke_width: 2.0,
            border_radius: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    pub stroke: Color,
    pub stroke_width: f64,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            stroke: Color::BLACK,
            stroke_width: 2.0,
        }
    }
}

/// Encoded signature image, as produced by the signature pad
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "snake_case")]
pub enum SignatureImage {
    /// `data:image/png;base64,...`
    DataUrl(String),
    /// Raw PNG bytes
    Png(Vec<u8>),
}

impl SignatureImage {
    /// Bytes that identify this payload for cache invalidation
    pub fn fingerprint_bytes(&self) -> &[u8] {
        match self {
            SignatureImage::DataUrl(url) => url.as_bytes(),
            SignatureImage::Png(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprint_bytes().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Checkbox,
    TextField,
    SignatureField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSize {
    Small,
    #[default]
    Medium,
    Large,
}

/// Fixed on-page footprint for a form field of the given size class
pub fn field_footprint(field_type: FieldType, size: FieldSize) -> Size {
    match (field_type, size) {
        (FieldType::Checkbox, FieldSize::Small) => Size::new(16.0, 16.0),
        (FieldType::Checkbox, FieldSize::Medium) => Size::new(20.0, 20.0),
        (FieldType::Checkbox, FieldSize::Large) => Size::new(24.0, 24.0),
        (FieldType::TextField, FieldSize::Small) => Size::new(120.0, 24.0),
        (FieldType::TextField, FieldSize::Medium) => Size::new(180.0, 30.0),
        (FieldType::TextField, FieldSize::Large) => Size::new(240.0, 36.0),
        (FieldType::SignatureField, FieldSize::Small) => Size::new(150.0, 50.0),
        (FieldType::SignatureField, FieldSize::Medium) => Size::new(200.0, 60.0),
        (FieldType::SignatureField, FieldSize::Large) => Size::new(260.0, 80.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStyle {
    pub border: Color,
    pub border_width: f64,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default)]
    pub border_radius: f64,
}

impl Default for FieldStyle {
    fn default() -> Self {
        Self {
            border: Color::rgb(0x64, 0x74, 0x8b),
            border_width: 1.0,
            fill: Some(Color::rgba(0xdb, 0xea, 0xfe, 0x80)),
            border_radius: 2.0,
        }
    }
}

/// Variant payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationKind {
    Signature {
        image: SignatureImage,
        #[serde(default)]
        border: Option<LineStyle>,
    },
    Text {
        content: String,
        style: TextStyle,
    },
    FormField {
        field_type: FieldType,
        label: String,
        #[serde(default)]
        required: bool,
        #[serde(default)]
        size_class: FieldSize,
        #[serde(default)]
        checked: bool,
        #[serde(default)]
        style: FieldStyle,
    },
    Shape {
        shape: ShapeKind,
        style: ShapeStyle,
    },
    Line {
        style: LineStyle,
    },
}

/// The collection an annotation belongs to, in hit-test priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationCategory {
    Signature,
    Text,
    FormField,
    Shape,
    Line,
}

impl AnnotationCategory {
    pub const HIT_ORDER: [AnnotationCategory; 5] = [
        AnnotationCategory::Signature,
        AnnotationCategory::Text,
        AnnotationCategory::FormField,
        AnnotationCategory::Shape,
        AnnotationCategory::Line,
    ];
}

impl AnnotationKind {
    pub fn category(&self) -> AnnotationCategory {
        match self {
            AnnotationKind::Signature { .. } => AnnotationCategory::Signature,
            AnnotationKind::Text { .. } => AnnotationCategory::Text,
            AnnotationKind::FormField { .. } => AnnotationCategory::FormField,
            AnnotationKind::Shape { .. } => AnnotationCategory::Shape,
            AnnotationKind::Line { .. } => AnnotationCategory::Line,
        }
    }

    /// Reject styles that could not be drawn
    pub fn validate(&self) -> Result<(), EditorError> {
        match self {
            AnnotationKind::Signature { image, border } => {
                if image.is_empty() {
                    return Err(EditorError::InvalidStyle(
                        "Signature image must not be empty".into(),
                    ));
                }
                if let Some(border) = border {
                    positive("border width", border.stroke_width)?;
                }
                Ok(())
            }
            AnnotationKind::Text { style, .. } => style.validate(),
            AnnotationKind::FormField { style, .. } => {
                non_negative("border width", style.border_width)?;
                non_negative("border radius", style.border_radius)
            }
            AnnotationKind::Shape { style, .. } => {
                positive("stroke width", style.stroke_width)?;
                non_negative("border radius", style.border_radius)
            }
            AnnotationKind::Line { style } => positive("stroke width", style.stroke_width),
        }
    }
}

fn positive(what: &str, value: f64) -> Result<(), EditorError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(EditorError::InvalidStyle(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}

fn non_negative(what: &str, value: f64) -> Result<(), EditorError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EditorError::InvalidStyle(format!(
            "{} must not be negative, got {}",
            what, value
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub page: u32,
    pub position: Point,
    pub size: Size,
    pub z_index: i64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub hidden: bool,
    pub kind: AnnotationKind,
}

impl Annotation {
    pub fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub fn category(&self) -> AnnotationCategory {
        self.kind.category()
    }

    /// Form fields keep the footprint of their size class
    pub fn is_resizable(&self) -> bool {
        !self.locked && !matches!(self.kind, AnnotationKind::FormField { .. })
    }

    pub fn is_line(&self) -> bool {
        matches!(self.kind, AnnotationKind::Line { .. })
    }
}

/// A tool-created object waiting for its placement click
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPlacement {
    pub size: Size,
    pub kind: AnnotationKind,
}

impl PendingPlacement {
    pub fn new(size: Size, kind: AnnotationKind) -> Result<Self, EditorError> {
        if size.is_empty() {
            return Err(EditorError::InvalidStyle(format!(
                "Placement size must be positive, got {}x{}",
                size.width, size.height
            )));
        }
        kind.validate()?;
        Ok(Self { size, kind })
    }

    /// Draft a form field sized by its size class
    pub fn form_field(
        field_type: FieldType,
        label: impl Into<String>,
        required: bool,
        size_class: FieldSize,
    ) -> Self {
        Self {
            size: field_footprint(field_type, size_class),
            kind: AnnotationKind::FormField {
                field_type,
                label: label.into(),
                required,
                size_class,
                checked: false,
                style: FieldStyle::default(),
            },
        }
    }
}
