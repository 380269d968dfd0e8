//! InkSign core: overlay engine for PDF annotation and e-signing
//!
//! Page rasters come from an external rasterizer. This crate maps between
//! raster pixels and the letterboxed on-screen page, keeps the annotation
//! model, turns pointer input into edits and produces overlay display lists.
//! Compositing back into a PDF lives in `inksign-export`.

pub mod annotation;
pub mod cache;
pub mod config;
pub mod coords;
pub mod document;
pub mod editor;
pub mod error;
pub mod geometry;
pub mod interaction;
pub mod model;
pub mod render;
pub mod schedule;

pub use annotation::{
    field_footprint, Annotation, AnnotationCategory, AnnotationId, AnnotationKind, Color,
    FieldSize, FieldStyle, FieldType, FontStyle, FontWeight, LineStyle, PendingPlacement,
    ShapeKind, ShapeStyle, SignatureImage, TextAlign, TextDecoration, TextStyle,
};
pub use cache::{CacheStatus, Fingerprint, SignatureCache};
pub use config::{EditorConfig, ExportConfig, ExportPolicy, PagePreset};
pub use coords::{ContainFit, CoordinateMapper};
pub use document::{
    load_pages, DocumentSession, LoadReport, PageBitmap, PageContent, PageImage, PageSlot,
    RasterError, Rasterizer, RenderedPage, ViewerMode,
};
pub use editor::{Editor, Exporter};
pub use error::EditorError;
pub use geometry::{Point, Rect, Size};
pub use interaction::{Action, Cursor, InteractionController, Key, Modifiers, PageView, ResizeHandle, Tool};
pub use model::{AnnotationPatch, AnnotationStore, StylePatch};
pub use render::{render_overlay, DrawCommand, OverlayScene, RenderOutput, Stroke, SurfaceLayout};
pub use schedule::{RedrawReason, RedrawReasons, RedrawScheduler, ScheduleRequest};
