//! Editor configuration
//!
//! Every field has a default so a host can pass `{}` or only the keys it
//! cares about.

use serde::{Deserialize, Serialize};

use crate::annotation::Color;
use crate::error::EditorError;
use crate::geometry::Size;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub interaction: InteractionConfig,
    pub render: RenderConfig,
    pub raster: RasterConfig,
    pub export: ExportConfig,
}

impl EditorConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        let config: EditorConfig =
            serde_json::from_str(json).map_err(|e| EditorError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), EditorError> {
        let i = &self.interaction;
        if !(i.min_dimension.is_finite() && i.min_dimension > 0.0) {
            return Err(EditorError::Config(format!(
                "min_dimension must be positive, got {}",
                i.min_dimension
            )));
        }
        if !(i.handle_size.is_finite() && i.handle_size > 0.0) {
            return Err(EditorError::Config(format!(
                "handle_size must be positive, got {}",
                i.handle_size
            )));
        }
        if !(i.double_click_distance.is_finite() && i.double_click_distance >= 0.0) {
            return Err(EditorError::Config(
                "double_click_distance must not be negative".into(),
            ));
        }
        if self.raster.batch_size == 0 {
            return Err(EditorError::Config("raster batch_size must be at least 1".into()));
        }
        if !(self.raster.scale.is_finite() && self.raster.scale > 0.0) {
            return Err(EditorError::Config(format!(
                "raster scale must be positive, got {}",
                self.raster.scale
            )));
        }
        if self.export.page_size().is_empty() {
            return Err(EditorError::Config("export page size must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Max time between two clicks on the same text label to count as a
    /// double click
    pub double_click_ms: f64,
    /// Max pointer travel (screen px) between the two clicks
    pub double_click_distance: f64,
    /// Side of a square resize handle in screen px
    pub handle_size: f64,
    /// Floor for any resized dimension, image-space units
    pub min_dimension: f64,
    /// Offset applied to duplicates, image-space units
    pub duplicate_offset: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            double_click_ms: 300.0,
            double_click_distance: 6.0,
            handle_size: 8.0,
            min_dimension: 10.0,
            duplicate_offset: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Trailing debounce for bursts of redraw requests
    pub debounce_ms: f64,
    pub selection_color: Color,
    pub selection_width: f64,
    pub handle_fill: Color,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 16.0,
            selection_color: Color::SELECTION,
            selection_width: 2.0,
            handle_fill: Color::WHITE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Pages requested from the rasterizer per batch
    pub batch_size: usize,
    /// Render scale handed to the rasterizer (1.0 = 72 dpi)
    pub scale: f64,
    /// Per-page render budget; a render still pending after it fails as a
    /// timeout. Zero disables the limit.
    pub timeout_ms: u32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            scale: 2.0,
            timeout_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPolicy {
    /// Any failing page aborts the whole export
    #[default]
    Strict,
    /// Failing pages are left out and reported
    SkipFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PagePreset {
    #[default]
    Letter,
    A4,
    Legal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub page: PagePreset,
    /// Overrides `page` when set, in PDF points
    pub custom_page_size: Option<Size>,
    pub policy: ExportPolicy,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page: PagePreset::Letter,
            custom_page_size: None,
            policy: ExportPolicy::Strict,
        }
    }
}

impl ExportConfig {
    /// Output page size in PDF points
    pub fn page_size(&self) -> Size {
        if let Some(size) = self.custom_page_size {
            return size;
        }
        match self.page {
            PagePreset::Letter => Size::new(612.0, 792.0),
            PagePreset::A4 => Size::new(595.0, 842.0),
            PagePreset::Legal => Size::new(612.0, 1008.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config = EditorConfig::from_json("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.interaction.min_dimension, 10.0);
        assert_eq!(config.render.debounce_ms, 16.0);
        assert_eq!(config.export.page_size(), Size::new(612.0, 792.0));
    }

    #[test]
    fn test_partial_override() {
        let config = EditorConfig::from_json(
            r#"{"interaction":{"double_click_ms":450},"export":{"page":"a4","policy":"skip_failed"}}"#,
        )
        .unwrap();
        assert_eq!(config.interaction.double_click_ms, 450.0);
        assert_eq!(config.interaction.handle_size, 8.0);
        assert_eq!(config.export.page_size(), Size::new(595.0, 842.0));
        assert_eq!(config.export.policy, ExportPolicy::SkipFailed);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EditorConfig::from_json(r#"{"raster":{"batch_size":0}}"#).is_err());
        assert!(EditorConfig::from_json(r#"{"interaction":{"min_dimension":-1}}"#).is_err());
        assert!(EditorConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = EditorConfig::default();
        config.render.selection_color = Color::rgb(1, 2, 3);
        let restored = EditorConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
