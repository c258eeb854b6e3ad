// THEORY:
// Every tunable constant of both pipelines lives here as an explicit value that
// is handed to each entry point. Nothing reads ambient or static state.
//
// The struct tree mirrors the pipeline stages (aligner, overlay, registrar,
// change detector, batch). Every struct derives `Deserialize` with
// `#[serde(default)]`, so a partial JSON file only overrides the fields it
// names and the rest keep the documented defaults.

use crate::core_modules::colormap::Colormap;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the multi-scale template search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Inclusive lower bound of the scale search.
    pub scale_min: f64,
    /// Exclusive upper bound of the scale search.
    pub scale_max: f64,
    pub scale_step: f64,
    /// Fraction of the scaled skeleton's width and height kept as the template.
    pub template_fraction: f64,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.90,
            scale_max: 1.11,
            scale_step: 0.02,
            template_fraction: 0.5,
        }
    }
}

/// Parameters of the masked thermal overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Weight of the primary (RGB) raster.
    pub alpha: f64,
    /// Weight of the colorized secondary raster.
    pub beta: f64,
    pub colormap: Colormap,
    /// Secondary values strictly above this count as "data present".
    pub presence_threshold: u8,
    pub clahe_clip_limit: f64,
    pub clahe_tiles: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.4,
            colormap: Colormap::Jet,
            presence_threshold: 5,
            clahe_clip_limit: 4.0,
            clahe_tiles: 8,
        }
    }
}

/// Parameters of the keypoint/homography registrar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    pub max_features: usize,
    /// Fraction of distance-sorted matches kept for estimation.
    pub keep_fraction: f64,
    pub min_matches: usize,
    /// Maximum reprojection error, in pixels, for a RANSAC inlier.
    pub ransac_threshold: f64,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            max_features: 5000,
            keep_fraction: 0.15,
            min_matches: 4,
            ransac_threshold: 3.0,
        }
    }
}

/// Parameters of the before/after change detector and its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeConfig {
    /// Taps of the pre-difference Gaussian blur on each axis (odd).
    pub blur_kernel_size: u32,
    /// Weight of the grayscale absolute difference.
    pub gray_weight: f64,
    /// Weight of the per-channel absolute difference.
    pub color_weight: f64,
    pub fixed_threshold: u8,
    /// Neighbourhood size of the Gaussian adaptive threshold (odd).
    pub adaptive_block_size: u32,
    pub adaptive_offset: i32,
    /// Contours with area at or below this are discarded.
    pub min_region_area: f64,
    pub crop_margin: u32,
    pub medium_area: f64,
    pub large_area: f64,
    /// Opacity of the translucent region fill.
    pub fill_alpha: f64,
}

impl Default for ChangeConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 5,
            gray_weight: 0.6,
            color_weight: 0.4,
            fixed_threshold: 25,
            adaptive_block_size: 11,
            adaptive_offset: 2,
            min_region_area: 200.0,
            crop_margin: 10,
            medium_area: 800.0,
            large_area: 2000.0,
            fill_alpha: 0.3,
        }
    }
}

/// File naming conventions and pool sizing for batch runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker count; `None` means one per logical CPU.
    pub workers: Option<usize>,
    pub thermal_primary_suffix: String,
    pub thermal_secondary_suffix: String,
    pub thermal_output_suffix: String,
    pub change_extension: String,
    /// Marker appended to the base name of the "after" image.
    pub change_after_marker: String,
    pub change_output_suffix: String,
    pub crops_dir: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: None,
            thermal_primary_suffix: "_Z.JPG".to_string(),
            thermal_secondary_suffix: "_T.JPG".to_string(),
            thermal_output_suffix: "_AT.JPG".to_string(),
            change_extension: ".jpg".to_string(),
            change_after_marker: "~2".to_string(),
            change_output_suffix: "~3_Final.jpg".to_string(),
            crops_dir: "crops".to_string(),
        }
    }
}

impl BatchConfig {
    /// The effective pool size.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// The complete configuration handed to every pipeline entry point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub aligner: AlignerConfig,
    pub overlay: OverlayConfig,
    pub registrar: RegistrarConfig,
    pub change: ChangeConfig,
    pub batch: BatchConfig,
}

impl Config {
    /// Loads a (possibly partial) JSON configuration and validates it.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.aligner;
        if !(a.scale_step > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale_step must be positive, got {}",
                a.scale_step
            )));
        }
        if !(a.scale_min > 0.0 && a.scale_min < a.scale_max) {
            return Err(PipelineError::InvalidConfig(format!(
                "scale range [{}, {}) is empty",
                a.scale_min, a.scale_max
            )));
        }
        if !(a.template_fraction > 0.0 && a.template_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(
                "template_fraction must lie in (0, 1)".to_string(),
            ));
        }
        if self.overlay.clahe_tiles == 0 {
            return Err(PipelineError::InvalidConfig("clahe_tiles must be non-zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.registrar.keep_fraction) {
            return Err(PipelineError::InvalidConfig(
                "keep_fraction must lie in [0, 1]".to_string(),
            ));
        }
        if self.change.adaptive_block_size < 3 || self.change.adaptive_block_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(
                "adaptive_block_size must be odd and at least 3".to_string(),
            ));
        }
        if self.change.blur_kernel_size < 3 || self.change.blur_kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(
                "blur_kernel_size must be odd and at least 3".to_string(),
            ));
        }
        if self.batch.workers == Some(0) {
            return Err(PipelineError::InvalidConfig("workers must be at least 1".to_string()));
        }
        Ok(())
    }
}
