// THEORY:
// The `pipeline` module is the per-pair API of the engine. It wires the core
// modules into the two end-to-end pipelines and defines the status vocabulary
// the batch layer reports in.
//
// Key architectural principles:
// 1.  **In-memory entry points**: `overlay_thermal` and
//     `change_detector::detect_and_annotate` work on rasters only. Callers that
//     already hold decoded images never touch the filesystem.
// 2.  **File-level wrappers**: `run_thermal_pair` and `run_change_pair` add
//     decoding, encoding and output naming around them.
// 3.  **Contained outcome**: `run_pair` converts everything that can go wrong
//     with one pair into a `PairResult`. A missing counterpart is a skip, an
//     undecodable input is a read error, anything else is a processing failure.
//     Nothing escapes to affect other pairs.

use crate::config::Config;
use crate::core_modules::aligner::{find_optimal_alignment, BestAlignment};
use crate::core_modules::alignment::AlignmentOutcome;
use crate::core_modules::change_detector::detect_and_annotate;
use crate::core_modules::compositor::create_overlay;
use crate::core_modules::utils::image_helper::{load_gray, load_rgb, save};
use crate::error::{PipelineError, Result};
use image::{GrayImage, RgbImage};
use log::{debug, warn};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    /// RGB/thermal alignment and overlay.
    Thermal,
    /// Before/after change detection.
    Change,
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineKind::Thermal => f.write_str("thermal"),
            PipelineKind::Change => f.write_str("change"),
        }
    }
}

/// One unit of batch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairTask {
    pub base_name: String,
    /// RGB frame (thermal) or "before" frame (change).
    pub primary: PathBuf,
    /// Thermal frame or "after" frame. May not exist.
    pub secondary: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PairStatus {
    Ok,
    Skipped,
    ReadError,
    ProcessingFailure,
}

impl PairStatus {
    /// Fixed-width tag used at the start of every status line.
    pub fn tag(self) -> &'static str {
        match self {
            PairStatus::Ok => "[OK  ]",
            PairStatus::Skipped => "[SKIP]",
            PairStatus::ReadError => "[ERR ]",
            PairStatus::ProcessingFailure => "[FAIL]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairResult {
    pub base_name: String,
    pub status: PairStatus,
    pub detail: String,
}

impl PairResult {
    pub fn new(base_name: impl Into<String>, status: PairStatus, detail: impl Into<String>) -> Self {
        Self { base_name: base_name.into(), status, detail: detail.into() }
    }
}

impl fmt::Display for PairResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.tag(), self.base_name, self.detail)
    }
}

/// Aligns `secondary` onto `primary` and blends it in. The overlay equals
/// `primary` wherever the aligned secondary carries no data, which on an
/// alignment failure is everywhere.
pub fn overlay_thermal(
    primary: &RgbImage,
    secondary: &GrayImage,
    config: &Config,
) -> Result<(RgbImage, AlignmentOutcome<BestAlignment>)> {
    let alignment = find_optimal_alignment(primary, secondary, &config.aligner)?;
    let overlay = create_overlay(primary, &alignment.aligned, &config.overlay)?;
    Ok((overlay, alignment.outcome))
}

/// Thermal pipeline on files: writes `{base}_AT.JPG` and returns a detail line.
pub fn run_thermal_pair(task: &PairTask, config: &Config) -> Result<String> {
    let primary = load_rgb(&task.primary)?;
    let secondary = load_gray(&task.secondary)?;

    let (overlay, outcome) = overlay_thermal(&primary, &secondary, config)?;
    let output = task.output_dir.join(format!("{}{}", task.base_name, config.batch.thermal_output_suffix));
    save(&output, &overlay)?;

    Ok(match outcome {
        AlignmentOutcome::Aligned(best) => {
            debug!("{}: scale {:.2}, translation {:?}", task.base_name, best.scale, best.translation());
            format!("Processed (scale {:.2}, score {:.3})", best.scale, best.score)
        }
        AlignmentOutcome::Unaligned(reason) => {
            warn!("{}: alignment failed, overlay left untouched: {reason}", task.base_name);
            format!("Processed without alignment ({reason})")
        }
    })
}

/// Change pipeline on files: writes `{base}~3_Final.jpg` plus one crop per
/// region under the crops directory and returns a detail line.
pub fn run_change_pair(task: &PairTask, config: &Config) -> Result<String> {
    let before = load_rgb(&task.primary)?;
    let after = load_rgb(&task.secondary)?;

    let report = detect_and_annotate(&before, &after, config)?;
    if let AlignmentOutcome::Unaligned(reason) = &report.registration {
        warn!("{}: registration skipped: {reason}", task.base_name);
    }

    let output = task.output_dir.join(format!("{}{}", task.base_name, config.batch.change_output_suffix));
    save(&output, &report.composite)?;

    if !report.regions.is_empty() {
        let crops_dir = task.output_dir.join(&config.batch.crops_dir);
        std::fs::create_dir_all(&crops_dir)?;
        for region in &report.regions {
            let crop_path = crops_dir.join(format!("{}_change_{}.jpg", task.base_name, region.index));
            save(&crop_path, &region.crop)?;
        }
    }

    Ok(format!("Detected {} change(s)", report.regions.len()))
}

/// Runs one pair through `kind`'s pipeline and classifies the outcome.
pub fn run_pair(task: &PairTask, kind: PipelineKind, config: &Config) -> PairResult {
    if !task.secondary.exists() {
        return PairResult::new(
            &task.base_name,
            PairStatus::Skipped,
            format!("Missing counterpart {}", task.secondary.display()),
        );
    }

    let outcome = match kind {
        PipelineKind::Thermal => run_thermal_pair(task, config),
        PipelineKind::Change => run_change_pair(task, config),
    };
    match outcome {
        Ok(detail) => PairResult::new(&task.base_name, PairStatus::Ok, detail),
        Err(e @ PipelineError::Read { .. }) => PairResult::new(&task.base_name, PairStatus::ReadError, format!("Read failed: {e}")),
        Err(e) => PairResult::new(&task.base_name, PairStatus::ProcessingFailure, format!("Exception: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use std::path::Path;

    fn task(dir: &Path, base: &str, primary: &str, secondary: &str) -> PairTask {
        PairTask {
            base_name: base.to_string(),
            primary: dir.join(primary),
            secondary: dir.join(secondary),
            output_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn status_lines_carry_fixed_width_tags() {
        let result = PairResult::new("DJI_0001", PairStatus::Skipped, "Missing counterpart");
        assert_eq!(result.to_string(), "[SKIP] DJI_0001: Missing counterpart");
        assert_eq!(PairStatus::ReadError.tag().len(), PairStatus::Ok.tag().len());
    }

    #[test]
    fn missing_counterpart_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let t = task(dir.path(), "A", "A_Z.JPG", "A_T.JPG");
        let result = run_pair(&t, PipelineKind::Thermal, &Config::default());
        assert_eq!(result.status, PairStatus::Skipped);
    }

    #[test]
    fn undecodable_input_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("A.jpg"), b"garbage").unwrap();
        std::fs::write(dir.path().join("A~2.jpg"), b"garbage").unwrap();
        let t = task(dir.path(), "A", "A.jpg", "A~2.jpg");
        let result = run_pair(&t, PipelineKind::Change, &Config::default());
        assert_eq!(result.status, PairStatus::ReadError);
    }

    #[test]
    fn thermal_pair_writes_overlay() {
        let dir = tempfile::tempdir().unwrap();
        save(&dir.path().join("P_Z.png"), &RgbImage::from_pixel(64, 48, Rgb([10, 120, 200]))).unwrap();
        let thermal = GrayImage::from_fn(64, 48, |x, _| Luma([if x > 30 { 200 } else { 20 }]));
        save(&dir.path().join("P_T.png"), &image::DynamicImage::ImageLuma8(thermal).into_rgb8()).unwrap();

        let t = task(dir.path(), "P", "P_Z.png", "P_T.png");
        let result = run_pair(&t, PipelineKind::Thermal, &Config::default());
        assert_eq!(result.status, PairStatus::Ok, "{result}");
        assert!(dir.path().join("P_AT.JPG").exists());
    }

    #[test]
    fn change_pair_writes_composite_and_crops() {
        let dir = tempfile::tempdir().unwrap();
        let before = RgbImage::from_pixel(160, 120, Rgb([60, 70, 80]));
        let mut after = before.clone();
        for y in 30..80 {
            for x in 40..90 {
                after.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        save(&dir.path().join("S.png"), &before).unwrap();
        save(&dir.path().join("S~2.png"), &after).unwrap();

        let t = task(dir.path(), "S", "S.png", "S~2.png");
        let result = run_pair(&t, PipelineKind::Change, &Config::default());
        assert_eq!(result.status, PairStatus::Ok, "{result}");
        assert_eq!(result.detail, "Detected 1 change(s)");
        assert!(dir.path().join("S~3_Final.jpg").exists());
        assert!(dir.path().join("crops").join("S_change_1.jpg").exists());
    }
}
