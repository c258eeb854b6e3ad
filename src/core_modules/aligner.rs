// THEORY:
// The `aligner` registers a secondary (thermal) frame onto a primary (RGB)
// frame when the two cameras share an optical axis but differ in field of view
// and have a small mounting offset. The unknowns are therefore a single scale
// factor and a 2-D translation; rotation and perspective are ignored.
//
// Key architectural principles:
// 1.  **Structure, not intensity**: both frames are reduced to skeletons first.
//     RGB and thermal brightness are unrelated, their edges are not.
// 2.  **Discrete scale search**: the scale is found by brute force over a small
//     half-open range. At every scale the secondary is resized relative to the
//     primary's size, skeletonized, and its central region becomes a template.
// 3.  **Correlation peak as translation**: the template's best normalized
//     correlation position in the primary skeleton, minus the template's own
//     offset inside the scaled secondary, is the translation of the whole frame.
// 4.  **Deterministic selection**: scales are visited in increasing order and
//     a candidate only replaces the incumbent with a strictly higher score.
// 5.  **Explicit failure**: if nothing correlates positively, the result is an
//     empty (all-background) raster tagged `Unaligned`, never a guess.

use crate::config::AlignerConfig;
use crate::core_modules::alignment::{AlignmentOutcome, UnalignedReason};
use crate::core_modules::raster_ops::{self, AsGray};
use crate::core_modules::skeleton::extract_skeleton;
use crate::core_modules::template_match::match_template_ccoeff_normed;
use crate::error::Result;
use image::GrayImage;
use image::imageops;
use log::debug;

/// The result of evaluating one scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentCandidate {
    pub score: f64,
    pub scale: f64,
    /// Top-left of the best template match, in primary coordinates.
    pub match_location: (u32, u32),
    /// Top-left of the template inside the scaled secondary skeleton.
    pub template_offset: (u32, u32),
}

impl AlignmentCandidate {
    /// The incumbent before any scale has been evaluated.
    pub const SENTINEL: AlignmentCandidate = AlignmentCandidate {
        score: -1.0,
        scale: 1.0,
        match_location: (0, 0),
        template_offset: (0, 0),
    };

    /// Where the scaled secondary's top-left corner lands in the primary.
    pub fn translation(&self) -> (i64, i64) {
        (
            i64::from(self.match_location.0) - i64::from(self.template_offset.0),
            i64::from(self.match_location.1) - i64::from(self.template_offset.1),
        )
    }
}

/// The winning candidate of a scale search.
pub type BestAlignment = AlignmentCandidate;

/// Output of [`find_optimal_alignment`].
#[derive(Debug, Clone)]
pub struct ScaleAlignment {
    /// The secondary in primary coordinates, primary-sized, zero where absent.
    pub aligned: GrayImage,
    pub outcome: AlignmentOutcome<BestAlignment>,
    /// Every scale that produced a valid template, in evaluation order.
    pub candidates: Vec<AlignmentCandidate>,
}

/// Scales of the half-open search range `[scale_min, scale_max)`.
pub fn scales(config: &AlignerConfig) -> Vec<f64> {
    if !(config.scale_step > 0.0) || config.scale_max <= config.scale_min {
        return Vec::new();
    }
    let count = ((config.scale_max - config.scale_min) / config.scale_step).ceil() as usize;
    (0..count)
        .map(|i| config.scale_min + i as f64 * config.scale_step)
        .filter(|&s| s < config.scale_max)
        .collect()
}

/// `floor(dimension * scale)`, tolerant of the representation error in the
/// generated scale values.
pub fn scaled_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let scale_dim = |d: u32| (f64::from(d) * scale + 1e-9).floor().max(0.0) as u32;
    (scale_dim(width), scale_dim(height))
}

/// Searches the configured scale range for the scale and translation that best
/// map `secondary` onto `primary`, then reconstructs the aligned secondary.
/// Errors only come from the correlation backend; a failed search is an
/// `Unaligned` outcome.
pub fn find_optimal_alignment<P: AsGray + ?Sized>(
    primary: &P,
    secondary: &GrayImage,
    config: &AlignerConfig,
) -> Result<ScaleAlignment> {
    let primary_gray = primary.as_gray();
    let (pw, ph) = primary_gray.dimensions();

    // --- 1. Primary Skeleton (once) ---
    let primary_skeleton = extract_skeleton(&*primary_gray);

    // --- 2. Scale Search ---
    let mut best = AlignmentCandidate::SENTINEL;
    let mut candidates = Vec::new();
    for scale in scales(config) {
        let (sw, sh) = scaled_dimensions(pw, ph, scale);
        if sw == 0 || sh == 0 {
            continue;
        }
        let scaled = raster_ops::resize_gray(secondary, sw, sh);
        let skeleton = extract_skeleton(&scaled);

        let (offset, template) = central_template(&skeleton, config.template_fraction);
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw >= pw || th >= ph {
            debug!("scale {scale:.3}: template {tw}x{th} unusable against {pw}x{ph}");
            continue;
        }

        let Some(peak) = match_template_ccoeff_normed(&primary_skeleton, &template)? else {
            continue;
        };
        debug!("scale {scale:.3}: score {:.4} at {:?}", peak.score, peak.location);

        let candidate = AlignmentCandidate {
            score: peak.score,
            scale,
            match_location: peak.location,
            template_offset: offset,
        };
        candidates.push(candidate);
        if candidate.score > best.score {
            best = candidate;
        }
    }

    // --- 3. Selection ---
    let outcome = if candidates.is_empty() {
        AlignmentOutcome::Unaligned(UnalignedReason::NoValidScale)
    } else if best.score <= 0.0 {
        AlignmentOutcome::Unaligned(UnalignedReason::NonPositiveScore(best.score))
    } else {
        AlignmentOutcome::Aligned(best)
    };

    // --- 4. Reconstruction ---
    let aligned = match &outcome {
        AlignmentOutcome::Aligned(best) => reconstruct(secondary, best, (pw, ph)),
        AlignmentOutcome::Unaligned(_) => GrayImage::new(pw, ph),
    };

    Ok(ScaleAlignment { aligned, outcome, candidates })
}

/// Resizes `secondary` by the winning scale and pastes it at the winning
/// translation into a zeroed raster of `primary_dims`, clipped to its bounds.
pub fn reconstruct(secondary: &GrayImage, best: &BestAlignment, primary_dims: (u32, u32)) -> GrayImage {
    let (pw, ph) = primary_dims;
    let mut aligned = GrayImage::new(pw, ph);
    let (sw, sh) = scaled_dimensions(pw, ph, best.scale);
    if sw == 0 || sh == 0 {
        return aligned;
    }
    let scaled = raster_ops::resize_gray(secondary, sw, sh);
    let (start_x, start_y) = best.translation();
    imageops::replace(&mut aligned, &scaled, start_x, start_y);
    aligned
}

// The centred `fraction`-sized crop and its top-left offset. Each half-extent
// is rounded down, so odd crop sizes lose one pixel. `fraction` is clamped to
// `[0, 1]`.
fn central_template(skeleton: &GrayImage, fraction: f64) -> ((u32, u32), GrayImage) {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 0.0 };
    let (w, h) = skeleton.dimensions();
    let crop_w = (f64::from(w) * fraction) as u32;
    let crop_h = (f64::from(h) * fraction) as u32;
    let (cx, cy) = (w / 2, h / 2);
    let (x1, y1) = (cx - crop_w / 2, cy - crop_h / 2);
    let (x2, y2) = (cx + crop_w / 2, cy + crop_h / 2);
    let template = imageops::crop_imm(skeleton, x1, y1, x2 - x1, y2 - y1).to_image();
    ((x1, y1), template)
}
