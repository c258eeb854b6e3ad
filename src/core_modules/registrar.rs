// THEORY:
// The registrar removes small camera motion between a "before" and an "after"
// frame of the same scene before they are differenced. It estimates a full
// homography, which covers the translation, rotation and mild perspective
// change of a hovering drone over roughly planar ground.
//
// Steps:
// 1.  ORB features in both frames (grayscale), OpenCV's oriented FAST and
//     rotated BRIEF over an 8-level pyramid.
// 2.  Brute-force Hamming matching with the reference as query, then only the
//     best `keep_fraction` of matches by distance survive.
// 3.  RANSAC homography `H: target -> reference` over the survivors.
// 4.  The target is warped into the reference pixel grid (bilinear, black
//     outside the target). Under the identity the warp reproduces the target
//     exactly, border included.
//
// Any failure along the way returns the target unchanged, tagged with the
// reason in the `AlignmentOutcome`.

use crate::config::RegistrarConfig;
use crate::core_modules::alignment::{AlignmentOutcome, UnalignedReason};
use crate::core_modules::utils::cv_bridge::{gray_to_mat, mat_to_rgb, rgb_to_mat};
use crate::error::Result;
use image::{imageops, RgbImage};
use log::debug;
use opencv::core::{self, DMatch, KeyPoint, Mat, Point2f, Scalar, Size, Vector};
use opencv::prelude::*;
use opencv::{calib3d, features2d, imgproc};

/// Fewest correspondences a homography can be estimated from.
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

/// Matrices whose determinant is this close to zero are rejected as singular.
const SINGULAR_EPSILON: f64 = 1e-9;

/// Maps target pixel coordinates to reference pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(nalgebra::Matrix3<f64>);

impl Homography {
    /// `None` for non-finite or singular matrices, which cannot be warped with.
    pub fn from_matrix(matrix: nalgebra::Matrix3<f64>) -> Option<Self> {
        if !matrix.iter().all(|v| v.is_finite()) || matrix.determinant().abs() < SINGULAR_EPSILON {
            return None;
        }
        Some(Self(matrix))
    }

    fn from_mat(mat: &Mat) -> Result<Option<Self>> {
        if mat.empty() || mat.rows() != 3 || mat.cols() != 3 {
            return Ok(None);
        }
        let h = mat.data_typed::<f64>()?;
        Ok(Self::from_matrix(nalgebra::Matrix3::from_row_slice(h)))
    }

    fn to_mat(self) -> Result<Mat> {
        let m = &self.0;
        let rows: Vec<[f64; 3]> = (0..3).map(|r| [m[(r, 0)], m[(r, 1)], m[(r, 2)]]).collect();
        Ok(Mat::from_slice_2d(&rows)?)
    }

    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let q = self.0 * nalgebra::Vector3::new(x, y, 1.0);
        if q.z.abs() < 1e-12 {
            return None;
        }
        Some((q.x / q.z, q.y / q.z))
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    /// The target in the reference grid, or the unchanged target on failure.
    pub warped: RgbImage,
    pub outcome: AlignmentOutcome<Homography>,
    /// Matches that survived the distance filter.
    pub matches_kept: usize,
    /// RANSAC inliers among the kept matches.
    pub inliers: usize,
}

impl Registration {
    fn unchanged(target: &RgbImage, reason: UnalignedReason, matches_kept: usize) -> Self {
        Self {
            warped: target.clone(),
            outcome: AlignmentOutcome::Unaligned(reason),
            matches_kept,
            inliers: 0,
        }
    }
}

fn detect_features(image: &RgbImage, max_features: usize) -> Result<(Vector<KeyPoint>, Mat)> {
    let mut orb = features2d::ORB::create(
        max_features.min(i32::MAX as usize) as i32,
        1.2, // scaleFactor
        8,   // nlevels
        31,  // edgeThreshold
        0,   // firstLevel
        2,   // WTA_K
        features2d::ORB_ScoreType::HARRIS_SCORE,
        31, // patchSize
        20, // fastThreshold
    )?;
    let mut keypoints = Vector::new();
    let mut descriptors = Mat::default();
    orb.detect_and_compute(
        &gray_to_mat(&imageops::grayscale(image))?,
        &Mat::default(),
        &mut keypoints,
        &mut descriptors,
        false,
    )?;
    Ok((keypoints, descriptors))
}

/// Registers `target` onto `reference`. The result has the reference's
/// dimensions when alignment succeeds.
pub fn align_images(reference: &RgbImage, target: &RgbImage, config: &RegistrarConfig) -> Result<Registration> {
    // --- 1. Features ---
    let (reference_keypoints, reference_descriptors) = detect_features(reference, config.max_features)?;
    let (target_keypoints, target_descriptors) = detect_features(target, config.max_features)?;
    if reference_descriptors.empty() || target_descriptors.empty() {
        return Ok(Registration::unchanged(target, UnalignedReason::NoDescriptors, 0));
    }

    // --- 2. Match and Filter ---
    let matcher = features2d::BFMatcher::create(core::NORM_HAMMING, false)?;
    let mut matches = Vector::<DMatch>::new();
    matcher.train_match(&reference_descriptors, &target_descriptors, &mut matches, &Mat::default())?;
    let mut matches = matches.to_vec();
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    let keep = (matches.len() as f64 * config.keep_fraction).floor() as usize;
    matches.truncate(keep);
    if matches.len() < config.min_matches.max(MIN_HOMOGRAPHY_POINTS) {
        return Ok(Registration::unchanged(target, UnalignedReason::TooFewMatches(matches.len()), matches.len()));
    }

    // --- 3. Robust Homography ---
    let mut source = Vector::<Point2f>::new();
    let mut destination = Vector::<Point2f>::new();
    for m in &matches {
        source.push(target_keypoints.get(m.train_idx as usize)?.pt());
        destination.push(reference_keypoints.get(m.query_idx as usize)?.pt());
    }
    let mut inlier_mask = Mat::default();
    let estimate = calib3d::find_homography(
        &source,
        &destination,
        &mut inlier_mask,
        calib3d::RANSAC,
        config.ransac_threshold,
    )?;
    let Some(homography) = Homography::from_mat(&estimate)? else {
        return Ok(Registration::unchanged(target, UnalignedReason::DegenerateHomography, matches.len()));
    };
    let inliers = if inlier_mask.empty() { 0 } else { core::count_non_zero(&inlier_mask)? as usize };
    debug!("homography from {inliers}/{} matches: {:?}", matches.len(), homography.0);

    // --- 4. Warp ---
    let mut warped = Mat::default();
    imgproc::warp_perspective(
        &rgb_to_mat(target)?,
        &mut warped,
        &homography.to_mat()?,
        Size::new(reference.width() as i32, reference.height() as i32),
        imgproc::INTER_LINEAR,
        core::BORDER_CONSTANT,
        Scalar::default(),
    )?;

    Ok(Registration {
        warped: mat_to_rgb(&warped)?,
        outcome: AlignmentOutcome::Aligned(homography),
        matches_kept: matches.len(),
        inliers,
    })
}
