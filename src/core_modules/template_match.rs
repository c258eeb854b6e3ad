// THEORY:
// Zero-mean normalized cross-correlation ("correlation coefficient") of a
// template slid over an image, computed by OpenCV's `matchTemplate` with
// `TM_CCOEFF_NORMED`. OpenCV correlates in the frequency domain for large
// templates, which keeps a full-frame search per scale affordable.
//
// Every score is invariant to brightness offset and gain. A window with no
// variance scores 0. A template with no variance has no defined correlation
// either; OpenCV reports 1 everywhere for it, so it is scored 0 here before
// OpenCV is asked.

use crate::core_modules::utils::cv_bridge::gray_to_mat;
use crate::error::Result;
use image::GrayImage;
use opencv::core::{self, Mat, Point};
use opencv::imgproc;

/// The best-scoring window of a template search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPeak {
    /// Correlation coefficient in `[-1, 1]`.
    pub score: f64,
    /// Top-left corner of the window in image coordinates.
    pub location: (u32, u32),
}

/// Highest correlation coefficient and its location. Ties keep the first
/// window in row-major order. `Ok(None)` if the template is empty or does not
/// fit inside the image.
pub fn match_template_ccoeff_normed(image: &GrayImage, template: &GrayImage) -> Result<Option<MatchPeak>> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return Ok(None);
    }

    let first = template.get_pixel(0, 0);
    if template.pixels().all(|p| p == first) {
        return Ok(Some(MatchPeak { score: 0.0, location: (0, 0) }));
    }

    let mut scores = Mat::default();
    imgproc::match_template(
        &gray_to_mat(image)?,
        &gray_to_mat(template)?,
        &mut scores,
        imgproc::TM_CCOEFF_NORMED,
        &Mat::default(),
    )?;

    let mut max_score = 0f64;
    let mut max_location = Point::default();
    core::min_max_loc(&scores, None, Some(&mut max_score), None, Some(&mut max_location), &Mat::default())?;

    Ok(Some(MatchPeak {
        score: max_score.clamp(-1.0, 1.0),
        location: (max_location.x.max(0) as u32, max_location.y.max(0) as u32),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::time::{Duration, Instant};

    fn textured(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([((x * 31 + y * 17 + x * y) % 200) as u8]))
    }

    #[test]
    fn finds_exact_crop_with_unit_score() {
        let img = textured(60, 40);
        let tmpl = image::imageops::crop_imm(&img, 21, 9, 15, 12).to_image();
        let peak = match_template_ccoeff_normed(&img, &tmpl).unwrap().unwrap();
        assert_eq!(peak.location, (21, 9));
        assert!((peak.score - 1.0).abs() < 1e-3, "score {}", peak.score);
    }

    #[test]
    fn score_ignores_brightness_offset() {
        let img = textured(50, 30);
        let tmpl = GrayImage::from_fn(10, 8, |x, y| Luma([img.get_pixel(x + 30, y + 11)[0] / 2 + 40]));
        let peak = match_template_ccoeff_normed(&img, &tmpl).unwrap().unwrap();
        assert_eq!(peak.location, (30, 11));
        assert!(peak.score > 0.99);
    }

    #[test]
    fn flat_template_scores_zero() {
        let img = textured(20, 20);
        let tmpl = GrayImage::from_pixel(5, 5, Luma([9]));
        let peak = match_template_ccoeff_normed(&img, &tmpl).unwrap().unwrap();
        assert_eq!(peak.score, 0.0);
    }

    #[test]
    fn flat_image_scores_zero() {
        let img = GrayImage::from_pixel(20, 20, Luma([9]));
        let peak = match_template_ccoeff_normed(&img, &textured(5, 5)).unwrap().unwrap();
        assert!(peak.score.abs() < 1e-6, "score {}", peak.score);
    }

    #[test]
    fn oversized_template_is_rejected() {
        let img = textured(10, 10);
        assert!(match_template_ccoeff_normed(&img, &textured(11, 4)).unwrap().is_none());
        assert!(match_template_ccoeff_normed(&img, &GrayImage::new(0, 3)).unwrap().is_none());
    }

    #[test]
    fn full_frame_search_is_fast() {
        let img = textured(640, 512);
        let tmpl = image::imageops::crop_imm(&img, 160, 128, 320, 256).to_image();
        let start = Instant::now();
        let peak = match_template_ccoeff_normed(&img, &tmpl).unwrap().unwrap();
        assert_eq!(peak.location, (160, 128));
        assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    }
}
