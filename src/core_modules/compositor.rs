// THEORY:
// The compositor paints the aligned thermal data onto the RGB frame, but only
// where thermal data actually exists. The aligned raster is zero wherever the
// thermal frame did not reach after translation, and a plain alpha blend there
// would tint sky and borders with the colormap's "cold" colour. The presence
// mask is computed on the raw aligned values, before contrast enhancement,
// because CLAHE lifts the zero background.

use crate::config::OverlayConfig;
use crate::core_modules::raster_ops::{blend_pixel, ensure_same_dimensions};
use crate::core_modules::utils::cv_bridge::{gray_to_mat, mat_to_gray};
use crate::error::Result;
use image::{GrayImage, RgbImage};
use opencv::core::{Mat, Size};
use opencv::imgproc;
use opencv::prelude::*;

/// Contrast-limited adaptive histogram equalization over `tiles x tiles` tiles.
pub fn enhance_contrast(image: &GrayImage, clip_limit: f64, tiles: u32) -> Result<GrayImage> {
    let tiles = tiles.max(1) as i32;
    let mut clahe = imgproc::create_clahe(clip_limit, Size::new(tiles, tiles))?;
    let mut enhanced = Mat::default();
    clahe.apply(&gray_to_mat(image)?, &mut enhanced)?;
    mat_to_gray(&enhanced)
}

/// Blends the colorized `aligned` raster onto `primary` inside the
/// data-presence mask; outside it the primary pixel is copied unchanged.
pub fn create_overlay(primary: &RgbImage, aligned: &GrayImage, config: &OverlayConfig) -> Result<RgbImage> {
    ensure_same_dimensions(primary.dimensions(), aligned.dimensions())?;

    // --- 1. Enhance and Colorize ---
    let enhanced = enhance_contrast(aligned, config.clahe_clip_limit, config.clahe_tiles)?;
    let colorized = config.colormap.apply(&enhanced);

    // --- 2. Masked Blend ---
    let mut overlay = primary.clone();
    for (x, y, pixel) in overlay.enumerate_pixels_mut() {
        if aligned.get_pixel(x, y)[0] > config.presence_threshold {
            *pixel = blend_pixel(pixel, config.alpha, colorized.get_pixel(x, y), config.beta);
        }
    }
    Ok(overlay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::colormap::Colormap;
    use crate::error::PipelineError;
    use image::{Luma, Rgb};

    fn primary() -> RgbImage {
        RgbImage::from_fn(48, 32, |x, y| Rgb([(x * 5) as u8, (y * 7) as u8, 90]))
    }

    #[test]
    fn background_pixels_are_untouched() {
        let primary = primary();
        let aligned = GrayImage::from_fn(48, 32, |x, y| Luma([if x < 24 { 0 } else { ((x * 3 + y) % 50) as u8 }]));
        let overlay = create_overlay(&primary, &aligned, &OverlayConfig::default()).unwrap();
        for (x, y, p) in overlay.enumerate_pixels() {
            if aligned.get_pixel(x, y)[0] <= 5 {
                assert_eq!(p, primary.get_pixel(x, y), "pixel ({x}, {y}) changed");
            }
        }
    }

    #[test]
    fn data_pixels_are_blended() {
        let primary = RgbImage::from_pixel(16, 16, Rgb([100, 100, 100]));
        let aligned = GrayImage::from_pixel(16, 16, Luma([200]));
        let config = OverlayConfig { colormap: Colormap::Gray, alpha: 0.5, beta: 0.5, ..OverlayConfig::default() };
        let overlay = create_overlay(&primary, &aligned, &config).unwrap();
        assert!(overlay.pixels().all(|p| p != &Rgb([100, 100, 100])));
    }

    #[test]
    fn contrast_enhancement_stretches_a_narrow_band() {
        let img = GrayImage::from_fn(256, 192, |x, y| Luma([100 + ((x + y) % 20) as u8]));
        let out = enhance_contrast(&img, 4.0, 8).unwrap();
        assert_eq!(out.dimensions(), img.dimensions());
        let (lo, hi) = out.pixels().fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        assert!(hi - lo > 40, "range {lo}..{hi}");
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let result = create_overlay(&primary(), &GrayImage::new(10, 10), &OverlayConfig::default());
        assert!(matches!(result, Err(PipelineError::DimensionMismatch { .. })));
    }
}
