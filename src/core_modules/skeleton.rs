// THEORY:
// The skeleton is the structural fingerprint used to match an RGB frame
// against a thermal frame. The two sensors disagree on brightness, texture and
// colour, but they agree on where strong vertical structure is (poles, walls,
// panel edges, tree trunks). The extractor therefore throws away everything
// except a binary map of strong horizontal intensity change.
//
// Steps:
// 1.  **Denoise**: a small Gaussian blur removes sensor noise that would
//     otherwise dominate the derivative.
// 2.  **Normalize**: a min-max stretch makes the gradient threshold independent
//     of each sensor's exposure.
// 3.  **Horizontal derivative**: only the x-derivative is kept, so vertical
//     edges survive and horizontal ones (horizon, rooftops) are ignored.
// 4.  **Adaptive binarization**: the threshold follows the median gradient of
//     the image, with a fixed floor for flat scenes.
// 5.  **Cleanup**: a 3x3 opening removes isolated specks.

use crate::core_modules::raster_ops::{self, AsGray};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::gradients::horizontal_sobel;
use imageproc::morphology::open;

/// Taps of the denoising blur on each axis.
pub const DENOISE_KERNEL_SIZE: u32 = 5;
/// Gradient threshold never drops below this value.
pub const MIN_GRADIENT_THRESHOLD: f64 = 40.0;
/// Fraction of the median gradient used as the adaptive threshold.
pub const MEDIAN_GRADIENT_FACTOR: f64 = 0.67;

/// Reduces a raster to a binary (0/255) map of its dominant vertical structure.
/// The output always has the input's dimensions.
pub fn extract_skeleton<R: AsGray + ?Sized>(raster: &R) -> GrayImage {
    let gray = raster.as_gray();
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }

    // --- 1. Denoise ---
    let blurred = raster_ops::gaussian_blur_gray(&gray, DENOISE_KERNEL_SIZE);

    // --- 2. Normalize ---
    let normalized = raster_ops::normalize_min_max(&blurred);

    // --- 3. Horizontal Derivative ---
    let sobel_x = horizontal_sobel(&normalized);
    let gradient = GrayImage::from_fn(width, height, |x, y| {
        let g = sobel_x.get_pixel(x, y)[0].unsigned_abs();
        Luma([g.min(255) as u8])
    });

    // --- 4. Adaptive Binarization ---
    let threshold = MIN_GRADIENT_THRESHOLD.max(MEDIAN_GRADIENT_FACTOR * raster_ops::median(&gradient));
    // For integer samples, `v > t` and `v > floor(t)` agree.
    let binary = raster_ops::threshold_binary(&gradient, threshold.min(255.0) as u8);

    // --- 5. Cleanup ---
    open(&binary, Norm::LInf, 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn vertical_band(width: u32, height: u32, x0: u32, x1: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([if (x0..x1).contains(&x) { 220 } else { 30 }]))
    }

    #[test]
    fn output_is_binary_and_same_size() {
        let img = GrayImage::from_fn(97, 61, |x, y| Luma([((x * 7 + y * 13) % 251) as u8]));
        let skeleton = extract_skeleton(&img);
        assert_eq!(skeleton.dimensions(), img.dimensions());
        assert!(skeleton.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn keeps_vertical_edges_only() {
        let img = vertical_band(100, 80, 40, 60);
        let skeleton = extract_skeleton(&img);
        let on: Vec<(u32, u32)> = skeleton
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert!(!on.is_empty());
        assert!(on.iter().all(|&(x, _)| (34..=45).contains(&x) || (54..=65).contains(&x)));
    }

    #[test]
    fn horizontal_structure_is_ignored() {
        let img = GrayImage::from_fn(100, 80, |_, y| Luma([if (30..50).contains(&y) { 220 } else { 30 }]));
        let skeleton = extract_skeleton(&img);
        assert!(skeleton.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn accepts_colour_input() {
        let rgb = RgbImage::from_fn(40, 30, |x, _| image::Rgb([if x > 20 { 200 } else { 10 }; 3]));
        let skeleton = extract_skeleton(&rgb);
        assert_eq!(skeleton.dimensions(), (40, 30));
        assert!(skeleton.pixels().any(|p| p[0] == 255));
    }
}
