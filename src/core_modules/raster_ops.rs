// THEORY:
// Small, stateless raster primitives shared by both pipelines. Filtering and
// resampling are delegated to `image`/`imageproc`; what remains here are the
// per-pixel arithmetic helpers that the libraries do not offer in the exact
// form the pipelines need (saturating weighted sums, min-max stretch,
// histogram median) and the fixed-size Gaussian taps the blurs are run with.
//
// All helpers that combine two rasters check dimensions explicitly and report
// a `DimensionMismatch` instead of silently cropping or resizing.

use crate::error::{PipelineError, Result};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::separable_filter_equal;
use std::borrow::Cow;

/// Rasters that can be viewed as single-channel intensity.
pub trait AsGray {
    fn as_gray(&self) -> Cow<'_, GrayImage>;
}

impl AsGray for GrayImage {
    fn as_gray(&self) -> Cow<'_, GrayImage> {
        Cow::Borrowed(self)
    }
}

impl AsGray for RgbImage {
    fn as_gray(&self) -> Cow<'_, GrayImage> {
        Cow::Owned(imageops::grayscale(self))
    }
}

pub fn ensure_same_dimensions(left: (u32, u32), right: (u32, u32)) -> Result<()> {
    if left != right {
        return Err(PipelineError::DimensionMismatch { left, right });
    }
    Ok(())
}

/// Bilinear resize, the default interpolation for every resize in the pipelines.
pub fn resize_gray(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

pub fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Normalized taps of an odd-sized Gaussian kernel whose sigma is derived from
/// the size. Sizes up to 7 use the fixed smoothing tables; larger sizes sample
/// a Gaussian with `sigma = 0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: u32) -> Vec<f32> {
    match ksize {
        0 | 1 => vec![1.0],
        3 => vec![0.25, 0.5, 0.25],
        5 => vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
        7 => vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
        _ => {
            let sigma = 0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8;
            let center = (ksize / 2) as f64;
            let taps: Vec<f64> = (0..ksize)
                .map(|i| (-(i as f64 - center).powi(2) / (2.0 * sigma * sigma)).exp())
                .collect();
            let total: f64 = taps.iter().sum();
            taps.into_iter().map(|t| (t / total) as f32).collect()
        }
    }
}

/// Separable Gaussian blur with a fixed `ksize`-tap kernel on both axes.
pub fn gaussian_blur_gray(image: &GrayImage, ksize: u32) -> GrayImage {
    separable_filter_equal(image, &gaussian_kernel(ksize))
}

pub fn gaussian_blur_rgb(image: &RgbImage, ksize: u32) -> RgbImage {
    separable_filter_equal(image, &gaussian_kernel(ksize))
}

/// Linearly stretches intensities so the darkest pixel maps to 0 and the
/// brightest to 255. A constant image maps to all zeros.
pub fn normalize_min_max(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    if max <= min {
        return GrayImage::new(image.width(), image.height());
    }
    // Integer arithmetic, rounding halves up.
    let range = u32::from(max - min);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let offset = u32::from(image.get_pixel(x, y)[0] - min);
        Luma([((offset * 255 + range / 2) / range).min(255) as u8])
    })
}

/// Median intensity; even-sized inputs average the two middle samples.
pub fn median(image: &GrayImage) -> f64 {
    let total = image.as_raw().len();
    if total == 0 {
        return 0.0;
    }
    let mut histogram = [0usize; 256];
    for &v in image.as_raw() {
        histogram[v as usize] += 1;
    }

    let value_at_rank = |rank: usize| -> usize {
        let mut seen = 0;
        for (value, &count) in histogram.iter().enumerate() {
            seen += count;
            if seen > rank {
                return value;
            }
        }
        255
    };

    if total % 2 == 1 {
        value_at_rank(total / 2) as f64
    } else {
        (value_at_rank(total / 2 - 1) + value_at_rank(total / 2)) as f64 / 2.0
    }
}

/// `255` where `value > threshold`, else `0`.
pub fn threshold_binary(image: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([if image.get_pixel(x, y)[0] > threshold { 255 } else { 0 }])
    })
}

pub fn bitwise_and(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (o, &r) in out.iter_mut().zip(b.as_raw()) {
        *o &= r;
    }
    Ok(out)
}

pub fn abs_diff_gray(a: &GrayImage, b: &GrayImage) -> Result<GrayImage> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (o, &r) in out.iter_mut().zip(b.as_raw()) {
        *o = o.abs_diff(r);
    }
    Ok(out)
}

/// Per-channel absolute difference.
pub fn abs_diff_rgb(a: &RgbImage, b: &RgbImage) -> Result<RgbImage> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (o, &r) in out.iter_mut().zip(b.as_raw()) {
        *o = o.abs_diff(r);
    }
    Ok(out)
}

#[inline]
pub fn saturate_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// `saturate(wa * a + wb * b)` per sample.
pub fn weighted_sum_gray(a: &GrayImage, wa: f64, b: &GrayImage, wb: f64) -> Result<GrayImage> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (o, &r) in out.iter_mut().zip(b.as_raw()) {
        *o = saturate_u8(wa * f64::from(*o) + wb * f64::from(r));
    }
    Ok(out)
}

pub fn weighted_sum_rgb(a: &RgbImage, wa: f64, b: &RgbImage, wb: f64) -> Result<RgbImage> {
    ensure_same_dimensions(a.dimensions(), b.dimensions())?;
    let mut out = a.clone();
    for (o, &r) in out.iter_mut().zip(b.as_raw()) {
        *o = saturate_u8(wa * f64::from(*o) + wb * f64::from(r));
    }
    Ok(out)
}

#[inline]
pub fn blend_pixel(a: &Rgb<u8>, wa: f64, b: &Rgb<u8>, wb: f64) -> Rgb<u8> {
    Rgb([
        saturate_u8(wa * f64::from(a[0]) + wb * f64::from(b[0])),
        saturate_u8(wa * f64::from(a[1]) + wb * f64::from(b[1])),
        saturate_u8(wa * f64::from(a[2]) + wb * f64::from(b[2])),
    ])
}
