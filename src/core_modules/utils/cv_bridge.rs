// THEORY:
// The pipelines keep their rasters as `image` buffers; OpenCV is only called
// for the kernels it provides (CLAHE, ORB, matching, homography, warping,
// template correlation). These helpers copy 8-bit buffers into continuous
// `Mat`s and back. Channel order is passed through untouched: none of the
// OpenCV calls made here interpret colour channels.

use crate::error::{PipelineError, Result};
use image::{GrayImage, RgbImage};
use opencv::core::{self, Mat};
use opencv::prelude::*;

fn mat_from_bytes(data: &[u8], channels: i32, rows: u32) -> Result<Mat> {
    let flat = Mat::from_slice(data)?;
    let shaped = flat.reshape(channels, rows as i32)?;
    Ok(shaped.try_clone()?)
}

pub fn gray_to_mat(image: &GrayImage) -> Result<Mat> {
    mat_from_bytes(image.as_raw(), 1, image.height())
}

pub fn rgb_to_mat(image: &RgbImage) -> Result<Mat> {
    mat_from_bytes(image.as_raw(), 3, image.height())
}

fn mat_bytes(mat: &Mat, expected_type: i32) -> Result<(u32, u32, Vec<u8>)> {
    if mat.typ() != expected_type {
        return Err(PipelineError::RasterLayout(format!(
            "expected matrix type {expected_type}, got {}",
            mat.typ()
        )));
    }
    // `try_clone` always yields a continuous matrix.
    let bytes = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    } else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };
    Ok((mat.cols() as u32, mat.rows() as u32, bytes))
}

pub fn mat_to_gray(mat: &Mat) -> Result<GrayImage> {
    let (width, height, bytes) = mat_bytes(mat, core::CV_8UC1)?;
    GrayImage::from_raw(width, height, bytes)
        .ok_or_else(|| PipelineError::RasterLayout(format!("{width}x{height} gray buffer is truncated")))
}

pub fn mat_to_rgb(mat: &Mat) -> Result<RgbImage> {
    let (width, height, bytes) = mat_bytes(mat, core::CV_8UC3)?;
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| PipelineError::RasterLayout(format!("{width}x{height} rgb buffer is truncated")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn gray_survives_the_trip() {
        let image = GrayImage::from_fn(13, 7, |x, y| Luma([(x * 17 + y) as u8]));
        let mat = gray_to_mat(&image).unwrap();
        assert_eq!((mat.cols(), mat.rows(), mat.channels()), (13, 7, 1));
        assert_eq!(mat_to_gray(&mat).unwrap(), image);
    }

    #[test]
    fn rgb_keeps_channel_order() {
        let image = RgbImage::from_fn(5, 4, |x, y| Rgb([x as u8, y as u8, 200]));
        let mat = rgb_to_mat(&image).unwrap();
        assert_eq!(mat.typ(), core::CV_8UC3);
        assert_eq!(mat_to_rgb(&mat).unwrap(), image);
    }

    #[test]
    fn wrong_matrix_type_is_reported() {
        let mat = rgb_to_mat(&RgbImage::new(3, 3)).unwrap();
        assert!(matches!(mat_to_gray(&mat), Err(PipelineError::RasterLayout(_))));
    }
}
