pub use self::image_helper::{load_gray, load_rgb, save};

pub mod image_helper {
    use crate::error::{PipelineError, Result};
    use image::codecs::jpeg::JpegEncoder;
    use image::codecs::png::PngEncoder;
    use image::{ExtendedColorType, GrayImage, ImageEncoder, ImageError, RgbImage};
    use std::fs::File;
    use std::io::BufWriter;
    use std::path::Path;

    pub const JPEG_QUALITY: u8 = 95;

    fn read_error(path: &Path, source: ImageError) -> PipelineError {
        PipelineError::Read { path: path.to_path_buf(), source }
    }

    fn write_error(path: &Path, source: ImageError) -> PipelineError {
        PipelineError::Write { path: path.to_path_buf(), source }
    }

    /// Decodes any supported format into 8-bit RGB.
    pub fn load_rgb(path: &Path) -> Result<RgbImage> {
        let decoded = image::open(path).map_err(|e| read_error(path, e))?;
        Ok(decoded.into_rgb8())
    }

    /// Decodes any supported format into 8-bit luma.
    pub fn load_gray(path: &Path) -> Result<GrayImage> {
        let decoded = image::open(path).map_err(|e| read_error(path, e))?;
        Ok(decoded.into_luma8())
    }

    /// Encodes by extension: PNG for `.png`, JPEG for everything else.
    pub fn save(path: &Path, image: &RgbImage) -> Result<()> {
        let file = File::create(path).map_err(|e| write_error(path, ImageError::IoError(e)))?;
        let output = BufWriter::new(file);
        let (width, height) = image.dimensions();

        let is_png = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        let encoded = if is_png {
            PngEncoder::new(output).write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
        } else {
            JpegEncoder::new_with_quality(output, JPEG_QUALITY).write_image(
                image.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        };
        encoded.map_err(|e| write_error(path, e))
    }
}
