// THEORY:
// The change detector compares a "before" and an "after" frame of the same
// scene and reports the regions that changed. A single difference signal is
// either too noisy or too blind, so it combines two and then demands that two
// independent thresholds agree.
//
// Key architectural principles:
// 1.  **Registration first**: the after frame is resized to the before frame
//     and registered onto it, so camera shake does not show up as change.
// 2.  **Two difference signals**: the grayscale difference catches brightness
//     change; the per-channel colour difference catches changes in hue at equal
//     brightness. A weighted sum of both is the combined difference.
// 3.  **Two thresholds**: a fixed threshold rejects faint noise, an adaptive
//     (local Gaussian mean) threshold rejects broad illumination shifts such
//     as shadows. A pixel is changed only if both accept it.
// 4.  **Morphology**: an opening removes specks, a dilation merges fragments
//     of the same object.
// 5.  **Regions**: the mask is traced inside a one-pixel empty frame, so
//     blobs touching the image border still get an outer contour. Outermost
//     contours above a minimum area become
//     `ChangeRegion`s, numbered top-to-bottom then left-to-right, each with a
//     size class and a margin-padded crop of the registered after frame.

use crate::config::{ChangeConfig, Config};
use crate::core_modules::alignment::AlignmentOutcome;
use crate::core_modules::annotator;
use crate::core_modules::raster_ops::{self, ensure_same_dimensions};
use crate::core_modules::registrar::{align_images, Homography};
use crate::error::Result;
use image::{imageops, GrayImage, Luma, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, open};
use imageproc::point::Point;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    pub fn classify(area: f64, config: &ChangeConfig) -> Self {
        if area > config.large_area {
            SizeClass::Large
        } else if area > config.medium_area {
            SizeClass::Medium
        } else {
            SizeClass::Small
        }
    }

    /// Border thickness used when drawing a region of this class.
    pub fn thickness(self) -> u32 {
        match self {
            SizeClass::Large => 4,
            SizeClass::Medium => 3,
            SizeClass::Small => 2,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SizeClass::Small => "Small",
            SizeClass::Medium => "Medium",
            SizeClass::Large => "Large",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct ChangeRegion {
    /// 1-based number shown in the annotation and used in crop file names.
    pub index: usize,
    pub bounding_box: BoundingBox,
    /// Area enclosed by the region's outer contour.
    pub area: f64,
    pub size_class: SizeClass,
    pub crop: RgbImage,
}

impl ChangeRegion {
    pub fn label(&self) -> String {
        format!("#{} {}", self.index, self.size_class)
    }
}

#[derive(Debug, Clone)]
pub struct ChangeReport {
    /// "Before" beside the annotated after frame, both captioned.
    pub composite: RgbImage,
    /// The registered after frame with region boxes and labels.
    pub annotated: RgbImage,
    pub regions: Vec<ChangeRegion>,
    pub registration: AlignmentOutcome<Homography>,
}

/// Binary (0/255) mask of changed pixels between two registered, same-size frames.
pub fn difference_mask(before: &RgbImage, after: &RgbImage, config: &ChangeConfig) -> Result<GrayImage> {
    ensure_same_dimensions(before.dimensions(), after.dimensions())?;

    // --- 1. Smooth ---
    let before_blur = raster_ops::gaussian_blur_rgb(before, config.blur_kernel_size);
    let after_blur = raster_ops::gaussian_blur_rgb(after, config.blur_kernel_size);

    // --- 2. Difference Signals ---
    let gray_diff = raster_ops::abs_diff_gray(&imageops::grayscale(&before_blur), &imageops::grayscale(&after_blur))?;
    let color_diff = imageops::grayscale(&raster_ops::abs_diff_rgb(&before_blur, &after_blur)?);
    let combined = raster_ops::weighted_sum_gray(&gray_diff, config.gray_weight, &color_diff, config.color_weight)?;

    // --- 3. Fixed AND Adaptive Threshold ---
    let fixed = raster_ops::threshold_binary(&combined, config.fixed_threshold);
    let local_mean = raster_ops::gaussian_blur_gray(&combined, config.adaptive_block_size);
    let adaptive = GrayImage::from_fn(combined.width(), combined.height(), |x, y| {
        let v = i32::from(combined.get_pixel(x, y)[0]);
        let mean = i32::from(local_mean.get_pixel(x, y)[0]);
        Luma([if v > mean - config.adaptive_offset { 255 } else { 0 }])
    });
    let mask = raster_ops::bitwise_and(&fixed, &adaptive)?;

    // --- 4. Morphology ---
    let opened = open(&mask, Norm::LInf, 1);
    Ok(dilate(&opened, Norm::LInf, 2))
}

/// Area enclosed by a closed polygon (shoelace formula).
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice.abs() as f64 / 2.0
}

fn bounding_box(points: &[Point<i32>]) -> Option<BoundingBox> {
    let min_x = points.iter().map(|p| p.x).min()?;
    let max_x = points.iter().map(|p| p.x).max()?;
    let min_y = points.iter().map(|p| p.y).min()?;
    let max_y = points.iter().map(|p| p.y).max()?;
    Some(BoundingBox {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Outermost contours of a binary mask, in mask coordinates.
pub fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    let (width, height) = mask.dimensions();
    let mut framed = GrayImage::new(width + 2, height + 2);
    imageops::replace(&mut framed, mask, 1, 1);
    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| c.parent.is_none())
        .map(|c| c.points.into_iter().map(|p| Point::new(p.x - 1, p.y - 1)).collect())
        .collect()
}

/// Outermost contours of `mask` whose area exceeds `min_region_area`, with
/// crops taken from `source`.
pub fn extract_regions(mask: &GrayImage, source: &RgbImage, config: &ChangeConfig) -> Vec<ChangeRegion> {
    let mut boxes: Vec<(BoundingBox, f64)> = outer_contours(mask)
        .into_iter()
        .filter_map(|points| {
            let area = contour_area(&points);
            if area <= config.min_region_area {
                return None;
            }
            bounding_box(&points).map(|b| (b, area))
        })
        .collect();
    boxes.sort_by_key(|(b, _)| (b.y, b.x));

    let (width, height) = source.dimensions();
    let margin = config.crop_margin;
    boxes
        .into_iter()
        .enumerate()
        .map(|(i, (bounding_box, area))| {
            let x1 = bounding_box.x.saturating_sub(margin);
            let y1 = bounding_box.y.saturating_sub(margin);
            let x2 = (bounding_box.x + bounding_box.width + margin).min(width);
            let y2 = (bounding_box.y + bounding_box.height + margin).min(height);
            let crop = imageops::crop_imm(source, x1, y1, x2 - x1, y2 - y1).to_image();
            ChangeRegion {
                index: i + 1,
                bounding_box,
                area,
                size_class: SizeClass::classify(area, config),
                crop,
            }
        })
        .collect()
}

/// Full change pipeline for one before/after pair.
pub fn detect_and_annotate(before: &RgbImage, after: &RgbImage, config: &Config) -> Result<ChangeReport> {
    // --- 1. Resize and Register ---
    let (width, height) = before.dimensions();
    let after = raster_ops::resize_rgb(after, width, height);
    let registration = align_images(before, &after, &config.registrar)?;
    let registered = registration.warped;

    // --- 2. Mask and Regions ---
    let mask = difference_mask(before, &registered, &config.change)?;
    let regions = extract_regions(&mask, &registered, &config.change);

    // --- 3. Render ---
    let annotated = annotator::annotate(&registered, &regions, &config.change)?;
    let composite = annotator::compose_side_by_side(before, &annotated, regions.len());

    Ok(ChangeReport {
        composite,
        annotated,
        regions,
        registration: registration.outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::alignment::UnalignedReason;
    use image::Rgb;

    fn flat(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([60, 70, 80]))
    }

    #[test]
    fn classifies_by_area() {
        let config = ChangeConfig::default();
        assert_eq!(SizeClass::classify(2500.0, &config), SizeClass::Large);
        assert_eq!(SizeClass::classify(2000.0, &config), SizeClass::Medium);
        assert_eq!(SizeClass::classify(801.0, &config), SizeClass::Medium);
        assert_eq!(SizeClass::classify(300.0, &config), SizeClass::Small);
        assert_eq!(SizeClass::Large.thickness(), 4);
    }

    fn textured(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let (bx, by) = (x / 8, y / 8);
            let v = 40 + ((bx * 37 + by * 91) ^ (bx * by * 13)) % 61;
            Rgb([v as u8, (v + 10) as u8, (v + 20) as u8])
        })
    }

    #[test]
    fn shoelace_area_of_square() {
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        assert_eq!(contour_area(&square), 100.0);
    }

    #[test]
    fn single_bright_square_is_one_large_region() {
        let before = flat(200, 150);
        let mut after = before.clone();
        for y in 50..100 {
            for x in 70..120 {
                after.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let report = detect_and_annotate(&before, &after, &Config::default()).unwrap();
        assert_eq!(report.regions.len(), 1);
        let region = &report.regions[0];
        assert_eq!(region.size_class, SizeClass::Large);
        assert_eq!(region.label(), "#1 Large");
        let (cw, ch) = region.crop.dimensions();
        assert!((70..=80).contains(&cw) && (70..=80).contains(&ch), "crop {cw}x{ch}");
        assert_eq!(report.composite.dimensions(), (400, 150));
        assert_eq!(report.registration, AlignmentOutcome::Unaligned(UnalignedReason::NoDescriptors));
    }

    #[test]
    fn square_on_textured_scene_registers_and_is_one_large_region() {
        let before = textured(320, 240);
        let mut after = before.clone();
        for y in 95..145 {
            for x in 140..190 {
                after.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let report = detect_and_annotate(&before, &after, &Config::default()).unwrap();
        assert!(report.registration.is_aligned(), "{:?}", report.registration);
        assert_eq!(report.regions.len(), 1, "regions {:?}", report.regions.iter().map(|r| r.bounding_box).collect::<Vec<_>>());
        assert_eq!(report.regions[0].size_class, SizeClass::Large);
        let b = report.regions[0].bounding_box;
        assert!(b.x <= 140 && b.y <= 95 && b.x + b.width >= 190 && b.y + b.height >= 145, "{b:?}");
    }

    #[test]
    fn blobs_on_every_border_are_found() {
        let mut mask = GrayImage::new(80, 60);
        for y in 20..40 {
            for x in 0..20 {
                mask.put_pixel(x, y, Luma([255]));
                mask.put_pixel(x + 60, y, Luma([255]));
            }
        }
        for y in 0..15 {
            for x in 30..50 {
                mask.put_pixel(x, y, Luma([255]));
                mask.put_pixel(x, y + 45, Luma([255]));
            }
        }
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 4);
        assert!(contours.iter().flatten().all(|p| (0..80).contains(&p.x) && (0..60).contains(&p.y)));
    }

    #[test]
    fn identical_inputs_have_no_regions() {
        let img = RgbImage::from_fn(120, 90, |x, _| Rgb([(x * 2) as u8, 100, 50]));
        let report = detect_and_annotate(&img, &img, &Config::default()).unwrap();
        assert!(report.regions.is_empty());
        assert_eq!(annotator::caption_text(report.regions.len()), "Changes: 0");
    }

    #[test]
    fn crops_are_clipped_at_the_border() {
        let mut mask = GrayImage::new(60, 40);
        for y in 0..30 {
            for x in 0..25 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let source = RgbImage::new(60, 40);
        let regions = extract_regions(&mask, &source, &ChangeConfig::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bounding_box, BoundingBox { x: 0, y: 0, width: 25, height: 30 });
        assert_eq!(regions[0].crop.dimensions(), (35, 40));
    }
}
