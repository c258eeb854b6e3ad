// THEORY:
// Rendering of detected changes. Regions are first painted as filled boxes on
// a copy of the frame that is blended back at low opacity, so the changed area
// stays visible underneath. Sharp borders and labels are drawn afterwards on
// top of the blend: a black outline two pixels wider than the green border
// keeps boxes readable on any background.

use crate::config::ChangeConfig;
use crate::core_modules::change_detector::ChangeRegion;
use crate::core_modules::glyphs::{draw_text_mut, text_size};
use crate::core_modules::raster_ops::{resize_rgb, weighted_sum_rgb};
use crate::error::Result;
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
pub const BEFORE_CAPTION_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const LABEL_SCALE: u32 = 2;
pub const CAPTION_SCALE: u32 = 5;
/// Bottom-left of the caption on each half of the composite.
pub const CAPTION_ORIGIN: (i32, i32) = (30, 60);

pub fn caption_text(count: usize) -> String {
    format!("Changes: {count}")
}

// Inclusive corners to a Rect; `None` if empty.
fn rect_between(x1: i32, y1: i32, x2: i32, y2: i32) -> Option<Rect> {
    (x2 >= x1 && y2 >= y1).then(|| Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

/// A rectangle border `thickness` pixels wide, centred on the edge between
/// the inclusive corners.
fn draw_thick_rect_mut(image: &mut RgbImage, x1: i32, y1: i32, x2: i32, y2: i32, thickness: u32, color: Rgb<u8>) {
    let half = (thickness / 2) as i32;
    for k in 0..thickness as i32 {
        let inset = k - half;
        if let Some(rect) = rect_between(x1 + inset, y1 + inset, x2 - inset, y2 - inset) {
            draw_hollow_rect_mut(image, rect, color);
        }
    }
}

/// Draws translucent fills, borders and `#n Size` labels for every region.
pub fn annotate(frame: &RgbImage, regions: &[ChangeRegion], config: &ChangeConfig) -> Result<RgbImage> {
    // --- 1. Translucent Fill ---
    let mut fill_layer = frame.clone();
    for region in regions {
        let b = region.bounding_box;
        let (x, y) = (b.x as i32, b.y as i32);
        if let Some(rect) = rect_between(x, y, x + b.width as i32, y + b.height as i32) {
            draw_filled_rect_mut(&mut fill_layer, rect, BOX_COLOR);
        }
    }
    let mut annotated = weighted_sum_rgb(&fill_layer, config.fill_alpha, frame, 1.0 - config.fill_alpha)?;

    // --- 2. Borders and Labels ---
    for region in regions {
        let b = region.bounding_box;
        let (x, y, w, h) = (b.x as i32, b.y as i32, b.width as i32, b.height as i32);
        let thickness = region.size_class.thickness();
        draw_thick_rect_mut(&mut annotated, x, y, x + w, y + h, thickness + 2, OUTLINE_COLOR);
        draw_thick_rect_mut(&mut annotated, x, y, x + w, y + h, thickness, BOX_COLOR);

        let label = region.label();
        let (tw, th) = text_size(&label, LABEL_SCALE);
        let (tw, th) = (tw as i32, th as i32);
        let baseline = if y > 30 { y - 10 } else { y + h + 20 };
        if let Some(plate) = rect_between(x, baseline - th - 4, x + tw + 10, baseline + 6) {
            draw_filled_rect_mut(&mut annotated, plate, OUTLINE_COLOR);
        }
        if let Some(plate) = rect_between(x + 2, baseline - th - 2, x + tw + 8, baseline + 4) {
            draw_filled_rect_mut(&mut annotated, plate, BOX_COLOR);
        }
        draw_text_mut(&mut annotated, &label, x + 5, baseline, LABEL_SCALE, OUTLINE_COLOR);
    }
    Ok(annotated)
}

/// "Before" (resized to the annotated frame) on the left, the annotated frame
/// captioned with the change count on the right.
pub fn compose_side_by_side(before: &RgbImage, annotated: &RgbImage, change_count: usize) -> RgbImage {
    let (width, height) = annotated.dimensions();
    let (cx, cy) = CAPTION_ORIGIN;

    let mut left = resize_rgb(before, width, height);
    draw_text_mut(&mut left, "Before", cx, cy, CAPTION_SCALE, BEFORE_CAPTION_COLOR);
    let mut right = annotated.clone();
    draw_text_mut(&mut right, &caption_text(change_count), cx, cy, CAPTION_SCALE, BOX_COLOR);

    let mut composite = RgbImage::new(width * 2, height);
    imageops::replace(&mut composite, &left, 0, 0);
    imageops::replace(&mut composite, &right, i64::from(width), 0);
    composite
}
