// THEORY:
// A tiny built-in 5x7 bitmap font for burning labels and captions into output
// rasters. Each glyph is seven row masks whose low five bits are the pixels,
// most significant bit on the left. Glyphs are scaled up by drawing every lit
// cell as a filled square; anything outside the target raster is clipped.
// Lowercase letters render with the uppercase glyphs, unknown characters as '?'.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

pub const GLYPH_WIDTH: u32 = 5;
pub const GLYPH_HEIGHT: u32 = 7;
/// Horizontal advance per character, in font cells (glyph plus one gap).
pub const GLYPH_ADVANCE: u32 = GLYPH_WIDTH + 1;

pub mod font {
    pub const UNKNOWN: [u8; 7] = [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04];

    pub fn glyph(c: char) -> [u8; 7] {
        match c.to_ascii_uppercase() {
            'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
            'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
            'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
            'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
            'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
            'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
            'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
            'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
            'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
            'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
            'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
            'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
            'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
            'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
            'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
            'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
            'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
            'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
            'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
            'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
            'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
            'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
            'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
            'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
            '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
            '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
            '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
            '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
            '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
            '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
            '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
            '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
            '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
            '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
            ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
            '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
            '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
            '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
            '~' => [0x00, 0x00, 0x08, 0x15, 0x02, 0x00, 0x00],
            '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
            ' ' => [0x00; 7],
            _ => UNKNOWN,
        }
    }
}

/// Pixel extent of `text` at `scale`, without trailing gap.
pub fn text_size(text: &str, scale: u32) -> (u32, u32) {
    let chars = text.chars().count() as u32;
    if chars == 0 {
        return (0, 0);
    }
    ((chars * GLYPH_ADVANCE - 1) * scale, GLYPH_HEIGHT * scale)
}

/// Draws `text` with its bottom-left corner at `(x, baseline)`.
pub fn draw_text_mut(image: &mut RgbImage, text: &str, x: i32, baseline: i32, scale: u32, color: Rgb<u8>) {
    let scale = scale.max(1);
    let top = baseline - (GLYPH_HEIGHT * scale) as i32;
    for (i, c) in text.chars().enumerate() {
        let origin_x = x + (i as u32 * GLYPH_ADVANCE * scale) as i32;
        for (row, mask) in font::glyph(c).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if mask & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let cell = Rect::at(origin_x + (col * scale) as i32, top + (row as u32 * scale) as i32)
                    .of_size(scale, scale);
                draw_filled_rect_mut(image, cell, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_characters_have_glyphs() {
        for c in "#12 Small Medium Large Before Changes: 0123456789".chars() {
            if c != ' ' {
                assert_ne!(font::glyph(c), font::UNKNOWN, "missing glyph for {c:?}");
            }
        }
        assert_eq!(font::glyph('@'), font::UNKNOWN);
    }

    #[test]
    fn text_size_scales() {
        assert_eq!(text_size("AB", 1), (11, 7));
        assert_eq!(text_size("AB", 3), (33, 21));
        assert_eq!(text_size("", 2), (0, 0));
    }

    #[test]
    fn draws_inside_the_text_box() {
        let mut img = RgbImage::new(40, 20);
        let green = Rgb([0, 255, 0]);
        draw_text_mut(&mut img, "H1", 2, 16, 2, green);
        let (w, h) = text_size("H1", 2);
        for (x, y, p) in img.enumerate_pixels() {
            if *p == green {
                assert!(x >= 2 && x < 2 + w && y >= 16 - h && y < 16, "stray pixel at ({x}, {y})");
            }
        }
        assert_eq!(*img.get_pixel(2, 2), green);
    }

    #[test]
    fn clipped_text_does_not_panic() {
        let mut img = RgbImage::new(10, 10);
        draw_text_mut(&mut img, "CLIPPED", -4, 3, 3, Rgb([255, 0, 0]));
    }
}
