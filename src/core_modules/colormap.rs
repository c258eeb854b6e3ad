// THEORY:
// Pseudo-colouring of a single-channel intensity raster. Each map is a pure
// function `u8 -> Rgb<u8>`; a full 256-entry lookup table is built once per
// call and applied pixel by pixel.

use clap::ValueEnum;
use image::{GrayImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    /// Blue → cyan → yellow → red.
    #[default]
    Jet,
    /// Black → red → yellow → white.
    Hot,
    /// Perceptually uniform black → purple → orange → pale yellow.
    Inferno,
    Gray,
}

// Samples of matplotlib's inferno at t = 0, 1/8, ..., 1.
const INFERNO_STOPS: [[f64; 3]; 9] = [
    [0.0, 0.0, 4.0],
    [31.0, 12.0, 72.0],
    [85.0, 15.0, 109.0],
    [136.0, 34.0, 106.0],
    [186.0, 54.0, 85.0],
    [227.0, 89.0, 51.0],
    [249.0, 140.0, 10.0],
    [249.0, 201.0, 50.0],
    [252.0, 255.0, 164.0],
];

impl Colormap {
    /// The colour of a single intensity.
    pub fn color(self, value: u8) -> Rgb<u8> {
        let v = f64::from(value) / 255.0;
        match self {
            Colormap::Jet => Rgb([
                unit_to_u8(1.5 - (4.0 * v - 3.0).abs()),
                unit_to_u8(1.5 - (4.0 * v - 2.0).abs()),
                unit_to_u8(1.5 - (4.0 * v - 1.0).abs()),
            ]),
            Colormap::Hot => Rgb([
                unit_to_u8(3.0 * v),
                unit_to_u8(3.0 * v - 1.0),
                unit_to_u8(3.0 * v - 2.0),
            ]),
            Colormap::Inferno => {
                let pos = v * (INFERNO_STOPS.len() - 1) as f64;
                let i = (pos.floor() as usize).min(INFERNO_STOPS.len() - 2);
                let t = pos - i as f64;
                let (a, b) = (INFERNO_STOPS[i], INFERNO_STOPS[i + 1]);
                let lerp = |c: usize| (a[c] + (b[c] - a[c]) * t).round().clamp(0.0, 255.0) as u8;
                Rgb([lerp(0), lerp(1), lerp(2)])
            }
            Colormap::Gray => Rgb([value, value, value]),
        }
    }

    pub fn lookup_table(self) -> [Rgb<u8>; 256] {
        std::array::from_fn(|i| self.color(i as u8))
    }

    /// Colorizes every pixel of `image`.
    pub fn apply(self, image: &GrayImage) -> RgbImage {
        let lut = self.lookup_table();
        RgbImage::from_fn(image.width(), image.height(), |x, y| {
            lut[image.get_pixel(x, y)[0] as usize]
        })
    }
}

fn unit_to_u8(value: f64) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
