//! Display helpers. These are derived views; the fixed-point map stays canonical.

use stereo_depth_core::{GrayImage, RgbImage};

use crate::disparity::DisparityMap;

impl DisparityMap {
    /// Min-max stretch of the valid disparities to `0..=255`.
    ///
    /// Invalid pixels are 0. A map with no valid pixels, or a single valid
    /// value, yields an all-zero image.
    pub fn to_normalized_u8(&self) -> GrayImage {
        let invalid = self.invalid_value();
        let (lo, hi) = self
            .data()
            .iter()
            .filter(|&&v| v != invalid)
            .fold((i16::MAX, i16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let mut out = GrayImage::new(self.width(), self.height());
        if lo >= hi {
            return out;
        }
        let scale = 255.0 / (hi as f32 - lo as f32);
        for (dst, &v) in out.data.iter_mut().zip(self.data()) {
            if v != invalid {
                *dst = ((v as i32 - lo as i32) as f32 * scale).round() as u8;
            }
        }
        out
    }
}

/// Disparities in pixels with NaN for invalid pixels.
pub fn disparity_to_f32(map: &DisparityMap) -> Vec<f32> {
    map.to_f32()
}

/// JET colour for an intensity in `0..=255` (blue → cyan → yellow → red).
pub fn jet(v: u8) -> [u8; 3] {
    let t = v as f32 / 255.0;
    let channel = |centre: f32| ((1.5 - (4.0 * t - centre).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(3.0), channel(2.0), channel(1.0)]
}

/// False-colour rendering of a gray visualization.
pub fn apply_jet_colormap(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width, gray.height);
    for y in 0..gray.height {
        for x in 0..gray.width {
            out.put_pixel(x, y, jet(gray.get(x, y)));
        }
    }
    out
}
