use stereo_depth_core::{sample_bilinear_u8, GrayImage, GrayImageView, RgbImage};

use crate::maps::RectificationMap;

/// Bilinear remap of a gray image. Samples outside the source read as 0.
///
/// The caller guarantees that the map and the source share the same size.
pub fn remap_gray(src: &GrayImageView<'_>, map: &RectificationMap) -> GrayImage {
    let size = map.size();
    GrayImage::from_fn(size.width, size.height, |u, v| {
        let p = map.source(u, v);
        sample_bilinear_u8(src, p.x, p.y)
    })
}

/// Per-channel bilinear remap of an RGB image.
pub fn remap_rgb(src: &RgbImage, map: &RectificationMap) -> RgbImage {
    let size = map.size();
    let channels: Vec<GrayImage> = (0..3).map(|c| src.channel(c)).collect();
    let mut out = RgbImage::new(size.width, size.height);
    for v in 0..size.height {
        for u in 0..size.width {
            let p = map.source(u, v);
            let px = [0, 1, 2].map(|c| sample_bilinear_u8(&channels[c].view(), p.x, p.y));
            out.put_pixel(u, v, px);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Matrix3x4};
    use stereo_depth_core::{CameraIntrinsics, Distortion, ImageSize, PinholeCamera};

    /// Map that shifts the image right by `dx` pixels.
    fn shift_map(size: ImageSize, dx: f64) -> RectificationMap {
        let cam = PinholeCamera::new(
            CameraIntrinsics::new(100.0, 100.0, 10.0, 10.0),
            Distortion::none(),
        );
        let p = Matrix3x4::new(
            100.0, 0.0, 10.0 + dx, 0.0, //
            0.0, 100.0, 10.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        );
        RectificationMap::new(&cam, &Matrix3::identity(), &p, size).expect("map")
    }

    #[test]
    fn shifted_map_moves_content_and_pads_with_zero() {
        let size = ImageSize::new(8, 4);
        let src = GrayImage::from_fn(8, 4, |x, _| 10 + x as u8 * 20);
        let out = remap_gray(&src.view(), &shift_map(size, 2.0));
        assert_eq!(out.get(0, 1), 0);
        assert_eq!(out.get(1, 1), 0);
        assert_eq!(out.get(2, 1), src.get(0, 1));
        assert_eq!(out.get(7, 3), src.get(5, 3));
    }

    #[test]
    fn rgb_remap_matches_gray_per_channel() {
        let size = ImageSize::new(6, 5);
        let mut src = RgbImage::new(6, 5);
        for y in 0..5 {
            for x in 0..6 {
                src.put_pixel(x, y, [x as u8 * 40, y as u8 * 50, 200]);
            }
        }
        let map = shift_map(size, 1.0);
        let out = remap_rgb(&src, &map);
        let green = remap_gray(&src.channel(1).view(), &map);
        for y in 0..5 {
            for x in 0..6 {
                assert_eq!(out.pixel(x, y)[1], green.get(x, y));
            }
        }
        assert_eq!(out.pixel(0, 0), [0, 0, 0]);
        assert_eq!(out.pixel(3, 2), src.pixel(2, 2));
    }
}
