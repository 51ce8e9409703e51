use nalgebra::{Matrix4, Point3, Vector4};

use crate::disparity::DisparityMap;

/// One reprojected pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReprojectedPoint {
    pub x: usize,
    pub y: usize,
    /// Position in the rectified left camera frame, in calibration units.
    pub point: Point3<f64>,
}

/// Reproject every valid pixel through the disparity-to-depth matrix `Q`.
///
/// Pixels whose homogeneous weight vanishes (zero disparity with a finite
/// baseline) are skipped.
pub fn reproject_to_3d(map: &DisparityMap, q: &Matrix4<f64>) -> Vec<ReprojectedPoint> {
    let mut out = Vec::with_capacity(map.valid_count());
    for y in 0..map.height() {
        for x in 0..map.width() {
            let Some(d) = map.disparity(x, y) else {
                continue;
            };
            let h = q * Vector4::new(x as f64, y as f64, d as f64, 1.0);
            if h.w.abs() < 1e-12 {
                continue;
            }
            out.push(ReprojectedPoint {
                x,
                y,
                point: Point3::new(h.x / h.w, h.y / h.w, h.z / h.w),
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compute_disparity, BlockMatchParameters};
    use approx::assert_relative_eq;
    use stereo_depth_core::GrayImage;

    #[test]
    fn depth_follows_focal_times_baseline_over_disparity() {
        let (f, baseline, cx, cy) = (500.0, 60.0, 40.0, 12.0);
        let q = Matrix4::new(
            1.0, 0.0, 0.0, -cx, //
            0.0, 1.0, 0.0, -cy, //
            0.0, 0.0, 0.0, f, //
            0.0, 0.0, 1.0 / baseline, 0.0,
        );
        let left = GrayImage::from_fn(80, 24, |x, y| ((x * 97 + y * 13) % 256) as u8 ^ ((x * x) % 255) as u8);
        let right = GrayImage::from_fn(80, 24, |x, y| if x + 4 < 80 { left.get(x + 4, y) } else { 0 });
        let params = BlockMatchParameters {
            min_disparity: 0,
            num_disparities: 16,
            texture_threshold: 0,
            uniqueness_ratio: 0,
            speckle_window_size: 0,
            ..Default::default()
        };
        let map = compute_disparity(&left.view(), &right.view(), &params).expect("map");
        let cloud = reproject_to_3d(&map, &q);
        assert_eq!(cloud.len(), map.valid_count());

        let p = cloud
            .iter()
            .find(|p| p.x == 50 && p.y == 12)
            .expect("centre pixel reprojected");
        let d = map.disparity(50, 12).expect("valid") as f64;
        assert_relative_eq!(p.point.z, f * baseline / d, max_relative = 1e-9);
        assert_relative_eq!(p.point.x, (50.0 - cx) * baseline / d, max_relative = 1e-9);
    }
}
