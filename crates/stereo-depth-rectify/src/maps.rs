//! Per-camera remap tables (`initUndistortRectifyMap` semantics).
//!
//! For every destination pixel `(u, v)` the table stores the source pixel of
//! the raw, distorted image: back-project through `(P[:, :3] * R)^-1`, apply
//! lens distortion, then the camera intrinsics.

use nalgebra::{Matrix3, Matrix3x4, Point2, Vector2, Vector3};
use stereo_depth_core::{ImageSize, PinholeCamera};

/// Source coordinate written for destination pixels with no valid preimage.
pub(crate) const OUTSIDE: f32 = -1.0e6;

/// Source coordinates for every destination pixel, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RectificationMap {
    size: ImageSize,
    map_x: Vec<f32>,
    map_y: Vec<f32>,
}

impl RectificationMap {
    /// Build the map for one camera.
    ///
    /// `rotation` is the rectifying rotation (`R1` or `R2`), `projection` the
    /// matching rectified projection (`P1` or `P2`). Returns `None` when
    /// `P[:, :3] * R` is singular.
    pub fn new(
        camera: &PinholeCamera,
        rotation: &Matrix3<f64>,
        projection: &Matrix3x4<f64>,
        size: ImageSize,
    ) -> Option<Self> {
        let inv = (projection.fixed_view::<3, 3>(0, 0) * rotation).try_inverse()?;
        let mut map_x = Vec::with_capacity(size.area());
        let mut map_y = Vec::with_capacity(size.area());

        for v in 0..size.height {
            for u in 0..size.width {
                let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                let src = if ray.z > 1e-12 {
                    let n = Vector2::new(ray.x / ray.z, ray.y / ray.z);
                    let p = camera
                        .intrinsics
                        .normalized_to_pixel(camera.distortion.distort(n));
                    if p.x.is_finite() && p.y.is_finite() {
                        (p.x as f32, p.y as f32)
                    } else {
                        (OUTSIDE, OUTSIDE)
                    }
                } else {
                    (OUTSIDE, OUTSIDE)
                };
                map_x.push(src.0);
                map_y.push(src.1);
            }
        }

        Some(Self { size, map_x, map_y })
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Source pixel sampled for destination `(u, v)`.
    #[inline]
    pub fn source(&self, u: usize, v: usize) -> Point2<f32> {
        let i = v * self.size.width + u;
        Point2::new(self.map_x[i], self.map_y[i])
    }

    pub fn map_x(&self) -> &[f32] {
        &self.map_x
    }

    pub fn map_y(&self) -> &[f32] {
        &self.map_y
    }
}

/// Map raw pixel coordinates into the rectified image: undistort, rotate by
/// `R`, project with `P`.
pub fn rectify_point(
    camera: &PinholeCamera,
    rotation: &Matrix3<f64>,
    projection: &Matrix3x4<f64>,
    p: Point2<f64>,
) -> Option<Point2<f64>> {
    let n = camera.undistort_pixel(p);
    let x = rotation * Vector3::new(n.x, n.y, 1.0);
    let h = projection.fixed_view::<3, 3>(0, 0) * x;
    (h.z.abs() > 1e-12).then(|| Point2::new(h.x / h.z, h.y / h.z))
}
