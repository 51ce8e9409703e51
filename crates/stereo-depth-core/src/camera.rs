//! Pinhole camera model with Brown–Conrady distortion and rigid poses.
//!
//! Conventions:
//! - pixel coordinates use integer pixel centres (`(0, 0)` is the centre of
//!   the top-left pixel);
//! - normalized coordinates are `(X / Z, Y / Z)` in the camera frame;
//! - distortion coefficients follow the `[k1, k2, p1, p2, k3]` order.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

const UNDISTORT_ITERATIONS: usize = 20;

/// Focal lengths and principal point, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// The 3x3 intrinsic matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read intrinsics back from a `K` matrix. Skew is ignored.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self::new(k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)])
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        Vector2::new((p.x - self.cx) / self.fx, (p.y - self.cy) / self.fy)
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(self.fx * n.x + self.cx, self.fy * n.y + self.cy)
    }
}

/// Radial-tangential lens distortion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    /// Accepts 4 to 8 coefficients in `[k1, k2, p1, p2, k3, k4, k5, k6]` order.
    ///
    /// Rational terms (`k4..k6`) are not modelled, so they must be zero.
    pub fn from_slice(c: &[f64]) -> Option<Self> {
        if !(4..=8).contains(&c.len()) {
            return None;
        }
        if c.iter().skip(5).any(|v| *v != 0.0) {
            return None;
        }
        let k3 = c.get(4).copied().unwrap_or(0.0);
        Some(Self::from_array([c[0], c[1], c[2], c[3], k3]))
    }

    pub fn is_zero(&self) -> bool {
        self.to_array().iter().all(|v| *v == 0.0)
    }

    /// Apply distortion to an ideal normalized point.
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let xy2 = 2.0 * x * y;
        Vector2::new(
            x * radial + self.p1 * xy2 + self.p2 * (r2 + 2.0 * x * x),
            y * radial + self.p1 * (r2 + 2.0 * y * y) + self.p2 * xy2,
        )
    }

    /// Invert [`Distortion::distort`] by fixed-point iteration.
    pub fn undistort(&self, d: Vector2<f64>) -> Vector2<f64> {
        if self.is_zero() {
            return d;
        }
        let mut x = d.x;
        let mut y = d.y;
        for _ in 0..UNDISTORT_ITERATIONS {
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            if radial.abs() < 1e-12 {
                break;
            }
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            x = (d.x - dx) / radial;
            y = (d.y - dy) / radial;
        }
        Vector2::new(x, y)
    }
}

/// Intrinsics plus distortion of one camera.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PinholeCamera {
    pub intrinsics: CameraIntrinsics,
    pub distortion: Distortion,
}

impl PinholeCamera {
    pub fn new(intrinsics: CameraIntrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Project a point given in the camera frame. Returns `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= 1e-12 {
            return None;
        }
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        Some(self.intrinsics.normalized_to_pixel(self.distortion.distort(n)))
    }

    /// Map a distorted pixel to ideal normalized coordinates.
    pub fn undistort_pixel(&self, p: Point2<f64>) -> Vector2<f64> {
        self.distortion
            .undistort(self.intrinsics.pixel_to_normalized(p))
    }
}

/// Rigid transform `x_dst = R * x_src + t`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl Pose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Rotation3::identity(), Vector3::zeros())
    }

    /// Build from a Rodrigues (axis * angle) vector.
    pub fn from_rodrigues(rvec: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self::new(Rotation3::new(rvec), translation)
    }

    pub fn rodrigues(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    pub fn inverse(&self) -> Self {
        let r_inv = self.rotation.inverse();
        Self::new(r_inv, -(r_inv * self.translation))
    }

    /// `self ∘ other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &Pose) -> Self {
        Self::new(
            self.rotation * other.rotation,
            self.rotation * other.translation + self.translation,
        )
    }
}

/// Cross-product matrix `[v]x`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y, //
        v.z, 0.0, -v.x, //
        -v.y, v.x, 0.0,
    )
}

/// Nearest rotation (Frobenius norm) to an arbitrary 3x3 matrix.
pub fn nearest_rotation(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.column_mut(2).neg_mut();
        r = u_fixed * v_t;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_camera() -> PinholeCamera {
        PinholeCamera::new(
            CameraIntrinsics::new(600.0, 610.0, 320.0, 240.0),
            Distortion::from_array([-0.21, 0.08, 0.001, -0.0015, -0.01]),
        )
    }

    #[test]
    fn undistort_inverts_distort() {
        let cam = sample_camera();
        for (x, y) in [(0.0, 0.0), (0.3, -0.2), (-0.45, 0.35)] {
            let ideal = Vector2::new(x, y);
            let d = cam.distortion.distort(ideal);
            let back = cam.distortion.undistort(d);
            assert_relative_eq!(back, ideal, epsilon = 1e-9);
        }
    }

    #[test]
    fn projection_round_trips_through_undistortion() {
        let cam = sample_camera();
        let p = Point3::new(0.12, -0.08, 1.3);
        let px = cam.project(&p).expect("in front");
        let n = cam.undistort_pixel(px);
        assert_relative_eq!(n, Vector2::new(p.x / p.z, p.y / p.z), epsilon = 1e-9);
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn pose_inverse_and_compose() {
        let pose = Pose::from_rodrigues(Vector3::new(0.1, -0.2, 0.05), Vector3::new(1.0, 2.0, 3.0));
        let id = pose.compose(&pose.inverse());
        assert_relative_eq!(id.rotation.matrix(), &Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(id.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(pose.rodrigues(), Vector3::new(0.1, -0.2, 0.05), epsilon = 1e-12);
    }

    #[test]
    fn nearest_rotation_projects_noisy_matrix() {
        let r = Rotation3::new(Vector3::new(0.3, 0.1, -0.4));
        let noisy = r.matrix() + Matrix3::from_element(1e-3);
        let fixed = nearest_rotation(&noisy).expect("svd");
        assert_relative_eq!(fixed.matrix().determinant(), 1.0, epsilon = 1e-9);
        assert!((fixed.matrix() - r.matrix()).norm() < 1e-2);
    }

    #[test]
    fn distortion_slice_accepts_zero_rational_terms() {
        assert!(Distortion::from_slice(&[0.1, 0.0, 0.0, 0.0]).is_some());
        assert!(Distortion::from_slice(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]).is_some());
        assert!(Distortion::from_slice(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.2]).is_none());
        assert!(Distortion::from_slice(&[0.1, 0.0]).is_none());
    }
}
