//! Bouguet stereo rectification transforms.
//!
//! Both cameras are rotated by half of the relative rotation each, then a
//! common rotation aligns the baseline with the image x axis (or y axis for a
//! vertical rig). The new projection matrices share one focal length, so
//! corresponding points land on the same row.

use nalgebra::{Matrix3, Matrix3x4, Matrix4, Point2, Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};
use stereo_depth_core::{ImageSize, PinholeCamera};

use crate::error::CalibrationError;

/// Rectification options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RectifyOptions {
    /// Give both rectified views the same principal point (zero disparity at infinity).
    pub zero_disparity: bool,
}

/// Per-camera rectifying rotations, projections and the disparity-to-depth matrix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectificationTransforms {
    pub r1: Matrix3<f64>,
    pub r2: Matrix3<f64>,
    pub p1: Matrix3x4<f64>,
    pub p2: Matrix3x4<f64>,
    /// Maps `(x, y, disparity, 1)` to homogeneous 3D points in the rectified left frame.
    pub q: Matrix4<f64>,
}

impl RectificationTransforms {
    /// Rectified focal length shared by both views.
    pub fn focal_length(&self) -> f64 {
        self.p1[(0, 0)]
    }

    /// Baseline length in board units.
    pub fn baseline(&self) -> f64 {
        let fc = self.focal_length();
        let shift = if self.p2[(0, 3)] != 0.0 {
            self.p2[(0, 3)]
        } else {
            self.p2[(1, 3)]
        };
        (shift / fc).abs()
    }

    /// `(R, P)` for one side.
    pub fn side(&self, right: bool) -> (&Matrix3<f64>, &Matrix3x4<f64>) {
        if right {
            (&self.r2, &self.p2)
        } else {
            (&self.r1, &self.p1)
        }
    }
}

/// Compute rectification transforms for a calibrated rig.
///
/// `rotation`/`translation` map left-camera coordinates into the right camera.
pub fn stereo_rectify(
    left: &PinholeCamera,
    right: &PinholeCamera,
    image_size: ImageSize,
    rotation: &Matrix3<f64>,
    translation: &Vector3<f64>,
    options: RectifyOptions,
) -> Result<RectificationTransforms, CalibrationError> {
    if translation.norm() < 1e-12 {
        return Err(CalibrationError::Degenerate("zero baseline".into()));
    }
    if image_size.is_empty() {
        return Err(CalibrationError::Degenerate("empty image size".into()));
    }

    let om = Rotation3::from_matrix_unchecked(*rotation).scaled_axis();
    let r_r = Rotation3::new(om * -0.5).into_inner();
    let t = r_r * translation;

    // Horizontal rig when the baseline is mostly along x.
    let idx = if t.x.abs() > t.y.abs() { 0 } else { 1 };
    let c = t[idx];
    let nt = t.norm();
    let mut uu = Vector3::zeros();
    uu[idx] = if c > 0.0 { 1.0 } else { -1.0 };

    let mut ww = t.cross(&uu);
    let nw = ww.norm();
    if nw > 0.0 {
        ww *= (c.abs() / nt).clamp(-1.0, 1.0).acos() / nw;
    }
    let w_r = Rotation3::new(ww).into_inner();

    let r1 = w_r * r_r.transpose();
    let r2 = w_r * r_r;
    let t_new = r2 * translation;

    let (nx, ny) = (image_size.width as f64, image_size.height as f64);
    let cams = [left, right];
    let rots = [r1, r2];

    let mut fc_new = f64::MAX;
    for cam in cams {
        let k = cam.intrinsics.matrix();
        let mut fc = k[(idx ^ 1, idx ^ 1)];
        let k1 = cam.distortion.k1;
        if k1 < 0.0 {
            fc *= 1.0 + k1 * (nx * nx + ny * ny) / (4.0 * fc * fc);
        }
        fc_new = fc_new.min(fc);
    }

    let mut cc_new = [Vector2::zeros(); 2];
    for (k, (cam, r)) in cams.iter().zip(rots.iter()).enumerate() {
        let corners = [
            Point2::new(0.0, 0.0),
            Point2::new(nx - 1.0, 0.0),
            Point2::new(0.0, ny - 1.0),
            Point2::new(nx - 1.0, ny - 1.0),
        ];
        let mut avg = Vector2::zeros();
        for p in corners {
            let n = cam.undistort_pixel(p);
            let x = r * Vector3::new(n.x, n.y, 1.0);
            avg += Vector2::new(fc_new * x.x / x.z, fc_new * x.y / x.z);
        }
        avg /= 4.0;
        cc_new[k] = Vector2::new((nx - 1.0) / 2.0, (ny - 1.0) / 2.0) - avg;
    }

    if options.zero_disparity {
        let mean = (cc_new[0] + cc_new[1]) * 0.5;
        cc_new = [mean, mean];
    } else {
        let other = idx ^ 1;
        let mean = (cc_new[0][other] + cc_new[1][other]) * 0.5;
        cc_new[0][other] = mean;
        cc_new[1][other] = mean;
    }

    let projection = |cc: &Vector2<f64>| {
        Matrix3x4::new(
            fc_new, 0.0, cc.x, 0.0, //
            0.0, fc_new, cc.y, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        )
    };
    let p1 = projection(&cc_new[0]);
    let mut p2 = projection(&cc_new[1]);
    p2[(idx, 3)] = t_new[idx] * fc_new;

    let tx = t_new[idx];
    let q = Matrix4::new(
        1.0, 0.0, 0.0, -cc_new[0].x, //
        0.0, 1.0, 0.0, -cc_new[0].y, //
        0.0, 0.0, 0.0, fc_new, //
        0.0, 0.0, -1.0 / tx, (cc_new[0][idx] - cc_new[1][idx]) / tx,
    );

    Ok(RectificationTransforms { r1, r2, p1, p2, q })
}

/// Essential matrix `[T]x R`.
pub fn essential_matrix(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix3<f64> {
    stereo_depth_core::skew(translation) * rotation
}

/// Fundamental matrix `K_r^-T E K_l^-1`, normalized so its largest entry is 1.
pub fn fundamental_matrix(
    left: &PinholeCamera,
    right: &PinholeCamera,
    essential: &Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let kl_inv = left.intrinsics.matrix().try_inverse()?;
    let kr_inv = right.intrinsics.matrix().try_inverse()?;
    let f = kr_inv.transpose() * essential * kl_inv;
    let scale = f.amax();
    (scale > 0.0).then(|| f / scale)
}
