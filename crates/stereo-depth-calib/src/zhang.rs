//! Closed-form initialization from planar homographies (Zhang's method).

use nalgebra::{DMatrix, Matrix3, Vector3};
use stereo_depth_core::{nearest_rotation, CameraIntrinsics, Homography, ImageSize, Pose};

use crate::error::CalibrationError;

/// Pixel conditioning transform: centre on the image and scale by its larger side.
fn conditioning(size: ImageSize) -> Matrix3<f64> {
    let s = size.width.max(size.height).max(1) as f64;
    let cx = (size.width as f64 - 1.0) * 0.5;
    let cy = (size.height as f64 - 1.0) * 0.5;
    Matrix3::new(
        1.0 / s, 0.0, -cx / s, //
        0.0, 1.0 / s, -cy / s, //
        0.0, 0.0, 1.0,
    )
}

/// Row `v_ij` of Zhang's constraint system, with `h_i` the i-th column of `H`.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> [f64; 6] {
    [
        h[(0, i)] * h[(0, j)],
        h[(0, i)] * h[(1, j)] + h[(1, i)] * h[(0, j)],
        h[(1, i)] * h[(1, j)],
        h[(2, i)] * h[(0, j)] + h[(0, i)] * h[(2, j)],
        h[(2, i)] * h[(1, j)] + h[(1, i)] * h[(2, j)],
        h[(2, i)] * h[(2, j)],
    ]
}

fn sub6(a: [f64; 6], b: [f64; 6]) -> [f64; 6] {
    std::array::from_fn(|k| a[k] - b[k])
}

/// General closed form with a zero-skew prior. Needs at least 3 views in general position.
fn closed_form(hs: &[Matrix3<f64>]) -> Option<Matrix3<f64>> {
    let rows = 2 * hs.len() + 1;
    let mut v = DMatrix::<f64>::zeros(rows.max(6), 6);
    for (k, h) in hs.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let d = sub6(v_ij(h, 0, 0), v_ij(h, 1, 1));
        for c in 0..6 {
            v[(2 * k, c)] = v12[c];
            v[(2 * k + 1, c)] = d[c];
        }
    }
    // skew = 0  <=>  B12 = 0
    v[(2 * hs.len(), 1)] = 1.0;

    let svd = v.svd(false, true);
    let vt = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let mut b: Vec<f64> = vt.row(min_idx).iter().copied().collect();
    if b[0] < 0.0 {
        b.iter_mut().for_each(|x| *x = -*x);
    }
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let den = b11 * b22 - b12 * b12;
    if den.abs() < 1e-300 || b11 <= 0.0 {
        return None;
    }
    let v0 = (b12 * b13 - b11 * b23) / den;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda / b11 <= 0.0 || lambda * b11 / den <= 0.0 {
        return None;
    }
    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / den).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = Matrix3::new(
        alpha, 0.0, u0, //
        0.0, beta, v0, //
        0.0, 0.0, 1.0,
    );
    k.iter().all(|x| x.is_finite()).then_some(k)
}

/// Focal lengths with the principal point fixed at the (conditioned) origin.
///
/// `B = diag(a, b, 1)` with `a = 1/fx²`, `b = 1/fy²`, solved by least squares.
fn centered_focal(hs: &[Matrix3<f64>]) -> Option<Matrix3<f64>> {
    let mut a = DMatrix::<f64>::zeros(2 * hs.len(), 2);
    let mut rhs = nalgebra::DVector::<f64>::zeros(2 * hs.len());
    for (k, h) in hs.iter().enumerate() {
        let v12 = v_ij(h, 0, 1);
        let d = sub6(v_ij(h, 0, 0), v_ij(h, 1, 1));
        a[(2 * k, 0)] = v12[0];
        a[(2 * k, 1)] = v12[2];
        rhs[2 * k] = -v12[5];
        a[(2 * k + 1, 0)] = d[0];
        a[(2 * k + 1, 1)] = d[2];
        rhs[2 * k + 1] = -d[5];
    }
    let sol = a.svd(true, true).solve(&rhs, 1e-15).ok()?;
    let (ia, ib) = (sol[0], sol[1]);
    if ia <= 0.0 || ib <= 0.0 {
        return None;
    }
    Some(Matrix3::new(
        1.0 / ia.sqrt(),
        0.0,
        0.0,
        0.0,
        1.0 / ib.sqrt(),
        0.0,
        0.0,
        0.0,
        1.0,
    ))
}

/// Initial intrinsics from board-to-image homographies.
///
/// Uses the general closed form with three or more views and falls back to a
/// centred principal point otherwise (or when the closed form is not
/// positive definite). With no usable constraint at all, the focal length
/// defaults to the larger image side.
pub fn estimate_intrinsics(
    homographies: &[Homography],
    image_size: ImageSize,
) -> Result<CameraIntrinsics, CalibrationError> {
    if homographies.is_empty() {
        return Err(CalibrationError::InsufficientObservations {
            found: 0,
            required: 1,
        });
    }
    let n = conditioning(image_size);
    let n_inv = n
        .try_inverse()
        .ok_or_else(|| CalibrationError::Degenerate("image size is zero".into()))?;
    let hs: Vec<Matrix3<f64>> = homographies.iter().map(|h| n * h.h).collect();

    let k_cond = if hs.len() >= 3 {
        closed_form(&hs).or_else(|| centered_focal(&hs))
    } else {
        centered_focal(&hs)
    };

    let k = match k_cond {
        Some(k_cond) => n_inv * k_cond,
        None => {
            log::warn!("homographies do not constrain the focal length, using image size");
            let f = image_size.width.max(image_size.height) as f64;
            n_inv * Matrix3::new(f * n[(0, 0)], 0.0, 0.0, 0.0, f * n[(0, 0)], 0.0, 0.0, 0.0, 1.0)
        }
    };
    Ok(CameraIntrinsics::from_matrix(&k))
}

/// Board pose from a homography and known intrinsics.
///
/// The board sits in front of the camera (`t_z > 0`).
pub fn pose_from_homography(k: &CameraIntrinsics, h: &Homography) -> Option<Pose> {
    let a = k.matrix().try_inverse()? * h.h;
    let a1: Vector3<f64> = a.column(0).into();
    let a2: Vector3<f64> = a.column(1).into();
    let a3: Vector3<f64> = a.column(2).into();

    let norm = 0.5 * (a1.norm() + a2.norm());
    if norm < 1e-12 {
        return None;
    }
    let mut lambda = 1.0 / norm;
    if a3.z * lambda < 0.0 {
        lambda = -lambda;
    }
    let r1 = a1 * lambda;
    let r2 = a2 * lambda;
    let r3 = r1.cross(&r2);
    let t = a3 * lambda;

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    Some(Pose::new(nearest_rotation(&r)?, t))
}
