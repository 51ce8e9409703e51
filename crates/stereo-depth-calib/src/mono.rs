//! Single-camera calibration and the shared parameter packing used by the
//! stereo solve.
//!
//! Camera block (9 values): `[fx, fy/fx, cx, cy, k1, k2, p1, p2, k3]`.
//! Pose block (6 values): Rodrigues rotation then translation.

use log::{debug, info};
use nalgebra::{DVector, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use stereo_depth_core::{
    estimate_homography, CameraIntrinsics, ChessboardObservation, Distortion, ImageSize,
    PinholeCamera, Pose,
};

use crate::error::CalibrationError;
use crate::lm::{solve, LeastSquaresProblem, SolveReport};
use crate::options::CalibrationOptions;
use crate::zhang::{estimate_intrinsics, pose_from_homography};

#[cfg(feature = "tracing")]
use tracing::instrument;

pub(crate) const CAMERA_LEN: usize = 9;
pub(crate) const POSE_LEN: usize = 6;

/// Residual used for points that project behind the camera.
const BEHIND_CAMERA_RESIDUAL: f64 = 1e4;

pub(crate) fn pack_camera(cam: &PinholeCamera, out: &mut [f64]) {
    let k = &cam.intrinsics;
    out[0] = k.fx;
    out[1] = k.fy / k.fx;
    out[2] = k.cx;
    out[3] = k.cy;
    out[4..9].copy_from_slice(&cam.distortion.to_array());
}

pub(crate) fn unpack_camera(p: &[f64]) -> PinholeCamera {
    PinholeCamera::new(
        CameraIntrinsics::new(p[0], p[0] * p[1], p[2], p[3]),
        Distortion::from_array([p[4], p[5], p[6], p[7], p[8]]),
    )
}

pub(crate) fn camera_param_fixed(offset: usize, opts: &CalibrationOptions) -> bool {
    match offset {
        1 => opts.fix_aspect_ratio,
        2 | 3 => opts.fix_principal_point,
        6 | 7 => opts.zero_tangent_dist,
        8 => opts.fix_k3,
        _ => false,
    }
}

pub(crate) fn pack_pose(pose: &Pose, out: &mut [f64]) {
    let r = pose.rodrigues();
    out[..3].copy_from_slice(r.as_slice());
    out[3..6].copy_from_slice(pose.translation.as_slice());
}

pub(crate) fn unpack_pose(p: &[f64]) -> Pose {
    Pose::from_rodrigues(
        Vector3::new(p[0], p[1], p[2]),
        Vector3::new(p[3], p[4], p[5]),
    )
}

/// Append `projected - observed` for every board point.
pub(crate) fn push_reprojection(
    cam: &PinholeCamera,
    board_to_cam: &Pose,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
    out: &mut Vec<f64>,
) {
    for (x, u) in object.iter().zip(observed) {
        match cam.project(&board_to_cam.transform_point(x)) {
            Some(p) => {
                out.push(p.x - u.x);
                out.push(p.y - u.y);
            }
            None => {
                out.push(BEHIND_CAMERA_RESIDUAL);
                out.push(BEHIND_CAMERA_RESIDUAL);
            }
        }
    }
}

/// RMS of per-point reprojection distances for an interleaved `(dx, dy)` residual vector.
pub fn reprojection_rms(residuals: &[f64]) -> f64 {
    let points = residuals.len() / 2;
    if points == 0 {
        return 0.0;
    }
    (residuals.iter().map(|r| r * r).sum::<f64>() / points as f64).sqrt()
}

/// Intrinsics and board poses of one camera.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraCalibration {
    pub image_size: ImageSize,
    pub camera: PinholeCamera,
    /// Board-to-camera pose for every observation, in input order.
    pub board_poses: Vec<Pose>,
    pub rms: f64,
    pub report: SolveReport,
}

/// Linear initialization: per-view homographies, Zhang intrinsics, poses.
pub(crate) fn initial_guess(
    observations: &[ChessboardObservation],
    image_size: ImageSize,
) -> Result<(PinholeCamera, Vec<Pose>), CalibrationError> {
    let homographies = observations
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            estimate_homography(&obs.geometry().planar_points(), obs.image_points()).ok_or_else(
                || CalibrationError::Degenerate(format!("homography of view {i} failed")),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let intrinsics = estimate_intrinsics(&homographies, image_size)?;
    debug!(
        "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy
    );

    let poses = homographies
        .iter()
        .enumerate()
        .map(|(i, h)| {
            pose_from_homography(&intrinsics, h)
                .ok_or_else(|| CalibrationError::Degenerate(format!("pose of view {i} failed")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((PinholeCamera::new(intrinsics, Distortion::none()), poses))
}

struct MonoProblem<'a> {
    observations: &'a [ChessboardObservation],
    object: Vec<Point3<f64>>,
    options: &'a CalibrationOptions,
}

impl MonoProblem<'_> {
    fn unpack(&self, p: &DVector<f64>) -> (PinholeCamera, Vec<Pose>) {
        let cam = unpack_camera(&p.as_slice()[..CAMERA_LEN]);
        let poses = p.as_slice()[CAMERA_LEN..]
            .chunks_exact(POSE_LEN)
            .map(unpack_pose)
            .collect();
        (cam, poses)
    }
}

impl LeastSquaresProblem for MonoProblem<'_> {
    fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
        let (cam, poses) = self.unpack(p);
        let mut out = Vec::with_capacity(2 * self.object.len() * poses.len());
        for (obs, pose) in self.observations.iter().zip(&poses) {
            push_reprojection(&cam, pose, &self.object, obs.image_points(), &mut out);
        }
        DVector::from_vec(out)
    }

    fn is_fixed(&self, index: usize) -> bool {
        index < CAMERA_LEN && camera_param_fixed(index, self.options)
    }
}

/// Calibrate one camera from checkerboard observations.
///
/// Zhang initialization followed by Levenberg–Marquardt refinement of
/// intrinsics, distortion and every board pose.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(observations, options), fields(views = observations.len()))
)]
pub fn calibrate_camera(
    observations: &[ChessboardObservation],
    image_size: ImageSize,
    options: &CalibrationOptions,
) -> Result<CameraCalibration, CalibrationError> {
    let Some(first) = observations.first() else {
        return Err(CalibrationError::InsufficientObservations {
            found: 0,
            required: options.min_pairs.max(1),
        });
    };
    if observations.iter().any(|o| o.geometry() != first.geometry()) {
        return Err(CalibrationError::Degenerate(
            "observations use different board geometries".into(),
        ));
    }

    let (camera, poses) = initial_guess(observations, image_size)?;
    let mut x0 = DVector::zeros(CAMERA_LEN + POSE_LEN * poses.len());
    pack_camera(&camera, &mut x0.as_mut_slice()[..CAMERA_LEN]);
    for (k, pose) in poses.iter().enumerate() {
        let at = CAMERA_LEN + POSE_LEN * k;
        pack_pose(pose, &mut x0.as_mut_slice()[at..at + POSE_LEN]);
    }

    let problem = MonoProblem {
        observations,
        object: first.object_points(),
        options,
    };
    let (x, report) = solve(&problem, x0, &options.solver);
    let rms = reprojection_rms(problem.residuals(&x).as_slice());
    debug!("mono solve: {report:?}, rms {rms:.4}");

    if !rms.is_finite() || rms > options.max_rms_px {
        return Err(CalibrationError::SolverDivergence {
            rms,
            max_rms: options.max_rms_px,
        });
    }

    let (camera, board_poses) = problem.unpack(&x);
    info!(
        "camera calibrated from {} views: fx={:.2} fy={:.2} rms={:.4}px",
        observations.len(),
        camera.intrinsics.fx,
        camera.intrinsics.fy,
        rms
    );
    Ok(CameraCalibration {
        image_size,
        camera,
        board_poses,
        rms,
        report,
    })
}
