//! Joint stereo refinement.
//!
//! Parameter layout: left camera block, right camera block, left-to-right
//! pose, then one board-to-left pose per pair. The right camera sees the
//! board through `relative ∘ board_to_left`.

use log::debug;
use nalgebra::{DVector, Matrix3, Point3, Vector3};
use stereo_depth_core::{nearest_rotation, ChessboardObservation, PinholeCamera, Pose};

use crate::error::CalibrationError;
use crate::lm::{solve, LeastSquaresProblem, SolveReport};
use crate::mono::{
    camera_param_fixed, pack_camera, pack_pose, push_reprojection, reprojection_rms,
    unpack_camera, unpack_pose, CameraCalibration, CAMERA_LEN, POSE_LEN,
};
use crate::options::CalibrationOptions;

const RIGHT_AT: usize = CAMERA_LEN;
const RELATIVE_AT: usize = 2 * CAMERA_LEN;
const VIEWS_AT: usize = 2 * CAMERA_LEN + POSE_LEN;

/// Jointly refined stereo rig.
#[derive(Clone, Debug)]
pub(crate) struct StereoSolution {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    /// Maps left-camera coordinates to right-camera coordinates.
    pub relative: Pose,
    pub rms_left: f64,
    pub rms_right: f64,
    pub rms: f64,
    pub report: SolveReport,
}

/// Average of per-view relative poses `T_r * T_l^-1`.
pub(crate) fn average_relative_pose(left: &[Pose], right: &[Pose]) -> Option<Pose> {
    if left.is_empty() || left.len() != right.len() {
        return None;
    }
    let mut r_sum = Matrix3::zeros();
    let mut t_sum = Vector3::zeros();
    for (l, r) in left.iter().zip(right) {
        let rel = r.compose(&l.inverse());
        r_sum += rel.rotation.matrix();
        t_sum += rel.translation;
    }
    let n = left.len() as f64;
    Some(Pose::new(nearest_rotation(&(r_sum / n))?, t_sum / n))
}

struct StereoProblem<'a> {
    pairs: &'a [(ChessboardObservation, ChessboardObservation)],
    object: Vec<Point3<f64>>,
    options: &'a CalibrationOptions,
}

struct Unpacked {
    left: PinholeCamera,
    right: PinholeCamera,
    relative: Pose,
    views: Vec<Pose>,
}

impl StereoProblem<'_> {
    fn unpack(&self, p: &DVector<f64>) -> Unpacked {
        let s = p.as_slice();
        let left = unpack_camera(&s[..CAMERA_LEN]);
        let mut right_block = [0.0; CAMERA_LEN];
        right_block.copy_from_slice(&s[RIGHT_AT..RIGHT_AT + CAMERA_LEN]);
        if self.options.same_focal_length {
            right_block[0] = s[0];
            right_block[1] = s[1];
        }
        Unpacked {
            left,
            right: unpack_camera(&right_block),
            relative: unpack_pose(&s[RELATIVE_AT..RELATIVE_AT + POSE_LEN]),
            views: s[VIEWS_AT..].chunks_exact(POSE_LEN).map(unpack_pose).collect(),
        }
    }

    /// Left and right residuals, kept apart for per-camera RMS.
    fn split_residuals(&self, p: &DVector<f64>) -> (Vec<f64>, Vec<f64>) {
        let u = self.unpack(p);
        let per_view = 2 * self.object.len();
        let mut left = Vec::with_capacity(per_view * self.pairs.len());
        let mut right = Vec::with_capacity(per_view * self.pairs.len());
        for ((obs_l, obs_r), pose) in self.pairs.iter().zip(&u.views) {
            push_reprojection(&u.left, pose, &self.object, obs_l.image_points(), &mut left);
            let to_right = u.relative.compose(pose);
            push_reprojection(&u.right, &to_right, &self.object, obs_r.image_points(), &mut right);
        }
        (left, right)
    }
}

impl LeastSquaresProblem for StereoProblem<'_> {
    fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
        let (mut left, right) = self.split_residuals(p);
        left.extend(right);
        DVector::from_vec(left)
    }

    fn is_fixed(&self, index: usize) -> bool {
        if index < CAMERA_LEN {
            camera_param_fixed(index, self.options)
        } else if index < RELATIVE_AT {
            let offset = index - RIGHT_AT;
            (self.options.same_focal_length && offset < 2)
                || camera_param_fixed(offset, self.options)
        } else {
            false
        }
    }
}

/// Refine both cameras, the rig and the board poses together, starting from
/// independent single-camera calibrations.
pub(crate) fn refine_stereo(
    pairs: &[(ChessboardObservation, ChessboardObservation)],
    left: &CameraCalibration,
    right: &CameraCalibration,
    options: &CalibrationOptions,
) -> Result<StereoSolution, CalibrationError> {
    let Some((first, _)) = pairs.first() else {
        return Err(CalibrationError::InsufficientObservations {
            found: 0,
            required: options.min_pairs.max(1),
        });
    };
    let relative = average_relative_pose(&left.board_poses, &right.board_poses)
        .ok_or_else(|| CalibrationError::Degenerate("relative pose averaging failed".into()))?;
    debug!(
        "initial baseline {:.3}, rotation {:.4} rad",
        relative.translation.norm(),
        relative.rotation.angle()
    );

    let mut x0 = DVector::zeros(VIEWS_AT + POSE_LEN * pairs.len());
    {
        let s = x0.as_mut_slice();
        pack_camera(&left.camera, &mut s[..CAMERA_LEN]);
        pack_camera(&right.camera, &mut s[RIGHT_AT..RIGHT_AT + CAMERA_LEN]);
        if options.same_focal_length {
            let f = 0.5 * (s[0] + s[RIGHT_AT]);
            let aspect = 0.5 * (s[1] + s[RIGHT_AT + 1]);
            s[0] = f;
            s[1] = aspect;
            s[RIGHT_AT] = f;
            s[RIGHT_AT + 1] = aspect;
        }
        pack_pose(&relative, &mut s[RELATIVE_AT..RELATIVE_AT + POSE_LEN]);
        for (k, pose) in left.board_poses.iter().enumerate() {
            let at = VIEWS_AT + POSE_LEN * k;
            pack_pose(pose, &mut s[at..at + POSE_LEN]);
        }
    }

    let problem = StereoProblem {
        pairs,
        object: first.object_points(),
        options,
    };
    let (x, report) = solve(&problem, x0, &options.solver);
    let (res_l, res_r) = problem.split_residuals(&x);
    let rms_left = reprojection_rms(&res_l);
    let rms_right = reprojection_rms(&res_r);
    let mut all = res_l;
    all.extend(res_r);
    let rms = reprojection_rms(&all);
    debug!("stereo solve: {report:?}, rms {rms:.4}");

    if !rms.is_finite() || rms > options.max_rms_px {
        return Err(CalibrationError::SolverDivergence {
            rms,
            max_rms: options.max_rms_px,
        });
    }

    let u = problem.unpack(&x);
    Ok(StereoSolution {
        left: u.left,
        right: u.right,
        relative: u.relative,
        rms_left,
        rms_right,
        rms,
        report,
    })
}
