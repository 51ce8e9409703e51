#![allow(dead_code)]

use nalgebra::{Point2, Point3, Vector3};
use stereo_depth_core::{
    CameraIntrinsics, ChessboardGeometry, ChessboardObservation, Distortion, GrayImage,
    PinholeCamera, Pose,
};

pub const BASELINE_MM: f64 = 60.0;

pub struct SyntheticRig {
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    /// Left camera frame to right camera frame.
    pub relative: Pose,
}

pub fn rig() -> SyntheticRig {
    SyntheticRig {
        left: PinholeCamera::new(
            CameraIntrinsics::new(620.0, 615.0, 322.0, 241.0),
            Distortion::from_array([-0.12, 0.05, 0.0, 0.0, 0.0]),
        ),
        right: PinholeCamera::new(
            CameraIntrinsics::new(612.0, 610.0, 318.0, 236.0),
            Distortion::from_array([-0.1, 0.03, 0.0, 0.0, 0.0]),
        ),
        relative: Pose::from_rodrigues(
            Vector3::new(0.004, -0.02, 0.003),
            Vector3::new(-BASELINE_MM, 0.4, 0.9),
        ),
    }
}

/// Board-to-left poses, all tilted differently and centred in front of the rig.
pub fn board_poses(board: &ChessboardGeometry) -> Vec<Pose> {
    let centre = Vector3::new(
        0.5 * (board.inner_cols - 1) as f64 * board.square_size,
        0.5 * (board.inner_rows - 1) as f64 * board.square_size,
        0.0,
    );
    let views = [
        (Vector3::new(0.30, 0.00, 0.00), Vector3::new(-20.0, 0.0, 700.0)),
        (Vector3::new(-0.30, 0.10, 0.00), Vector3::new(40.0, 10.0, 750.0)),
        (Vector3::new(0.00, 0.35, 0.05), Vector3::new(-40.0, -20.0, 680.0)),
        (Vector3::new(0.00, -0.30, -0.05), Vector3::new(10.0, 30.0, 720.0)),
        (Vector3::new(0.20, 0.20, 0.10), Vector3::new(-60.0, 20.0, 800.0)),
        (Vector3::new(-0.20, -0.25, 0.00), Vector3::new(30.0, -30.0, 650.0)),
        (Vector3::new(0.25, -0.20, 0.15), Vector3::new(0.0, 40.0, 760.0)),
        (Vector3::new(-0.15, 0.30, -0.10), Vector3::new(-30.0, -40.0, 820.0)),
        (Vector3::new(0.10, 0.05, 0.30), Vector3::new(50.0, 0.0, 690.0)),
        (Vector3::new(0.05, -0.10, -0.30), Vector3::new(-10.0, 10.0, 880.0)),
    ];
    views
        .iter()
        .map(|(r, t)| {
            let rot = Pose::from_rodrigues(*r, Vector3::zeros()).rotation;
            Pose::new(rot, t - rot * centre)
        })
        .collect()
}

/// Small deterministic jitter in `[-amp, amp]`.
fn jitter(seed: &mut u64, amp: f64) -> f64 {
    *seed = seed
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    let unit = (*seed >> 11) as f64 / (1u64 << 53) as f64;
    (2.0 * unit - 1.0) * amp
}

pub fn observe(
    cam: &PinholeCamera,
    board: &ChessboardGeometry,
    board_to_cam: &Pose,
    noise_px: f64,
    seed: &mut u64,
) -> ChessboardObservation {
    let points = board
        .object_points()
        .iter()
        .map(|p| {
            let px = cam
                .project(&board_to_cam.transform_point(p))
                .expect("board in front of camera");
            Point2::new(px.x + jitter(seed, noise_px), px.y + jitter(seed, noise_px))
        })
        .collect();
    ChessboardObservation::new(*board, points).expect("valid observation")
}

/// Observation pairs of `board` seen by both cameras of `rig`.
pub fn observation_pairs(
    rig: &SyntheticRig,
    board: &ChessboardGeometry,
    noise_px: f64,
) -> Vec<(ChessboardObservation, ChessboardObservation)> {
    let mut seed = 7;
    board_poses(board)
        .iter()
        .map(|pose| {
            let left = observe(&rig.left, board, pose, noise_px, &mut seed);
            let right = observe(&rig.right, board, &rig.relative.compose(pose), noise_px, &mut seed);
            (left, right)
        })
        .collect()
}

/// Render a checkerboard with a white margin, 4x4 supersampled.
///
/// `board` counts inner corners, so the pattern has one more square per axis.
pub fn render_board(
    cam: &PinholeCamera,
    board: &ChessboardGeometry,
    board_to_cam: &Pose,
    width: usize,
    height: usize,
) -> GrayImage {
    let cam_to_board = board_to_cam.inverse();
    let origin = cam_to_board.translation;
    let squares_x = board.inner_cols as i64 + 1;
    let squares_y = board.inner_rows as i64 + 1;
    let s = board.square_size;

    let shade = |u: f64, v: f64| -> f64 {
        let n = cam.undistort_pixel(Point2::new(u, v));
        let dir = cam_to_board.rotation * Vector3::new(n.x, n.y, 1.0);
        if dir.z.abs() < 1e-12 {
            return 255.0;
        }
        let lambda = -origin.z / dir.z;
        let hit: Point3<f64> = Point3::from(origin + dir * lambda);
        // Board squares start one square before the first inner corner.
        let cx = ((hit.x + s) / s).floor() as i64;
        let cy = ((hit.y + s) / s).floor() as i64;
        if lambda <= 0.0 || cx < 0 || cy < 0 || cx >= squares_x || cy >= squares_y {
            return 255.0;
        }
        if (cx + cy) % 2 == 0 {
            20.0
        } else {
            235.0
        }
    };

    GrayImage::from_fn(width, height, |x, y| {
        let mut acc = 0.0;
        for sy in 0..4 {
            for sx in 0..4 {
                let u = x as f64 - 0.375 + 0.25 * sx as f64;
                let v = y as f64 - 0.375 + 0.25 * sy as f64;
                acc += shade(u, v);
            }
        }
        (acc / 16.0).round() as u8
    })
}
