//! Stereo camera calibration from checkerboard observations.
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_depth_calib::{CalibrationOptions, StereoCalibrator};
//! use stereo_depth_core::{ChessboardGeometry, GrayImage, ImageSize};
//!
//! let board = ChessboardGeometry::default();
//! let mut calibrator =
//!     StereoCalibrator::new(board, ImageSize::new(640, 480), CalibrationOptions::default());
//!
//! let left = GrayImage::new(640, 480);
//! let right = GrayImage::new(640, 480);
//! if let Err(e) = calibrator.add_image_pair(&left.view(), &right.view()) {
//!     eprintln!("pair skipped: {e}");
//! }
//!
//! match calibrator.calibrate() {
//!     Ok(result) => result.export("calibration").expect("export"),
//!     Err(e) => eprintln!("calibration failed: {e}"),
//! }
//! ```
//!
//! Pipeline:
//! 1. Chessboard detection per image (ChESS corners + grid graph).
//! 2. Per-view homographies and Zhang's closed-form intrinsics.
//! 3. Per-camera Levenberg–Marquardt refinement of intrinsics, distortion and poses.
//! 4. Joint refinement of both cameras and the left-to-right pose.
//! 5. Bouguet rectification, essential and fundamental matrices.

mod calibrator;
pub mod detector;
mod error;
pub mod lm;
mod mono;
mod options;
mod rectification;
mod result;
mod stereo;
mod zhang;

pub use calibrator::{BatchReport, StereoCalibrator};
pub use detector::{ChessDetectorParams, ChessboardDetector};
pub use error::CalibrationError;
pub use lm::{SolveOptions, SolveReport, Termination};
pub use mono::{calibrate_camera, reprojection_rms, CameraCalibration};
pub use options::CalibrationOptions;
pub use rectification::{
    essential_matrix, fundamental_matrix, stereo_rectify, RectificationTransforms, RectifyOptions,
};
pub use result::{CalibrationResult, CalibrationRms};
pub use zhang::{estimate_intrinsics, pose_from_homography};
