//! Core types for the stereo-depth pipeline.
//!
//! This crate is purely geometric: pinhole cameras with lens distortion,
//! rigid poses, planar homographies, checkerboard observations and plain
//! 8-bit image buffers. It does not depend on any image codec.

mod board;
mod camera;
mod homography;
mod image;
mod io;
mod logger;

pub use board::{ChessboardGeometry, ChessboardObservation, DetectionError};
pub use camera::{nearest_rotation, skew, CameraIntrinsics, Distortion, PinholeCamera, Pose};
pub use homography::{estimate_homography, normalize_points, Homography};
pub use image::{
    sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, ImageBufferError, ImageSize,
    RgbImage,
};
pub use io::{load_json, write_json, ConfigError, MatrixRecord};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_from_env, init_with_level, parse_level, LOG_ENV_VAR};
