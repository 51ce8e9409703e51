//! High-level facade for the `stereo-depth-*` workspace.
//!
//! This crate provides:
//! - re-exports of the component crates
//! - [`DepthPipeline`], which rectifies a frame pair with a stored calibration
//!   and runs block matching on it
//! - (feature `image`) conversions to the `image` crate, PNG helpers and
//!   folder-based calibration
//!
//! ## Quickstart
//!
//! ```no_run
//! use stereo_depth::{bm::BlockMatchParameters, images, DepthPipeline};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = DepthPipeline::from_bundle("calibration", None, BlockMatchParameters::default())?;
//! let left = images::load_gray("left.png")?;
//! let right = images::load_gray("right.png")?;
//! let frame = pipeline.process(&left.view(), &right.view())?;
//! images::save_disparity(&frame.disparity, "out", "disparity")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `stereo_depth::core`: cameras, poses, homographies, boards, image buffers, JSON helpers.
//! - `stereo_depth::calib`: chessboard detection and stereo calibration.
//! - `stereo_depth::rectify`: rectification maps and remapping.
//! - `stereo_depth::bm`: block-matching disparity.
//! - `stereo_depth::tuning`: parameter tuning and parameter files.

pub use stereo_depth_bm as bm;
pub use stereo_depth_calib as calib;
pub use stereo_depth_core as core;
pub use stereo_depth_rectify as rectify;
pub use stereo_depth_tuning as tuning;

mod error;
mod pipeline;

pub use error::PipelineError;
pub use pipeline::{DepthFrame, DepthPipeline};

#[cfg(feature = "image")]
pub mod images;
