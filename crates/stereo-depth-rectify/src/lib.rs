//! Epipolar rectification of stereo frames.
//!
//! A [`Rectifier`] turns a [`stereo_depth_calib::CalibrationResult`] into
//! per-camera remap tables once, then resamples each incoming frame pair so
//! that corresponding scene points share a row.

mod maps;
mod rectifier;
mod remap;

pub use maps::{rectify_point, RectificationMap};
pub use rectifier::{RectificationError, Rectifier, Side};
pub use remap::{remap_gray, remap_rgb};
