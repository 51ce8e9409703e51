//! Interactive tuning of block-matching parameters.
//!
//! [`TuningController`] replaces slider callbacks with an explicit,
//! synchronous contract: each [`ParameterEdit`] yields a new parameter value
//! and a freshly computed [`DisparityMap`](stereo_depth_bm::DisparityMap), or
//! an error with the previous state untouched.

mod controller;
mod persist;

pub use controller::{ParameterEdit, TuningController};
pub use persist::{load_parameters, save_parameters};
