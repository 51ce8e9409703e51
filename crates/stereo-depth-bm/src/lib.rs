//! Block-matching disparity engine for rectified stereo pairs.
//!
//! Output follows the classic fixed-point convention: each pixel stores
//! `disparity * 16` as `i16`, and pixels that fail any filter hold
//! `(min_disparity - 1) * 16`.
//!
//! ```no_run
//! use stereo_depth_bm::{compute_disparity, BlockMatchParameters};
//! use stereo_depth_core::GrayImage;
//!
//! let left = GrayImage::new(640, 480);
//! let right = GrayImage::new(640, 480);
//! let map = compute_disparity(&left.view(), &right.view(), &BlockMatchParameters::default())
//!     .expect("valid parameters");
//! let preview = map.to_normalized_u8();
//! # let _ = preview;
//! ```
//!
//! Stages, all deterministic:
//! 1. Prefilter both images (normalized response or x-Sobel).
//! 2. Per-row SAD cost over the disparity range with uniqueness and
//!    texture checks, then parabolic subpixel refinement.
//! 3. Speckle removal on the fixed-point map.
//!
//! Enable the `rayon` feature to process rows in parallel.

mod depth;
mod disparity;
mod matcher;
mod params;
mod prefilter;
mod speckle;
mod visualize;

/// Fixed-point scale of stored disparities.
pub const DISP_SCALE: i32 = 16;
/// `log2(DISP_SCALE)`.
pub const DISP_SHIFT: u32 = 4;

pub use depth::{reproject_to_3d, ReprojectedPoint};
pub use disparity::{compute_disparity, DisparityMap};
pub use params::{
    normalize_num_disparities, normalize_window_size, BlockMatchParameters, Granularity,
    Parameter, ParameterError, PrefilterType, SliderRange,
};
pub use prefilter::{normalized_response, prefilter, x_sobel};
pub use speckle::filter_speckles;
pub use visualize::{apply_jet_colormap, disparity_to_f32, jet};
