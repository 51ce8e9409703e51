use serde::{Deserialize, Serialize};

use crate::lm::SolveOptions;

/// Calibration model flags and solver limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOptions {
    /// Keep the sixth-order radial term at zero.
    pub fix_k3: bool,
    /// Keep tangential distortion (`p1`, `p2`) at zero.
    pub zero_tangent_dist: bool,
    /// Keep the principal point at its initial estimate.
    pub fix_principal_point: bool,
    /// Keep `fy / fx` at its initial ratio.
    pub fix_aspect_ratio: bool,
    /// Share focal lengths between both cameras in the joint stereo solve.
    pub same_focal_length: bool,
    /// Minimum number of accepted pairs before `calibrate` runs.
    pub min_pairs: usize,
    /// Final RMS reprojection error (pixels) above which the solve counts as diverged.
    pub max_rms_px: f64,
    pub solver: SolveOptions,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            fix_k3: true,
            zero_tangent_dist: false,
            fix_principal_point: false,
            fix_aspect_ratio: false,
            same_focal_length: false,
            min_pairs: 1,
            max_rms_px: 2.0,
            solver: SolveOptions::default(),
        }
    }
}
