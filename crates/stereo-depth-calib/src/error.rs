/// Errors that abort a calibration session.
///
/// No partial result accompanies any of these.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient observations (found {found} valid pairs, need {required})")]
    InsufficientObservations { found: usize, required: usize },

    #[error("solver diverged (rms reprojection error {rms:.4} px exceeds {max_rms:.4} px)")]
    SolverDivergence { rms: f64, max_rms: f64 },

    #[error("degenerate configuration: {0}")]
    Degenerate(String),
}
