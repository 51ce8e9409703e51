use stereo_depth_bm::ParameterError;
use stereo_depth_calib::CalibrationError;
use stereo_depth_core::{ConfigError, DetectionError};
use stereo_depth_rectify::RectificationError;

/// Any failure of the end-to-end helpers.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Rectification(#[from] RectificationError),

    #[error(transparent)]
    Parameters(#[from] ParameterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] ::image::ImageError),

    #[error("{0}")]
    Input(String),
}
