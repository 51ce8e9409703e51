//! Rectify-then-match helper for a calibrated rig.

use std::path::Path;

use log::info;
use stereo_depth_bm::{compute_disparity, reproject_to_3d, BlockMatchParameters, DisparityMap, ReprojectedPoint};
use stereo_depth_calib::CalibrationResult;
use stereo_depth_core::{GrayImage, GrayImageView, ImageSize, RgbImage};
use stereo_depth_rectify::Rectifier;

use crate::PipelineError;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Rectified pair and the disparity computed from it.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    pub left: GrayImage,
    pub right: GrayImage,
    pub disparity: DisparityMap,
}

/// Calibration, rectification maps and matching parameters for one rig.
#[derive(Clone, Debug)]
pub struct DepthPipeline {
    calibration: CalibrationResult,
    rectifier: Rectifier,
    params: BlockMatchParameters,
}

impl DepthPipeline {
    /// Build rectification maps for `image_size` and validate `params`.
    pub fn new(
        calibration: CalibrationResult,
        image_size: ImageSize,
        params: BlockMatchParameters,
    ) -> Result<Self, PipelineError> {
        params.validate()?;
        let mut rectifier = Rectifier::new();
        rectifier.initialize(&calibration, image_size)?;
        Ok(Self {
            calibration,
            rectifier,
            params,
        })
    }

    /// Load an exported calibration bundle. Maps are built at the calibration
    /// resolution unless `image_size` overrides it.
    pub fn from_bundle(
        dir: impl AsRef<Path>,
        image_size: Option<ImageSize>,
        params: BlockMatchParameters,
    ) -> Result<Self, PipelineError> {
        let calibration = CalibrationResult::import(dir.as_ref())?;
        let size = image_size.unwrap_or(calibration.image_size);
        info!(
            "loaded calibration from {} (baseline {:.3})",
            dir.as_ref().display(),
            calibration.baseline()
        );
        Self::new(calibration, size, params)
    }

    pub fn calibration(&self) -> &CalibrationResult {
        &self.calibration
    }

    pub fn rectifier(&self) -> &Rectifier {
        &self.rectifier
    }

    pub fn params(&self) -> &BlockMatchParameters {
        &self.params
    }

    /// Swap matching parameters. Invalid parameters leave the old ones in place.
    pub fn set_params(&mut self, params: BlockMatchParameters) -> Result<(), PipelineError> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = left.width, height = left.height))
    )]
    pub fn process(
        &self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<DepthFrame, PipelineError> {
        let (left, right) = self.rectifier.rectify(left, right)?;
        let disparity = compute_disparity(&left.view(), &right.view(), &self.params)?;
        Ok(DepthFrame {
            left,
            right,
            disparity,
        })
    }

    /// Colour frames are converted to luma before rectification.
    pub fn process_rgb(&self, left: &RgbImage, right: &RgbImage) -> Result<DepthFrame, PipelineError> {
        let (left, right) = (left.to_gray(), right.to_gray());
        self.process(&left.view(), &right.view())
    }

    /// Reproject a frame's valid pixels into the rectified left camera frame.
    ///
    /// Only available when maps were built at the calibration resolution,
    /// since `Q` is expressed in those pixels.
    pub fn point_cloud(&self, frame: &DepthFrame) -> Result<Vec<ReprojectedPoint>, PipelineError> {
        if frame.disparity.size() != self.calibration.image_size {
            return Err(PipelineError::Input(format!(
                "disparity is {}, reprojection matrix is for {}",
                frame.disparity.size(),
                self.calibration.image_size
            )));
        }
        Ok(reproject_to_3d(&frame.disparity, &self.calibration.rectification.q))
    }
}
