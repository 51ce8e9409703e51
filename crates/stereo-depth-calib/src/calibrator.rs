use log::{debug, info, warn};
use stereo_depth_core::{
    ChessboardGeometry, ChessboardObservation, DetectionError, GrayImageView, ImageSize,
};

use crate::detector::{ChessDetectorParams, ChessboardDetector};
use crate::error::CalibrationError;
use crate::mono::{calibrate_camera, CameraCalibration};
use crate::options::CalibrationOptions;
use crate::rectification::{essential_matrix, fundamental_matrix, stereo_rectify, RectifyOptions};
use crate::result::{CalibrationResult, CalibrationRms};
use crate::stereo::refine_stereo;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Outcome of feeding a batch of image pairs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub accepted: usize,
    /// Index within the batch and the reason the pair was skipped.
    pub rejected: Vec<(usize, DetectionError)>,
    /// Pairs whose files could not be decoded, with the decoder message.
    /// Only filled by callers that load images themselves.
    pub unreadable: Vec<(usize, String)>,
}

impl BatchReport {
    /// Pairs that did not contribute an observation.
    pub fn skipped(&self) -> usize {
        self.rejected.len() + self.unreadable.len()
    }
}

/// Accumulates stereo checkerboard observations for one board and image size.
///
/// [`StereoCalibrator::calibrate`] borrows the session immutably and returns
/// an owned result, so adding more pairs never changes an earlier result.
#[derive(Clone, Debug)]
pub struct StereoCalibrator {
    board: ChessboardGeometry,
    image_size: ImageSize,
    options: CalibrationOptions,
    rectify: RectifyOptions,
    detector: ChessboardDetector,
    pairs: Vec<(ChessboardObservation, ChessboardObservation)>,
}

impl StereoCalibrator {
    pub fn new(board: ChessboardGeometry, image_size: ImageSize, options: CalibrationOptions) -> Self {
        Self {
            board,
            image_size,
            options,
            rectify: RectifyOptions::default(),
            detector: ChessboardDetector::default(),
            pairs: Vec::new(),
        }
    }

    pub fn with_detector(mut self, params: ChessDetectorParams) -> Self {
        self.detector = ChessboardDetector::new(params);
        self
    }

    pub fn with_rectify_options(mut self, rectify: RectifyOptions) -> Self {
        self.rectify = rectify;
        self
    }

    pub fn board(&self) -> &ChessboardGeometry {
        &self.board
    }

    pub fn image_size(&self) -> ImageSize {
        self.image_size
    }

    pub fn options(&self) -> &CalibrationOptions {
        &self.options
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    pub fn observation_pairs(&self) -> &[(ChessboardObservation, ChessboardObservation)] {
        &self.pairs
    }

    /// Accept one pair of already-detected observations.
    pub fn add_observation_pair(
        &mut self,
        left: ChessboardObservation,
        right: ChessboardObservation,
    ) -> Result<(), DetectionError> {
        let expected = self.board.corner_count();
        for obs in [&left, &right] {
            if obs.geometry() != &self.board {
                return Err(DetectionError::GeometryMismatch);
            }
            if obs.len() != expected {
                return Err(DetectionError::CornerCountMismatch {
                    expected,
                    found: obs.len(),
                });
            }
        }
        self.pairs.push((left, right));
        Ok(())
    }

    /// Detect the board in both images and accept the pair.
    pub fn add_image_pair(
        &mut self,
        left: &GrayImageView<'_>,
        right: &GrayImageView<'_>,
    ) -> Result<(), DetectionError> {
        for img in [left, right] {
            if img.size() != self.image_size {
                return Err(DetectionError::ImageSizeMismatch {
                    expected: self.image_size,
                    got: img.size(),
                });
            }
        }
        let obs_left = self.detector.detect(left, &self.board).inspect_err(|e| {
            debug!("left detection failed: {e}");
        })?;
        let obs_right = self.detector.detect(right, &self.board).inspect_err(|e| {
            debug!("right detection failed: {e}");
        })?;
        self.add_observation_pair(obs_left, obs_right)
    }

    /// Feed several image pairs; a failed pair is logged and skipped.
    pub fn add_image_pairs<'a, I>(&mut self, pairs: I) -> BatchReport
    where
        I: IntoIterator<Item = (GrayImageView<'a>, GrayImageView<'a>)>,
    {
        let mut report = BatchReport::default();
        for (index, (left, right)) in pairs.into_iter().enumerate() {
            match self.add_image_pair(&left, &right) {
                Ok(()) => report.accepted += 1,
                Err(e) => {
                    warn!("pair {index} skipped: {e}");
                    report.rejected.push((index, e));
                }
            }
        }
        info!(
            "{} of {} pairs accepted ({} total)",
            report.accepted,
            report.accepted + report.rejected.len(),
            self.pairs.len()
        );
        report
    }

    /// Calibrate each camera on its own. Mainly useful for focal-length checks.
    pub fn calibrate_single(&self, right: bool) -> Result<CameraCalibration, CalibrationError> {
        self.check_pair_count()?;
        let observations: Vec<ChessboardObservation> = self
            .pairs
            .iter()
            .map(|(l, r)| if right { r.clone() } else { l.clone() })
            .collect();
        calibrate_camera(&observations, self.image_size, &self.options)
    }

    fn check_pair_count(&self) -> Result<(), CalibrationError> {
        let required = self.options.min_pairs.max(1);
        if self.pairs.len() < required {
            return Err(CalibrationError::InsufficientObservations {
                found: self.pairs.len(),
                required,
            });
        }
        Ok(())
    }

    /// Run the full stereo calibration over all accepted pairs.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self), fields(pairs = self.pairs.len()))
    )]
    pub fn calibrate(&self) -> Result<CalibrationResult, CalibrationError> {
        self.check_pair_count()?;

        let left = self.calibrate_single(false)?;
        let right = self.calibrate_single(true)?;
        let stereo = refine_stereo(&self.pairs, &left, &right, &self.options)?;

        let rotation = *stereo.relative.rotation.matrix();
        let translation = stereo.relative.translation;
        let rectification = stereo_rectify(
            &stereo.left,
            &stereo.right,
            self.image_size,
            &rotation,
            &translation,
            self.rectify,
        )?;
        let essential = essential_matrix(&rotation, &translation);
        let fundamental = fundamental_matrix(&stereo.left, &stereo.right, &essential)
            .ok_or_else(|| CalibrationError::Degenerate("singular intrinsic matrix".into()))?;

        if !stereo.report.converged() {
            warn!(
                "stereo refinement stopped without converging: {:?} after {} iterations",
                stereo.report.termination, stereo.report.iterations
            );
        }
        info!(
            "stereo calibrated from {} pairs: baseline {:.3}, rms {:.4}px (left {:.4}, right {:.4}), {:?} after {} iterations",
            self.pairs.len(),
            translation.norm(),
            stereo.rms,
            stereo.rms_left,
            stereo.rms_right,
            stereo.report.termination,
            stereo.report.iterations
        );

        Ok(CalibrationResult {
            image_size: self.image_size,
            left: stereo.left,
            right: stereo.right,
            rotation,
            translation,
            essential,
            fundamental,
            rectification,
            rms: CalibrationRms {
                left: stereo.rms_left,
                right: stereo.rms_right,
                stereo: stereo.rms,
            },
        })
    }
}
