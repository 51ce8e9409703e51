use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use stereo_depth_bm::{compute_disparity, BlockMatchParameters, DisparityMap, Parameter, ParameterError};
use stereo_depth_core::{ConfigError, GrayImage};

use crate::persist::{load_parameters, save_parameters};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// One slider movement: which parameter and the raw value the slider reports.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterEdit {
    pub parameter: Parameter,
    pub value: f64,
}

impl ParameterEdit {
    pub fn new(parameter: Parameter, value: f64) -> Self {
        Self { parameter, value }
    }
}

/// Holds a rectified pair, the current parameters and the map they produce.
///
/// Every successful call replaces both the parameters and the map. A failed
/// call leaves them exactly as they were.
#[derive(Clone, Debug)]
pub struct TuningController {
    left: GrayImage,
    right: GrayImage,
    params: BlockMatchParameters,
    map: DisparityMap,
}

impl TuningController {
    pub fn new(
        left: GrayImage,
        right: GrayImage,
        params: BlockMatchParameters,
    ) -> Result<Self, ParameterError> {
        let map = compute_disparity(&left.view(), &right.view(), &params)?;
        info!(
            "tuning {} pair, {} valid pixels",
            map.size(),
            map.valid_count()
        );
        Ok(Self {
            left,
            right,
            params,
            map,
        })
    }

    pub fn params(&self) -> &BlockMatchParameters {
        &self.params
    }

    pub fn map(&self) -> &DisparityMap {
        &self.map
    }

    pub fn left(&self) -> &GrayImage {
        &self.left
    }

    pub fn right(&self) -> &GrayImage {
        &self.right
    }

    /// Normalize the edited value to its slider and recompute.
    pub fn apply_edit(&mut self, edit: ParameterEdit) -> Result<&DisparityMap, ParameterError> {
        let next = self.params.with_normalized(edit.parameter, edit.value);
        debug!(
            "{} = {} (raw {})",
            edit.parameter,
            next.get(edit.parameter),
            edit.value
        );
        self.apply_params(next)
    }

    /// Replace the whole parameter record and recompute.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn apply_params(&mut self, params: BlockMatchParameters) -> Result<&DisparityMap, ParameterError> {
        let map = compute_disparity(&self.left.view(), &self.right.view(), &params)
            .inspect_err(|e| warn!("parameters rejected, keeping previous map: {e}"))?;
        self.params = params;
        self.map = map;
        Ok(&self.map)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        save_parameters(&self.params, path)?;
        info!("parameters saved to {}", path.display());
        Ok(())
    }

    /// Load a parameter file and recompute. Stored values are used as-is.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&DisparityMap, ConfigError> {
        let path = path.as_ref();
        let params = load_parameters(path)?;
        self.apply_params(params)
            .map_err(|e| ConfigError::InvalidValue {
                name: path.display().to_string(),
                reason: e.to_string(),
            })?;
        info!("parameters loaded from {}", path.display());
        Ok(&self.map)
    }
}
