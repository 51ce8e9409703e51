//! Parameter files.
//!
//! A parameter file is one JSON object with the classic StereoBM key names.
//! Every numeric key is required; `preFilterType` is optional and defaults
//! to the normalized-response prefilter.

use std::path::Path;

use serde_json::Value;
use stereo_depth_bm::{BlockMatchParameters, Parameter};
use stereo_depth_core::{write_json, ConfigError};

pub fn save_parameters(params: &BlockMatchParameters, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    write_json(params, path)
}

/// Read a parameter file, reporting the first missing key by name.
///
/// Values are returned as stored; validation is left to the caller.
pub fn load_parameters(path: impl AsRef<Path>) -> Result<BlockMatchParameters, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    parse_parameters(&raw)
}

pub(crate) fn parse_parameters(raw: &str) -> Result<BlockMatchParameters, ConfigError> {
    let value: Value = serde_json::from_str(raw)?;
    let Some(object) = value.as_object() else {
        return Err(ConfigError::InvalidValue {
            name: "parameters".into(),
            reason: "expected a JSON object".into(),
        });
    };
    if let Some(missing) = Parameter::ALL.iter().find(|p| !object.contains_key(p.key())) {
        return Err(ConfigError::MissingField(missing.key().to_string()));
    }
    Ok(serde_json::from_value(value)?)
}
