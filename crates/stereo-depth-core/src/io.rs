//! JSON persistence helpers shared by calibration bundles and parameter files.

use nalgebra::DMatrix;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs, path::Path};

/// Errors raised while reading or writing persisted configuration.
///
/// A failed load never touches the caller's in-memory state.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("missing file `{0}`")]
    MissingFile(String),

    #[error("`{name}` has shape {got_rows}x{got_cols}, expected {rows}x{cols}")]
    ShapeMismatch {
        name: String,
        rows: usize,
        cols: usize,
        got_rows: usize,
        got_cols: usize,
    },

    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },
}

/// Dense matrix on disk: `data` is row-major with `rows * cols` entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Self {
        let mut data = Vec::with_capacity(m.len());
        for r in 0..m.nrows() {
            for c in 0..m.ncols() {
                data.push(m[(r, c)]);
            }
        }
        Self {
            rows: m.nrows(),
            cols: m.ncols(),
            data,
        }
    }

    /// Convert back, checking the declared shape against the payload and
    /// against the expected `rows x cols`.
    pub fn to_dmatrix(&self, name: &str, rows: usize, cols: usize) -> Result<DMatrix<f64>, ConfigError> {
        if self.rows != rows || self.cols != cols || self.data.len() != rows * cols {
            return Err(ConfigError::ShapeMismatch {
                name: name.to_string(),
                rows,
                cols,
                got_rows: self.rows,
                got_cols: if self.rows == 0 {
                    self.cols
                } else {
                    self.data.len() / self.rows
                },
            });
        }
        Ok(DMatrix::from_row_slice(rows, cols, &self.data))
    }
}

/// Read and deserialize a JSON document.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Serialize as pretty JSON and write to disk.
pub fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}
