//! Calibration result and its on-disk bundle.
//!
//! A bundle is a directory holding one JSON matrix record per file:
//!
//! | file | shape |
//! |---|---|
//! | `cam_mats_left.json`, `cam_mats_right.json` | 3x3 |
//! | `dist_coefs_left.json`, `dist_coefs_right.json` | 1xN, N in 4..=8 |
//! | `rot_mat.json`, `e_mat.json`, `f_mat.json` | 3x3 |
//! | `trans_vec.json` | 3x1 |
//! | `rect_trans_left.json`, `rect_trans_right.json` | 3x3 |
//! | `proj_mats_left.json`, `proj_mats_right.json` | 3x4 |
//! | `disp_to_depth_mat.json` | 4x4 |
//!
//! plus `image_size.json` (`{"width", "height"}`) and `rms.json`.

use std::fs;
use std::path::Path;

use log::info;
use nalgebra::{DMatrix, Matrix3, SMatrix, Vector3};
use serde::{Deserialize, Serialize};
use stereo_depth_core::{
    load_json, write_json, CameraIntrinsics, ConfigError, Distortion, ImageSize, MatrixRecord,
    PinholeCamera,
};

use crate::rectification::RectificationTransforms;

/// RMS reprojection errors in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRms {
    pub left: f64,
    pub right: f64,
    pub stereo: f64,
}

/// Everything a calibration session computes. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub image_size: ImageSize,
    pub left: PinholeCamera,
    pub right: PinholeCamera,
    /// Rotation from the left camera frame to the right camera frame.
    pub rotation: Matrix3<f64>,
    /// Translation from the left camera frame to the right camera frame, in board units.
    pub translation: Vector3<f64>,
    pub essential: Matrix3<f64>,
    pub fundamental: Matrix3<f64>,
    pub rectification: RectificationTransforms,
    pub rms: CalibrationRms,
}

const CAM_LEFT: &str = "cam_mats_left";
const CAM_RIGHT: &str = "cam_mats_right";
const DIST_LEFT: &str = "dist_coefs_left";
const DIST_RIGHT: &str = "dist_coefs_right";
const ROT: &str = "rot_mat";
const TRANS: &str = "trans_vec";
const ESSENTIAL: &str = "e_mat";
const FUNDAMENTAL: &str = "f_mat";
const RECT_LEFT: &str = "rect_trans_left";
const RECT_RIGHT: &str = "rect_trans_right";
const PROJ_LEFT: &str = "proj_mats_left";
const PROJ_RIGHT: &str = "proj_mats_right";
const DISP_TO_DEPTH: &str = "disp_to_depth_mat";
const IMAGE_SIZE: &str = "image_size";
const RMS: &str = "rms";

fn record<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> MatrixRecord {
    MatrixRecord::from_dmatrix(&DMatrix::from_column_slice(R, C, m.as_slice()))
}

fn bundle_file(dir: &Path, name: &str) -> Result<std::path::PathBuf, ConfigError> {
    let path = dir.join(format!("{name}.json"));
    if !path.is_file() {
        return Err(ConfigError::MissingFile(path.display().to_string()));
    }
    Ok(path)
}

fn read_matrix<const R: usize, const C: usize>(
    dir: &Path,
    name: &str,
) -> Result<SMatrix<f64, R, C>, ConfigError> {
    let rec: MatrixRecord = load_json(bundle_file(dir, name)?)?;
    let m = rec.to_dmatrix(name, R, C)?;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "non-finite entry".into(),
        });
    }
    Ok(SMatrix::<f64, R, C>::from_column_slice(m.as_slice()))
}

fn read_camera(dir: &Path, k_name: &str, d_name: &str) -> Result<PinholeCamera, ConfigError> {
    let k = read_matrix::<3, 3>(dir, k_name)?;
    if k[(0, 0)] <= 0.0 || k[(1, 1)] <= 0.0 {
        return Err(ConfigError::InvalidValue {
            name: k_name.to_string(),
            reason: "focal lengths must be positive".into(),
        });
    }

    let rec: MatrixRecord = load_json(bundle_file(dir, d_name)?)?;
    // Either a row or a column vector is accepted.
    let n = rec.data.len();
    if rec.rows.min(rec.cols) != 1 || rec.rows * rec.cols != n || !(4..=8).contains(&n) {
        return Err(ConfigError::ShapeMismatch {
            name: d_name.to_string(),
            rows: 1,
            cols: 5,
            got_rows: rec.rows,
            got_cols: rec.cols,
        });
    }
    let distortion = Distortion::from_slice(&rec.data).ok_or_else(|| ConfigError::InvalidValue {
        name: d_name.to_string(),
        reason: "rational coefficients k4..k6 are not supported".into(),
    })?;
    Ok(PinholeCamera::new(CameraIntrinsics::from_matrix(&k), distortion))
}

impl CalibrationResult {
    /// Length of the stereo baseline, in board units.
    pub fn baseline(&self) -> f64 {
        self.translation.norm()
    }

    pub fn camera(&self, right: bool) -> &PinholeCamera {
        if right {
            &self.right
        } else {
            &self.left
        }
    }

    /// Write the bundle into `dir`, creating it if needed.
    pub fn export(&self, dir: impl AsRef<Path>) -> Result<(), ConfigError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let rect = &self.rectification;
        let dist = |cam: &PinholeCamera| {
            let c = cam.distortion.to_array();
            MatrixRecord {
                rows: 1,
                cols: c.len(),
                data: c.to_vec(),
            }
        };

        let entries: [(&str, MatrixRecord); 13] = [
            (CAM_LEFT, record(&self.left.intrinsics.matrix())),
            (CAM_RIGHT, record(&self.right.intrinsics.matrix())),
            (DIST_LEFT, dist(&self.left)),
            (DIST_RIGHT, dist(&self.right)),
            (ROT, record(&self.rotation)),
            (TRANS, record(&self.translation)),
            (ESSENTIAL, record(&self.essential)),
            (FUNDAMENTAL, record(&self.fundamental)),
            (RECT_LEFT, record(&rect.r1)),
            (RECT_RIGHT, record(&rect.r2)),
            (PROJ_LEFT, record(&rect.p1)),
            (PROJ_RIGHT, record(&rect.p2)),
            (DISP_TO_DEPTH, record(&rect.q)),
        ];
        for (name, rec) in &entries {
            write_json(rec, dir.join(format!("{name}.json")))?;
        }
        write_json(&self.image_size, dir.join(format!("{IMAGE_SIZE}.json")))?;
        write_json(&self.rms, dir.join(format!("{RMS}.json")))?;
        info!("calibration exported to {}", dir.display());
        Ok(())
    }

    /// Read a bundle written by [`CalibrationResult::export`].
    pub fn import(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ConfigError::MissingFile(dir.display().to_string()));
        }
        let image_size: ImageSize = load_json(bundle_file(dir, IMAGE_SIZE)?)?;
        if image_size.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: IMAGE_SIZE.to_string(),
                reason: format!("empty size {image_size}"),
            });
        }
        let rms: CalibrationRms = load_json(bundle_file(dir, RMS)?)?;

        Ok(Self {
            image_size,
            left: read_camera(dir, CAM_LEFT, DIST_LEFT)?,
            right: read_camera(dir, CAM_RIGHT, DIST_RIGHT)?,
            rotation: read_matrix(dir, ROT)?,
            translation: read_matrix(dir, TRANS)?,
            essential: read_matrix(dir, ESSENTIAL)?,
            fundamental: read_matrix(dir, FUNDAMENTAL)?,
            rectification: RectificationTransforms {
                r1: read_matrix(dir, RECT_LEFT)?,
                r2: read_matrix(dir, RECT_RIGHT)?,
                p1: read_matrix(dir, PROJ_LEFT)?,
                p2: read_matrix(dir, PROJ_RIGHT)?,
                q: read_matrix(dir, DISP_TO_DEPTH)?,
            },
            rms,
        })
    }

    /// Single-file JSON form of the whole result.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_json(self, path)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_json(path)
    }
}
