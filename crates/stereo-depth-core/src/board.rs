//! Checkerboard geometry and per-image corner observations.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::ImageSize;

/// Why a checkerboard could not be observed in an image (or image pair).
///
/// These failures are local to one pair: callers log them and continue.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("corner count mismatch (expected {expected}, found {found})")]
    CornerCountMismatch { expected: usize, found: usize },

    #[error("not enough corner candidates (found {found}, need {required})")]
    NotEnoughCorners { found: usize, required: usize },

    #[error("corner grid incomplete (expected {expected_rows}x{expected_cols}, assembled {found} corners)")]
    GridIncomplete {
        expected_rows: usize,
        expected_cols: usize,
        found: usize,
    },

    #[error("observation {index} is not finite")]
    NonFinitePoint { index: usize },

    #[error("observation board geometry differs from the session board")]
    GeometryMismatch,

    #[error("image size mismatch (expected {expected}, got {got})")]
    ImageSizeMismatch { expected: ImageSize, got: ImageSize },
}

/// Inner-corner grid of a planar checkerboard.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardGeometry {
    /// Inner corners along the vertical axis.
    pub inner_rows: usize,
    /// Inner corners along the horizontal axis.
    pub inner_cols: usize,
    /// Physical edge length of one square (millimetres in the default board).
    pub square_size: f64,
}

impl Default for ChessboardGeometry {
    fn default() -> Self {
        Self {
            inner_rows: 7,
            inner_cols: 7,
            square_size: 34.5,
        }
    }
}

impl ChessboardGeometry {
    pub fn new(inner_rows: usize, inner_cols: usize, square_size: f64) -> Self {
        Self {
            inner_rows,
            inner_cols,
            square_size,
        }
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.inner_rows * self.inner_cols
    }

    /// Board-plane coordinates, row-major: index `r * cols + c` maps to
    /// `(c * square, r * square)`.
    pub fn planar_points(&self) -> Vec<Point2<f64>> {
        let s = self.square_size;
        (0..self.inner_rows)
            .flat_map(|r| (0..self.inner_cols).map(move |c| Point2::new(c as f64 * s, r as f64 * s)))
            .collect()
    }

    /// 3D object points on the `z = 0` plane, same order as [`Self::planar_points`].
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        self.planar_points()
            .into_iter()
            .map(|p| Point3::new(p.x, p.y, 0.0))
            .collect()
    }
}

/// Detected corners of one image, in canonical board order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChessboardObservation {
    geometry: ChessboardGeometry,
    image_points: Vec<Point2<f64>>,
}

impl ChessboardObservation {
    /// Validate and wrap detected corners.
    pub fn new(
        geometry: ChessboardGeometry,
        image_points: Vec<Point2<f64>>,
    ) -> Result<Self, DetectionError> {
        if image_points.len() != geometry.corner_count() {
            return Err(DetectionError::CornerCountMismatch {
                expected: geometry.corner_count(),
                found: image_points.len(),
            });
        }
        if let Some(index) = image_points
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(DetectionError::NonFinitePoint { index });
        }
        Ok(Self {
            geometry,
            image_points,
        })
    }

    pub fn geometry(&self) -> &ChessboardGeometry {
        &self.geometry
    }

    pub fn image_points(&self) -> &[Point2<f64>] {
        &self.image_points
    }

    pub fn object_points(&self) -> Vec<Point3<f64>> {
        self.geometry.object_points()
    }

    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }
}
