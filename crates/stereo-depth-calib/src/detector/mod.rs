//! Checkerboard inner-corner detector.
//!
//! Pipeline:
//! 1. Dense ChESS response on the grayscale image.
//! 2. Relative threshold, non-maximum suppression, 5x5 centre-of-mass refinement.
//! 3. Corner orientation from the second harmonic of the sampling ring.
//! 4. Grid graph: k nearest neighbours, spacing window around the median
//!    nearest-neighbour distance, orientation consistency, one neighbour per
//!    image direction, mutual edges only.
//! 5. BFS labelling of the largest component with integer `(i, j)`.
//! 6. Crop to the one fully occupied `rows x cols` window (up to a 90° swap
//!    for non-square boards), dropping stray corners on the board edge, and
//!    emit corners in canonical row-major order.

mod corners;
mod grid;
mod params;
mod response;

pub use corners::{detect_corners, Corner};
pub use grid::{crop_to_full_window, median_spacing, GridGraph, NeighborDirection, NodeNeighbor};
pub use params::{ChessDetectorParams, ChessResponseParams, GridGraphParams};
pub use response::{chess_response, corner_orientation, ResponseMap};

use log::debug;
use nalgebra::Point2;
use stereo_depth_core::{ChessboardGeometry, ChessboardObservation, DetectionError, GrayImageView};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Finds the inner-corner grid of a known checkerboard.
#[derive(Clone, Debug, Default)]
pub struct ChessboardDetector {
    pub params: ChessDetectorParams,
}

impl ChessboardDetector {
    pub fn new(params: ChessDetectorParams) -> Self {
        Self { params }
    }

    /// Raw corner candidates, before grid assembly.
    pub fn corners(&self, img: &GrayImageView<'_>) -> Vec<Corner> {
        let resp = chess_response(img);
        detect_corners(img, &resp, &self.params.response)
    }

    /// Detect the full grid of `geometry` in `img`.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, img), fields(width = img.width, height = img.height))
    )]
    pub fn detect(
        &self,
        img: &GrayImageView<'_>,
        geometry: &ChessboardGeometry,
    ) -> Result<ChessboardObservation, DetectionError> {
        let required = geometry.corner_count();
        let corners = self.corners(img);
        debug!("{} corner candidates", corners.len());
        if corners.len() < required {
            return Err(DetectionError::NotEnoughCorners {
                found: corners.len(),
                required,
            });
        }

        let graph = GridGraph::new(&corners, &self.params.graph);
        let component = graph
            .connected_components()
            .into_iter()
            .max_by_key(|c| c.len())
            .unwrap_or_default();

        let incomplete = |found: usize| DetectionError::GridIncomplete {
            expected_rows: geometry.inner_rows,
            expected_cols: geometry.inner_cols,
            found,
        };

        if component.len() < required {
            return Err(incomplete(component.len()));
        }
        let labelled = graph
            .assign_grid_coordinates(&component)
            .ok_or_else(|| incomplete(0))?;
        let (rows, cols) = (geometry.inner_rows as i32, geometry.inner_cols as i32);

        // Non-square boards may show up rotated by 90° in the image.
        let (labelled, transposed) = if let Some(grid) =
            crop_to_full_window(&labelled, cols, rows)
        {
            (grid, false)
        } else if rows != cols {
            let grid = crop_to_full_window(&labelled, rows, cols)
                .ok_or_else(|| incomplete(labelled.len()))?;
            (grid, true)
        } else {
            return Err(incomplete(labelled.len()));
        };
        if component.len() > required {
            debug!("dropped {} stray corners", component.len() - required);
        }

        let mut points = vec![Point2::new(f64::NAN, f64::NAN); required];
        for &(node, i, j) in &labelled {
            let idx = if transposed { i * cols + j } else { j * cols + i };
            let p = corners[node].position;
            points[idx as usize] = Point2::new(p.x as f64, p.y as f64);
        }
        debug!("assembled {}x{} grid", rows, cols);
        ChessboardObservation::new(*geometry, points)
    }
}
