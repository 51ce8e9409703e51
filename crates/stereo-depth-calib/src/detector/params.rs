use serde::{Deserialize, Serialize};

/// ChESS response and peak-picking settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessResponseParams {
    /// Relative threshold as a fraction of the max response.
    pub threshold_rel: f32,
    /// Non-maximum suppression radius in pixels.
    pub nms_radius: u32,
    /// Minimum count of positive-response neighbours in the NMS window.
    pub min_cluster_size: u32,
}

impl Default for ChessResponseParams {
    fn default() -> Self {
        Self {
            threshold_rel: 0.2,
            nms_radius: 2,
            min_cluster_size: 2,
        }
    }
}

/// Neighbour search settings for grid assembly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridGraphParams {
    /// Nearest neighbours examined per corner.
    pub k_neighbors: usize,
    /// Accepted spacing window, relative to the median nearest-neighbour distance.
    pub spacing_tolerance: f32,
    pub orientation_tolerance_deg: f32,
}

impl Default for GridGraphParams {
    fn default() -> Self {
        Self {
            k_neighbors: 8,
            spacing_tolerance: 0.4,
            orientation_tolerance_deg: 22.5,
        }
    }
}

/// Parameters of the checkerboard corner detector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChessDetectorParams {
    pub response: ChessResponseParams,
    pub graph: GridGraphParams,
}
