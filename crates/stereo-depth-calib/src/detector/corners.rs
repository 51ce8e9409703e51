//! Peak picking on a ChESS response map.

use nalgebra::Point2;
use stereo_depth_core::GrayImageView;

use super::params::ChessResponseParams;
use super::response::{corner_orientation, ResponseMap, RING_RADIUS};

/// Corner candidate with subpixel position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Corner {
    pub position: Point2<f32>,
    /// Bright-diagonal direction in `[0, π)`.
    pub orientation: f32,
    /// Raw response at the integer peak.
    pub strength: f32,
}

/// Threshold, suppress non-maxima and refine the survivors.
pub fn detect_corners(
    img: &GrayImageView<'_>,
    resp: &ResponseMap,
    params: &ChessResponseParams,
) -> Vec<Corner> {
    let (w, h) = (resp.width, resp.height);
    let max_r = resp.data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max_r.is_finite() || max_r <= 0.0 {
        return Vec::new();
    }
    let thr = (params.threshold_rel * max_r).max(0.0);

    let nms_r = params.nms_radius as i32;
    let border = RING_RADIUS + params.nms_radius as usize + 2;
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let v = resp.at(x, y);
            if v < thr || v <= 0.0 {
                continue;
            }
            if !is_local_max(resp, x, y, nms_r, v) {
                continue;
            }
            if count_positive_neighbors(resp, x, y, nms_r) < params.min_cluster_size {
                continue;
            }

            let position = refine_com_5x5(resp, x, y);
            corners.push(Corner {
                position,
                orientation: corner_orientation(img, position.x, position.y),
                strength: v,
            });
        }
    }
    corners
}

/// Ties are broken towards the first pixel in scan order.
fn is_local_max(resp: &ResponseMap, x: usize, y: usize, r: i32, v: f32) -> bool {
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            let xx = (x as i32 + dx) as usize;
            let yy = (y as i32 + dy) as usize;
            let vv = resp.at(xx, yy);
            let earlier = dy < 0 || (dy == 0 && dx < 0);
            if vv > v || (vv == v && earlier) {
                return false;
            }
        }
    }
    true
}

fn count_positive_neighbors(resp: &ResponseMap, x: usize, y: usize, r: i32) -> u32 {
    let mut count = 0;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx == 0 && dy == 0 {
                continue;
            }
            if resp.at((x as i32 + dx) as usize, (y as i32 + dy) as usize) > 0.0 {
                count += 1;
            }
        }
    }
    count
}

/// Centre of mass of `max(0, R)` in the 5x5 window around an integer peak.
fn refine_com_5x5(resp: &ResponseMap, x: usize, y: usize) -> Point2<f32> {
    let (mut sx, mut sy, mut sw) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -2i32..=2 {
        for dx in -2i32..=2 {
            let xx = (x as i32 + dx) as usize;
            let yy = (y as i32 + dy) as usize;
            let wpx = resp.at(xx, yy).max(0.0);
            sx += xx as f32 * wpx;
            sy += yy as f32 * wpx;
            sw += wpx;
        }
    }
    if sw > 0.0 {
        Point2::new(sx / sw, sy / sw)
    } else {
        Point2::new(x as f32, y as f32)
    }
}
