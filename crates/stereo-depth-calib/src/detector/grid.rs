//! 4-connected grid graph over corner candidates.
//!
//! Neighbour relations use image-space direction classes (right/left/up/down),
//! so the board must appear rotated by less than 45° in the image.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

use super::corners::Corner;
use super::params::GridGraphParams;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn step(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }

    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Angle between an undirected axis (modulo π) and a directed vector angle, in `[0, π/2]`.
fn axis_vec_diff(axis_angle: f32, vec_angle: f32) -> f32 {
    let pi = std::f32::consts::PI;
    let mut diff = (vec_angle - axis_angle).rem_euclid(2.0 * pi);
    if diff >= pi {
        diff -= 2.0 * pi;
    }
    let diff_abs = diff.abs();
    diff_abs.min(pi - diff_abs)
}

/// Absolute difference between two undirected angles, in `[0, π/2]`.
fn angle_diff_abs(a: f32, b: f32) -> f32 {
    axis_vec_diff(a, b)
}

fn direction_quadrant(v: &Vector2<f32>) -> NeighborDirection {
    if v.x.abs() > v.y.abs() {
        if v.x >= 0.0 {
            NeighborDirection::Right
        } else {
            NeighborDirection::Left
        }
    } else if v.y >= 0.0 {
        NeighborDirection::Down
    } else {
        NeighborDirection::Up
    }
}

fn is_good_neighbor(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    spacing: (f32, f32),
    tol: f32,
) -> Option<NodeNeighbor> {
    // Adjacent checkerboard corners swap the bright diagonal.
    let orientation_gap = angle_diff_abs(corner.orientation, neighbor.orientation);
    if (std::f32::consts::FRAC_PI_2 - orientation_gap).abs() > tol {
        return None;
    }

    let v = neighbor.position - corner.position;
    let distance = v.norm();
    if distance < spacing.0 || distance > spacing.1 {
        return None;
    }

    // Grid edges run at ~45° to both diagonals.
    let edge_angle = v.y.atan2(v.x);
    let expected = std::f32::consts::FRAC_PI_4;
    let score_corner = (axis_vec_diff(corner.orientation, edge_angle) - expected).abs();
    let score_neighbor = (axis_vec_diff(neighbor.orientation, edge_angle) - expected).abs();
    if score_corner > tol || score_neighbor > tol {
        return None;
    }

    Some(NodeNeighbor {
        direction: direction_quadrant(&v),
        index: neighbor_index,
        distance,
        score: score_corner + score_neighbor + (std::f32::consts::FRAC_PI_2 - orientation_gap).abs(),
    })
}

/// Keep at most one neighbour per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// Up to `k` nearest entries as `(index, euclidean distance)`, closest first.
fn nearest(tree: &KdTree<f32, 2>, query: &[f32; 2], k: usize) -> Vec<(usize, f32)> {
    if k == 0 {
        return Vec::new();
    }
    tree.nearest_n::<SquaredEuclidean>(query, k)
        .into_iter()
        .map(|nn| (nn.item as usize, nn.distance.sqrt()))
        .collect()
}

/// Median distance from each corner to its nearest other corner.
pub fn median_spacing(corners: &[Corner]) -> Option<f32> {
    if corners.len() < 2 {
        return None;
    }
    let coords: Vec<[f32; 2]> = corners.iter().map(|c| [c.position.x, c.position.y]).collect();
    let tree: KdTree<f32, 2> = (&coords).into();
    let mut d: Vec<f32> = coords
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            nearest(&tree, q, 2)
                .into_iter()
                .find(|&(j, _)| j != i)
                .map(|(_, d)| d)
        })
        .collect();
    if d.is_empty() {
        return None;
    }
    d.sort_by(|a, b| a.total_cmp(b));
    Some(d[d.len() / 2])
}

pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        let Some(spacing) = median_spacing(corners) else {
            return Self {
                neighbors: vec![Vec::new(); corners.len()],
            };
        };
        let window = (
            spacing * (1.0 - params.spacing_tolerance),
            spacing * (1.0 + params.spacing_tolerance),
        );
        let tol = params.orientation_tolerance_deg.to_radians();

        let coords: Vec<[f32; 2]> = corners.iter().map(|c| [c.position.x, c.position.y]).collect();
        let tree: KdTree<f32, 2> = (&coords).into();
        let mut neighbors = Vec::with_capacity(corners.len());

        for (i, corner) in corners.iter().enumerate() {
            let candidates = nearest(&tree, &coords[i], params.k_neighbors + 1)
                .into_iter()
                .map(|(j, _)| j)
                .filter(|&j| j != i)
                .filter_map(|j| is_good_neighbor(corner, &corners[j], j, window, tol))
                .collect();
            neighbors.push(select_neighbors(candidates));
        }

        let mut graph = Self { neighbors };
        graph.keep_mutual_edges();
        graph
    }

    /// Drop edges that the other endpoint does not reciprocate.
    fn keep_mutual_edges(&mut self) {
        let snapshot: Vec<Vec<usize>> = self
            .neighbors
            .iter()
            .map(|n| n.iter().map(|e| e.index).collect())
            .collect();
        for (i, list) in self.neighbors.iter_mut().enumerate() {
            list.retain(|e| snapshot[e.index].contains(&i));
        }
    }

    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.neighbors.len()];
        let mut components = Vec::new();

        for start in 0..self.neighbors.len() {
            if visited[start] {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                component.push(node);
                for neighbor in &self.neighbors[node] {
                    if !visited[neighbor.index] {
                        stack.push(neighbor.index);
                    }
                }
            }
            components.push(component);
        }
        components
    }

    /// BFS labelling of a component with integer `(i, j)`, normalized so the
    /// minimum of each axis is 0. Returns `None` if two corners claim the same cell.
    pub fn assign_grid_coordinates(&self, component: &[usize]) -> Option<Vec<(usize, i32, i32)>> {
        let start = *component.first()?;
        let mut coords = Vec::with_capacity(component.len());
        let mut visited = vec![false; self.neighbors.len()];
        let mut cells: HashMap<(i32, i32), usize> = HashMap::new();
        let mut queue = VecDeque::new();
        queue.push_back((start, 0, 0));

        while let Some((node, i, j)) = queue.pop_front() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            if let Some(&other) = cells.get(&(i, j)) {
                if other != node {
                    return None;
                }
            }
            cells.insert((i, j), node);
            coords.push((node, i, j));

            for neighbor in &self.neighbors[node] {
                let (di, dj) = neighbor.direction.step();
                queue.push_back((neighbor.index, i + di, j + dj));
            }
        }

        let min_i = coords.iter().map(|c| c.1).min()?;
        let min_j = coords.iter().map(|c| c.2).min()?;
        Some(
            coords
                .into_iter()
                .map(|(n, i, j)| (n, i - min_i, j - min_j))
                .collect(),
        )
    }
}

/// Crop a labelled component to the single `width x height` window of cells
/// that is fully occupied, re-offset to start at `(0, 0)`.
///
/// Stray corners that latch onto the board edge widen the labelled span; they
/// fall outside the window and are dropped. Returns `None` when no window, or
/// more than one, is complete.
pub fn crop_to_full_window(
    labelled: &[(usize, i32, i32)],
    width: i32,
    height: i32,
) -> Option<Vec<(usize, i32, i32)>> {
    let span_i = labelled.iter().map(|c| c.1).max()? + 1;
    let span_j = labelled.iter().map(|c| c.2).max()? + 1;
    let needed = (width * height) as usize;

    let mut full = None;
    for j0 in 0..=(span_j - height) {
        for i0 in 0..=(span_i - width) {
            let inside = |&&(_, i, j): &&(usize, i32, i32)| {
                (i0..i0 + width).contains(&i) && (j0..j0 + height).contains(&j)
            };
            if labelled.iter().filter(inside).count() != needed {
                continue;
            }
            if full.is_some() {
                return None;
            }
            full = Some(
                labelled
                    .iter()
                    .filter(inside)
                    .map(|&(n, i, j)| (n, i - i0, j - j0))
                    .collect(),
            );
        }
    }
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, orientation: f32) -> Corner {
        Corner {
            position: Point2::new(x, y),
            orientation,
            strength: 1.0,
        }
    }

    fn regular_grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                let orientation = if (i + j) % 2 == 0 {
                    FRAC_PI_4
                } else {
                    3.0 * FRAC_PI_4
                };
                corners.push(make_corner(
                    100.0 + i as f32 * spacing,
                    50.0 + j as f32 * spacing,
                    orientation,
                ));
            }
        }
        corners
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = regular_grid(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let idx = |i: usize, j: usize| j * 3 + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::Left].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::Right].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::Up].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::Down].index);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::Right));
        assert!(top_left.contains_key(&NeighborDirection::Down));
    }

    #[test]
    fn rejects_neighbors_with_same_orientation() {
        let corners = vec![make_corner(0.0, 0.0, FRAC_PI_4), make_corner(10.0, 0.0, FRAC_PI_4)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        assert!(graph.neighbors[0].is_empty());
        assert!(graph.neighbors[1].is_empty());
    }

    #[test]
    fn labels_full_grid_from_any_start() {
        let corners = regular_grid(4, 3, 12.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let components = graph.connected_components();
        assert_eq!(components.len(), 1);

        let coords = graph
            .assign_grid_coordinates(&components[0])
            .expect("consistent grid");
        assert_eq!(coords.len(), 12);
        for (node, i, j) in coords {
            assert_eq!(node, j as usize * 4 + i as usize);
        }
    }

    #[test]
    fn isolated_corner_forms_its_own_component() {
        let mut corners = regular_grid(3, 3, 10.0);
        corners.push(make_corner(400.0, 400.0, FRAC_PI_4));
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let mut sizes: Vec<usize> = graph.connected_components().iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 9]);
    }

    #[test]
    fn nearest_returns_closest_first_and_caps_at_tree_size() {
        let coords = vec![[0.0f32, 0.0], [3.0, 0.0], [1.0, 0.0]];
        let tree: KdTree<f32, 2> = (&coords).into();

        let hits = nearest(&tree, &[0.0, 0.0], 2);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![0, 2]);
        assert!((hits[1].1 - 1.0).abs() < 1e-6);

        assert_eq!(nearest(&tree, &[0.0, 0.0], 10).len(), 3);
        assert!(nearest(&tree, &[0.0, 0.0], 0).is_empty());
    }

    #[test]
    fn stray_corner_on_the_edge_is_cropped_away() {
        let mut corners = regular_grid(4, 3, 12.0);
        corners.push(make_corner(100.0 + 4.0 * 12.0, 50.0 + 12.0, 3.0 * FRAC_PI_4));
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let component = graph
            .connected_components()
            .into_iter()
            .max_by_key(|c| c.len())
            .expect("component");
        assert_eq!(component.len(), 13);

        let labelled = graph
            .assign_grid_coordinates(&component)
            .expect("consistent grid");
        let cropped = crop_to_full_window(&labelled, 4, 3).expect("one full window");
        assert_eq!(cropped.len(), 12);
        assert!(cropped.iter().all(|&(n, _, _)| n != 12));
        for (node, i, j) in cropped {
            assert_eq!(node, j as usize * 4 + i as usize);
        }
    }

    #[test]
    fn ambiguous_or_short_windows_are_rejected() {
        let corners = regular_grid(5, 3, 12.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let components = graph.connected_components();
        let labelled = graph
            .assign_grid_coordinates(&components[0])
            .expect("consistent grid");

        assert!(crop_to_full_window(&labelled, 4, 3).is_none());
        assert!(crop_to_full_window(&labelled, 6, 3).is_none());
        assert_eq!(crop_to_full_window(&labelled, 5, 3).map(|c| c.len()), Some(15));
    }
}
