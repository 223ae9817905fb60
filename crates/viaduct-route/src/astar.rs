//! A* pathfinding over the obstacle grid, with via moves and path
//! post-processing.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::grid::{Cell, ObstacleMap};
use crate::types::{RouteResult, Waypoint};

pub const SQRT2: f64 = std::f64::consts::SQRT_2;

/// 8 planar moves: (dcol, drow, cost).
const DIAG_MOVES: [(i32, i32, f64); 8] = [
    (1, 0, 1.0),
    (-1, 0, 1.0),
    (0, 1, 1.0),
    (0, -1, 1.0),
    (1, 1, SQRT2),
    (1, -1, SQRT2),
    (-1, 1, SQRT2),
    (-1, -1, SQRT2),
];

/// 4 cardinal moves only.
const CARDINAL_MOVES: [(i32, i32, f64); 4] = [(1, 0, 1.0), (-1, 0, 1.0), (0, 1, 1.0), (0, -1, 1.0)];

/// Why a search produced no path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFailure {
    NoPath,
    IterationLimit,
}

impl SearchFailure {
    fn message(self) -> &'static str {
        match self {
            SearchFailure::NoPath => "No path found",
            SearchFailure::IterationLimit => "Iteration limit exceeded",
        }
    }
}

/// Admissible heuristic: Chebyshev-with-diagonal-cost (or Manhattan in
/// cardinal mode), plus one via cost if the goal is on another layer.
fn heuristic(node: Cell, goal: Cell, diagonal: bool, via_cost: f64) -> f64 {
    let dx = (node.0 - goal.0).abs() as f64;
    let dy = (node.1 - goal.1).abs() as f64;
    let mut h = if diagonal {
        dx.max(dy) + (SQRT2 - 1.0) * dx.min(dy)
    } else {
        dx + dy
    };
    if node.2 != goal.2 {
        h += via_cost;
    }
    h
}

/// Open-set entry ordered by f-score with an insertion counter tie-break:
/// equal f-scores pop in insertion order.
#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenEntry {
    f: f64,
    counter: u64,
    node: Cell,
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap on (f, counter) via BinaryHeap.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.counter.cmp(&self.counter))
    }
}

/// Run A* from `start` to `goal` on the grid. Nodes are `(col, row,
/// layer)`; layer changes cost `via_cost` and are allowed at any cell
/// whose same-position neighbor is unblocked.
pub fn astar_search(
    grid: &ObstacleMap,
    start: Cell,
    goal: Cell,
    via_cost: f64,
    diagonal: bool,
    max_iterations: usize,
) -> Result<Vec<Cell>, SearchFailure> {
    if start == goal {
        return Ok(vec![start]);
    }
    if grid.is_blocked(start.0, start.1, start.2) || grid.is_blocked(goal.0, goal.1, goal.2) {
        return Err(SearchFailure::NoPath);
    }

    let moves: &[(i32, i32, f64)] = if diagonal { &DIAG_MOVES } else { &CARDINAL_MOVES };
    let num_layers = grid.layers.len();

    let mut open_set = BinaryHeap::new();
    let mut counter: u64 = 0;
    open_set.push(OpenEntry {
        f: heuristic(start, goal, diagonal, via_cost),
        counter,
        node: start,
    });
    counter += 1;

    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut g_score: HashMap<Cell, f64> = HashMap::from([(start, 0.0)]);
    let mut closed_set: HashSet<Cell> = HashSet::new();

    let mut iterations = 0usize;

    while let Some(entry) = open_set.pop() {
        iterations += 1;
        if iterations > max_iterations {
            return Err(SearchFailure::IterationLimit);
        }

        let current = entry.node;
        // Lazy closed-set check: stale entries are skipped, and success is
        // declared when the goal is popped, not when it is inserted.
        if !closed_set.insert(current) {
            continue;
        }

        if current == goal {
            let mut path = vec![current];
            let mut node = current;
            while let Some(&prev) = came_from.get(&node) {
                node = prev;
                path.push(node);
            }
            path.reverse();
            return Ok(path);
        }

        let (c, r, li) = current;
        let current_g = g_score.get(&current).copied().unwrap_or(f64::INFINITY);

        let consider = |neighbor: Cell,
                            step_cost: f64,
                            open_set: &mut BinaryHeap<OpenEntry>,
                            came_from: &mut HashMap<Cell, Cell>,
                            g_score: &mut HashMap<Cell, f64>,
                            counter: &mut u64| {
            let tentative_g = current_g + step_cost;
            if tentative_g < g_score.get(&neighbor).copied().unwrap_or(f64::INFINITY) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative_g);
                open_set.push(OpenEntry {
                    f: tentative_g + heuristic(neighbor, goal, diagonal, via_cost),
                    counter: *counter,
                    node: neighbor,
                });
                *counter += 1;
            }
        };

        // Planar moves on the same layer.
        for &(dc, dr, move_cost) in moves {
            let (nc, nr) = (c + dc, r + dr);
            if !grid.in_bounds(nc, nr) || grid.is_blocked(nc, nr, li) {
                continue;
            }
            consider(
                (nc, nr, li),
                move_cost,
                &mut open_set,
                &mut came_from,
                &mut g_score,
                &mut counter,
            );
        }

        // Layer changes (via insertion) at the same position.
        for nli in 0..num_layers {
            if nli == li || grid.is_blocked(c, r, nli) {
                continue;
            }
            consider(
                (c, r, nli),
                via_cost,
                &mut open_set,
                &mut came_from,
                &mut g_score,
                &mut counter,
            );
        }
    }

    Err(SearchFailure::NoPath)
}

/// Drop intermediate waypoints whose neighbors are on the same layer and
/// collinear with them. Endpoints always survive.
fn collapse_collinear(waypoints: &[Waypoint]) -> Vec<Waypoint> {
    if waypoints.len() <= 2 {
        return waypoints.to_vec();
    }

    let mut result = vec![waypoints[0].clone()];
    for i in 1..waypoints.len() - 1 {
        let prev = result.last().cloned().unwrap_or_else(|| waypoints[0].clone());
        let curr = &waypoints[i];
        let next = &waypoints[i + 1];

        if curr.layer != prev.layer || curr.layer != next.layer {
            result.push(curr.clone());
            continue;
        }

        let dx1 = curr.x - prev.x;
        let dy1 = curr.y - prev.y;
        let dx2 = next.x - curr.x;
        let dy2 = next.y - curr.y;
        let cross = dx1 * dy2 - dy1 * dx2;
        if cross.abs() > 1e-9 {
            result.push(curr.clone());
        }
    }
    result.push(waypoints[waypoints.len() - 1].clone());
    result
}

/// A via sits wherever two consecutive waypoints change layer; it is
/// reported at the earlier waypoint's position.
fn detect_vias(waypoints: &[Waypoint]) -> Vec<Waypoint> {
    let mut vias = Vec::new();
    for i in 1..waypoints.len() {
        if waypoints[i].layer != waypoints[i - 1].layer {
            vias.push(waypoints[i - 1].clone());
        }
    }
    vias
}

/// Route between two board-space points, snapping them to the grid.
///
/// The reported cost is recomputed from the raw path (Euclidean step
/// lengths over the grid resolution, plus `via_cost` per layer change);
/// it tracks the A* g-score closely but is indicative, not canonical.
#[allow(clippy::too_many_arguments)]
pub fn astar_route(
    grid: &ObstacleMap,
    start_x: f64,
    start_y: f64,
    start_layer: &str,
    end_x: f64,
    end_y: f64,
    end_layer: &str,
    net_name: &str,
    net_number: i32,
    via_cost: f64,
    diagonal: bool,
    max_iterations: usize,
) -> RouteResult {
    let start_li = match grid.layer_index(start_layer) {
        Ok(li) => li,
        Err(e) => return RouteResult::failure(net_name, net_number, e.to_string()),
    };
    let end_li = match grid.layer_index(end_layer) {
        Ok(li) => li,
        Err(e) => return RouteResult::failure(net_name, net_number, e.to_string()),
    };

    let start_node: Cell = (grid.mm_to_col(start_x), grid.mm_to_row(start_y), start_li);
    let goal_node: Cell = (grid.mm_to_col(end_x), grid.mm_to_row(end_y), end_li);

    let path = match astar_search(grid, start_node, goal_node, via_cost, diagonal, max_iterations)
    {
        Ok(path) => path,
        Err(failure) => {
            log::debug!(
                "route {net_name:?} ({start_x},{start_y})->({end_x},{end_y}): {}",
                failure.message()
            );
            return RouteResult::failure(net_name, net_number, failure.message().to_string());
        }
    };

    let raw_waypoints: Vec<Waypoint> = path
        .iter()
        .map(|&(c, r, li)| Waypoint {
            x: grid.col_to_mm(c),
            y: grid.row_to_mm(r),
            layer: grid.layers[li].clone(),
        })
        .collect();

    let waypoints = collapse_collinear(&raw_waypoints);
    let via_locations = detect_vias(&waypoints);

    let segment_count = waypoints
        .windows(2)
        .filter(|w| w[0].layer == w[1].layer)
        .count();

    let mut total_cost = 0.0;
    for w in raw_waypoints.windows(2) {
        if w[0].layer != w[1].layer {
            total_cost += via_cost;
        } else {
            total_cost += (w[1].x - w[0].x).hypot(w[1].y - w[0].y) / grid.resolution;
        }
    }

    RouteResult {
        success: true,
        net_name: net_name.to_string(),
        net_number,
        via_count: via_locations.len(),
        segment_count,
        waypoints,
        via_locations,
        total_cost,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ObstacleMap;

    fn grid_20x20(layers: &[&str]) -> ObstacleMap {
        ObstacleMap::new(
            0.0,
            0.0,
            20.0,
            20.0,
            1.0,
            layers.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn route(grid: &ObstacleMap, sx: f64, sy: f64, ex: f64, ey: f64, via_cost: f64) -> RouteResult {
        astar_route(
            grid, sx, sy, "F.Cu", ex, ey, "F.Cu", "NET", 1, via_cost, true, 500_000,
        )
    }

    #[test]
    fn same_cell_start_and_goal() {
        let grid = grid_20x20(&["F.Cu"]);
        let path = astar_search(&grid, (5, 5, 0), (5, 5, 0), 5.0, true, 500_000).unwrap();
        assert_eq!(path, vec![(5, 5, 0)]);
    }

    #[test]
    fn blocked_endpoints_are_no_path() {
        let mut grid = grid_20x20(&["F.Cu"]);
        grid.blocked.insert((2, 2, 0));
        assert_eq!(
            astar_search(&grid, (2, 2, 0), (8, 8, 0), 5.0, true, 500_000),
            Err(SearchFailure::NoPath)
        );
        assert_eq!(
            astar_search(&grid, (8, 8, 0), (2, 2, 0), 5.0, true, 500_000),
            Err(SearchFailure::NoPath)
        );
    }

    #[test]
    fn straight_route_collapses_to_two_waypoints() {
        let grid = grid_20x20(&["F.Cu"]);
        let result = route(&grid, 2.0, 2.0, 18.0, 2.0, 5.0);
        assert!(result.success);
        assert_eq!(result.waypoints.len(), 2);
        assert_eq!((result.waypoints[0].x, result.waypoints[0].y), (2.0, 2.0));
        assert_eq!((result.waypoints[1].x, result.waypoints[1].y), (18.0, 2.0));
        assert_eq!(result.segment_count, 1);
        assert_eq!(result.via_count, 0);
        assert!((result.total_cost - 16.0).abs() < 1e-9);
    }

    #[test]
    fn moves_are_planar_steps_or_layer_changes() {
        let mut grid = grid_20x20(&["F.Cu", "B.Cu"]);
        for r in 0..20 {
            grid.blocked.insert((10, r, 0));
        }
        let path =
            astar_search(&grid, (2, 2, 0), (18, 2, 0), 1.0, true, 500_000).unwrap();
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            if a.2 == b.2 {
                assert!((a.0 - b.0).abs() <= 1 && (a.1 - b.1).abs() <= 1);
            } else {
                assert_eq!((a.0, a.1), (b.0, b.1));
            }
        }
    }

    #[test]
    fn wall_forces_layer_change_vias() {
        let mut grid = grid_20x20(&["F.Cu", "B.Cu"]);
        for r in 0..20 {
            grid.blocked.insert((10, r, 0));
        }
        let result = route(&grid, 2.0, 2.0, 18.0, 2.0, 1.0);
        assert!(result.success);
        assert!(result.via_count >= 2);
        for wp in &result.waypoints {
            assert!(wp.layer == "F.Cu" || wp.layer == "B.Cu");
        }
        assert_eq!(result.waypoints.first().map(|w| (w.x, w.y)), Some((2.0, 2.0)));
        assert_eq!(result.waypoints.last().map(|w| (w.x, w.y)), Some((18.0, 2.0)));
        // Endpoints stay on the requested layer.
        assert_eq!(result.waypoints.first().map(|w| w.layer.as_str()), Some("F.Cu"));
        assert_eq!(result.waypoints.last().map(|w| w.layer.as_str()), Some("F.Cu"));
    }

    #[test]
    fn fully_walled_goal_is_no_path() {
        let mut grid = grid_20x20(&["F.Cu"]);
        for c in 14..=18 {
            for r in 0..20 {
                if c == 16 && r == 10 {
                    continue;
                }
                grid.blocked.insert((c, r, 0));
            }
        }
        // Goal cell itself free, but unreachable through the solid wall.
        grid.blocked.remove(&(16, 10, 0));
        let result = route(&grid, 2.0, 2.0, 16.0, 10.0, 5.0);
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("No path found"));
    }

    #[test]
    fn iteration_limit_reports_distinct_error() {
        let grid = grid_20x20(&["F.Cu"]);
        let result = astar_route(
            &grid, 2.0, 2.0, "F.Cu", 18.0, 18.0, "F.Cu", "N", 1, 5.0, true, 3,
        );
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Iteration limit exceeded"));
    }

    #[test]
    fn unknown_layer_fails_cleanly() {
        let grid = grid_20x20(&["F.Cu"]);
        let result = astar_route(
            &grid, 2.0, 2.0, "In1.Cu", 18.0, 2.0, "F.Cu", "N", 1, 5.0, true, 500_000,
        );
        assert!(!result.success);
        assert!(result.error.unwrap().contains("In1.Cu"));
    }

    #[test]
    fn heuristic_is_admissible_on_empty_grid() {
        let grid = grid_20x20(&["F.Cu", "B.Cu"]);
        let goal = (17, 9, 1);
        for &start in &[(2, 2, 0), (0, 19, 0), (10, 10, 1), (16, 9, 1)] {
            let h0 = heuristic(start, goal, true, 5.0);
            let path = astar_search(&grid, start, goal, 5.0, true, 500_000).unwrap();
            // True cost of the found (optimal) path.
            let mut true_cost = 0.0;
            for w in path.windows(2) {
                if w[0].2 != w[1].2 {
                    true_cost += 5.0;
                } else if w[0].0 != w[1].0 && w[0].1 != w[1].1 {
                    true_cost += SQRT2;
                } else {
                    true_cost += 1.0;
                }
            }
            assert!(
                h0 <= true_cost + 1e-9,
                "h({start:?}) = {h0} exceeds true cost {true_cost}"
            );
        }
    }

    #[test]
    fn manhattan_mode_uses_cardinal_moves_only() {
        let grid = grid_20x20(&["F.Cu"]);
        let path = astar_search(&grid, (2, 2, 0), (6, 6, 0), 5.0, false, 500_000).unwrap();
        for w in path.windows(2) {
            let planar = (w[0].0 - w[1].0).abs() + (w[0].1 - w[1].1).abs();
            assert_eq!(planar, 1);
        }
        // 4-connected shortest path length is the Manhattan distance.
        assert_eq!(path.len(), 9);
    }

    #[test]
    fn collinear_collapse_keeps_endpoints_and_corners() {
        let wp = |x: f64, y: f64, layer: &str| Waypoint {
            x,
            y,
            layer: layer.to_string(),
        };
        let path = vec![
            wp(0.0, 0.0, "F.Cu"),
            wp(1.0, 0.0, "F.Cu"),
            wp(2.0, 0.0, "F.Cu"),
            wp(2.0, 1.0, "F.Cu"),
            wp(2.0, 2.0, "F.Cu"),
        ];
        let collapsed = collapse_collinear(&path);
        assert_eq!(
            collapsed,
            vec![wp(0.0, 0.0, "F.Cu"), wp(2.0, 0.0, "F.Cu"), wp(2.0, 2.0, "F.Cu")]
        );

        // Layer changes pin waypoints even when geometrically collinear.
        let path = vec![
            wp(0.0, 0.0, "F.Cu"),
            wp(1.0, 0.0, "F.Cu"),
            wp(1.0, 0.0, "B.Cu"),
            wp(2.0, 0.0, "B.Cu"),
        ];
        let collapsed = collapse_collinear(&path);
        assert_eq!(collapsed.len(), 4);
        let vias = detect_vias(&collapsed);
        assert_eq!(vias.len(), 1);
        assert_eq!(vias[0], wp(1.0, 0.0, "F.Cu"));
    }
}
