//! Grid-based auto-routing for PCB layouts.
//!
//! The pipeline: extract footprints/segments/outline from a board, build a
//! sparse [`ObstacleMap`](grid::ObstacleMap), run [`astar`] searches pad to
//! pad, and let [`batch`] drive whole-board routing net by net. All
//! functions here are pure over their inputs; converting routed paths into
//! board mutations is the session layer's business.

pub mod astar;
pub mod batch;
pub mod grid;
pub mod types;

pub use astar::{SearchFailure, astar_route, astar_search};
pub use batch::{minimum_spanning_tree, route_all_nets};
pub use grid::{Cell, GridStats, ObstacleMap, RouteError, build_obstacle_map};
pub use types::{BatchRouteResult, GridConfig, RoutePreview, RouteResult, Waypoint};

/// Cheap route feasibility estimate: distances plus the blocked-cell
/// density of the axis-aligned corridor between the endpoints. No search
/// is run.
pub fn route_preview(
    grid: &ObstacleMap,
    start_x: f64,
    start_y: f64,
    end_x: f64,
    end_y: f64,
    layer: &str,
) -> RoutePreview {
    let manhattan = (end_x - start_x).abs() + (end_y - start_y).abs();
    let straight = (end_x - start_x).hypot(end_y - start_y);

    let li = grid.layer_index(layer).unwrap_or(0);

    let (c1, r1) = (grid.mm_to_col(start_x), grid.mm_to_row(start_y));
    let (c2, r2) = (grid.mm_to_col(end_x), grid.mm_to_row(end_y));
    let min_c = c1.min(c2).max(0);
    let max_c = c1.max(c2).min(grid.cols - 1);
    let min_r = r1.min(r2).max(0);
    let max_r = r1.max(r2).min(grid.rows - 1);

    let mut total = 0usize;
    let mut blocked = 0usize;
    for c in min_c..=max_c {
        for r in min_r..=max_r {
            total += 1;
            if grid.is_blocked(c, r, li) {
                blocked += 1;
            }
        }
    }

    let density = blocked as f64 / total.max(1) as f64;
    RoutePreview {
        manhattan_distance: manhattan,
        straight_line_distance: straight,
        obstacle_density: density,
        estimated_feasible: density < 0.8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_reports_distances_and_density() {
        let mut grid = ObstacleMap::new(
            0.0,
            0.0,
            10.0,
            10.0,
            0.5,
            vec!["F.Cu".to_string()],
        );
        let clear = route_preview(&grid, 1.0, 1.0, 4.0, 5.0, "F.Cu");
        assert_eq!(clear.manhattan_distance, 7.0);
        assert_eq!(clear.straight_line_distance, 5.0);
        assert_eq!(clear.obstacle_density, 0.0);
        assert!(clear.estimated_feasible);

        // Choke the corridor and the estimate flips.
        for c in 0..grid.cols {
            for r in 0..grid.rows {
                grid.blocked.insert((c, r, 0));
            }
        }
        let choked = route_preview(&grid, 1.0, 1.0, 4.0, 5.0, "F.Cu");
        assert_eq!(choked.obstacle_density, 1.0);
        assert!(!choked.estimated_feasible);
    }
}
