//! Batch routing: minimum spanning tree per net, shortest nets first,
//! cumulative obstacle updates between nets.

use viaduct_board::{RatsnestPad, UnroutedNet};

use crate::astar::astar_route;
use crate::grid::ObstacleMap;
use crate::types::BatchRouteResult;

/// MST edges over pad positions, by Prim's algorithm with Euclidean
/// weights. Quadratic in the pad count, which is fine for real nets.
pub fn minimum_spanning_tree(pads: &[RatsnestPad]) -> Vec<(usize, usize)> {
    let n = pads.len();
    if n <= 1 {
        return Vec::new();
    }

    let dist = |i: usize, j: usize| (pads[i].x - pads[j].x).hypot(pads[i].y - pads[j].y);

    let mut in_tree = vec![false; n];
    let mut min_cost = vec![f64::INFINITY; n];
    let mut min_edge = vec![0usize; n];
    let mut edges = Vec::with_capacity(n - 1);

    in_tree[0] = true;
    for j in 1..n {
        min_cost[j] = dist(0, j);
    }

    for _ in 0..n - 1 {
        let mut best = None;
        let mut best_cost = f64::INFINITY;
        for j in 0..n {
            if !in_tree[j] && min_cost[j] < best_cost {
                best = Some(j);
                best_cost = min_cost[j];
            }
        }
        let Some(best) = best else { break };

        in_tree[best] = true;
        edges.push((min_edge[best], best));

        for j in 0..n {
            if !in_tree[j] {
                let d = dist(best, j);
                if d < min_cost[j] {
                    min_cost[j] = d;
                    min_edge[j] = best;
                }
            }
        }
    }

    edges
}

fn net_min_distance(net: &UnroutedNet) -> f64 {
    let pads = &net.pads;
    if pads.len() < 2 {
        return f64::INFINITY;
    }
    let mut min_d = f64::INFINITY;
    for i in 0..pads.len() {
        for j in i + 1..pads.len() {
            let d = (pads[i].x - pads[j].x).hypot(pads[i].y - pads[j].y);
            min_d = min_d.min(d);
        }
    }
    min_d
}

/// Route every unrouted net, easiest (shortest pad pair) first.
///
/// Each net first has its own cells cleared from the grid, then its MST
/// edges are routed on the preferred (or first) copper layer. Successful
/// edges are rasterized back into the grid one cell wide, so later nets
/// see the cumulative copper of everything routed before them; given the
/// same inputs the whole pass is deterministic.
pub fn route_all_nets(
    grid: &mut ObstacleMap,
    unrouted_nets: &[UnroutedNet],
    via_cost: f64,
    diagonal: bool,
    max_nets: Option<usize>,
    preferred_layer: Option<&str>,
) -> BatchRouteResult {
    let mut result = BatchRouteResult::default();

    let mut sorted: Vec<&UnroutedNet> = unrouted_nets.iter().collect();
    sorted.sort_by(|a, b| net_min_distance(a).total_cmp(&net_min_distance(b)));
    if let Some(max) = max_nets {
        sorted.truncate(max);
    }

    let default_layer = preferred_layer
        .map(str::to_string)
        .or_else(|| grid.layers.first().cloned())
        .unwrap_or_default();

    for net in sorted {
        if net.pads.len() < 2 {
            continue;
        }

        grid.clear_net(net.net_number);
        let mst_edges = minimum_spanning_tree(&net.pads);

        let mut net_success = true;
        let mut net_segments = 0;
        let mut net_vias = 0;

        for (i, j) in mst_edges {
            let pad_a = &net.pads[i];
            let pad_b = &net.pads[j];

            let route = astar_route(
                grid,
                pad_a.x,
                pad_a.y,
                &default_layer,
                pad_b.x,
                pad_b.y,
                &default_layer,
                &net.net_name,
                net.net_number,
                via_cost,
                diagonal,
                500_000,
            );

            if route.success {
                net_segments += route.segment_count;
                net_vias += route.via_count;

                // Mark the fresh copper so later nets route around it.
                for w in route.waypoints.windows(2) {
                    if w[0].layer != w[1].layer {
                        continue;
                    }
                    let Ok(li) = grid.layer_index(&w[1].layer) else {
                        continue;
                    };
                    grid.mark_segment_line(
                        w[0].x,
                        w[0].y,
                        w[1].x,
                        w[1].y,
                        grid.resolution,
                        li,
                        Some(net.net_number),
                    );
                }
                result.results.push(route);
            } else {
                net_success = false;
                result.results.push(route);
            }
        }

        if net_success {
            result.routed_count += 1;
            result.routed_nets.push(net.net_name.clone());
            result.total_segments += net_segments;
            result.total_vias += net_vias;
        } else {
            result.failed_count += 1;
            result.failed_nets.push(net.net_name.clone());
        }
    }

    log::info!(
        "batch route: {} routed, {} failed, {} segments, {} vias",
        result.routed_count,
        result.failed_count,
        result.total_segments,
        result.total_vias
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(reference: &str, x: f64, y: f64) -> RatsnestPad {
        RatsnestPad {
            reference: reference.to_string(),
            pad: "1".to_string(),
            x,
            y,
        }
    }

    fn net(number: i32, name: &str, pads: Vec<RatsnestPad>) -> UnroutedNet {
        UnroutedNet {
            net_number: number,
            net_name: name.to_string(),
            pad_count: pads.len(),
            pads,
        }
    }

    fn open_grid() -> ObstacleMap {
        ObstacleMap::new(
            0.0,
            0.0,
            20.0,
            20.0,
            0.5,
            vec!["F.Cu".to_string()],
        )
    }

    #[test]
    fn mst_chains_collinear_pads() {
        let pads = vec![pad("A", 0.0, 0.0), pad("B", 10.0, 0.0), pad("C", 5.0, 0.0)];
        let mut edges = minimum_spanning_tree(&pads);
        edges.sort();
        // Chain through the middle pad, never the long 0-1 edge.
        assert_eq!(edges.len(), 2);
        assert!(edges.contains(&(0, 2)) || edges.contains(&(2, 0)));
        assert!(!edges.contains(&(0, 1)));
    }

    #[test]
    fn mst_trivial_inputs() {
        assert!(minimum_spanning_tree(&[]).is_empty());
        assert!(minimum_spanning_tree(&[pad("A", 1.0, 1.0)]).is_empty());
        assert_eq!(
            minimum_spanning_tree(&[pad("A", 0.0, 0.0), pad("B", 3.0, 4.0)]),
            vec![(0, 1)]
        );
    }

    #[test]
    fn routes_two_simple_nets() {
        let mut grid = open_grid();
        let nets = vec![
            net(1, "GND", vec![pad("C1", 2.0, 2.0), pad("C2", 18.0, 2.0)]),
            net(2, "VCC", vec![pad("C1", 2.0, 18.0), pad("C2", 18.0, 18.0)]),
        ];
        let result = route_all_nets(&mut grid, &nets, 5.0, true, None, None);
        assert_eq!(result.routed_count, 2);
        assert_eq!(result.failed_count, 0);
        assert_eq!(result.results.len(), 2);
        assert!(result.total_segments >= 2);
    }

    #[test]
    fn shorter_nets_route_first() {
        let mut grid = open_grid();
        let nets = vec![
            net(1, "LONG", vec![pad("A", 2.0, 2.0), pad("B", 18.0, 18.0)]),
            net(2, "SHORT", vec![pad("C", 2.0, 10.0), pad("D", 4.0, 10.0)]),
        ];
        let result = route_all_nets(&mut grid, &nets, 5.0, true, None, None);
        assert_eq!(result.routed_nets, vec!["SHORT", "LONG"]);
    }

    #[test]
    fn max_nets_truncates() {
        let mut grid = open_grid();
        let nets = vec![
            net(1, "A", vec![pad("A", 2.0, 2.0), pad("B", 6.0, 2.0)]),
            net(2, "B", vec![pad("C", 2.0, 6.0), pad("D", 12.0, 6.0)]),
            net(3, "C", vec![pad("E", 2.0, 10.0), pad("F", 18.0, 10.0)]),
        ];
        let result = route_all_nets(&mut grid, &nets, 5.0, true, Some(2), None);
        assert_eq!(result.routed_count + result.failed_count, 2);
    }

    #[test]
    fn second_net_detours_around_first() {
        // Single layer: the first-routed (shorter) net's copper bisects the
        // second net's straight path, forcing a detour.
        let mut grid = open_grid();
        let nets = vec![
            net(2, "ACROSS", vec![pad("L", 2.0, 10.0), pad("R", 18.0, 10.0)]),
            net(1, "BAR", vec![pad("T", 10.0, 6.0), pad("B", 10.0, 14.0)]),
        ];
        let result = route_all_nets(&mut grid, &nets, 5.0, true, None, None);
        assert_eq!(result.routed_count, 2);
        assert_eq!(result.routed_nets, vec!["BAR", "ACROSS"]);

        let bar = result.results.iter().find(|r| r.net_name == "BAR").unwrap();
        let across = result
            .results
            .iter()
            .find(|r| r.net_name == "ACROSS")
            .unwrap();
        assert!(bar.success && across.success);

        // The bar is a straight two-waypoint run; the crossing net costs
        // more than its unobstructed straight line (32 cells at 0.5 mm).
        assert_eq!(bar.waypoints.len(), 2);
        assert!(across.waypoints.len() > 2);
        assert!(across.total_cost > 32.0 + 1e-9);
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let nets = vec![
            net(1, "A", vec![pad("A", 2.0, 2.0), pad("B", 18.0, 2.0)]),
            net(2, "B", vec![pad("C", 2.0, 3.0), pad("D", 18.0, 3.0)]),
            net(3, "C", vec![pad("E", 2.0, 4.0), pad("F", 18.0, 4.0)]),
        ];
        let mut grid_a = open_grid();
        let mut grid_b = open_grid();
        let first = route_all_nets(&mut grid_a, &nets, 5.0, true, None, None);
        let second = route_all_nets(&mut grid_b, &nets, 5.0, true, None, None);
        assert_eq!(first.routed_nets, second.routed_nets);
        assert_eq!(first.results, second.results);
        assert_eq!(first.total_segments, second.total_segments);
    }

    #[test]
    fn failed_edge_fails_whole_net_and_continues() {
        let mut grid = open_grid();
        // Wall off the right half on the only layer.
        for r in 0..grid.rows {
            for c in 20..24 {
                grid.blocked.insert((c, r, 0));
            }
        }
        let nets = vec![
            net(1, "BLOCKED", vec![pad("A", 2.0, 2.0), pad("B", 18.0, 2.0)]),
            net(2, "OK", vec![pad("C", 2.0, 6.0), pad("D", 8.0, 6.0)]),
        ];
        let result = route_all_nets(&mut grid, &nets, 5.0, true, None, None);
        assert_eq!(result.routed_count, 1);
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.failed_nets, vec!["BLOCKED"]);
        let failed = result.results.iter().find(|r| !r.success).unwrap();
        assert_eq!(failed.error.as_deref(), Some("No path found"));
    }
}
