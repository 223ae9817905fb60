//! Force-directed component placement with a simulated-annealing schedule.
//!
//! Connected components attract in proportion to how many nets they share;
//! nearby components repel; displacement per iteration is capped by a
//! cooling temperature and everything is clamped inside the board outline.
//! The objective tracked is HPWL (half-perimeter wire length), the
//! standard EDA wirelength estimate.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use serde::Serialize;
use viaduct_board::{BoundingBox, Footprint};

/// Tuning parameters for the solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementConfig {
    pub max_iterations: usize,
    /// Minimum clearance between components, mm.
    pub min_clearance: f64,
    pub k_attract: f64,
    pub k_repel: f64,
    pub initial_temperature: f64,
    /// Temperature decay per iteration.
    pub cooling_rate: f64,
    /// Stop when the largest displacement falls below this, mm.
    pub convergence_threshold: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        PlacementConfig {
            max_iterations: 500,
            min_clearance: 0.5,
            k_attract: 0.01,
            k_repel: 2.0,
            initial_temperature: 10.0,
            cooling_rate: 0.95,
            convergence_threshold: 0.01,
        }
    }
}

/// A component's placement state during optimization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentPlacement {
    pub reference: String,
    pub x: f64,
    pub y: f64,
    /// Estimated bbox from pad extents, mm.
    pub width: f64,
    pub height: f64,
    pub locked: bool,
    /// Net numbers this component participates in.
    pub net_connections: Vec<i32>,
}

/// One component move produced by the solver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movement {
    pub reference: String,
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub dx: f64,
    pub dy: f64,
}

/// Result of a placement optimization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementResult {
    pub movements: Vec<Movement>,
    pub hpwl_before: f64,
    pub hpwl_after: f64,
    pub hpwl_reduction_pct: f64,
    pub overlap_count: usize,
    pub iterations_used: usize,
    pub converged: bool,
}

/// Per-net wirelength line in an evaluation report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetWirelength {
    pub net_number: i32,
    pub pad_count: usize,
    pub hpwl: f64,
}

/// Read-only evaluation of the current placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlacementEvaluation {
    pub hpwl_total: f64,
    pub overlap_count: usize,
    pub component_count: usize,
    /// Component area over board area.
    pub density: f64,
    pub per_net_wirelength: Vec<NetWirelength>,
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// Estimated (width, height) of a footprint from its pad extents, with a
/// 0.1 mm floor per axis. Pad-less footprints get a 1 mm square.
fn estimate_bbox(fp: &Footprint) -> (f64, f64) {
    if fp.pads.is_empty() {
        return (1.0, 1.0);
    }
    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for pad in &fp.pads {
        let hw = pad.size.0 / 2.0;
        let hh = pad.size.1 / 2.0;
        min_x = min_x.min(pad.position.x - hw);
        max_x = max_x.max(pad.position.x + hw);
        min_y = min_y.min(pad.position.y - hh);
        max_y = max_y.max(pad.position.y + hh);
    }
    ((max_x - min_x).max(0.1), (max_y - min_y).max(0.1))
}

/// Net number to the references connected to it. Net 0 ("no net") is
/// skipped.
fn build_net_map(footprints: &[Footprint]) -> BTreeMap<i32, Vec<String>> {
    let mut net_map: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for fp in footprints {
        for pad in &fp.pads {
            let Some(net) = pad.net_number else { continue };
            if net <= 0 {
                continue;
            }
            let refs = net_map.entry(net).or_default();
            if !refs.contains(&fp.reference) {
                refs.push(fp.reference.clone());
            }
        }
    }
    net_map
}

/// Pairwise connection weights: how many nets each component pair shares.
fn build_connection_weights(
    net_map: &BTreeMap<i32, Vec<String>>,
) -> BTreeMap<(String, String), u32> {
    let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    for refs in net_map.values() {
        for (a, b) in refs.iter().tuple_combinations() {
            let key = if a <= b {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            *weights.entry(key).or_insert(0) += 1;
        }
    }
    weights
}

struct PlacementState {
    /// References in footprint order.
    order: Vec<String>,
    placements: HashMap<String, ComponentPlacement>,
}

fn build_placements(footprints: &[Footprint], locked_refs: &[&str]) -> PlacementState {
    let mut order = Vec::with_capacity(footprints.len());
    let mut placements = HashMap::with_capacity(footprints.len());
    for fp in footprints {
        let (w, h) = estimate_bbox(fp);
        let mut nets = Vec::new();
        for pad in &fp.pads {
            if let Some(net) = pad.net_number {
                if net > 0 && !nets.contains(&net) {
                    nets.push(net);
                }
            }
        }
        order.push(fp.reference.clone());
        placements.insert(
            fp.reference.clone(),
            ComponentPlacement {
                reference: fp.reference.clone(),
                x: fp.position.x,
                y: fp.position.y,
                width: w,
                height: h,
                locked: locked_refs.contains(&fp.reference.as_str()),
                net_connections: nets,
            },
        );
    }
    PlacementState { order, placements }
}

/// Half-perimeter wire length over component centres:
/// `sum over nets of (max_x - min_x) + (max_y - min_y)`.
pub fn compute_hpwl(
    placements: &HashMap<String, ComponentPlacement>,
    net_map: &BTreeMap<i32, Vec<String>>,
) -> f64 {
    let mut total = 0.0;
    for refs in net_map.values() {
        if refs.len() < 2 {
            continue;
        }
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        let mut count = 0;
        for r in refs {
            let Some(p) = placements.get(r) else { continue };
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
            count += 1;
        }
        if count >= 2 {
            total += (max_x - min_x) + (max_y - min_y);
        }
    }
    total
}

/// Count pairs of components whose clearance-padded bboxes intersect.
fn count_overlaps(state: &PlacementState, clearance: f64) -> usize {
    state
        .order
        .iter()
        .tuple_combinations()
        .filter(|(ra, rb)| {
            let (Some(a), Some(b)) = (state.placements.get(*ra), state.placements.get(*rb))
            else {
                return false;
            };
            let a_half_w = a.width / 2.0 + clearance / 2.0;
            let a_half_h = a.height / 2.0 + clearance / 2.0;
            let b_half_w = b.width / 2.0 + clearance / 2.0;
            let b_half_h = b.height / 2.0 + clearance / 2.0;
            (a.x - b.x).abs() < a_half_w + b_half_w && (a.y - b.y).abs() < a_half_h + b_half_h
        })
        .count()
}

/// Run the force-directed optimizer and report the movements plus before
/// and after metrics. Locked references never move.
pub fn force_directed_placement(
    footprints: &[Footprint],
    board_bbox: &BoundingBox,
    locked_references: &[&str],
    config: &PlacementConfig,
) -> PlacementResult {
    let mut state = build_placements(footprints, locked_references);
    let net_map = build_net_map(footprints);
    let conn_weights = build_connection_weights(&net_map);

    let original_positions: HashMap<String, (f64, f64)> = state
        .placements
        .iter()
        .map(|(r, p)| (r.clone(), (p.x, p.y)))
        .collect();

    let hpwl_before = compute_hpwl(&state.placements, &net_map);

    // Repulsion acts only within a few component pitches.
    let min_sep = config.min_clearance + 1.0;
    let repulsive_cutoff = 3.0 * min_sep;

    let unlocked: Vec<String> = state
        .order
        .iter()
        .filter(|r| state.placements.get(*r).is_some_and(|p| !p.locked))
        .cloned()
        .collect();

    let mut temperature = config.initial_temperature;
    let mut converged = false;
    let mut iterations_used = 0;

    for iteration in 0..config.max_iterations {
        iterations_used = iteration + 1;

        let mut forces: HashMap<&str, (f64, f64)> =
            unlocked.iter().map(|r| (r.as_str(), (0.0, 0.0))).collect();

        // Attraction between connected pairs, proportional to shared nets
        // and distance.
        for ((ref_a, ref_b), weight) in &conn_weights {
            let (Some(a), Some(b)) = (
                state.placements.get(ref_a),
                state.placements.get(ref_b),
            ) else {
                continue;
            };
            let dx = b.x - a.x;
            let dy = b.y - a.y;
            let dist = dx.hypot(dy);
            if dist < 1e-6 {
                continue;
            }
            let force = config.k_attract * *weight as f64 * dist;
            let fx = force * dx / dist;
            let fy = force * dy / dist;
            if let Some(f) = forces.get_mut(ref_a.as_str()) {
                f.0 += fx;
                f.1 += fy;
            }
            if let Some(f) = forces.get_mut(ref_b.as_str()) {
                f.0 -= fx;
                f.1 -= fy;
            }
        }

        // Repulsion between nearby unlocked pairs, inverse-square with a
        // deterministic nudge for co-located components.
        for i in 0..unlocked.len() {
            for j in i + 1..unlocked.len() {
                let (Some(a), Some(b)) = (
                    state.placements.get(&unlocked[i]),
                    state.placements.get(&unlocked[j]),
                ) else {
                    continue;
                };
                let mut dx = b.x - a.x;
                let mut dy = b.y - a.y;
                let mut dist = dx.hypot(dy);
                if dist > repulsive_cutoff {
                    continue;
                }
                if dist < 0.01 {
                    dx = 0.01 * (1.0 + (i % 7) as f64 * 0.1);
                    dy = 0.01 * (1.0 + (j % 7) as f64 * 0.1);
                    dist = dx.hypot(dy);
                }
                let force = config.k_repel / (dist * dist);
                let fx = force * dx / dist;
                let fy = force * dy / dist;
                if let Some(f) = forces.get_mut(unlocked[i].as_str()) {
                    f.0 -= fx;
                    f.1 -= fy;
                }
                if let Some(f) = forces.get_mut(unlocked[j].as_str()) {
                    f.0 += fx;
                    f.1 += fy;
                }
            }
        }

        // Apply forces, capped by the current temperature.
        let mut max_disp = 0.0f64;
        for r in &unlocked {
            let Some(&(mut fx, mut fy)) = forces.get(r.as_str()) else {
                continue;
            };
            let mut disp = fx.hypot(fy);
            if disp > temperature {
                let scale = temperature / disp;
                fx *= scale;
                fy *= scale;
                disp = temperature;
            }
            if let Some(p) = state.placements.get_mut(r) {
                p.x += fx;
                p.y += fy;
            }
            max_disp = max_disp.max(disp);
        }

        // Keep every bbox inside the board.
        for r in &unlocked {
            if let Some(p) = state.placements.get_mut(r) {
                let half_w = p.width / 2.0;
                let half_h = p.height / 2.0;
                p.x = p.x.clamp(board_bbox.min_x + half_w, board_bbox.max_x - half_w);
                p.y = p.y.clamp(board_bbox.min_y + half_h, board_bbox.max_y - half_h);
            }
        }

        temperature *= config.cooling_rate;

        if max_disp < config.convergence_threshold {
            converged = true;
            break;
        }
    }

    let hpwl_after = compute_hpwl(&state.placements, &net_map);
    let overlap_count = count_overlaps(&state, config.min_clearance);

    let mut movements = Vec::new();
    for r in &state.order {
        let Some(p) = state.placements.get(r) else { continue };
        let Some(&(orig_x, orig_y)) = original_positions.get(r) else {
            continue;
        };
        let dx = p.x - orig_x;
        let dy = p.y - orig_y;
        if dx.abs() > 0.001 || dy.abs() > 0.001 {
            movements.push(Movement {
                reference: r.clone(),
                from_x: round4(orig_x),
                from_y: round4(orig_y),
                to_x: round4(p.x),
                to_y: round4(p.y),
                dx: round4(dx),
                dy: round4(dy),
            });
        }
    }

    let hpwl_reduction_pct = if hpwl_before > 0.0 {
        (hpwl_before - hpwl_after) / hpwl_before * 100.0
    } else {
        0.0
    };

    log::info!(
        "placement: {} moved, hpwl {:.3} -> {:.3}, {} overlaps, {} iterations{}",
        movements.len(),
        hpwl_before,
        hpwl_after,
        overlap_count,
        iterations_used,
        if converged { " (converged)" } else { "" }
    );

    PlacementResult {
        movements,
        hpwl_before,
        hpwl_after,
        hpwl_reduction_pct,
        overlap_count,
        iterations_used,
        converged,
    }
}

/// Evaluate the current placement without moving anything.
pub fn evaluate_placement(
    footprints: &[Footprint],
    board_bbox: &BoundingBox,
    min_clearance: f64,
) -> PlacementEvaluation {
    let state = build_placements(footprints, &[]);
    let net_map = build_net_map(footprints);

    let hpwl_total = compute_hpwl(&state.placements, &net_map);
    let overlap_count = count_overlaps(&state, min_clearance);

    let component_area: f64 = state
        .placements
        .values()
        .map(|p| p.width * p.height)
        .sum();
    let board_area = board_bbox.width() * board_bbox.height();
    let density = component_area / board_area.max(1e-6);

    let mut per_net = Vec::new();
    for (net_num, refs) in &net_map {
        if refs.len() < 2 {
            continue;
        }
        let placed: Vec<&ComponentPlacement> = refs
            .iter()
            .filter_map(|r| state.placements.get(r))
            .collect();
        if placed.len() < 2 {
            continue;
        }
        let min_x = placed.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = placed.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = placed.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = placed.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        per_net.push(NetWirelength {
            net_number: *net_num,
            pad_count: refs.len(),
            hpwl: (((max_x - min_x) + (max_y - min_y)) * 1000.0).round() / 1000.0,
        });
    }

    PlacementEvaluation {
        hpwl_total,
        overlap_count,
        component_count: state.placements.len(),
        density,
        per_net_wirelength: per_net,
    }
}

/// Overlap resolution only: the same solver with attraction disabled, a
/// lower starting temperature and gentler cooling.
pub fn spread_components(
    footprints: &[Footprint],
    board_bbox: &BoundingBox,
    min_clearance: f64,
    max_iterations: usize,
) -> PlacementResult {
    force_directed_placement(
        footprints,
        board_bbox,
        &[],
        &PlacementConfig {
            max_iterations,
            min_clearance,
            k_attract: 0.0,
            k_repel: 2.0,
            initial_temperature: 5.0,
            cooling_rate: 0.97,
            convergence_threshold: 0.01,
        },
    )
}
