//! Shared types for the routing engine.

use serde::Serialize;

/// Tuning knobs for grid construction and search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridConfig {
    /// Grid resolution in mm per cell.
    pub resolution: f64,
    /// Clearance added around every obstacle, mm.
    pub clearance: f64,
    /// Cost penalty for a layer change.
    pub via_cost: f64,
    /// Allow 45-degree moves.
    pub diagonal: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            resolution: 0.25,
            clearance: 0.2,
            via_cost: 5.0,
            diagonal: true,
        }
    }
}

/// A point along a routed path, in board millimetres.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub layer: String,
}

/// Result of routing a single pad pair or net.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteResult {
    pub success: bool,
    pub net_name: String,
    pub net_number: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub waypoints: Vec<Waypoint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub via_locations: Vec<Waypoint>,
    pub segment_count: usize,
    pub via_count: usize,
    pub total_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RouteResult {
    pub(crate) fn failure(net_name: &str, net_number: i32, error: String) -> RouteResult {
        RouteResult {
            success: false,
            net_name: net_name.to_string(),
            net_number,
            error: Some(error),
            ..RouteResult::default()
        }
    }
}

/// Result of batch-routing multiple nets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRouteResult {
    pub routed_count: usize,
    pub failed_count: usize,
    pub total_segments: usize,
    pub total_vias: usize,
    pub routed_nets: Vec<String>,
    pub failed_nets: Vec<String>,
    #[serde(skip)]
    pub results: Vec<RouteResult>,
}

/// Cheap feasibility estimate for a route, computed without searching.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutePreview {
    pub manhattan_distance: f64,
    pub straight_line_distance: f64,
    /// Fraction of corridor cells currently blocked.
    pub obstacle_density: f64,
    pub estimated_feasible: bool,
}
