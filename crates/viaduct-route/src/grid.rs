//! Sparse 3D obstacle grid with pad and trace rasterization.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use viaduct_board::{BoundingBox, Footprint, Segment};

/// A grid cell: (col, row, layer index).
pub type Cell = (i32, i32, usize);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("layer {layer:?} not in {known:?}")]
    UnknownLayer { layer: String, known: Vec<String> },
}

/// Sparse obstacle map for A* routing.
///
/// Cells are sparse by design: a 100x100 mm board at 0.25 mm resolution is
/// 400x400 cells per layer, but most stay empty. `net_ownership` remembers
/// which net blocked a cell so that net can be cleared to route through its
/// own copper.
#[derive(Debug, Clone)]
pub struct ObstacleMap {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub resolution: f64,
    pub cols: i32,
    pub rows: i32,
    /// Ordered copper layers, e.g. `["F.Cu", "B.Cu"]`.
    pub layers: Vec<String>,
    pub blocked: HashSet<Cell>,
    pub net_ownership: HashMap<Cell, i32>,
}

/// Grid occupancy statistics, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct GridStats {
    pub cols: i32,
    pub rows: i32,
    pub layers: usize,
    pub total_cells: usize,
    pub blocked_cells: usize,
    pub blocked_pct: f64,
    pub resolution_mm: f64,
}

impl ObstacleMap {
    /// Allocate an empty grid covering `width_mm` x `height_mm` from the
    /// given origin.
    pub fn new(
        origin_x: f64,
        origin_y: f64,
        width_mm: f64,
        height_mm: f64,
        resolution: f64,
        layers: Vec<String>,
    ) -> ObstacleMap {
        let cols = ((width_mm / resolution).ceil() as i32).max(1);
        let rows = ((height_mm / resolution).ceil() as i32).max(1);
        ObstacleMap {
            origin_x,
            origin_y,
            width_mm,
            height_mm,
            resolution,
            cols,
            rows,
            layers,
            blocked: HashSet::new(),
            net_ownership: HashMap::new(),
        }
    }

    pub fn mm_to_col(&self, x_mm: f64) -> i32 {
        ((x_mm - self.origin_x) / self.resolution).round() as i32
    }

    pub fn mm_to_row(&self, y_mm: f64) -> i32 {
        ((y_mm - self.origin_y) / self.resolution).round() as i32
    }

    pub fn col_to_mm(&self, col: i32) -> f64 {
        self.origin_x + col as f64 * self.resolution
    }

    pub fn row_to_mm(&self, row: i32) -> f64 {
        self.origin_y + row as f64 * self.resolution
    }

    /// Index of a copper layer by name.
    pub fn layer_index(&self, layer_name: &str) -> Result<usize, RouteError> {
        self.layers
            .iter()
            .position(|l| l == layer_name)
            .ok_or_else(|| RouteError::UnknownLayer {
                layer: layer_name.to_string(),
                known: self.layers.clone(),
            })
    }

    pub fn in_bounds(&self, col: i32, row: i32) -> bool {
        0 <= col && col < self.cols && 0 <= row && row < self.rows
    }

    pub fn is_blocked(&self, col: i32, row: i32, layer_idx: usize) -> bool {
        self.blocked.contains(&(col, row, layer_idx))
    }

    fn block(&mut self, cell: Cell, net_number: Option<i32>) {
        self.blocked.insert(cell);
        if let Some(net) = net_number {
            self.net_ownership.insert(cell, net);
        }
    }

    /// Block a rectangle given its centre and half-extents, clamped to the
    /// grid, on one layer.
    pub fn mark_rect(
        &mut self,
        cx_mm: f64,
        cy_mm: f64,
        half_w_mm: f64,
        half_h_mm: f64,
        layer_idx: usize,
        net_number: Option<i32>,
    ) {
        let c_min = self.mm_to_col(cx_mm - half_w_mm).max(0);
        let c_max = self.mm_to_col(cx_mm + half_w_mm).min(self.cols - 1);
        let r_min = self.mm_to_row(cy_mm - half_h_mm).max(0);
        let r_max = self.mm_to_row(cy_mm + half_h_mm).min(self.rows - 1);

        for c in c_min..=c_max {
            for r in r_min..=r_max {
                self.block((c, r, layer_idx), net_number);
            }
        }
    }

    /// Block every cell whose perpendicular distance to the segment is
    /// within `half_width_mm`, scanning the segment's expanded bounding
    /// box. Near-zero-length segments degenerate to a point check.
    #[allow(clippy::too_many_arguments)]
    pub fn mark_segment_line(
        &mut self,
        x1_mm: f64,
        y1_mm: f64,
        x2_mm: f64,
        y2_mm: f64,
        half_width_mm: f64,
        layer_idx: usize,
        net_number: Option<i32>,
    ) {
        let c_min = self.mm_to_col(x1_mm.min(x2_mm) - half_width_mm).max(0);
        let c_max = self
            .mm_to_col(x1_mm.max(x2_mm) + half_width_mm)
            .min(self.cols - 1);
        let r_min = self.mm_to_row(y1_mm.min(y2_mm) - half_width_mm).max(0);
        let r_max = self
            .mm_to_row(y1_mm.max(y2_mm) + half_width_mm)
            .min(self.rows - 1);

        let dx = x2_mm - x1_mm;
        let dy = y2_mm - y1_mm;
        let seg_len_sq = dx * dx + dy * dy;

        for c in c_min..=c_max {
            let px = self.col_to_mm(c);
            for r in r_min..=r_max {
                let py = self.row_to_mm(r);
                let dist = if seg_len_sq < 1e-12 {
                    (px - x1_mm).hypot(py - y1_mm)
                } else {
                    let t = (((px - x1_mm) * dx + (py - y1_mm) * dy) / seg_len_sq).clamp(0.0, 1.0);
                    let proj_x = x1_mm + t * dx;
                    let proj_y = y1_mm + t * dy;
                    (px - proj_x).hypot(py - proj_y)
                };
                if dist <= half_width_mm {
                    self.block((c, r, layer_idx), net_number);
                }
            }
        }
    }

    /// Unblock exactly the cells owned by `net_number`, so the net can
    /// route through its own copper. Cells owned by other nets (or owned
    /// by nobody) are untouched.
    pub fn clear_net(&mut self, net_number: i32) {
        let blocked = &mut self.blocked;
        self.net_ownership.retain(|cell, net| {
            if *net == net_number {
                blocked.remove(cell);
                false
            } else {
                true
            }
        });
    }

    pub fn stats(&self) -> GridStats {
        let total_cells = self.cols as usize * self.rows as usize * self.layers.len();
        GridStats {
            cols: self.cols,
            rows: self.rows,
            layers: self.layers.len(),
            total_cells,
            blocked_cells: self.blocked.len(),
            blocked_pct: (self.blocked.len() as f64 / total_cells.max(1) as f64 * 10000.0).round()
                / 100.0,
            resolution_mm: self.resolution,
        }
    }
}

/// Build an obstacle map from extracted board data.
///
/// Protocol: expand the board bbox by the clearance margin, block every
/// cell outside the original bbox (outline enforcement), rasterize pads
/// (rotated to absolute positions, wildcard `*.Cu` claiming every copper
/// layer) and existing segments with clearance, then clear the target
/// net's own cells if one was given.
pub fn build_obstacle_map(
    footprints: &[Footprint],
    segments: &[Segment],
    board_bbox: &BoundingBox,
    layers: Option<&[String]>,
    resolution: f64,
    clearance: f64,
    target_net: Option<i32>,
) -> ObstacleMap {
    let layers: Vec<String> = match layers {
        Some(l) => l.to_vec(),
        None => vec!["F.Cu".to_string(), "B.Cu".to_string()],
    };

    let margin = clearance;
    let mut grid = ObstacleMap::new(
        board_bbox.min_x - margin,
        board_bbox.min_y - margin,
        board_bbox.width() + 2.0 * margin,
        board_bbox.height() + 2.0 * margin,
        resolution,
        layers,
    );

    // Boundary enforcement: anything outside the original board columns
    // and rows is blocked on every layer.
    let board_c_min = grid.mm_to_col(board_bbox.min_x);
    let board_c_max = grid.mm_to_col(board_bbox.max_x);
    let board_r_min = grid.mm_to_row(board_bbox.min_y);
    let board_r_max = grid.mm_to_row(board_bbox.max_y);
    for li in 0..grid.layers.len() {
        for c in 0..grid.cols {
            for r in 0..grid.rows {
                if c < board_c_min || c > board_c_max || r < board_r_min || r > board_r_max {
                    grid.blocked.insert((c, r, li));
                }
            }
        }
    }

    for fp in footprints {
        let angle_rad = fp.position.angle.to_radians();
        let rotate = fp.position.angle.abs() > 0.01;

        for pad in &fp.pads {
            let (pad_x, pad_y) = if rotate {
                let (sin_a, cos_a) = angle_rad.sin_cos();
                (
                    fp.position.x + pad.position.x * cos_a - pad.position.y * sin_a,
                    fp.position.y + pad.position.x * sin_a + pad.position.y * cos_a,
                )
            } else {
                (fp.position.x + pad.position.x, fp.position.y + pad.position.y)
            };

            let half_w = pad.size.0 / 2.0 + clearance;
            let half_h = pad.size.1 / 2.0 + clearance;

            for pad_layer in &pad.layers {
                let matching: Vec<usize> = if pad_layer == "*.Cu" {
                    (0..grid.layers.len()).collect()
                } else {
                    grid.layers
                        .iter()
                        .position(|l| l == pad_layer)
                        .into_iter()
                        .collect()
                };
                for li in matching {
                    grid.mark_rect(pad_x, pad_y, half_w, half_h, li, pad.net_number);
                }
            }
        }
    }

    for seg in segments {
        let Some(li) = grid.layers.iter().position(|l| *l == seg.layer) else {
            continue;
        };
        let half_w = seg.width / 2.0 + clearance;
        grid.mark_segment_line(
            seg.start.x,
            seg.start.y,
            seg.end.x,
            seg.end.y,
            half_w,
            li,
            Some(seg.net_number),
        );
    }

    if let Some(net) = target_net {
        grid.clear_net(net);
    }

    log::debug!(
        "built obstacle map: {}x{} cells, {} layers, {} blocked",
        grid.cols,
        grid.rows,
        grid.layers.len(),
        grid.blocked.len()
    );
    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use viaduct_board::{Pad, Position};

    fn empty_grid() -> ObstacleMap {
        ObstacleMap::new(
            0.0,
            0.0,
            10.0,
            10.0,
            0.5,
            vec!["F.Cu".to_string(), "B.Cu".to_string()],
        )
    }

    #[test]
    fn coordinate_conversion_round_trips() {
        let grid = ObstacleMap::new(5.0, 10.0, 20.0, 20.0, 0.25, vec!["F.Cu".to_string()]);
        assert_eq!(grid.mm_to_col(5.0), 0);
        assert_eq!(grid.mm_to_col(10.0), 20);
        assert_eq!(grid.col_to_mm(20), 10.0);
        assert_eq!(grid.mm_to_row(10.1), 0);
        // Nearest-integer rounding.
        assert_eq!(grid.mm_to_col(5.13), 1);
        assert_eq!(grid.mm_to_col(5.12), 0);
    }

    #[test]
    fn blocked_iff_in_blocked_set() {
        let mut grid = empty_grid();
        assert!(!grid.is_blocked(3, 3, 0));
        grid.mark_rect(1.5, 1.5, 0.5, 0.5, 0, Some(7));
        for c in 2..=4 {
            for r in 2..=4 {
                assert!(grid.is_blocked(c, r, 0));
                assert!(grid.blocked.contains(&(c, r, 0)));
            }
        }
        // Other layer untouched.
        assert!(!grid.is_blocked(3, 3, 1));
    }

    #[test]
    fn ownership_implies_blocking() {
        let mut grid = empty_grid();
        grid.mark_rect(1.0, 1.0, 0.5, 0.5, 0, Some(3));
        grid.mark_segment_line(0.0, 4.0, 5.0, 4.0, 0.25, 1, Some(4));
        for cell in grid.net_ownership.keys() {
            assert!(grid.blocked.contains(cell));
        }
    }

    #[test]
    fn clear_net_removes_exactly_owned_cells() {
        let mut grid = empty_grid();
        grid.mark_rect(1.0, 1.0, 0.5, 0.5, 0, Some(3));
        grid.mark_rect(4.0, 4.0, 0.5, 0.5, 0, Some(4));
        grid.mark_rect(8.0, 8.0, 0.5, 0.5, 0, None);
        let unowned: Vec<Cell> = grid
            .blocked
            .iter()
            .filter(|c| !grid.net_ownership.contains_key(*c))
            .copied()
            .collect();
        let net4_cells: Vec<Cell> = grid
            .net_ownership
            .iter()
            .filter(|(_, n)| **n == 4)
            .map(|(c, _)| *c)
            .collect();

        grid.clear_net(3);

        assert!(grid.net_ownership.values().all(|n| *n != 3));
        for cell in &net4_cells {
            assert!(grid.blocked.contains(cell));
            assert_eq!(grid.net_ownership.get(cell), Some(&4));
        }
        for cell in &unowned {
            assert!(grid.blocked.contains(cell));
        }
    }

    #[test]
    fn segment_rasterization_covers_line() {
        let mut grid = empty_grid();
        grid.mark_segment_line(1.0, 2.0, 9.0, 2.0, 0.3, 0, Some(1));
        // Every cell along the line is blocked.
        for c in grid.mm_to_col(1.0)..=grid.mm_to_col(9.0) {
            assert!(grid.is_blocked(c, grid.mm_to_row(2.0), 0));
        }
        // Cells far from the line are not.
        assert!(!grid.is_blocked(grid.mm_to_col(5.0), grid.mm_to_row(8.0), 0));
    }

    #[test]
    fn degenerate_segment_marks_point() {
        let mut grid = empty_grid();
        grid.mark_segment_line(5.0, 5.0, 5.0, 5.0, 0.25, 0, None);
        assert!(grid.is_blocked(grid.mm_to_col(5.0), grid.mm_to_row(5.0), 0));
    }

    fn footprint_at(x: f64, y: f64, angle: f64, pads: Vec<Pad>) -> Footprint {
        Footprint {
            library: "Test:FP".to_string(),
            reference: "U1".to_string(),
            value: String::new(),
            position: Position::with_angle(x, y, angle),
            layer: "F.Cu".to_string(),
            pads,
            uuid: String::new(),
            description: String::new(),
        }
    }

    fn pad(x: f64, y: f64, layers: &[&str], net: i32) -> Pad {
        Pad {
            number: "1".to_string(),
            pad_type: "smd".to_string(),
            shape: "rect".to_string(),
            position: Position::new(x, y),
            size: (1.0, 1.0),
            layers: layers.iter().map(|s| s.to_string()).collect(),
            net_number: Some(net),
            net_name: None,
        }
    }

    #[test]
    fn build_blocks_outside_board_and_rasterizes_pads() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let fp = footprint_at(5.0, 5.0, 0.0, vec![pad(0.0, 0.0, &["F.Cu"], 1)]);
        let grid = build_obstacle_map(&[fp], &[], &bbox, None, 0.5, 0.5, None);

        // Expanded grid: cells left of the original board origin are blocked
        // on every layer.
        assert!(grid.is_blocked(0, 5, 0));
        assert!(grid.is_blocked(0, 5, 1));

        // The pad blocks its rectangle on F.Cu only, with net ownership.
        let pc = grid.mm_to_col(5.0);
        let pr = grid.mm_to_row(5.0);
        assert!(grid.is_blocked(pc, pr, 0));
        assert!(!grid.is_blocked(pc, pr, 1));
        assert_eq!(grid.net_ownership.get(&(pc, pr, 0)), Some(&1));
    }

    #[test]
    fn wildcard_pad_layers_claim_all_copper() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let fp = footprint_at(5.0, 5.0, 0.0, vec![pad(0.0, 0.0, &["*.Cu"], 2)]);
        let grid = build_obstacle_map(&[fp], &[], &bbox, None, 0.5, 0.2, None);
        let pc = grid.mm_to_col(5.0);
        let pr = grid.mm_to_row(5.0);
        assert!(grid.is_blocked(pc, pr, 0));
        assert!(grid.is_blocked(pc, pr, 1));
    }

    #[test]
    fn rotated_footprint_rotates_pad_offsets() {
        let bbox = BoundingBox::new(0.0, 0.0, 20.0, 20.0);
        let fp = footprint_at(10.0, 10.0, 90.0, vec![pad(3.0, 0.0, &["F.Cu"], 1)]);
        let grid = build_obstacle_map(&[fp], &[], &bbox, None, 0.5, 0.0, None);
        // The (3, 0) offset lands at (10, 13) after a 90-degree rotation.
        assert!(grid.is_blocked(grid.mm_to_col(10.0), grid.mm_to_row(13.0), 0));
        assert!(!grid.is_blocked(grid.mm_to_col(13.0), grid.mm_to_row(10.0), 0));
    }

    #[test]
    fn target_net_is_cleared_after_build() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let fp = footprint_at(
            5.0,
            5.0,
            0.0,
            vec![pad(-2.0, 0.0, &["F.Cu"], 1), pad(2.0, 0.0, &["F.Cu"], 2)],
        );
        let grid = build_obstacle_map(&[fp], &[], &bbox, None, 0.5, 0.2, Some(1));
        assert!(!grid.is_blocked(grid.mm_to_col(3.0), grid.mm_to_row(5.0), 0));
        assert!(grid.is_blocked(grid.mm_to_col(7.0), grid.mm_to_row(5.0), 0));
    }

    #[test]
    fn unknown_layer_is_an_error() {
        let grid = empty_grid();
        assert_eq!(grid.layer_index("F.Cu"), Ok(0));
        assert!(matches!(
            grid.layer_index("In1.Cu"),
            Err(RouteError::UnknownLayer { .. })
        ));
    }

    #[test]
    fn stats_report_occupancy() {
        let mut grid = empty_grid();
        grid.mark_rect(1.0, 1.0, 0.4, 0.4, 0, None);
        let stats = grid.stats();
        assert_eq!(stats.cols, 20);
        assert_eq!(stats.rows, 20);
        assert_eq!(stats.layers, 2);
        assert_eq!(stats.total_cells, 800);
        assert!(stats.blocked_cells > 0);
        assert!(stats.blocked_pct > 0.0);
    }
}
