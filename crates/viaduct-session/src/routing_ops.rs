//! Routing operations: traces, vias, and ratsnest extraction.

use serde_json::{Value, json};
use uuid::Uuid;
use viaduct_board::{RatsnestPad, UnroutedNet};
use viaduct_sexpr::{Node, parse};

use crate::change::{ChangeRecord, TreeEdit};
use crate::helpers::{fmt_num, footprint_reference, normalize_layer, uuid_index};
use crate::{Session, SessionError};

impl Session {
    /// Preview a trace segment.
    pub fn query_route_trace(
        &self,
        start_x: f64,
        start_y: f64,
        end_x: f64,
        end_y: f64,
        width: f64,
        layer: &str,
        net_number: i32,
    ) -> Result<Value, SessionError> {
        self.working_root()?;
        if width <= 0.0 {
            return Err(SessionError::InvalidArgument(format!(
                "trace width must be positive, got {width}"
            )));
        }
        let length = (end_x - start_x).hypot(end_y - start_y);
        Ok(json!({
            "operation": "route_trace",
            "start": {"x": start_x, "y": start_y},
            "end": {"x": end_x, "y": end_y},
            "length": length,
            "width": width,
            "layer": normalize_layer(layer),
            "net_number": net_number,
            "preview": true,
        }))
    }

    /// Append a copper trace segment between two points.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_route_trace(
        &mut self,
        start_x: f64,
        start_y: f64,
        end_x: f64,
        end_y: f64,
        width: f64,
        layer: &str,
        net_number: i32,
    ) -> Result<ChangeRecord, SessionError> {
        if width <= 0.0 {
            return Err(SessionError::InvalidArgument(format!(
                "trace width must be positive, got {width}"
            )));
        }
        let layer = normalize_layer(layer).to_string();
        let seg_uuid = Uuid::new_v4().to_string();
        let text = format!(
            "(segment (start {sx} {sy}) (end {ex} {ey}) (width {w}) (layer \"{layer}\") \
             (net {net_number}) (uuid \"{seg_uuid}\"))",
            sx = fmt_num(start_x),
            sy = fmt_num(start_y),
            ex = fmt_num(end_x),
            ey = fmt_num(end_y),
            w = fmt_num(width),
        );
        let seg_node = parse(&text)?;
        let after = seg_node.serialize(0);

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(seg_node);

        let record = ChangeRecord::new(
            "route_trace",
            format!(
                "Route trace ({start_x},{start_y})->({end_x},{end_y}) w={width} on {layer} net {net_number}"
            ),
            format!("segment:{seg_uuid}"),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a via.
    pub fn query_add_via(
        &self,
        x: f64,
        y: f64,
        net_number: i32,
        size: f64,
        drill: f64,
        layers: (&str, &str),
    ) -> Result<Value, SessionError> {
        self.working_root()?;
        validate_via(size, drill)?;
        Ok(json!({
            "operation": "add_via",
            "position": {"x": x, "y": y},
            "net_number": net_number,
            "size": size,
            "drill": drill,
            "layers": [normalize_layer(layers.0), normalize_layer(layers.1)],
            "preview": true,
        }))
    }

    /// Append a via at the given point.
    pub fn apply_add_via(
        &mut self,
        x: f64,
        y: f64,
        net_number: i32,
        size: f64,
        drill: f64,
        layers: (&str, &str),
    ) -> Result<ChangeRecord, SessionError> {
        validate_via(size, drill)?;
        let start_layer = normalize_layer(layers.0).to_string();
        let end_layer = normalize_layer(layers.1).to_string();
        let via_uuid = Uuid::new_v4().to_string();
        let text = format!(
            "(via (at {x} {y}) (size {size}) (drill {drill}) \
             (layers \"{start_layer}\" \"{end_layer}\") (net {net_number}) (uuid \"{via_uuid}\"))",
            x = fmt_num(x),
            y = fmt_num(y),
            size = fmt_num(size),
            drill = fmt_num(drill),
        );
        let via_node = parse(&text)?;
        let after = via_node.serialize(0);

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(via_node);

        let record = ChangeRecord::new(
            "add_via",
            format!("Add via at ({x},{y}) net {net_number} {start_layer}->{end_layer}"),
            format!("via:{via_uuid}"),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a trace deletion.
    pub fn query_delete_trace(&self, segment_uuid: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let idx = uuid_index(root.children(), "segment", segment_uuid).ok_or_else(|| {
            SessionError::UuidNotFound {
                kind: "segment",
                uuid: segment_uuid.to_string(),
            }
        })?;
        Ok(json!({
            "operation": "delete_trace",
            "target": format!("segment:{segment_uuid}"),
            "segment": root.children()[idx].serialize(0),
            "preview": true,
        }))
    }

    /// Remove a trace segment by uuid.
    pub fn apply_delete_trace(&mut self, segment_uuid: &str) -> Result<ChangeRecord, SessionError> {
        self.delete_by_uuid("segment", "delete_trace", segment_uuid)
    }

    /// Preview a via deletion.
    pub fn query_delete_via(&self, via_uuid: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let idx = uuid_index(root.children(), "via", via_uuid).ok_or_else(|| {
            SessionError::UuidNotFound {
                kind: "via",
                uuid: via_uuid.to_string(),
            }
        })?;
        Ok(json!({
            "operation": "delete_via",
            "target": format!("via:{via_uuid}"),
            "via": root.children()[idx].serialize(0),
            "preview": true,
        }))
    }

    /// Remove a via by uuid.
    pub fn apply_delete_via(&mut self, via_uuid: &str) -> Result<ChangeRecord, SessionError> {
        self.delete_by_uuid("via", "delete_via", via_uuid)
    }

    fn delete_by_uuid(
        &mut self,
        kind: &'static str,
        operation: &str,
        uuid: &str,
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let idx = uuid_index(children, kind, uuid).ok_or_else(|| SessionError::UuidNotFound {
            kind,
            uuid: uuid.to_string(),
        })?;
        let before = children[idx].serialize(0);
        children.remove(idx);

        let short = &uuid[..uuid.len().min(8)];
        let record = ChangeRecord::new(
            operation,
            format!("Delete {kind} {short}"),
            format!("{kind}:{uuid}"),
            before.clone(),
            String::new(),
            vec![TreeEdit::Remove {
                path: vec![idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Unrouted connections: nets with at least two pads and no copper yet.
    pub fn ratsnest(&self) -> Result<Vec<UnroutedNet>, SessionError> {
        Ok(ratsnest_of(self.working_root()?))
    }
}

fn validate_via(size: f64, drill: f64) -> Result<(), SessionError> {
    if size <= 0.0 || drill <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "via size and drill must be positive, got size={size} drill={drill}"
        )));
    }
    if drill >= size {
        return Err(SessionError::InvalidArgument(format!(
            "via drill {drill} must be smaller than size {size}"
        )));
    }
    Ok(())
}

/// Compute the ratsnest of a board tree: for every net with two or more
/// pads and no existing segment, the absolute pad positions (pad offsets
/// rotated by the footprint angle). Net 0 is "no net" and skipped.
pub fn ratsnest_of(root: &Node) -> Vec<UnroutedNet> {
    use std::collections::BTreeMap;

    let mut net_pads: BTreeMap<i32, Vec<RatsnestPad>> = BTreeMap::new();
    for fp_node in root.find_all("footprint") {
        let reference = footprint_reference(fp_node).unwrap_or("").to_string();
        let fp_at = fp_node.find("at").map(|n| n.atom_values()).unwrap_or_default();
        let fp_x: f64 = fp_at.first().and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let fp_y: f64 = fp_at.get(1).and_then(|v| v.parse().ok()).unwrap_or(0.0);
        let fp_angle: f64 = fp_at.get(2).and_then(|v| v.parse().ok()).unwrap_or(0.0);

        for pad_node in fp_node.find_all("pad") {
            let Some(net_node) = pad_node.find("net") else {
                continue;
            };
            let net_num: i32 = match net_node.first_value().and_then(|v| v.parse().ok()) {
                Some(n) if n != 0 => n,
                _ => continue,
            };
            let pad_at = pad_node.find("at").map(|n| n.atom_values()).unwrap_or_default();
            let pad_x: f64 = pad_at.first().and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let pad_y: f64 = pad_at.get(1).and_then(|v| v.parse().ok()).unwrap_or(0.0);

            let (abs_x, abs_y) = if fp_angle.abs() > 0.01 {
                let rad = fp_angle.to_radians();
                let (sin_a, cos_a) = rad.sin_cos();
                (
                    fp_x + pad_x * cos_a - pad_y * sin_a,
                    fp_y + pad_x * sin_a + pad_y * cos_a,
                )
            } else {
                (fp_x + pad_x, fp_y + pad_y)
            };

            net_pads.entry(net_num).or_default().push(RatsnestPad {
                reference: reference.clone(),
                pad: pad_node.first_value().unwrap_or("").to_string(),
                x: abs_x,
                y: abs_y,
            });
        }
    }

    let mut routed_nets = std::collections::HashSet::new();
    for seg in root.find_all("segment") {
        if let Some(n) = seg
            .find("net")
            .and_then(|n| n.first_value())
            .and_then(|v| v.parse::<i32>().ok())
        {
            routed_nets.insert(n);
        }
    }

    let net_name_of = |num: i32| -> String {
        for net_node in root.find_all("net") {
            let vals = net_node.atom_values();
            if vals.first().and_then(|v| v.parse::<i32>().ok()) == Some(num) {
                return vals.get(1).map(|s| s.to_string()).unwrap_or_default();
            }
        }
        String::new()
    };

    net_pads
        .into_iter()
        .filter(|(num, pads)| !routed_nets.contains(num) && pads.len() >= 2)
        .map(|(num, pads)| UnroutedNet {
            net_number: num,
            net_name: net_name_of(num),
            pad_count: pads.len(),
            pads,
        })
        .collect()
}
