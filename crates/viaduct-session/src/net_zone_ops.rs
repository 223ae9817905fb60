//! Net and zone management operations.

use serde_json::{Value, json};
use uuid::Uuid;
use viaduct_sexpr::{parse, quote_if_needed};

use crate::change::{ChangeRecord, TreeEdit};
use crate::helpers::{fmt_num, footprint_index, net_number_by_name, normalize_layer};
use crate::{Session, SessionError};

impl Session {
    /// Preview net creation: the number the new net would get.
    pub fn query_create_net(&self, net_name: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        if net_number_by_name(root, net_name).is_some() {
            return Err(SessionError::DuplicateNet(net_name.to_string()));
        }
        Ok(json!({
            "operation": "create_net",
            "target": net_name,
            "next_number": max_net_number(root) + 1,
            "preview": true,
        }))
    }

    /// Allocate the next unused net number and append the declaration
    /// after the last existing net (or after `layers` when there is none).
    pub fn apply_create_net(&mut self, net_name: &str) -> Result<ChangeRecord, SessionError> {
        {
            let root = self.working_root()?;
            if net_number_by_name(root, net_name).is_some() {
                return Err(SessionError::DuplicateNet(net_name.to_string()));
            }
        }

        let children = self.root_children_mut()?;
        let mut max_num = 0;
        let mut insert_idx = 0;
        for (i, child) in children.iter().enumerate() {
            if child.name() == Some("net") {
                if let Some(n) = child.first_value().and_then(|v| v.parse::<i32>().ok()) {
                    max_num = max_num.max(n);
                }
                insert_idx = i + 1;
            }
        }
        if insert_idx == 0 {
            if let Some(i) = children.iter().position(|c| c.name() == Some("layers")) {
                insert_idx = i + 1;
            }
        }

        let new_num = max_num + 1;
        let net_node = parse(&format!("(net {new_num} \"{net_name}\")"))?;
        let after = net_node.serialize(0);
        children.insert(insert_idx, net_node);

        let record = ChangeRecord::new(
            "create_net",
            format!("Create net {new_num} '{net_name}'"),
            net_name.to_string(),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview net deletion.
    pub fn query_delete_net(&self, net_name: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let number = net_number_by_name(root, net_name)
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;
        Ok(json!({
            "operation": "delete_net",
            "target": net_name,
            "net_number": number,
            "preview": true,
        }))
    }

    /// Remove a `(net N "name")` declaration.
    pub fn apply_delete_net(&mut self, net_name: &str) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let idx = children
            .iter()
            .position(|c| {
                c.name() == Some("net") && c.atom_values().get(1) == Some(&net_name)
            })
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;
        let before = children[idx].serialize(0);
        children.remove(idx);

        let record = ChangeRecord::new(
            "delete_net",
            format!("Delete net '{net_name}'"),
            net_name.to_string(),
            before.clone(),
            String::new(),
            vec![TreeEdit::Remove {
                path: vec![idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a pad net assignment.
    pub fn query_assign_net(
        &self,
        reference: &str,
        pad_number: &str,
        net_name: &str,
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let net_num = net_number_by_name(root, net_name)
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &root.children()[fp_idx];
        let pad = fp
            .find_all("pad")
            .into_iter()
            .find(|p| p.first_value() == Some(pad_number))
            .ok_or_else(|| SessionError::PadNotFound {
                reference: reference.to_string(),
                pad: pad_number.to_string(),
            })?;
        let current = pad.find("net").map(|n| n.serialize(0));
        Ok(json!({
            "operation": "assign_net",
            "target": format!("{reference}:{pad_number}"),
            "current_net": current,
            "new_net": {"number": net_num, "name": net_name},
            "preview": true,
        }))
    }

    /// Point a pad at a different net, replacing its `(net ...)` child.
    pub fn apply_assign_net(
        &mut self,
        reference: &str,
        pad_number: &str,
        net_name: &str,
    ) -> Result<ChangeRecord, SessionError> {
        let net_num = net_number_by_name(self.working_root()?, net_name)
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;

        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &mut children[fp_idx];
        let pad_idx = fp
            .children()
            .iter()
            .position(|c| c.name() == Some("pad") && c.first_value() == Some(pad_number))
            .ok_or_else(|| SessionError::PadNotFound {
                reference: reference.to_string(),
                pad: pad_number.to_string(),
            })?;

        let fp_children = fp.children_mut().ok_or(SessionError::MalformedDocument)?;
        let pad = &mut fp_children[pad_idx];
        let before = pad.serialize(0);

        let net_child = parse(&format!("(net {net_num} \"{net_name}\")"))?;
        match pad.find_index("net") {
            Some(i) => {
                let pad_children = pad.children_mut().ok_or(SessionError::MalformedDocument)?;
                pad_children[i] = net_child;
            }
            None => {
                let pad_children = pad.children_mut().ok_or(SessionError::MalformedDocument)?;
                pad_children.push(net_child);
            }
        }
        let after = pad.serialize(0);

        let record = ChangeRecord::new(
            "assign_net",
            format!("Assign net '{net_name}' to {reference} pad {pad_number}"),
            format!("{reference}:{pad_number}"),
            before.clone(),
            after,
            vec![TreeEdit::Replace {
                path: vec![fp_idx, pad_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a zone.
    pub fn query_create_zone(
        &self,
        net_name: &str,
        layer: &str,
        points: &[(f64, f64)],
        min_thickness: f64,
        priority: i32,
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        validate_zone(points, min_thickness)?;
        let net_num = net_number_by_name(root, net_name)
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;
        Ok(json!({
            "operation": "create_zone",
            "target": net_name,
            "net_number": net_num,
            "layer": normalize_layer(layer),
            "point_count": points.len(),
            "min_thickness": min_thickness,
            "priority": priority,
            "preview": true,
        }))
    }

    /// Append a filled copper zone with the given polygon outline.
    pub fn apply_create_zone(
        &mut self,
        net_name: &str,
        layer: &str,
        points: &[(f64, f64)],
        min_thickness: f64,
        priority: i32,
    ) -> Result<ChangeRecord, SessionError> {
        validate_zone(points, min_thickness)?;
        let net_num = net_number_by_name(self.working_root()?, net_name)
            .ok_or_else(|| SessionError::NetNotFound(net_name.to_string()))?;

        let layer = normalize_layer(layer).to_string();
        let zone_uuid = Uuid::new_v4().to_string();
        let pts = points
            .iter()
            .map(|(x, y)| format!("(xy {} {})", fmt_num(*x), fmt_num(*y)))
            .collect::<Vec<_>>()
            .join(" ");
        let text = format!(
            "(zone (net {net_num}) (net_name {name}) (layer \"{layer}\") (uuid \"{zone_uuid}\") \
             (hatch edge 0.5) (priority {priority}) (connect_pads (clearance 0.5)) \
             (min_thickness {mt}) (fill yes (thermal_gap 0.5) (thermal_bridge_width 0.5)) \
             (polygon (pts {pts})))",
            name = quote_if_needed(net_name),
            mt = fmt_num(min_thickness),
        );
        let zone_node = parse(&text)?;
        let after = zone_node.serialize(0);

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(zone_node);

        let record = ChangeRecord::new(
            "create_zone",
            format!(
                "Create {net_name} zone on {layer} ({} points)",
                points.len()
            ),
            format!("zone:{}", &zone_uuid[..8]),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }
}

fn validate_zone(points: &[(f64, f64)], min_thickness: f64) -> Result<(), SessionError> {
    if points.len() < 3 {
        return Err(SessionError::InvalidArgument(format!(
            "zone polygon requires at least 3 points, got {}",
            points.len()
        )));
    }
    if min_thickness <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "zone min_thickness must be positive, got {min_thickness}"
        )));
    }
    Ok(())
}

fn max_net_number(root: &viaduct_sexpr::Node) -> i32 {
    root.find_all("net")
        .iter()
        .filter_map(|n| n.first_value().and_then(|v| v.parse::<i32>().ok()))
        .max()
        .unwrap_or(0)
}
