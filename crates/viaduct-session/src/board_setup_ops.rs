//! Board setup operations: outline, mounting holes, text, design rules,
//! net classes, layer constraints.

use serde_json::{Value, json};
use uuid::Uuid;
use viaduct_sexpr::{Node, parse, quote_if_needed};

use crate::change::{ChangeRecord, TreeEdit};
use crate::helpers::{fmt_num, normalize_layer};
use crate::{Session, SessionError};

/// KiCad 9 setup keys that accept numeric design-rule values.
const VALID_SETUP_RULES: [&str; 4] = [
    "pad_to_mask_clearance",
    "solder_mask_min_width",
    "pad_to_paste_clearance",
    "pad_to_paste_clearance_ratio",
];

/// Rules callers commonly attempt that live in the `.kicad_dru` file, not
/// the board setup section.
const DRU_ONLY_RULES: [&str; 7] = [
    "min_track_width",
    "min_via_diameter",
    "min_via_drill",
    "min_microvia_diameter",
    "min_microvia_drill",
    "min_through_hole_diameter",
    "clearance",
];

fn rule_alias(name: &str) -> &str {
    match name {
        "min_clearance" => "pad_to_mask_clearance",
        "mask_clearance" => "pad_to_mask_clearance",
        "mask_min_width" => "solder_mask_min_width",
        "paste_clearance" => "pad_to_paste_clearance",
        "paste_clearance_ratio" => "pad_to_paste_clearance_ratio",
        other => other,
    }
}

/// Resolve and validate every rule key before any mutation happens.
fn resolve_rules(rules: &[(&str, f64)]) -> Result<Vec<(String, f64)>, SessionError> {
    let mut resolved = Vec::with_capacity(rules.len());
    for (rule_name, value) in rules {
        let sexpr_name = rule_alias(rule_name);
        if DRU_ONLY_RULES.contains(&sexpr_name) {
            return Err(SessionError::DesignRuleNotInSetup((*rule_name).to_string()));
        }
        if !VALID_SETUP_RULES.contains(&sexpr_name) {
            return Err(SessionError::UnknownDesignRule {
                key: (*rule_name).to_string(),
                valid: VALID_SETUP_RULES.join(", "),
            });
        }
        resolved.push((sexpr_name.to_string(), *value));
    }
    Ok(resolved)
}

fn is_edge_cuts_graphic(node: &Node) -> bool {
    matches!(node.name(), Some("gr_line") | Some("gr_rect"))
        && node
            .find("layer")
            .and_then(|l| l.first_value())
            .is_some_and(|l| l == "Edge.Cuts")
}

fn gr_line_text(x1: f64, y1: f64, x2: f64, y2: f64) -> String {
    format!(
        "(gr_line (start {x1} {y1}) (end {x2} {y2}) \
         (stroke (width 0.05) (type default)) (layer \"Edge.Cuts\") (uuid \"{uuid}\"))",
        x1 = fmt_num(x1),
        y1 = fmt_num(y1),
        x2 = fmt_num(x2),
        y2 = fmt_num(y2),
        uuid = Uuid::new_v4(),
    )
}

impl Session {
    /// Remove existing Edge.Cuts outline graphics and append `edges` as new
    /// `gr_line` nodes, journaling every removal and insertion.
    fn replace_outline(
        &mut self,
        edges: &[(f64, f64, f64, f64)],
        operation: &str,
        description: String,
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;

        let mut edits = Vec::new();
        let mut before_lines = Vec::new();
        while let Some(idx) = children.iter().position(is_edge_cuts_graphic) {
            let before = children[idx].serialize(0);
            before_lines.push(before.clone());
            edits.push(TreeEdit::Remove {
                path: vec![idx],
                before,
            });
            children.remove(idx);
        }

        let mut after_lines = Vec::new();
        for &(x1, y1, x2, y2) in edges {
            let node = parse(&gr_line_text(x1, y1, x2, y2))?;
            after_lines.push(node.serialize(0));
            let idx = children.len();
            children.push(node);
            edits.push(TreeEdit::Insert { path: vec![idx] });
        }

        let record = ChangeRecord::new(
            operation,
            description,
            "Edge.Cuts".to_string(),
            before_lines.join("\n"),
            after_lines.join("\n"),
            edits,
        );
        Ok(self.record(record))
    }

    /// Preview a rectangular board resize.
    pub fn query_set_board_size(&self, width: f64, height: f64) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        validate_dimensions(width, height)?;
        let existing = root
            .children()
            .iter()
            .filter(|c| is_edge_cuts_graphic(c))
            .count();
        Ok(json!({
            "operation": "set_board_size",
            "target": "Edge.Cuts",
            "width": width,
            "height": height,
            "replaced_outline_elements": existing,
            "preview": true,
        }))
    }

    /// Replace the board outline with an axis-aligned rectangle of the
    /// given size, anchored at the origin.
    pub fn apply_set_board_size(
        &mut self,
        width: f64,
        height: f64,
    ) -> Result<ChangeRecord, SessionError> {
        validate_dimensions(width, height)?;
        let edges = [
            (0.0, 0.0, width, 0.0),
            (width, 0.0, width, height),
            (width, height, 0.0, height),
            (0.0, height, 0.0, 0.0),
        ];
        self.replace_outline(
            &edges,
            "set_board_size",
            format!("Set board size to {width}x{height}mm"),
        )
    }

    /// Preview an arbitrary polygon outline.
    pub fn query_add_board_outline(&self, points: &[(f64, f64)]) -> Result<Value, SessionError> {
        self.working_root()?;
        validate_outline(points)?;
        Ok(json!({
            "operation": "add_board_outline",
            "target": "Edge.Cuts",
            "point_count": points.len(),
            "preview": true,
        }))
    }

    /// Replace the board outline with a closed polygon through `points`.
    pub fn apply_add_board_outline(
        &mut self,
        points: &[(f64, f64)],
    ) -> Result<ChangeRecord, SessionError> {
        validate_outline(points)?;
        let edges: Vec<(f64, f64, f64, f64)> = (0..points.len())
            .map(|i| {
                let (x1, y1) = points[i];
                let (x2, y2) = points[(i + 1) % points.len()];
                (x1, y1, x2, y2)
            })
            .collect();
        self.replace_outline(
            &edges,
            "add_board_outline",
            format!("Set board outline with {} points", points.len()),
        )
    }

    /// Preview a mounting hole.
    pub fn query_add_mounting_hole(
        &self,
        x: f64,
        y: f64,
        drill: f64,
        pad_dia: f64,
    ) -> Result<Value, SessionError> {
        self.working_root()?;
        validate_hole(drill, pad_dia)?;
        Ok(json!({
            "operation": "add_mounting_hole",
            "position": {"x": x, "y": y},
            "drill": drill,
            "pad_diameter": pad_dia,
            "preview": true,
        }))
    }

    /// Insert a mounting-hole footprint with a single non-plated hole pad.
    pub fn apply_add_mounting_hole(
        &mut self,
        x: f64,
        y: f64,
        drill: f64,
        pad_dia: f64,
    ) -> Result<ChangeRecord, SessionError> {
        validate_hole(drill, pad_dia)?;
        let hole_uuid = Uuid::new_v4().to_string();
        let text = format!(
            "(footprint \"MountingHole:MountingHole_{d}mm\" (layer \"F.Cu\") (uuid \"{hole_uuid}\") \
             (at {x} {y}) \
             (property \"Reference\" \"H1\" (at 0 -{label_off} 0) (layer \"F.SilkS\") (uuid \"{ref_uuid}\") \
             (effects (font (size 1 1) (thickness 0.15)))) \
             (property \"Value\" \"MountingHole\" (at 0 {label_off} 0) (layer \"F.Fab\") (uuid \"{val_uuid}\") \
             (effects (font (size 1 1) (thickness 0.15)))) \
             (pad \"\" np_thru_hole circle (at 0 0) (size {pd} {pd}) (drill {d}) \
             (layers \"*.Cu\" \"*.Mask\")))",
            d = fmt_num(drill),
            x = fmt_num(x),
            y = fmt_num(y),
            pd = fmt_num(pad_dia),
            label_off = fmt_num(pad_dia / 2.0 + 1.0),
            ref_uuid = Uuid::new_v4(),
            val_uuid = Uuid::new_v4(),
        );
        let fp_node = parse(&text)?;
        let after = fp_node.serialize(0);

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(fp_node);

        let record = ChangeRecord::new(
            "add_mounting_hole",
            format!("Add mounting hole at ({x}, {y}) drill={drill}mm"),
            format!("mounting_hole:{}", &hole_uuid[..8]),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a board text element.
    pub fn query_add_board_text(
        &self,
        text: &str,
        x: f64,
        y: f64,
        layer: &str,
        size: f64,
        angle: f64,
    ) -> Result<Value, SessionError> {
        self.working_root()?;
        validate_text(text, size)?;
        Ok(json!({
            "operation": "add_board_text",
            "text": text,
            "position": {"x": x, "y": y},
            "layer": normalize_layer(layer),
            "size": size,
            "angle": angle,
            "preview": true,
        }))
    }

    /// Append a `gr_text` element.
    pub fn apply_add_board_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        layer: &str,
        size: f64,
        angle: f64,
    ) -> Result<ChangeRecord, SessionError> {
        validate_text(text, size)?;
        let layer = normalize_layer(layer).to_string();
        let text_uuid = Uuid::new_v4().to_string();
        let angle_part = if angle != 0.0 {
            format!(" {}", fmt_num(angle))
        } else {
            String::new()
        };
        let node_text = format!(
            "(gr_text {content} (at {x} {y}{angle_part}) (layer \"{layer}\") (uuid \"{text_uuid}\") \
             (effects (font (size {s} {s}) (thickness {t}))))",
            content = quote_if_needed(text),
            x = fmt_num(x),
            y = fmt_num(y),
            s = fmt_num(size),
            t = fmt_num(size * 0.15),
        );
        let text_node = parse(&node_text)?;
        let after = text_node.serialize(0);

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(text_node);

        let record = ChangeRecord::new(
            "add_board_text",
            format!("Add text '{text}' at ({x}, {y}) on {layer}"),
            format!("text:{}", &text_uuid[..8]),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview design-rule changes. Rejects every key that does not belong
    /// in the setup section, before reporting anything.
    pub fn query_set_design_rules(&self, rules: &[(&str, f64)]) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let resolved = resolve_rules(rules)?;
        let setup = root.find("setup").ok_or(SessionError::NoSetupSection)?;

        let mut current = serde_json::Map::new();
        for (name, _) in &resolved {
            let existing = setup
                .find(name)
                .and_then(|n| n.first_value())
                .map(str::to_string);
            current.insert(name.clone(), json!(existing));
        }
        Ok(json!({
            "operation": "set_design_rules",
            "target": "setup",
            "current": current,
            "new": resolved
                .iter()
                .map(|(k, v)| (k.clone(), json!(v)))
                .collect::<serde_json::Map<_, _>>(),
            "preview": true,
        }))
    }

    /// Mutate numeric design rules in the `setup` node. Every key is
    /// validated before any mutation: DRU-file-only keys (track widths,
    /// via sizes, clearance) fail the whole call.
    pub fn apply_set_design_rules(
        &mut self,
        rules: &[(&str, f64)],
    ) -> Result<ChangeRecord, SessionError> {
        let resolved = resolve_rules(rules)?;

        let children = self.root_children_mut()?;
        let setup_idx = children
            .iter()
            .position(|c| c.name() == Some("setup"))
            .ok_or(SessionError::NoSetupSection)?;
        let setup = &mut children[setup_idx];
        let before = setup.serialize(0);

        for (sexpr_name, value) in &resolved {
            match setup.find_index(sexpr_name) {
                Some(i) => {
                    let setup_children =
                        setup.children_mut().ok_or(SessionError::MalformedDocument)?;
                    if let Some(rule_children) = setup_children[i].children_mut() {
                        if rule_children.is_empty() {
                            rule_children.push(Node::raw_atom(fmt_num(*value)));
                        } else {
                            rule_children[0] = Node::raw_atom(fmt_num(*value));
                        }
                    }
                }
                None => {
                    let node = parse(&format!("({sexpr_name} {})", fmt_num(*value)))?;
                    setup
                        .children_mut()
                        .ok_or(SessionError::MalformedDocument)?
                        .push(node);
                }
            }
        }

        let after = setup.serialize(0);
        let keys: Vec<&str> = rules.iter().map(|(k, _)| *k).collect();
        let record = ChangeRecord::new(
            "set_design_rules",
            format!("Set design rules: {keys:?}"),
            "setup".to_string(),
            before.clone(),
            after,
            vec![TreeEdit::Replace {
                path: vec![setup_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a net class.
    pub fn query_add_net_class(
        &self,
        name: &str,
        clearance: f64,
        trace_width: f64,
        via_dia: f64,
        via_drill: f64,
        nets: Option<&[&str]>,
    ) -> Result<Value, SessionError> {
        self.working_root()?;
        Ok(json!({
            "operation": "add_net_class",
            "target": format!("net_class:{name}"),
            "clearance": clearance,
            "trace_width": trace_width,
            "via_dia": via_dia,
            "via_drill": via_drill,
            "nets": nets.unwrap_or_default(),
            "preview": true,
        }))
    }

    /// Append a `net_class` definition inside `setup` (or at the root if
    /// the board has no setup section).
    pub fn apply_add_net_class(
        &mut self,
        name: &str,
        clearance: f64,
        trace_width: f64,
        via_dia: f64,
        via_drill: f64,
        nets: Option<&[&str]>,
    ) -> Result<ChangeRecord, SessionError> {
        let nets_part = match nets {
            Some(nets) if !nets.is_empty() => {
                let adds: Vec<String> = nets
                    .iter()
                    .map(|n| format!("(add_net {})", quote_if_needed(n)))
                    .collect();
                format!(" {}", adds.join(" "))
            }
            _ => String::new(),
        };
        let text = format!(
            "(net_class {name} \"\" (clearance {c}) (trace_width {tw}) \
             (via_dia {vd}) (via_drill {vdr}) (uuid \"{uuid}\"){nets_part})",
            name = quote_if_needed(name),
            c = fmt_num(clearance),
            tw = fmt_num(trace_width),
            vd = fmt_num(via_dia),
            vdr = fmt_num(via_drill),
            uuid = Uuid::new_v4(),
        );
        let nc_node = parse(&text)?;
        let after = nc_node.serialize(0);

        let children = self.root_children_mut()?;
        let path = match children.iter().position(|c| c.name() == Some("setup")) {
            Some(setup_idx) => {
                let setup_children = children[setup_idx]
                    .children_mut()
                    .ok_or(SessionError::MalformedDocument)?;
                let idx = setup_children.len();
                setup_children.push(nc_node);
                vec![setup_idx, idx]
            }
            None => {
                let idx = children.len();
                children.push(nc_node);
                vec![idx]
            }
        };

        let record = ChangeRecord::new(
            "add_net_class",
            format!("Add net class '{name}'"),
            format!("net_class:{name}"),
            String::new(),
            after,
            vec![TreeEdit::Insert { path }],
        );
        Ok(self.record(record))
    }

    /// Preview per-layer constraints.
    pub fn query_set_layer_constraints(
        &self,
        layer: &str,
        min_width: Option<f64>,
        min_clearance: Option<f64>,
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        root.find("setup").ok_or(SessionError::NoSetupSection)?;
        Ok(json!({
            "operation": "set_layer_constraints",
            "target": format!("layer:{layer}"),
            "min_width": min_width,
            "min_clearance": min_clearance,
            "preview": true,
        }))
    }

    /// Add or update a `layer_constraints` node for one layer inside the
    /// setup section.
    pub fn apply_set_layer_constraints(
        &mut self,
        layer: &str,
        min_width: Option<f64>,
        min_clearance: Option<f64>,
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let setup_idx = children
            .iter()
            .position(|c| c.name() == Some("setup"))
            .ok_or(SessionError::NoSetupSection)?;
        let setup = &mut children[setup_idx];
        let before = setup.serialize(0);

        let existing_idx = setup.children().iter().position(|c| {
            c.name() == Some("layer_constraints")
                && c.find("layer").and_then(|l| l.first_value()) == Some(layer)
        });

        match existing_idx {
            None => {
                let mut parts = vec![format!("(layer {})", quote_if_needed(layer))];
                if let Some(w) = min_width {
                    parts.push(format!("(min_width {})", fmt_num(w)));
                }
                if let Some(c) = min_clearance {
                    parts.push(format!("(min_clearance {})", fmt_num(c)));
                }
                let node = parse(&format!("(layer_constraints {})", parts.join(" ")))?;
                setup
                    .children_mut()
                    .ok_or(SessionError::MalformedDocument)?
                    .push(node);
            }
            Some(idx) => {
                let setup_children =
                    setup.children_mut().ok_or(SessionError::MalformedDocument)?;
                let constraint = &mut setup_children[idx];
                for (key, value) in [("min_width", min_width), ("min_clearance", min_clearance)] {
                    let Some(value) = value else { continue };
                    match constraint.find_index(key) {
                        Some(i) => {
                            if let Some(kids) =
                                constraint.children_mut().and_then(|c| c[i].children_mut())
                            {
                                if kids.is_empty() {
                                    kids.push(Node::raw_atom(fmt_num(value)));
                                } else {
                                    kids[0] = Node::raw_atom(fmt_num(value));
                                }
                            }
                        }
                        None => {
                            let node = parse(&format!("({key} {})", fmt_num(value)))?;
                            if let Some(kids) = constraint.children_mut() {
                                kids.push(node);
                            }
                        }
                    }
                }
            }
        }

        let after = setup.serialize(0);
        let record = ChangeRecord::new(
            "set_layer_constraints",
            format!("Set constraints for {layer}"),
            format!("layer:{layer}"),
            before.clone(),
            after,
            vec![TreeEdit::Replace {
                path: vec![setup_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }
}

fn validate_dimensions(width: f64, height: f64) -> Result<(), SessionError> {
    if width <= 0.0 || height <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "board dimensions must be positive, got {width}x{height}"
        )));
    }
    Ok(())
}

fn validate_outline(points: &[(f64, f64)]) -> Result<(), SessionError> {
    if points.len() < 3 {
        return Err(SessionError::InvalidArgument(format!(
            "board outline requires at least 3 points, got {}",
            points.len()
        )));
    }
    Ok(())
}

fn validate_hole(drill: f64, pad_dia: f64) -> Result<(), SessionError> {
    if drill <= 0.0 || pad_dia <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "drill and pad diameter must be positive, got drill={drill} pad={pad_dia}"
        )));
    }
    Ok(())
}

fn validate_text(text: &str, size: f64) -> Result<(), SessionError> {
    if text.is_empty() {
        return Err(SessionError::InvalidArgument(
            "text cannot be empty".to_string(),
        ));
    }
    if size <= 0.0 {
        return Err(SessionError::InvalidArgument(format!(
            "text size must be positive, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionManager;
    use crate::tests::start;

    #[test]
    fn set_board_size_replaces_outline() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();
        let initial = session.working_root().unwrap().clone();

        let record = session.apply_set_board_size(50.0, 40.0).unwrap();
        assert_eq!(record.operation, "set_board_size");
        // The seeded 30x30 outline is gone, replaced by four new edges.
        assert_eq!(record.before_snapshot.matches("gr_line").count(), 4);
        assert_eq!(record.after_snapshot.matches("gr_line").count(), 4);

        let root = session.working_root().unwrap();
        let edges = root.find_all("gr_line");
        assert_eq!(edges.len(), 4);
        assert!(record.after_snapshot.contains("(end 50 0)"));
        assert!(record.after_snapshot.contains("(end 50 40)"));

        session.undo().unwrap().unwrap();
        assert_eq!(session.working_root().unwrap(), &initial);
    }

    #[test]
    fn polygon_outline_requires_three_points() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();

        assert!(matches!(
            session.apply_add_board_outline(&[(0.0, 0.0), (10.0, 0.0)]),
            Err(SessionError::InvalidArgument(_))
        ));
        // No partial mutation: the original outline is still there.
        assert_eq!(session.working_root().unwrap().find_all("gr_line").len(), 4);

        session
            .apply_add_board_outline(&[(0.0, 0.0), (40.0, 0.0), (20.0, 30.0)])
            .unwrap();
        assert_eq!(session.working_root().unwrap().find_all("gr_line").len(), 3);
    }

    #[test]
    fn mounting_hole_has_np_thru_hole_pad() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();

        session.apply_add_mounting_hole(5.0, 5.0, 3.2, 6.0).unwrap();
        let root = session.working_root().unwrap();
        let hole = root
            .find_all("footprint")
            .into_iter()
            .find(|fp| fp.first_value().is_some_and(|v| v.starts_with("MountingHole")))
            .unwrap();
        let pad = hole.find("pad").unwrap();
        assert_eq!(pad.atom_values()[..3], ["", "np_thru_hole", "circle"]);
        assert_eq!(pad.find("drill").unwrap().first_value(), Some("3.2"));
        assert_eq!(pad.find("layers").unwrap().atom_values(), vec!["*.Cu", "*.Mask"]);
    }

    #[test]
    fn board_text_with_alias_layer_and_angle() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();

        session
            .apply_add_board_text("rev A", 3.0, 27.0, "F.Silkscreen", 1.5, 90.0)
            .unwrap();
        let root = session.working_root().unwrap();
        let text = root.find("gr_text").unwrap();
        assert_eq!(text.first_value(), Some("rev A"));
        assert_eq!(text.find("layer").unwrap().first_value(), Some("F.SilkS"));
        assert_eq!(text.find("at").unwrap().atom_values(), vec!["3", "27", "90"]);
    }

    #[test]
    fn design_rules_reject_dru_keys_atomically() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();
        let setup_before = session
            .working_root()
            .unwrap()
            .find("setup")
            .unwrap()
            .serialize(0);

        // One valid key plus one DRU-only key: the whole call fails and
        // nothing is mutated.
        let err = session
            .apply_set_design_rules(&[("solder_mask_min_width", 0.1), ("min_track_width", 0.15)])
            .unwrap_err();
        assert!(matches!(err, SessionError::DesignRuleNotInSetup(_)));
        assert!(err.to_string().contains("belongs in the design-rules file"));
        assert_eq!(
            session
                .working_root()
                .unwrap()
                .find("setup")
                .unwrap()
                .serialize(0),
            setup_before
        );
        assert!(session.changes().is_empty());

        assert!(matches!(
            session.apply_set_design_rules(&[("frobnicate", 1.0)]),
            Err(SessionError::UnknownDesignRule { .. })
        ));

        // Valid keys and aliases update or append setup children.
        session
            .apply_set_design_rules(&[("mask_clearance", 0.05), ("solder_mask_min_width", 0.1)])
            .unwrap();
        let setup = session.working_root().unwrap().find("setup").unwrap().clone();
        assert_eq!(
            setup.find("pad_to_mask_clearance").unwrap().first_value(),
            Some("0.05")
        );
        assert_eq!(
            setup.find("solder_mask_min_width").unwrap().first_value(),
            Some("0.1")
        );
    }

    #[test]
    fn net_class_lands_in_setup() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();

        session
            .apply_add_net_class("Power", 0.3, 0.5, 1.0, 0.5, Some(&["GND", "VCC"]))
            .unwrap();
        let root = session.working_root().unwrap();
        let setup = root.find("setup").unwrap();
        let nc = setup.find("net_class").unwrap();
        assert_eq!(nc.first_value(), Some("Power"));
        assert_eq!(nc.find("trace_width").unwrap().first_value(), Some("0.5"));
        assert_eq!(nc.find_all("add_net").len(), 2);
    }

    #[test]
    fn layer_constraints_update_in_place() {
        let mut mgr = SessionManager::new();
        let (id, _doc) = start(&mut mgr);
        let session = mgr.session_mut(&id).unwrap();

        session
            .apply_set_layer_constraints("F.Cu", Some(0.15), None)
            .unwrap();
        session
            .apply_set_layer_constraints("F.Cu", Some(0.2), Some(0.2))
            .unwrap();

        let root = session.working_root().unwrap();
        let setup = root.find("setup").unwrap();
        let constraints = setup.find_all("layer_constraints");
        assert_eq!(constraints.len(), 1);
        assert_eq!(
            constraints[0].find("min_width").unwrap().first_value(),
            Some("0.2")
        );
        assert_eq!(
            constraints[0].find("min_clearance").unwrap().first_value(),
            Some("0.2")
        );
    }
}
