//! Component placement operations: move, rotate, flip, delete, place,
//! edit, replace.

use std::path::Path;

use serde_json::{Value, json};
use uuid::Uuid;
use viaduct_sexpr::{Document, Node, parse, quote_if_needed};

use crate::change::{ChangeRecord, TreeEdit};
use crate::helpers::{
    flip_layer, fmt_num, footprint_index, leading_atom_count, set_property_value,
};
use crate::{Session, SessionError};

fn set_atom(children: &mut Vec<Node>, idx: usize, value: String) {
    let node = Node::raw_atom(value);
    if idx < children.len() {
        children[idx] = node;
    } else {
        children.push(node);
    }
}

/// Flip the `(layer ...)` child of a node through the front/back table.
fn flip_node_layer(node: &mut Node) {
    let Some(layer) = node.find_mut("layer") else {
        return;
    };
    let Some(children) = layer.children_mut() else {
        return;
    };
    let Some(first) = children.first_mut() else {
        return;
    };
    let flipped = match first.as_atom() {
        Some(val) => {
            let mapped = flip_layer(val);
            if mapped == val {
                None
            } else {
                Some(mapped.to_string())
            }
        }
        None => None,
    };
    if let Some(mapped) = flipped {
        *first = Node::quoted(mapped);
    }
}

/// Point a parsed footprint at a new location, layer, reference, value and
/// uuid. Used when placing from a `.kicad_mod` file.
fn retarget_footprint(fp: &mut Node, x: f64, y: f64, layer: &str, reference: &str, value: &str) {
    match fp.find_index("at") {
        Some(idx) => {
            if let Some(children) = fp.children_mut() {
                if let Some(at_children) = children[idx].children_mut() {
                    at_children.clear();
                    at_children.push(Node::raw_atom(fmt_num(x)));
                    at_children.push(Node::raw_atom(fmt_num(y)));
                }
            }
        }
        None => {
            let at = Node::list(
                "at",
                vec![Node::raw_atom(fmt_num(x)), Node::raw_atom(fmt_num(y))],
            );
            let insert_idx = leading_atom_count(fp);
            if let Some(children) = fp.children_mut() {
                children.insert(insert_idx, at);
            }
        }
    }

    if let Some(layer_node) = fp.find_mut("layer") {
        if let Some(children) = layer_node.children_mut() {
            set_first(children, Node::quoted(layer));
        }
    }

    if let Some(children) = fp.children_mut() {
        for child in children.iter_mut() {
            if child.name() != Some("property") {
                continue;
            }
            let prop_name = child.first_value().map(str::to_string);
            match prop_name.as_deref() {
                Some("Reference") => set_property_value(child, reference),
                Some("Value") => set_property_value(child, value),
                _ => {}
            }
        }
    }

    if let Some(uuid_node) = fp.find_mut("uuid") {
        if let Some(children) = uuid_node.children_mut() {
            set_first(children, Node::quoted(Uuid::new_v4().to_string()));
        }
    }
}

fn set_first(children: &mut Vec<Node>, node: Node) {
    if children.is_empty() {
        children.push(node);
    } else {
        children[0] = node;
    }
}

/// Minimal skeleton footprint used when no `.kicad_mod` can be resolved.
fn build_skeleton_footprint(
    library: &str,
    reference: &str,
    value: &str,
    x: f64,
    y: f64,
    layer: &str,
) -> Result<Node, SessionError> {
    for (field, name) in [
        (library, "library"),
        (reference, "reference"),
        (value, "value"),
        (layer, "layer"),
    ] {
        if field.is_empty() {
            return Err(SessionError::InvalidArgument(format!(
                "{name} cannot be empty"
            )));
        }
    }

    let text = format!(
        "(footprint {lib} (layer {lay}) (uuid \"{fp_uuid}\") (at {x} {y})\
         (property \"Reference\" {refd} (at 0 -1.5 0) (layer {lay}) (uuid \"{ref_uuid}\")\
         (effects (font (size 1 1) (thickness 0.15))))\
         (property \"Value\" {val} (at 0 1.5 0) (layer \"F.Fab\") (uuid \"{val_uuid}\")\
         (effects (font (size 1 1) (thickness 0.15))))\
         (attr smd) (embedded_fonts no))",
        lib = quote_if_needed(library),
        lay = quote_if_needed(layer),
        refd = quote_if_needed(reference),
        val = quote_if_needed(value),
        x = fmt_num(x),
        y = fmt_num(y),
        fp_uuid = Uuid::new_v4(),
        ref_uuid = Uuid::new_v4(),
        val_uuid = Uuid::new_v4(),
    );
    Ok(parse(&text)?)
}

impl Session {
    /// Preview a component move without touching the working copy.
    pub fn query_move(&self, reference: &str, x: f64, y: f64) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let at_vals: Vec<f64> = root.children()[fp_idx]
            .find("at")
            .map(|n| {
                n.atom_values()
                    .iter()
                    .filter_map(|v| v.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(json!({
            "operation": "move_component",
            "target": reference,
            "current_position": {
                "x": at_vals.first().copied().unwrap_or(0.0),
                "y": at_vals.get(1).copied().unwrap_or(0.0),
            },
            "new_position": {"x": x, "y": y},
            "preview": true,
        }))
    }

    /// Move a component to new board coordinates.
    pub fn apply_move(
        &mut self,
        reference: &str,
        x: f64,
        y: f64,
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &mut children[fp_idx];

        let (before, after, edits) = match fp.find_index("at") {
            Some(at_idx) => {
                let at = &mut fp
                    .children_mut()
                    .ok_or(SessionError::MalformedDocument)?[at_idx];
                let before = at.serialize(0);
                let at_children = at.children_mut().ok_or(SessionError::MalformedDocument)?;
                set_atom(at_children, 0, fmt_num(x));
                set_atom(at_children, 1, fmt_num(y));
                let after = at.serialize(0);
                let edits = vec![TreeEdit::Replace {
                    path: vec![fp_idx, at_idx],
                    before: before.clone(),
                }];
                (before, after, edits)
            }
            None => {
                let at = Node::list(
                    "at",
                    vec![Node::raw_atom(fmt_num(x)), Node::raw_atom(fmt_num(y))],
                );
                let after = at.serialize(0);
                let insert_idx = leading_atom_count(fp);
                fp.children_mut()
                    .ok_or(SessionError::MalformedDocument)?
                    .insert(insert_idx, at);
                let edits = vec![TreeEdit::Insert {
                    path: vec![fp_idx, insert_idx],
                }];
                (String::new(), after, edits)
            }
        };

        let record = ChangeRecord::new(
            "move_component",
            format!("Move {reference} to ({x}, {y})"),
            reference.to_string(),
            before,
            after,
            edits,
        );
        Ok(self.record(record))
    }

    /// Preview a rotation.
    pub fn query_rotate(&self, reference: &str, angle: f64) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let current = root.children()[fp_idx]
            .find("at")
            .and_then(|n| n.atom_values().get(2).and_then(|v| v.parse::<f64>().ok()))
            .unwrap_or(0.0);
        Ok(json!({
            "operation": "rotate_component",
            "target": reference,
            "current_angle": current,
            "new_angle": angle,
            "preview": true,
        }))
    }

    /// Rotate a component to the given absolute angle in degrees.
    pub fn apply_rotate(
        &mut self,
        reference: &str,
        angle: f64,
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &mut children[fp_idx];

        let (before, after, edits) = match fp.find_index("at") {
            Some(at_idx) => {
                let at = &mut fp
                    .children_mut()
                    .ok_or(SessionError::MalformedDocument)?[at_idx];
                let before = at.serialize(0);
                let at_children = at.children_mut().ok_or(SessionError::MalformedDocument)?;
                while at_children.len() < 2 {
                    at_children.push(Node::raw_atom("0"));
                }
                set_atom(at_children, 2, fmt_num(angle));
                let after = at.serialize(0);
                let edits = vec![TreeEdit::Replace {
                    path: vec![fp_idx, at_idx],
                    before: before.clone(),
                }];
                (before, after, edits)
            }
            None => {
                let at = Node::list(
                    "at",
                    vec![
                        Node::raw_atom("0"),
                        Node::raw_atom("0"),
                        Node::raw_atom(fmt_num(angle)),
                    ],
                );
                let after = at.serialize(0);
                let insert_idx = leading_atom_count(fp);
                fp.children_mut()
                    .ok_or(SessionError::MalformedDocument)?
                    .insert(insert_idx, at);
                let edits = vec![TreeEdit::Insert {
                    path: vec![fp_idx, insert_idx],
                }];
                (String::new(), after, edits)
            }
        };

        let record = ChangeRecord::new(
            "rotate_component",
            format!("Rotate {reference} to {angle} degrees"),
            reference.to_string(),
            before,
            after,
            edits,
        );
        Ok(self.record(record))
    }

    /// Preview a side flip.
    pub fn query_flip(&self, reference: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let current = root.children()[fp_idx]
            .find("layer")
            .and_then(|n| n.first_value())
            .unwrap_or("F.Cu");
        Ok(json!({
            "operation": "flip_component",
            "target": reference,
            "current_layer": current,
            "new_layer": flip_layer(current),
            "preview": true,
        }))
    }

    /// Flip a component to the opposite side of the board, remapping its
    /// own layer and the layers of pads, graphics and properties.
    pub fn apply_flip(&mut self, reference: &str) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &mut children[fp_idx];
        let before = fp.serialize(0);

        flip_node_layer(fp);
        if let Some(fp_children) = fp.children_mut() {
            for child in fp_children.iter_mut() {
                match child.name() {
                    Some("pad") => {
                        let Some(layers) = child.find_mut("layers") else {
                            continue;
                        };
                        let Some(items) = layers.children_mut() else {
                            continue;
                        };
                        for item in items.iter_mut() {
                            let flipped = match item.as_atom() {
                                Some(val) => {
                                    let mapped = flip_layer(val);
                                    (mapped != val).then(|| mapped.to_string())
                                }
                                None => None,
                            };
                            if let Some(mapped) = flipped {
                                *item = Node::quoted(mapped);
                            }
                        }
                    }
                    Some("fp_line" | "fp_rect" | "fp_circle" | "fp_arc" | "fp_text")
                    | Some("property") => flip_node_layer(child),
                    _ => {}
                }
            }
        }

        let after = fp.serialize(0);
        let record = ChangeRecord::new(
            "flip_component",
            format!("Flip {reference} to opposite side"),
            reference.to_string(),
            before.clone(),
            after,
            vec![TreeEdit::Replace {
                path: vec![fp_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a component deletion.
    pub fn query_delete(&self, reference: &str) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &root.children()[fp_idx];
        Ok(json!({
            "operation": "delete_component",
            "target": reference,
            "library": fp.first_value().unwrap_or(""),
            "pad_count": fp.find_all("pad").len(),
            "preview": true,
        }))
    }

    /// Remove a component from the board.
    pub fn apply_delete(&mut self, reference: &str) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let before = children[fp_idx].serialize(0);
        children.remove(fp_idx);

        let record = ChangeRecord::new(
            "delete_component",
            format!("Delete component {reference}"),
            reference.to_string(),
            before.clone(),
            String::new(),
            vec![TreeEdit::Remove {
                path: vec![fp_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a placement: reports whether the footprint resolves to a
    /// library file or will fall back to a skeleton.
    pub fn query_place(
        &self,
        footprint_library: &str,
        reference: &str,
        x: f64,
        y: f64,
        layer: &str,
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        if footprint_index(root.children(), reference).is_some() {
            return Err(SessionError::DuplicateReference(reference.to_string()));
        }
        let resolved = viaduct_library::resolve_kicad_mod(footprint_library);
        Ok(json!({
            "operation": "place_component",
            "target": reference,
            "library": footprint_library,
            "position": {"x": x, "y": y},
            "layer": layer,
            "resolved_path": resolved.as_ref().map(|p| p.display().to_string()),
            "skeleton_fallback": resolved.is_none(),
            "preview": true,
        }))
    }

    /// Place a new component. If the library id resolves to a `.kicad_mod`
    /// file the full footprint is used; otherwise a minimal skeleton with
    /// just Reference and Value properties is synthesized (best effort,
    /// logged as a warning).
    pub fn apply_place(
        &mut self,
        footprint_library: &str,
        reference: &str,
        value: &str,
        x: f64,
        y: f64,
        layer: &str,
    ) -> Result<ChangeRecord, SessionError> {
        {
            let root = self.working_root()?;
            if footprint_index(root.children(), reference).is_some() {
                return Err(SessionError::DuplicateReference(reference.to_string()));
            }
        }

        if let Some(mod_path) = viaduct_library::resolve_kicad_mod(footprint_library) {
            return self.place_from_kicad_mod(&mod_path, reference, value, x, y, layer);
        }

        log::warn!("footprint {footprint_library:?} not resolvable, placing skeleton");
        let fp_node = build_skeleton_footprint(footprint_library, reference, value, x, y, layer)?;
        let after = fp_node.serialize(0);
        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(fp_node);

        let record = ChangeRecord::new(
            "place_component",
            format!("Place {reference} ({footprint_library}) at ({x}, {y}) on {layer}"),
            reference.to_string(),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Place a component from an explicit `.kicad_mod` file, retargeting
    /// its position, layer, Reference, Value and uuid.
    pub fn place_from_kicad_mod(
        &mut self,
        kicad_mod_path: &Path,
        reference: &str,
        value: &str,
        x: f64,
        y: f64,
        layer: &str,
    ) -> Result<ChangeRecord, SessionError> {
        {
            let root = self.working_root()?;
            if footprint_index(root.children(), reference).is_some() {
                return Err(SessionError::DuplicateReference(reference.to_string()));
            }
        }

        let mod_doc = Document::load(kicad_mod_path)?;
        let mut fp_node = mod_doc.root;
        retarget_footprint(&mut fp_node, x, y, layer, reference, value);
        let after = fp_node.serialize(0);
        let file_name = kicad_mod_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(fp_node);

        let record = ChangeRecord::new(
            "place_component",
            format!("Place {reference} from {file_name} at ({x}, {y}) on {layer}"),
            reference.to_string(),
            String::new(),
            after,
            vec![TreeEdit::Insert {
                path: vec![insert_idx],
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a property edit: current values of the named properties.
    pub fn query_edit_component(
        &self,
        reference: &str,
        properties: &[(&str, &str)],
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &root.children()[fp_idx];

        let mut current = serde_json::Map::new();
        for (name, _) in properties {
            let existing = fp.find_all("property").into_iter().find_map(|p| {
                let vals = p.atom_values();
                (vals.first() == Some(name)).then(|| {
                    vals.get(1).map(|s| s.to_string()).unwrap_or_default()
                })
            });
            current.insert((*name).to_string(), json!(existing));
        }
        Ok(json!({
            "operation": "edit_component",
            "target": reference,
            "current": current,
            "new": properties
                .iter()
                .map(|(k, v)| ((*k).to_string(), json!(v)))
                .collect::<serde_json::Map<_, _>>(),
            "preview": true,
        }))
    }

    /// Update (or append hidden) properties on an existing footprint.
    pub fn apply_edit_component(
        &mut self,
        reference: &str,
        properties: &[(&str, &str)],
    ) -> Result<ChangeRecord, SessionError> {
        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &mut children[fp_idx];
        let before = fp.serialize(0);

        for (prop_name, prop_value) in properties {
            let mut found = false;
            if let Some(fp_children) = fp.children_mut() {
                for child in fp_children.iter_mut() {
                    if child.name() != Some("property") {
                        continue;
                    }
                    if child.first_value() == Some(prop_name) {
                        set_property_value(child, prop_value);
                        found = true;
                        break;
                    }
                }
            }
            if !found {
                let text = format!(
                    "(property {name} {value} (at 0 0 0) (layer \"F.Fab\") (uuid \"{uuid}\")\
                     (effects (font (size 1 1) (thickness 0.15)) hide))",
                    name = quote_if_needed(prop_name),
                    value = quote_if_needed(prop_value),
                    uuid = Uuid::new_v4(),
                );
                let node = parse(&text)?;
                if let Some(fp_children) = fp.children_mut() {
                    fp_children.push(node);
                }
            }
        }

        let after = fp.serialize(0);
        let keys: Vec<&str> = properties.iter().map(|(k, _)| *k).collect();
        let record = ChangeRecord::new(
            "edit_component",
            format!("Edit {reference} properties: {keys:?}"),
            reference.to_string(),
            before.clone(),
            after,
            vec![TreeEdit::Replace {
                path: vec![fp_idx],
                before,
            }],
        );
        Ok(self.record(record))
    }

    /// Preview a footprint replacement.
    pub fn query_replace_component(
        &self,
        reference: &str,
        new_library: &str,
        new_value: &str,
    ) -> Result<Value, SessionError> {
        let root = self.working_root()?;
        let fp_idx = footprint_index(root.children(), reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &root.children()[fp_idx];
        Ok(json!({
            "operation": "replace_component",
            "target": reference,
            "current_library": fp.first_value().unwrap_or(""),
            "new_library": new_library,
            "new_value": new_value,
            "preview": true,
        }))
    }

    /// Replace a component with a different footprint, preserving its
    /// position, layer and reference designator.
    pub fn apply_replace_component(
        &mut self,
        reference: &str,
        new_library: &str,
        new_value: &str,
    ) -> Result<ChangeRecord, SessionError> {
        let resolved = viaduct_library::resolve_kicad_mod(new_library);

        let children = self.root_children_mut()?;
        let fp_idx = footprint_index(children, reference)
            .ok_or_else(|| SessionError::ComponentNotFound(reference.to_string()))?;
        let fp = &children[fp_idx];

        let at_vals: Vec<f64> = fp
            .find("at")
            .map(|n| {
                n.atom_values()
                    .iter()
                    .filter_map(|v| v.parse().ok())
                    .collect()
            })
            .unwrap_or_default();
        let x = at_vals.first().copied().unwrap_or(0.0);
        let y = at_vals.get(1).copied().unwrap_or(0.0);
        let layer = fp
            .find("layer")
            .and_then(|n| n.first_value())
            .unwrap_or("F.Cu")
            .to_string();

        let before = fp.serialize(0);
        children.remove(fp_idx);
        let mut edits = vec![TreeEdit::Remove {
            path: vec![fp_idx],
            before: before.clone(),
        }];

        let new_fp = match resolved {
            Some(mod_path) => {
                let mut node = Document::load(&mod_path)?.root;
                retarget_footprint(&mut node, x, y, &layer, reference, new_value);
                node
            }
            None => build_skeleton_footprint(new_library, reference, new_value, x, y, &layer)?,
        };
        let after = new_fp.serialize(0);
        let children = self.root_children_mut()?;
        let insert_idx = children.len();
        children.push(new_fp);
        edits.push(TreeEdit::Insert {
            path: vec![insert_idx],
        });

        let record = ChangeRecord::new(
            "replace_component",
            format!("Replace {reference} with {new_library} ({new_value})"),
            reference.to_string(),
            before,
            after,
            edits,
        );
        Ok(self.record(record))
    }
}
