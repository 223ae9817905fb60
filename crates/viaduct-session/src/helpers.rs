//! Shared lookup helpers and layer name tables for session operations.

use viaduct_sexpr::Node;

/// Front/back mapping applied when a component is flipped. Wildcards and
/// layers without a paired side pass through unchanged.
pub(crate) fn flip_layer(name: &str) -> &str {
    match name {
        "F.Cu" => "B.Cu",
        "B.Cu" => "F.Cu",
        "F.SilkS" => "B.SilkS",
        "B.SilkS" => "F.SilkS",
        "F.Fab" => "B.Fab",
        "B.Fab" => "F.Fab",
        "F.CrtYd" => "B.CrtYd",
        "B.CrtYd" => "F.CrtYd",
        "F.Mask" => "B.Mask",
        "B.Mask" => "F.Mask",
        "F.Paste" => "B.Paste",
        "B.Paste" => "F.Paste",
        "F.Adhes" => "B.Adhes",
        "B.Adhes" => "F.Adhes",
        other => other,
    }
}

/// Map user-facing layer names to the internal KiCad names emitted into
/// S-expressions.
pub(crate) fn normalize_layer(name: &str) -> &str {
    match name {
        "F.Silkscreen" => "F.SilkS",
        "B.Silkscreen" => "B.SilkS",
        "F.Adhesive" => "F.Adhes",
        "B.Adhesive" => "B.Adhes",
        "F.Courtyard" => "F.CrtYd",
        "B.Courtyard" => "B.CrtYd",
        "User.Drawings" => "Dwgs.User",
        "User.Comments" => "Cmts.User",
        "User.Eco1" => "Eco1.User",
        "User.Eco2" => "Eco2.User",
        other => other,
    }
}

/// Format a coordinate or dimension for emission into an S-expression.
pub(crate) fn fmt_num(v: f64) -> String {
    format!("{v}")
}

/// Reference designator of a footprint node, from its `Reference` property.
pub(crate) fn footprint_reference(fp: &Node) -> Option<&str> {
    for prop in fp.find_all("property") {
        let vals = prop.atom_values();
        if vals.first() == Some(&"Reference") {
            return vals.get(1).copied();
        }
    }
    None
}

/// Index of the footprint with the given reference among `children`.
pub(crate) fn footprint_index(children: &[Node], reference: &str) -> Option<usize> {
    children.iter().position(|c| {
        c.name() == Some("footprint") && footprint_reference(c) == Some(reference)
    })
}

/// Index of the first child of `kind` whose `(uuid ...)` matches.
pub(crate) fn uuid_index(children: &[Node], kind: &str, uuid: &str) -> Option<usize> {
    children.iter().position(|c| {
        c.name() == Some(kind)
            && c.find("uuid").and_then(|u| u.first_value()) == Some(uuid)
    })
}

/// Number of leading atom children (library id, legacy flags) before the
/// first list child of a footprint; new nodes are inserted after them.
pub(crate) fn leading_atom_count(node: &Node) -> usize {
    node.children()
        .iter()
        .take_while(|c| c.is_atom())
        .count()
}

/// Replace the second atom child of a property node (its value slot).
pub(crate) fn set_property_value(prop: &mut Node, value: &str) {
    let Some(children) = prop.children_mut() else {
        return;
    };
    let mut seen = 0;
    for child in children.iter_mut() {
        if child.is_atom() {
            seen += 1;
            if seen == 2 {
                *child = Node::quoted(value);
                return;
            }
        }
    }
}

/// Resolve a net name to its number among the board's `(net N "name")`
/// declarations.
pub(crate) fn net_number_by_name(root: &Node, net_name: &str) -> Option<i32> {
    for net in root.find_all("net") {
        let vals = net.atom_values();
        if vals.get(1) == Some(&net_name) {
            return vals.first().and_then(|v| v.parse().ok());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use viaduct_sexpr::parse;

    #[test]
    fn layer_tables() {
        assert_eq!(flip_layer("F.Cu"), "B.Cu");
        assert_eq!(flip_layer("B.SilkS"), "F.SilkS");
        assert_eq!(flip_layer("*.Cu"), "*.Cu");
        assert_eq!(flip_layer("Edge.Cuts"), "Edge.Cuts");
        assert_eq!(normalize_layer("F.Silkscreen"), "F.SilkS");
        assert_eq!(normalize_layer("User.Drawings"), "Dwgs.User");
        assert_eq!(normalize_layer("F.Cu"), "F.Cu");
    }

    #[test]
    fn property_value_replacement() {
        let mut prop = parse(r#"(property "Reference" "R1" (at 0 0 0))"#).unwrap();
        set_property_value(&mut prop, "R9");
        assert_eq!(prop.atom_values(), vec!["Reference", "R9"]);
    }

    #[test]
    fn footprint_lookup() {
        let root = parse(
            r#"(kicad_pcb
                (footprint "A" (property "Reference" "R1"))
                (footprint "B" (property "Reference" "C7")))"#,
        )
        .unwrap();
        assert_eq!(footprint_index(root.children(), "C7"), Some(1));
        assert_eq!(footprint_index(root.children(), "R9"), None);
    }
}
