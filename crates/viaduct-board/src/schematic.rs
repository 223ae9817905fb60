//! Extractors for `.kicad_sch` schematic sheets.

use std::collections::BTreeMap;

use viaduct_sexpr::{Document, Node};

use crate::board::extract_position;
use crate::model::{Label, Position, SchPin, SchSymbol, SchematicSummary, Wire};

fn yes_no(node: Option<&Node>, default: bool) -> bool {
    match node.and_then(|n| n.first_value()) {
        Some("yes") => true,
        Some("no") => false,
        _ => default,
    }
}

/// All placed symbol instances. Library-symbol definitions inside
/// `lib_symbols` have no `lib_id` child and are skipped.
pub fn extract_symbols(doc: &Document) -> Vec<SchSymbol> {
    let mut symbols = Vec::new();
    for sym_node in doc.root.find_all("symbol") {
        let Some(lib_id) = sym_node.find("lib_id").and_then(|n| n.first_value()) else {
            continue;
        };

        let mut reference = String::new();
        let mut value = String::new();
        let mut properties = BTreeMap::new();
        for prop in sym_node.find_all("property") {
            let vals = prop.atom_values();
            let Some(name) = vals.first() else { continue };
            let prop_val = vals.get(1).map(|s| s.to_string()).unwrap_or_default();
            match *name {
                "Reference" => reference = prop_val.clone(),
                "Value" => value = prop_val.clone(),
                _ => {}
            }
            properties.insert(name.to_string(), prop_val);
        }

        let pins = sym_node
            .find_all("pin")
            .into_iter()
            .map(|pin| SchPin {
                number: pin.first_value().unwrap_or("").to_string(),
                uuid: pin
                    .find("uuid")
                    .and_then(|n| n.first_value())
                    .unwrap_or("")
                    .to_string(),
            })
            .collect();

        symbols.push(SchSymbol {
            lib_id: lib_id.to_string(),
            reference,
            value,
            position: extract_position(sym_node.find("at")),
            unit: sym_node
                .find("unit")
                .and_then(|n| n.first_value())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            uuid: sym_node
                .find("uuid")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            in_bom: yes_no(sym_node.find("in_bom"), true),
            on_board: yes_no(sym_node.find("on_board"), true),
            pins,
            properties,
        });
    }
    symbols
}

/// All wire segments in the sheet.
pub fn extract_wires(doc: &Document) -> Vec<Wire> {
    let mut wires = Vec::new();
    for wire_node in doc.root.find_all("wire") {
        let Some(pts) = wire_node.find("pts") else {
            continue;
        };
        let xy = pts.find_all("xy");
        if xy.len() < 2 {
            continue;
        }
        let start_vals = xy[0].atom_values();
        let end_vals = xy[1].atom_values();
        wires.push(Wire {
            start: Position::new(
                crate::board::to_f64(start_vals.first().copied()),
                crate::board::to_f64(start_vals.get(1).copied()),
            ),
            end: Position::new(
                crate::board::to_f64(end_vals.first().copied()),
                crate::board::to_f64(end_vals.get(1).copied()),
            ),
            uuid: wire_node
                .find("uuid")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
        });
    }
    wires
}

/// All net labels, local and global.
pub fn extract_labels(doc: &Document) -> Vec<Label> {
    let mut labels = Vec::new();
    for head in ["label", "global_label"] {
        for node in doc.root.find_all(head) {
            labels.push(Label {
                name: node.first_value().unwrap_or("").to_string(),
                position: extract_position(node.find("at")),
                uuid: node
                    .find("uuid")
                    .and_then(|n| n.first_value())
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }
    labels
}

/// Full schematic summary.
pub fn extract_schematic_summary(doc: &Document) -> SchematicSummary {
    let symbols = extract_symbols(doc);
    let wires = extract_wires(doc);
    let labels = extract_labels(doc);
    let lib_symbol_count = doc
        .root
        .find("lib_symbols")
        .map(|n| n.find_all("symbol").len())
        .unwrap_or(0);

    let first = |name: &str| -> String {
        doc.root
            .find(name)
            .and_then(|n| n.first_value())
            .unwrap_or("")
            .to_string()
    };

    SchematicSummary {
        version: first("version"),
        generator: first("generator"),
        uuid: first("uuid"),
        paper: first("paper"),
        symbol_count: symbols.len(),
        wire_count: wires.len(),
        label_count: labels.len(),
        lib_symbol_count,
        symbols,
        wires,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMATIC: &str = r#"(kicad_sch
  (version 20250114)
  (generator "eeschema")
  (uuid "sheet-uuid")
  (paper "A4")
  (lib_symbols
    (symbol "Device:R" (pin_numbers hide)))
  (symbol
    (lib_id "Device:R")
    (at 100 50 0)
    (unit 1)
    (in_bom yes)
    (on_board yes)
    (uuid "r1-uuid")
    (property "Reference" "R1")
    (property "Value" "10k")
    (pin "1" (uuid "p1"))
    (pin "2" (uuid "p2")))
  (wire (pts (xy 100 50) (xy 120 50)) (uuid "w1"))
  (label "SDA" (at 120 50 0) (uuid "l1"))
  (global_label "VBUS" (at 10 10 0) (uuid "g1")))
"#;

    fn schematic() -> Document {
        Document::from_text("test.kicad_sch", SCHEMATIC).unwrap()
    }

    #[test]
    fn symbols_skip_lib_definitions() {
        let symbols = extract_symbols(&schematic());
        assert_eq!(symbols.len(), 1);
        let sym = &symbols[0];
        assert_eq!(sym.lib_id, "Device:R");
        assert_eq!(sym.reference, "R1");
        assert_eq!(sym.value, "10k");
        assert!(sym.in_bom);
        assert!(sym.on_board);
        assert_eq!(sym.pins.len(), 2);
        assert_eq!(sym.properties.get("Value").map(String::as_str), Some("10k"));
    }

    #[test]
    fn wires_and_labels() {
        let doc = schematic();
        let wires = extract_wires(&doc);
        assert_eq!(wires.len(), 1);
        assert_eq!(wires[0].start, Position::new(100.0, 50.0));
        assert_eq!(wires[0].end, Position::new(120.0, 50.0));

        let labels = extract_labels(&doc);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].name, "SDA");
        assert_eq!(labels[1].name, "VBUS");
    }

    #[test]
    fn summary() {
        let summary = extract_schematic_summary(&schematic());
        assert_eq!(summary.version, "20250114");
        assert_eq!(summary.symbol_count, 1);
        assert_eq!(summary.wire_count, 1);
        assert_eq!(summary.label_count, 2);
        assert_eq!(summary.lib_symbol_count, 1);
        assert_eq!(summary.paper, "A4");
    }
}
