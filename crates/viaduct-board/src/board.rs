//! Read-only extractors from parsed `.kicad_pcb` trees into typed models.
//!
//! Extraction is tolerant: missing optional fields fall back to defaults
//! and unknown children are ignored, never rejected.

use viaduct_sexpr::{Document, Node};

use crate::model::{
    BoardSummary, BoundingBox, Footprint, Layer, Net, Pad, Position, Segment, Via, Zone,
};

pub(crate) fn to_f64(val: Option<&str>) -> f64 {
    val.and_then(|v| v.parse().ok()).unwrap_or(0.0)
}

pub(crate) fn to_i32(val: Option<&str>) -> i32 {
    val.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Extract a [`Position`] from an `(at x y [angle])`-shaped node.
pub(crate) fn extract_position(node: Option<&Node>) -> Position {
    let Some(node) = node else {
        return Position::new(0.0, 0.0);
    };
    let vals = node.atom_values();
    Position::with_angle(
        to_f64(vals.first().copied()),
        to_f64(vals.get(1).copied()),
        to_f64(vals.get(2).copied()),
    )
}

/// All net declarations in the board.
pub fn extract_nets(doc: &Document) -> Vec<Net> {
    let mut nets = Vec::new();
    for node in doc.root.find_all("net") {
        let vals = node.atom_values();
        if vals.is_empty() {
            continue;
        }
        nets.push(Net {
            number: to_i32(vals.first().copied()),
            name: vals.get(1).map(|s| s.to_string()).unwrap_or_default(),
        });
    }
    nets
}

/// The board stackup, ordered as declared. Each child of `(layers ...)` is
/// itself a list whose head is the numeric layer id.
pub fn extract_layers(doc: &Document) -> Vec<Layer> {
    let Some(layers_node) = doc.root.find("layers") else {
        return Vec::new();
    };
    let mut layers = Vec::new();
    for child in layers_node.children() {
        let Some(num) = child.name() else { continue };
        let vals = child.atom_values();
        if vals.len() < 2 {
            continue;
        }
        layers.push(Layer {
            number: to_i32(Some(num)),
            name: vals[0].to_string(),
            layer_type: vals[1].to_string(),
            user_name: vals.get(2).map(|s| s.to_string()),
        });
    }
    layers
}

/// Extract a [`Pad`] from a `(pad ...)` node.
pub fn extract_pad(pad_node: &Node) -> Pad {
    let vals = pad_node.atom_values();

    let size = pad_node
        .find("size")
        .map(|n| {
            let sv = n.atom_values();
            (to_f64(sv.first().copied()), to_f64(sv.get(1).copied()))
        })
        .unwrap_or((0.0, 0.0));

    let layers = pad_node
        .find("layers")
        .map(|n| n.atom_values().iter().map(|s| s.to_string()).collect())
        .unwrap_or_default();

    let (net_number, net_name) = match pad_node.find("net") {
        Some(net) => {
            let nv = net.atom_values();
            (
                nv.first().and_then(|v| v.parse().ok()),
                nv.get(1).map(|s| s.to_string()),
            )
        }
        None => (None, None),
    };

    Pad {
        number: vals.first().map(|s| s.to_string()).unwrap_or_default(),
        pad_type: vals.get(1).map(|s| s.to_string()).unwrap_or_default(),
        shape: vals.get(2).map(|s| s.to_string()).unwrap_or_default(),
        position: extract_position(pad_node.find("at")),
        size,
        layers,
        net_number,
        net_name,
    }
}

/// All footprints placed on the board.
pub fn extract_footprints(doc: &Document) -> Vec<Footprint> {
    let mut footprints = Vec::new();
    for fp_node in doc.root.find_all("footprint") {
        let mut reference = String::new();
        let mut value = String::new();
        let mut description = String::new();
        for prop in fp_node.find_all("property") {
            let vals = prop.atom_values();
            let prop_val = vals.get(1).map(|s| s.to_string()).unwrap_or_default();
            match vals.first().copied() {
                Some("Reference") => reference = prop_val,
                Some("Value") => value = prop_val,
                Some("Description") => description = prop_val,
                _ => {}
            }
        }

        footprints.push(Footprint {
            library: fp_node.first_value().unwrap_or("").to_string(),
            reference,
            value,
            position: extract_position(fp_node.find("at")),
            layer: fp_node
                .find("layer")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            pads: fp_node.find_all("pad").into_iter().map(extract_pad).collect(),
            uuid: fp_node
                .find("uuid")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            description,
        });
    }
    footprints
}

/// All copper trace segments.
pub fn extract_segments(doc: &Document) -> Vec<Segment> {
    let mut segments = Vec::new();
    for seg_node in doc.root.find_all("segment") {
        segments.push(Segment {
            start: extract_position(seg_node.find("start")),
            end: extract_position(seg_node.find("end")),
            width: to_f64(seg_node.find("width").and_then(|n| n.first_value())),
            layer: seg_node
                .find("layer")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            net_number: to_i32(seg_node.find("net").and_then(|n| n.first_value())),
        });
    }
    segments
}

/// All vias.
pub fn extract_vias(doc: &Document) -> Vec<Via> {
    let mut vias = Vec::new();
    for via_node in doc.root.find_all("via") {
        let layers = via_node
            .find("layers")
            .map(|n| {
                let lv = n.atom_values();
                (
                    lv.first().map(|s| s.to_string()).unwrap_or_default(),
                    lv.get(1).map(|s| s.to_string()).unwrap_or_default(),
                )
            })
            .unwrap_or_default();
        vias.push(Via {
            position: extract_position(via_node.find("at")),
            size: to_f64(via_node.find("size").and_then(|n| n.first_value())),
            drill: to_f64(via_node.find("drill").and_then(|n| n.first_value())),
            layers,
            net_number: to_i32(via_node.find("net").and_then(|n| n.first_value())),
        });
    }
    vias
}

/// All copper zones with their polygon outlines.
pub fn extract_zones(doc: &Document) -> Vec<Zone> {
    let mut zones = Vec::new();
    for zone_node in doc.root.find_all("zone") {
        let mut polygon = Vec::new();
        if let Some(poly) = zone_node.find("polygon") {
            if let Some(pts) = poly.find("pts") {
                for xy in pts.find_all("xy") {
                    let vals = xy.atom_values();
                    polygon.push((to_f64(vals.first().copied()), to_f64(vals.get(1).copied())));
                }
            }
        }
        zones.push(Zone {
            net_number: to_i32(zone_node.find("net").and_then(|n| n.first_value())),
            net_name: zone_node
                .find("net_name")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            layer: zone_node
                .find("layer")
                .and_then(|n| n.first_value())
                .unwrap_or("")
                .to_string(),
            polygon,
            min_thickness: to_f64(zone_node.find("min_thickness").and_then(|n| n.first_value())),
            priority: to_i32(zone_node.find("priority").and_then(|n| n.first_value())),
        });
    }
    zones
}

/// Bounding box of the `Edge.Cuts` outline, or `None` when the board has
/// no outline graphics. Scans `start`, `end` and `center` points of lines,
/// rectangles, arcs and circles.
pub fn extract_board_outline(doc: &Document) -> Option<BoundingBox> {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    let mut found = false;

    for node_name in ["gr_line", "gr_rect", "gr_arc", "gr_circle"] {
        for node in doc.root.find_all(node_name) {
            let on_edge = node
                .find("layer")
                .and_then(|n| n.first_value())
                .is_some_and(|l| l == "Edge.Cuts");
            if !on_edge {
                continue;
            }
            found = true;
            for pt_name in ["start", "end", "center"] {
                if let Some(pt) = node.find(pt_name) {
                    let vals = pt.atom_values();
                    if vals.len() >= 2 {
                        let x = to_f64(vals.first().copied());
                        let y = to_f64(vals.get(1).copied());
                        min_x = min_x.min(x);
                        min_y = min_y.min(y);
                        max_x = max_x.max(x);
                        max_y = max_y.max(y);
                    }
                }
            }
        }
    }

    found.then(|| BoundingBox::new(min_x, min_y, max_x, max_y))
}

/// Full board summary: header data plus the entity lists and counts.
pub fn extract_board_summary(doc: &Document) -> BoardSummary {
    let nets = extract_nets(doc);
    let layers = extract_layers(doc);
    let footprints = extract_footprints(doc);
    let segments = extract_segments(doc);
    let bounding_box = extract_board_outline(doc);

    let copper_layers = layers
        .iter()
        .filter(|l| l.layer_type == "signal")
        .map(|l| l.name.clone())
        .collect();

    let title = doc
        .root
        .find("title_block")
        .and_then(|tb| tb.find("title"))
        .and_then(|t| t.first_value())
        .unwrap_or("")
        .to_string();

    let thickness = doc
        .root
        .find("general")
        .and_then(|g| g.find("thickness"))
        .and_then(|t| t.first_value())
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.6);

    BoardSummary {
        title,
        version: doc
            .root
            .find("version")
            .and_then(|n| n.first_value())
            .unwrap_or("")
            .to_string(),
        generator: doc
            .root
            .find("generator")
            .and_then(|n| n.first_value())
            .unwrap_or("")
            .to_string(),
        thickness,
        layer_count: layers.len(),
        copper_layers,
        net_count: nets.len(),
        footprint_count: footprints.len(),
        segment_count: segments.len(),
        nets,
        layers,
        bounding_box,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOARD: &str = r#"(kicad_pcb
  (version 20241229)
  (generator "pcbnew")
  (general (thickness 1.6))
  (layers
    (0 "F.Cu" signal)
    (2 "B.Cu" signal)
    (37 "F.SilkS" user "F.Silkscreen"))
  (net 0 "")
  (net 1 "GND")
  (net 2 "VCC")
  (footprint "Capacitor_SMD:C_0805_2012Metric"
    (layer "F.Cu")
    (uuid "abc-123")
    (at 14 5.5 90)
    (property "Reference" "C7")
    (property "Value" "10uF")
    (pad "1" smd roundrect (at -0.95 0) (size 1.0 1.45) (layers "F.Cu" "F.Paste" "F.Mask") (net 1 "GND"))
    (pad "2" smd roundrect (at 0.95 0) (size 1.0 1.45) (layers "F.Cu" "F.Paste" "F.Mask") (net 2 "VCC")))
  (segment (start 10 10) (end 20 10) (width 0.25) (layer "F.Cu") (net 1) (uuid "seg-1"))
  (via (at 15 10) (size 0.8) (drill 0.4) (layers "F.Cu" "B.Cu") (net 1) (uuid "via-1"))
  (zone (net 1) (net_name "GND") (layer "B.Cu") (uuid "z-1")
    (min_thickness 0.25)
    (priority 1)
    (polygon (pts (xy 0 0) (xy 30 0) (xy 30 30) (xy 0 30))))
  (gr_line (start 0 0) (end 30 0) (layer "Edge.Cuts") (uuid "e1"))
  (gr_line (start 30 0) (end 30 30) (layer "Edge.Cuts") (uuid "e2"))
  (gr_line (start 30 30) (end 0 30) (layer "Edge.Cuts") (uuid "e3"))
  (gr_line (start 0 30) (end 0 0) (layer "Edge.Cuts") (uuid "e4")))
"#;

    fn board() -> Document {
        Document::from_text("test.kicad_pcb", BOARD).unwrap()
    }

    #[test]
    fn nets_and_layers() {
        let doc = board();
        let nets = extract_nets(&doc);
        assert_eq!(nets.len(), 3);
        assert_eq!(nets[0], Net { number: 0, name: String::new() });
        assert_eq!(nets[2], Net { number: 2, name: "VCC".to_string() });

        let layers = extract_layers(&doc);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].name, "F.Cu");
        assert_eq!(layers[0].layer_type, "signal");
        assert_eq!(layers[2].user_name.as_deref(), Some("F.Silkscreen"));
    }

    #[test]
    fn footprints_with_pads() {
        let doc = board();
        let fps = extract_footprints(&doc);
        assert_eq!(fps.len(), 1);
        let fp = &fps[0];
        assert_eq!(fp.reference, "C7");
        assert_eq!(fp.value, "10uF");
        assert_eq!(fp.library, "Capacitor_SMD:C_0805_2012Metric");
        assert_eq!(fp.position, Position::with_angle(14.0, 5.5, 90.0));
        assert_eq!(fp.layer, "F.Cu");
        assert_eq!(fp.pads.len(), 2);
        assert_eq!(fp.pads[0].number, "1");
        assert_eq!(fp.pads[0].net_number, Some(1));
        assert_eq!(fp.pads[0].net_name.as_deref(), Some("GND"));
        assert_eq!(fp.pads[1].size, (1.0, 1.45));
    }

    #[test]
    fn segments_vias_zones() {
        let doc = board();
        let segments = extract_segments(&doc);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].width, 0.25);
        assert_eq!(segments[0].net_number, 1);

        let vias = extract_vias(&doc);
        assert_eq!(vias.len(), 1);
        assert_eq!(vias[0].layers, ("F.Cu".to_string(), "B.Cu".to_string()));

        let zones = extract_zones(&doc);
        assert_eq!(zones.len(), 1);
        assert_eq!(zones[0].polygon.len(), 4);
        assert_eq!(zones[0].min_thickness, 0.25);
        assert_eq!(zones[0].priority, 1);
    }

    #[test]
    fn board_outline_bbox() {
        let doc = board();
        let bbox = extract_board_outline(&doc).unwrap();
        assert_eq!(bbox, BoundingBox::new(0.0, 0.0, 30.0, 30.0));
        assert_eq!(bbox.width(), 30.0);
        assert_eq!(bbox.center(), Position::new(15.0, 15.0));
    }

    #[test]
    fn no_outline_means_none() {
        let doc = Document::from_text("t.kicad_pcb", "(kicad_pcb (version 1))").unwrap();
        assert!(extract_board_outline(&doc).is_none());
    }

    #[test]
    fn summary_counts() {
        let doc = board();
        let summary = extract_board_summary(&doc);
        assert_eq!(summary.version, "20241229");
        assert_eq!(summary.generator, "pcbnew");
        assert_eq!(summary.thickness, 1.6);
        assert_eq!(summary.copper_layers, vec!["F.Cu", "B.Cu"]);
        assert_eq!(summary.footprint_count, 1);
        assert_eq!(summary.net_count, 3);
        assert!(summary.bounding_box.is_some());
    }

    #[test]
    fn summary_serializes_for_reporting() {
        let doc = board();
        let summary = extract_board_summary(&doc);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["copper_layers"][0], "F.Cu");
        assert_eq!(json["layers"][2]["user_name"], "F.Silkscreen");
        assert_eq!(json["layers"][0]["type"], "signal");
        // Zero angles are omitted from serialized positions.
        let fp_json = serde_json::to_value(&extract_footprints(&doc)[0]).unwrap();
        assert_eq!(fp_json["position"]["angle"], 90.0);
        assert!(fp_json["pads"][0]["position"].get("angle").is_none());
    }

    #[test]
    fn tolerates_missing_fields() {
        let doc = Document::from_text(
            "t.kicad_pcb",
            r#"(kicad_pcb (footprint "X" (pad "1" smd rect)))"#,
        )
        .unwrap();
        let fps = extract_footprints(&doc);
        assert_eq!(fps.len(), 1);
        assert_eq!(fps[0].reference, "");
        assert_eq!(fps[0].position, Position::new(0.0, 0.0));
        assert_eq!(fps[0].pads[0].size, (0.0, 0.0));
        assert!(fps[0].pads[0].net_number.is_none());
    }
}
