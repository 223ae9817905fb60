//! Typed value models extracted from KiCad documents.

use serde::Serialize;

/// 2D position in board coordinates (mm), with an optional rotation angle
/// in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "is_zero")]
    pub angle: f64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y, angle: 0.0 }
    }

    pub fn with_angle(x: f64, y: f64, angle: f64) -> Self {
        Position { x, y, angle }
    }
}

/// Axis-aligned bounding box (mm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Position {
        Position::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }
}

/// A net declaration. Net 0 is KiCad's "no net".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Net {
    pub number: i32,
    pub name: String,
}

/// One layer in the board stackup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Layer {
    pub number: i32,
    pub name: String,
    /// `signal` or `user`.
    #[serde(rename = "type")]
    pub layer_type: String,
    /// User-facing alias, e.g. `F.Silkscreen` for `F.SilkS`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
}

/// A pad on a footprint. The position is relative to the footprint origin;
/// rotate by the footprint angle for absolute coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pad {
    pub number: String,
    /// `smd`, `thru_hole`, `np_thru_hole`, `connect`.
    #[serde(rename = "type")]
    pub pad_type: String,
    pub shape: String,
    pub position: Position,
    pub size: (f64, f64),
    /// Layer names, possibly including the `*.Cu` wildcard.
    pub layers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_name: Option<String>,
}

/// A component footprint placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footprint {
    /// Library id, e.g. `Capacitor_SMD:C_0805_2012Metric`.
    pub library: String,
    pub reference: String,
    pub value: String,
    pub position: Position,
    pub layer: String,
    pub pads: Vec<Pad>,
    pub uuid: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A copper trace segment on a single layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub start: Position,
    pub end: Position,
    pub width: f64,
    pub layer: String,
    pub net_number: i32,
}

/// A plated hole connecting copper layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Via {
    pub position: Position,
    pub size: f64,
    pub drill: f64,
    pub layers: (String, String),
    pub net_number: i32,
}

/// A filled copper region bound to a net.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Zone {
    pub net_number: i32,
    pub net_name: String,
    pub layer: String,
    pub polygon: Vec<(f64, f64)>,
    pub min_thickness: f64,
    pub priority: i32,
}

/// High-level summary of a PCB board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    pub title: String,
    pub version: String,
    pub generator: String,
    pub thickness: f64,
    pub layer_count: usize,
    pub copper_layers: Vec<String>,
    pub net_count: usize,
    pub footprint_count: usize,
    pub segment_count: usize,
    pub nets: Vec<Net>,
    pub layers: Vec<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

/// One pad of an unrouted net, in absolute board coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatsnestPad {
    pub reference: String,
    pub pad: String,
    pub x: f64,
    pub y: f64,
}

/// A net with no copper yet; the batch router's unit of work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnroutedNet {
    pub net_number: i32,
    pub net_name: String,
    pub pad_count: usize,
    pub pads: Vec<RatsnestPad>,
}

/// A schematic symbol pin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchPin {
    pub number: String,
    pub uuid: String,
}

/// A placed symbol instance in a schematic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchSymbol {
    pub lib_id: String,
    pub reference: String,
    pub value: String,
    pub position: Position,
    pub unit: i32,
    pub uuid: String,
    pub in_bom: bool,
    pub on_board: bool,
    pub pins: Vec<SchPin>,
    pub properties: std::collections::BTreeMap<String, String>,
}

/// A schematic wire segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wire {
    pub start: Position,
    pub end: Position,
    pub uuid: String,
}

/// A net label (local or global).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Label {
    pub name: String,
    pub position: Position,
    pub uuid: String,
}

/// High-level summary of a schematic sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchematicSummary {
    pub version: String,
    pub generator: String,
    pub uuid: String,
    pub paper: String,
    pub symbol_count: usize,
    pub wire_count: usize,
    pub label_count: usize,
    pub lib_symbol_count: usize,
    pub symbols: Vec<SchSymbol>,
    pub wires: Vec<Wire>,
    pub labels: Vec<Label>,
}
