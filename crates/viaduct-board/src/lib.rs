//! Typed models and extractors for KiCad board and schematic documents.
//!
//! The extractors are pure read-only projections of a parsed
//! [`viaduct_sexpr::Document`] into value types that the routing, placement
//! and session layers consume. The [`state`] module holds the optional
//! process-wide "currently loaded board".

pub mod board;
pub mod model;
pub mod schematic;
pub mod state;

pub use board::{
    extract_board_outline, extract_board_summary, extract_footprints, extract_layers,
    extract_nets, extract_pad, extract_segments, extract_vias, extract_zones,
};
pub use model::{
    BoardSummary, BoundingBox, Footprint, Label, Layer, Net, Pad, Position, RatsnestPad,
    SchPin, SchSymbol, SchematicSummary, Segment, UnroutedNet, Via, Wire, Zone,
};
pub use schematic::{extract_labels, extract_schematic_summary, extract_symbols, extract_wires};
pub use state::StateError;
