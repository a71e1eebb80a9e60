// src/state/mod.rs
//
// Declarative document layer.
//
// Structures here represent what the user edits: patches, their nodes,
// and the bank that holds them. The runtime never mutates any of this;
// compilation copies what it needs into fresh voice trees.
//
// Key principles:
// - Mutations validate first, then touch state. No partial edits.
// - Connections are owned by the reading side, as input parameters.
// - Every successful mutation bumps the owning patch's revision.

mod bank;
mod event;
mod node;
mod param;
mod patch;

pub use bank::*;
pub use event::*;
pub use node::*;
pub use param::*;
pub use patch::*;
