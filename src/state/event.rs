// src/state/event.rs

use super::node::NodeId;
use super::patch::PatchId;

/// Structural change notification queued on the patch that changed.
///
/// The editor drains these with `Patch::take_events` after each round
/// of mutations. Value edits do not appear here; the editor already
/// knows its own slider moves, and the revision counter covers cache
/// invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchEvent {
    NodeAdded {
        node: NodeId,
    },
    NodeRemoved {
        node: NodeId,
    },
    Rewired {
        source: NodeId,
        dest: NodeId,
        param: &'static str,
    },
    Disconnected {
        node: NodeId,
        param: &'static str,
    },
    PatchRefSet {
        node: NodeId,
        param: &'static str,
        target: Option<PatchId>,
    },
}
