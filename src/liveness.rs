// src/liveness.rs
//
// Output reachability for a patch.
//
// A node is live when some chain of in-use connections leads from it
// to the output node. Everything else is orphaned: still part of the
// document, still editable, just not audible. The editor reads this to
// dim orphaned nodes.

use std::collections::HashSet;

use crate::state::{NodeId, Patch, PatchId};

/// The live node and edge sets of one patch revision.
#[derive(Debug, Clone, Default)]
pub struct Liveness {
    live_nodes: HashSet<NodeId>,
    live_edges: HashSet<(NodeId, &'static str)>,
}

impl Liveness {
    /// Walk the patch once, from the output node backwards along every
    /// connected, in-use input. Each node enters the live set at most
    /// once, so the pass is linear in the live subgraph.
    pub fn compute(patch: &Patch) -> Self {
        let mut live_nodes: HashSet<NodeId> = HashSet::new();
        let mut live_edges: HashSet<(NodeId, &'static str)> = HashSet::new();

        let Some(output) = patch.output_node() else {
            return Self {
                live_nodes,
                live_edges,
            };
        };

        let mut pending = vec![output];
        while let Some(id) = pending.pop() {
            if !live_nodes.insert(id) {
                continue;
            }
            let Some(node) = patch.node(id) else {
                continue;
            };
            for (name, target) in node.connected_inputs() {
                if !node.input_in_use(name) {
                    continue;
                }
                if patch.contains(target) {
                    live_edges.insert((id, name));
                    pending.push(target);
                }
            }
        }

        Self {
            live_nodes,
            live_edges,
        }
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.live_nodes.contains(&id)
    }

    /// Whether the connection stored in `param` on `node` was followed
    /// during the walk.
    pub fn edge_is_live(&self, node: NodeId, param: &str) -> bool {
        self.live_edges
            .iter()
            .any(|(n, p)| *n == node && *p == param)
    }

    pub fn live_count(&self) -> usize {
        self.live_nodes.len()
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.live_nodes.iter().copied()
    }

    /// Nodes present in the patch but unreachable from the output.
    pub fn orphaned<'a>(&'a self, patch: &'a Patch) -> impl Iterator<Item = NodeId> + 'a {
        patch
            .nodes()
            .map(|n| n.id())
            .filter(move |id| !self.live_nodes.contains(id))
    }
}

/// Debounced liveness.
///
/// Edits mark the patch dirty by bumping its revision; the host calls
/// `refresh` once per tick. However many edits landed in between, the
/// walk runs at most once per refresh.
#[derive(Debug, Default)]
pub struct LivenessCache {
    seen: Option<(PatchId, u64)>,
    current: Liveness,
    recomputes: u64,
}

impl LivenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute if the patch changed since the last refresh, then
    /// return the current result.
    pub fn refresh(&mut self, patch: &Patch) -> &Liveness {
        let stamp = (patch.id(), patch.revision());
        if self.seen != Some(stamp) {
            self.current = Liveness::compute(patch);
            self.seen = Some(stamp);
            self.recomputes += 1;
        }
        &self.current
    }

    /// The most recent result, possibly stale.
    pub fn current(&self) -> &Liveness {
        &self.current
    }

    /// Force the next `refresh` to recompute.
    pub fn invalidate(&mut self) {
        self.seen = None;
    }

    /// How many times `refresh` actually walked the patch.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }
}
