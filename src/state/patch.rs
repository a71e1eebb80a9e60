// src/state/patch.rs
//
// The patch document: an ordered set of nodes plus the connections
// stored inside their input parameters.
//
// Every mutation validates first and only then touches state, so a
// returned error means nothing changed. Successful mutations bump the
// revision counter; structural ones additionally queue a PatchEvent.

use std::collections::HashSet;

use indexmap::IndexMap;
use uuid::Uuid;

use super::event::PatchEvent;
use super::node::{Category, NodeDef, NodeId, NodeKind};
use super::param::{ParamKind, ParamValue};
use crate::error::GraphError;

/// Unique identifier for a patch. Stable across save/load.
pub type PatchId = Uuid;

#[derive(Debug, Clone)]
pub struct Patch {
    id: PatchId,

    pub name: String,

    /// Palette grouping when this patch is embedded elsewhere.
    pub category: Category,

    nodes: IndexMap<NodeId, NodeDef>,
    output: Option<NodeId>,
    key_gate: Option<NodeId>,

    /// Bumped on every successful mutation. Drives cache invalidation.
    revision: u64,

    events: Vec<PatchEvent>,
}

impl Patch {
    /// Create a patch with its output node already in place. This is
    /// the only path that establishes an output; `delete_node` refuses
    /// to remove it.
    pub fn new(name: impl Into<String>) -> Self {
        let output = NodeDef::new(NodeKind::Output);
        let output_id = output.id();

        let mut nodes = IndexMap::new();
        nodes.insert(output_id, output);

        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: Category::Voice,
            nodes,
            output: Some(output_id),
            key_gate: None,
            revision: 0,
            events: Vec::new(),
        }
    }

    /// Reassemble a patch from validated pieces (persistence restore).
    pub(crate) fn from_parts(
        id: PatchId,
        name: String,
        category: Category,
        nodes: IndexMap<NodeId, NodeDef>,
        output: Option<NodeId>,
        key_gate: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            name,
            category,
            nodes,
            output,
            key_gate,
            revision: 0,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> PatchId {
        self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeDef> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> + '_ {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn output_node(&self) -> Option<NodeId> {
        self.output
    }

    pub fn key_gate_node(&self) -> Option<NodeId> {
        self.key_gate
    }

    /// Drain queued structural change notifications.
    pub fn take_events(&mut self) -> Vec<PatchEvent> {
        std::mem::take(&mut self.events)
    }

    fn touch(&mut self, event: PatchEvent) {
        self.revision += 1;
        self.events.push(event);
    }

    /// Add a node, keeping the output and key gate singletons.
    pub fn add_node(&mut self, def: NodeDef) -> Result<NodeId, GraphError> {
        let id = def.id();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode { node: id });
        }
        if def.kind() == NodeKind::Output && self.output.is_some() {
            return Err(GraphError::OutputExists);
        }
        if def.kind() == NodeKind::KeyGate && self.key_gate.is_some() {
            return Err(GraphError::KeyGateExists);
        }

        match def.kind() {
            NodeKind::Output => self.output = Some(id),
            NodeKind::KeyGate => self.key_gate = Some(id),
            _ => {}
        }
        self.nodes.insert(id, def);
        self.touch(PatchEvent::NodeAdded { node: id });
        Ok(id)
    }

    /// Delete a node and clear every surviving reference to it. The
    /// output node cannot be deleted; deleting the key gate frees its
    /// singleton slot.
    pub fn delete_node(&mut self, id: NodeId) -> Result<NodeDef, GraphError> {
        if self.output == Some(id) {
            return Err(GraphError::OutputUndeletable);
        }
        let removed = self
            .nodes
            .shift_remove(&id)
            .ok_or(GraphError::UnknownNode { node: id })?;

        if self.key_gate == Some(id) {
            self.key_gate = None;
        }

        let mut cleared: Vec<(NodeId, &'static str)> = Vec::new();
        for node in self.nodes.values_mut() {
            for name in node.input_names() {
                if node.input_ref(name) == Some(id) {
                    node.set_input(name, None);
                    cleared.push((node.id(), name));
                }
            }
        }
        for (node, param) in cleared {
            self.touch(PatchEvent::Disconnected { node, param });
        }

        self.touch(PatchEvent::NodeRemoved { node: id });
        Ok(removed)
    }

    /// Store `source` into the `param` input of `dest`.
    ///
    /// Preconditions, all checked before anything mutates: both nodes
    /// exist, `param` is an input on `dest`, `source` produces a
    /// signal, and the new edge cannot close a loop.
    pub fn rewire(&mut self, source: NodeId, dest: NodeId, param: &str) -> Result<(), GraphError> {
        if source == dest {
            return Err(GraphError::SelfConnection { node: source });
        }

        let dest_node = self
            .nodes
            .get(&dest)
            .ok_or(GraphError::UnknownNode { node: dest })?;
        let name = match dest_node.param_entry(param) {
            None => {
                return Err(GraphError::UnknownParam {
                    node: dest,
                    param: param.to_string(),
                });
            }
            Some((key, value)) => {
                if value.kind() != ParamKind::Input {
                    return Err(GraphError::NotAnInput {
                        node: dest,
                        param: param.to_string(),
                    });
                }
                key
            }
        };

        let source_node = self
            .nodes
            .get(&source)
            .ok_or(GraphError::UnknownNode { node: source })?;
        if !source_node.has_output() {
            return Err(GraphError::NoOutputSignal { node: source });
        }

        if self.upstream_contains(source, dest) {
            return Err(GraphError::WouldCycle { source, dest });
        }

        if let Some(node) = self.nodes.get_mut(&dest) {
            node.set_input(name, Some(source));
        }
        self.touch(PatchEvent::Rewired {
            source,
            dest,
            param: name,
        });
        Ok(())
    }

    /// Clear the `param` input on `node`.
    pub fn disconnect(&mut self, node: NodeId, param: &str) -> Result<(), GraphError> {
        let def = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        let name = match def.param_entry(param) {
            None => {
                return Err(GraphError::UnknownParam {
                    node,
                    param: param.to_string(),
                });
            }
            Some((key, value)) => {
                if value.kind() != ParamKind::Input {
                    return Err(GraphError::NotAnInput {
                        node,
                        param: param.to_string(),
                    });
                }
                key
            }
        };

        if let Some(def) = self.nodes.get_mut(&node) {
            def.set_input(name, None);
        }
        self.touch(PatchEvent::Disconnected { node, param: name });
        Ok(())
    }

    /// Set a plain value parameter. Inputs and patch references are
    /// rejected here; they go through `rewire`, `disconnect` and
    /// `PatchBank::set_patch_ref`.
    pub fn set_param(
        &mut self,
        node: NodeId,
        param: &str,
        value: ParamValue,
    ) -> Result<(), GraphError> {
        let def = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode { node })?;
        let current = def
            .param(param)
            .ok_or_else(|| GraphError::UnknownParam {
                node,
                param: param.to_string(),
            })?;

        match current.kind() {
            ParamKind::Input | ParamKind::PatchRef => {
                return Err(GraphError::ReservedParam {
                    node,
                    param: param.to_string(),
                });
            }
            kind if kind != value.kind() => {
                return Err(GraphError::TypeMismatch {
                    node,
                    param: param.to_string(),
                    expected: kind,
                    got: value.kind(),
                });
            }
            _ => {}
        }

        if let Some(def) = self.nodes.get_mut(&node) {
            if let Some(slot) = def.param_slot_mut(param) {
                *slot = value;
            }
        }
        self.revision += 1;
        Ok(())
    }

    /// True when `needle` is `start` itself or appears anywhere in the
    /// chain of inputs feeding `start`. Follows every stored
    /// connection, including ones the node currently ignores, and
    /// tolerates references to missing nodes.
    pub fn upstream_contains(&self, start: NodeId, needle: NodeId) -> bool {
        let mut visited: HashSet<NodeId> = HashSet::new();
        let mut pending = vec![start];

        while let Some(id) = pending.pop() {
            if id == needle {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                for (_, target) in node.connected_inputs() {
                    pending.push(target);
                }
            }
        }
        false
    }

    /// Store a patch reference without bank-level checks. Callers go
    /// through `PatchBank::set_patch_ref`, which validates the target.
    pub(crate) fn store_patch_ref(
        &mut self,
        node: NodeId,
        name: &'static str,
        target: Option<PatchId>,
    ) {
        if let Some(def) = self.nodes.get_mut(&node) {
            if let Some(slot) = def.param_slot_mut(name) {
                *slot = ParamValue::PatchRef(target);
            }
        }
        self.touch(PatchEvent::PatchRefSet {
            node,
            param: name,
            target,
        });
    }

    /// Clear every patch reference pointing at `target`. Used when a
    /// patch is removed from the bank.
    pub(crate) fn clear_refs_to(&mut self, target: PatchId) {
        let mut cleared: Vec<(NodeId, &'static str)> = Vec::new();
        for def in self.nodes.values_mut() {
            for name in def.patch_ref_names() {
                if def.param(name).and_then(ParamValue::as_patch_ref) == Some(target) {
                    if let Some(slot) = def.param_slot_mut(name) {
                        *slot = ParamValue::PatchRef(None);
                    }
                    cleared.push((def.id(), name));
                }
            }
        }
        for (node, param) in cleared {
            self.touch(PatchEvent::PatchRefSet {
                node,
                param,
                target: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_of(patch: &Patch) -> NodeId {
        patch.output_node().unwrap()
    }

    #[test]
    fn test_new_patch_has_output() {
        let patch = Patch::new("init");
        assert_eq!(patch.node_count(), 1);
        let out = output_of(&patch);
        assert_eq!(patch.node(out).unwrap().kind(), NodeKind::Output);
        assert_eq!(patch.revision(), 0);
    }

    #[test]
    fn test_second_output_rejected() {
        let mut patch = Patch::new("p");
        let err = patch.add_node(NodeDef::new(NodeKind::Output)).unwrap_err();
        assert_eq!(err, GraphError::OutputExists);
        assert_eq!(patch.node_count(), 1);
    }

    #[test]
    fn test_key_gate_is_singleton() {
        let mut patch = Patch::new("p");
        let gate = patch.add_node(NodeDef::new(NodeKind::KeyGate)).unwrap();
        assert_eq!(patch.key_gate_node(), Some(gate));

        let err = patch.add_node(NodeDef::new(NodeKind::KeyGate)).unwrap_err();
        assert_eq!(err, GraphError::KeyGateExists);

        // Deleting the gate frees the slot.
        patch.delete_node(gate).unwrap();
        assert_eq!(patch.key_gate_node(), None);
        patch.add_node(NodeDef::new(NodeKind::KeyGate)).unwrap();
    }

    #[test]
    fn test_output_cannot_be_deleted() {
        let mut patch = Patch::new("p");
        let out = output_of(&patch);
        assert_eq!(patch.delete_node(out), Err(GraphError::OutputUndeletable));
        assert!(patch.contains(out));
    }

    #[test]
    fn test_rewire_and_events() {
        let mut patch = Patch::new("p");
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let out = output_of(&patch);
        patch.take_events();

        patch.rewire(osc, out, "in").unwrap();
        assert_eq!(patch.node(out).unwrap().input_ref("in"), Some(osc));
        assert_eq!(
            patch.take_events(),
            vec![PatchEvent::Rewired {
                source: osc,
                dest: out,
                param: "in",
            }]
        );
    }

    #[test]
    fn test_rewire_rejects_bad_targets() {
        let mut patch = Patch::new("p");
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let gain = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();
        let comment = patch.add_node(NodeDef::new(NodeKind::Comment)).unwrap();

        // Value parameter is not an input.
        assert!(matches!(
            patch.rewire(osc, gain, "amount"),
            Err(GraphError::NotAnInput { .. })
        ));
        // Unknown parameter name.
        assert!(matches!(
            patch.rewire(osc, gain, "nope"),
            Err(GraphError::UnknownParam { .. })
        ));
        // Comment produces no signal.
        assert_eq!(
            patch.rewire(comment, gain, "in"),
            Err(GraphError::NoOutputSignal { node: comment })
        );
        // Self connection.
        assert_eq!(
            patch.rewire(gain, gain, "in"),
            Err(GraphError::SelfConnection { node: gain })
        );
    }

    #[test]
    fn test_direct_cycle_rejected() {
        let mut patch = Patch::new("p");
        let a = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();
        let b = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();

        patch.rewire(b, a, "in").unwrap();
        let rev = patch.revision();

        let err = patch.rewire(a, b, "in").unwrap_err();
        assert_eq!(err, GraphError::WouldCycle { source: a, dest: b });
        // Failed rewire leaves the patch untouched.
        assert_eq!(patch.revision(), rev);
        assert!(patch.node(b).unwrap().input_ref("in").is_none());
    }

    #[test]
    fn test_chained_cycle_rejected() {
        let mut patch = Patch::new("p");
        let a = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();
        let b = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();
        let c = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();

        patch.rewire(b, a, "in").unwrap();
        patch.rewire(c, b, "in").unwrap();
        assert!(matches!(
            patch.rewire(a, c, "in"),
            Err(GraphError::WouldCycle { .. })
        ));
    }

    #[test]
    fn test_cycle_check_sees_muted_connections() {
        let mut patch = Patch::new("p");
        let mix = patch.add_node(NodeDef::new(NodeKind::Mix)).unwrap();
        let gain = patch.add_node(NodeDef::new(NodeKind::Gain)).unwrap();

        patch.rewire(gain, mix, "a").unwrap();
        patch
            .set_param(mix, "mute_a", ParamValue::Bool(true))
            .unwrap();

        // The muted edge still exists structurally, so this would loop.
        assert!(matches!(
            patch.rewire(mix, gain, "in"),
            Err(GraphError::WouldCycle { .. })
        ));
    }

    #[test]
    fn test_delete_clears_dangling_references() {
        let mut patch = Patch::new("p");
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let mix = patch.add_node(NodeDef::new(NodeKind::Mix)).unwrap();
        let out = output_of(&patch);

        patch.rewire(osc, mix, "a").unwrap();
        patch.rewire(osc, mix, "b").unwrap();
        patch.rewire(mix, out, "in").unwrap();
        patch.take_events();

        patch.delete_node(osc).unwrap();
        assert!(patch.node(mix).unwrap().input_ref("a").is_none());
        assert!(patch.node(mix).unwrap().input_ref("b").is_none());
        // Unrelated connection survives.
        assert_eq!(patch.node(out).unwrap().input_ref("in"), Some(mix));

        let events = patch.take_events();
        assert_eq!(
            events,
            vec![
                PatchEvent::Disconnected {
                    node: mix,
                    param: "a",
                },
                PatchEvent::Disconnected {
                    node: mix,
                    param: "b",
                },
                PatchEvent::NodeRemoved { node: osc },
            ]
        );
    }

    #[test]
    fn test_set_param_validates() {
        let mut patch = Patch::new("p");
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();

        patch
            .set_param(osc, "level", ParamValue::Float(0.25))
            .unwrap();
        assert_eq!(
            patch.node(osc).unwrap().param("level"),
            Some(&ParamValue::Float(0.25))
        );

        assert!(matches!(
            patch.set_param(osc, "level", ParamValue::Bool(true)),
            Err(GraphError::TypeMismatch { .. })
        ));
        assert!(matches!(
            patch.set_param(osc, "missing", ParamValue::Float(0.0)),
            Err(GraphError::UnknownParam { .. })
        ));

        // Connections are not writable through set_param.
        let out = output_of(&patch);
        assert!(matches!(
            patch.set_param(out, "in", ParamValue::Input(Some(osc))),
            Err(GraphError::ReservedParam { .. })
        ));
    }

    #[test]
    fn test_revision_counts_every_successful_edit() {
        let mut patch = Patch::new("p");
        assert_eq!(patch.revision(), 0);

        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let after_add = patch.revision();
        assert!(after_add > 0);

        patch
            .set_param(osc, "detune", ParamValue::Float(5.0))
            .unwrap();
        assert!(patch.revision() > after_add);

        let rev = patch.revision();
        let _ = patch.add_node(NodeDef::new(NodeKind::Output));
        assert_eq!(patch.revision(), rev);
    }
}
