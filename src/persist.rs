// src/persist.rs
//
// Serialized form of a patch bank.
//
// The on-disk structs mirror the domain types instead of deriving on
// them; node parameters load back through each kind's schema, so the
// interned parameter names and schema defaults survive a round trip
// and every stored value is checked against the kind that owns it.
//
// Loading rebuilds a complete bank before the caller sees anything. A
// file that fails any check changes nothing.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::state::{Category, NodeDef, NodeId, NodeKind, ParamValue, Patch, PatchBank, PatchId};

#[derive(Debug, Serialize, Deserialize)]
struct BankFile {
    #[serde(default)]
    active: Option<PatchId>,
    patches: Vec<PatchFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PatchFile {
    id: PatchId,
    name: String,
    category: Category,
    nodes: Vec<NodeFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NodeFile {
    id: NodeId,
    kind: NodeKind,
    #[serde(default)]
    position: (f32, f32),
    #[serde(default)]
    params: IndexMap<String, ParamValue>,
}

impl BankFile {
    fn from_bank(bank: &PatchBank) -> Self {
        Self {
            active: bank.active_id(),
            patches: bank.iter().map(PatchFile::from_patch).collect(),
        }
    }
}

impl PatchFile {
    fn from_patch(patch: &Patch) -> Self {
        Self {
            id: patch.id(),
            name: patch.name.clone(),
            category: patch.category,
            nodes: patch.nodes().map(NodeFile::from_node).collect(),
        }
    }
}

impl NodeFile {
    fn from_node(node: &NodeDef) -> Self {
        Self {
            id: node.id(),
            kind: node.kind(),
            position: node.position,
            params: node
                .params()
                .map(|(name, value)| (name.to_string(), value.clone()))
                .collect(),
        }
    }
}

impl PatchBank {
    pub fn to_json(&self) -> Result<String, LoadError> {
        Ok(serde_json::to_string_pretty(&BankFile::from_bank(self))?)
    }

    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let file: BankFile = serde_json::from_str(json)?;

        let mut bank = PatchBank::new();
        for patch_file in &file.patches {
            let patch = build_patch(patch_file)?;
            if bank.add_patch(patch).is_err() {
                return Err(LoadError::DuplicatePatch {
                    patch: patch_file.id,
                });
            }
        }

        // Cross-patch checks need the whole bank in place.
        for patch in bank.iter() {
            for node in patch.nodes() {
                for (_, target) in node.patch_refs() {
                    if !bank.contains(target) {
                        return Err(LoadError::DanglingPatchRef {
                            patch: patch.id(),
                            target,
                        });
                    }
                }
            }
        }
        for patch in bank.iter() {
            if bank.references_patch(patch.id(), patch.id(), true) {
                return Err(LoadError::PatchCycle { patch: patch.id() });
            }
        }

        if let Some(active) = file.active {
            bank.set_active(active)
                .map_err(|_| LoadError::UnknownActive { patch: active })?;
        }
        Ok(bank)
    }
}

fn build_patch(file: &PatchFile) -> Result<Patch, LoadError> {
    let patch_id = file.id;
    let mut nodes: IndexMap<NodeId, NodeDef> = IndexMap::with_capacity(file.nodes.len());
    let mut output: Option<NodeId> = None;
    let mut key_gate: Option<NodeId> = None;

    for node_file in &file.nodes {
        if nodes.contains_key(&node_file.id) {
            return Err(LoadError::DuplicateNode {
                patch: patch_id,
                node: node_file.id,
            });
        }
        match node_file.kind {
            NodeKind::Output => {
                if output.is_some() {
                    return Err(LoadError::MultipleOutputs { patch: patch_id });
                }
                output = Some(node_file.id);
            }
            NodeKind::KeyGate => {
                if key_gate.is_some() {
                    return Err(LoadError::MultipleKeyGates { patch: patch_id });
                }
                key_gate = Some(node_file.id);
            }
            _ => {}
        }

        let mut def = NodeDef::with_id(node_file.kind, node_file.id)
            .at(node_file.position.0, node_file.position.1);
        for (name, value) in &node_file.params {
            let Some(slot) = def.param_slot_mut(name) else {
                return Err(LoadError::UnknownParam {
                    patch: patch_id,
                    node: node_file.id,
                    param: name.clone(),
                });
            };
            if slot.kind() != value.kind() {
                return Err(LoadError::TypeMismatch {
                    patch: patch_id,
                    node: node_file.id,
                    param: name.clone(),
                    expected: slot.kind(),
                });
            }
            *slot = value.clone();
        }
        nodes.insert(node_file.id, def);
    }

    // Connections may point forward in the file, so they are checked
    // only once every node exists.
    for node in nodes.values() {
        for (_, target) in node.connected_inputs() {
            let Some(source) = nodes.get(&target) else {
                return Err(LoadError::DanglingInput {
                    patch: patch_id,
                    node: node.id(),
                    target,
                });
            };
            if !source.has_output() {
                return Err(LoadError::NotASource {
                    patch: patch_id,
                    node: node.id(),
                    target,
                });
            }
        }
    }
    if has_cycle(&nodes) {
        return Err(LoadError::CycleDetected { patch: patch_id });
    }

    Ok(Patch::from_parts(
        patch_id,
        file.name.clone(),
        file.category,
        nodes,
        output,
        key_gate,
    ))
}

/// Kahn's algorithm over the connection edges. Nodes with no pending
/// inputs resolve first; anything left unresolved sits on a cycle.
fn has_cycle(nodes: &IndexMap<NodeId, NodeDef>) -> bool {
    let mut pending: HashMap<NodeId, usize> = nodes
        .iter()
        .map(|(id, node)| (*id, node.connected_inputs().count()))
        .collect();
    let mut readers: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for node in nodes.values() {
        for (_, target) in node.connected_inputs() {
            readers.entry(target).or_default().push(node.id());
        }
    }

    let mut queue: Vec<NodeId> = pending
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut resolved = 0;
    while let Some(id) = queue.pop() {
        resolved += 1;
        let Some(reading) = readers.get(&id) else {
            continue;
        };
        for reader in reading {
            if let Some(count) = pending.get_mut(reader) {
                *count -= 1;
                if *count == 0 {
                    queue.push(*reader);
                }
            }
        }
    }
    resolved < nodes.len()
}
