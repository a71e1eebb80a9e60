// src/state/bank.rs
//
// The patch bank: every patch the session knows about, keyed by id,
// with at most one marked active. Cross-patch referencing lives here
// because checking for reference cycles needs the whole collection.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::node::NodeId;
use super::param::ParamKind;
use super::patch::{Patch, PatchId};
use crate::error::GraphError;

#[derive(Debug, Clone, Default)]
pub struct PatchBank {
    patches: IndexMap<PatchId, Patch>,
    active: Option<PatchId>,
}

impl PatchBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh patch in the bank. The first patch created
    /// becomes active.
    pub fn create_patch(&mut self, name: impl Into<String>) -> PatchId {
        let patch = Patch::new(name);
        let id = patch.id();
        self.patches.insert(id, patch);
        if self.active.is_none() {
            self.active = Some(id);
        }
        id
    }

    /// Add a pre-built patch (import, load).
    pub fn add_patch(&mut self, patch: Patch) -> Result<PatchId, GraphError> {
        let id = patch.id();
        if self.patches.contains_key(&id) {
            return Err(GraphError::DuplicatePatch { patch: id });
        }
        self.patches.insert(id, patch);
        Ok(id)
    }

    /// Remove a patch. Every reference other patches held to it is
    /// cleared, and the active slot is vacated if it pointed here.
    pub fn remove_patch(&mut self, id: PatchId) -> Option<Patch> {
        let removed = self.patches.shift_remove(&id)?;
        if self.active == Some(id) {
            self.active = None;
        }
        for patch in self.patches.values_mut() {
            patch.clear_refs_to(id);
        }
        Some(removed)
    }

    pub fn get(&self, id: PatchId) -> Option<&Patch> {
        self.patches.get(&id)
    }

    pub fn get_mut(&mut self, id: PatchId) -> Option<&mut Patch> {
        self.patches.get_mut(&id)
    }

    pub fn contains(&self, id: PatchId) -> bool {
        self.patches.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> + '_ {
        self.patches.values()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn active_id(&self) -> Option<PatchId> {
        self.active
    }

    pub fn active(&self) -> Option<&Patch> {
        self.active.and_then(|id| self.patches.get(&id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Patch> {
        match self.active {
            Some(id) => self.patches.get_mut(&id),
            None => None,
        }
    }

    pub fn set_active(&mut self, id: PatchId) -> Result<(), GraphError> {
        if !self.patches.contains_key(&id) {
            return Err(GraphError::UnknownPatch { patch: id });
        }
        self.active = Some(id);
        Ok(())
    }

    pub fn clear_active(&mut self) {
        self.active = None;
    }

    /// Whether `from` references `target` through its patch reference
    /// parameters. With `transitive` set, references of references
    /// count too.
    pub fn references_patch(&self, from: PatchId, target: PatchId, transitive: bool) -> bool {
        let mut visited: HashSet<PatchId> = HashSet::new();
        let mut pending = vec![from];

        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(patch) = self.patches.get(&id) else {
                continue;
            };
            for node in patch.nodes() {
                for (_, referenced) in node.patch_refs() {
                    if referenced == target {
                        return true;
                    }
                    if transitive {
                        pending.push(referenced);
                    }
                }
            }
        }
        false
    }

    /// Every patch that (transitively) embeds `target`.
    pub fn dependents_of(&self, target: PatchId) -> Vec<PatchId> {
        self.patches
            .keys()
            .copied()
            .filter(|&id| id != target && self.references_patch(id, target, true))
            .collect()
    }

    /// Point a patch reference parameter at `target` (or clear it with
    /// `None`). Rejects unknown targets, self reference, and any
    /// target that already references the owning patch, directly or
    /// through intermediaries.
    pub fn set_patch_ref(
        &mut self,
        patch: PatchId,
        node: NodeId,
        param: &str,
        target: Option<PatchId>,
    ) -> Result<(), GraphError> {
        let owner = self
            .patches
            .get(&patch)
            .ok_or(GraphError::UnknownPatch { patch })?;
        let def = owner
            .node(node)
            .ok_or(GraphError::UnknownNode { node })?;
        let name = match def.param_entry(param) {
            None => {
                return Err(GraphError::UnknownParam {
                    node,
                    param: param.to_string(),
                });
            }
            Some((key, value)) => {
                if value.kind() != ParamKind::PatchRef {
                    return Err(GraphError::NotAPatchRef {
                        node,
                        param: param.to_string(),
                    });
                }
                key
            }
        };

        if let Some(target_id) = target {
            if target_id == patch {
                return Err(GraphError::SelfReference { patch });
            }
            if !self.patches.contains_key(&target_id) {
                return Err(GraphError::UnknownPatch { patch: target_id });
            }
            if self.references_patch(target_id, patch, true) {
                return Err(GraphError::PatchCycle {
                    patch,
                    target: target_id,
                });
            }
        }

        if let Some(owner) = self.patches.get_mut(&patch) {
            owner.store_patch_ref(node, name, target);
        }
        Ok(())
    }
}
