// src/error.rs

use std::fmt;

use thiserror::Error;

use crate::state::{NodeId, ParamKind, PatchId};

/// Validation failure for a graph mutation.
///
/// Every operation checks its preconditions before touching anything,
/// so an `Err` means the patch is exactly as it was.
//
// `Display` and `Error` are hand-written rather than derived:
// thiserror would treat `WouldCycle`'s `source` field as the error's
// cause, but it is a node id, which implements no error trait.
#[derive(Debug, PartialEq, Eq)]
pub enum GraphError {
    DuplicateNode { node: NodeId },

    UnknownNode { node: NodeId },

    OutputExists,

    KeyGateExists,

    OutputUndeletable,

    UnknownParam { node: NodeId, param: String },

    NotAnInput { node: NodeId, param: String },

    NotAPatchRef { node: NodeId, param: String },

    NoOutputSignal { node: NodeId },

    SelfConnection { node: NodeId },

    WouldCycle { source: NodeId, dest: NodeId },

    TypeMismatch {
        node: NodeId,
        param: String,
        expected: ParamKind,
        got: ParamKind,
    },

    ReservedParam { node: NodeId, param: String },

    UnknownPatch { patch: PatchId },

    DuplicatePatch { patch: PatchId },

    SelfReference { patch: PatchId },

    PatchCycle { patch: PatchId, target: PatchId },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DuplicateNode { node } => {
                write!(f, "node {node} already exists in this patch")
            }
            GraphError::UnknownNode { node } => write!(f, "unknown node {node}"),
            GraphError::OutputExists => f.write_str("patch already has an output node"),
            GraphError::KeyGateExists => f.write_str("patch already has a key gate node"),
            GraphError::OutputUndeletable => f.write_str("the output node cannot be deleted"),
            GraphError::UnknownParam { node, param } => {
                write!(f, "node {node} has no parameter named {param:?}")
            }
            GraphError::NotAnInput { node, param } => {
                write!(f, "parameter {param:?} on node {node} is not a signal input")
            }
            GraphError::NotAPatchRef { node, param } => {
                write!(f, "parameter {param:?} on node {node} is not a patch reference")
            }
            GraphError::NoOutputSignal { node } => {
                write!(f, "node {node} does not produce a signal")
            }
            GraphError::SelfConnection { .. } => {
                f.write_str("a node cannot be connected to itself")
            }
            GraphError::WouldCycle { source, dest } => {
                write!(f, "connecting {source} to {dest} would create a cycle")
            }
            GraphError::TypeMismatch {
                node,
                param,
                expected,
                got,
            } => write!(
                f,
                "parameter {param:?} on node {node} expects {expected}, got {got}"
            ),
            GraphError::ReservedParam { node, param } => write!(
                f,
                "parameter {param:?} on node {node} is edited through its dedicated operation"
            ),
            GraphError::UnknownPatch { patch } => write!(f, "unknown patch {patch}"),
            GraphError::DuplicatePatch { patch } => {
                write!(f, "patch {patch} already exists in this bank")
            }
            GraphError::SelfReference { patch } => write!(f, "patch {patch} cannot embed itself"),
            GraphError::PatchCycle { patch, target } => {
                write!(f, "embedding {target} in {patch} would create a reference cycle")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Failure while loading or saving a patch bank.
///
/// Loading rebuilds a complete bank before handing it over, so any of
/// these leaves the caller's in-memory state untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bank file JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate patch id {patch}")]
    DuplicatePatch { patch: PatchId },

    #[error("patch {patch} contains duplicate node id {node}")]
    DuplicateNode { patch: PatchId, node: NodeId },

    #[error("patch {patch} declares more than one output node")]
    MultipleOutputs { patch: PatchId },

    #[error("patch {patch} declares more than one key gate node")]
    MultipleKeyGates { patch: PatchId },

    #[error("node {node} in patch {patch} has no parameter named {param:?}")]
    UnknownParam {
        patch: PatchId,
        node: NodeId,
        param: String,
    },

    #[error("parameter {param:?} on node {node} in patch {patch} expects {expected}")]
    TypeMismatch {
        patch: PatchId,
        node: NodeId,
        param: String,
        expected: ParamKind,
    },

    #[error("node {node} in patch {patch} references missing node {target}")]
    DanglingInput {
        patch: PatchId,
        node: NodeId,
        target: NodeId,
    },

    #[error("node {node} in patch {patch} reads from {target}, which produces no signal")]
    NotASource {
        patch: PatchId,
        node: NodeId,
        target: NodeId,
    },

    #[error("patch {patch} contains a connection cycle")]
    CycleDetected { patch: PatchId },

    #[error("patch {patch} references missing patch {target}")]
    DanglingPatchRef { patch: PatchId, target: PatchId },

    #[error("patch {patch} participates in a reference cycle")]
    PatchCycle { patch: PatchId },

    #[error("active patch {patch} is not in the bank")]
    UnknownActive { patch: PatchId },
}
