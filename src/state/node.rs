// src/state/node.rs
//
// Node definitions for the patch document.
//
// A node is pure data: a kind, a stable id, and an ordered parameter
// map seeded from the kind's schema. Signal connections live inside
// the parameter map (see `ParamValue::Input`), owned by the side that
// reads the signal.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::param::{ParamKind, ParamValue};
use super::patch::PatchId;

/// Unique identifier for a node instance. Stable across save/load.
pub type NodeId = Uuid;

/// Palette grouping for node kinds (and for whole patches, when they
/// are embedded). Classification only, never behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Wave,
    Envelope,
    Combine,
    Operation,
    Voice,
    Special,
}

/// Every node kind the editor can place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Sine,
    Saw,
    Square,
    Triangle,
    Noise,
    Adsr,
    Decay,
    Mix,
    Ring,
    Gain,
    Bias,
    KeyGate,
    SubPatch,
    Comment,
    Output,
}

impl NodeKind {
    pub const ALL: [NodeKind; 15] = [
        NodeKind::Sine,
        NodeKind::Saw,
        NodeKind::Square,
        NodeKind::Triangle,
        NodeKind::Noise,
        NodeKind::Adsr,
        NodeKind::Decay,
        NodeKind::Mix,
        NodeKind::Ring,
        NodeKind::Gain,
        NodeKind::Bias,
        NodeKind::KeyGate,
        NodeKind::SubPatch,
        NodeKind::Comment,
        NodeKind::Output,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Sine => "sine",
            NodeKind::Saw => "saw",
            NodeKind::Square => "square",
            NodeKind::Triangle => "triangle",
            NodeKind::Noise => "noise",
            NodeKind::Adsr => "adsr",
            NodeKind::Decay => "decay",
            NodeKind::Mix => "mix",
            NodeKind::Ring => "ring",
            NodeKind::Gain => "gain",
            NodeKind::Bias => "bias",
            NodeKind::KeyGate => "key_gate",
            NodeKind::SubPatch => "sub_patch",
            NodeKind::Comment => "comment",
            NodeKind::Output => "output",
        }
    }

    pub fn category(self) -> Category {
        match self {
            NodeKind::Sine
            | NodeKind::Saw
            | NodeKind::Square
            | NodeKind::Triangle
            | NodeKind::Noise => Category::Wave,
            NodeKind::Adsr | NodeKind::Decay => Category::Envelope,
            NodeKind::Mix | NodeKind::Ring => Category::Combine,
            NodeKind::Gain | NodeKind::Bias => Category::Operation,
            NodeKind::KeyGate => Category::Voice,
            NodeKind::SubPatch | NodeKind::Comment | NodeKind::Output => Category::Special,
        }
    }

    /// Whether nodes of this kind produce a signal other nodes can read.
    pub fn has_output(self) -> bool {
        !matches!(self, NodeKind::Comment | NodeKind::Output)
    }

    /// Parameter schema: names, kinds and defaults, in display order.
    fn default_params(self) -> Vec<(&'static str, ParamValue)> {
        use ParamValue::*;

        match self {
            NodeKind::Sine | NodeKind::Saw | NodeKind::Triangle => vec![
                ("octave", Int(0)),
                ("detune", Float(0.0)),
                ("level", Float(1.0)),
            ],
            NodeKind::Square => vec![
                ("octave", Int(0)),
                ("detune", Float(0.0)),
                ("pulse_width", Float(0.5)),
                ("level", Float(1.0)),
            ],
            NodeKind::Noise => vec![("color", Choice(0)), ("level", Float(1.0))],
            NodeKind::Adsr => vec![
                ("in", Input(None)),
                ("attack", TimeLen(0.05)),
                ("decay", TimeLen(0.25)),
                ("sustain", Float(0.7)),
                ("release", TimeLen(0.5)),
            ],
            NodeKind::Decay => vec![("in", Input(None)), ("time", TimeLen(1.0))],
            NodeKind::Mix => vec![
                ("a", Input(None)),
                ("b", Input(None)),
                ("balance", Float(0.5)),
                ("mute_a", Bool(false)),
                ("mute_b", Bool(false)),
            ],
            NodeKind::Ring => vec![("a", Input(None)), ("b", Input(None))],
            NodeKind::Gain => vec![("in", Input(None)), ("amount", Float(1.0))],
            NodeKind::Bias => vec![("in", Input(None)), ("offset", Float(0.0))],
            NodeKind::KeyGate => vec![("level", Float(1.0))],
            NodeKind::SubPatch => vec![("patch", PatchRef(None)), ("level", Float(1.0))],
            NodeKind::Comment => vec![("text", Label(String::new()))],
            NodeKind::Output => vec![("in", Input(None)), ("level", Float(0.8))],
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An instance of a node in a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDef {
    id: NodeId,
    kind: NodeKind,

    /// Editor placement, not functional.
    pub position: (f32, f32),

    params: IndexMap<&'static str, ParamValue>,
}

impl NodeDef {
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(kind, Uuid::new_v4())
    }

    /// Rebuild a node under a known id (persistence restore).
    pub fn with_id(kind: NodeKind, id: NodeId) -> Self {
        Self {
            id,
            kind,
            position: (0.0, 0.0),
            params: kind.default_params().into_iter().collect(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.position = (x, y);
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }

    pub fn has_output(&self) -> bool {
        self.kind.has_output()
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Like `param`, but also yields the schema-interned name.
    pub fn param_entry(&self, name: &str) -> Option<(&'static str, &ParamValue)> {
        self.params.get_key_value(name).map(|(k, v)| (*k, v))
    }

    pub fn params(&self) -> impl Iterator<Item = (&'static str, &ParamValue)> + '_ {
        self.params.iter().map(|(k, v)| (*k, v))
    }

    /// Names of every `Input` parameter, connected or not.
    pub fn input_names(&self) -> Vec<&'static str> {
        self.params
            .iter()
            .filter(|(_, v)| v.kind() == ParamKind::Input)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Names of every `PatchRef` parameter.
    pub fn patch_ref_names(&self) -> Vec<&'static str> {
        self.params
            .iter()
            .filter(|(_, v)| v.kind() == ParamKind::PatchRef)
            .map(|(k, _)| *k)
            .collect()
    }

    /// The node this input reads from, if connected.
    pub fn input_ref(&self, name: &str) -> Option<NodeId> {
        self.params.get(name).and_then(ParamValue::as_input)
    }

    /// Every connected input, in schema order.
    pub fn connected_inputs(&self) -> impl Iterator<Item = (&'static str, NodeId)> + '_ {
        self.params
            .iter()
            .filter_map(|(k, v)| v.as_input().map(|target| (*k, target)))
    }

    /// Every connected patch reference, in schema order.
    pub fn patch_refs(&self) -> impl Iterator<Item = (&'static str, PatchId)> + '_ {
        self.params
            .iter()
            .filter_map(|(k, v)| v.as_patch_ref().map(|target| (*k, target)))
    }

    /// Whether the node currently reads this input. A mixer keeps a
    /// muted channel's connection but ignores its signal.
    pub fn input_in_use(&self, name: &str) -> bool {
        match (self.kind, name) {
            (NodeKind::Mix, "a") => !self.bool_param("mute_a"),
            (NodeKind::Mix, "b") => !self.bool_param("mute_b"),
            _ => true,
        }
    }

    fn bool_param(&self, name: &str) -> bool {
        self.params
            .get(name)
            .and_then(ParamValue::as_bool)
            .unwrap_or(false)
    }

    pub(crate) fn param_slot_mut(&mut self, name: &str) -> Option<&mut ParamValue> {
        self.params.get_mut(name)
    }

    /// Store an input reference, returning the interned parameter name.
    /// `None` if the parameter is missing or not an input.
    pub(crate) fn set_input(&mut self, name: &str, target: Option<NodeId>) -> Option<&'static str> {
        let (_, key, slot) = self.params.get_full_mut(name)?;
        if !matches!(slot, ParamValue::Input(_)) {
            return None;
        }
        *slot = ParamValue::Input(target);
        Some(*key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_seeds_defaults() {
        let node = NodeDef::new(NodeKind::Adsr);
        assert_eq!(node.param("sustain"), Some(&ParamValue::Float(0.7)));
        assert_eq!(node.param("attack"), Some(&ParamValue::TimeLen(0.05)));
        assert_eq!(node.input_names(), vec!["in"]);
        assert!(node.input_ref("in").is_none());
    }

    #[test]
    fn test_every_kind_has_a_schema() {
        for kind in NodeKind::ALL {
            let node = NodeDef::new(kind);
            assert!(node.params().count() > 0, "{kind} has no parameters");
        }
    }

    #[test]
    fn test_signal_producers() {
        assert!(NodeKind::Sine.has_output());
        assert!(NodeKind::KeyGate.has_output());
        assert!(NodeKind::SubPatch.has_output());
        assert!(!NodeKind::Comment.has_output());
        assert!(!NodeKind::Output.has_output());
    }

    #[test]
    fn test_mute_flags_gate_input_use() {
        let mut node = NodeDef::new(NodeKind::Mix);
        assert!(node.input_in_use("a"));

        if let Some(slot) = node.param_slot_mut("mute_a") {
            *slot = ParamValue::Bool(true);
        }
        assert!(!node.input_in_use("a"));
        assert!(node.input_in_use("b"));
    }

    #[test]
    fn test_set_input_interns_name() {
        let mut node = NodeDef::new(NodeKind::Gain);
        let target = Uuid::new_v4();

        let key = node.set_input("in", Some(target));
        assert_eq!(key, Some("in"));
        assert_eq!(node.input_ref("in"), Some(target));

        // Not an input parameter.
        assert_eq!(node.set_input("amount", Some(target)), None);
    }
}
