// src/state/param.rs

use std::fmt;

use serde::{Deserialize, Serialize};

use super::node::NodeId;
use super::patch::PatchId;

/// A value slot on a node.
///
/// Two variants double as graph structure: `Input` is a signal
/// connection owned by the reading side, and `PatchRef` embeds another
/// patch. Both are edited through their dedicated operations, never
/// through `set_param`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParamValue {
    Bool(bool),

    /// Index into a fixed option list (e.g. noise color).
    Choice(u32),

    Int(i32),

    Float(f64),

    /// Musical length in beats. Converted to seconds at compile time
    /// using the session tempo.
    TimeLen(f64),

    /// Free text (comments, user labels).
    Label(String),

    /// Reference to another patch in the bank, `None` when unset.
    PatchRef(Option<PatchId>),

    /// Signal connection to another node, `None` when unconnected.
    Input(Option<NodeId>),
}

/// The type tag of a `ParamValue`, used for validation and error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Choice,
    Int,
    Float,
    TimeLen,
    Label,
    PatchRef,
    Input,
}

impl ParamKind {
    pub fn name(self) -> &'static str {
        match self {
            ParamKind::Bool => "bool",
            ParamKind::Choice => "choice",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::TimeLen => "time length",
            ParamKind::Label => "label",
            ParamKind::PatchRef => "patch reference",
            ParamKind::Input => "signal input",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ParamValue {
    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Choice(_) => ParamKind::Choice,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::TimeLen(_) => ParamKind::TimeLen,
            ParamValue::Label(_) => ParamKind::Label,
            ParamValue::PatchRef(_) => ParamKind::PatchRef,
            ParamValue::Input(_) => ParamKind::Input,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<u32> {
        match self {
            ParamValue::Choice(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time_len(&self) -> Option<f64> {
        match self {
            ParamValue::TimeLen(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Label(s) => Some(s),
            _ => None,
        }
    }

    /// The referenced patch, if this is a connected `PatchRef`.
    pub fn as_patch_ref(&self) -> Option<PatchId> {
        match self {
            ParamValue::PatchRef(target) => *target,
            _ => None,
        }
    }

    /// The referenced node, if this is a connected `Input`.
    pub fn as_input(&self) -> Option<NodeId> {
        match self {
            ParamValue::Input(target) => *target,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(ParamValue::Bool(true).kind(), ParamKind::Bool);
        assert_eq!(ParamValue::TimeLen(1.5).kind(), ParamKind::TimeLen);
        assert_eq!(ParamValue::Input(None).kind(), ParamKind::Input);
    }

    #[test]
    fn test_accessors_reject_other_kinds() {
        assert_eq!(ParamValue::Float(0.5).as_bool(), None);
        assert_eq!(ParamValue::Bool(true).as_float(), None);
        assert_eq!(ParamValue::Input(None).as_input(), None);
    }
}
