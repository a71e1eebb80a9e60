// src/lib.rs
//
// Patch editing, per-note compilation and voice management for a
// modular synthesizer. Hosts embed `Session` and drive it with edits,
// note triggers and render calls.

mod compile;
mod error;
mod generator;
mod generators;
mod liveness;
mod persist;
mod session;
mod state;
mod voice;
mod voice_allocator;

pub use compile::{compile, CompileContext, MAX_SUBPATCH_DEPTH};
pub use error::{GraphError, LoadError};
pub use generator::{Generator, VoiceTree};
pub use liveness::{Liveness, LivenessCache};
pub use session::Session;
pub use state::{
    Category, NodeDef, NodeId, NodeKind, ParamKind, ParamValue, Patch, PatchBank, PatchEvent,
    PatchId,
};
pub use voice::{InputId, VoiceHandle, VoiceInfo};
pub use voice_allocator::VoiceAllocator;
