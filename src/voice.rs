// src/voice.rs
//
// Identity types for the voice layer.

use crate::state::PatchId;

/// Caller-side identity of a sounding note, e.g. a MIDI key number or
/// a sequencer lane. The allocator keeps at most one active voice per
/// input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputId(pub u64);

impl std::fmt::Display for InputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "input#{}", self.0)
    }
}

/// Allocator-side identity of a voice. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceHandle(u64);

impl VoiceHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "voice#{}", self.0)
    }
}

/// What a voice was compiled from and with.
#[derive(Debug, Clone)]
pub struct VoiceInfo {
    pub patch: PatchId,
    pub freq_hz: f64,
    pub amplitude: f32,
}

impl VoiceInfo {
    pub fn new(patch: PatchId, freq_hz: f64, amplitude: f32) -> Self {
        Self {
            patch,
            freq_hz,
            amplitude,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_display_forms() {
        assert_eq!(InputId(60).to_string(), "input#60");
        assert_eq!(VoiceHandle::new(3).to_string(), "voice#3");
    }

    #[test]
    fn test_info_carries_trigger() {
        let patch = Uuid::new_v4();
        let info = VoiceInfo::new(patch, 440.0, 0.9);
        assert_eq!(info.patch, patch);
        assert_eq!(info.freq_hz, 440.0);
        assert_eq!(info.amplitude, 0.9);
    }
}
