// src/session.rs
//
// The engine facade: one patch bank, one voice allocator and one
// liveness cache, glued together under the host's audio settings.
//
// Hosts drive it with three kinds of call: edits (through `bank_mut`
// and `active_patch_mut`), note triggers, and a periodic `flush` that
// settles caches and drops finished voice tails. Edits between flushes
// cost nothing but a revision bump.

use crate::compile::CompileContext;
use crate::error::LoadError;
use crate::liveness::LivenessCache;
use crate::state::{Patch, PatchBank};
use crate::voice::{InputId, VoiceHandle};
use crate::voice_allocator::VoiceAllocator;

pub struct Session {
    bank: PatchBank,
    voices: VoiceAllocator,
    liveness: LivenessCache,
    sample_rate: f64,
    max_block: usize,
    beats_per_second: f64,
}

impl Session {
    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        let mut bank = PatchBank::new();
        bank.create_patch("Init");

        Self {
            bank,
            voices: VoiceAllocator::new(max_block),
            liveness: LivenessCache::new(),
            sample_rate,
            max_block,
            beats_per_second: 2.0,
        }
    }

    pub fn bank(&self) -> &PatchBank {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut PatchBank {
        &mut self.bank
    }

    pub fn active_patch(&self) -> Option<&Patch> {
        self.bank.active()
    }

    pub fn active_patch_mut(&mut self) -> Option<&mut Patch> {
        self.bank.active_mut()
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Tempo in beats per second. Binds `TimeLen` parameters when a
    /// note compiles; voices already sounding keep the tempo they
    /// started with.
    pub fn tempo(&self) -> f64 {
        self.beats_per_second
    }

    pub fn set_tempo(&mut self, beats_per_second: f64) {
        self.beats_per_second = beats_per_second.max(0.001);
    }

    /// Trigger a note on the active patch. `None` when there is no
    /// active patch or it has nothing audible to play.
    pub fn note_on(
        &mut self,
        input: InputId,
        freq_hz: f64,
        amplitude: f32,
    ) -> Option<VoiceHandle> {
        let Some(patch) = self.bank.active() else {
            log::debug!("note on ignored, no active patch");
            return None;
        };
        let ctx = CompileContext::new(freq_hz, amplitude, self.sample_rate, self.max_block)
            .with_tempo(self.beats_per_second);
        self.voices.note_on(input, &ctx, patch, &self.bank)
    }

    pub fn note_off(&mut self, handle: VoiceHandle) {
        self.voices.note_off(handle);
    }

    pub fn all_notes_off(&mut self) {
        self.voices.all_notes_off();
    }

    /// Housekeeping tick: refresh the liveness cache against the
    /// active patch and drop voice tails that finished fading. Called
    /// once per editor frame, however many edits happened in between.
    pub fn flush(&mut self) {
        if let Some(patch) = self.bank.active() {
            self.liveness.refresh(patch);
        }
        self.voices.reap_finished();
    }

    /// Liveness of the active patch, as of the last `flush`.
    pub fn liveness(&self) -> &LivenessCache {
        &self.liveness
    }

    /// Mix every sounding voice into `out`. The slice must not exceed
    /// `max_block`.
    pub fn render(&mut self, out: &mut [f32]) {
        self.voices.render_into(out);
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    pub fn releasing_voices(&self) -> usize {
        self.voices.releasing_count()
    }

    /// Replace the whole bank from a serialized form. Sounding voices
    /// are released first. On error the session is untouched.
    pub fn load_bank_json(&mut self, json: &str) -> Result<(), LoadError> {
        let bank = PatchBank::from_json(json)?;
        self.voices.all_notes_off();
        self.bank = bank;
        self.liveness.invalidate();
        Ok(())
    }

    pub fn save_bank_json(&self) -> Result<String, LoadError> {
        self.bank.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{NodeDef, NodeKind};

    fn session_with_sine() -> Session {
        let mut session = Session::new(48_000.0, 128);
        let patch = session.active_patch_mut().unwrap();
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let out = patch.output_node().unwrap();
        patch.rewire(osc, out, "in").unwrap();
        session
    }

    #[test]
    fn test_new_session_shape() {
        let session = Session::new(44_100.0, 256);
        assert_eq!(session.bank().len(), 1);
        assert_eq!(session.active_patch().unwrap().name, "Init");
        assert_eq!(session.sample_rate(), 44_100.0);
        assert_eq!(session.max_block(), 256);
        assert_eq!(session.tempo(), 2.0);
    }

    #[test]
    fn test_note_lifecycle_through_the_session() {
        let mut session = session_with_sine();

        let handle = session.note_on(InputId(60), 440.0, 1.0).unwrap();
        assert_eq!(session.active_voices(), 1);

        let mut block = [0.0f32; 128];
        session.render(&mut block);
        assert!(block.iter().any(|s| s.abs() > 0.1));

        session.note_off(handle);
        session.flush();
        assert_eq!(session.active_voices(), 0);
        assert_eq!(session.releasing_voices(), 0);

        session.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_flush_debounces_liveness() {
        let mut session = session_with_sine();
        session.flush();
        let before = session.liveness().recompute_count();

        // A burst of edits costs one walk at the next flush.
        let patch = session.active_patch_mut().unwrap();
        for _ in 0..8 {
            patch.add_node(NodeDef::new(NodeKind::Saw)).unwrap();
        }
        session.flush();
        session.flush();
        assert_eq!(session.liveness().recompute_count(), before + 1);
    }

    #[test]
    fn test_liveness_reflects_the_active_patch() {
        let mut session = session_with_sine();
        let stray = session
            .active_patch_mut()
            .unwrap()
            .add_node(NodeDef::new(NodeKind::Noise))
            .unwrap();
        session.flush();

        let live = session.liveness().current();
        assert!(!live.is_live(stray));
        assert_eq!(live.live_count(), 2); // output and the sine
    }

    #[test]
    fn test_load_failure_leaves_session_untouched() {
        let mut session = session_with_sine();
        session.active_patch_mut().unwrap().name = "keep me".into();

        assert!(session.load_bank_json("{ not json").is_err());
        assert_eq!(session.active_patch().unwrap().name, "keep me");
        assert_eq!(session.bank().len(), 1);
    }

    #[test]
    fn test_load_ends_sounding_voices() {
        let mut session = session_with_sine();
        session.note_on(InputId(60), 440.0, 1.0).unwrap();
        assert_eq!(session.active_voices(), 1);

        let json = session.save_bank_json().unwrap();
        session.load_bank_json(&json).unwrap();
        assert_eq!(session.active_voices(), 0);

        // The reloaded bank still plays.
        session.flush();
        assert!(session.note_on(InputId(60), 440.0, 1.0).is_some());
    }

    #[test]
    fn test_save_load_round_trip_preserves_structure() {
        let mut session = session_with_sine();
        let id = session.active_patch().unwrap().id();
        let nodes = session.active_patch().unwrap().node_count();

        let json = session.save_bank_json().unwrap();

        let mut other = Session::new(48_000.0, 128);
        other.load_bank_json(&json).unwrap();
        assert_eq!(other.bank().len(), 1);
        assert_eq!(other.bank().active_id(), Some(id));
        assert_eq!(other.active_patch().unwrap().node_count(), nodes);
    }
}
