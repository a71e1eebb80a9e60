// src/voice_allocator.rs

use std::collections::HashMap;

use crate::compile::{compile, CompileContext};
use crate::generator::VoiceTree;
use crate::state::{Patch, PatchBank};
use crate::voice::{InputId, VoiceHandle, VoiceInfo};

struct ActiveVoice {
    tree: VoiceTree,
    info: VoiceInfo,
}

/// Allocates and manages polyphonic voices.
///
/// Responsibilities:
/// - map inputs to voices and back
/// - compile one fresh tree per trigger
/// - keep released voices sounding until their tails finish
///
/// Does NOT:
/// - decide which patch plays (the caller picks one)
/// - limit polyphony
pub struct VoiceAllocator {
    by_input: HashMap<InputId, VoiceHandle>,
    input_of: HashMap<VoiceHandle, InputId>,
    voices: HashMap<VoiceHandle, ActiveVoice>,

    /// Released trees still rendering their tails. No identity; they
    /// only exist to finish fading.
    releasing: Vec<VoiceTree>,

    next_handle: u64,
    scratch: Vec<f32>,
}

impl VoiceAllocator {
    pub fn new(max_block: usize) -> Self {
        Self {
            by_input: HashMap::new(),
            input_of: HashMap::new(),
            voices: HashMap::new(),
            releasing: Vec::new(),
            next_handle: 1,
            scratch: vec![0.0; max_block],
        }
    }

    /// Start a voice for `input`. Any voice the input already holds is
    /// released first, so an input never drives two active voices even
    /// when the new trigger fails to compile.
    pub fn note_on(
        &mut self,
        input: InputId,
        ctx: &CompileContext,
        patch: &Patch,
        bank: &PatchBank,
    ) -> Option<VoiceHandle> {
        if let Some(held) = self.by_input.get(&input).copied() {
            self.note_off(held);
        }

        let tree = compile(patch, ctx, bank)?;
        let handle = VoiceHandle::new(self.next_handle);
        self.next_handle += 1;

        self.by_input.insert(input, handle);
        self.input_of.insert(handle, input);
        self.voices.insert(
            handle,
            ActiveVoice {
                tree,
                info: VoiceInfo::new(patch.id(), ctx.freq_hz, ctx.amplitude),
            },
        );
        log::trace!("{input} started {handle} at {} Hz", ctx.freq_hz);
        Some(handle)
    }

    /// Release a voice. The tree keeps rendering its tail until it
    /// reports finished. Unknown or already released handles are
    /// ignored, so stale note-offs after a re-trigger are harmless.
    pub fn note_off(&mut self, handle: VoiceHandle) {
        let Some(input) = self.input_of.remove(&handle) else {
            return;
        };
        self.by_input.remove(&input);
        if let Some(mut voice) = self.voices.remove(&handle) {
            voice.tree.release();
            self.releasing.push(voice.tree);
            log::trace!("{handle} released");
        }
    }

    /// Release everything at once.
    pub fn all_notes_off(&mut self) {
        self.by_input.clear();
        self.input_of.clear();
        for (_, mut voice) in self.voices.drain() {
            voice.tree.release();
            self.releasing.push(voice.tree);
        }
    }

    /// Drop released trees whose tails have finished. Called from the
    /// session's housekeeping tick, never from the render path.
    pub fn reap_finished(&mut self) {
        self.releasing.retain(|tree| !tree.is_finished());
    }

    /// Mix every sounding voice into `out`. The slice must not exceed
    /// the block bound given at construction.
    pub fn render_into(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        let len = out.len().min(self.scratch.len());

        for voice in self.voices.values_mut() {
            if voice.tree.is_finished() {
                continue;
            }
            let scratch = &mut self.scratch[..len];
            voice.tree.render(scratch);
            for (sum, sample) in out.iter_mut().zip(scratch.iter()) {
                *sum += *sample;
            }
        }
        for tree in &mut self.releasing {
            if tree.is_finished() {
                continue;
            }
            let scratch = &mut self.scratch[..len];
            tree.render(scratch);
            for (sum, sample) in out.iter_mut().zip(scratch.iter()) {
                *sum += *sample;
            }
        }
    }

    pub fn handle_for(&self, input: InputId) -> Option<VoiceHandle> {
        self.by_input.get(&input).copied()
    }

    pub fn input_for(&self, handle: VoiceHandle) -> Option<InputId> {
        self.input_of.get(&handle).copied()
    }

    pub fn info(&self, handle: VoiceHandle) -> Option<&VoiceInfo> {
        self.voices.get(&handle).map(|voice| &voice.info)
    }

    /// Number of held (not yet released) voices.
    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    /// Number of released voices still fading out.
    pub fn releasing_count(&self) -> usize {
        self.releasing.len()
    }
}
