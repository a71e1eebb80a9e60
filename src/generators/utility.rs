// src/generators/utility.rs
//
// Single-input operations, the key gate source, and the silence and
// sub-patch wrappers the compiler leans on.

use crate::generator::{Generator, VoiceTree};

// ═══════════════════════════════════════════════════════════════════
// Gain
// ═══════════════════════════════════════════════════════════════════

pub struct GainGen {
    child: Box<dyn Generator>,
    amount: f32,
}

impl GainGen {
    pub fn new(child: Box<dyn Generator>, amount: f32) -> Self {
        Self { child, amount }
    }
}

impl Generator for GainGen {
    fn render(&mut self, out: &mut [f32]) {
        self.child.render(out);
        for sample in out.iter_mut() {
            *sample *= self.amount;
        }
    }

    fn release(&mut self) {
        self.child.release();
    }

    fn is_finished(&self) -> bool {
        self.child.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Bias (DC offset)
// ═══════════════════════════════════════════════════════════════════

pub struct BiasGen {
    child: Box<dyn Generator>,
    offset: f32,
}

impl BiasGen {
    pub fn new(child: Box<dyn Generator>, offset: f32) -> Self {
        Self { child, offset }
    }
}

impl Generator for BiasGen {
    fn render(&mut self, out: &mut [f32]) {
        self.child.render(out);
        for sample in out.iter_mut() {
            *sample += self.offset;
        }
    }

    fn release(&mut self) {
        self.child.release();
    }

    fn is_finished(&self) -> bool {
        self.child.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Key gate
// ═══════════════════════════════════════════════════════════════════

/// The held-key signal: a constant while the key is down, zero after.
/// Useful for ring-modulating a branch on and off with the key.
pub struct KeyGateGen {
    level: f32,
    held: bool,
}

impl KeyGateGen {
    pub fn new(level: f32) -> Self {
        Self { level, held: true }
    }
}

impl Generator for KeyGateGen {
    fn render(&mut self, out: &mut [f32]) {
        out.fill(if self.held { self.level } else { 0.0 });
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}

// ═══════════════════════════════════════════════════════════════════
// Silence
// ═══════════════════════════════════════════════════════════════════

/// Stand-in for anything that could not be compiled: unconnected
/// inputs, muted branches, broken references. Permanently finished.
pub struct SilenceGen;

impl Generator for SilenceGen {
    fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
    }

    fn release(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }
}

// ═══════════════════════════════════════════════════════════════════
// Sub-patch
// ═══════════════════════════════════════════════════════════════════

/// A whole embedded patch compiled as one branch of the parent voice.
pub struct SubPatchGen {
    inner: VoiceTree,
    level: f32,
}

impl SubPatchGen {
    pub fn new(inner: VoiceTree, level: f32) -> Self {
        Self { inner, level }
    }
}

impl Generator for SubPatchGen {
    fn render(&mut self, out: &mut [f32]) {
        self.inner.render(out);
        for sample in out.iter_mut() {
            *sample *= self.level;
        }
    }

    fn release(&mut self) {
        self.inner.release();
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_follows_the_key() {
        let mut gate = KeyGateGen::new(0.75);
        let mut block = [0.0f32; 8];

        gate.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.75));

        gate.release();
        gate.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
        assert!(gate.is_finished());
    }

    #[test]
    fn test_silence_is_born_finished() {
        let mut silence = SilenceGen;
        let mut block = [1.0f32; 8];
        silence.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
        assert!(silence.is_finished());
    }

    #[test]
    fn test_bias_offsets_silence() {
        let mut bias = BiasGen::new(Box::new(SilenceGen), 0.1);
        let mut block = [0.0f32; 8];
        bias.render(&mut block);
        assert!(block.iter().all(|s| (*s - 0.1).abs() < 1e-6));
    }
}
