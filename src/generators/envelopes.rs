// src/generators/envelopes.rs
//
// Envelope generators.
//
// Envelopes shape the generator below them and own the voice's tail:
// release is handled here, not forwarded to the child, so the source
// keeps sounding while the envelope ramps it down.

use crate::generator::Generator;

// ═══════════════════════════════════════════════════════════════════
// ADSR
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    Attack,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Gate-driven envelope with linear segments. Times are fixed when the
/// voice is compiled; the release slope is computed from the level the
/// envelope had when the key came up.
pub struct AdsrGen {
    child: Box<dyn Generator>,
    stage: Stage,
    level: f32,
    attack_rate: f32,
    decay_rate: f32,
    sustain: f32,
    release_samples: f32,
    release_rate: f32,
}

impl AdsrGen {
    pub fn new(
        child: Box<dyn Generator>,
        attack: f64,
        decay: f64,
        sustain: f64,
        release: f64,
        sample_rate: f64,
    ) -> Self {
        let sustain = sustain.clamp(0.0, 1.0) as f32;
        let attack_rate = 1.0 / (attack * sample_rate).max(1.0) as f32;
        let decay_rate = (1.0 - sustain) / (decay * sample_rate).max(1.0) as f32;
        let release_samples = (release * sample_rate).max(1.0) as f32;

        Self {
            child,
            stage: Stage::Attack,
            level: 0.0,
            attack_rate,
            decay_rate,
            sustain,
            release_samples,
            release_rate: 0.0,
        }
    }

    #[inline]
    fn step(&mut self) -> f32 {
        match self.stage {
            Stage::Attack => {
                self.level += self.attack_rate;
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
                self.level
            }

            Stage::Decay => {
                self.level -= self.decay_rate;
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
                self.level
            }

            Stage::Sustain => self.sustain,

            Stage::Release => {
                self.level -= self.release_rate;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Done;
                }
                self.level
            }

            Stage::Done => 0.0,
        }
    }
}

impl Generator for AdsrGen {
    fn render(&mut self, out: &mut [f32]) {
        if self.is_finished() {
            out.fill(0.0);
            return;
        }
        self.child.render(out);
        for sample in out.iter_mut() {
            *sample *= self.step();
        }
    }

    fn release(&mut self) {
        // The tail belongs to the envelope; the child keeps running
        // underneath it until the ramp reaches zero.
        if self.stage != Stage::Release && self.stage != Stage::Done {
            self.release_rate = self.level / self.release_samples;
            self.stage = Stage::Release;
        }
    }

    fn is_finished(&self) -> bool {
        self.stage == Stage::Done || self.child.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Decay (one-shot fade, ignores the gate)
// ═══════════════════════════════════════════════════════════════════

/// Fades the child from full level to silence over a fixed time,
/// starting at the trigger. Key up is forwarded to the child so a
/// nested envelope still sees it, but the fade itself runs regardless.
pub struct DecayGen {
    child: Box<dyn Generator>,
    level: f32,
    rate: f32,
}

impl DecayGen {
    pub fn new(child: Box<dyn Generator>, time: f64, sample_rate: f64) -> Self {
        Self {
            child,
            level: 1.0,
            rate: 1.0 / (time * sample_rate).max(1.0) as f32,
        }
    }
}

impl Generator for DecayGen {
    fn render(&mut self, out: &mut [f32]) {
        if self.is_finished() {
            out.fill(0.0);
            return;
        }
        self.child.render(out);
        for sample in out.iter_mut() {
            *sample *= self.level;
            self.level = (self.level - self.rate).max(0.0);
        }
    }

    fn release(&mut self) {
        self.child.release();
    }

    fn is_finished(&self) -> bool {
        self.level <= 0.0 || self.child.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Constant 1.0 until released, to expose the raw envelope shape.
    struct Flat {
        held: bool,
    }

    impl Flat {
        fn new() -> Self {
            Self { held: true }
        }
    }

    impl Generator for Flat {
        fn render(&mut self, out: &mut [f32]) {
            out.fill(if self.held { 1.0 } else { 0.0 });
        }
        fn release(&mut self) {
            self.held = false;
        }
        fn is_finished(&self) -> bool {
            !self.held
        }
    }

    #[test]
    fn test_adsr_reaches_sustain() {
        // 10 samples of attack, 10 of decay at sr 1000.
        let mut env = AdsrGen::new(Box::new(Flat::new()), 0.01, 0.01, 0.5, 0.01, 1000.0);
        let mut block = [0.0f32; 64];
        env.render(&mut block);

        // Rising through the attack.
        assert!(block[0] > 0.0);
        assert!(block[5] > block[0]);
        // Settled on the sustain level by mid-block.
        assert!((block[40] - 0.5).abs() < 1e-4);
        assert!(!env.is_finished());
    }

    #[test]
    fn test_adsr_tail_then_finished() {
        let mut env = AdsrGen::new(Box::new(Flat::new()), 0.001, 0.001, 0.8, 0.02, 1000.0);
        let mut block = [0.0f32; 32];
        env.render(&mut block); // reach sustain

        env.release();
        assert!(!env.is_finished());

        // The child is still running during the tail, so the tail is
        // audible and monotonically falling.
        env.render(&mut block);
        assert!(block[0] > 0.0);
        assert!(block[10] < block[0]);

        // 20ms release at sr 1000 is 20 samples; the first released
        // block already finished the ramp.
        assert!(env.is_finished());
        env.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_release_during_attack_ramps_from_current_level() {
        let mut env = AdsrGen::new(Box::new(Flat::new()), 1.0, 0.1, 0.5, 0.01, 1000.0);
        let mut block = [0.0f32; 16];
        env.render(&mut block); // part way up the 1s attack

        let level_at_release = block[15];
        assert!(level_at_release < 0.5);

        env.release();
        env.render(&mut block);
        // No jump upward at the release point.
        assert!(block[0] <= level_at_release);
    }

    #[test]
    fn test_decay_is_one_shot() {
        let mut env = DecayGen::new(Box::new(Flat::new()), 0.032, 1000.0);
        let mut block = [0.0f32; 32];

        // Never released, still fades to nothing.
        env.render(&mut block);
        assert!(block[0] > block[31]);
        assert!(env.is_finished());

        env.render(&mut block);
        assert!(block.iter().all(|s| *s == 0.0));
    }
}
