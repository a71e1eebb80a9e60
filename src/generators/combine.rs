// src/generators/combine.rs
//
// Two-input combiners.
//
// Each owns a scratch buffer sized to the compile-time block bound so
// rendering never allocates.

use crate::generator::Generator;

// ═══════════════════════════════════════════════════════════════════
// Mix (weighted sum)
// ═══════════════════════════════════════════════════════════════════

/// Crossfade of two branches: balance 0.0 is all `a`, 1.0 is all `b`.
/// A muted branch is compiled out before this ever sees it.
pub struct MixGen {
    a: Box<dyn Generator>,
    b: Box<dyn Generator>,
    balance: f32,
    scratch: Vec<f32>,
}

impl MixGen {
    pub fn new(a: Box<dyn Generator>, b: Box<dyn Generator>, balance: f32, max_block: usize) -> Self {
        Self {
            a,
            b,
            balance: balance.clamp(0.0, 1.0),
            scratch: vec![0.0; max_block],
        }
    }
}

impl Generator for MixGen {
    fn render(&mut self, out: &mut [f32]) {
        debug_assert!(
            out.len() <= self.scratch.len(),
            "render block of {} exceeds the compiled bound of {}",
            out.len(),
            self.scratch.len()
        );
        self.a.render(out);
        let tail = &mut self.scratch[..out.len()];
        self.b.render(tail);

        let gain_a = 1.0 - self.balance;
        let gain_b = self.balance;
        for (sample, &extra) in out.iter_mut().zip(tail.iter()) {
            *sample = *sample * gain_a + extra * gain_b;
        }
    }

    fn release(&mut self) {
        self.a.release();
        self.b.release();
    }

    fn is_finished(&self) -> bool {
        // A sum is silent only once both sides are.
        self.a.is_finished() && self.b.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Ring (product)
// ═══════════════════════════════════════════════════════════════════

pub struct RingGen {
    a: Box<dyn Generator>,
    b: Box<dyn Generator>,
    scratch: Vec<f32>,
}

impl RingGen {
    pub fn new(a: Box<dyn Generator>, b: Box<dyn Generator>, max_block: usize) -> Self {
        Self {
            a,
            b,
            scratch: vec![0.0; max_block],
        }
    }
}

impl Generator for RingGen {
    fn render(&mut self, out: &mut [f32]) {
        debug_assert!(
            out.len() <= self.scratch.len(),
            "render block of {} exceeds the compiled bound of {}",
            out.len(),
            self.scratch.len()
        );
        self.a.render(out);
        let tail = &mut self.scratch[..out.len()];
        self.b.render(tail);

        for (sample, &extra) in out.iter_mut().zip(tail.iter()) {
            *sample *= extra;
        }
    }

    fn release(&mut self) {
        self.a.release();
        self.b.release();
    }

    fn is_finished(&self) -> bool {
        // A product is silent as soon as either side is.
        self.a.is_finished() || self.b.is_finished()
    }
}
