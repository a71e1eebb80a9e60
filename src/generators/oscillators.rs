// src/generators/oscillators.rs
//
// Basic oscillator generators.
//
// All run at a frequency fixed when the voice was compiled. A bare
// oscillator has no tail: key up silences it. Put an envelope above it
// in the patch to shape a release.

use std::f32::consts::TAU;

use crate::generator::Generator;

// ═══════════════════════════════════════════════════════════════════
// Sine
// ═══════════════════════════════════════════════════════════════════

pub struct SineGen {
    phase: f32,
    inc: f32,
    level: f32,
    held: bool,
}

impl SineGen {
    pub fn new(freq: f64, sample_rate: f64, level: f32) -> Self {
        Self {
            phase: 0.0,
            inc: (freq / sample_rate) as f32,
            level,
            held: true,
        }
    }
}

impl Generator for SineGen {
    fn render(&mut self, out: &mut [f32]) {
        if !self.held {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            *sample = (self.phase * TAU).sin() * self.level;
            self.phase = (self.phase + self.inc).fract();
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}

// ═══════════════════════════════════════════════════════════════════
// Saw (naive, non-bandlimited)
// ═══════════════════════════════════════════════════════════════════

pub struct SawGen {
    phase: f32,
    inc: f32,
    level: f32,
    held: bool,
}

impl SawGen {
    pub fn new(freq: f64, sample_rate: f64, level: f32) -> Self {
        Self {
            phase: 0.0,
            inc: (freq / sample_rate) as f32,
            level,
            held: true,
        }
    }
}

impl Generator for SawGen {
    fn render(&mut self, out: &mut [f32]) {
        if !self.held {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            *sample = (self.phase * 2.0 - 1.0) * self.level;
            self.phase = (self.phase + self.inc).fract();
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}

// ═══════════════════════════════════════════════════════════════════
// Square with adjustable pulse width
// ═══════════════════════════════════════════════════════════════════

pub struct SquareGen {
    phase: f32,
    inc: f32,
    width: f32,
    level: f32,
    held: bool,
}

impl SquareGen {
    pub fn new(freq: f64, sample_rate: f64, width: f32, level: f32) -> Self {
        Self {
            phase: 0.0,
            inc: (freq / sample_rate) as f32,
            width: width.clamp(0.05, 0.95),
            level,
            held: true,
        }
    }
}

impl Generator for SquareGen {
    fn render(&mut self, out: &mut [f32]) {
        if !self.held {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            *sample = if self.phase < self.width {
                self.level
            } else {
                -self.level
            };
            self.phase = (self.phase + self.inc).fract();
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}

// ═══════════════════════════════════════════════════════════════════
// Triangle
// ═══════════════════════════════════════════════════════════════════

pub struct TriangleGen {
    phase: f32,
    inc: f32,
    level: f32,
    held: bool,
}

impl TriangleGen {
    pub fn new(freq: f64, sample_rate: f64, level: f32) -> Self {
        Self {
            phase: 0.0,
            inc: (freq / sample_rate) as f32,
            level,
            held: true,
        }
    }
}

impl Generator for TriangleGen {
    fn render(&mut self, out: &mut [f32]) {
        if !self.held {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            *sample = (1.0 - 4.0 * (self.phase - 0.5).abs()) * self.level;
            self.phase = (self.phase + self.inc).fract();
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}

// ═══════════════════════════════════════════════════════════════════
// Noise (white, or pink via a one-pole lowpass)
// ═══════════════════════════════════════════════════════════════════

pub struct NoiseGen {
    rng: fastrand::Rng,
    pink: bool,
    filt: f32,
    level: f32,
    held: bool,
}

impl NoiseGen {
    pub fn new(pink: bool, level: f32) -> Self {
        Self {
            rng: fastrand::Rng::new(),
            pink,
            filt: 0.0,
            level,
            held: true,
        }
    }
}

impl Generator for NoiseGen {
    fn render(&mut self, out: &mut [f32]) {
        if !self.held {
            out.fill(0.0);
            return;
        }
        for sample in out.iter_mut() {
            let white = self.rng.f32() * 2.0 - 1.0;
            let value = if self.pink {
                self.filt += (white - self.filt) * 0.04;
                self.filt * 3.5
            } else {
                white
            };
            *sample = value * self.level;
        }
    }

    fn release(&mut self) {
        self.held = false;
    }

    fn is_finished(&self) -> bool {
        !self.held
    }
}
