// src/generator.rs

/// A running signal source inside a voice tree.
///
/// Generators:
/// - own all of their synthesis state (nothing shared between voices)
/// - render one mono block at a time, writing the full slice
/// - do NOT allocate in `render`
///
/// The slice passed to `render` is never longer than the `max_block`
/// the tree was compiled for; combiners size their scratch buffers to
/// that bound at construction.
pub trait Generator: Send {
    /// Fill `out` with the next block of samples.
    fn render(&mut self, out: &mut [f32]);

    /// Key up. Envelopes start their tail; bare sources fall silent.
    fn release(&mut self);

    /// True once the generator will only ever produce silence.
    /// Finished generators still render (zeros) when asked.
    fn is_finished(&self) -> bool;
}

/// A compiled, self-contained generator tree for one voice.
///
/// Two trees compiled from the same patch share no mutable state:
/// advancing one never affects the other.
pub struct VoiceTree {
    root: Box<dyn Generator>,
}

impl VoiceTree {
    pub(crate) fn new(root: Box<dyn Generator>) -> Self {
        Self { root }
    }

    pub fn render(&mut self, out: &mut [f32]) {
        self.root.render(out);
    }

    pub fn release(&mut self) {
        self.root.release();
    }

    pub fn is_finished(&self) -> bool {
        self.root.is_finished()
    }
}

impl std::fmt::Debug for VoiceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceTree")
            .field("finished", &self.is_finished())
            .finish()
    }
}
