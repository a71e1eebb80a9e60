// src/generators/mod.rs
//
// Signal generators, one family per node category.

mod combine;
mod envelopes;
mod oscillators;
mod utility;

pub use combine::{MixGen, RingGen};
pub use envelopes::{AdsrGen, DecayGen};
pub use oscillators::{NoiseGen, SawGen, SineGen, SquareGen, TriangleGen};
pub use utility::{BiasGen, GainGen, KeyGateGen, SilenceGen, SubPatchGen};
