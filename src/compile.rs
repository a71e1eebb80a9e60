// src/compile.rs
//
// Compiles a Patch (declarative) into a VoiceTree (runtime).
//
// Runs on every note trigger. Each call produces a completely fresh
// tree, parameter values copied in at construction, nothing shared
// with the document or with other voices. Instancing follows the
// consuming connection, not the node: a source wired into two inputs
// compiles into two generators with independent state, one per branch.
//
// Compilation never fails loudly on the note path. A patch with no
// usable output yields `None`; anything broken below that point
// becomes a silent branch, logged, while the rest of the voice sounds.

use crate::generator::{Generator, VoiceTree};
use crate::generators::{
    AdsrGen, BiasGen, DecayGen, GainGen, KeyGateGen, MixGen, NoiseGen, RingGen, SawGen, SilenceGen,
    SineGen, SquareGen, SubPatchGen, TriangleGen,
};
use crate::state::{NodeDef, NodeId, NodeKind, Patch, PatchBank};

/// How deep sub-patch embedding may recurse before a branch is cut to
/// silence instead.
pub const MAX_SUBPATCH_DEPTH: usize = 16;

/// Everything one compile needs to know about the triggering note and
/// the host.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext {
    /// Base frequency of the note, before per-node octave and detune.
    pub freq_hz: f64,

    /// Tempo, used to bind `TimeLen` parameters to seconds.
    pub beats_per_second: f64,

    /// Trigger strength, applied at the tree root.
    pub amplitude: f32,

    pub sample_rate: f64,

    /// Upper bound on render block length; scratch buffers are sized
    /// to this.
    pub max_block: usize,
}

impl CompileContext {
    pub fn new(freq_hz: f64, amplitude: f32, sample_rate: f64, max_block: usize) -> Self {
        Self {
            freq_hz,
            beats_per_second: 2.0,
            amplitude,
            sample_rate,
            max_block,
        }
    }

    pub fn with_tempo(mut self, beats_per_second: f64) -> Self {
        self.beats_per_second = beats_per_second;
        self
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats / self.beats_per_second.max(1e-6)
    }
}

/// Compile `patch` for one note.
///
/// Returns `None` only when there is nothing to play: the patch has no
/// output node, or its output is unconnected.
pub fn compile(patch: &Patch, ctx: &CompileContext, bank: &PatchBank) -> Option<VoiceTree> {
    compile_at_depth(patch, ctx, bank, 0)
}

fn compile_at_depth(
    patch: &Patch,
    ctx: &CompileContext,
    bank: &PatchBank,
    depth: usize,
) -> Option<VoiceTree> {
    let output = match patch.output_node().and_then(|id| patch.node(id)) {
        Some(node) => node,
        None => {
            log::debug!("patch {:?} has no output node, nothing to play", patch.name);
            return None;
        }
    };
    let source = match output.input_ref("in") {
        Some(id) => id,
        None => {
            log::debug!(
                "output of patch {:?} is unconnected, nothing to play",
                patch.name
            );
            return None;
        }
    };

    let level = float_param(output, "level", 1.0);
    // The trigger amplitude applies once, at the outermost root.
    let gain = if depth == 0 {
        ctx.amplitude * level
    } else {
        level
    };

    let root = build_node(patch, source, ctx, bank, depth);
    Some(VoiceTree::new(Box::new(GainGen::new(root, gain))))
}

fn build_node(
    patch: &Patch,
    id: NodeId,
    ctx: &CompileContext,
    bank: &PatchBank,
    depth: usize,
) -> Box<dyn Generator> {
    let Some(node) = patch.node(id) else {
        // Unreachable through the editing API; survived state damage
        // still compiles, minus this branch.
        log::warn!("connection references missing node {id}, substituting silence");
        return Box::new(SilenceGen);
    };

    match node.kind() {
        NodeKind::Sine | NodeKind::Saw | NodeKind::Square | NodeKind::Triangle => {
            build_oscillator(node, ctx)
        }

        NodeKind::Noise => {
            let pink = node.param("color").and_then(|v| v.as_choice()).unwrap_or(0) == 1;
            Box::new(NoiseGen::new(pink, float_param(node, "level", 1.0)))
        }

        NodeKind::Adsr => {
            let child = build_input(patch, node, "in", ctx, bank, depth);
            Box::new(AdsrGen::new(
                child,
                time_param(node, "attack", ctx, 0.05),
                time_param(node, "decay", ctx, 0.25),
                node.param("sustain").and_then(|v| v.as_float()).unwrap_or(0.7),
                time_param(node, "release", ctx, 0.5),
                ctx.sample_rate,
            ))
        }

        NodeKind::Decay => {
            let child = build_input(patch, node, "in", ctx, bank, depth);
            Box::new(DecayGen::new(
                child,
                time_param(node, "time", ctx, 1.0),
                ctx.sample_rate,
            ))
        }

        NodeKind::Mix => {
            let a = build_input(patch, node, "a", ctx, bank, depth);
            let b = build_input(patch, node, "b", ctx, bank, depth);
            Box::new(MixGen::new(
                a,
                b,
                float_param(node, "balance", 0.5),
                ctx.max_block,
            ))
        }

        NodeKind::Ring => {
            let a = build_input(patch, node, "a", ctx, bank, depth);
            let b = build_input(patch, node, "b", ctx, bank, depth);
            Box::new(RingGen::new(a, b, ctx.max_block))
        }

        NodeKind::Gain => {
            let child = build_input(patch, node, "in", ctx, bank, depth);
            Box::new(GainGen::new(child, float_param(node, "amount", 1.0)))
        }

        NodeKind::Bias => {
            let child = build_input(patch, node, "in", ctx, bank, depth);
            Box::new(BiasGen::new(child, float_param(node, "offset", 0.0)))
        }

        NodeKind::KeyGate => Box::new(KeyGateGen::new(float_param(node, "level", 1.0))),

        NodeKind::SubPatch => build_subpatch(node, ctx, bank, depth),

        NodeKind::Comment | NodeKind::Output => {
            log::warn!(
                "{} node {id} cannot feed a connection, substituting silence",
                node.kind()
            );
            Box::new(SilenceGen)
        }
    }
}

/// The branch feeding `name` on `node`: the compiled source when the
/// input is connected and in use, silence otherwise.
fn build_input(
    patch: &Patch,
    node: &NodeDef,
    name: &str,
    ctx: &CompileContext,
    bank: &PatchBank,
    depth: usize,
) -> Box<dyn Generator> {
    match node.input_ref(name) {
        Some(target) if node.input_in_use(name) => build_node(patch, target, ctx, bank, depth),
        _ => Box::new(SilenceGen),
    }
}

fn build_oscillator(node: &NodeDef, ctx: &CompileContext) -> Box<dyn Generator> {
    let octave = node.param("octave").and_then(|v| v.as_int()).unwrap_or(0);
    let detune = node.param("detune").and_then(|v| v.as_float()).unwrap_or(0.0);
    let level = float_param(node, "level", 1.0);

    // Note frequency shifted by whole octaves plus detune cents.
    let freq = ctx.freq_hz * 2f64.powi(octave) * (detune / 1200.0).exp2();

    match node.kind() {
        NodeKind::Sine => Box::new(SineGen::new(freq, ctx.sample_rate, level)),
        NodeKind::Saw => Box::new(SawGen::new(freq, ctx.sample_rate, level)),
        NodeKind::Square => Box::new(SquareGen::new(
            freq,
            ctx.sample_rate,
            float_param(node, "pulse_width", 0.5),
            level,
        )),
        NodeKind::Triangle => Box::new(TriangleGen::new(freq, ctx.sample_rate, level)),
        _ => Box::new(SilenceGen),
    }
}

fn build_subpatch(
    node: &NodeDef,
    ctx: &CompileContext,
    bank: &PatchBank,
    depth: usize,
) -> Box<dyn Generator> {
    if depth >= MAX_SUBPATCH_DEPTH {
        log::warn!("sub-patch nesting deeper than {MAX_SUBPATCH_DEPTH}, substituting silence");
        return Box::new(SilenceGen);
    }
    // An unset reference is a normal editing state, not worth a log.
    let Some(target) = node.param("patch").and_then(|v| v.as_patch_ref()) else {
        return Box::new(SilenceGen);
    };
    let Some(sub) = bank.get(target) else {
        log::warn!("sub-patch references missing patch {target}, substituting silence");
        return Box::new(SilenceGen);
    };

    match compile_at_depth(sub, ctx, bank, depth + 1) {
        Some(tree) => Box::new(SubPatchGen::new(tree, float_param(node, "level", 1.0))),
        None => Box::new(SilenceGen),
    }
}

fn float_param(node: &NodeDef, name: &str, fallback: f32) -> f32 {
    node.param(name)
        .and_then(|v| v.as_float())
        .map(|v| v as f32)
        .unwrap_or(fallback)
}

fn time_param(node: &NodeDef, name: &str, ctx: &CompileContext, fallback: f64) -> f64 {
    let beats = node
        .param(name)
        .and_then(|v| v.as_time_len())
        .unwrap_or(fallback);
    ctx.beats_to_seconds(beats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ParamValue;

    fn ctx() -> CompileContext {
        CompileContext::new(440.0, 1.0, 48_000.0, 256)
    }

    fn sine_patch() -> (Patch, NodeId) {
        let mut patch = Patch::new("test");
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        let out = patch.output_node().unwrap();
        patch.rewire(osc, out, "in").unwrap();
        (patch, osc)
    }

    fn render_block(tree: &mut VoiceTree) -> [f32; 256] {
        let mut block = [0.0f32; 256];
        tree.render(&mut block);
        block
    }

    #[test]
    fn test_unconnected_output_compiles_to_nothing() {
        let patch = Patch::new("empty");
        let bank = PatchBank::new();
        assert!(compile(&patch, &ctx(), &bank).is_none());
    }

    #[test]
    fn test_sine_patch_makes_sound() {
        let (patch, _) = sine_patch();
        let bank = PatchBank::new();

        let mut tree = compile(&patch, &ctx(), &bank).unwrap();
        let block = render_block(&mut tree);
        assert!(block.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_voices_are_independent() {
        let (patch, _) = sine_patch();
        let bank = PatchBank::new();

        let mut first = compile(&patch, &ctx(), &bank).unwrap();
        let mut second = compile(&patch, &ctx(), &bank).unwrap();

        // Advance the first voice a few blocks.
        for _ in 0..5 {
            render_block(&mut first);
        }

        // The second still starts from scratch.
        let fresh = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());
        let late = render_block(&mut second);
        assert_eq!(late, fresh);
    }

    #[test]
    fn test_fan_out_compiles_one_generator_per_branch() {
        // Ring a noise source with itself: each consuming connection
        // compiles its own instance, so the two streams differ and
        // their product dips below zero somewhere in the block.
        let mut patch = Patch::new("fan");
        let out = patch.output_node().unwrap();
        let ring = patch.add_node(NodeDef::new(NodeKind::Ring)).unwrap();
        let noise = patch.add_node(NodeDef::new(NodeKind::Noise)).unwrap();
        patch.rewire(ring, out, "in").unwrap();
        patch.rewire(noise, ring, "a").unwrap();
        patch.rewire(noise, ring, "b").unwrap();
        let bank = PatchBank::new();

        let block = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());
        assert!(block.iter().any(|s| *s < 0.0));
    }

    #[test]
    fn test_params_are_copied_at_compile_time() {
        let (mut patch, osc) = sine_patch();
        let bank = PatchBank::new();

        let mut tree = compile(&patch, &ctx(), &bank).unwrap();

        // Editing the document must not touch the sounding voice.
        patch
            .set_param(osc, "level", ParamValue::Float(0.0))
            .unwrap();

        let block = render_block(&mut tree);
        assert!(block.iter().any(|s| s.abs() > 0.1));

        // But the next voice picks the edit up.
        let mut muted = compile(&patch, &ctx(), &bank).unwrap();
        let block = render_block(&mut muted);
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_muted_mix_branch_is_silent() {
        let mut patch = Patch::new("mix");
        let out = patch.output_node().unwrap();
        let mix = patch.add_node(NodeDef::new(NodeKind::Mix)).unwrap();
        let osc = patch.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
        patch.rewire(mix, out, "in").unwrap();
        patch.rewire(osc, mix, "a").unwrap();
        patch
            .set_param(mix, "balance", ParamValue::Float(0.0))
            .unwrap();
        let bank = PatchBank::new();

        let block = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());
        assert!(block.iter().any(|s| s.abs() > 0.1));

        patch
            .set_param(mix, "mute_a", ParamValue::Bool(true))
            .unwrap();
        let block = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_octave_shift_doubles_frequency() {
        // Count zero crossings of a sine at +1 octave vs baseline.
        fn crossings(block: &[f32]) -> usize {
            block.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
        }

        let (patch, _) = sine_patch();
        let bank = PatchBank::new();
        let base = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());

        let (mut patch_up, osc) = sine_patch();
        patch_up.set_param(osc, "octave", ParamValue::Int(1)).unwrap();
        let up = render_block(&mut compile(&patch_up, &ctx(), &bank).unwrap());

        let low = crossings(&base);
        let high = crossings(&up);
        assert!(high >= low * 2 - 1 && high <= low * 2 + 1, "{low} vs {high}");
    }

    #[test]
    fn test_embedded_patch_sounds() {
        let mut bank = PatchBank::new();
        let inner_id = bank.create_patch("inner");
        {
            let inner = bank.get_mut(inner_id).unwrap();
            let osc = inner.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
            let out = inner.output_node().unwrap();
            inner.rewire(osc, out, "in").unwrap();
        }

        let outer_id = bank.create_patch("outer");
        let sub = {
            let outer = bank.get_mut(outer_id).unwrap();
            let sub = outer.add_node(NodeDef::new(NodeKind::SubPatch)).unwrap();
            let out = outer.output_node().unwrap();
            outer.rewire(sub, out, "in").unwrap();
            sub
        };
        bank.set_patch_ref(outer_id, sub, "patch", Some(inner_id))
            .unwrap();

        let outer = bank.get(outer_id).unwrap();
        let block = render_block(&mut compile(outer, &ctx(), &bank).unwrap());
        assert!(block.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_unset_sub_patch_is_a_silent_branch() {
        let mut patch = Patch::new("outer");
        let out = patch.output_node().unwrap();
        let sub = patch.add_node(NodeDef::new(NodeKind::SubPatch)).unwrap();
        patch.rewire(sub, out, "in").unwrap();
        let bank = PatchBank::new();

        // Still compiles; the branch is just silent.
        let block = render_block(&mut compile(&patch, &ctx(), &bank).unwrap());
        assert!(block.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_nesting_depth_is_capped() {
        // A chain of patches each embedding the next, far past the
        // cap. Must compile without overflowing and render silence
        // from the cut-off branch downward.
        let mut bank = PatchBank::new();
        let chain: Vec<_> = (0..MAX_SUBPATCH_DEPTH + 4)
            .map(|i| bank.create_patch(format!("level {i}")))
            .collect();

        for pair in chain.windows(2) {
            let sub = {
                let patch = bank.get_mut(pair[0]).unwrap();
                let sub = patch.add_node(NodeDef::new(NodeKind::SubPatch)).unwrap();
                let out = patch.output_node().unwrap();
                patch.rewire(sub, out, "in").unwrap();
                sub
            };
            bank.set_patch_ref(pair[0], sub, "patch", Some(pair[1]))
                .unwrap();
        }
        // The deepest patch would make sound if it were reachable.
        {
            let last = bank.get_mut(*chain.last().unwrap()).unwrap();
            let osc = last.add_node(NodeDef::new(NodeKind::Sine)).unwrap();
            let out = last.output_node().unwrap();
            last.rewire(osc, out, "in").unwrap();
        }

        let top = bank.get(chain[0]).unwrap();
        let mut tree = compile(top, &ctx(), &bank).unwrap();
        let block = render_block(&mut tree);
        assert!(block.iter().all(|s| *s == 0.0));
    }
}
