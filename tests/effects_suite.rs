use seed_reactor::effects::{
    AudioEffectsChain, BREAK_ACTIVATION, CUTOFF_FLOOR_HZ, FEEDBACK_CLAMP, GATE_FLOOR,
    break_targets, drift_targets, echo_targets,
};
use seed_reactor::params::AudioEffectParams;
use ringbuf::traits::{Consumer as _, Producer as _};

const SR: f32 = 48_000.0;

fn settled_chain(params: AudioEffectParams) -> AudioEffectsChain {
    let mut chain = AudioEffectsChain::new(SR);
    chain.set_params(params);
    // Control smoothing moves 5% per call; a few hundred calls is steady state.
    for _ in 0..400 {
        chain.update();
    }
    chain
}

#[test]
fn echo_feedback_never_exceeds_clamp() {
    for i in 0..=1000 {
        let e = i as f32 / 1000.0;
        let t = echo_targets(e);
        assert!(
            t.feedback <= FEEDBACK_CLAMP + 1e-6,
            "feedback {} at echo={e}",
            t.feedback
        );
    }
}

#[test]
fn echo_wet_mix_walks_the_three_segments() {
    assert_eq!(echo_targets(0.0).wet_mix, 0.0);
    assert!((echo_targets(0.3).wet_mix - 0.12).abs() < 1e-5);
    assert!((echo_targets(0.7).wet_mix - 0.40).abs() < 1e-5);
    assert!((echo_targets(1.0).wet_mix - 0.65).abs() < 1e-5);

    let mut prev = -1.0;
    for i in 0..=1000 {
        let t = echo_targets(i as f32 / 1000.0);
        assert!(t.wet_mix >= prev - 1e-6, "wet mix must be monotone");
        prev = t.wet_mix;
    }
}

#[test]
fn echo_delay_time_spans_the_documented_range() {
    assert!((echo_targets(0.0).delay_ms - 150.0).abs() < 1e-3);
    assert!((echo_targets(1.0).delay_ms - 500.0).abs() < 1e-3);
}

#[test]
fn drift_sweep_never_dips_below_the_cutoff_floor() {
    for i in 0..=1000 {
        let d = i as f32 / 1000.0;
        let t = drift_targets(d);
        let lowest = t.center_hz - t.sweep_depth_hz;
        assert!(
            lowest >= CUTOFF_FLOOR_HZ - 1e-3,
            "swept cutoff reaches {lowest} Hz at drift={d}"
        );
    }
}

#[test]
fn drift_depth_and_rate_grow_with_the_control() {
    let low = drift_targets(0.2);
    let high = drift_targets(0.9);
    assert!(high.sweep_rate_hz > low.sweep_rate_hz);
    assert!(high.q > low.q);
}

#[test]
fn break_stage_bypasses_below_activation_threshold() {
    assert!(!break_targets(0.0).active);
    assert!(!break_targets(BREAK_ACTIVATION - 0.01).active);
    assert!(break_targets(BREAK_ACTIVATION + 0.01).active);

    let off = break_targets(0.02);
    assert_eq!(off.gate_depth, 0.0);
    assert_eq!(off.gate_center, 1.0);
}

#[test]
fn break_depth_and_rate_rise_through_independent_segments() {
    let mut prev_depth = -1.0;
    let mut prev_rate = -1.0;
    for i in 0..=100 {
        let t = break_targets(BREAK_ACTIVATION + (1.0 - BREAK_ACTIVATION) * i as f32 / 100.0);
        assert!(t.gate_depth >= prev_depth - 1e-6);
        assert!(t.gate_rate_hz >= prev_rate - 1e-6);
        assert!((t.gate_center - (1.0 - t.gate_depth * 0.5)).abs() < 1e-6);
        prev_depth = t.gate_depth;
        prev_rate = t.gate_rate_hz;
    }
    assert!(break_targets(1.0).gate_depth < 1.0, "gate never fully closes");
}

#[test]
fn gate_dips_but_never_reaches_silence() {
    let mut chain = settled_chain(AudioEffectParams::new(0.0, 0.0, 1.0));

    // One second of DC through the gate: enough for several LFO cycles and
    // for the per-sample ramps to settle.
    let mut buf = vec![1.0f32; SR as usize];
    chain.process_block(&mut buf);

    let tail = &buf[buf.len() / 2..];
    let min = tail.iter().copied().fold(f32::INFINITY, f32::min);
    let max = tail.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    assert!(
        min >= GATE_FLOOR * 0.95,
        "gate dipped to {min}, below the volume floor"
    );
    assert!(min < 0.5, "gate at full depth should dip hard, min={min}");
    assert!(max > 0.9, "gate should reopen between dips, max={max}");
}

#[test]
fn control_smoothing_moves_five_percent_per_update() {
    let mut chain = AudioEffectsChain::new(SR);
    chain.set_params(AudioEffectParams::new(1.0, 0.0, 0.0));

    chain.update();
    assert!((chain.params().echo - 0.05).abs() < 1e-4);

    for _ in 0..9 {
        chain.update();
    }
    let expected = 1.0 - 0.95f32.powi(10);
    assert!((chain.params().echo - expected).abs() < 1e-3);
}

#[test]
fn smoothed_controls_converge_to_the_external_target() {
    let target = AudioEffectParams::new(0.8, 0.35, 0.6);
    let chain = settled_chain(target);
    let current = chain.params();
    assert!((current.echo - target.echo).abs() < 1e-3);
    assert!((current.drift - target.drift).abs() < 1e-3);
    assert!((current.break_level - target.break_level).abs() < 1e-3);
}

#[test]
fn debug_accessor_reports_the_computed_stage_values() {
    let chain = settled_chain(AudioEffectParams::new(0.6, 0.4, 0.7));
    let dbg = chain.stage_debug();
    assert_eq!(dbg.echo, echo_targets(chain.params().echo));
    assert_eq!(dbg.drift, drift_targets(chain.params().drift));
    assert_eq!(dbg.break_stage, break_targets(chain.params().break_level));
    assert_eq!(dbg.target, AudioEffectParams::new(0.6, 0.4, 0.7));
}

#[test]
fn ring_endpoints_pass_the_signal_through() {
    let mut chain = AudioEffectsChain::new(SR);
    let samples: Vec<f32> = (0..1000)
        .map(|i| (i as f32 * 0.05).sin() * 0.5)
        .collect();

    assert_eq!(chain.input().push_slice(&samples), samples.len());
    chain.update();
    chain.pump();

    let mut drained = Vec::new();
    while let Some(s) = chain.output().try_pop() {
        drained.push(s);
    }
    assert_eq!(drained.len(), samples.len());
    assert!(drained.iter().all(|s| s.is_finite()));
}

#[test]
fn parameter_jumps_are_ramped_not_stepped() {
    // Settle at a mid echo setting with the delay line fully charged: several
    // seconds of DC lets the feedback recursion reach its geometric steady
    // state so only parameter movement remains visible.
    let mut chain = settled_chain(AudioEffectParams::new(0.5, 0.0, 0.0));
    let mut warm = vec![1.0f32; 3 * SR as usize];
    chain.process_block(&mut warm);

    // Slam the target to full and watch the output: the two smoothing layers
    // must keep per-sample movement tiny.
    chain.set_params(AudioEffectParams::new(1.0, 0.0, 0.0));
    let mut max_delta = 0.0f32;
    let mut prev = *warm.last().unwrap();
    for _ in 0..50 {
        chain.update();
        let mut block = vec![1.0f32; 480];
        chain.process_block(&mut block);
        for &s in &block {
            max_delta = max_delta.max((s - prev).abs());
            prev = s;
        }
    }
    assert!(
        max_delta < 0.02,
        "parameter jump produced an audible step: {max_delta}"
    );
}

#[test]
fn dispose_stops_the_signal_path() {
    let mut chain = settled_chain(AudioEffectParams::new(0.4, 0.4, 0.4));
    chain.dispose();
    assert!(chain.is_disposed());

    let _ = chain.input().push_slice(&[0.5; 64]);
    chain.update();
    chain.pump();
    assert!(chain.output().try_pop().is_none(), "disposed chain must not emit");

    let mut block = [0.7f32; 16];
    chain.process_block(&mut block);
    assert_eq!(block, [0.7f32; 16], "disposed chain must not process");
}
