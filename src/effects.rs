//! The audio effects signal chain: three cascaded stages (echo, drift,
//! break), each bypassable at zero, with two independent levels of
//! smoothing. Control values move 5% per `update` toward their externally
//! set targets; the physical node parameters they produce move through
//! short per-sample ramps so changes never click.

use crate::params::AudioEffectParams;
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Observer as _, Producer as _, Split as _};
use std::f32::consts::TAU;

/// Fraction of the control-to-target distance covered per `update` call.
const CONTROL_SMOOTHING: f32 = 0.05;
/// Time constant for per-sample parameter ramps, milliseconds.
const RAMP_TAU_MS: f32 = 30.0;

/// Feedback gain ceiling. The delay line must never be able to self-oscillate
/// into runaway gain, whatever the control says.
pub const FEEDBACK_CLAMP: f32 = 0.6;
/// Lowest cutoff the drift sweep may reach: maximum drift colors the signal,
/// it never silences it.
pub const CUTOFF_FLOOR_HZ: f32 = 2400.0;
const CUTOFF_MAX_HZ: f32 = 16_000.0;
/// Gate gain floor: the break stage dips volume, never to absolute silence.
pub const GATE_FLOOR: f32 = 0.08;
/// Below this the break stage is fully bypassed.
pub const BREAK_ACTIVATION: f32 = 0.05;

const DELAY_MIN_MS: f32 = 150.0;
const DELAY_MAX_MS: f32 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EchoTargets {
    pub wet_mix: f32,
    pub feedback: f32,
    pub delay_ms: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftTargets {
    pub center_hz: f32,
    pub q: f32,
    pub sweep_depth_hz: f32,
    pub sweep_rate_hz: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakTargets {
    pub gate_depth: f32,
    pub gate_rate_hz: f32,
    pub gate_center: f32,
    pub active: bool,
}

/// Echo control -> physical targets. Wet mix rises through three
/// piecewise-linear segments: barely audible, roomy, dubby.
pub fn echo_targets(e: f32) -> EchoTargets {
    let e = e.clamp(0.0, 1.0);
    let wet_mix = if e < 0.3 {
        e / 0.3 * 0.12
    } else if e < 0.7 {
        0.12 + (e - 0.3) / 0.4 * 0.28
    } else {
        0.40 + (e - 0.7) / 0.3 * 0.25
    };
    let feedback = (0.15 + e * 0.55).min(FEEDBACK_CLAMP);
    let delay_ms = DELAY_MIN_MS + (DELAY_MAX_MS - DELAY_MIN_MS) * e;
    EchoTargets {
        wet_mix,
        feedback,
        delay_ms,
    }
}

/// Drift control -> filter targets. Sweep depth is capped so the swept
/// cutoff can never dip below [`CUTOFF_FLOOR_HZ`].
pub fn drift_targets(d: f32) -> DriftTargets {
    let d = d.clamp(0.0, 1.0);
    let center_hz = CUTOFF_MAX_HZ - (CUTOFF_MAX_HZ - CUTOFF_FLOOR_HZ) * d * 0.8;
    let depth = (center_hz - CUTOFF_FLOOR_HZ) * (0.3 + 0.5 * d);
    let sweep_depth_hz = depth.min(center_hz - CUTOFF_FLOOR_HZ);
    DriftTargets {
        center_hz,
        q: 0.9 + 2.6 * d,
        sweep_depth_hz,
        sweep_rate_hz: 0.05 + 0.40 * d,
    }
}

/// Break control -> gate targets. Depth and rate rise through independent
/// piecewise segments; below the activation threshold the stage is off.
pub fn break_targets(b: f32) -> BreakTargets {
    let b = b.clamp(0.0, 1.0);
    if b < BREAK_ACTIVATION {
        return BreakTargets {
            gate_depth: 0.0,
            gate_rate_hz: 0.0,
            gate_center: 1.0,
            active: false,
        };
    }
    let gate_depth = if b < 0.4 {
        (b - BREAK_ACTIVATION) / (0.4 - BREAK_ACTIVATION) * 0.45
    } else if b < 0.8 {
        0.45 + (b - 0.4) / 0.4 * 0.35
    } else {
        0.80 + (b - 0.8) / 0.2 * 0.12
    };
    let gate_rate_hz = if b < 0.5 {
        0.5 + (b - BREAK_ACTIVATION) / (0.5 - BREAK_ACTIVATION) * 1.5
    } else {
        2.0 + (b - 0.5) / 0.5 * 4.0
    };
    BreakTargets {
        gate_depth,
        gate_rate_hz,
        gate_center: 1.0 - gate_depth * 0.5,
        active: true,
    }
}

/// One-pole ramp toward a target, advanced per sample. This is the node-level
/// smoothing layer, independent of the control-level smoothing in `update`.
#[derive(Debug, Clone, Copy)]
struct ParamRamp {
    current: f32,
    target: f32,
    coeff: f32,
}

impl ParamRamp {
    fn new(value: f32, sample_rate: f32) -> Self {
        let samples = (RAMP_TAU_MS / 1000.0 * sample_rate).max(1.0);
        Self {
            current: value,
            target: value,
            coeff: 1.0 - (-1.0 / samples).exp(),
        }
    }

    fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    fn tick(&mut self) -> f32 {
        self.current += (self.target - self.current) * self.coeff;
        self.current
    }

    fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }
}

struct EchoStage {
    buf: Vec<f32>,
    write_pos: usize,
    wet: ParamRamp,
    feedback: ParamRamp,
    delay_samples: ParamRamp,
}

impl EchoStage {
    fn new(sample_rate: f32) -> Self {
        let max_delay = (DELAY_MAX_MS / 1000.0 * sample_rate).ceil() as usize + 2;
        let t = echo_targets(0.0);
        Self {
            buf: vec![0.0; max_delay],
            write_pos: 0,
            wet: ParamRamp::new(0.0, sample_rate),
            feedback: ParamRamp::new(t.feedback, sample_rate),
            delay_samples: ParamRamp::new(t.delay_ms / 1000.0 * sample_rate, sample_rate),
        }
    }

    fn retarget(&mut self, t: EchoTargets, wet_scale: f32, sample_rate: f32) {
        self.wet.set_target(t.wet_mix * wet_scale);
        self.feedback.set_target(t.feedback.min(FEEDBACK_CLAMP));
        self.delay_samples
            .set_target(t.delay_ms / 1000.0 * sample_rate);
    }

    fn process(&mut self, x: f32) -> f32 {
        let wet = self.wet.tick();
        let feedback = self.feedback.tick().min(FEEDBACK_CLAMP);
        let delay = self.delay_samples.tick().max(1.0);

        let len = self.buf.len();
        // Fractional read keeps the delay sweep click-free while the ramp moves.
        let read = self.write_pos as f32 + len as f32 - delay.min(len as f32 - 1.0);
        let i0 = read as usize % len;
        let i1 = (i0 + 1) % len;
        let frac = read.fract();
        let delayed = self.buf[i0] * (1.0 - frac) + self.buf[i1] * frac;

        self.buf[self.write_pos] = x + delayed * feedback;
        self.write_pos = (self.write_pos + 1) % len;

        x * (1.0 - wet * 0.3) + delayed * wet
    }

    fn clear(&mut self) {
        self.buf.fill(0.0);
        self.wet.snap(0.0);
    }
}

struct DriftStage {
    center_hz: ParamRamp,
    q: ParamRamp,
    depth_hz: ParamRamp,
    rate_hz: ParamRamp,
    mix: ParamRamp,
    lfo_phase: f32,
    lp: f32,
    bp: f32,
    sample_rate: f32,
}

impl DriftStage {
    fn new(sample_rate: f32) -> Self {
        let t = drift_targets(0.0);
        Self {
            center_hz: ParamRamp::new(t.center_hz, sample_rate),
            q: ParamRamp::new(t.q, sample_rate),
            depth_hz: ParamRamp::new(t.sweep_depth_hz, sample_rate),
            rate_hz: ParamRamp::new(t.sweep_rate_hz, sample_rate),
            mix: ParamRamp::new(0.0, sample_rate),
            lfo_phase: 0.0,
            lp: 0.0,
            bp: 0.0,
            sample_rate,
        }
    }

    fn retarget(&mut self, t: DriftTargets, mix: f32) {
        self.center_hz.set_target(t.center_hz);
        self.q.set_target(t.q);
        self.depth_hz.set_target(t.sweep_depth_hz);
        self.rate_hz.set_target(t.sweep_rate_hz);
        self.mix.set_target(mix);
    }

    fn process(&mut self, x: f32) -> f32 {
        let mix = self.mix.tick();
        let center = self.center_hz.tick();
        let q = self.q.tick().max(0.5);
        let depth = self.depth_hz.tick();
        let rate = self.rate_hz.tick();

        self.lfo_phase = (self.lfo_phase + rate / self.sample_rate * TAU) % TAU;
        let sweep = 0.5 + 0.5 * self.lfo_phase.sin();
        let cutoff = (center - depth * sweep).max(CUTOFF_FLOOR_HZ);

        // State variable filter, low-pass tap.
        let f = (2.0 * (std::f32::consts::PI * cutoff / self.sample_rate).sin()).min(1.2);
        let hp = x - self.lp - self.bp / q;
        self.bp = (self.bp + f * hp).clamp(-4.0, 4.0);
        self.lp = (self.lp + f * self.bp).clamp(-4.0, 4.0);

        x * (1.0 - mix) + self.lp * mix
    }

    fn clear(&mut self) {
        self.lp = 0.0;
        self.bp = 0.0;
        self.lfo_phase = 0.0;
        self.mix.snap(0.0);
    }
}

struct BreakStage {
    depth: ParamRamp,
    rate_hz: ParamRamp,
    lfo_phase: f32,
    sample_rate: f32,
}

impl BreakStage {
    fn new(sample_rate: f32) -> Self {
        Self {
            depth: ParamRamp::new(0.0, sample_rate),
            rate_hz: ParamRamp::new(0.0, sample_rate),
            lfo_phase: 0.0,
            sample_rate,
        }
    }

    fn retarget(&mut self, t: BreakTargets) {
        self.depth.set_target(if t.active { t.gate_depth } else { 0.0 });
        self.rate_hz.set_target(t.gate_rate_hz);
    }

    fn process(&mut self, x: f32) -> f32 {
        let depth = self.depth.tick();
        let rate = self.rate_hz.tick();
        if depth <= 1e-4 {
            return x;
        }
        self.lfo_phase = (self.lfo_phase + rate / self.sample_rate * TAU) % TAU;
        // Squared sine shaping keeps the dips rounded; the floor keeps the
        // gate from ever reaching silence.
        let s = 0.5 + 0.5 * self.lfo_phase.sin();
        let gain = (1.0 - depth * s * s).max(GATE_FLOOR);
        x * gain
    }

    fn clear(&mut self) {
        self.lfo_phase = 0.0;
        self.depth.snap(0.0);
    }
}

/// Per-stage computed intermediates, for introspection tooling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainDebug {
    pub echo: EchoTargets,
    pub drift: DriftTargets,
    pub break_stage: BreakTargets,
    pub current: AudioEffectParams,
    pub target: AudioEffectParams,
}

pub struct AudioEffectsChain {
    target: AudioEffectParams,
    current: AudioEffectParams,
    sample_rate: f32,
    echo: EchoStage,
    drift: DriftStage,
    brk: BreakStage,
    in_prod: ringbuf::HeapProd<f32>,
    in_cons: ringbuf::HeapCons<f32>,
    out_prod: ringbuf::HeapProd<f32>,
    out_cons: ringbuf::HeapCons<f32>,
    scratch: Vec<f32>,
    disposed: bool,
}

impl AudioEffectsChain {
    pub fn new(sample_rate: f32) -> Self {
        let capacity = (sample_rate as usize).max(1024);
        let (in_prod, in_cons) = HeapRb::<f32>::new(capacity).split();
        let (out_prod, out_cons) = HeapRb::<f32>::new(capacity).split();
        Self {
            target: AudioEffectParams::default(),
            current: AudioEffectParams::default(),
            sample_rate,
            echo: EchoStage::new(sample_rate),
            drift: DriftStage::new(sample_rate),
            brk: BreakStage::new(sample_rate),
            in_prod,
            in_cons,
            out_prod,
            out_cons,
            scratch: Vec::with_capacity(4096),
            disposed: false,
        }
    }

    /// Sets the externally supplied target only; the internally held control
    /// values converge toward it across subsequent `update` calls.
    pub fn set_params(&mut self, params: AudioEffectParams) {
        self.target = params;
    }

    pub fn params(&self) -> AudioEffectParams {
        self.current
    }

    /// Advance control smoothing and push freshly computed physical targets
    /// onto the stage ramps. Call once per tick.
    pub fn update(&mut self) {
        if self.disposed {
            return;
        }
        self.current.echo += (self.target.echo - self.current.echo) * CONTROL_SMOOTHING;
        self.current.drift += (self.target.drift - self.current.drift) * CONTROL_SMOOTHING;
        self.current.break_level +=
            (self.target.break_level - self.current.break_level) * CONTROL_SMOOTHING;

        let echo = echo_targets(self.current.echo);
        // Echo at zero is fully dry; wet_scale gates the stage without
        // disturbing the other targets.
        let wet_scale = if self.current.echo <= 1e-3 { 0.0 } else { 1.0 };
        self.echo.retarget(echo, wet_scale, self.sample_rate);

        let drift = drift_targets(self.current.drift);
        let drift_mix = if self.current.drift <= 1e-3 {
            0.0
        } else {
            (self.current.drift * 3.0).min(1.0)
        };
        self.drift.retarget(drift, drift_mix);

        self.brk.retarget(break_targets(self.current.break_level));
    }

    /// Signal entry point: the host pushes source samples here.
    pub fn input(&mut self) -> &mut ringbuf::HeapProd<f32> {
        &mut self.in_prod
    }

    /// Signal exit point: the host drains processed samples from here.
    pub fn output(&mut self) -> &mut ringbuf::HeapCons<f32> {
        &mut self.out_cons
    }

    /// Move pending input through all three stages into the output ring.
    pub fn pump(&mut self) {
        if self.disposed {
            // Drain and drop: a disposed chain passes nothing through.
            while self.in_cons.try_pop().is_some() {}
            return;
        }
        self.scratch.clear();
        let budget = self.out_prod.vacant_len();
        while self.scratch.len() < budget {
            let Some(s) = self.in_cons.try_pop() else {
                break;
            };
            self.scratch.push(s);
        }
        for i in 0..self.scratch.len() {
            self.scratch[i] = self.process_sample(self.scratch[i]);
        }
        self.out_prod.push_slice(&self.scratch);
    }

    /// Process a block in place. Offline path used by tests and tooling; the
    /// live path is `input`/`pump`/`output`.
    pub fn process_block(&mut self, io: &mut [f32]) {
        if self.disposed {
            return;
        }
        for s in io.iter_mut() {
            *s = self.process_sample(*s);
        }
    }

    fn process_sample(&mut self, x: f32) -> f32 {
        let x = self.echo.process(x);
        let x = self.drift.process(x);
        self.brk.process(x)
    }

    pub fn stage_debug(&self) -> ChainDebug {
        ChainDebug {
            echo: echo_targets(self.current.echo),
            drift: drift_targets(self.current.drift),
            break_stage: break_targets(self.current.break_level),
            current: self.current,
            target: self.target,
        }
    }

    /// Silence the generators and release signal storage. The chain stays
    /// constructed but passes nothing through afterwards.
    pub fn dispose(&mut self) {
        self.echo.clear();
        self.drift.clear();
        self.brk.clear();
        self.scratch = Vec::new();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
