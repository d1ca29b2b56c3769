//! GPU-style double-buffered simulation/render engine, CPU backend.
//!
//! Owns a ping-pong pair of state buffers at a negotiated precision, a
//! seeded noise field, and the update/render kernel pair. Each tick maps the
//! user controls through the perceptual curves, advances every cell into the
//! "next" buffer, swaps, and shades the current state into an RGBA frame.

mod kernel;
mod noise;
mod state;

use crate::capability::CapabilityReport;
use crate::features::AudioFeatureFrame;
use crate::params::VisualizerParams;
use crate::perceptual::{
    energy_layer, map_audio_reactivity, map_density, map_speed, map_to_perceptual_zone,
};
use crate::seed::seed_hash;
use anyhow::anyhow;
use std::f32::consts::TAU;

pub use kernel::{CpuKernel, KernelInputs, SimKernel};
pub use noise::NoiseField;
pub use state::{AllocError, StateBuffer, f16_to_f32, f32_to_f16};

/// A stalled frame may hand us a huge delta; clamp before it reaches the
/// update kernel so it cannot inject a destabilizing step.
pub const MAX_DT: f32 = 0.05;

const DEFAULT_SEED_HASH: u32 = 0x5eed_0001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: usize,
    pub height: usize,
}

/// Optional still-image substrate the render kernel recolors.
pub struct Substrate {
    width: usize,
    height: usize,
    rgba: Vec<u8>,
}

impl Substrate {
    pub fn new(width: usize, height: usize, rgba: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || rgba.len() < width * height * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            rgba,
        })
    }

    /// Nearest sample at normalized (u, v), as linear RGB in 0..1.
    pub fn sample(&self, u: f32, v: f32) -> (f32, f32, f32) {
        let x = ((u.rem_euclid(1.0) * self.width as f32) as usize).min(self.width - 1);
        let y = ((v.rem_euclid(1.0) * self.height as f32) as usize).min(self.height - 1);
        let i = (y * self.width + x) * 4;
        (
            self.rgba[i] as f32 / 255.0,
            self.rgba[i + 1] as f32 / 255.0,
            self.rgba[i + 2] as f32 / 255.0,
        )
    }
}

/// Controls after perceptual mapping and audio energy layering. Every value
/// the kernels consume: `effective = base + energy * (1 - base)`, with both
/// base and energy contribution scaled by the dose master gain.
#[derive(Debug, Clone, Copy)]
pub struct MappedParams {
    pub symmetry: f32,
    pub recursion: f32,
    pub breathing: f32,
    pub flow: f32,
    pub saturation: f32,
    pub speed: f32,
    pub coupling: f32,
    pub beat_flash: f32,
}

impl MappedParams {
    pub fn compute(params: &VisualizerParams, audio: &AudioFeatureFrame) -> Self {
        let gain = map_to_perceptual_zone(params.dose);
        let base = |c: f32| map_to_perceptual_zone(c) * gain;
        let contrib = |level: f32| map_audio_reactivity(level, audio.energy) * gain;

        Self {
            symmetry: energy_layer(base(params.symmetry), contrib(audio.high)),
            recursion: energy_layer(base(params.recursion), contrib(audio.mid)),
            breathing: energy_layer(base(params.breathing), contrib(audio.bass)),
            flow: energy_layer(base(params.flow), contrib(audio.low_mid)),
            saturation: energy_layer(base(params.saturation), contrib(audio.energy)),
            speed: map_speed(0.25 + 0.75 * gain, audio.energy),
            coupling: map_density(base(params.flow).max(0.15), audio.beat_intensity),
            beat_flash: 0.35 + 0.65 * gain,
        }
    }
}

impl Default for MappedParams {
    fn default() -> Self {
        Self::compute(&VisualizerParams::default(), &AudioFeatureFrame::default())
    }
}

pub struct SimulationEngine {
    report: CapabilityReport,
    kernel: Box<dyn SimKernel>,
    surface: SurfaceSize,
    cur: Option<StateBuffer>,
    next: Option<StateBuffer>,
    noise: NoiseField,
    substrate: Option<Substrate>,
    frame: Vec<u8>,
    seed: u32,
    time: f32,
    last_audio: AudioFeatureFrame,
    last_mapped: MappedParams,
    initialized: bool,
    disposed: bool,
}

impl SimulationEngine {
    pub fn new(report: CapabilityReport) -> Self {
        Self::with_kernel(report, Box::new(CpuKernel))
    }

    /// Alternate backend entry point: anything implementing [`SimKernel`]
    /// (a GPU compute pass, a test double) slots in here.
    pub fn with_kernel(report: CapabilityReport, kernel: Box<dyn SimKernel>) -> Self {
        Self {
            report,
            kernel,
            surface: SurfaceSize {
                width: 0,
                height: 0,
            },
            cur: None,
            next: None,
            noise: NoiseField::new(DEFAULT_SEED_HASH),
            substrate: None,
            frame: Vec::new(),
            seed: DEFAULT_SEED_HASH,
            time: 0.0,
            last_audio: AudioFeatureFrame::default(),
            last_mapped: MappedParams::default(),
            initialized: false,
            disposed: false,
        }
    }

    pub fn init(&mut self, surface: SurfaceSize) -> anyhow::Result<()> {
        debug_assert!(!self.disposed, "init called on a disposed engine");
        if surface.width == 0 || surface.height == 0 {
            return Err(anyhow!(
                "surface must be non-empty (got {}x{})",
                surface.width,
                surface.height
            ));
        }

        self.surface = surface;
        let (sim_w, sim_h) = sim_grid_for(surface);
        let (cur, next) = self.create_state_pair(sim_w, sim_h)?;
        self.cur = Some(cur);
        self.next = Some(next);
        self.frame = vec![0; surface.width * surface.height * 4];
        self.seed_state();
        self.initialized = true;
        Ok(())
    }

    /// Highest precision first; each failed creation is recorded in the
    /// capability report and the next format tried. Only a fully exhausted
    /// chain surfaces as an error.
    fn create_state_pair(
        &mut self,
        w: usize,
        h: usize,
    ) -> anyhow::Result<(StateBuffer, StateBuffer)> {
        let mut format = self.report.format;
        loop {
            match StateBuffer::try_create(w, h, format)
                .and_then(|a| StateBuffer::try_create(w, h, format).map(|b| (a, b)))
            {
                Ok(pair) => return Ok(pair),
                Err(e) => match format.fallback() {
                    Some(lower) => {
                        self.report
                            .record_format_fallback(lower, format!("{e}; trying {}", lower.label()));
                        format = lower;
                    }
                    None => {
                        return Err(anyhow!("no viable state buffer format: {e}"));
                    }
                },
            }
        }
    }

    /// Reseed from a seed string: same seed, same initial field.
    pub fn set_seed(&mut self, seed: &str) {
        if self.disposed {
            return;
        }
        self.seed = seed_hash(seed);
        self.noise.reseed(self.seed);
        self.time = 0.0;
        if self.initialized {
            self.seed_state();
        }
    }

    fn seed_state(&mut self) {
        // Owned RNG instance: reproducible under concurrent engines.
        let mut rng = fastrand::Rng::with_seed(self.seed as u64);
        if let Some(cur) = self.cur.as_mut() {
            cur.fill_with(|_, _| [rng.f32() * TAU, rng.f32() * 0.3, 0.0, 0.0]);
        }
        let mut rng = fastrand::Rng::with_seed(self.seed as u64);
        if let Some(next) = self.next.as_mut() {
            next.fill_with(|_, _| [rng.f32() * TAU, rng.f32() * 0.3, 0.0, 0.0]);
        }
    }

    pub fn set_image(&mut self, substrate: Option<Substrate>) {
        self.substrate = substrate;
    }

    pub fn update(&mut self, audio: &AudioFeatureFrame, params: &VisualizerParams, dt: f32) {
        debug_assert!(self.initialized, "update called before init");
        if !self.initialized || self.disposed {
            return;
        }
        let dt = dt.clamp(0.0, MAX_DT);
        self.time += dt;
        self.noise.advance(dt);

        self.last_audio = *audio;
        self.last_mapped = MappedParams::compute(params, audio);

        let (Some(cur), Some(next)) = (self.cur.as_ref(), self.next.as_mut()) else {
            return;
        };
        let inputs = KernelInputs {
            audio: &self.last_audio,
            mapped: &self.last_mapped,
            noise: &self.noise,
            dt,
            time: self.time,
        };
        self.kernel.step(cur, next, &inputs);
        std::mem::swap(&mut self.cur, &mut self.next);
    }

    pub fn render(&mut self) -> &[u8] {
        debug_assert!(self.initialized, "render called before init");
        if let Some(cur) = self.cur.as_ref() {
            let inputs = KernelInputs {
                audio: &self.last_audio,
                mapped: &self.last_mapped,
                noise: &self.noise,
                dt: 0.0,
                time: self.time,
            };
            self.kernel.shade(
                cur,
                self.substrate.as_ref(),
                &inputs,
                self.surface.width,
                self.surface.height,
                &mut self.frame,
            );
        }
        &self.frame
    }

    /// Reallocates buffers for the new surface and reseeds deterministically.
    pub fn resize(&mut self, surface: SurfaceSize) -> anyhow::Result<()> {
        self.init(surface)
    }

    /// Release resources in order: state buffers, noise field, substrate,
    /// then nothing else holds the surface. Terminal: the engine cannot be
    /// reused afterwards.
    pub fn dispose(&mut self) {
        self.cur = None;
        self.next = None;
        self.noise.release();
        self.substrate = None;
        self.frame = Vec::new();
        self.initialized = false;
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn report(&self) -> &CapabilityReport {
        &self.report
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    /// Read-only view of the current state texel; used by determinism tests
    /// and debug tooling.
    pub fn state_texel(&self, x: usize, y: usize) -> Option<[f32; 4]> {
        let cur = self.cur.as_ref()?;
        if x >= cur.width() || y >= cur.height() {
            return None;
        }
        Some(cur.texel(x, y))
    }

    pub fn state_size(&self) -> Option<(usize, usize)> {
        self.cur.as_ref().map(|b| (b.width(), b.height()))
    }
}

fn sim_grid_for(surface: SurfaceSize) -> (usize, usize) {
    let w = (surface.width / 3).clamp(40, 160);
    let h = (surface.height / 3).clamp(40, 160);
    (w, h)
}
