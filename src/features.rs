//! Audio feature extraction: band energies, adaptive beat detection and
//! auto-gain, computed once per tick from a shared byte spectrum.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub const SPECTRUM_BINS: usize = 512;
const SPECTRUM_WORDS: usize = SPECTRUM_BINS / 4;

/// One frame of extracted features. Produced fresh every tick; all float
/// fields are in 0..1.
#[derive(Debug, Clone, Copy)]
pub struct AudioFeatureFrame {
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high: f32,
    pub energy: f32,
    pub beat_detected: bool,
    pub beat_intensity: f32,
}

impl Default for AudioFeatureFrame {
    fn default() -> Self {
        Self {
            bass: 0.0,
            low_mid: 0.0,
            mid: 0.0,
            high: 0.0,
            energy: 0.0,
            beat_detected: false,
            beat_intensity: 0.0,
        }
    }
}

/// Byte magnitude spectrum published by the analysis side and read torn-free
/// by the extractor. Seqlock: odd sequence means a write is in progress.
pub struct SharedSpectrum {
    seq: AtomicU64,
    words: [AtomicU32; SPECTRUM_WORDS],
}

impl SharedSpectrum {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            words: std::array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    pub fn store(&self, bins: &[u8; SPECTRUM_BINS]) {
        self.seq.fetch_add(1, Ordering::Release);
        for (dst, chunk) in self.words.iter().zip(bins.chunks_exact(4)) {
            let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            dst.store(word, Ordering::Relaxed);
        }
        self.seq.fetch_add(1, Ordering::Release);
    }

    pub fn load_into(&self, out: &mut [u8; SPECTRUM_BINS]) {
        loop {
            let v1 = self.seq.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                continue;
            }
            for (chunk, src) in out.chunks_exact_mut(4).zip(self.words.iter()) {
                chunk.copy_from_slice(&src.load(Ordering::Relaxed).to_le_bytes());
            }
            let v2 = self.seq.load(Ordering::Acquire);
            if v1 == v2 {
                return;
            }
        }
    }
}

impl Default for SharedSpectrum {
    fn default() -> Self {
        Self::new()
    }
}

/// Beat-detection tunables. The defaults were settled empirically; they are
/// surfaced as named configuration so they can be validated against real
/// material instead of living as scattered literals.
#[derive(Debug, Clone, Copy)]
pub struct BeatConfig {
    /// Length of the rolling bass-history window, seconds.
    pub window_secs: f32,
    /// A beat requires bass above mean + this many standard deviations.
    pub sigma_multiplier: f32,
    /// A beat requires bass rising by at least this factor vs. the previous frame.
    pub rising_factor: f32,
    /// A beat requires spectral flux above this floor.
    pub flux_floor: f32,
    /// Minimum spacing between reported beats, milliseconds.
    pub cooldown_ms: f32,
    /// Half-life of the post-beat intensity decay, milliseconds.
    pub intensity_half_life_ms: f32,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            window_secs: 0.7,
            sigma_multiplier: 1.5,
            rising_factor: 1.2,
            flux_floor: 0.02,
            cooldown_ms: 120.0,
            intensity_half_life_ms: 150.0,
        }
    }
}

// Fixed bin ranges approximating perceptual bands over the 512-bin spectrum.
const BAND_RANGES: [(usize, usize); 4] = [(1, 12), (12, 48), (48, 160), (160, 448)];

// Asymmetric smoothing per band: transients punch through at the attack
// rate, then decay at the much slower release rate.
const BAND_ATTACK: [f32; 4] = [0.55, 0.50, 0.45, 0.42];
const BAND_RELEASE: [f32; 4] = [0.06, 0.07, 0.08, 0.08];

pub struct FeatureExtractor {
    source: Option<Arc<SharedSpectrum>>,
    cfg: BeatConfig,
    scratch: [u8; SPECTRUM_BINS],
    prev_bins: [f32; SPECTRUM_BINS],
    bands: [f32; 4],
    prev_bass: f32,
    observed_max: f32,
    bass_history: VecDeque<(f32, f32)>,
    last_beat_t: f32,
    beat_pulse: f32,
    t: f32,
}

impl FeatureExtractor {
    pub fn new(cfg: BeatConfig) -> Self {
        Self {
            source: None,
            cfg,
            scratch: [0; SPECTRUM_BINS],
            prev_bins: [0.0; SPECTRUM_BINS],
            bands: [0.0; 4],
            prev_bass: 0.0,
            observed_max: 0.0,
            bass_history: VecDeque::new(),
            last_beat_t: f32::NEG_INFINITY,
            beat_pulse: 0.0,
            t: 0.0,
        }
    }

    /// Attach or detach the live spectrum. Detached is a valid state, not an
    /// error: `analyze` then returns the synthetic idle signal.
    pub fn set_source(&mut self, source: Option<Arc<SharedSpectrum>>) {
        self.source = source;
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn config(&self) -> &BeatConfig {
        &self.cfg
    }

    pub fn analyze(&mut self, dt: f32) -> AudioFeatureFrame {
        let dt = dt.clamp(0.0, 0.25);
        self.t += dt;

        let Some(source) = self.source.clone() else {
            return self.idle_frame();
        };
        source.load_into(&mut self.scratch);

        // Band RMS: closer to perceived loudness than an arithmetic mean.
        let mut raw_bands = [0.0f32; 4];
        for (band, (lo, hi)) in raw_bands.iter_mut().zip(BAND_RANGES) {
            let mut acc = 0.0f32;
            for &b in &self.scratch[lo..hi] {
                let v = b as f32 / 255.0;
                acc += v * v;
            }
            *band = (acc / (hi - lo) as f32).sqrt();
        }

        for i in 0..4 {
            let coeff = if raw_bands[i] > self.bands[i] {
                BAND_ATTACK[i]
            } else {
                BAND_RELEASE[i]
            };
            self.bands[i] += (raw_bands[i] - self.bands[i]) * coeff;
        }

        // Spectral flux: positive-only frame-to-frame deltas.
        let mut flux = 0.0f32;
        for i in 0..SPECTRUM_BINS {
            let cur = self.scratch[i] as f32 / 255.0;
            let d = cur - self.prev_bins[i];
            if d > 0.0 {
                flux += d;
            }
            self.prev_bins[i] = cur;
        }
        let flux = (flux * 0.04).tanh();

        // Auto-gain: normalize against a slowly decaying observed maximum so
        // quiet and loud sources land in the same range.
        let raw_energy = {
            let mut acc = 0.0f32;
            for &b in &self.scratch {
                let v = b as f32 / 255.0;
                acc += v * v;
            }
            (acc / SPECTRUM_BINS as f32).sqrt()
        };
        self.observed_max = (self.observed_max * 0.999).max(raw_energy).max(1e-4);
        let energy = (raw_energy / self.observed_max).clamp(0.0, 1.0);

        let bass = self.bands[0];
        let beat = self.detect_beat(bass, flux);
        if beat {
            self.beat_pulse = 1.0;
            self.last_beat_t = self.t;
        } else {
            let half_life = (self.cfg.intensity_half_life_ms / 1000.0).max(1e-3);
            self.beat_pulse *= 0.5f32.powf(dt / half_life);
        }

        // Blend the decaying pulse with instantaneous bass velocity so a beat
        // keeps visible motion even at low overall energy.
        let bass_velocity = ((bass - self.prev_bass) / dt.max(1e-3) * 0.08).clamp(0.0, 1.0);
        let beat_intensity = (self.beat_pulse * 0.8 + bass_velocity * 0.2).clamp(0.0, 1.0);

        self.bass_history.push_back((self.t, bass));
        let horizon = self.t - self.cfg.window_secs;
        while self
            .bass_history
            .front()
            .is_some_and(|&(time, _)| time < horizon)
        {
            self.bass_history.pop_front();
        }
        self.prev_bass = bass;

        AudioFeatureFrame {
            bass,
            low_mid: self.bands[1],
            mid: self.bands[2],
            high: self.bands[3],
            energy,
            beat_detected: beat,
            beat_intensity,
        }
    }

    /// Four-way AND: statistical outlier, rising edge, onset confirmation,
    /// cooldown. Sustained loud passages fail the rising check; quiet tracks
    /// still fire because the threshold adapts to their own history.
    fn detect_beat(&self, bass: f32, flux: f32) -> bool {
        if self.bass_history.len() < 8 {
            return false;
        }
        if (self.t - self.last_beat_t) * 1000.0 < self.cfg.cooldown_ms {
            return false;
        }
        if flux < self.cfg.flux_floor {
            return false;
        }
        if bass < self.prev_bass * self.cfg.rising_factor {
            return false;
        }

        let n = self.bass_history.len() as f32;
        let mean = self.bass_history.iter().map(|&(_, b)| b).sum::<f32>() / n;
        let var = self
            .bass_history
            .iter()
            .map(|&(_, b)| (b - mean) * (b - mean))
            .sum::<f32>()
            / n;
        bass > mean + self.cfg.sigma_multiplier * var.sqrt()
    }

    // Slow sinusoidal breathing so the renderer never looks dead without a
    // source attached.
    fn idle_frame(&mut self) -> AudioFeatureFrame {
        let t = self.t;
        let breathe = 0.5 + 0.5 * (t * 0.45).sin();
        AudioFeatureFrame {
            bass: 0.18 + 0.10 * breathe,
            low_mid: 0.14 + 0.08 * (0.5 + 0.5 * (t * 0.37 + 1.1).sin()),
            mid: 0.12 + 0.07 * (0.5 + 0.5 * (t * 0.52 + 2.3).sin()),
            high: 0.08 + 0.05 * (0.5 + 0.5 * (t * 0.61 + 0.7).sin()),
            energy: 0.16 + 0.10 * breathe,
            beat_detected: false,
            beat_intensity: 0.0,
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(BeatConfig::default())
    }
}
