//! Update/render kernel pair. The trait is the seam a GPU backend would
//! implement; the CPU kernel below is the reference implementation.

use crate::engine::noise::NoiseField;
use crate::engine::state::StateBuffer;
use crate::engine::{MappedParams, Substrate};
use crate::features::AudioFeatureFrame;
use std::f32::consts::{PI, TAU};

pub struct KernelInputs<'a> {
    pub audio: &'a AudioFeatureFrame,
    pub mapped: &'a MappedParams,
    pub noise: &'a NoiseField,
    pub dt: f32,
    pub time: f32,
}

pub trait SimKernel {
    /// Advance `cur` into `next`: one simulation step over every cell.
    fn step(&self, cur: &StateBuffer, next: &mut StateBuffer, inp: &KernelInputs<'_>);

    /// Produce an RGBA frame from `cur` and the optional substrate.
    fn shade(
        &self,
        cur: &StateBuffer,
        substrate: Option<&Substrate>,
        inp: &KernelInputs<'_>,
        width: usize,
        height: usize,
        out: &mut [u8],
    );
}

pub struct CpuKernel;

impl SimKernel for CpuKernel {
    fn step(&self, cur: &StateBuffer, next: &mut StateBuffer, inp: &KernelInputs<'_>) {
        let w = cur.width();
        let h = cur.height();
        let audio = inp.audio;
        let m = inp.mapped;
        let dt = inp.dt;

        let coupling_target = m.coupling;
        let beat_half_life = 0.15f32;
        let beat_keep = 0.5f32.powf(dt / beat_half_life);

        for y in 0..h {
            for x in 0..w {
                let [phase, coupling, energy, beat] = cur.texel(x, y);

                // Circular mean of the 4-neighborhood (toroidal edges).
                let left = cur.texel((x + w - 1) % w, y)[0];
                let right = cur.texel((x + 1) % w, y)[0];
                let up = cur.texel(x, (y + h - 1) % h)[0];
                let down = cur.texel(x, (y + 1) % h)[0];
                let (mut sx, mut sy) = (0.0f32, 0.0f32);
                for p in [left, right, up, down] {
                    sx += p.cos();
                    sy += p.sin();
                }
                let neighbor_phase = sy.atan2(sx);

                let u = x as f32 / w as f32;
                let v = y as f32 / h as f32;
                let n = inp.noise.sample(u, v);

                // Per-cell angular velocity: baseline spin, global speed,
                // noise detune scaled by flow, bass kick scaled by breathing.
                let omega = 0.6
                    + 1.8 * m.speed
                    + n * m.flow * 1.2
                    + audio.bass * m.breathing * 1.5;

                let coupling = coupling + (coupling_target - coupling) * (dt * 2.0).min(1.0);
                let pull = coupling * (neighbor_phase - phase).sin();

                let phase = (phase + dt * (omega + pull)).rem_euclid(TAU);

                let energy = (energy * (1.0 - dt * 0.8) + audio.energy * dt * 1.2).clamp(0.0, 1.0);

                let beat = if audio.beat_detected {
                    beat.max(audio.beat_intensity)
                } else {
                    beat * beat_keep
                };

                next.set_texel(x, y, [phase, coupling, energy, beat]);
            }
        }
    }

    fn shade(
        &self,
        cur: &StateBuffer,
        substrate: Option<&Substrate>,
        inp: &KernelInputs<'_>,
        width: usize,
        height: usize,
        out: &mut [u8],
    ) {
        let audio = inp.audio;
        let m = inp.mapped;
        let t = inp.time;
        let aspect = width as f32 / height.max(1) as f32;

        let sectors = (2.0 + m.symmetry * 10.0).round().max(2.0);
        let sector_angle = TAU / sectors;
        let pulse = 0.3 * (t * 1.4).sin() + 0.7 * audio.bass;

        for py in 0..height {
            for px in 0..width {
                let mut x = (px as f32 / width as f32 * 2.0 - 1.0) * aspect;
                let mut y = py as f32 / height as f32 * 2.0 - 1.0;

                let r0 = (x * x + y * y).sqrt();

                // Flow: noise-driven directional displacement.
                if m.flow > 0.0 {
                    let (nx, ny) = inp.noise.sample_vec(x * 0.5 + 0.5, y * 0.5 + 0.5);
                    x += nx * m.flow * 0.35;
                    y += ny * m.flow * 0.35;
                }

                let mut r = (x * x + y * y).sqrt().max(1e-4);
                let mut a = y.atan2(x);

                // Symmetry: kaleidoscopic angular fold into one sector.
                if m.symmetry > 0.0 {
                    let folded = (a + PI).rem_euclid(sector_angle);
                    let mirrored = (folded - sector_angle * 0.5).abs();
                    a = a * (1.0 - m.symmetry) + mirrored * m.symmetry;
                }

                // Recursion: log-polar tunnel warp crawling inward over time.
                if m.recursion > 0.0 {
                    let lr = r.ln();
                    let tunnel = (lr * (1.0 + 2.0 * m.recursion) - t * 0.5 * m.recursion)
                        .rem_euclid(1.2);
                    r = r * (1.0 - m.recursion) + tunnel * m.recursion;
                }

                // Breathing: radial pulse tied to the bass feature.
                if m.breathing > 0.0 {
                    r *= 1.0 + m.breathing * 0.25 * pulse;
                }

                let u = (a / TAU + 0.5 + r * 0.35).rem_euclid(1.0);
                let v = (r * 0.55).rem_euclid(1.0);
                let sxi = ((u * cur.width() as f32) as usize).min(cur.width() - 1);
                let syi = ((v * cur.height() as f32) as usize).min(cur.height() - 1);
                let [phase, _, cell_energy, cell_beat] = cur.texel(sxi, syi);

                let hue = (phase / TAU + t * 0.01).rem_euclid(1.0);
                let brightness = (0.22 + cell_energy * 0.6 + audio.energy * 0.18).clamp(0.0, 1.0);

                // Staged saturation: linear rise through the lower half,
                // gentler approach to full above it.
                let sat = if m.saturation < 0.5 {
                    m.saturation * 2.0 * 0.8
                } else {
                    0.8 + (m.saturation - 0.5) * 2.0 * 0.2
                };

                let (mut cr, mut cg, mut cb) = hsv_to_rgb(hue, sat, brightness);

                if let Some(img) = substrate {
                    let (ir, ig, ib) = img.sample(u, v);
                    // Recolor the substrate: keep its luminance, take the
                    // field's chroma in proportion to saturation.
                    let luma = 0.2126 * ir + 0.7152 * ig + 0.0722 * ib;
                    cr = luma * (1.0 - sat) + cr * luma.max(0.25) * sat * 2.0;
                    cg = luma * (1.0 - sat) + cg * luma.max(0.25) * sat * 2.0;
                    cb = luma * (1.0 - sat) + cb * luma.max(0.25) * sat * 2.0;
                }

                // Beat flash, then the center-weighted vignette on original radius.
                let flash = cell_beat * m.beat_flash;
                cr += (1.0 - cr) * flash * 0.6;
                cg += (1.0 - cg) * flash * 0.6;
                cb += (1.0 - cb) * flash * 0.6;

                let vignette = (1.0 - 0.45 * (r0 * r0)).clamp(0.0, 1.0);

                let i = (py * width + px) * 4;
                out[i] = (cr * vignette * 255.0).clamp(0.0, 255.0) as u8;
                out[i + 1] = (cg * vignette * 255.0).clamp(0.0, 255.0) as u8;
                out[i + 2] = (cb * vignette * 255.0).clamp(0.0, 255.0) as u8;
                out[i + 3] = 255;
            }
        }
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (f32, f32, f32) {
    let h = h.rem_euclid(1.0) * 6.0;
    let i = h as u32 % 6;
    let f = h.fract();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let u = v * (1.0 - s * (1.0 - f));
    match i {
        0 => (v, u, p),
        1 => (q, v, p),
        2 => (p, v, u),
        3 => (p, q, v),
        4 => (u, p, v),
        _ => (v, p, q),
    }
}
