//! Perceptual mapping curves.
//!
//! Every raw 0..1 control passes through one of these before it is used
//! physically, so no combination of slider positions can push the output
//! outside the designed envelope.

/// Three-segment curve from linear slider position to perceptual strength.
///
/// [0, 0.4] -> [0, 0.2]: subtle zone, eased so small settings stay small.
/// (0.4, 0.8] -> (0.2, 0.7]: expressive zone, smoothstep expansion.
/// (0.8, 1.0] -> (0.7, 1.0]: experimental zone, eased approach to full.
///
/// Monotonic non-decreasing with f(0)=0, f(0.4)=0.2, f(0.8)=0.7, f(1)=1;
/// both adjoining formulas agree at each boundary.
pub fn map_to_perceptual_zone(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    if x <= 0.4 {
        let t = x / 0.4;
        0.2 * t * t
    } else if x <= 0.8 {
        let t = (x - 0.4) / 0.4;
        0.2 + 0.5 * smoothstep(t)
    } else {
        let t = (x - 0.8) / 0.2;
        0.7 + 0.3 * ease_out(t)
    }
}

/// Soft-knee compression of an audio level against overall intensity.
///
/// The level is first scaled by (0.3 + 0.7 * intensity), then passed through
/// a knee at 0.3: quieter signal is attenuated further, louder signal is
/// compressed toward 1.0 instead of clipping.
pub fn map_audio_reactivity(level: f32, intensity: f32) -> f32 {
    let level = level.clamp(0.0, 1.0);
    let intensity = intensity.clamp(0.0, 1.0);
    let scaled = level * (0.3 + 0.7 * intensity);
    if scaled < KNEE {
        scaled * (scaled / KNEE)
    } else {
        (KNEE + (scaled - KNEE) * 0.7).min(1.0)
    }
}

const KNEE: f32 = 0.3;

/// Diminishing-returns motion speed: drive boosts the base through a square
/// root so doubling the control never doubles the motion.
pub fn map_speed(base: f32, drive: f32) -> f32 {
    let base = base.clamp(0.0, 1.0);
    let drive = drive.clamp(0.0, 1.0);
    (base * (1.0 + drive) * 0.5).sqrt()
}

/// Diminishing-returns density, same square-root shape with a gentler drive
/// weighting than [`map_speed`].
pub fn map_density(base: f32, drive: f32) -> f32 {
    let base = base.clamp(0.0, 1.0);
    let drive = drive.clamp(0.0, 1.0);
    (base * (1.0 + 0.6 * drive) / 1.6).sqrt()
}

#[inline]
fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
fn ease_out(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t) * (1.0 - t)
}

/// Energy-layer blend: audio pushes an effect from its user-set base toward
/// its 1.0 ceiling and never past it, and never below the base.
#[inline]
pub fn energy_layer(base: f32, energy: f32) -> f32 {
    let base = base.clamp(0.0, 1.0);
    let energy = energy.clamp(0.0, 1.0);
    base + energy * (1.0 - base)
}
