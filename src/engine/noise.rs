//! Seeded, time-evolving noise field. One owned generator instance per
//! engine so seeds stay reproducible across concurrent engines.

use noise::{NoiseFn, OpenSimplex};

/// How many `advance` calls between grid regenerations. Sampling stays cheap
/// between regens; the field still drifts smoothly because the regen step is
/// small.
const REGEN_INTERVAL: u32 = 3;
const GRID_W: usize = 64;
const GRID_H: usize = 64;
const FIELD_SCALE: f64 = 3.0;
const TIME_SCALE: f64 = 0.25;

pub struct NoiseField {
    generator: OpenSimplex,
    grid: Vec<f32>,
    z: f64,
    ticks: u32,
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        let mut field = Self {
            generator: OpenSimplex::new(seed),
            grid: vec![0.0; GRID_W * GRID_H],
            z: 0.0,
            ticks: 0,
        };
        field.regenerate();
        field
    }

    pub fn reseed(&mut self, seed: u32) {
        self.generator = OpenSimplex::new(seed);
        self.z = 0.0;
        self.ticks = 0;
        self.regenerate();
    }

    /// Advance the field's time coordinate; the grid itself is regenerated
    /// only every few ticks for performance.
    pub fn advance(&mut self, dt: f32) {
        self.z += dt as f64 * TIME_SCALE;
        self.ticks = self.ticks.wrapping_add(1);
        if self.ticks % REGEN_INTERVAL == 0 {
            self.regenerate();
        }
    }

    fn regenerate(&mut self) {
        if self.grid.is_empty() {
            return;
        }
        for gy in 0..GRID_H {
            for gx in 0..GRID_W {
                let x = gx as f64 / GRID_W as f64 * FIELD_SCALE;
                let y = gy as f64 / GRID_H as f64 * FIELD_SCALE;
                self.grid[gy * GRID_W + gx] = self.generator.get([x, y, self.z]) as f32;
            }
        }
    }

    /// Bilinear sample at normalized (u, v) in [0, 1]; wraps, returns ~[-1, 1].
    pub fn sample(&self, u: f32, v: f32) -> f32 {
        if self.grid.is_empty() {
            return 0.0;
        }
        let u = u.rem_euclid(1.0);
        let v = v.rem_euclid(1.0);
        let fx = u * GRID_W as f32;
        let fy = v * GRID_H as f32;
        let x0 = fx as usize % GRID_W;
        let y0 = fy as usize % GRID_H;
        let x1 = (x0 + 1) % GRID_W;
        let y1 = (y0 + 1) % GRID_H;
        let tx = fx.fract();
        let ty = fy.fract();

        let a = self.grid[y0 * GRID_W + x0];
        let b = self.grid[y0 * GRID_W + x1];
        let c = self.grid[y1 * GRID_W + x0];
        let d = self.grid[y1 * GRID_W + x1];
        let top = a * (1.0 - tx) + b * tx;
        let bot = c * (1.0 - tx) + d * tx;
        top * (1.0 - ty) + bot * ty
    }

    /// Two decorrelated samples forming a displacement direction.
    pub fn sample_vec(&self, u: f32, v: f32) -> (f32, f32) {
        (self.sample(u, v), self.sample(u + 0.37, v + 0.61))
    }

    /// Drop the grid storage. Sampling a released field returns zero.
    pub fn release(&mut self) {
        self.grid = Vec::new();
    }

    pub fn is_released(&self) -> bool {
        self.grid.is_empty()
    }
}
