// The cpal callback (platform real-time thread) only pushes mono samples into
// a lock-free ring; analysis happens on the driving tick.

use crate::features::{SPECTRUM_BINS, SharedSpectrum};
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat};
use ringbuf::HeapRb;
use ringbuf::traits::{Consumer as _, Producer as _, Split as _};
use rustfft::FftPlanner;
use rustfft::num_complex::Complex;
use std::f32::consts::PI;
use std::io::{self, Write};
use std::sync::Arc;

pub fn list_input_devices() -> anyhow::Result<()> {
    let host = cpal::default_host();
    let devices = host.input_devices().context("enumerate input devices")?;

    let mut out = io::stdout();
    writeln!(out, "Input devices:")?;
    for dev in devices {
        let name = dev.name().unwrap_or_else(|_| "<unknown>".to_string());
        writeln!(out, "  - {}", name)?;
    }
    Ok(())
}

pub struct AudioSystem {
    // Keep the stream alive for the full AudioSystem lifetime; dropping it
    // stops capture.
    _stream: cpal::Stream,
    cons: ringbuf::HeapCons<f32>,
    pub sample_rate_hz: u32,
}

impl AudioSystem {
    pub fn new(device_query: Option<&str>) -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, device_query)?;
        let supported = device
            .default_input_config()
            .context("get default input config")?;
        let sample_rate_hz = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.clone().into();

        let rb_capacity = (sample_rate_hz as usize).saturating_mul(4);
        let rb = HeapRb::<f32>::new(rb_capacity);
        let (mut prod, cons) = rb.split();

        let err_fn = |err| eprintln!("audio stream error: {err}");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _| push_interleaved(data, channels, &mut prod),
                err_fn,
                None,
            )?,
            fmt => return Err(anyhow!("unsupported sample format: {fmt:?}")),
        };

        stream.play().context("start input stream")?;

        Ok(Self {
            _stream: stream,
            cons,
            sample_rate_hz,
        })
    }

    /// Move everything captured since the last tick into `out`.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) {
        while let Some(s) = self.cons.try_pop() {
            out.push(s);
        }
    }
}

fn select_input_device(
    host: &cpal::Host,
    device_query: Option<&str>,
) -> anyhow::Result<cpal::Device> {
    let devices = host
        .input_devices()
        .context("enumerate input devices")?
        .collect::<Vec<_>>();

    let want = device_query.map(|s| s.to_lowercase());
    if let Some(want) = want.as_deref() {
        if let Some(dev) = devices.iter().find(|d| {
            d.name()
                .map(|n| n.to_lowercase().contains(want))
                .unwrap_or(false)
        }) {
            return Ok(dev.clone());
        }
        return Err(anyhow!("no input device matching: {want}"));
    }

    host.default_input_device()
        .ok_or_else(|| anyhow!("no default input device found"))
}

fn push_interleaved<T: Sample<Float = f32> + Copy>(
    data: &[T],
    channels: usize,
    prod: &mut ringbuf::HeapProd<f32>,
) {
    for frame in data.chunks(channels) {
        let mut acc = 0.0f32;
        for s in frame {
            acc += (*s).to_float_sample();
        }
        let mono = acc / channels as f32;
        let _ = prod.try_push(mono);
    }
}

const FFT_SIZE: usize = SPECTRUM_BINS * 2;
const HOP: usize = 256;

/// Windows incoming samples and publishes a 0..255 magnitude spectrum on
/// every hop. Smaller windows keep analysis latency low.
pub struct SpectrumAnalyzer {
    scratch: Vec<f32>,
    write_pos: usize,
    filled: usize,
    since_last: usize,
    hann: Vec<f32>,
    fft: Arc<dyn rustfft::Fft<f32>>,
    fft_buf: Vec<Complex<f32>>,
    bins: [u8; SPECTRUM_BINS],
    shared: Arc<SharedSpectrum>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        let n = FFT_SIZE;
        let hann = (0..n)
            .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (n as f32)).cos())
            .collect::<Vec<_>>();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        Self {
            scratch: vec![0.0; n],
            write_pos: 0,
            filled: 0,
            since_last: 0,
            hann,
            fft,
            fft_buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            bins: [0; SPECTRUM_BINS],
            shared: Arc::new(SharedSpectrum::new()),
        }
    }

    /// The spectrum cell feature extraction reads from.
    pub fn shared(&self) -> Arc<SharedSpectrum> {
        Arc::clone(&self.shared)
    }

    pub fn push_samples(&mut self, samples: &[f32]) {
        let n = FFT_SIZE;
        for &s in samples {
            self.scratch[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % n;
            if self.filled < n {
                self.filled += 1;
            }
            self.since_last += 1;
            if self.filled == n && self.since_last >= HOP {
                self.since_last = 0;
                self.analyze_window();
            }
        }
    }

    fn analyze_window(&mut self) {
        let n = FFT_SIZE;
        for i in 0..n {
            let s = self.scratch[(self.write_pos + i) % n];
            self.fft_buf[i].re = s * self.hann[i];
            self.fft_buf[i].im = 0.0;
        }
        self.fft.process(&mut self.fft_buf);

        for (i, c) in self.fft_buf.iter().take(SPECTRUM_BINS).enumerate() {
            let m = (c.re * c.re + c.im * c.im).sqrt();
            // Soft compression into the byte range keeps quiet detail visible
            // without letting loud bins pin at 255.
            self.bins[i] = ((m * 0.02).tanh() * 255.0) as u8;
        }
        self.shared.store(&self.bins);
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
