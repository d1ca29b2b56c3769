use crate::audio::{AudioSystem, SpectrumAnalyzer};
use crate::capability;
use crate::config::{AudioSource, Config, RendererMode};
use crate::effects::AudioEffectsChain;
use crate::engine::{SimulationEngine, SurfaceSize};
use crate::features::FeatureExtractor;
use crate::params::{AudioEffectParams, VisualizerParams, clamp01};
use crate::render::{AsciiRenderer, Frame, HalfBlockRenderer, Renderer};
use crate::seed;
use crate::terminal::TerminalGuard;
use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ringbuf::traits::{Consumer as _, Producer as _};
use std::io::BufWriter;
use std::time::{Duration, Instant};

const HUD_ROWS: u16 = 2;

pub fn run(cfg: Config) -> anyhow::Result<()> {
    let (mut visual, mut fx) = initial_params(&cfg)?;
    let report = capability::probe_runtime(cfg.format, cfg.renderer, cfg.auto_probe);

    let _term = TerminalGuard::new()?;
    let mut out = BufWriter::new(TerminalGuard::stdout());

    let mut renderer: Box<dyn Renderer> = match report.renderer {
        RendererMode::HalfBlock => Box::new(HalfBlockRenderer::new()),
        RendererMode::Ascii => Box::new(AsciiRenderer::new()),
    };
    // Half-block cells carry two pixels vertically; ASCII one.
    let px_h_mul = match report.renderer {
        RendererMode::HalfBlock => 2usize,
        RendererMode::Ascii => 1usize,
    };

    let mut audio = match cfg.source {
        AudioSource::Mic => Some(
            AudioSystem::new(cfg.device.as_deref()).context("start audio capture (source=mic)")?,
        ),
        AudioSource::None => None,
    };
    let sample_rate = audio
        .as_ref()
        .map(|a| a.sample_rate_hz as f32)
        .unwrap_or(48_000.0);

    let mut analyzer = SpectrumAnalyzer::new();
    let mut chain = AudioEffectsChain::new(sample_rate);
    chain.set_params(fx);

    let mut extractor = FeatureExtractor::default();
    if audio.is_some() {
        extractor.set_source(Some(analyzer.shared()));
    }

    let mut last_size = crossterm::terminal::size().context("get terminal size")?;
    if last_size.1 <= HUD_ROWS || last_size.0 < 4 {
        return Err(anyhow::anyhow!(
            "terminal too small (need at least 4x{}, got {}x{})",
            HUD_ROWS + 1,
            last_size.0,
            last_size.1
        ));
    }

    let mut engine = SimulationEngine::new(report);
    engine.init(surface_for(last_size, px_h_mul))?;

    let mut seed_string = match cfg.seed {
        Some(ref s) => s.to_ascii_uppercase(),
        None => seed::encode(visual, fx),
    };
    engine.set_seed(&seed_string);

    let mut show_hud = true;
    let mut captured: Vec<f32> = Vec::new();
    let mut processed: Vec<f32> = Vec::new();
    let target = Duration::from_secs_f32(1.0 / cfg.fps.max(1) as f32);
    let mut last_tick = Instant::now();

    loop {
        let now = Instant::now();
        let dt = now.duration_since(last_tick).as_secs_f32();
        last_tick = now;

        let mut quit = false;
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(key) if key.kind != KeyEventKind::Release => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => quit = true,
                    KeyCode::Char('h') => show_hud = !show_hud,
                    KeyCode::Char('g') => {
                        // Fresh random session; the seed string is the share handle.
                        randomize_params(&mut visual, &mut fx);
                        chain.set_params(fx);
                        seed_string = seed::encode(visual, fx);
                        engine.set_seed(&seed_string);
                    }
                    KeyCode::Char('r') => {
                        // Restart the current seed from its initial field.
                        engine.set_seed(&seed_string);
                    }
                    KeyCode::Char('[') => {
                        visual.dose = clamp01(visual.dose - 0.05);
                    }
                    KeyCode::Char(']') => {
                        visual.dose = clamp01(visual.dose + 0.05);
                    }
                    _ => {}
                },
                Event::Resize(w, h) => {
                    if h > HUD_ROWS && w >= 4 {
                        last_size = (w, h);
                        // Reallocates and restarts the current seed's field.
                        engine.resize(surface_for(last_size, px_h_mul))?;
                    }
                }
                _ => {}
            }
        }
        if quit {
            break;
        }

        // Audio path: capture -> effects chain -> spectrum analysis.
        if let Some(a) = audio.as_mut() {
            captured.clear();
            a.drain_into(&mut captured);
            let _ = chain.input().push_slice(&captured);
        }
        chain.update();
        chain.pump();
        processed.clear();
        while let Some(s) = chain.output().try_pop() {
            processed.push(s);
        }
        if audio.is_some() {
            analyzer.push_samples(&processed);
        }

        let features = extractor.analyze(dt);
        engine.update(&features, &visual, dt);

        let hud = if show_hud {
            format!(
                "{}  dose {:.2}  e/d/b {:.2}/{:.2}/{:.2}{}\ncaps: {}   q quit | g generate | r restart | h hud | [ ] dose",
                seed_string,
                visual.dose,
                chain.params().echo,
                chain.params().drift,
                chain.params().break_level,
                if features.beat_detected { "  *" } else { "" },
                engine.report().status_label(),
            )
        } else {
            String::new()
        };
        // HUD rows are always reserved so the pixel surface never resizes
        // when the HUD is toggled; hidden just means the lines are cleared.
        let visual_rows = last_size.1 - HUD_ROWS;

        let surface = engine.surface();
        let pixels = engine.render();
        renderer.render(
            &Frame {
                term_cols: last_size.0,
                term_rows: last_size.1,
                visual_rows,
                pixel_width: surface.width,
                pixel_height: surface.height,
                pixels_rgba: pixels,
                hud: &hud,
                hud_rows: HUD_ROWS,
                sync_updates: cfg.sync_updates,
            },
            &mut out,
        )?;

        let elapsed = now.elapsed();
        if elapsed < target {
            std::thread::sleep(target - elapsed);
        }
    }

    chain.dispose();
    engine.dispose();
    drop(audio.take());
    Ok(())
}

fn surface_for(size: (u16, u16), px_h_mul: usize) -> SurfaceSize {
    SurfaceSize {
        width: size.0 as usize,
        height: (size.1.saturating_sub(HUD_ROWS)) as usize * px_h_mul,
    }
}

fn initial_params(cfg: &Config) -> anyhow::Result<(VisualizerParams, AudioEffectParams)> {
    if let Some(s) = cfg.seed.as_deref() {
        let decoded =
            seed::decode(s).ok_or_else(|| anyhow::anyhow!("invalid seed string: {s}"))?;
        return Ok((decoded.visual, decoded.effects));
    }
    Ok((
        VisualizerParams::new(
            cfg.dose,
            cfg.symmetry,
            cfg.recursion,
            cfg.breathing,
            cfg.flow,
            cfg.saturation,
        ),
        AudioEffectParams::new(cfg.echo, cfg.drift, cfg.break_level),
    ))
}

fn randomize_params(visual: &mut VisualizerParams, fx: &mut AudioEffectParams) {
    let mut rng = fastrand::Rng::new();
    *visual = VisualizerParams::new(
        0.3 + rng.f32() * 0.5,
        rng.f32(),
        rng.f32(),
        rng.f32(),
        rng.f32(),
        0.3 + rng.f32() * 0.7,
    );
    *fx = AudioEffectParams::new(rng.f32() * 0.6, rng.f32() * 0.6, rng.f32() * 0.5);
}
