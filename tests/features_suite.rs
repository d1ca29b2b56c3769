use seed_reactor::features::{
    BeatConfig, FeatureExtractor, SPECTRUM_BINS, SharedSpectrum,
};
use std::sync::Arc;

const DT: f32 = 1.0 / 60.0;

fn spectrum_with(bass: u8, rest: u8) -> [u8; SPECTRUM_BINS] {
    let mut bins = [rest; SPECTRUM_BINS];
    for b in &mut bins[1..12] {
        *b = bass;
    }
    bins
}

fn feed(shared: &SharedSpectrum, ex: &mut FeatureExtractor, bass: u8, rest: u8, ticks: usize) {
    for _ in 0..ticks {
        shared.store(&spectrum_with(bass, rest));
        ex.analyze(DT);
    }
}

#[test]
fn shared_spectrum_round_trips_byte_patterns() {
    let shared = SharedSpectrum::new();
    let mut bins = [0u8; SPECTRUM_BINS];
    for (i, b) in bins.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
    shared.store(&bins);

    let mut out = [0u8; SPECTRUM_BINS];
    shared.load_into(&mut out);
    assert_eq!(bins, out);
}

#[test]
fn detached_source_yields_breathing_idle_signal() {
    let mut ex = FeatureExtractor::default();
    assert!(!ex.has_source());

    let mut energies = Vec::new();
    for _ in 0..240 {
        let f = ex.analyze(DT);
        assert!(!f.beat_detected, "idle signal must not report beats");
        assert!(f.energy > 0.05, "idle signal must never look dead");
        assert!(f.bass > 0.0 && f.bass <= 1.0);
        energies.push(f.energy);
    }

    let min = energies.iter().copied().fold(f32::INFINITY, f32::min);
    let max = energies.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    assert!(
        max - min > 0.01,
        "idle energy should breathe, got span {}",
        max - min
    );
}

#[test]
fn spike_after_quiet_floor_fires_exactly_one_beat() {
    let shared = Arc::new(SharedSpectrum::new());
    let mut ex = FeatureExtractor::default();
    ex.set_source(Some(Arc::clone(&shared)));

    // Flat-low for well over the history window.
    feed(&shared, &mut ex, 30, 20, 72);

    // Sustained spike: rising edge plus flux on the first tick only.
    let mut beats = 0;
    for i in 0..12 {
        shared.store(&spectrum_with(220, 90));
        let f = ex.analyze(DT);
        if f.beat_detected {
            beats += 1;
            assert_eq!(i, 0, "beat should fire on the spike's leading edge");
            assert!(f.beat_intensity > 0.5);
        }
    }
    assert_eq!(beats, 1, "sustained spike must not retrigger inside cooldown");
}

#[test]
fn beat_can_fire_again_after_release_and_cooldown() {
    let shared = Arc::new(SharedSpectrum::new());
    let mut ex = FeatureExtractor::default();
    ex.set_source(Some(Arc::clone(&shared)));

    feed(&shared, &mut ex, 30, 20, 72);

    shared.store(&spectrum_with(220, 90));
    assert!(ex.analyze(DT).beat_detected, "first spike should fire");

    // Back down long enough for smoothing and the history window to settle.
    feed(&shared, &mut ex, 30, 20, 60);

    shared.store(&spectrum_with(220, 90));
    assert!(
        ex.analyze(DT).beat_detected,
        "second spike after release should fire again"
    );
}

#[test]
fn beat_intensity_decays_after_the_hit() {
    let shared = Arc::new(SharedSpectrum::new());
    let mut ex = FeatureExtractor::default();
    ex.set_source(Some(Arc::clone(&shared)));

    feed(&shared, &mut ex, 30, 20, 72);
    shared.store(&spectrum_with(220, 90));
    let hit = ex.analyze(DT);
    assert!(hit.beat_detected);

    // Drop straight back to quiet; intensity should decay, not vanish.
    shared.store(&spectrum_with(30, 20));
    let next = ex.analyze(DT);
    assert!(next.beat_intensity < hit.beat_intensity);
    assert!(next.beat_intensity > 0.2, "decay is exponential, not a cliff");
}

#[test]
fn auto_gain_normalizes_quiet_and_loud_sources_alike() {
    for level in [60u8, 200u8] {
        let shared = Arc::new(SharedSpectrum::new());
        let mut ex = FeatureExtractor::default();
        ex.set_source(Some(Arc::clone(&shared)));

        let mut last = 0.0;
        for _ in 0..120 {
            shared.store(&[level; SPECTRUM_BINS]);
            last = ex.analyze(DT).energy;
        }
        assert!(
            last > 0.95,
            "steady source at level {level} should normalize to ~1, got {last}"
        );
    }
}

#[test]
fn band_smoothing_attacks_fast_and_releases_slow() {
    let shared = Arc::new(SharedSpectrum::new());
    let mut ex = FeatureExtractor::default();
    ex.set_source(Some(Arc::clone(&shared)));

    feed(&shared, &mut ex, 10, 5, 30);

    shared.store(&spectrum_with(200, 5));
    let loud = ex.analyze(DT);
    assert!(
        loud.bass > 0.35,
        "attack should let the transient punch through, got {}",
        loud.bass
    );

    shared.store(&spectrum_with(10, 5));
    let after = ex.analyze(DT);
    assert!(
        after.bass > loud.bass * 0.8,
        "release should decay musically: {} -> {}",
        loud.bass,
        after.bass
    );
}

#[test]
fn beat_tunables_are_exposed_as_configuration() {
    let cfg = BeatConfig {
        window_secs: 0.5,
        sigma_multiplier: 2.0,
        rising_factor: 1.1,
        flux_floor: 0.01,
        cooldown_ms: 200.0,
        intensity_half_life_ms: 100.0,
    };
    let ex = FeatureExtractor::new(cfg);
    assert_eq!(ex.config().sigma_multiplier, 2.0);
    assert_eq!(ex.config().cooldown_ms, 200.0);

    let defaults = BeatConfig::default();
    assert_eq!(defaults.sigma_multiplier, 1.5);
    assert_eq!(defaults.rising_factor, 1.2);
    assert_eq!(defaults.cooldown_ms, 120.0);
}
