use seed_reactor::params::{AudioEffectParams, VisualizerParams};
use seed_reactor::seed;

#[test]
fn round_trip_is_within_one_quantization_step() {
    let cases = [
        ([0.5, 0.3, 0.3, 0.4, 0.3, 0.6], [0.0, 0.0, 0.0]),
        ([0.137, 0.826, 0.004, 0.999, 0.501, 0.25], [0.33, 0.66, 0.99]),
        ([0.08, 0.92, 0.47, 0.13, 0.77, 0.35], [0.12, 0.88, 0.5]),
    ];

    for (v, e) in cases {
        let visual = VisualizerParams::from_array(v);
        let effects = AudioEffectParams::from_array(e);
        let encoded = seed::encode(visual, effects);
        let decoded = seed::decode(&encoded).expect("round trip should decode");

        let orig = v.into_iter().chain(e);
        let back = decoded
            .visual
            .as_array()
            .into_iter()
            .chain(decoded.effects.as_array());
        for (a, b) in orig.zip(back) {
            assert!(
                (a - b).abs() <= 1.0 / 255.0 + 1e-6,
                "component drifted more than 1/255: {a} vs {b} in {encoded}"
            );
        }
    }
}

#[test]
fn extremes_encode_and_decode_exactly() {
    let ones = seed::encode(
        VisualizerParams::from_array([1.0; 6]),
        AudioEffectParams::from_array([1.0; 3]),
    );
    assert_eq!(ones, "SR-FFFFFFFFFFFFFFFFFF");
    let decoded = seed::decode(&ones).unwrap();
    assert_eq!(decoded.visual.as_array(), [1.0; 6]);
    assert_eq!(decoded.effects.as_array(), [1.0; 3]);

    let zeros = seed::encode(
        VisualizerParams::from_array([0.0; 6]),
        AudioEffectParams::from_array([0.0; 3]),
    );
    assert_eq!(zeros, "SR-000000000000000000");
    let decoded = seed::decode(&zeros).unwrap();
    assert_eq!(decoded.visual.as_array(), [0.0; 6]);
    assert_eq!(decoded.effects.as_array(), [0.0; 3]);
}

#[test]
fn byte_order_is_dose_first_break_last() {
    let dose_only = seed::encode(
        VisualizerParams::from_array([1.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        AudioEffectParams::from_array([0.0; 3]),
    );
    assert_eq!(dose_only, "SR-FF0000000000000000");

    let break_only = seed::encode(
        VisualizerParams::from_array([0.0; 6]),
        AudioEffectParams::from_array([0.0, 0.0, 1.0]),
    );
    assert_eq!(break_only, "SR-0000000000000000FF");
}

#[test]
fn hex_digits_are_case_insensitive_on_input() {
    let upper = seed::decode("SR-FF00AA0000000000BB").unwrap();
    let lower = seed::decode("SR-ff00aa0000000000bb").unwrap();
    assert_eq!(upper, lower);
}

#[test]
fn malformed_seeds_are_rejected() {
    let bad = [
        "not-a-seed",
        "SR-TOOSHORT",
        "",
        "SR-",
        "SR-0000000000000000F",   // 17 chars
        "SR-0000000000000000FFF", // 19 chars
        "SR-0000000000000000G0",  // non-hex
        "XX-000000000000000000",  // wrong prefix
        "000000000000000000",     // missing prefix
        "sr-000000000000000000",  // prefix is part of the format, not hex
    ];
    for s in bad {
        assert!(!seed::is_valid(s), "should be invalid: {s:?}");
        assert!(seed::decode(s).is_none(), "should not decode: {s:?}");
    }
}

#[test]
fn is_valid_matches_decode() {
    let seeds = [
        "SR-000000000000000000",
        "SR-FFFFFFFFFFFFFFFFFF",
        "SR-123456789ABCDEF012",
        "SR-123",
        "garbage",
    ];
    for s in seeds {
        assert_eq!(seed::is_valid(s), seed::decode(s).is_some(), "{s}");
    }
}

#[test]
fn seed_hash_is_stable_and_discriminating() {
    let a = seed::seed_hash("SR-000000000000000000");
    let b = seed::seed_hash("SR-000000000000000000");
    let c = seed::seed_hash("SR-000000000000000001");
    assert_eq!(a, b);
    assert_ne!(a, c);
}
