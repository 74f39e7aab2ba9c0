use duetto_bridge::config::GateConfig;
use duetto_engine::{block_duration_ms, gate::ConfidenceGate, one_pole_coefficient};

fn gate() -> (ConfidenceGate, f32) {
    let block_ms = block_duration_ms(128, 48_000);
    (ConfidenceGate::new(GateConfig::default(), block_ms), block_ms)
}

#[test]
fn sustained_confidence_opens_after_frames_on() {
    let (mut gate, block_ms) = gate();
    let config = GateConfig::default();
    let release = one_pole_coefficient(block_ms, config.release_ms);

    for _ in 1..config.frames_on {
        assert_eq!(gate.update(1.0), config.duck_db);
    }

    let mut expected = config.duck_db * release;
    let gain = gate.update(1.0);
    assert_eq!(gate.target_db(), 0.0);
    assert!((gain - expected).abs() < 1e-4, "got {gain}, expected {expected}");

    for _ in 0..100 {
        expected *= release;
        let gain = gate.update(1.0);
        assert!((gain - expected).abs() < 1e-3);
    }
}

#[test]
fn hold_keeps_the_guide_open_before_decaying() {
    let (mut gate, block_ms) = gate();
    let config = GateConfig::default();
    let attack = one_pole_coefficient(block_ms, config.attack_ms);

    for _ in 0..3000 {
        gate.update(1.0);
    }
    assert!(gate.gain_db() > -1e-3);

    let hold_blocks = (config.hold_ms / block_ms).floor() as usize;
    for block in 0..hold_blocks {
        let gain = gate.update(0.0);
        assert!(gain > -1e-3, "gain dropped to {gain} during hold at block {block}");
        assert_eq!(gate.target_db(), 0.0);
    }

    // the hold has run out and the off streak is long enough
    let mut previous = gate.gain_db();
    let mut decaying = false;
    for _ in 0..10 {
        let gain = gate.update(0.0);
        if gate.target_db() == config.duck_db {
            let expected = config.duck_db + (previous - config.duck_db) * attack;
            assert!((gain - expected).abs() < 1e-4);
            decaying = true;
        }
        previous = gain;
    }
    assert!(decaying);

    for _ in 0..500 {
        gate.update(0.0);
    }
    assert!((gate.gain_db() - config.duck_db).abs() < 1e-3);
}
