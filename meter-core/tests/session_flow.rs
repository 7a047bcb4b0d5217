//! End-to-end smoke test: a synthetic floating-needle signal runs through
//! the pipeline and classifier, and a structured session advances through
//! its rudiments using that signal as the meter reading.

use meter_core::classifier::{NeedleClassifier, WINDOW_SIZE};
use meter_core::events::{MeterEvent, NeedleAction};
use meter_core::pipeline::SignalPipeline;
use meter_core::session::{SessionManager, SessionMode, SessionPhase};
use meter_core::tracker::ChargeTracker;

#[test]
fn floating_signal_drives_classifier_and_session_together() {
    let mut pipeline = SignalPipeline::new();
    let mut positions = Vec::new();

    for i in 0..400 {
        let t = i as f64 / 62.0;
        let raw = 3_200_000.0 + 50_000.0 * (2.0 * std::f64::consts::PI * 0.3 * t).sin();
        let out = pipeline.process(raw);
        positions.push(out.position);
    }

    let window: Vec<f64> = positions[positions.len() - WINDOW_SIZE..].to_vec();
    let classifier = NeedleClassifier::new();
    let (action, confidence) = classifier.classify(&window);
    assert!(confidence > 0.0);

    let mut manager = SessionManager::new("sess-test", "pc-test", SessionMode::Structured, 0.0);
    let mut charge = ChargeTracker::new();
    manager.start(&mut charge, 0.0);

    let mut meter = MeterEvent::default();
    meter.needle_action = action;
    meter.position = window[window.len() - 1];

    for turn in 0..4 {
        let (_, _) = manager.process_pc_input("acknowledged", &meter, &mut charge, turn as f64 + 1.0);
    }
    assert_eq!(manager.phase, SessionPhase::Processing);
    assert_eq!(manager.turns().len(), 1 + 4 * 2);
}

#[test]
fn session_reaches_complete_through_both_rudiment_phases() {
    let mut manager = SessionManager::new("sess-2", "pc-2", SessionMode::Structured, 0.0);
    let mut charge = ChargeTracker::new();
    manager.start(&mut charge, 0.0);

    let meter = MeterEvent::default();

    for turn in 0..4 {
        manager.process_pc_input("ok", &meter, &mut charge, turn as f64);
    }
    assert_eq!(manager.phase, SessionPhase::Processing);

    manager.begin_end_rudiments(&mut charge, 10.0);
    assert_eq!(manager.phase, SessionPhase::EndRudiments);

    let mut last_line = String::new();
    for turn in 0..5 {
        let (line, _) = manager.process_pc_input("ok", &meter, &mut charge, 10.0 + turn as f64);
        last_line = line;
    }
    assert_eq!(manager.phase, SessionPhase::Complete);
    assert_eq!(last_line, "That is the end of this session. Thank you.");
    assert!(!NeedleAction::Idle.is_floating());
}
