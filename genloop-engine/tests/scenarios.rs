//! End-to-end scenarios against the full `Engine` composition root, using a
//! recording `MidiOutSink` in place of a real MIDI port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use genloop_core::ActionHandler;
use genloop_engine::Engine;
use genloop_types::{
    ControlChangeEvent, EngineConfig, EventKind, EventSource, MidiOutSink, ParamKey, ParamValue,
    QuantizeMode, SemanticEvent,
};

#[derive(Default)]
struct Recorded {
    ons: Vec<(u8, u8, u8)>,
    offs: Vec<(u8, u8)>,
}

struct RecordingSink(Mutex<Recorded>);

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(Recorded::default())))
    }
}

impl MidiOutSink for RecordingSink {
    fn note_on(&self, note: u8, velocity: u8, channel: u8) {
        self.0.lock().unwrap().ons.push((note, velocity, channel));
    }
    fn note_off(&self, note: u8, channel: u8) {
        self.0.lock().unwrap().offs.push((note, channel));
    }
    fn control_change(&self, _cc: ControlChangeEvent) {}
}

#[test]
fn manual_trigger_fires_note_on_and_eventual_note_off() {
    let cfg = EngineConfig::default();
    let sink = RecordingSink::new();
    let engine = Engine::build(&cfg, sink.clone(), 1).expect("engine builds with default config");
    engine.start();

    engine.manual_trigger().trigger(100);
    std::thread::sleep(Duration::from_millis(20));
    {
        let rec = sink.0.lock().unwrap();
        assert_eq!(rec.ons.len(), 1, "expected exactly one note-on from the manual trigger");
        assert_eq!(rec.ons[0].0, 60, "default root note is 60");
    }

    engine.shutdown();
    let rec = sink.0.lock().unwrap();
    assert_eq!(rec.offs.len(), 1, "the triggered note must get a matching note-off by shutdown");
}

#[test]
fn bar_quantized_scale_change_waits_for_sequence_boundary() {
    let cfg = EngineConfig::default();
    let sink = RecordingSink::new();
    let engine = Engine::build(&cfg, sink, 2).expect("engine builds with default config");

    engine
        .state
        .set(ParamKey::QuantizeScaleChanges, ParamValue::Quantize(QuantizeMode::Bar), "test");

    let interaction = engine.interaction_sink();
    let trigger = engine.manual_trigger();
    let handler = ActionHandler::new(engine.state.clone(), interaction, Some(trigger), 9);

    let event = SemanticEvent::new(EventKind::ScaleSelect, EventSource::Cc, 127, 1);
    handler.handle(&event);

    assert_eq!(
        engine.state.get(&ParamKey::ScaleIndex),
        Some(ParamValue::Int(0)),
        "scale_index must not move until the sequencer promotes the pending value"
    );
    assert!(
        matches!(
            engine.state.get(&ParamKey::PendingScaleIndex),
            Some(ParamValue::Int(n)) if n > 0
        ),
        "the selection should be parked in pending_scale_index"
    );

    engine.shutdown();
}
