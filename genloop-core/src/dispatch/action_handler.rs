//! Dispatches inbound `SemanticEvent`s onto the parameter store (spec.md
//! §4.6). Every event counts as user interaction regardless of kind, so the
//! `InteractionSink` fires first and unconditionally.

use std::sync::Arc;

use genloop_types::param::{Direction, QuantizeMode};
use genloop_types::presets::{
    bucket_name, pattern_preset, probability_preset, PATTERN_PRESET_NAMES, PROBABILITY_PRESET_NAMES,
};
use genloop_types::{EventKind, ParamKey, ParamValue, SemanticEvent};

use crate::gates::{InteractionSink, ManualTriggerSink};
use crate::state::State;

pub struct ActionHandler {
    state: Arc<State>,
    interaction: Arc<dyn InteractionSink>,
    manual_trigger: Option<Arc<dyn ManualTriggerSink>>,
    scale_count: usize,
}

impl ActionHandler {
    pub fn new(
        state: Arc<State>,
        interaction: Arc<dyn InteractionSink>,
        manual_trigger: Option<Arc<dyn ManualTriggerSink>>,
        scale_count: usize,
    ) -> Self {
        Self {
            state,
            interaction,
            manual_trigger,
            scale_count: scale_count.max(1),
        }
    }

    pub fn handle(&self, event: &SemanticEvent) {
        self.interaction.note_interaction();
        let unit = event.unit_value();
        match event.kind {
            EventKind::TriggerStep => {
                if let Some(sink) = &self.manual_trigger {
                    sink.trigger(event.value);
                } else {
                    log::debug!(target: "genloop_core::action_handler", "trigger_step received with no sink configured");
                }
            }
            EventKind::Tempo => {
                self.set(ParamKey::Bpm, ParamValue::Float(60.0 + unit * 140.0));
            }
            EventKind::Swing => {
                self.set(ParamKey::Swing, ParamValue::Float(unit * 0.5));
            }
            EventKind::Density => {
                self.set(ParamKey::Density, ParamValue::Float(unit));
            }
            EventKind::SequenceLength => {
                let len = 1 + ((unit * 31.0).round() as i64);
                self.set(ParamKey::SequenceLength, ParamValue::Int(len));
            }
            EventKind::ScaleSelect => {
                let idx = ((event.value as usize * self.scale_count) / 128).min(self.scale_count - 1);
                let immediate = self
                    .state
                    .get(&ParamKey::QuantizeScaleChanges)
                    .and_then(|v| v.as_quantize())
                    == Some(QuantizeMode::Immediate);
                if immediate {
                    self.set(ParamKey::ScaleIndex, ParamValue::Int(idx as i64));
                } else {
                    self.set(ParamKey::PendingScaleIndex, ParamValue::Int(idx as i64));
                }
            }
            EventKind::RootNoteUp => self.bump_root_note(1),
            EventKind::RootNoteDown => self.bump_root_note(-1),
            EventKind::PatternPreset => {
                let len = self.sequence_length();
                let name = bucket_name(&PATTERN_PRESET_NAMES, event.value);
                if let Some(pattern) = pattern_preset(name, len) {
                    self.set(ParamKey::StepPattern, ParamValue::Gate(pattern));
                }
            }
            EventKind::DirectionPattern => {
                let d = Direction::from_bucket(event.value);
                self.set(ParamKey::DirectionPattern, ParamValue::Direction(d));
            }
            EventKind::Mode => {
                let mode = if event.value >= 64 {
                    QuantizeMode::Immediate
                } else {
                    QuantizeMode::Bar
                };
                self.set(ParamKey::QuantizeScaleChanges, ParamValue::Quantize(mode));
            }
            EventKind::Palette => {
                let len = self.sequence_length();
                let name = bucket_name(&PROBABILITY_PRESET_NAMES, event.value);
                if let Some(curve) = probability_preset(name, len) {
                    self.set(ParamKey::StepProbabilities, ParamValue::Steps(curve));
                }
            }
            EventKind::Drift => {
                self.set(ParamKey::Drift, ParamValue::Float(-0.2 + unit * 0.4));
            }
            EventKind::ChaosLock => {
                self.set(ParamKey::ChaosLock, ParamValue::Bool(event.value >= 64));
            }
            EventKind::CcParameter => self.handle_cc(event),
        }
    }

    fn handle_cc(&self, event: &SemanticEvent) {
        let Some(name) = &event.parameter else {
            log::warn!(target: "genloop_core::action_handler", "cc_parameter event missing a target name, dropped");
            return;
        };
        self.state.register_cc(name, event.value as i64);
        self.set(
            ParamKey::Cc(name.clone()),
            ParamValue::Int(event.value as i64),
        );
    }

    fn bump_root_note(&self, delta: i64) {
        let current = self
            .state
            .get(&ParamKey::RootNote)
            .and_then(|v| v.as_i64())
            .unwrap_or(60);
        self.set(ParamKey::RootNote, ParamValue::Int(current + delta));
    }

    fn sequence_length(&self) -> usize {
        self.state
            .get(&ParamKey::SequenceLength)
            .and_then(|v| v.as_i64())
            .unwrap_or(8)
            .max(1) as usize
    }

    fn set(&self, key: ParamKey, value: ParamValue) {
        self.state.set(key, value, "action_handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloop_types::EventSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSink(AtomicUsize);
    impl InteractionSink for CountingSink {
        fn note_interaction(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct RecordingTrigger(AtomicUsize);
    impl ManualTriggerSink for RecordingTrigger {
        fn trigger(&self, _velocity_hint: u8) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn event(kind: EventKind, value: u8) -> SemanticEvent {
        SemanticEvent::new(kind, EventSource::Cc, value, 1)
    }

    #[test]
    fn every_event_notes_interaction() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state, sink.clone(), None, 9);
        handler.handle(&event(EventKind::Density, 64));
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tempo_maps_to_documented_formula() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state.clone(), sink, None, 9);
        handler.handle(&event(EventKind::Tempo, 127));
        let bpm = state.get(&ParamKey::Bpm).unwrap().as_f64().unwrap();
        assert!((bpm - (60.0 + (127.0 / 127.0) * 140.0)).abs() < 1e-6);
    }

    #[test]
    fn trigger_step_forwards_to_sink() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let trigger = Arc::new(RecordingTrigger(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state, sink, Some(trigger.clone()), 9);
        handler.handle(&event(EventKind::TriggerStep, 100));
        assert_eq!(trigger.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cc_parameter_without_name_is_dropped() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state.clone(), sink, None, 9);
        handler.handle(&event(EventKind::CcParameter, 50));
        assert_eq!(state.get(&ParamKey::Cc("missing".into())), None);
    }

    #[test]
    fn cc_parameter_with_name_registers_and_sets() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state.clone(), sink, None, 9);
        let e = event(EventKind::CcParameter, 80).with_parameter("filter_cutoff");
        handler.handle(&e);
        assert_eq!(
            state.get(&ParamKey::Cc("filter_cutoff".into())),
            Some(ParamValue::Int(80))
        );
    }

    #[test]
    fn scale_select_defers_to_pending_under_bar_quantize() {
        let state = Arc::new(State::new());
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state.clone(), sink, None, 4);
        handler.handle(&event(EventKind::ScaleSelect, 127));
        assert_eq!(state.get(&ParamKey::ScaleIndex), Some(ParamValue::Int(0)));
        assert_eq!(
            state.get(&ParamKey::PendingScaleIndex),
            Some(ParamValue::Int(3))
        );
    }

    #[test]
    fn scale_select_buckets_across_scale_count() {
        let state = Arc::new(State::new());
        state.set(
            ParamKey::QuantizeScaleChanges,
            ParamValue::Quantize(QuantizeMode::Immediate),
            "test",
        );
        let sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let handler = ActionHandler::new(state.clone(), sink, None, 4);
        handler.handle(&event(EventKind::ScaleSelect, 127));
        assert_eq!(state.get(&ParamKey::ScaleIndex), Some(ParamValue::Int(3)));
    }
}
