//! Inbound semantic events: the translated form of raw hardware input.

use serde::{Deserialize, Serialize};

/// Which physical control produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSource {
    Button,
    Cc,
    Joystick,
    Switch,
}

/// The closed set of semantic event kinds the core understands.
///
/// Unknown kinds arriving from a mapping layer must be logged and dropped
/// by the caller before construction reaches `ActionHandler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    TriggerStep,
    Tempo,
    Swing,
    Density,
    SequenceLength,
    ScaleSelect,
    RootNoteUp,
    RootNoteDown,
    PatternPreset,
    DirectionPattern,
    Mode,
    Palette,
    Drift,
    ChaosLock,
    CcParameter,
}

/// An inbound control event, already translated from raw MIDI bytes by the
/// (out-of-scope) router. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEvent {
    pub kind: EventKind,
    pub source: EventSource,
    /// 0-127
    pub value: u8,
    pub raw_note: Option<u8>,
    pub raw_cc: Option<u8>,
    /// 1-16
    pub channel: u8,
    /// Which state parameter `CcParameter`/`Mode`/`Palette` events target.
    /// Empty for kinds that don't need a named target.
    pub parameter: Option<String>,
}

impl SemanticEvent {
    pub fn new(kind: EventKind, source: EventSource, value: u8, channel: u8) -> Self {
        Self {
            kind,
            source,
            value: value.min(127),
            raw_note: None,
            raw_cc: None,
            channel: channel.clamp(1, 16),
            parameter: None,
        }
    }

    pub fn with_raw_note(mut self, note: u8) -> Self {
        self.raw_note = Some(note);
        self
    }

    pub fn with_raw_cc(mut self, cc: u8) -> Self {
        self.raw_cc = Some(cc);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>) -> Self {
        self.parameter = Some(name.into());
        self
    }

    /// Linear 0-127 -> [0.0, 1.0] mapping used throughout `ActionHandler`.
    pub fn unit_value(&self) -> f64 {
        self.value as f64 / 127.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_value_extremes() {
        let e = SemanticEvent::new(EventKind::Density, EventSource::Cc, 0, 1);
        assert_eq!(e.unit_value(), 0.0);
        let e = SemanticEvent::new(EventKind::Density, EventSource::Cc, 127, 1);
        assert_eq!(e.unit_value(), 1.0);
    }

    #[test]
    fn channel_clamped() {
        let e = SemanticEvent::new(EventKind::Tempo, EventSource::Button, 10, 0);
        assert_eq!(e.channel, 1);
        let e = SemanticEvent::new(EventKind::Tempo, EventSource::Button, 10, 99);
        assert_eq!(e.channel, 16);
    }
}
