//! Outbound event types: what the sequencer/fugue engine hand to the output
//! adapter.

use serde::{Deserialize, Serialize};

/// Sentinel pitch used by `NoteEvent::rest` — never written to a MIDI
/// output byte since `is_rest` gates emission first.
pub const REST_PITCH: u8 = 255;

/// A single note-on/off pair waiting to be scheduled, or a rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub note: u8,
    pub velocity: u8,
    pub duration_seconds: f64,
    pub step_index: i32,
    pub voice_index: u32,
    pub is_rest: bool,
    pub channel: u8,
}

impl NoteEvent {
    pub fn note_on(
        note: u8,
        velocity: u8,
        duration_seconds: f64,
        step_index: i32,
        voice_index: u32,
        channel: u8,
    ) -> Self {
        Self {
            note: note.min(127),
            velocity: velocity.clamp(1, 127),
            duration_seconds: duration_seconds.max(f64::EPSILON),
            step_index,
            voice_index,
            is_rest: false,
            channel: channel.clamp(1, 16),
        }
    }

    pub fn rest(step_index: i32, voice_index: u32) -> Self {
        Self {
            note: REST_PITCH,
            velocity: 0,
            duration_seconds: 0.0,
            step_index,
            voice_index,
            is_rest: true,
            channel: 1,
        }
    }
}

/// A continuous-controller update headed for an external synth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChangeEvent {
    pub controller: u8,
    pub value: u8,
    pub channel: u8,
}

impl ControlChangeEvent {
    pub fn new(controller: u8, value: u8, channel: u8) -> Self {
        Self {
            controller: controller.min(127),
            value: value.min(127),
            channel: channel.clamp(1, 16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rest_carries_no_output() {
        let r = NoteEvent::rest(3, 0);
        assert!(r.is_rest);
        assert_eq!(r.duration_seconds, 0.0);
    }

    #[test]
    fn note_on_clamps_velocity() {
        let n = NoteEvent::note_on(60, 0, 0.25, 0, 0, 1);
        assert_eq!(n.velocity, 1);
        let n = NoteEvent::note_on(60, 200, 0.25, 0, 0, 1);
        assert_eq!(n.velocity, 127);
    }
}
