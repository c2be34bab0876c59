//! MIDI output adapter: turns `MidiOutSink` calls into raw MIDI bytes over
//! a `midir::MidiOutputConnection`.

use std::sync::Mutex;

use midir::{MidiOutput, MidiOutputConnection};

use genloop_types::{ControlChangeEvent, MidiOutSink};

pub struct MidiOutputAdapter {
    connection: Mutex<MidiOutputConnection>,
}

impl MidiOutputAdapter {
    pub fn connect(port_index: usize) -> Result<Self, String> {
        let midi_out = MidiOutput::new("genloop").map_err(|e| e.to_string())?;
        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("invalid MIDI output port index: {port_index}"))?;
        let connection = midi_out
            .connect(port, "genloop-output")
            .map_err(|e| e.to_string())?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn list_ports() -> Vec<String> {
        let Ok(midi_out) = MidiOutput::new("genloop") else {
            return Vec::new();
        };
        midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect()
    }

    fn send(&self, bytes: &[u8]) {
        if let Err(e) = self.connection.lock().unwrap().send(bytes) {
            log::error!(target: "genloop_midi::output", "failed to send MIDI bytes: {e}");
        }
    }
}

impl MidiOutSink for MidiOutputAdapter {
    fn note_on(&self, note: u8, velocity: u8, channel: u8) {
        let status = 0x90 | ((channel.saturating_sub(1)) & 0x0F);
        self.send(&[status, note, velocity]);
    }

    fn note_off(&self, note: u8, channel: u8) {
        let status = 0x80 | ((channel.saturating_sub(1)) & 0x0F);
        self.send(&[status, note, 0]);
    }

    fn control_change(&self, cc: ControlChangeEvent) {
        let status = 0xB0 | ((cc.channel.saturating_sub(1)) & 0x0F);
        self.send(&[status, cc.controller, cc.value]);
    }
}
