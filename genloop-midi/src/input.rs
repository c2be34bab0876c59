//! Raw MIDI input port management and byte-level parsing, grounded on the
//! same port-enumeration/connect/disconnect shape as the teacher's input
//! manager. Connected port pushes translated `SemanticEvent`s onto a
//! channel instead of raw `MidiEvent`s.

use std::sync::mpsc::{self, Receiver, Sender};

use midir::{MidiInput, MidiInputConnection};

use genloop_types::{EventKind, EventSource, SemanticEvent};

use crate::mapping::{CcTarget, MidiMapping};

#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

pub struct MidiInputAdapter {
    midi_in: Option<MidiInput>,
    connection: Option<MidiInputConnection<()>>,
    event_receiver: Option<Receiver<SemanticEvent>>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
    mapping: MidiMapping,
}

impl MidiInputAdapter {
    pub fn new(mapping: MidiMapping) -> Self {
        let midi_in = MidiInput::new("genloop").ok();
        Self {
            midi_in,
            connection: None,
            event_receiver: None,
            connected_port_name: None,
            available_ports: Vec::new(),
            mapping,
        }
    }

    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();
        if let Some(midi_in) = &self.midi_in {
            for (index, port) in midi_in.ports().iter().enumerate() {
                if let Ok(name) = midi_in.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    pub fn connect(&mut self, port_index: usize) -> Result<(), String> {
        self.disconnect();

        let midi_in = MidiInput::new("genloop").map_err(|e| e.to_string())?;
        let ports = midi_in.ports();
        let port = ports
            .get(port_index)
            .ok_or_else(|| format!("invalid MIDI input port index: {port_index}"))?;
        let port_name = midi_in.port_name(port).unwrap_or_else(|_| "unknown".to_string());

        let (tx, rx) = mpsc::channel();
        self.event_receiver = Some(rx);
        let mapping = self.mapping.clone();

        let connection = midi_in
            .connect(
                port,
                "genloop-input",
                move |_timestamp, message, _| {
                    if let Some(event) = translate(message, &mapping) {
                        let _ = tx.send(event);
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);
        self.midi_in = MidiInput::new("genloop").ok();
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.event_receiver = None;
        self.connected_port_name = None;
    }

    /// Drain every `SemanticEvent` translated since the last call. Never
    /// blocks.
    pub fn poll_events(&self) -> Vec<SemanticEvent> {
        let mut events = Vec::new();
        if let Some(rx) = &self.event_receiver {
            while let Ok(event) = rx.try_recv() {
                events.push(event);
            }
        }
        events
    }
}

impl Drop for MidiInputAdapter {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Parse a raw MIDI message and route it through `mapping` to a
/// `SemanticEvent`. Unmapped notes/CCs are dropped, not forwarded as
/// unknown kinds.
fn translate(data: &[u8], mapping: &MidiMapping) -> Option<SemanticEvent> {
    if data.len() < 3 {
        return None;
    }
    let status = data[0];
    let channel = (status & 0x0F) + 1;
    let message_type = status & 0xF0;

    match message_type {
        0x90 if data[2] > 0 => {
            let kind = mapping.resolve_note(data[1])?;
            Some(
                SemanticEvent::new(kind, EventSource::Button, data[2], channel)
                    .with_raw_note(data[1]),
            )
        }
        0xB0 => match mapping.resolve_cc(data[1])? {
            CcTarget::Semantic(kind) => Some(
                SemanticEvent::new(*kind, EventSource::Cc, data[2], channel).with_raw_cc(data[1]),
            ),
            CcTarget::Named(name) => Some(
                SemanticEvent::new(EventKind::CcParameter, EventSource::Cc, data[2], channel)
                    .with_raw_cc(data[1])
                    .with_parameter(name.clone()),
            ),
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::default_mapping;

    #[test]
    fn note_on_with_velocity_maps_to_trigger() {
        let mapping = default_mapping();
        let event = translate(&[0x90, 36, 100], &mapping).unwrap();
        assert_eq!(event.kind, EventKind::TriggerStep);
        assert_eq!(event.raw_note, Some(36));
    }

    #[test]
    fn note_on_with_zero_velocity_is_dropped() {
        let mapping = default_mapping();
        assert!(translate(&[0x90, 36, 0], &mapping).is_none());
    }

    #[test]
    fn unmapped_note_is_dropped() {
        let mapping = default_mapping();
        assert!(translate(&[0x90, 40, 100], &mapping).is_none());
    }

    #[test]
    fn cc_with_named_target_carries_parameter_name() {
        let mapping = default_mapping();
        let event = translate(&[0xB0, 74, 80], &mapping).unwrap();
        assert_eq!(event.kind, EventKind::CcParameter);
        assert_eq!(event.parameter.as_deref(), Some("filter_cutoff"));
    }

    #[test]
    fn cc_with_semantic_target_maps_directly() {
        let mapping = default_mapping();
        let event = translate(&[0xB0, 1, 100], &mapping).unwrap();
        assert_eq!(event.kind, EventKind::Tempo);
    }

    #[test]
    fn short_messages_are_dropped() {
        let mapping = default_mapping();
        assert!(translate(&[0x90, 36], &mapping).is_none());
    }
}
