//! The seam between the generative engine and whatever actually owns a
//! MIDI output port. Defined here (not in `genloop-engine`) so an adapter
//! crate like `genloop-midi` can implement it without depending on the
//! engine crate at all.

use crate::note::ControlChangeEvent;

pub trait MidiOutSink: Send + Sync {
    fn note_on(&self, note: u8, velocity: u8, channel: u8);
    fn note_off(&self, note: u8, channel: u8);
    fn control_change(&self, cc: ControlChangeEvent);
}
