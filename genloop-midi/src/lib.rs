//! Thin `midir`-backed MIDI adapter: port I/O and the raw-byte <-> semantic
//! event translation the core never has to know about.

pub mod input;
pub mod mapping;
pub mod output;

pub use input::{MidiInputAdapter, MidiPortInfo};
pub use mapping::{default_mapping, CcTarget, MidiMapping};
pub use output::MidiOutputAdapter;
