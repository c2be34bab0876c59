//! Real-time threads: the tick clock, the step sequencer, the fugue
//! generator, the note-off scheduler, and the composition root that wires
//! them together over a shared `genloop_core::State`.

pub mod clock;
pub mod engine;
pub mod error;
pub mod fugue;
pub mod scheduler;
pub mod sequencer;

pub use clock::{HighResClock, Tick};
pub use engine::Engine;
pub use error::EngineError;
pub use fugue::FugueEngine;
pub use scheduler::NoteScheduler;
pub use sequencer::Sequencer;
