//! Small traits that decouple the modules that need to talk about
//! interaction/idle state from any single concrete implementation.
//!
//! `IdleManager` is the only implementor of `InteractionSink`/`IdleGate` in
//! this crate, but `ActionHandler` and `MutationEngine` depend on the
//! traits rather than the concrete type so both can be exercised with fakes
//! in tests, and so a caller in `genloop-engine` never needs a concrete
//! `IdleManager` to wire them up. `BpmRamp` runs the other way: it lets
//! `IdleManager` (here) drive `HighResClock` (in `genloop-engine`) without
//! this crate depending on that one.

use std::time::Duration;

/// Anything that can be told "the user just interacted".
pub trait InteractionSink: Send + Sync {
    fn note_interaction(&self);
}

/// Read/force the idle state that gates `MutationEngine`'s periodic firing.
pub trait IdleGate: Send + Sync {
    fn is_idle(&self) -> bool;
    fn force_exit_idle(&self);
}

/// Implemented by whatever owns immediate note triggering (the sequencer,
/// in `genloop-engine`) so `ActionHandler::handle` can dispatch
/// `TriggerStep` without depending on that crate.
pub trait ManualTriggerSink: Send + Sync {
    fn trigger(&self, velocity_hint: u8);
}

/// Implemented by the tick clock so idle entry/exit can fade `bpm` toward a
/// target over `duration` instead of jumping it.
pub trait BpmRamp: Send + Sync {
    fn start_bpm_transition(&self, target: f64, duration: Duration);
}
