//! Inbound event dispatch: turning a `SemanticEvent` into state changes (and
//! occasionally a direct action, like `TriggerStep`).

pub mod action_handler;

pub use action_handler::ActionHandler;
