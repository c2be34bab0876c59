//! Stateful orchestration for the generative MIDI engine: the observable
//! parameter store, scale mapping, configuration loading, event dispatch,
//! periodic mutation, and idle-profile management.
//!
//! Nothing in this crate owns a clock or a MIDI port — that's
//! `genloop-engine` and `genloop-midi` respectively.

pub mod config;
pub mod dispatch;
pub mod gates;
pub mod idle_manager;
pub mod mutation_engine;
pub mod param_lookup;
pub mod scale_mapper;
pub mod state;

pub use config::{load as load_config, ConfigError};
pub use dispatch::ActionHandler;
pub use gates::{BpmRamp, IdleGate, InteractionSink, ManualTriggerSink};
pub use idle_manager::IdleManager;
pub use mutation_engine::MutationEngine;
pub use scale_mapper::ScaleMapper;
pub use state::{Change, ListenerId, State};
