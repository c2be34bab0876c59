//! Data types shared between `MutationEngine` and its configuration.

use serde::{Deserialize, Serialize};

use crate::param::ParamKey;

/// One weighted, bounded-delta rule the mutation engine can select.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRule {
    pub parameter: String,
    pub weight: f64,
    pub delta_min: f64,
    pub delta_max: f64,
    pub delta_scale: f64,
    pub description: String,
}

/// A single applied mutation, retained in a bounded history for
/// introspection/debugging.
#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub timestamp: std::time::Instant,
    pub parameter: ParamKey,
    pub old: f64,
    pub new: f64,
    pub delta: f64,
    pub description: String,
}

pub const MUTATION_HISTORY_CAPACITY: usize = 100;
