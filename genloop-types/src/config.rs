//! Deserializable configuration sections (spec.md §6). Parsing and
//! defaulting live in `genloop-core::config`; these are the plain DTOs
//! `toml` deserializes into.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SequencerConfig {
    pub bpm: Option<f64>,
    pub swing: Option<f64>,
    pub density: Option<f64>,
    pub sequence_length: Option<i64>,
    pub gate_length: Option<f64>,
    pub base_velocity: Option<i64>,
    pub velocity_range: Option<i64>,
    pub note_probability: Option<f64>,
    pub step_probabilities: Option<Vec<f64>>,
    pub step_pattern: Option<Vec<bool>>,
    pub direction_pattern: Option<String>,
    pub voices: Option<i64>,
    pub quantize_scale_changes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MutationRuleConfig {
    pub parameter: String,
    pub weight: f64,
    pub delta_range: (f64, f64),
    pub delta_scale: f64,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MutationConfig {
    pub interval_min_s: Option<f64>,
    pub interval_max_s: Option<f64>,
    pub max_changes_per_cycle: Option<usize>,
    #[serde(default)]
    pub rules: Vec<MutationRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    pub timeout_ms: Option<u64>,
    pub ambient_profile: Option<String>,
    pub fade_in_ms: Option<u64>,
    pub fade_out_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FugueConfig {
    pub use_tonal_answer: Option<bool>,
    pub voice_range_low: Option<i64>,
    pub voice_range_high: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    pub sequencer: Option<SequencerConfig>,
    #[serde(default)]
    pub scales: Vec<String>,
    pub mutation: Option<MutationConfig>,
    pub idle: Option<IdleConfig>,
    pub fugue: Option<FugueConfig>,
}
