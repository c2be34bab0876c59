//! Configuration loading: an embedded default TOML document merged with an
//! optional user override file, validated against the parameter and scale
//! tables before the engine is allowed to start.

use std::fmt;
use std::path::PathBuf;

use genloop_types::idle::builtin_profile;
use genloop_types::scale::scale_by_name;
use genloop_types::{EngineConfig, FugueConfig, IdleConfig, MutationConfig, SequencerConfig};

use crate::param_lookup::parse_param_key;

const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml");

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    UnknownScale(String),
    UnknownProfile(String),
    InvalidMutationRule(String),
    InvalidFugueConfig(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "config io error: {msg}"),
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::UnknownScale(name) => write!(f, "unknown scale in config: {name}"),
            ConfigError::UnknownProfile(name) => {
                write!(f, "unknown ambient profile in config: {name}")
            }
            ConfigError::InvalidMutationRule(msg) => {
                write!(f, "invalid mutation rule: {msg}")
            }
            ConfigError::InvalidFugueConfig(msg) => {
                write!(f, "invalid fugue config: {msg}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Default location of the user override file: `<config_dir>/genloop/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("genloop").join("config.toml"))
}

/// Load the embedded default config, merge an optional user override on
/// top, and validate the result. This is the only fallible entry point;
/// every other configuration accessor works off the validated `EngineConfig`.
pub fn load() -> Result<EngineConfig, ConfigError> {
    let mut cfg: EngineConfig =
        toml::from_str(DEFAULT_CONFIG_TOML).map_err(|e| ConfigError::Parse(e.to_string()))?;

    if let Some(path) = user_config_path() {
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
            let user: EngineConfig = toml::from_str(&text)
                .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
            cfg = merge(cfg, user);
        }
    }

    validate(&cfg)?;
    Ok(cfg)
}

/// Load from explicit default/override text, bypassing the filesystem.
/// Used by tests and by callers that embed their own config elsewhere.
pub fn load_from_str(default_toml: &str, user_toml: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let mut cfg: EngineConfig =
        toml::from_str(default_toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if let Some(text) = user_toml {
        let user: EngineConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg = merge(cfg, user);
    }
    validate(&cfg)?;
    Ok(cfg)
}

fn merge(default: EngineConfig, user: EngineConfig) -> EngineConfig {
    EngineConfig {
        sequencer: merge_sequencer(default.sequencer, user.sequencer),
        scales: if user.scales.is_empty() {
            default.scales
        } else {
            user.scales
        },
        mutation: merge_mutation(default.mutation, user.mutation),
        idle: merge_idle(default.idle, user.idle),
        fugue: merge_fugue(default.fugue, user.fugue),
    }
}

fn merge_sequencer(
    default: Option<SequencerConfig>,
    user: Option<SequencerConfig>,
) -> Option<SequencerConfig> {
    let Some(user) = user else { return default };
    let Some(default) = default else { return Some(user) };
    Some(SequencerConfig {
        bpm: user.bpm.or(default.bpm),
        swing: user.swing.or(default.swing),
        density: user.density.or(default.density),
        sequence_length: user.sequence_length.or(default.sequence_length),
        gate_length: user.gate_length.or(default.gate_length),
        base_velocity: user.base_velocity.or(default.base_velocity),
        velocity_range: user.velocity_range.or(default.velocity_range),
        note_probability: user.note_probability.or(default.note_probability),
        step_probabilities: user.step_probabilities.or(default.step_probabilities),
        step_pattern: user.step_pattern.or(default.step_pattern),
        direction_pattern: user.direction_pattern.or(default.direction_pattern),
        voices: user.voices.or(default.voices),
        quantize_scale_changes: user
            .quantize_scale_changes
            .or(default.quantize_scale_changes),
    })
}

fn merge_mutation(
    default: Option<MutationConfig>,
    user: Option<MutationConfig>,
) -> Option<MutationConfig> {
    let Some(user) = user else { return default };
    let Some(default) = default else { return Some(user) };
    Some(MutationConfig {
        interval_min_s: user.interval_min_s.or(default.interval_min_s),
        interval_max_s: user.interval_max_s.or(default.interval_max_s),
        max_changes_per_cycle: user.max_changes_per_cycle.or(default.max_changes_per_cycle),
        rules: if user.rules.is_empty() {
            default.rules
        } else {
            user.rules
        },
    })
}

fn merge_idle(default: Option<IdleConfig>, user: Option<IdleConfig>) -> Option<IdleConfig> {
    let Some(user) = user else { return default };
    let Some(default) = default else { return Some(user) };
    Some(IdleConfig {
        timeout_ms: user.timeout_ms.or(default.timeout_ms),
        ambient_profile: user.ambient_profile.or(default.ambient_profile),
        fade_in_ms: user.fade_in_ms.or(default.fade_in_ms),
        fade_out_ms: user.fade_out_ms.or(default.fade_out_ms),
    })
}

fn merge_fugue(default: Option<FugueConfig>, user: Option<FugueConfig>) -> Option<FugueConfig> {
    let Some(user) = user else { return default };
    let Some(default) = default else { return Some(user) };
    Some(FugueConfig {
        use_tonal_answer: user.use_tonal_answer.or(default.use_tonal_answer),
        voice_range_low: user.voice_range_low.or(default.voice_range_low),
        voice_range_high: user.voice_range_high.or(default.voice_range_high),
    })
}

fn validate(cfg: &EngineConfig) -> Result<(), ConfigError> {
    for name in &cfg.scales {
        if scale_by_name(name).is_none() {
            return Err(ConfigError::UnknownScale(name.clone()));
        }
    }

    if let Some(mutation) = &cfg.mutation {
        for rule in &mutation.rules {
            if parse_param_key(&rule.parameter).is_none() {
                return Err(ConfigError::InvalidMutationRule(format!(
                    "unknown parameter '{}'",
                    rule.parameter
                )));
            }
            if rule.weight <= 0.0 {
                return Err(ConfigError::InvalidMutationRule(format!(
                    "rule for '{}' has non-positive weight {}",
                    rule.parameter, rule.weight
                )));
            }
            if rule.delta_range.0 > rule.delta_range.1 {
                return Err(ConfigError::InvalidMutationRule(format!(
                    "rule for '{}' has delta_range min > max",
                    rule.parameter
                )));
            }
        }
    }

    if let Some(idle) = &cfg.idle {
        if let Some(profile) = &idle.ambient_profile {
            if builtin_profile(profile).is_none() {
                return Err(ConfigError::UnknownProfile(profile.clone()));
            }
        }
    }

    if let Some(fugue) = &cfg.fugue {
        if let (Some(lo), Some(hi)) = (fugue.voice_range_low, fugue.voice_range_high) {
            if lo > hi {
                return Err(ConfigError::InvalidFugueConfig(
                    "voice_range_low must not exceed voice_range_high".into(),
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_loads_and_validates() {
        let cfg = load_from_str(DEFAULT_CONFIG_TOML, None).unwrap();
        assert!(!cfg.scales.is_empty());
        assert!(cfg.mutation.is_some());
    }

    #[test]
    fn user_override_replaces_bpm_only() {
        let user = r#"
            [sequencer]
            bpm = 90.0
        "#;
        let cfg = load_from_str(DEFAULT_CONFIG_TOML, Some(user)).unwrap();
        let seq = cfg.sequencer.unwrap();
        assert_eq!(seq.bpm, Some(90.0));
        assert_eq!(seq.gate_length, Some(0.5));
    }

    #[test]
    fn unknown_scale_is_rejected() {
        let user = r#"scales = ["not_a_scale"]"#;
        let err = load_from_str(DEFAULT_CONFIG_TOML, Some(user)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownScale(_)));
    }

    #[test]
    fn unknown_mutation_parameter_is_rejected() {
        let user = r#"
            [mutation]
            [[mutation.rules]]
            parameter = "not_real"
            weight = 1.0
            delta_range = [-1.0, 1.0]
            delta_scale = 1.0
            description = "bogus"
        "#;
        let err = load_from_str(DEFAULT_CONFIG_TOML, Some(user)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMutationRule(_)));
    }

    #[test]
    fn unknown_idle_profile_is_rejected() {
        let user = r#"
            [idle]
            ambient_profile = "not_a_profile"
        "#;
        let err = load_from_str(DEFAULT_CONFIG_TOML, Some(user)).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile(_)));
    }

    #[test]
    fn fugue_defaults_enable_tonal_answer() {
        let cfg = load_from_str(DEFAULT_CONFIG_TOML, None).unwrap();
        let fugue = cfg.fugue.unwrap();
        assert_eq!(fugue.use_tonal_answer, Some(true));
        assert_eq!(fugue.voice_range_low, Some(36));
        assert_eq!(fugue.voice_range_high, Some(96));
    }

    #[test]
    fn inverted_voice_range_is_rejected() {
        let user = r#"
            [fugue]
            voice_range_low = 80
            voice_range_high = 40
        "#;
        let err = load_from_str(DEFAULT_CONFIG_TOML, Some(user)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFugueConfig(_)));
    }
}
