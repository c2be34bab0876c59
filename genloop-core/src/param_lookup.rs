//! The one place that knows how a textual parameter name (as written in a
//! config file or a mutation rule) maps to a `ParamKey`. Shared by config
//! validation and `MutationEngine`.

use genloop_types::ParamKey;

/// `cc:<name>` addresses a continuous-controller target; everything else
/// matches a built-in parameter name exactly.
pub fn parse_param_key(s: &str) -> Option<ParamKey> {
    match s {
        "bpm" => Some(ParamKey::Bpm),
        "swing" => Some(ParamKey::Swing),
        "density" => Some(ParamKey::Density),
        "sequence_length" => Some(ParamKey::SequenceLength),
        "step_position" => Some(ParamKey::StepPosition),
        "scale_index" => Some(ParamKey::ScaleIndex),
        "root_note" => Some(ParamKey::RootNote),
        "gate_length" => Some(ParamKey::GateLength),
        "base_velocity" => Some(ParamKey::BaseVelocity),
        "velocity_range" => Some(ParamKey::VelocityRange),
        "note_probability" => Some(ParamKey::NoteProbability),
        "step_probabilities" => Some(ParamKey::StepProbabilities),
        "step_pattern" => Some(ParamKey::StepPattern),
        "direction_pattern" => Some(ParamKey::DirectionPattern),
        "voices" => Some(ParamKey::Voices),
        "quantize_scale_changes" => Some(ParamKey::QuantizeScaleChanges),
        "idle_mode" => Some(ParamKey::IdleMode),
        "chaos_lock" => Some(ParamKey::ChaosLock),
        "drift" => Some(ParamKey::Drift),
        other => other.strip_prefix("cc:").map(|name| ParamKey::Cc(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_names() {
        assert_eq!(parse_param_key("bpm"), Some(ParamKey::Bpm));
        assert_eq!(parse_param_key("gate_length"), Some(ParamKey::GateLength));
    }

    #[test]
    fn resolves_cc_prefixed_names() {
        assert_eq!(
            parse_param_key("cc:filter_cutoff"),
            Some(ParamKey::Cc("filter_cutoff".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(parse_param_key("not_a_real_param"), None);
    }
}
