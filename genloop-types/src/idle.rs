//! Built-in ambient profiles applied by `IdleManager` on idle entry.

use crate::param::{ParamKey, ParamValue};

/// A named partial override of state parameters. Only the parameters it
/// names are touched; everything else is left alone.
#[derive(Debug, Clone)]
pub struct AmbientProfile {
    pub name: &'static str,
    pub overrides: Vec<(ParamKey, ParamValue)>,
}

pub fn builtin_profile(name: &str) -> Option<AmbientProfile> {
    match name {
        "slow_fade" => Some(AmbientProfile {
            name: "slow_fade",
            overrides: vec![
                (ParamKey::Density, ParamValue::Float(0.3)),
                (ParamKey::Bpm, ParamValue::Float(65.0)),
                (ParamKey::ScaleIndex, ParamValue::Int(2)), // pentatonic_major
                (ParamKey::Cc("reverb_mix".into()), ParamValue::Int(100)),
                (ParamKey::Cc("filter_cutoff".into()), ParamValue::Int(40)),
                (ParamKey::Cc("master_volume".into()), ParamValue::Int(70)),
            ],
        }),
        "minimal" => Some(AmbientProfile {
            name: "minimal",
            overrides: vec![
                (ParamKey::Density, ParamValue::Float(0.1)),
                (ParamKey::Bpm, ParamValue::Float(45.0)),
                (ParamKey::Cc("master_volume".into()), ParamValue::Int(40)),
            ],
        }),
        "meditative" => Some(AmbientProfile {
            name: "meditative",
            overrides: vec![
                (ParamKey::ScaleIndex, ParamValue::Int(1)), // minor
                (ParamKey::Swing, ParamValue::Float(0.0)),
                (ParamKey::Cc("filter_cutoff".into()), ParamValue::Int(30)),
            ],
        }),
        _ => None,
    }
}

pub const BUILTIN_PROFILE_NAMES: [&str; 3] = ["slow_fade", "minimal", "meditative"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_fade_lowers_density_and_bpm() {
        let p = builtin_profile("slow_fade").unwrap();
        assert!(p
            .overrides
            .iter()
            .any(|(k, v)| *k == ParamKey::Density && *v == ParamValue::Float(0.3)));
    }

    #[test]
    fn unknown_profile_is_none() {
        assert!(builtin_profile("nope").is_none());
    }
}
