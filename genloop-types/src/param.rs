//! The keyed parameter model backing `State`: domains, values and the pure
//! validation/clamping rules the store applies on every `set`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identity for a state parameter. `Cc` covers the open-ended set of
/// continuous controller targets (filter_cutoff, reverb_mix, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKey {
    Bpm,
    Swing,
    Density,
    SequenceLength,
    StepPosition,
    ScaleIndex,
    /// A scale change awaiting the next bar boundary when
    /// `quantize_scale_changes` is `bar`. `-1` means nothing pending.
    PendingScaleIndex,
    RootNote,
    GateLength,
    BaseVelocity,
    VelocityRange,
    NoteProbability,
    StepProbabilities,
    StepPattern,
    DirectionPattern,
    Voices,
    QuantizeScaleChanges,
    IdleMode,
    ChaosLock,
    Drift,
    Cc(String),
}

impl ParamKey {
    pub fn as_str(&self) -> &str {
        match self {
            ParamKey::Bpm => "bpm",
            ParamKey::Swing => "swing",
            ParamKey::Density => "density",
            ParamKey::SequenceLength => "sequence_length",
            ParamKey::StepPosition => "step_position",
            ParamKey::ScaleIndex => "scale_index",
            ParamKey::PendingScaleIndex => "pending_scale_index",
            ParamKey::RootNote => "root_note",
            ParamKey::GateLength => "gate_length",
            ParamKey::BaseVelocity => "base_velocity",
            ParamKey::VelocityRange => "velocity_range",
            ParamKey::NoteProbability => "note_probability",
            ParamKey::StepProbabilities => "step_probabilities",
            ParamKey::StepPattern => "step_pattern",
            ParamKey::DirectionPattern => "direction_pattern",
            ParamKey::Voices => "voices",
            ParamKey::QuantizeScaleChanges => "quantize_scale_changes",
            ParamKey::IdleMode => "idle_mode",
            ParamKey::ChaosLock => "chaos_lock",
            ParamKey::Drift => "drift",
            ParamKey::Cc(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
    PingPong,
    Random,
    Fugue,
}

impl Direction {
    pub const ALL: [Direction; 5] = [
        Direction::Forward,
        Direction::Backward,
        Direction::PingPong,
        Direction::Random,
        Direction::Fugue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::PingPong => "ping_pong",
            Direction::Random => "random",
            Direction::Fugue => "fugue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.name() == s)
    }

    /// Map a raw 0-127 value to a bucket over `Direction::ALL`.
    pub fn from_bucket(value: u8) -> Self {
        let idx = (value as usize * Self::ALL.len()) / 128;
        Self::ALL[idx.min(Self::ALL.len() - 1)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizeMode {
    Bar,
    Immediate,
}

impl QuantizeMode {
    pub fn name(&self) -> &'static str {
        match self {
            QuantizeMode::Bar => "bar",
            QuantizeMode::Immediate => "immediate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bar" => Some(QuantizeMode::Bar),
            "immediate" => Some(QuantizeMode::Immediate),
            _ => None,
        }
    }
}

/// The validated domain a parameter's value must live in.
#[derive(Debug, Clone)]
pub enum ParamDomain {
    FloatRange(f64, f64),
    IntRange(i64, i64),
    Bool,
    Direction,
    Quantize,
    /// Ordered probabilities, one per step; length tracks `sequence_length`.
    Steps,
    /// Ordered gate booleans, one per step; length tracks `sequence_length`.
    Gate,
}

/// A stored value. The `Steps`/`Gate` variants are always kept at exactly
/// `sequence_length` entries by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Direction(Direction),
    Quantize(QuantizeMode),
    Steps(Vec<f64>),
    Gate(Vec<bool>),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_direction(&self) -> Option<Direction> {
        match self {
            ParamValue::Direction(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_quantize(&self) -> Option<QuantizeMode> {
        match self {
            ParamValue::Quantize(q) => Some(*q),
            _ => None,
        }
    }

    pub fn as_steps(&self) -> Option<&[f64]> {
        match self {
            ParamValue::Steps(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_gate(&self) -> Option<&[bool]> {
        match self {
            ParamValue::Gate(v) => Some(v),
            _ => None,
        }
    }
}

/// Static description of a single parameter: its domain and default.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub domain: ParamDomain,
    pub default: ParamValue,
}

/// Validate and clamp/pad `value` against `domain`, given the store's
/// current `sequence_length` (needed to reshape `Steps`/`Gate` values).
/// Returns `None` when the value is rejected outright (unknown enum tag,
/// type mismatch against the domain).
pub fn validate(
    domain: &ParamDomain,
    value: ParamValue,
    sequence_length: usize,
    per_step_default: f64,
) -> Option<ParamValue> {
    match domain {
        ParamDomain::FloatRange(lo, hi) => value.as_f64().map(|v| ParamValue::Float(v.clamp(*lo, *hi))),
        ParamDomain::IntRange(lo, hi) => value
            .as_i64()
            .map(|v| ParamValue::Int(v.clamp(*lo, *hi))),
        ParamDomain::Bool => value.as_bool().map(ParamValue::Bool),
        ParamDomain::Direction => value.as_direction().map(ParamValue::Direction),
        ParamDomain::Quantize => value.as_quantize().map(ParamValue::Quantize),
        ParamDomain::Steps => value.as_steps().map(|v| {
            ParamValue::Steps(reshape(v, sequence_length, per_step_default))
        }),
        ParamDomain::Gate => value
            .as_gate()
            .map(|v| ParamValue::Gate(reshape_bool(v, sequence_length, per_step_default != 0.0))),
    }
}

fn reshape(values: &[f64], len: usize, pad: f64) -> Vec<f64> {
    let mut out = values.to_vec();
    out.truncate(len);
    while out.len() < len {
        out.push(pad);
    }
    out
}

fn reshape_bool(values: &[bool], len: usize, pad: bool) -> Vec<bool> {
    let mut out = values.to_vec();
    out.truncate(len);
    while out.len() < len {
        out.push(pad);
    }
    out
}

/// Build the authoritative spec table for every built-in parameter
/// described in spec.md §3. `Cc` parameters are added on demand by callers
/// that need additional continuous controllers.
pub fn default_specs() -> HashMap<ParamKey, ParamSpec> {
    let mut m = HashMap::new();
    m.insert(
        ParamKey::Bpm,
        ParamSpec {
            domain: ParamDomain::FloatRange(1.0, 300.0),
            default: ParamValue::Float(120.0),
        },
    );
    m.insert(
        ParamKey::Swing,
        ParamSpec {
            domain: ParamDomain::FloatRange(0.0, 0.5),
            default: ParamValue::Float(0.0),
        },
    );
    m.insert(
        ParamKey::Density,
        ParamSpec {
            domain: ParamDomain::FloatRange(0.0, 1.0),
            default: ParamValue::Float(1.0),
        },
    );
    m.insert(
        ParamKey::SequenceLength,
        ParamSpec {
            domain: ParamDomain::IntRange(1, 32),
            default: ParamValue::Int(8),
        },
    );
    m.insert(
        ParamKey::StepPosition,
        ParamSpec {
            domain: ParamDomain::IntRange(0, 31),
            default: ParamValue::Int(0),
        },
    );
    m.insert(
        ParamKey::ScaleIndex,
        ParamSpec {
            domain: ParamDomain::IntRange(0, i64::MAX),
            default: ParamValue::Int(0),
        },
    );
    m.insert(
        ParamKey::PendingScaleIndex,
        ParamSpec {
            domain: ParamDomain::IntRange(-1, i64::MAX),
            default: ParamValue::Int(-1),
        },
    );
    m.insert(
        ParamKey::RootNote,
        ParamSpec {
            domain: ParamDomain::IntRange(0, 127),
            default: ParamValue::Int(60),
        },
    );
    m.insert(
        ParamKey::GateLength,
        ParamSpec {
            domain: ParamDomain::FloatRange(0.05, 1.0),
            default: ParamValue::Float(0.5),
        },
    );
    m.insert(
        ParamKey::BaseVelocity,
        ParamSpec {
            domain: ParamDomain::IntRange(1, 127),
            default: ParamValue::Int(80),
        },
    );
    m.insert(
        ParamKey::VelocityRange,
        ParamSpec {
            domain: ParamDomain::IntRange(0, 127),
            default: ParamValue::Int(0),
        },
    );
    m.insert(
        ParamKey::NoteProbability,
        ParamSpec {
            domain: ParamDomain::FloatRange(0.0, 1.0),
            default: ParamValue::Float(1.0),
        },
    );
    m.insert(
        ParamKey::StepProbabilities,
        ParamSpec {
            domain: ParamDomain::Steps,
            default: ParamValue::Steps(Vec::new()),
        },
    );
    m.insert(
        ParamKey::StepPattern,
        ParamSpec {
            domain: ParamDomain::Gate,
            default: ParamValue::Gate(Vec::new()),
        },
    );
    m.insert(
        ParamKey::DirectionPattern,
        ParamSpec {
            domain: ParamDomain::Direction,
            default: ParamValue::Direction(Direction::Forward),
        },
    );
    m.insert(
        ParamKey::Voices,
        ParamSpec {
            domain: ParamDomain::IntRange(1, 4),
            default: ParamValue::Int(1),
        },
    );
    m.insert(
        ParamKey::QuantizeScaleChanges,
        ParamSpec {
            domain: ParamDomain::Quantize,
            default: ParamValue::Quantize(QuantizeMode::Bar),
        },
    );
    m.insert(
        ParamKey::IdleMode,
        ParamSpec {
            domain: ParamDomain::Bool,
            default: ParamValue::Bool(false),
        },
    );
    m.insert(
        ParamKey::ChaosLock,
        ParamSpec {
            domain: ParamDomain::Bool,
            default: ParamValue::Bool(false),
        },
    );
    m.insert(
        ParamKey::Drift,
        ParamSpec {
            domain: ParamDomain::FloatRange(-0.2, 0.2),
            default: ParamValue::Float(0.0),
        },
    );
    m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_float_range() {
        let v = validate(&ParamDomain::FloatRange(1.0, 300.0), ParamValue::Float(500.0), 8, 1.0)
            .unwrap();
        assert_eq!(v, ParamValue::Float(300.0));
    }

    #[test]
    fn reject_type_mismatch() {
        let v = validate(&ParamDomain::Bool, ParamValue::Float(1.0), 8, 1.0);
        assert!(v.is_none());
    }

    #[test]
    fn steps_truncate_and_pad() {
        let v = validate(
            &ParamDomain::Steps,
            ParamValue::Steps(vec![0.1, 0.2, 0.3]),
            5,
            0.75,
        )
        .unwrap();
        assert_eq!(v, ParamValue::Steps(vec![0.1, 0.2, 0.3, 0.75, 0.75]));

        let v = validate(
            &ParamDomain::Steps,
            ParamValue::Steps(vec![0.1, 0.2, 0.3, 0.4, 0.5]),
            3,
            0.75,
        )
        .unwrap();
        assert_eq!(v, ParamValue::Steps(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn direction_bucket_mapping() {
        assert_eq!(Direction::from_bucket(0), Direction::Forward);
        assert_eq!(Direction::from_bucket(127), Direction::Fugue);
    }

    #[test]
    fn direction_parse_round_trip() {
        for d in Direction::ALL {
            assert_eq!(Direction::parse(d.name()), Some(d));
        }
    }
}
