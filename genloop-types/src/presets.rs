//! Pure preset lookup functions for the sequencer's pattern/probability
//! gates. All presets are deterministic given a name and (for probability
//! presets) the current sequence length.

/// Named 8-step gate patterns, tiled to `len` if the sequence is longer
/// than 8 and truncated if shorter.
pub fn pattern_preset(name: &str, len: usize) -> Option<Vec<bool>> {
    const T: bool = true;
    const F: bool = false;
    let base: [bool; 8] = match name {
        "four_on_floor" => [T, F, F, F, T, F, F, F],
        "offbeat" => [F, T, F, T, F, T, F, T],
        "every_other" => [T, F, T, F, T, F, T, F],
        "syncopated" => [T, F, T, T, F, T, F, F],
        "dense" => [T, T, F, T, T, F, T, T],
        "sparse" => [T, F, F, F, F, F, T, F],
        "all_on" => [T; 8],
        "all_off" => [F; 8],
        _ => return None,
    };
    Some(tile(&base, len))
}

fn tile<T: Copy>(base: &[T], len: usize) -> Vec<T> {
    (0..len).map(|i| base[i % base.len()]).collect()
}

/// Named probability curves, materialized at length `len`.
pub fn probability_preset(name: &str, len: usize) -> Option<Vec<f64>> {
    if len == 0 {
        return Some(Vec::new());
    }
    let values = match name {
        "uniform" => vec![1.0; len],
        "crescendo" => (0..len)
            .map(|i| (i as f64 + 1.0) / len as f64)
            .collect(),
        "diminuendo" => (0..len)
            .map(|i| 1.0 - (i as f64) / len as f64)
            .collect(),
        "peaks" => (0..len)
            .map(|i| if i % 4 == 0 { 1.0 } else { 0.4 })
            .collect(),
        "valleys" => (0..len)
            .map(|i| if i % 4 == 0 { 0.2 } else { 0.9 })
            .collect(),
        "alternating" => (0..len)
            .map(|i| if i % 2 == 0 { 1.0 } else { 0.3 })
            .collect(),
        "random_low" => vec![0.25; len],
        "random_high" => vec![0.85; len],
        _ => return None,
    };
    Some(values)
}

pub const PATTERN_PRESET_NAMES: [&str; 8] = [
    "four_on_floor",
    "offbeat",
    "every_other",
    "syncopated",
    "dense",
    "sparse",
    "all_on",
    "all_off",
];

pub const PROBABILITY_PRESET_NAMES: [&str; 8] = [
    "uniform",
    "crescendo",
    "diminuendo",
    "peaks",
    "valleys",
    "alternating",
    "random_low",
    "random_high",
];

/// Map a raw 0-127 `value` to the `idx`-th name of `names`, spec.md's
/// `value / 16`-th-name bucketing (16 buckets of 8 values each).
pub fn bucket_name(names: &[&str], value: u8) -> &str {
    let idx = (value as usize / 16).min(names.len() - 1);
    names[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_on_floor_matches_spec() {
        let p = pattern_preset("four_on_floor", 8).unwrap();
        assert_eq!(
            p,
            vec![true, false, false, false, true, false, false, false]
        );
    }

    #[test]
    fn unknown_pattern_is_none() {
        assert!(pattern_preset("nope", 8).is_none());
    }

    #[test]
    fn probability_preset_respects_length() {
        let p = probability_preset("uniform", 5).unwrap();
        assert_eq!(p.len(), 5);
    }

    #[test]
    fn bucket_name_clamps_to_last() {
        assert_eq!(bucket_name(&PATTERN_PRESET_NAMES, 127), "all_off");
        assert_eq!(bucket_name(&PATTERN_PRESET_NAMES, 0), "four_on_floor");
    }
}
