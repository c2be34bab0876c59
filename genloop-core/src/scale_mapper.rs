//! Turns `(scale_index, root_note, degree, octave)` into a MIDI pitch
//! (spec.md §4 ScaleMapper), against either the full built-in scale table
//! or a configuration-restricted subset of it.

use genloop_types::scale::{note_at, scale_by_name, BUILTIN_SCALES};

#[derive(Debug, Clone)]
struct ScaleEntry {
    name: String,
    intervals: Vec<i32>,
}

pub struct ScaleMapper {
    scales: Vec<ScaleEntry>,
}

impl ScaleMapper {
    /// All nine built-in scales, in their spec-defined order.
    pub fn new() -> Self {
        let scales = BUILTIN_SCALES
            .iter()
            .map(|s| ScaleEntry {
                name: s.name.to_string(),
                intervals: s.intervals.to_vec(),
            })
            .collect();
        Self { scales }
    }

    /// Restrict (and order) the available scales to `names`. Unknown names
    /// are skipped with a warning rather than rejected outright, so a typo
    /// in one config entry doesn't take down the whole deployment.
    pub fn with_names(names: &[String]) -> Self {
        if names.is_empty() {
            return Self::new();
        }
        let scales = names
            .iter()
            .filter_map(|n| match scale_by_name(n) {
                Some(s) => Some(ScaleEntry {
                    name: s.name.to_string(),
                    intervals: s.intervals.to_vec(),
                }),
                None => {
                    log::warn!(target: "genloop_core::scale_mapper", "unknown scale '{n}' in config, skipping");
                    None
                }
            })
            .collect::<Vec<_>>();
        if scales.is_empty() {
            Self::new()
        } else {
            Self { scales }
        }
    }

    pub fn len(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scales.is_empty()
    }

    pub fn name_at(&self, scale_index: i64) -> &str {
        let idx = scale_index.rem_euclid(self.scales.len() as i64) as usize;
        &self.scales[idx].name
    }

    /// `scale_index` wraps into the available table (a config with fewer
    /// scales than the stored `scale_index` just cycles, rather than
    /// erroring on every tick).
    pub fn pitch(&self, scale_index: i64, root: i64, degree: i32, octave: i32) -> u8 {
        let idx = scale_index.rem_euclid(self.scales.len() as i64) as usize;
        note_at(&self.scales[idx].intervals, root as i32, degree, octave)
    }
}

impl Default for ScaleMapper {
    fn default() -> Self {
        Self::new()
    }
}
