//! Built-in scale tables. A scale is just its semitone intervals from the
//! tonic; `ScaleMapper` (in `genloop-core`) turns `(degree, octave, root)`
//! into a MIDI pitch using this data.

#[derive(Debug, Clone)]
pub struct ScaleTable {
    pub name: &'static str,
    pub intervals: &'static [i32],
}

pub const MAJOR: ScaleTable = ScaleTable {
    name: "major",
    intervals: &[0, 2, 4, 5, 7, 9, 11],
};
pub const MINOR: ScaleTable = ScaleTable {
    name: "minor",
    intervals: &[0, 2, 3, 5, 7, 8, 10],
};
pub const PENTATONIC_MAJOR: ScaleTable = ScaleTable {
    name: "pentatonic_major",
    intervals: &[0, 2, 4, 7, 9],
};
pub const PENTATONIC_MINOR: ScaleTable = ScaleTable {
    name: "pentatonic_minor",
    intervals: &[0, 3, 5, 7, 10],
};
pub const DORIAN: ScaleTable = ScaleTable {
    name: "dorian",
    intervals: &[0, 2, 3, 5, 7, 9, 10],
};
pub const MIXOLYDIAN: ScaleTable = ScaleTable {
    name: "mixolydian",
    intervals: &[0, 2, 4, 5, 7, 9, 10],
};
pub const BLUES: ScaleTable = ScaleTable {
    name: "blues",
    intervals: &[0, 3, 5, 6, 7, 10],
};
pub const LOCRIAN: ScaleTable = ScaleTable {
    name: "locrian",
    intervals: &[0, 1, 3, 5, 6, 8, 10],
};
pub const CHROMATIC: ScaleTable = ScaleTable {
    name: "chromatic",
    intervals: &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
};

/// Built-in scale table in spec-defined order; `scale_index` indexes into
/// this unless the deployment's config overrides it with a custom list.
pub const BUILTIN_SCALES: &[ScaleTable] = &[
    MAJOR,
    MINOR,
    PENTATONIC_MAJOR,
    PENTATONIC_MINOR,
    DORIAN,
    MIXOLYDIAN,
    BLUES,
    LOCRIAN,
    CHROMATIC,
];

pub fn scale_by_name(name: &str) -> Option<&'static ScaleTable> {
    BUILTIN_SCALES.iter().find(|s| s.name == name)
}

/// MIDI pitch for `degree` (may exceed the scale's length; wraps with an
/// octave bump) at the given `octave` bias, relative to `root`.
pub fn note_at(intervals: &[i32], root: i32, degree: i32, octave: i32) -> u8 {
    let len = intervals.len() as i32;
    let octave_from_degree = degree.div_euclid(len);
    let degree_in_scale = degree.rem_euclid(len);
    let semitone = intervals[degree_in_scale as usize];
    let pitch = root + semitone + (octave + octave_from_degree) * 12;
    pitch.clamp(0, 127) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_zero_is_root() {
        assert_eq!(note_at(MAJOR.intervals, 60, 0, 0), 60);
    }

    #[test]
    fn degree_wraps_octave_up() {
        // 7th degree of a 7-note scale wraps to the root an octave up.
        assert_eq!(note_at(MAJOR.intervals, 60, 7, 0), 72);
    }

    #[test]
    fn negative_degree_wraps_down() {
        assert_eq!(note_at(MAJOR.intervals, 60, -1, 0), 60 + 11 - 12);
    }

    #[test]
    fn scale_lookup_by_name() {
        assert!(scale_by_name("blues").is_some());
        assert!(scale_by_name("nonexistent").is_none());
    }
}
