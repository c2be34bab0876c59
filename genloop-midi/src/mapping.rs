//! Routes raw MIDI note/CC numbers to semantic event kinds. Owned by this
//! adapter crate, not the core: the engine never sees a MIDI byte.

use std::collections::HashMap;

use genloop_types::EventKind;

/// What a CC number drives: either one of the built-in semantic kinds, or a
/// named continuous-controller target forwarded as `cc_parameter`.
#[derive(Debug, Clone)]
pub enum CcTarget {
    Semantic(EventKind),
    Named(String),
}

#[derive(Debug, Clone)]
pub struct MidiMapping {
    note_triggers: HashMap<u8, EventKind>,
    cc_targets: HashMap<u8, CcTarget>,
}

impl MidiMapping {
    pub fn new() -> Self {
        Self {
            note_triggers: HashMap::new(),
            cc_targets: HashMap::new(),
        }
    }

    pub fn with_note(mut self, note: u8, kind: EventKind) -> Self {
        self.note_triggers.insert(note, kind);
        self
    }

    pub fn with_cc(mut self, cc: u8, target: CcTarget) -> Self {
        self.cc_targets.insert(cc, target);
        self
    }

    pub fn resolve_note(&self, note: u8) -> Option<EventKind> {
        self.note_triggers.get(&note).copied()
    }

    pub fn resolve_cc(&self, cc: u8) -> Option<&CcTarget> {
        self.cc_targets.get(&cc)
    }
}

impl Default for MidiMapping {
    fn default() -> Self {
        Self::new()
    }
}

/// A reasonable default mapping for a one-octave pad controller plus a bank
/// of knobs, matching the example layout in spec.md's semantic event table.
pub fn default_mapping() -> MidiMapping {
    MidiMapping::new()
        .with_note(36, EventKind::TriggerStep)
        .with_cc(1, CcTarget::Semantic(EventKind::Tempo))
        .with_cc(2, CcTarget::Semantic(EventKind::Swing))
        .with_cc(3, CcTarget::Semantic(EventKind::Density))
        .with_cc(4, CcTarget::Semantic(EventKind::SequenceLength))
        .with_cc(5, CcTarget::Semantic(EventKind::ScaleSelect))
        .with_cc(6, CcTarget::Semantic(EventKind::PatternPreset))
        .with_cc(7, CcTarget::Semantic(EventKind::DirectionPattern))
        .with_cc(8, CcTarget::Semantic(EventKind::Mode))
        .with_cc(9, CcTarget::Semantic(EventKind::Palette))
        .with_cc(10, CcTarget::Semantic(EventKind::Drift))
        .with_cc(11, CcTarget::Semantic(EventKind::ChaosLock))
        .with_cc(74, CcTarget::Named("filter_cutoff".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mapping_resolves_trigger_note() {
        let m = default_mapping();
        assert_eq!(m.resolve_note(36), Some(EventKind::TriggerStep));
        assert_eq!(m.resolve_note(99), None);
    }

    #[test]
    fn default_mapping_resolves_named_cc() {
        let m = default_mapping();
        match m.resolve_cc(74) {
            Some(CcTarget::Named(name)) => assert_eq!(name, "filter_cutoff"),
            other => panic!("expected named target, got {other:?}"),
        }
    }

    #[test]
    fn unmapped_cc_resolves_to_none() {
        let m = default_mapping();
        assert!(m.resolve_cc(123).is_none());
    }
}
