//! Idle-gated periodic weighted parameter mutation (spec.md §4.7): while the
//! engine is idle, periodically nudge a handful of parameters by a small
//! bounded random amount so a long unattended idle stretch keeps drifting
//! rather than sitting on one frozen ambient profile. Suppressed entirely
//! while `chaos_lock` is engaged, and a no-op outside idle altogether.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use genloop_types::{MutationEvent, MutationRule, ParamKey, ParamValue, MUTATION_HISTORY_CAPACITY};

use crate::gates::IdleGate;
use crate::param_lookup::parse_param_key;
use crate::state::State;

pub struct MutationEngine {
    state: Arc<State>,
    idle_gate: Arc<dyn IdleGate>,
    rules: Vec<MutationRule>,
    interval_min: Duration,
    interval_max: Duration,
    max_changes_per_cycle: usize,
    rng: Mutex<ChaCha8Rng>,
    history: Mutex<VecDeque<MutationEvent>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MutationEngine {
    pub fn new(
        state: Arc<State>,
        idle_gate: Arc<dyn IdleGate>,
        rules: Vec<MutationRule>,
        interval_min_s: f64,
        interval_max_s: f64,
        max_changes_per_cycle: usize,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            idle_gate,
            rules,
            interval_min: Duration::from_secs_f64(interval_min_s.max(0.01)),
            interval_max: Duration::from_secs_f64(interval_max_s.max(interval_min_s.max(0.01))),
            max_changes_per_cycle: max_changes_per_cycle.max(1),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            history: Mutex::new(VecDeque::with_capacity(MUTATION_HISTORY_CAPACITY)),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn history(&self) -> Vec<MutationEvent> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Spawn the background thread. No-op if already running.
    pub fn start(self: &Arc<Self>) {
        if self.handle.lock().unwrap().is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.stop_tx.lock().unwrap() = Some(tx);
        let engine = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("genloop-mutation".into())
            .spawn(move || loop {
                let wait = engine.next_interval();
                match rx.recv_timeout(wait) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            engine.tick();
                        }));
                        if let Err(e) = result {
                            log::error!(
                                target: "genloop_core::mutation_engine",
                                "mutation tick panicked, continuing: {e:?}"
                            );
                        }
                    }
                }
            })
            .expect("failed to spawn genloop-mutation thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!(
                    target: "genloop_core::mutation_engine",
                    "mutation thread join failed: {e:?}"
                );
            }
        }
    }

    fn next_interval(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap();
        let lo = self.interval_min.as_secs_f64();
        let hi = self.interval_max.as_secs_f64();
        let secs = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        Duration::from_secs_f64(secs)
    }

    /// One mutation cycle: no-op outside idle, and no-op while `chaos_lock`
    /// is engaged; otherwise select up to `max_changes_per_cycle` rules
    /// without replacement, weighted by `MutationRule::weight`, and apply
    /// each one's bounded random delta.
    pub fn tick(&self) {
        if !self.idle_gate.is_idle() {
            return;
        }
        let chaos_locked = self
            .state
            .get(&ParamKey::ChaosLock)
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if chaos_locked {
            return;
        }
        let chosen = self.select_rules();
        for rule in chosen {
            self.apply_rule(&rule);
        }
    }

    fn select_rules(&self) -> Vec<MutationRule> {
        let mut pool: Vec<MutationRule> = self.rules.clone();
        let mut chosen = Vec::new();
        let mut rng = self.rng.lock().unwrap();
        for _ in 0..self.max_changes_per_cycle.min(pool.len()) {
            let total: f64 = pool.iter().map(|r| r.weight).sum();
            if total <= 0.0 {
                break;
            }
            let mut threshold = rng.gen_range(0.0..total);
            let mut idx = 0;
            for (i, r) in pool.iter().enumerate() {
                if threshold < r.weight {
                    idx = i;
                    break;
                }
                threshold -= r.weight;
            }
            chosen.push(pool.remove(idx));
        }
        chosen
    }

    fn apply_rule(&self, rule: &MutationRule) {
        let Some(key) = parse_param_key(&rule.parameter) else {
            log::warn!(
                target: "genloop_core::mutation_engine",
                "mutation rule references unknown parameter '{}'",
                rule.parameter
            );
            return;
        };
        let Some(current) = self.state.get(&key) else {
            return;
        };
        let Some(old) = current.as_f64() else {
            log::warn!(
                target: "genloop_core::mutation_engine",
                "mutation rule targets non-numeric parameter '{}'",
                rule.parameter
            );
            return;
        };
        let delta = {
            let mut rng = self.rng.lock().unwrap();
            rng.gen_range(rule.delta_min..=rule.delta_max) * rule.delta_scale
        };
        let proposed = old + delta;
        let new_value = match current {
            ParamValue::Int(_) => ParamValue::Int(proposed.round() as i64),
            _ => ParamValue::Float(proposed),
        };
        if self.state.set(key.clone(), new_value, "mutation") {
            let applied = self.state.get(&key).and_then(|v| v.as_f64()).unwrap_or(proposed);
            self.record(MutationEvent {
                timestamp: Instant::now(),
                parameter: key,
                old,
                new: applied,
                delta,
                description: rule.description.clone(),
            });
        }
    }

    fn record(&self, event: MutationEvent) {
        let mut history = self.history.lock().unwrap();
        if history.len() >= MUTATION_HISTORY_CAPACITY {
            history.pop_front();
        }
        history.push_back(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloop_types::ParamKey;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct NeverIdle;
    impl IdleGate for NeverIdle {
        fn is_idle(&self) -> bool {
            false
        }
        fn force_exit_idle(&self) {}
    }

    struct AlwaysIdle;
    impl IdleGate for AlwaysIdle {
        fn is_idle(&self) -> bool {
            true
        }
        fn force_exit_idle(&self) {}
    }

    fn density_rule() -> MutationRule {
        MutationRule {
            parameter: "density".into(),
            weight: 1.0,
            delta_min: 0.1,
            delta_max: 0.1,
            delta_scale: 1.0,
            description: "fixed bump".into(),
        }
    }

    #[test]
    fn tick_is_noop_while_not_idle() {
        let state = Arc::new(State::new());
        let engine = MutationEngine::new(
            state.clone(),
            Arc::new(NeverIdle),
            vec![density_rule()],
            0.01,
            0.01,
            1,
            1,
        );
        let before = state.get(&ParamKey::Density).unwrap();
        engine.tick();
        assert_eq!(state.get(&ParamKey::Density).unwrap(), before);
    }

    #[test]
    fn tick_nudges_selected_parameter_while_idle() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Density, ParamValue::Float(0.5), "test");
        let engine = MutationEngine::new(
            state.clone(),
            Arc::new(AlwaysIdle),
            vec![density_rule()],
            0.01,
            0.01,
            1,
            1,
        );
        engine.tick();
        let after = state.get(&ParamKey::Density).unwrap().as_f64().unwrap();
        assert!((after - 0.6).abs() < 1e-9);
        assert_eq!(engine.history().len(), 1);
    }

    #[test]
    fn tick_is_noop_while_chaos_locked_even_if_idle() {
        let state = Arc::new(State::new());
        state.set(ParamKey::ChaosLock, ParamValue::Bool(true), "test");
        let before = state.get(&ParamKey::Density).unwrap();
        let engine = MutationEngine::new(
            state.clone(),
            Arc::new(AlwaysIdle),
            vec![density_rule()],
            0.01,
            0.01,
            1,
            1,
        );
        engine.tick();
        assert_eq!(state.get(&ParamKey::Density).unwrap(), before);
        assert!(engine.history().is_empty());
    }

    #[test]
    fn unknown_rule_parameter_is_logged_and_skipped() {
        let state = Arc::new(State::new());
        let bogus = MutationRule {
            parameter: "not_real".into(),
            weight: 1.0,
            delta_min: 0.0,
            delta_max: 0.0,
            delta_scale: 1.0,
            description: "bogus".into(),
        };
        let engine = MutationEngine::new(state, Arc::new(AlwaysIdle), vec![bogus], 0.01, 0.01, 1, 1);
        let hit = Arc::new(AtomicBool::new(false));
        let hit2 = hit.clone();
        std::panic::set_hook(Box::new(move |_| {
            hit2.store(true, Ordering::SeqCst);
        }));
        engine.tick();
        let _ = std::panic::take_hook();
        assert!(!hit.load(Ordering::SeqCst));
        assert!(engine.history().is_empty());
    }
}
