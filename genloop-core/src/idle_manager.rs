//! Ambient-profile apply/restore on interaction timeout (spec.md §4.8).
//!
//! `IdleManager` owns a background clock that watches time-since-last-
//! interaction; once it exceeds the configured timeout it snapshots the
//! profile's target parameters, applies the profile, and restores the
//! snapshot verbatim the moment another interaction arrives. `bpm` is
//! handled separately from the rest of the profile: instead of jumping to
//! the profile's target value it's handed to a `BpmRamp` (the tick clock)
//! to fade over `fade_in`/`fade_out`, if one was supplied.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genloop_types::idle::{builtin_profile, AmbientProfile};
use genloop_types::ParamKey;

use crate::gates::{BpmRamp, IdleGate, InteractionSink};
use crate::state::State;

/// Configuration didn't name a profile this build knows about.
#[derive(Debug)]
pub struct UnknownProfile(pub String);

impl std::fmt::Display for UnknownProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown ambient profile: {}", self.0)
    }
}
impl std::error::Error for UnknownProfile {}

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct IdleManager {
    state: Arc<State>,
    profile: AmbientProfile,
    timeout: Duration,
    fade_in: Duration,
    fade_out: Duration,
    bpm_ramp: Option<Arc<dyn BpmRamp>>,
    last_interaction: Mutex<Instant>,
    idle: AtomicBool,
    saved: Mutex<Option<Vec<(ParamKey, genloop_types::ParamValue)>>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IdleManager {
    pub fn new(
        state: Arc<State>,
        profile_name: &str,
        timeout: Duration,
        fade_in: Duration,
        fade_out: Duration,
        bpm_ramp: Option<Arc<dyn BpmRamp>>,
    ) -> Result<Arc<Self>, UnknownProfile> {
        let profile =
            builtin_profile(profile_name).ok_or_else(|| UnknownProfile(profile_name.to_string()))?;
        Ok(Arc::new(Self {
            state,
            profile,
            timeout,
            fade_in,
            fade_out,
            bpm_ramp,
            last_interaction: Mutex::new(Instant::now()),
            idle: AtomicBool::new(false),
            saved: Mutex::new(None),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        }))
    }

    pub fn start(self: &Arc<Self>) {
        if self.handle.lock().unwrap().is_some() {
            return;
        }
        let (tx, rx) = mpsc::channel();
        *self.stop_tx.lock().unwrap() = Some(tx);
        let manager = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("genloop-idle".into())
            .spawn(move || loop {
                match rx.recv_timeout(POLL_INTERVAL) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        manager.poll();
                    }
                }
            })
            .expect("failed to spawn genloop-idle thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!(target: "genloop_core::idle_manager", "idle thread join failed: {e:?}");
            }
        }
    }

    fn poll(&self) {
        if self.idle.load(Ordering::SeqCst) {
            return;
        }
        let elapsed = self.last_interaction.lock().unwrap().elapsed();
        if elapsed >= self.timeout {
            self.enter_idle();
        }
    }

    fn enter_idle(&self) {
        let keys: Vec<ParamKey> = self.profile.overrides.iter().map(|(k, _)| k.clone()).collect();
        let snapshot: Vec<(ParamKey, genloop_types::ParamValue)> = keys
            .iter()
            .filter_map(|k| self.state.get(k).map(|v| (k.clone(), v)))
            .collect();
        *self.saved.lock().unwrap() = Some(snapshot);

        let bpm_target = self
            .profile
            .overrides
            .iter()
            .find(|(k, _)| *k == ParamKey::Bpm)
            .and_then(|(_, v)| v.as_f64());
        let rest: Vec<_> = self
            .profile
            .overrides
            .iter()
            .filter(|(k, _)| *k != ParamKey::Bpm)
            .cloned()
            .collect();
        self.state.update_multiple(rest, "idle_enter");
        self.apply_bpm(bpm_target, self.fade_in, "idle_enter");

        self.state
            .set(ParamKey::IdleMode, genloop_types::ParamValue::Bool(true), "idle_enter");
        self.idle.store(true, Ordering::SeqCst);
        log::info!(target: "genloop_core::idle_manager", "entered idle, applied profile '{}'", self.profile.name);
    }

    fn exit_idle(&self) {
        if let Some(saved) = self.saved.lock().unwrap().take() {
            let bpm_target = saved
                .iter()
                .find(|(k, _)| *k == ParamKey::Bpm)
                .and_then(|(_, v)| v.as_f64());
            let rest: Vec<_> = saved.into_iter().filter(|(k, _)| *k != ParamKey::Bpm).collect();
            self.state.update_multiple(rest, "idle_exit");
            self.apply_bpm(bpm_target, self.fade_out, "idle_exit");
        }
        self.state
            .set(ParamKey::IdleMode, genloop_types::ParamValue::Bool(false), "idle_exit");
        self.idle.store(false, Ordering::SeqCst);
        log::info!(target: "genloop_core::idle_manager", "exited idle, restored prior parameters");
    }

    /// Ramp `bpm` toward `target` over `duration` via the clock if one was
    /// supplied, otherwise set it directly — so the manager still works
    /// (just without the fade) when nothing is wired up to ramp it.
    fn apply_bpm(&self, target: Option<f64>, duration: Duration, source: &str) {
        let Some(target) = target else { return };
        match &self.bpm_ramp {
            Some(ramp) => ramp.start_bpm_transition(target, duration),
            None => {
                self.state
                    .set(ParamKey::Bpm, genloop_types::ParamValue::Float(target), source);
            }
        }
    }
}

impl InteractionSink for IdleManager {
    fn note_interaction(&self) {
        *self.last_interaction.lock().unwrap() = Instant::now();
        if self.idle.load(Ordering::SeqCst) {
            self.exit_idle();
        }
    }
}

impl IdleGate for IdleManager {
    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn force_exit_idle(&self) {
        if self.idle.load(Ordering::SeqCst) {
            self.exit_idle();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genloop_types::ParamValue;
    use std::sync::Mutex as StdMutex;

    fn no_ramp() -> Option<Arc<dyn BpmRamp>> {
        None
    }

    struct RecordingRamp(StdMutex<Vec<(f64, Duration)>>);
    impl BpmRamp for RecordingRamp {
        fn start_bpm_transition(&self, target: f64, duration: Duration) {
            self.0.lock().unwrap().push((target, duration));
        }
    }

    #[test]
    fn unknown_profile_name_is_rejected() {
        let state = Arc::new(State::new());
        assert!(IdleManager::new(
            state,
            "not_a_profile",
            Duration::from_millis(10),
            Duration::from_millis(1),
            Duration::from_millis(1),
            no_ramp(),
        )
        .is_err());
    }

    #[test]
    fn enter_then_exit_restores_exact_prior_values() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Bpm, ParamValue::Float(140.0), "test");
        let mgr = IdleManager::new(
            state.clone(),
            "slow_fade",
            Duration::from_millis(10),
            Duration::from_millis(1),
            Duration::from_millis(1),
            no_ramp(),
        )
        .unwrap();
        mgr.enter_idle();
        assert!(mgr.is_idle());
        assert_eq!(state.get(&ParamKey::Bpm), Some(ParamValue::Float(65.0)));
        mgr.note_interaction();
        assert!(!mgr.is_idle());
        assert_eq!(state.get(&ParamKey::Bpm), Some(ParamValue::Float(140.0)));
    }

    #[test]
    fn interaction_while_not_idle_just_resets_timer() {
        let state = Arc::new(State::new());
        let mgr = IdleManager::new(
            state,
            "minimal",
            Duration::from_secs(60),
            Duration::from_millis(1),
            Duration::from_millis(1),
            no_ramp(),
        )
        .unwrap();
        mgr.note_interaction();
        assert!(!mgr.is_idle());
    }

    #[test]
    fn force_exit_idle_is_a_noop_when_not_idle() {
        let state = Arc::new(State::new());
        let mgr = IdleManager::new(
            state,
            "minimal",
            Duration::from_secs(60),
            Duration::from_millis(1),
            Duration::from_millis(1),
            no_ramp(),
        )
        .unwrap();
        mgr.force_exit_idle();
        assert!(!mgr.is_idle());
    }

    #[test]
    fn enter_idle_hands_bpm_to_the_ramp_instead_of_jumping_it() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Bpm, ParamValue::Float(140.0), "test");
        let ramp = Arc::new(RecordingRamp(StdMutex::new(Vec::new())));
        let fade_in = Duration::from_millis(4000);
        let mgr = IdleManager::new(
            state.clone(),
            "slow_fade",
            Duration::from_millis(10),
            fade_in,
            Duration::from_millis(2000),
            Some(ramp.clone() as Arc<dyn BpmRamp>),
        )
        .unwrap();
        mgr.enter_idle();
        assert_eq!(state.get(&ParamKey::Bpm), Some(ParamValue::Float(140.0)));
        assert_eq!(ramp.0.lock().unwrap().as_slice(), &[(65.0, fade_in)]);
    }

    #[test]
    fn exit_idle_ramps_bpm_back_over_fade_out() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Bpm, ParamValue::Float(140.0), "test");
        let ramp = Arc::new(RecordingRamp(StdMutex::new(Vec::new())));
        let fade_out = Duration::from_millis(2000);
        let mgr = IdleManager::new(
            state.clone(),
            "slow_fade",
            Duration::from_millis(10),
            Duration::from_millis(4000),
            fade_out,
            Some(ramp.clone() as Arc<dyn BpmRamp>),
        )
        .unwrap();
        mgr.enter_idle();
        mgr.note_interaction();
        assert_eq!(ramp.0.lock().unwrap().as_slice(), &[(65.0, Duration::from_millis(4000)), (140.0, fade_out)]);
    }
}
