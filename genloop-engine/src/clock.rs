//! Drift-corrected, swing-aware tick generator (spec.md §4.2).
//!
//! The tick grid is tracked independently of wall-clock sleep error: every
//! tick's target time is the *previous target plus the nominal interval*,
//! never `now() + interval`. A late wakeup is absorbed by not sleeping next
//! time, not by stretching the interval — so jitter never accumulates into
//! a tempo drift. Swing adds a one-off delay to odd-16th tick targets on
//! top of that grid, without perturbing the grid itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genloop_core::{BpmRamp, State};
use genloop_types::ParamKey;

/// One tick of the clock grid.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub index: u64,
    pub at: Instant,
}

struct Transition {
    from: f64,
    to: f64,
    start: Instant,
    duration: Duration,
}

impl Transition {
    fn value_at(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.start).as_secs_f64();
        let total = self.duration.as_secs_f64().max(f64::EPSILON);
        let t = (elapsed / total).min(1.0);
        self.from + (self.to - self.from) * t
    }

    fn is_done(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.start) >= self.duration
    }
}

pub struct HighResClock {
    state: Arc<State>,
    ppq: u32,
    tx: crossbeam_channel::Sender<Tick>,
    bpm_transition: Mutex<Option<Transition>>,
    running: AtomicBool,
    stop_tx: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HighResClock {
    pub fn new(state: Arc<State>, ppq: u32, tx: crossbeam_channel::Sender<Tick>) -> Arc<Self> {
        Arc::new(Self {
            state,
            ppq: ppq.max(1),
            tx,
            bpm_transition: Mutex::new(None),
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    /// Idempotent: calling `start` while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let (stop_tx, stop_rx) = mpsc::channel();
        *self.stop_tx.lock().unwrap() = Some(stop_tx);
        let clock = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("genloop-clock".into())
            .spawn(move || clock.run(stop_rx))
            .expect("failed to spawn genloop-clock thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    /// Idempotent and joining: calling `stop` more than once, or before
    /// `start`, is a no-op.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!(target: "genloop_engine::clock", "clock thread join failed: {e:?}");
            }
        }
    }

    /// Begin a linear bpm ramp toward `target`, completing over `duration`.
    /// Used by idle entry/exit to fade tempo instead of jumping it.
    pub fn start_bpm_transition(&self, target: f64, duration: Duration) {
        let from = self
            .state
            .get(&ParamKey::Bpm)
            .and_then(|v| v.as_f64())
            .unwrap_or(target);
        *self.bpm_transition.lock().unwrap() = Some(Transition {
            from,
            to: target,
            start: Instant::now(),
            duration,
        });
    }

    fn sixteenth_ticks(&self) -> u64 {
        (self.ppq / 4).max(1) as u64
    }

    fn current_bpm(&self) -> f64 {
        self.state
            .get(&ParamKey::Bpm)
            .and_then(|v| v.as_f64())
            .unwrap_or(120.0)
            .max(1.0)
    }

    fn current_swing(&self) -> f64 {
        self.state
            .get(&ParamKey::Swing)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    fn tick_interval(&self, bpm: f64) -> Duration {
        Duration::from_secs_f64(60.0 / (bpm * self.ppq as f64))
    }

    fn apply_bpm_transition(&self, now: Instant) {
        let mut guard = self.bpm_transition.lock().unwrap();
        let Some(t) = guard.as_ref() else { return };
        let value = t.value_at(now);
        self.state.set(ParamKey::Bpm, genloop_types::ParamValue::Float(value), "clock_transition");
        if t.is_done(now) {
            *guard = None;
        }
    }

    fn run(&self, stop_rx: mpsc::Receiver<()>) {
        let mut index: u64 = 0;
        let mut grid_target = Instant::now();
        let sixteenth_ticks = self.sixteenth_ticks();
        loop {
            let now = Instant::now();
            self.apply_bpm_transition(now);
            let bpm = self.current_bpm();
            let swing = self.current_swing();
            let interval = self.tick_interval(bpm);

            let mut target = grid_target;
            if sixteenth_ticks > 0 && index % sixteenth_ticks == 0 {
                let step = index / sixteenth_ticks;
                if step % 2 == 1 {
                    let sixteenth_duration = interval * (sixteenth_ticks as u32);
                    target += sixteenth_duration.mul_f64(swing);
                }
            }

            let wait = target.saturating_duration_since(Instant::now());
            match stop_rx.recv_timeout(wait) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            let emitted_at = Instant::now();
            if self.tx.try_send(Tick { index, at: emitted_at }).is_err() {
                log::warn!(target: "genloop_engine::clock", "tick channel full at index {index}, consumer falling behind");
            }

            grid_target += interval;
            index = index.wrapping_add(1);
        }
    }
}

impl BpmRamp for HighResClock {
    fn start_bpm_transition(&self, target: f64, duration: Duration) {
        HighResClock::start_bpm_transition(self, target, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn ticks_flow_at_roughly_the_configured_rate() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Bpm, genloop_types::ParamValue::Float(600.0), "test");
        let (tx, rx) = crossbeam_channel::bounded(256);
        let clock = HighResClock::new(state, 24, tx);
        clock.start();
        let mut seen = 0;
        let deadline = Instant::now() + StdDuration::from_millis(300);
        while Instant::now() < deadline && seen < 50 {
            if rx.recv_timeout(StdDuration::from_millis(50)).is_ok() {
                seen += 1;
            }
        }
        clock.stop();
        assert!(seen > 10, "expected steady ticks, saw {seen}");
    }

    #[test]
    fn stop_is_idempotent() {
        let state = Arc::new(State::new());
        let (tx, _rx) = crossbeam_channel::bounded(16);
        let clock = HighResClock::new(state, 24, tx);
        clock.start();
        clock.stop();
        clock.stop();
    }

    #[test]
    fn bpm_transition_reaches_target_value() {
        let state = Arc::new(State::new());
        state.set(ParamKey::Bpm, genloop_types::ParamValue::Float(120.0), "test");
        let (tx, _rx) = crossbeam_channel::bounded(16);
        let clock = HighResClock::new(state.clone(), 24, tx);
        let t = Transition {
            from: 120.0,
            to: 60.0,
            start: Instant::now() - StdDuration::from_secs(10),
            duration: StdDuration::from_secs(1),
        };
        assert!(t.is_done(Instant::now()));
        clock.apply_bpm_transition(Instant::now());
        // No transition queued yet above; queue one directly and re-check.
        *clock.bpm_transition.lock().unwrap() = Some(t);
        clock.apply_bpm_transition(Instant::now());
        assert_eq!(state.get(&ParamKey::Bpm).unwrap().as_f64(), Some(60.0));
    }
}
