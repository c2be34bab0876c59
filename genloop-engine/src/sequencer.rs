//! Step advancement and gating (spec.md §4.3). Consumes the clock's tick
//! stream, advances the active step on every 16th-note boundary according
//! to `direction_pattern`, and runs the pattern→probability→density gate
//! chain before emitting a `NoteEvent` (or an explicit rest) to the
//! scheduler. `direction_pattern == fugue` hands the tick off to
//! `FugueEngine` instead of the normal single-voice step logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use genloop_core::{ManualTriggerSink, ScaleMapper, State};
use genloop_types::{Direction, NoteEvent, ParamKey};

use crate::clock::Tick;
use crate::fugue::FugueEngine;
use crate::scheduler::NoteScheduler;

/// Advance `current` by one step under `direction`. `ping_pong_dir` is the
/// bounce direction's running sign (`+1`/`-1`), threaded through so the
/// reflection rule doesn't double-count the endpoints.
fn next_forward(current: i64, len: i64) -> i64 {
    (current + 1).rem_euclid(len)
}

fn next_backward(current: i64, len: i64) -> i64 {
    (current - 1).rem_euclid(len)
}

fn next_ping_pong(current: i64, len: i64, dir: i64) -> (i64, i64) {
    if len <= 1 {
        return (0, 1);
    }
    let mut d = dir;
    let mut next = current + d;
    if next > len - 1 {
        d = -1;
        next = current + d;
    } else if next < 0 {
        d = 1;
        next = current + d;
    }
    (next, d)
}

fn next_random(rng: &mut impl Rng, len: i64, last: Option<i64>) -> i64 {
    if len <= 1 {
        return 0;
    }
    loop {
        let candidate = rng.gen_range(0..len);
        if Some(candidate) != last {
            return candidate;
        }
    }
}

fn step_probability(probabilities: &[f64], note_probability: f64, step: usize) -> f64 {
    probabilities.get(step).copied().unwrap_or(note_probability)
}

/// `pattern -> probability -> density`: the pattern gate is checked first
/// and short-circuits (no RNG draw) when closed, so a muted step never
/// consumes entropy. `prob` is the per-step probability already resolved by
/// `step_probability`, shared with velocity rendering so both read the same
/// value.
fn gate_open(rng: &mut impl Rng, pattern: &[bool], prob: f64, density: f64, step: usize) -> bool {
    let pattern_ok = pattern.get(step).copied().unwrap_or(true);
    if !pattern_ok {
        return false;
    }
    if rng.gen::<f64>() >= prob {
        return false;
    }
    rng.gen::<f64>() < density
}

struct SequencerState {
    steps_taken: u64,
    last_random_step: Option<i64>,
    ping_pong_dir: i64,
}

pub struct Sequencer {
    state: Arc<State>,
    scale: Arc<ScaleMapper>,
    scheduler: Arc<NoteScheduler>,
    fugue: Arc<FugueEngine>,
    rng: Mutex<ChaCha8Rng>,
    seq: Mutex<SequencerState>,
    ticks_since_step: Mutex<u64>,
    ppq: u32,
    running: AtomicBool,
    stop_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sequencer {
    pub fn new(
        state: Arc<State>,
        scale: Arc<ScaleMapper>,
        scheduler: Arc<NoteScheduler>,
        fugue: Arc<FugueEngine>,
        ppq: u32,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            state,
            scale,
            scheduler,
            fugue,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            seq: Mutex::new(SequencerState {
                steps_taken: 0,
                last_random_step: None,
                ping_pong_dir: 1,
            }),
            ticks_since_step: Mutex::new(0),
            ppq: ppq.max(4),
            running: AtomicBool::new(false),
            stop_tx: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn start(self: &Arc<Self>, tick_rx: crossbeam_channel::Receiver<Tick>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        *self.stop_tx.lock().unwrap() = Some(stop_tx);
        let seq = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name("genloop-sequencer".into())
            .spawn(move || seq.run(tick_rx, stop_rx))
            .expect("failed to spawn genloop-sequencer thread");
        *self.handle.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.stop_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.lock().unwrap().take() {
            if let Err(e) = handle.join() {
                log::error!(target: "genloop_engine::sequencer", "sequencer thread join failed: {e:?}");
            }
        }
    }

    fn run(
        &self,
        tick_rx: crossbeam_channel::Receiver<Tick>,
        stop_rx: crossbeam_channel::Receiver<()>,
    ) {
        loop {
            crossbeam_channel::select! {
                recv(stop_rx) -> _ => break,
                recv(tick_rx) -> msg => match msg {
                    Ok(tick) => self.on_tick(tick),
                    Err(_) => break,
                },
            }
        }
    }

    fn sixteenth_ticks(&self) -> u64 {
        (self.ppq / 4).max(1) as u64
    }

    fn on_tick(&self, tick: Tick) {
        let mut since = self.ticks_since_step.lock().unwrap();
        *since += 1;
        if *since < self.sixteenth_ticks() {
            return;
        }
        *since = 0;
        drop(since);
        self.advance_step(tick.at);
    }

    fn sequence_length(&self) -> i64 {
        self.state
            .get(&ParamKey::SequenceLength)
            .and_then(|v| v.as_i64())
            .unwrap_or(8)
            .max(1)
    }

    fn promote_pending_scale_if_bar_boundary(&self, steps_taken: u64) {
        let len = self.sequence_length() as u64;
        if len == 0 || steps_taken % len != 0 {
            return;
        }
        let pending = self
            .state
            .get(&ParamKey::PendingScaleIndex)
            .and_then(|v| v.as_i64())
            .unwrap_or(-1);
        if pending >= 0 {
            self.state
                .set(ParamKey::ScaleIndex, genloop_types::ParamValue::Int(pending), "bar_boundary");
            self.state.set(
                ParamKey::PendingScaleIndex,
                genloop_types::ParamValue::Int(-1),
                "bar_boundary",
            );
        }
    }

    fn advance_step(&self, at: Instant) {
        let direction = self
            .state
            .get(&ParamKey::DirectionPattern)
            .and_then(|v| v.as_direction())
            .unwrap_or(Direction::Forward);

        if direction == Direction::Fugue {
            let mut s = self.seq.lock().unwrap();
            s.steps_taken += 1;
            let steps_taken = s.steps_taken;
            drop(s);
            self.promote_pending_scale_if_bar_boundary(steps_taken);
            self.fugue.on_step_tick(at);
            return;
        }

        let len = self.sequence_length();
        let current = self
            .state
            .get(&ParamKey::StepPosition)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let next = {
            let mut s = self.seq.lock().unwrap();
            let mut rng = self.rng.lock().unwrap();
            let next = match direction {
                Direction::Forward => next_forward(current, len),
                Direction::Backward => next_backward(current, len),
                Direction::PingPong => {
                    let (n, d) = next_ping_pong(current, len, s.ping_pong_dir);
                    s.ping_pong_dir = d;
                    n
                }
                Direction::Random => next_random(&mut *rng, len, s.last_random_step),
                Direction::Fugue => unreachable!(),
            };
            s.last_random_step = Some(next);
            s.steps_taken += 1;
            next
        };

        self.state
            .set(ParamKey::StepPosition, genloop_types::ParamValue::Int(next), "sequencer");

        let steps_taken = self.seq.lock().unwrap().steps_taken;
        self.promote_pending_scale_if_bar_boundary(steps_taken);

        self.emit_for_step(next, at);
    }

    fn emit_for_step(&self, step: i64, _at: Instant) {
        let pattern = self
            .state
            .get(&ParamKey::StepPattern)
            .and_then(|v| v.as_gate().map(|g| g.to_vec()))
            .unwrap_or_default();
        let probabilities = self
            .state
            .get(&ParamKey::StepProbabilities)
            .and_then(|v| v.as_steps().map(|s| s.to_vec()))
            .unwrap_or_default();
        let note_probability = self
            .state
            .get(&ParamKey::NoteProbability)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        let density = self
            .state
            .get(&ParamKey::Density)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);

        let prob = step_probability(&probabilities, note_probability, step as usize);

        let open = {
            let mut rng = self.rng.lock().unwrap();
            gate_open(&mut *rng, &pattern, prob, density, step as usize)
        };

        if !open {
            self.scheduler.schedule(&NoteEvent::rest(step as i32, 0));
            return;
        }

        let event = self.render_note(step, prob);
        self.scheduler.schedule(&event);
    }

    fn render_note(&self, step: i64, p: f64) -> NoteEvent {
        let root = self
            .state
            .get(&ParamKey::RootNote)
            .and_then(|v| v.as_i64())
            .unwrap_or(60);
        let scale_index = self
            .state
            .get(&ParamKey::ScaleIndex)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let base_velocity = self
            .state
            .get(&ParamKey::BaseVelocity)
            .and_then(|v| v.as_i64())
            .unwrap_or(80);
        let velocity_range = self
            .state
            .get(&ParamKey::VelocityRange)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let gate_length = self
            .state
            .get(&ParamKey::GateLength)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5);
        let bpm = self
            .state
            .get(&ParamKey::Bpm)
            .and_then(|v| v.as_f64())
            .unwrap_or(120.0)
            .max(1.0);

        let pitch = self.scale.pitch(scale_index, root, step as i32, 0);
        let velocity = {
            let mut rng = self.rng.lock().unwrap();
            let spread = ((p - 0.5) * velocity_range as f64).round() as i64;
            let jitter = rng.gen_range(-2..=2);
            (base_velocity + spread + jitter).clamp(1, 127) as u8
        };
        let sixteenth_seconds = 60.0 / bpm / 4.0;
        let duration_seconds = gate_length * sixteenth_seconds;

        NoteEvent::note_on(pitch, velocity, duration_seconds, step as i32, 0, 1)
    }
}

impl ManualTriggerSink for Sequencer {
    /// Fires a note for the current step immediately, bypassing the gate
    /// chain entirely — a manual trigger always sounds.
    fn trigger(&self, velocity_hint: u8) {
        let step = self
            .state
            .get(&ParamKey::StepPosition)
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let mut event = self.render_note(step, 0.5);
        if velocity_hint > 0 {
            event.velocity = velocity_hint.clamp(1, 127);
        }
        self.scheduler.schedule(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_matches_documented_reflection_sequence() {
        let mut current = 1i64;
        let mut dir = 1i64;
        let mut trace = vec![current];
        for _ in 0..7 {
            let (next, d) = next_ping_pong(current, 4, dir);
            current = next;
            dir = d;
            trace.push(current);
        }
        assert_eq!(trace, vec![1, 2, 3, 2, 1, 0, 1, 2]);
    }

    #[test]
    fn random_never_immediately_repeats_when_len_over_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut last = Some(3);
        for _ in 0..200 {
            let next = next_random(&mut rng, 5, last);
            assert_ne!(Some(next), last);
            last = Some(next);
        }
    }

    #[test]
    fn random_repeats_are_unavoidable_at_length_one() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        assert_eq!(next_random(&mut rng, 1, Some(0)), 0);
    }

    #[test]
    fn gate_chain_short_circuits_on_closed_pattern() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let pattern = vec![false];
        let open = gate_open(&mut rng, &pattern, 1.0, 1.0, 0);
        assert!(!open);
    }

    #[test]
    fn gate_chain_opens_when_every_stage_passes() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let pattern = vec![true];
        let open = gate_open(&mut rng, &pattern, 1.0, 1.0, 0);
        assert!(open);
    }

    #[test]
    fn step_probability_falls_back_to_note_probability() {
        assert_eq!(step_probability(&[], 0.7, 0), 0.7);
        assert_eq!(step_probability(&[0.2, 0.4], 0.7, 1), 0.4);
    }

    #[test]
    fn forward_and_backward_wrap_correctly() {
        assert_eq!(next_forward(3, 4), 0);
        assert_eq!(next_backward(0, 4), 3);
    }
}
