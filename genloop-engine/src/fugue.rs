//! Polyphonic contrapuntal generator (spec.md §4.4): builds a subject,
//! derives a tonal/real answer, stacks an exposition across up to four
//! voices with stretto overlap coupled to `density`, then keeps extending
//! every voice with transformed episode fragments until its five-minute
//! play window ends and it rests for ten seconds before regenerating.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use genloop_core::{ScaleMapper, State};
use genloop_types::fugue::{
    invert, retrograde, shift_time, slice_by_time, transpose, FugueNote, Phrase, TimedNote,
};
use genloop_types::{NoteEvent, ParamKey};

use crate::scheduler::NoteScheduler;

const PLAY_DURATION: Duration = Duration::from_secs(5 * 60);
const REST_DURATION: Duration = Duration::from_secs(10);
const SUBJECT_NOTES: usize = 12;
const REST_PROBABILITY: f64 = 0.30;
const SIXTEENTH_QUARTERS: f64 = 0.25;

/// Small per-voice transposition applied to episode material so overlapping
/// voices imitate each other at a different pitch level instead of unison.
const CANON_OFFSETS: [i32; 4] = [0, 4, 7, -5];
const EPISODE_CYCLES: usize = 3;
const INTER_FRAGMENT_REST_PROBABILITY: f64 = 0.25;
const PRE_CADENCE_REST_PROBABILITY: f64 = 0.30;
const MAX_LEAP_SEMITONES: i32 = 9;
const EPISODE_FRAGMENT_QUARTERS: f64 = 2.0;
const REST_QUARTERS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Playing,
    Resting,
}

pub struct FugueEngine {
    state: Arc<State>,
    scale: Arc<ScaleMapper>,
    scheduler: Arc<NoteScheduler>,
    rng: Mutex<ChaCha8Rng>,
    voices: Mutex<Vec<Vec<TimedNote>>>,
    position_quarters: Mutex<f64>,
    phase: Mutex<Phase>,
    phase_started_at: Mutex<Instant>,
    use_tonal_answer: bool,
    voice_range: (i64, i64),
}

impl FugueEngine {
    pub fn new(
        state: Arc<State>,
        scale: Arc<ScaleMapper>,
        scheduler: Arc<NoteScheduler>,
        seed: u64,
        use_tonal_answer: bool,
        voice_range: (i64, i64),
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            state,
            scale,
            scheduler,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            voices: Mutex::new(Vec::new()),
            position_quarters: Mutex::new(0.0),
            phase: Mutex::new(Phase::Playing),
            phase_started_at: Mutex::new(Instant::now()),
            use_tonal_answer,
            voice_range,
        });
        engine.regenerate();
        engine
    }

    /// How many of the exposition's voice slots are active right now.
    fn voice_count(&self) -> usize {
        self.state
            .get(&ParamKey::Voices)
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
            .clamp(1, 4) as usize
    }

    fn stretto_overlap(&self) -> f64 {
        let density = self
            .state
            .get(&ParamKey::Density)
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        (density - 0.3).clamp(0.0, 0.8)
    }

    fn root_and_scale(&self) -> (i64, i64) {
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
        (root, scale_index)
    }

    /// Bach-style contour: each step is a rest or a small stepwise move,
    /// rendered straight to MIDI pitch against the live scale/root.
    fn generate_subject(&self) -> Phrase {
        let (root, scale_index) = self.root_and_scale();
        let mut rng = self.rng.lock().unwrap();
        let mut degree: i32 = 0;
        let mut phrase = Vec::with_capacity(SUBJECT_NOTES);
        let durations = [0.5, 0.5, 1.0, 1.5];
        for _ in 0..SUBJECT_NOTES {
            let duration = durations[rng.gen_range(0..4)];
            if rng.gen_bool(REST_PROBABILITY) {
                phrase.push(FugueNote::rest(duration));
                continue;
            }
            let step = rng.gen_range(-2i32..=2);
            degree += step;
            degree = degree.clamp(-7, 7);
            let pitch = self.scale.pitch(scale_index, root, degree, 0) as i32;
            let velocity = 70 + rng.gen_range(0..30);
            phrase.push(FugueNote::note(pitch, duration, velocity as u8));
        }
        phrase
    }

    /// Real answer: subject transposed up a fifth.
    fn real_answer(subject: &[FugueNote]) -> Phrase {
        transpose(subject, 7)
    }

    /// Tonal answer: like the real answer, but the opening tonic-to-dominant
    /// leap (`+7`) is corrected down to a dominant-to-tonic-feeling `+5` so
    /// the entry doesn't overshoot into the dominant key.
    fn tonal_answer(subject: &[FugueNote]) -> Phrase {
        let mut answer = transpose(subject, 7);
        if let Some(first) = answer.iter_mut().find(|n| !n.is_rest()) {
            if let Some(p) = first.pitch {
                first.pitch = Some(p - 2);
            }
        }
        answer
    }

    /// Slice a roughly 2-quarter fragment out of `subject`, rotating through
    /// non-overlapping windows as `index` increases so successive episodes
    /// draw from different parts of the subject.
    fn episode_fragment(subject: &[FugueNote], index: usize) -> Phrase {
        let total = genloop_types::fugue::total_duration(subject);
        if total <= 0.0 {
            return Vec::new();
        }
        let frag_len = EPISODE_FRAGMENT_QUARTERS.min(total);
        let windows = ((total / frag_len).floor() as usize).max(1);
        let start = (index % windows) as f64 * frag_len;
        slice_by_time(subject, start, (start + frag_len).min(total))
    }

    /// Candidate transforms of `fragment` for one episode, each carrying
    /// `canon_offset` so a voice's episodes sit at a consistent imitative
    /// interval from the subject.
    fn episode_candidates(&self, fragment: &[FugueNote], canon_offset: i32) -> Vec<Phrase> {
        if fragment.is_empty() {
            return Vec::new();
        }
        let free_transpose = self.rng.lock().unwrap().gen_range(-5..=5);
        vec![
            transpose(&retrograde(fragment), canon_offset),
            transpose(&invert(fragment, 60), canon_offset),
            transpose(fragment, canon_offset + free_transpose),
        ]
    }

    /// Greedy local pass: pick whichever candidate scores best against the
    /// reference voice's material sounding around `window_start`, falling
    /// back to the first candidate when there's no other voice to judge
    /// against yet.
    fn best_episode_candidate(
        candidates: Vec<Phrase>,
        reference: Option<&[TimedNote]>,
        window_start: f64,
    ) -> Phrase {
        let Some(reference) = reference else {
            return candidates.into_iter().next().unwrap_or_default();
        };
        let against: Vec<FugueNote> = reference
            .iter()
            .filter(|t| t.start_quarters >= window_start)
            .map(|t| t.note)
            .collect();
        candidates
            .into_iter()
            .max_by(|a, b| {
                Self::counterpoint_score(a, &against)
                    .partial_cmp(&Self::counterpoint_score(b, &against))
                    .unwrap()
            })
            .unwrap_or_default()
    }

    /// Dominant-to-tonic cadence, used to close an episode before the next
    /// one begins (or before a voice's next subject/answer re-entry).
    fn build_cadence(&self) -> Phrase {
        let (root, scale_index) = self.root_and_scale();
        let dominant = self.scale.pitch(scale_index, root, 4, 0) as i32;
        let tonic = self.scale.pitch(scale_index, root, 0, 1) as i32;
        vec![
            FugueNote::note(dominant, 1.0, 85),
            FugueNote::note(tonic, 2.0, 90),
        ]
    }

    fn find_nearby_note(voice: &[TimedNote], time: f64) -> Option<&TimedNote> {
        voice
            .iter()
            .filter(|t| !t.note.is_rest())
            .min_by(|a, b| {
                (a.start_quarters - time)
                    .abs()
                    .partial_cmp(&(b.start_quarters - time).abs())
                    .unwrap()
            })
    }

    /// Octave-shift every pitch into `[low, high]`.
    fn clamp_into_range(phrase: &mut [FugueNote], low: i32, high: i32) {
        for n in phrase.iter_mut() {
            let Some(mut p) = n.pitch else { continue };
            while p < low {
                p += 12;
            }
            while p > high {
                p -= 12;
            }
            n.pitch = Some(p);
        }
    }

    /// Fold any leap over `max_leap` semitones back by octaves so
    /// consecutive notes never jump further than that.
    fn enforce_max_leap(phrase: &mut [FugueNote], max_leap: i32) {
        let mut prev: Option<i32> = None;
        for n in phrase.iter_mut() {
            let Some(p) = n.pitch else { continue };
            let adjusted = match prev {
                Some(prev_p) => {
                    let mut candidate = p;
                    while (candidate - prev_p).abs() > max_leap {
                        candidate += if candidate > prev_p { -12 } else { 12 };
                    }
                    candidate
                }
                None => p,
            };
            n.pitch = Some(adjusted);
            prev = Some(adjusted);
        }
    }

    /// Octave-shift the fragment's opening pitch away from `reference_pitch`
    /// if it would otherwise land in exact unison with it.
    fn avoid_unison(phrase: &mut [FugueNote], reference_pitch: Option<i32>) {
        let Some(reference_pitch) = reference_pitch else {
            return;
        };
        if let Some(first) = phrase.iter_mut().find(|n| !n.is_rest()) {
            if first.pitch == Some(reference_pitch) {
                first.pitch = Some(reference_pitch + 12);
            }
        }
    }

    /// Soft-constraint counterpoint score in `[0.0, 1.0]`: rewards contrary
    /// motion between two simultaneous voices and penalizes parallel
    /// fifths/octaves, the two textbook things to avoid in species
    /// counterpoint.
    pub fn counterpoint_score(a: &[FugueNote], b: &[FugueNote]) -> f64 {
        let len = a.len().min(b.len());
        if len < 2 {
            return 1.0;
        }
        let mut total = 0.0;
        let mut scored = 0usize;
        for i in 1..len {
            let (Some(pa0), Some(pa1), Some(pb0), Some(pb1)) =
                (a[i - 1].pitch, a[i].pitch, b[i - 1].pitch, b[i].pitch)
            else {
                continue;
            };
            scored += 1;
            let move_a = pa1 - pa0;
            let move_b = pb1 - pb0;
            let interval = (pa1 - pb1).rem_euclid(12);
            let parallel_perfect = (interval == 0 || interval == 7)
                && move_a.signum() == move_b.signum()
                && move_a != 0;
            let contrary = move_a.signum() != move_b.signum() && move_a != 0 && move_b != 0;
            let step_score = if parallel_perfect {
                0.0
            } else if contrary {
                1.0
            } else {
                0.6
            };
            total += step_score;
        }
        if scored == 0 {
            1.0
        } else {
            total / scored as f64
        }
    }

    /// Build the exposition (subject/answer staggered across voices) then
    /// keep extending each voice with episode/cadence pairs: a transformed
    /// fragment scored against the first voice's material by
    /// `counterpoint_score`, a hard-constrained pass (voice range, leap,
    /// unison), and a dominant-tonic cadence to prepare the next re-entry.
    /// Rests are occasionally inserted before a fragment and before a
    /// cadence so the texture breathes instead of running wall to wall.
    fn regenerate(&self) {
        let subject = self.generate_subject();
        let subject_duration = genloop_types::fugue::total_duration(&subject).max(SIXTEENTH_QUARTERS);
        let answer = if self.use_tonal_answer {
            Self::tonal_answer(&subject)
        } else {
            Self::real_answer(&subject)
        };
        let overlap = self.stretto_overlap();
        let entry_gap = subject_duration * (1.0 - overlap).max(0.05);
        let (range_low, range_high) = (self.voice_range.0 as i32, self.voice_range.1 as i32);

        let count = self.voice_count();
        let mut voices: Vec<Vec<TimedNote>> = Vec::with_capacity(count);
        for v in 0..count {
            let offset = entry_gap * v as f64;
            let mut entry_phrase = if v % 2 == 0 { subject.clone() } else { answer.clone() };
            Self::clamp_into_range(&mut entry_phrase, range_low, range_high);
            let mut timeline = shift_time(&entry_phrase, offset);
            let mut cursor = offset + subject_duration;
            let canon_offset = CANON_OFFSETS[v % CANON_OFFSETS.len()];
            let reference: Option<Vec<TimedNote>> = if v > 0 { Some(voices[0].clone()) } else { None };

            for cycle in 0..EPISODE_CYCLES {
                let want_inter_fragment_rest = self
                    .rng
                    .lock()
                    .unwrap()
                    .gen_bool(INTER_FRAGMENT_REST_PROBABILITY);
                if want_inter_fragment_rest {
                    timeline.push(TimedNote {
                        note: FugueNote::rest(REST_QUARTERS),
                        start_quarters: cursor,
                    });
                    cursor += REST_QUARTERS;
                }

                let fragment = Self::episode_fragment(&subject, cycle + v);
                if fragment.is_empty() {
                    continue;
                }
                let candidates = self.episode_candidates(&fragment, canon_offset);
                let mut episode = Self::best_episode_candidate(candidates, reference.as_deref(), cursor);
                Self::enforce_max_leap(&mut episode, MAX_LEAP_SEMITONES);
                let reference_pitch = reference
                    .as_deref()
                    .and_then(|r| Self::find_nearby_note(r, cursor))
                    .and_then(|t| t.note.pitch);
                Self::avoid_unison(&mut episode, reference_pitch);
                Self::clamp_into_range(&mut episode, range_low, range_high);

                let episode_timed = shift_time(&episode, cursor);
                cursor += genloop_types::fugue::total_duration(&episode);
                timeline.extend(episode_timed);

                let want_pre_cadence_rest = self
                    .rng
                    .lock()
                    .unwrap()
                    .gen_bool(PRE_CADENCE_REST_PROBABILITY);
                if want_pre_cadence_rest {
                    timeline.push(TimedNote {
                        note: FugueNote::rest(REST_QUARTERS),
                        start_quarters: cursor,
                    });
                    cursor += REST_QUARTERS;
                }

                let mut cadence = self.build_cadence();
                Self::clamp_into_range(&mut cadence, range_low, range_high);
                let cadence_timed = shift_time(&cadence, cursor);
                cursor += genloop_types::fugue::total_duration(&cadence);
                timeline.extend(cadence_timed);
            }
            voices.push(timeline);
        }
        *self.voices.lock().unwrap() = voices;
        *self.position_quarters.lock().unwrap() = 0.0;
    }

    /// Called once per 16th-note tick while `direction_pattern == fugue`.
    pub fn on_step_tick(&self, at: Instant) {
        let mut started = self.phase_started_at.lock().unwrap();
        let mut phase = self.phase.lock().unwrap();
        let elapsed = at.saturating_duration_since(*started);
        match *phase {
            Phase::Playing if elapsed >= PLAY_DURATION => {
                *phase = Phase::Resting;
                *started = at;
                return;
            }
            Phase::Resting if elapsed >= REST_DURATION => {
                *phase = Phase::Playing;
                *started = at;
                drop(phase);
                drop(started);
                self.regenerate();
                return;
            }
            Phase::Resting => return,
            Phase::Playing => {}
        }
        drop(phase);
        drop(started);

        let bpm = self
            .state
            .get(&ParamKey::Bpm)
            .and_then(|v| v.as_f64())
            .unwrap_or(120.0)
            .max(1.0);
        let seconds_per_quarter = 60.0 / bpm;

        let mut position = self.position_quarters.lock().unwrap();
        let window_start = *position;
        let window_end = window_start + SIXTEENTH_QUARTERS;
        *position = window_end;
        let voices = self.voices.lock().unwrap();
        let mut needs_regen = false;
        for (voice_index, timeline) in voices.iter().enumerate() {
            let mut found_any = false;
            for timed in timeline {
                if timed.start_quarters >= window_start && timed.start_quarters < window_end {
                    found_any = true;
                    if timed.note.is_rest() {
                        continue;
                    }
                    let Some(pitch) = timed.note.pitch else { continue };
                    let event = NoteEvent::note_on(
                        pitch.clamp(0, 127) as u8,
                        timed.note.velocity,
                        timed.note.duration_quarters * seconds_per_quarter,
                        window_start.floor() as i32,
                        voice_index as u32,
                        1,
                    );
                    self.scheduler.schedule(&event);
                }
            }
            if !found_any && timeline.iter().all(|t| t.start_quarters < window_end) {
                needs_regen = true;
            }
        }
        drop(voices);
        if needs_regen {
            drop(position);
            self.regenerate();
        }
    }
}
