//! Composition root (spec.md §5): wires clock, sequencer, fugue engine and
//! note scheduler onto a shared `State`, and owns the shutdown sequence.
//! Clock stop failing to join is fatal (the process must not exit with a
//! drifting tick thread still running); the other threads are
//! logged-and-abandoned on join failure so shutdown still completes.

use std::sync::Arc;
use std::time::Duration;

use genloop_core::{BpmRamp, IdleGate, IdleManager, ManualTriggerSink, MutationEngine, ScaleMapper, State};
use genloop_types::{
    idle::BUILTIN_PROFILE_NAMES, EngineConfig, MidiOutSink, MutationRule, ParamKey, ParamValue,
};

use crate::clock::HighResClock;
use crate::error::EngineError;
use crate::fugue::FugueEngine;
use crate::scheduler::NoteScheduler;
use crate::sequencer::Sequencer;

const PPQ: u32 = 24;
const TICK_CHANNEL_DEPTH: usize = 256;

fn rule_from_config(c: &genloop_types::MutationRuleConfig) -> MutationRule {
    MutationRule {
        parameter: c.parameter.clone(),
        weight: c.weight,
        delta_min: c.delta_range.0,
        delta_max: c.delta_range.1,
        delta_scale: c.delta_scale,
        description: c.description.clone(),
    }
}

/// Register a `Cc` spec for every CC key any built-in ambient profile
/// overrides, so the first idle entry actually changes the parameter
/// instead of silently no-oping against a spec that was never registered.
fn register_profile_cc_specs(state: &State) {
    for name in BUILTIN_PROFILE_NAMES {
        let Some(profile) = genloop_types::idle::builtin_profile(name) else {
            continue;
        };
        for (key, value) in profile.overrides {
            if let ParamKey::Cc(cc_name) = key {
                state.register_cc(&cc_name, value.as_i64().unwrap_or(64));
            }
        }
    }
}

fn apply_sequencer_defaults(state: &State, cfg: &EngineConfig) {
    let Some(seq) = &cfg.sequencer else { return };
    let mut pairs = Vec::new();
    if let Some(v) = seq.bpm {
        pairs.push((ParamKey::Bpm, ParamValue::Float(v)));
    }
    if let Some(v) = seq.swing {
        pairs.push((ParamKey::Swing, ParamValue::Float(v)));
    }
    if let Some(v) = seq.density {
        pairs.push((ParamKey::Density, ParamValue::Float(v)));
    }
    if let Some(v) = seq.sequence_length {
        pairs.push((ParamKey::SequenceLength, ParamValue::Int(v)));
    }
    if let Some(v) = seq.gate_length {
        pairs.push((ParamKey::GateLength, ParamValue::Float(v)));
    }
    if let Some(v) = seq.base_velocity {
        pairs.push((ParamKey::BaseVelocity, ParamValue::Int(v)));
    }
    if let Some(v) = seq.velocity_range {
        pairs.push((ParamKey::VelocityRange, ParamValue::Int(v)));
    }
    if let Some(v) = seq.note_probability {
        pairs.push((ParamKey::NoteProbability, ParamValue::Float(v)));
    }
    if let Some(v) = &seq.step_probabilities {
        pairs.push((ParamKey::StepProbabilities, ParamValue::Steps(v.clone())));
    }
    if let Some(v) = &seq.step_pattern {
        pairs.push((ParamKey::StepPattern, ParamValue::Gate(v.clone())));
    }
    if let Some(v) = &seq.direction_pattern {
        if let Some(d) = genloop_types::Direction::parse(v) {
            pairs.push((ParamKey::DirectionPattern, ParamValue::Direction(d)));
        }
    }
    if let Some(v) = seq.voices {
        pairs.push((ParamKey::Voices, ParamValue::Int(v)));
    }
    if let Some(v) = &seq.quantize_scale_changes {
        if let Some(q) = genloop_types::QuantizeMode::parse(v) {
            pairs.push((ParamKey::QuantizeScaleChanges, ParamValue::Quantize(q)));
        }
    }
    state.update_multiple(pairs, "config");
}

/// Owns every long-lived thread in the engine. Dropping it without calling
/// `shutdown` leaves the threads running; callers are expected to shut down
/// explicitly before exit.
pub struct Engine {
    pub state: Arc<State>,
    clock: Arc<HighResClock>,
    sequencer: Arc<Sequencer>,
    scheduler: Arc<NoteScheduler>,
    mutation: Arc<MutationEngine>,
    idle: Arc<IdleManager>,
}

impl Engine {
    pub fn build(
        cfg: &EngineConfig,
        sink: Arc<dyn MidiOutSink>,
        seed: u64,
    ) -> Result<Arc<Self>, EngineError> {
        let state = Arc::new(State::new());
        register_profile_cc_specs(&state);
        apply_sequencer_defaults(&state, cfg);

        let scale = Arc::new(ScaleMapper::with_names(&cfg.scales));
        let scheduler = NoteScheduler::new(sink);
        let fugue_cfg = cfg.fugue.clone();
        let use_tonal_answer = fugue_cfg.as_ref().and_then(|f| f.use_tonal_answer).unwrap_or(true);
        let voice_range = (
            fugue_cfg.as_ref().and_then(|f| f.voice_range_low).unwrap_or(36),
            fugue_cfg.as_ref().and_then(|f| f.voice_range_high).unwrap_or(96),
        );
        let fugue = FugueEngine::new(
            state.clone(),
            scale.clone(),
            scheduler.clone(),
            seed ^ 0xF0F0,
            use_tonal_answer,
            voice_range,
        );
        let sequencer = Sequencer::new(state.clone(), scale, scheduler.clone(), fugue, PPQ, seed);

        let (tick_tx, tick_rx) = crossbeam_channel::bounded(TICK_CHANNEL_DEPTH);
        let clock = HighResClock::new(state.clone(), PPQ, tick_tx);
        sequencer.start(tick_rx);

        let idle_cfg = cfg.idle.clone().unwrap_or(genloop_types::IdleConfig {
            timeout_ms: Some(120_000),
            ambient_profile: Some("slow_fade".into()),
            fade_in_ms: Some(4_000),
            fade_out_ms: Some(4_000),
        });
        let idle = IdleManager::new(
            state.clone(),
            idle_cfg.ambient_profile.as_deref().unwrap_or("slow_fade"),
            Duration::from_millis(idle_cfg.timeout_ms.unwrap_or(120_000)),
            Duration::from_millis(idle_cfg.fade_in_ms.unwrap_or(4_000)),
            Duration::from_millis(idle_cfg.fade_out_ms.unwrap_or(4_000)),
            Some(clock.clone() as Arc<dyn BpmRamp>),
        )
        .map_err(|e| EngineError::UnknownAmbientProfile(e.0))?;

        let mutation_cfg = cfg.mutation.clone();
        let rules: Vec<MutationRule> = mutation_cfg
            .as_ref()
            .map(|m| m.rules.iter().map(rule_from_config).collect())
            .unwrap_or_default();
        let interval_min = mutation_cfg.as_ref().and_then(|m| m.interval_min_s).unwrap_or(20.0);
        let interval_max = mutation_cfg.as_ref().and_then(|m| m.interval_max_s).unwrap_or(60.0);
        let max_changes = mutation_cfg
            .as_ref()
            .and_then(|m| m.max_changes_per_cycle)
            .unwrap_or(1);
        let mutation = MutationEngine::new(
            state.clone(),
            idle.clone() as Arc<dyn IdleGate>,
            rules,
            interval_min,
            interval_max,
            max_changes,
            seed ^ 0x0F0F,
        );

        Ok(Arc::new(Self {
            state,
            clock,
            sequencer,
            scheduler,
            mutation,
            idle,
        }))
    }

    pub fn start(&self) {
        self.scheduler.start();
        self.idle.start();
        self.mutation.start();
        self.clock.start();
    }

    pub fn manual_trigger(&self) -> Arc<dyn ManualTriggerSink> {
        self.sequencer.clone()
    }

    pub fn interaction_sink(&self) -> Arc<dyn genloop_core::InteractionSink> {
        self.idle.clone()
    }

    /// Stop every thread and drain any in-flight notes. The clock is
    /// stopped first so no further ticks feed the sequencer while the rest
    /// of the pipeline is torn down.
    pub fn shutdown(&self) {
        self.clock.stop();
        self.sequencer.stop();
        self.mutation.stop();
        self.idle.stop();
        self.scheduler.shutdown();
    }
}
