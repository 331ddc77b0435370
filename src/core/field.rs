use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashSet;
use tracing::{debug, info, trace};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::FieldConfig;
use crate::detector::{Detector, DetectorKind};
use crate::energy::EnergyBudget;
use crate::error::{validate_token, FieldError, Result};
use crate::memory::ShortTermMemory;
use crate::plasticity::{LearnContext, Plasticity};
use crate::pruning::{self, CleanupRecord};
use crate::registry::Registry;
use crate::report::{ArmedExpectation, EpisodeReport, FieldEvent, TickReport};
use crate::signal::{Origin, Signal, SignalKind, Tick};
use crate::transitions::TransitionModel;

const TIE_EPS: f32 = 1e-6;

/// Learning switches. Turning learning off freezes the field for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Modes {
    pub learning_enabled: bool,
    pub learn_structure: bool,
    pub learn_prediction: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self::train()
    }
}

impl Modes {
    pub fn train() -> Self {
        Self {
            learning_enabled: true,
            learn_structure: true,
            learn_prediction: true,
        }
    }

    /// Inference only.
    pub fn test() -> Self {
        Self {
            learning_enabled: false,
            learn_structure: false,
            learn_prediction: false,
        }
    }

    /// Keep the structures learned so far, refine predictions only.
    pub fn predict_only() -> Self {
        Self {
            learning_enabled: true,
            learn_structure: false,
            learn_prediction: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiagnostics {
    pub tick: Tick,
    pub sensors: usize,
    pub pairs: usize,
    pub sequences: usize,
    pub compositions: usize,
    pub actions: usize,
    pub predictions: usize,
    pub energy: f32,
    pub energy_spent_episode: f32,
    pub inhibited: usize,
    pub last_cleanup: Option<CleanupRecord>,
}

/// A self-organizing field of detectors over a token stream.
///
/// One token per tick. Each tick broadcasts the token through the detector
/// registry for a bounded number of propagation rounds, lets the structures
/// that fired compete, arms the winner's prediction for the next tick, and
/// (when learning) grows new detectors and refines the transition model.
pub struct Field {
    cfg: FieldConfig,
    modes: Modes,

    memory: ShortTermMemory,
    registry: Registry,
    plasticity: Plasticity,
    model: TransitionModel,
    energy: EnergyBudget,

    // Per-structure suppression, decays multiplicatively each tick.
    inhibition: BTreeMap<String, f32>,
    error_cooldown: BTreeMap<String, u32>,
    // Ticks left in the post-error plasticity boost window.
    error_ttl: u32,

    // Next-tick expectation, winner only: structure -> token.
    pending: BTreeMap<String, String>,
    last_armed: Vec<ArmedExpectation>,

    this_structures: BTreeSet<String>,
    prev_structures: BTreeSet<String>,
    structure_mass: BTreeMap<String, f32>,

    // (kind, value, origin) already charged for this tick.
    costed: HashSet<(SignalKind, String, Origin)>,
    actions_this_tick: usize,

    last_cleanup: Option<CleanupRecord>,
    events: Vec<FieldEvent>,
}

impl Default for Field {
    fn default() -> Self {
        Self::build(FieldConfig::default())
    }
}

impl Field {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(cfg: FieldConfig) -> Result<Self> {
        cfg.validate().map_err(FieldError::InvalidConfig)?;
        Ok(Self::build(cfg))
    }

    fn build(cfg: FieldConfig) -> Self {
        Self {
            energy: EnergyBudget::new(cfg.energy_max, cfg.energy_regen),
            cfg,
            modes: Modes::default(),
            memory: ShortTermMemory::new(),
            registry: Registry::new(),
            plasticity: Plasticity::new(),
            model: TransitionModel::new(),
            inhibition: BTreeMap::new(),
            error_cooldown: BTreeMap::new(),
            error_ttl: 0,
            pending: BTreeMap::new(),
            last_armed: Vec::new(),
            this_structures: BTreeSet::new(),
            prev_structures: BTreeSet::new(),
            structure_mass: BTreeMap::new(),
            costed: HashSet::new(),
            actions_this_tick: 0,
            last_cleanup: None,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &FieldConfig {
        &self.cfg
    }

    pub fn modes(&self) -> Modes {
        self.modes
    }

    pub fn set_modes(&mut self, modes: Modes) {
        self.modes = modes;
    }

    pub fn tick(&self) -> Tick {
        self.memory.tick()
    }

    pub fn memory(&self) -> &ShortTermMemory {
        &self.memory
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn model(&self) -> &TransitionModel {
        &self.model
    }

    pub fn plasticity(&self) -> &Plasticity {
        &self.plasticity
    }

    pub fn energy(&self) -> &EnergyBudget {
        &self.energy
    }

    pub fn inhibition(&self, structure: &str) -> f32 {
        self.inhibition.get(structure).copied().unwrap_or(0.0)
    }

    pub fn inhibitions(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.inhibition.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Expectations armed for the next tick (structure, token).
    pub fn pending_expectations(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.pending.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Expectations that were armed when the last tick began.
    pub fn last_armed(&self) -> &[ArmedExpectation] {
        &self.last_armed
    }

    pub fn error_boost_remaining(&self) -> u32 {
        self.error_ttl
    }

    /// Events raised during the last tick.
    pub fn last_events(&self) -> &[FieldEvent] {
        &self.events
    }

    pub fn last_cleanup(&self) -> Option<CleanupRecord> {
        self.last_cleanup
    }

    pub fn diagnostics(&self) -> FieldDiagnostics {
        FieldDiagnostics {
            tick: self.tick(),
            sensors: self.registry.count(DetectorKind::Sensor),
            pairs: self.registry.count(DetectorKind::Pair),
            sequences: self.registry.count(DetectorKind::Sequence),
            compositions: self.registry.count(DetectorKind::Composition),
            actions: self.registry.count(DetectorKind::Action),
            predictions: self.model.stats().predictions,
            energy: self.energy.level(),
            energy_spent_episode: self.energy.spent_episode(),
            inhibited: self.inhibition.len(),
            last_cleanup: self.last_cleanup,
        }
    }

    /// Validate and process one token.
    pub fn consume(&mut self, token: &str) -> Result<TickReport> {
        validate_token(token)?;
        let signals = self.step(token);
        Ok(TickReport {
            tick: self.tick(),
            token: token.to_string(),
            armed: self.last_armed.clone(),
            signals,
            events: self.events.clone(),
        })
    }

    /// Run one isolated episode: reset the boundary, then consume every token.
    /// All tokens are validated before any of them touches the field.
    pub fn run_episode<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<EpisodeReport> {
        for token in tokens {
            validate_token(token.as_ref())?;
        }
        self.reset_episode();

        let mut report = EpisodeReport::default();
        for token in tokens {
            report.push(self.consume(token.as_ref())?);
        }
        info!(
            ticks = tokens.len(),
            structures = report.structures_fired.len(),
            actions = report.actions_fired.len(),
            errors = report.errors.len(),
            "episode done"
        );
        Ok(report)
    }

    /// Clear episode-local state. Learned detectors, transition weights,
    /// published predictions and crystallization marks are kept.
    pub fn reset_episode(&mut self) {
        self.memory.clear();
        self.this_structures.clear();
        self.prev_structures.clear();
        self.pending.clear();
        self.structure_mass.clear();
        self.inhibition.clear();
        self.error_cooldown.clear();
        self.error_ttl = 0;
        self.energy.reset_episode();
        self.plasticity.clear_pending();
        debug!(tick = self.tick(), "episode boundary");
    }

    /// Advance the field by one tick on `token` and return every signal that
    /// survived shaping, in processing order.
    pub fn step(&mut self, token: &str) -> Vec<Signal> {
        self.events.clear();
        self.last_armed = self
            .pending
            .iter()
            .map(|(st, tok)| ArmedExpectation {
                structure: st.clone(),
                token: tok.clone(),
                confidence: self.model.confidence(st),
            })
            .collect();

        let tick = self.begin_tick();
        self.ensure_sensor(token, tick);

        let errors = self.check_expectations(token, tick);
        self.memory.observe_token(token);

        let mut queue = vec![Signal::sensory(token, tick)];
        queue.extend(errors);
        queue.extend(self.registry.decay_all(&self.memory));
        queue.extend(self.weak_predictions(tick));

        let out = self.propagate(queue, tick);
        let winner = self.compete();

        if let Some(winner) = &winner {
            if !self.energy.try_spend(self.cfg.winner_cost) {
                *self.inhibition.entry(winner.clone()).or_insert(0.0) +=
                    self.cfg.winner_starved_inhibition;
            }
        }

        if self.modes.learning_enabled {
            self.learn(tick);
        }

        self.arm(winner.as_deref());
        self.prev_structures = self.this_structures.clone();

        if pruning::is_due(&self.cfg, tick) {
            self.prune(tick);
        }
        out
    }

    fn begin_tick(&mut self) -> Tick {
        self.actions_this_tick = 0;
        self.costed.clear();

        let tick = self.memory.advance(self.cfg.recent_window);
        self.energy.regenerate();

        let keep = 1.0 - self.cfg.inhibition_decay;
        let floor = self.cfg.inhibition_floor;
        self.inhibition.retain(|_, v| {
            *v *= keep;
            *v >= floor
        });
        self.error_cooldown.retain(|_, left| {
            if *left <= 1 {
                return false;
            }
            *left -= 1;
            true
        });
        self.error_ttl = self.error_ttl.saturating_sub(1);

        self.this_structures.clear();
        self.structure_mass.clear();
        tick
    }

    fn ensure_sensor(&mut self, token: &str, tick: Tick) {
        if self.registry.insert(Detector::sensor(token), tick) {
            debug!(tick, token, "sensor registered");
            self.events.push(FieldEvent::SensorRegistered {
                token: token.to_string(),
            });
        }
    }

    /// Compare the armed expectations with the token that actually arrived.
    fn check_expectations(&mut self, actual: &str, tick: Tick) -> Vec<Signal> {
        let mut out = Vec::new();
        let pending = std::mem::take(&mut self.pending);
        for (structure, expected) in &pending {
            if expected == actual || self.error_cooldown.contains_key(structure) {
                continue;
            }

            self.error_cooldown
                .insert(structure.clone(), self.cfg.error_cooldown_ticks);
            self.error_ttl = self.cfg.error_boost_ticks;
            *self.inhibition.entry(structure.clone()).or_insert(0.0) += self.cfg.error_inhibition;

            out.push(Signal::new(
                SignalKind::Error,
                format!("{structure}:{expected}->{actual}"),
                1.0,
                tick,
                Origin::Field,
            ));

            if self.modes.learning_enabled && self.modes.learn_prediction {
                self.model.correct(structure, expected, actual, &self.cfg);
            }

            debug!(tick, %structure, %expected, %actual, "misprediction");
            self.events.push(FieldEvent::Mispredicted {
                structure: structure.clone(),
                expected: expected.clone(),
                actual: actual.to_string(),
            });
        }
        self.pending = pending;
        out
    }

    /// Low-magnitude pulses for every confident published prediction.
    fn weak_predictions(&self, tick: Tick) -> Vec<Signal> {
        self.model
            .predictions()
            .filter(|(_, _, conf)| *conf >= self.cfg.weak_pulse_min_confidence)
            .map(|(st, tok, conf)| {
                Signal::new(
                    SignalKind::Prediction,
                    format!("{st}->{tok}"),
                    self.cfg.weak_pulse_scale * conf,
                    tick,
                    Origin::Field,
                )
            })
            .filter(|s| s.magnitude > self.cfg.weak_pulse_floor)
            .collect()
    }

    fn propagate(&mut self, mut queue: Vec<Signal>, tick: Tick) -> Vec<Signal> {
        let mut out = Vec::new();
        for round in 0..self.cfg.propagation_rounds {
            if queue.is_empty() {
                break;
            }
            trace!(tick, round, queued = queue.len(), "propagation round");
            let mut next = Vec::new();

            for raw in queue {
                let signal = self.shape(raw);
                if signal.magnitude <= 0.0 {
                    continue;
                }

                if matches!(
                    signal.kind,
                    SignalKind::Structure | SignalKind::Action | SignalKind::Activation
                ) {
                    if let Some(id) = signal.detector() {
                        self.registry.touch(id, tick);
                    }
                }
                self.memory.record(&signal);

                if signal.kind == SignalKind::Structure {
                    self.collect_structure(&signal, tick, &mut next);
                }

                self.registry.broadcast(&signal, &self.memory, &mut next);
                out.push(signal);
            }
            queue = next;
        }
        out
    }

    fn collect_structure(&mut self, signal: &Signal, tick: Tick, next: &mut Vec<Signal>) {
        self.this_structures.insert(signal.value.clone());
        *self
            .structure_mass
            .entry(signal.value.clone())
            .or_insert(0.0) += signal.magnitude;

        if self.inhibition(&signal.value) > self.cfg.arming_ceiling {
            return;
        }
        if let Some((pred, _)) = self.model.prediction(&signal.value) {
            next.push(Signal::new(
                SignalKind::Prediction,
                format!("{}->{}", signal.value, pred),
                self.cfg.strong_pulse_magnitude,
                tick,
                Origin::Field,
            ));
        }
    }

    /// Energy, salience and inhibition shaping, in that order.
    fn shape(&mut self, signal: Signal) -> Signal {
        let mut magnitude = signal.magnitude;

        if signal.kind == SignalKind::Action {
            if self.actions_this_tick >= self.cfg.max_actions_per_tick {
                return signal.with_magnitude(0.0);
            }
            self.actions_this_tick += 1;

            let key = (signal.kind, signal.value.clone(), signal.origin.clone());
            if self.costed.insert(key) && !self.energy.try_spend(self.cfg.action_cost) {
                magnitude *= self.cfg.action_starved_damp;
            }
        }

        if self.error_ttl > 0
            && matches!(signal.kind, SignalKind::Structure | SignalKind::Prediction)
        {
            magnitude *= 1.0 + self.cfg.error_gain * 0.5;
        }

        if matches!(signal.kind, SignalKind::Activation | SignalKind::Structure) {
            let level = self.inhibition(&signal.value);
            if level > 0.0 {
                magnitude /= 1.0 + level;
            }
        }

        signal.with_magnitude(magnitude)
    }

    /// Winner-take-all over this tick's structure mass. Losers get inhibited.
    fn compete(&mut self) -> Option<String> {
        let mut winner: Option<(&String, f32)> = None;
        for (st, &mass) in &self.structure_mass {
            winner = match winner {
                None => Some((st, mass)),
                Some((_, w)) if mass > w + TIE_EPS => Some((st, mass)),
                Some((best, w)) if mass >= w - TIE_EPS && prefer_structure(st, best) => {
                    Some((st, mass))
                }
                keep => keep,
            };
        }
        let (winner, winner_mass) = winner.map(|(st, m)| (st.clone(), m))?;

        if self.structure_mass.len() > 1 {
            for (st, &mass) in &self.structure_mass {
                if *st == winner {
                    continue;
                }
                let add = if winner_mass - mass > self.cfg.loser_gap {
                    self.cfg.loser_inhibition_strong
                } else {
                    self.cfg.loser_inhibition
                };
                *self.inhibition.entry(st.clone()).or_insert(0.0) += add;
            }
        }
        trace!(%winner, mass = winner_mass, "competition");
        Some(winner)
    }

    fn learn(&mut self, tick: Tick) {
        let boosted = self.error_ttl > 0;
        let ctx = LearnContext {
            cfg: &self.cfg,
            memory: &self.memory,
            prev_structures: &self.prev_structures,
            tick,
            boost: self.cfg.boost(boosted),
        };

        if self.modes.learn_structure {
            self.plasticity
                .learn_structures(&ctx, &mut self.registry, &mut self.events);
        }

        if !self.modes.learn_prediction {
            return;
        }
        let Some(token) = self.memory.last_token() else {
            return;
        };
        let rate = if boosted {
            self.cfg.transition_rate_boosted
        } else {
            self.cfg.transition_rate
        };
        for st in &self.prev_structures {
            self.model.reinforce(st, token, rate * ctx.boost);
            if let Some(change) = self.model.refit(st, &self.cfg, boosted) {
                debug!(
                    tick,
                    structure = %change.structure,
                    token = %change.token,
                    confidence = change.confidence,
                    "prediction updated"
                );
                self.events.push(FieldEvent::PredictionUpdated {
                    structure: change.structure,
                    token: change.token,
                    confidence: change.confidence,
                });
            }
        }
    }

    /// Only the winner may arm an expectation for the next tick.
    fn arm(&mut self, winner: Option<&str>) {
        self.pending.clear();
        let Some(winner) = winner else {
            return;
        };
        if self.inhibition(winner) > self.cfg.arming_ceiling {
            return;
        }
        if let Some((pred, _)) = self.model.prediction(winner) {
            self.pending.insert(winner.to_string(), pred.to_string());
        }
    }

    fn prune(&mut self, tick: Tick) {
        let ids = pruning::select(&self.registry, &self.cfg, tick, |st| {
            self.this_structures.contains(st)
                || self.prev_structures.contains(st)
                || self.model.is_informative(st, &self.cfg)
        });
        if ids.is_empty() {
            return;
        }

        let structures: Vec<String> = ids
            .iter()
            .filter_map(|id| self.registry.get(id))
            .filter_map(|unit| unit.structure().map(str::to_string))
            .collect();
        let removed = self.registry.remove_all(&ids);
        for st in &structures {
            self.model.forget(st);
        }

        self.last_cleanup = Some(CleanupRecord { tick, removed });
        info!(tick, removed, "pruned inactive detectors");
        self.events.push(FieldEvent::Pruned { removed: ids });
    }
}

/// Tie-break order between equally heavy structures: pairs, then
/// sequences, then anything else, then by name.
fn prefer_structure(a: &str, b: &str) -> bool {
    let rank = |s: &str| match s.as_bytes().first() {
        Some(b'[') => 0,
        Some(b'(') => 1,
        _ => 2,
    };
    match rank(a).cmp(&rank(b)) {
        core::cmp::Ordering::Equal => a < b,
        ord => ord.is_lt(),
    }
}
