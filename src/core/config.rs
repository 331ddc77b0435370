//! Field configuration.
//!
//! Every constant the engine uses lives here. The defaults are the tuned
//! values the field was developed against; changing them changes behavior.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Per-variant parameters of a pattern detector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetectorParams {
    /// Accumulator level at which the detector first emits.
    pub threshold: f32,
    /// Accumulator loss per tick.
    pub decay_per_tick: f32,
    /// Lookback in ticks over the recent windows.
    pub window: u64,
    /// Magnitude of emitted structure signals.
    pub emit_magnitude: f32,
}

impl DetectorParams {
    pub const fn new(threshold: f32, decay_per_tick: f32, window: u64) -> Self {
        Self {
            threshold,
            decay_per_tick,
            window,
            emit_magnitude: 1.0,
        }
    }

    fn validate(&self) -> Result<(), &'static str> {
        if self.threshold <= 0.0 {
            return Err("detector threshold must be > 0");
        }
        if self.decay_per_tick < 0.0 {
            return Err("detector decay must be >= 0");
        }
        if self.emit_magnitude <= 0.0 {
            return Err("detector emit magnitude must be > 0");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FieldConfig {
    pub pair: DetectorParams,
    pub sequence: DetectorParams,
    pub composition: DetectorParams,
    pub action: DetectorParams,

    // Propagation.
    pub recent_window: u64,
    pub propagation_rounds: usize,

    // Inhibition: multiplicative decay per tick; entries under the floor vanish.
    pub inhibition_decay: f32,
    pub inhibition_floor: f32,
    pub loser_inhibition: f32,
    pub loser_inhibition_strong: f32,
    pub loser_gap: f32,
    /// A structure inhibited above this may neither arm nor pulse predictions.
    pub arming_ceiling: f32,

    // Misprediction handling.
    pub error_cooldown_ticks: u32,
    pub error_boost_ticks: u32,
    pub error_gain: f32,
    pub error_inhibition: f32,
    pub error_damp: f32,
    pub error_drop_below: f32,
    pub error_nudge: f32,
    pub transition_weight_cap: f32,

    // Energy budget.
    pub energy_max: f32,
    pub energy_regen: f32,
    pub action_cost: f32,
    pub action_starved_damp: f32,
    pub winner_cost: f32,
    pub winner_starved_inhibition: f32,
    pub max_actions_per_tick: usize,

    // Forgetting.
    pub forget_after: u64,
    pub prune_every: u64,
    pub max_prunes_per_pass: usize,
    pub protect_confidence: f32,
    pub protect_weight: f32,

    // Structure learning (charge per observation; crystallize at 1.0).
    pub pair_increment: f32,
    pub sequence_increment: f32,
    pub composition_increment: f32,

    // Predictive transition learning.
    pub transition_rate: f32,
    pub transition_rate_boosted: f32,
    pub switch_dominance: f32,
    pub switch_dominance_boosted: f32,
    pub switch_min_weight: f32,
    pub inertia_decay: f32,
    pub confirmations_required: u32,
    pub confirmation_increment: f32,
    pub margin_fraction: f32,
    pub prediction_event_jump: f32,

    // Prediction pulses.
    pub weak_pulse_min_confidence: f32,
    pub weak_pulse_scale: f32,
    pub weak_pulse_floor: f32,
    pub strong_pulse_magnitude: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            pair: DetectorParams::new(2.0, 0.15, 2),
            sequence: DetectorParams::new(2.0, 0.18, 2),
            composition: DetectorParams::new(4.0, 0.12, 3),
            action: DetectorParams::new(2.0, 0.20, 0),

            recent_window: 12,
            propagation_rounds: 4,

            inhibition_decay: 0.18,
            inhibition_floor: 0.02,
            loser_inhibition: 0.7,
            loser_inhibition_strong: 1.0,
            loser_gap: 0.5,
            arming_ceiling: 0.7,

            error_cooldown_ticks: 2,
            error_boost_ticks: 3,
            error_gain: 1.2,
            error_inhibition: 0.9,
            error_damp: 0.60,
            error_drop_below: 0.10,
            error_nudge: 0.30,
            transition_weight_cap: 3.0,

            energy_max: 10.0,
            energy_regen: 0.8,
            action_cost: 0.8,
            action_starved_damp: 0.3,
            winner_cost: 0.6,
            winner_starved_inhibition: 0.5,
            max_actions_per_tick: 1,

            forget_after: 120,
            prune_every: 20,
            max_prunes_per_pass: 6,
            protect_confidence: 0.30,
            protect_weight: 0.20,

            pair_increment: 0.40,
            sequence_increment: 0.45,
            composition_increment: 0.28,

            transition_rate: 0.22,
            transition_rate_boosted: 0.12,
            switch_dominance: 1.35,
            switch_dominance_boosted: 1.10,
            switch_min_weight: 1.0,
            inertia_decay: 0.85,
            confirmations_required: 4,
            confirmation_increment: 0.22,
            margin_fraction: 0.35,
            prediction_event_jump: 0.15,

            weak_pulse_min_confidence: 0.25,
            weak_pulse_scale: 0.25,
            weak_pulse_floor: 0.05,
            strong_pulse_magnitude: 0.6,
        }
    }
}

impl FieldConfig {
    /// Charge level at which a candidate pattern crystallizes.
    pub const CRYSTALLIZE_AT: f32 = 1.0;

    pub fn with_forgetting(mut self, forget_after: u64, prune_every: u64) -> Self {
        self.forget_after = forget_after;
        self.prune_every = prune_every;
        self
    }

    pub fn with_energy(mut self, max: f32, regen: f32) -> Self {
        self.energy_max = max;
        self.energy_regen = regen;
        self
    }

    pub fn with_max_actions_per_tick(mut self, n: usize) -> Self {
        self.max_actions_per_tick = n;
        self
    }

    /// Boost multiplier applied to learning increments while the error window is open.
    pub fn boost(&self, error_window_open: bool) -> f32 {
        if error_window_open {
            1.0 + self.error_gain
        } else {
            1.0
        }
    }

    /// Validate the configuration, returning an error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        self.pair.validate()?;
        self.sequence.validate()?;
        self.composition.validate()?;
        self.action.validate()?;

        if self.propagation_rounds == 0 {
            return Err("propagation_rounds must be > 0");
        }
        if !(0.0..=1.0).contains(&self.inhibition_decay) {
            return Err("inhibition_decay must be in [0, 1]");
        }
        if self.inhibition_floor < 0.0 {
            return Err("inhibition_floor must be >= 0");
        }
        if self.error_gain < 0.0 {
            return Err("error_gain must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.error_damp) {
            return Err("error_damp must be in [0, 1]");
        }
        if self.energy_max <= 0.0 {
            return Err("energy_max must be > 0");
        }
        if self.energy_regen < 0.0 || self.action_cost < 0.0 || self.winner_cost < 0.0 {
            return Err("energy regen and costs must be >= 0");
        }
        if !(0.0..=1.0).contains(&self.action_starved_damp) {
            return Err("action_starved_damp must be in [0, 1]");
        }
        if self.max_actions_per_tick == 0 {
            return Err("max_actions_per_tick must be > 0");
        }
        if self.pair_increment <= 0.0
            || self.sequence_increment <= 0.0
            || self.composition_increment <= 0.0
        {
            return Err("learning increments must be > 0");
        }
        if self.transition_rate <= 0.0 || self.transition_rate_boosted <= 0.0 {
            return Err("transition rates must be > 0");
        }
        if self.switch_dominance < 1.0 || self.switch_dominance_boosted < 1.0 {
            return Err("switch dominance must be >= 1");
        }
        if !(0.0..=1.0).contains(&self.inertia_decay) {
            return Err("inertia_decay must be in [0, 1]");
        }
        if self.confirmations_required == 0 || self.confirmation_increment <= 0.0 {
            return Err("confidence evidence gate must be positive");
        }
        if self.margin_fraction < 0.0 {
            return Err("margin_fraction must be >= 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(FieldConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_energy_cap() {
        let cfg = FieldConfig::default().with_energy(0.0, 0.8);
        assert_eq!(cfg.validate(), Err("energy_max must be > 0"));
    }

    #[test]
    fn rejects_bad_detector_params() {
        let mut cfg = FieldConfig::default();
        cfg.composition.threshold = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn boost_only_when_window_open() {
        let cfg = FieldConfig::default();
        assert_eq!(cfg.boost(false), 1.0);
        assert!((cfg.boost(true) - 2.2).abs() < 1e-6);
    }
}
