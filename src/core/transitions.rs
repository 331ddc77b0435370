//! Predictive transition memory.
//!
//! For every structure the field keeps a weight per follow-up token, plus a
//! published best prediction with a gated confidence. Publication is
//! sticky: a challenger must be heavy enough and dominate the incumbent
//! before the public prediction switches.

use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::FieldConfig;

const EPS: f32 = 1e-6;
const CONF_FLOOR: f32 = 0.01;
const CAP_GATED: f32 = 0.95;
const CAP_FULL: f32 = 0.99;

/// Summary counts of the transition table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransitionStats {
    pub structures: usize,
    pub transitions: usize,
    pub predictions: usize,
    pub max_weight: f32,
}

/// A published prediction change worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionChange {
    pub structure: String,
    pub token: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default)]
pub struct TransitionModel {
    weights: BTreeMap<String, BTreeMap<String, f32>>,
    best: BTreeMap<String, String>,
    confidence: BTreeMap<String, f32>,
}

impl TransitionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(&self, structure: &str, token: &str) -> f32 {
        self.weights
            .get(structure)
            .and_then(|row| row.get(token))
            .copied()
            .unwrap_or(0.0)
    }

    /// Published prediction and its confidence.
    pub fn prediction(&self, structure: &str) -> Option<(&str, f32)> {
        let token = self.best.get(structure)?;
        Some((token.as_str(), self.confidence(structure)))
    }

    pub fn confidence(&self, structure: &str) -> f32 {
        self.confidence.get(structure).copied().unwrap_or(0.0)
    }

    /// All published predictions, ordered by structure name.
    pub fn predictions(&self) -> impl Iterator<Item = (&str, &str, f32)> + '_ {
        self.best
            .iter()
            .map(|(st, tok)| (st.as_str(), tok.as_str(), self.confidence(st)))
    }

    /// Follow-up tokens of `structure` ranked by weight, strongest first.
    pub fn ranked(&self, structure: &str, n: usize) -> Vec<(String, f32)> {
        let Some(row) = self.weights.get(structure) else {
            return Vec::new();
        };
        let mut out: Vec<(String, f32)> = row.iter().map(|(t, w)| (t.clone(), *w)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(n);
        out
    }

    pub fn max_weight(&self, structure: &str) -> f32 {
        self.weights
            .get(structure)
            .map(|row| row.values().copied().fold(0.0, f32::max))
            .unwrap_or(0.0)
    }

    /// True if `structure` holds knowledge worth keeping around.
    pub fn is_informative(&self, structure: &str, cfg: &FieldConfig) -> bool {
        let confident = self.best.contains_key(structure)
            && self.confidence(structure) >= cfg.protect_confidence;
        confident || self.max_weight(structure) >= cfg.protect_weight
    }

    pub fn stats(&self) -> TransitionStats {
        TransitionStats {
            structures: self.weights.len(),
            transitions: self.weights.values().map(BTreeMap::len).sum(),
            predictions: self.best.len(),
            max_weight: self
                .weights
                .values()
                .flat_map(|row| row.values().copied())
                .fold(0.0, f32::max),
        }
    }

    pub(crate) fn reinforce(&mut self, structure: &str, token: &str, amount: f32) {
        *self
            .weights
            .entry(structure.to_string())
            .or_default()
            .entry(token.to_string())
            .or_insert(0.0) += amount;
    }

    /// Error-driven update: weaken the wrong transition, nudge the actual one.
    /// The published prediction is left alone; only `refit` switches it.
    pub(crate) fn correct(&mut self, structure: &str, expected: &str, actual: &str, cfg: &FieldConfig) {
        let row = self.weights.entry(structure.to_string()).or_default();
        if let Some(w) = row.get_mut(expected) {
            *w *= cfg.error_damp;
            if *w < cfg.error_drop_below {
                row.remove(expected);
            }
        }
        let w = row.entry(actual.to_string()).or_insert(0.0);
        *w = (*w + cfg.error_nudge * cfg.boost(true)).min(cfg.transition_weight_cap);
    }

    /// Recompute the published prediction of `structure` after its weights changed.
    pub(crate) fn refit(&mut self, structure: &str, cfg: &FieldConfig, boosted: bool) -> Option<PredictionChange> {
        let old_pred = self.best.get(structure).cloned();
        let old_conf = self.confidence(structure);

        let (best_tok, best_w, sum) = match self.weights.get(structure) {
            Some(row) => {
                let mut best: Option<(&String, f32)> = None;
                for (tok, &w) in row {
                    if best.map_or(true, |(_, bw)| w > bw) {
                        best = Some((tok, w));
                    }
                }
                let sum: f32 = row.values().sum();
                (best.map(|(t, _)| t.clone()), best.map_or(0.0, |(_, w)| w), sum)
            }
            None => (None, 0.0, 0.0),
        };

        let (pred, conf) = match best_tok {
            Some(best_tok) if sum > 0.0 => {
                let old_w = old_pred.as_deref().map_or(0.0, |p| self.weight(structure, p));
                let dominance = if boosted {
                    cfg.switch_dominance_boosted
                } else {
                    cfg.switch_dominance
                };
                let no_prev = old_pred.is_none();
                let same = old_pred.as_deref() == Some(best_tok.as_str());
                let strong = best_w >= cfg.switch_min_weight && (no_prev || best_w >= old_w * dominance);

                if no_prev || same || strong {
                    let conf = self.gated_confidence(structure, &best_tok, cfg);
                    (Some(best_tok), conf)
                } else {
                    let conf = match old_pred.as_deref() {
                        Some(old) => self.gated_confidence(structure, old, cfg) * cfg.inertia_decay,
                        None => old_conf * cfg.inertia_decay,
                    };
                    (old_pred.clone(), conf)
                }
            }
            _ => {
                let conf = old_conf * cfg.inertia_decay;
                (old_pred.clone(), if conf < CONF_FLOOR { 0.0 } else { conf })
            }
        };

        self.confidence.insert(structure.to_string(), conf);
        let pred = pred?;
        self.best.insert(structure.to_string(), pred.clone());

        let changed = old_pred.as_deref() != Some(pred.as_str());
        if changed || conf - old_conf > cfg.prediction_event_jump {
            return Some(PredictionChange {
                structure: structure.to_string(),
                token: pred,
                confidence: conf,
            });
        }
        None
    }

    /// Confidence of `token` as the follow-up of `structure`.
    ///
    /// The raw share of weight is gated twice: by evidence (a fixed number
    /// of confirmations is needed for full strength) and by margin over the
    /// runner-up. Gated values are capped below certainty.
    pub fn gated_confidence(&self, structure: &str, token: &str, cfg: &FieldConfig) -> f32 {
        let Some(row) = self.weights.get(structure) else {
            return 0.0;
        };
        let target = row.get(token).copied().unwrap_or(0.0);
        let sum: f32 = row.values().sum();
        if sum <= EPS || target <= 0.0 {
            return 0.0;
        }

        let raw = target / sum;

        let full_evidence = cfg.confirmations_required as f32 * cfg.confirmation_increment;
        let e_gate = if full_evidence > EPS {
            (target / full_evidence).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let second = row
            .iter()
            .filter(|(t, _)| t.as_str() != token)
            .map(|(_, w)| *w)
            .fold(0.0, f32::max);
        let mut m_gate = 1.0;
        if second > 0.0 {
            let need = second * (1.0 + cfg.margin_fraction);
            if target < need {
                m_gate = (target / (need + EPS)).clamp(0.0, 1.0);
            }
        }

        let cap = if e_gate < 1.0 || m_gate < 1.0 {
            CAP_GATED
        } else {
            CAP_FULL
        };
        let conf = (raw * e_gate * m_gate).min(cap);
        if conf < CONF_FLOOR {
            0.0
        } else {
            conf
        }
    }

    /// Drop everything known about `structure`.
    pub(crate) fn forget(&mut self, structure: &str) {
        self.weights.remove(structure);
        self.best.remove(structure);
        self.confidence.remove(structure);
    }

    #[cfg(test)]
    pub(crate) fn publish(&mut self, structure: &str, token: &str, confidence: f32) {
        self.best.insert(structure.to_string(), token.to_string());
        self.confidence.insert(structure.to_string(), confidence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn confidence_grows_with_confirmations() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        let mut seen = Vec::new();
        for _ in 0..4 {
            m.reinforce("[1-2]", "3", cfg.transition_rate);
            m.refit("[1-2]", &cfg, false);
            seen.push(m.confidence("[1-2]"));
        }
        assert!(close(seen[0], 0.25));
        assert!(close(seen[1], 0.5));
        assert!(close(seen[2], 0.75));
        // full evidence, no runner-up: capped below certainty
        assert!(seen[3] > 0.94 && seen[3] <= 0.99);
        assert_eq!(m.prediction("[1-2]").map(|p| p.0), Some("3"));
    }

    #[test]
    fn first_prediction_is_reported() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        m.reinforce("(1>2)", "3", cfg.transition_rate);
        let change = m.refit("(1>2)", &cfg, false);
        assert_eq!(
            change.map(|c| (c.structure, c.token)),
            Some(("(1>2)".to_string(), "3".to_string()))
        );
        // 0.25 -> 0.5 is a jump above the reporting threshold
        m.reinforce("(1>2)", "3", cfg.transition_rate);
        assert!(m.refit("(1>2)", &cfg, false).is_some());
    }

    #[test]
    fn light_challenger_does_not_switch() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        for _ in 0..3 {
            m.reinforce("[1-2]", "3", cfg.transition_rate);
            m.refit("[1-2]", &cfg, false);
        }
        // Misprediction: 3 expected, 4 arrived, then boosted learning of 4.
        m.correct("[1-2]", "3", "4", &cfg);
        assert!(close(m.weight("[1-2]", "3"), 0.396));
        assert!(close(m.weight("[1-2]", "4"), 0.66));
        m.reinforce("[1-2]", "4", cfg.transition_rate_boosted * cfg.boost(true));
        m.refit("[1-2]", &cfg, true);

        let (tok, conf) = m.prediction("[1-2]").unwrap_or(("", 0.0));
        assert_eq!(tok, "3");
        assert!(conf < 0.1, "confidence should collapse, got {conf}");
    }

    #[test]
    fn heavy_dominant_challenger_switches() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        m.reinforce("x", "a", 0.5);
        m.refit("x", &cfg, false);
        m.reinforce("x", "b", 1.2);
        let change = m.refit("x", &cfg, false);
        assert_eq!(change.map(|c| c.token), Some("b".to_string()));
    }

    #[test]
    fn damped_transition_can_vanish() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        m.reinforce("x", "a", 0.12);
        m.correct("x", "a", "b", &cfg);
        assert_eq!(m.weight("x", "a"), 0.0);
        assert_eq!(m.ranked("x", 5).len(), 1);
    }

    #[test]
    fn nudges_are_capped() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        for _ in 0..10 {
            m.correct("x", "a", "b", &cfg);
        }
        assert!(close(m.weight("x", "b"), cfg.transition_weight_cap));
    }

    #[test]
    fn margin_gate_limits_confidence() {
        let cfg = FieldConfig::default();
        let mut m = TransitionModel::new();
        m.reinforce("x", "a", 1.0);
        m.reinforce("x", "b", 0.9);
        let c = m.gated_confidence("x", "a", &cfg);
        // raw 0.526, margin gate 1.0 / (0.9 * 1.35)
        assert!(close(c, (1.0 / 1.9) * (1.0 / 1.215)));
        assert!(m.is_informative("x", &cfg));
        m.forget("x");
        assert!(!m.is_informative("x", &cfg));
    }
}
