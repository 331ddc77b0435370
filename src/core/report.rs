//! What the field tells the outside world: per-tick events and reports.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::detector::DetectorKind;
use crate::signal::{Signal, SignalKind, Tick};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
pub enum FieldEvent {
    SensorRegistered {
        token: String,
    },
    Crystallized {
        kind: DetectorKind,
        name: String,
    },
    ActionAttached {
        action: String,
        target: String,
    },
    PredictionUpdated {
        structure: String,
        token: String,
        confidence: f32,
    },
    Mispredicted {
        structure: String,
        expected: String,
        actual: String,
    },
    Pruned {
        removed: Vec<String>,
    },
}

impl FieldEvent {
    /// Structure-growth events (the "training" stream).
    pub fn is_growth(&self) -> bool {
        matches!(
            self,
            FieldEvent::Crystallized { .. } | FieldEvent::ActionAttached { .. }
        )
    }
}

impl fmt::Display for FieldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldEvent::SensorRegistered { token } => write!(f, "+++ AUTO-SENSOR CREATED [{token}]"),
            FieldEvent::Crystallized { kind, name } => {
                write!(f, "+++ LEARNED NEW {kind} BLOCK {name}")
            }
            FieldEvent::ActionAttached { action, target } => {
                write!(f, "+++ ATTACHED ACTION {action} <- {target}")
            }
            FieldEvent::PredictionUpdated {
                structure,
                token,
                confidence,
            } => write!(
                f,
                "+++ PREDICTION UPDATED: {structure} -> {token} (conf={confidence:.2})"
            ),
            FieldEvent::Mispredicted {
                structure,
                expected,
                actual,
            } => write!(f, "MISPREDICTION: {structure} expected {expected} got {actual}"),
            FieldEvent::Pruned { removed } => {
                write!(f, "SELF-CLEANUP: pruned={} inactive blocks", removed.len())
            }
        }
    }
}

/// An expectation that was armed when a tick began.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ArmedExpectation {
    pub structure: String,
    pub token: String,
    /// Confidence frozen at arming time.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TickReport {
    pub tick: Tick,
    pub token: String,
    pub armed: Vec<ArmedExpectation>,
    pub signals: Vec<Signal>,
    pub events: Vec<FieldEvent>,
}

impl TickReport {
    pub fn values(&self, kind: SignalKind) -> Vec<String> {
        self.signals
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.value.clone())
            .collect()
    }

    pub fn structures(&self) -> Vec<String> {
        self.values(SignalKind::Structure)
    }

    pub fn actions(&self) -> Vec<String> {
        self.values(SignalKind::Action)
    }

    pub fn errors(&self) -> Vec<String> {
        self.values(SignalKind::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EpisodeReport {
    pub structures_fired: Vec<String>,
    pub actions_fired: Vec<String>,
    pub errors: Vec<String>,
    pub ticks: Vec<TickReport>,
}

impl EpisodeReport {
    pub(crate) fn push(&mut self, tick: TickReport) {
        self.structures_fired.extend(tick.structures());
        self.actions_fired.extend(tick.actions());
        self.errors.extend(tick.errors());
        self.ticks.push(tick);
    }

    pub fn events(&self) -> impl Iterator<Item = &FieldEvent> + '_ {
        self.ticks.iter().flat_map(|t| t.events.iter())
    }

    /// True if anything worth showing happened.
    pub fn is_eventful(&self) -> bool {
        !self.structures_fired.is_empty()
            || !self.actions_fired.is_empty()
            || !self.errors.is_empty()
            || self.events().next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Origin;

    #[test]
    fn events_render_like_the_field_log() {
        let e = FieldEvent::Crystallized {
            kind: DetectorKind::Pair,
            name: "[1-2]".to_string(),
        };
        assert_eq!(e.to_string(), "+++ LEARNED NEW PAIR BLOCK [1-2]");

        let e = FieldEvent::PredictionUpdated {
            structure: "[1-2]".to_string(),
            token: "3".to_string(),
            confidence: 0.75,
        };
        assert_eq!(e.to_string(), "+++ PREDICTION UPDATED: [1-2] -> 3 (conf=0.75)");
    }

    #[test]
    fn episode_partitions_signals() {
        let tick = TickReport {
            tick: 1,
            token: "2".to_string(),
            armed: Vec::new(),
            signals: vec![
                Signal::new(SignalKind::Activation, "2", 1.0, 1, Origin::External),
                Signal::new(SignalKind::Structure, "[1-2]", 1.0, 1, Origin::Field),
                Signal::new(SignalKind::Error, "[1-2]:3->2", 1.0, 1, Origin::Field),
            ],
            events: Vec::new(),
        };
        let mut ep = EpisodeReport::default();
        ep.push(tick);
        assert_eq!(ep.structures_fired, vec!["[1-2]"]);
        assert_eq!(ep.errors, vec!["[1-2]:3->2"]);
        assert!(ep.actions_fired.is_empty());
        assert!(ep.is_eventful());
    }
}
