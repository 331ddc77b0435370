//! Detector units.
//!
//! Every unit reacts to broadcast signals and may emit new ones. Units only
//! mutate their own accumulator and maturity; everything else they read from
//! the field's short-term memory.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::DetectorParams;
use crate::memory::ShortTermMemory;
use crate::signal::{Origin, Signal, SignalKind};

/// Registry identity. Encodes variant and operands, e.g. `COACT:[1-2]`.
pub type DetectorId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetectorKind {
    Sensor,
    Pair,
    Sequence,
    Composition,
    Action,
}

impl DetectorKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DetectorKind::Sensor => "SENSOR:",
            DetectorKind::Pair => "COACT:",
            DetectorKind::Sequence => "SEQ:",
            DetectorKind::Composition => "COMPOSE:",
            DetectorKind::Action => "ACTIONBLOCK:",
        }
    }

    /// Pair, sequence and composition units produce structures and may be forgotten.
    pub fn produces_structure(self) -> bool {
        matches!(
            self,
            DetectorKind::Pair | DetectorKind::Sequence | DetectorKind::Composition
        )
    }

    pub fn id_for(self, name: &str) -> DetectorId {
        format!("{}{}", self.prefix(), name)
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectorKind::Sensor => "SENSOR",
            DetectorKind::Pair => "PAIR",
            DetectorKind::Sequence => "SEQ",
            DetectorKind::Composition => "COMPOSE",
            DetectorKind::Action => "ACTION",
        })
    }
}

/// Canonical structure name of an unordered pair: `[lo-hi]`.
pub fn pair_name(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("[{lo}-{hi}]")
}

/// Structure name of a directional sequence: `(a>b)`.
pub fn sequence_name(a: &str, b: &str) -> String {
    format!("({a}>{b})")
}

/// Structure name of a composition over an existing structure: `[base-x]`.
pub fn composition_name(base: &str, x: &str) -> String {
    format!("[{base}-{x}]")
}

pub fn action_name(structure: &str) -> String {
    format!("ACT_ON_{structure}")
}

/// Members of a simple pair name like `[1-2]`. Nested names such as
/// `[[1-2]-3]` are not simple pairs.
pub fn parse_pair(name: &str) -> Option<(&str, &str)> {
    let inner = name.strip_prefix('[')?.strip_suffix(']')?;
    let mut parts = inner.split('-');
    let a = parts.next()?.trim();
    let b = parts.next()?.trim();
    if parts.next().is_some() || a.is_empty() || b.is_empty() {
        return None;
    }
    Some((a, b))
}

/// Shared accumulate-decay state of the pattern detectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub level: f32,
    pub params: DetectorParams,
}

impl Accumulator {
    fn new(params: DetectorParams) -> Self {
        Self { level: 0.0, params }
    }

    /// Add evidence; returns true (and halves toward the threshold) on crossing.
    fn charge(&mut self, amount: f32) -> bool {
        self.level += amount;
        if self.level >= self.params.threshold {
            self.level = self.params.threshold * 0.5;
            return true;
        }
        false
    }

    fn decay(&mut self) {
        if self.level > 0.0 {
            self.level = (self.level - self.params.decay_per_tick).max(0.0);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorUnit {
    pub token: String,
}

/// Fires `[a-b]` when the two most recent tokens are `a` and `b` in either order.
#[derive(Debug, Clone, PartialEq)]
pub struct PairUnit {
    pub a: String,
    pub b: String,
    pub name: String,
    pub acc: Accumulator,
    pub mature: bool,
}

/// Fires `(a>b)` when `b` follows `a`.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceUnit {
    pub a: String,
    pub b: String,
    pub name: String,
    pub acc: Accumulator,
    pub mature: bool,
}

/// Fires `[base-x]` when structure `base` and token `x` co-occur.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionUnit {
    pub base: String,
    pub x: String,
    pub name: String,
    pub acc: Accumulator,
}

/// Turns a structure into a visible action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionUnit {
    pub target: String,
    pub action: String,
    pub acc: Accumulator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Detector {
    Sensor(SensorUnit),
    Pair(PairUnit),
    Sequence(SequenceUnit),
    Composition(CompositionUnit),
    Action(ActionUnit),
}

impl Detector {
    pub fn sensor(token: &str) -> Self {
        Detector::Sensor(SensorUnit {
            token: token.to_string(),
        })
    }

    pub fn pair(a: &str, b: &str, params: DetectorParams) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Detector::Pair(PairUnit {
            a: lo.to_string(),
            b: hi.to_string(),
            name: pair_name(a, b),
            acc: Accumulator::new(params),
            mature: false,
        })
    }

    pub fn sequence(a: &str, b: &str, params: DetectorParams) -> Self {
        Detector::Sequence(SequenceUnit {
            a: a.to_string(),
            b: b.to_string(),
            name: sequence_name(a, b),
            acc: Accumulator::new(params),
            mature: false,
        })
    }

    pub fn composition(base: &str, x: &str, params: DetectorParams) -> Self {
        Detector::Composition(CompositionUnit {
            base: base.to_string(),
            x: x.to_string(),
            name: composition_name(base, x),
            acc: Accumulator::new(params),
        })
    }

    pub fn action(target: &str, params: DetectorParams) -> Self {
        Detector::Action(ActionUnit {
            target: target.to_string(),
            action: action_name(target),
            acc: Accumulator::new(params),
        })
    }

    /// Skip the first confirmation: the unit starts as a fast reflex.
    pub fn matured(mut self) -> Self {
        match &mut self {
            Detector::Pair(p) => p.mature = true,
            Detector::Sequence(s) => s.mature = true,
            _ => {}
        }
        self
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            Detector::Sensor(_) => DetectorKind::Sensor,
            Detector::Pair(_) => DetectorKind::Pair,
            Detector::Sequence(_) => DetectorKind::Sequence,
            Detector::Composition(_) => DetectorKind::Composition,
            Detector::Action(_) => DetectorKind::Action,
        }
    }

    pub fn id(&self) -> DetectorId {
        match self {
            Detector::Sensor(s) => DetectorKind::Sensor.id_for(&s.token),
            Detector::Pair(p) => DetectorKind::Pair.id_for(&p.name),
            Detector::Sequence(s) => DetectorKind::Sequence.id_for(&s.name),
            Detector::Composition(c) => DetectorKind::Composition.id_for(&c.name),
            Detector::Action(a) => format!("{}{}<-{}", DetectorKind::Action.prefix(), a.action, a.target),
        }
    }

    /// Name of the structure this unit emits, for structure producers.
    pub fn structure(&self) -> Option<&str> {
        match self {
            Detector::Pair(p) => Some(&p.name),
            Detector::Sequence(s) => Some(&s.name),
            Detector::Composition(c) => Some(&c.name),
            _ => None,
        }
    }

    /// Structure an action unit is attached to.
    pub fn action_target(&self) -> Option<&str> {
        match self {
            Detector::Action(a) => Some(&a.target),
            _ => None,
        }
    }

    pub fn accumulator(&self) -> f32 {
        match self {
            Detector::Sensor(_) => 0.0,
            Detector::Pair(p) => p.acc.level,
            Detector::Sequence(s) => s.acc.level,
            Detector::Composition(c) => c.acc.level,
            Detector::Action(a) => a.acc.level,
        }
    }

    pub fn is_mature(&self) -> bool {
        match self {
            Detector::Pair(p) => p.mature,
            Detector::Sequence(s) => s.mature,
            _ => false,
        }
    }

    pub fn react(&mut self, signal: &Signal, mem: &ShortTermMemory) -> Vec<Signal> {
        let id = self.id();
        let tick = mem.tick();
        let emit = |kind: SignalKind, value: &str, magnitude: f32| {
            vec![Signal::new(kind, value, magnitude, tick, Origin::Detector(id.clone()))]
        };

        match self {
            Detector::Sensor(u) => {
                if signal.is(SignalKind::Sensory, &u.token) {
                    return emit(SignalKind::Activation, &u.token, signal.magnitude);
                }
                Vec::new()
            }

            Detector::Pair(u) => {
                if signal.kind != SignalKind::Activation || (signal.value != u.a && signal.value != u.b) {
                    return Vec::new();
                }
                // Only the immediately preceding token counts, never the wider window.
                let Some((prev, last)) = mem.adjacent_tokens() else {
                    return Vec::new();
                };
                let adjacent = (prev == u.a && last == u.b) || (prev == u.b && last == u.a);
                if !adjacent {
                    return Vec::new();
                }
                if u.mature || u.acc.charge(1.0) {
                    u.mature = true;
                    return emit(SignalKind::Structure, &u.name, u.acc.params.emit_magnitude);
                }
                Vec::new()
            }

            Detector::Sequence(u) => {
                if !signal.is(SignalKind::Activation, &u.b) {
                    return Vec::new();
                }
                let Some(seen) = mem.recent_activation(&u.a, u.acc.params.window) else {
                    return Vec::new();
                };
                let adjacent = seen + 1 == tick;
                if u.mature {
                    if !adjacent {
                        return Vec::new();
                    }
                    return emit(SignalKind::Structure, &u.name, u.acc.params.emit_magnitude);
                }
                if u.acc.charge(1.0) {
                    u.mature = true;
                    return emit(SignalKind::Structure, &u.name, u.acc.params.emit_magnitude);
                }
                Vec::new()
            }

            Detector::Composition(u) => {
                let window = u.acc.params.window;
                let triggered = match signal.kind {
                    SignalKind::Structure if signal.value == u.base => {
                        mem.recent_activation(&u.x, window).is_some()
                    }
                    SignalKind::Activation if signal.value == u.x => {
                        mem.recent_structure(&u.base, window).is_some()
                    }
                    _ => false,
                };
                if triggered && u.acc.charge(1.0) {
                    return emit(SignalKind::Structure, &u.name, u.acc.params.emit_magnitude);
                }
                Vec::new()
            }

            Detector::Action(u) => {
                if signal.is(SignalKind::Structure, &u.target) && u.acc.charge(signal.magnitude) {
                    return emit(SignalKind::Action, &u.action, 1.0);
                }
                Vec::new()
            }
        }
    }

    /// Passive per-tick decay. No variant emits spontaneously today.
    pub fn decay_tick(&mut self, _mem: &ShortTermMemory) -> Vec<Signal> {
        match self {
            Detector::Sensor(_) => {}
            Detector::Pair(u) => u.acc.decay(),
            Detector::Sequence(u) => u.acc.decay(),
            Detector::Composition(u) => u.acc.decay(),
            Detector::Action(u) => u.acc.decay(),
        }
        Vec::new()
    }
}
