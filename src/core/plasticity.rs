//! Structural plasticity: candidate patterns accumulate charge from
//! observations and crystallize into detectors once the charge reaches
//! [`FieldConfig::CRYSTALLIZE_AT`]. A crystallized candidate is marked and
//! never re-learned.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::{DetectorParams, FieldConfig};
use crate::detector::{action_name, parse_pair, pair_name, sequence_name, Detector};
use crate::memory::ShortTermMemory;
use crate::registry::Registry;
use crate::report::FieldEvent;
use crate::signal::Tick;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Charge {
    Pending(f32),
    Crystallized,
}

/// Charge per candidate key.
#[derive(Debug, Clone, Default)]
pub struct ChargeTable {
    entries: BTreeMap<String, Charge>,
}

impl ChargeTable {
    /// Add charge to `key`. Returns true exactly once: when the key crystallizes.
    pub fn add(&mut self, key: &str, amount: f32) -> bool {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert(Charge::Pending(0.0));
        let Charge::Pending(level) = *entry else {
            return false;
        };
        let level = level + amount;
        if level >= FieldConfig::CRYSTALLIZE_AT {
            *entry = Charge::Crystallized;
            return true;
        }
        *entry = Charge::Pending(level);
        false
    }

    pub fn get(&self, key: &str) -> Option<Charge> {
        self.entries.get(key).copied()
    }

    pub fn pending(&self, key: &str) -> f32 {
        match self.get(key) {
            Some(Charge::Pending(level)) => level,
            _ => 0.0,
        }
    }

    pub fn is_crystallized(&self, key: &str) -> bool {
        self.get(key) == Some(Charge::Crystallized)
    }

    pub fn pending_len(&self) -> usize {
        self.entries
            .values()
            .filter(|c| matches!(c, Charge::Pending(_)))
            .count()
    }

    pub fn crystallized_len(&self) -> usize {
        self.entries.len() - self.pending_len()
    }

    /// Drop in-progress charge; crystallization marks survive.
    pub(crate) fn clear_pending(&mut self) {
        self.entries.retain(|_, c| *c == Charge::Crystallized);
    }
}

/// Candidate keys. Pairs are unordered, sequences ordered.
pub fn pair_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}|{hi}")
}

pub fn sequence_key(a: &str, b: &str) -> String {
    format!("{a}>{b}")
}

pub fn composition_key(base: &str, token: &str) -> String {
    format!("{base}||{token}")
}

/// Everything a learner needs to see about the tick that just ran.
pub(crate) struct LearnContext<'a> {
    pub cfg: &'a FieldConfig,
    pub memory: &'a ShortTermMemory,
    /// Structures that fired on the previous tick.
    pub prev_structures: &'a BTreeSet<String>,
    pub tick: Tick,
    pub boost: f32,
}

#[derive(Debug, Clone, Default)]
pub struct Plasticity {
    pub pairs: ChargeTable,
    pub sequences: ChargeTable,
    pub compositions: ChargeTable,
}

impl Plasticity {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pairs.clear_pending();
        self.sequences.clear_pending();
        self.compositions.clear_pending();
    }

    /// Run the pair, sequence and composition learners for one tick.
    pub(crate) fn learn_structures(
        &mut self,
        ctx: &LearnContext<'_>,
        registry: &mut Registry,
        events: &mut Vec<FieldEvent>,
    ) {
        if let Some((prev, last)) = ctx.memory.adjacent_tokens() {
            if prev != last {
                self.learn_pair(ctx, prev, last, registry, events);
                self.learn_sequence(ctx, prev, last, registry, events);
            }
        }
        if let Some(token) = ctx.memory.last_token() {
            self.learn_compositions(ctx, token, registry, events);
        }
    }

    fn learn_pair(
        &mut self,
        ctx: &LearnContext<'_>,
        prev: &str,
        last: &str,
        registry: &mut Registry,
        events: &mut Vec<FieldEvent>,
    ) {
        if !self.pairs.add(&pair_key(prev, last), ctx.cfg.pair_increment * ctx.boost) {
            return;
        }
        // Pairs are perceptual only: no action unit.
        crystallize(
            Detector::pair(prev, last, ctx.cfg.pair),
            pair_name(prev, last),
            None,
            ctx,
            registry,
            events,
        );
    }

    fn learn_sequence(
        &mut self,
        ctx: &LearnContext<'_>,
        prev: &str,
        last: &str,
        registry: &mut Registry,
        events: &mut Vec<FieldEvent>,
    ) {
        if !self
            .sequences
            .add(&sequence_key(prev, last), ctx.cfg.sequence_increment * ctx.boost)
        {
            return;
        }
        let name = sequence_name(prev, last);
        crystallize(
            Detector::sequence(prev, last, ctx.cfg.sequence),
            name,
            Some(ctx.cfg.action),
            ctx,
            registry,
            events,
        );
    }

    fn learn_compositions(
        &mut self,
        ctx: &LearnContext<'_>,
        token: &str,
        registry: &mut Registry,
        events: &mut Vec<FieldEvent>,
    ) {
        for base in ctx.prev_structures {
            let Some((a, b)) = parse_pair(base) else {
                continue;
            };
            // no folding a pair back onto its own members
            if token == a || token == b {
                continue;
            }
            let key = composition_key(base, token);
            if !self
                .compositions
                .add(&key, ctx.cfg.composition_increment * ctx.boost)
            {
                continue;
            }
            let unit = Detector::composition(base, token, ctx.cfg.composition);
            let name = unit.structure().map(str::to_string).unwrap_or_default();
            crystallize(unit, name, Some(ctx.cfg.action), ctx, registry, events);
        }
    }
}

fn crystallize(
    unit: Detector,
    name: String,
    action: Option<DetectorParams>,
    ctx: &LearnContext<'_>,
    registry: &mut Registry,
    events: &mut Vec<FieldEvent>,
) {
    let kind = unit.kind();
    if !registry.insert(unit, ctx.tick) {
        return;
    }
    debug!(tick = ctx.tick, %kind, structure = %name, "crystallized");
    events.push(FieldEvent::Crystallized {
        kind,
        name: name.clone(),
    });

    if let Some(params) = action {
        if registry.insert(Detector::action(&name, params), ctx.tick) {
            events.push(FieldEvent::ActionAttached {
                action: action_name(&name),
                target: name,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorKind;

    #[test]
    fn charge_crystallizes_once() {
        let mut t = ChargeTable::default();
        assert!(!t.add("1|2", 0.4));
        assert!(!t.add("1|2", 0.4));
        assert!(t.add("1|2", 0.4));
        assert!(t.is_crystallized("1|2"));
        assert!(!t.add("1|2", 5.0));
        assert_eq!(t.pending("1|2"), 0.0);
    }

    #[test]
    fn clearing_keeps_crystallized_marks() {
        let mut t = ChargeTable::default();
        t.add("a", 0.3);
        t.add("b", 1.0);
        t.clear_pending();
        assert_eq!(t.pending_len(), 0);
        assert_eq!(t.crystallized_len(), 1);
        assert!(t.is_crystallized("b"));
    }

    #[test]
    fn keys_follow_pattern_semantics() {
        assert_eq!(pair_key("2", "1"), pair_key("1", "2"));
        assert_ne!(sequence_key("2", "1"), sequence_key("1", "2"));
        assert_eq!(composition_key("[1-2]", "3"), "[1-2]||3");
    }

    fn observe(mem: &mut ShortTermMemory, token: &str) {
        mem.advance(12);
        mem.observe_token(token);
    }

    #[test]
    fn repeated_adjacency_grows_pair_and_sequence() {
        let cfg = FieldConfig::default();
        let mut mem = ShortTermMemory::new();
        let mut plastic = Plasticity::new();
        let mut reg = Registry::new();
        let mut events = Vec::new();
        let none = BTreeSet::new();

        for token in ["1", "2", "1", "2"] {
            observe(&mut mem, token);
            let ctx = LearnContext {
                cfg: &cfg,
                memory: &mem,
                prev_structures: &none,
                tick: mem.tick(),
                boost: 1.0,
            };
            plastic.learn_structures(&ctx, &mut reg, &mut events);
        }

        // three adjacencies: pair 1.2 (crystallized), each sequence below 1.0
        assert!(reg.contains("COACT:[1-2]"));
        assert!(!reg.contains("SEQ:(1>2)"));
        assert!((plastic.sequences.pending("1>2") - 0.9).abs() < 1e-5);
        assert_eq!(
            events,
            vec![FieldEvent::Crystallized {
                kind: DetectorKind::Pair,
                name: "[1-2]".to_string()
            }]
        );
    }

    #[test]
    fn composition_skips_pair_members_and_attaches_action() {
        let cfg = FieldConfig::default();
        let mut mem = ShortTermMemory::new();
        let mut plastic = Plasticity::new();
        let mut reg = Registry::new();
        let mut events = Vec::new();
        let prev: BTreeSet<String> = ["[1-2]".to_string(), "(1>2)".to_string()].into();

        for token in ["2", "3", "3", "3", "3"] {
            observe(&mut mem, token);
            let ctx = LearnContext {
                cfg: &cfg,
                memory: &mem,
                prev_structures: &prev,
                tick: mem.tick(),
                boost: 1.0,
            };
            plastic.learn_compositions(&ctx, token, &mut reg, &mut events);
        }

        assert!(reg.contains("COMPOSE:[[1-2]-3]"));
        assert!(reg.contains("ACTIONBLOCK:ACT_ON_[[1-2]-3]<-[[1-2]-3]"));
        assert_eq!(plastic.compositions.pending("[1-2]||2"), 0.0);
        assert_eq!(events.len(), 2);
    }
}
