use core::fmt;
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::detector::DetectorKind;
use crate::field::Field;
use crate::report::{EpisodeReport, FieldEvent};

const LAST_N: usize = 5;
const TOP_INHIBITIONS: usize = 6;
const TOP_EXPECTATIONS: usize = 8;

/// A read-only snapshot of the field after an episode.
///
/// Observers never mutate the field. Snapshots allocate; the tick loop
/// does not.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldSnapshot {
    pub tick: u64,
    pub training: bool,
    pub pairs: usize,
    pub sequences: usize,
    pub compositions: usize,
    pub action_links: usize,
    pub detectors: usize,
    pub energy: f32,
    pub energy_max: f32,
    pub energy_spent_episode: f32,
    pub last_pairs: Vec<String>,
    pub last_sequences: Vec<String>,
    pub last_compositions: Vec<String>,
    /// Armed at the start of the last tick: (structure, token, confidence).
    pub armed: Vec<(String, String, f32)>,
    /// Confident published predictions, by structure name.
    pub expectations: Vec<(String, String, f32)>,
    /// Strongest inhibitions first.
    pub inhibitions: Vec<(String, f32)>,
    pub error_boost_ttl: u32,
    /// (tick, removed) of the last pruning pass.
    pub last_cleanup: Option<(u64, usize)>,
}

pub struct FieldAdapter<'a> {
    field: &'a Field,
}

impl<'a> FieldAdapter<'a> {
    pub fn new(field: &'a Field) -> Self {
        Self { field }
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        let f = self.field;
        let reg = f.registry();
        let cfg = f.config();

        let mut inhibitions: Vec<(String, f32)> =
            f.inhibitions().map(|(k, v)| (k.to_string(), v)).collect();
        inhibitions.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        inhibitions.truncate(TOP_INHIBITIONS);

        let expectations = f
            .model()
            .predictions()
            .filter(|(_, _, c)| *c >= cfg.weak_pulse_min_confidence)
            .take(TOP_EXPECTATIONS)
            .map(|(st, tok, c)| (st.to_string(), tok.to_string(), c))
            .collect();

        FieldSnapshot {
            tick: f.tick(),
            training: f.modes().learning_enabled,
            pairs: reg.count(DetectorKind::Pair),
            sequences: reg.count(DetectorKind::Sequence),
            compositions: reg.count(DetectorKind::Composition),
            action_links: reg.count(DetectorKind::Action),
            detectors: reg.len(),
            energy: f.energy().level(),
            energy_max: f.energy().max(),
            energy_spent_episode: f.energy().spent_episode(),
            last_pairs: reg.latest_structures(DetectorKind::Pair, LAST_N),
            last_sequences: reg.latest_structures(DetectorKind::Sequence, LAST_N),
            last_compositions: reg.latest_structures(DetectorKind::Composition, LAST_N),
            armed: f
                .last_armed()
                .iter()
                .map(|a| (a.structure.clone(), a.token.clone(), a.confidence))
                .collect(),
            expectations,
            inhibitions,
            error_boost_ttl: f.error_boost_remaining(),
            last_cleanup: f.last_cleanup().map(|c| (c.tick, c.removed)),
        }
    }
}

/// Presentation-only view: hide everything that is not a simple pair.
/// The field itself keeps learning and competing over all structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoardFilter {
    pub pairs_only: bool,
}

impl BoardFilter {
    pub fn keeps(&self, structure: &str) -> bool {
        !self.pairs_only || (structure.starts_with('[') && structure.ends_with(']'))
    }
}

/// End-of-episode board: field snapshot plus what happened in the episode.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Board {
    pub snapshot: FieldSnapshot,
    pub structures: Vec<String>,
    pub actions: Vec<String>,
    pub errors: Vec<String>,
    pub training: Vec<String>,
    /// Inhibition of the structures that mispredicted this episode.
    pub suppressed: Vec<(String, f32)>,
    pub pairs_only: bool,
}

impl Board {
    pub fn build(field: &Field, episode: &EpisodeReport, filter: BoardFilter) -> Self {
        let mut snapshot = FieldAdapter::new(field).snapshot();
        if filter.pairs_only {
            snapshot.last_sequences.clear();
            snapshot.armed.retain(|(st, _, _)| filter.keeps(st));
            snapshot.expectations.retain(|(st, _, _)| filter.keeps(st));
        }

        let structures: BTreeSet<String> = episode
            .structures_fired
            .iter()
            .filter(|st| filter.keeps(st))
            .cloned()
            .collect();
        let actions: BTreeSet<String> = episode.actions_fired.iter().cloned().collect();

        let errors = unique_in_order(
            episode
                .errors
                .iter()
                .filter(|e| filter.keeps(error_structure(e))),
        );

        // learned first, then attached actions
        let mut growth: Vec<&FieldEvent> = episode.events().filter(|e| e.is_growth()).collect();
        growth.sort_by_key(|e| !matches!(e, FieldEvent::Crystallized { .. }));
        let growth: Vec<String> = growth.iter().map(ToString::to_string).collect();
        let training = unique_in_order(growth.iter());

        let mut seen = BTreeSet::new();
        let suppressed = errors
            .iter()
            .map(|e| error_structure(e))
            .filter(|st| seen.insert(st.to_string()))
            .map(|st| (st.to_string(), field.inhibition(st)))
            .collect();

        Self {
            snapshot,
            structures: structures.into_iter().collect(),
            actions: actions.into_iter().collect(),
            errors,
            training,
            suppressed,
            pairs_only: filter.pairs_only,
        }
    }
}

/// Structure part of an error value `"<structure>:<expected>-><actual>"`.
fn error_structure(error: &str) -> &str {
    error.split_once(':').map_or(error, |(st, _)| st)
}

fn unique_in_order<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: BTreeSet<&String> = BTreeSet::new();
    items.filter(|s| seen.insert(*s)).cloned().collect()
}

fn list<T: fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_string();
    }
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(" "))
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.snapshot;
        let mode = if s.training { "TRAIN" } else { "TEST" };
        writeln!(f, "=== BOARD t={:03} mode={} ===", s.tick, mode)?;
        if self.pairs_only {
            writeln!(
                f,
                "LEARNED: pairs={} composes={} actionLinks={} blocks={}",
                s.pairs, s.compositions, s.action_links, s.detectors
            )?;
        } else {
            writeln!(
                f,
                "LEARNED: pairs={} seqs={} composes={} actionLinks={} blocks={}",
                s.pairs, s.sequences, s.compositions, s.action_links, s.detectors
            )?;
        }
        writeln!(f, "FIELD: energy={:.2}/{:.2}", s.energy, s.energy_max)?;
        writeln!(f, "FIELD: energy_spent_episode={:.2}", s.energy_spent_episode)?;
        if let Some((tick, removed)) = s.last_cleanup {
            writeln!(f, "SELF-CLEANUP: pruned={removed} inactive blocks at t={tick}")?;
        }
        if !s.last_pairs.is_empty() {
            writeln!(f, "LAST PAIRS:   {}", list(&s.last_pairs))?;
        }
        if !s.last_sequences.is_empty() {
            writeln!(f, "LAST SEQ:     {}", list(&s.last_sequences))?;
        }
        if !s.last_compositions.is_empty() {
            writeln!(f, "LAST COMPOSE: {}", list(&s.last_compositions))?;
        }

        writeln!(f, "EPISODE: structs={}", list(&self.structures))?;
        writeln!(f, "EPISODE: actions={}", list(&self.actions))?;
        writeln!(f, "EPISODE: errors={}", list(&self.errors))?;
        if !self.training.is_empty() {
            writeln!(f, "TRAINING: events={} {}", self.training.len(), list(&self.training))?;
        }

        let armed: Vec<String> = s
            .armed
            .iter()
            .map(|(st, tok, c)| format!("{st}=>{tok}({c:.2})"))
            .collect();
        writeln!(f, "FIELD: armed expectations={}", list(&armed))?;
        let all: Vec<String> = s
            .expectations
            .iter()
            .map(|(st, tok, c)| format!("{st}=>{tok}({c:.2})"))
            .collect();
        writeln!(f, "FIELD: all expectations={}", list(&all))?;

        let inhib: Vec<String> = s
            .inhibitions
            .iter()
            .map(|(st, v)| format!("{st}:{v:.2}"))
            .collect();
        writeln!(f, "FIELD: inhib={}", list(&inhib))?;
        if !self.suppressed.is_empty() {
            let supp: Vec<String> = self
                .suppressed
                .iter()
                .map(|(st, v)| format!("{st}:{v:.2}"))
                .collect();
            writeln!(f, "FIELD: suppressed={}", list(&supp))?;
        }

        if s.error_boost_ttl > 0 {
            write!(f, "LEARNING: error-boost=ON ttl={}", s.error_boost_ttl)
        } else {
            write!(f, "LEARNING: error-boost=OFF")
        }
    }
}
