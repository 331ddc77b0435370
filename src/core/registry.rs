//! Detector arena keyed by identity, with a stable insertion order.
//!
//! All cross references (action targets, bookkeeping) go through identity
//! strings, so removing an entry never leaves anything dangling.

use hashbrown::HashMap;

use crate::detector::{Detector, DetectorId, DetectorKind};
use crate::memory::ShortTermMemory;
use crate::signal::{Signal, Tick};

#[derive(Debug, Clone, Default)]
pub struct Registry {
    units: HashMap<DetectorId, Detector>,
    order: Vec<DetectorId>,
    last_fired: HashMap<DetectorId, Tick>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit once. Returns false if the identity already exists.
    /// A new unit starts life as "recently fired" so it is not pruned at once.
    pub fn insert(&mut self, unit: Detector, tick: Tick) -> bool {
        let id = unit.id();
        if self.units.contains_key(&id) {
            return false;
        }
        self.order.push(id.clone());
        self.last_fired.insert(id.clone(), tick);
        self.units.insert(id, unit);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Detector> {
        self.units.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Units in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Detector> + '_ {
        self.order.iter().filter_map(|id| self.units.get(id))
    }

    pub fn count(&self, kind: DetectorKind) -> usize {
        self.iter().filter(|d| d.kind() == kind).count()
    }

    /// Names of the most recently registered structures of `kind`, oldest first.
    pub fn latest_structures(&self, kind: DetectorKind, n: usize) -> Vec<String> {
        let mut found: Vec<String> = self
            .order
            .iter()
            .rev()
            .filter_map(|id| self.units.get(id))
            .filter(|d| d.kind() == kind)
            .filter_map(|d| d.structure().map(str::to_string))
            .take(n)
            .collect();
        found.reverse();
        found
    }

    pub fn last_fired(&self, id: &str) -> Option<Tick> {
        self.last_fired.get(id).copied()
    }

    pub(crate) fn touch(&mut self, id: &str, tick: Tick) {
        if let Some(t) = self.last_fired.get_mut(id) {
            *t = tick;
        }
    }

    /// Broadcast one signal to every unit in insertion order.
    pub(crate) fn broadcast(&mut self, signal: &Signal, mem: &ShortTermMemory, out: &mut Vec<Signal>) {
        for id in &self.order {
            if let Some(unit) = self.units.get_mut(id) {
                out.extend(unit.react(signal, mem));
            }
        }
    }

    /// Run every unit's passive decay in insertion order.
    pub(crate) fn decay_all(&mut self, mem: &ShortTermMemory) -> Vec<Signal> {
        let mut out = Vec::new();
        for id in &self.order {
            if let Some(unit) = self.units.get_mut(id) {
                out.extend(unit.decay_tick(mem));
            }
        }
        out
    }

    /// Remove units by identity from the arena, the order and the bookkeeping.
    pub(crate) fn remove_all(&mut self, ids: &[DetectorId]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.units.remove(id).is_some() {
                removed += 1;
            }
            self.last_fired.remove(id);
        }
        self.order.retain(|id| self.units.contains_key(id));
        removed
    }

    /// Identity → last-fired pairs in insertion order.
    pub(crate) fn ages(&self) -> impl Iterator<Item = (&Detector, Tick)> + '_ {
        self.iter()
            .map(|d| (d, self.last_fired.get(&d.id()).copied().unwrap_or(0)))
    }
}
