//! Short-term field memory: token adjacency plus time-bounded windows of
//! recent activation and structure signals.

use std::collections::VecDeque;

use crate::signal::{Signal, SignalKind, Tick};

#[derive(Debug, Clone, Default)]
pub struct ShortTermMemory {
    tick: Tick,
    prev_token: Option<String>,
    last_token: Option<String>,
    activations: VecDeque<Signal>,
    structures: VecDeque<Signal>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    /// Advance to the next tick and drop window entries older than `max_age` ticks.
    pub(crate) fn advance(&mut self, max_age: u64) -> Tick {
        self.tick = self.tick.wrapping_add(1);
        let cutoff = self.tick.saturating_sub(max_age);
        while self.activations.front().is_some_and(|s| s.tick < cutoff) {
            self.activations.pop_front();
        }
        while self.structures.front().is_some_and(|s| s.tick < cutoff) {
            self.structures.pop_front();
        }
        self.tick
    }

    /// Shift the adjacency memory: last-seen becomes previous-seen.
    pub(crate) fn observe_token(&mut self, token: &str) {
        self.prev_token = self.last_token.take();
        self.last_token = Some(token.to_string());
    }

    pub fn prev_token(&self) -> Option<&str> {
        self.prev_token.as_deref()
    }

    pub fn last_token(&self) -> Option<&str> {
        self.last_token.as_deref()
    }

    /// The two most recent distinct-or-not tokens, oldest first.
    pub fn adjacent_tokens(&self) -> Option<(&str, &str)> {
        Some((self.prev_token.as_deref()?, self.last_token.as_deref()?))
    }

    pub(crate) fn record(&mut self, signal: &Signal) {
        match signal.kind {
            SignalKind::Activation => self.activations.push_back(signal.clone()),
            SignalKind::Structure => self.structures.push_back(signal.clone()),
            _ => {}
        }
    }

    /// Tick of the most recent activation of `value` no older than `window` ticks.
    pub fn recent_activation(&self, value: &str, window: u64) -> Option<Tick> {
        latest_within(&self.activations, value, self.tick.saturating_sub(window))
    }

    /// Tick of the most recent structure signal `value` no older than `window` ticks.
    pub fn recent_structure(&self, value: &str, window: u64) -> Option<Tick> {
        latest_within(&self.structures, value, self.tick.saturating_sub(window))
    }

    pub fn activation_window_len(&self) -> usize {
        self.activations.len()
    }

    pub fn structure_window_len(&self) -> usize {
        self.structures.len()
    }

    /// Forget adjacency and windows; the tick counter keeps running.
    pub(crate) fn clear(&mut self) {
        self.prev_token = None;
        self.last_token = None;
        self.activations.clear();
        self.structures.clear();
    }
}

fn latest_within(window: &VecDeque<Signal>, value: &str, since: Tick) -> Option<Tick> {
    window
        .iter()
        .rev()
        .take_while(|s| s.tick >= since)
        .find(|s| s.value == value)
        .map(|s| s.tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Origin;

    fn act(value: &str, tick: Tick) -> Signal {
        Signal::new(SignalKind::Activation, value, 1.0, tick, Origin::External)
    }

    #[test]
    fn windows_are_trimmed_by_age() {
        let mut mem = ShortTermMemory::new();
        for _ in 0..3 {
            let t = mem.advance(2);
            mem.record(&act("x", t));
        }
        assert_eq!(mem.activation_window_len(), 3);

        mem.advance(2);
        mem.advance(2);
        // tick 5, cutoff 3: only the activation from tick 3 survives
        assert_eq!(mem.activation_window_len(), 1);
    }

    #[test]
    fn lookback_respects_window() {
        let mut mem = ShortTermMemory::new();
        let t1 = mem.advance(12);
        mem.record(&act("a", t1));
        mem.advance(12);
        mem.advance(12);
        mem.advance(12);

        assert_eq!(mem.recent_activation("a", 3), Some(1));
        assert_eq!(mem.recent_activation("a", 2), None);
        assert_eq!(mem.recent_structure("a", 3), None);
    }

    #[test]
    fn adjacency_shifts() {
        let mut mem = ShortTermMemory::new();
        mem.observe_token("1");
        assert_eq!(mem.adjacent_tokens(), None);
        mem.observe_token("2");
        assert_eq!(mem.adjacent_tokens(), Some(("1", "2")));

        mem.clear();
        assert_eq!(mem.last_token(), None);
    }
}
