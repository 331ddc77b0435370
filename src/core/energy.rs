//! Bounded energy budget. Actions and competition winners pay from it;
//! it regenerates a fixed amount each tick.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EnergyBudget {
    level: f32,
    max: f32,
    regen: f32,
    spent_episode: f32,
}

impl EnergyBudget {
    /// Starts full.
    pub fn new(max: f32, regen: f32) -> Self {
        Self {
            level: max,
            max,
            regen,
            spent_episode: 0.0,
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Energy spent since the last episode boundary.
    pub fn spent_episode(&self) -> f32 {
        self.spent_episode
    }

    pub(crate) fn regenerate(&mut self) {
        self.level = (self.level + self.regen).min(self.max);
    }

    /// Pay `cost` if affordable. Never goes below zero.
    pub(crate) fn try_spend(&mut self, cost: f32) -> bool {
        if self.level < cost {
            return false;
        }
        self.level -= cost;
        self.spent_episode += cost;
        true
    }

    pub(crate) fn reset_episode(&mut self) {
        self.spent_episode = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_within_bounds() {
        let mut e = EnergyBudget::new(1.0, 0.8);
        assert!(e.try_spend(0.6));
        assert!(!e.try_spend(0.6));
        assert!((e.level() - 0.4).abs() < 1e-6);
        e.regenerate();
        e.regenerate();
        assert_eq!(e.level(), 1.0);
        assert!((e.spent_episode() - 0.6).abs() < 1e-6);
        e.reset_episode();
        assert_eq!(e.spent_episode(), 0.0);
    }
}
