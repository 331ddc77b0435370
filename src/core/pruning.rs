//! Forgetting: structure producers that stayed silent too long and carry
//! no useful predictive knowledge are removed, together with the action
//! units attached to them.

use crate::config::FieldConfig;
use crate::detector::DetectorId;
use crate::registry::Registry;
use crate::signal::Tick;

/// Outcome of the most recent pruning pass that removed something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupRecord {
    pub tick: Tick,
    pub removed: usize,
}

pub(crate) fn is_due(cfg: &FieldConfig, tick: Tick) -> bool {
    cfg.forget_after > 0 && cfg.prune_every > 0 && tick % cfg.prune_every == 0
}

/// Pick the units to remove at `tick`.
///
/// Oldest (longest silent) candidates go first. Each structure brings its
/// attached actions along, and the whole set never exceeds
/// `max_prunes_per_pass` units.
pub(crate) fn select(
    registry: &Registry,
    cfg: &FieldConfig,
    tick: Tick,
    is_protected: impl Fn(&str) -> bool,
) -> Vec<DetectorId> {
    let mut candidates: Vec<(Tick, DetectorId, String)> = registry
        .ages()
        .filter(|(unit, _)| unit.kind().produces_structure())
        .filter_map(|(unit, last)| {
            let age = tick.saturating_sub(last);
            let structure = unit.structure()?;
            (age >= cfg.forget_after && !is_protected(structure))
                .then(|| (age, unit.id(), structure.to_string()))
        })
        .collect();

    // stable: equal ages keep registration order
    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let cap = cfg.max_prunes_per_pass;
    let mut doomed: Vec<DetectorId> = Vec::new();
    for (_, id, structure) in candidates {
        if doomed.len() >= cap {
            break;
        }
        let attached: Vec<DetectorId> = registry
            .iter()
            .filter(|unit| unit.action_target() == Some(structure.as_str()))
            .map(|unit| unit.id())
            .collect();
        // a structure goes only together with its actions
        if doomed.len() + 1 + attached.len() > cap {
            continue;
        }
        doomed.push(id);
        doomed.extend(attached);
    }
    doomed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Detector;

    #[test]
    fn due_only_on_schedule_and_when_enabled() {
        let cfg = FieldConfig::default();
        assert!(is_due(&cfg, 20));
        assert!(!is_due(&cfg, 21));
        assert!(!is_due(&cfg.clone().with_forgetting(0, 20), 20));
    }

    #[test]
    fn oldest_go_first_and_actions_follow() {
        let mut cfg = FieldConfig::default().with_forgetting(10, 5);
        cfg.max_prunes_per_pass = 3;

        let mut reg = Registry::new();
        reg.insert(Detector::sensor("1"), 0);
        reg.insert(Detector::pair("1", "2", cfg.pair), 5);
        reg.insert(Detector::sequence("1", "2", cfg.sequence), 1);
        reg.insert(Detector::action("(1>2)", cfg.action), 1);
        reg.insert(Detector::pair("3", "4", cfg.pair), 2);
        reg.insert(Detector::pair("5", "6", cfg.pair), 30);

        let ids = select(&reg, &cfg, 40, |_| false);
        assert_eq!(
            ids,
            vec![
                "SEQ:(1>2)".to_string(),
                "ACTIONBLOCK:ACT_ON_(1>2)<-(1>2)".to_string(),
                "COACT:[3-4]".to_string(),
            ]
        );
    }

    #[test]
    fn cap_counts_attached_actions() {
        let cfg = FieldConfig::default().with_forgetting(60, 60);
        let mut reg = Registry::new();
        for i in 0..9 {
            let (a, b) = (format!("s{i}"), format!("t{i}"));
            reg.insert(Detector::sequence(&a, &b, cfg.sequence), 0);
            reg.insert(Detector::action(&format!("({a}>{b})"), cfg.action), 0);
        }
        for i in 0..9 {
            reg.insert(Detector::pair(&format!("p{i}"), &format!("q{i}"), cfg.pair), 0);
        }

        let ids = select(&reg, &cfg, 120, |_| false);
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[0], "SEQ:(s0>t0)");
        assert_eq!(ids[1], "ACTIONBLOCK:ACT_ON_(s0>t0)<-(s0>t0)");
        // no structure is split from its action
        for id in ids.iter().filter(|id| id.starts_with("SEQ:")) {
            let name = &id["SEQ:".len()..];
            assert!(ids.contains(&format!("ACTIONBLOCK:ACT_ON_{name}<-{name}")));
        }

        // an odd budget skips a sequence+action that no longer fits and takes a pair
        let mut odd = cfg.clone();
        odd.max_prunes_per_pass = 5;
        let ids = select(&reg, &odd, 120, |_| false);
        assert_eq!(ids.len(), 5);
        assert_eq!(ids[4], "COACT:[p0-q0]");
    }

    #[test]
    fn protected_structures_survive() {
        let cfg = FieldConfig::default().with_forgetting(10, 5);
        let mut reg = Registry::new();
        reg.insert(Detector::pair("1", "2", cfg.pair), 0);
        reg.insert(Detector::pair("3", "4", cfg.pair), 0);

        let ids = select(&reg, &cfg, 50, |st| st == "[1-2]");
        assert_eq!(ids, vec!["COACT:[3-4]".to_string()]);
    }
}
