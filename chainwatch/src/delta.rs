//! Counter deltas between two snapshots
//!
//! [`diff`] walks every rule of the newer snapshot, looks up the same chain
//! and rule identity in the older one -- a missing rule counts as zero -- and
//! yields a [`Delta`] for each rule whose packets or bytes went up. Rules that
//! vanished are not reported.
//!
//! Counters normally only grow. When one shrinks, because the rules were
//! flushed or the counters zeroed, the [`CounterPolicy`] decides what the
//! delta is. The default, [`CounterPolicy::Raw`], subtracts with unsigned
//! wrap-around and so reports an enormous increase.

use std::{fmt, str::FromStr};

use serde::Deserialize;

use crate::snapshot::{RuleCounters, Snapshot};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
/// What to do with a counter that is lower than in the previous sample.
pub enum CounterPolicy {
    /// Wrapping subtraction. A decrease shows up as a very large delta.
    #[default]
    Raw,
    /// Saturating subtraction. A decrease counts as no traffic.
    Clamp,
    /// Do not report a rule whose packet or byte counter decreased.
    Ignore,
}

impl CounterPolicy {
    /// The `(packets, bytes)` delta from `older` to `newer`, `None` if the rule
    /// must not be reported.
    #[must_use]
    pub fn apply(self, older: RuleCounters, newer: RuleCounters) -> Option<(u64, u64)> {
        match self {
            CounterPolicy::Raw => Some((
                newer.packets.wrapping_sub(older.packets),
                newer.bytes.wrapping_sub(older.bytes),
            )),
            CounterPolicy::Clamp => Some((
                newer.packets.saturating_sub(older.packets),
                newer.bytes.saturating_sub(older.bytes),
            )),
            CounterPolicy::Ignore => Some((
                newer.packets.checked_sub(older.packets)?,
                newer.bytes.checked_sub(older.bytes)?,
            )),
        }
    }
}

impl fmt::Display for CounterPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CounterPolicy::Raw => "raw",
            CounterPolicy::Clamp => "clamp",
            CounterPolicy::Ignore => "ignore",
        };
        f.write_str(name)
    }
}

impl FromStr for CounterPolicy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "raw" => Ok(CounterPolicy::Raw),
            "clamp" => Ok(CounterPolicy::Clamp),
            "ignore" => Ok(CounterPolicy::Ignore),
            _ => Err(format!(
                "unknown counter policy '{input}', expected one of raw, clamp, ignore"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Traffic a single rule saw between two snapshots.
pub struct Delta {
    /// Name of the chain holding the rule
    pub chain: String,
    /// Rule identity, see [`crate::snapshot`]
    pub rule: String,
    /// Packet counter increase
    pub packets: u64,
    /// Byte counter increase
    pub bytes: u64,
}

impl fmt::Display for Delta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{packets}p {bytes}b | {chain} {rule}",
            packets = self.packets,
            bytes = self.bytes,
            chain = self.chain,
            rule = self.rule
        )
    }
}

/// Compute the deltas of every rule in `newer` that saw traffic since `older`.
///
/// The order of the returned deltas is unspecified.
#[must_use]
pub fn diff(older: &Snapshot, newer: &Snapshot, policy: CounterPolicy) -> Vec<Delta> {
    let mut deltas = Vec::new();
    for (name, chain) in newer.chains() {
        let previous = older.chain(name);
        for (rule, counters) in chain.rules() {
            let baseline = previous.and_then(|c| c.get(rule)).unwrap_or_default();
            let Some((packets, bytes)) = policy.apply(baseline, counters) else {
                continue;
            };
            if packets > 0 || bytes > 0 {
                deltas.push(Delta {
                    chain: name.to_string(),
                    rule: rule.to_string(),
                    packets,
                    bytes,
                });
            }
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ChainState;
    use proptest::prelude::*;
    use rustc_hash::FxHashSet;

    fn snapshot(rows: &[(&str, &str, u64, u64)]) -> Snapshot {
        let mut chains: Vec<(String, ChainState)> = Vec::new();
        for (name, rule, packets, bytes) in rows {
            let idx = match chains.iter().position(|(n, _)| n == name) {
                Some(idx) => idx,
                None => {
                    chains.push(((*name).to_string(), ChainState::new(None)));
                    chains.len() - 1
                }
            };
            chains[idx]
                .1
                .insert((*rule).to_string(), RuleCounters::new(*packets, *bytes));
        }
        chains.into_iter().collect()
    }

    fn delta(chain: &str, rule: &str, packets: u64, bytes: u64) -> Delta {
        Delta {
            chain: chain.to_string(),
            rule: rule.to_string(),
            packets,
            bytes,
        }
    }

    fn as_set(deltas: Vec<Delta>) -> FxHashSet<Delta> {
        deltas.into_iter().collect()
    }

    #[test]
    fn simple_increase() {
        let older = snapshot(&[("chainA", "ruleX", 10, 500)]);
        let newer = snapshot(&[("chainA", "ruleX", 15, 900)]);
        assert_eq!(
            diff(&older, &newer, CounterPolicy::Raw),
            vec![delta("chainA", "ruleX", 5, 400)]
        );
        assert_eq!(
            delta("chainA", "ruleX", 5, 400).to_string(),
            "5p 400b | chainA ruleX"
        );
    }

    #[test]
    fn zero_delta_is_suppressed() {
        let older = snapshot(&[("chainA", "ruleX", 10, 500), ("chainA", "ruleY", 1, 1)]);
        let newer = snapshot(&[("chainA", "ruleX", 10, 500), ("chainA", "ruleY", 2, 1)]);
        assert_eq!(
            diff(&older, &newer, CounterPolicy::Raw),
            vec![delta("chainA", "ruleY", 1, 0)]
        );
    }

    #[test]
    fn identical_snapshots_report_nothing() {
        let snap = snapshot(&[
            ("INPUT", "a", 1, 2),
            ("INPUT", "b", 3, 4),
            ("OUTPUT", "c", 5, 6),
        ]);
        for policy in [CounterPolicy::Raw, CounterPolicy::Clamp, CounterPolicy::Ignore] {
            assert!(diff(&snap, &snap, policy).is_empty());
        }
    }

    #[test]
    fn new_rule_and_new_chain_use_zero_baseline() {
        let older = snapshot(&[("INPUT", "old", 1, 1)]);
        let newer = snapshot(&[
            ("INPUT", "old", 1, 1),
            ("INPUT", "fresh", 3, 150),
            ("custom", "other", 0, 64),
        ]);
        assert_eq!(
            as_set(diff(&older, &newer, CounterPolicy::Raw)),
            as_set(vec![
                delta("INPUT", "fresh", 3, 150),
                delta("custom", "other", 0, 64),
            ])
        );
    }

    #[test]
    fn new_rule_with_zero_counters_is_not_reported() {
        let older = Snapshot::new();
        let newer = snapshot(&[("INPUT", "idle", 0, 0)]);
        assert!(diff(&older, &newer, CounterPolicy::Raw).is_empty());
    }

    #[test]
    fn deleted_rule_is_not_reported() {
        let first = snapshot(&[("INPUT", "gone", 10, 1000), ("INPUT", "kept", 1, 1)]);
        let second = snapshot(&[("INPUT", "kept", 2, 2)]);
        let third = snapshot(&[("INPUT", "kept", 3, 3)]);

        let deltas = diff(&first, &second, CounterPolicy::Raw);
        assert_eq!(deltas, vec![delta("INPUT", "kept", 1, 1)]);
        let deltas = diff(&second, &third, CounterPolicy::Raw);
        assert_eq!(deltas, vec![delta("INPUT", "kept", 1, 1)]);
        assert!(deltas.iter().all(|d| d.rule != "gone"));
    }

    #[test]
    fn deleted_chain_is_not_reported() {
        let older = snapshot(&[("INPUT", "a", 1, 1), ("custom", "b", 9, 9)]);
        let newer = snapshot(&[("INPUT", "a", 1, 1)]);
        assert!(diff(&older, &newer, CounterPolicy::Raw).is_empty());
    }

    #[test]
    fn raw_policy_wraps_on_reset() {
        let older = snapshot(&[("INPUT", "reset", 10, 500)]);
        let newer = snapshot(&[("INPUT", "reset", 4, 500)]);
        assert_eq!(
            diff(&older, &newer, CounterPolicy::Raw),
            vec![delta("INPUT", "reset", u64::MAX - 5, 0)]
        );
    }

    #[test]
    fn clamp_policy_floors_decreases_at_zero() {
        let older = snapshot(&[("INPUT", "reset", 10, 500), ("INPUT", "half", 10, 500)]);
        let newer = snapshot(&[("INPUT", "reset", 4, 200), ("INPUT", "half", 4, 700)]);
        assert_eq!(
            diff(&older, &newer, CounterPolicy::Clamp),
            vec![delta("INPUT", "half", 0, 200)]
        );
    }

    #[test]
    fn ignore_policy_drops_rules_with_any_decrease() {
        let older = snapshot(&[("INPUT", "half", 10, 500), ("INPUT", "up", 1, 1)]);
        let newer = snapshot(&[("INPUT", "half", 4, 700), ("INPUT", "up", 2, 2)]);
        assert_eq!(
            diff(&older, &newer, CounterPolicy::Ignore),
            vec![delta("INPUT", "up", 1, 1)]
        );
    }

    #[test]
    fn policy_names_round_trip() {
        for policy in [CounterPolicy::Raw, CounterPolicy::Clamp, CounterPolicy::Ignore] {
            assert_eq!(policy.to_string().parse::<CounterPolicy>(), Ok(policy));
        }
        assert!("wrap".parse::<CounterPolicy>().is_err());
        assert_eq!(CounterPolicy::default(), CounterPolicy::Raw);
    }

    proptest! {
        #[test]
        fn growth_is_reported_exactly(
            base in prop::collection::hash_map("[a-z]{1,6}", (0..1_000_000u64, 0..1_000_000u64), 0..16),
            growth in prop::collection::vec((0..1_000u64, 0..1_000u64), 16),
        ) {
            let mut older = ChainState::new(None);
            let mut newer = ChainState::new(None);
            let mut expected = FxHashSet::default();
            for ((rule, (p, b)), (dp, db)) in base.into_iter().zip(growth) {
                older.insert(rule.clone(), RuleCounters::new(p, b));
                newer.insert(rule.clone(), RuleCounters::new(p + dp, b + db));
                if dp > 0 || db > 0 {
                    expected.insert(delta("INPUT", &rule, dp, db));
                }
            }
            let older: Snapshot = [("INPUT".to_string(), older)].into_iter().collect();
            let newer: Snapshot = [("INPUT".to_string(), newer)].into_iter().collect();

            for policy in [CounterPolicy::Raw, CounterPolicy::Clamp, CounterPolicy::Ignore] {
                prop_assert_eq!(&as_set(diff(&older, &newer, policy)), &expected);
            }
        }
    }
}
