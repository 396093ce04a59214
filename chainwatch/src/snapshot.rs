//! Point-in-time counter snapshot of a firewall table
//!
//! A [`Snapshot`] maps chain names to [`ChainState`], which in turn maps rule
//! identities to [`RuleCounters`]. A rule identity is the text of the rule row
//! after the two counter columns, words joined by single spaces. It is a
//! stable key across samples as long as the rule text does not change, but it
//! is not guaranteed unique: two identical rules in one chain share a key.
//!
//! Neither map carries an order. Iteration order is arbitrary and may differ
//! between two snapshots holding the same data.

use std::fmt;

use rustc_hash::FxHashMap;

/// Column header written by [`Snapshot`]'s `Display` implementation. Matches
/// the header of `iptables -L -n -v -x`.
pub const COLUMN_HEADER: &str = "    pkts      bytes target     prot opt in     out     source               destination";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
/// Packet and byte counters of a single rule.
pub struct RuleCounters {
    /// Packets matched by the rule
    pub packets: u64,
    /// Bytes matched by the rule
    pub bytes: u64,
}

impl RuleCounters {
    /// Create a new [`RuleCounters`]
    #[must_use]
    pub fn new(packets: u64, bytes: u64) -> Self {
        Self { packets, bytes }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What a chain header line says about its chain.
pub enum ChainHeader {
    /// Built-in chain with a default policy, `(policy ACCEPT 0 packets, 0 bytes)`
    Policy {
        /// Target applied to packets that fall off the end of the chain
        target: String,
        /// Counters of packets that hit the policy
        counters: RuleCounters,
    },
    /// User defined chain, `(2 references)`
    References(u64),
}

impl fmt::Display for ChainHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainHeader::Policy { target, counters } => write!(
                f,
                "(policy {target} {packets} packets, {bytes} bytes)",
                packets = counters.packets,
                bytes = counters.bytes
            ),
            ChainHeader::References(count) => write!(f, "({count} references)"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Rule counters of one chain, keyed by rule identity.
pub struct ChainState {
    header: Option<ChainHeader>,
    rules: FxHashMap<String, RuleCounters>,
}

impl ChainState {
    /// Create an empty [`ChainState`]
    #[must_use]
    pub fn new(header: Option<ChainHeader>) -> Self {
        Self {
            header,
            rules: FxHashMap::default(),
        }
    }

    /// Header metadata of this chain, if it was recognised
    #[must_use]
    pub fn header(&self) -> Option<&ChainHeader> {
        self.header.as_ref()
    }

    /// Store `counters` under `identity`, returning the counters it replaced.
    pub fn insert(&mut self, identity: String, counters: RuleCounters) -> Option<RuleCounters> {
        self.rules.insert(identity, counters)
    }

    /// Counters of the rule with `identity`
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<RuleCounters> {
        self.rules.get(identity).copied()
    }

    /// Iterate rules in arbitrary order
    pub fn rules(&self) -> impl Iterator<Item = (&str, RuleCounters)> {
        self.rules
            .iter()
            .map(|(identity, counters)| (identity.as_str(), *counters))
    }

    /// Number of distinct rule identities
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the chain has no rules
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, RuleCounters)> for ChainState {
    fn from_iter<T: IntoIterator<Item = (String, RuleCounters)>>(iter: T) -> Self {
        Self {
            header: None,
            rules: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// One parsed capture of a table, keyed by chain name.
pub struct Snapshot {
    chains: FxHashMap<String, ChainState>,
}

impl Snapshot {
    /// Create an empty [`Snapshot`]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `chain` under `name`, returning any chain it replaced.
    pub fn insert(&mut self, name: String, chain: ChainState) -> Option<ChainState> {
        self.chains.insert(name, chain)
    }

    /// The chain called `name`
    #[must_use]
    pub fn chain(&self, name: &str) -> Option<&ChainState> {
        self.chains.get(name)
    }

    /// Counters of one rule in one chain
    #[must_use]
    pub fn get(&self, chain: &str, identity: &str) -> Option<RuleCounters> {
        self.chain(chain).and_then(|c| c.get(identity))
    }

    /// Iterate chains in arbitrary order
    pub fn chains(&self) -> impl Iterator<Item = (&str, &ChainState)> {
        self.chains.iter().map(|(name, chain)| (name.as_str(), chain))
    }

    /// Number of chains
    #[must_use]
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Whether the snapshot holds no chains
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

impl FromIterator<(String, ChainState)> for Snapshot {
    fn from_iter<T: IntoIterator<Item = (String, ChainState)>>(iter: T) -> Self {
        Self {
            chains: iter.into_iter().collect(),
        }
    }
}

/// Renders the snapshot in the `iptables -L -n -v -x` layout, chains and
/// rules sorted by name so the output is stable.
impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.chains.keys().collect();
        names.sort_unstable();

        for (idx, name) in names.into_iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            let chain = &self.chains[name];
            match chain.header() {
                Some(header) => writeln!(f, "Chain {name} {header}")?,
                None => writeln!(f, "Chain {name}")?,
            }
            writeln!(f, "{COLUMN_HEADER}")?;

            let mut rules: Vec<(&str, RuleCounters)> = chain.rules().collect();
            rules.sort_unstable_by(|a, b| a.0.cmp(b.0));
            for (identity, counters) in rules {
                write!(f, "{:>8} {:>10}", counters.packets, counters.bytes)?;
                if identity.is_empty() {
                    writeln!(f)?;
                } else {
                    writeln!(f, " {identity}")?;
                }
            }
        }
        Ok(())
    }
}
