//! Parser for the `iptables -L -n -v -x` table listing
//!
//! The listing is a sequence of chain blocks separated by empty lines:
//!
//! ```text
//! Chain INPUT (policy ACCEPT 5120 packets, 412003 bytes)
//!     pkts      bytes target     prot opt in     out     source               destination
//!      120    10080 ACCEPT     tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:22
//!
//! Chain DOCKER (1 references)
//!     pkts      bytes target     prot opt in     out     source               destination
//! ```
//!
//! Each block is a chain header, a column header and zero or more rule rows.
//! The parser is a three state machine over lines. Any line that does not fit
//! the state aborts the parse; there is no partial result. Counter text that
//! does not parse as a `u64` is read as zero.

use std::fmt;

use tracing::trace;

use crate::{
    fields,
    snapshot::{ChainHeader, ChainState, RuleCounters, Snapshot},
};

const CHAIN_MARKER: &str = "Chain ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The grammar element the parser was looking for when it gave up.
pub enum Expectation {
    /// A line starting with `Chain `
    ChainStart,
    /// A chain name after the `Chain ` marker
    ChainName,
    /// A column header starting `pkts bytes`
    HeaderLine,
    /// A rule row with at least the two counter columns
    RuleRow,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Expectation::ChainStart => "start of chain",
            Expectation::ChainName => "chain name",
            Expectation::HeaderLine => "header line",
            Expectation::RuleRow => "rule row",
        };
        f.write_str(msg)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors produced by [`parse`] and [`parse_lines`]
pub enum Error {
    /// The listing does not follow the chain block grammar
    #[error("malformed input on line {line}: expected {expected}")]
    MalformedInput {
        /// 1-based line number of the offending line
        line: usize,
        /// What the parser expected to find there
        expected: Expectation,
    },
}

enum State {
    AwaitChainHeader,
    AwaitColumnHeader {
        name: String,
        chain: ChainState,
    },
    AwaitRule {
        name: String,
        chain: ChainState,
        column_count: usize,
    },
}

/// Parse the complete text output of one tool invocation.
///
/// # Errors
///
/// Returns [`Error::MalformedInput`] if the text does not follow the listing
/// grammar.
pub fn parse(text: &str) -> Result<Snapshot, Error> {
    parse_lines(text.lines())
}

/// Parse the lines of one tool invocation, already split on line breaks.
///
/// An empty final line, as left by splitting text that ends in a newline, is
/// accepted in any state. It closes a chain that has not seen its column
/// header yet.
///
/// # Errors
///
/// Returns [`Error::MalformedInput`] if the lines do not follow the listing
/// grammar.
pub fn parse_lines<'a, I>(lines: I) -> Result<Snapshot, Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut snapshot = Snapshot::new();
    let mut state = State::AwaitChainHeader;
    let mut lines = lines.into_iter().enumerate().peekable();

    while let Some((idx, line)) = lines.next() {
        let line_no = idx + 1;
        if line.is_empty() && lines.peek().is_none() {
            break;
        }
        let malformed = |expected| Error::MalformedInput {
            line: line_no,
            expected,
        };

        state = match state {
            State::AwaitChainHeader => {
                let rest = line
                    .strip_prefix(CHAIN_MARKER)
                    .ok_or_else(|| malformed(Expectation::ChainStart))?;
                let (name, header) =
                    chain_header(rest).ok_or_else(|| malformed(Expectation::ChainName))?;
                trace!(chain = name, "chain header");
                State::AwaitColumnHeader {
                    name: name.to_string(),
                    chain: ChainState::new(header),
                }
            }
            State::AwaitColumnHeader { name, chain } => {
                let columns = fields::split(line, 0);
                match columns.as_slice() {
                    ["pkts", "bytes", ..] => State::AwaitRule {
                        name,
                        chain,
                        column_count: columns.len(),
                    },
                    _ => return Err(malformed(Expectation::HeaderLine)),
                }
            }
            State::AwaitRule {
                name,
                mut chain,
                column_count,
            } => {
                if line.is_empty() {
                    snapshot.insert(name, chain);
                    State::AwaitChainHeader
                } else {
                    let (identity, counters) = rule_row(line, column_count)
                        .ok_or_else(|| malformed(Expectation::RuleRow))?;
                    chain.insert(identity, counters);
                    State::AwaitRule {
                        name,
                        chain,
                        column_count,
                    }
                }
            }
        };
    }

    // Input may end inside a chain block, close it.
    match state {
        State::AwaitChainHeader => {}
        State::AwaitColumnHeader { name, chain } | State::AwaitRule { name, chain, .. } => {
            snapshot.insert(name, chain);
        }
    }

    Ok(snapshot)
}

/// Split the text after `Chain ` into the chain name and whatever the
/// parenthetical says about the chain.
fn chain_header(rest: &str) -> Option<(&str, Option<ChainHeader>)> {
    let (name, tail) = fields::split_with_rest(rest, 1);
    let name = *name.first()?;
    Some((name, tail.and_then(header_metadata)))
}

fn header_metadata(tail: &str) -> Option<ChainHeader> {
    let inner = tail.strip_prefix('(')?.strip_suffix(')')?;
    match fields::split(inner, 0).as_slice() {
        ["policy", target, packets, "packets,", bytes, "bytes"] => Some(ChainHeader::Policy {
            target: (*target).to_string(),
            counters: RuleCounters::new(packets.parse().ok()?, bytes.parse().ok()?),
        }),
        [count, "references"] => Some(ChainHeader::References(count.parse().ok()?)),
        _ => None,
    }
}

fn rule_row(line: &str, column_count: usize) -> Option<(String, RuleCounters)> {
    let (columns, rest) = fields::split_with_rest(line, column_count);
    let [packets, bytes, described @ ..] = columns.as_slice() else {
        return None;
    };

    let tail = rest.map(|r| fields::split(r, 0)).unwrap_or_default();
    let identity = described
        .iter()
        .chain(tail.iter())
        .copied()
        .collect::<Vec<&str>>()
        .join(" ");

    Some((identity, RuleCounters::new(counter(packets), counter(bytes))))
}

/// Counter text that is not plain decimal digits reads as zero.
fn counter(text: &str) -> u64 {
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    text.parse().unwrap_or_default()
}
