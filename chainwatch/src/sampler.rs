//! The sampling loop
//!
//! The [`Sampler`] captures a baseline snapshot, then repeatedly captures a
//! new snapshot, reports the rules that saw traffic since the previous one and
//! sleeps for [`SAMPLE_PERIOD`]. Only the previous snapshot is kept, passed
//! from one iteration to the next.
//!
//! A failed capture or parse ends the loop. If the sampler was built without
//! fail-fast the failed sample is logged and skipped instead, the previous
//! snapshot remaining the baseline for the next one. Failures are never
//! retried within a sample.

use std::time::Duration;

use metrics::counter;
use tracing::{debug, error, info};

use crate::{
    delta::{self, CounterPolicy, Delta},
    parser,
    snapshot::Snapshot,
    tool::{self, Source},
};

/// Time between the end of one sample and the start of the next.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(2);

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Sampler`]
pub enum Error {
    /// See [`crate::tool::Error`] for details.
    #[error("listing tool failed: {0}")]
    Tool(#[from] tool::Error),
    /// See [`crate::parser::Error`] for details.
    #[error("listing could not be parsed: {0}")]
    Parse(#[from] parser::Error),
}

#[derive(Debug)]
/// Periodically samples a [`Source`] and reports counter deltas.
pub struct Sampler<S> {
    source: S,
    policy: CounterPolicy,
    fail_fast: bool,
}

impl<S> Sampler<S>
where
    S: Source,
{
    /// Create a new [`Sampler`] instance
    #[must_use]
    pub fn new(source: S, policy: CounterPolicy, fail_fast: bool) -> Self {
        Self {
            source,
            policy,
            fail_fast,
        }
    }

    /// Capture and parse one listing.
    ///
    /// # Errors
    ///
    /// Function will return an error if the source fails or its output does not
    /// parse.
    pub async fn capture(&mut self) -> Result<Snapshot, Error> {
        let text = self.source.capture().await?;
        let snapshot = parser::parse(&text)?;
        debug!(chains = snapshot.len(), "captured snapshot");
        Ok(snapshot)
    }

    /// Capture a new snapshot and diff it against `previous`.
    ///
    /// # Errors
    ///
    /// See [`Sampler::capture`].
    pub async fn step(&mut self, previous: &Snapshot) -> Result<(Snapshot, Vec<Delta>), Error> {
        let current = self.capture().await?;
        let deltas = delta::diff(previous, &current, self.policy);
        Ok((current, deltas))
    }

    /// Take one sample, report it and return the baseline for the next one.
    ///
    /// On success the new snapshot is returned. On failure without fail-fast
    /// the failure is logged and `previous` is handed back unchanged.
    ///
    /// # Errors
    ///
    /// With fail-fast, any error of [`Sampler::step`].
    pub async fn advance(&mut self, previous: Snapshot) -> Result<Snapshot, Error> {
        match self.step(&previous).await {
            Ok((current, deltas)) => {
                report(&deltas);
                counter!("chainwatch.samples").increment(1);
                Ok(current)
            }
            Err(err) if self.fail_fast => Err(err),
            Err(err) => {
                error!("sample failed, keeping previous baseline: {err}");
                counter!("chainwatch.sample_failures").increment(1);
                Ok(previous)
            }
        }
    }

    /// Run this [`Sampler`] until it fails
    ///
    /// The baseline capture always fails fast, there is nothing to compare
    /// against without it.
    ///
    /// # Errors
    ///
    /// Function will return an error if the baseline capture fails or, with
    /// fail-fast, if any later sample fails.
    pub async fn run(mut self) -> Result<(), Error> {
        info!(
            policy = %self.policy,
            fail_fast = self.fail_fast,
            "capturing baseline"
        );
        let mut previous = self.capture().await?;
        loop {
            previous = self.advance(previous).await?;
            tokio::time::sleep(SAMPLE_PERIOD).await;
        }
    }
}

/// Log every delta and add it to the per-chain rule counters. The rule
/// identity is only logged, a label per rule text would leave one exporter
/// series behind for every rule that ever existed.
fn report(deltas: &[Delta]) {
    for delta in deltas {
        info!(
            chain = %delta.chain,
            rule = %delta.rule,
            packets = delta.packets,
            bytes = delta.bytes,
            "{delta}"
        );
        let labels = vec![(String::from("chain"), delta.chain.clone())];
        counter!("chainwatch.rule.packets", &labels).increment(delta.packets);
        counter!("chainwatch.rule.bytes", &labels).increment(delta.bytes);
    }
}
