//! The chainwatch firewall counter monitor.
//!
//! This library supports the chainwatch binary found elsewhere in this
//! project. The binary samples the listing of an iptables table every few
//! seconds, parses it into a [`snapshot::Snapshot`] and reports every rule
//! whose packet or byte counters moved since the previous sample. Rules are
//! never modified, only read.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod delta;
pub mod fields;
pub mod parser;
pub mod sampler;
pub mod snapshot;
pub mod tool;
