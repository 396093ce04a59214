//! This module controls configuration parsing from the end user. Every field
//! has a default and with no configuration at all chainwatch lists the default
//! table with `iptables`, reports raw deltas and exits on the first failure.
//! Command line arguments override what is read here.

use std::{
    fs, io,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{delta::CounterPolicy, tool};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
}

fn default_command() -> PathBuf {
    PathBuf::from(tool::DEFAULT_COMMAND)
}

fn default_fail_fast() -> bool {
    true
}

/// Main configuration struct for this program
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The listing tool to run
    #[serde(default = "default_command")]
    pub command: PathBuf,
    /// The table to list, the tool's default table if absent
    #[serde(default)]
    pub table: Option<String>,
    /// How counter decreases are reported
    #[serde(default)]
    pub counter_policy: CounterPolicy,
    /// Whether a failed sample ends the program
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    /// Where to expose chainwatch's own metrics, if anywhere
    #[serde(default)]
    pub telemetry: Option<Telemetry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command: default_command(),
            table: None,
            counter_policy: CounterPolicy::default(),
            fail_fast: default_fail_fast(),
            telemetry: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
/// Prometheus exposition of the delta counters.
pub struct Telemetry {
    /// Address and port for prometheus exporter
    pub addr: SocketAddr,
    /// Additional labels to include in every metric
    #[serde(default)]
    pub global_labels: FxHashMap<String, String>,
}

impl Config {
    /// Parse a [`Config`] from YAML text. An empty document is the default
    /// configuration.
    ///
    /// # Errors
    ///
    /// Function will error if the text is not valid YAML or does not describe
    /// a [`Config`].
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load a [`Config`] from a YAML file on disk.
    ///
    /// # Errors
    ///
    /// Function will error if the file cannot be read or does not parse, see
    /// [`Config::from_yaml`].
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source: Box::new(source),
        })?;
        Self::from_yaml(&contents)
    }
}
