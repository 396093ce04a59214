use std::{net::SocketAddr, path::PathBuf};

use chainwatch::{
    config::{self, Config, Telemetry},
    delta::CounterPolicy,
    sampler::{self, Sampler},
    tool::Iptables,
};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{runtime::Builder, signal};
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Chainwatch configuration is invalid: {0}")]
    Config(#[from] config::Error),
    #[error("Chainwatch sampler returned an error: {0}")]
    Sampler(#[from] sampler::Error),
    #[error("Failed to install prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// the table to list, e.g. filter or nat; the tool's default table when
    /// omitted or empty
    table: Option<String>,
    /// path on disk to an optional configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
    /// how to report counters that went down: raw, clamp or ignore
    #[clap(long)]
    counter_policy: Option<CounterPolicy>,
    /// log a failed sample and wait for the next one instead of exiting
    #[clap(long)]
    no_fail_fast: bool,
    /// address to bind prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<SocketAddr>,
}

fn get_config(cli: &Cli) -> Result<Config, Error> {
    let mut config = if let Some(path) = &cli.config_path {
        debug!("Attempting to open configuration file at: {}", path.display());
        Config::load(path).map_err(|err| {
            error!("Configuration validation failed: {}", err);
            err
        })?
    } else {
        Config::default()
    };

    if let Some(table) = &cli.table {
        config.table = Some(table.clone());
    }
    if let Some(policy) = cli.counter_policy {
        config.counter_policy = policy;
    }
    if cli.no_fail_fast {
        config.fail_fast = false;
    }
    if let Some(addr) = cli.prometheus_addr {
        let global_labels = config
            .telemetry
            .take()
            .map(|telemetry| telemetry.global_labels)
            .unwrap_or_default();
        config.telemetry = Some(Telemetry {
            addr,
            global_labels,
        });
    }
    Ok(config)
}

async fn inner_main(config: Config) -> Result<(), Error> {
    if let Some(telemetry) = config.telemetry {
        let mut builder = PrometheusBuilder::new().with_http_listener(telemetry.addr);
        for (k, v) in telemetry.global_labels {
            builder = builder.add_global_label(k, v);
        }
        builder.install()?;
        info!("Prometheus exporter listening on {}", telemetry.addr);
    }

    let source = Iptables::new(config.command, config.table);
    let sampler = Sampler::new(source, config.counter_policy, config.fail_fast);

    tokio::select! {
        res = sampler.run() => {
            res?;
            Ok(())
        }
        _ = signal::ctrl_c() => {
            info!("received ctrl-c");
            Ok(())
        }
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting chainwatch {version}.");

    let cli = Cli::parse();
    let config = get_config(&cli)?;

    // One sample at a time, nothing here benefits from more threads.
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let res = runtime.block_on(inner_main(config));
    if let Err(err) = &res {
        error!("{err}");
    }
    res
}
