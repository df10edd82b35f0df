// navfuse_node/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// navfuse: map-aided vehicle localization node.
///
/// Runs the localization core against a synthetic drive described by a
/// scenario file and serves the estimate to a simulated client.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/default.toml")]
    pub config: PathBuf,

    /// Override the simulated drive length, in seconds.
    #[arg(short, long)]
    pub duration: Option<f64>,

    /// Override the scenario's random seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Tracing filter, e.g. `info,navfuse_core=trace`. Falls back to RUST_LOG.
    #[arg(long)]
    pub log_filter: Option<String>,

    /// External client query rate in Hz (0 disables the client).
    #[arg(long, default_value_t = 2.0)]
    pub query_rate: f64,

    /// Print the fully resolved configuration and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,
}
