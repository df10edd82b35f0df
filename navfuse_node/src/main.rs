// navfuse_node/src/main.rs

//! Runs the localization node against a synthetic drive.
//!
//! `cargo run -p navfuse_node -- --config navfuse_node/assets/scenarios/default.toml`

use clap::Parser;
use navfuse_node::cli::Cli;
use navfuse_node::{FusionNode, NodeConfig, NodeError, RunOptions};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,navfuse_node=info,navfuse_core=debug";

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("navfuse failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(filter: Option<&str>) {
    let filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn run(cli: &Cli) -> Result<(), NodeError> {
    // --- 1. Resolve configuration ---
    let mut config = NodeConfig::load(Some(&cli.config))?;
    if let Some(duration) = cli.duration {
        config.scenario.duration_s = duration;
    }
    if let Some(seed) = cli.seed {
        config.scenario.seed = Some(seed);
    }
    config.validate()?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // --- 2. Run ---
    let node = FusionNode::new(config);
    let summary = node.run(&RunOptions {
        query_rate_hz: cli.query_rate,
    })?;

    // --- 3. Report ---
    info!(
        seed = summary.seed,
        samples = summary.samples_published,
        processed = summary.fusion.processed,
        stale = summary.fusion.stale,
        published = summary.fusion.published,
        final_state = ?summary.fusion.final_state,
        "fusion finished"
    );
    info!(
        external = summary.arbiter.external_served,
        internal = summary.arbiter.internal_served,
        not_available = summary.arbiter.not_available,
        rejected = summary.arbiter.rejected,
        pushed = summary.estimates_received,
        map_refreshes = summary.map_refreshes,
        "arbiter finished"
    );
    match summary.final_position_error_m {
        Some(err) => info!(error_m = err, "final position error against truth"),
        None => info!("no estimate was ever published"),
    }
    Ok(())
}
