//! Resonance CLI - Audio Resonance Engine
//!
//! Command-line interface for decoding, rendering and inspecting speech
//! played through the resonance chain.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use resonance::cli::commands;
use resonance::cli::{Cli, Commands};
use resonance::EngineConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise info, or debug with --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("Resonance v{}", env!("CARGO_PKG_VERSION"));

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Some(cmd) => handle_command(config, cmd),
        None => {
            println!("Resonance v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(config: EngineConfig, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Decode { payload, output } => commands::decode(&config, &payload, &output),
        Commands::Render {
            input,
            output,
            target,
            drone,
            offset,
            seed,
        } => commands::render(config, &input, &output, &target, drone, offset, seed),
        Commands::Cue {
            cue,
            output,
            sample_rate,
        } => commands::cue(&cue, &output, sample_rate),
        Commands::Inspect { input, target } => commands::inspect(&config, &input, &target),
    }
}
