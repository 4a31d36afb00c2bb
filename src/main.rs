//! Refresh - live-update coordination for development builds.

#![allow(dead_code)]

mod actor;
mod cli;
mod client;
mod config;
mod core;
mod logger;
mod reload;
mod utils;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::RefreshConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    match &cli.command {
        Commands::Serve { address, port } => {
            let mut config = RefreshConfig::load(&cli.config)?;
            config.apply_overrides(address.clone(), *port);
            config.validate()?;
            cli::serve::run_serve(config)
        }
        Commands::Listen { args } => cli::listen::run_listen(args),
    }
}
