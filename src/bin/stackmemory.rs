//! StackMemory CLI Binary
//!
//! Command-line interface over the context memory engine, used by session
//! hooks to capture context, manage frames, and rehydrate after compaction.

use anyhow::Context;
use clap::Parser;
use stackmemory::cli::{exit_code, map_error, Cli, RunContext};
use stackmemory::config::ConfigLoader;
use stackmemory::error::ApiError;
use stackmemory::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let (logging_config, default_log_file) = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config), default_log_file) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("stackmemory starting");

    let context = match RunContext::new(cli.project.clone(), cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error opening project store: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(exit_code(&e));
        }
    }
}

/// Build logging configuration from CLI args and config files.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> (LoggingConfig, Option<std::path::PathBuf>) {
    let loaded = load_config(cli);
    if let Err(e) = &loaded {
        eprintln!("warning: {:#}", e);
    }
    let (mut config, default_file) = match loaded {
        Ok(c) => {
            let default_file = c
                .storage
                .data_dir()
                .ok()
                .map(|dir| dir.join("stackmemory.log"));
            (c.logging, default_file)
        }
        Err(_) => (LoggingConfig::default(), None),
    };

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    (config, default_file)
}

fn load_config(cli: &Cli) -> anyhow::Result<stackmemory::config::StackConfig> {
    let result: Result<_, ApiError> = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.project),
    };
    result.with_context(|| "configuration could not be loaded; using logging defaults")
}
