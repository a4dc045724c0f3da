//! mc-inspector - version 0.1.0
//!
//! Out-of-process inspector for a live memcached item store.
//! This is the main entry point that resolves configuration and dispatches subcommands.

mod cli;
mod commands;
mod config;
mod startup_checks;

use clap::Parser;
use tracing::{info, Level};

use cli::{Args, Commands, LogLevel};
use commands::{command_check, command_clean, command_config, command_inspect};
use config::{resolve_config, show_config, validate_effective_config, Config};

/// Initializes tracing logging subsystem with configured log level.
///
/// Logs go to stderr; stdout carries the aggregator report.
fn setup_logging(args: &Args) {
    let log_level = match args.log_level {
        LogLevel::Off => None,
        LogLevel::Error => Some(Level::ERROR),
        LogLevel::Warn => Some(Level::WARN),
        LogLevel::Info => Some(Level::INFO),
        LogLevel::Debug => Some(Level::DEBUG),
        LogLevel::Trace => Some(Level::TRACE),
    };
    let Some(log_level) = log_level else {
        return;
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    info!("Logging initialized with level: {:?}", args.log_level);
}

/// Helper function to load and validate configuration.
/// Exits the process with error code 1 if validation fails.
fn load_validated_config(args: &Args) -> anyhow::Result<Config> {
    let config = resolve_config(args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {:#}", e);
        std::process::exit(1);
    }
    Ok(config)
}

fn run(args: &Args) -> anyhow::Result<()> {
    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {:#}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, &args.config_format);
    }

    match &args.command {
        Some(Commands::Check { pid }) => {
            let config = resolve_config(args)?;
            command_check(*pid, &config)
        }
        Some(Commands::Config {
            output,
            format,
            commented,
        }) => command_config(output.clone(), format.clone(), *commented),
        Some(Commands::Clean {
            expired_keys_file,
            mc_port,
            clean_batch,
            sleep_interval,
        }) => command_clean(expired_keys_file, *mc_port, *clean_batch, *sleep_interval),
        None => {
            let config = load_validated_config(args)?;
            command_inspect(&config)
        }
    }
}

fn main() {
    let args = Args::parse();
    setup_logging(&args);

    if let Err(e) = run(&args) {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}
