// scanguard - Main Entry Point
//
// Command-line interface for the guarded scanner:
// - serve: HTTP scan service
// - scan:  one scan, report printed as JSON
// - check: validation only

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scanguard::config::Config;
use scanguard::scanner::Scanner;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

/// scanguard: guarded nmap invocation
#[derive(Parser, Debug)]
#[command(name = "scanguard")]
#[command(author = "scanguard Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Validate, run and decode nmap scans safely", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: ~/.config/scanguard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP scan service
    Serve {
        /// Address to bind
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a single scan and print the report as JSON
    Scan {
        /// Whitespace-separated targets (shell quoting allowed)
        #[arg(long, allow_hyphen_values = true)]
        targets: String,

        /// Scanner options, e.g. "-sV -p 80"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        options: String,

        /// Deadline in seconds
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
    /// Validate targets and options without scanning
    Check {
        /// Whitespace-separated targets (shell quoting allowed)
        #[arg(long, allow_hyphen_values = true)]
        targets: String,

        /// Scanner options, e.g. "-sV -p 80"
        #[arg(long, default_value = "", allow_hyphen_values = true)]
        options: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load configuration from {:?}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };

    scanguard::logging::init(&config.logging, args.verbose)?;
    debug!("Configuration: {:?}", config);

    match args.command {
        Commands::Serve { bind, port } => {
            serve(config, bind, port).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Scan {
            targets,
            options,
            timeout,
        } => {
            scan(&config, &targets, &options, timeout).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { targets, options } => {
            if check(&config, &targets, &options)? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn serve(mut config: Config, bind: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.validate()?;

    scanguard::server::serve(&config).await
}

async fn scan(config: &Config, targets: &str, options: &str, timeout: Option<u64>) -> Result<()> {
    let scanner = Scanner::from_config(&config.scanner).context("Invalid scanner configuration")?;

    let result = scanner
        .scan(targets, options, timeout.map(Duration::from_secs))
        .await
        .context("Scan failed")?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Print `valid` or `invalid`; true when valid
fn check(config: &Config, targets: &str, options: &str) -> Result<bool> {
    let scanner = Scanner::from_config(&config.scanner).context("Invalid scanner configuration")?;

    match scanner.prepare(targets, options) {
        Ok(command) => {
            info!(argv = ?command.argv(), "Input accepted");
            println!("valid");
            Ok(true)
        }
        Err(_) => {
            println!("invalid");
            Ok(false)
        }
    }
}
