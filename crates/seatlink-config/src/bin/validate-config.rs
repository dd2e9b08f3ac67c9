//! Config validation CLI tool
//!
//! Validates a seatlinkd configuration file and prints the effective settings.

use seatlink_config::{ConfigError, CURRENT_CONFIG_VERSION};
use seatlink_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a seatlinkd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match seatlink_config::load_config(&config_path) {
        Ok(config) => {
            let daemon = &config.daemon;
            println!("✓ Configuration is valid");
            println!();
            println!("Effective settings:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Socket path: {}", daemon.socket_path.display());
            println!("  Buffer size: {} bytes", daemon.buffer_size);
            println!("  Max clients: {}", daemon.max_clients);
            println!("  Rate limit: {} requests/s", daemon.rate_limit_per_second);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
