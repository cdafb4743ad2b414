mod command;
mod constants;
mod parser;
mod util;

use std::env;
use std::path::{Path, PathBuf};

use clap::Parser;
use constants::GpgmuxExitCode;
use gpgmux_core::config::loader::load_config;
use gpgmux_core::constants::env_variables::{CONFIG_PATH_ENV, LOG_LEVEL_VAR};
use gpgmux_core::util::log::{init_logger, parse_level, LogTarget};
use parser::CliParser;

use crate::constants::{default_config_path, DEFAULT_LOG_LEVEL};

fn main() {
    let level = env::var(LOG_LEVEL_VAR)
        .ok()
        .and_then(|value| parse_level(&value))
        .unwrap_or(DEFAULT_LOG_LEVEL);
    init_logger(LogTarget::Stderr, level);

    let cli_args = CliParser::parse();
    let config_path = cli_args
        .config
        .clone()
        .or_else(|| env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(default_config_path()));
    process_cli(&config_path, cli_args);
}

fn process_cli(config_path: &Path, cli_args: CliParser) {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config file '{}': {}", config_path.display(), e);
            std::process::exit(GpgmuxExitCode::ConfigError.into());
        }
    };

    if let Err((code, e)) = parser::handle_cli(config, cli_args) {
        eprintln!("{}", e);
        std::process::exit(code);
    }
}
