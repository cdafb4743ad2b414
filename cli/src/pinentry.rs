//! Pinentry program for agents started by gpgmux. Answers passphrase prompts
//! from the JSON map in `PINENTRY_USER_DATA`.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use gpgmux_core::pinentry::PinEntry;
use gpgmux_core::util::log::{init_logger, verbosity_to_level, LogTarget};
use log::{debug, error};

#[derive(Parser)]
#[command(name = "gpgmux-pinentry", about = "Scripted pinentry answering from PINENTRY_USER_DATA")]
struct PinentryArgs {
    /// Append diagnostics to FILE instead of standard error.
    #[arg(short = 'l', long = "log", value_name = "FILE")]
    log: Option<PathBuf>,

    /// 0 silent, 1 errors, 2 every protocol line.
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = PinentryArgs::parse();

    let target = match &args.log {
        Some(path) => match LogTarget::open_file(path) {
            Ok(target) => target,
            Err(e) => {
                eprintln!("Unable to open log file {}: {}", path.display(), e);
                process::exit(1);
            }
        },
        None => LogTarget::Stderr,
    };
    init_logger(target, verbosity_to_level(args.verbose));

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut relay = PinEntry::from_env(stdin.lock(), stdout.lock());
    if let Err(e) = relay.run() {
        error!("Relay failed: {}", e);
        process::exit(1);
    }
    debug!("Relay finished");
}
