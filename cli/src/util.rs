use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use gpgmux_core::config::EngineConfig;
use gpgmux_core::error::{ErrorCode, PgpErr};
use gpgmux_core::util::fs_util::find_executable_in_path;
use gpgmux_core::{GpgClient, Source};
use secrecy::SecretString;

use crate::constants::{GpgmuxExitCode, PINENTRY_BINARY};

pub(crate) type CmdResult = Result<(), (i32, anyhow::Error)>;

/// Exit code for a failed operation, by its classification.
pub(crate) fn exit_code_of(err: &anyhow::Error) -> i32 {
    let code = match err.downcast_ref::<PgpErr>().map(PgpErr::code) {
        Some(ErrorCode::KeyNotFound) => GpgmuxExitCode::KeyNotFound,
        Some(ErrorCode::BadPassphrase | ErrorCode::MissingPassphrase) => {
            GpgmuxExitCode::BadPassphrase
        }
        Some(ErrorCode::NoData) => GpgmuxExitCode::NoData,
        Some(ErrorCode::BadSignature) => GpgmuxExitCode::BadSignature,
        Some(_) | None => GpgmuxExitCode::PGPError,
    };
    code.into()
}

pub(crate) fn pgp_failure(err: anyhow::Error) -> (i32, anyhow::Error) {
    (exit_code_of(&err), err)
}

pub(crate) fn io_failure(err: anyhow::Error) -> (i32, anyhow::Error) {
    (GpgmuxExitCode::Error.into(), err)
}

/// The relay installed next to this binary wins over a bare name that is not
/// on `PATH`.
pub(crate) fn resolve_pinentry(configured: &str) -> String {
    if configured != PINENTRY_BINARY || find_executable_in_path(configured).is_some() {
        return configured.to_string();
    }
    env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(PINENTRY_BINARY))
        .filter(|sibling| sibling.is_file())
        .and_then(|sibling| sibling.to_str().map(str::to_string))
        .unwrap_or_else(|| configured.to_string())
}

pub(crate) fn new_client(config: &EngineConfig, armor: bool) -> GpgClient {
    let mut config = config.clone();
    config.pinentry = resolve_pinentry(&config.pinentry);
    let mut client = GpgClient::new(config);
    client.set_armor(armor);
    client
}

/// A file, or standard input when no path is given.
pub(crate) fn read_input(path: Option<&Path>) -> Result<Source> {
    match path {
        Some(path) => {
            let file = File::open(path).with_context(|| format!("Cannot open {:?}", path))?;
            Ok(Source::Stream(Box::new(file)))
        }
        None => Ok(Source::Stream(Box::new(io::stdin()))),
    }
}

pub(crate) fn write_output(path: Option<&PathBuf>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, data).with_context(|| format!("Cannot write {:?}", path)),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(data)?;
            stdout.flush()?;
            Ok(())
        }
    }
}

/// First line of `path`, without the line terminator.
pub(crate) fn read_passphrase_file(path: &Path) -> Result<SecretString> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read passphrase file {:?}", path))?;
    let passphrase = content.lines().next().ok_or_else(|| anyhow!("Empty passphrase file"))?;
    Ok(SecretString::from(passphrase.to_string()))
}

pub(crate) fn read_passphrase(path: Option<&PathBuf>) -> Result<Option<SecretString>> {
    path.map(|p| read_passphrase_file(p)).transpose()
}
