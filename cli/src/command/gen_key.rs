use std::path::PathBuf;

use gpgmux_core::config::EngineConfig;
use gpgmux_core::pgp::utils::key_parameters;
use secrecy::ExposeSecret;

use crate::util::{io_failure, new_client, pgp_failure, read_passphrase, CmdResult};

pub fn cmd_gen_key(
    config: &EngineConfig,
    name: &str,
    email: &str,
    passphrase_file: Option<&PathBuf>,
) -> CmdResult {
    let mut client = new_client(config, false);
    let passphrase = read_passphrase(passphrase_file).map_err(io_failure)?;
    let version = client.version().map_err(pgp_failure)?;
    let params =
        key_parameters(&version, name, email, passphrase.as_ref().map(|p| p.expose_secret()));
    let fingerprint = client.generate_key(&params).map_err(pgp_failure)?;
    println!("{}", fingerprint);
    Ok(())
}
