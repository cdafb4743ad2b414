use std::path::{Path, PathBuf};

use gpgmux_core::config::EngineConfig;
use log::debug;

use crate::util::{
    io_failure, new_client, pgp_failure, read_input, read_passphrase, write_output, CmdResult,
};

pub fn cmd_encrypt(
    config: &EngineConfig,
    armor: bool,
    recipients: &[String],
    signers: &[String],
    passphrase_file: Option<&PathBuf>,
    output: Option<&PathBuf>,
    input: Option<&Path>,
) -> CmdResult {
    let mut client = new_client(config, armor);
    for recipient in recipients {
        client.add_encrypt_key(recipient).map_err(pgp_failure)?;
    }
    let passphrase = read_passphrase(passphrase_file).map_err(io_failure)?;
    for signer in signers {
        client.add_sign_key(signer, passphrase.clone()).map_err(pgp_failure)?;
    }

    let data = read_input(input).map_err(io_failure)?;
    let encrypted = if signers.is_empty() {
        client.encrypt(data)
    } else {
        debug!("Signing with {} key(s)", signers.len());
        client.encrypt_and_sign(data)
    }
    .map_err(pgp_failure)?;
    write_output(output, &encrypted).map_err(io_failure)
}
