use std::path::{Path, PathBuf};

use gpgmux_core::config::EngineConfig;
use gpgmux_core::pgp::SignMode;

use crate::util::{
    io_failure, new_client, pgp_failure, read_input, read_passphrase, write_output, CmdResult,
};

pub fn cmd_sign(
    config: &EngineConfig,
    armor: bool,
    signers: &[String],
    mode: SignMode,
    passphrase_file: Option<&PathBuf>,
    output: Option<&PathBuf>,
    input: Option<&Path>,
) -> CmdResult {
    let mut client = new_client(config, armor);
    let passphrase = read_passphrase(passphrase_file).map_err(io_failure)?;
    for signer in signers {
        client.add_sign_key(signer, passphrase.clone()).map_err(pgp_failure)?;
    }

    let data = read_input(input).map_err(io_failure)?;
    let signed = client.sign(data, mode).map_err(pgp_failure)?;
    write_output(output, &signed).map_err(io_failure)
}
