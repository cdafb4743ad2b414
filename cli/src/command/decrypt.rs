use std::path::{Path, PathBuf};

use gpgmux_core::config::EngineConfig;

use super::verify::print_signatures;
use crate::util::{
    io_failure, new_client, pgp_failure, read_input, read_passphrase, write_output, CmdResult,
};

pub fn cmd_decrypt(
    config: &EngineConfig,
    keys: &[String],
    passphrase_file: Option<&PathBuf>,
    verify: bool,
    output: Option<&PathBuf>,
    input: Option<&Path>,
) -> CmdResult {
    let mut client = new_client(config, false);
    let passphrase = read_passphrase(passphrase_file).map_err(io_failure)?;

    let keys = if keys.is_empty() {
        let secret_keys = client.list_secret_keys(None).map_err(pgp_failure)?;
        secret_keys.into_iter().map(|key| key.fingerprint).collect()
    } else {
        keys.to_vec()
    };
    for key in &keys {
        client.add_decrypt_key(key, passphrase.clone()).map_err(pgp_failure)?;
    }

    let data = read_input(input).map_err(io_failure)?;
    if verify {
        let result = client.decrypt_and_verify(data).map_err(pgp_failure)?;
        write_output(output, &result.data).map_err(io_failure)?;
        print_signatures(&result.signatures);
    } else {
        let decrypted = client.decrypt(data).map_err(pgp_failure)?;
        write_output(output, &decrypted).map_err(io_failure)?;
    }
    Ok(())
}
