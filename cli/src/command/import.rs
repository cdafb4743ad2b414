use std::path::Path;

use gpgmux_core::config::EngineConfig;

use crate::util::{io_failure, new_client, pgp_failure, read_input, CmdResult};

pub fn cmd_import(config: &EngineConfig, input: Option<&Path>) -> CmdResult {
    let mut client = new_client(config, false);
    let data = read_input(input).map_err(io_failure)?;
    let result = client.import_key(data).map_err(pgp_failure)?;

    for fingerprint in &result.fingerprints {
        println!("{}", fingerprint);
    }
    eprintln!(
        "public imported: {}, unchanged: {}; private imported: {}, unchanged: {}",
        result.public_imported,
        result.public_unchanged,
        result.private_imported,
        result.private_unchanged
    );
    Ok(())
}
