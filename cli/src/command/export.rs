use std::path::PathBuf;

use gpgmux_core::config::EngineConfig;

use crate::util::{io_failure, new_client, pgp_failure, write_output, CmdResult};

pub fn cmd_export(
    config: &EngineConfig,
    armor: bool,
    key_id: &str,
    output: Option<&PathBuf>,
) -> CmdResult {
    let mut client = new_client(config, armor);
    let exported = client.export_public_key(key_id).map_err(pgp_failure)?;
    write_output(output, &exported).map_err(io_failure)
}
