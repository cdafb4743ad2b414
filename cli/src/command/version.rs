use gpgmux_core::config::EngineConfig;

use crate::util::{new_client, pgp_failure, CmdResult};

pub fn cmd_version(config: &EngineConfig) -> CmdResult {
    let mut client = new_client(config, false);
    let version = client.version().map_err(pgp_failure)?;
    println!("GnuPG {}", version);
    Ok(())
}
