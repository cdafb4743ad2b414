use gpgmux_core::config::EngineConfig;
use log::info;

use crate::util::{new_client, pgp_failure, CmdResult};

pub fn cmd_delete(config: &EngineConfig, key_id: &str, secret: bool) -> CmdResult {
    let mut client = new_client(config, false);
    if secret {
        client.delete_private_key(key_id).map_err(pgp_failure)?;
        info!("Deleted private key {}", key_id);
    }
    client.delete_public_key(key_id).map_err(pgp_failure)?;
    info!("Deleted public key {}", key_id);
    Ok(())
}
