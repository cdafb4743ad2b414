use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::DateTime;
use gpgmux_core::config::EngineConfig;
use gpgmux_core::status::verify::Signature;

use crate::constants::GpgmuxExitCode;
use crate::util::{io_failure, new_client, pgp_failure, read_input, CmdResult};

pub fn cmd_verify(
    config: &EngineConfig,
    signature: Option<&Path>,
    input: Option<&Path>,
) -> CmdResult {
    let mut client = new_client(config, false);
    let detached = signature
        .map(|path| fs::read(path).with_context(|| format!("Cannot read signature {:?}", path)))
        .transpose()
        .map_err(io_failure)?;

    let data = read_input(input).map_err(io_failure)?;
    let signatures = client.verify(data, detached).map_err(pgp_failure)?;
    print_signatures(&signatures);

    if signatures.iter().all(|s| s.valid) {
        Ok(())
    } else {
        Err((GpgmuxExitCode::BadSignature.into(), anyhow::anyhow!("Bad signature")))
    }
}

pub(crate) fn print_signatures(signatures: &[Signature]) {
    for signature in signatures {
        let status = if signature.valid { "Good" } else { "Bad" };
        let key = signature
            .key_fingerprint
            .as_deref()
            .or(signature.key_id.as_deref())
            .unwrap_or("unknown key");
        let created = signature
            .creation_date
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format(" made %Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        match &signature.user_id {
            Some(user_id) => {
                eprintln!("{} signature from {} ({}){}", status, user_id, key, created)
            }
            None => eprintln!("{} signature from {}{}", status, key, created),
        }
    }
}
