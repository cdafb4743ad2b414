//! Default error classification installed on every run.
//!
//! Later status lines overwrite the code set by earlier ones. Error channel
//! lines only classify while no code has been recorded yet.

use lazy_static::lazy_static;
use regex::Regex;

use super::{tokenize, LineContext};
use crate::error::ErrorCode;

lazy_static! {
    static ref NO_DATA: Regex = Regex::new(r"no valid OpenPGP data found").unwrap();
    static ref NO_SECRET_KEY: Regex =
        Regex::new(r"No secret key|secret key not available").unwrap();
    static ref NO_PUBLIC_KEY: Regex = Regex::new(r"No public key|public key not found").unwrap();
    static ref FILE_ACCESS: Regex =
        Regex::new(r#"can't (?:access|open) [`'"](.*?)['"]"#).unwrap();
}

pub fn handle_status(line: &str, ctx: &mut LineContext<'_>) {
    let tokens = tokenize(line);
    let state = ctx.state_mut();

    match tokens[0] {
        "BAD_PASSPHRASE" => state.code = ErrorCode::BadPassphrase,
        "MISSING_PASSPHRASE" => state.code = ErrorCode::MissingPassphrase,
        "NEED_PASSPHRASE" => state.need_passphrase += 1,
        "GOOD_PASSPHRASE" => state.need_passphrase -= 1,
        "NODATA" => state.code = ErrorCode::NoData,
        "DELETE_PROBLEM" => match tokens.get(1) {
            Some(&"1") => state.code = ErrorCode::KeyNotFound,
            Some(&"2") => state.code = ErrorCode::DeletePrivateKey,
            _ => {}
        },
        "IMPORT_RES" => {
            let duplicates = tokens.get(12).and_then(|t| t.parse::<u64>().ok()).unwrap_or(0);
            if duplicates > 0 {
                state.code = ErrorCode::DuplicateKey;
            }
        }
        "NO_PUBKEY" | "NO_SECKEY" => {
            state.key_id = tokens.get(1).map(|id| id.to_string());
            state.code = ErrorCode::KeyNotFound;
        }
        "EXPSIG" | "EXPKEYSIG" | "REVKEYSIG" | "BADSIG" => state.code = ErrorCode::BadSignature,
        _ => {}
    }
}

pub fn handle_error(line: &str, ctx: &mut LineContext<'_>) {
    let state = ctx.state_mut();
    if state.code != ErrorCode::None {
        return;
    }

    if NO_DATA.is_match(line) {
        state.code = ErrorCode::NoData;
    } else if NO_SECRET_KEY.is_match(line) || NO_PUBLIC_KEY.is_match(line) {
        state.code = ErrorCode::KeyNotFound;
    } else if let Some(caps) = FILE_ACCESS.captures(line) {
        state.filename = caps.get(1).map(|m| m.as_str().to_string());
        state.code = ErrorCode::FilePermissions;
    }
}
