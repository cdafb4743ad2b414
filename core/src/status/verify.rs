//! Collects signature records while a verification runs.
//!
//! `SIG_ID` arrives before the line naming the signature it belongs to and
//! `VALIDSIG` after it, so records are built up by arrival order.

use chrono::NaiveDateTime;
use log::warn;

use super::tokenize;
use crate::util::escape::percent_decode;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    pub id: Option<String>,
    pub key_id: Option<String>,
    pub key_fingerprint: Option<String>,
    pub user_id: Option<String>,
    /// Seconds since the epoch, UTC.
    pub creation_date: Option<i64>,
    pub expiration_date: Option<i64>,
    pub valid: bool,
}

#[derive(Debug, Default)]
pub struct VerifyStatusHandler {
    signatures: Vec<Signature>,
    pending_sig_id: Option<String>,
}

impl VerifyStatusHandler {
    pub fn new() -> Self {
        VerifyStatusHandler::default()
    }

    pub fn handle(&mut self, line: &str) {
        let tokens = tokenize(line);
        match tokens[0] {
            "GOODSIG" | "EXPSIG" | "EXPKEYSIG" | "REVKEYSIG" | "BADSIG" | "ERRSIG" => {
                let mut signature =
                    Signature { id: self.pending_sig_id.take(), ..Signature::default() };
                if let Some(key) = tokens.get(1) {
                    if key.len() > 16 {
                        signature.key_fingerprint = Some(key.to_string());
                        signature.key_id = Some(key[key.len() - 16..].to_string());
                    } else {
                        signature.key_id = Some(key.to_string());
                    }
                }
                if tokens[0] != "ERRSIG" && tokens.len() > 2 {
                    signature.user_id = Some(percent_decode(&tokens[2..].join(" ")));
                }
                self.signatures.push(signature);
            }
            "VALIDSIG" => {
                let Some(signature) = self.signatures.last_mut() else {
                    warn!("VALIDSIG without a preceding signature line");
                    return;
                };
                signature.valid = true;
                signature.key_fingerprint = tokens.get(1).map(|t| t.to_string());
                signature.creation_date = tokens.get(3).and_then(|t| parse_timestamp(t));
                signature.expiration_date = tokens.get(4).and_then(|t| parse_timestamp(t));
            }
            "SIG_ID" => self.pending_sig_id = tokens.get(1).map(|t| t.to_string()),
            _ => {}
        }
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    pub fn into_signatures(self) -> Vec<Signature> {
        self.signatures
    }
}

/// Status timestamps are either epoch seconds or `YYYYMMDDThhmmss` in UTC.
/// `0` means "not set".
fn parse_timestamp(value: &str) -> Option<i64> {
    if value.contains('T') {
        return NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .ok()
            .map(|dt| dt.and_utc().timestamp());
    }
    match value.parse::<i64>() {
        Ok(0) | Err(_) => None,
        Ok(seconds) => Some(seconds),
    }
}
