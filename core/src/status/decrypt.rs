//! Tracks decryption progress across one run and turns it into a typed
//! error afterwards.
//!
//! The message counts as decrypted unless an `ENC_TO` line shows it was
//! encrypted; from then on only `DECRYPTION_OKAY` confirms success.

use std::collections::BTreeSet;

use log::debug;
use secrecy::ExposeSecret;

use super::{tokenize, LineContext};
use crate::error::PgpErr;
use crate::key::SharedKeyRing;

/// `gpg-error` codes reported by GnuPG >= 2.1 in `ERROR` status lines.
const GPG_ERR_BAD_PASSPHRASE: u32 = 11;
const GPG_ERR_CANCELED: u32 = 99;
const GPG_ERR_NO_PASSPHRASE: u32 = 177;

pub struct DecryptStatusHandler {
    keys: SharedKeyRing,
    current_sub_key: Option<String>,
    decryption_okay: bool,
    no_data: bool,
    /// Key id to user id hint. Entries are removed again on a good passphrase.
    bad_passphrases: Vec<(String, String)>,
    missing_passphrases: BTreeSet<String>,
    missing_keys: Vec<String>,
}

impl DecryptStatusHandler {
    pub fn new(keys: SharedKeyRing) -> Self {
        DecryptStatusHandler {
            keys,
            current_sub_key: None,
            decryption_okay: true,
            no_data: false,
            bad_passphrases: Vec::new(),
            missing_passphrases: BTreeSet::new(),
            missing_keys: Vec::new(),
        }
    }

    pub fn handle(&mut self, line: &str, ctx: &mut LineContext<'_>) {
        let tokens = tokenize(line);
        match tokens[0] {
            "ENC_TO" => {
                self.decryption_okay = false;
                self.current_sub_key = tokens.get(1).map(|t| t.to_string());
            }
            "NEED_PASSPHRASE" => {
                let Some(sub_key) = tokens.get(1) else {
                    return;
                };
                self.current_sub_key = Some(sub_key.to_string());
                let keys = self.keys.read();
                match keys.passphrase_for(sub_key) {
                    Some(passphrase) => ctx.send_command(passphrase.expose_secret()),
                    None => {
                        debug!("No passphrase known for {}", sub_key);
                        ctx.send_command("");
                    }
                }
            }
            "USERID_HINT" => {
                if let Some(key_id) = tokens.get(1) {
                    let hint = tokens[2..].join(" ");
                    self.set_bad_passphrase(key_id, hint);
                }
            }
            "GOOD_PASSPHRASE" => {
                if let Some(current) = &self.current_sub_key {
                    self.bad_passphrases.retain(|(id, _)| id != current);
                }
            }
            "MISSING_PASSPHRASE" => {
                if let Some(current) = &self.current_sub_key {
                    self.missing_passphrases.insert(current.clone());
                }
            }
            "NO_SECKEY" => {
                if let Some(key_id) = tokens.get(1) {
                    if !self.missing_keys.iter().any(|k| k == key_id) {
                        self.missing_keys.push(key_id.to_string());
                    }
                }
            }
            "NODATA" => self.no_data = true,
            "DECRYPTION_OKAY" => self.decryption_okay = true,
            "ERROR" => self.handle_agent_error(&tokens),
            _ => {}
        }
    }

    /// Agents ask the relay, which gives up after one wrong answer, so a
    /// canceled prompt for a key with a known passphrase means that
    /// passphrase was rejected.
    fn handle_agent_error(&mut self, tokens: &[&str]) {
        let Some(code) = tokens.get(2).and_then(|c| c.parse::<u32>().ok()) else {
            return;
        };
        let Some(current) = self.current_sub_key.clone() else {
            return;
        };
        let (known, user_id) = {
            let keys = self.keys.read();
            let key = keys.find(&current);
            (
                key.is_some_and(|k| k.passphrase.is_some()),
                key.and_then(|k| k.user_id.clone()),
            )
        };
        match code & 0xFFFF {
            GPG_ERR_BAD_PASSPHRASE => self.add_hint(&current, user_id),
            GPG_ERR_CANCELED | GPG_ERR_NO_PASSPHRASE if known => {
                self.add_hint(&current, user_id);
            }
            GPG_ERR_CANCELED | GPG_ERR_NO_PASSPHRASE => {
                self.add_hint(&current, user_id);
                self.missing_passphrases.insert(current);
            }
            _ => {}
        }
    }

    /// Keeps a hint from `USERID_HINT`, which agents do not always send.
    fn add_hint(&mut self, key_id: &str, user_id: Option<String>) {
        if !self.bad_passphrases.iter().any(|(id, _)| id == key_id) {
            let hint = user_id.unwrap_or_else(|| key_id.to_string());
            self.bad_passphrases.push((key_id.to_string(), hint));
        }
    }

    fn set_bad_passphrase(&mut self, key_id: &str, hint: String) {
        match self.bad_passphrases.iter_mut().find(|(id, _)| id == key_id) {
            Some(entry) => entry.1 = hint,
            None => self.bad_passphrases.push((key_id.to_string(), hint)),
        }
    }

    pub fn decryption_okay(&self) -> bool {
        self.decryption_okay
    }

    /// Inspects the state accumulated during the run.
    pub fn check(&self) -> Result<(), PgpErr> {
        if !self.decryption_okay {
            if !self.bad_passphrases.is_empty() {
                return Err(self.bad_passphrase_error());
            }
            if !self.missing_keys.is_empty() {
                return Err(PgpErr::KeyNotFound {
                    message: "Cannot decrypt data. No suitable private key is in the keyring. \
                              Import a suitable private key before trying to decrypt this data."
                        .to_string(),
                    key_id: self.missing_keys.first().cloned(),
                });
            }
            return Err(PgpErr::general(
                "Unknown error decrypting data.",
                crate::error::ErrorCode::Unknown,
            ));
        }
        if self.no_data {
            return Err(PgpErr::NoData(
                "Cannot decrypt data. No PGP encrypted data was found in the provided data."
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn bad_passphrase_error(&self) -> PgpErr {
        let (missing, bad): (Vec<_>, Vec<_>) = self
            .bad_passphrases
            .iter()
            .partition(|(id, _)| self.missing_passphrases.contains(id));
        let bad: Vec<String> = bad.into_iter().map(|(_, hint)| hint.clone()).collect();
        let missing: Vec<String> = missing.into_iter().map(|(_, hint)| hint.clone()).collect();

        let mut message = String::from("Cannot decrypt data.");
        if !bad.is_empty() {
            message.push_str(&format!(
                " Incorrect passphrase provided for keys: \"{}\".",
                bad.join("\", \"")
            ));
        }
        if !missing.is_empty() {
            message.push_str(&format!(
                " No passphrase provided for keys: \"{}\".",
                missing.join("\", \"")
            ));
        }
        PgpErr::BadPassphrase { message, bad, missing }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorCode;
    use crate::key::{KeyRef, KeyRing};
    use crate::status::ErrorState;

    const SUB_KEY: &str = "8F1BB2C0F6D2D5F7";
    const FPR: &str = "5A58436F752BC80B3E992C1D72B6E7B38F1BB2C0";

    struct Harness {
        handler: DecryptStatusHandler,
        state: ErrorState,
        commands: Vec<u8>,
    }

    impl Harness {
        fn new(passphrase: Option<&str>) -> Self {
            Harness::build(passphrase, None)
        }

        fn with_user_id(passphrase: Option<&str>, user_id: &str) -> Self {
            Harness::build(passphrase, Some(user_id))
        }

        fn build(passphrase: Option<&str>, user_id: Option<&str>) -> Self {
            let keys = KeyRing::shared();
            let mut key = KeyRef::new(FPR);
            key.sub_key_fingerprints.push(format!("0000000000000000000000000000{}", SUB_KEY));
            key.user_id = user_id.map(str::to_string);
            if let Some(p) = passphrase {
                key = key.with_passphrase(p.to_string().into());
            }
            keys.write().add(key);
            Harness {
                handler: DecryptStatusHandler::new(keys),
                state: ErrorState::default(),
                commands: Vec::new(),
            }
        }

        fn feed(&mut self, lines: &[&str]) {
            for line in lines {
                let mut ctx = LineContext::new(&mut self.state, Some(&mut self.commands));
                self.handler.handle(line, &mut ctx);
            }
        }
    }

    #[test]
    fn unencrypted_data_is_okay() {
        let mut harness = Harness::new(None);
        harness.feed(&["PLAINTEXT 62 0", "PLAINTEXT_LENGTH 5"]);
        assert_eq!(harness.handler.check(), Ok(()));
    }

    #[test]
    fn confirmed_decryption_is_okay() {
        let mut harness = Harness::new(Some("test"));
        harness.feed(&[
            &format!("ENC_TO {} 1 0", SUB_KEY),
            &format!("USERID_HINT {} Alice <alice@example.org>", SUB_KEY),
            &format!("NEED_PASSPHRASE {} 72B6E7B38F1BB2C0 1 0", SUB_KEY),
            "GOOD_PASSPHRASE",
            "DECRYPTION_OKAY",
        ]);
        assert_eq!(harness.commands, b"test\n".to_vec());
        assert_eq!(harness.handler.check(), Ok(()));
    }

    #[test]
    fn unknown_key_gets_empty_passphrase() {
        let mut harness = Harness::new(None);
        harness.feed(&["NEED_PASSPHRASE FFFFFFFFFFFFFFFF FFFFFFFFFFFFFFFF 1 0"]);
        assert_eq!(harness.commands, b"\n".to_vec());
    }

    #[test]
    fn bad_passphrase_lists_user_id_hint() {
        let mut harness = Harness::new(Some("wrong"));
        harness.feed(&[
            &format!("ENC_TO {} 1 0", SUB_KEY),
            &format!("USERID_HINT {} Alice <alice@example.org>", SUB_KEY),
            &format!("NEED_PASSPHRASE {} 72B6E7B38F1BB2C0 1 0", SUB_KEY),
            &format!("BAD_PASSPHRASE {}", SUB_KEY),
        ]);
        let err = harness.handler.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPassphrase);
        assert_eq!(
            err.to_string(),
            "Cannot decrypt data. Incorrect passphrase provided for keys: \"Alice <alice@example.org>\"."
        );
    }

    #[test]
    fn missing_passphrase_is_reported_separately() {
        let mut harness = Harness::new(None);
        harness.feed(&[
            &format!("ENC_TO {} 1 0", SUB_KEY),
            &format!("USERID_HINT {} Alice <alice@example.org>", SUB_KEY),
            &format!("NEED_PASSPHRASE {} 72B6E7B38F1BB2C0 1 0", SUB_KEY),
            "MISSING_PASSPHRASE",
        ]);
        match harness.handler.check().unwrap_err() {
            PgpErr::BadPassphrase { message, bad, missing } => {
                assert!(bad.is_empty());
                assert_eq!(missing, vec!["Alice <alice@example.org>".to_string()]);
                assert!(message.contains("No passphrase provided for keys"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn agent_error_marks_bad_passphrase() {
        let mut harness = Harness::new(Some("wrong"));
        harness.feed(&[
            &format!("ENC_TO {} 1 0", SUB_KEY),
            "ERROR pkdecrypt_failed 67108875",
        ]);
        let err = harness.handler.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadPassphrase);
        assert!(err.to_string().contains(SUB_KEY));
    }

    #[test]
    fn rejected_passphrase_names_user_id() {
        let mut harness = Harness::with_user_id(Some("wrong"), "Alice <alice@example.org>");
        harness.feed(&[
            &format!("ENC_TO {} 18 0", SUB_KEY),
            "PINENTRY_LAUNCHED 4711 curses 1.2.1 - - - - 0/0 0",
            "ERROR pkdecrypt_failed 67109041",
            "BEGIN_DECRYPTION",
            "DECRYPTION_FAILED",
            "END_DECRYPTION",
        ]);
        match harness.handler.check().unwrap_err() {
            PgpErr::BadPassphrase { message, bad, missing } => {
                assert_eq!(bad, vec!["Alice <alice@example.org>".to_string()]);
                assert!(missing.is_empty());
                assert_eq!(
                    message,
                    "Cannot decrypt data. Incorrect passphrase provided for keys: \
                     \"Alice <alice@example.org>\"."
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn canceled_prompt_without_passphrase_is_missing() {
        let mut harness = Harness::with_user_id(None, "Alice <alice@example.org>");
        harness.feed(&[&format!("ENC_TO {} 18 0", SUB_KEY), "ERROR pkdecrypt_failed 67108963"]);
        let err = harness.handler.check().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingPassphrase);
        assert_eq!(
            err.to_string(),
            "Cannot decrypt data. No passphrase provided for keys: \"Alice <alice@example.org>\"."
        );
    }

    #[test]
    fn missing_secret_key() {
        let mut harness = Harness::new(None);
        harness.feed(&[
            "ENC_TO 1111222233334444 1 0",
            "NO_SECKEY 1111222233334444",
            "BEGIN_DECRYPTION",
            "DECRYPTION_FAILED",
            "END_DECRYPTION",
        ]);
        match harness.handler.check().unwrap_err() {
            PgpErr::KeyNotFound { message, key_id } => {
                assert!(message.contains("No suitable private key is in the keyring."));
                assert_eq!(key_id.as_deref(), Some("1111222233334444"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn no_data() {
        let mut harness = Harness::new(None);
        harness.feed(&["NODATA 1", "NODATA 2"]);
        assert_eq!(harness.handler.check().unwrap_err().code(), ErrorCode::NoData);
    }

    #[test]
    fn unconfirmed_without_reason_is_unknown() {
        let mut harness = Harness::new(None);
        harness.feed(&["ENC_TO 1111222233334444 1 0", "DECRYPTION_FAILED"]);
        assert_eq!(harness.handler.check().unwrap_err().code(), ErrorCode::Unknown);
    }
}
