use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use log::debug;
use parking_lot::Mutex;

use super::{
    agent_failure_classifier, collected, passphrase_responder, Collected, GpgClient, SignMode,
};
use crate::engine::{Engine, Source};
use crate::error::{ErrorCode, PgpErr};
use crate::key::{KeyRing, SharedKeyRing};
use crate::status::decrypt::DecryptStatusHandler;
use crate::status::verify::{Signature, VerifyStatusHandler};
use crate::status::LineContext;

/// Plaintext of a signed and encrypted message with its signatures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptedAndVerified {
    pub data: Vec<u8>,
    pub signatures: Vec<Signature>,
}

impl GpgClient {
    pub fn encrypt<S: Into<Source>>(&mut self, data: S) -> Result<Vec<u8>> {
        let mut args = self.recipient_args()?;
        args.extend(self.armor_args().into_iter().map(str::to_string));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let (code, output) = self.run_operation("--encrypt", &args, Some(data.into()), |_| {})?;
        match code {
            ErrorCode::None => Ok(output),
            ErrorCode::KeyNotFound => Err(PgpErr::KeyNotFound {
                message: "Cannot encrypt data. Public key not found.".to_string(),
                key_id: self.engine.error_key_id().map(str::to_string),
            }
            .into()),
            code => Err(self.failure("Unknown error encrypting data.", code).into()),
        }
    }

    pub fn encrypt_and_sign<S: Into<Source>>(&mut self, data: S) -> Result<Vec<u8>> {
        let mut args = self.recipient_args()?;
        args.extend(self.local_user_args()?);
        args.extend(self.armor_args().into_iter().map(str::to_string));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let sign_keys = Arc::clone(&self.sign_keys);
        let pins = self.sign_keys.read().pins();
        let (code, output) =
            self.run_operation("--encrypt --sign", &args, Some(data.into()), move |engine| {
                sign_handlers(engine, sign_keys, pins)
            })?;
        match code {
            ErrorCode::None => Ok(output),
            code => Err(self.sign_failure("encrypt and sign data", code).into()),
        }
    }

    pub fn decrypt<S: Into<Source>>(&mut self, data: S) -> Result<Vec<u8>> {
        let handler =
            Arc::new(Mutex::new(DecryptStatusHandler::new(Arc::clone(&self.decrypt_keys))));
        let pins = self.decrypt_keys.read().pins();
        let status = Arc::clone(&handler);
        let (code, output) = self.run_operation("--decrypt", &[], Some(data.into()), move |engine| {
            engine.set_pins(pins);
            engine.add_status_handler(move |line: &str, ctx: &mut LineContext<'_>| {
                status.lock().handle(line, ctx)
            });
        })?;

        handler.lock().check()?;
        if code == ErrorCode::FilePermissions {
            return Err(self.failure("Cannot decrypt data.", code).into());
        }
        Ok(output)
    }

    pub fn decrypt_and_verify<S: Into<Source>>(&mut self, data: S) -> Result<DecryptedAndVerified> {
        let decrypt =
            Arc::new(Mutex::new(DecryptStatusHandler::new(Arc::clone(&self.decrypt_keys))));
        let verify: Collected<VerifyStatusHandler> = collected();
        let pins = self.decrypt_keys.read().pins();
        let (decrypt_status, verify_status) = (Arc::clone(&decrypt), Arc::clone(&verify));
        let (_, output) = self.run_operation("--decrypt", &[], Some(data.into()), move |engine| {
            engine.set_pins(pins);
            engine.add_status_handler(move |line: &str, ctx: &mut LineContext<'_>| {
                decrypt_status.lock().handle(line, ctx)
            });
            engine.add_status_handler(move |line: &str, _: &mut LineContext<'_>| {
                verify_status.lock().handle(line)
            });
        })?;

        decrypt.lock().check()?;
        let signatures = std::mem::take(&mut *verify.lock()).into_signatures();
        Ok(DecryptedAndVerified { data: output, signatures })
    }

    pub fn sign<S: Into<Source>>(&mut self, data: S, mode: SignMode) -> Result<Vec<u8>> {
        let mut args = self.local_user_args()?;
        args.extend(self.armor_args().into_iter().map(str::to_string));
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let sign_keys = Arc::clone(&self.sign_keys);
        let pins = self.sign_keys.read().pins();
        let (code, output) =
            self.run_operation(mode.operation(), &args, Some(data.into()), move |engine| {
                sign_handlers(engine, sign_keys, pins)
            })?;
        match code {
            ErrorCode::None => Ok(output),
            code => Err(self.sign_failure("sign data", code).into()),
        }
    }

    /// Verifies `data`, either a signed message or, with `detached_signature`,
    /// the original data of that signature. Bad signatures are reported in
    /// the returned records, not as errors.
    pub fn verify<S: Into<Source>>(
        &mut self,
        data: S,
        detached_signature: Option<Vec<u8>>,
    ) -> Result<Vec<Signature>> {
        let handler: Collected<VerifyStatusHandler> = collected();
        let status = Arc::clone(&handler);
        let data = data.into();
        let (operation, input, message) = match detached_signature {
            Some(signature) => ("--verify - -&5", Source::from(signature), Some(data)),
            None => ("--verify", data, None),
        };
        let args: &[&str] = if message.is_some() { &["--enable-special-filenames"] } else { &[] };

        let (code, _) = self.run_operation(operation, args, Some(input), move |engine| {
            if let Some(message) = message {
                engine.set_message(message);
            }
            engine.add_status_handler(move |line: &str, _: &mut LineContext<'_>| {
                status.lock().handle(line)
            });
        })?;

        match code {
            ErrorCode::None | ErrorCode::BadSignature => {
                Ok(std::mem::take(&mut *handler.lock()).into_signatures())
            }
            ErrorCode::NoData => Err(PgpErr::NoData(
                "Cannot verify signature. No OpenPGP signed data was found in the provided data."
                    .to_string(),
            )
            .into()),
            ErrorCode::KeyNotFound => Err(PgpErr::KeyNotFound {
                message: "Cannot verify signature. The public key used to sign the data is not \
                          in the keyring. Import the public key before trying to verify the \
                          signature."
                    .to_string(),
                key_id: self.engine.error_key_id().map(str::to_string),
            }
            .into()),
            code => Err(self.failure("Unknown error validating signature details.", code).into()),
        }
    }

    fn recipient_args(&self) -> Result<Vec<String>, PgpErr> {
        key_args("--recipient", &self.encrypt_keys.read(), "No encryption keys specified.")
    }

    fn local_user_args(&self) -> Result<Vec<String>, PgpErr> {
        key_args("--local-user", &self.sign_keys.read(), "No signing keys specified.")
    }

    fn sign_failure(&self, action: &str, code: ErrorCode) -> PgpErr {
        let mut with = Vec::new();
        let mut without = Vec::new();
        for key in self.sign_keys.read().iter() {
            match key.passphrase {
                Some(_) => with.push(key.label().to_string()),
                None => without.push(key.label().to_string()),
            }
        }
        match code {
            ErrorCode::BadPassphrase => PgpErr::BadPassphrase {
                message: format!(
                    "Cannot {}. Incorrect passphrase provided for keys: \"{}\".",
                    action,
                    with.join("\", \"")
                ),
                bad: with,
                missing: Vec::new(),
            },
            ErrorCode::MissingPassphrase => PgpErr::BadPassphrase {
                message: format!(
                    "Cannot {}. No passphrase provided for keys: \"{}\".",
                    action,
                    without.join("\", \"")
                ),
                bad: Vec::new(),
                missing: without,
            },
            ErrorCode::KeyNotFound => PgpErr::KeyNotFound {
                message: format!(
                    "Cannot {}. Private key not found. Import the private key before trying to \
                     sign data.",
                    action
                ),
                key_id: self.engine.error_key_id().map(str::to_string),
            },
            code => self.failure(&format!("Unknown error trying to {}.", action), code),
        }
    }

    /// Failure without an operation specific meaning.
    pub(super) fn failure(&self, message: &str, code: ErrorCode) -> PgpErr {
        match code {
            ErrorCode::FilePermissions => PgpErr::FilePermissions {
                message: format!(
                    "{} Cannot access file {}.",
                    message,
                    self.engine.error_filename().unwrap_or("<unknown>")
                ),
                filename: self.engine.error_filename().map(str::to_string),
            },
            code => PgpErr::general(message, code),
        }
    }
}

fn key_args(flag: &str, keys: &KeyRing, missing: &str) -> Result<Vec<String>, PgpErr> {
    if keys.is_empty() {
        return Err(PgpErr::KeyNotFound { message: missing.to_string(), key_id: None });
    }
    Ok(keys.fingerprints().into_iter().flat_map(|fpr| [flag.to_string(), fpr.to_string()]).collect())
}

fn sign_handlers(
    engine: &mut Engine,
    sign_keys: SharedKeyRing,
    pins: BTreeMap<String, String>,
) {
    debug!("Signing with {} key(s)", sign_keys.read().len());
    engine.set_pins(pins);
    engine.add_status_handler(passphrase_responder(Arc::clone(&sign_keys)));
    engine.add_status_handler(agent_failure_classifier(sign_keys));
}
