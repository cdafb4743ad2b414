use anyhow::Result;
use log::debug;
use secrecy::SecretString;

use super::utils::{apply_import_status, created_fingerprint, parse_colon_listing};
use super::{collected, Collected, GpgClient, ImportResult};
use crate::engine::Source;
use crate::error::{ErrorCode, PgpErr};
use crate::key::KeyRef;
use crate::status::LineContext;

const LIST_ARGS: [&str; 4] =
    ["--with-colons", "--with-fingerprint", "--with-fingerprint", "--fixed-list-mode"];

impl GpgClient {
    pub fn import_key<S: Into<Source>>(&mut self, data: S) -> Result<ImportResult> {
        let result: Collected<ImportResult> = collected();
        let status = result.clone();
        let (code, _) =
            self.run_operation("--import", &["--batch"], Some(data.into()), move |engine| {
                engine.add_status_handler(move |line: &str, _: &mut LineContext<'_>| {
                    apply_import_status(&mut status.lock(), line)
                });
            })?;

        match code {
            ErrorCode::None | ErrorCode::DuplicateKey => Ok(std::mem::take(&mut *result.lock())),
            ErrorCode::NoData => {
                Err(PgpErr::NoData("Cannot import key data. No valid GPG key data found.".into())
                    .into())
            }
            code => Err(self.failure("Unknown error importing GPG key.", code).into()),
        }
    }

    /// Exports the public key matching `key_id`. Armored when armor is on.
    pub fn export_public_key(&mut self, key_id: &str) -> Result<Vec<u8>> {
        let fingerprint = self.require_fingerprint(key_id)?;
        let args = self.armor_args();
        let operation = format!("--export {}", fingerprint);
        let (code, output) = self.run_operation(&operation, &args, None, |_| {})?;
        match code {
            ErrorCode::None if !output.is_empty() => Ok(output),
            ErrorCode::None | ErrorCode::KeyNotFound => Err(public_key_not_found(key_id).into()),
            code => Err(self.failure("Unknown error exporting public key.", code).into()),
        }
    }

    pub fn delete_public_key(&mut self, key_id: &str) -> Result<()> {
        let fingerprint = self.require_fingerprint(key_id)?;
        let operation = format!("--delete-key {}", fingerprint);
        let (code, _) = self.run_operation(&operation, &["--batch", "--yes"], None, |_| {})?;
        match code {
            ErrorCode::None => Ok(()),
            ErrorCode::KeyNotFound => Err(public_key_not_found(key_id).into()),
            ErrorCode::DeletePrivateKey => Err(PgpErr::DeletePrivateKey {
                message: "Private key must be deleted before public key can be deleted."
                    .to_string(),
                key_id: key_id.to_string(),
            }
            .into()),
            code => Err(self.failure("Unknown error deleting public key.", code).into()),
        }
    }

    pub fn delete_private_key(&mut self, key_id: &str) -> Result<()> {
        let fingerprint = self
            .list_secret_keys(Some(key_id))?
            .into_iter()
            .next()
            .map(|key| key.fingerprint)
            .ok_or_else(|| private_key_not_found(key_id))?;
        let operation = format!("--delete-secret-key {}", fingerprint);
        let (code, _) = self.run_operation(&operation, &["--batch", "--yes"], None, |_| {})?;
        match code {
            ErrorCode::None => Ok(()),
            ErrorCode::KeyNotFound => Err(private_key_not_found(key_id).into()),
            code => Err(self.failure("Unknown error deleting private key.", code).into()),
        }
    }

    /// Keys in the public keyring, optionally restricted to those matching a
    /// key id, fingerprint or email address.
    pub fn list_keys(&mut self, selector: Option<&str>) -> Result<Vec<KeyRef>> {
        self.list("--list-keys", selector)
    }

    pub fn list_secret_keys(&mut self, selector: Option<&str>) -> Result<Vec<KeyRef>> {
        self.list("--list-secret-keys", selector)
    }

    fn list(&mut self, operation: &str, selector: Option<&str>) -> Result<Vec<KeyRef>> {
        let operation = match selector {
            Some(selector) => format!("{} {}", operation, selector),
            None => operation.to_string(),
        };
        let (code, output) = self.run_operation(&operation, &LIST_ARGS, None, |_| {})?;
        match code {
            ErrorCode::None => Ok(parse_colon_listing(&String::from_utf8_lossy(&output))),
            ErrorCode::KeyNotFound | ErrorCode::NoData => Ok(Vec::new()),
            code => Err(self.failure("Unknown error getting keys.", code).into()),
        }
    }

    pub fn get_fingerprint(&mut self, key_id: &str) -> Result<Option<String>> {
        Ok(self.list_keys(Some(key_id))?.into_iter().next().map(|key| key.fingerprint))
    }

    /// Runs unattended key generation from GnuPG batch parameters and returns
    /// the fingerprint of the new primary key.
    pub fn generate_key(&mut self, batch_parameters: &str) -> Result<String> {
        let created: Collected<Option<String>> = collected();
        let status = created.clone();
        let input = Source::from(batch_parameters);
        let (code, _) =
            self.run_operation("--gen-key", &["--batch"], Some(input), move |engine| {
                engine.add_status_handler(move |line: &str, _: &mut LineContext<'_>| {
                    if let Some(fingerprint) = created_fingerprint(line) {
                        *status.lock() = Some(fingerprint);
                    }
                });
            })?;

        let fingerprint = created.lock().take();
        match (code, fingerprint) {
            (ErrorCode::None, Some(fingerprint)) => {
                debug!("Generated key {}", fingerprint);
                Ok(fingerprint)
            }
            (code, _) => Err(self.failure("Unknown error generating key-pair.", code).into()),
        }
    }

    pub fn add_encrypt_key(&mut self, key_id: &str) -> Result<()> {
        let key = self.resolve_key(key_id)?;
        self.encrypt_keys.write().add(key);
        Ok(())
    }

    pub fn add_sign_key(&mut self, key_id: &str, passphrase: Option<SecretString>) -> Result<()> {
        let key = with_passphrase(self.resolve_key(key_id)?, passphrase);
        self.sign_keys.write().add(key);
        Ok(())
    }

    pub fn add_decrypt_key(&mut self, key_id: &str, passphrase: Option<SecretString>) -> Result<()> {
        let key = with_passphrase(self.resolve_key(key_id)?, passphrase);
        self.decrypt_keys.write().add(key);
        Ok(())
    }

    pub fn clear_encrypt_keys(&mut self) {
        self.encrypt_keys.write().clear();
    }

    pub fn clear_sign_keys(&mut self) {
        self.sign_keys.write().clear();
    }

    pub fn clear_decrypt_keys(&mut self) {
        self.decrypt_keys.write().clear();
    }

    fn resolve_key(&mut self, key_id: &str) -> Result<KeyRef> {
        let key = self.list_keys(Some(key_id))?.into_iter().next();
        key.ok_or_else(|| public_key_not_found(key_id).into())
    }

    fn require_fingerprint(&mut self, key_id: &str) -> Result<String> {
        self.get_fingerprint(key_id)?.ok_or_else(|| public_key_not_found(key_id).into())
    }
}

fn with_passphrase(key: KeyRef, passphrase: Option<SecretString>) -> KeyRef {
    match passphrase {
        Some(passphrase) => key.with_passphrase(passphrase),
        None => key,
    }
}

fn public_key_not_found(key_id: &str) -> PgpErr {
    PgpErr::KeyNotFound {
        message: format!("Public key not found: {}", key_id),
        key_id: Some(key_id.to_string()),
    }
}

fn private_key_not_found(key_id: &str) -> PgpErr {
    PgpErr::KeyNotFound {
        message: format!("Private key not found: {}", key_id),
        key_id: Some(key_id.to_string()),
    }
}
