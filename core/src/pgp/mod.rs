pub mod crypto;
pub mod key_management;
pub mod utils;

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use parking_lot::Mutex;
use secrecy::ExposeSecret;

use crate::config::EngineConfig;
use crate::engine::{Engine, Sink, Source, Version};
use crate::error::ErrorCode;
use crate::key::{KeyRing, SharedKeyRing};
use crate::status::{tokenize, LineContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    #[default]
    Normal,
    Clear,
    Detached,
}

impl SignMode {
    fn operation(&self) -> &'static str {
        match self {
            SignMode::Normal => "--sign",
            SignMode::Clear => "--clearsign",
            SignMode::Detached => "--detach-sign",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub fingerprints: Vec<String>,
    pub public_imported: u32,
    pub public_unchanged: u32,
    pub private_imported: u32,
    pub private_unchanged: u32,
}

/// High-level operations on top of one [`Engine`]. The engine is reset
/// before every operation.
pub struct GpgClient {
    engine: Engine,
    encrypt_keys: SharedKeyRing,
    sign_keys: SharedKeyRing,
    decrypt_keys: SharedKeyRing,
    armor: bool,
}

impl GpgClient {
    pub fn new(config: EngineConfig) -> Self {
        GpgClient::from_engine(Engine::new(config))
    }

    pub fn from_engine(engine: Engine) -> Self {
        GpgClient {
            engine,
            encrypt_keys: KeyRing::shared(),
            sign_keys: KeyRing::shared(),
            decrypt_keys: KeyRing::shared(),
            armor: false,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn version(&mut self) -> Result<Version> {
        self.engine.version()
    }

    /// ASCII armored output for encrypt, sign and export.
    pub fn set_armor(&mut self, armor: bool) {
        self.armor = armor;
    }

    pub fn armor(&self) -> bool {
        self.armor
    }

    /// Resets the engine and runs `operation` over `input`, returning the
    /// engine's error code and buffered output.
    fn run_operation(
        &mut self,
        operation: &str,
        arguments: &[&str],
        input: Option<Source>,
        configure: impl FnOnce(&mut Engine),
    ) -> Result<(ErrorCode, Vec<u8>)> {
        self.engine.reset();
        self.engine.set_operation(operation, arguments);
        if let Some(input) = input {
            self.engine.set_input(input);
        }
        self.engine.set_output(Sink::buffer());
        configure(&mut self.engine);
        self.engine.run()?;

        let code = self.engine.error_code();
        debug!("{} finished with {}", operation, code);
        let output = self.engine.take_output().and_then(Sink::into_bytes).unwrap_or_default();
        Ok((code, output))
    }

    fn armor_args(&self) -> Vec<&'static str> {
        if self.armor {
            vec!["--armor"]
        } else {
            vec![]
        }
    }
}

/// Answers `NEED_PASSPHRASE` prompts of engines without agent from `keys`.
pub(crate) fn passphrase_responder(
    keys: SharedKeyRing,
) -> impl FnMut(&str, &mut LineContext<'_>) + Send + 'static {
    move |line: &str, ctx: &mut LineContext<'_>| {
        let tokens = tokenize(line);
        if tokens[0] != "NEED_PASSPHRASE" {
            return;
        }
        let keys = keys.read();
        let passphrase = tokens.get(1).and_then(|id| keys.passphrase_for(id));
        ctx.send_command(passphrase.map(|p| p.expose_secret()).unwrap_or(""));
    }
}

/// GnuPG >= 2.1 reports agent side passphrase failures only as `ERROR` or
/// `FAILURE` lines carrying a gpg-error code. A canceled prompt means the
/// relay ran out of answers, which is a wrong passphrase when `keys` held one.
pub(crate) fn agent_failure_classifier(
    keys: SharedKeyRing,
) -> impl FnMut(&str, &mut LineContext<'_>) + Send + 'static {
    move |line: &str, ctx: &mut LineContext<'_>| {
        let tokens = tokenize(line);
        if tokens[0] != "ERROR" && tokens[0] != "FAILURE" {
            return;
        }
        let Some(code) = tokens.last().and_then(|c| c.parse::<u32>().ok()) else {
            return;
        };
        let state = ctx.state_mut();
        match code & 0xFFFF {
            11 => state.code = ErrorCode::BadPassphrase,
            99 | 177 if keys.read().has_passphrases() => state.code = ErrorCode::BadPassphrase,
            99 | 177 => state.code = ErrorCode::MissingPassphrase,
            _ => {}
        }
    }
}

/// Shared slot a status handler fills and the operation reads afterwards.
pub(crate) type Collected<T> = Arc<Mutex<T>>;

pub(crate) fn collected<T: Default>() -> Collected<T> {
    Arc::new(Mutex::new(T::default()))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::key::KeyRef;
    use crate::status::ErrorState;

    #[test]
    fn sign_mode_operations() {
        assert_eq!(SignMode::default().operation(), "--sign");
        assert_eq!(SignMode::Clear.operation(), "--clearsign");
        assert_eq!(SignMode::Detached.operation(), "--detach-sign");
    }

    #[test]
    fn responder_answers_known_keys() {
        let keys = KeyRing::shared();
        keys.write().add(
            KeyRef::new("5A58436F752BC80B3E992C1D72B6E7B38F1BB2C0")
                .with_passphrase("test".to_string().into()),
        );
        let mut responder = passphrase_responder(keys);
        let mut state = ErrorState::default();
        let mut commands = Vec::new();
        for line in [
            "USERID_HINT 72B6E7B38F1BB2C0 Alice",
            "NEED_PASSPHRASE 72B6E7B38F1BB2C0 72B6E7B38F1BB2C0 1 0",
            "NEED_PASSPHRASE 1111222233334444 1111222233334444 1 0",
        ] {
            responder(line, &mut LineContext::new(&mut state, Some(&mut commands)));
        }
        assert_eq!(commands, b"test\n\n".to_vec());
    }

    #[test]
    fn agent_failures() {
        let cases = [
            ("FAILURE sign 67108875", ErrorCode::BadPassphrase),
            ("ERROR pkdecrypt_failed 67108875", ErrorCode::BadPassphrase),
            ("FAILURE sign 83886179", ErrorCode::MissingPassphrase),
            ("ERROR keyedit.passwd 67109041", ErrorCode::MissingPassphrase),
            ("FAILURE sign 33554449", ErrorCode::None),
            ("PLAINTEXT 62 0", ErrorCode::None),
        ];
        let mut classify = agent_failure_classifier(KeyRing::shared());
        for (line, code) in cases {
            let mut state = ErrorState::default();
            classify(line, &mut LineContext::new(&mut state, None));
            assert_eq!(state.code, code, "{}", line);
        }
    }

    #[test]
    fn canceled_prompt_with_passphrase_is_bad() {
        let keys = KeyRing::shared();
        keys.write().add(
            KeyRef::new("5A58436F752BC80B3E992C1D72B6E7B38F1BB2C0")
                .with_passphrase("wrong".to_string().into()),
        );
        let mut classify = agent_failure_classifier(keys);
        for line in ["FAILURE sign 83886179", "ERROR pkdecrypt_failed 67109041"] {
            let mut state = ErrorState::default();
            classify(line, &mut LineContext::new(&mut state, None));
            assert_eq!(state.code, ErrorCode::BadPassphrase, "{}", line);
        }
    }
}
