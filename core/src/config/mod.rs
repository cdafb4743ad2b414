use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::default_constants::{
    AGENT_EXECUTABLE, GPGCONF_EXECUTABLE, PGP_EXECUTABLE, PINENTRY_EXECUTABLE,
};

/// Everything the engine needs to know to launch the subprocesses.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EngineConfig {
    pub binary: String,
    pub agent: String,
    pub gpgconf: String,
    pub pinentry: String,
    pub homedir: Option<PathBuf>,
    pub public_keyring: Option<PathBuf>,
    pub private_keyring: Option<PathBuf>,
    pub trust_db: Option<PathBuf>,
    pub debug: bool,
}

#[derive(Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct EngineConfigSerializable {
    pub binary: Option<String>,
    pub agent: Option<String>,
    pub gpgconf: Option<String>,
    pub pinentry: Option<String>,
    pub homedir: Option<PathBuf>,
    pub public_keyring: Option<PathBuf>,
    pub private_keyring: Option<PathBuf>,
    pub trust_db: Option<PathBuf>,
    pub debug: Option<bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfigSerializable::default().into()
    }
}

impl EngineConfig {
    pub fn with_homedir<P: Into<PathBuf>>(mut self, homedir: P) -> Self {
        self.homedir = Some(homedir.into());
        self
    }
}

impl From<EngineConfigSerializable> for EngineConfig {
    fn from(value: EngineConfigSerializable) -> Self {
        EngineConfig {
            binary: value.binary.unwrap_or(PGP_EXECUTABLE.to_string()),
            agent: value.agent.unwrap_or(AGENT_EXECUTABLE.to_string()),
            gpgconf: value.gpgconf.unwrap_or(GPGCONF_EXECUTABLE.to_string()),
            pinentry: value.pinentry.unwrap_or(PINENTRY_EXECUTABLE.to_string()),
            homedir: value.homedir,
            public_keyring: value.public_keyring,
            private_keyring: value.private_keyring,
            trust_db: value.trust_db,
            debug: value.debug.unwrap_or_default(),
        }
    }
}

impl From<EngineConfig> for EngineConfigSerializable {
    fn from(value: EngineConfig) -> Self {
        EngineConfigSerializable {
            binary: Some(value.binary),
            agent: Some(value.agent),
            gpgconf: Some(value.gpgconf),
            pinentry: Some(value.pinentry),
            homedir: value.homedir,
            public_keyring: value.public_keyring,
            private_keyring: value.private_keyring,
            trust_db: value.trust_db,
            debug: Some(value.debug),
        }
    }
}

pub mod loader;
