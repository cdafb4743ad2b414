use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};

/// A key the caller wants to use, resolved to its fingerprints.
#[derive(Debug)]
pub struct KeyRef {
    pub fingerprint: String,
    pub sub_key_fingerprints: Vec<String>,
    pub user_id: Option<String>,
    pub passphrase: Option<SecretString>,
}

impl KeyRef {
    pub fn new<S: Into<String>>(fingerprint: S) -> Self {
        KeyRef {
            fingerprint: fingerprint.into(),
            sub_key_fingerprints: Vec::new(),
            user_id: None,
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: SecretString) -> Self {
        self.passphrase = Some(passphrase);
        self
    }

    /// Primary fingerprint followed by sub-key fingerprints.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.fingerprint.as_str())
            .chain(self.sub_key_fingerprints.iter().map(String::as_str))
    }

    pub fn matches(&self, key_id: &str) -> bool {
        self.identifiers().any(|id| key_id_matches(id, key_id))
    }

    /// User id when known, for error messages.
    pub fn label(&self) -> &str {
        self.user_id.as_deref().unwrap_or(&self.fingerprint)
    }
}

/// Key ids are suffixes of fingerprints, and GnuPG reports 8 or 16 hex digit
/// ids depending on version. Two identifiers match when the shorter one is a
/// suffix of the longer one.
pub fn key_id_matches(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.len() >= short.len()
        && long.is_char_boundary(long.len() - short.len())
        && long[long.len() - short.len()..].eq_ignore_ascii_case(short)
}

#[derive(Debug, Default)]
pub struct KeyRing {
    keys: Vec<KeyRef>,
}

pub type SharedKeyRing = Arc<RwLock<KeyRing>>;

impl KeyRing {
    pub fn new() -> Self {
        KeyRing::default()
    }

    pub fn shared() -> SharedKeyRing {
        Arc::new(RwLock::new(KeyRing::new()))
    }

    /// Adds a key, replacing an existing entry with the same fingerprint.
    pub fn add(&mut self, key: KeyRef) {
        self.keys.retain(|k| k.fingerprint != key.fingerprint);
        self.keys.push(key);
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyRef> {
        self.keys.iter()
    }

    pub fn find(&self, key_id: &str) -> Option<&KeyRef> {
        self.keys.iter().find(|k| k.matches(key_id))
    }

    pub fn passphrase_for(&self, key_id: &str) -> Option<&SecretString> {
        self.find(key_id).and_then(|k| k.passphrase.as_ref())
    }

    pub fn has_passphrases(&self) -> bool {
        self.keys.iter().any(|k| k.passphrase.is_some())
    }

    pub fn fingerprints(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.fingerprint.as_str()).collect()
    }

    /// Identifier to passphrase pairs handed to the relay process.
    pub fn pins(&self) -> BTreeMap<String, String> {
        let mut pins = BTreeMap::new();
        for key in &self.keys {
            if let Some(passphrase) = &key.passphrase {
                for id in key.identifiers() {
                    pins.insert(id.to_string(), passphrase.expose_secret().to_string());
                }
            }
        }
        pins
    }
}
