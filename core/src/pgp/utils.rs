use zeroize::Zeroizing;

use crate::engine::Version;
use crate::key::KeyRef;
use crate::pgp::ImportResult;
use crate::status::tokenize;

/// Unattended key generation parameters for a signing primary key with an
/// encryption sub key. Curve keys from 2.1 on, RSA before. Without a
/// passphrase the secret key is stored unprotected.
pub fn key_parameters(
    version: &Version,
    name: &str,
    email: &str,
    passphrase: Option<&str>,
) -> Zeroizing<String> {
    let mut params = String::new();
    if version.at_least("2.1.0") {
        params.push_str("Key-Type: EDDSA\nKey-Curve: ed25519\n");
        params.push_str("Subkey-Type: ECDH\nSubkey-Curve: cv25519\n");
    } else {
        params.push_str("Key-Type: RSA\nKey-Length: 2048\n");
        params.push_str("Subkey-Type: RSA\nSubkey-Length: 2048\n");
    }
    params.push_str(&format!("Name-Real: {}\nName-Email: {}\nExpire-Date: 0\n", name, email));
    match passphrase {
        Some(passphrase) => params.push_str(&format!("Passphrase: {}\n", passphrase)),
        None if version.at_least("2.1.0") => params.push_str("%no-protection\n"),
        None => {}
    }
    params.push_str("%commit\n");
    Zeroizing::new(params)
}

/// Undoes the `\xNN` escaping GnuPG applies to colon listing fields.
pub(crate) fn unescape_colon_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && bytes[i + 1] == b'x' {
            if let Ok(value) = u8::from_str_radix(&field[i + 2..i + 4], 16) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Parses `--with-colons --fixed-list-mode` key listings. A `pub`/`sec`
/// record opens a key; the first `fpr` after it is the primary fingerprint,
/// later ones belong to sub keys; the first `uid` becomes the user id.
pub(crate) fn parse_colon_listing(listing: &str) -> Vec<KeyRef> {
    let mut keys: Vec<KeyRef> = Vec::new();
    let mut primary_pending = false;
    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields[0] {
            "pub" | "sec" => {
                keys.push(KeyRef::new(String::new()));
                primary_pending = true;
            }
            "fpr" => {
                let (Some(key), Some(fingerprint)) = (keys.last_mut(), fields.get(9)) else {
                    continue;
                };
                if primary_pending {
                    key.fingerprint = fingerprint.to_string();
                    primary_pending = false;
                } else if !key.sub_key_fingerprints.iter().any(|f| f == fingerprint) {
                    key.sub_key_fingerprints.push(fingerprint.to_string());
                }
            }
            "uid" => {
                let (Some(key), Some(user_id)) = (keys.last_mut(), fields.get(9)) else {
                    continue;
                };
                if key.user_id.is_none() {
                    key.user_id = Some(unescape_colon_field(user_id));
                }
            }
            _ => {}
        }
    }
    keys.retain(|k| !k.fingerprint.is_empty());
    keys
}

/// Applies one `IMPORT_OK` or `IMPORT_RES` status line.
pub(crate) fn apply_import_status(result: &mut ImportResult, line: &str) {
    let tokens = tokenize(line);
    let count = |idx: usize| tokens.get(idx).and_then(|t| t.parse::<u32>().ok()).unwrap_or(0);
    match tokens[0] {
        "IMPORT_OK" => {
            if let Some(fingerprint) = tokens.get(2) {
                if !result.fingerprints.iter().any(|f| f == fingerprint) {
                    result.fingerprints.push(fingerprint.to_string());
                }
            }
        }
        "IMPORT_RES" => {
            result.public_imported = count(3);
            result.public_unchanged = count(5);
            result.private_imported = count(11);
            result.private_unchanged = count(12);
        }
        _ => {}
    }
}

/// Fingerprint from `KEY_CREATED <type> <fingerprint> [handle]`.
pub(crate) fn created_fingerprint(line: &str) -> Option<String> {
    let tokens = tokenize(line);
    (tokens[0] == "KEY_CREATED").then(|| tokens.get(2).map(|f| f.to_string())).flatten()
}
