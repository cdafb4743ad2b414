use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::{env, fs};

use tempfile::env::temp_dir;
use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::pgp::utils::key_parameters;
use crate::pgp::GpgClient;
use crate::util::fs_util::find_executable_in_path;

macro_rules! log_test {
    ($($arg:tt)*) => {
        #[cfg(test)]
        {
            println!($($arg)*);
        }
    };
}

pub fn get_test_username() -> String {
    env::var("GPGMUX_TEST_USERNAME").unwrap_or("gpgmux-test".into())
}

pub fn get_test_email() -> String {
    env::var("GPGMUX_TEST_EMAIL").unwrap_or("test@gpgmux.rs".into())
}

pub fn get_test_executable() -> String {
    env::var("GPGMUX_TEST_EXECUTABLE").unwrap_or("gpg".into())
}

/// Tests that drive a real GnuPG return early when none is installed.
pub fn gpg_available() -> bool {
    let available = find_executable_in_path(&get_test_executable()).is_some();
    if !available {
        log_test!("{} not found, skipping", get_test_executable());
    }
    available
}

/// Fresh GnuPG home directory below a short temp path, so agent socket paths
/// stay within the platform limit.
pub(crate) fn gen_unique_temp_dir() -> (TempDir, PathBuf) {
    let base_dir = temp_dir().join("gpgmux-test");
    if !base_dir.exists() {
        let _ = fs::create_dir(&base_dir);
    }
    let dir = TempDir::new_in(base_dir).unwrap();
    let path = dir.path().to_path_buf();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).unwrap();
    (dir, path)
}

pub(crate) fn test_client(home: &Path) -> GpgClient {
    let config = EngineConfig { binary: get_test_executable(), ..EngineConfig::default() };
    GpgClient::new(config.with_homedir(home))
}

/// Client on a fresh home directory holding one generated key pair.
pub(crate) fn client_with_key() -> (TempDir, GpgClient, String) {
    let (dir, path) = gen_unique_temp_dir();
    let mut client = test_client(&path);
    let version = client.version().unwrap();
    let params = key_parameters(&version, &get_test_username(), &get_test_email(), None);
    let fingerprint = client.generate_key(&params).unwrap();
    (dir, client, fingerprint)
}
