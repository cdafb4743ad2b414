use gpgmux_core::config::loader::default_config_path as core_default_config_path;
use gpgmux_core::util::fs_util::path_to_str;
use log::LevelFilter;

pub fn default_config_path() -> String {
    let path = core_default_config_path();

    match path_to_str(&path) {
        Ok(path) => path.into(),
        Err(_) => {
            eprintln!(
                "Error getting default config path, use '~/.config/gpgmux/config.toml' instead"
            );
            "~/.config/gpgmux/config.toml".into()
        }
    }
}

pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Warn;
pub const PINENTRY_BINARY: &str = "gpgmux-pinentry";

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpgmuxExitCode {
    Error = 1,
    ConfigError = 100,
    KeyNotFound = 101,
    BadPassphrase = 102,
    NoData = 103,
    BadSignature = 104,
    PGPError = 199,
}

impl From<GpgmuxExitCode> for i32 {
    fn from(val: GpgmuxExitCode) -> Self {
        val as i32
    }
}
