use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use super::{EngineConfig, EngineConfigSerializable};
use crate::util::fs_util::get_home_dir;

pub fn default_config_path() -> PathBuf {
    get_home_dir().join(".config/gpgmux/config.toml")
}

/// Loads a TOML config. A missing file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("Config {:?} not found, using defaults", path);
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    let serializable: EngineConfigSerializable = toml::from_str(&content)?;
    Ok(serializable.into())
}

pub fn save_config<P: AsRef<Path>>(config: &EngineConfig, path: P) -> Result<()> {
    let serializable_data: EngineConfigSerializable = config.clone().into();
    let toml_str = toml::to_string_pretty(&serializable_data)?;
    fs::write(path, toml_str)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let test_config = EngineConfig {
            debug: true,
            ..EngineConfig::default().with_homedir(dir.path())
        };
        save_config(&test_config, &config_path).unwrap();
        let loaded_config = load_config(&config_path).unwrap();
        assert_eq!(test_config, loaded_config);
    }

    #[test]
    fn partial_config_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "binary = \"/usr/local/bin/gpg2\"\n").unwrap();

        let loaded = load_config(&config_path).unwrap();
        assert_eq!(loaded.binary, "/usr/local/bin/gpg2");
        assert_eq!(loaded.agent, "gpg-agent");
        assert_eq!(loaded.homedir, None);
        assert!(!loaded.debug);
    }

    #[test]
    fn missing_config_is_default() {
        let loaded = load_config("/nonexistent/gpgmux/config.toml").unwrap();
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn save_config_invalid_path() {
        let test_config = EngineConfig::default();
        assert!(save_config(&test_config, "/nonexistent-dir/\0file.toml").is_err());
    }
}
