use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::{anyhow, Result};

pub fn find_executable_in_path(executable: &str) -> Option<PathBuf> {
    let candidate = Path::new(executable);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    if let Some(paths) = env::var_os("PATH") {
        for path in env::split_paths(&paths) {
            let full_path = path.join(executable);

            if is_executable(&full_path) {
                return Some(full_path);
            }
        }
    }
    None
}

/// Resolves `executable` through `PATH`, falling back to the name itself so
/// the error surfaces where the program is actually spawned.
pub fn resolve_executable(executable: &str) -> PathBuf {
    find_executable_in_path(executable).unwrap_or_else(|| PathBuf::from(executable))
}

pub fn is_executable(path: &Path) -> bool {
    if path.is_file() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::metadata(path)
                .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }

        #[cfg(windows)]
        {
            path.extension()
                .map(|ext| ext == "exe" || ext == "bat" || ext == "cmd")
                .unwrap_or(false)
        }
    } else {
        false
    }
}

/// Probes by creating an anonymous temporary file inside `dir`.
pub fn is_writable_dir(dir: &Path) -> bool {
    dir.is_dir() && tempfile::tempfile_in(dir).is_ok()
}

pub fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or(PathBuf::from("~"))
}

pub fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| anyhow!("Invalid path {:?}", path))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[cfg(unix)]
    #[test]
    fn finds_shell_in_path() {
        let sh = find_executable_in_path("sh").unwrap();
        assert!(sh.is_absolute());
        assert_eq!(find_executable_in_path(sh.to_str().unwrap()), Some(sh));
    }

    #[test]
    fn unknown_executable_resolves_to_name() {
        assert_eq!(
            resolve_executable("definitely-not-a-real-binary-4711"),
            PathBuf::from("definitely-not-a-real-binary-4711")
        );
    }

    #[test]
    fn temp_dir_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(is_writable_dir(dir.path()));
        assert!(!is_writable_dir(&dir.path().join("missing")));
    }
}
