// src/infra/paths.rs — Config and data locations
//
// PARLEY_HOME overrides everything: config lives directly under it and data
// under $PARLEY_HOME/data. When unset, config uses ~/.parley/ and data uses
// the platform data-local directory (XDG_DATA_HOME/parley on Linux).

use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<Option<ProjectDirs>> = OnceLock::new();

fn project_dirs() -> Option<&'static ProjectDirs> {
    PROJECT_DIRS
        .get_or_init(|| ProjectDirs::from("", "", "parley"))
        .as_ref()
}

fn parley_home() -> Option<PathBuf> {
    std::env::var_os("PARLEY_HOME").map(PathBuf::from)
}

/// Home directory, or the current directory when none can be determined.
pub fn dirs_home() -> PathBuf {
    BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration directory: $PARLEY_HOME/ or ~/.parley/
pub fn config_dir() -> PathBuf {
    if let Some(home) = parley_home() {
        return home;
    }
    dirs_home().join(".parley")
}

/// Data directory: $PARLEY_HOME/data/ or ~/.local/share/parley/
pub fn data_dir() -> PathBuf {
    if let Some(home) = parley_home() {
        return home.join("data");
    }
    match project_dirs() {
        Some(p) => p.data_local_dir().to_path_buf(),
        None => config_dir().join("data"),
    }
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Append-only chat transcript
pub fn transcript_path() -> PathBuf {
    data_dir().join("chat").join("chat_log.txt")
}

/// Persistent usage counters
pub fn usage_path() -> PathBuf {
    data_dir().join("usage.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths_share_data_dir() {
        let data = data_dir();
        assert!(transcript_path().starts_with(&data));
        assert!(usage_path().starts_with(&data));
        assert_eq!(usage_path().file_name().unwrap(), "usage.json");
        assert_eq!(transcript_path().file_name().unwrap(), "chat_log.txt");
    }

    #[test]
    fn test_config_file_in_config_dir() {
        assert_eq!(config_file_path().parent().unwrap(), config_dir());
    }
}
