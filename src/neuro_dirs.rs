//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/neuro/` | `~/.config/neuro/` |
//! | Data | `~/Library/Application Support/neuro/` | `~/.local/share/neuro/` |
//!
//! Both can be overridden with `NEURO_CONFIG_DIR` / `NEURO_DATA_DIR`.

use std::path::PathBuf;

/// Application data root directory (`dirs::data_dir()/neuro/`).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NEURO_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("neuro"))
        .unwrap_or_else(|| PathBuf::from("/tmp/neuro-data"))
}

/// Application config directory (`dirs::config_dir()/neuro/`).
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("NEURO_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("neuro"))
        .unwrap_or_else(|| PathBuf::from("/tmp/neuro-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
