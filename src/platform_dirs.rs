/// Cross-platform directory management for the command gate
///
/// Uses the `dirs` crate to handle platform-specific directories
/// following OS conventions:
/// - Linux/Unix: XDG Base Directory Specification
/// - macOS: Apple directory guidelines
/// - Windows: Windows directory standards
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "command-gate";

/// Get the data directory for the command gate
///
/// Returns platform-specific data directory:
/// - Linux: `$XDG_DATA_HOME/command-gate` or `~/.local/share/command-gate`
/// - macOS: `~/Library/Application Support/command-gate`
/// - Windows: `%LOCALAPPDATA%\command-gate`
pub fn data_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Unable to determine data directory"))?;
    Ok(base_dir.join(APP_DIR))
}

/// Get the config directory for the command gate
///
/// Returns platform-specific config directory:
/// - Linux: `$XDG_CONFIG_HOME/command-gate` or `~/.config/command-gate`
/// - macOS: `~/Library/Application Support/command-gate`
/// - Windows: `%APPDATA%\command-gate`
pub fn config_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
    Ok(base_dir.join(APP_DIR))
}

/// Default configuration file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Directory for hook-mode log files, under the data directory
pub fn logs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
