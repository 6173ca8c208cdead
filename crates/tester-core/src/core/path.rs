use crate::core::error::{TesterError, TesterResult};
use std::path::{Path, PathBuf};

/// Name of the per-user directories used by Integration Tester
pub const APP_DIR: &str = "integration-tester";

/// Get the Integration Tester home directory
///
/// Platform-specific locations:
/// - Windows: %APPDATA%\integration-tester
/// - Linux: ~/.config/integration-tester
/// - macOS: ~/Library/Application Support/integration-tester
pub fn tester_home() -> TesterResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| TesterError::Path("Could not determine config directory".to_string()))?;
    Ok(config_dir.join(APP_DIR))
}

/// Get the config file path
pub fn config_file() -> TesterResult<PathBuf> {
    Ok(tester_home()?.join("config.yaml"))
}

/// Get the data directory holding persisted entries and problems
///
/// Platform-specific locations:
/// - Windows: %APPDATA%\integration-tester
/// - Linux: ~/.local/share/integration-tester
/// - macOS: ~/Library/Application Support/integration-tester
pub fn data_dir() -> TesterResult<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| TesterError::Path("Could not determine data directory".to_string()))?;
    Ok(data_dir.join(APP_DIR))
}

/// Get the cache directory for downloaded archives
pub fn cache_dir() -> TesterResult<PathBuf> {
    let cache_dir = dirs::cache_dir()
        .ok_or_else(|| TesterError::Path("Could not determine cache directory".to_string()))?;
    Ok(cache_dir.join(APP_DIR))
}

/// Persisted installation entries (./entries.yaml under the data directory)
pub fn entries_file(data_dir: &Path) -> PathBuf {
    data_dir.join("entries.yaml")
}

/// Persisted operator-visible problems (./issues.yaml under the data directory)
pub fn issues_file(data_dir: &Path) -> PathBuf {
    data_dir.join("issues.yaml")
}

/// Lock files shared by every process using the data directory
pub fn locks_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("locks")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> TesterResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Sibling path used for staging or backups next to `path`
///
/// `sibling_path("/x/custom_components/hue", "staging")` is
/// `/x/custom_components/.hue.staging`.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let hidden = format!(".{}.{}", name, suffix);
    match path.parent() {
        Some(parent) => parent.join(hidden),
        None => PathBuf::from(hidden),
    }
}
