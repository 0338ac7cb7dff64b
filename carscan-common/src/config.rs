//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable consulted for the root folder when no CLI argument is given
pub const ROOT_FOLDER_ENV: &str = "CARSCAN_ROOT_FOLDER";

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. `root_folder` key in the user config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&Path>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: User config file
    if let Some(root_folder) = user_config_file().and_then(|path| root_folder_from_file(&path)) {
        return root_folder;
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Read `root_folder` from a TOML file, ignoring unreadable or malformed files
fn root_folder_from_file(path: &Path) -> Option<PathBuf> {
    let content = std::fs::read_to_string(path).ok()?;
    let value = toml::from_str::<toml::Value>(&content).ok()?;
    value
        .get("root_folder")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

/// Location of the per-user config file (`~/.config/carscan/config.toml` on Linux)
///
/// Returns `None` when the platform has no config directory or the file is absent.
pub fn user_config_file() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("carscan").join("config.toml");
    path.exists().then_some(path)
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/carscan (or /var/lib/carscan for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("carscan"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/carscan"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/carscan
        dirs::data_dir()
            .map(|d| d.join("carscan"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/carscan"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\carscan
        dirs::data_local_dir()
            .map(|d| d.join("carscan"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\carscan"))
    } else {
        PathBuf::from("./carscan_data")
    }
}

/// Create the directory (and parents) if missing
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        info!("Created directory: {}", path.display());
    }
    if !path.is_dir() {
        return Err(Error::Config(format!(
            "Path exists but is not a directory: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Load a TOML config file into `T`
///
/// A missing file is not an error: a warning is logged and `T::default()` is
/// returned so the service can start with compiled defaults. A file that exists
/// but cannot be read or parsed is a configuration error.
pub fn load_toml_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        warn!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}
