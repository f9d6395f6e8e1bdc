//! Application configuration for xnatkit.
//!
//! User config lives at `~/.xnatkit/xnatkit.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, XnatKitError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "xnatkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".xnatkit";

// ---------------------------------------------------------------------------
// Config structs (matching xnatkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// XNAT server connection settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Pipeline launcher settings.
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Upload settings.
    #[serde(default)]
    pub upload: UploadConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// XNAT base URL (e.g. `https://xnat.example.org/xnat`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// XNAT username; the password is never stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// HTTP request timeout in seconds (uploads can be large).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

/// `[launcher]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Seconds to wait after each pipeline launch.
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// CSV column holding the session identifiers.
    #[serde(default = "default_session_column")]
    pub session_column: String,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            delay_secs: default_delay_secs(),
            session_column: default_session_column(),
        }
    }
}

fn default_delay_secs() -> u64 {
    300
}
fn default_session_column() -> String {
    "Session".into()
}

/// `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Resource collection label for NIfTI files.
    #[serde(default = "default_nifti_resource")]
    pub nifti_resource: String,

    /// Resource collection label for raw PAR/REC files.
    #[serde(default = "default_parrec_resource")]
    pub parrec_resource: String,

    /// Resource collection label for QC snapshots.
    #[serde(default = "default_snapshot_resource")]
    pub snapshot_resource: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            nifti_resource: default_nifti_resource(),
            parrec_resource: default_parrec_resource(),
            snapshot_resource: default_snapshot_resource(),
        }
    }
}

fn default_nifti_resource() -> String {
    "NIFTI".into()
}
fn default_parrec_resource() -> String {
    "PARREC".into()
}
fn default_snapshot_resource() -> String {
    "SNAPSHOTS".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.xnatkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| XnatKitError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.xnatkit/xnatkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| XnatKitError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| XnatKitError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file at the standard location.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file at `path`, creating its directory.
///
/// An existing file is never overwritten.
pub fn init_config_at(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(XnatKitError::config(format!(
            "{} already exists; remove it first to reset the defaults",
            path.display()
        )));
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| XnatKitError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| XnatKitError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| XnatKitError::io(path, e))?;
    tracing::info!(?path, "created default config file");
    Ok(())
}

/// Validate an XNAT host URL and strip any trailing slash.
///
/// REST paths are appended as `{host}/data/...`, so `https://x.org/xnat/`
/// and `https://x.org/xnat` must resolve to the same base.
pub fn normalize_host(host: &str) -> Result<String> {
    let parsed = Url::parse(host.trim())
        .map_err(|e| XnatKitError::config(format!("invalid XNAT host '{host}': {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(XnatKitError::config(format!(
            "XNAT host '{host}' must use http or https"
        )));
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
