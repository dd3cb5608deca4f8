//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.shiftlog/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.
//!
//! Per-user preferences (currency, week start, ...) are not here: they live
//! in the backend's `settings` table and follow the account.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use simplelog::LevelFilter;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ShiftlogConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub refresh_interval_secs: Option<u64>,
    pub log_file: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
    pub email: Option<String>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_LOG_FILE: &str = "shiftlog.log";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub refresh_interval: Duration,
    pub log_file: String,
    pub log_level: LevelFilter,
    pub backend_url: String,
    pub anon_key: String,
    pub access_token: Option<String>,
    pub email: Option<String>,
    /// Only ever read from the environment.
    pub password: Option<String>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.shiftlog/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".shiftlog").join("config.toml"))
}

/// Load config from `~/.shiftlog/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `ShiftlogConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<ShiftlogConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(ShiftlogConfig::default());
        }
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<ShiftlogConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(ShiftlogConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: ShiftlogConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    // The access token stays out of the log
    debug!(
        "Config: refresh={:?} url={:?}",
        config.general.refresh_interval_secs, config.backend.url
    );
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
pub fn generate_default_config(path: &Path) {
    let default_content = r#"# Shiftlog Configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# refresh_interval_secs = 30         # Background reload, minimum 5
# log_file = "shiftlog.log"
# log_level = "debug"                # "error", "warn", "info", "debug", "trace"

# [backend]
# url = "https://your-project.supabase.co"   # Or SHIFTLOG_BACKEND_URL
# anon_key = "eyJ..."                         # Or SHIFTLOG_ANON_KEY
# access_token = "eyJ..."                     # Or SHIFTLOG_ACCESS_TOKEN
# email = "driver@example.com"                # Or SHIFTLOG_EMAIL
# The password is only read from SHIFTLOG_PASSWORD.
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn parse_level(raw: &str) -> Option<LevelFilter> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_backend_url` and `cli_refresh_secs` are from CLI flags (None = not specified).
pub fn resolve(
    config: &ShiftlogConfig,
    cli_backend_url: Option<&str>,
    cli_refresh_secs: Option<u64>,
) -> ResolvedConfig {
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    // Backend URL: CLI → env → config → default
    let backend_url = cli_backend_url
        .map(|s| s.to_string())
        .or_else(|| env("SHIFTLOG_BACKEND_URL"))
        .or_else(|| config.backend.url.clone())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());

    // Refresh: CLI → config → default, never below the minimum
    let refresh_secs = cli_refresh_secs
        .or(config.general.refresh_interval_secs)
        .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS)
        .max(MIN_REFRESH_INTERVAL_SECS);

    let log_level = match config.general.log_level.as_deref() {
        Some(raw) => parse_level(raw).unwrap_or_else(|| {
            warn!("Unknown log level '{}', using debug", raw);
            LevelFilter::Debug
        }),
        None => LevelFilter::Debug,
    };

    ResolvedConfig {
        refresh_interval: Duration::from_secs(refresh_secs),
        log_file: config
            .general
            .log_file
            .clone()
            .unwrap_or_else(|| DEFAULT_LOG_FILE.to_string()),
        log_level,
        backend_url,
        anon_key: env("SHIFTLOG_ANON_KEY")
            .or_else(|| config.backend.anon_key.clone())
            .unwrap_or_default(),
        access_token: env("SHIFTLOG_ACCESS_TOKEN").or_else(|| config.backend.access_token.clone()),
        email: env("SHIFTLOG_EMAIL").or_else(|| config.backend.email.clone()),
        password: env("SHIFTLOG_PASSWORD"),
    }
}
