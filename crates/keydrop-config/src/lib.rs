//! Deployment configuration for keydrop.
//!
//! TOML file + `KEYDROP_` environment overlay, token resolution
//! (env var indirection or plaintext), and translation into the
//! settings `keydrop-store` and `keydrop-core` consume.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use keydrop_core::RedeemMode;
use keydrop_store::{TlsMode, TransportConfig};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no store token configured")]
    NoToken,

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub dispense: DispenseSection,

    #[serde(default)]
    pub admin: AdminSection,
}

/// Store endpoint settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct StoreSection {
    /// Redis REST endpoint URL (e.g., "https://example.upstash.io").
    pub url: Option<String>,

    /// Bearer token (plaintext — prefer `token_env`).
    pub token: Option<String>,

    /// Environment variable name containing the bearer token.
    pub token_env: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Accept invalid TLS certificates (self-hosted stores).
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            token_env: Some("KEYDROP_STORE_TOKEN".into()),
            timeout: default_timeout(),
            insecure: false,
            ca_cert: None,
        }
    }
}

/// Dispense / redemption settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct DispenseSection {
    /// What redemption does to an entry: "mark" or "delete".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Scan page size for category enumeration.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for DispenseSection {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            page_size: default_page_size(),
        }
    }
}

/// Administrative workflow settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct AdminSection {
    /// Clear confirmation window in seconds (10-60).
    #[serde(default = "default_confirm_window")]
    pub confirm_window: u64,
}

impl Default for AdminSection {
    fn default() -> Self {
        Self {
            confirm_window: default_confirm_window(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_mode() -> String {
    "mark".into()
}
fn default_page_size() -> usize {
    100
}
fn default_confirm_window() -> u64 {
    30
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "keydrop", "keydrop").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("keydrop");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from an explicit file path + environment.
///
/// Environment keys use double underscores for section nesting, e.g.
/// `KEYDROP_STORE__URL`, `KEYDROP_ADMIN__CONFIRM_WINDOW`.
pub fn load_config_from(path: &std::path::Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("KEYDROP_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning defaults if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(&path, toml_str)?;
    Ok(())
}

// ── Translation to runtime settings ─────────────────────────────────

/// Everything needed to open a `RestStore`.
#[derive(Debug)]
pub struct StoreSettings {
    pub url: Url,
    pub token: SecretString,
    pub transport: TransportConfig,
}

/// Resolve the bearer token from the credential chain:
/// `token_env` -> environment lookup, then plaintext `token`.
pub fn resolve_token(section: &StoreSection) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = section.token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Some(ref token) = section.token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoToken)
}

/// Build `StoreSettings` from the store section.
pub fn store_settings(section: &StoreSection) -> Result<StoreSettings, ConfigError> {
    let raw_url = section.url.as_ref().ok_or_else(|| ConfigError::Validation {
        field: "store.url".into(),
        reason: "missing store endpoint URL".into(),
    })?;
    let url: Url = raw_url.parse().map_err(|_| ConfigError::Validation {
        field: "store.url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;

    let token = resolve_token(section)?;

    let tls = if section.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = section.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    Ok(StoreSettings {
        url,
        token,
        transport: TransportConfig {
            tls,
            timeout: Duration::from_secs(section.timeout),
        },
    })
}

/// Parse the redemption mode string.
pub fn redeem_mode(section: &DispenseSection) -> Result<RedeemMode, ConfigError> {
    match section.mode.as_str() {
        "mark" => Ok(RedeemMode::MarkRedeemed),
        "delete" => Ok(RedeemMode::Delete),
        other => Err(ConfigError::Validation {
            field: "dispense.mode".into(),
            reason: format!("expected 'mark' or 'delete', got '{other}'"),
        }),
    }
}

/// Validate and convert the confirmation window (10-60 seconds).
pub fn confirm_window(section: &AdminSection) -> Result<Duration, ConfigError> {
    if !(10..=60).contains(&section.confirm_window) {
        return Err(ConfigError::Validation {
            field: "admin.confirm_window".into(),
            reason: format!(
                "must be between 10 and 60 seconds, got {}",
                section.confirm_window
            ),
        });
    }
    Ok(Duration::from_secs(section.confirm_window))
}
