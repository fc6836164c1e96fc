// Credentials handling: the `strava_config.json` file written by the
// `authorize` flow, and the `STRAVA_*` environment variables used as a
// fallback when the file is absent or leaves a field empty.

use crate::error::{Result, UploadError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "strava_config.json";

pub const ENV_CLIENT_ID: &str = "STRAVA_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "STRAVA_CLIENT_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "STRAVA_ACCESS_TOKEN";

/// Contents of `strava_config.json`. Only `access_token` is needed to
/// upload; the client id/secret and refresh token are used by the
/// `authorize` and `refresh` flows.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct StravaConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Unix timestamp (seconds) at which `access_token` stops working.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl StravaConfig {
    /// Parse a config file. Fails if the file is missing or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data)
            .map_err(|e| UploadError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write the config as pretty-printed JSON, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        debug!(path = %path.display(), "saved strava config");
        Ok(())
    }

    /// Effective credentials from the process environment and `path`.
    pub fn resolve(path: &Path) -> Result<Self> {
        Self::resolve_with(path, |key| std::env::var(key).ok())
    }

    /// Same as [`StravaConfig::resolve`] with an injectable environment.
    /// Non-empty values from the file win; empty or missing ones fall back
    /// to the environment. A missing file means environment only.
    pub fn resolve_with<F>(path: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_or_empty = |key: &str| env(key).unwrap_or_default();
        let mut cfg = StravaConfig {
            client_id: env_or_empty(ENV_CLIENT_ID),
            client_secret: env_or_empty(ENV_CLIENT_SECRET),
            access_token: env_or_empty(ENV_ACCESS_TOKEN),
            ..Default::default()
        };

        if !path.exists() {
            debug!(path = %path.display(), "no config file, using environment only");
            return Ok(cfg);
        }

        let file = Self::load(path)?;
        debug!(path = %path.display(), "loaded config file");
        overlay(&mut cfg.client_id, file.client_id);
        overlay(&mut cfg.client_secret, file.client_secret);
        overlay(&mut cfg.access_token, file.access_token);
        cfg.refresh_token = file.refresh_token.filter(|t| !t.trim().is_empty());
        cfg.expires_at = file.expires_at;
        Ok(cfg)
    }

    /// The trimmed access token, or `MissingToken` if there is none.
    pub fn require_token(&self) -> Result<&str> {
        let token = self.access_token.trim();
        if token.is_empty() {
            return Err(UploadError::MissingToken);
        }
        Ok(token)
    }

    /// True when the expiry is known and lies at or before `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

fn overlay(slot: &mut String, value: String) {
    if !value.trim().is_empty() {
        *slot = value;
    }
}

/// Location of the config file when `--config` is not given:
/// `./strava_config.json` if present, otherwise the per-user copy under
/// the platform config dir if present, otherwise `./strava_config.json`.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return local;
    }
    match user_config_path() {
        Some(user) if user.exists() => user,
        _ => local,
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("strava-uploader").join(CONFIG_FILE_NAME))
}
