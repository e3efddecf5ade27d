//! Credential and settings persistence.
//!
//! Two kinds of state are stored:
//!
//! - `StoredSettings`: non-secret connection details (instance url, tenant,
//!   username, api version). Always persisted, as a plain JSON file, so the
//!   next login is prefilled.
//! - `StoredSecret`: the bearer token (or the cookie-mode marker), persisted
//!   only when the user opts in. Storage priority:
//!   1. Platform keyring (if the `keyring-storage` feature is enabled)
//!   2. File-based storage (owner-only permissions on Unix)
//!
//! Cookie-mode sessions live in an in-memory cookie jar and do not survive a
//! process restart; a persisted cookie marker therefore reports
//! "unauthenticated, re-login required" rather than pretending otherwise.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::DEFAULT_API_VERSION;
use crate::erp::client::{AuthMode, ErpClient, VerifyResult};

#[cfg(feature = "keyring-storage")]
use keyring::Entry;

/// Service name used for keyring storage
#[cfg(feature = "keyring-storage")]
const KEYRING_SERVICE: &str = "acuscan-agent";
/// Username used for the keyring entry
#[cfg(feature = "keyring-storage")]
const KEYRING_USER: &str = "session";

const SETTINGS_FILE: &str = "settings.json";
const SECRET_FILE: &str = ".session";

/// Non-secret connection settings, persisted on every successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSettings {
    pub instance_url: String,
    pub tenant: String,
    pub username: String,
    pub api_version: String,
    /// Whether the user opted in to secret persistence.
    pub remember_secret: bool,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
}

impl Default for StoredSettings {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            tenant: String::new(),
            username: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            remember_secret: false,
            last_login: None,
        }
    }
}

/// The secret half of a session, persisted only with opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredSecret {
    #[serde(flatten)]
    pub mode: StoredMode,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StoredMode {
    Bearer { access_token: String },
    /// Marker only: the cookie jar itself is not persisted.
    Cookie,
}

/// Snapshot of authentication state, as reported by `check_auth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub instance_url: Option<String>,
    pub tenant: Option<String>,
    pub username: Option<String>,
    pub api_version: Option<String>,
    pub auth_mode: Option<String>,
}

impl AuthStatus {
    fn unauthenticated() -> Self {
        Self {
            authenticated: false,
            instance_url: None,
            tenant: None,
            username: None,
            api_version: None,
            auth_mode: None,
        }
    }
}

/// Get the acuscan config directory
fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .context("Failed to find config directory")?;
    Ok(config_dir.join("acuscan"))
}

fn get_settings_path() -> Result<PathBuf> {
    let dir = get_config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir.join(SETTINGS_FILE))
}

fn get_secret_file_path() -> Result<PathBuf> {
    let dir = get_config_dir()?;
    if !dir.exists() {
        fs::create_dir_all(&dir).context("Failed to create config directory")?;
    }
    Ok(dir.join(SECRET_FILE))
}

// ============================================================================
// Settings (non-secret, always file-based)
// ============================================================================

pub fn load_settings() -> Result<Option<StoredSettings>> {
    let path = get_settings_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).context("Failed to read settings file")?;
    let settings: StoredSettings =
        serde_json::from_str(&content).context("Failed to parse settings file")?;
    Ok(Some(settings))
}

pub fn save_settings(settings: &StoredSettings) -> Result<()> {
    let path = get_settings_path()?;
    let json =
        serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(&path, json).context("Failed to write settings file")?;
    tracing::debug!("Settings saved to {:?}", path);
    Ok(())
}

pub fn delete_settings() -> Result<()> {
    let path = get_settings_path()?;
    if path.exists() {
        fs::remove_file(&path).context("Failed to delete settings file")?;
    }
    Ok(())
}

// ============================================================================
// File-based secret storage (always available)
// ============================================================================

fn save_secret_to_file(secret: &StoredSecret) -> Result<()> {
    let path = get_secret_file_path()?;
    let json = serde_json::to_string(secret).context("Failed to serialize secret")?;

    // Owner read/write only on Unix
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .context("Failed to create secret file")?;
        file.write_all(json.as_bytes())
            .context("Failed to write secret")?;
    }

    #[cfg(not(unix))]
    {
        fs::write(&path, &json).context("Failed to write secret file")?;
    }

    tracing::debug!("Session secret saved to file: {:?}", path);
    Ok(())
}

fn load_secret_from_file() -> Result<Option<StoredSecret>> {
    let path = get_secret_file_path()?;
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path).context("Failed to read secret file")?;
    let secret: StoredSecret =
        serde_json::from_str(&content).context("Failed to parse secret file")?;
    Ok(Some(secret))
}

fn delete_secret_from_file() {
    if let Ok(path) = get_secret_file_path() {
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!("Failed to delete secret file: {}", e);
            }
        }
    }
}

// ============================================================================
// Keyring-based secret storage (optional, platform-specific)
// ============================================================================

#[cfg(feature = "keyring-storage")]
fn get_keyring_entry() -> Result<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_USER)
        .map_err(|e| anyhow::anyhow!("Failed to create keyring entry: {}", e))
}

#[cfg(feature = "keyring-storage")]
fn save_secret_to_keyring(secret: &StoredSecret) -> Result<()> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Keyring unavailable ({}), using file storage", e);
            return save_secret_to_file(secret);
        }
    };

    let json = serde_json::to_string(secret).context("Failed to serialize secret")?;
    if let Err(e) = entry.set_password(&json) {
        tracing::warn!("Failed to save secret to keyring: {}, using file storage", e);
        return save_secret_to_file(secret);
    }

    tracing::debug!("Session secret saved to keyring");
    Ok(())
}

#[cfg(feature = "keyring-storage")]
fn load_secret_from_keyring() -> Result<Option<StoredSecret>> {
    let entry = match get_keyring_entry() {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Keyring unavailable ({}), trying file fallback", e);
            return load_secret_from_file();
        }
    };

    match entry.get_password() {
        Ok(json) => {
            let secret: StoredSecret =
                serde_json::from_str(&json).context("Failed to parse secret from keyring")?;
            Ok(Some(secret))
        }
        Err(keyring::Error::NoEntry) => load_secret_from_file(),
        Err(e) => {
            tracing::warn!("Failed to read keyring: {}, trying file fallback", e);
            load_secret_from_file()
        }
    }
}

#[cfg(feature = "keyring-storage")]
fn delete_secret_from_keyring() {
    // Always clear the file fallback as well
    delete_secret_from_file();

    if let Ok(entry) = get_keyring_entry() {
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => tracing::warn!("Failed to delete secret from keyring: {}", e),
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Persist the session secret (opt-in only; the caller gates on the user's
/// remember flag).
pub fn save_secret(secret: &StoredSecret) -> Result<()> {
    #[cfg(feature = "keyring-storage")]
    return save_secret_to_keyring(secret);

    #[cfg(not(feature = "keyring-storage"))]
    save_secret_to_file(secret)
}

/// Load the persisted secret, dropping it if expired.
pub fn load_secret() -> Result<Option<StoredSecret>> {
    #[cfg(feature = "keyring-storage")]
    let secret = load_secret_from_keyring()?;

    #[cfg(not(feature = "keyring-storage"))]
    let secret = load_secret_from_file()?;

    if let Some(ref s) = secret {
        if let Some(expires_at) = s.expires_at {
            if chrono::Utc::now() > expires_at {
                tracing::info!("Stored session expired, deleting");
                delete_secret();
                return Ok(None);
            }
        }
    }

    Ok(secret)
}

/// Remove the persisted secret from every storage location.
pub fn delete_secret() {
    #[cfg(feature = "keyring-storage")]
    delete_secret_from_keyring();

    #[cfg(not(feature = "keyring-storage"))]
    delete_secret_from_file();
}

/// Rebuild a session client from persisted state, if possible.
///
/// Returns `None` when nothing usable is stored: no settings, no secret, or
/// a cookie-mode marker (the jar is gone, so the session is too).
pub fn restore_session() -> Result<Option<ErpClient>> {
    let settings = match load_settings()? {
        Some(s) if !s.instance_url.is_empty() => s,
        _ => return Ok(None),
    };

    let secret = match load_secret()? {
        Some(s) => s,
        None => return Ok(None),
    };

    match secret.mode {
        StoredMode::Bearer { access_token } => {
            let client = ErpClient::new(
                &settings.instance_url,
                &settings.tenant,
                &settings.api_version,
                AuthMode::Bearer(access_token),
            )
            .context("Failed to build session client")?;
            Ok(Some(client))
        }
        StoredMode::Cookie => {
            tracing::debug!("Stored session is cookie-mode; re-login required");
            Ok(None)
        }
    }
}

/// Check authentication state, probing the server when a session exists.
///
/// A rejected probe (401/403) clears the stored secret; an unreachable
/// server is not an auth failure and the session is assumed still valid.
pub async fn check_auth() -> Result<AuthStatus> {
    let settings = load_settings()?.unwrap_or_default();

    let client = match restore_session()? {
        Some(c) => c,
        None => return Ok(AuthStatus::unauthenticated()),
    };

    let status = AuthStatus {
        authenticated: true,
        instance_url: Some(settings.instance_url.clone()),
        tenant: Some(settings.tenant.clone()),
        username: Some(settings.username.clone()),
        api_version: Some(settings.api_version.clone()),
        auth_mode: Some(client.mode().describe().to_string()),
    };

    match client.verify().await {
        VerifyResult::Valid => {
            tracing::debug!("Session verified");
            Ok(status)
        }
        VerifyResult::Rejected => {
            tracing::warn!("Session rejected by server, clearing stored secret");
            delete_secret();
            Ok(AuthStatus::unauthenticated())
        }
        VerifyResult::Unreachable(reason) => {
            tracing::info!("Could not verify session ({}), assuming still valid", reason);
            Ok(status)
        }
    }
}

/// Log out: best-effort server logout, then wipe the stored secret.
/// Settings are kept so the next login is prefilled.
pub async fn logout() -> Result<()> {
    if let Some(client) = restore_session()? {
        client.logout().await;
    }
    delete_secret();
    tracing::info!("Logged out, stored secret cleared");
    Ok(())
}

/// Describe where secrets are kept (for `status`/`config` output).
pub fn get_credential_storage_info() -> String {
    #[cfg(all(feature = "keyring-storage", target_os = "windows"))]
    {
        "Windows Credential Manager (with file fallback)".to_string()
    }
    #[cfg(all(feature = "keyring-storage", target_os = "macos"))]
    {
        "macOS Keychain (with file fallback)".to_string()
    }
    #[cfg(all(feature = "keyring-storage", target_os = "linux"))]
    {
        "Linux Secret Service (GNOME Keyring/KWallet, with file fallback)".to_string()
    }
    #[cfg(not(feature = "keyring-storage"))]
    {
        let path = get_secret_file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "~/.config/acuscan/.session".to_string());
        format!("File-based storage: {}", path)
    }
}
