use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::erp::client::normalize_base_url;

/// Default endpoint version used when the instance does not say otherwise
pub const DEFAULT_API_VERSION: &str = "24.200.001";

/// Environment variable names for instance overrides
const ENV_INSTANCE_URL: &str = "ACUSCAN_INSTANCE_URL";
const ENV_TENANT: &str = "ACUSCAN_TENANT";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    instance: Option<InstanceConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct InstanceConfig {
    /// Instance base URL (e.g., "https://erp.example.com/entity-site")
    url: Option<String>,
    /// Tenant / company name (optional)
    tenant: Option<String>,
    /// Contract-based endpoint version (e.g., "24.200.001")
    api_version: Option<String>,
}

/// Runtime instance configuration
#[derive(Debug, Clone)]
pub struct InstanceEndpointConfig {
    /// Base URL of the ERP instance, normalized (no trailing slash)
    pub url: Option<String>,
    pub tenant: Option<String>,
    pub api_version: String,
    /// Source of the configuration (for logging)
    pub source: ConfigSource,
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// No stored or configured instance; only built-in defaults
    Default,
    /// Loaded from environment variable
    Environment,
    /// Loaded from config file
    ConfigFile,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::ConfigFile => write!(f, "config file"),
        }
    }
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("acuscan").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file() -> Option<ConfigFile> {
    let path = get_config_file_path()?;

    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Load instance configuration with priority:
/// 1. Environment variables (ACUSCAN_INSTANCE_URL, ACUSCAN_TENANT)
/// 2. Config file (~/.config/acuscan/config.toml)
/// 3. Nothing configured (the user must supply --url at login)
pub fn load_instance_config() -> InstanceEndpointConfig {
    // Priority 1: Environment variable
    if let Ok(url) = std::env::var(ENV_INSTANCE_URL) {
        let url = normalize_base_url(&url);
        if !url.is_empty() {
            tracing::info!("Using instance URL from environment variable: {}", url);

            let tenant = std::env::var(ENV_TENANT)
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());

            return InstanceEndpointConfig {
                url: Some(url),
                tenant,
                api_version: DEFAULT_API_VERSION.to_string(),
                source: ConfigSource::Environment,
            };
        }
    }

    // Priority 2: Config file
    if let Some(config) = load_config_file() {
        if let Some(instance) = config.instance {
            let url = instance
                .url
                .map(|u| normalize_base_url(&u))
                .filter(|u| !u.is_empty());

            if let Some(url) = url {
                tracing::info!("Using instance URL from config file: {}", url);

                let tenant = instance
                    .tenant
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty());

                let api_version = instance
                    .api_version
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

                return InstanceEndpointConfig {
                    url: Some(url),
                    tenant,
                    api_version,
                    source: ConfigSource::ConfigFile,
                };
            }
        }
    }

    // Priority 3: Nothing configured
    tracing::debug!("No instance URL configured");
    InstanceEndpointConfig {
        url: None,
        tenant: None,
        api_version: DEFAULT_API_VERSION.to_string(),
        source: ConfigSource::Default,
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/acuscan/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# AcuScan Agent Configuration
# Place this file at: ~/.config/acuscan/config.toml

[instance]
# Base URL of the ERP instance
# url = "https://erp.example.com/entity-site"

# Tenant / company name (optional, depends on the instance)
# tenant = "Company"

# Contract-based endpoint version
# Default: 24.200.001
# api_version = "24.200.001"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(ConfigSource::Default.to_string(), "default");
        assert_eq!(ConfigSource::Environment.to_string(), "environment variable");
        assert_eq!(ConfigSource::ConfigFile.to_string(), "config file");
    }

    #[test]
    fn test_example_config_parses() {
        // Uncommented form of the example must be valid TOML for ConfigFile
        let example = generate_example_config()
            .lines()
            .map(|l| l.strip_prefix("# ").filter(|s| s.contains('=')).unwrap_or(l))
            .collect::<Vec<_>>()
            .join("\n");
        let parsed: ConfigFile = toml::from_str(&example).expect("example config must parse");
        let instance = parsed.instance.expect("instance section present");
        assert_eq!(
            instance.url.as_deref(),
            Some("https://erp.example.com/entity-site")
        );
        assert_eq!(instance.api_version.as_deref(), Some(DEFAULT_API_VERSION));
    }

    #[test]
    fn test_config_file_tolerates_missing_sections() {
        let parsed: ConfigFile = toml::from_str("").unwrap();
        assert!(parsed.instance.is_none());
    }
}
