use std::fs;

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;

/// Top-level application configuration.
///
/// Loaded once per process lifetime and passed explicitly into the pipeline;
/// no component reads ambient global state.
#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub warehouse: WarehouseSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
    #[serde(default)]
    pub archive: ArchiveSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            name: default_server_name(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_server_name() -> String {
    "Quarry Server".to_string()
}

/// Connection settings for the analytics warehouse REST API.
#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub dataset: String,
    /// Warehouse-side result cap per query; the enforcement point for
    /// caller-supplied `limit` values.
    #[serde(default = "default_max_results")]
    pub max_results: u64,
    #[serde(default)]
    pub credentials: CredentialsSettings,
}

impl Default for WarehouseSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            project: String::new(),
            dataset: String::new(),
            max_results: default_max_results(),
            credentials: CredentialsSettings::default(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:9050".to_string()
}

fn default_max_results() -> u64 {
    10000
}

/// How warehouse session credentials are acquired.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsSettings {
    /// A pre-issued token, typically injected via environment
    Static { token: SecretString },
    /// OAuth 2.0 Client Credentials flow against a token endpoint
    OauthClientCredentials {
        client_id: String,
        client_secret: SecretString,
        token_url: String,
        #[serde(default)]
        scopes: Vec<String>,
    },
}

impl Default for CredentialsSettings {
    fn default() -> Self {
        Self::Static {
            token: SecretString::from(String::new()),
        }
    }
}

/// Best-effort archival of formatted results to object storage.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ArchiveSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    /// Query names eligible for archival
    #[serde(default)]
    pub queries: Vec<String>,
    /// Caller identities recognized as internal systems
    #[serde(default)]
    pub internal_identities: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_directory")]
    pub directory: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            directory: default_catalog_directory(),
        }
    }
}

fn default_catalog_directory() -> String {
    "queries".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetrySettings {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            endpoint: default_telemetry_endpoint(),
        }
    }
}

fn default_service_name() -> String {
    "quarry".to_string()
}

fn default_telemetry_endpoint() -> String {
    "http://localhost:4317".to_string()
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file at {}", path))?;
        let mut config: AppConfig = serde_yaml::from_str(&content)
            .context(format!("Failed to parse config file at {}", path))?;

        // Environment variable overrides
        if let Ok(addr) = std::env::var("QUARRY_SERVER__LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }
        if let Ok(url) = std::env::var("QUARRY_WAREHOUSE__API_URL") {
            config.warehouse.api_url = url;
        }
        if let Ok(dir) = std::env::var("QUARRY_CATALOG__DIRECTORY") {
            config.catalog.directory = dir;
        }
        if let Ok(token) = std::env::var("QUARRY_WAREHOUSE__TOKEN") {
            config.warehouse.credentials = CredentialsSettings::Static {
                token: SecretString::from(token),
            };
        }

        Ok(config)
    }
}
