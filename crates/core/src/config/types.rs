use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::driver::DriverConfig;
use crate::inventory::InventoryConfig;
use crate::launcher::{LauncherBackend, LauncherConfig};
use crate::request_source::RequestSourceConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub provider: ProviderConfig,
    pub request_source: RequestSourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
}

/// Identity of this depot towards the request source
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub id: String,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// How long a writer waits for the SQLite lock before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("depot.db")
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub provider: ProviderConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub inventory: InventoryConfig,
    pub driver: DriverConfig,
    pub request_source: SanitizedRequestSourceConfig,
    pub launcher: SanitizedLauncherConfig,
}

/// Sanitized request source config (token hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedRequestSourceConfig {
    pub url: String,
    pub api_token_configured: bool,
    pub timeout_secs: u64,
}

/// Sanitized launcher config (environment values hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLauncherConfig {
    pub backend: String,
    pub image: String,
    pub name_prefix: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Names of the extra environment variables passed to producers.
    pub env_keys: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let docker = &config.launcher.docker;
        Self {
            provider: config.provider.clone(),
            server: config.server.clone(),
            database: config.database.clone(),
            inventory: config.inventory.clone(),
            driver: config.driver.clone(),
            request_source: SanitizedRequestSourceConfig {
                url: config.request_source.url.clone(),
                api_token_configured: config
                    .request_source
                    .api_token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.request_source.timeout_secs,
            },
            launcher: SanitizedLauncherConfig {
                backend: match config.launcher.backend {
                    LauncherBackend::Docker => "docker".to_string(),
                },
                image: docker.image.clone(),
                name_prefix: docker.name_prefix.clone(),
                label: docker.label.clone(),
                network: docker.network.clone(),
                env_keys: docker.env.keys().cloned().collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[provider]
id = "provider-1"

[request_source]
url = "http://localhost:4000"
"#;

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.provider.id, "provider-1");
        assert_eq!(config.request_source.url, "http://localhost:4000");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "depot.db");
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.inventory.minimum_entries, 50);
        assert_eq!(config.driver.max_outstanding_jobs, 1);
        assert_eq!(config.launcher.backend, LauncherBackend::Docker);
    }

    #[test]
    fn test_deserialize_missing_provider_fails() {
        let toml = r#"
[request_source]
url = "http://localhost:4000"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[provider]
id = "provider-1"

[server]
host = "127.0.0.1"
port = 9000

[database]
path = "/data/depot.sqlite"
busy_timeout_ms = 250

[inventory]
minimum_entries = 10

[driver]
poll_interval_ms = 1000
retention_secs = 60

[request_source]
url = "https://requests.example.com/api"
api_token = "secret"
timeout_secs = 5

[launcher]
backend = "docker"

[launcher.docker]
image = "producer:2"
network = "depot"

[launcher.docker.env]
DATABASE_URL = "postgres://depot:secret@db/depot"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.busy_timeout_ms, 250);
        assert_eq!(config.inventory.minimum_entries, 10);
        assert_eq!(config.driver.poll_interval_ms, 1000);
        assert_eq!(config.driver.retention_secs, 60);
        assert_eq!(config.request_source.api_token.as_deref(), Some("secret"));
        assert_eq!(config.launcher.docker.image, "producer:2");
        assert_eq!(config.launcher.docker.network.as_deref(), Some("depot"));
        assert_eq!(config.launcher.docker.env.len(), 1);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.request_source.api_token = Some("secret-token".to_string());
        config
            .launcher
            .docker
            .env
            .insert("DATABASE_URL".to_string(), "postgres://u:pw@db".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.request_source.api_token_configured);
        assert_eq!(sanitized.launcher.backend, "docker");
        assert_eq!(sanitized.launcher.env_keys, vec!["DATABASE_URL"]);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("pw@db"));
    }

    #[test]
    fn test_sanitized_config_without_token() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(!sanitized.request_source.api_token_configured);
        assert!(sanitized.launcher.env_keys.is_empty());
    }
}
