//! Configuration for the job launcher module.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Execution substrate for production jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LauncherBackend {
    #[default]
    Docker,
}

/// Job launcher configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub backend: LauncherBackend,

    #[serde(default)]
    pub docker: DockerConfig,
}

/// Configuration for the docker CLI launcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Path to the docker binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Producer image.
    #[serde(default = "default_image")]
    pub image: String,

    /// Container names are `{name_prefix}-{uuid}`.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Label (`key=value`) attached to every producer container.
    /// Used to rediscover jobs after a restart.
    #[serde(default = "default_label")]
    pub label: String,

    /// Network to attach containers to.
    #[serde(default)]
    pub network: Option<String>,

    /// Volume mounts (`host:container[:mode]`).
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Extra environment passed to the producer.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_binary() -> PathBuf {
    PathBuf::from("docker")
}

fn default_image() -> String {
    "depot-producer:latest".to_string()
}

fn default_name_prefix() -> String {
    "depot-producer".to_string()
}

fn default_label() -> String {
    "depot.role=producer".to_string()
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            image: default_image(),
            name_prefix: default_name_prefix(),
            label: default_label(),
            network: None,
            volumes: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LauncherConfig::default();
        assert_eq!(config.backend, LauncherBackend::Docker);
        assert_eq!(config.docker.binary, PathBuf::from("docker"));
        assert_eq!(config.docker.label, "depot.role=producer");
        assert!(config.docker.network.is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            backend = "docker"

            [docker]
            image = "registry.local/producer:2"
            name_prefix = "vdf"
            network = "depot"
            volumes = ["/srv/depot:/data"]

            [docker.env]
            DATABASE_PATH = "/data/depot.db"
        "#;
        let config: LauncherConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.docker.image, "registry.local/producer:2");
        assert_eq!(config.docker.name_prefix, "vdf");
        assert_eq!(config.docker.network.as_deref(), Some("depot"));
        assert_eq!(config.docker.volumes, vec!["/srv/depot:/data".to_string()]);
        assert_eq!(
            config.docker.env.get("DATABASE_PATH").map(String::as_str),
            Some("/data/depot.db")
        );
    }
}
