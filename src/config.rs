//! Configuration loading.
//!
//! Settings come from an optional TOML file. The `JENKINS_URL` and `PORT`
//! environment variables override the Jenkins base URL and the listen port.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub jenkins: JenkinsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JenkinsConfig {
    #[serde(default = "default_jenkins_url")]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for JenkinsConfig {
    fn default() -> Self {
        Self {
            url: default_jenkins_url(),
            username: None,
            api_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_jenkins_url() -> String {
    "http://jenkins/".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:9191".to_string()
}

/// Where annotation records (ConfigMaps) are kept.
#[derive(Debug, Deserialize, Clone)]
pub struct KubernetesConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// File holding a bearer token, e.g. the pod's service account token.
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// PEM bundle trusted in addition to the system roots.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            namespace: default_namespace(),
            token_file: None,
            ca_file: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "https://kubernetes.default.svc".to_string()
}
fn default_namespace() -> String {
    "default".to_string()
}

impl KubernetesConfig {
    /// Reads the bearer token, if one is configured.
    pub fn bearer_token(&self) -> Result<Option<String>> {
        match &self.token_file {
            Some(path) => {
                let token = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file: {}", path.display()))?;
                Ok(Some(token.trim().to_string()))
            }
            None => Ok(None),
        }
    }
}

/// Loads and validates configuration.
///
/// A missing file is not an error: every setting has a default. Environment
/// overrides are applied after parsing.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    apply_env_overrides(
        &mut config,
        std::env::var("JENKINS_URL").ok(),
        std::env::var("PORT").ok(),
    );
    validate(&config)?;
    Ok(config)
}

/// Applies `JENKINS_URL` and `PORT`. Empty values are ignored.
pub fn apply_env_overrides(config: &mut Config, jenkins_url: Option<String>, port: Option<String>) {
    if let Some(url) = jenkins_url.filter(|u| !u.is_empty()) {
        config.jenkins.url = url;
    }
    if let Some(port) = port.filter(|p| !p.is_empty()) {
        let host = config
            .server
            .bind
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.server.bind = format!("{}:{}", host, port);
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.jenkins.url.trim().is_empty() {
        anyhow::bail!("jenkins.url must not be empty");
    }
    if config.jenkins.timeout_secs == 0 {
        anyhow::bail!("jenkins.timeout_secs must be > 0");
    }
    if config.kubernetes.api_url.trim().is_empty() {
        anyhow::bail!("kubernetes.api_url must not be empty");
    }
    if config.kubernetes.namespace.trim().is_empty() {
        anyhow::bail!("kubernetes.namespace must not be empty");
    }
    if config.kubernetes.timeout_secs == 0 {
        anyhow::bail!("kubernetes.timeout_secs must be > 0");
    }
    config
        .server
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("server.bind is not a socket address: {}", config.server.bind))?;
    Ok(())
}
