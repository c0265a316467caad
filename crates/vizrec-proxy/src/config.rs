//! Proxy configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vizrec_core::adapters::{DEFAULT_API_VERSION, DEFAULT_SERVICE_URL};
use vizrec_core::ClientConfig;

use crate::cli::Cli;
use crate::cors::CorsConfig;
use crate::security::{validate_service_url, UrlPolicy};

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Recognition service connection
    #[serde(default)]
    pub service: ServiceConfig,

    /// Directory with the static HTML shell, error page and favicon
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Cross-origin settings
    #[serde(default)]
    pub cors: CorsConfig,
}

impl ProxyConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(url) = &cli.service_url {
            config.service.url = url.clone();
        }

        if let Some(assets) = &cli.assets {
            config.assets_dir = assets.clone();
        }

        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            assets_dir: default_assets_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            cors: CorsConfig::default(),
        }
    }
}

/// Recognition service connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL, without the `/v3` segment
    #[serde(default = "default_service_url")]
    pub url: String,

    /// API version date
    #[serde(default = "default_api_version")]
    pub version: String,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Permit `http://` and local hosts
    #[serde(default)]
    pub allow_insecure: bool,
}

impl ServiceConfig {
    /// Validate the URL and build the adapter's client settings
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let policy = UrlPolicy {
            allow_insecure: self.allow_insecure,
        };
        let base_url = validate_service_url(&self.url, policy)?;

        Ok(ClientConfig {
            base_url,
            version: self.version.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            version: default_api_version(),
            timeout_secs: default_timeout_secs(),
            allow_insecure: false,
        }
    }
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("./web")
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}
