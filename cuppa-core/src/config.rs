//! Configuration management for cuppa.
//!
//! Configuration lives in a single TOML file, loaded once at startup.
//! The default location is `~/.cuppa.toml`, overridable with the
//! `CUPPA_CONFIG` environment variable.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::error::{CuppaError, Result};

pub const API_PORT: u16 = 8443;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the cluster binds to, normally served by a loopback alias.
    pub ip: Ipv4Addr,

    /// Domain the cluster routes are exposed under.
    pub cluster_domain: String,

    /// Root directory for cluster state, data and volumes.
    pub data_dir: PathBuf,

    pub core: CoreConfig,
    pub mbaas: MbaasConfig,
    pub registry: RegistryConfig,
    pub app_client: AppClientConfig,
}

/// Settings for the core platform tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Project the core tiers are installed into.
    pub project: String,

    /// Checkout of the core templates repository.
    pub templates: PathBuf,
}

/// Settings for the MBaaS stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MbaasConfig {
    /// Project the MBaaS is installed into.
    pub project: String,

    /// Checkout of the MBaaS templates repository.
    pub templates: PathBuf,

    /// Template file name within the templates checkout.
    pub template: String,
}

/// Credentials for the image registry hosting the platform images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub username: String,
    pub password: String,
    pub email: String,

    /// Docker config JSON used as the image pull secret.
    pub docker_config_json: PathBuf,
}

/// Settings for the application-management client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppClientConfig {
    /// Management API the client authenticates against.
    pub target: String,
    pub username: String,
    pub password: String,

    /// Run the client through a container instead of a local binary.
    pub containerized: bool,

    /// Image used when running containerized.
    pub image: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: Ipv4Addr::new(192, 168, 44, 10),
            cluster_domain: "cup.feedhenry.io".to_string(),
            data_dir: default_data_dir(),
            core: CoreConfig::default(),
            mbaas: MbaasConfig::default(),
            registry: RegistryConfig::default(),
            app_client: AppClientConfig::default(),
        }
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            project: "core".to_string(),
            templates: PathBuf::new(),
        }
    }
}

impl Default for MbaasConfig {
    fn default() -> Self {
        Self {
            project: "mbaas1".to_string(),
            templates: PathBuf::new(),
            template: "fh-mbaas-template-1node-persistent.json".to_string(),
        }
    }
}

impl Default for AppClientConfig {
    fn default() -> Self {
        Self {
            target: String::new(),
            username: String::new(),
            password: String::new(),
            containerized: false,
            image: "feedhenry/fhc".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing or malformed file
    /// is an error, every run needs an explicit configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CuppaError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| CuppaError::ConfigParse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Default config file location, `CUPPA_CONFIG` wins over `~/.cuppa.toml`.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("CUPPA_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|home| home.join(".cuppa.toml"))
            .unwrap_or_else(|| PathBuf::from("/etc/cuppa.toml"))
    }

    /// Management API endpoint of the running cluster.
    pub fn api_url(&self) -> String {
        format!("https://{}:{}", self.cluster_domain, API_PORT)
    }

    /// Wildcard DNS entry covering all routes under the cluster domain.
    pub fn router_dns(&self) -> String {
        format!("*.{}", self.cluster_domain)
    }

    /// Externally visible host of the MBaaS component.
    pub fn mbaas_host(&self) -> String {
        format!("https://mbaas-{}.{}", self.mbaas.project, self.cluster_domain)
    }

    /// Studio console URL shown to the user once everything is up.
    pub fn console_url(&self) -> String {
        format!("https://rhmap.{}", self.cluster_domain)
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CUPPA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".cuppa"))
        .unwrap_or_else(|| PathBuf::from("/var/lib/cuppa"))
}
