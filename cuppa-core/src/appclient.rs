//! Application-platform client integration.
//!
//! Linking the MBaaS into the core goes through the `fhc` management
//! client, either a local install or a containerized copy run through
//! docker with the caller's home directory mounted for its session
//! state.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{CuppaError, Result};
use crate::process;
use crate::seeder::{DOCKER_HINT, DOCKER_WELL_KNOWN};

pub(crate) const FHC_WELL_KNOWN: [&str; 2] = ["/usr/local/bin/fhc", "/usr/bin/fhc"];
pub(crate) const FHC_HINT: &str = "Install the management client: npm install -g fh-fhc";

/// An MBaaS target as registered with the management API.
#[derive(Debug, Clone)]
pub struct MbaasSpec {
    pub id: String,
    pub label: String,
    pub url: String,
    pub service_key: String,
    pub username: String,
    pub password: String,
    pub kind: String,
    pub router_dns_url: String,
    pub mbaas_host: String,
}

/// An environment tied to an MBaaS target.
#[derive(Debug, Clone)]
pub struct EnvironmentSpec {
    pub id: String,
    pub label: String,
    pub target: String,
    pub token: String,
}

#[async_trait]
pub trait AppPlatformClient: Send + Sync {
    /// Authenticate against the management API.
    async fn target(&self, url: &str, username: &str, password: &str) -> Result<()>;

    async fn create_mbaas(&self, spec: &MbaasSpec) -> Result<()>;

    async fn create_environment(&self, spec: &EnvironmentSpec) -> Result<()>;
}

enum FhcMode {
    Direct { binary: PathBuf },
    Containerized { engine: PathBuf, image: String },
}

pub struct FhcClient {
    mode: FhcMode,
}

impl FhcClient {
    /// Client backed by a locally installed `fhc`. Resolution falls
    /// back to the bare name so a missing install surfaces on first
    /// use, not at startup.
    pub fn direct() -> Self {
        let binary = process::find_binary("fhc", &FHC_WELL_KNOWN, FHC_HINT)
            .unwrap_or_else(|_| PathBuf::from("fhc"));
        Self {
            mode: FhcMode::Direct { binary },
        }
    }

    /// Client running `fhc` inside a container.
    pub fn containerized(image: &str) -> Self {
        let engine = process::find_binary("docker", &DOCKER_WELL_KNOWN, DOCKER_HINT)
            .unwrap_or_else(|_| PathBuf::from("docker"));
        Self {
            mode: FhcMode::Containerized {
                engine,
                image: image.to_string(),
            },
        }
    }

    async fn run(&self, args: &[String]) -> Result<()> {
        let mut cmd = match &self.mode {
            FhcMode::Direct { binary } => {
                let mut cmd = Command::new(binary);
                cmd.args(args);
                cmd
            }
            FhcMode::Containerized { engine, image } => {
                let home = dirs::home_dir().ok_or_else(|| {
                    CuppaError::Internal("home directory could not be determined".to_string())
                })?;
                let mut cmd = Command::new(engine);
                cmd.args(["run", "-v"])
                    .arg(format!("{}:/root", home.display()))
                    .args(["-it", image.as_str()])
                    .args(args);
                cmd
            }
        };

        debug!(command = %process::describe(&cmd), "Running management client");
        process::run_interactive(&mut cmd).await
    }
}

#[async_trait]
impl AppPlatformClient for FhcClient {
    async fn target(&self, url: &str, username: &str, password: &str) -> Result<()> {
        info!(%url, "Targeting management API");
        self.run(&[
            "target".to_string(),
            url.to_string(),
            username.to_string(),
            password.to_string(),
        ])
        .await
    }

    async fn create_mbaas(&self, spec: &MbaasSpec) -> Result<()> {
        info!(id = %spec.id, "Registering MBaaS target");
        self.run(&[
            "admin".to_string(),
            "mbaas".to_string(),
            "create".to_string(),
            format!("--id={}", spec.id),
            format!("--url={}", spec.url),
            format!("--servicekey={}", spec.service_key),
            format!("--label={}", spec.label),
            format!("--username={}", spec.username),
            format!("--password={}", spec.password),
            format!("--type={}", spec.kind),
            format!("--routerDNSUrl={}", spec.router_dns_url),
            format!("--fhMbaasHost={}", spec.mbaas_host),
        ])
        .await
    }

    async fn create_environment(&self, spec: &EnvironmentSpec) -> Result<()> {
        info!(id = %spec.id, "Registering environment");
        self.run(&[
            "admin".to_string(),
            "environments".to_string(),
            "create".to_string(),
            format!("--id={}", spec.id),
            format!("--label={}", spec.label),
            format!("--target={}", spec.target),
            format!("--token={}", spec.token),
        ])
        .await
    }
}
