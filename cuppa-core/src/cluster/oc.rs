//! `oc` backed control-plane client.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{
    filter_pending, version_from_output, ControlPlane, HostDirs, Identity, PublicBinding,
    Reachability, REACHABILITY_TIMEOUT,
};
use crate::config::API_PORT;
use crate::error::Result;
use crate::process::{self, AUTH_TIMEOUT};

const WELL_KNOWN_PATHS: [&str; 3] = ["/usr/local/bin/oc", "/usr/bin/oc", "/opt/homebrew/bin/oc"];
const INSTALL_HINT: &str =
    "Install the OpenShift client tools: https://github.com/openshift/origin/releases";

const MBAAS_DEPLOYMENT: &str = "dc/fh-mbaas";
const SERVICE_KEY_ENV: &str = "FHMBAAS_KEY";

pub struct OcClient {
    binary: PathBuf,
}

impl OcClient {
    /// Locate the `oc` binary on this host.
    pub fn new() -> Result<Self> {
        let binary = process::find_binary("oc", &WELL_KNOWN_PATHS, INSTALL_HINT)?;
        debug!(binary = %binary.display(), "Found oc binary");
        Ok(Self { binary })
    }

    pub fn with_binary(binary: PathBuf) -> Self {
        Self { binary }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }

    async fn login(&self, user: &str, password: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["login", "-u", user, "-p", password]);
        process::run_with_timeout(&mut cmd, AUTH_TIMEOUT).await
    }
}

#[async_trait]
impl ControlPlane for OcClient {
    async fn switch_identity(&self, identity: Identity) -> Result<()> {
        info!(user = %identity, "Switching cluster identity");
        let (user, password) = identity.credentials();
        self.login(user, password).await
    }

    async fn create_project(&self, name: &str) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(["new-project", name]);
        process::run_with_timeout(&mut cmd, AUTH_TIMEOUT).await
    }

    async fn create_resource(&self, manifest: &Path) -> Result<()> {
        let mut cmd = self.command();
        cmd.arg("create").arg("-f").arg(manifest);
        process::run_with_timeout(&mut cmd, AUTH_TIMEOUT).await
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(args);
        process::run_interactive(&mut cmd).await
    }

    #[instrument(skip(self, dirs, binding))]
    async fn cluster_up(&self, dirs: &HostDirs, binding: Option<&PublicBinding>) -> Result<()> {
        info!("Starting cluster");

        let mut args = vec![
            "cluster".to_string(),
            "up".to_string(),
            format!("--host-data-dir={}", dirs.data.display()),
            format!("--host-config-dir={}", dirs.config.display()),
        ];
        if let Some(binding) = binding {
            args.push(format!("--public-hostname={}", binding.hostname));
            args.push(format!("--routing-suffix={}", binding.routing_suffix));
        }

        let mut cmd = self.command();
        cmd.args(&args);
        process::run_interactive(&mut cmd).await?;

        metrics::counter!("cuppa_cluster_up_total").increment(1);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn cluster_down(&self) -> Result<()> {
        info!("Stopping cluster");

        let mut cmd = self.command();
        cmd.args(["cluster", "down"]);
        process::run_interactive(&mut cmd).await?;

        metrics::counter!("cuppa_cluster_down_total").increment(1);
        Ok(())
    }

    async fn reachability(&self, ip: Ipv4Addr) -> Reachability {
        let probe = TcpStream::connect((ip, API_PORT));
        let status = match tokio::time::timeout(REACHABILITY_TIMEOUT, probe).await {
            Ok(Ok(_)) => Reachability::Online,
            _ => Reachability::Unreachable,
        };
        debug!(%ip, port = API_PORT, %status, "Probed cluster API");
        status
    }

    async fn pending_deployments(&self) -> Result<String> {
        let mut cmd = self.command();
        cmd.args(["get", "pods"]);
        let output = process::run_captured(&mut cmd).await?;
        Ok(filter_pending(&output))
    }

    async fn service_key(&self, project: &str) -> String {
        let mut cmd = self.command();
        cmd.args(["env", MBAAS_DEPLOYMENT, "--list", "-n", project]);
        match process::run_captured(&mut cmd).await {
            Ok(output) => super::extract_env_value(&output, SERVICE_KEY_ENV),
            Err(err) => {
                warn!(error = %err, "Could not read the MBaaS service key");
                String::new()
            }
        }
    }

    async fn user_token(&self) -> String {
        let mut cmd = self.command();
        cmd.args(["whoami", "-t"]);
        match process::run_captured(&mut cmd).await {
            Ok(output) => output.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "Could not read the user token");
                String::new()
            }
        }
    }

    async fn client_version(&self) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("version");
        let output = process::run_captured(&mut cmd).await?;
        Ok(version_from_output(&output))
    }

    async fn run_setup_script(&self, script: &Path, cluster_domain: &str) -> Result<()> {
        info!(script = %script.display(), "Running setup script");
        let mut cmd = Command::new("/bin/bash");
        cmd.arg(script).env("CLUSTER_DOMAIN", cluster_domain);
        process::run_interactive(&mut cmd).await
    }
}
