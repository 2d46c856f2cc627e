//! The deployment pipeline.
//!
//! Drives the whole bring-up: seed images, boot the cluster behind its
//! virtual interface, provision volumes, install the core tiers and
//! the MBaaS, then link both through the management client. Steps run
//! strictly in order, there is no parallelism to reason about.

use semver::VersionReq;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::appclient::{
    AppPlatformClient, EnvironmentSpec, FhcClient, MbaasSpec, FHC_HINT, FHC_WELL_KNOWN,
};
use crate::cluster::{self, ControlPlane, Identity, OcClient, PublicBinding};
use crate::config::Config;
use crate::datadir::DataDirs;
use crate::error::{CuppaError, Result};
use crate::images;
use crate::network::InterfaceManager;
use crate::poll::{poll_until_settled, PollConfig};
use crate::seeder::{self, ContainerEngine, DockerEngine, DOCKER_HINT, DOCKER_WELL_KNOWN};
use crate::process;

/// Supported client version range. Cluster bootstrap flags moved
/// around in later releases.
const CLIENT_VERSION_RANGE: &str = ">=1.3.0, <1.4.0";

const PULL_SECRET_NAME: &str = "private-docker-cfg";

const CONSOLE_USERNAME: &str = "rhmap-admin@example.com";
const CONSOLE_PASSWORD: &str = "Password1";

/// One tier of the core install: a setup script plus the ceiling for
/// the deployment poll that follows it.
#[derive(Debug, Clone, Copy)]
pub struct SetupStage {
    pub name: &'static str,
    pub script: &'static str,
    pub poll_ceiling: Duration,
}

pub const CORE_STAGES: [SetupStage; 4] = [
    SetupStage {
        name: "infra",
        script: "infra.sh",
        poll_ceiling: Duration::from_secs(120),
    },
    SetupStage {
        name: "backend",
        script: "backend.sh",
        poll_ceiling: Duration::from_secs(120),
    },
    SetupStage {
        name: "frontend",
        script: "frontend.sh",
        poll_ceiling: Duration::from_secs(120),
    },
    SetupStage {
        name: "monitoring",
        script: "monitoring.sh",
        poll_ceiling: Duration::from_secs(60),
    },
];

const MBAAS_POLL_CEILING: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct UpOptions {
    pub clean: bool,
    pub virtual_interface: bool,
    pub seed_images: bool,
}

impl Default for UpOptions {
    fn default() -> Self {
        Self {
            clean: false,
            virtual_interface: true,
            seed_images: true,
        }
    }
}

/// Owns the external systems and runs the pipeline against them.
pub struct Orchestrator {
    config: Config,
    dirs: DataDirs,
    cluster: Box<dyn ControlPlane>,
    engine: Box<dyn ContainerEngine>,
    app: Box<dyn AppPlatformClient>,
    interface: InterfaceManager,
}

impl Orchestrator {
    /// Wire up the real external systems for this host.
    pub fn new(config: Config) -> Result<Self> {
        let cluster = Box::new(OcClient::new()?);
        let engine = Box::new(DockerEngine::new());
        let app: Box<dyn AppPlatformClient> = if config.app_client.containerized {
            Box::new(FhcClient::containerized(&config.app_client.image))
        } else {
            Box::new(FhcClient::direct())
        };
        let interface = InterfaceManager::for_host()?;

        Ok(Self::with_components(config, cluster, engine, app, interface))
    }

    pub fn with_components(
        config: Config,
        cluster: Box<dyn ControlPlane>,
        engine: Box<dyn ContainerEngine>,
        app: Box<dyn AppPlatformClient>,
        interface: InterfaceManager,
    ) -> Self {
        let dirs = DataDirs::new(config.data_dir.clone());
        Self {
            config,
            dirs,
            cluster,
            engine,
            app,
            interface,
        }
    }

    /// Bring the cluster up and install the full platform on top.
    #[instrument(skip(self, opts), fields(clean = opts.clean))]
    pub async fn up(&self, opts: &UpOptions) -> Result<()> {
        if opts.seed_images {
            self.seed().await?;
        } else {
            info!("Skipping image seeding");
        }

        let ip = self.config.ip;
        if self.cluster.reachability(ip).await.is_online() {
            return Err(CuppaError::ClusterAlreadyUp {
                address: ip.to_string(),
            });
        }

        if opts.clean {
            self.reset_data_dirs().await?;
        }

        if opts.virtual_interface {
            self.interface.ensure(ip).await?;
            self.cluster
                .cluster_up(&self.dirs.host_dirs(), Some(&self.public_binding()))
                .await?;
            if !self.cluster.reachability(ip).await.is_online() {
                return Err(CuppaError::ClusterNotReachable {
                    address: ip.to_string(),
                });
            }
            info!("Cluster is reachable");
        } else {
            // Nothing to probe here, the cluster picked its own
            // interface.
            info!("Skipping virtual interface creation");
            self.cluster.cluster_up(&self.dirs.host_dirs(), None).await?;
        }

        self.provision_volumes().await?;
        self.install_core().await?;
        self.install_mbaas().await?;
        self.link().await?;

        metrics::counter!("cuppa_up_completed_total").increment(1);
        Ok(())
    }

    /// Tear the cluster down. Safe to run against a cluster that is
    /// already gone.
    #[instrument(skip(self))]
    pub async fn down(&self, clean: bool) -> Result<()> {
        if clean {
            self.reset_data_dirs().await?;
        }

        self.interface.destroy(self.config.ip).await?;
        self.cluster.cluster_down().await?;

        if self.cluster.reachability(self.config.ip).await.is_online() {
            return Err(CuppaError::ClusterStillReachable {
                address: self.config.ip.to_string(),
            });
        }

        info!("Cluster is down");
        metrics::counter!("cuppa_down_completed_total").increment(1);
        Ok(())
    }

    /// Install the platform onto an already-running cluster.
    #[instrument(skip(self))]
    pub async fn install(&self) -> Result<()> {
        let ip = self.config.ip;
        if !self.cluster.reachability(ip).await.is_online() {
            return Err(CuppaError::ClusterNotReachable {
                address: ip.to_string(),
            });
        }

        self.provision_volumes().await?;
        self.install_core().await?;
        self.install_mbaas().await
    }

    /// Register the MBaaS and its environment with the core through
    /// the management client.
    #[instrument(skip(self))]
    pub async fn link(&self) -> Result<()> {
        info!("Linking MBaaS and core");

        let app_client = &self.config.app_client;
        self.app
            .target(&app_client.target, &app_client.username, &app_client.password)
            .await?;

        self.cluster.switch_identity(Identity::Developer).await?;

        let service_key = self.cluster.service_key(&self.config.mbaas.project).await;
        if service_key.is_empty() {
            warn!("MBaaS service key is unavailable, linking will likely be rejected");
        }
        let token = self.cluster.user_token().await;
        if token.is_empty() {
            warn!("User token is unavailable, linking will likely be rejected");
        }

        self.app
            .create_mbaas(&MbaasSpec {
                id: "dev".to_string(),
                label: "dev".to_string(),
                url: self.config.api_url(),
                service_key,
                username: "test".to_string(),
                password: "test".to_string(),
                kind: "openshift3".to_string(),
                router_dns_url: self.config.router_dns(),
                mbaas_host: self.config.mbaas_host(),
            })
            .await?;

        self.app
            .create_environment(&EnvironmentSpec {
                id: "dev".to_string(),
                label: "dev".to_string(),
                target: "dev".to_string(),
                token,
            })
            .await?;

        info!("Cluster is now up: {}", self.config.console_url());
        info!("Login with: {CONSOLE_USERNAME} / {CONSOLE_PASSWORD}");
        Ok(())
    }

    /// Verify the local environment looks usable. Only an unusable
    /// client version aborts, everything else is advisory.
    #[instrument(skip(self))]
    pub async fn check(&self) -> Result<()> {
        info!("Checking local environment");

        let raw = self.cluster.client_version().await?;
        let version = cluster::parse_client_version(&raw)?;
        let requirement = VersionReq::parse(CLIENT_VERSION_RANGE)
            .map_err(|e| CuppaError::Internal(format!("bad version requirement: {e}")))?;

        if requirement.matches(&version) {
            info!("OK - oc version {version} (required {CLIENT_VERSION_RANGE})");
        } else {
            warn!("oc version {version} is outside the supported range {CLIENT_VERSION_RANGE}");
        }

        advise_binary("docker", &DOCKER_WELL_KNOWN, DOCKER_HINT);
        if self.config.app_client.containerized {
            info!("OK - management client runs containerized, skipping fhc lookup");
        } else {
            advise_binary("fhc", &FHC_WELL_KNOWN, FHC_HINT);
        }

        advise_path("Core templates", &self.config.core.templates);
        advise_path("MBaaS templates", &self.config.mbaas.templates);
        advise_path("Registry pull config", &self.config.registry.docker_config_json);
        advise_path("Volume template", &self.dirs.pv_template());

        Ok(())
    }

    /// Pull every platform image not already present locally.
    #[instrument(skip(self))]
    pub async fn seed(&self) -> Result<()> {
        let catalog = images::platform_images(&self.config)?;
        let registry = &self.config.registry;
        let auth = (!registry.username.is_empty()).then_some(registry);
        seeder::seed_images(self.engine.as_ref(), auth, &catalog).await
    }

    async fn reset_data_dirs(&self) -> Result<()> {
        self.dirs.clean().await?;
        self.dirs.create()?;
        self.dirs.create_pv_dirs()?;
        self.dirs.relabel_pv_dirs().await
    }

    fn public_binding(&self) -> PublicBinding {
        PublicBinding {
            hostname: self.config.ip.to_string(),
            routing_suffix: self.config.cluster_domain.clone(),
        }
    }

    /// Run a step as Admin and drop back to Developer afterwards, on
    /// the error path too.
    async fn with_admin<F>(&self, step: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        self.cluster.switch_identity(Identity::Admin).await?;
        let result = step.await;
        let restore = self.cluster.switch_identity(Identity::Developer).await;
        result.and(restore)
    }

    async fn provision_volumes(&self) -> Result<()> {
        info!("Creating persistent volumes");
        let manifest = self.dirs.render_pv_manifest()?;
        self.with_admin(self.create_resource_tolerated(&manifest))
            .await
    }

    async fn install_core(&self) -> Result<()> {
        info!(project = %self.config.core.project, "Installing core");

        self.create_project_tolerated(&self.config.core.project)
            .await;
        self.run_prerequisites().await?;
        self.update_security_context().await?;
        self.provision_pull_secret().await?;

        for stage in &CORE_STAGES {
            self.run_stage(stage).await?;
        }

        info!("Core setup done");
        Ok(())
    }

    async fn install_mbaas(&self) -> Result<()> {
        info!(project = %self.config.mbaas.project, "Installing MBaaS");

        self.cluster.switch_identity(Identity::Developer).await?;
        self.create_project_tolerated(&self.config.mbaas.project)
            .await;
        self.provision_pull_secret().await?;

        let template = self
            .config
            .mbaas
            .templates
            .join(&self.config.mbaas.template);
        let template_arg = template.display().to_string();
        self.cluster.run(&["new-app", "-f", &template_arg]).await?;

        self.poll_deployments("mbaas", MBAAS_POLL_CEILING).await?;
        info!("MBaaS setup done");
        Ok(())
    }

    async fn run_prerequisites(&self) -> Result<()> {
        let script = self
            .config
            .core
            .templates
            .join("scripts/core/prerequisites.sh");
        self.cluster
            .run_setup_script(&script, &self.config.cluster_domain)
            .await
    }

    async fn update_security_context(&self) -> Result<()> {
        info!("Updating security context constraints");
        self.with_admin(self.apply_security_constraints()).await
    }

    async fn apply_security_constraints(&self) -> Result<()> {
        let scc = self
            .config
            .core
            .templates
            .join("gitlab-shell/scc-anyuid-with-chroot.json");
        self.create_resource_tolerated(&scc).await?;

        let account = format!(
            "system:serviceaccount:{}:default",
            self.config.core.project
        );
        self.cluster
            .run(&["adm", "policy", "add-scc-to-user", "anyuid-with-chroot", &account])
            .await
    }

    async fn provision_pull_secret(&self) -> Result<()> {
        info!("Creating {PULL_SECRET_NAME} secret");

        let source = format!(
            ".dockerconfigjson={}",
            self.config.registry.docker_config_json.display()
        );
        self.cluster
            .run(&["secrets", "new", PULL_SECRET_NAME, &source])
            .await?;
        self.cluster
            .run(&["secrets", "link", "default", PULL_SECRET_NAME, "--for=pull"])
            .await
    }

    async fn run_stage(&self, stage: &SetupStage) -> Result<()> {
        info!(stage = stage.name, "Running setup stage");

        let script = self
            .config
            .core
            .templates
            .join("scripts/core")
            .join(stage.script);
        self.cluster
            .run_setup_script(&script, &self.config.cluster_domain)
            .await?;

        self.poll_deployments(stage.name, stage.poll_ceiling).await?;
        info!(stage = stage.name, "Stage complete");
        Ok(())
    }

    async fn poll_deployments(&self, subject: &str, ceiling: Duration) -> Result<()> {
        let config = PollConfig::with_ceiling(ceiling);
        poll_until_settled(&config, subject, || self.cluster.pending_deployments()).await
    }

    /// Project creation fails when the project already exists, which
    /// is fine on re-runs. Log and move on.
    async fn create_project_tolerated(&self, name: &str) {
        info!(project = name, "Creating project");
        if let Err(err) = self.cluster.create_project(name).await {
            warn!(project = name, error = %err, "Project creation reported an error, continuing");
        }
    }

    /// Same tolerance for resource manifests, re-applying an existing
    /// manifest reports a conflict.
    async fn create_resource_tolerated(&self, manifest: &Path) -> Result<()> {
        if let Err(err) = self.cluster.create_resource(manifest).await {
            warn!(manifest = %manifest.display(), error = %err, "Resource creation reported an error, continuing");
        }
        Ok(())
    }
}

fn advise_binary(name: &str, well_known: &[&str], hint: &str) {
    match process::find_binary(name, well_known, hint) {
        Ok(path) => info!("OK - {} at {}", name, path.display()),
        Err(err) => warn!("{err}"),
    }
}

fn advise_path(what: &str, path: &Path) {
    if path.as_os_str().is_empty() {
        warn!("{what} path is not configured");
    } else if path.exists() {
        info!("OK - {} at {}", what, path.display());
    } else {
        warn!("{} missing at {}", what, path.display());
    }
}
