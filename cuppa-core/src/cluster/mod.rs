//! Control-plane client for the local cluster.
//!
//! All cluster interaction goes through the [`ControlPlane`] trait so
//! the orchestration pipeline can be exercised without a real cluster.
//! The production implementation shells out to the `oc` binary.

mod oc;

pub use oc::OcClient;

use async_trait::async_trait;
use semver::Version;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CuppaError, Result};

/// How long a TCP probe of the API port may take before the cluster
/// counts as unreachable.
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(1);

/// Identities the client switches between. Most work runs as the
/// unprivileged developer, a few steps need cluster admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Developer,
    Admin,
}

impl Identity {
    pub fn credentials(self) -> (&'static str, &'static str) {
        match self {
            Identity::Developer => ("developer", "developer"),
            Identity::Admin => ("system:admin", ""),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.credentials().0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reachability {
    Online,
    Unreachable,
}

impl Reachability {
    pub fn is_online(self) -> bool {
        self == Reachability::Online
    }
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reachability::Online => f.write_str("online"),
            Reachability::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Host directories handed to the cluster for state and config.
#[derive(Debug, Clone)]
pub struct HostDirs {
    pub data: PathBuf,
    pub config: PathBuf,
}

/// Public address the cluster binds to when running behind the
/// virtual interface.
#[derive(Debug, Clone)]
pub struct PublicBinding {
    pub hostname: String,
    pub routing_suffix: String,
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Log in as the given identity. Bounded by the auth timeout.
    async fn switch_identity(&self, identity: Identity) -> Result<()>;

    async fn create_project(&self, name: &str) -> Result<()>;

    /// Create resources from a manifest file.
    async fn create_resource(&self, manifest: &Path) -> Result<()>;

    /// Run an arbitrary client subcommand with inherited stdio.
    async fn run(&self, args: &[&str]) -> Result<()>;

    /// Boot the single-node cluster. Without a binding the cluster
    /// picks its own interface.
    async fn cluster_up(&self, dirs: &HostDirs, binding: Option<&PublicBinding>) -> Result<()>;

    async fn cluster_down(&self) -> Result<()>;

    /// TCP probe of the API port at the given address.
    async fn reachability(&self, ip: Ipv4Addr) -> Reachability;

    /// Deployments still in flight, one per line. Empty means settled.
    async fn pending_deployments(&self) -> Result<String>;

    /// Service key of the MBaaS deployment in the given project.
    /// Returns an empty string when it cannot be determined.
    async fn service_key(&self, project: &str) -> String;

    /// Session token of the current user, empty when unavailable.
    async fn user_token(&self) -> String;

    /// Raw version string reported by the client binary.
    async fn client_version(&self) -> Result<String>;

    /// Run a platform setup script with the cluster domain exported.
    async fn run_setup_script(&self, script: &Path, cluster_domain: &str) -> Result<()>;
}

/// Reduce `oc get pods` output to the deployer pods still running.
/// Push-server lines are excluded from the pending set.
pub(crate) fn filter_pending(pods_output: &str) -> String {
    pods_output
        .lines()
        .filter(|line| line.contains("deploy") && !line.contains("ups"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Value of an environment entry in `oc env --list` output. Empty
/// when the key is not present.
pub(crate) fn extract_env_value(output: &str, key: &str) -> String {
    output
        .lines()
        .find(|line| line.contains(key))
        .and_then(|line| line.split_once('='))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_default()
}

/// Version number from the first line of `oc version` output, the
/// text after the leading `v`.
pub(crate) fn version_from_output(output: &str) -> String {
    let line = output.lines().next().unwrap_or_default();
    match line.split_once('v') {
        Some((_, rest)) => rest.trim().to_string(),
        None => line.trim().to_string(),
    }
}

/// Parse a client version leniently. Clients report truncated versions
/// like "1.3", missing components are padded with zeros.
pub fn parse_client_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let split_at = trimmed
        .find(['-', '+'])
        .unwrap_or(trimmed.len());
    let (base, suffix) = trimmed.split_at(split_at);

    let mut padded = base.to_string();
    match base.split('.').count() {
        1 => padded.push_str(".0.0"),
        2 => padded.push_str(".0"),
        _ => {}
    }
    padded.push_str(suffix);

    Version::parse(&padded).map_err(|_| CuppaError::VersionUnparsable {
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_credentials() {
        assert_eq!(Identity::Developer.credentials(), ("developer", "developer"));
        assert_eq!(Identity::Admin.credentials(), ("system:admin", ""));
    }

    #[test]
    fn test_filter_pending_keeps_deployer_pods() {
        let output = "\
NAME                 READY     STATUS    RESTARTS   AGE
fh-aaa-1-x2b9q       1/1       Running   0          2m
fh-mbaas-1-deploy    1/1       Running   0          1m
mongodb-1-deploy     0/1       Pending   0          30s
";
        let pending = filter_pending(output);
        assert_eq!(
            pending,
            "fh-mbaas-1-deploy    1/1       Running   0          1m\n\
             mongodb-1-deploy     0/1       Pending   0          30s"
        );
    }

    #[test]
    fn test_filter_pending_drops_push_server_pods() {
        let output = "ups-1-deploy    1/1    Running    0    10m";
        assert_eq!(filter_pending(output), "");
    }

    #[test]
    fn test_filter_pending_settled_cluster() {
        let output = "\
NAME             READY     STATUS    RESTARTS   AGE
fh-aaa-1-x2b9q   1/1       Running   0          10m
";
        assert_eq!(filter_pending(output), "");
    }

    #[test]
    fn test_extract_env_value() {
        let output = "\
# deploymentconfigs fh-mbaas, container fh-mbaas
FHMBAAS_KEY=secret123
MONGODB_REPLICA_NAME=rs0
";
        assert_eq!(extract_env_value(output, "FHMBAAS_KEY"), "secret123");
    }

    #[test]
    fn test_extract_env_value_missing_key() {
        assert_eq!(extract_env_value("A=1\nB=2\n", "FHMBAAS_KEY"), "");
    }

    #[test]
    fn test_version_from_output() {
        let output = "oc v1.3.1\nkubernetes v1.3.0+52492b4\n";
        assert_eq!(version_from_output(output), "1.3.1");
    }

    #[test]
    fn test_version_from_output_without_marker() {
        assert_eq!(version_from_output("1.3.1\n"), "1.3.1");
    }

    #[test]
    fn test_parse_client_version_full() {
        assert_eq!(
            parse_client_version("1.3.1").unwrap(),
            Version::new(1, 3, 1)
        );
    }

    #[test]
    fn test_parse_client_version_pads_missing_components() {
        assert_eq!(parse_client_version("1.3").unwrap(), Version::new(1, 3, 0));
        assert_eq!(parse_client_version("1").unwrap(), Version::new(1, 0, 0));
    }

    #[test]
    fn test_parse_client_version_keeps_build_metadata() {
        let version = parse_client_version("1.3.0+52492b4").unwrap();
        assert_eq!((version.major, version.minor, version.patch), (1, 3, 0));
    }

    #[test]
    fn test_parse_client_version_garbage() {
        let err = parse_client_version("not a version").unwrap_err();
        assert!(matches!(err, CuppaError::VersionUnparsable { .. }));
    }
}
