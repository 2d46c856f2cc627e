//! Local state directory layout for the cluster.
//!
//! Everything the cluster writes lives under a single root: etcd data,
//! generated config and the persistent-volume backing directories. The
//! directories are world-writable because the cluster containers run
//! with arbitrary uids.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

use crate::cluster::HostDirs;
use crate::error::{CuppaError, Result};
use crate::process;

const PV_COUNT: usize = 10;
const CHCON: &str = "/usr/bin/chcon";
const PV_PLACEHOLDER: &str = "REPLACE_ME";

#[derive(Debug, Clone)]
pub struct DataDirs {
    root: PathBuf,
}

impl DataDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cluster_dir(&self) -> PathBuf {
        self.root.join("cluster")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.cluster_dir().join("data")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.cluster_dir().join("config")
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.cluster_dir().join("volumes")
    }

    pub fn pv_dir(&self, index: usize) -> PathBuf {
        self.volumes_dir().join(format!("devpv{index}"))
    }

    pub fn pv_template(&self) -> PathBuf {
        self.root.join("pvs_template.json")
    }

    pub fn pv_manifest(&self) -> PathBuf {
        self.root.join("pvs.json")
    }

    pub fn host_dirs(&self) -> HostDirs {
        HostDirs {
            data: self.data_dir(),
            config: self.config_dir(),
        }
    }

    /// Remove the cluster state directory. Needs sudo because the
    /// cluster writes files owned by root.
    pub async fn clean(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(CuppaError::InvalidDataDir {
                reason: "data_dir is not set".to_string(),
            });
        }
        if self.root == Path::new("/") {
            return Err(CuppaError::InvalidDataDir {
                reason: "data_dir points at the filesystem root".to_string(),
            });
        }

        info!(dir = %self.cluster_dir().display(), "Removing cluster state");
        let mut cmd = Command::new("sudo");
        cmd.args(["rm", "-rf"]).arg(self.cluster_dir());
        process::run_interactive(&mut cmd).await
    }

    /// Create the cluster state directories.
    pub fn create(&self) -> Result<()> {
        info!(dir = %self.cluster_dir().display(), "Creating cluster state directories");
        for dir in [
            self.cluster_dir(),
            self.data_dir(),
            self.config_dir(),
            self.volumes_dir(),
        ] {
            create_world_writable(&dir)?;
        }
        Ok(())
    }

    /// Create the persistent-volume backing directories.
    pub fn create_pv_dirs(&self) -> Result<()> {
        for index in 0..PV_COUNT {
            create_world_writable(&self.pv_dir(index))?;
        }
        Ok(())
    }

    /// Relabel the volume directories so containers may write to them
    /// on SELinux enforcing hosts. A no-op where chcon is absent.
    pub async fn relabel_pv_dirs(&self) -> Result<()> {
        if !selinux_relabel_available() {
            debug!("chcon not available, skipping volume relabel");
            return Ok(());
        }

        info!("Relabelling volume directories for SELinux");
        for index in 0..PV_COUNT {
            let mut cmd = Command::new(CHCON);
            cmd.args(["-R", "-t", "svirt_sandbox_file_t"])
                .arg(self.pv_dir(index));
            process::run_interactive(&mut cmd).await?;
        }
        Ok(())
    }

    /// Render the persistent-volume manifest from its template,
    /// pointing every volume at the local backing directories. Returns
    /// the path of the written manifest.
    pub fn render_pv_manifest(&self) -> Result<PathBuf> {
        let template_path = self.pv_template();
        let template =
            std::fs::read_to_string(&template_path).map_err(|e| CuppaError::TemplateRead {
                path: template_path,
                source: e,
            })?;

        let volumes = self.volumes_dir().display().to_string();
        let rendered = template.replace(PV_PLACEHOLDER, &volumes);

        let manifest = self.pv_manifest();
        std::fs::write(&manifest, rendered).map_err(|e| CuppaError::Io {
            path: manifest.clone(),
            source: e,
        })?;

        debug!(manifest = %manifest.display(), "Rendered persistent-volume manifest");
        Ok(manifest)
    }
}

fn create_world_writable(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| CuppaError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).map_err(|e| {
        CuppaError::Io {
            path: dir.to_path_buf(),
            source: e,
        }
    })
}

fn selinux_relabel_available() -> bool {
    cfg!(target_os = "linux") && Path::new(CHCON).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_builds_the_full_layout() {
        let root = TempDir::new().unwrap();
        let dirs = DataDirs::new(root.path());

        dirs.create().unwrap();
        dirs.create_pv_dirs().unwrap();

        assert!(dirs.data_dir().is_dir());
        assert!(dirs.config_dir().is_dir());
        assert!(dirs.volumes_dir().is_dir());
        for index in 0..10 {
            assert!(dirs.pv_dir(index).is_dir());
        }
    }

    #[test]
    fn test_created_directories_are_world_writable() {
        let root = TempDir::new().unwrap();
        let dirs = DataDirs::new(root.path());

        dirs.create().unwrap();

        let mode = std::fs::metadata(dirs.data_dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn test_create_is_idempotent() {
        let root = TempDir::new().unwrap();
        let dirs = DataDirs::new(root.path());

        dirs.create().unwrap();
        dirs.create().unwrap();
    }

    #[tokio::test]
    async fn test_clean_refuses_unset_root() {
        let dirs = DataDirs::new("");
        let err = dirs.clean().await.unwrap_err();
        assert!(matches!(err, CuppaError::InvalidDataDir { .. }));
    }

    #[tokio::test]
    async fn test_clean_refuses_filesystem_root() {
        let dirs = DataDirs::new("/");
        let err = dirs.clean().await.unwrap_err();
        assert!(matches!(err, CuppaError::InvalidDataDir { .. }));
    }

    #[test]
    fn test_render_pv_manifest_substitutes_volume_paths() {
        let root = TempDir::new().unwrap();
        let dirs = DataDirs::new(root.path());
        std::fs::write(
            dirs.pv_template(),
            r#"{"items": [{"hostPath": "REPLACE_ME/devpv0"}, {"hostPath": "REPLACE_ME/devpv1"}]}"#,
        )
        .unwrap();

        let manifest = dirs.render_pv_manifest().unwrap();

        let rendered = std::fs::read_to_string(manifest).unwrap();
        assert!(!rendered.contains("REPLACE_ME"));
        let volumes = dirs.volumes_dir().display().to_string();
        assert!(rendered.contains(&format!("{volumes}/devpv0")));
        assert!(rendered.contains(&format!("{volumes}/devpv1")));
    }

    #[test]
    fn test_render_pv_manifest_missing_template() {
        let root = TempDir::new().unwrap();
        let dirs = DataDirs::new(root.path());

        let err = dirs.render_pv_manifest().unwrap_err();
        assert!(matches!(err, CuppaError::TemplateRead { .. }));
    }
}
