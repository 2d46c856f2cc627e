//! Container image seeding.
//!
//! Pulling the platform images before the cluster exists keeps the
//! install phase from stalling on registry downloads. Images already
//! present locally are left alone.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::config::RegistryConfig;
use crate::error::{CuppaError, Result};
use crate::images::ImageReference;
use crate::process;

pub(crate) const DOCKER_WELL_KNOWN: [&str; 3] = [
    "/usr/local/bin/docker",
    "/usr/bin/docker",
    "/opt/homebrew/bin/docker",
];
pub(crate) const DOCKER_HINT: &str =
    "Install Docker: https://docs.docker.com/engine/installation/";

/// Local container engine used to inspect and pull images.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn login(&self, registry: &RegistryConfig) -> Result<()>;

    async fn image_present(&self, image: &ImageReference) -> Result<bool>;

    async fn pull(&self, image: &ImageReference) -> Result<()>;
}

pub struct DockerEngine {
    binary: PathBuf,
}

impl DockerEngine {
    /// Locate the docker binary, falling back to plain `docker` so a
    /// missing engine surfaces on first use instead of at startup.
    pub fn new() -> Self {
        let binary = process::find_binary("docker", &DOCKER_WELL_KNOWN, DOCKER_HINT)
            .unwrap_or_else(|_| PathBuf::from("docker"));
        Self { binary }
    }
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn login(&self, registry: &RegistryConfig) -> Result<()> {
        info!(username = %registry.username, "Logging in to the image registry");

        let mut cmd = Command::new(&self.binary);
        cmd.args(["login", "-u", &registry.username, "-p", &registry.password]);
        if !registry.email.is_empty() {
            cmd.args(["-e", &registry.email]);
        }
        process::run_interactive(&mut cmd).await
    }

    async fn image_present(&self, image: &ImageReference) -> Result<bool> {
        let reference = image.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args(["images", "-q", reference.as_str()]);
        let output = process::run_captured(&mut cmd).await?;
        Ok(!output.trim().is_empty())
    }

    async fn pull(&self, image: &ImageReference) -> Result<()> {
        let reference = image.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.args(["pull", reference.as_str()]);
        process::run_interactive(&mut cmd)
            .await
            .map_err(|e| CuppaError::ImagePull {
                image: reference,
                reason: e.to_string(),
            })
    }
}

/// Pull every catalog image that is not already present. Logs in
/// first when registry credentials are configured.
#[instrument(skip_all, fields(images = images.len()))]
pub async fn seed_images(
    engine: &dyn ContainerEngine,
    registry: Option<&RegistryConfig>,
    images: &[ImageReference],
) -> Result<()> {
    info!("Seeding platform images");

    if let Some(registry) = registry {
        engine.login(registry).await?;
    }

    for image in images {
        if engine.image_present(image).await? {
            debug!(%image, "Image already present, skipping");
            continue;
        }
        info!(%image, "Pulling image");
        engine.pull(image).await?;
        metrics::counter!("cuppa_images_pulled_total").increment(1);
    }

    info!("Image seeding complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        present: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContainerEngine for RecordingEngine {
        async fn login(&self, registry: &RegistryConfig) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("login:{}", registry.username));
            Ok(())
        }

        async fn image_present(&self, image: &ImageReference) -> Result<bool> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("present:{image}"));
            Ok(self.present.contains(&image.to_string()))
        }

        async fn pull(&self, image: &ImageReference) -> Result<()> {
            self.calls.lock().unwrap().push(format!("pull:{image}"));
            Ok(())
        }
    }

    fn image(name: &str, tag: &str) -> ImageReference {
        ImageReference {
            name: name.to_string(),
            tag: tag.to_string(),
        }
    }

    #[tokio::test]
    async fn test_pulls_only_missing_images() {
        let engine = RecordingEngine {
            present: vec!["rhmap/mongodb:3.2".to_string()],
            ..Default::default()
        };
        let images = [image("rhmap/mongodb", "3.2"), image("rhmap/fh-aaa", "1.0")];

        seed_images(&engine, None, &images).await.unwrap();

        let calls = engine.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                "present:rhmap/mongodb:3.2".to_string(),
                "present:rhmap/fh-aaa:1.0".to_string(),
                "pull:rhmap/fh-aaa:1.0".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_logs_in_before_pulling_when_credentials_given() {
        let engine = RecordingEngine::default();
        let registry = RegistryConfig {
            username: "seeder".to_string(),
            password: "hunter2".to_string(),
            ..Default::default()
        };
        let images = [image("rhmap/fh-aaa", "1.0")];

        seed_images(&engine, Some(&registry), &images).await.unwrap();

        let calls = engine.calls.lock().unwrap();
        assert_eq!(calls[0], "login:seeder");
    }

    #[tokio::test]
    async fn test_no_login_without_credentials() {
        let engine = RecordingEngine::default();
        seed_images(&engine, None, &[]).await.unwrap();
        assert!(engine.calls.lock().unwrap().is_empty());
    }
}
