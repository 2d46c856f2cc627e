//! Error types for cuppa operations.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CuppaError>;

#[derive(Error, Debug)]
pub enum CuppaError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Command failed: {command}: {message}")]
    CommandFailed { command: String, message: String },

    #[error("Command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("{name} binary not found. {hint}")]
    BinaryNotFound { name: String, hint: String },

    #[error("A cluster is already running at {address}")]
    ClusterAlreadyUp { address: String },

    #[error("Cluster at {address} did not become reachable")]
    ClusterNotReachable { address: String },

    #[error("Cluster at {address} is still reachable after shutdown")]
    ClusterStillReachable { address: String },

    #[error("Timed out waiting for {subject} to settle after {elapsed:?}")]
    PollTimeout { subject: String, elapsed: Duration },

    #[error("Virtual interface for {ip} is not present after creation")]
    InterfaceNotPresent { ip: Ipv4Addr },

    #[error("{feature} is not supported on {platform}")]
    PlatformUnsupported { feature: String, platform: String },

    #[error("Failed to read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse template {path}: {source}")]
    TemplateParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Image parameter {parameter} has no matching version parameter")]
    UnpairedImageParameter { parameter: String },

    #[error("Failed to pull image {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Could not parse client version from {raw:?}")]
    VersionUnparsable { raw: String },

    #[error("Refusing to operate on data directory: {reason}")]
    InvalidDataDir { reason: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
