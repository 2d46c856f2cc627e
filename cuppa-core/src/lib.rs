//! Core library for cuppa, a bootstrapper for a local single-node
//! OpenShift cluster with the full RHMAP platform installed on top.
//!
//! The pipeline lives in [`orchestrator::Orchestrator`]; everything
//! that touches an external system sits behind a trait so it can be
//! substituted in tests.

pub mod appclient;
pub mod cluster;
pub mod config;
pub mod datadir;
pub mod error;
pub mod images;
pub mod network;
pub mod orchestrator;
pub mod poll;
pub mod process;
pub mod seeder;

pub use cluster::{ControlPlane, Identity, Reachability};
pub use config::Config;
pub use error::{CuppaError, Result};
pub use images::ImageReference;
pub use orchestrator::{Orchestrator, UpOptions};
