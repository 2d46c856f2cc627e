//! Loopback alias handling on macOS.

#[cfg(target_os = "macos")]
use std::net::Ipv4Addr;
#[cfg(target_os = "macos")]
use async_trait::async_trait;
#[cfg(target_os = "macos")]
use tokio::process::Command;

#[cfg(target_os = "macos")]
use super::{parse_ifconfig_addresses, AliasBackend};
#[cfg(target_os = "macos")]
use crate::error::Result;
#[cfg(target_os = "macos")]
use crate::process;

#[cfg(target_os = "macos")]
const LOOPBACK: &str = "lo0";

/// Drives `lo0` aliases through the BSD `ifconfig`.
#[cfg(target_os = "macos")]
pub struct MacosAlias;

#[cfg(target_os = "macos")]
impl MacosAlias {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "macos")]
impl Default for MacosAlias {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
#[async_trait]
impl AliasBackend for MacosAlias {
    async fn addresses(&self) -> Result<Vec<Ipv4Addr>> {
        let mut cmd = Command::new("ifconfig");
        cmd.arg(LOOPBACK);
        let output = process::run_captured(&mut cmd).await?;
        Ok(parse_ifconfig_addresses(&output))
    }

    async fn add_alias(&self, ip: Ipv4Addr) -> Result<()> {
        let address = ip.to_string();
        let mut cmd = Command::new("sudo");
        cmd.args(["ifconfig", LOOPBACK, "alias", address.as_str()]);
        process::run_interactive(&mut cmd).await
    }

    async fn remove_alias(&self, ip: Ipv4Addr) -> Result<()> {
        let address = ip.to_string();
        let mut cmd = Command::new("sudo");
        cmd.args(["ifconfig", LOOPBACK, "-alias", address.as_str()]);
        process::run_interactive(&mut cmd).await
    }
}
