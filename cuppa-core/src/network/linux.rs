//! Loopback alias handling on Linux.

#[cfg(target_os = "linux")]
use std::net::Ipv4Addr;
#[cfg(target_os = "linux")]
use async_trait::async_trait;
#[cfg(target_os = "linux")]
use tokio::process::Command;

#[cfg(target_os = "linux")]
use super::{parse_ifconfig_addresses, AliasBackend};
#[cfg(target_os = "linux")]
use crate::error::Result;
#[cfg(target_os = "linux")]
use crate::process;

#[cfg(target_os = "linux")]
const LOOPBACK: &str = "lo";
#[cfg(target_os = "linux")]
const LOOPBACK_ALIAS: &str = "lo:0";

/// Drives the `lo:0` sub-interface through net-tools `ifconfig`.
#[cfg(target_os = "linux")]
pub struct LinuxAlias;

#[cfg(target_os = "linux")]
impl LinuxAlias {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl Default for LinuxAlias {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl AliasBackend for LinuxAlias {
    async fn addresses(&self) -> Result<Vec<Ipv4Addr>> {
        let mut cmd = Command::new("ifconfig");
        cmd.arg(LOOPBACK);
        let output = process::run_captured(&mut cmd).await?;
        Ok(parse_ifconfig_addresses(&output))
    }

    async fn add_alias(&self, ip: Ipv4Addr) -> Result<()> {
        let address = ip.to_string();
        let mut cmd = Command::new("sudo");
        cmd.args(["ifconfig", LOOPBACK_ALIAS, address.as_str()]);
        process::run_interactive(&mut cmd).await
    }

    async fn remove_alias(&self, _ip: Ipv4Addr) -> Result<()> {
        let mut cmd = Command::new("sudo");
        cmd.args(["ifconfig", LOOPBACK_ALIAS, "down"]);
        process::run_interactive(&mut cmd).await
    }
}
