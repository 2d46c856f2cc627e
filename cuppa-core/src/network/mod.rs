//! Loopback alias management for the cluster address.
//!
//! The cluster binds to a dedicated virtual interface so that routes
//! resolve to a stable address regardless of the host network. Alias
//! creation goes through `ifconfig` and needs sudo, inspection does
//! not.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;

use async_trait::async_trait;
use std::net::Ipv4Addr;
use tracing::{info, instrument};

use crate::error::{CuppaError, Result};

/// Platform-specific alias operations on the loopback interface.
#[async_trait]
pub trait AliasBackend: Send + Sync {
    /// All IPv4 addresses currently bound to the loopback interface.
    async fn addresses(&self) -> Result<Vec<Ipv4Addr>>;

    async fn add_alias(&self, ip: Ipv4Addr) -> Result<()>;

    async fn remove_alias(&self, ip: Ipv4Addr) -> Result<()>;
}

/// Manages the virtual interface the cluster binds to.
pub struct InterfaceManager {
    backend: Box<dyn AliasBackend>,
}

impl InterfaceManager {
    pub fn new(backend: Box<dyn AliasBackend>) -> Self {
        Self { backend }
    }

    /// Backend for the host platform.
    pub fn for_host() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::new(Box::new(linux::LinuxAlias::new())))
        }

        #[cfg(target_os = "macos")]
        {
            Ok(Self::new(Box::new(macos::MacosAlias::new())))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            Err(CuppaError::PlatformUnsupported {
                feature: "virtual interface management".to_string(),
                platform: std::env::consts::OS.to_string(),
            })
        }
    }

    /// Whether the address is already bound to the loopback interface.
    /// Matches on exact address equality.
    pub async fn exists(&self, ip: Ipv4Addr) -> Result<bool> {
        let addresses = self.backend.addresses().await?;
        Ok(addresses.contains(&ip))
    }

    /// Bind the address to the loopback interface unless it is already
    /// there. Creation is verified with a second inspection, an alias
    /// that does not show up afterwards is an error.
    #[instrument(skip(self))]
    pub async fn ensure(&self, ip: Ipv4Addr) -> Result<()> {
        info!(%ip, "Creating or re-using virtual interface");

        if self.exists(ip).await? {
            info!(%ip, "Virtual interface already exists, continuing");
            return Ok(());
        }

        self.backend.add_alias(ip).await?;

        if !self.exists(ip).await? {
            return Err(CuppaError::InterfaceNotPresent { ip });
        }

        metrics::counter!("cuppa_interface_created_total").increment(1);
        info!(%ip, "Virtual interface created");
        Ok(())
    }

    /// Remove the alias if it is present. Removing an absent alias is
    /// a no-op.
    #[instrument(skip(self))]
    pub async fn destroy(&self, ip: Ipv4Addr) -> Result<()> {
        info!(%ip, "Destroying virtual interface");

        if !self.exists(ip).await? {
            info!(%ip, "Virtual interface does not exist, nothing to remove");
            return Ok(());
        }

        self.backend.remove_alias(ip).await?;
        metrics::counter!("cuppa_interface_removed_total").increment(1);
        info!(%ip, "Virtual interface removed");
        Ok(())
    }
}

/// Pull the IPv4 addresses out of `ifconfig` output. Handles both the
/// BSD format (`inet 127.0.0.1`) and the Linux net-tools format
/// (`inet addr:127.0.0.1`).
#[cfg(any(target_os = "linux", target_os = "macos", test))]
pub(crate) fn parse_ifconfig_addresses(output: &str) -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    let mut tokens = output.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        if token != "inet" {
            continue;
        }
        if let Some(value) = tokens.peek() {
            let value = value.strip_prefix("addr:").unwrap_or(value);
            if let Ok(address) = value.parse::<Ipv4Addr>() {
                addresses.push(address);
            }
        }
    }

    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    const MACOS_LOOPBACK: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\toptions=1203<RXCSUM,TXCSUM,TXSTATUS,SW_TIMESTAMP>
\tinet 127.0.0.1 netmask 0xff000000
\tinet6 ::1 prefixlen 128
\tinet 192.168.44.10 netmask 0xffffff00
\tnd6 options=201<PERFORMNUD,DAD>
";

    const LINUX_LOOPBACK: &str = "\
lo        Link encap:Local Loopback
          inet addr:127.0.0.1  Mask:255.0.0.0
          inet6 addr: ::1/128 Scope:Host
          UP LOOPBACK RUNNING  MTU:65536  Metric:1

lo:0      Link encap:Local Loopback
          inet addr:192.168.44.10  Mask:255.255.255.255
          UP LOOPBACK RUNNING  MTU:65536  Metric:1
";

    #[test]
    fn test_parse_macos_ifconfig_output() {
        let addresses = parse_ifconfig_addresses(MACOS_LOOPBACK);
        assert_eq!(
            addresses,
            vec![
                Ipv4Addr::new(127, 0, 0, 1),
                Ipv4Addr::new(192, 168, 44, 10)
            ]
        );
    }

    #[test]
    fn test_parse_linux_ifconfig_output() {
        let addresses = parse_ifconfig_addresses(LINUX_LOOPBACK);
        assert_eq!(
            addresses,
            vec![
                Ipv4Addr::new(127, 0, 0, 1),
                Ipv4Addr::new(192, 168, 44, 10)
            ]
        );
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_ifconfig_addresses("").is_empty());
    }

    struct MockBackend {
        bound: Mutex<HashSet<Ipv4Addr>>,
        adds: Arc<Mutex<Vec<Ipv4Addr>>>,
        removes: Arc<Mutex<Vec<Ipv4Addr>>>,
        // When set, add_alias succeeds without actually binding.
        silently_fail_adds: bool,
    }

    impl MockBackend {
        fn new(bound: &[Ipv4Addr]) -> Self {
            Self {
                bound: Mutex::new(bound.iter().copied().collect()),
                adds: Arc::new(Mutex::new(Vec::new())),
                removes: Arc::new(Mutex::new(Vec::new())),
                silently_fail_adds: false,
            }
        }
    }

    #[async_trait]
    impl AliasBackend for MockBackend {
        async fn addresses(&self) -> Result<Vec<Ipv4Addr>> {
            Ok(self.bound.lock().unwrap().iter().copied().collect())
        }

        async fn add_alias(&self, ip: Ipv4Addr) -> Result<()> {
            self.adds.lock().unwrap().push(ip);
            if !self.silently_fail_adds {
                self.bound.lock().unwrap().insert(ip);
            }
            Ok(())
        }

        async fn remove_alias(&self, ip: Ipv4Addr) -> Result<()> {
            self.removes.lock().unwrap().push(ip);
            self.bound.lock().unwrap().remove(&ip);
            Ok(())
        }
    }

    fn cluster_ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 44, 10)
    }

    #[tokio::test]
    async fn test_ensure_creates_missing_alias() {
        let backend = Box::new(MockBackend::new(&[Ipv4Addr::new(127, 0, 0, 1)]));
        let manager = InterfaceManager::new(backend);

        manager.ensure(cluster_ip()).await.unwrap();
        assert!(manager.exists(cluster_ip()).await.unwrap());
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let backend = MockBackend::new(&[cluster_ip()]);
        let manager = InterfaceManager::new(Box::new(backend));

        manager.ensure(cluster_ip()).await.unwrap();
        manager.ensure(cluster_ip()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_skips_creation_when_present() {
        let backend = MockBackend::new(&[cluster_ip()]);
        let adds = Arc::clone(&backend.adds);
        let manager = InterfaceManager::new(Box::new(backend));

        manager.ensure(cluster_ip()).await.unwrap();
        assert!(adds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_fails_when_alias_does_not_appear() {
        let backend = MockBackend {
            silently_fail_adds: true,
            ..MockBackend::new(&[])
        };
        let manager = InterfaceManager::new(Box::new(backend));

        let err = manager.ensure(cluster_ip()).await.unwrap_err();
        assert!(matches!(err, CuppaError::InterfaceNotPresent { ip } if ip == cluster_ip()));
    }

    #[tokio::test]
    async fn test_destroy_removes_alias() {
        let backend = MockBackend::new(&[cluster_ip()]);
        let manager = InterfaceManager::new(Box::new(backend));

        manager.destroy(cluster_ip()).await.unwrap();
        assert!(!manager.exists(cluster_ip()).await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_absent_alias_is_a_noop() {
        let backend = MockBackend::new(&[Ipv4Addr::new(127, 0, 0, 1)]);
        let manager = InterfaceManager::new(Box::new(backend));

        manager.destroy(cluster_ip()).await.unwrap();
        manager.destroy(cluster_ip()).await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_then_ensure_round_trips() {
        let backend = MockBackend::new(&[cluster_ip()]);
        let manager = InterfaceManager::new(Box::new(backend));

        manager.destroy(cluster_ip()).await.unwrap();
        assert!(!manager.exists(cluster_ip()).await.unwrap());

        manager.ensure(cluster_ip()).await.unwrap();
        assert!(manager.exists(cluster_ip()).await.unwrap());

        manager.destroy(cluster_ip()).await.unwrap();
        assert!(!manager.exists(cluster_ip()).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists_requires_exact_match() {
        let backend = MockBackend::new(&[Ipv4Addr::new(192, 168, 44, 11)]);
        let manager = InterfaceManager::new(Box::new(backend));

        assert!(!manager.exists(cluster_ip()).await.unwrap());
    }
}
