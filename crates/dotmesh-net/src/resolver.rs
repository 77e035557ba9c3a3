//! DNS resolution abstraction
//!
//! Address synthesis and probing both need to resolve peer hostnames.
//! The trait lets tests substitute a fixed table for the system resolver.

use dotmesh_core::dedupe;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

/// Default bound on a single hostname lookup
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Hostname resolver
#[allow(async_fn_in_trait)]
pub trait Resolver: Send + Sync {
    /// Resolve a hostname to all of its addresses
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system, via tokio
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new(DEFAULT_RESOLVE_TIMEOUT)
    }
}

impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::time::timeout(self.timeout, tokio::net::lookup_host((host, 0)))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("resolving {host} timed out")))??;
        Ok(dedupe(addrs.map(|addr| addr.ip()).collect()))
    }
}

pub mod mock {
    //! Fixed-table resolver for tests

    use super::*;
    use std::collections::HashMap;

    /// Resolves only the hostnames it was given
    #[derive(Debug, Clone, Default)]
    pub struct StaticResolver {
        table: HashMap<String, Vec<IpAddr>>,
    }

    impl StaticResolver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Register the addresses a hostname resolves to
        pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
            let ips = addrs.iter().filter_map(|a| a.parse().ok()).collect();
            self.table.insert(host.to_string(), ips);
            self
        }
    }

    impl Resolver for StaticResolver {
        async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
            self.table
                .get(host)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such host: {host}")))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_static_resolver() {
            let resolver = StaticResolver::new().with_host("dual.example", &["1.2.3.4", "2001:db8::1"]);
            let ips = resolver.lookup("dual.example").await.unwrap();
            assert_eq!(ips.len(), 2);
            assert!(resolver.lookup("missing.example").await.is_err());
        }
    }
}
