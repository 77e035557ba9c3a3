//! Swarm port reachability probing
//!
//! A peer counts as publicly reachable when a plain TCP connect to its
//! swarm port succeeds on any of its addresses. All candidates are dialled
//! concurrently and the first success wins; the remaining dials are
//! cancelled.

use crate::resolver::Resolver;
use futures::stream::{FuturesUnordered, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;

/// Default per-connection deadline
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(1200);

/// Answers whether a peer's swarm port is open
#[allow(async_fn_in_trait)]
pub trait Reachability: Send + Sync {
    /// True if `port` is open on any of `hosts`
    async fn any_host_open(&self, hosts: &[String], port: u16) -> bool;
}

/// TCP connect prober
#[derive(Debug, Clone)]
pub struct TcpProbe<R> {
    resolver: R,
    dial_timeout: Duration,
}

impl<R: Resolver> TcpProbe<R> {
    pub fn new(resolver: R, dial_timeout: Duration) -> Self {
        Self {
            resolver,
            dial_timeout,
        }
    }

    /// Probe one host on all of its addresses
    pub async fn is_port_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        let targets = self.targets(host, port).await;
        if targets.is_empty() {
            return false;
        }

        let mut dials = JoinSet::new();
        for target in targets {
            dials.spawn(dial(target, timeout));
        }

        while let Some(joined) = dials.join_next().await {
            if let Ok(true) = joined {
                dials.abort_all();
                tracing::debug!("{}:{} is open", host, port);
                return true;
            }
        }
        false
    }

    /// Probe several hosts of one peer, first success wins
    pub async fn any_open(&self, hosts: &[String], port: u16, timeout: Duration) -> bool {
        let mut probes: FuturesUnordered<_> = hosts
            .iter()
            .map(|host| self.is_port_open(host, port, timeout))
            .collect();

        while let Some(open) = probes.next().await {
            if open {
                return true;
            }
        }
        false
    }

    /// Socket addresses to dial for `host`.
    ///
    /// Literal IPs are dialled directly. Hostnames are resolved; when that
    /// fails the hostname itself is dialled.
    async fn targets(&self, host: &str, port: u16) -> Vec<String> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return vec![SocketAddr::new(ip, port).to_string()];
        }
        match self.resolver.lookup(host).await {
            Ok(ips) if !ips.is_empty() => ips
                .into_iter()
                .map(|ip| SocketAddr::new(ip, port).to_string())
                .collect(),
            _ => vec![format!("{host}:{port}")],
        }
    }
}

impl<R: Resolver> Reachability for TcpProbe<R> {
    async fn any_host_open(&self, hosts: &[String], port: u16) -> bool {
        self.any_open(hosts, port, self.dial_timeout).await
    }
}

async fn dial(target: String, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect(target.as_str())).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            tracing::trace!("Dial {} failed: {}", target, e);
            false
        }
        Err(_) => {
            tracing::trace!("Dial {} timed out", target);
            false
        }
    }
}

pub mod mock {
    //! Table-driven reachability for tests

    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Reports a port open only for the hosts it was told about
    #[derive(Debug, Default)]
    pub struct StaticReachability {
        open: HashSet<String>,
        probed: Mutex<Vec<String>>,
    }

    impl StaticReachability {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_open(mut self, host: &str) -> Self {
            self.open.insert(host.to_string());
            self
        }

        /// Every host that was asked about, in order
        pub fn probed_hosts(&self) -> Vec<String> {
            self.probed.lock().unwrap().clone()
        }
    }

    impl Reachability for StaticReachability {
        async fn any_host_open(&self, hosts: &[String], _port: u16) -> bool {
            self.probed.lock().unwrap().extend(hosts.iter().cloned());
            hosts.iter().any(|h| self.open.contains(h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::mock::StaticResolver;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    async fn closed_port() -> u16 {
        let (listener, port) = listener().await;
        drop(listener);
        port
    }

    #[tokio::test]
    async fn test_open_port_on_literal_ip() {
        let (_listener, port) = listener().await;
        let probe = TcpProbe::new(StaticResolver::new(), DEFAULT_DIAL_TIMEOUT);
        assert!(probe.is_port_open("127.0.0.1", port, DEFAULT_DIAL_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_closed_port() {
        let port = closed_port().await;
        let probe = TcpProbe::new(StaticResolver::new(), DEFAULT_DIAL_TIMEOUT);
        assert!(!probe.is_port_open("127.0.0.1", port, DEFAULT_DIAL_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_hostname_any_resolved_address_wins() {
        let (_listener, port) = listener().await;
        // the first address is unroutable, the second is the listener
        let resolver = StaticResolver::new().with_host("peer.mesh", &["192.0.2.1", "127.0.0.1"]);
        let probe = TcpProbe::new(resolver, Duration::from_millis(500));

        let started = Instant::now();
        assert!(probe.is_port_open("peer.mesh", port, Duration::from_millis(500)).await);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_unresolvable_host_falls_back_to_literal() {
        let (_listener, port) = listener().await;
        // not in the table, dialled as "localhost:<port>" instead
        let probe = TcpProbe::new(StaticResolver::new(), DEFAULT_DIAL_TIMEOUT);
        assert!(probe.is_port_open("localhost", port, DEFAULT_DIAL_TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_any_host_open() {
        let (_listener, port) = listener().await;
        let probe = TcpProbe::new(StaticResolver::new(), Duration::from_millis(300));

        let hosts = vec!["192.0.2.55".to_string(), "127.0.0.1".to_string()];
        assert!(probe.any_host_open(&hosts, port).await);

        let closed = closed_port().await;
        assert!(!probe.any_host_open(&hosts, closed).await);
        assert!(!probe.any_host_open(&[], port).await);
    }

    #[tokio::test]
    async fn test_static_reachability_records_probes() {
        let reach = mock::StaticReachability::new().with_open("1.2.3.4");
        assert!(reach.any_host_open(&["1.2.3.4".to_string()], 4001).await);
        assert!(!reach.any_host_open(&["5.6.7.8".to_string()], 4001).await);
        assert_eq!(reach.probed_hosts(), vec!["1.2.3.4", "5.6.7.8"]);
    }
}
