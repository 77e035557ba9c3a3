//! Advertised API URLs to address prefixes and probe hosts

use crate::resolver::Resolver;
use dotmesh_core::{dedupe, AddressPrefix};
use std::net::IpAddr;
use url::{Host, Url};

/// Host part of an advertised URL
#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlHost {
    Ip(IpAddr),
    Domain(String),
}

impl UrlHost {
    fn as_string(&self) -> String {
        match self {
            UrlHost::Ip(ip) => ip.to_string(),
            UrlHost::Domain(domain) => domain.clone(),
        }
    }
}

/// Extract the host of a URL, or `None` for malformed or host-less URLs
fn url_host(raw: &str) -> Option<UrlHost> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.host()? {
        Host::Ipv4(ip) => Some(UrlHost::Ip(IpAddr::V4(ip))),
        Host::Ipv6(ip) => Some(UrlHost::Ip(IpAddr::V6(ip))),
        Host::Domain(domain) if domain.is_empty() => None,
        Host::Domain(domain) => {
            // non-special schemes keep IP literals as opaque domains
            let bare = domain.trim_start_matches('[').trim_end_matches(']');
            match bare.parse::<IpAddr>() {
                Ok(ip) => Some(UrlHost::Ip(ip)),
                Err(_) => Some(UrlHost::Domain(domain.to_string())),
            }
        }
    }
}

/// Hostnames to probe for a peer, deduplicated
pub fn hosts_from_urls(urls: &[String]) -> Vec<String> {
    dedupe(
        urls.iter()
            .filter_map(|u| url_host(u))
            .map(|h| h.as_string())
            .collect(),
    )
}

/// Base prefixes a peer is reachable under.
///
/// IP literals map to `/ip4/` or `/ip6/`. Hostnames are resolved: any IPv4
/// result gives `/dns4/<host>`, any IPv6 result (or no result at all) gives
/// `/dns6/<host>`. Malformed URLs are skipped.
pub async fn base_prefixes_from_urls<R: Resolver>(urls: &[String], resolver: &R) -> Vec<AddressPrefix> {
    let mut out = Vec::new();
    for raw in urls {
        let Some(host) = url_host(raw) else {
            tracing::debug!("Skipping malformed API URL: {}", raw);
            continue;
        };
        match host {
            UrlHost::Ip(ip) => out.push(AddressPrefix::from_ip(ip)),
            UrlHost::Domain(domain) => {
                let ips = match resolver.lookup(&domain).await {
                    Ok(ips) => ips,
                    Err(e) => {
                        tracing::debug!("DNS lookup for {} failed: {}", domain, e);
                        Vec::new()
                    }
                };
                let v4 = ips.iter().any(IpAddr::is_ipv4);
                let v6 = ips.iter().any(IpAddr::is_ipv6);
                if v4 {
                    out.push(AddressPrefix::Dns4(domain.clone()));
                }
                if v6 || !v4 {
                    out.push(AddressPrefix::Dns6(domain));
                }
            }
        }
    }
    dedupe(out)
}
