use crate::error::PreviewError;
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Admission policy applied to every requested URL before any network access
#[derive(Debug, Clone)]
pub struct UrlValidationConfig {
    /// Reject localhost and loopback/private/link-local IP literals (default: true)
    pub block_private_hosts: bool,
    /// Domain blacklist, matched on the domain and its subdomains
    pub blocked_domains: HashSet<String>,
    /// Domain whitelist (if not empty, only these domains are allowed)
    pub allowed_domains: HashSet<String>,
}

impl Default for UrlValidationConfig {
    fn default() -> Self {
        Self {
            block_private_hosts: true,
            blocked_domains: HashSet::new(),
            allowed_domains: HashSet::new(),
        }
    }
}

impl UrlValidationConfig {
    /// Scheme and host checks only.
    pub fn permissive() -> Self {
        Self {
            block_private_hosts: false,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct UrlValidator {
    config: UrlValidationConfig,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new(UrlValidationConfig::default())
    }
}

impl UrlValidator {
    pub fn new(config: UrlValidationConfig) -> Self {
        Self { config }
    }

    /// Parses and admits `url_str`.
    ///
    /// Anything that cannot be fetched over HTTP is a `MalformedUrl`; hosts the
    /// policy refuses are `UrlNotAllowed`.
    pub fn validate(&self, url_str: &str) -> Result<Url, PreviewError> {
        let url = Url::parse(url_str.trim())?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PreviewError::MalformedUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .ok_or_else(|| PreviewError::MalformedUrl("no host in URL".to_string()))?;

        // IP literals never match an allowlist; blocklist entries may name them.
        let host_name = host.to_string().to_ascii_lowercase();
        if !self.config.allowed_domains.is_empty() {
            let allowed = matches!(host, Host::Domain(_))
                && matches_any(&host_name, &self.config.allowed_domains);
            if !allowed {
                return Err(PreviewError::UrlNotAllowed(format!(
                    "host not in allowlist: {host_name}"
                )));
            }
        } else if matches_any(&host_name, &self.config.blocked_domains) {
            return Err(PreviewError::UrlNotAllowed(format!("domain blocked: {host_name}")));
        }

        if self.config.block_private_hosts && is_private_host(&host) {
            return Err(PreviewError::UrlNotAllowed(format!("private host: {host}")));
        }

        Ok(url)
    }
}

fn matches_any(domain: &str, list: &HashSet<String>) -> bool {
    list.iter()
        .any(|entry| domain == entry || domain.ends_with(&format!(".{entry}")))
}

fn is_private_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_private_v4(ip),
        Host::Ipv6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => is_private_v6(ip),
        },
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
        // 100.64.0.0/10 carrier-grade NAT
        || (a == 100 && (b & 0b1100_0000) == 0b0100_0000)
        // 240.0.0.0/4 reserved
        || a >= 240
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_multicast()
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
}
