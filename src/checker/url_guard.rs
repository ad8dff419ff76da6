//! Outbound URL validation.
//!
//! A URL is only fetched when its scheme is http(s) and every address its
//! host resolves to is publicly routable. The vetted addresses travel with
//! the URL so the fetcher connects to exactly what was checked.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    /// The URL targets something that must never be fetched.
    #[error("SSRF protection: {0}")]
    Blocked(String),
    /// DNS lookup failed; treated like any other network failure.
    #[error("DNS resolution failed for {host}: {reason}")]
    Unresolvable { host: String, reason: String },
}

/// Resolves a host name to socket addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the system (getaddrinfo via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// A URL that passed validation, with the addresses it was checked against.
#[derive(Debug, Clone)]
pub struct SafeUrl {
    pub url: Url,
    /// Host name as it appears in the URL (without IPv6 brackets).
    pub host: String,
    pub addrs: Vec<SocketAddr>,
}

/// SSRF guard for outbound fetches.
#[derive(Clone)]
pub struct UrlGuard {
    resolver: Arc<dyn HostResolver>,
}

impl UrlGuard {
    pub fn new(resolver: Arc<dyn HostResolver>) -> Self {
        Self { resolver }
    }

    /// Guard using the system resolver.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemResolver))
    }

    /// Validate a URL and resolve its host.
    pub async fn validate(&self, raw: &str) -> Result<SafeUrl, UrlRejection> {
        let url = Url::parse(raw.trim())
            .map_err(|e| UrlRejection::Blocked(format!("invalid URL '{}': {}", raw, e)))?;

        if let Some(reason) = literal_rejection(&url) {
            return Err(UrlRejection::Blocked(reason));
        }

        let port = url.port_or_known_default().unwrap_or(80);
        let (host, addrs) = match url.host() {
            Some(Host::Ipv4(ip)) => (ip.to_string(), vec![SocketAddr::new(IpAddr::V4(ip), port)]),
            Some(Host::Ipv6(ip)) => (ip.to_string(), vec![SocketAddr::new(IpAddr::V6(ip), port)]),
            Some(Host::Domain(domain)) => (domain.to_string(), self.resolve_host(domain, port).await?),
            None => return Err(UrlRejection::Blocked("URL has no host".to_string())),
        };

        Ok(SafeUrl { url, host, addrs })
    }

    /// Resolve a host name and refuse it unless every address is public.
    ///
    /// Also used by the HTTP client for each redirect hop, so a hop's
    /// addresses are checked after its own DNS lookup.
    pub async fn resolve_host(
        &self,
        host: &str,
        port: u16,
    ) -> Result<Vec<SocketAddr>, UrlRejection> {
        let addrs = self
            .resolver
            .resolve(host, port)
            .await
            .map_err(|e| UrlRejection::Unresolvable {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        if addrs.is_empty() {
            return Err(UrlRejection::Unresolvable {
                host: host.to_string(),
                reason: "no addresses returned".to_string(),
            });
        }

        for addr in &addrs {
            if let Some(reason) = ip_rejection(addr.ip()) {
                return Err(UrlRejection::Blocked(format!("{} resolves to {}", host, reason)));
            }
        }

        Ok(addrs)
    }
}

/// Checks that need no DNS: scheme, localhost names and literal addresses.
///
/// Also applied to every redirect target.
pub fn literal_rejection(url: &Url) -> Option<String> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Some(format!("scheme '{}' is not allowed", other)),
    }

    match url.host() {
        None => Some("URL has no host".to_string()),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                Some(format!("host '{}' is local", domain))
            } else {
                None
            }
        }
        Some(Host::Ipv4(ip)) => ip_rejection(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => ip_rejection(IpAddr::V6(ip)),
    }
}

/// Describe why an address is not publicly routable, if it isn't.
pub fn ip_rejection(ip: IpAddr) -> Option<String> {
    match ip {
        IpAddr::V4(v4) => v4_rejection(v4),
        IpAddr::V6(v6) => v6_rejection(v6),
    }
}

fn v4_rejection(ip: Ipv4Addr) -> Option<String> {
    let octets = ip.octets();
    let kind = if ip.is_loopback() {
        "loopback"
    } else if ip.is_private() {
        "private"
    } else if ip.is_link_local() {
        "link-local"
    } else if ip.is_unspecified() || octets[0] == 0 {
        "unspecified"
    } else if ip.is_broadcast() {
        "broadcast"
    } else if ip.is_multicast() {
        "multicast"
    } else if octets[0] == 100 && (octets[1] & 0xc0) == 64 {
        // 100.64.0.0/10
        "shared (CGNAT)"
    } else {
        return None;
    };
    Some(format!("{} address {}", kind, ip))
}

fn v6_rejection(ip: Ipv6Addr) -> Option<String> {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return v4_rejection(v4);
    }
    let first = ip.segments()[0];
    let kind = if ip.is_loopback() {
        "loopback"
    } else if ip.is_unspecified() {
        "unspecified"
    } else if (first & 0xfe00) == 0xfc00 {
        "unique-local"
    } else if (first & 0xffc0) == 0xfe80 {
        "link-local"
    } else if ip.is_multicast() {
        "multicast"
    } else {
        return None;
    };
    Some(format!("{} address {}", kind, ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubResolver {
        hosts: HashMap<String, Vec<IpAddr>>,
        calls: AtomicUsize,
    }

    impl StubResolver {
        fn with(mut self, host: &str, ips: &[&str]) -> Self {
            self.hosts.insert(
                host.to_string(),
                ips.iter().map(|ip| ip.parse().unwrap()).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl HostResolver for StubResolver {
        async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.hosts
                .get(host)
                .map(|ips| ips.iter().map(|ip| SocketAddr::new(*ip, port)).collect())
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no such host"))
        }
    }

    fn guard(resolver: StubResolver) -> (UrlGuard, Arc<StubResolver>) {
        let resolver = Arc::new(resolver);
        (UrlGuard::new(resolver.clone()), resolver)
    }

    fn assert_blocked(result: Result<SafeUrl, UrlRejection>) {
        match result {
            Err(e @ UrlRejection::Blocked(_)) => {
                assert!(e.to_string().starts_with("SSRF protection:"), "{}", e)
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blocks_internal_literals_without_dns() {
        let (guard, resolver) = guard(StubResolver::default());
        for url in [
            "http://127.0.0.1/",
            "http://127.8.9.10:8080/admin",
            "http://10.0.0.5/",
            "http://172.16.3.4/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://0.0.0.0/",
            "http://255.255.255.255/",
            "http://100.64.0.1/",
            "http://[::1]/",
            "http://[fc00::1]/",
            "http://[fd12:3456::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:127.0.0.1]/",
            "http://[::ffff:10.0.0.1]/",
            "http://localhost/",
            "http://LOCALHOST./",
            "http://api.localhost/",
        ] {
            assert_blocked(guard.validate(url).await);
        }
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_blocks_numeric_encodings_of_loopback() {
        let (guard, _) = guard(StubResolver::default());
        assert_blocked(guard.validate("http://2130706433/").await);
        assert_blocked(guard.validate("http://0x7f.1/").await);
        assert_blocked(guard.validate("http://0/").await);
    }

    #[tokio::test]
    async fn test_blocks_non_http_schemes() {
        let (guard, _) = guard(StubResolver::default());
        for url in [
            "ftp://example.com/file",
            "file:///etc/passwd",
            "gopher://example.com/",
            "javascript:alert(1)",
        ] {
            assert_blocked(guard.validate(url).await);
        }
        assert_blocked(guard.validate("not a url").await);
    }

    #[tokio::test]
    async fn test_allows_public_addresses() {
        let (guard, resolver) =
            guard(StubResolver::default().with("blog.example.org", &["93.184.216.34"]));

        let safe = guard.validate("https://blog.example.org/post").await.unwrap();
        assert_eq!(safe.host, "blog.example.org");
        assert_eq!(safe.addrs, vec!["93.184.216.34:443".parse().unwrap()]);

        let literal = guard.validate("http://8.8.8.8/").await.unwrap();
        assert_eq!(literal.addrs.len(), 1);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blocks_domain_resolving_to_private() {
        let (guard, _) = guard(
            StubResolver::default()
                .with("internal.example.com", &["10.1.2.3"])
                .with("mixed.example.com", &["93.184.216.34", "127.0.0.1"])
                .with("v6.example.com", &["fd00::5"]),
        );

        let err = guard
            .validate("http://internal.example.com/")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("internal.example.com"));

        assert_blocked(guard.validate("http://mixed.example.com/").await);
        assert_blocked(guard.validate("http://v6.example.com/").await);
    }

    #[tokio::test]
    async fn test_dns_failure_is_not_ssrf() {
        let (guard, _) = guard(StubResolver::default());
        let err = guard.validate("https://nowhere.invalid/").await.unwrap_err();
        assert!(matches!(err, UrlRejection::Unresolvable { .. }));
        assert!(!err.to_string().contains("SSRF"));
    }

    #[test]
    fn test_redirect_literal_checks() {
        let url = Url::parse("https://example.com/next").unwrap();
        assert_eq!(literal_rejection(&url), None);
        let url = Url::parse("http://169.254.169.254/").unwrap();
        assert!(literal_rejection(&url).unwrap().contains("link-local"));
        assert_eq!(ip_rejection("2606:4700::1111".parse().unwrap()), None);
    }
}
