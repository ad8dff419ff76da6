//! HTTP fetching for source pages.
//!
//! Every fetch goes to an address set already vetted by the URL guard; the
//! client is pinned to those addresses so a second DNS lookup cannot swap in
//! an internal host. Redirect hops to other hosts are resolved through the
//! same guard.

mod dns;
mod response;
mod user_agent;

pub use dns::GuardedResolver;
pub use response::{FetchOptions, FetchResponse, TransportError};
pub use user_agent::{resolve_user_agent, USER_AGENT};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::{Attempt, Policy};
use reqwest::Client;
use tracing::debug;

use crate::checker::url_guard::{literal_rejection, SafeUrl, UrlGuard};

/// Maximum number of redirects followed per fetch.
pub const MAX_REDIRECTS: usize = 5;

/// Fetches a vetted page.
///
/// Implementations must only contact the addresses in `SafeUrl::addrs` for
/// the initial request, and must vet the addresses of every redirect hop.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &SafeUrl,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    guard: UrlGuard,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(UrlGuard::system())
    }
}

impl HttpFetcher {
    /// Create a fetcher whose redirect hops are resolved through `guard`.
    pub fn new(guard: UrlGuard) -> Self {
        Self { guard }
    }

    fn build_client(&self, url: &SafeUrl, options: &FetchOptions) -> Result<Client, TransportError> {
        Client::builder()
            .user_agent(&options.user_agent)
            .timeout(options.timeout)
            .connect_timeout(options.timeout.min(Duration::from_secs(10)))
            .gzip(true)
            .brotli(true)
            .redirect(Policy::custom(redirect_policy))
            .no_proxy()
            .dns_resolver(Arc::new(GuardedResolver::new(self.guard.clone())))
            .resolve_to_addrs(&url.host, &url.addrs)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn fetch_inner(
        &self,
        url: &SafeUrl,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        let client = self.build_client(url, options)?;
        let response = client
            .get(url.url.clone())
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, options.timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        debug!("GET {} -> {} ({})", url.url, status, final_url);

        if !response.status().is_success() {
            return Ok(FetchResponse {
                status,
                body: String::new(),
                final_url,
            });
        }

        let body = read_capped(response, options).await?;
        Ok(FetchResponse {
            status,
            body,
            final_url,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &SafeUrl,
        options: &FetchOptions,
    ) -> Result<FetchResponse, TransportError> {
        match tokio::time::timeout(options.timeout, self.fetch_inner(url, options)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(options.timeout.as_secs())),
        }
    }
}

/// Follow at most `MAX_REDIRECTS` hops, never into a blocked literal address.
///
/// Named hosts are vetted later, when `GuardedResolver` resolves them.
fn redirect_policy(attempt: Attempt) -> reqwest::redirect::Action {
    if attempt.previous().len() >= MAX_REDIRECTS {
        return attempt.error(format!("too many redirects (max {})", MAX_REDIRECTS));
    }
    if let Some(reason) = literal_rejection(attempt.url()) {
        return attempt.error(format!("SSRF protection: {}", reason));
    }
    attempt.follow()
}

async fn read_capped(
    mut response: reqwest::Response,
    options: &FetchOptions,
) -> Result<String, TransportError> {
    if let Some(len) = response.content_length() {
        if len as usize > options.max_body_bytes {
            return Err(TransportError::BodyTooLarge(options.max_body_bytes));
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TransportError::from_reqwest(&e, options.timeout))?
    {
        if buf.len() + chunk.len() > options.max_body_bytes {
            return Err(TransportError::BodyTooLarge(options.max_body_bytes));
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::url_guard::HostResolver;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use url::Url;

    /// Maps `internal.test` to loopback; every other name is unknown.
    struct InternalNameResolver;

    #[async_trait]
    impl HostResolver for InternalNameResolver {
        async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
            match host {
                "internal.test" => Ok(vec![SocketAddr::new(
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    port,
                )]),
                _ => Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no such host",
                )),
            }
        }
    }

    /// Local server standing in for a third-party page and an internal
    /// service on the same port. Records every requested path.
    async fn spawn_server() -> (u16, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let paths = Arc::new(Mutex::new(Vec::new()));

        let seen = paths.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let seen = seen.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                    seen.lock().unwrap().push(path.clone());

                    let response = match path.as_str() {
                        "/to-internal" => redirect(&format!("http://internal.test:{}/secret", port)),
                        "/to-page" => redirect(&format!("http://public.test:{}/page", port)),
                        "/secret" => ok("INTERNAL SECRET"),
                        _ => ok("<a href=\"https://mysite.com\">hi</a>"),
                    };
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (port, paths)
    }

    fn redirect(location: &str) -> String {
        format!(
            "HTTP/1.1 302 Found\r\nLocation: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            location
        )
    }

    fn ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// A vetted URL for `public.test`, pinned to the local server.
    fn pinned(port: u16, path: &str) -> SafeUrl {
        SafeUrl {
            url: Url::parse(&format!("http://public.test:{}{}", port, path)).unwrap(),
            host: "public.test".to_string(),
            addrs: vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)],
        }
    }

    fn options() -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(10),
            user_agent: USER_AGENT.to_string(),
            max_body_bytes: 1024,
        }
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(UrlGuard::new(Arc::new(InternalNameResolver)))
    }

    #[tokio::test]
    async fn test_redirect_to_name_resolving_internally_is_refused() {
        let (port, paths) = spawn_server().await;

        let err = fetcher()
            .fetch(&pinned(port, "/to-internal"), &options())
            .await
            .unwrap_err();

        match &err {
            TransportError::Blocked(reason) => {
                assert!(reason.contains("internal.test"), "{}", reason)
            }
            other => panic!("expected Blocked, got {:?}", other),
        }
        assert!(err.to_string().starts_with("SSRF protection:"));
        assert_eq!(*paths.lock().unwrap(), vec!["/to-internal".to_string()]);
    }

    #[tokio::test]
    async fn test_redirect_within_pinned_host_is_followed() {
        let (port, paths) = spawn_server().await;

        let response = fetcher()
            .fetch(&pinned(port, "/to-page"), &options())
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.contains("mysite.com"));
        assert!(response.final_url.ends_with("/page"));
        assert_eq!(paths.lock().unwrap().len(), 2);
    }
}
