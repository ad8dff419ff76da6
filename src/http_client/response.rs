//! Fetch options, responses and transport errors.

use std::time::Duration;

use thiserror::Error;

use crate::checker::url_guard::UrlRejection;

const SSRF_MARKER: &str = "SSRF protection: ";

/// Per-fetch settings, derived from service settings and the owner's timeout.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Bodies larger than this are abandoned.
    pub max_body_bytes: usize,
}

/// A completed HTTP exchange. Non-2xx statuses are valid responses.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    /// Body text; empty for non-2xx responses, which are never scanned.
    pub body: String,
    /// URL after redirects, used to resolve relative links.
    pub final_url: String,
}

impl FetchResponse {
    /// Check if the response is successful (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network-level failures. All of them mean "page unreachable".
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A redirect hop led to an address that must never be fetched.
    #[error("SSRF protection: {0}")]
    Blocked(String),
    #[error("Request timed out after {0}s")]
    Timeout(u64),
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Redirect failed: {0}")]
    Redirect(String),
    #[error("Response body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Classify a reqwest error, keeping the full source chain in the message.
    pub fn from_reqwest(e: &reqwest::Error, timeout: Duration) -> Self {
        if let Some(reason) = ssrf_reason(e) {
            Self::Blocked(reason)
        } else if e.is_timeout() {
            Self::Timeout(timeout.as_secs())
        } else if e.is_redirect() {
            Self::Redirect(error_chain(e))
        } else if e.is_connect() {
            Self::Connect(error_chain(e))
        } else {
            Self::Request(error_chain(e))
        }
    }
}

/// Reason text when the error chain carries a guard refusal.
///
/// Resolver refusals arrive as `UrlRejection` sources; redirect policy
/// refusals only survive as text.
fn ssrf_reason(e: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut source = Some(e);
    while let Some(err) = source {
        if let Some(UrlRejection::Blocked(reason)) = err.downcast_ref::<UrlRejection>() {
            return Some(reason.clone());
        }
        source = err.source();
    }
    error_chain(e)
        .split_once(SSRF_MARKER)
        .map(|(_, reason)| reason.to_string())
}

/// Join an error and its sources into one line.
fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(src) = source {
        let text = src.to_string();
        if !msg.contains(&text) {
            msg = format!("{}: {}", msg, text);
        }
        source = src.source();
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let mut response = FetchResponse {
            status: 200,
            body: String::new(),
            final_url: "https://example.com/".into(),
        };
        assert!(response.is_success());
        response.status = 299;
        assert!(response.is_success());
        response.status = 301;
        assert!(!response.is_success());
        response.status = 404;
        assert!(!response.is_success());
    }

    #[test]
    fn test_transport_error_messages() {
        assert_eq!(
            TransportError::Timeout(30).to_string(),
            "Request timed out after 30s"
        );
        assert!(TransportError::BodyTooLarge(1024)
            .to_string()
            .contains("1024"));
        assert_eq!(
            TransportError::Blocked("loopback address 127.0.0.1".into()).to_string(),
            "SSRF protection: loopback address 127.0.0.1"
        );
    }

    #[derive(Debug, Error)]
    #[error("dns error")]
    struct Wrapper(#[source] Box<dyn std::error::Error + Send + Sync>);

    #[test]
    fn test_ssrf_reason_found_in_source_chain() {
        let rejection = UrlRejection::Blocked("vm resolves to loopback address 127.0.0.1".into());
        let wrapped = Wrapper(Box::new(rejection));
        assert_eq!(
            ssrf_reason(&wrapped).as_deref(),
            Some("vm resolves to loopback address 127.0.0.1")
        );

        let plain = Wrapper("SSRF protection: link-local address 169.254.169.254".into());
        assert_eq!(
            ssrf_reason(&plain).as_deref(),
            Some("link-local address 169.254.169.254")
        );

        let unrelated = Wrapper("connection refused".into());
        assert_eq!(ssrf_reason(&unrelated), None);
    }
}
