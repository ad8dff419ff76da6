//! Backlink verification: guard, fetch, and scan a single source page.

pub mod anchor;
pub mod result;
pub mod url_guard;

pub use anchor::{find_match, AnchorMatch};
pub use result::{CheckOutcome, CheckResult, NOT_FOUND_MESSAGE};
pub use url_guard::{HostResolver, SafeUrl, SystemResolver, UrlGuard, UrlRejection};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::http_client::{FetchOptions, HttpFetcher, PageFetcher, TransportError, USER_AGENT};
use crate::models::{clamp_http_timeout, Backlink, DEFAULT_HTTP_TIMEOUT_SECS};

/// Default cap on downloaded page size.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Service-wide fetch settings. Per-check timeouts override `timeout`.
#[derive(Debug, Clone)]
pub struct CheckerSettings {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Verifies that a source page still links to its target.
///
/// Stateless between calls; safe to share across tasks.
#[derive(Clone)]
pub struct BacklinkChecker {
    guard: UrlGuard,
    fetcher: Arc<dyn PageFetcher>,
    settings: CheckerSettings,
}

impl BacklinkChecker {
    pub fn new(guard: UrlGuard, fetcher: Arc<dyn PageFetcher>, settings: CheckerSettings) -> Self {
        Self {
            guard,
            fetcher,
            settings,
        }
    }

    /// Checker using the system resolver and the reqwest fetcher.
    pub fn with_settings(settings: CheckerSettings) -> Self {
        let guard = UrlGuard::system();
        Self::new(guard.clone(), Arc::new(HttpFetcher::new(guard)), settings)
    }

    pub fn settings(&self) -> &CheckerSettings {
        &self.settings
    }

    /// Check with the service-wide timeout.
    pub async fn check(&self, backlink: &Backlink) -> CheckResult {
        self.check_with_timeout(backlink, self.settings.timeout).await
    }

    /// Check with an explicit timeout, clamped to the supported range.
    ///
    /// Never fails: every problem is folded into the returned result.
    pub async fn check_with_timeout(&self, backlink: &Backlink, timeout: Duration) -> CheckResult {
        let options = FetchOptions {
            timeout: Duration::from_secs(clamp_http_timeout(timeout.as_secs())),
            user_agent: self.settings.user_agent.clone(),
            max_body_bytes: self.settings.max_body_bytes,
        };

        let safe = match self.guard.validate(&backlink.source_url).await {
            Ok(safe) => safe,
            Err(rejection @ UrlRejection::Blocked(_)) => {
                warn!(
                    "Refusing to fetch {} for backlink {}: {}",
                    backlink.source_url, backlink.id, rejection
                );
                return CheckResult::blocked(rejection.to_string());
            }
            Err(rejection) => return CheckResult::transport(rejection.to_string()),
        };

        let response = match self.fetcher.fetch(&safe, &options).await {
            Ok(response) => response,
            Err(e @ TransportError::Blocked(_)) => {
                warn!(
                    "Refusing redirect while fetching {} for backlink {}: {}",
                    backlink.source_url, backlink.id, e
                );
                return CheckResult::blocked(e.to_string());
            }
            Err(e) => {
                debug!("Fetch of {} failed: {}", backlink.source_url, e);
                return CheckResult::transport(e.to_string());
            }
        };

        if !response.is_success() {
            return CheckResult::http_error(response.status);
        }

        let page_url = Url::parse(&response.final_url).unwrap_or(safe.url);
        match find_match(&response.body, &backlink.target_url, Some(&page_url)) {
            Some(anchor) => CheckResult::found(response.status, anchor),
            None => CheckResult::not_found(response.status),
        }
    }
}
