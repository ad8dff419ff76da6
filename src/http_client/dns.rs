//! DNS resolution for the HTTP client that goes through the URL guard.
//!
//! reqwest resolves every redirect hop itself; routing those lookups through
//! `UrlGuard::resolve_host` means a hop is refused when its host resolves to
//! an internal address, not only when it is written as one.

use std::error::Error;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use crate::checker::url_guard::UrlGuard;

/// `reqwest::dns::Resolve` backed by a `UrlGuard`.
#[derive(Clone)]
pub struct GuardedResolver {
    guard: UrlGuard,
}

impl GuardedResolver {
    pub fn new(guard: UrlGuard) -> Self {
        Self { guard }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        Box::pin(async move {
            // reqwest fills in the port after resolution.
            match guard.resolve_host(name.as_str(), 0).await {
                Ok(addrs) => {
                    let addrs: Addrs = Box::new(addrs.into_iter());
                    Ok(addrs)
                }
                Err(rejection) => Err(Box::new(rejection) as Box<dyn Error + Send + Sync>),
            }
        })
    }
}
