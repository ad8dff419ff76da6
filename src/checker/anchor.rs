//! Locating a link to the target URL inside a fetched page.
//!
//! Two URLs match when they agree on host (case-insensitive, ignoring a
//! leading `www.`), non-default port, path (ignoring a trailing slash) and
//! query. Scheme and fragment are ignored, so `http://www.site.com/` and
//! `https://site.com` are the same target.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));

/// The first link in a page that points at the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorMatch {
    /// Visible text, whitespace-collapsed. `None` when empty.
    pub text: Option<String>,
    /// Lowercase rel tokens in document order, deduplicated.
    pub rel_tokens: Vec<String>,
}

impl AnchorMatch {
    /// Comma-joined rel tokens, or `None` when the link had no rel.
    pub fn rel_attributes(&self) -> Option<String> {
        if self.rel_tokens.is_empty() {
            None
        } else {
            Some(self.rel_tokens.join(","))
        }
    }

    /// A link passes ranking signal unless it is marked nofollow.
    pub fn is_dofollow(&self) -> bool {
        !self.rel_tokens.iter().any(|t| t == "nofollow")
    }
}

/// Find the first `<a href>` in `html` pointing at `target_url`.
///
/// Relative hrefs are resolved against `page_url` when given; without it
/// only absolute hrefs can match. Unparseable markup yields no match.
pub fn find_match(html: &str, target_url: &str, page_url: Option<&Url>) -> Option<AnchorMatch> {
    let target = parse_target(target_url).and_then(|u| match_key(&u))?;
    let document = Html::parse_document(html);

    document
        .select(&LINK_SELECTOR)
        .find(|link| {
            link.value()
                .attr("href")
                .and_then(|href| resolve_href(href, page_url))
                .and_then(|url| match_key(&url))
                .is_some_and(|key| key == target)
        })
        .map(describe)
}

/// Normalized comparison key for an http(s) URL.
pub fn match_key(url: &Url) -> Option<String> {
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut key = host.to_string();
    if let Some(port) = url.port().filter(|p| *p != 80 && *p != 443) {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        key.push('?');
        key.push_str(query);
    }
    Some(key)
}

/// Parse a stored target URL, assuming http when the scheme is missing.
fn parse_target(target: &str) -> Option<Url> {
    let target = target.trim();
    match Url::parse(target) {
        Ok(url) if url.has_host() => Some(url),
        _ => Url::parse(&format!("http://{}", target.trim_start_matches("//"))).ok(),
    }
}

fn resolve_href(href: &str, page_url: Option<&Url>) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    match page_url {
        Some(base) => base.join(href).ok(),
        None => Url::parse(href).ok(),
    }
}

fn describe(link: ElementRef<'_>) -> AnchorMatch {
    let text = link
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");

    let mut rel_tokens: Vec<String> = Vec::new();
    for token in link
        .value()
        .attr("rel")
        .unwrap_or_default()
        .split_ascii_whitespace()
        .map(str::to_ascii_lowercase)
    {
        if !rel_tokens.contains(&token) {
            rel_tokens.push(token);
        }
    }

    AnchorMatch {
        text: (!text.is_empty()).then_some(text),
        rel_tokens,
    }
}
