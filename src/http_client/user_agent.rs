//! User agent handling for HTTP requests.

pub const USER_AGENT: &str = concat!(
    "Linkwatch/",
    env!("CARGO_PKG_VERSION"),
    " (+backlink monitor)"
);

/// Real browser user agents for impersonate mode.
pub const IMPERSONATE_USER_AGENTS: &[&str] = &[
    // Chrome on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Chrome on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox on Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari on Mac
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
];

/// Pick a browser user agent for impersonate mode.
pub fn random_user_agent() -> &'static str {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as usize)
        .unwrap_or(0);
    IMPERSONATE_USER_AGENTS[nanos % IMPERSONATE_USER_AGENTS.len()]
}

/// Resolve user agent from config value.
/// - None or empty => default Linkwatch user agent
/// - "impersonate" => real browser user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        None | Some("") => USER_AGENT.to_string(),
        Some("impersonate") => random_user_agent().to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        assert!(resolve_user_agent(None).starts_with("Linkwatch/"));
        assert!(resolve_user_agent(Some("  ")).starts_with("Linkwatch/"));
    }

    #[test]
    fn test_resolve_user_agent_impersonate() {
        let ua = resolve_user_agent(Some("impersonate"));
        assert!(ua.contains("Mozilla"));
        assert!(!ua.contains("Linkwatch"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }
}
