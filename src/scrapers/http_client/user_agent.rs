//! User agent selection for page requests.

/// Default user agent. The feed serves a reduced page to unknown clients, so
/// requests present themselves as desktop Chrome.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Real browser user agents rotated through in impersonate mode.
const IMPERSONATE_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
];

/// How the `fetch.user_agent` setting is interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentMode {
    /// Send [`USER_AGENT`].
    Desktop,
    /// Pick one entry of the impersonation pool per client.
    Impersonate,
    /// Send the configured string verbatim.
    Custom(String),
}

impl UserAgentMode {
    pub fn from_setting(setting: Option<&str>) -> Self {
        match setting.map(str::trim) {
            None | Some("") => UserAgentMode::Desktop,
            Some(s) if s.eq_ignore_ascii_case("impersonate") => UserAgentMode::Impersonate,
            Some(custom) => UserAgentMode::Custom(custom.to_string()),
        }
    }

    /// The header value a new client should send.
    pub fn header_value(&self) -> String {
        match self {
            UserAgentMode::Desktop => USER_AGENT.to_string(),
            UserAgentMode::Impersonate => pick_impersonated(clock_seed()).to_string(),
            UserAgentMode::Custom(ua) => ua.clone(),
        }
    }
}

fn clock_seed() -> usize {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as usize)
        .unwrap_or(0)
}

fn pick_impersonated(seed: usize) -> &'static str {
    IMPERSONATE_POOL[seed % IMPERSONATE_POOL.len()]
}
