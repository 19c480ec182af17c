//! Randomized client fingerprints.
//!
//! Each acquisition attempt draws a fresh profile so that no two attempts
//! present the same user agent / viewport / referrer combination.

use rand::seq::SliceRandom;
use rand::Rng;
use url::Url;

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:134.0) Gecko/20100101 Firefox/134.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.0.0 Safari/537.36 Edg/133.0.0.0",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

pub const VIEWPORTS: &[Viewport] = &[
    Viewport { width: 1920, height: 1080 },
    Viewport { width: 1536, height: 864 },
    Viewport { width: 1440, height: 900 },
    Viewport { width: 1366, height: 768 },
    Viewport { width: 1280, height: 800 },
    Viewport { width: 1680, height: 1050 },
];

/// Referrers; the empty entry is a direct visit.
pub const REFERRERS: &[&str] = &[
    "https://www.google.co.uk/",
    "https://www.google.com/",
    "https://www.google.co.uk/search?q=horse+racing+odds",
    "https://www.bing.com/",
    "https://www.bing.com/search?q=racing+odds",
    "",
    "https://t.co/",
];

pub const ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
pub const ACCEPT_LANGUAGE: &str = "en-GB,en;q=0.9";

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// The fingerprint presented by one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientProfile {
    pub user_agent: String,
    pub viewport: Viewport,
    pub device_scale_factor: u8,
    /// `None` is a direct visit.
    pub referrer: Option<String>,
    pub proxy: Option<String>,
}

impl ClientProfile {
    /// Draw a fresh profile.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, proxies: &[String]) -> Self {
        let user_agent = USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0]);
        let viewport = VIEWPORTS.choose(rng).copied().unwrap_or(VIEWPORTS[0]);
        let referrer = REFERRERS
            .choose(rng)
            .filter(|r| !r.is_empty())
            .map(|r| r.to_string());
        let device_scale_factor = if rng.gen_bool(0.5) { 1 } else { 2 };
        let proxy = proxies.choose(rng).cloned();

        Self {
            user_agent: user_agent.to_string(),
            viewport,
            device_scale_factor,
            referrer,
            proxy,
        }
    }

    /// Headers sent on every request of the session.
    pub fn base_headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("accept", ACCEPT),
            ("accept-language", ACCEPT_LANGUAGE),
            ("dnt", "1"),
            ("upgrade-insecure-requests", "1"),
            ("sec-fetch-dest", "document"),
            ("sec-fetch-mode", "navigate"),
            ("sec-fetch-user", "?1"),
        ]
    }
}

/// `Sec-Fetch-Site` value for a navigation to `target` from `referrer`.
pub fn fetch_site(target: &Url, referrer: Option<&str>) -> &'static str {
    let Some(referrer) = referrer.filter(|r| !r.is_empty()) else {
        return "none";
    };
    let same = Url::parse(referrer)
        .ok()
        .and_then(|r| r.host_str().map(|h| h.to_ascii_lowercase()))
        .zip(target.host_str().map(|h| h.to_ascii_lowercase()))
        .map(|(r, t)| r == t)
        .unwrap_or(false);
    if same {
        "same-origin"
    } else {
        "cross-site"
    }
}
