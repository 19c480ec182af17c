//! Evasion-aware acquisition.
//!
//! Defines the `Launcher`/`Session` seam over an automation backend (a
//! headless browser, or the reqwest-backed HTTP session shipped here), the
//! randomized client profile, humanization plans, and the retrying
//! `Fetcher` that drives one acquisition against a hardened source.

pub mod fetcher;
pub mod http;
pub mod humanize;
pub mod profile;

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use url::Url;

use crate::types::AcquisitionError;
use profile::ClientProfile;

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A document loaded by a session.
#[derive(Debug, Clone)]
pub struct Page {
    pub requested_url: Url,
    /// URL after redirects.
    pub final_url: Url,
    pub status: u16,
    pub body: String,
}

impl Page {
    /// Classify anti-bot and transport signals before any parsing.
    ///
    /// 403/429/503, an unexpected cross-host redirect, or an empty body
    /// count as blocked. Other non-success statuses are network failures.
    pub fn check(&self) -> Result<(), AcquisitionError> {
        match self.status {
            403 | 429 | 503 => {
                return Err(AcquisitionError::Blocked(format!("HTTP {}", self.status)))
            }
            s if s >= 400 => return Err(AcquisitionError::Network(format!("HTTP {s}"))),
            _ => {}
        }

        if !same_site(&self.requested_url, &self.final_url) {
            return Err(AcquisitionError::Blocked(format!(
                "redirected to {}",
                self.final_url.host_str().unwrap_or("<no host>")
            )));
        }

        if self.body.trim().is_empty() {
            return Err(AcquisitionError::Blocked("empty payload".to_string()));
        }

        Ok(())
    }
}

/// Hosts match, ignoring a leading `www.`.
fn same_site(a: &Url, b: &Url) -> bool {
    let strip = |u: &Url| {
        u.host_str()
            .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
    };
    strip(a) == strip(b)
}

// ---------------------------------------------------------------------------
// Automation seam
// ---------------------------------------------------------------------------

/// One live automation session (a browser context, or an HTTP client with
/// its own cookie jar). Must be closed on every exit path.
#[async_trait]
pub trait Session: Send {
    /// Load a URL, optionally presenting a referrer.
    async fn navigate(&mut self, url: &Url, referrer: Option<&str>) -> Result<Page, AcquisitionError>;

    /// Move the pointer to viewport coordinates.
    async fn pointer_move(&mut self, x: u32, y: u32) -> Result<(), AcquisitionError>;

    /// Scroll vertically; negative scrolls up.
    async fn scroll_by(&mut self, delta_y: i32) -> Result<(), AcquisitionError>;

    /// Release every resource held by the session. Idempotent.
    async fn close(&mut self);
}

/// Factory for sessions with a given client fingerprint.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, profile: &ClientProfile) -> Result<Box<dyn Session>, AcquisitionError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Uniformly random duration in `[lo, hi]`. Returns `lo` when the range is
/// empty or inverted.
pub fn random_duration<R: Rng + ?Sized>(rng: &mut R, lo: Duration, hi: Duration) -> Duration {
    if hi <= lo {
        return lo;
    }
    let lo_ms = lo.as_millis() as u64;
    let hi_ms = hi.as_millis() as u64;
    Duration::from_millis(rng.gen_range(lo_ms..=hi_ms))
}
