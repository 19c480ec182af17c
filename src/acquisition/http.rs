//! reqwest-backed automation backend.
//!
//! Each session owns its own client (fresh cookie jar, fingerprinted
//! headers, optional proxy). There is no DOM, so pointer and scroll
//! gestures only contribute their dwell time.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

use super::profile::{fetch_site, ClientProfile};
use super::{Launcher, Page, Session};
use crate::types::AcquisitionError;

/// Per-request transport timeout, below the fetcher's attempt bound.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REDIRECTS: usize = 5;

pub struct HttpLauncher {
    request_timeout: Duration,
}

impl HttpLauncher {
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    fn build_client(&self, profile: &ClientProfile) -> Result<Client, AcquisitionError> {
        let mut headers = HeaderMap::new();
        for (name, value) in profile.base_headers() {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        let mut builder = Client::builder()
            .user_agent(profile.user_agent.as_str())
            .default_headers(headers)
            .cookie_store(true)
            .timeout(self.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));

        if let Some(proxy) = &profile.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AcquisitionError::Network(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| AcquisitionError::Network(format!("failed to build HTTP client: {e}")))
    }
}

impl Default for HttpLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for HttpLauncher {
    async fn launch(&self, profile: &ClientProfile) -> Result<Box<dyn Session>, AcquisitionError> {
        let client = self.build_client(profile)?;
        debug!(
            user_agent = %profile.user_agent,
            viewport = format!("{}x{}", profile.viewport.width, profile.viewport.height),
            proxied = profile.proxy.is_some(),
            "HTTP session opened"
        );
        Ok(Box::new(HttpSession {
            client: Some(client),
            request_timeout: self.request_timeout,
        }))
    }

    fn name(&self) -> &str {
        "http"
    }
}

pub struct HttpSession {
    /// `None` once closed.
    client: Option<Client>,
    request_timeout: Duration,
}

#[async_trait]
impl Session for HttpSession {
    async fn navigate(&mut self, url: &Url, referrer: Option<&str>) -> Result<Page, AcquisitionError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| AcquisitionError::Network("session closed".to_string()))?;

        let mut request = client
            .get(url.clone())
            .header("sec-fetch-site", fetch_site(url, referrer));
        if let Some(r) = referrer.filter(|r| !r.is_empty()) {
            request = request.header(REFERER, r);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let body = response.text().await.map_err(|e| self.classify(e))?;

        debug!(url = %url, final_url = %final_url, status, bytes = body.len(), "Navigated");

        Ok(Page {
            requested_url: url.clone(),
            final_url,
            status,
            body,
        })
    }

    async fn pointer_move(&mut self, x: u32, y: u32) -> Result<(), AcquisitionError> {
        trace!(x, y, "Pointer move (no-op over HTTP)");
        Ok(())
    }

    async fn scroll_by(&mut self, delta_y: i32) -> Result<(), AcquisitionError> {
        trace!(delta_y, "Scroll (no-op over HTTP)");
        Ok(())
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            debug!("HTTP session closed");
        }
    }
}

impl HttpSession {
    fn classify(&self, e: reqwest::Error) -> AcquisitionError {
        if e.is_timeout() {
            AcquisitionError::Timeout(self.request_timeout)
        } else if e.is_redirect() {
            AcquisitionError::Blocked(format!("redirect loop: {e}"))
        } else {
            AcquisitionError::Network(e.to_string())
        }
    }
}
