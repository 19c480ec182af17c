//! Scripted acquisition backend for integration testing.
//!
//! Serves canned pages by URL and counts live sessions, so tests can check
//! that every launched session is closed again. Routes and latency can be
//! changed between cycles from test code.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use steamer::acquisition::profile::ClientProfile;
use steamer::acquisition::{Launcher, Page, Session};
use steamer::types::AcquisitionError;

/// What the mock serves for one URL.
#[derive(Debug, Clone)]
pub enum Route {
    Html(String),
    /// Empty body with the given status.
    Status(u16),
    /// Connection-level failure.
    Unreachable,
}

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, Route>>,
    latency: Mutex<Duration>,
    navigations: Mutex<Vec<String>>,
    launched: AtomicUsize,
    open: AtomicUsize,
}

/// Cheap to clone; clones share routes and counters.
#[derive(Clone, Default)]
pub struct MockSource {
    shared: Arc<Shared>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, url: &str, route: Route) {
        let key = Url::parse(url).unwrap().to_string();
        self.shared.routes.lock().unwrap().insert(key, route);
    }

    /// Delay applied to every navigation.
    pub fn set_latency(&self, latency: Duration) {
        *self.shared.latency.lock().unwrap() = latency;
    }

    pub fn launched(&self) -> usize {
        self.shared.launched.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Navigations to `url` so far.
    pub fn hits(&self, url: &str) -> usize {
        let key = Url::parse(url).unwrap().to_string();
        self.shared
            .navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|u| **u == key)
            .count()
    }
}

#[async_trait]
impl Launcher for MockSource {
    async fn launch(&self, _profile: &ClientProfile) -> Result<Box<dyn Session>, AcquisitionError> {
        self.shared.launched.fetch_add(1, Ordering::SeqCst);
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            shared: self.shared.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession {
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl Session for MockSession {
    async fn navigate(&mut self, url: &Url, _referrer: Option<&str>) -> Result<Page, AcquisitionError> {
        let latency = *self.shared.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        self.shared.navigations.lock().unwrap().push(url.to_string());
        let route = self.shared.routes.lock().unwrap().get(url.as_str()).cloned();

        let (status, body) = match route {
            Some(Route::Html(body)) => (200, body),
            Some(Route::Status(status)) => (status, String::new()),
            Some(Route::Unreachable) => {
                return Err(AcquisitionError::Network("connection refused".to_string()))
            }
            None => (404, String::new()),
        };

        Ok(Page {
            requested_url: url.clone(),
            final_url: url.clone(),
            status,
            body,
        })
    }

    async fn pointer_move(&mut self, _x: u32, _y: u32) -> Result<(), AcquisitionError> {
        Ok(())
    }

    async fn scroll_by(&mut self, _delta_y: i32) -> Result<(), AcquisitionError> {
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
