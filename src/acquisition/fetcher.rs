//! Bounded-retry acquisition.
//!
//! `Fetcher::fetch` runs up to `max_attempts` attempts against one source.
//! Every attempt gets a fresh client profile, a randomized pacing delay, an
//! optional warm-up visit and a reading simulation, all under a hard
//! per-attempt timeout. The session is closed after every attempt whatever
//! the outcome.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use super::humanize::{self, HumanPlan, HumanizeConfig};
use super::profile::ClientProfile;
use super::{random_duration, Launcher, Page, Session};
use crate::data::ExtractError;
use crate::types::AcquisitionError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Backoff before retry `i` is `backoff_base + i × backoff_step`.
    pub backoff_base: Duration,
    pub backoff_step: Duration,
    /// Random delay range before navigating.
    pub pacing: (Duration, Duration),
    /// Upper bound on one attempt, pacing and humanization included.
    pub attempt_timeout: Duration,
    pub proxies: Vec<String>,
    pub humanize: HumanizeConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(15),
            backoff_step: Duration::from_secs(10),
            pacing: (Duration::from_secs(3), Duration::from_secs(8)),
            attempt_timeout: Duration::from_secs(45),
            proxies: Vec::new(),
            humanize: HumanizeConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Delay after failed attempt `attempt_index` (0-based).
    pub fn backoff(&self, attempt_index: u32) -> Duration {
        self.backoff_base + self.backoff_step * attempt_index
    }
}

/// Everything random about one attempt, drawn up front.
#[derive(Debug, Clone)]
pub struct AttemptPlan {
    pub profile: ClientProfile,
    pub pacing: Duration,
    pub human: HumanPlan,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

pub struct Fetcher {
    launcher: Arc<dyn Launcher>,
    config: FetchConfig,
    rng: Mutex<StdRng>,
}

impl Fetcher {
    pub fn new(launcher: Arc<dyn Launcher>, config: FetchConfig) -> Self {
        Self {
            launcher,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic plans, for tests.
    pub fn with_seed(launcher: Arc<dyn Launcher>, config: FetchConfig, seed: u64) -> Self {
        Self {
            launcher,
            config,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw the random choices for one attempt.
    pub fn plan_attempt(&self) -> AttemptPlan {
        let mut rng = self.rng.lock();
        AttemptPlan {
            profile: ClientProfile::random(&mut *rng, &self.config.proxies),
            pacing: random_duration(&mut *rng, self.config.pacing.0, self.config.pacing.1),
            human: HumanPlan::draw(&self.config.humanize, &mut *rng),
        }
    }

    /// Acquire `url` and run `extract` over the loaded page.
    ///
    /// Retries network, timeout, block and structure failures up to the
    /// attempt budget, then returns `Exhausted` wrapping the last failure.
    /// A broken extractor (`ExtractError::Bug` or a panic) fails at once.
    pub async fn fetch<T, F>(&self, url: &str, extract: F) -> Result<T, AcquisitionError>
    where
        F: Fn(&Page) -> Result<T, ExtractError> + Send + Sync,
        T: Send,
    {
        let target = Url::parse(url)
            .map_err(|e| AcquisitionError::InvalidLocator(format!("{url}: {e}")))?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut last = AcquisitionError::Network("no attempt made".to_string());

        for attempt in 0..max_attempts {
            let plan = self.plan_attempt();
            let attempt_id = Uuid::new_v4();
            info!(
                %attempt_id,
                url = %target,
                attempt = attempt + 1,
                max_attempts,
                backend = self.launcher.name(),
                warm_up = plan.human.warm_up.is_some(),
                pacing_ms = plan.pacing.as_millis() as u64,
                "Acquisition attempt"
            );

            match self.attempt(&target, &plan, &extract).await {
                Ok(data) => {
                    info!(%attempt_id, url = %target, attempt = attempt + 1, "Acquisition succeeded");
                    return Ok(data);
                }
                Err(e) if !e.is_retriable() => {
                    error!(%attempt_id, url = %target, error = %e, "Acquisition failed permanently");
                    return Err(e);
                }
                Err(e) => {
                    warn!(%attempt_id, url = %target, attempt = attempt + 1, error = %e, "Attempt failed");
                    last = e;
                    if attempt + 1 < max_attempts {
                        let wait = self.config.backoff(attempt);
                        info!(wait_secs = wait.as_secs_f64(), "Backing off before retry");
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }

        Err(AcquisitionError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// One attempt: launch and drive under one deadline, always close.
    async fn attempt<T, F>(&self, target: &Url, plan: &AttemptPlan, extract: &F) -> Result<T, AcquisitionError>
    where
        F: Fn(&Page) -> Result<T, ExtractError> + Send + Sync,
        T: Send,
    {
        let timeout = self.config.attempt_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        let session = match tokio::time::timeout_at(deadline, self.launcher.launch(&plan.profile)).await {
            Ok(launched) => launched?,
            Err(_) => return Err(AcquisitionError::Timeout(timeout)),
        };
        let mut guard = SessionGuard::new(session);

        let outcome = match guard.session() {
            Some(session) => tokio::time::timeout_at(deadline, drive(session, target, plan, extract)).await,
            None => Ok(Err(AcquisitionError::Network("session already closed".to_string()))),
        };

        guard.close().await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(AcquisitionError::Timeout(timeout)),
        }
    }
}

/// Owns a launched session until it is closed.
///
/// If the attempt future is dropped mid-flight (a caller timeout or
/// shutdown), the session is closed on a spawned task instead.
struct SessionGuard {
    session: Option<Box<dyn Session>>,
}

impl SessionGuard {
    fn new(session: Box<dyn Session>) -> Self {
        Self { session: Some(session) }
    }

    fn session(&mut self) -> Option<&mut (dyn Session + 'static)> {
        self.session.as_deref_mut()
    }

    async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Attempt cancelled; closing its session in the background");
                handle.spawn(async move {
                    session.close().await;
                });
            }
            Err(_) => warn!("Attempt cancelled outside a runtime; session dropped without close"),
        }
    }
}

/// Pace, optionally warm up, navigate, check for block signals, read, then
/// extract.
async fn drive<T, F>(
    session: &mut dyn Session,
    target: &Url,
    plan: &AttemptPlan,
    extract: &F,
) -> Result<T, AcquisitionError>
where
    F: Fn(&Page) -> Result<T, ExtractError> + Send + Sync,
    T: Send,
{
    if !plan.pacing.is_zero() {
        tokio::time::sleep(plan.pacing).await;
    }

    let mut referrer = plan.profile.referrer.clone();
    if let Some(gestures) = &plan.human.warm_up {
        if let Some(home) = humanize::warm_up(session, target, gestures).await {
            referrer = Some(home);
        }
    }

    let page = session.navigate(target, referrer.as_deref()).await?;
    page.check()?;

    humanize::perform(session, &plan.human.reading).await;

    match catch_unwind(AssertUnwindSafe(|| extract(&page))) {
        Ok(result) => result.map_err(AcquisitionError::from),
        Err(_) => Err(AcquisitionError::Extraction("extractor panicked".to_string())),
    }
}
