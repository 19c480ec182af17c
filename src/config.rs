//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section except `[agent]` has defaults, so a minimal config only needs
//! the agent block and a list of `[[events]]`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::acquisition::fetcher::FetchConfig;
use crate::acquisition::humanize::HumanizeConfig;
use crate::engine::scheduler::{ProximityBand, RefreshPolicy, SchedulerConfig};
use crate::strategy::composite::EliteConfig;
use crate::strategy::consensus::SourceWeights;
use crate::types::Event;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    #[serde(default)]
    pub fetcher: FetcherSection,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    /// Source-trust weights, bookmaker name → weight.
    #[serde(default)]
    pub bookmakers: HashMap<String, f64>,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub extractor: ExtractorSection,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Base interval between scheduler passes.
    pub tick_interval_secs: u64,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_state_file() -> String {
    "steamer_state.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetcherSection {
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_step_secs: u64,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub attempt_timeout_secs: u64,
    pub proxies: Vec<String>,
    pub humanize: HumanizeSection,
}

impl Default for FetcherSection {
    fn default() -> Self {
        let d = FetchConfig::default();
        Self {
            max_attempts: d.max_attempts,
            backoff_base_secs: d.backoff_base.as_secs(),
            backoff_step_secs: d.backoff_step.as_secs(),
            pacing_min_ms: d.pacing.0.as_millis() as u64,
            pacing_max_ms: d.pacing.1.as_millis() as u64,
            attempt_timeout_secs: d.attempt_timeout.as_secs(),
            proxies: Vec::new(),
            humanize: HumanizeSection::default(),
        }
    }
}

impl FetcherSection {
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_attempts: self.max_attempts.max(1),
            backoff_base: Duration::from_secs(self.backoff_base_secs),
            backoff_step: Duration::from_secs(self.backoff_step_secs),
            pacing: (
                Duration::from_millis(self.pacing_min_ms),
                Duration::from_millis(self.pacing_max_ms),
            ),
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            proxies: self.proxies.clone(),
            humanize: self.humanize.to_humanize_config(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HumanizeSection {
    pub enabled: bool,
    pub warmup_probability: f64,
}

impl Default for HumanizeSection {
    fn default() -> Self {
        let d = HumanizeConfig::default();
        Self {
            enabled: d.enabled,
            warmup_probability: d.warmup_probability,
        }
    }
}

impl HumanizeSection {
    pub fn to_humanize_config(&self) -> HumanizeConfig {
        HumanizeConfig {
            enabled: self.enabled,
            warmup_probability: self.warmup_probability.clamp(0.0, 1.0),
            ..HumanizeConfig::default()
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BandSection {
    pub within_mins: i64,
    pub ceiling_mins: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerSection {
    pub routine_ceiling_hours: i64,
    /// Proximity bands; empty means the built-in ladder.
    pub bands: Vec<BandSection>,
    pub max_events_per_pass: usize,
    pub event_delay_min_secs: u64,
    pub event_delay_max_secs: u64,
    pub failure_cooldown_secs: u64,
    pub pass_jitter_secs: u64,
    pub cold_start_timeout_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let d = SchedulerConfig::default();
        Self {
            routine_ceiling_hours: d.policy.routine_ceiling.num_hours(),
            bands: Vec::new(),
            max_events_per_pass: d.max_events_per_pass,
            event_delay_min_secs: d.event_delay.0.as_secs(),
            event_delay_max_secs: d.event_delay.1.as_secs(),
            failure_cooldown_secs: d.failure_cooldown.as_secs(),
            pass_jitter_secs: d.pass_jitter.as_secs(),
            cold_start_timeout_secs: d.cold_start_timeout.as_secs(),
        }
    }
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self, tick_interval: Duration) -> SchedulerConfig {
        let bands = if self.bands.is_empty() {
            RefreshPolicy::default().bands().to_vec()
        } else {
            self.bands
                .iter()
                .map(|b| ProximityBand {
                    within: chrono::Duration::minutes(b.within_mins),
                    ceiling: chrono::Duration::minutes(b.ceiling_mins),
                })
                .collect()
        };
        let policy = RefreshPolicy::new(chrono::Duration::hours(self.routine_ceiling_hours), bands);

        SchedulerConfig {
            policy,
            tick_interval,
            pass_jitter: Duration::from_secs(self.pass_jitter_secs),
            max_events_per_pass: self.max_events_per_pass.max(1),
            event_delay: (
                Duration::from_secs(self.event_delay_min_secs),
                Duration::from_secs(self.event_delay_max_secs),
            ),
            failure_cooldown: Duration::from_secs(self.failure_cooldown_secs),
            cold_start_timeout: Duration::from_secs(self.cold_start_timeout_secs),
        }
    }
}

/// Optional overrides for the curated elite lists.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ScoringSection {
    pub national_hunt_trainers: Option<Vec<String>>,
    pub flat_trainers: Option<Vec<String>>,
    /// Pairs of `[trainer, jockey]` fragments.
    pub combos: Option<Vec<(String, String)>>,
}

impl ScoringSection {
    pub fn to_elite_config(&self) -> EliteConfig {
        let mut elite = EliteConfig::default();
        if let Some(t) = &self.national_hunt_trainers {
            elite.national_hunt_trainers = lower_all(t);
        }
        if let Some(t) = &self.flat_trainers {
            elite.flat_trainers = lower_all(t);
        }
        if let Some(c) = &self.combos {
            elite.combos = c
                .iter()
                .map(|(t, j)| (t.to_lowercase(), j.to_lowercase()))
                .collect();
        }
        elite
    }
}

fn lower_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

/// JSON-island markers for the embedded extractor.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractorSection {
    pub price_marker: String,
    pub form_marker: String,
}

impl Default for ExtractorSection {
    fn default() -> Self {
        Self {
            price_marker: "price-card".to_string(),
            form_marker: "form-card".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Source-trust weights, falling back to the built-in table when the
    /// config has none.
    pub fn source_weights(&self) -> SourceWeights {
        if self.bookmakers.is_empty() {
            SourceWeights::default()
        } else {
            SourceWeights::new(self.bookmakers.clone())
        }
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for event in &self.events {
            if !seen.insert(event.id.as_str()) {
                anyhow::bail!("Duplicate event id: {}", event.id);
            }
            url::Url::parse(&event.price_url)
                .with_context(|| format!("Invalid price_url for event {}", event.id))?;
            url::Url::parse(&event.form_url)
                .with_context(|| format!("Invalid form_url for event {}", event.id))?;
        }
        if let Some((name, w)) = self.bookmakers.iter().find(|(_, w)| **w <= 0.0) {
            anyhow::bail!("Bookmaker weight must be positive: {name} = {w}");
        }
        Ok(())
    }
}
