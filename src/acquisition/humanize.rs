//! Reading-behaviour simulation.
//!
//! A heuristic with no correctness contract: warm-up visits to the source's
//! home page and pointer/scroll/dwell sequences on the target. Plans are
//! drawn synchronously from an RNG and then replayed against a session;
//! every gesture failure is swallowed.

use rand::Rng;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{random_duration, Session};

/// Tuning knobs for humanization.
#[derive(Debug, Clone, PartialEq)]
pub struct HumanizeConfig {
    pub enabled: bool,
    /// Chance of visiting the home page before the target.
    pub warmup_probability: f64,
    /// Multiplier applied to every dwell. 0.0 keeps gestures but removes
    /// the waiting.
    pub dwell_scale: f64,
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            warmup_probability: 0.5,
            dwell_scale: 1.0,
        }
    }
}

impl HumanizeConfig {
    /// No warm-up, no gestures.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            warmup_probability: 0.0,
            dwell_scale: 0.0,
        }
    }
}

/// One step of simulated behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    Dwell(Duration),
    Pointer { x: u32, y: u32 },
    Scroll(i32),
}

/// Gestures for one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HumanPlan {
    /// Home-page visit, if drawn.
    pub warm_up: Option<Vec<Gesture>>,
    /// Behaviour on the target page before extraction.
    pub reading: Vec<Gesture>,
}

impl HumanPlan {
    pub fn draw<R: Rng + ?Sized>(config: &HumanizeConfig, rng: &mut R) -> Self {
        if !config.enabled {
            return Self::default();
        }

        let warm_up = rng
            .gen_bool(config.warmup_probability.clamp(0.0, 1.0))
            .then(|| warm_up_gestures(config, rng));

        Self {
            warm_up,
            reading: reading_gestures(config, rng),
        }
    }

    /// Total time spent dwelling across both phases.
    pub fn total_dwell(&self) -> Duration {
        self.warm_up
            .iter()
            .flatten()
            .chain(self.reading.iter())
            .map(|g| match g {
                Gesture::Dwell(d) => *d,
                _ => Duration::ZERO,
            })
            .sum()
    }
}

fn dwell<R: Rng + ?Sized>(config: &HumanizeConfig, rng: &mut R, lo_ms: u64, hi_ms: u64) -> Gesture {
    let d = random_duration(rng, Duration::from_millis(lo_ms), Duration::from_millis(hi_ms));
    Gesture::Dwell(d.mul_f64(config.dwell_scale.max(0.0)))
}

fn warm_up_gestures<R: Rng + ?Sized>(config: &HumanizeConfig, rng: &mut R) -> Vec<Gesture> {
    vec![
        dwell(config, rng, 2000, 5000),
        Gesture::Pointer {
            x: rng.gen_range(0..500),
            y: rng.gen_range(0..400),
        },
        Gesture::Scroll(200),
        dwell(config, rng, 1000, 3000),
    ]
}

fn reading_gestures<R: Rng + ?Sized>(config: &HumanizeConfig, rng: &mut R) -> Vec<Gesture> {
    let mut steps = vec![dwell(config, rng, 1000, 3000)];

    for _ in 0..rng.gen_range(2..=4) {
        steps.push(Gesture::Pointer {
            x: rng.gen_range(100..900),
            y: rng.gen_range(100..700),
        });
        steps.push(dwell(config, rng, 200, 700));
    }

    for _ in 0..rng.gen_range(2..=4) {
        steps.push(Gesture::Scroll(rng.gen_range(100..400)));
        steps.push(dwell(config, rng, 500, 2000));
    }

    // Occasional scroll back up.
    if rng.gen_bool(0.4) {
        steps.push(Gesture::Scroll(-150));
        steps.push(dwell(config, rng, 300, 800));
    }

    steps.push(dwell(config, rng, 500, 1500));
    steps
}

/// Replay gestures against a session, ignoring failures.
pub async fn perform(session: &mut dyn Session, gestures: &[Gesture]) {
    for gesture in gestures {
        let result = match *gesture {
            Gesture::Dwell(d) => {
                if !d.is_zero() {
                    tokio::time::sleep(d).await;
                }
                Ok(())
            }
            Gesture::Pointer { x, y } => session.pointer_move(x, y).await,
            Gesture::Scroll(dy) => session.scroll_by(dy).await,
        };
        if let Err(e) = result {
            debug!(error = %e, gesture = ?gesture, "Gesture failed, ignoring");
        }
    }
}

/// Visit the site's origin and browse briefly. Returns the origin on
/// success so it can be presented as the referrer for the target.
pub async fn warm_up(session: &mut dyn Session, target: &Url, gestures: &[Gesture]) -> Option<String> {
    let origin = target.origin().ascii_serialization();
    let home = Url::parse(&origin).ok()?;
    debug!(origin = %origin, "Warm-up visit");

    match session.navigate(&home, None).await {
        Ok(_) => {
            perform(session, gestures).await;
            Some(format!("{origin}/"))
        }
        Err(e) => {
            debug!(error = %e, "Warm-up failed, continuing to target");
            None
        }
    }
}
