//! Consensus and scoring engine.
//!
//! `ScoringEngine::score` is a pure function of one entrant, the sources
//! observed for its event and the race context. It only reads quotes,
//! attributes and this cycle's movement; it never touches baselines.

pub mod composite;
pub mod consensus;
pub mod ranking;

use tracing::debug;

use crate::types::{Derived, Entrant, EventContext, ScoreBreakdown, ScoreFlags};
use composite::EliteConfig;
use consensus::{ConsensusMetrics, SourceWeights};

pub struct ScoringEngine {
    weights: SourceWeights,
    elite: EliteConfig,
}

impl ScoringEngine {
    pub fn new(weights: SourceWeights, elite: EliteConfig) -> Self {
        Self { weights, elite }
    }

    /// Compute all derived metrics for one entrant.
    ///
    /// `movement` is carried through unchanged from `entrant.derived`; the
    /// velocity sub-score reads it.
    pub fn score(&self, entrant: &Entrant, sources: &[String], ctx: &EventContext) -> Derived {
        let consensus = ConsensusMetrics::compute(&entrant.quotes, sources, &self.weights);
        let attrs = &entrant.attributes;
        let movement = entrant.derived.movement;

        let form = composite::form_score(attrs.form.as_deref());
        let (trainer, elite_trainer) =
            composite::trainer_score(attrs.trainer.as_deref(), ctx.rules, &self.elite);
        let (combo, elite_combo) =
            composite::combo_score(attrs.trainer.as_deref(), attrs.jockey.as_deref(), &self.elite);
        let (velocity, high_velocity) = composite::velocity_score(movement.map(|m| m.velocity));
        let (going, ground) =
            composite::going_score(ctx.going.as_deref(), attrs.commentary.as_deref());

        let breakdown = ScoreBreakdown {
            consensus: composite::consensus_score(consensus.implied_probability),
            value: composite::value_score(consensus.value),
            expert: composite::expert_score(attrs.rating),
            form: form.score,
            age: composite::age_score(attrs.age, ctx.rules),
            official_rating: composite::official_rating_score(attrs.official_rating),
            trainer,
            weight: composite::weight_score(attrs.weight, ctx.rules),
            combo,
            course_distance: composite::course_distance_score(attrs.course_distance),
            velocity,
            going,
        };

        let derived = Derived {
            implied_probability: consensus.implied_probability,
            std_dev: consensus.std_dev,
            disagreement: consensus.disagreement,
            mean_decimal: consensus.mean_decimal,
            best_price: entrant.best_price(),
            composite_score: breakdown.total(),
            breakdown,
            flags: ScoreFlags {
                hot: form.hot,
                cold: form.cold,
                value: consensus.value,
                elite_trainer,
                elite_combo,
                high_velocity,
                ground,
            },
            movement,
        };

        debug!(
            entrant = %entrant.name,
            quotes = consensus.valid_quotes,
            probability = format!("{:.1}%", derived.implied_probability),
            std_dev = format!("{:.2}", derived.std_dev),
            score = format!("{:.1}", derived.composite_score),
            "Entrant scored"
        );

        derived
    }

    /// Score every entrant in place.
    pub fn score_all(&self, entrants: &mut [Entrant], sources: &[String], ctx: &EventContext) {
        for entrant in entrants.iter_mut() {
            entrant.derived = self.score(entrant, sources, ctx);
        }
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(SourceWeights::default(), EliteConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
