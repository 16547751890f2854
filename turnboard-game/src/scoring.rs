//! Score multiplier pipeline and the scoring-service seam.

use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

use crate::constants::{SCORE_DELTA_MAX, SCORE_DELTA_MIN};
use crate::data::CardKind;
use crate::resources::{Dimension, ScoreDelta};
use crate::rng::RngBundle;

/// Single-use modifiers waiting for the next scored decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ArmedModifiers {
    /// Dice came up as a double.
    #[serde(default)]
    pub double: bool,
    /// Facilitator or zone granted x2/x3.
    #[serde(default)]
    pub custom_multiplier: Option<u8>,
    /// Risk chance card: positive values flip sign.
    #[serde(default)]
    pub risk: bool,
    /// Apply the final delta to every other team as well.
    #[serde(default)]
    pub broadcast: bool,
}

impl ArmedModifiers {
    #[must_use]
    pub fn factor(&self) -> i32 {
        let double = if self.double { 2 } else { 1 };
        double * i32::from(self.custom_multiplier.unwrap_or(1))
    }

    #[must_use]
    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Clamp raw service output into the accepted range, reporting whether anything moved.
#[must_use]
pub fn clamp_raw(raw: ScoreDelta) -> (ScoreDelta, bool) {
    let clamped = raw.clamped(SCORE_DELTA_MIN, SCORE_DELTA_MAX);
    (clamped, clamped != raw)
}

/// Multiply by the combined factor, then force non-positive under risk.
#[must_use]
pub fn apply_pipeline(raw: ScoreDelta, modifiers: &ArmedModifiers) -> ScoreDelta {
    let scaled = raw.scaled(modifiers.factor());
    if modifiers.risk {
        scaled.force_non_positive()
    } else {
        scaled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    pub situation: String,
    pub card_kind: CardKind,
    #[serde(default)]
    pub chosen_option: Option<String>,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub feedback: String,
    pub score_delta: ScoreDelta,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("scoring service unavailable: {0}")]
    Unavailable(String),
    #[error("scoring service returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Generative evaluator of a team's decision.
#[cfg(feature = "async")]
#[async_trait::async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, request: ScoringRequest) -> Result<ScoringResponse, ScoringError>;
}

/// Deterministic scorer for simulations and tests.
///
/// Longer justifications and chosen options score slightly better; the rest
/// comes from the session's scoring stream.
#[derive(Debug)]
pub struct StubScoringService {
    rng: Mutex<RngBundle>,
    fail_next: AtomicBool,
}

impl StubScoringService {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(RngBundle::from_user_seed(seed)),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next call fail with `ScoringError::Unavailable`.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Synchronous scoring used by the async impl and by non-async callers.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::Unavailable` when a failure was queued with
    /// [`Self::fail_next`].
    pub fn score_now(&self, request: &ScoringRequest) -> Result<ScoringResponse, ScoringError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            warn!("stub scorer failing on request");
            return Err(ScoringError::Unavailable("stub failure injected".into()));
        }
        let mut bundle = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let rng = bundle.scoring();
        let effort = i32::from(request.justification.trim().len() >= 40)
            + i32::from(request.chosen_option.is_some());
        let mut delta = ScoreDelta::ZERO;
        for dimension in Dimension::ALL {
            *delta.get_mut(dimension) = rng.gen_range(-3..=4) + effort;
        }
        let tone = if delta.total() >= 0 {
            "sound reasoning"
        } else {
            "a costly call"
        };
        Ok(ScoringResponse {
            feedback: format!("{}: {tone}", request.card_kind),
            score_delta: delta,
        })
    }
}

#[cfg(feature = "async")]
#[async_trait::async_trait]
impl ScoringService for StubScoringService {
    async fn score(&self, request: ScoringRequest) -> Result<ScoringResponse, ScoringError> {
        self.score_now(&request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::Resources;

    fn request() -> ScoringRequest {
        ScoringRequest {
            situation: "The budget was cut".into(),
            card_kind: CardKind::Competency,
            chosen_option: Some("Reprioritize".into()),
            justification: "We protect the core program and renegotiate the rest".into(),
        }
    }

    #[test]
    fn risk_transform_only_negates_positive_values() {
        let armed = ArmedModifiers {
            risk: true,
            ..ArmedModifiers::default()
        };
        let out = apply_pipeline(Resources::new(7, -4, 0, 0, 0), &armed);
        assert_eq!(out, Resources::new(-7, -4, 0, 0, 0));
    }

    #[test]
    fn risk_with_double_multiplies_before_flipping() {
        let armed = ArmedModifiers {
            double: true,
            risk: true,
            ..ArmedModifiers::default()
        };
        let raw = Resources {
            competency: 6,
            trust: -2,
            ..Resources::ZERO
        };
        let out = apply_pipeline(raw, &armed);
        assert_eq!(out.competency, -12);
        assert_eq!(out.trust, -4);
    }

    #[test]
    fn multipliers_commute() {
        let raw = Resources::new(1, 2, -3, 0, 4);
        let double_then_triple = ArmedModifiers {
            double: true,
            custom_multiplier: Some(3),
            ..ArmedModifiers::default()
        };
        assert_eq!(double_then_triple.factor(), 6);
        assert_eq!(apply_pipeline(raw, &double_then_triple), raw.scaled(6));
    }

    #[test]
    fn clear_disarms_everything() {
        let mut armed = ArmedModifiers {
            double: true,
            custom_multiplier: Some(2),
            risk: true,
            broadcast: true,
        };
        armed.clear();
        assert!(armed.is_clear());
        assert_eq!(armed.factor(), 1);
    }

    #[test]
    fn clamp_reports_out_of_range_values() {
        let (clamped, moved) = clamp_raw(Resources::new(15, -11, 3, 0, 0));
        assert!(moved);
        assert_eq!(clamped, Resources::new(10, -10, 3, 0, 0));
        let (same, moved) = clamp_raw(Resources::uniform(2));
        assert!(!moved);
        assert_eq!(same, Resources::uniform(2));
    }

    #[test]
    fn stub_is_deterministic_and_can_fail() {
        let a = StubScoringService::new(5);
        let b = StubScoringService::new(5);
        assert_eq!(a.score_now(&request()), b.score_now(&request()));

        a.fail_next();
        assert!(matches!(
            a.score_now(&request()),
            Err(ScoringError::Unavailable(_))
        ));
        assert!(a.score_now(&request()).is_ok());
    }
}
