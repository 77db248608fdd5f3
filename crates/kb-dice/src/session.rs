//! Live rolling.
//!
//! A [`RollSession`] ties an entropy source, an evaluator and a stamped
//! audit trail together and decides what happens when the source stops
//! answering. Every attempt lands in the trail, including the failed ones,
//! and a switch to degraded entropy is recorded before the roll it serves.

use kb_entropy::{Entropy, EntropySource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::error::DiceResult;
use crate::evaluator::Evaluator;
use crate::expression::DiceExpression;
use crate::notation::parse;
use crate::outcome::RollOutcome;

/// What a session does when its entropy source is unavailable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum FallbackPolicy {
    /// Surface the failure to the caller.
    #[default]
    Abort,
    /// Try the same source again, up to `attempts` more times.
    Retry {
        /// Extra attempts per roll.
        attempts: u32,
    },
    /// Switch permanently to a seeded stand-in and record the substitution.
    Degrade {
        /// Seed of the stand-in source.
        seed: u64,
    },
}

/// A live rolling session with its own audit trail.
#[derive(Debug)]
pub struct RollSession {
    entropy: Entropy,
    evaluator: Evaluator,
    trail: AuditTrail,
    fallback: FallbackPolicy,
}

impl RollSession {
    /// Start a session that aborts on entropy failure.
    pub fn new(entropy: Entropy, evaluator: Evaluator) -> Self {
        Self {
            entropy,
            evaluator,
            trail: AuditTrail::live(),
            fallback: FallbackPolicy::Abort,
        }
    }

    /// Set the fallback policy.
    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// The session id stamped on the trail.
    pub fn session_id(&self) -> Option<Uuid> {
        self.trail.session_id()
    }

    /// The current entropy source.
    pub fn entropy(&self) -> &Entropy {
        &self.entropy
    }

    /// Whether the session has switched to degraded entropy.
    pub fn is_degraded(&self) -> bool {
        matches!(self.entropy, Entropy::Degraded(_))
    }

    /// The audit trail so far.
    pub fn trail(&self) -> &AuditTrail {
        &self.trail
    }

    /// End the session and keep its trail.
    pub fn into_trail(self) -> AuditTrail {
        self.trail
    }

    /// Parse `notation` and roll it.
    pub fn roll_notation(&mut self, notation: &str) -> DiceResult<RollOutcome> {
        let expr = parse(notation)?;
        self.roll(&expr)
    }

    /// Roll `expr`, applying the fallback policy on entropy failure.
    pub fn roll(&mut self, expr: &DiceExpression) -> DiceResult<RollOutcome> {
        let mut retries_left = match self.fallback {
            FallbackPolicy::Retry { attempts } => attempts,
            _ => 0,
        };
        loop {
            let err = match self
                .evaluator
                .evaluate_audited(expr, &mut self.entropy, &mut self.trail)
            {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_entropy_unavailable() => err,
                Err(err) => return Err(err),
            };

            if retries_left > 0 {
                retries_left -= 1;
                tracing::debug!(expression = %expr, retries_left, error = %err, "retrying roll");
                continue;
            }
            match self.fallback {
                FallbackPolicy::Degrade { seed } if !self.is_degraded() => {
                    tracing::warn!(error = %err, seed, "entropy unavailable, degrading");
                    let from = self.entropy.kind();
                    self.entropy = Entropy::degraded(seed);
                    self.trail
                        .record_substitution(from, self.entropy.kind(), err.to_string());
                }
                _ => return Err(err),
            }
        }
    }
}
