//! Error types for dice operations.

use std::ops::Range;

use kb_entropy::EntropyError;

/// Errors that can occur while building or evaluating dice expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiceError {
    /// The expression violates a structural invariant (count, sides, keep
    /// size, thresholds).
    #[error("invalid dice expression: {0}")]
    InvalidExpression(String),

    /// Dice notation could not be parsed.
    #[error("invalid dice notation at {}..{}: {message}", span.start, span.end)]
    Parse {
        /// Byte range of the offending input.
        span: Range<usize>,
        /// What was wrong.
        message: String,
    },

    /// The entropy source failed to produce a draw.
    #[error(transparent)]
    Entropy(#[from] EntropyError),

    /// A die kept exploding past the configured depth and strict limits are
    /// enabled.
    #[error("explosion limit of {limit} exceeded in {expression}")]
    ExplosionLimitExceeded {
        /// Notation of the expression being evaluated.
        expression: String,
        /// The configured depth.
        limit: u32,
    },

    /// A die stayed below its reroll threshold past the configured bound and
    /// strict limits are enabled.
    #[error("reroll limit of {limit} exceeded in {expression}")]
    RerollLimitExceeded {
        /// Notation of the expression being evaluated.
        expression: String,
        /// The configured bound.
        limit: u32,
    },

    /// Rerolls and explosions needed more draws than allowed and strict
    /// limits are enabled.
    #[error("draw limit of {limit} exceeded in {expression}")]
    DrawLimitExceeded {
        /// Notation of the expression being evaluated.
        expression: String,
        /// The configured bound.
        limit: u32,
    },
}

impl DiceError {
    /// Returns true for errors caused by malformed input rather than by
    /// evaluation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidExpression(_) | Self::Parse { .. })
    }

    /// Returns true if the entropy source was unreachable or stalled.
    pub fn is_entropy_unavailable(&self) -> bool {
        matches!(self, Self::Entropy(e) if e.is_unavailable())
    }
}

/// Convenience result type for dice operations.
pub type DiceResult<T> = Result<T, DiceError>;
