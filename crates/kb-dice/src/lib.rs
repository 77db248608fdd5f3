//! Dice resolution for Knucklebone.
//!
//! A [`DiceExpression`] describes a roll: how many dice, how many faces, and
//! an ordered list of [`Modifier`]s (rerolls, explosions, keep-highest/lowest,
//! advantage, arithmetic). The [`Evaluator`] resolves an expression against
//! any [`kb_entropy::EntropySource`] into a [`RollOutcome`], optionally
//! appending every primitive draw to an [`AuditTrail`].
//!
//! Human-readable notation such as `4d6kh3` or `1d20adv+5cs>=19` is handled
//! by the separate [`notation`] adapter.

/// Append-only record of rolls for replay and dispute resolution.
pub mod audit;
/// Error types for dice operations.
pub mod error;
/// Resolution of expressions against an entropy source.
pub mod evaluator;
/// The immutable dice expression model.
pub mod expression;
/// Self-check against pinned seeded vectors.
pub mod integrity;
/// Parsing adapter for dice notation.
pub mod notation;
/// Results of evaluating an expression.
pub mod outcome;
/// Live rolling with audit and fallback handling.
pub mod session;

/// Re-exports of the audit trail types.
pub use audit::{AuditRecord, AuditTrail, ReplayReport, RollAuditEntry};
/// Re-exports of [`error::DiceError`] and [`error::DiceResult`].
pub use error::{DiceError, DiceResult};
/// Re-exports of the evaluator types.
pub use evaluator::{Evaluator, EvaluatorConfig, RerollPolicy};
/// Re-exports of the expression model.
pub use expression::{CritThresholds, DiceExpression, Modifier, SetSelection};
/// Re-exports of the self-check types.
pub use integrity::{IntegrityCheck, IntegrityReport, IntegrityStatus, verify_integrity};
/// Re-export of [`notation::parse`].
pub use notation::parse;
/// Re-exports of the outcome types.
pub use outcome::{BatchOutcome, CapReason, DieOrigin, DieRoll, RollOutcome, SetChoice};
/// Re-exports of the session types.
pub use session::{FallbackPolicy, RollSession};
