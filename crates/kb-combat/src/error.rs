//! Error types for combat resolution.

use kb_dice::DiceError;

use crate::action::TargetRule;
use crate::combatant::CombatantId;
use crate::policy::NoLegalAction;

/// Errors that can occur while resolving or applying combat actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CombatError {
    /// The action references something the encounter or actor does not
    /// have: an unknown combatant or action, a downed actor, or an
    /// unaffordable cost.
    #[error("invalid action by {actor}: {reason}")]
    InvalidAction {
        /// The combatant that tried to act.
        actor: CombatantId,
        /// What was wrong.
        reason: String,
    },

    /// The target is not allowed by the action's targeting rule.
    #[error("{actor} cannot target {target} (targeting: {rule})")]
    IllegalTargeting {
        /// The combatant that tried to act.
        actor: CombatantId,
        /// The rejected target.
        target: CombatantId,
        /// The rule that was violated.
        rule: TargetRule,
    },

    /// A policy found nothing it could do.
    #[error(transparent)]
    NoLegalAction(#[from] NoLegalAction),

    /// The encounter setup itself is malformed.
    #[error("invalid encounter: {0}")]
    InvalidEncounter(String),

    /// A dice roll failed.
    #[error(transparent)]
    Dice(#[from] DiceError),
}

impl CombatError {
    /// Shorthand for [`CombatError::InvalidAction`].
    pub fn invalid_action(actor: &CombatantId, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            actor: actor.clone(),
            reason: reason.into(),
        }
    }

    /// Returns true if the entropy source behind a roll was unavailable.
    pub fn is_entropy_unavailable(&self) -> bool {
        matches!(self, Self::Dice(e) if e.is_entropy_unavailable())
    }
}

/// Convenience result type for combat operations.
pub type CombatResult<T> = Result<T, CombatError>;
