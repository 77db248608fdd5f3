//! Combat resolution for Knucklebone.
//!
//! An [`EncounterState`] holds the combatants of one fight. Each turn an
//! external [`DecisionPolicy`] looks at a read-only [`EncounterView`] and
//! picks an [`Action`]; the [`Resolver`] rolls the dice for it and returns a
//! [`RoundDelta`] describing what changed. Nothing is mutated until the
//! caller hands that delta to [`EncounterState::apply`].

/// Action templates, chosen actions and targeting rules.
pub mod action;
/// Combatants, modifiers and damage types.
pub mod combatant;
/// Encounter state, read-only views and state deltas.
pub mod encounter;
/// Error types for combat resolution.
pub mod error;
/// Turn order.
pub mod initiative;
/// The AI decision seam and reference policies.
pub mod policy;
/// Dice-driven action resolution.
pub mod resolver;
/// Clamped numeric resources.
pub mod track;

/// Re-exports of the action types.
pub use action::{Action, ActionEffect, ActionTemplate, TargetRule};
/// Re-exports of the combatant types.
pub use combatant::{ActiveModifier, CombatantId, CombatantState, DamageType, ModifierEffect, Side};
/// Re-exports of the encounter types.
pub use encounter::{EncounterState, EncounterView, RoundDelta, StateChange, Termination};
/// Re-exports of [`error::CombatError`] and [`error::CombatResult`].
pub use error::{CombatError, CombatResult};
/// Re-export of [`initiative::InitiativeRule`].
pub use initiative::InitiativeRule;
/// Re-exports of the policy types.
pub use policy::{AiProfile, Decision, DecisionPolicy, FirstAvailable, FocusWeakest, NoLegalAction};
/// Re-export of [`resolver::Resolver`].
pub use resolver::Resolver;
/// Re-export of [`track::Track`].
pub use track::Track;
