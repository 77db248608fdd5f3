//! Encounter state and state deltas.
//!
//! The state of a fight only changes through [`EncounterState::apply`]. The
//! resolver describes what an action did as a [`RoundDelta`]; policies see
//! the state through an [`EncounterView`], which exposes queries only.

use std::collections::BTreeSet;

use kb_dice::RollOutcome;
use serde::{Deserialize, Serialize};

use crate::action::ActionTemplate;
use crate::combatant::{ActiveModifier, CombatantId, CombatantState, DamageType, Side};
use crate::error::{CombatError, CombatResult};

/// How an encounter ended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Only this side has combatants standing.
    Victory(Side),
    /// Nobody is standing.
    Draw,
    /// The round cap was reached with more than one side standing.
    RoundLimitExceeded,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Victory(side) => write!(f, "victory for {side}"),
            Self::Draw => write!(f, "draw"),
            Self::RoundLimitExceeded => write!(f, "round limit exceeded"),
        }
    }
}

/// One change to one combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum StateChange {
    /// Health lost, after mitigation.
    Damage {
        /// Who takes it.
        target: CombatantId,
        /// How much.
        amount: i64,
        /// Of what type.
        damage_type: DamageType,
    },
    /// Health restored.
    Heal {
        /// Who receives it.
        target: CombatantId,
        /// How much.
        amount: i64,
    },
    /// A resource paid as an action cost.
    SpendResource {
        /// Who pays.
        combatant: CombatantId,
        /// Which resource.
        resource: String,
        /// How much.
        amount: i64,
    },
    /// A modifier placed, replacing any of the same name.
    ApplyModifier {
        /// Who receives it.
        target: CombatantId,
        /// The modifier.
        modifier: ActiveModifier,
    },
    /// A timed modifier counted down.
    ModifierTicked {
        /// Who holds it.
        combatant: CombatantId,
        /// Modifier name.
        name: String,
        /// Rounds left after the tick.
        remaining: u32,
    },
    /// A timed modifier ran out.
    ModifierExpired {
        /// Who held it.
        combatant: CombatantId,
        /// Modifier name.
        name: String,
    },
    /// A turn skipped; changes nothing.
    Pass {
        /// Who passed.
        combatant: CombatantId,
        /// Why.
        reason: String,
    },
}

impl StateChange {
    /// The combatant this change touches.
    pub fn subject(&self) -> &CombatantId {
        match self {
            Self::Damage { target, .. }
            | Self::Heal { target, .. }
            | Self::ApplyModifier { target, .. } => target,
            Self::SpendResource { combatant, .. }
            | Self::ModifierTicked { combatant, .. }
            | Self::ModifierExpired { combatant, .. }
            | Self::Pass { combatant, .. } => combatant,
        }
    }
}

/// Everything one action, or one upkeep step, did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundDelta {
    /// Who acted; `None` for end-of-round upkeep.
    pub actor: Option<CombatantId>,
    /// Action name, `"pass"` or `"upkeep"`.
    pub action: String,
    /// Changes in application order.
    pub changes: Vec<StateChange>,
    /// Rolls made while resolving, in order.
    pub rolls: Vec<RollOutcome>,
}

impl RoundDelta {
    /// A skipped turn.
    pub fn pass(actor: CombatantId, reason: impl Into<String>) -> Self {
        Self {
            changes: vec![StateChange::Pass {
                combatant: actor.clone(),
                reason: reason.into(),
            }],
            actor: Some(actor),
            action: "pass".to_string(),
            rolls: Vec::new(),
        }
    }

    /// Whether this delta is a skipped turn.
    pub fn is_pass(&self) -> bool {
        self.action == "pass"
    }

    /// Total damage in this delta.
    pub fn damage_dealt(&self) -> i64 {
        self.changes
            .iter()
            .filter_map(|c| match c {
                StateChange::Damage { amount, .. } => Some(*amount),
                _ => None,
            })
            .fold(0, i64::saturating_add)
    }
}

/// The state of one fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterState {
    combatants: Vec<CombatantState>,
    round: u32,
    termination: Option<Termination>,
}

impl EncounterState {
    /// Start an encounter. Ids must be unique, at least one combatant is
    /// required and every action effect must be within bounds.
    pub fn new(combatants: Vec<CombatantState>) -> CombatResult<Self> {
        if combatants.is_empty() {
            return Err(CombatError::InvalidEncounter(
                "an encounter needs at least one combatant".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for c in &combatants {
            if !seen.insert(&c.id) {
                return Err(CombatError::InvalidEncounter(format!(
                    "duplicate combatant id {}",
                    c.id
                )));
            }
            for action in &c.actions {
                action.effect.validate().map_err(|e| {
                    CombatError::InvalidEncounter(format!("{} action {}: {e}", c.id, action.name))
                })?;
            }
        }
        Ok(Self {
            combatants,
            round: 0,
            termination: None,
        })
    }

    /// A read-only view for policies.
    pub fn view(&self) -> EncounterView<'_> {
        EncounterView { state: self }
    }

    /// All combatants in setup order.
    pub fn combatants(&self) -> &[CombatantState] {
        &self.combatants
    }

    /// Look up a combatant.
    pub fn combatant(&self, id: &CombatantId) -> Option<&CombatantState> {
        self.combatants.iter().find(|c| &c.id == id)
    }

    /// The current round; 0 before the first.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Advance to the next round and return its number.
    pub fn begin_round(&mut self) -> u32 {
        self.round += 1;
        self.round
    }

    /// How the encounter ended, once it has.
    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    /// Whether the encounter has ended.
    pub fn is_terminated(&self) -> bool {
        self.termination.is_some()
    }

    /// Mark the encounter as ended.
    pub fn terminate(&mut self, termination: Termination) {
        self.termination = Some(termination);
    }

    /// Sides with at least one combatant standing.
    pub fn living_sides(&self) -> BTreeSet<&Side> {
        self.combatants
            .iter()
            .filter(|c| !c.is_down())
            .map(|c| &c.side)
            .collect()
    }

    /// The elimination outcome, if at most one side is left standing.
    pub fn check_elimination(&self) -> Option<Termination> {
        let sides = self.living_sides();
        let mut standing = sides.into_iter();
        match (standing.next(), standing.next()) {
            (None, _) => Some(Termination::Draw),
            (Some(side), None) => Some(Termination::Victory(side.clone())),
            _ => None,
        }
    }

    /// Apply a delta. Every change is checked before any is applied, so a
    /// rejected delta leaves the state untouched.
    pub fn apply(&mut self, delta: &RoundDelta) -> CombatResult<()> {
        for change in &delta.changes {
            let subject = change.subject();
            if self.index_of(subject).is_none() {
                let actor = delta.actor.as_ref().unwrap_or(subject);
                return Err(CombatError::invalid_action(
                    actor,
                    format!("{subject} is not in the encounter"),
                ));
            }
        }
        for change in &delta.changes {
            let Some(index) = self.index_of(change.subject()) else {
                continue;
            };
            let combatant = &mut self.combatants[index];
            match change {
                StateChange::Damage { amount, .. } => {
                    combatant.health.adjust(amount.saturating_neg());
                }
                StateChange::Heal { amount, .. } => {
                    combatant.health.adjust(*amount);
                }
                StateChange::SpendResource {
                    resource, amount, ..
                } => {
                    let pool = combatant.resources.entry(resource.clone()).or_insert(0);
                    *pool = pool.saturating_sub(*amount);
                }
                StateChange::ApplyModifier { modifier, .. } => {
                    combatant
                        .active_modifiers
                        .retain(|m| m.name != modifier.name);
                    combatant.active_modifiers.push(modifier.clone());
                }
                StateChange::ModifierTicked {
                    name, remaining, ..
                } => {
                    if let Some(m) = combatant
                        .active_modifiers
                        .iter_mut()
                        .find(|m| &m.name == name)
                    {
                        m.remaining_rounds = Some(*remaining);
                    }
                }
                StateChange::ModifierExpired { name, .. } => {
                    combatant.active_modifiers.retain(|m| &m.name != name);
                }
                StateChange::Pass { .. } => {}
            }
        }
        Ok(())
    }

    fn index_of(&self, id: &CombatantId) -> Option<usize> {
        self.combatants.iter().position(|c| &c.id == id)
    }
}

/// Read-only access to an encounter for decision policies.
#[derive(Debug, Clone, Copy)]
pub struct EncounterView<'a> {
    state: &'a EncounterState,
}

impl<'a> EncounterView<'a> {
    /// The current round.
    pub fn round(&self) -> u32 {
        self.state.round
    }

    /// All combatants in setup order.
    pub fn combatants(&self) -> &'a [CombatantState] {
        &self.state.combatants
    }

    /// Look up a combatant.
    pub fn combatant(&self, id: &CombatantId) -> Option<&'a CombatantState> {
        self.state.combatants.iter().find(|c| &c.id == id)
    }

    /// Combatants still standing.
    pub fn living(&self) -> impl Iterator<Item = &'a CombatantState> + use<'a> {
        self.state.combatants.iter().filter(|c| !c.is_down())
    }

    /// Standing combatants on sides other than `actor`'s.
    pub fn enemies_of(&self, actor: &CombatantState) -> Vec<&'a CombatantState> {
        self.living().filter(|c| c.side != actor.side).collect()
    }

    /// Every combatant `actor` may legally aim `template` at, in setup order.
    pub fn legal_targets(
        &self,
        actor: &CombatantState,
        template: &ActionTemplate,
    ) -> Vec<&'a CombatantState> {
        self.state
            .combatants
            .iter()
            .filter(|t| template.can_target(actor, t))
            .collect()
    }

    /// Whether `actor` can pay for `template`.
    pub fn can_afford(&self, actor: &CombatantState, template: &ActionTemplate) -> bool {
        actor.shortfall(&template.cost).is_none()
    }
}
