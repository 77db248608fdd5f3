//! Actions.
//!
//! Each combatant carries a list of [`ActionTemplate`]s: what it can do,
//! whom it may target and what it costs. A policy picks one of them and a
//! target, producing an [`Action`] for the resolver.

use std::collections::BTreeMap;

use kb_dice::DiceExpression;
use kb_dice::expression::MAX_DICE;
use serde::{Deserialize, Serialize};

use crate::combatant::{ActiveModifier, CombatantId, CombatantState, DamageType};

/// Who an action may be aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetRule {
    /// A combatant on another side.
    Enemy,
    /// A combatant on the actor's side, the actor included.
    Ally,
    /// Only the actor.
    #[serde(rename = "self")]
    SelfOnly,
    /// Anyone.
    Any,
}

impl TargetRule {
    /// Whether `actor` may aim at `target` under this rule. Health is not
    /// considered here.
    pub fn permits(&self, actor: &CombatantState, target: &CombatantState) -> bool {
        match self {
            Self::Enemy => actor.side != target.side,
            Self::Ally => actor.side == target.side,
            Self::SelfOnly => actor.id == target.id,
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for TargetRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Enemy => "enemy",
            Self::Ally => "ally",
            Self::SelfOnly => "self",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// What happens when an action resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionEffect {
    /// Roll to hit against the target's armor, then roll damage. A critical
    /// success always hits and rolls damage twice; a critical failure
    /// always misses.
    Attack {
        /// Attack roll; the actor's attack bonuses are added.
        to_hit: DiceExpression,
        /// Damage on a hit.
        damage: DiceExpression,
        /// Damage type for mitigation.
        #[serde(default)]
        damage_type: DamageType,
    },
    /// The target rolls a saving throw against `dc`.
    Save {
        /// Difficulty to meet or beat.
        dc: i64,
        /// Saving throw; `1d20` when omitted. The target's save bonuses are
        /// added.
        #[serde(default)]
        save: Option<DiceExpression>,
        /// Damage on a failed save.
        damage: DiceExpression,
        /// Damage type for mitigation.
        #[serde(default)]
        damage_type: DamageType,
        /// Whether a successful save still takes half damage.
        #[serde(default)]
        half_on_success: bool,
    },
    /// Restore health. The only effect allowed on a downed target.
    Heal {
        /// Amount restored.
        amount: DiceExpression,
    },
    /// A volley of d6 attacks: each hits on `hit_on`+, each hit wounds on
    /// `wound_on`+, and each wound is stopped by a target save of
    /// `save_on`+ (natural roll plus the target's save bonuses). Every
    /// unsaved wound rolls `damage`.
    Volley {
        /// Number of attack dice.
        attacks: u32,
        /// Minimum d6 to hit.
        hit_on: u32,
        /// Minimum d6 to wound.
        wound_on: u32,
        /// Minimum save, or `None` when no save is allowed.
        #[serde(default)]
        save_on: Option<u32>,
        /// Damage per unsaved wound.
        damage: DiceExpression,
        /// Damage type for mitigation.
        #[serde(default)]
        damage_type: DamageType,
        /// Reroll each failed hit die once.
        #[serde(default)]
        reroll_hits: bool,
        /// Reroll each failed wound die once.
        #[serde(default)]
        reroll_wounds: bool,
    },
    /// Place a modifier on the target.
    Apply {
        /// The modifier to place.
        modifier: ActiveModifier,
    },
}

impl ActionEffect {
    /// Check bounds the type cannot express. A volley rolls one die per
    /// attack, so its size is held to the same cap as a dice expression.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Volley { attacks, .. } if !(1..=MAX_DICE).contains(attacks) => Err(format!(
                "volley attacks must be between 1 and {MAX_DICE}, got {attacks}"
            )),
            _ => Ok(()),
        }
    }

    /// Whether the effect deals damage.
    pub fn is_offensive(&self) -> bool {
        matches!(
            self,
            Self::Attack { .. } | Self::Save { .. } | Self::Volley { .. }
        )
    }

    /// Whether the effect may target a downed combatant.
    pub fn reaches_downed(&self) -> bool {
        matches!(self, Self::Heal { .. })
    }
}

/// An action a combatant knows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTemplate {
    /// Name, unique per combatant.
    pub name: String,
    /// Who it may target.
    pub targeting: TargetRule,
    /// Resources spent on use.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cost: BTreeMap<String, i64>,
    /// What it does.
    pub effect: ActionEffect,
}

impl ActionTemplate {
    /// A free action.
    pub fn new(name: impl Into<String>, targeting: TargetRule, effect: ActionEffect) -> Self {
        Self {
            name: name.into(),
            targeting,
            cost: BTreeMap::new(),
            effect,
        }
    }

    /// Add a resource cost.
    pub fn with_cost(mut self, resource: impl Into<String>, amount: i64) -> Self {
        self.cost.insert(resource.into(), amount);
        self
    }

    /// Whether `target` is a legal target for `actor`, health included.
    pub fn can_target(&self, actor: &CombatantState, target: &CombatantState) -> bool {
        self.targeting.permits(actor, target) && (!target.is_down() || self.effect.reaches_downed())
    }
}

/// A chosen action: which template, by whom, at whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    /// The acting combatant.
    pub actor: CombatantId,
    /// Name of one of the actor's templates.
    pub template: String,
    /// The target.
    pub target: CombatantId,
}

impl Action {
    /// Build an action.
    pub fn new(actor: CombatantId, template: impl Into<String>, target: CombatantId) -> Self {
        Self {
            actor,
            template: template.into(),
            target,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} uses {} on {}", self.actor, self.template, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_dice::parse;

    fn heal() -> ActionTemplate {
        ActionTemplate::new(
            "cure",
            TargetRule::Ally,
            ActionEffect::Heal {
                amount: parse("1d8").unwrap(),
            },
        )
    }

    fn strike() -> ActionTemplate {
        ActionTemplate::new(
            "strike",
            TargetRule::Enemy,
            ActionEffect::Attack {
                to_hit: parse("1d20").unwrap(),
                damage: parse("1d6").unwrap(),
                damage_type: DamageType::default(),
            },
        )
    }

    #[test]
    fn target_rules() {
        let a = CombatantState::new("a", "red", 5);
        let b = CombatantState::new("b", "red", 5);
        let c = CombatantState::new("c", "blue", 5);
        assert!(TargetRule::Enemy.permits(&a, &c));
        assert!(!TargetRule::Enemy.permits(&a, &b));
        assert!(TargetRule::Ally.permits(&a, &b));
        assert!(TargetRule::Ally.permits(&a, &a));
        assert!(TargetRule::SelfOnly.permits(&a, &a));
        assert!(!TargetRule::SelfOnly.permits(&a, &b));
        assert!(TargetRule::Any.permits(&a, &c));
    }

    #[test]
    fn downed_targets_only_for_heals() {
        let a = CombatantState::new("a", "red", 5);
        let mut ally = CombatantState::new("b", "red", 5);
        let mut foe = CombatantState::new("c", "blue", 5);
        ally.health.adjust(-5);
        foe.health.adjust(-5);
        assert!(heal().can_target(&a, &ally));
        assert!(!strike().can_target(&a, &foe));
    }

    #[test]
    fn template_from_json() {
        let json = r#"{
            "name": "fireball",
            "targeting": "enemy",
            "cost": {"slots": 1},
            "effect": {"kind": "save", "dc": 15, "damage": "8d6", "damage_type": "fire", "half_on_success": true}
        }"#;
        let t: ActionTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(t.cost["slots"], 1);
        assert!(t.effect.is_offensive());
        match t.effect {
            ActionEffect::Save { dc, save, damage, .. } => {
                assert_eq!(dc, 15);
                assert!(save.is_none());
                assert_eq!(damage.notation(), "8d6");
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn self_rule_serializes_as_self() {
        assert_eq!(serde_json::to_string(&TargetRule::SelfOnly).unwrap(), "\"self\"");
    }
}
