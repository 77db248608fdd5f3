//! Combatants and the modifiers that act on them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::ActionTemplate;
use crate::track::Track;

/// Identifies a combatant within an encounter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatantId(String);

impl CombatantId {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CombatantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The team a combatant fights for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Side(String);

impl Side {
    /// Wrap a side name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The side name as text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kind of damage, matched by name against resistances.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DamageType(String);

impl DamageType {
    /// Wrap a damage type name. Names are compared case-insensitively.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_ascii_lowercase())
    }
}

impl Default for DamageType {
    fn default() -> Self {
        Self::new("physical")
    }
}

impl std::fmt::Display for DamageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an active modifier does while it lasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierEffect {
    /// Added to the holder's attack rolls.
    AttackBonus(i64),
    /// Added to the holder's armor.
    ArmorBonus(i64),
    /// Added to the holder's saving throws.
    SaveBonus(i64),
    /// Halves damage of this type, rounding down.
    Resistance(DamageType),
    /// Doubles damage of this type.
    Vulnerability(DamageType),
    /// Negates damage of this type.
    Immunity(DamageType),
}

/// A named, possibly temporary, modifier on a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveModifier {
    /// Name; applying a modifier with the same name replaces the old one.
    pub name: String,
    /// The effect.
    pub effect: ModifierEffect,
    /// Rounds left, or `None` for a permanent modifier.
    #[serde(default)]
    pub remaining_rounds: Option<u32>,
}

impl ActiveModifier {
    /// A modifier that never expires.
    pub fn permanent(name: impl Into<String>, effect: ModifierEffect) -> Self {
        Self {
            name: name.into(),
            effect,
            remaining_rounds: None,
        }
    }

    /// A modifier lasting `rounds` end-of-round upkeeps.
    pub fn timed(name: impl Into<String>, effect: ModifierEffect, rounds: u32) -> Self {
        Self {
            name: name.into(),
            effect,
            remaining_rounds: Some(rounds),
        }
    }
}

fn default_armor() -> i64 {
    10
}

/// One participant in an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantState {
    /// Unique id within the encounter.
    pub id: CombatantId,
    /// The side this combatant fights for.
    pub side: Side,
    /// Health; the combatant is down when it hits the floor.
    pub health: Track,
    /// Attack rolls must reach this to hit.
    #[serde(default = "default_armor")]
    pub armor: i64,
    /// Added to initiative rolls and used as the first tie-breaker.
    #[serde(default)]
    pub initiative_bonus: i64,
    /// Added to saving throws.
    #[serde(default)]
    pub save_bonus: i64,
    /// Spendable resources such as spell slots.
    #[serde(default)]
    pub resources: BTreeMap<String, i64>,
    /// Modifiers currently in effect.
    #[serde(default)]
    pub active_modifiers: Vec<ActiveModifier>,
    /// The actions this combatant may take.
    #[serde(default)]
    pub actions: Vec<ActionTemplate>,
}

impl CombatantState {
    /// A combatant at full health with default armor and no actions.
    pub fn new(id: impl Into<String>, side: impl Into<String>, max_health: i64) -> Self {
        Self {
            id: CombatantId::new(id),
            side: Side::new(side),
            health: Track::new("health", max_health),
            armor: default_armor(),
            initiative_bonus: 0,
            save_bonus: 0,
            resources: BTreeMap::new(),
            active_modifiers: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Set the armor value.
    pub fn with_armor(mut self, armor: i64) -> Self {
        self.armor = armor;
        self
    }

    /// Set the initiative bonus.
    pub fn with_initiative_bonus(mut self, bonus: i64) -> Self {
        self.initiative_bonus = bonus;
        self
    }

    /// Set the saving throw bonus.
    pub fn with_save_bonus(mut self, bonus: i64) -> Self {
        self.save_bonus = bonus;
        self
    }

    /// Add a spendable resource.
    pub fn with_resource(mut self, name: impl Into<String>, amount: i64) -> Self {
        self.resources.insert(name.into(), amount);
        self
    }

    /// Add an active modifier.
    pub fn with_modifier(mut self, modifier: ActiveModifier) -> Self {
        self.active_modifiers.push(modifier);
        self
    }

    /// Add an action.
    pub fn with_action(mut self, action: ActionTemplate) -> Self {
        self.actions.push(action);
        self
    }

    /// Returns true once health reaches its floor.
    pub fn is_down(&self) -> bool {
        self.health.is_empty()
    }

    /// Look up an action by name.
    pub fn action(&self, name: &str) -> Option<&ActionTemplate> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// The first resource in `cost` that current resources cannot cover.
    pub fn shortfall<'a>(&self, cost: &'a BTreeMap<String, i64>) -> Option<&'a str> {
        cost.iter()
            .find(|(name, amount)| self.resources.get(*name).copied().unwrap_or(0) < **amount)
            .map(|(name, _)| name.as_str())
    }

    /// Sum of attack bonuses from active modifiers.
    pub fn attack_bonus(&self) -> i64 {
        self.sum_effects(|e| match e {
            ModifierEffect::AttackBonus(n) => Some(*n),
            _ => None,
        })
    }

    /// Armor including bonuses from active modifiers.
    pub fn effective_armor(&self) -> i64 {
        self.armor.saturating_add(self.sum_effects(|e| match e {
            ModifierEffect::ArmorBonus(n) => Some(*n),
            _ => None,
        }))
    }

    /// Saving throw bonus including active modifiers.
    pub fn effective_save_bonus(&self) -> i64 {
        self.save_bonus.saturating_add(self.sum_effects(|e| match e {
            ModifierEffect::SaveBonus(n) => Some(*n),
            _ => None,
        }))
    }

    /// Damage after immunity, resistance and vulnerability, in that order.
    /// Never negative.
    pub fn mitigate(&self, amount: i64, damage_type: &DamageType) -> i64 {
        if self.has_effect(|e| matches!(e, ModifierEffect::Immunity(t) if t == damage_type)) {
            return 0;
        }
        let mut amount = amount.max(0);
        if self.has_effect(|e| matches!(e, ModifierEffect::Resistance(t) if t == damage_type)) {
            amount /= 2;
        }
        if self.has_effect(|e| matches!(e, ModifierEffect::Vulnerability(t) if t == damage_type)) {
            amount = amount.saturating_mul(2);
        }
        amount
    }

    fn has_effect(&self, pred: impl Fn(&ModifierEffect) -> bool) -> bool {
        self.active_modifiers.iter().any(|m| pred(&m.effect))
    }

    fn sum_effects(&self, pick: impl Fn(&ModifierEffect) -> Option<i64>) -> i64 {
        self.active_modifiers
            .iter()
            .filter_map(|m| pick(&m.effect))
            .fold(0i64, i64::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire() -> DamageType {
        DamageType::new("Fire")
    }

    #[test]
    fn builder_defaults() {
        let c = CombatantState::new("orc", "horde", 15)
            .with_armor(13)
            .with_resource("rage", 2);
        assert_eq!(c.id.as_str(), "orc");
        assert_eq!(c.health.current, 15);
        assert_eq!(c.effective_armor(), 13);
        assert_eq!(c.resources["rage"], 2);
        assert!(!c.is_down());
    }

    #[test]
    fn modifiers_sum_into_stats() {
        let c = CombatantState::new("paladin", "party", 20)
            .with_armor(16)
            .with_save_bonus(2)
            .with_modifier(ActiveModifier::timed("shield", ModifierEffect::ArmorBonus(5), 1))
            .with_modifier(ActiveModifier::permanent("bless", ModifierEffect::AttackBonus(2)))
            .with_modifier(ActiveModifier::permanent("aura", ModifierEffect::SaveBonus(3)));
        assert_eq!(c.effective_armor(), 21);
        assert_eq!(c.attack_bonus(), 2);
        assert_eq!(c.effective_save_bonus(), 5);
    }

    #[test]
    fn mitigation_order() {
        let plain = CombatantState::new("a", "x", 10);
        assert_eq!(plain.mitigate(7, &fire()), 7);
        assert_eq!(plain.mitigate(-3, &fire()), 0);

        let resistant = plain.clone().with_modifier(ActiveModifier::permanent(
            "ring",
            ModifierEffect::Resistance(fire()),
        ));
        assert_eq!(resistant.mitigate(7, &fire()), 3);
        assert_eq!(resistant.mitigate(7, &DamageType::new("cold")), 7);

        let both = resistant.clone().with_modifier(ActiveModifier::permanent(
            "curse",
            ModifierEffect::Vulnerability(fire()),
        ));
        assert_eq!(both.mitigate(7, &fire()), 6);

        let immune = both.with_modifier(ActiveModifier::permanent(
            "ward",
            ModifierEffect::Immunity(fire()),
        ));
        assert_eq!(immune.mitigate(100, &fire()), 0);
    }

    #[test]
    fn shortfall_reports_missing_resource() {
        let c = CombatantState::new("mage", "party", 8).with_resource("slots", 1);
        let mut cost = BTreeMap::new();
        cost.insert("slots".to_string(), 1);
        assert_eq!(c.shortfall(&cost), None);
        cost.insert("slots".to_string(), 2);
        assert_eq!(c.shortfall(&cost), Some("slots"));
        let mut other = BTreeMap::new();
        other.insert("ki".to_string(), 1);
        assert_eq!(c.shortfall(&other), Some("ki"));
    }

    #[test]
    fn deserializes_with_defaults() {
        let c: CombatantState =
            serde_json::from_str(r#"{"id": "wolf", "side": "beasts", "health": 11}"#).unwrap();
        assert_eq!(c.armor, 10);
        assert_eq!(c.health.max, 11);
        assert!(c.actions.is_empty());
    }
}
