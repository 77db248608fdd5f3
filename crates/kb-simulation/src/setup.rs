//! What a run simulates: the starting roster and who decides for each side.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use kb_combat::{
    AiProfile, CombatantState, DecisionPolicy, EncounterState, FirstAvailable, FocusWeakest, Side,
};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// The starting roster of an encounter, checked once before any trial runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CombatantState>", into = "Vec<CombatantState>")]
pub struct EncounterSetup {
    combatants: Vec<CombatantState>,
}

impl EncounterSetup {
    /// Validate a roster: unique ids and at least two sides.
    pub fn new(combatants: Vec<CombatantState>) -> SimResult<Self> {
        let state = EncounterState::new(combatants.clone())
            .map_err(|e| SimError::Configuration(e.to_string()))?;
        let sides: BTreeSet<_> = state.combatants().iter().map(|c| &c.side).collect();
        if sides.len() < 2 {
            return Err(SimError::Configuration(
                "an encounter needs at least two sides".into(),
            ));
        }
        Ok(Self { combatants })
    }

    /// The combatants in setup order.
    pub fn combatants(&self) -> &[CombatantState] {
        &self.combatants
    }

    /// Every side, sorted by name.
    pub fn sides(&self) -> BTreeSet<&Side> {
        self.combatants.iter().map(|c| &c.side).collect()
    }

    /// A fresh encounter for one trial.
    pub(crate) fn start(&self) -> SimResult<EncounterState> {
        EncounterState::new(self.combatants.clone())
            .map_err(|e| SimError::Configuration(e.to_string()))
    }
}

impl TryFrom<Vec<CombatantState>> for EncounterSetup {
    type Error = SimError;

    fn try_from(combatants: Vec<CombatantState>) -> SimResult<Self> {
        Self::new(combatants)
    }
}

impl From<EncounterSetup> for Vec<CombatantState> {
    fn from(setup: EncounterSetup) -> Self {
        setup.combatants
    }
}

/// Look up one of the bundled policies by name.
pub fn builtin_policy(name: &str) -> Option<Arc<dyn DecisionPolicy>> {
    builtin_policy_with_profile(name, AiProfile::default())
}

/// Like [`builtin_policy`], tuning policies that take a profile.
/// `first-available` ignores it.
pub fn builtin_policy_with_profile(
    name: &str,
    profile: AiProfile,
) -> Option<Arc<dyn DecisionPolicy>> {
    match name {
        "first-available" => Some(Arc::new(FirstAvailable)),
        "focus-weakest" => Some(Arc::new(FocusWeakest::new(profile))),
        _ => None,
    }
}

/// The decision policy for each side.
#[derive(Clone, Default)]
pub struct PolicySet {
    by_side: BTreeMap<Side, Arc<dyn DecisionPolicy>>,
    fallback: Option<Arc<dyn DecisionPolicy>>,
}

impl std::fmt::Debug for PolicySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sides: BTreeMap<_, _> = self
            .by_side
            .iter()
            .map(|(side, p)| (side.as_str(), p.name()))
            .collect();
        f.debug_struct("PolicySet")
            .field("by_side", &sides)
            .field("fallback", &self.fallback.as_ref().map(|p| p.name()))
            .finish()
    }
}

impl PolicySet {
    /// No policies yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every side uses `policy` unless given its own.
    pub fn uniform(policy: Arc<dyn DecisionPolicy>) -> Self {
        Self::new().with_fallback(policy)
    }

    /// Use `policy` for `side`.
    pub fn with_side(mut self, side: impl Into<String>, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.by_side.insert(Side::new(side), policy);
        self
    }

    /// Use `policy` for sides without their own.
    pub fn with_fallback(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.fallback = Some(policy);
        self
    }

    /// The policy deciding for `side`.
    pub fn for_side(&self, side: &Side) -> Option<&dyn DecisionPolicy> {
        self.by_side
            .get(side)
            .or(self.fallback.as_ref())
            .map(|p| p.as_ref())
    }

    /// Fail unless every side of `setup` has a policy.
    pub fn check_covers(&self, setup: &EncounterSetup) -> SimResult<()> {
        match setup.sides().into_iter().find(|s| self.for_side(s).is_none()) {
            Some(side) => Err(SimError::Configuration(format!(
                "no decision policy for side {side}"
            ))),
            None => Ok(()),
        }
    }
}
