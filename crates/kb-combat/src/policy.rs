//! The AI decision seam.
//!
//! The simulator asks a [`DecisionPolicy`] what each combatant does on its
//! turn. Policies only ever see an [`EncounterView`], so they cannot change
//! the encounter. The two policies here are simple references for tests and
//! the command line; real strategies live outside this crate.

use serde::{Deserialize, Serialize};

use crate::action::{Action, ActionEffect, ActionTemplate};
use crate::combatant::{CombatantId, CombatantState};
use crate::encounter::EncounterView;

/// A policy found nothing its combatant could do. The turn is passed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no legal action for {actor}")]
pub struct NoLegalAction {
    /// The combatant whose turn it was.
    pub actor: CombatantId,
}

/// An action together with why it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// What to do.
    pub action: Action,
    /// Human-readable explanation, recorded in retained audit trails.
    pub reasoning: String,
    /// How sure the policy is, from 0.0 to 1.0.
    pub confidence: f64,
}

impl Decision {
    /// A fully confident decision.
    pub fn new(action: Action, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            reasoning: reasoning.into(),
            confidence: 1.0,
        }
    }

    /// Set the confidence, clamped to `0.0..=1.0`; NaN counts as 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = unit(confidence);
        self
    }
}

/// Chooses actions for combatants.
pub trait DecisionPolicy: Send + Sync {
    /// Name used in encounter files and reports.
    fn name(&self) -> &str;

    /// Pick an action for `actor`.
    fn choose_action(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Action, NoLegalAction>;

    /// Pick an action and explain it. Policies that track their own
    /// reasoning override this; the default wraps [`Self::choose_action`].
    fn decide(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Decision, NoLegalAction> {
        self.choose_action(view, actor)
            .map(|action| Decision::new(action, format!("chosen by {}", self.name())))
    }
}

/// Temperament of a tunable policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiProfile {
    /// Tendency to attack rather than look after its own side, 0.0 to 1.0.
    /// A combatant whose health fraction falls below `1 - aggression`
    /// supports its side first when it can.
    pub aggression: f64,
    /// Willingness to spend resources, 0.0 to 1.0. Below 0.5 free actions
    /// are tried before ones with a cost.
    pub risk_tolerance: f64,
}

impl Default for AiProfile {
    fn default() -> Self {
        Self {
            aggression: 0.5,
            risk_tolerance: 0.5,
        }
    }
}

impl AiProfile {
    /// A profile with both traits clamped to `0.0..=1.0`.
    pub fn new(aggression: f64, risk_tolerance: f64) -> Self {
        Self {
            aggression: unit(aggression),
            risk_tolerance: unit(risk_tolerance),
        }
    }

    fn supports_first(&self, actor: &CombatantState) -> bool {
        actor.health.fraction() < 1.0 - unit(self.aggression)
    }

    fn conserves_resources(&self) -> bool {
        unit(self.risk_tolerance) < 0.5
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Whether aiming `template` at `target` would do anything. Damaging
/// effects are only worth aiming at other sides.
fn worthwhile(template: &ActionTemplate, actor: &CombatantState, target: &CombatantState) -> bool {
    match &template.effect {
        ActionEffect::Heal { .. } => target.health.missing() > 0,
        ActionEffect::Apply { modifier } => !target
            .active_modifiers
            .iter()
            .any(|m| m.name == modifier.name),
        effect if effect.is_offensive() => target.side != actor.side,
        _ => true,
    }
}

fn usable<'a>(
    view: &EncounterView<'a>,
    actor: &CombatantState,
    template: &ActionTemplate,
) -> Vec<&'a CombatantState> {
    if !view.can_afford(actor, template) {
        return Vec::new();
    }
    view.legal_targets(actor, template)
        .into_iter()
        .filter(|t| worthwhile(template, actor, t))
        .collect()
}

fn living_actor<'a>(
    view: &EncounterView<'a>,
    actor: &CombatantId,
) -> Result<&'a CombatantState, NoLegalAction> {
    view.combatant(actor)
        .filter(|c| !c.is_down())
        .ok_or_else(|| NoLegalAction {
            actor: actor.clone(),
        })
}

/// Uses the first action in the combatant's list that has a worthwhile
/// legal target, on the first such target in setup order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl DecisionPolicy for FirstAvailable {
    fn name(&self) -> &str {
        "first-available"
    }

    fn choose_action(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Action, NoLegalAction> {
        self.decide(view, actor).map(|d| d.action)
    }

    fn decide(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Decision, NoLegalAction> {
        let me = living_actor(view, actor)?;
        me.actions
            .iter()
            .find_map(|template| {
                usable(view, me, template).first().map(|target| {
                    let action = Action::new(actor.clone(), &template.name, target.id.clone());
                    let reasoning =
                        format!("first usable action: {} on {}", template.name, target.id);
                    Decision::new(action, reasoning).with_confidence(0.5)
                })
            })
            .ok_or_else(|| NoLegalAction {
                actor: actor.clone(),
            })
    }
}

/// Attacks the enemy with the least health using the first affordable
/// damaging action; falls back to [`FirstAvailable`] when no damaging
/// action applies. An [`AiProfile`] decides when a wounded combatant heals
/// or buffs its side instead and whether actions with a cost are held back.
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusWeakest {
    profile: AiProfile,
}

impl FocusWeakest {
    /// A policy with the given temperament.
    pub fn new(profile: AiProfile) -> Self {
        Self { profile }
    }

    /// The temperament in use.
    pub fn profile(&self) -> &AiProfile {
        &self.profile
    }

    /// A heal or buff for the most hurt member of the actor's side.
    fn support(&self, view: &EncounterView<'_>, me: &CombatantState) -> Option<Decision> {
        me.actions
            .iter()
            .filter(|t| !t.effect.is_offensive())
            .find_map(|template| {
                usable(view, me, template)
                    .into_iter()
                    .filter(|t| t.side == me.side)
                    .min_by(|a, b| a.health.fraction().total_cmp(&b.health.fraction()))
                    .map(|target| {
                        let action = Action::new(me.id.clone(), &template.name, target.id.clone());
                        let reasoning = format!(
                            "at {:.0}% health, supporting {} with {}",
                            me.health.fraction() * 100.0,
                            target.id,
                            template.name
                        );
                        Decision::new(action, reasoning).with_confidence(1.0 - me.health.fraction())
                    })
            })
    }

    /// The first damaging action, aimed at the enemy with least health.
    fn focus(&self, view: &EncounterView<'_>, me: &CombatantState) -> Option<Decision> {
        let mut offensive: Vec<&ActionTemplate> =
            me.actions.iter().filter(|t| t.effect.is_offensive()).collect();
        if self.profile.conserves_resources() {
            offensive.sort_by_key(|t| !t.cost.is_empty());
        }
        offensive.into_iter().find_map(|template| {
            usable(view, me, template)
                .into_iter()
                .min_by_key(|t| t.health.current)
                .map(|target| {
                    let action = Action::new(me.id.clone(), &template.name, target.id.clone());
                    let reasoning = format!(
                        "weakest enemy {} at {} health, using {}",
                        target.id, target.health.current, template.name
                    );
                    Decision::new(action, reasoning)
                        .with_confidence(0.5 + 0.5 * (1.0 - target.health.fraction()))
                })
        })
    }
}

impl DecisionPolicy for FocusWeakest {
    fn name(&self) -> &str {
        "focus-weakest"
    }

    fn choose_action(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Action, NoLegalAction> {
        self.decide(view, actor).map(|d| d.action)
    }

    fn decide(
        &self,
        view: &EncounterView<'_>,
        actor: &CombatantId,
    ) -> Result<Decision, NoLegalAction> {
        let me = living_actor(view, actor)?;
        let support = if self.profile.supports_first(me) {
            self.support(view, me)
        } else {
            None
        };
        match support.or_else(|| self.focus(view, me)) {
            Some(decision) => Ok(decision),
            None => FirstAvailable.decide(view, actor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::TargetRule;
    use crate::combatant::{ActiveModifier, ModifierEffect};
    use crate::encounter::EncounterState;
    use kb_dice::parse;

    fn bite() -> ActionTemplate {
        ActionTemplate::new(
            "bite",
            TargetRule::Enemy,
            ActionEffect::Attack {
                to_hit: parse("1d20").unwrap(),
                damage: parse("1d4").unwrap(),
                damage_type: Default::default(),
            },
        )
    }

    fn lick() -> ActionTemplate {
        ActionTemplate::new(
            "lick",
            TargetRule::SelfOnly,
            ActionEffect::Heal {
                amount: parse("1d4").unwrap(),
            },
        )
    }

    fn howl() -> ActionTemplate {
        ActionTemplate::new(
            "howl",
            TargetRule::SelfOnly,
            ActionEffect::Apply {
                modifier: ActiveModifier::timed("howl", ModifierEffect::AttackBonus(1), 2),
            },
        )
    }

    fn pack() -> EncounterState {
        let mut hurt = CombatantState::new("hunter-2", "hunters", 12);
        hurt.health.adjust(-8);
        EncounterState::new(vec![
            CombatantState::new("wolf", "pack", 10)
                .with_action(howl())
                .with_action(lick())
                .with_action(bite()),
            CombatantState::new("hunter-1", "hunters", 12),
            hurt,
        ])
        .unwrap()
    }

    fn id(s: &str) -> CombatantId {
        CombatantId::new(s)
    }

    #[test]
    fn first_available_takes_first_worthwhile() {
        let state = pack();
        let action = FirstAvailable
            .choose_action(&state.view(), &id("wolf"))
            .unwrap();
        assert_eq!(action, Action::new(id("wolf"), "howl", id("wolf")));
    }

    #[test]
    fn first_available_skips_pointless_actions() {
        let mut state = pack();
        state
            .apply(&crate::encounter::RoundDelta {
                actor: Some(id("wolf")),
                action: "howl".into(),
                changes: vec![crate::encounter::StateChange::ApplyModifier {
                    target: id("wolf"),
                    modifier: ActiveModifier::timed("howl", ModifierEffect::AttackBonus(1), 2),
                }],
                rolls: Vec::new(),
            })
            .unwrap();
        // Already howling and at full health: bite the first hunter.
        let action = FirstAvailable
            .choose_action(&state.view(), &id("wolf"))
            .unwrap();
        assert_eq!(action, Action::new(id("wolf"), "bite", id("hunter-1")));
    }

    #[test]
    fn focus_weakest_picks_lowest_health() {
        let state = pack();
        let decision = FocusWeakest::default()
            .decide(&state.view(), &id("wolf"))
            .unwrap();
        assert_eq!(decision.action, Action::new(id("wolf"), "bite", id("hunter-2")));
        assert!(decision.reasoning.contains("hunter-2"));
        assert!(decision.confidence > 0.5 && decision.confidence <= 1.0);
    }

    fn swipe() -> ActionTemplate {
        ActionTemplate::new(
            "swipe",
            TargetRule::Any,
            ActionEffect::Attack {
                to_hit: parse("1d20").unwrap(),
                damage: parse("1d6").unwrap(),
                damage_type: Default::default(),
            },
        )
    }

    #[test]
    fn any_targeted_attacks_spare_own_side() {
        let mut cub = CombatantState::new("cub", "pack", 10);
        cub.health.adjust(-9);
        let mut wolf = CombatantState::new("wolf", "pack", 10).with_action(swipe());
        wolf.health.adjust(-8);
        let state = EncounterState::new(vec![
            wolf,
            cub,
            CombatantState::new("hunter", "hunters", 12),
        ])
        .unwrap();
        let aggressive = FocusWeakest::new(AiProfile::new(1.0, 0.5));
        let policies: [&dyn DecisionPolicy; 2] = [&aggressive, &FirstAvailable];
        for policy in policies {
            let action = policy.choose_action(&state.view(), &id("wolf")).unwrap();
            assert_eq!(action, Action::new(id("wolf"), "swipe", id("hunter")));
        }
    }

    #[test]
    fn wounded_cautious_policy_heals_first() {
        let mut wolf = CombatantState::new("wolf", "pack", 10)
            .with_action(bite())
            .with_action(lick());
        wolf.health.adjust(-7);
        let state = EncounterState::new(vec![wolf, CombatantState::new("hunter", "hunters", 12)]).unwrap();

        let cautious = FocusWeakest::new(AiProfile::new(0.2, 0.5));
        let decision = cautious.decide(&state.view(), &id("wolf")).unwrap();
        assert_eq!(decision.action, Action::new(id("wolf"), "lick", id("wolf")));
        assert!((decision.confidence - 0.7).abs() < 1e-9);

        let reckless = FocusWeakest::new(AiProfile::new(1.0, 0.5));
        let decision = reckless.decide(&state.view(), &id("wolf")).unwrap();
        assert_eq!(decision.action, Action::new(id("wolf"), "bite", id("hunter")));
    }

    #[test]
    fn risk_averse_policy_saves_resources() {
        let state = EncounterState::new(vec![
            CombatantState::new("mage", "a", 5)
                .with_resource("mana", 3)
                .with_action(swipe().with_cost("mana", 1))
                .with_action(bite()),
            CombatantState::new("rat", "b", 5),
        ])
        .unwrap();
        let bold = FocusWeakest::new(AiProfile::new(0.5, 0.9));
        assert_eq!(bold.choose_action(&state.view(), &id("mage")).unwrap().template, "swipe");
        let careful = FocusWeakest::new(AiProfile::new(0.5, 0.1));
        assert_eq!(careful.choose_action(&state.view(), &id("mage")).unwrap().template, "bite");
    }

    #[test]
    fn profile_traits_are_clamped() {
        let profile = AiProfile::new(4.0, f64::NAN);
        assert_eq!(profile, AiProfile::new(1.0, 0.0));
        let json: AiProfile = serde_json::from_str(r#"{"aggression": 0.9}"#).unwrap();
        assert_eq!(json.risk_tolerance, 0.5);
    }

    #[test]
    fn default_decision_wraps_choice() {
        struct Stubborn;
        impl DecisionPolicy for Stubborn {
            fn name(&self) -> &str {
                "stubborn"
            }
            fn choose_action(
                &self,
                _view: &EncounterView<'_>,
                actor: &CombatantId,
            ) -> Result<Action, NoLegalAction> {
                Ok(Action::new(actor.clone(), "wait", actor.clone()))
            }
        }
        let state = pack();
        let decision = Stubborn.decide(&state.view(), &id("wolf")).unwrap();
        assert_eq!(decision.reasoning, "chosen by stubborn");
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn no_legal_action_when_nothing_applies() {
        let state = EncounterState::new(vec![
            CombatantState::new("lonely", "a", 5).with_action(bite()),
        ])
        .unwrap();
        let err = FocusWeakest::default()
            .choose_action(&state.view(), &id("lonely"))
            .unwrap_err();
        assert_eq!(err.actor, id("lonely"));
        assert!(FirstAvailable.choose_action(&state.view(), &id("ghost")).is_err());
    }

    #[test]
    fn unaffordable_actions_skipped() {
        let state = EncounterState::new(vec![
            CombatantState::new("mage", "a", 5).with_action(bite().with_cost("mana", 1)),
            CombatantState::new("rat", "b", 5),
        ])
        .unwrap();
        assert!(FirstAvailable.choose_action(&state.view(), &id("mage")).is_err());
    }

    #[test]
    fn policies_are_object_safe() {
        let policies: Vec<Box<dyn DecisionPolicy>> = vec![Box::new(FirstAvailable), Box::new(FocusWeakest::default())];
        let names: Vec<_> = policies.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["first-available", "focus-weakest"]);
    }
}
