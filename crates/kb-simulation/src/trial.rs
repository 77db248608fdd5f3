//! One trial: `Setup → RoundLoop → Terminal`.

use std::collections::BTreeMap;

use kb_combat::{CombatError, CombatantId, CombatantState, EncounterState, Resolver, RoundDelta, Side, Termination};
use kb_dice::{AuditTrail, Evaluator};
use kb_entropy::Entropy;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::{Metric, SimConfig};
use crate::error::TrialFailure;
use crate::setup::{EncounterSetup, PolicySet};

/// The finished state of one trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialResult {
    /// Position of the trial in its run.
    pub trial_index: u64,
    /// Rounds played.
    pub rounds: u32,
    /// How the encounter ended.
    pub termination: Termination,
    /// The encounter as it ended.
    pub final_state: EncounterState,
    /// Damage dealt per side, after mitigation and before health floors.
    pub damage_by_side: BTreeMap<Side, i64>,
    /// Every roll and forced pass of the trial, when audits are retained.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditTrail>,
}

impl TrialResult {
    /// The winning side, if any.
    pub fn winner(&self) -> Option<&Side> {
        match &self.termination {
            Termination::Victory(side) => Some(side),
            _ => None,
        }
    }

    /// The value of `metric` for this trial.
    pub fn metric(&self, metric: &Metric) -> f64 {
        let value = match metric {
            Metric::RoundsToResolution => i64::from(self.rounds),
            Metric::TotalDamage => self.damage_by_side.values().fold(0i64, |a, d| a.saturating_add(*d)),
            Metric::DamageDealtBy(side) => self.damage_by_side.get(side).copied().unwrap_or(0),
            Metric::SurvivorsOn(side) => self.members(side).filter(|c| !c.is_down()).count() as i64,
            Metric::RemainingHealth(side) => self.members(side).fold(0i64, |a, c| a.saturating_add(c.health.current)),
        };
        value as f64
    }

    fn members<'s>(&'s self, side: &'s Side) -> impl Iterator<Item = &'s CombatantState> + 's {
        self.final_state
            .combatants()
            .iter()
            .filter(move |c| &c.side == side)
    }
}

/// How a trial run ended.
#[derive(Debug)]
pub(crate) enum TrialRun {
    Finished(Box<TrialResult>),
    Failed(TrialFailure),
    Cancelled,
}

/// Runs trials of one configured encounter. Shared by all workers.
pub(crate) struct TrialRunner<'a> {
    setup: &'a EncounterSetup,
    policies: &'a PolicySet,
    config: &'a SimConfig,
    resolver: Resolver,
}

impl<'a> TrialRunner<'a> {
    pub(crate) fn new(setup: &'a EncounterSetup, policies: &'a PolicySet, config: &'a SimConfig) -> Self {
        Self {
            setup,
            policies,
            config,
            resolver: Resolver::new(Evaluator::new(config.evaluator.clone())),
        }
    }

    pub(crate) fn config(&self) -> &'a SimConfig {
        self.config
    }

    /// Run trial `trial_index` on its own entropy.
    pub(crate) fn run(&self, trial_index: u64, mut entropy: Entropy, cancel: &CancelToken) -> TrialRun {
        let mut trail = AuditTrail::new();
        let mut state = match self.setup.start() {
            Ok(state) => state,
            Err(e) => return TrialRun::Failed(self.failure(trial_index, 0, e.to_string())),
        };
        let mut damage: BTreeMap<Side, i64> = self
            .setup
            .sides()
            .into_iter()
            .map(|side| (side.clone(), 0))
            .collect();

        let order = match self.config.initiative.order(
            &state,
            self.resolver.evaluator(),
            &mut entropy,
            Some(&mut trail),
        ) {
            Ok(order) => order,
            Err(e) => return TrialRun::Failed(self.failure(trial_index, 0, e.to_string())),
        };

        if let Some(end) = state.check_elimination() {
            state.terminate(end);
        }
        while !state.is_terminated() {
            if cancel.is_cancelled() {
                debug!(trial_index, round = state.round(), "trial cancelled");
                return TrialRun::Cancelled;
            }
            if state.round() >= self.config.max_rounds {
                state.terminate(Termination::RoundLimitExceeded);
                break;
            }
            let round = state.begin_round();
            for id in &order {
                if state.is_terminated() {
                    break;
                }
                let Some(actor) = state.combatant(id) else {
                    continue;
                };
                if actor.is_down() {
                    continue;
                }
                let side = actor.side.clone();
                let delta = match self.take_turn(&state, id, &side, &mut entropy, &mut trail) {
                    Ok(delta) => delta,
                    Err(e) => return TrialRun::Failed(self.failure(trial_index, round, e.to_string())),
                };
                if let Err(e) = state.apply(&delta) {
                    return TrialRun::Failed(self.failure(trial_index, round, e.to_string()));
                }
                if let Some(dealt) = damage.get_mut(&side) {
                    *dealt = dealt.saturating_add(delta.damage_dealt());
                }
                if let Some(end) = state.check_elimination() {
                    state.terminate(end);
                }
            }
            if !state.is_terminated() {
                let upkeep = self.resolver.upkeep(&state.view());
                if let Err(e) = state.apply(&upkeep) {
                    return TrialRun::Failed(self.failure(trial_index, round, e.to_string()));
                }
            }
        }

        let termination = state
            .termination()
            .cloned()
            .unwrap_or(Termination::RoundLimitExceeded);
        debug!(trial_index, rounds = state.round(), %termination, "trial finished");
        TrialRun::Finished(Box::new(TrialResult {
            trial_index,
            rounds: state.round(),
            termination,
            final_state: state,
            damage_by_side: damage,
            audit: self.config.retention.keeps_audit().then_some(trail),
        }))
    }

    /// Ask the side's policy for an action and resolve it. A policy with
    /// nothing to do passes, and the pass is annotated in the trail. When
    /// audit trails are kept, each decision's reasoning is annotated too.
    fn take_turn(
        &self,
        state: &EncounterState,
        id: &CombatantId,
        side: &Side,
        entropy: &mut Entropy,
        trail: &mut AuditTrail,
    ) -> Result<RoundDelta, CombatError> {
        let view = state.view();
        let Some(policy) = self.policies.for_side(side) else {
            return Err(CombatError::invalid_action(
                id,
                format!("no decision policy for side {side}"),
            ));
        };
        match policy.decide(&view, id) {
            Ok(decision) => {
                if self.config.retention.keeps_audit() {
                    trail.annotate(
                        "decision",
                        format!(
                            "round {}: {} ({}, confidence {:.2})",
                            state.round(),
                            id,
                            decision.reasoning,
                            decision.confidence
                        ),
                    );
                }
                self.resolver
                    .resolve_action(&view, &decision.action, entropy, Some(trail))
            }
            Err(none) => {
                let reason = none.to_string();
                trail.annotate("pass", format!("round {}: {reason}", state.round()));
                Ok(RoundDelta::pass(id.clone(), reason))
            }
        }
    }

    fn failure(&self, trial_index: u64, round: u32, message: String) -> TrialFailure {
        let failure = TrialFailure {
            trial_index,
            round,
            message,
        };
        warn!(seed = self.config.seed, %failure, "trial failed");
        failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kb_combat::{
        Action, ActionEffect, ActionTemplate, DecisionPolicy, EncounterView, FirstAvailable,
        InitiativeRule, NoLegalAction, TargetRule,
    };
    use kb_dice::{AuditRecord, parse};

    fn stab() -> ActionTemplate {
        ActionTemplate::new(
            "stab",
            TargetRule::Enemy,
            ActionEffect::Attack {
                to_hit: parse("1d20+100").unwrap(),
                damage: parse("1d4").unwrap(),
                damage_type: Default::default(),
            },
        )
    }

    fn duel() -> EncounterSetup {
        EncounterSetup::new(vec![
            CombatantState::new("red-1", "red", 1).with_action(stab()),
            CombatantState::new("blue-1", "blue", 1).with_action(stab()),
        ])
        .unwrap()
    }

    fn run(setup: &EncounterSetup, policies: &PolicySet, config: &SimConfig, index: u64) -> TrialRun {
        TrialRunner::new(setup, policies, config).run(
            index,
            Entropy::seeded(kb_entropy::derive_trial_seed(config.seed, index)),
            &CancelToken::new(),
        )
    }

    fn finished(run: TrialRun) -> TrialResult {
        match run {
            TrialRun::Finished(result) => *result,
            other => panic!("trial did not finish: {other:?}"),
        }
    }

    #[test]
    fn first_strike_wins_a_duel() {
        let policies = PolicySet::uniform(Arc::new(FirstAvailable));
        let config = SimConfig::default().with_retention(crate::config::Retention::TrialsWithAudit);
        let result = finished(run(&duel(), &policies, &config, 0));
        assert_eq!(result.rounds, 1);
        let winner = result.winner().unwrap().clone();
        let loser = if winner.as_str() == "red" { "blue" } else { "red" };
        assert!(result.damage_by_side[&winner] >= 1);
        assert_eq!(result.damage_by_side[&Side::new(loser)], 0);
        assert_eq!(result.metric(&Metric::RoundsToResolution), 1.0);
        assert_eq!(result.metric(&Metric::SurvivorsOn(winner)), 1.0);
        // Two initiative rolls, one attack roll and one damage roll.
        assert_eq!(result.audit.unwrap().rolls().count(), 4);
    }

    #[test]
    fn fixed_initiative_favours_bonus() {
        let setup = EncounterSetup::new(vec![
            CombatantState::new("red-1", "red", 1).with_action(stab()),
            CombatantState::new("blue-1", "blue", 1)
                .with_initiative_bonus(2)
                .with_action(stab()),
        ])
        .unwrap();
        let policies = PolicySet::uniform(Arc::new(FirstAvailable));
        let config = SimConfig::default().with_initiative(InitiativeRule::Fixed);
        for index in 0..5 {
            let result = finished(run(&setup, &policies, &config, index));
            assert_eq!(result.winner(), Some(&Side::new("blue")));
        }
    }

    #[test]
    fn idle_sides_hit_round_limit() {
        let setup = EncounterSetup::new(vec![
            CombatantState::new("a", "red", 5),
            CombatantState::new("b", "blue", 5),
        ])
        .unwrap();
        let policies = PolicySet::uniform(Arc::new(FirstAvailable));
        let config = SimConfig::default()
            .with_max_rounds(3)
            .with_retention(crate::config::Retention::TrialsWithAudit);
        let result = finished(run(&setup, &policies, &config, 0));
        assert_eq!(result.termination, Termination::RoundLimitExceeded);
        assert_eq!(result.rounds, 3);
        let passes = result
            .audit
            .unwrap()
            .records()
            .iter()
            .filter(|r| matches!(r, AuditRecord::Annotation { label, .. } if label == "pass"))
            .count();
        assert_eq!(passes, 6);
    }

    #[test]
    fn decisions_are_annotated_when_audit_is_kept() {
        let policies = PolicySet::uniform(Arc::new(FirstAvailable));
        let config = SimConfig::default().with_retention(crate::config::Retention::TrialsWithAudit);
        let result = finished(run(&duel(), &policies, &config, 0));
        let details: Vec<_> = result
            .audit
            .unwrap()
            .records()
            .iter()
            .filter_map(|r| match r {
                AuditRecord::Annotation { label, detail, .. } if label == "decision" => {
                    Some(detail.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(details.len(), 1);
        assert!(details[0].starts_with("round 1: "));
        assert!(details[0].contains("stab"));
        assert!(details[0].ends_with("confidence 0.50)"));
    }

    struct Blunder;

    impl DecisionPolicy for Blunder {
        fn name(&self) -> &str {
            "blunder"
        }

        fn choose_action(
            &self,
            _view: &EncounterView<'_>,
            actor: &CombatantId,
        ) -> Result<Action, NoLegalAction> {
            Ok(Action::new(actor.clone(), "smash", actor.clone()))
        }
    }

    #[test]
    fn invalid_actions_fail_the_trial() {
        let policies = PolicySet::uniform(Arc::new(Blunder));
        let config = SimConfig::default();
        match run(&duel(), &policies, &config, 7) {
            TrialRun::Failed(failure) => {
                assert_eq!(failure.trial_index, 7);
                assert_eq!(failure.round, 1);
                assert!(failure.message.contains("unknown action smash"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_before_first_round() {
        let policies = PolicySet::uniform(Arc::new(FirstAvailable));
        let config = SimConfig::default();
        let cancel = CancelToken::new();
        cancel.cancel();
        let run = TrialRunner::new(&duel(), &policies, &config).run(0, Entropy::seeded(1), &cancel);
        assert!(matches!(run, TrialRun::Cancelled));
    }
}
