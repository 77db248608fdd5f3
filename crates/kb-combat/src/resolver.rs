//! Action resolution.
//!
//! [`Resolver::resolve_action`] validates an action against the encounter,
//! rolls every die it needs and returns the resulting [`RoundDelta`]. It
//! never touches the encounter itself.

use kb_dice::{AuditTrail, DiceExpression, DiceResult, Evaluator, RollOutcome};
use kb_entropy::EntropySource;

use crate::action::{Action, ActionEffect};
use crate::combatant::{CombatantState, DamageType};
use crate::encounter::{EncounterView, RoundDelta, StateChange};
use crate::error::{CombatError, CombatResult};

/// Rolls dice for one resolution, keeping every outcome.
pub(crate) struct Roller<'a, 'b> {
    evaluator: &'a Evaluator,
    source: &'b mut dyn EntropySource,
    trail: Option<&'b mut AuditTrail>,
    rolls: Vec<RollOutcome>,
}

impl<'a, 'b> Roller<'a, 'b> {
    pub(crate) fn new(
        evaluator: &'a Evaluator,
        source: &'b mut dyn EntropySource,
        trail: Option<&'b mut AuditTrail>,
    ) -> Self {
        Self {
            evaluator,
            source,
            trail,
            rolls: Vec::new(),
        }
    }

    pub(crate) fn roll(&mut self, expr: &DiceExpression) -> DiceResult<i64> {
        let outcome = match self.trail.as_deref_mut() {
            Some(trail) => self.evaluator.evaluate_audited(expr, self.source, trail)?,
            None => self.evaluator.evaluate(expr, self.source)?,
        };
        let total = outcome.total();
        self.rolls.push(outcome);
        Ok(total)
    }

    /// Like [`Roller::roll`] but also reports the critical flags.
    fn roll_checked(&mut self, expr: &DiceExpression) -> DiceResult<(i64, bool, bool)> {
        self.roll(expr)?;
        Ok(self.rolls.last().map_or((0, false, false), |o| {
            (o.total(), o.is_critical_success(), o.is_critical_failure())
        }))
    }

    pub(crate) fn source(&mut self) -> &mut dyn EntropySource {
        &mut *self.source
    }

    pub(crate) fn into_rolls(self) -> Vec<RollOutcome> {
        self.rolls
    }
}

/// Resolves actions into deltas.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    evaluator: Evaluator,
}

impl Resolver {
    /// A resolver rolling through `evaluator`.
    pub fn new(evaluator: Evaluator) -> Self {
        Self { evaluator }
    }

    /// The evaluator used for every roll.
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Resolve `action` against the encounter seen through `view`.
    ///
    /// Fails with [`CombatError::InvalidAction`] when the actor, template or
    /// target does not exist, the actor is down or cannot pay, and with
    /// [`CombatError::IllegalTargeting`] when the targeting rule forbids the
    /// target or the target is down and the effect is not a heal. Rolls
    /// are appended to `trail` when one is given.
    pub fn resolve_action(
        &self,
        view: &EncounterView<'_>,
        action: &Action,
        source: &mut dyn EntropySource,
        trail: Option<&mut AuditTrail>,
    ) -> CombatResult<RoundDelta> {
        let actor_id = &action.actor;
        let actor = view
            .combatant(actor_id)
            .ok_or_else(|| CombatError::invalid_action(actor_id, "actor is not in the encounter"))?;
        if actor.is_down() {
            return Err(CombatError::invalid_action(actor_id, "actor is down"));
        }
        let template = actor.action(&action.template).ok_or_else(|| {
            CombatError::invalid_action(actor_id, format!("unknown action {}", action.template))
        })?;
        let target = view.combatant(&action.target).ok_or_else(|| {
            CombatError::invalid_action(
                actor_id,
                format!("target {} is not in the encounter", action.target),
            )
        })?;
        if !template.can_target(actor, target) {
            return Err(CombatError::IllegalTargeting {
                actor: actor_id.clone(),
                target: target.id.clone(),
                rule: template.targeting,
            });
        }
        if let Some(resource) = actor.shortfall(&template.cost) {
            return Err(CombatError::invalid_action(
                actor_id,
                format!("not enough {resource} for {}", template.name),
            ));
        }

        let mut changes: Vec<StateChange> = template
            .cost
            .iter()
            .map(|(resource, amount)| StateChange::SpendResource {
                combatant: actor_id.clone(),
                resource: resource.clone(),
                amount: *amount,
            })
            .collect();

        let mut roller = Roller::new(&self.evaluator, source, trail);
        match &template.effect {
            ActionEffect::Attack {
                to_hit,
                damage,
                damage_type,
            } => {
                let (roll, crit_hit, crit_miss) = roller.roll_checked(to_hit)?;
                let attack = roll.saturating_add(actor.attack_bonus());
                let hit = !crit_miss && (crit_hit || attack >= target.effective_armor());
                if hit {
                    let mut raw = roller.roll(damage)?;
                    if crit_hit {
                        raw = raw.saturating_add(roller.roll(damage)?);
                    }
                    changes.push(damage_change(target, raw, damage_type));
                }
            }
            ActionEffect::Save {
                dc,
                save,
                damage,
                damage_type,
                half_on_success,
            } => {
                let save_roll = match save {
                    Some(expr) => roller.roll(expr)?,
                    None => roller.roll(&DiceExpression::new(1, 20)?)?,
                };
                let saved = save_roll.saturating_add(target.effective_save_bonus()) >= *dc;
                if !saved || *half_on_success {
                    let raw = roller.roll(damage)?;
                    let raw = if saved { raw / 2 } else { raw };
                    changes.push(damage_change(target, raw, damage_type));
                }
            }
            ActionEffect::Heal { amount } => {
                let amount = roller.roll(amount)?.max(0);
                changes.push(StateChange::Heal {
                    target: target.id.clone(),
                    amount,
                });
            }
            ActionEffect::Volley {
                attacks,
                hit_on,
                wound_on,
                save_on,
                damage,
                damage_type,
                reroll_hits,
                reroll_wounds,
            } => {
                let d6 = DiceExpression::new(1, 6)?;
                let hits = count_successes(&mut roller, &d6, *attacks, *hit_on, *reroll_hits)?;
                let wounds = count_successes(&mut roller, &d6, hits, *wound_on, *reroll_wounds)?;
                let mut unsaved = wounds;
                if let Some(save_on) = save_on {
                    let bonus = target.effective_save_bonus();
                    for _ in 0..wounds {
                        if roller.roll(&d6)?.saturating_add(bonus) >= i64::from(*save_on) {
                            unsaved -= 1;
                        }
                    }
                }
                if unsaved > 0 {
                    let mut raw = 0i64;
                    for _ in 0..unsaved {
                        raw = raw.saturating_add(roller.roll(damage)?);
                    }
                    changes.push(damage_change(target, raw, damage_type));
                }
            }
            ActionEffect::Apply { modifier } => {
                changes.push(StateChange::ApplyModifier {
                    target: target.id.clone(),
                    modifier: modifier.clone(),
                });
            }
        }

        tracing::trace!(%action, changes = changes.len(), "action resolved");
        Ok(RoundDelta {
            actor: Some(actor_id.clone()),
            action: template.name.clone(),
            changes,
            rolls: roller.into_rolls(),
        })
    }

    /// End-of-round upkeep: every timed modifier counts down by one and
    /// those reaching zero expire.
    pub fn upkeep(&self, view: &EncounterView<'_>) -> RoundDelta {
        let changes = view
            .combatants()
            .iter()
            .flat_map(|c| {
                c.active_modifiers.iter().filter_map(|m| {
                    let remaining = m.remaining_rounds?;
                    Some(if remaining <= 1 {
                        StateChange::ModifierExpired {
                            combatant: c.id.clone(),
                            name: m.name.clone(),
                        }
                    } else {
                        StateChange::ModifierTicked {
                            combatant: c.id.clone(),
                            name: m.name.clone(),
                            remaining: remaining - 1,
                        }
                    })
                })
            })
            .collect();
        RoundDelta {
            actor: None,
            action: "upkeep".to_string(),
            changes,
            rolls: Vec::new(),
        }
    }
}

fn damage_change(target: &CombatantState, raw: i64, damage_type: &DamageType) -> StateChange {
    StateChange::Damage {
        target: target.id.clone(),
        amount: target.mitigate(raw, damage_type),
        damage_type: damage_type.clone(),
    }
}

/// Roll `dice` d6s and count those at or above `need`, rerolling each
/// failure once when asked.
fn count_successes(
    roller: &mut Roller<'_, '_>,
    d6: &DiceExpression,
    dice: u32,
    need: u32,
    reroll_failures: bool,
) -> DiceResult<u32> {
    let need = i64::from(need);
    let mut successes = 0;
    for _ in 0..dice {
        let mut value = roller.roll(d6)?;
        if value < need && reroll_failures {
            value = roller.roll(d6)?;
        }
        if value >= need {
            successes += 1;
        }
    }
    Ok(successes)
}
