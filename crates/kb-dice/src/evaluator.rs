//! Resolution of dice expressions.
//!
//! Evaluation draws the primary dice, then walks the modifiers in order:
//!
//! - `RerollBelow(t)`: every kept primary die below `t` is redrawn, once by
//!   default or up to a bound with [`RerollPolicy::Repeat`]. Dice are
//!   processed left to right and each finishes its rerolls before the next.
//! - `ExplodeOn(t)`: every kept die at or above `t` triggers one more die,
//!   and each new die that also meets `t` triggers another, up to
//!   `max_explosion_depth` per chain. Chains are drawn to completion one die
//!   at a time and the new dice are appended to the pool.
//! - Rerolls and explosions together may add at most `max_total_draws`
//!   draws beyond the primary dice; past that the roll is capped, however
//!   many explode modifiers are stacked.
//! - `KeepHighest(k)` / `KeepLowest(k)`: the pool is stably sorted and all
//!   but `k` dice are dropped; among equal values the earlier die is kept.
//!
//! The kept dice are summed and the arithmetic modifiers are folded over
//! the sum in order with saturating integer arithmetic. With advantage or
//! disadvantage the whole pipeline runs twice, the first set entirely before
//! the second, and ties keep the first set.

use kb_entropy::EntropySource;
use serde::{Deserialize, Serialize};

use crate::audit::AuditTrail;
use crate::error::{DiceError, DiceResult};
use crate::expression::{DiceExpression, Modifier, SetSelection};
use crate::outcome::{BatchOutcome, CapReason, DieOrigin, DieRoll, RollOutcome, SetChoice};

/// How many times a die below a reroll threshold may be redrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum RerollPolicy {
    /// Redraw once; the new value stands even if it is still low.
    Once,
    /// Redraw until the die meets the threshold or `max` redraws are spent.
    Repeat {
        /// Redraws allowed per die.
        max: u32,
    },
}

impl RerollPolicy {
    /// Redraws allowed per die.
    pub fn limit(&self) -> u32 {
        match self {
            Self::Once => 1,
            Self::Repeat { max } => *max,
        }
    }
}

/// Evaluation bounds and rule switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Longest chain of explosions a single die may start.
    pub max_explosion_depth: u32,
    /// Reroll behaviour.
    pub reroll: RerollPolicy,
    /// Whether dice added by explosions are subject to later rerolls.
    pub reroll_explosions: bool,
    /// Draws allowed per evaluation on top of the primary dice.
    pub max_total_draws: u32,
    /// Fail with an error instead of capping when a bound is hit.
    pub strict_limits: bool,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_explosion_depth: 32,
            reroll: RerollPolicy::Once,
            reroll_explosions: false,
            max_total_draws: 10_000,
            strict_limits: false,
        }
    }
}

impl EvaluatorConfig {
    /// Set the explosion depth bound.
    pub fn with_max_explosion_depth(mut self, depth: u32) -> Self {
        self.max_explosion_depth = depth;
        self
    }

    /// Set the reroll policy.
    pub fn with_reroll(mut self, reroll: RerollPolicy) -> Self {
        self.reroll = reroll;
        self
    }

    /// Allow later rerolls to redraw explosion dice.
    pub fn with_reroll_explosions(mut self, enabled: bool) -> Self {
        self.reroll_explosions = enabled;
        self
    }

    /// Set the bound on extra draws per evaluation.
    pub fn with_max_total_draws(mut self, draws: u32) -> Self {
        self.max_total_draws = draws;
        self
    }

    /// Turn bound violations into errors.
    pub fn with_strict_limits(mut self, strict: bool) -> Self {
        self.strict_limits = strict;
        self
    }
}

/// Draws made during one evaluation.
struct DrawLog {
    values: Vec<u32>,
    proofs: Option<Vec<String>>,
    extra: u32,
}

impl DrawLog {
    fn new(with_proofs: bool) -> Self {
        Self {
            values: Vec::new(),
            proofs: with_proofs.then(Vec::new),
            extra: 0,
        }
    }

    /// A reroll or explosion draw, or `None` once `budget` is spent.
    fn draw_extra<S: EntropySource + ?Sized>(
        &mut self,
        source: &mut S,
        sides: u32,
        budget: u32,
    ) -> DiceResult<Option<u32>> {
        if self.extra >= budget {
            return Ok(None);
        }
        self.extra += 1;
        self.draw(source, sides).map(Some)
    }

    fn draw<S: EntropySource + ?Sized>(&mut self, source: &mut S, sides: u32) -> DiceResult<u32> {
        let value = source.draw_die(sides)?;
        self.values.push(value);
        if let Some(proofs) = self.proofs.as_mut() {
            proofs.extend(source.last_proof());
        }
        Ok(value)
    }
}

/// One pass of the pipeline.
struct SetResult {
    dice: Vec<DieRoll>,
    total: i64,
    capped: Option<CapReason>,
}

/// Resolves [`DiceExpression`]s against an entropy source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluator {
    config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator with the given bounds.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate `expr` once.
    pub fn evaluate<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        source: &mut S,
    ) -> DiceResult<RollOutcome> {
        let mut log = DrawLog::new(false);
        self.run(expr, source, &mut log)
    }

    /// Evaluate `expr` once and append the draws and result to `trail`.
    ///
    /// The entry is appended even when evaluation fails part-way, so draws
    /// that were consumed are never lost from the audit.
    pub fn evaluate_audited<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        source: &mut S,
        trail: &mut AuditTrail,
    ) -> DiceResult<RollOutcome> {
        let mut log = DrawLog::new(true);
        let result = self.run(expr, source, &mut log);
        let recorded = match &result {
            Ok(outcome) => Ok((outcome.total(), outcome.capped())),
            Err(err) => Err(err.to_string()),
        };
        trail.record_roll(
            expr.notation(),
            source.kind(),
            log.values,
            log.proofs.unwrap_or_default(),
            recorded,
        );
        result
    }

    /// Evaluate `expr` `times` times in a row.
    pub fn evaluate_many<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        times: usize,
        source: &mut S,
    ) -> DiceResult<BatchOutcome> {
        let outcomes = (0..times)
            .map(|_| self.evaluate(expr, source))
            .collect::<DiceResult<Vec<_>>>()?;
        Ok(BatchOutcome::from_outcomes(outcomes))
    }

    fn run<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        source: &mut S,
        log: &mut DrawLog,
    ) -> DiceResult<RollOutcome> {
        let first = self.roll_set(expr, source, log)?;
        let (kept, set, other_total) = match expr.selection() {
            SetSelection::Single => (first, SetChoice::Single, None),
            SetSelection::Advantage => {
                let second = self.roll_set(expr, source, log)?;
                if second.total > first.total {
                    (second, SetChoice::Second, Some(first.total))
                } else {
                    (first, SetChoice::First, Some(second.total))
                }
            }
            SetSelection::Disadvantage => {
                let second = self.roll_set(expr, source, log)?;
                if second.total < first.total {
                    (second, SetChoice::Second, Some(first.total))
                } else {
                    (first, SetChoice::First, Some(second.total))
                }
            }
        };

        let natural = kept.dice.first().map_or(0, |d| d.natural);
        let crit = expr.crit();
        let critical = (
            crit.success_at.is_some_and(|at| natural >= at),
            crit.failure_at.is_some_and(|at| natural <= at),
        );
        if let Some(cap) = kept.capped {
            tracing::debug!(expression = %expr, %cap, "roll capped");
        }

        Ok(RollOutcome::new(
            expr.notation(),
            log.values.clone(),
            kept.dice,
            kept.total,
            natural,
            critical,
            kept.capped,
            set,
            other_total,
        ))
    }

    fn roll_set<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        source: &mut S,
        log: &mut DrawLog,
    ) -> DiceResult<SetResult> {
        let sides = expr.sides();
        let mut dice = Vec::with_capacity(expr.count() as usize);
        for _ in 0..expr.count() {
            let value = log.draw(source, sides)?;
            dice.push(DieRoll::drawn(value, DieOrigin::Primary));
        }

        let mut capped = None;
        for modifier in expr.modifiers() {
            let cap = match *modifier {
                Modifier::RerollBelow(threshold) => {
                    self.reroll(expr, &mut dice, threshold, source, log)?
                }
                Modifier::ExplodeOn(threshold) => {
                    self.explode(expr, &mut dice, threshold, source, log)?
                }
                Modifier::KeepHighest(k) => {
                    keep(&mut dice, k as usize, true);
                    None
                }
                Modifier::KeepLowest(k) => {
                    keep(&mut dice, k as usize, false);
                    None
                }
                Modifier::Add(_)
                | Modifier::Multiply(_)
                | Modifier::Advantage
                | Modifier::Disadvantage => None,
            };
            if capped.is_none() {
                capped = cap;
            }
        }

        let mut total: i64 = dice
            .iter()
            .filter(|d| !d.dropped)
            .map(|d| i64::from(d.value))
            .sum();
        for modifier in expr.modifiers() {
            match *modifier {
                Modifier::Add(n) => total = total.saturating_add(n),
                Modifier::Multiply(n) => total = total.saturating_mul(n),
                _ => {}
            }
        }

        Ok(SetResult {
            dice,
            total,
            capped,
        })
    }

    fn reroll<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        dice: &mut [DieRoll],
        threshold: u32,
        source: &mut S,
        log: &mut DrawLog,
    ) -> DiceResult<Option<CapReason>> {
        let limit = self.config.reroll.limit();
        let bounded = matches!(self.config.reroll, RerollPolicy::Repeat { .. });
        let mut cap = None;
        let eligible = dice.iter_mut().filter(|d| {
            !d.dropped && (d.origin == DieOrigin::Primary || self.config.reroll_explosions)
        });
        for die in eligible {
            let mut attempts = 0;
            while die.value < threshold && attempts < limit {
                let Some(value) = log.draw_extra(source, expr.sides(), self.config.max_total_draws)?
                else {
                    return self.out_of_draws(expr).map(Some);
                };
                die.value = value;
                die.rerolls += 1;
                attempts += 1;
            }
            if bounded && die.value < threshold {
                if self.config.strict_limits {
                    return Err(DiceError::RerollLimitExceeded {
                        expression: expr.notation(),
                        limit,
                    });
                }
                cap = Some(CapReason::RerollLimit(limit));
            }
        }
        Ok(cap)
    }

    fn explode<S: EntropySource + ?Sized>(
        &self,
        expr: &DiceExpression,
        dice: &mut Vec<DieRoll>,
        threshold: u32,
        source: &mut S,
        log: &mut DrawLog,
    ) -> DiceResult<Option<CapReason>> {
        let limit = self.config.max_explosion_depth;
        let mut added = Vec::new();
        let mut cap = None;
        for die in dice.iter().filter(|d| !d.dropped) {
            let mut last = die.value;
            let mut depth = 0;
            while last >= threshold {
                if depth == limit {
                    if self.config.strict_limits {
                        return Err(DiceError::ExplosionLimitExceeded {
                            expression: expr.notation(),
                            limit,
                        });
                    }
                    cap = Some(CapReason::ExplosionDepth(limit));
                    break;
                }
                let Some(value) = log.draw_extra(source, expr.sides(), self.config.max_total_draws)?
                else {
                    let spent = self.out_of_draws(expr)?;
                    dice.extend(added);
                    return Ok(Some(spent));
                };
                last = value;
                added.push(DieRoll::drawn(last, DieOrigin::Explosion));
                depth += 1;
            }
        }
        dice.extend(added);
        Ok(cap)
    }

    fn out_of_draws(&self, expr: &DiceExpression) -> DiceResult<CapReason> {
        let limit = self.config.max_total_draws;
        if self.config.strict_limits {
            return Err(DiceError::DrawLimitExceeded {
                expression: expr.notation(),
                limit,
            });
        }
        Ok(CapReason::DrawLimit(limit))
    }
}

/// Drop all but `k` of the kept dice.
fn keep(dice: &mut [DieRoll], k: usize, highest: bool) {
    let mut active: Vec<usize> = (0..dice.len()).filter(|&i| !dice[i].dropped).collect();
    if active.len() <= k {
        return;
    }
    active.sort_by(|&a, &b| {
        let ord = dice[a].value.cmp(&dice[b].value);
        if highest { ord.reverse() } else { ord }
    });
    for &i in &active[k..] {
        dice[i].dropped = true;
    }
}
