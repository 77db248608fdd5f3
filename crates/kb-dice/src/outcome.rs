//! Roll outcomes.

use serde::{Deserialize, Serialize};

/// Where a die in the pool came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DieOrigin {
    /// One of the expression's `count` dice.
    Primary,
    /// Added by an explosion.
    Explosion,
}

/// One die in the evaluated pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRoll {
    /// The value the die ended on.
    pub value: u32,
    /// The value first drawn, before any reroll.
    pub natural: u32,
    /// Where the die came from.
    pub origin: DieOrigin,
    /// How many times the die was redrawn.
    pub rerolls: u32,
    /// Whether a keep modifier discarded the die.
    pub dropped: bool,
}

impl DieRoll {
    pub(crate) fn drawn(value: u32, origin: DieOrigin) -> Self {
        Self {
            value,
            natural: value,
            origin,
            rerolls: 0,
            dropped: false,
        }
    }
}

/// Which of the rolled sets an outcome reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetChoice {
    /// Only one set was rolled.
    Single,
    /// The first of two sets was kept.
    First,
    /// The second of two sets was kept.
    Second,
}

/// Why a roll stopped short of its natural conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "limit")]
pub enum CapReason {
    /// A die exploded more times in a row than allowed.
    ExplosionDepth(u32),
    /// A die stayed below its reroll threshold after the allowed rerolls.
    RerollLimit(u32),
    /// Rerolls and explosions used up the evaluation's draw budget.
    DrawLimit(u32),
}

impl std::fmt::Display for CapReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExplosionDepth(limit) => write!(f, "explosion depth {limit} reached"),
            Self::RerollLimit(limit) => write!(f, "reroll limit {limit} reached"),
            Self::DrawLimit(limit) => write!(f, "draw limit {limit} reached"),
        }
    }
}

/// The result of evaluating one expression once.
///
/// Outcomes are built by the evaluator and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollOutcome {
    expression: String,
    raw: Vec<u32>,
    dice: Vec<DieRoll>,
    total: i64,
    natural: u32,
    critical_success: bool,
    critical_failure: bool,
    capped: Option<CapReason>,
    set: SetChoice,
    other_total: Option<i64>,
}

impl RollOutcome {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        expression: String,
        raw: Vec<u32>,
        dice: Vec<DieRoll>,
        total: i64,
        natural: u32,
        critical: (bool, bool),
        capped: Option<CapReason>,
        set: SetChoice,
        other_total: Option<i64>,
    ) -> Self {
        Self {
            expression,
            raw,
            dice,
            total,
            natural,
            critical_success: critical.0,
            critical_failure: critical.1,
            capped,
            set,
            other_total,
        }
    }

    /// Notation of the evaluated expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Every value drawn, in draw order, including rerolled-away values,
    /// explosions and the discarded advantage set.
    pub fn raw(&self) -> &[u32] {
        &self.raw
    }

    /// The pool of the reported set, dropped dice included.
    pub fn dice(&self) -> &[DieRoll] {
        &self.dice
    }

    /// Values of the dice that count toward the total.
    pub fn kept_values(&self) -> Vec<u32> {
        self.dice
            .iter()
            .filter(|d| !d.dropped)
            .map(|d| d.value)
            .collect()
    }

    /// The final total after every modifier.
    pub fn total(&self) -> i64 {
        self.total
    }

    /// The natural value of the first primary die of the reported set.
    pub fn natural(&self) -> u32 {
        self.natural
    }

    /// Whether the natural roll met the critical success threshold.
    pub fn is_critical_success(&self) -> bool {
        self.critical_success
    }

    /// Whether the natural roll met the critical failure threshold.
    pub fn is_critical_failure(&self) -> bool {
        self.critical_failure
    }

    /// Set when a reroll or explosion bound cut the roll short.
    pub fn capped(&self) -> Option<CapReason> {
        self.capped
    }

    /// Which set was reported.
    pub fn set(&self) -> SetChoice {
        self.set
    }

    /// Total of the set that was not kept, for advantage and disadvantage.
    pub fn other_total(&self) -> Option<i64> {
        self.other_total
    }
}

impl std::fmt::Display for RollOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let values: Vec<String> = self
            .dice
            .iter()
            .map(|d| {
                if d.dropped {
                    format!("({})", d.value)
                } else {
                    d.value.to_string()
                }
            })
            .collect();
        write!(
            f,
            "{} [{}] = {}",
            self.expression,
            values.join(", "),
            self.total
        )
    }
}

/// Several evaluations of the same expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Each evaluation, in order.
    pub outcomes: Vec<RollOutcome>,
    /// Sum of all totals.
    pub total: i64,
    /// Mean total, or 0 for an empty batch.
    pub mean: f64,
}

impl BatchOutcome {
    pub(crate) fn from_outcomes(outcomes: Vec<RollOutcome>) -> Self {
        let total = outcomes
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.total()));
        let mean = if outcomes.is_empty() {
            0.0
        } else {
            total as f64 / outcomes.len() as f64
        };
        Self {
            outcomes,
            total,
            mean,
        }
    }

    /// Totals of every evaluation.
    pub fn totals(&self) -> Vec<i64> {
        self.outcomes.iter().map(RollOutcome::total).collect()
    }
}
