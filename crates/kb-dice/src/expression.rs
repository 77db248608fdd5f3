//! The dice expression model.
//!
//! An expression is `count` dice of `sides` faces followed by an ordered list
//! of modifiers. Dice-level modifiers (reroll, explode, keep) transform the
//! pool in the order given; arithmetic modifiers (add, multiply) fold over
//! the sum of kept dice in the order given. Advantage and disadvantage select
//! between two full evaluations and do not depend on their position.

use serde::{Deserialize, Serialize};

use crate::error::{DiceError, DiceResult};

/// Upper bound on dice in one expression, to keep a single roll cheap.
pub const MAX_DICE: u32 = 1_000;
/// Upper bound on faces per die.
pub const MAX_SIDES: u32 = 1_000_000;

/// A single step applied to a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    /// Add a flat amount to the running total.
    Add(i64),
    /// Multiply the running total.
    Multiply(i64),
    /// Redraw dice showing less than the threshold.
    RerollBelow(u32),
    /// Draw an extra die for every die showing at least the threshold.
    ExplodeOn(u32),
    /// Keep only the `k` highest dice.
    KeepHighest(u32),
    /// Keep only the `k` lowest dice.
    KeepLowest(u32),
    /// Roll twice, keep the higher total.
    Advantage,
    /// Roll twice, keep the lower total.
    Disadvantage,
}

impl Modifier {
    /// Returns true for modifiers that change the running total rather than
    /// the dice.
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Add(_) | Self::Multiply(_))
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add(n) if *n < 0 => write!(f, "-{}", n.unsigned_abs()),
            Self::Add(n) => write!(f, "+{n}"),
            Self::Multiply(n) => write!(f, "*{n}"),
            Self::RerollBelow(t) => write!(f, "r<{t}"),
            Self::ExplodeOn(t) => write!(f, "!{t}"),
            Self::KeepHighest(k) => write!(f, "kh{k}"),
            Self::KeepLowest(k) => write!(f, "kl{k}"),
            Self::Advantage => write!(f, "adv"),
            Self::Disadvantage => write!(f, "dis"),
        }
    }
}

/// Natural-roll thresholds that flag critical results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CritThresholds {
    /// A natural roll at or above this value is a critical success.
    pub success_at: Option<u32>,
    /// A natural roll at or below this value is a critical failure.
    pub failure_at: Option<u32>,
}

/// Which set an evaluation keeps when rolling twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetSelection {
    /// Roll once.
    Single,
    /// Roll twice, keep the higher total.
    Advantage,
    /// Roll twice, keep the lower total.
    Disadvantage,
}

/// An immutable, validated description of a roll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiceExpression {
    count: u32,
    sides: u32,
    modifiers: Vec<Modifier>,
    crit: CritThresholds,
}

impl DiceExpression {
    /// `count` dice with `sides` faces and no modifiers.
    pub fn new(count: u32, sides: u32) -> DiceResult<Self> {
        let expr = Self {
            count,
            sides,
            modifiers: Vec::new(),
            crit: CritThresholds::default(),
        };
        expr.validate()?;
        Ok(expr)
    }

    /// Append a modifier, rejecting it if it breaks an invariant.
    pub fn with_modifier(mut self, modifier: Modifier) -> DiceResult<Self> {
        self.modifiers.push(modifier);
        self.validate()?;
        Ok(self)
    }

    /// Append several modifiers in order.
    pub fn with_modifiers(
        self,
        modifiers: impl IntoIterator<Item = Modifier>,
    ) -> DiceResult<Self> {
        modifiers
            .into_iter()
            .try_fold(self, |expr, m| expr.with_modifier(m))
    }

    /// Flag natural rolls at or above `at` as critical successes.
    pub fn with_crit_success(mut self, at: u32) -> DiceResult<Self> {
        self.crit.success_at = Some(at);
        self.validate()?;
        Ok(self)
    }

    /// Flag natural rolls at or below `at` as critical failures.
    pub fn with_crit_failure(mut self, at: u32) -> DiceResult<Self> {
        self.crit.failure_at = Some(at);
        self.validate()?;
        Ok(self)
    }

    /// Number of primary dice.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Faces per die.
    pub fn sides(&self) -> u32 {
        self.sides
    }

    /// Modifiers in declared order.
    pub fn modifiers(&self) -> &[Modifier] {
        &self.modifiers
    }

    /// Critical thresholds.
    pub fn crit(&self) -> CritThresholds {
        self.crit
    }

    /// Canonical notation, which also serves as the expression's id in audit
    /// entries.
    pub fn notation(&self) -> String {
        self.to_string()
    }

    /// How many sets an evaluation rolls and which it keeps. Advantage and
    /// disadvantage together cancel out.
    pub fn selection(&self) -> SetSelection {
        let adv = self.modifiers.contains(&Modifier::Advantage);
        let dis = self.modifiers.contains(&Modifier::Disadvantage);
        match (adv, dis) {
            (true, false) => SetSelection::Advantage,
            (false, true) => SetSelection::Disadvantage,
            _ => SetSelection::Single,
        }
    }

    /// Check every structural invariant.
    pub fn validate(&self) -> DiceResult<()> {
        if self.count == 0 {
            return Err(invalid("dice count must be at least 1"));
        }
        if self.count > MAX_DICE {
            return Err(invalid(format!("dice count must be at most {MAX_DICE}")));
        }
        if self.sides < 2 {
            return Err(invalid("dice must have at least 2 sides"));
        }
        if self.sides > MAX_SIDES {
            return Err(invalid(format!("dice must have at most {MAX_SIDES} sides")));
        }
        for modifier in &self.modifiers {
            self.validate_modifier(modifier)?;
        }
        self.validate_crit()
    }

    fn validate_modifier(&self, modifier: &Modifier) -> DiceResult<()> {
        match *modifier {
            Modifier::RerollBelow(t) if !(2..=self.sides).contains(&t) => Err(invalid(format!(
                "reroll threshold {t} must be between 2 and {}",
                self.sides
            ))),
            Modifier::ExplodeOn(t) if !(2..=self.sides).contains(&t) => Err(invalid(format!(
                "explode threshold {t} must be between 2 and {}",
                self.sides
            ))),
            Modifier::KeepHighest(k) | Modifier::KeepLowest(k)
                if !(1..=self.count).contains(&k) =>
            {
                Err(invalid(format!(
                    "keep {k} must be between 1 and the dice count {}",
                    self.count
                )))
            }
            _ => Ok(()),
        }
    }

    fn validate_crit(&self) -> DiceResult<()> {
        for at in [self.crit.success_at, self.crit.failure_at].into_iter().flatten() {
            if !(1..=self.sides).contains(&at) {
                return Err(invalid(format!(
                    "critical threshold {at} must be between 1 and {}",
                    self.sides
                )));
            }
        }
        match (self.crit.success_at, self.crit.failure_at) {
            (Some(success), Some(failure)) if success <= failure => Err(invalid(format!(
                "critical success threshold {success} must exceed critical failure threshold {failure}"
            ))),
            _ => Ok(()),
        }
    }
}

fn invalid(message: impl Into<String>) -> DiceError {
    DiceError::InvalidExpression(message.into())
}

impl std::fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        for modifier in &self.modifiers {
            write!(f, "{modifier}")?;
        }
        if let Some(at) = self.crit.success_at {
            write!(f, "cs>={at}")?;
        }
        if let Some(at) = self.crit.failure_at {
            write!(f, "cf<={at}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::notation::parse(s)
    }
}

impl TryFrom<String> for DiceExpression {
    type Error = DiceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        crate::notation::parse(&value)
    }
}

impl From<DiceExpression> for String {
    fn from(expr: DiceExpression) -> Self {
        expr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_count() {
        assert!(DiceExpression::new(0, 6).is_err());
    }

    #[test]
    fn rejects_one_sided_die() {
        assert!(DiceExpression::new(1, 1).is_err());
        assert!(DiceExpression::new(1, 2).is_ok());
    }

    #[test]
    fn keep_must_fit_count() {
        let base = DiceExpression::new(4, 6).unwrap();
        assert!(base.clone().with_modifier(Modifier::KeepHighest(3)).is_ok());
        assert!(base.clone().with_modifier(Modifier::KeepHighest(4)).is_ok());
        assert!(base.clone().with_modifier(Modifier::KeepHighest(5)).is_err());
        assert!(base.with_modifier(Modifier::KeepLowest(0)).is_err());
    }

    #[test]
    fn thresholds_must_fit_die() {
        let d6 = DiceExpression::new(1, 6).unwrap();
        assert!(d6.clone().with_modifier(Modifier::ExplodeOn(1)).is_err());
        assert!(d6.clone().with_modifier(Modifier::ExplodeOn(7)).is_err());
        assert!(d6.clone().with_modifier(Modifier::ExplodeOn(6)).is_ok());
        assert!(d6.clone().with_modifier(Modifier::RerollBelow(1)).is_err());
        assert!(d6.with_modifier(Modifier::RerollBelow(3)).is_ok());
    }

    #[test]
    fn crit_thresholds_validated() {
        let d20 = DiceExpression::new(1, 20).unwrap();
        assert!(d20.clone().with_crit_success(21).is_err());
        assert!(d20.clone().with_crit_failure(0).is_err());
        let ok = d20.with_crit_success(19).unwrap().with_crit_failure(1).unwrap();
        assert_eq!(ok.crit().success_at, Some(19));
        assert!(ok.with_crit_failure(19).is_err());
    }

    #[test]
    fn selection_cancels() {
        let adv = DiceExpression::new(1, 20)
            .unwrap()
            .with_modifier(Modifier::Advantage)
            .unwrap();
        assert_eq!(adv.selection(), SetSelection::Advantage);
        let both = adv.with_modifier(Modifier::Disadvantage).unwrap();
        assert_eq!(both.selection(), SetSelection::Single);
    }

    #[test]
    fn display_canonical() {
        let expr = DiceExpression::new(4, 6)
            .unwrap()
            .with_modifiers([
                Modifier::RerollBelow(2),
                Modifier::KeepHighest(3),
                Modifier::Add(-1),
                Modifier::Multiply(2),
            ])
            .unwrap();
        assert_eq!(expr.to_string(), "4d6r<2kh3-1*2");

        let attack = DiceExpression::new(1, 20)
            .unwrap()
            .with_modifiers([Modifier::Advantage, Modifier::Add(5)])
            .unwrap()
            .with_crit_success(19)
            .unwrap()
            .with_crit_failure(1)
            .unwrap();
        assert_eq!(attack.notation(), "1d20adv+5cs>=19cf<=1");
    }

    #[test]
    fn add_min_value_displays() {
        let expr = DiceExpression::new(1, 6)
            .unwrap()
            .with_modifier(Modifier::Add(i64::MIN))
            .unwrap();
        assert_eq!(expr.to_string(), "1d6-9223372036854775808");
    }

    #[test]
    fn serde_as_notation() {
        let expr: DiceExpression = serde_json::from_str("\"2d6+3\"").unwrap();
        assert_eq!(expr.count(), 2);
        assert_eq!(expr.modifiers(), &[Modifier::Add(3)]);
        assert_eq!(serde_json::to_string(&expr).unwrap(), "\"2d6+3\"");
        assert!(serde_json::from_str::<DiceExpression>("\"0d6\"").is_err());
    }
}
