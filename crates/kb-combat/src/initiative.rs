//! Turn order.

use std::cmp::Reverse;

use kb_dice::{AuditTrail, DiceError, DiceExpression, Evaluator};
use kb_entropy::EntropySource;
use serde::{Deserialize, Serialize};

use crate::combatant::CombatantId;
use crate::encounter::EncounterState;
use crate::error::CombatResult;
use crate::resolver::Roller;

/// How turn order is decided at the start of an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitiativeRule {
    /// Every combatant rolls the expression and adds its initiative bonus.
    /// Higher goes first; ties go to the higher bonus, then to a fresh
    /// uniform draw made for every combatant after all rolls.
    Rolled(DiceExpression),
    /// Higher initiative bonus goes first; ties keep setup order.
    Fixed,
}

impl Default for InitiativeRule {
    fn default() -> Self {
        match DiceExpression::new(1, 20) {
            Ok(d20) => Self::Rolled(d20),
            Err(_) => Self::Fixed,
        }
    }
}

impl InitiativeRule {
    /// Decide the turn order for `state`.
    pub fn order(
        &self,
        state: &EncounterState,
        evaluator: &Evaluator,
        source: &mut dyn EntropySource,
        trail: Option<&mut AuditTrail>,
    ) -> CombatResult<Vec<CombatantId>> {
        let combatants = state.combatants();
        match self {
            Self::Fixed => {
                let mut order: Vec<_> = combatants.iter().collect();
                order.sort_by_key(|c| Reverse(c.initiative_bonus));
                Ok(order.into_iter().map(|c| c.id.clone()).collect())
            }
            Self::Rolled(expr) => {
                let mut roller = Roller::new(evaluator, source, trail);
                let mut scores = Vec::with_capacity(combatants.len());
                for c in combatants {
                    let total = roller.roll(expr)?.saturating_add(c.initiative_bonus);
                    scores.push((total, c.initiative_bonus));
                }
                let mut keyed = Vec::with_capacity(combatants.len());
                for (c, (total, bonus)) in combatants.iter().zip(scores) {
                    let tiebreak = roller.source().next_u64().map_err(DiceError::from)?;
                    keyed.push((Reverse((total, bonus, tiebreak)), c.id.clone()));
                }
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(keyed.into_iter().map(|(_, id)| id).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combatant::CombatantState;
    use kb_dice::parse;
    use kb_entropy::DeterministicSource;

    fn roster() -> EncounterState {
        EncounterState::new(vec![
            CombatantState::new("slow", "a", 5).with_initiative_bonus(-1),
            CombatantState::new("quick", "b", 5).with_initiative_bonus(4),
            CombatantState::new("plain", "a", 5),
        ])
        .unwrap()
    }

    fn ids(order: &[CombatantId]) -> Vec<&str> {
        order.iter().map(CombatantId::as_str).collect()
    }

    #[test]
    fn fixed_sorts_by_bonus() {
        let order = InitiativeRule::Fixed
            .order(&roster(), &Evaluator::default(), &mut DeterministicSource::new(1), None)
            .unwrap();
        assert_eq!(ids(&order), vec!["quick", "plain", "slow"]);
    }

    #[test]
    fn rolled_uses_totals() {
        // Seed 42 rolls 14, 19, 9 on a d20: 13, 23 and 9.
        let mut trail = AuditTrail::new();
        let order = InitiativeRule::default()
            .order(
                &roster(),
                &Evaluator::default(),
                &mut DeterministicSource::new(42),
                Some(&mut trail),
            )
            .unwrap();
        assert_eq!(ids(&order), vec!["quick", "slow", "plain"]);
        assert_eq!(trail.rolls().count(), 3);
    }

    #[test]
    fn constant_rolls_follow_bonus() {
        // Every die shows 1, so only the bonus separates the totals.
        let rule = InitiativeRule::Rolled(parse("1d2").unwrap());
        let state = roster();
        let order = rule
            .order(&state, &Evaluator::default(), &mut Ones, None)
            .unwrap();
        assert_eq!(ids(&order), vec!["quick", "plain", "slow"]);
    }

    #[test]
    fn rolled_is_reproducible() {
        let state = roster();
        let run = |seed| {
            InitiativeRule::default()
                .order(&state, &Evaluator::default(), &mut DeterministicSource::new(seed), None)
                .unwrap()
        };
        assert_eq!(run(7), run(7));
    }

    struct Ones;

    impl EntropySource for Ones {
        fn kind(&self) -> kb_entropy::EntropyKind {
            kb_entropy::EntropyKind::Deterministic
        }

        fn next_u64(&mut self) -> kb_entropy::EntropyResult<u64> {
            Ok(0)
        }

        fn last_proof(&self) -> Option<String> {
            None
        }
    }
}
