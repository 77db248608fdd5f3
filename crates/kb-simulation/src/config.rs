use kb_combat::{InitiativeRule, Side};
use kb_dice::EvaluatorConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

/// The per-trial quantity summarized by a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", content = "side", rename_all = "snake_case")]
pub enum Metric {
    /// Rounds played until the encounter ended.
    #[default]
    RoundsToResolution,
    /// Damage dealt by everyone, after mitigation.
    TotalDamage,
    /// Damage dealt by one side, after mitigation.
    DamageDealtBy(Side),
    /// Combatants of one side still standing at the end.
    SurvivorsOn(Side),
    /// Summed current health of one side at the end.
    RemainingHealth(Side),
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundsToResolution => write!(f, "rounds"),
            Self::TotalDamage => write!(f, "damage"),
            Self::DamageDealtBy(side) => write!(f, "damage:{side}"),
            Self::SurvivorsOn(side) => write!(f, "survivors:{side}"),
            Self::RemainingHealth(side) => write!(f, "health:{side}"),
        }
    }
}

impl std::str::FromStr for Metric {
    type Err = SimError;

    /// Parses `rounds`, `damage`, `damage:<side>`, `survivors:<side>` and
    /// `health:<side>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, side) = match s.split_once(':') {
            Some((name, side)) if !side.is_empty() => (name, Some(Side::new(side))),
            Some(_) => return Err(SimError::Configuration(format!("metric {s:?} is missing a side"))),
            None => (s, None),
        };
        match (name, side) {
            ("rounds", None) => Ok(Self::RoundsToResolution),
            ("damage", None) => Ok(Self::TotalDamage),
            ("damage", Some(side)) => Ok(Self::DamageDealtBy(side)),
            ("survivors", Some(side)) => Ok(Self::SurvivorsOn(side)),
            ("health", Some(side)) => Ok(Self::RemainingHealth(side)),
            _ => Err(SimError::Configuration(format!("unknown metric {s:?}"))),
        }
    }
}

/// Which per-trial results are kept in the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Retention {
    /// Statistics only.
    #[default]
    None,
    /// Every completed trial, without its audit trail.
    Trials,
    /// Every completed trial with its full audit trail.
    TrialsWithAudit,
}

impl Retention {
    /// Whether trials are kept at all.
    pub fn keeps_trials(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether audit trails are kept.
    pub fn keeps_audit(self) -> bool {
        matches!(self, Self::TrialsWithAudit)
    }
}

/// Requested precision for the metric mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTarget {
    /// Largest acceptable half-width of the confidence interval.
    pub half_width: f64,
    /// Standard normal quantile; 1.96 for 95%.
    #[serde(default = "default_z")]
    pub z: f64,
}

fn default_z() -> f64 {
    1.96
}

fn positive(x: f64) -> bool {
    x > 0.0 && x.is_finite()
}

impl ConfidenceTarget {
    /// A 95% interval no wider than `half_width` either side of the mean.
    pub fn new(half_width: f64) -> Self {
        Self {
            half_width,
            z: default_z(),
        }
    }

    /// Use a different confidence level.
    pub fn with_z(mut self, z: f64) -> Self {
        self.z = z;
        self
    }
}

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Number of trials to run.
    pub trial_count: u64,
    /// Run-level seed; every trial's entropy derives from it.
    pub seed: u64,
    /// Rounds after which a trial ends as `round_limit_exceeded`.
    pub max_rounds: u32,
    /// How turn order is decided.
    pub initiative: InitiativeRule,
    /// The summarized per-trial quantity.
    pub metric: Metric,
    /// Optional precision target; missing it adds a warning.
    pub confidence: Option<ConfidenceTarget>,
    /// Which trial results are kept.
    pub retention: Retention,
    /// Worker threads. 0 = available parallelism.
    pub workers: usize,
    /// Largest tolerated fraction of failed trials.
    pub failure_threshold: f64,
    /// Number of metric values held for percentiles. Runs up to this size
    /// get exact percentiles.
    pub sample_capacity: usize,
    /// Dice evaluation bounds.
    pub evaluator: EvaluatorConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            trial_count: 1000,
            seed: 42,
            max_rounds: 100,
            initiative: InitiativeRule::default(),
            metric: Metric::default(),
            confidence: None,
            retention: Retention::default(),
            workers: 0,
            failure_threshold: 0.05,
            sample_capacity: 4096,
            evaluator: EvaluatorConfig::default(),
        }
    }
}

impl SimConfig {
    /// Set the number of trials.
    pub fn with_trial_count(mut self, trials: u64) -> Self {
        self.trial_count = trials;
        self
    }

    /// Set the run-level seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the round cap.
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Set the initiative rule.
    pub fn with_initiative(mut self, initiative: InitiativeRule) -> Self {
        self.initiative = initiative;
        self
    }

    /// Set the summarized metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set a precision target.
    pub fn with_confidence(mut self, target: ConfidenceTarget) -> Self {
        self.confidence = Some(target);
        self
    }

    /// Set trial retention.
    pub fn with_retention(mut self, retention: Retention) -> Self {
        self.retention = retention;
        self
    }

    /// Set the number of worker threads (0 = available parallelism).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the tolerated failure fraction.
    pub fn with_failure_threshold(mut self, threshold: f64) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set the percentile sample size.
    pub fn with_sample_capacity(mut self, capacity: usize) -> Self {
        self.sample_capacity = capacity;
        self
    }

    /// Set the evaluator configuration.
    pub fn with_evaluator(mut self, evaluator: EvaluatorConfig) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Reject configurations that cannot run. Nothing is simulated until
    /// this passes.
    pub fn validate(&self) -> SimResult<()> {
        if self.trial_count == 0 {
            return Err(SimError::InsufficientTrials);
        }
        if self.max_rounds == 0 {
            return Err(SimError::Configuration("max_rounds must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.failure_threshold) {
            return Err(SimError::Configuration(format!(
                "failure_threshold must be within 0..=1, got {}",
                self.failure_threshold
            )));
        }
        if self.sample_capacity == 0 {
            return Err(SimError::Configuration("sample_capacity must be at least 1".into()));
        }
        if let Some(target) = &self.confidence {
            if !positive(target.half_width) {
                return Err(SimError::Configuration(format!(
                    "confidence half_width must be positive, got {}",
                    target.half_width
                )));
            }
            if !positive(target.z) {
                return Err(SimError::Configuration(format!(
                    "confidence z must be positive, got {}",
                    target.z
                )));
            }
        }
        Ok(())
    }

    /// Worker threads to start for `blocks` blocks of work.
    pub(crate) fn worker_count(&self, blocks: u64) -> usize {
        let wanted = if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.workers
        };
        let blocks = usize::try_from(blocks).unwrap_or(usize::MAX);
        wanted.min(blocks).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn config_default_values() {
        let config = SimConfig::default();
        assert_eq!(config.trial_count, 1000);
        assert_eq!(config.seed, 42);
        assert_eq!(config.max_rounds, 100);
        assert_eq!(config.metric, Metric::RoundsToResolution);
        assert_eq!(config.retention, Retention::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_builder_chain() {
        let config = SimConfig::default()
            .with_trial_count(50)
            .with_seed(7)
            .with_max_rounds(12)
            .with_workers(3)
            .with_metric(Metric::TotalDamage)
            .with_retention(Retention::Trials);
        assert_eq!(config.trial_count, 50);
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_rounds, 12);
        assert_eq!(config.workers, 3);
        assert_eq!(config.metric, Metric::TotalDamage);
        assert!(config.retention.keeps_trials());
        assert!(!config.retention.keeps_audit());
    }

    #[test]
    fn zero_trials_is_insufficient() {
        let err = SimConfig::default().with_trial_count(0).validate().unwrap_err();
        assert!(matches!(err, SimError::InsufficientTrials));
    }

    #[test]
    fn other_problems_are_configuration_errors() {
        let bad = [
            SimConfig::default().with_max_rounds(0),
            SimConfig::default().with_failure_threshold(1.5),
            SimConfig::default().with_failure_threshold(f64::NAN),
            SimConfig::default().with_sample_capacity(0),
            SimConfig::default().with_confidence(ConfidenceTarget::new(0.0)),
            SimConfig::default().with_confidence(ConfidenceTarget::new(0.1).with_z(-1.0)),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(SimError::Configuration(_))));
        }
    }

    #[test]
    fn worker_count_is_bounded_by_blocks() {
        let config = SimConfig::default().with_workers(8);
        assert_eq!(config.worker_count(3), 3);
        assert_eq!(config.worker_count(20), 8);
        assert_eq!(SimConfig::default().worker_count(1), 1);
    }

    #[test]
    fn metric_names() {
        for name in ["rounds", "damage", "damage:red", "survivors:blue", "health:red"] {
            let metric: Metric = name.parse().unwrap();
            assert_eq!(metric.to_string(), name);
        }
        assert!("survivors".parse::<Metric>().is_err());
        assert!("damage:".parse::<Metric>().is_err());
        assert!("luck".parse::<Metric>().is_err());
    }

    #[test]
    fn config_from_partial_json() {
        let json = r#"{"trial_count": 200, "metric": {"metric": "survivors_on", "side": "red"},
                       "initiative": "fixed", "confidence": {"half_width": 0.5}}"#;
        let config: SimConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.trial_count, 200);
        assert_eq!(config.seed, 42);
        assert_eq!(config.metric, Metric::SurvivorsOn(Side::new("red")));
        assert_eq!(config.initiative, InitiativeRule::Fixed);
        assert_eq!(config.confidence.map(|c| c.z), Some(1.96));
    }

    proptest! {
        #[test]
        fn only_zero_trials_is_insufficient(
            trials in prop_oneof![Just(0u64), 1u64..10, any::<u64>()],
            max_rounds in 0u32..5,
            threshold in -0.5f64..1.5,
            capacity in 0usize..4,
            half_width in proptest::option::of(-1.0f64..1.0),
        ) {
            let mut config = SimConfig::default()
                .with_trial_count(trials)
                .with_max_rounds(max_rounds)
                .with_failure_threshold(threshold)
                .with_sample_capacity(capacity);
            if let Some(h) = half_width {
                config = config.with_confidence(ConfidenceTarget::new(h));
            }
            let insufficient = matches!(config.validate(), Err(SimError::InsufficientTrials));
            prop_assert_eq!(insufficient, trials == 0);
        }
    }
}
