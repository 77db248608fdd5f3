//! Aggregated results of a run.

use std::collections::BTreeMap;

use kb_combat::{Side, Termination};
use kb_entropy::EntropyKind;
use serde::{Deserialize, Serialize};

use crate::config::{Metric, SimConfig};
use crate::error::TrialFailure;
use crate::stats::{Interval, MetricSample, Percentiles, RunningStats, sample_key, wilson_interval};
use crate::trial::{TrialResult, TrialRun};

/// Quantile used for win-rate intervals.
const WIN_RATE_Z: f64 = 1.96;

/// Win statistics for one side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideOutcome {
    /// The side.
    pub side: Side,
    /// Trials this side won.
    pub wins: u64,
    /// Wins over completed trials.
    pub win_rate: f64,
    /// 95% Wilson score interval for the win rate.
    pub interval: Interval,
}

/// Distribution of the configured metric over completed trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Which metric.
    pub metric: Metric,
    /// Values aggregated.
    pub count: u64,
    /// Mean.
    pub mean: f64,
    /// Sample variance.
    pub variance: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Smallest value.
    pub min: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
    /// Percentiles; estimated from a sample when `sampled` is set.
    pub percentiles: Option<Percentiles>,
    /// Whether percentiles come from a sample rather than every trial.
    pub sampled: bool,
}

/// Notes attached to a summary that do not fail the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum SimWarning {
    /// The requested confidence interval was not reached.
    NonConvergent {
        /// Requested half-width.
        target_half_width: f64,
        /// Half-width reached; `None` with fewer than two values.
        achieved_half_width: Option<f64>,
        /// Trials aggregated.
        trials: u64,
    },
    /// Some trials failed and were left out of the statistics.
    TrialsFailed {
        /// Failed trials.
        failed: u64,
        /// The failure with the lowest trial index.
        first: TrialFailure,
    },
    /// The run was cancelled before every trial finished.
    Cancelled {
        /// Trials that finished before cancellation.
        completed: u64,
    },
}

/// Aggregate over every completed trial of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Run-level seed.
    pub seed: u64,
    /// Kind of entropy the trials drew from.
    pub entropy: EntropyKind,
    /// Trials requested.
    pub trial_count: u64,
    /// Trials aggregated.
    pub completed: u64,
    /// Trials that failed and were excluded.
    pub failed: u64,
    /// Whether the run stopped early.
    pub cancelled: bool,
    /// Win statistics per side, sorted by side.
    pub sides: Vec<SideOutcome>,
    /// Trials that ended with nobody standing.
    pub draws: u64,
    /// Trials stopped by the round cap.
    pub round_limit_exceeded: u64,
    /// Rounds to resolution.
    pub rounds: MetricSummary,
    /// The configured metric.
    pub metric: MetricSummary,
    /// Warnings; empty when the run met every target.
    pub warnings: Vec<SimWarning>,
    /// Retained trials, in trial order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trials: Vec<TrialResult>,
}

impl SimulationSummary {
    /// Win statistics for `side`.
    pub fn side(&self, side: &str) -> Option<&SideOutcome> {
        self.sides.iter().find(|s| s.side.as_str() == side)
    }

    /// Win rate of `side`, 0 when unknown.
    pub fn win_rate(&self, side: &str) -> f64 {
        self.side(side).map_or(0.0, |s| s.win_rate)
    }

    /// Whether the metric missed its confidence target.
    pub fn is_non_convergent(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, SimWarning::NonConvergent { .. }))
    }

    /// The canonical JSON form. Identical configurations give identical
    /// bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Partial aggregate of a contiguous block of trials.
#[derive(Debug, Clone)]
pub(crate) struct Accumulator {
    completed: u64,
    cancelled: u64,
    failed: u64,
    first_failure: Option<TrialFailure>,
    wins: BTreeMap<Side, u64>,
    draws: u64,
    round_limit: u64,
    rounds: RunningStats,
    rounds_sample: MetricSample,
    metric: RunningStats,
    metric_sample: MetricSample,
    trials: Vec<TrialResult>,
}

impl Accumulator {
    pub(crate) fn new(sample_capacity: usize) -> Self {
        Self {
            completed: 0,
            cancelled: 0,
            failed: 0,
            first_failure: None,
            wins: BTreeMap::new(),
            draws: 0,
            round_limit: 0,
            rounds: RunningStats::new(),
            rounds_sample: MetricSample::new(sample_capacity),
            metric: RunningStats::new(),
            metric_sample: MetricSample::new(sample_capacity),
            trials: Vec::new(),
        }
    }

    /// Record one trial.
    pub(crate) fn record(&mut self, run: TrialRun, config: &SimConfig) {
        match run {
            TrialRun::Cancelled => self.cancelled += 1,
            TrialRun::Failed(failure) => {
                self.failed += 1;
                self.note_failure(failure);
            }
            TrialRun::Finished(result) => {
                self.completed += 1;
                match &result.termination {
                    Termination::Victory(side) => *self.wins.entry(side.clone()).or_insert(0) += 1,
                    Termination::Draw => self.draws += 1,
                    Termination::RoundLimitExceeded => self.round_limit += 1,
                }
                let key = sample_key(config.seed, result.trial_index);
                let rounds = f64::from(result.rounds);
                self.rounds.push(rounds);
                self.rounds_sample.push(key, result.trial_index, rounds);
                let value = result.metric(&config.metric);
                self.metric.push(value);
                self.metric_sample.push(key, result.trial_index, value);
                if config.retention.keeps_trials() {
                    self.trials.push(*result);
                }
            }
        }
    }

    /// Fold in the accumulator of a later block.
    pub(crate) fn merge(&mut self, other: Self) {
        self.completed += other.completed;
        self.cancelled += other.cancelled;
        self.failed += other.failed;
        if let Some(failure) = other.first_failure {
            self.note_failure(failure);
        }
        for (side, wins) in other.wins {
            *self.wins.entry(side).or_insert(0) += wins;
        }
        self.draws += other.draws;
        self.round_limit += other.round_limit;
        self.rounds.merge(&other.rounds);
        self.rounds_sample.merge(&other.rounds_sample);
        self.metric.merge(&other.metric);
        self.metric_sample.merge(&other.metric_sample);
        self.trials.extend(other.trials);
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed
    }

    pub(crate) fn first_failure(&self) -> Option<&TrialFailure> {
        self.first_failure.as_ref()
    }

    fn note_failure(&mut self, failure: TrialFailure) {
        let earlier = self
            .first_failure
            .as_ref()
            .is_some_and(|f| f.trial_index <= failure.trial_index);
        if !earlier {
            self.first_failure = Some(failure);
        }
    }

    /// Build the summary. `sides` lists every side of the encounter.
    pub(crate) fn finish<'s>(
        mut self,
        config: &SimConfig,
        entropy: EntropyKind,
        sides: impl IntoIterator<Item = &'s Side>,
    ) -> SimulationSummary {
        let completed = self.completed;
        let sides = sides
            .into_iter()
            .map(|side| {
                let wins = self.wins.get(side).copied().unwrap_or(0);
                SideOutcome {
                    side: side.clone(),
                    wins,
                    win_rate: if completed == 0 { 0.0 } else { wins as f64 / completed as f64 },
                    interval: wilson_interval(wins, completed, WIN_RATE_Z),
                }
            })
            .collect();

        let mut warnings = Vec::new();
        if let Some(target) = &config.confidence {
            let achieved = self.metric.std_error().map(|se| target.z * se);
            if achieved.is_none_or(|h| h > target.half_width) {
                warnings.push(SimWarning::NonConvergent {
                    target_half_width: target.half_width,
                    achieved_half_width: achieved,
                    trials: completed,
                });
            }
        }
        if let Some(first) = self.first_failure.take() {
            warnings.push(SimWarning::TrialsFailed {
                failed: self.failed,
                first,
            });
        }
        let cancelled = self.cancelled > 0;
        if cancelled {
            warnings.push(SimWarning::Cancelled { completed });
        }

        self.trials.sort_by_key(|t| t.trial_index);
        SimulationSummary {
            seed: config.seed,
            entropy,
            trial_count: config.trial_count,
            completed,
            failed: self.failed,
            cancelled,
            sides,
            draws: self.draws,
            round_limit_exceeded: self.round_limit,
            rounds: summarize(Metric::RoundsToResolution, &self.rounds, &self.rounds_sample),
            metric: summarize(config.metric.clone(), &self.metric, &self.metric_sample),
            warnings,
            trials: self.trials,
        }
    }
}

fn summarize(metric: Metric, stats: &RunningStats, sample: &MetricSample) -> MetricSummary {
    MetricSummary {
        metric,
        count: stats.count(),
        mean: stats.mean(),
        variance: stats.variance(),
        std_dev: stats.std_dev(),
        min: stats.min(),
        max: stats.max(),
        percentiles: sample.percentiles(),
        sampled: sample.is_partial(),
    }
}
