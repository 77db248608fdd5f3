//! Monte Carlo combat simulation for Knucklebone.
//!
//! A [`Simulator`] runs many independent trials of an [`EncounterSetup`],
//! each on its own entropy from a [`kb_entropy::EntropyFactory`], with a
//! [`kb_combat::DecisionPolicy`] per side choosing actions. Trials run on
//! scoped worker threads; their results stream into mergeable accumulators
//! and come out as one [`SimulationSummary`]. The same configuration always
//! produces the same summary, whatever the number of workers.

/// Cooperative cancellation.
pub mod cancel;
/// Configuration types for simulation runs.
pub mod config;
/// Error types for the simulation crate.
pub mod error;
/// Encounter rosters and per-side policies.
pub mod setup;
/// The parallel trial driver.
pub mod simulator;
/// Streaming statistics.
pub mod stats;
/// Aggregated run results.
pub mod summary;
/// The per-trial state machine.
pub mod trial;

/// Re-export of [`cancel::CancelToken`].
pub use cancel::CancelToken;
/// Re-exports of the configuration types.
pub use config::{ConfidenceTarget, Metric, Retention, SimConfig};
/// Re-exports of [`error::SimError`], [`error::SimResult`] and [`error::TrialFailure`].
pub use error::{SimError, SimResult, TrialFailure};
/// Re-exports of the setup types.
pub use setup::{EncounterSetup, PolicySet, builtin_policy, builtin_policy_with_profile};
/// Re-exports of [`simulator::Simulator`] and [`simulator::run`].
pub use simulator::{BLOCK_SIZE, Simulator, run};
/// Re-exports of the statistics types.
pub use stats::{Interval, Percentiles, RunningStats};
/// Re-exports of the summary types.
pub use summary::{MetricSummary, SideOutcome, SimWarning, SimulationSummary};
/// Re-export of [`trial::TrialResult`].
pub use trial::TrialResult;
