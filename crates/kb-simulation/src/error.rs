use serde::{Deserialize, Serialize};

/// Result alias for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// Why one trial could not finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialFailure {
    /// Index of the failed trial; with the run seed this reproduces it.
    pub trial_index: u64,
    /// Round in which it failed.
    pub round: u32,
    /// The underlying error.
    pub message: String,
}

impl std::fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "trial {} failed in round {}: {}",
            self.trial_index, self.round, self.message
        )
    }
}

/// Errors from configuring or running a simulation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    /// The run asked for zero trials.
    #[error("at least one trial is required")]
    InsufficientTrials,

    /// The configuration or encounter setup is unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Too many trials failed.
    #[error("run aborted: {failed} of {trial_count} trials failed; first: {first}")]
    RunAborted {
        /// Failed trials.
        failed: u64,
        /// Trials requested.
        trial_count: u64,
        /// The failure with the lowest trial index.
        first: TrialFailure,
    },
}
