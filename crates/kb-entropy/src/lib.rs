//! Entropy sources for Knucklebone.
//!
//! Everything that needs randomness draws through the [`EntropySource`]
//! trait, so dice resolution never knows whether it is running against the
//! seeded, reproducible [`DeterministicSource`] used by simulations and
//! tests, or a [`TrustedSource`] that fetches fresh entropy from an external
//! provider for live, fairness-sensitive rolls.
//!
//! The deterministic generator is a SHA-256 counter construction whose exact
//! byte layout is part of the audit contract; see [`deterministic`].

/// Seeded SHA-256 counter generator.
pub mod deterministic;
/// The tagged `Entropy` variant used across the engine.
pub mod entropy;
/// Error types for entropy draws.
pub mod error;
/// Per-trial entropy construction.
pub mod factory;
/// Entropy proofs for audit verification.
pub mod proof;
/// External entropy providers.
pub mod provider;
/// The draw contract shared by all sources.
pub mod source;
/// Provider-backed source with per-draw timeouts.
pub mod trusted;

/// Re-export of [`deterministic::DeterministicSource`].
pub use deterministic::{DeterministicSource, derive_trial_seed};
/// Re-export of [`entropy::Entropy`].
pub use entropy::Entropy;
/// Re-exports of [`error::EntropyError`] and [`error::EntropyResult`].
pub use error::{EntropyError, EntropyResult};
/// Re-exports of the factory types.
pub use factory::{EntropyFactory, SeededFactory, TrustedFactory};
/// Re-exports of the proof helpers.
pub use proof::{proof_of, verify_proof};
/// Re-exports of the bundled providers.
pub use provider::{HttpProvider, OsProvider};
/// Re-exports of [`source::EntropySource`] and [`source::EntropyKind`].
pub use source::{EntropyKind, EntropySource};
/// Re-exports of the trusted source types.
pub use trusted::{BLOCK_LEN, EntropyProvider, TrustedConfig, TrustedSource};
