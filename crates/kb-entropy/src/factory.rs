use std::sync::Arc;

use crate::deterministic::DeterministicSource;
use crate::entropy::Entropy;
use crate::source::EntropyKind;
use crate::trusted::{EntropyProvider, TrustedConfig, TrustedSource};

/// Builds the entropy each trial of a run draws from.
///
/// Factories are shared across worker threads; every call hands out a
/// fresh, independently owned source.
pub trait EntropyFactory: Send + Sync {
    /// The kind of source this factory produces.
    fn kind(&self) -> EntropyKind;

    /// A fresh source for trial `trial_index`.
    fn for_trial(&self, trial_index: u64) -> Entropy;
}

/// Deterministic per-trial sources derived from one run-level seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeededFactory {
    run_seed: u64,
}

impl SeededFactory {
    /// Create a factory for `run_seed`.
    pub fn new(run_seed: u64) -> Self {
        Self { run_seed }
    }

    /// The run-level seed.
    pub fn run_seed(&self) -> u64 {
        self.run_seed
    }
}

impl EntropyFactory for SeededFactory {
    fn kind(&self) -> EntropyKind {
        EntropyKind::Deterministic
    }

    fn for_trial(&self, trial_index: u64) -> Entropy {
        Entropy::Deterministic(DeterministicSource::for_trial(self.run_seed, trial_index))
    }
}

/// Trusted sources sharing one provider.
#[derive(Debug, Clone)]
pub struct TrustedFactory {
    provider: Arc<dyn EntropyProvider>,
    config: TrustedConfig,
}

impl TrustedFactory {
    /// Create a factory over `provider`.
    pub fn new(provider: Arc<dyn EntropyProvider>, config: TrustedConfig) -> Self {
        Self { provider, config }
    }
}

impl EntropyFactory for TrustedFactory {
    fn kind(&self) -> EntropyKind {
        EntropyKind::Trusted
    }

    fn for_trial(&self, _trial_index: u64) -> Entropy {
        Entropy::Trusted(TrustedSource::new(
            Arc::clone(&self.provider),
            self.config.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deterministic::derive_trial_seed;
    use crate::provider::OsProvider;
    use crate::source::EntropySource;

    #[test]
    fn seeded_factory_is_reproducible_per_trial() {
        let factory = SeededFactory::new(42);
        let mut a = factory.for_trial(3);
        let mut b = factory.for_trial(3);
        let mut c = factory.for_trial(4);
        let xa = a.next_u64().unwrap();
        assert_eq!(xa, b.next_u64().unwrap());
        assert_ne!(xa, c.next_u64().unwrap());
        assert_eq!(a.seed(), Some(derive_trial_seed(42, 3)));
        assert_eq!(factory.run_seed(), 42);
    }

    #[test]
    fn trusted_factory_hands_out_trusted_sources() {
        let factory = TrustedFactory::new(Arc::new(OsProvider), TrustedConfig::default());
        assert_eq!(factory.kind(), EntropyKind::Trusted);
        assert_eq!(factory.for_trial(0).kind(), EntropyKind::Trusted);
    }
}
