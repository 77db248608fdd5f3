use std::sync::Arc;

use crate::deterministic::DeterministicSource;
use crate::error::EntropyResult;
use crate::source::{EntropyKind, EntropySource};
use crate::trusted::{EntropyProvider, TrustedConfig, TrustedSource};

/// The engine's entropy: one draw contract over every supported source.
#[derive(Debug, Clone)]
pub enum Entropy {
    /// Seeded and reproducible.
    Deterministic(DeterministicSource),
    /// Provider-backed, for live rolls.
    Trusted(TrustedSource),
    /// A seeded source substituted for an unavailable trusted one. Draws are
    /// reproducible but audit entries show the substitution.
    Degraded(DeterministicSource),
}

impl Entropy {
    /// A deterministic source for `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self::Deterministic(DeterministicSource::new(seed))
    }

    /// A trusted source over `provider`.
    pub fn trusted(provider: Arc<dyn EntropyProvider>, config: TrustedConfig) -> Self {
        Self::Trusted(TrustedSource::new(provider, config))
    }

    /// A degraded stand-in seeded with `seed`.
    pub fn degraded(seed: u64) -> Self {
        Self::Degraded(DeterministicSource::new(seed))
    }

    /// Returns true if replaying from the same starting point reproduces the
    /// same draws.
    pub fn is_reproducible(&self) -> bool {
        !matches!(self, Self::Trusted(_))
    }

    /// The seed of a reproducible source.
    pub fn seed(&self) -> Option<u64> {
        match self {
            Self::Deterministic(src) | Self::Degraded(src) => Some(src.seed()),
            Self::Trusted(_) => None,
        }
    }
}

impl EntropySource for Entropy {
    fn kind(&self) -> EntropyKind {
        match self {
            Self::Deterministic(_) => EntropyKind::Deterministic,
            Self::Trusted(_) => EntropyKind::Trusted,
            Self::Degraded(_) => EntropyKind::Degraded,
        }
    }

    fn next_u64(&mut self) -> EntropyResult<u64> {
        match self {
            Self::Deterministic(src) | Self::Degraded(src) => src.next_u64(),
            Self::Trusted(src) => src.next_u64(),
        }
    }

    fn last_proof(&self) -> Option<String> {
        match self {
            Self::Deterministic(src) | Self::Degraded(src) => src.last_proof(),
            Self::Trusted(src) => src.last_proof(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::OsProvider;

    #[test]
    fn kinds() {
        assert_eq!(Entropy::seeded(1).kind(), EntropyKind::Deterministic);
        assert_eq!(Entropy::degraded(1).kind(), EntropyKind::Degraded);
        let trusted = Entropy::trusted(Arc::new(OsProvider), TrustedConfig::default());
        assert_eq!(trusted.kind(), EntropyKind::Trusted);
        assert!(!trusted.is_reproducible());
        assert_eq!(trusted.seed(), None);
    }

    #[test]
    fn degraded_draws_match_deterministic() {
        let mut a = Entropy::seeded(77);
        let mut b = Entropy::degraded(77);
        for _ in 0..8 {
            assert_eq!(a.draw_die(12).unwrap(), b.draw_die(12).unwrap());
        }
        assert!(b.is_reproducible());
        assert_eq!(b.seed(), Some(77));
    }
}
