/// Convenience result type for entropy draws.
pub type EntropyResult<T> = Result<T, EntropyError>;

/// Errors that can occur while drawing entropy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntropyError {
    /// The external provider could not produce entropy.
    #[error("entropy unavailable from {provider}: {reason}")]
    Unavailable {
        /// Name of the provider that failed.
        provider: String,
        /// Why the fetch failed.
        reason: String,
    },

    /// The external provider did not answer within the configured timeout.
    #[error("entropy provider {provider} timed out after {timeout_ms} ms")]
    Timeout {
        /// Name of the provider that stalled.
        provider: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// A draw was requested over an empty range.
    #[error("invalid draw range [{lo}, {hi}]")]
    InvalidRange {
        /// Lower bound requested.
        lo: i64,
        /// Upper bound requested.
        hi: i64,
    },
}

impl EntropyError {
    /// Returns true for the failures a caller may answer with a retry or a
    /// degraded fallback (unreachable or stalled provider).
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_classification() {
        let err = EntropyError::Timeout {
            provider: "os".into(),
            timeout_ms: 50,
        };
        assert!(err.is_unavailable());
        assert!(!EntropyError::InvalidRange { lo: 3, hi: 1 }.is_unavailable());
    }

    #[test]
    fn display() {
        let err = EntropyError::Unavailable {
            provider: "http".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(
            err.to_string(),
            "entropy unavailable from http: connection refused"
        );
    }
}
