use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, bounded};
use serde::{Deserialize, Serialize};

use crate::error::{EntropyError, EntropyResult};
use crate::proof::proof_of;
use crate::source::{EntropyKind, EntropySource};

/// Size in bytes of one block fetched from a provider.
pub const BLOCK_LEN: usize = 32;

/// An external producer of unpredictable bytes (hardware, OS, network
/// beacon). Each call is an independent one-shot fetch.
pub trait EntropyProvider: Send + Sync + std::fmt::Debug {
    /// Short name used in errors and audit output.
    fn name(&self) -> &str;

    /// Fetch one block of fresh entropy.
    fn fetch(&self) -> EntropyResult<[u8; BLOCK_LEN]>;
}

/// Settings for trusted draws.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustedConfig {
    /// How long a single fetch may take before it is abandoned.
    pub timeout_ms: u64,
}

impl Default for TrustedConfig {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

impl TrustedConfig {
    /// Set the per-fetch timeout in milliseconds.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The per-fetch timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A non-reproducible source backed by an [`EntropyProvider`].
///
/// Every word is served from its own fetch. The fetch runs on a helper
/// thread and the caller waits at most the configured timeout, so a stalled
/// provider only ever delays the draw that asked for it. A stalled helper is
/// left to finish in the background and its late result is discarded.
#[derive(Debug, Clone)]
pub struct TrustedSource {
    provider: Arc<dyn EntropyProvider>,
    config: TrustedConfig,
    last_block: Option<[u8; BLOCK_LEN]>,
    fetches: u64,
}

impl TrustedSource {
    /// Create a trusted source over a provider.
    pub fn new(provider: Arc<dyn EntropyProvider>, config: TrustedConfig) -> Self {
        Self {
            provider,
            config,
            last_block: None,
            fetches: 0,
        }
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Number of successful fetches made so far.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// The block served by the most recent draw, for disclosure to an
    /// auditor alongside its proof.
    pub fn last_block(&self) -> Option<&[u8; BLOCK_LEN]> {
        self.last_block.as_ref()
    }

    fn fetch_block(&mut self) -> EntropyResult<[u8; BLOCK_LEN]> {
        let name = self.provider.name().to_string();
        let provider = Arc::clone(&self.provider);
        let (tx, rx) = bounded(1);

        thread::Builder::new()
            .name(format!("kb-entropy-{name}"))
            .spawn(move || {
                // The receiver is gone if the caller already timed out.
                let _ = tx.send(provider.fetch());
            })
            .map_err(|e| EntropyError::Unavailable {
                provider: name.clone(),
                reason: format!("could not start fetch: {e}"),
            })?;

        let result = match rx.recv_timeout(self.config.timeout()) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(EntropyError::Timeout {
                provider: name.clone(),
                timeout_ms: self.config.timeout_ms,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(EntropyError::Unavailable {
                provider: name.clone(),
                reason: "fetch ended without a result".to_string(),
            }),
        };

        match result {
            Ok(block) => {
                self.fetches += 1;
                self.last_block = Some(block);
                Ok(block)
            }
            Err(err) => {
                tracing::warn!(provider = %name, error = %err, "trusted entropy fetch failed");
                Err(err)
            }
        }
    }
}

impl EntropySource for TrustedSource {
    fn kind(&self) -> EntropyKind {
        EntropyKind::Trusted
    }

    fn next_u64(&mut self) -> EntropyResult<u64> {
        let block = self.fetch_block()?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&block[..8]);
        Ok(u64::from_be_bytes(bytes))
    }

    fn last_proof(&self) -> Option<String> {
        self.last_block.as_ref().map(|block| proof_of(block))
    }
}
