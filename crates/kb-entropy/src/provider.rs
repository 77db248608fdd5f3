//! Bundled entropy providers.

use std::time::Duration;

use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::{EntropyError, EntropyResult};
use crate::trusted::{BLOCK_LEN, EntropyProvider};

/// Entropy from the operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProvider;

impl EntropyProvider for OsProvider {
    fn name(&self) -> &str {
        "os"
    }

    fn fetch(&self) -> EntropyResult<[u8; BLOCK_LEN]> {
        let mut block = [0u8; BLOCK_LEN];
        let mut rng = OsRng;
        rng.try_fill_bytes(&mut block)
            .map_err(|e| EntropyError::Unavailable {
                provider: self.name().to_string(),
                reason: e.to_string(),
            })?;
        Ok(block)
    }
}

/// Entropy from an HTTP endpoint whose response body starts with at least
/// 64 hex characters (a randomness beacon or hardware RNG gateway).
pub struct HttpProvider {
    url: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("url", &self.url)
            .finish()
    }
}

impl HttpProvider {
    /// Create a provider for `url`, bounding each request by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            url: url.into(),
            agent,
        }
    }

    /// The endpoint this provider fetches from.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn unavailable(&self, reason: impl Into<String>) -> EntropyError {
        EntropyError::Unavailable {
            provider: self.name().to_string(),
            reason: reason.into(),
        }
    }
}

impl EntropyProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self) -> EntropyResult<[u8; BLOCK_LEN]> {
        let body = self
            .agent
            .get(&self.url)
            .call()
            .map_err(|e| self.unavailable(e.to_string()))?
            .into_string()
            .map_err(|e| self.unavailable(e.to_string()))?;
        decode_hex_block(&body).map_err(|reason| self.unavailable(reason))
    }
}

/// Decode the leading 64 hex characters of a response body into a block.
fn decode_hex_block(body: &str) -> Result<[u8; BLOCK_LEN], String> {
    let digits = body
        .trim()
        .get(..BLOCK_LEN * 2)
        .ok_or_else(|| format!("expected at least {} hex characters", BLOCK_LEN * 2))?;
    let mut block = [0u8; BLOCK_LEN];
    hex::decode_to_slice(digits, &mut block).map_err(|e| format!("malformed entropy: {e}"))?;
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_provider_fills_block() {
        let a = OsProvider.fetch().unwrap();
        let b = OsProvider.fetch().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decode_leading_hex() {
        let body = format!("  {}{}\n", "ab".repeat(32), "trailing");
        let block = decode_hex_block(&body).unwrap();
        assert_eq!(block, [0xab; BLOCK_LEN]);
    }

    #[test]
    fn decode_rejects_short_body() {
        assert!(decode_hex_block("abcd").is_err());
    }

    #[test]
    fn decode_rejects_non_hex() {
        let body = "zz".repeat(32);
        assert!(decode_hex_block(&body).is_err());
    }

    #[test]
    fn http_provider_reports_unreachable_endpoint() {
        let provider = HttpProvider::new("http://127.0.0.1:9/entropy", Duration::from_millis(200));
        let err = provider.fetch().unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(provider.url(), "http://127.0.0.1:9/entropy");
    }
}
