use serde::{Deserialize, Serialize};

use crate::error::{EntropyError, EntropyResult};

/// Which kind of source produced a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntropyKind {
    /// Seeded and reproducible.
    Deterministic,
    /// Fetched from an external provider; not reproducible.
    Trusted,
    /// A deterministic source standing in for an unavailable trusted one.
    Degraded,
}

impl std::fmt::Display for EntropyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deterministic => write!(f, "deterministic"),
            Self::Trusted => write!(f, "trusted"),
            Self::Degraded => write!(f, "degraded"),
        }
    }
}

/// The draw contract every entropy source fulfils.
///
/// Implementors only supply raw 64-bit words; the uniform integer and float
/// mappings are provided here so every source maps words to values the same
/// way:
///
/// - integers in `[lo, hi]` use rejection sampling: with span
///   `s = hi - lo + 1`, words `x >= 2^64 - (2^64 mod s)` are discarded and
///   the result is `lo + x mod s`;
/// - floats in `[0, 1)` are `(x >> 11) * 2^-53`.
pub trait EntropySource {
    /// The kind of this source, recorded in audit entries.
    fn kind(&self) -> EntropyKind;

    /// Draw the next raw 64-bit word.
    fn next_u64(&mut self) -> EntropyResult<u64>;

    /// Proof of the entropy block that served the most recent draw, if any.
    fn last_proof(&self) -> Option<String>;

    /// Draw an integer uniformly from the inclusive range `[lo, hi]`.
    fn draw_uniform_int(&mut self, lo: i64, hi: i64) -> EntropyResult<i64> {
        if lo > hi {
            return Err(EntropyError::InvalidRange { lo, hi });
        }
        let span = (i128::from(hi) - i128::from(lo) + 1) as u128;
        if span > u128::from(u64::MAX) {
            let x = self.next_u64()?;
            return Ok((i128::from(lo) + i128::from(x)) as i64);
        }
        let span = span as u64;
        // 2^64 mod span, computed without overflow.
        let rem = (u64::MAX % span).wrapping_add(1) % span;
        loop {
            let x = self.next_u64()?;
            if rem == 0 || x < 0u64.wrapping_sub(rem) {
                return Ok((i128::from(lo) + i128::from(x % span)) as i64);
            }
        }
    }

    /// Draw a float uniformly from `[0, 1)`.
    fn draw_uniform_float(&mut self) -> EntropyResult<f64> {
        let x = self.next_u64()?;
        Ok((x >> 11) as f64 * (1.0 / (1u64 << 53) as f64))
    }

    /// Roll a single die with the given number of faces (`1..=sides`).
    fn draw_die(&mut self, sides: u32) -> EntropyResult<u32> {
        let value = self.draw_uniform_int(1, i64::from(sides))?;
        Ok(value as u32)
    }
}

impl<S: EntropySource + ?Sized> EntropySource for &mut S {
    fn kind(&self) -> EntropyKind {
        (**self).kind()
    }

    fn next_u64(&mut self) -> EntropyResult<u64> {
        (**self).next_u64()
    }

    fn last_proof(&self) -> Option<String> {
        (**self).last_proof()
    }
}

impl<S: EntropySource + ?Sized> EntropySource for Box<S> {
    fn kind(&self) -> EntropyKind {
        (**self).kind()
    }

    fn next_u64(&mut self) -> EntropyResult<u64> {
        (**self).next_u64()
    }

    fn last_proof(&self) -> Option<String> {
        (**self).last_proof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays a fixed list of words.
    struct Scripted {
        words: Vec<u64>,
        next: usize,
    }

    impl EntropySource for Scripted {
        fn kind(&self) -> EntropyKind {
            EntropyKind::Deterministic
        }

        fn next_u64(&mut self) -> EntropyResult<u64> {
            let word = self.words[self.next];
            self.next += 1;
            Ok(word)
        }

        fn last_proof(&self) -> Option<String> {
            None
        }
    }

    #[test]
    fn uniform_int_maps_modulo_span() {
        let mut src = Scripted {
            words: vec![0, 5, 6, 13],
            next: 0,
        };
        assert_eq!(src.draw_uniform_int(1, 6).unwrap(), 1);
        assert_eq!(src.draw_uniform_int(1, 6).unwrap(), 6);
        assert_eq!(src.draw_uniform_int(1, 6).unwrap(), 1);
        assert_eq!(src.draw_uniform_int(1, 6).unwrap(), 2);
    }

    #[test]
    fn uniform_int_rejects_biased_tail() {
        // 2^64 mod 6 == 4, so the top four words are rejected.
        let mut src = Scripted {
            words: vec![u64::MAX, u64::MAX - 3, 7],
            next: 0,
        };
        assert_eq!(src.draw_uniform_int(1, 6).unwrap(), 2);
        assert_eq!(src.next, 3);
    }

    #[test]
    fn uniform_int_single_value_range() {
        let mut src = Scripted {
            words: vec![987_654],
            next: 0,
        };
        assert_eq!(src.draw_uniform_int(-4, -4).unwrap(), -4);
    }

    #[test]
    fn uniform_int_full_range() {
        let mut src = Scripted {
            words: vec![0, u64::MAX],
            next: 0,
        };
        assert_eq!(src.draw_uniform_int(i64::MIN, i64::MAX).unwrap(), i64::MIN);
        assert_eq!(src.draw_uniform_int(i64::MIN, i64::MAX).unwrap(), i64::MAX);
    }

    #[test]
    fn uniform_int_empty_range_errors() {
        let mut src = Scripted {
            words: vec![],
            next: 0,
        };
        assert_eq!(
            src.draw_uniform_int(3, 1),
            Err(EntropyError::InvalidRange { lo: 3, hi: 1 })
        );
    }

    #[test]
    fn uniform_float_bounds() {
        let mut src = Scripted {
            words: vec![0, u64::MAX],
            next: 0,
        };
        assert_eq!(src.draw_uniform_float().unwrap(), 0.0);
        let top = src.draw_uniform_float().unwrap();
        assert!(top < 1.0);
        assert!(top > 0.999_999);
    }

    #[test]
    fn kind_display() {
        assert_eq!(EntropyKind::Deterministic.to_string(), "deterministic");
        assert_eq!(EntropyKind::Trusted.to_string(), "trusted");
        assert_eq!(EntropyKind::Degraded.to_string(), "degraded");
    }
}
