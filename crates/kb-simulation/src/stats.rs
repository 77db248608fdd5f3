//! Streaming statistics that merge across workers.
//!
//! [`RunningStats`] keeps mean and variance with Welford's update and
//! combines partial results with the pairwise rule of Chan et al., so
//! partials can be merged in any grouping. [`MetricSample`] keeps the
//! values with the smallest hash keys, a bottom-k sample: the kept set
//! depends only on which trials ran, never on how they were split.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Count, mean, variance and range of a stream of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one value.
    pub fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Fold another partial result into this one.
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other.clone();
            return;
        }
        let (a, b) = (self.count as f64, other.count as f64);
        let n = a + b;
        let delta = other.mean - self.mean;
        self.mean += delta * b / n;
        self.m2 += other.m2 + delta * delta * a * b / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Number of values.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean, 0 when empty.
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (n - 1 denominator), 0 below two values.
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Sample standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Standard error of the mean, `None` below two values.
    pub fn std_error(&self) -> Option<f64> {
        (self.count >= 2).then(|| self.std_dev() / (self.count as f64).sqrt())
    }

    /// Smallest value seen.
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// Largest value seen.
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

/// Sampling key of one trial: the first eight bytes, big-endian, of
/// `SHA-256("kb-sample" || run_seed BE || trial_index BE)`.
pub fn sample_key(run_seed: u64, trial_index: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"kb-sample");
    hasher.update(run_seed.to_be_bytes());
    hasher.update(trial_index.to_be_bytes());
    let digest = hasher.finalize();
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(word)
}

/// Bounded sample of metric values for percentile estimates.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    capacity: usize,
    entries: Vec<(u64, u64, f64)>,
    seen: u64,
}

impl MetricSample {
    /// A sample holding at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
            seen: 0,
        }
    }

    /// Offer the value of trial `trial_index` with sampling key `key`.
    pub fn push(&mut self, key: u64, trial_index: u64, value: f64) {
        self.seen += 1;
        self.entries.push((key, trial_index, value));
        if self.entries.len() >= self.capacity.saturating_mul(2) {
            self.compact();
        }
    }

    /// Fold another sample into this one.
    pub fn merge(&mut self, other: &Self) {
        self.seen += other.seen;
        self.entries.extend_from_slice(&other.entries);
        self.compact();
    }

    /// Whether some values were dropped, making percentiles estimates.
    pub fn is_partial(&self) -> bool {
        self.seen > self.capacity as u64
    }

    /// Percentiles of the kept values, `None` when empty.
    pub fn percentiles(&self) -> Option<Percentiles> {
        let mut kept = self.entries.clone();
        kept.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        kept.truncate(self.capacity);
        let mut values: Vec<f64> = kept.into_iter().map(|(_, _, v)| v).collect();
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        Some(Percentiles {
            p5: interpolate(&values, 0.05),
            p25: interpolate(&values, 0.25),
            p50: interpolate(&values, 0.50),
            p75: interpolate(&values, 0.75),
            p95: interpolate(&values, 0.95),
        })
    }

    fn compact(&mut self) {
        self.entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        self.entries.truncate(self.capacity);
    }
}

/// Linear interpolation between closest ranks of sorted `values`.
fn interpolate(values: &[f64], p: f64) -> f64 {
    let rank = p * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}

/// Fixed percentiles of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    /// 5th percentile.
    pub p5: f64,
    /// 25th percentile.
    pub p25: f64,
    /// Median.
    pub p50: f64,
    /// 75th percentile.
    pub p75: f64,
    /// 95th percentile.
    pub p95: f64,
}

/// A closed interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound.
    pub low: f64,
    /// Upper bound.
    pub high: f64,
}

impl Interval {
    /// Whether `x` lies inside.
    pub fn contains(&self, x: f64) -> bool {
        self.low <= x && x <= self.high
    }
}

/// Wilson score interval for `successes` out of `trials` at quantile `z`.
/// With no trials the interval is `[0, 1]`.
pub fn wilson_interval(successes: u64, trials: u64, z: f64) -> Interval {
    if trials == 0 {
        return Interval { low: 0.0, high: 1.0 };
    }
    let n = trials as f64;
    let p = successes as f64 / n;
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let half = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    Interval {
        low: (center - half).max(0.0),
        high: (center + half).min(1.0),
    }
}
