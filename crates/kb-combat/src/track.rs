//! Clamped numeric resources.
//!
//! Health is a track: a value held between a floor and a ceiling. Adjusting
//! past either end clamps rather than failing, so overkill damage and
//! overhealing never leave a combatant in an impossible state.

use serde::{Deserialize, Serialize};

/// A named value clamped between `min` and `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TrackRepr")]
pub struct Track {
    /// Display name of the track.
    pub name: String,
    /// Current value.
    pub current: i64,
    /// Maximum value.
    pub max: i64,
    /// Minimum value (usually 0).
    pub min: i64,
}

/// Encounter files may give a track as a bare maximum or in full.
#[derive(Deserialize)]
#[serde(untagged)]
enum TrackRepr {
    Max(i64),
    Full {
        #[serde(default = "default_name")]
        name: String,
        current: Option<i64>,
        max: i64,
        #[serde(default)]
        min: i64,
    },
}

fn default_name() -> String {
    "health".to_string()
}

impl From<TrackRepr> for Track {
    fn from(repr: TrackRepr) -> Self {
        match repr {
            TrackRepr::Max(max) => Track::new(default_name(), max),
            TrackRepr::Full {
                name,
                current,
                max,
                min,
            } => Track::with_range(name, current.unwrap_or(max), min, max),
        }
    }
}

impl Track {
    /// Create a track starting at its maximum, with a floor of 0.
    pub fn new(name: impl Into<String>, max: i64) -> Self {
        Self {
            name: name.into(),
            current: max,
            max,
            min: 0,
        }
    }

    /// Create a track with a custom floor and starting value.
    pub fn with_range(name: impl Into<String>, current: i64, min: i64, max: i64) -> Self {
        let max = max.max(min);
        Self {
            name: name.into(),
            current: current.clamp(min, max),
            max,
            min,
        }
    }

    /// Adjust by `delta`, clamping to bounds. Returns the new value.
    pub fn adjust(&mut self, delta: i64) -> i64 {
        self.current = self.current.saturating_add(delta).clamp(self.min, self.max);
        self.current
    }

    /// Returns true at the floor.
    pub fn is_empty(&self) -> bool {
        self.current <= self.min
    }

    /// Returns true at the ceiling.
    pub fn is_full(&self) -> bool {
        self.current >= self.max
    }

    /// How far below the ceiling the track sits.
    pub fn missing(&self) -> i64 {
        self.max.saturating_sub(self.current)
    }

    /// Filled fraction, from 0.0 to 1.0.
    pub fn fraction(&self) -> f64 {
        let range = self.max.saturating_sub(self.min);
        if range == 0 {
            return 1.0;
        }
        (self.current - self.min) as f64 / range as f64
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}/{}", self.name, self.current, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_starts_full() {
        let t = Track::new("health", 10);
        assert_eq!(t.current, 10);
        assert_eq!(t.min, 0);
        assert!(t.is_full());
        assert!(!t.is_empty());
    }

    #[test]
    fn adjust_clamps_both_ends() {
        let mut t = Track::new("health", 5);
        assert_eq!(t.adjust(10), 5);
        assert_eq!(t.adjust(-20), 0);
        assert!(t.is_empty());
        assert_eq!(t.adjust(i64::MIN), 0);
    }

    #[test]
    fn missing_and_fraction() {
        let mut t = Track::new("health", 10);
        t.adjust(-4);
        assert_eq!(t.missing(), 4);
        assert!((t.fraction() - 0.6).abs() < f64::EPSILON);
        assert!((Track::with_range("fixed", 5, 5, 5).fraction() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn with_range_clamps_initial() {
        assert_eq!(Track::with_range("health", 100, 0, 10).current, 10);
    }

    #[test]
    fn deserializes_bare_or_full() {
        let bare: Track = serde_json::from_str("12").unwrap();
        assert_eq!(bare, Track::new("health", 12));

        let full: Track = serde_json::from_str(r#"{"max": 20, "current": 7}"#).unwrap();
        assert_eq!(full.current, 7);
        assert_eq!(full.max, 20);
        assert_eq!(full.name, "health");
    }

    #[test]
    fn display() {
        let mut t = Track::new("health", 8);
        t.adjust(-3);
        assert_eq!(t.to_string(), "health: 5/8");
    }
}
