//! Append-only audit trail.
//!
//! Every audited roll appends one [`RollAuditEntry`] carrying the raw draws
//! in consumption order. Records are never edited or removed; a correction
//! is a new record. Sequence numbers are assigned on append and start at 1.

use chrono::{DateTime, Utc};
use kb_entropy::{EntropyKind, EntropySource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DiceResult;
use crate::evaluator::Evaluator;
use crate::notation::parse;
use crate::outcome::CapReason;

/// The audit record of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollAuditEntry {
    /// Position in the trail.
    pub sequence: u64,
    /// Canonical notation of the evaluated expression.
    pub expression: String,
    /// Which kind of source supplied the draws.
    pub source: EntropyKind,
    /// Every die value drawn, in order.
    pub draws: Vec<u32>,
    /// Proofs of the entropy behind each draw.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proofs: Vec<String>,
    /// The final total, absent when evaluation failed.
    pub total: Option<i64>,
    /// Set when a bound cut the roll short.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capped: Option<CapReason>,
    /// Why evaluation failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time of the roll. Only live sessions stamp entries, so
    /// simulation trails stay reproducible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// One record in an [`AuditTrail`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    /// An evaluated roll.
    Roll(RollAuditEntry),
    /// The session switched entropy source.
    Substitution {
        /// Position in the trail.
        sequence: u64,
        /// The source being replaced.
        from: EntropyKind,
        /// The source used from now on.
        to: EntropyKind,
        /// What went wrong with the old source.
        reason: String,
        /// Wall-clock time of the switch, for live trails.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        recorded_at: Option<DateTime<Utc>>,
    },
    /// Free-form note, such as a correction to an earlier record.
    Annotation {
        /// Position in the trail.
        sequence: u64,
        /// Short tag.
        label: String,
        /// Details.
        detail: String,
    },
}

impl AuditRecord {
    /// Position in the trail.
    pub fn sequence(&self) -> u64 {
        match self {
            Self::Roll(entry) => entry.sequence,
            Self::Substitution { sequence, .. } | Self::Annotation { sequence, .. } => *sequence,
        }
    }
}

/// Result of replaying a trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Roll entries that reproduced exactly.
    pub verified: usize,
    /// Sequence number of the first entry that did not reproduce.
    pub mismatch: Option<u64>,
}

impl ReplayReport {
    /// Whether every roll reproduced.
    pub fn is_consistent(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// An append-only sequence of audit records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<Uuid>,
    #[serde(skip)]
    timestamps: bool,
    records: Vec<AuditRecord>,
    #[serde(skip)]
    next_sequence: u64,
}

impl AuditTrail {
    /// An unstamped trail, as used by simulations.
    pub fn new() -> Self {
        Self::default()
    }

    /// A trail for a live session: tagged with a fresh session id and
    /// stamping every record with the current time.
    pub fn live() -> Self {
        Self {
            session: Some(Uuid::new_v4()),
            timestamps: true,
            ..Self::default()
        }
    }

    /// The owning session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session
    }

    /// All records in append order.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Roll entries only.
    pub fn rolls(&self) -> impl Iterator<Item = &RollAuditEntry> {
        self.records.iter().filter_map(|r| match r {
            AuditRecord::Roll(entry) => Some(entry),
            _ => None,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a note.
    pub fn annotate(&mut self, label: impl Into<String>, detail: impl Into<String>) -> u64 {
        let sequence = self.advance();
        self.records.push(AuditRecord::Annotation {
            sequence,
            label: label.into(),
            detail: detail.into(),
        });
        sequence
    }

    pub(crate) fn record_roll(
        &mut self,
        expression: String,
        source: EntropyKind,
        draws: Vec<u32>,
        proofs: Vec<String>,
        result: Result<(i64, Option<CapReason>), String>,
    ) -> u64 {
        let sequence = self.advance();
        let (total, capped, error) = match result {
            Ok((total, capped)) => (Some(total), capped, None),
            Err(err) => (None, None, Some(err)),
        };
        let recorded_at = self.stamp();
        self.records.push(AuditRecord::Roll(RollAuditEntry {
            sequence,
            expression,
            source,
            draws,
            proofs,
            total,
            capped,
            error,
            recorded_at,
        }));
        sequence
    }

    pub(crate) fn record_substitution(
        &mut self,
        from: EntropyKind,
        to: EntropyKind,
        reason: String,
    ) -> u64 {
        let sequence = self.advance();
        let recorded_at = self.stamp();
        self.records.push(AuditRecord::Substitution {
            sequence,
            from,
            to,
            reason,
            recorded_at,
        });
        sequence
    }

    /// Re-evaluate every roll entry against `source` and compare draws and
    /// totals. Replaying a deterministic trail against a fresh source with
    /// the same seed reproduces it exactly.
    pub fn replay<S: EntropySource + ?Sized>(
        &self,
        evaluator: &Evaluator,
        source: &mut S,
    ) -> DiceResult<ReplayReport> {
        let mut verified = 0;
        for entry in self.rolls() {
            let expr = parse(&entry.expression)?;
            let mut scratch = AuditTrail::new();
            let replayed = evaluator.evaluate_audited(&expr, source, &mut scratch);
            let matches = scratch
                .rolls()
                .next()
                .is_some_and(|r| r.draws == entry.draws && r.total == entry.total)
                && replayed.is_ok() == entry.total.is_some();
            if !matches {
                tracing::warn!(sequence = entry.sequence, "audit replay mismatch");
                return Ok(ReplayReport {
                    verified,
                    mismatch: Some(entry.sequence),
                });
            }
            verified += 1;
        }
        Ok(ReplayReport {
            verified,
            mismatch: None,
        })
    }

    fn advance(&mut self) -> u64 {
        if self.next_sequence == 0 {
            self.next_sequence = self.records.last().map_or(0, AuditRecord::sequence);
        }
        self.next_sequence += 1;
        self.next_sequence
    }

    fn stamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps.then(Utc::now)
    }
}
