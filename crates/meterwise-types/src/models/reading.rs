use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored reading.
///
/// Assigned from a persisted sequence counter, so two readings recorded
/// within the same millisecond still get distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadingId(pub u64);

impl ReadingId {
    /// Id following this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ReadingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded cumulative meter value.
///
/// `value` is the meter counter in kWh. It is expected to be non-decreasing
/// over the device lifetime, but this is not enforced: deltas computed from
/// readings are clamped at zero instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: ReadingId,
    /// When the reading was taken
    #[serde(rename = "date", alias = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Cumulative counter (kWh)
    pub value: f64,
}

impl Reading {
    pub fn new(id: ReadingId, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            id,
            timestamp,
            value,
        }
    }
}
