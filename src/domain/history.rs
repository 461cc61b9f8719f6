//! Entries of the append-only calculation log.

use time::OffsetDateTime;

/// A persisted calculation. Immutable once written.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub num1: f64,
    pub num2: f64,
    pub result: f64,
    pub created_at: OffsetDateTime,
}

/// Values supplied by the caller when appending; identity and timestamp are assigned by storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewHistoryRecord {
    pub num1: f64,
    pub num2: f64,
    pub result: f64,
}
