//! Human-readable document numbers (`Q-YYYYMMDD-NNNN`, `CALC-YYYYMMDD-NNNN`).
//!
//! The daily sequence itself is allocated by the store inside the same unit of
//! work that inserts the row; this module only formats.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of numbered document; determines the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Quote,
    CostCalculation,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Quote => "Q",
            DocumentKind::CostCalculation => "CALC",
        }
    }
}

/// A document number: kind, day and daily sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentNumber {
    pub kind: DocumentKind,
    pub day: NaiveDate,
    pub sequence: u32,
}

impl DocumentNumber {
    pub fn new(kind: DocumentKind, day: NaiveDate, sequence: u32) -> Self {
        Self {
            kind,
            day,
            sequence,
        }
    }
}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.kind.prefix(),
            self.day.format("%Y%m%d"),
            self.sequence
        )
    }
}
