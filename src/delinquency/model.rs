//! Delinquency levels and the escalation ladder
//!
//! Classification reads the schedule and writes its own records; it never
//! mutates a schedule row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Graduated delinquency level of a loan
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "delinquency_level", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DelinquencyLevel {
    Current,
    Watch,
    Delinquent,
    DefaultCandidate,
}

impl DelinquencyLevel {
    pub fn is_delinquent(self) -> bool {
        self >= DelinquencyLevel::Delinquent
    }
}

/// Ladder from consecutive missed deductions to a level.
pub fn level_for(consecutive_missed: u32) -> DelinquencyLevel {
    match consecutive_missed {
        0 => DelinquencyLevel::Current,
        1 => DelinquencyLevel::Watch,
        2 | 3 => DelinquencyLevel::Delinquent,
        _ => DelinquencyLevel::DefaultCandidate,
    }
}

/// One scan observation for a loan
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct DelinquencyRecord {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub level: DelinquencyLevel,
    pub consecutive_missed: i32,
    pub scanned_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_ladder() {
        assert_eq!(level_for(0), DelinquencyLevel::Current);
        assert_eq!(level_for(1), DelinquencyLevel::Watch);
        assert_eq!(level_for(2), DelinquencyLevel::Delinquent);
        assert_eq!(level_for(3), DelinquencyLevel::Delinquent);
        assert_eq!(level_for(4), DelinquencyLevel::DefaultCandidate);
        assert_eq!(level_for(12), DelinquencyLevel::DefaultCandidate);
    }

    #[test]
    fn test_level_ordering() {
        assert!(DelinquencyLevel::Watch < DelinquencyLevel::Delinquent);
        assert!(!DelinquencyLevel::Watch.is_delinquent());
        assert!(DelinquencyLevel::DefaultCandidate.is_delinquent());
    }
}
