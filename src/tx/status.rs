//! Transaction status values

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of the transaction associated with a context.
///
/// Discriminants follow the conventional XA/JTA numbering so that statuses
/// can be exchanged with other transaction managers as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Active = 0,
    MarkedRollback = 1,
    Prepared = 2,
    Committed = 3,
    RolledBack = 4,
    Unknown = 5,
    NoTransaction = 6,
    Preparing = 7,
    Committing = 8,
    RollingBack = 9,
}

impl TransactionStatus {
    /// Integer code of this status
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// Parse an integer status code
    pub fn from_code(code: i32) -> Option<Self> {
        let status = match code {
            0 => TransactionStatus::Active,
            1 => TransactionStatus::MarkedRollback,
            2 => TransactionStatus::Prepared,
            3 => TransactionStatus::Committed,
            4 => TransactionStatus::RolledBack,
            5 => TransactionStatus::Unknown,
            6 => TransactionStatus::NoTransaction,
            7 => TransactionStatus::Preparing,
            8 => TransactionStatus::Committing,
            9 => TransactionStatus::RollingBack,
            _ => return None,
        };
        Some(status)
    }

    /// Returns true once the outcome is decided and final
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Committed | TransactionStatus::RolledBack
        )
    }

    /// Returns true while the transaction can still do work or be ended
    /// by the application
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Active | TransactionStatus::MarkedRollback
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Active => "ACTIVE",
            TransactionStatus::MarkedRollback => "MARKED_ROLLBACK",
            TransactionStatus::Prepared => "PREPARED",
            TransactionStatus::Committed => "COMMITTED",
            TransactionStatus::RolledBack => "ROLLED_BACK",
            TransactionStatus::Unknown => "UNKNOWN",
            TransactionStatus::NoTransaction => "NO_TRANSACTION",
            TransactionStatus::Preparing => "PREPARING",
            TransactionStatus::Committing => "COMMITTING",
            TransactionStatus::RollingBack => "ROLLING_BACK",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 0..10 {
            let status = TransactionStatus::from_code(code).unwrap();
            assert_eq!(status.code(), code);
        }
        assert!(TransactionStatus::from_code(10).is_none());
        assert!(TransactionStatus::from_code(-1).is_none());
    }

    #[test]
    fn test_only_committed_and_rolled_back_are_terminal() {
        let terminal: Vec<_> = (0..10)
            .filter_map(TransactionStatus::from_code)
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(
            terminal,
            vec![TransactionStatus::Committed, TransactionStatus::RolledBack]
        );
    }

    #[test]
    fn test_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&TransactionStatus::MarkedRollback).unwrap();
        assert_eq!(json, "\"MARKED_ROLLBACK\"");
    }
}
