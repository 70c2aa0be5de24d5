//! Transaction error types
//!
//! Demarcation errors are typed so callers can branch on them (retry the whole
//! transaction, give up, escalate to an operator). Anything unexpected from the
//! coordinator collapses into `SystemFailure`.
//!
//! Error codes:
//! - XATM_TX_NOT_SUPPORTED
//! - XATM_TX_ROLLBACK
//! - XATM_TX_HEURISTIC_MIXED
//! - XATM_TX_HEURISTIC_ROLLBACK
//! - XATM_TX_ILLEGAL_STATE
//! - XATM_TX_SECURITY
//! - XATM_TX_INVALID_TRANSACTION
//! - XATM_TX_SYSTEM
//! - XATM_STARTUP_ENDPOINT / XATM_STARTUP_COORDINATOR (FATAL)

use std::io;

use thiserror::Error;

use crate::xa::XaError;

/// Result type for transaction demarcation
pub type TxResult<T> = Result<T, TxError>;

/// Errors surfaced by demarcation operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxError {
    /// The context already has an active transaction (nested transactions
    /// are not supported)
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// The transaction was rolled back instead of committed
    #[error("transaction rolled back: {0}")]
    Rollback(String),

    /// Some participants committed and others rolled back
    #[error("heuristic mixed outcome: {0}")]
    HeuristicMixed(String),

    /// Every participant rolled back on its own
    #[error("heuristic rollback: {0}")]
    HeuristicRollback(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("security violation: {0}")]
    Security(String),

    /// Handle is stale, foreign, or was never suspended
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The coordinator itself is unhealthy
    #[error("system failure: {0}")]
    SystemFailure(String),
}

impl TxError {
    pub fn unsupported(msg: impl Into<String>) -> Self {
        TxError::UnsupportedOperation(msg.into())
    }

    pub fn rollback(msg: impl Into<String>) -> Self {
        TxError::Rollback(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        TxError::IllegalState(msg.into())
    }

    pub fn invalid_transaction(msg: impl Into<String>) -> Self {
        TxError::InvalidTransaction(msg.into())
    }

    pub fn system(msg: impl Into<String>) -> Self {
        TxError::SystemFailure(msg.into())
    }

    /// No transaction is bound to the calling context
    pub fn no_transaction() -> Self {
        TxError::illegal_state("no transaction is associated with the calling thread")
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            TxError::UnsupportedOperation(_) => "XATM_TX_NOT_SUPPORTED",
            TxError::Rollback(_) => "XATM_TX_ROLLBACK",
            TxError::HeuristicMixed(_) => "XATM_TX_HEURISTIC_MIXED",
            TxError::HeuristicRollback(_) => "XATM_TX_HEURISTIC_ROLLBACK",
            TxError::IllegalState(_) => "XATM_TX_ILLEGAL_STATE",
            TxError::Security(_) => "XATM_TX_SECURITY",
            TxError::InvalidTransaction(_) => "XATM_TX_INVALID_TRANSACTION",
            TxError::SystemFailure(_) => "XATM_TX_SYSTEM",
        }
    }

    /// Returns true when the transaction outcome is not what the caller asked
    /// for and needs an application or operator decision
    pub fn is_heuristic(&self) -> bool {
        matches!(
            self,
            TxError::HeuristicMixed(_) | TxError::HeuristicRollback(_)
        )
    }
}

impl From<XaError> for TxError {
    fn from(e: XaError) -> Self {
        TxError::SystemFailure(e.to_string())
    }
}

/// Fatal errors raised while constructing the transaction manager
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("coordinator endpoint {addr} is unavailable")]
    EndpointUnavailable {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("coordinator could not be created: {0}")]
    Coordinator(String),
}

impl StartupError {
    pub fn code(&self) -> &'static str {
        match self {
            StartupError::EndpointUnavailable { .. } => "XATM_STARTUP_ENDPOINT",
            StartupError::Coordinator(_) => "XATM_STARTUP_COORDINATOR",
        }
    }
}
