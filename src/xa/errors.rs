//! XA protocol errors

use std::fmt;

use thiserror::Error;

use super::Xid;

/// Result type for resource manager calls
pub type XaResult<T> = Result<T, XaError>;

/// How a participant resolved a branch on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicKind {
    /// Branch was committed unilaterally
    Commit,
    /// Branch was rolled back unilaterally
    Rollback,
    /// Part of the branch committed, part rolled back
    Mixed,
    /// Outcome of the branch is unknown
    Hazard,
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeuristicKind::Commit => "commit",
            HeuristicKind::Rollback => "rollback",
            HeuristicKind::Mixed => "mixed",
            HeuristicKind::Hazard => "hazard",
        };
        f.write_str(s)
    }
}

/// Errors raised by resource managers and the recovery subsystem
#[derive(Debug, Clone, Error)]
pub enum XaError {
    #[error("resource voted to roll back {xid}: {reason}")]
    RollbackVote { xid: Xid, reason: String },

    #[error("heuristic {kind} outcome for {xid}")]
    Heuristic { xid: Xid, kind: HeuristicKind },

    #[error("unknown transaction branch {0}")]
    UnknownXid(Xid),

    #[error("resource manager failure: {0}")]
    ResourceFailure(String),

    #[error("XA protocol error: {0}")]
    Protocol(String),
}

impl XaError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            XaError::RollbackVote { .. } => "XATM_XA_RB",
            XaError::Heuristic { .. } => "XATM_XA_HEUR",
            XaError::UnknownXid(_) => "XATM_XA_NOTA",
            XaError::ResourceFailure(_) => "XATM_XA_RMFAIL",
            XaError::Protocol(_) => "XATM_XA_PROTO",
        }
    }

    /// Returns the heuristic kind when this is a heuristic outcome
    pub fn heuristic(&self) -> Option<HeuristicKind> {
        match self {
            XaError::Heuristic { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
