//! Participant and recovery callback traits

use std::sync::Arc;

use super::errors::XaResult;
use super::Xid;

/// Outcome of a successful prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    /// Branch is prepared and awaits the decision
    Commit,
    /// Branch made no changes and needs no second phase
    ReadOnly,
}

/// A resource manager that can take part in two-phase commit and be
/// recovered after a crash.
pub trait XaResource: Send + Sync {
    /// Phase one. An abort vote is reported as `XaError::RollbackVote`.
    fn prepare(&self, xid: &Xid) -> XaResult<Vote>;

    /// Phase two. `one_phase` skips the prepare round for single participants.
    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()>;

    fn rollback(&self, xid: &Xid) -> XaResult<()>;

    /// Branches that are prepared but not yet resolved
    fn recover(&self) -> XaResult<Vec<Xid>>;

    /// Discard knowledge of a heuristically completed branch
    fn forget(&self, xid: &Xid) -> XaResult<()>;
}

/// Strategy invoked once per resource after the recovery pass has finished
/// with it, handing the resource back to whoever owns its connection.
pub trait RecoveryCallback: Send + Sync {
    fn return_resource(&self, rm_name: &str, resource: &Arc<dyn XaResource>);
}

/// Accepts the returned resource and does nothing with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecoveryCallback;

impl RecoveryCallback for NoopRecoveryCallback {
    fn return_resource(&self, _rm_name: &str, _resource: &Arc<dyn XaResource>) {}
}
