//! Coordinator capability traits
//!
//! Any two-phase-commit engine that implements `TransactionCoordinator` can
//! back the `TransactionManager`. The calling context of every demarcation
//! operation is the current thread.

use std::sync::Arc;

use serde::Serialize;

use crate::xa::{RecoveryCallback, XaResource, XaResult};

use super::errors::TxResult;
use super::handle::Transaction;
use super::status::TransactionStatus;

/// Recovery outcome for one registered resource manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceRecovery {
    /// Registered resource name
    pub name: String,
    /// In-doubt branches reported by the resource
    pub in_doubt: usize,
    /// Branches resolved by committing (a commit decision was logged)
    pub committed: usize,
    /// Branches resolved by rolling back (presumed abort)
    pub rolled_back: usize,
    /// Branches the resource had already completed heuristically
    pub heuristic: usize,
}

/// The coordinator's crash-recovery facility
pub trait TransactionRecovery: Send + Sync {
    /// Make a resource manager known under `name`. Names are unique; a second
    /// registration under the same name is rejected.
    fn register_resource_manager(
        &self,
        name: &str,
        resource: Arc<dyn XaResource>,
        recovery_name: &str,
        callback: Arc<dyn RecoveryCallback>,
    ) -> XaResult<()>;

    /// Run one recovery pass across every registered resource manager.
    fn start_resource_manager_recovery(&self) -> XaResult<Vec<ResourceRecovery>>;

    /// Names registered so far, in registration order
    fn registered_names(&self) -> Vec<String>;
}

/// Transaction demarcation capability of a two-phase-commit engine
pub trait TransactionCoordinator: Send + Sync {
    fn begin(&self) -> TxResult<()>;

    fn commit(&self) -> TxResult<()>;

    fn rollback(&self) -> TxResult<()>;

    /// Detach the current transaction from the calling thread
    fn suspend(&self) -> TxResult<Option<Transaction>>;

    fn resume(&self, transaction: Transaction) -> TxResult<()>;

    fn status(&self) -> TxResult<TransactionStatus>;

    fn transaction(&self) -> TxResult<Option<Transaction>>;

    /// Status of any transaction this coordinator issued, including ones
    /// that have already completed. `Unknown` once it is no longer tracked.
    fn status_of(&self, transaction: &Transaction) -> TxResult<TransactionStatus>;

    fn set_rollback_only(&self) -> TxResult<()>;

    /// Timeout for transactions begun afterwards on the calling thread.
    /// `0` or negative restores the coordinator default.
    fn set_transaction_timeout(&self, seconds: i64) -> TxResult<()>;

    /// Enlist a participant in the calling thread's transaction
    fn enlist_resource(&self, name: &str, resource: Arc<dyn XaResource>) -> TxResult<()>;

    fn recovery(&self) -> &dyn TransactionRecovery;

    /// Halt background work. The coordinator refuses work afterwards.
    fn shutdown(&self) -> TxResult<()>;
}
