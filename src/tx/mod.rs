//! Coordinator binding
//!
//! Transaction demarcation over a pluggable two-phase-commit coordinator.
//!
//! - `TransactionManager` - the facade; owns one coordinator
//! - `TransactionCoordinator` / `TransactionRecovery` - engine capabilities
//! - `LocalCoordinator` - in-process engine with decision log and reaper
//! - `Transaction` / `TransactionStatus` - handle and status vocabulary
//!
//! The calling context of every operation is the current thread: a thread
//! holds at most one transaction, and `suspend`/`resume` move a transaction
//! between threads.

mod binding;
mod clock;
mod coordinator;
mod endpoint;
mod errors;
mod handle;
mod local;
mod status;

pub use binding::{Lifecycle, TransactionManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{ResourceRecovery, TransactionCoordinator, TransactionRecovery};
pub use endpoint::EndpointState;
pub use errors::{StartupError, TxError, TxResult};
pub use handle::Transaction;
pub use local::{
    CommitDecision, CoordinatorOptions, DecisionLog, FileDecisionLog, LocalCoordinator,
    MemoryDecisionLog,
};
pub use status::TransactionStatus;
