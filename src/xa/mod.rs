//! XA resource model
//!
//! Vocabulary shared by the coordinator and the resource managers it drives:
//!
//! - `Xid` - Global transaction identity plus branch qualifier
//! - `XaResource` - Participant capability (prepare/commit/rollback/recover)
//! - `RecoveryCallback` - Return-of-resource strategy invoked after recovery
//! - `MemoryResource` - Scripted in-memory participant

mod errors;
mod memory;
mod resource;
mod xid;

pub use errors::{HeuristicKind, XaError, XaResult};
pub use memory::{MemoryResource, VoteBehavior, XaCall};
pub use resource::{NoopRecoveryCallback, RecoveryCallback, Vote, XaResource};
pub use xid::{Xid, XATM_FORMAT_ID};
