//! Recovery registrar subsystem
//!
//! Makes every known resource manager known to the coordinator's recovery
//! machinery at startup, then runs recovery so that branches left prepared
//! but unresolved by a crash are resolved before new work begins.
//!
//! # Lifecycle
//!
//! - `init(source)` - register all resources, run one recovery pass, mark
//!   the transaction manager ready
//! - `stop()` - release the coordinator (best-effort)
//!
//! # Invariants
//!
//! - Resource names are unique; a duplicate aborts startup
//! - Recovery runs only after every registration succeeded
//! - `begin` is refused until recovery completed

mod errors;
mod registrar;
mod source;

pub use errors::{RecoveryError, RecoveryErrorCode, RecoveryResult, Severity};
pub use registrar::{RecoveryRegistrar, RecoveryReport};
pub use source::{ResourceEntry, ResourceSource, StaticResourceSource};

pub use crate::xa::{NoopRecoveryCallback, RecoveryCallback};
