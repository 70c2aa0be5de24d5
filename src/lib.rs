//! xatm - transaction manager facade with XA crash recovery
//!
//! Transaction demarcation (begin/commit/rollback/suspend/resume) over a
//! pluggable two-phase-commit coordinator, plus startup registration of
//! resource managers so branches left in doubt by a crash get resolved.
//!
//! ```ignore
//! use std::sync::Arc;
//! use xatm::config::TxConfig;
//! use xatm::recovery::{RecoveryRegistrar, StaticResourceSource};
//! use xatm::tx::TransactionManager;
//!
//! let manager = Arc::new(TransactionManager::start(&TxConfig::default())?);
//! let registrar = RecoveryRegistrar::new(manager.clone());
//! registrar.init(&StaticResourceSource::new())?;
//!
//! manager.begin()?;
//! manager.commit()?;
//! registrar.stop();
//! ```

pub mod cli;
pub mod config;
pub mod observability;
pub mod recovery;
pub mod tx;
pub mod xa;
