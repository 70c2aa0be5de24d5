//! Recovery registrar
//!
//! # Startup Sequence (strict order)
//!
//! 1. Enumerate resource managers from the resource source
//! 2. Register each under its stable name with the coordinator's recovery
//!    subsystem
//! 3. After every registration succeeded, run exactly one recovery pass
//! 4. Mark the transaction manager ready to accept `begin`
//!
//! Any failure aborts startup; the manager stays not-ready.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::observability::Event;
use crate::tx::{ResourceRecovery, TransactionManager};
use crate::xa::{NoopRecoveryCallback, RecoveryCallback};

use super::errors::{RecoveryError, RecoveryResult};
use super::source::ResourceSource;

/// Outcome of a successful `init`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Names registered, in registration order
    pub registered: Vec<String>,
    /// Per-resource recovery results
    pub resources: Vec<ResourceRecovery>,
}

impl RecoveryReport {
    /// Total in-doubt branches found across all resources
    pub fn in_doubt(&self) -> usize {
        self.resources.iter().map(|r| r.in_doubt).sum()
    }
}

/// Registers resource managers for crash recovery and owns the manager's
/// startup/shutdown lifecycle
pub struct RecoveryRegistrar {
    manager: Arc<TransactionManager>,
    callback: Arc<dyn RecoveryCallback>,
    initialized: AtomicBool,
}

impl RecoveryRegistrar {
    /// Registrar using the no-op recovery callback
    pub fn new(manager: Arc<TransactionManager>) -> Self {
        Self::with_callback(manager, Arc::new(NoopRecoveryCallback))
    }

    pub fn with_callback(
        manager: Arc<TransactionManager>,
        callback: Arc<dyn RecoveryCallback>,
    ) -> Self {
        Self {
            manager,
            callback,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Register every resource of `source` and run recovery.
    ///
    /// Runs once per registrar; a second call fails with
    /// `AlreadyInitialized`.
    pub fn init(&self, source: &dyn ResourceSource) -> RecoveryResult<RecoveryReport> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(RecoveryError::already_initialized());
        }

        let result = self.register_and_recover(source);
        match &result {
            Ok(report) => {
                info!(
                    event = %Event::RecoveryComplete,
                    resources = report.registered.len(),
                    in_doubt = report.in_doubt(),
                    "recovery complete"
                );
                self.manager.mark_ready();
            }
            Err(e) => {
                error!(event = %Event::RecoveryFailed, error = %e, "recovery failed");
            }
        }
        result
    }

    fn register_and_recover(&self, source: &dyn ResourceSource) -> RecoveryResult<RecoveryReport> {
        let coordinator = self
            .manager
            .coordinator()
            .map_err(RecoveryError::coordinator_unavailable)?;
        let recovery = coordinator.recovery();

        let entries = source.enumerate_resources();
        info!(
            event = %Event::ResourcesEnumerated,
            count = entries.len(),
            "resource managers enumerated"
        );

        let mut seen = HashSet::new();
        let mut registered = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.name.clone()) {
                return Err(RecoveryError::duplicate_resource(entry.name));
            }
            recovery
                .register_resource_manager(
                    &entry.name,
                    entry.resource,
                    &entry.name,
                    self.callback.clone(),
                )
                .map_err(|e| RecoveryError::registration_failed(&entry.name, e))?;

            info!(
                event = %Event::ResourceRegistered,
                resource = %entry.name,
                "registered XA resource for recovery"
            );
            registered.push(entry.name);
        }

        info!(event = %Event::RecoveryStart, resources = registered.len(), "starting recovery");
        let resources = recovery
            .start_resource_manager_recovery()
            .map_err(RecoveryError::recovery_failed)?;

        Ok(RecoveryReport {
            registered,
            resources,
        })
    }

    /// Release the coordinator. Never fails; problems are logged.
    pub fn stop(&self) {
        self.manager.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TxConfig;
    use crate::recovery::source::StaticResourceSource;
    use crate::recovery::RecoveryErrorCode;
    use crate::tx::Lifecycle;

    fn manager() -> Arc<TransactionManager> {
        let mut config = TxConfig::default();
        config.endpoint.enabled = false;
        config.reaper_interval_ms = 0;
        Arc::new(TransactionManager::start(&config).unwrap())
    }

    #[test]
    fn test_empty_source_completes() {
        let registrar = RecoveryRegistrar::new(manager());
        let report = registrar.init(&StaticResourceSource::new()).unwrap();
        assert!(report.registered.is_empty());
        assert!(report.resources.is_empty());
        assert_eq!(registrar.manager().lifecycle(), Lifecycle::Ready);
    }

    #[test]
    fn test_second_init_rejected() {
        let registrar = RecoveryRegistrar::new(manager());
        registrar.init(&StaticResourceSource::new()).unwrap();
        let err = registrar.init(&StaticResourceSource::new()).unwrap_err();
        assert_eq!(err.code(), RecoveryErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_init_after_stop_fails() {
        let registrar = RecoveryRegistrar::new(manager());
        registrar.stop();
        let err = registrar.init(&StaticResourceSource::new()).unwrap_err();
        assert_eq!(err.code(), RecoveryErrorCode::CoordinatorUnavailable);
    }
}
