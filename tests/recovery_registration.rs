//! Recovery Registration Tests
//!
//! Startup registration of resource managers and crash recovery:
//! - Every resource is registered before the single recovery pass
//! - Registration or recovery failure is fatal to startup
//! - Branches with a logged commit decision commit; the rest roll back
//! - Stop is best-effort and idempotent

use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use uuid::Uuid;
use xatm::config::TxConfig;
use xatm::recovery::{RecoveryErrorCode, RecoveryRegistrar, StaticResourceSource};
use xatm::tx::{
    CommitDecision, DecisionLog, FileDecisionLog, Lifecycle, LocalCoordinator, ResourceRecovery,
    Transaction, TransactionCoordinator, TransactionManager, TransactionRecovery,
    TransactionStatus, TxError, TxResult,
};
use xatm::xa::{
    MemoryResource, RecoveryCallback, XaCall, XaError, XaResource, XaResult, Xid, XATM_FORMAT_ID,
};

// =============================================================================
// Spy Coordinator
// =============================================================================

/// Coordinator that records recovery calls and delegates to a local engine.
struct SpyCoordinator {
    inner: LocalCoordinator,
    calls: Mutex<Vec<String>>,
    fail_shutdown: bool,
}

impl SpyCoordinator {
    fn new() -> Self {
        Self {
            inner: LocalCoordinator::with_defaults().unwrap(),
            calls: Mutex::new(Vec::new()),
            fail_shutdown: false,
        }
    }

    fn failing_shutdown() -> Self {
        Self {
            fail_shutdown: true,
            ..Self::new()
        }
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TransactionRecovery for SpyCoordinator {
    fn register_resource_manager(
        &self,
        name: &str,
        resource: Arc<dyn XaResource>,
        recovery_name: &str,
        callback: Arc<dyn RecoveryCallback>,
    ) -> XaResult<()> {
        self.record(format!("register:{}:{}", name, recovery_name));
        self.inner
            .recovery()
            .register_resource_manager(name, resource, recovery_name, callback)
    }

    fn start_resource_manager_recovery(&self) -> XaResult<Vec<ResourceRecovery>> {
        self.record("recover".to_string());
        self.inner.recovery().start_resource_manager_recovery()
    }

    fn registered_names(&self) -> Vec<String> {
        self.inner.recovery().registered_names()
    }
}

impl TransactionCoordinator for SpyCoordinator {
    fn begin(&self) -> TxResult<()> {
        self.inner.begin()
    }

    fn commit(&self) -> TxResult<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> TxResult<()> {
        self.inner.rollback()
    }

    fn suspend(&self) -> TxResult<Option<Transaction>> {
        self.inner.suspend()
    }

    fn resume(&self, transaction: Transaction) -> TxResult<()> {
        self.inner.resume(transaction)
    }

    fn status(&self) -> TxResult<TransactionStatus> {
        self.inner.status()
    }

    fn transaction(&self) -> TxResult<Option<Transaction>> {
        self.inner.transaction()
    }

    fn status_of(&self, transaction: &Transaction) -> TxResult<TransactionStatus> {
        self.inner.status_of(transaction)
    }

    fn set_rollback_only(&self) -> TxResult<()> {
        self.inner.set_rollback_only()
    }

    fn set_transaction_timeout(&self, seconds: i64) -> TxResult<()> {
        self.inner.set_transaction_timeout(seconds)
    }

    fn enlist_resource(&self, name: &str, resource: Arc<dyn XaResource>) -> TxResult<()> {
        self.inner.enlist_resource(name, resource)
    }

    fn recovery(&self) -> &dyn TransactionRecovery {
        self
    }

    fn shutdown(&self) -> TxResult<()> {
        self.record("shutdown".to_string());
        self.inner.shutdown()?;
        if self.fail_shutdown {
            return Err(TxError::system("shutdown hook failed"));
        }
        Ok(())
    }
}

/// Callback that records every resource handed back after recovery.
#[derive(Default)]
struct SpyCallback {
    returned: Mutex<Vec<String>>,
}

impl RecoveryCallback for SpyCallback {
    fn return_resource(&self, rm_name: &str, _resource: &Arc<dyn XaResource>) {
        self.returned.lock().unwrap().push(rm_name.to_string());
    }
}

fn spy_manager(spy: Arc<SpyCoordinator>) -> Arc<TransactionManager> {
    Arc::new(TransactionManager::with_coordinator(spy))
}

fn config() -> TxConfig {
    let mut config = TxConfig::default();
    config.endpoint.enabled = false;
    config.reaper_interval_ms = 0;
    config
}

// =============================================================================
// Registration Order
// =============================================================================

/// Both resources are registered, then recovery runs exactly once.
#[test]
fn test_registration_precedes_single_recovery_pass() {
    let spy = Arc::new(SpyCoordinator::new());
    let manager = spy_manager(spy.clone());
    let registrar = RecoveryRegistrar::new(manager.clone());

    let source = StaticResourceSource::new()
        .with("ledger-db", Arc::new(MemoryResource::new("ledger-db")))
        .with("audit-log", Arc::new(MemoryResource::new("audit-log")));

    let report = registrar.init(&source).unwrap();

    assert_eq!(
        spy.calls(),
        vec![
            "register:ledger-db:ledger-db",
            "register:audit-log:audit-log",
            "recover",
        ]
    );
    assert_eq!(report.registered, vec!["ledger-db", "audit-log"]);
    assert_eq!(spy.registered_names(), vec!["ledger-db", "audit-log"]);
    assert_eq!(manager.lifecycle(), Lifecycle::Ready);
}

/// No resources still runs one recovery pass and readies the manager.
#[test]
fn test_zero_resources() {
    let spy = Arc::new(SpyCoordinator::new());
    let manager = spy_manager(spy.clone());

    let report = RecoveryRegistrar::new(manager.clone())
        .init(&StaticResourceSource::new())
        .unwrap();

    assert!(report.registered.is_empty());
    assert_eq!(spy.calls(), vec!["recover"]);
    manager.begin().unwrap();
    manager.commit().unwrap();
}

/// Duplicate names abort startup before recovery runs.
#[test]
fn test_duplicate_resource_name_rejected() {
    let spy = Arc::new(SpyCoordinator::new());
    let manager = spy_manager(spy.clone());

    let source = StaticResourceSource::new()
        .with("ledger-db", Arc::new(MemoryResource::new("ledger-db")))
        .with("ledger-db", Arc::new(MemoryResource::new("ledger-db")));

    let err = RecoveryRegistrar::new(manager.clone()).init(&source).unwrap_err();

    assert_eq!(err.code(), RecoveryErrorCode::DuplicateResource);
    assert_eq!(err.resource(), Some("ledger-db"));
    assert!(err.is_fatal());
    assert!(!spy.calls().contains(&"recover".to_string()));
    assert_eq!(manager.lifecycle(), Lifecycle::Starting);
    assert!(matches!(manager.begin(), Err(TxError::SystemFailure(_))));
}

/// The callback sees every resource once its scan has finished.
#[test]
fn test_callback_receives_each_resource() {
    let spy = Arc::new(SpyCoordinator::new());
    let callback = Arc::new(SpyCallback::default());
    let registrar = RecoveryRegistrar::with_callback(spy_manager(spy), callback.clone());

    let source = StaticResourceSource::new()
        .with("ledger-db", Arc::new(MemoryResource::new("ledger-db")))
        .with("audit-log", Arc::new(MemoryResource::new("audit-log")));
    registrar.init(&source).unwrap();

    assert_eq!(
        *callback.returned.lock().unwrap(),
        vec!["ledger-db".to_string(), "audit-log".to_string()]
    );
}

// =============================================================================
// Recovery Failures
// =============================================================================

/// A resource that cannot list its branches makes startup fail.
#[test]
fn test_recover_failure_is_fatal() {
    let manager = Arc::new(TransactionManager::start(&config()).unwrap());
    let source = StaticResourceSource::new()
        .with("ledger-db", Arc::new(MemoryResource::new("ledger-db").failing_recover()));

    let err = RecoveryRegistrar::new(manager.clone()).init(&source).unwrap_err();

    assert_eq!(err.code(), RecoveryErrorCode::RecoveryFailed);
    assert!(err.is_fatal());
    assert!(matches!(
        std::error::Error::source(&err)
            .and_then(|s| s.downcast_ref::<XaError>()),
        Some(XaError::ResourceFailure(_))
    ));
    assert_eq!(manager.lifecycle(), Lifecycle::Starting);
}

/// The registrar runs once.
#[test]
fn test_init_twice_rejected() {
    let spy = Arc::new(SpyCoordinator::new());
    let registrar = RecoveryRegistrar::new(spy_manager(spy.clone()));

    registrar.init(&StaticResourceSource::new()).unwrap();
    let err = registrar.init(&StaticResourceSource::new()).unwrap_err();

    assert_eq!(err.code(), RecoveryErrorCode::AlreadyInitialized);
    assert_eq!(spy.calls(), vec!["recover"]);
}

// =============================================================================
// In-Doubt Resolution
// =============================================================================

/// A logged commit decision commits its branches; others roll back.
#[test]
fn test_in_doubt_branches_resolved_from_decision_log() {
    let dir = TempDir::new().unwrap();
    let log_path = dir.path().join("decisions.log");

    let committed = Uuid::new_v4();
    let abandoned = Uuid::new_v4();
    {
        let log = FileDecisionLog::open(&log_path).unwrap();
        log.record_commit(&CommitDecision::new(
            committed,
            vec!["ledger-db".to_string(), "audit-log".to_string()],
        ))
        .unwrap();
    }

    let ledger_commit = Xid::new(XATM_FORMAT_ID, committed, 1);
    let ledger_abandoned = Xid::new(XATM_FORMAT_ID, abandoned, 1);
    let audit_commit = Xid::new(XATM_FORMAT_ID, committed, 2);
    let foreign = Xid::new(0x1234, Uuid::new_v4(), 1);

    let ledger = Arc::new(
        MemoryResource::new("ledger-db").with_in_doubt([ledger_commit, ledger_abandoned, foreign]),
    );
    let audit = Arc::new(MemoryResource::new("audit-log").with_in_doubt([audit_commit]));

    let mut config = config();
    config.decision_log_path = Some(log_path.clone());
    let manager = Arc::new(TransactionManager::start(&config).unwrap());
    let registrar = RecoveryRegistrar::new(manager);

    let source = StaticResourceSource::new()
        .with("ledger-db", ledger.clone())
        .with("audit-log", audit.clone());
    let report = registrar.init(&source).unwrap();

    assert!(ledger.is_committed(&ledger_commit));
    assert!(ledger.is_rolled_back(&ledger_abandoned));
    assert!(audit.is_committed(&audit_commit));
    assert_eq!(ledger.in_doubt(), vec![foreign]);

    assert_eq!(report.in_doubt(), 3);
    assert_eq!(
        report.resources[0],
        ResourceRecovery {
            name: "ledger-db".to_string(),
            in_doubt: 2,
            committed: 1,
            rolled_back: 1,
            heuristic: 0,
        }
    );

    registrar.stop();

    // Every participant was scanned, so the decision is gone.
    let reopened = FileDecisionLog::open(&log_path).unwrap();
    assert!(reopened.pending().is_empty());
    assert!(!reopened.is_committed(&committed));
}

/// Recovery happens before any resource call from new transactions.
#[test]
fn test_recover_is_first_call_on_resource() {
    let manager = Arc::new(TransactionManager::start(&config()).unwrap());
    let registrar = RecoveryRegistrar::new(manager.clone());
    let rm = Arc::new(MemoryResource::new("ledger-db"));

    registrar
        .init(&StaticResourceSource::new().with("ledger-db", rm.clone()))
        .unwrap();
    manager.begin().unwrap();
    manager.enlist_resource("ledger-db", rm.clone()).unwrap();
    manager.commit().unwrap();

    let calls = rm.calls();
    assert_eq!(calls[0], XaCall::Recover);
    assert!(matches!(calls[1], XaCall::Commit { one_phase: true, .. }));
}

// =============================================================================
// Stop
// =============================================================================

/// Stop shuts the coordinator down once, even when called again.
#[test]
fn test_stop_is_idempotent() {
    let spy = Arc::new(SpyCoordinator::new());
    let manager = spy_manager(spy.clone());
    let registrar = RecoveryRegistrar::new(manager.clone());
    registrar.init(&StaticResourceSource::new()).unwrap();

    registrar.stop();
    registrar.stop();

    let shutdowns = spy.calls().iter().filter(|c| *c == "shutdown").count();
    assert_eq!(shutdowns, 1);
    assert_eq!(manager.lifecycle(), Lifecycle::Stopped);
    assert_eq!(manager.get_transaction().unwrap(), None);
}

/// A failing coordinator shutdown does not escape stop.
#[test]
fn test_stop_is_best_effort() {
    let spy = Arc::new(SpyCoordinator::failing_shutdown());
    let manager = spy_manager(spy.clone());
    let registrar = RecoveryRegistrar::new(manager.clone());
    registrar.init(&StaticResourceSource::new()).unwrap();

    registrar.stop();

    assert_eq!(manager.lifecycle(), Lifecycle::Stopped);
    assert!(matches!(manager.begin(), Err(TxError::SystemFailure(_))));
}

/// Stop before init leaves nothing to recover.
#[test]
fn test_stop_before_init() {
    let spy = Arc::new(SpyCoordinator::new());
    let registrar = RecoveryRegistrar::new(spy_manager(spy.clone()));

    registrar.stop();
    let err = registrar.init(&StaticResourceSource::new()).unwrap_err();

    assert_eq!(err.code(), RecoveryErrorCode::CoordinatorUnavailable);
    assert_eq!(spy.calls(), vec!["shutdown"]);
}
