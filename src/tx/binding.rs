//! Coordinator binding
//!
//! `TransactionManager` is the facade applications demarcate transactions
//! through. It owns exactly one coordinator, explicitly constructed and
//! shared by `Arc`, and forwards every operation to it. It keeps no
//! transaction state of its own.
//!
//! # Lifecycle
//!
//! 1. `Starting` - constructed; the recovery registrar has not finished
//! 2. `Ready` - recovery completed, `begin` is accepted
//! 3. `Stopped` - coordinator released; `get_transaction` reports `None`
//!    and every other operation fails with `SystemFailure`

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{info, warn};

use crate::config::TxConfig;
use crate::observability::Event;
use crate::xa::XaResource;

use super::clock::SystemClock;
use super::coordinator::TransactionCoordinator;
use super::endpoint::EndpointState;
use super::errors::{StartupError, TxError, TxResult};
use super::handle::Transaction;
use super::local::{
    CoordinatorOptions, DecisionLog, FileDecisionLog, LocalCoordinator, MemoryDecisionLog,
};
use super::status::TransactionStatus;

/// Lifecycle phase of the transaction manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Ready,
    Stopped,
}

/// Transaction demarcation facade over a two-phase-commit coordinator
pub struct TransactionManager {
    coordinator: RwLock<Option<Arc<dyn TransactionCoordinator>>>,
    endpoint: Mutex<Option<EndpointState>>,
    lifecycle: Mutex<Lifecycle>,
}

impl TransactionManager {
    /// Construct the manager with the in-process coordinator.
    ///
    /// Reserves the coordinator endpoint (an endpoint that is already bound
    /// counts as running), opens the decision log and starts the coordinator.
    /// Any failure here is fatal to startup.
    pub fn start(config: &TxConfig) -> Result<Self, StartupError> {
        info!(event = %Event::BootStart, "starting transaction manager");

        let endpoint = EndpointState::reserve(&config.endpoint)?;

        let log: Arc<dyn DecisionLog> = match &config.decision_log_path {
            Some(path) => Arc::new(FileDecisionLog::open(path).map_err(|e| {
                StartupError::Coordinator(format!(
                    "cannot open decision log {}: {}",
                    path.display(),
                    e
                ))
            })?),
            None => Arc::new(MemoryDecisionLog::new()),
        };

        let coordinator = LocalCoordinator::new(
            CoordinatorOptions::from_config(config),
            Arc::new(SystemClock),
            log,
        )?;

        let manager = Self::with_coordinator(Arc::new(coordinator));
        *manager.endpoint_slot() = Some(endpoint);
        Ok(manager)
    }

    /// Bind the manager to an already constructed coordinator
    pub fn with_coordinator(coordinator: Arc<dyn TransactionCoordinator>) -> Self {
        Self {
            coordinator: RwLock::new(Some(coordinator)),
            endpoint: Mutex::new(None),
            lifecycle: Mutex::new(Lifecycle::Starting),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by the recovery registrar once recovery has completed
    pub(crate) fn mark_ready(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if *lifecycle == Lifecycle::Starting {
            *lifecycle = Lifecycle::Ready;
            info!(event = %Event::BootComplete, "transaction manager ready");
        }
    }

    /// The bound coordinator, unless it has been released
    pub fn coordinator(&self) -> TxResult<Arc<dyn TransactionCoordinator>> {
        self.coordinator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| TxError::system("coordinator is not running"))
    }

    /// Address of the coordinator endpoint held by this process
    pub fn endpoint_addr(&self) -> Option<SocketAddr> {
        self.endpoint_slot().as_ref().and_then(|e| e.local_addr())
    }

    fn endpoint_slot(&self) -> std::sync::MutexGuard<'_, Option<EndpointState>> {
        self.endpoint.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a transaction on the calling thread
    pub fn begin(&self) -> TxResult<()> {
        match self.lifecycle() {
            Lifecycle::Ready => self.coordinator()?.begin(),
            Lifecycle::Starting => Err(TxError::system(
                "transaction manager is not ready: recovery has not completed",
            )),
            Lifecycle::Stopped => Err(TxError::system("transaction manager is stopped")),
        }
    }

    pub fn commit(&self) -> TxResult<()> {
        self.coordinator()?.commit()
    }

    pub fn rollback(&self) -> TxResult<()> {
        self.coordinator()?.rollback()
    }

    pub fn get_status(&self) -> TxResult<TransactionStatus> {
        self.coordinator()?.status()
    }

    /// Handle of the calling thread's transaction. Reports `None` when the
    /// coordinator is not running instead of failing.
    pub fn get_transaction(&self) -> TxResult<Option<Transaction>> {
        match self.coordinator() {
            Ok(coordinator) => coordinator.transaction(),
            Err(_) => Ok(None),
        }
    }

    pub fn suspend(&self) -> TxResult<Option<Transaction>> {
        self.coordinator()?.suspend()
    }

    pub fn resume(&self, transaction: Transaction) -> TxResult<()> {
        self.coordinator()?.resume(transaction)
    }

    pub fn set_rollback_only(&self) -> TxResult<()> {
        self.coordinator()?.set_rollback_only()
    }

    /// `0` or negative restores the coordinator default
    pub fn set_transaction_timeout(&self, seconds: i64) -> TxResult<()> {
        self.coordinator()?.set_transaction_timeout(seconds)
    }

    pub fn enlist_resource(&self, name: &str, resource: Arc<dyn XaResource>) -> TxResult<()> {
        self.coordinator()?.enlist_resource(name, resource)
    }

    /// Status of any transaction handle, including completed ones
    pub fn status_of(&self, transaction: &Transaction) -> TxResult<TransactionStatus> {
        self.coordinator()?.status_of(transaction)
    }

    /// Release the coordinator and the endpoint. Best-effort and idempotent:
    /// a coordinator that fails to stop cleanly is logged, not reported.
    pub fn stop(&self) {
        *self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Lifecycle::Stopped;

        let coordinator = self
            .coordinator
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(coordinator) = coordinator else {
            return;
        };

        info!(event = %Event::ShutdownStart, "stopping transaction manager");
        if let Err(e) = coordinator.shutdown() {
            warn!(event = %Event::ShutdownFailed, error = %e, "coordinator did not stop cleanly");
        }
        self.endpoint_slot().take();
        info!(event = %Event::ShutdownComplete, "transaction manager stopped");
    }
}
