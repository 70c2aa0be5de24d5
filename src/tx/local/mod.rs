//! In-process two-phase-commit coordinator
//!
//! `LocalCoordinator` is the engine behind `TransactionCoordinator` used by
//! default. It keeps the transaction table in memory, records commit
//! decisions in a `DecisionLog`, and rolls back transactions that outlive
//! their deadline, both lazily before every operation and from a background
//! reaper thread.
//!
//! # Commit protocol
//!
//! 1. Rollback-only transactions are rolled back and reported as `Rollback`
//! 2. A single participant is committed in one phase
//! 3. Otherwise every participant is prepared; any abort vote or prepare
//!    failure rolls all of them back
//! 4. The commit decision is logged before any second-phase commit
//! 5. Prepared participants are committed; heuristic outcomes are classified
//! 6. The decision is forgotten once every branch is resolved

mod decision_log;
mod reaper;
mod recovery;
mod table;

pub use decision_log::{CommitDecision, DecisionLog, FileDecisionLog, MemoryDecisionLog};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{TxConfig, MAX_TIMEOUT_SECS};
use crate::observability::Event;
use crate::xa::{HeuristicKind, Vote, XaError, XaResource, Xid};

use super::clock::{Clock, SystemClock};
use super::coordinator::{TransactionCoordinator, TransactionRecovery};
use super::errors::{StartupError, TxError, TxResult};
use super::handle::Transaction;
use super::status::TransactionStatus;

use reaper::Reaper;
use recovery::LocalRecovery;
use table::{
    rollback_participants, set_thread_timeout, thread_timeout, Participant, TxEntry, TxTable,
};

/// Tunables of the in-process coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Timeout for threads that have not set their own
    pub default_timeout: Duration,
    /// Upper bound on open transactions
    pub max_active: usize,
    /// Background sweep period; `None` disables the reaper thread
    pub reaper_interval: Option<Duration>,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self::from_config(&TxConfig::default())
    }
}

impl CoordinatorOptions {
    pub fn from_config(config: &TxConfig) -> Self {
        Self {
            default_timeout: config.default_timeout(),
            max_active: config.max_active_transactions,
            reaper_interval: config.reaper_interval(),
        }
    }
}

/// State shared between the coordinator and its reaper thread
pub(crate) struct Shared {
    id: Uuid,
    table: Mutex<TxTable>,
    clock: Arc<dyn Clock>,
    options: CoordinatorOptions,
    running: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, TxTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Roll back every open transaction past its deadline. Returns how many
    /// were rolled back.
    pub(crate) fn expire_overdue(&self) -> usize {
        let expired = self.lock().take_expired(self.clock.now());
        for entry in &expired {
            warn!(
                event = %Event::TxTimeout,
                xid = %entry.xid,
                participants = entry.participants.len(),
                "transaction timed out and was rolled back"
            );
            rollback_participants(&entry.participants);
        }
        expired.len()
    }
}

/// In-process coordinator
pub struct LocalCoordinator {
    shared: Arc<Shared>,
    log: Arc<dyn DecisionLog>,
    recovery: LocalRecovery,
    reaper: Mutex<Option<Reaper>>,
}

impl LocalCoordinator {
    /// Create a coordinator and start its reaper thread if enabled.
    pub fn new(
        options: CoordinatorOptions,
        clock: Arc<dyn Clock>,
        log: Arc<dyn DecisionLog>,
    ) -> Result<Self, StartupError> {
        let reaper_interval = options.reaper_interval;
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            table: Mutex::new(TxTable::default()),
            clock,
            options,
            running: AtomicBool::new(true),
        });

        let reaper = match reaper_interval {
            Some(interval) => Some(Reaper::spawn(shared.clone(), interval).map_err(|e| {
                StartupError::Coordinator(format!("cannot start timeout reaper: {}", e))
            })?),
            None => None,
        };

        Ok(Self {
            shared,
            recovery: LocalRecovery::new(log.clone()),
            log,
            reaper: Mutex::new(reaper),
        })
    }

    /// Coordinator with default options, the system clock and an in-memory
    /// decision log
    pub fn with_defaults() -> Result<Self, StartupError> {
        Self::new(
            CoordinatorOptions::default(),
            Arc::new(SystemClock),
            Arc::new(MemoryDecisionLog::new()),
        )
    }

    /// Instance id stamped on every handle this coordinator issues
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Number of open transactions
    pub fn active_count(&self) -> usize {
        self.shared.lock().len()
    }

    pub fn decision_log(&self) -> &Arc<dyn DecisionLog> {
        &self.log
    }

    /// Roll back overdue transactions now instead of waiting for the reaper
    pub fn expire_overdue(&self) -> usize {
        self.shared.expire_overdue()
    }

    fn ensure_running(&self) -> TxResult<()> {
        if self.shared.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TxError::system("coordinator is not running"))
        }
    }

    /// Common entry: refuse work after shutdown, expire overdue transactions,
    /// and identify the calling thread.
    fn enter(&self) -> TxResult<ThreadId> {
        self.ensure_running()?;
        self.shared.expire_overdue();
        Ok(thread::current().id())
    }

    fn handle(&self, xid: Xid) -> Transaction {
        Transaction::new(xid, self.shared.id)
    }

    fn set_status(&self, xid: &Xid, status: TransactionStatus) {
        self.shared.lock().set_status(&xid.global_id(), status);
    }

    fn finish(&self, xid: &Xid, status: TransactionStatus) {
        self.shared.lock().finish(&xid.global_id(), status);
    }

    fn commit_one_phase(&self, xid: &Xid, p: &Participant) -> TxResult<()> {
        self.set_status(xid, TransactionStatus::Committing);
        match p.resource.commit(&p.branch, true) {
            Ok(()) => Ok(()),
            Err(XaError::RollbackVote { reason, .. }) => Err(TxError::rollback(format!(
                "participant '{}' rolled back: {}",
                p.name, reason
            ))),
            Err(XaError::Heuristic { kind, .. }) => {
                self.forget_branch(p);
                match kind {
                    HeuristicKind::Commit => Ok(()),
                    HeuristicKind::Rollback => Err(TxError::HeuristicRollback(format!(
                        "participant '{}' rolled back heuristically",
                        p.name
                    ))),
                    HeuristicKind::Mixed | HeuristicKind::Hazard => {
                        Err(TxError::HeuristicMixed(format!(
                            "participant '{}' reported heuristic {}",
                            p.name, kind
                        )))
                    }
                }
            }
            Err(e) => {
                rollback_participants(std::slice::from_ref(p));
                Err(TxError::rollback(format!(
                    "participant '{}' failed during one-phase commit: {}",
                    p.name, e
                )))
            }
        }
    }

    fn commit_two_phase(&self, xid: &Xid, participants: &[Participant]) -> TxResult<()> {
        // Phase 1
        self.set_status(xid, TransactionStatus::Preparing);
        let mut prepared: Vec<&Participant> = Vec::new();
        let mut read_only: Vec<usize> = Vec::new();
        for (i, p) in participants.iter().enumerate() {
            match p.resource.prepare(&p.branch) {
                Ok(Vote::Commit) => prepared.push(p),
                Ok(Vote::ReadOnly) => read_only.push(i),
                Err(e) => {
                    self.set_status(xid, TransactionStatus::RollingBack);
                    // A rollback vote means the participant already rolled
                    // its branch back; read-only voters have no branch left.
                    let skip = matches!(e, XaError::RollbackVote { .. });
                    let others: Vec<Participant> = participants
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| !read_only.contains(j) && (*j != i || !skip))
                        .map(|(_, p)| p.clone())
                        .collect();
                    rollback_participants(&others);
                    return Err(TxError::rollback(format!(
                        "participant '{}' did not prepare: {}",
                        p.name, e
                    )));
                }
            }
        }

        if prepared.is_empty() {
            return Ok(());
        }
        self.set_status(xid, TransactionStatus::Prepared);

        let decision = CommitDecision::new(
            xid.global_id(),
            prepared.iter().map(|p| p.name.clone()).collect(),
        );
        if let Err(e) = self.log.record_commit(&decision) {
            self.set_status(xid, TransactionStatus::RollingBack);
            let owned: Vec<Participant> = prepared.into_iter().cloned().collect();
            rollback_participants(&owned);
            return Err(TxError::rollback(format!(
                "commit decision for {} could not be logged: {}",
                xid, e
            )));
        }

        // Phase 2
        self.set_status(xid, TransactionStatus::Committing);
        let voted_commit = prepared.len();
        let mut committed = 0;
        let mut heuristic_rollback = 0;
        let mut mixed = false;
        let mut unresolved = 0;

        for p in &prepared {
            match p.resource.commit(&p.branch, false) {
                Ok(()) => committed += 1,
                Err(XaError::Heuristic { kind, .. }) => {
                    warn!(
                        event = %Event::TxHeuristic,
                        resource = %p.name,
                        xid = %p.branch,
                        heuristic = %kind,
                        "participant resolved heuristically"
                    );
                    self.forget_branch(p);
                    match kind {
                        HeuristicKind::Commit => committed += 1,
                        HeuristicKind::Rollback => heuristic_rollback += 1,
                        HeuristicKind::Mixed | HeuristicKind::Hazard => mixed = true,
                    }
                }
                Err(e) => {
                    unresolved += 1;
                    warn!(
                        event = %Event::TxBranchInDoubt,
                        resource = %p.name,
                        xid = %p.branch,
                        error = %e,
                        "commit of prepared branch failed; left for recovery"
                    );
                }
            }
        }

        if unresolved == 0 {
            if let Err(e) = self.log.forget(&xid.global_id()) {
                warn!(xid = %xid, error = %e, "failed to forget commit decision");
            }
        }

        if mixed || (heuristic_rollback > 0 && committed > 0) {
            Err(TxError::HeuristicMixed(format!(
                "{} of {} prepared participants rolled back heuristically",
                heuristic_rollback, voted_commit
            )))
        } else if heuristic_rollback > 0 {
            Err(TxError::HeuristicRollback(format!(
                "all prepared participants of {} rolled back heuristically",
                xid
            )))
        } else {
            Ok(())
        }
    }

    fn forget_branch(&self, p: &Participant) {
        if let Err(e) = p.resource.forget(&p.branch) {
            warn!(resource = %p.name, xid = %p.branch, error = %e, "forget failed");
        }
    }
}

impl TransactionCoordinator for LocalCoordinator {
    fn begin(&self) -> TxResult<()> {
        let thread = self.enter()?;
        let mut table = self.shared.lock();

        if let Some(current) = table.current(thread) {
            return Err(TxError::unsupported(format!(
                "thread already has transaction {}; nested transactions are not supported",
                current.xid
            )));
        }
        if table.len() >= self.shared.options.max_active {
            return Err(TxError::system(format!(
                "transaction table is full ({} open transactions)",
                table.len()
            )));
        }

        let timeout = thread_timeout(self.shared.id).unwrap_or(self.shared.options.default_timeout);
        let deadline = self.shared.clock.now().checked_add(timeout).ok_or_else(|| {
            TxError::system(format!(
                "transaction timeout of {}s is out of range",
                timeout.as_secs()
            ))
        })?;
        let xid = Xid::generate();
        table.insert(thread, TxEntry::new(xid, deadline));

        info!(event = %Event::TxBegin, xid = %xid, timeout_secs = timeout.as_secs(), "transaction begun");
        Ok(())
    }

    fn commit(&self) -> TxResult<()> {
        let thread = self.enter()?;
        let (xid, participants, rollback_only) = {
            let mut table = self.shared.lock();
            let entry = table.current_mut(thread).ok_or_else(TxError::no_transaction)?;
            if !entry.status.is_open() {
                return Err(TxError::illegal_state(format!(
                    "transaction {} is {}",
                    entry.xid, entry.status
                )));
            }
            let rollback_only = entry.status == TransactionStatus::MarkedRollback;
            entry.status = if rollback_only {
                TransactionStatus::RollingBack
            } else {
                TransactionStatus::Preparing
            };
            (entry.xid, entry.participants.clone(), rollback_only)
        };

        if rollback_only {
            rollback_participants(&participants);
            self.finish(&xid, TransactionStatus::RolledBack);
            info!(event = %Event::TxRollback, xid = %xid, "rollback-only transaction rolled back at commit");
            return Err(TxError::rollback(format!(
                "transaction {} was marked rollback-only",
                xid
            )));
        }

        let result = match participants.as_slice() {
            [] => Ok(()),
            [single] => self.commit_one_phase(&xid, single),
            many => self.commit_two_phase(&xid, many),
        };

        let status = match &result {
            Ok(()) | Err(TxError::HeuristicMixed(_)) => TransactionStatus::Committed,
            Err(_) => TransactionStatus::RolledBack,
        };
        self.finish(&xid, status);

        match &result {
            Ok(()) => info!(event = %Event::TxCommit, xid = %xid, "transaction committed"),
            Err(e) => info!(event = %Event::TxRollback, xid = %xid, error = %e, "commit did not succeed"),
        }
        result
    }

    fn rollback(&self) -> TxResult<()> {
        let thread = self.enter()?;
        let (xid, participants) = {
            let mut table = self.shared.lock();
            let entry = table.current_mut(thread).ok_or_else(TxError::no_transaction)?;
            if !entry.status.is_open() {
                return Err(TxError::illegal_state(format!(
                    "transaction {} is {}",
                    entry.xid, entry.status
                )));
            }
            entry.status = TransactionStatus::RollingBack;
            (entry.xid, entry.participants.clone())
        };

        rollback_participants(&participants);
        self.finish(&xid, TransactionStatus::RolledBack);
        info!(event = %Event::TxRollback, xid = %xid, "transaction rolled back");
        Ok(())
    }

    fn suspend(&self) -> TxResult<Option<Transaction>> {
        let thread = self.enter()?;
        let suspended = self.shared.lock().suspend(thread);
        if let Some(xid) = suspended {
            info!(event = %Event::TxSuspend, xid = %xid, "transaction suspended");
        }
        Ok(suspended.map(|xid| self.handle(xid)))
    }

    fn resume(&self, transaction: Transaction) -> TxResult<()> {
        let thread = self.enter()?;
        if transaction.coordinator_id() != self.shared.id {
            return Err(TxError::invalid_transaction(format!(
                "{} was issued by another coordinator",
                transaction
            )));
        }

        let mut table = self.shared.lock();
        if table.is_associated(thread) {
            return Err(TxError::illegal_state(
                "calling thread is already associated with a transaction",
            ));
        }
        if !table.resume(thread, transaction.xid().global_id()) {
            return Err(TxError::invalid_transaction(format!(
                "{} is not suspended",
                transaction
            )));
        }

        info!(event = %Event::TxResume, xid = %transaction.xid(), "transaction resumed");
        Ok(())
    }

    fn status(&self) -> TxResult<TransactionStatus> {
        let thread = self.enter()?;
        Ok(self
            .shared
            .lock()
            .current(thread)
            .map(|e| e.status)
            .unwrap_or(TransactionStatus::NoTransaction))
    }

    fn transaction(&self) -> TxResult<Option<Transaction>> {
        if self.ensure_running().is_err() {
            return Ok(None);
        }
        let thread = self.enter()?;
        let xid = self.shared.lock().current(thread).map(|e| e.xid);
        Ok(xid.map(|xid| self.handle(xid)))
    }

    fn status_of(&self, transaction: &Transaction) -> TxResult<TransactionStatus> {
        self.enter()?;
        if transaction.coordinator_id() != self.shared.id {
            return Ok(TransactionStatus::Unknown);
        }
        let id = transaction.xid().global_id();
        let table = self.shared.lock();
        Ok(table
            .get(&id)
            .map(|e| e.status)
            .or_else(|| table.outcome(&id))
            .unwrap_or(TransactionStatus::Unknown))
    }

    fn set_rollback_only(&self) -> TxResult<()> {
        let thread = self.enter()?;
        let mut table = self.shared.lock();
        let entry = table.current_mut(thread).ok_or_else(TxError::no_transaction)?;
        if !entry.status.is_open() {
            return Err(TxError::illegal_state(format!(
                "transaction {} is {}",
                entry.xid, entry.status
            )));
        }
        entry.status = TransactionStatus::MarkedRollback;
        Ok(())
    }

    fn set_transaction_timeout(&self, seconds: i64) -> TxResult<()> {
        self.ensure_running()?;
        let timeout =
            (seconds > 0).then(|| Duration::from_secs((seconds as u64).min(MAX_TIMEOUT_SECS)));
        set_thread_timeout(self.shared.id, timeout);
        Ok(())
    }

    fn enlist_resource(&self, name: &str, resource: Arc<dyn XaResource>) -> TxResult<()> {
        let thread = self.enter()?;
        let mut table = self.shared.lock();
        let entry = table.current_mut(thread).ok_or_else(TxError::no_transaction)?;
        match entry.status {
            TransactionStatus::Active => {
                entry.enlist(name, resource);
                Ok(())
            }
            TransactionStatus::MarkedRollback => Err(TxError::rollback(format!(
                "transaction {} is marked rollback-only",
                entry.xid
            ))),
            status => Err(TxError::illegal_state(format!(
                "cannot enlist in transaction {} while {}",
                entry.xid, status
            ))),
        }
    }

    fn recovery(&self) -> &dyn TransactionRecovery {
        &self.recovery
    }

    fn shutdown(&self) -> TxResult<()> {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match reaper {
            Some(reaper) => reaper.stop().map_err(TxError::system),
            None => Ok(()),
        }
    }
}
