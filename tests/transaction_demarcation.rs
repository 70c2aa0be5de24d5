//! Transaction Demarcation Tests
//!
//! Behaviour of the transaction manager as seen by application code:
//! - One transaction per thread; no nesting
//! - Rollback-only transactions never commit
//! - Suspend/resume move a transaction between threads
//! - Participant votes and heuristic outcomes surface as typed errors

use std::sync::Arc;
use std::thread;

use xatm::config::TxConfig;
use xatm::recovery::{RecoveryRegistrar, StaticResourceSource};
use xatm::tx::{TransactionManager, TransactionStatus, TxError};
use xatm::xa::{HeuristicKind, MemoryResource, VoteBehavior, XaCall};

fn config() -> TxConfig {
    let mut config = TxConfig::default();
    config.endpoint.enabled = false;
    config.reaper_interval_ms = 0;
    config
}

/// Manager that has completed (empty) recovery and accepts `begin`.
fn ready_manager() -> Arc<TransactionManager> {
    let manager = Arc::new(TransactionManager::start(&config()).unwrap());
    RecoveryRegistrar::new(manager.clone())
        .init(&StaticResourceSource::new())
        .unwrap();
    manager
}

// =============================================================================
// Begin / Commit / Rollback
// =============================================================================

/// Begin then commit leaves the thread without a transaction.
#[test]
fn test_begin_commit() {
    let tm = ready_manager();
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);

    tm.begin().unwrap();
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::Active);
    let tx = tm.get_transaction().unwrap().unwrap();

    tm.commit().unwrap();
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);
    assert_eq!(tm.get_transaction().unwrap(), None);
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::Committed);
}

/// Rollback ends the transaction and rolls back every participant.
#[test]
fn test_begin_rollback() {
    let tm = ready_manager();
    let rm = Arc::new(MemoryResource::new("ledger-db"));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", rm.clone()).unwrap();
    let tx = tm.get_transaction().unwrap().unwrap();
    tm.rollback().unwrap();

    assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::RolledBack);
    assert!(rm.calls().iter().any(|c| matches!(c, XaCall::Rollback(_))));
}

/// A second begin on the same thread is rejected and the first survives.
#[test]
fn test_nested_begin_rejected() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let first = tm.get_transaction().unwrap().unwrap();

    let err = tm.begin().unwrap_err();
    assert!(matches!(err, TxError::UnsupportedOperation(_)));
    assert_eq!(tm.get_transaction().unwrap(), Some(first));

    tm.rollback().unwrap();
}

/// Commit and rollback without a transaction are illegal state.
#[test]
fn test_commit_without_transaction() {
    let tm = ready_manager();
    assert!(matches!(tm.commit(), Err(TxError::IllegalState(_))));
    assert!(matches!(tm.rollback(), Err(TxError::IllegalState(_))));
    assert!(matches!(tm.set_rollback_only(), Err(TxError::IllegalState(_))));
}

/// A thread can run transactions back to back.
#[test]
fn test_sequential_transactions_are_distinct() {
    let tm = ready_manager();

    tm.begin().unwrap();
    let first = tm.get_transaction().unwrap().unwrap();
    tm.commit().unwrap();

    tm.begin().unwrap();
    let second = tm.get_transaction().unwrap().unwrap();
    tm.commit().unwrap();

    assert_ne!(first, second);
}

// =============================================================================
// Rollback-only
// =============================================================================

/// A transaction marked rollback-only rolls back at commit.
#[test]
fn test_rollback_only_commit_fails() {
    let tm = ready_manager();
    let rm = Arc::new(MemoryResource::new("ledger-db"));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", rm.clone()).unwrap();
    let tx = tm.get_transaction().unwrap().unwrap();
    tm.set_rollback_only().unwrap();
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::MarkedRollback);

    let err = tm.commit().unwrap_err();
    assert!(matches!(err, TxError::Rollback(_)));
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::RolledBack);
    assert!(!rm.calls().iter().any(|c| matches!(c, XaCall::Commit { .. })));
}

/// Rollback of a rollback-only transaction succeeds.
#[test]
fn test_rollback_only_then_rollback() {
    let tm = ready_manager();
    tm.begin().unwrap();
    tm.set_rollback_only().unwrap();
    tm.rollback().unwrap();
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);
}

/// New work cannot join a doomed transaction.
#[test]
fn test_enlist_after_rollback_only_fails() {
    let tm = ready_manager();
    tm.begin().unwrap();
    tm.set_rollback_only().unwrap();

    let err = tm
        .enlist_resource("ledger-db", Arc::new(MemoryResource::new("ledger-db")))
        .unwrap_err();
    assert!(matches!(err, TxError::Rollback(_)));
    tm.rollback().unwrap();
}

// =============================================================================
// Suspend / Resume
// =============================================================================

/// Suspend detaches; resume restores the same transaction.
#[test]
fn test_suspend_resume_same_thread() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let before = tm.get_transaction().unwrap().unwrap();

    let suspended = tm.suspend().unwrap().unwrap();
    assert_eq!(suspended, before);
    assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);
    assert_eq!(tm.status_of(&suspended).unwrap(), TransactionStatus::Active);

    tm.resume(suspended).unwrap();
    assert_eq!(tm.get_transaction().unwrap(), Some(before));
    tm.commit().unwrap();
}

/// Suspend without a transaction yields nothing.
#[test]
fn test_suspend_without_transaction() {
    let tm = ready_manager();
    assert_eq!(tm.suspend().unwrap(), None);
}

/// A thread may start new work while its first transaction is suspended.
#[test]
fn test_begin_while_suspended() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let outer = tm.suspend().unwrap().unwrap();

    tm.begin().unwrap();
    tm.commit().unwrap();

    tm.resume(outer).unwrap();
    tm.rollback().unwrap();
    assert_eq!(tm.status_of(&outer).unwrap(), TransactionStatus::RolledBack);
}

/// Resume onto a thread that already holds a transaction is illegal state.
#[test]
fn test_resume_onto_busy_thread() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let suspended = tm.suspend().unwrap().unwrap();
    tm.begin().unwrap();

    let err = tm.resume(suspended).unwrap_err();
    assert!(matches!(err, TxError::IllegalState(_)));

    tm.rollback().unwrap();
    tm.resume(suspended).unwrap();
    tm.rollback().unwrap();
}

/// A handle for a completed transaction cannot be resumed.
#[test]
fn test_resume_completed_transaction() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let tx = tm.suspend().unwrap().unwrap();
    tm.resume(tx).unwrap();
    tm.commit().unwrap();

    let err = tm.resume(tx).unwrap_err();
    assert!(matches!(err, TxError::InvalidTransaction(_)));
}

/// A handle from another manager is rejected.
#[test]
fn test_resume_foreign_handle() {
    let tm = ready_manager();
    let other = ready_manager();

    other.begin().unwrap();
    let foreign = other.suspend().unwrap().unwrap();

    let err = tm.resume(foreign).unwrap_err();
    assert!(matches!(err, TxError::InvalidTransaction(_)));
    assert_eq!(tm.status_of(&foreign).unwrap(), TransactionStatus::Unknown);
}

/// A transaction suspended on one thread completes on another.
#[test]
fn test_thread_hand_off() {
    let tm = ready_manager();
    let rm = Arc::new(MemoryResource::new("ledger-db"));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", rm.clone()).unwrap();
    let tx = tm.suspend().unwrap().unwrap();

    let worker = {
        let tm = tm.clone();
        thread::spawn(move || {
            assert_eq!(tm.get_status().unwrap(), TransactionStatus::NoTransaction);
            tm.resume(tx).unwrap();
            assert_eq!(tm.get_transaction().unwrap(), Some(tx));
            tm.commit().unwrap();
        })
    };
    worker.join().unwrap();

    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::Committed);
    assert_eq!(tm.get_transaction().unwrap(), None);
    assert!(rm.is_committed(&tx.xid().branch(1)));
}

/// Threads hold independent transactions.
#[test]
fn test_threads_are_isolated() {
    let tm = ready_manager();
    tm.begin().unwrap();
    let mine = tm.get_transaction().unwrap().unwrap();

    let theirs = {
        let tm = tm.clone();
        thread::spawn(move || {
            tm.begin().unwrap();
            let tx = tm.get_transaction().unwrap().unwrap();
            tm.commit().unwrap();
            tx
        })
        .join()
        .unwrap()
    };

    assert_ne!(mine, theirs);
    assert_eq!(tm.get_transaction().unwrap(), Some(mine));
    tm.commit().unwrap();
}

// =============================================================================
// Two-Phase Commit Outcomes
// =============================================================================

/// Two participants are prepared before either commits.
#[test]
fn test_two_participants_prepare_then_commit() {
    let tm = ready_manager();
    let a = Arc::new(MemoryResource::new("ledger-db"));
    let b = Arc::new(MemoryResource::new("audit-log"));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", a.clone()).unwrap();
    tm.enlist_resource("audit-log", b.clone()).unwrap();
    tm.commit().unwrap();

    for rm in [&a, &b] {
        let calls = rm.calls();
        assert!(matches!(calls[0], XaCall::Prepare(_)));
        assert!(matches!(calls[1], XaCall::Commit { one_phase: false, .. }));
    }
}

/// An abort vote rolls the whole transaction back.
#[test]
fn test_abort_vote_rolls_back() {
    let tm = ready_manager();
    let a = Arc::new(MemoryResource::new("ledger-db"));
    let b = Arc::new(MemoryResource::new("audit-log").with_vote(VoteBehavior::Rollback));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", a.clone()).unwrap();
    tm.enlist_resource("audit-log", b.clone()).unwrap();
    let tx = tm.get_transaction().unwrap().unwrap();

    let err = tm.commit().unwrap_err();
    assert!(matches!(err, TxError::Rollback(_)));
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::RolledBack);
    assert!(a.is_rolled_back(&tx.xid().branch(1)));
    assert!(!a.calls().iter().any(|c| matches!(c, XaCall::Commit { .. })));
}

/// A read-only participant takes no part in the second phase.
#[test]
fn test_read_only_participant_skips_commit() {
    let tm = ready_manager();
    let a = Arc::new(MemoryResource::new("ledger-db"));
    let b = Arc::new(MemoryResource::new("audit-log").with_vote(VoteBehavior::ReadOnly));

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", a.clone()).unwrap();
    tm.enlist_resource("audit-log", b.clone()).unwrap();
    tm.commit().unwrap();

    assert_eq!(b.calls().len(), 1);
    assert!(a.calls().iter().any(|c| matches!(c, XaCall::Commit { one_phase: false, .. })));
}

/// Some committed, some heuristically rolled back: mixed.
#[test]
fn test_heuristic_mixed() {
    let tm = ready_manager();
    let a = Arc::new(MemoryResource::new("ledger-db"));
    let b = Arc::new(
        MemoryResource::new("audit-log").with_commit_heuristic(HeuristicKind::Rollback),
    );

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", a).unwrap();
    tm.enlist_resource("audit-log", b.clone()).unwrap();
    let tx = tm.get_transaction().unwrap().unwrap();

    let err = tm.commit().unwrap_err();
    assert!(matches!(err, TxError::HeuristicMixed(_)));
    assert!(err.is_heuristic());
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::Committed);
    assert!(b.calls().iter().any(|c| matches!(c, XaCall::Forget(_))));
}

/// Every participant heuristically rolled back.
#[test]
fn test_heuristic_rollback() {
    let tm = ready_manager();
    let a = Arc::new(
        MemoryResource::new("ledger-db").with_commit_heuristic(HeuristicKind::Rollback),
    );
    let b = Arc::new(
        MemoryResource::new("audit-log").with_commit_heuristic(HeuristicKind::Rollback),
    );

    tm.begin().unwrap();
    tm.enlist_resource("ledger-db", a).unwrap();
    tm.enlist_resource("audit-log", b).unwrap();
    let tx = tm.get_transaction().unwrap().unwrap();

    let err = tm.commit().unwrap_err();
    assert!(matches!(err, TxError::HeuristicRollback(_)));
    assert_eq!(tm.status_of(&tx).unwrap(), TransactionStatus::RolledBack);
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Begin is refused until recovery has completed.
#[test]
fn test_begin_before_recovery() {
    let tm = TransactionManager::start(&config()).unwrap();
    assert!(matches!(tm.begin(), Err(TxError::SystemFailure(_))));
}

/// After stop, the current transaction reads as absent and work is refused.
#[test]
fn test_operations_after_stop() {
    let tm = ready_manager();
    tm.stop();

    assert_eq!(tm.get_transaction().unwrap(), None);
    assert!(matches!(tm.begin(), Err(TxError::SystemFailure(_))));
    assert!(matches!(tm.commit(), Err(TxError::SystemFailure(_))));
    assert!(matches!(tm.get_status(), Err(TxError::SystemFailure(_))));
    assert!(matches!(tm.suspend(), Err(TxError::SystemFailure(_))));
}
