//! Transaction table of the in-process coordinator
//!
//! Holds every open transaction, which thread each one is bound to, which
//! ones are suspended, and a bounded history of terminal outcomes.
//! Per-thread timeouts live in thread-local storage and go away with the
//! thread. All access goes through the coordinator's single lock;
//! participant calls are made after the lock is released.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::observability::Event;
use crate::tx::status::TransactionStatus;
use crate::xa::{XaResource, Xid};

/// Number of terminal outcomes remembered for `status_of`
const OUTCOME_HISTORY: usize = 1024;

thread_local! {
    /// Timeout set by this thread, per coordinator instance
    static THREAD_TIMEOUTS: RefCell<HashMap<Uuid, Duration>> = RefCell::new(HashMap::new());
}

/// Timeout the calling thread set on `coordinator`, if any
pub(crate) fn thread_timeout(coordinator: Uuid) -> Option<Duration> {
    THREAD_TIMEOUTS.with(|timeouts| timeouts.borrow().get(&coordinator).copied())
}

/// Set or clear the calling thread's timeout on `coordinator`
pub(crate) fn set_thread_timeout(coordinator: Uuid, timeout: Option<Duration>) {
    THREAD_TIMEOUTS.with(|timeouts| {
        let mut timeouts = timeouts.borrow_mut();
        match timeout {
            Some(timeout) => {
                timeouts.insert(coordinator, timeout);
            }
            None => {
                timeouts.remove(&coordinator);
            }
        }
    });
}

/// One enlisted resource manager
#[derive(Clone)]
pub(crate) struct Participant {
    pub name: String,
    pub resource: Arc<dyn XaResource>,
    /// Branch of the global transaction owned by this participant
    pub branch: Xid,
}

pub(crate) struct TxEntry {
    pub xid: Xid,
    pub status: TransactionStatus,
    pub deadline: Instant,
    pub participants: Vec<Participant>,
}

impl TxEntry {
    pub fn new(xid: Xid, deadline: Instant) -> Self {
        Self {
            xid,
            status: TransactionStatus::Active,
            deadline,
            participants: Vec::new(),
        }
    }

    /// Enlist a participant under the next branch number. Returns false if a
    /// participant with that name is already enlisted.
    pub fn enlist(&mut self, name: &str, resource: Arc<dyn XaResource>) -> bool {
        if self.participants.iter().any(|p| p.name == name) {
            return false;
        }
        let branch = self.xid.branch(self.participants.len() as u32 + 1);
        self.participants.push(Participant {
            name: name.to_string(),
            resource,
            branch,
        });
        true
    }
}

#[derive(Default)]
pub(crate) struct TxTable {
    entries: HashMap<Uuid, TxEntry>,
    associations: HashMap<ThreadId, Uuid>,
    suspended: HashSet<Uuid>,
    outcomes: VecDeque<(Uuid, TransactionStatus)>,
}

impl TxTable {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, thread: ThreadId, entry: TxEntry) {
        let id = entry.xid.global_id();
        self.entries.insert(id, entry);
        self.associations.insert(thread, id);
    }

    pub fn is_associated(&self, thread: ThreadId) -> bool {
        self.associations.contains_key(&thread)
    }

    pub fn current(&self, thread: ThreadId) -> Option<&TxEntry> {
        self.associations
            .get(&thread)
            .and_then(|id| self.entries.get(id))
    }

    pub fn current_mut(&mut self, thread: ThreadId) -> Option<&mut TxEntry> {
        let id = *self.associations.get(&thread)?;
        self.entries.get_mut(&id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&TxEntry> {
        self.entries.get(id)
    }

    pub fn set_status(&mut self, id: &Uuid, status: TransactionStatus) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.status = status;
        }
    }

    /// Detach the thread's transaction and park it in the suspended set
    pub fn suspend(&mut self, thread: ThreadId) -> Option<Xid> {
        let id = self.associations.remove(&thread)?;
        let xid = self.entries.get(&id)?.xid;
        self.suspended.insert(id);
        Some(xid)
    }

    /// Move a suspended transaction onto `thread`. False if it is not
    /// currently suspended.
    pub fn resume(&mut self, thread: ThreadId, id: Uuid) -> bool {
        if !self.suspended.remove(&id) {
            return false;
        }
        self.associations.insert(thread, id);
        true
    }

    /// Remove a transaction from the table and record its outcome
    pub fn finish(&mut self, id: &Uuid, status: TransactionStatus) -> Option<TxEntry> {
        let entry = self.entries.remove(id)?;
        self.associations.retain(|_, bound| bound != id);
        self.suspended.remove(id);
        self.record_outcome(*id, status);
        Some(entry)
    }

    /// Remove every open transaction whose deadline has passed. They are
    /// recorded as rolled back; the caller rolls back their participants.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TxEntry> {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, e)| e.status.is_open() && e.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        expired
            .iter()
            .filter_map(|id| self.finish(id, TransactionStatus::RolledBack))
            .collect()
    }

    pub fn outcome(&self, id: &Uuid) -> Option<TransactionStatus> {
        self.outcomes
            .iter()
            .rev()
            .find(|(known, _)| known == id)
            .map(|(_, status)| *status)
    }

    fn record_outcome(&mut self, id: Uuid, status: TransactionStatus) {
        if self.outcomes.len() == OUTCOME_HISTORY {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back((id, status));
    }
}

/// Roll back every participant. Failures are logged; the resource manager
/// rolls the branch back on its own or recovery resolves it later.
pub(crate) fn rollback_participants(participants: &[Participant]) {
    for p in participants {
        if let Err(e) = p.resource.rollback(&p.branch) {
            warn!(
                event = %Event::TxBranchInDoubt,
                resource = %p.name,
                xid = %p.branch,
                error = %e,
                "participant rollback failed"
            );
        }
    }
}
