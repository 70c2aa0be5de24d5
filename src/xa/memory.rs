//! In-memory scripted XA resource
//!
//! Behaves like a resource manager whose prepared branches survive until they
//! are committed or rolled back. Votes, commit outcomes and recovery failures
//! can be scripted, and every call is recorded in order.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::errors::{HeuristicKind, XaError, XaResult};
use super::resource::{Vote, XaResource};
use super::Xid;

/// How `prepare` answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteBehavior {
    #[default]
    Commit,
    ReadOnly,
    /// Vote to roll back
    Rollback,
    /// Fail with a resource manager error
    Fail,
}

/// One recorded call against a `MemoryResource`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XaCall {
    Prepare(Xid),
    Commit { xid: Xid, one_phase: bool },
    Rollback(Xid),
    Recover,
    Forget(Xid),
}

#[derive(Debug, Default)]
struct MemoryState {
    vote: VoteBehavior,
    commit_heuristic: Option<HeuristicKind>,
    fail_recover: bool,
    prepared: BTreeSet<Xid>,
    committed: BTreeSet<Xid>,
    rolled_back: BTreeSet<Xid>,
    calls: Vec<XaCall>,
}

/// Scripted in-memory participant
#[derive(Debug, Default)]
pub struct MemoryResource {
    name: String,
    state: Mutex<MemoryState>,
}

impl MemoryResource {
    /// Create a resource that votes commit and has nothing in doubt
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Script the prepare vote
    pub fn with_vote(self, vote: VoteBehavior) -> Self {
        self.lock().vote = vote;
        self
    }

    /// Make every second-phase commit report the given heuristic outcome
    pub fn with_commit_heuristic(self, kind: HeuristicKind) -> Self {
        self.lock().commit_heuristic = Some(kind);
        self
    }

    /// Seed branches that were prepared before a crash
    pub fn with_in_doubt(self, xids: impl IntoIterator<Item = Xid>) -> Self {
        self.lock().prepared.extend(xids);
        self
    }

    /// Make `recover` fail
    pub fn failing_recover(self) -> Self {
        self.lock().fail_recover = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<XaCall> {
        self.lock().calls.clone()
    }

    /// Branches currently prepared and unresolved
    pub fn in_doubt(&self) -> Vec<Xid> {
        self.lock().prepared.iter().copied().collect()
    }

    pub fn is_committed(&self, xid: &Xid) -> bool {
        self.lock().committed.contains(xid)
    }

    pub fn is_rolled_back(&self, xid: &Xid) -> bool {
        self.lock().rolled_back.contains(xid)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl XaResource for MemoryResource {
    fn prepare(&self, xid: &Xid) -> XaResult<Vote> {
        let mut state = self.lock();
        state.calls.push(XaCall::Prepare(*xid));
        match state.vote {
            VoteBehavior::Commit => {
                state.prepared.insert(*xid);
                Ok(Vote::Commit)
            }
            VoteBehavior::ReadOnly => Ok(Vote::ReadOnly),
            VoteBehavior::Rollback => Err(XaError::RollbackVote {
                xid: *xid,
                reason: format!("{} refused to prepare", self.name),
            }),
            VoteBehavior::Fail => Err(XaError::ResourceFailure(format!(
                "{} is unavailable",
                self.name
            ))),
        }
    }

    fn commit(&self, xid: &Xid, one_phase: bool) -> XaResult<()> {
        let mut state = self.lock();
        state.calls.push(XaCall::Commit {
            xid: *xid,
            one_phase,
        });

        if one_phase && state.vote == VoteBehavior::Rollback {
            state.rolled_back.insert(*xid);
            return Err(XaError::RollbackVote {
                xid: *xid,
                reason: format!("{} rolled back during one-phase commit", self.name),
            });
        }
        if !one_phase && !state.prepared.contains(xid) {
            return Err(XaError::UnknownXid(*xid));
        }
        state.prepared.remove(xid);

        if let Some(kind) = state.commit_heuristic {
            match kind {
                HeuristicKind::Rollback => {
                    state.rolled_back.insert(*xid);
                }
                HeuristicKind::Commit => {
                    state.committed.insert(*xid);
                }
                HeuristicKind::Mixed | HeuristicKind::Hazard => {}
            }
            return Err(XaError::Heuristic { xid: *xid, kind });
        }

        state.committed.insert(*xid);
        Ok(())
    }

    fn rollback(&self, xid: &Xid) -> XaResult<()> {
        let mut state = self.lock();
        state.calls.push(XaCall::Rollback(*xid));
        state.prepared.remove(xid);
        state.rolled_back.insert(*xid);
        Ok(())
    }

    fn recover(&self) -> XaResult<Vec<Xid>> {
        let mut state = self.lock();
        state.calls.push(XaCall::Recover);
        if state.fail_recover {
            return Err(XaError::ResourceFailure(format!(
                "{} cannot list prepared branches",
                self.name
            )));
        }
        Ok(state.prepared.iter().copied().collect())
    }

    fn forget(&self, xid: &Xid) -> XaResult<()> {
        let mut state = self.lock();
        state.calls.push(XaCall::Forget(*xid));
        state.prepared.remove(xid);
        Ok(())
    }
}
