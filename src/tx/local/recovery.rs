//! Recovery subsystem of the in-process coordinator
//!
//! Resource managers are registered once at startup into an append-only
//! registry. A recovery pass asks each one for its prepared-but-unresolved
//! branches and resolves them against the decision log:
//!
//! 1. Branch of a global transaction with a logged commit decision → commit
//! 2. Any other branch of this coordinator → roll back (presumed abort)
//! 3. Branches already completed heuristically → forget
//! 4. Branches with a foreign format id are left alone
//!
//! After a resource is processed its recovery callback receives it back.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::observability::Event;
use crate::tx::coordinator::{ResourceRecovery, TransactionRecovery};
use crate::xa::{RecoveryCallback, XaError, XaResource, XaResult, Xid, XATM_FORMAT_ID};

use super::decision_log::DecisionLog;

#[derive(Clone)]
struct Registration {
    name: String,
    resource: Arc<dyn XaResource>,
    recovery_name: String,
    callback: Arc<dyn RecoveryCallback>,
}

enum Resolution {
    Committed,
    RolledBack,
    Heuristic,
    AlreadyResolved,
}

pub(super) struct LocalRecovery {
    registrations: Mutex<Vec<Registration>>,
    log: Arc<dyn DecisionLog>,
}

impl LocalRecovery {
    pub fn new(log: Arc<dyn DecisionLog>) -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
            log,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, registration: &Registration, xid: &Xid) -> XaResult<Resolution> {
        let resource = &registration.resource;
        let commit = self.log.is_committed(&xid.global_id());

        let outcome = if commit {
            resource.commit(xid, false)
        } else {
            resource.rollback(xid)
        };

        match outcome {
            Ok(()) if commit => Ok(Resolution::Committed),
            Ok(()) => Ok(Resolution::RolledBack),
            Err(XaError::Heuristic { kind, .. }) => {
                warn!(
                    event = %Event::RecoveryBranchHeuristic,
                    resource = %registration.name,
                    xid = %xid,
                    heuristic = %kind,
                    "in-doubt branch was completed heuristically"
                );
                resource.forget(xid)?;
                Ok(Resolution::Heuristic)
            }
            Err(XaError::UnknownXid(_)) => Ok(Resolution::AlreadyResolved),
            Err(e) => Err(e),
        }
    }

    fn recover_one(&self, registration: &Registration) -> XaResult<ResourceRecovery> {
        let branches = registration.resource.recover().map_err(|e| {
            XaError::ResourceFailure(format!(
                "recover on '{}' failed: {}",
                registration.name, e
            ))
        })?;

        let mut report = ResourceRecovery {
            name: registration.name.clone(),
            ..ResourceRecovery::default()
        };

        for xid in branches.iter().filter(|x| x.format_id() == XATM_FORMAT_ID) {
            report.in_doubt += 1;
            match self.resolve(registration, xid)? {
                Resolution::Committed => {
                    report.committed += 1;
                    info!(
                        event = %Event::RecoveryBranchCommitted,
                        resource = %registration.name,
                        xid = %xid,
                        "in-doubt branch committed"
                    );
                }
                Resolution::RolledBack => {
                    report.rolled_back += 1;
                    info!(
                        event = %Event::RecoveryBranchRolledBack,
                        resource = %registration.name,
                        xid = %xid,
                        "in-doubt branch rolled back"
                    );
                }
                Resolution::Heuristic => report.heuristic += 1,
                Resolution::AlreadyResolved => {}
            }
        }

        registration
            .callback
            .return_resource(&registration.recovery_name, &registration.resource);

        info!(
            event = %Event::RecoveryResourceScanned,
            resource = %registration.name,
            in_doubt = report.in_doubt,
            committed = report.committed,
            rolled_back = report.rolled_back,
            heuristic = report.heuristic,
            "resource recovered"
        );
        Ok(report)
    }

    /// Forget decisions whose participants were all scanned in this pass
    fn forget_resolved(&self, scanned: &HashSet<String>) {
        for decision in self.log.pending() {
            if decision.resources.iter().all(|r| scanned.contains(r)) {
                if let Err(e) = self.log.forget(&decision.global_id) {
                    warn!(
                        global_id = %decision.global_id,
                        error = %e,
                        "failed to forget resolved commit decision"
                    );
                }
            }
        }
    }
}

impl TransactionRecovery for LocalRecovery {
    fn register_resource_manager(
        &self,
        name: &str,
        resource: Arc<dyn XaResource>,
        recovery_name: &str,
        callback: Arc<dyn RecoveryCallback>,
    ) -> XaResult<()> {
        let mut registrations = self.lock();
        if registrations.iter().any(|r| r.name == name) {
            return Err(XaError::Protocol(format!(
                "resource manager '{}' is already registered",
                name
            )));
        }
        registrations.push(Registration {
            name: name.to_string(),
            resource,
            recovery_name: recovery_name.to_string(),
            callback,
        });
        Ok(())
    }

    fn start_resource_manager_recovery(&self) -> XaResult<Vec<ResourceRecovery>> {
        let registrations = self.lock().clone();

        let mut reports = Vec::with_capacity(registrations.len());
        for registration in &registrations {
            reports.push(self.recover_one(registration)?);
        }

        let scanned: HashSet<String> = registrations.into_iter().map(|r| r.name).collect();
        self.forget_resolved(&scanned);

        Ok(reports)
    }

    fn registered_names(&self) -> Vec<String> {
        self.lock().iter().map(|r| r.name.clone()).collect()
    }
}
