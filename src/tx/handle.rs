//! Opaque transaction handle

use std::fmt;

use uuid::Uuid;

use crate::xa::Xid;

/// Handle to one transaction owned by a coordinator.
///
/// The handle carries no state of its own; status lives in the coordinator
/// that issued it. Handles compare equal exactly when they name the same
/// transaction of the same coordinator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    xid: Xid,
    coordinator_id: Uuid,
}

impl Transaction {
    pub(crate) fn new(xid: Xid, coordinator_id: Uuid) -> Self {
        Self {
            xid,
            coordinator_id,
        }
    }

    /// Global identity of the transaction (branch 0)
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// Instance id of the coordinator that issued this handle
    pub fn coordinator_id(&self) -> Uuid {
        self.coordinator_id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx[{}]", self.xid)
    }
}
