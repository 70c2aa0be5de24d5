//! Transaction branch identifiers

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Format identifier stamped on every Xid created by this coordinator.
pub const XATM_FORMAT_ID: i32 = 0x5841_544d;

/// Identity of one transaction branch.
///
/// All branches of a global transaction share `global_id`. Branch `0` is the
/// coordinator's own view of the transaction; enlisted participants receive
/// branches numbered from `1` in enlistment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Xid {
    format_id: i32,
    global_id: Uuid,
    branch: u32,
}

impl Xid {
    /// Create an Xid from its parts
    pub fn new(format_id: i32, global_id: Uuid, branch: u32) -> Self {
        Self {
            format_id,
            global_id,
            branch,
        }
    }

    /// Allocate a fresh global transaction identity (branch 0)
    pub fn generate() -> Self {
        Self::new(XATM_FORMAT_ID, Uuid::new_v4(), 0)
    }

    /// Same global transaction, different branch
    pub fn branch(&self, branch: u32) -> Self {
        Self {
            branch,
            ..*self
        }
    }

    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    pub fn global_id(&self) -> Uuid {
        self.global_id
    }

    pub fn branch_qualifier(&self) -> u32 {
        self.branch
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{}:{}", self.format_id, self.global_id, self.branch)
    }
}
