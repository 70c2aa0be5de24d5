//! Observable events
//!
//! Every log line carries one of these as its `event` field so that logs can
//! be filtered on a stable vocabulary instead of free-form messages.

use std::fmt;

/// Observable events in the transaction manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & Lifecycle
    /// Transaction manager construction begins
    BootStart,
    /// Recovery finished, `begin` is accepted
    BootComplete,
    /// Shutdown initiated
    ShutdownStart,
    /// Shutdown complete
    ShutdownComplete,
    /// Coordinator did not stop cleanly (logged, not escalated)
    ShutdownFailed,

    // Configuration
    /// Configuration loaded
    ConfigLoaded,

    // Coordinator endpoint
    /// Endpoint reserved by this process
    EndpointBound,
    /// Endpoint already held by a running coordinator
    EndpointAlreadyRunning,
    /// Endpoint reservation disabled in config
    EndpointDisabled,

    // Recovery registration
    /// Resource source enumerated
    ResourcesEnumerated,
    /// Resource manager registered for recovery
    ResourceRegistered,
    /// Recovery pass begins
    RecoveryStart,
    /// One resource scanned for in-doubt branches
    RecoveryResourceScanned,
    /// In-doubt branch committed from a logged decision
    RecoveryBranchCommitted,
    /// In-doubt branch rolled back (presumed abort)
    RecoveryBranchRolledBack,
    /// In-doubt branch had been completed heuristically
    RecoveryBranchHeuristic,
    /// Recovery pass complete
    RecoveryComplete,
    /// Recovery failed (FATAL)
    RecoveryFailed,

    // Demarcation
    TxBegin,
    TxCommit,
    TxRollback,
    TxSuspend,
    TxResume,
    /// Transaction rolled back by the coordinator after its deadline
    TxTimeout,
    /// Participants resolved inconsistently
    TxHeuristic,
    /// A participant failed after the commit decision; left to recovery
    TxBranchInDoubt,

    // Decision log
    /// Partially written final log entry skipped during replay
    DecisionLogTornTail,

    // Timeout reaper
    ReaperStarted,
    ReaperStopped,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "XATM_STARTUP_BEGIN",
            Event::BootComplete => "XATM_STARTUP_COMPLETE",
            Event::ShutdownStart => "SHUTDOWN_START",
            Event::ShutdownComplete => "SHUTDOWN_COMPLETE",
            Event::ShutdownFailed => "SHUTDOWN_FAILED",

            Event::ConfigLoaded => "CONFIG_LOADED",

            Event::EndpointBound => "ENDPOINT_BOUND",
            Event::EndpointAlreadyRunning => "ENDPOINT_ALREADY_RUNNING",
            Event::EndpointDisabled => "ENDPOINT_DISABLED",

            Event::ResourcesEnumerated => "RESOURCES_ENUMERATED",
            Event::ResourceRegistered => "RESOURCE_REGISTERED",
            Event::RecoveryStart => "RECOVERY_BEGIN",
            Event::RecoveryResourceScanned => "RECOVERY_RESOURCE_SCANNED",
            Event::RecoveryBranchCommitted => "RECOVERY_BRANCH_COMMITTED",
            Event::RecoveryBranchRolledBack => "RECOVERY_BRANCH_ROLLED_BACK",
            Event::RecoveryBranchHeuristic => "RECOVERY_BRANCH_HEURISTIC",
            Event::RecoveryComplete => "RECOVERY_COMPLETE",
            Event::RecoveryFailed => "RECOVERY_FAILED",

            Event::TxBegin => "TX_BEGIN",
            Event::TxCommit => "TX_COMMIT",
            Event::TxRollback => "TX_ROLLBACK",
            Event::TxSuspend => "TX_SUSPEND",
            Event::TxResume => "TX_RESUME",
            Event::TxTimeout => "TX_TIMEOUT",
            Event::TxHeuristic => "TX_HEURISTIC",
            Event::TxBranchInDoubt => "TX_BRANCH_IN_DOUBT",

            Event::DecisionLogTornTail => "DECISION_LOG_TORN_TAIL",

            Event::ReaperStarted => "REAPER_STARTED",
            Event::ReaperStopped => "REAPER_STOPPED",
        }
    }

    /// Returns true if this event indicates a fatal condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::RecoveryFailed)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
