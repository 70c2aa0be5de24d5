//! Recovery registration error types
//!
//! Error codes:
//! - XATM_RECOVERY_DUPLICATE_RESOURCE (FATAL)
//! - XATM_RECOVERY_REGISTRATION_FAILED (FATAL)
//! - XATM_RECOVERY_FAILED (FATAL)
//! - XATM_RECOVERY_COORDINATOR_UNAVAILABLE (FATAL)
//! - XATM_RECOVERY_ALREADY_INITIALIZED (FATAL)
//!
//! Startup cannot guarantee transactional consistency without a complete
//! recovery pass, so every recovery error aborts the boot sequence.

use std::error::Error as StdError;
use std::fmt;

use crate::tx::TxError;
use crate::xa::XaError;

/// Severity levels for recovery errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup must abort
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Recovery error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryErrorCode {
    /// Two resources share a name
    DuplicateResource,
    /// The coordinator rejected a registration
    RegistrationFailed,
    /// The recovery pass failed
    RecoveryFailed,
    /// The coordinator has been released
    CoordinatorUnavailable,
    /// `init` was called twice
    AlreadyInitialized,
}

impl RecoveryErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryErrorCode::DuplicateResource => "XATM_RECOVERY_DUPLICATE_RESOURCE",
            RecoveryErrorCode::RegistrationFailed => "XATM_RECOVERY_REGISTRATION_FAILED",
            RecoveryErrorCode::RecoveryFailed => "XATM_RECOVERY_FAILED",
            RecoveryErrorCode::CoordinatorUnavailable => "XATM_RECOVERY_COORDINATOR_UNAVAILABLE",
            RecoveryErrorCode::AlreadyInitialized => "XATM_RECOVERY_ALREADY_INITIALIZED",
        }
    }

    pub fn severity(&self) -> Severity {
        Severity::Fatal
    }
}

impl fmt::Display for RecoveryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
enum Cause {
    Xa(XaError),
    Tx(TxError),
}

/// Recovery error with the resource it concerns and its underlying cause
#[derive(Debug)]
pub struct RecoveryError {
    code: RecoveryErrorCode,
    message: String,
    resource: Option<String>,
    cause: Option<Cause>,
}

impl RecoveryError {
    pub fn duplicate_resource(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            code: RecoveryErrorCode::DuplicateResource,
            message: format!("resource name '{}' is registered more than once", name),
            resource: Some(name),
            cause: None,
        }
    }

    pub fn registration_failed(name: impl Into<String>, cause: XaError) -> Self {
        let name = name.into();
        Self {
            code: RecoveryErrorCode::RegistrationFailed,
            message: format!("error registering XA resource '{}'", name),
            resource: Some(name),
            cause: Some(Cause::Xa(cause)),
        }
    }

    pub fn recovery_failed(cause: XaError) -> Self {
        Self {
            code: RecoveryErrorCode::RecoveryFailed,
            message: "resource manager recovery did not complete".to_string(),
            resource: None,
            cause: Some(Cause::Xa(cause)),
        }
    }

    pub fn coordinator_unavailable(cause: TxError) -> Self {
        Self {
            code: RecoveryErrorCode::CoordinatorUnavailable,
            message: "coordinator is not available for recovery".to_string(),
            resource: None,
            cause: Some(Cause::Tx(cause)),
        }
    }

    pub fn already_initialized() -> Self {
        Self {
            code: RecoveryErrorCode::AlreadyInitialized,
            message: "recovery registration has already run".to_string(),
            resource: None,
            cause: None,
        }
    }

    pub fn code(&self) -> RecoveryErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Resource the error concerns, if any
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// Every recovery error aborts startup
    pub fn is_fatal(&self) -> bool {
        true
    }
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )
    }
}

impl StdError for RecoveryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.cause {
            Some(Cause::Xa(e)) => Some(e),
            Some(Cause::Tx(e)) => Some(e),
            None => None,
        }
    }
}

/// Result type for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_errors_are_fatal() {
        let codes = [
            RecoveryErrorCode::DuplicateResource,
            RecoveryErrorCode::RegistrationFailed,
            RecoveryErrorCode::RecoveryFailed,
            RecoveryErrorCode::CoordinatorUnavailable,
            RecoveryErrorCode::AlreadyInitialized,
        ];
        for code in codes {
            assert_eq!(code.severity(), Severity::Fatal);
        }
    }

    #[test]
    fn test_display_and_cause_chain() {
        let err = RecoveryError::registration_failed(
            "ledger-db",
            XaError::ResourceFailure("connection refused".into()),
        );
        let display = err.to_string();
        assert!(display.contains("FATAL"));
        assert!(display.contains("XATM_RECOVERY_REGISTRATION_FAILED"));
        assert!(display.contains("ledger-db"));
        assert_eq!(err.resource(), Some("ledger-db"));

        let source = err.source().unwrap();
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn test_duplicate_has_no_cause() {
        let err = RecoveryError::duplicate_resource("audit-log");
        assert_eq!(err.code(), RecoveryErrorCode::DuplicateResource);
        assert!(err.source().is_none());
    }
}
