//! Error taxonomy for process memory operations

use super::address::Address;
use std::fmt;
use thiserror::Error;

/// Main error type for memory operations
///
/// Variants fall into a small number of kinds (see [`ErrorKind`]). Callers
/// deciding whether to retry, skip or abort should branch on the kind rather
/// than on individual variants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied to process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    #[error("Process {pid} is not accessible: {reason}")]
    State { pid: u32, reason: String },

    #[error("Memory access failed at {address}: {reason}")]
    Access { address: Address, reason: String },

    #[error("Pointer chain broken at level {level} ({address}): {reason}")]
    PointerChainBroken {
        level: usize,
        address: Address,
        reason: String,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
}

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Coarse classification of a [`MemoryError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The process could not be opened
    Attach,
    /// The process or handle is no longer usable
    State,
    /// An operation against live memory failed
    Access,
    /// A module name is absent from the current snapshot
    Module,
    /// Static misconfiguration or an unsupported request
    Configuration,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Attach => "attach",
            ErrorKind::State => "state",
            ErrorKind::Access => "access",
            ErrorKind::Module => "module",
            ErrorKind::Configuration => "configuration",
        };
        f.write_str(name)
    }
}

impl MemoryError {
    /// Creates an access denied error for a process
    pub fn access_denied(pid: u32, reason: impl Into<String>) -> Self {
        MemoryError::AccessDenied {
            pid,
            reason: reason.into(),
        }
    }

    /// Creates a state error for a process that exited or was released
    pub fn state(pid: u32, reason: impl Into<String>) -> Self {
        MemoryError::State {
            pid,
            reason: reason.into(),
        }
    }

    /// Creates an access error for a failed read or write
    pub fn access(address: impl Into<Address>, reason: impl Into<String>) -> Self {
        MemoryError::Access {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Creates a pointer chain broken error
    pub fn pointer_chain_broken(
        level: usize,
        address: impl Into<Address>,
        reason: impl Into<String>,
    ) -> Self {
        MemoryError::PointerChainBroken {
            level,
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::ProcessNotFound(_) | MemoryError::AccessDenied { .. } => ErrorKind::Attach,
            MemoryError::State { .. } => ErrorKind::State,
            MemoryError::Access { .. } | MemoryError::PointerChainBroken { .. } => {
                ErrorKind::Access
            }
            MemoryError::ModuleNotFound(_) => ErrorKind::Module,
            MemoryError::InvalidAddress(_)
            | MemoryError::InvalidConfiguration(_)
            | MemoryError::UnsupportedOperation(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_state(&self) -> bool {
        self.kind() == ErrorKind::State
    }

    pub fn is_access(&self) -> bool {
        self.kind() == ErrorKind::Access
    }

    /// Whether retrying after re-attaching could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::State | ErrorKind::Module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::access_denied(1234, "insufficient rights");
        assert_eq!(
            err.to_string(),
            "Access denied to process 1234: insufficient rights"
        );

        let err = MemoryError::access(0x1000u64, "unmapped");
        assert_eq!(
            err.to_string(),
            "Memory access failed at 0x0000000000001000: unmapped"
        );

        let err = MemoryError::state(7, "process exited");
        assert_eq!(err.to_string(), "Process 7 is not accessible: process exited");
    }

    #[test]
    fn test_kinds() {
        let cases: Vec<(MemoryError, ErrorKind)> = vec![
            (
                MemoryError::ProcessNotFound("dxhr.exe".to_string()),
                ErrorKind::Attach,
            ),
            (MemoryError::access_denied(1, "denied"), ErrorKind::Attach),
            (MemoryError::state(1, "released"), ErrorKind::State),
            (MemoryError::access(0u64, "fault"), ErrorKind::Access),
            (
                MemoryError::pointer_chain_broken(2, 0u64, "null"),
                ErrorKind::Access,
            ),
            (
                MemoryError::ModuleNotFound("dxhr.exe".to_string()),
                ErrorKind::Module,
            ),
            (
                MemoryError::InvalidConfiguration("duplicate".to_string()),
                ErrorKind::Configuration,
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{}", error);
        }
    }

    #[test]
    fn test_state_and_access_are_disjoint() {
        let state = MemoryError::state(1, "exited");
        assert!(state.is_state());
        assert!(!state.is_access());
        assert!(state.is_retryable());

        let access = MemoryError::access(0x10u64, "protected");
        assert!(access.is_access());
        assert!(!access.is_state());
        assert!(!access.is_retryable());
    }

    #[test]
    fn test_helper_methods() {
        match MemoryError::pointer_chain_broken(3, 0x20u64, "null pointer") {
            MemoryError::PointerChainBroken {
                level,
                address,
                reason,
            } => {
                assert_eq!(level, 3);
                assert_eq!(address, Address::new(0x20));
                assert_eq!(reason, "null pointer");
            }
            other => panic!("Wrong error type: {:?}", other),
        }
    }
}
