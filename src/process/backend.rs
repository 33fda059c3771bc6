//! Operating system seam for process access

use crate::core::types::{
    Address, MemoryError, MemoryResult, ProcessIdentifier, ProcessInfo, ProcessModule,
};

/// Raw access to one target process
///
/// Implementations report what the operating system did and nothing more:
/// a read or write that stops early returns the number of bytes actually
/// transferred. Validation, rollback and liveness checks live in
/// [`ProcessHandle`](super::ProcessHandle).
pub trait ProcessBackend: Send {
    fn info(&self) -> &ProcessInfo;

    /// Non-blocking liveness probe
    fn is_alive(&self) -> bool;

    /// Reads into `buffer`, returning the number of bytes copied
    fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize>;

    /// Writes `data`, returning the number of bytes written
    fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize>;

    /// Enumerates the modules currently mapped into the process
    fn modules(&self) -> MemoryResult<Vec<ProcessModule>>;

    /// Releases operating system resources. Called at most once.
    fn close(&mut self) {}
}

/// Opens the process named by `identifier` with the backend for this platform
pub fn open_platform(identifier: &ProcessIdentifier) -> MemoryResult<Box<dyn ProcessBackend>> {
    #[cfg(target_os = "windows")]
    {
        let process = crate::windows::WindowsProcess::open(identifier)?;
        Ok(Box::new(process))
    }

    #[cfg(target_os = "linux")]
    {
        let process = super::linux::LinuxProcess::open(identifier)?;
        Ok(Box::new(process))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux")))]
    {
        Err(MemoryError::UnsupportedOperation(format!(
            "attaching to {} is not supported on {}",
            identifier,
            std::env::consts::OS
        )))
    }
}

/// Maps an I/O error raised while opening a process to the attach taxonomy
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn attach_error(pid: u32, err: &std::io::Error) -> MemoryError {
    match err.kind() {
        std::io::ErrorKind::NotFound => MemoryError::ProcessNotFound(format!("pid {}", pid)),
        std::io::ErrorKind::PermissionDenied => MemoryError::access_denied(pid, err.to_string()),
        _ => MemoryError::access_denied(pid, format!("failed to open process: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_attach_error_mapping() {
        let err = attach_error(5, &io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, MemoryError::ProcessNotFound(_)));

        let err = attach_error(5, &io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, MemoryError::AccessDenied { pid: 5, .. }));
    }
}
