//! Attached process handle with RAII release

use super::backend::{self, ProcessBackend};
use super::modules::ModuleTable;
use crate::config::MemoryConfig;
use crate::core::types::{
    Address, MemoryError, MemoryResult, ProcessArchitecture, ProcessIdentifier, ProcessInfo,
    ProcessModule,
};
use crate::memory::{PointerSpec, ProcessMemoryPointer};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tracing::{debug, info, warn};

/// Tunables applied to every read and write through a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleOptions {
    /// Largest single read accepted, in bytes
    pub max_read_size: usize,
    /// Read back every write and fail if the target does not hold the data
    pub verify_writes: bool,
}

impl Default for HandleOptions {
    fn default() -> Self {
        HandleOptions {
            max_read_size: 1 << 20,
            verify_writes: false,
        }
    }
}

impl From<&MemoryConfig> for HandleOptions {
    fn from(config: &MemoryConfig) -> Self {
        HandleOptions {
            max_read_size: config.max_read_size,
            verify_writes: config.verify_writes,
        }
    }
}

/// State shared between a handle and the pointers derived from it
pub(crate) struct HandleShared {
    info: ProcessInfo,
    options: HandleOptions,
    backend: Mutex<Option<Box<dyn ProcessBackend>>>,
    modules: RwLock<Arc<ModuleTable>>,
}

type BackendGuard<'a> = MutexGuard<'a, Option<Box<dyn ProcessBackend>>>;

impl HandleShared {
    pub(crate) fn pid(&self) -> u32 {
        self.info.pid
    }

    pub(crate) fn architecture(&self) -> ProcessArchitecture {
        self.info.architecture
    }

    fn lock(&self) -> BackendGuard<'_> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the backend, failing with a state error if it is unusable
    fn usable(&self) -> MemoryResult<BackendGuard<'_>> {
        let guard = self.lock();
        let problem = match guard.as_ref() {
            None => Some("process handle was released"),
            Some(backend) if !backend.is_alive() => Some("process has exited"),
            Some(_) => None,
        };
        match problem {
            Some(reason) => Err(MemoryError::state(self.pid(), reason)),
            None => Ok(guard),
        }
    }

    pub(crate) fn ensure_usable(&self) -> MemoryResult<()> {
        self.usable().map(|_| ())
    }

    pub(crate) fn modules(&self) -> Arc<ModuleTable> {
        Arc::clone(&self.modules.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn refresh_modules(&self) -> MemoryResult<Arc<ModuleTable>> {
        let modules = {
            let guard = self.usable()?;
            match guard.as_ref() {
                Some(backend) => backend.modules()?,
                None => return Err(MemoryError::state(self.pid(), "process handle was released")),
            }
        };

        let table = Arc::new(ModuleTable::new(modules)?);
        debug!(pid = self.pid(), modules = table.len(), "module table refreshed");
        *self.modules.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&table);
        Ok(table)
    }

    pub(crate) fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<()> {
        if buffer.len() > self.options.max_read_size {
            return Err(MemoryError::InvalidConfiguration(format!(
                "read of {} bytes exceeds the {} byte limit",
                buffer.len(),
                self.options.max_read_size
            )));
        }
        check_range(address, buffer.len())?;

        let guard = self.usable()?;
        let backend = guard
            .as_ref()
            .ok_or_else(|| MemoryError::state(self.pid(), "process handle was released"))?;
        Self::read_locked(backend.as_ref(), address, buffer)
    }

    fn read_locked(
        backend: &dyn ProcessBackend,
        address: Address,
        buffer: &mut [u8],
    ) -> MemoryResult<()> {
        let read = backend.read(address, buffer)?;
        if read < buffer.len() {
            return Err(MemoryError::access(
                address,
                format!("short read: {} of {} bytes", read, buffer.len()),
            ));
        }
        Ok(())
    }

    pub(crate) fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_into(address, &mut buffer)?;
        Ok(buffer)
    }

    /// Reads a pointer-sized value using the target's pointer width
    pub(crate) fn read_pointer(&self, address: Address) -> MemoryResult<Address> {
        let value = match self.architecture().pointer_size() {
            4 => {
                let mut raw = [0u8; 4];
                self.read_into(address, &mut raw)?;
                u64::from(u32::from_le_bytes(raw))
            }
            _ => {
                let mut raw = [0u8; 8];
                self.read_into(address, &mut raw)?;
                u64::from_le_bytes(raw)
            }
        };
        Ok(Address::new(value))
    }

    /// Writes `data` entirely or not at all
    ///
    /// The pre-image is captured first. If the operating system reports a
    /// short or failed write, the pre-image is written back before the error
    /// is returned.
    pub(crate) fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        if data.is_empty() {
            return self.ensure_usable();
        }
        check_range(address, data.len())?;

        let guard = self.usable()?;
        let backend = guard
            .as_ref()
            .ok_or_else(|| MemoryError::state(self.pid(), "process handle was released"))?;
        let backend = backend.as_ref();

        let mut pre_image = vec![0u8; data.len()];
        Self::read_locked(backend, address, &mut pre_image)?;

        let failure = match backend.write(address, data) {
            Ok(written) if written == data.len() => None,
            Ok(written) => {
                Self::restore(backend, address, &pre_image[..written]);
                Some(MemoryError::access(
                    address,
                    format!("short write: {} of {} bytes, rolled back", written, data.len()),
                ))
            }
            Err(err) if err.is_state() => Some(err),
            Err(err) => {
                Self::restore(backend, address, &pre_image);
                Some(err)
            }
        };
        if let Some(err) = failure {
            return Err(err);
        }

        if self.options.verify_writes {
            let mut check = vec![0u8; data.len()];
            match Self::read_locked(backend, address, &mut check) {
                Ok(()) => {}
                Err(err) if err.is_state() => return Err(err),
                Err(err) => {
                    Self::restore(backend, address, &pre_image);
                    return Err(err);
                }
            }
            if check != data {
                Self::restore(backend, address, &pre_image);
                return Err(MemoryError::access(
                    address,
                    "write verification failed, rolled back",
                ));
            }
        }

        Ok(())
    }

    fn restore(backend: &dyn ProcessBackend, address: Address, pre_image: &[u8]) {
        if pre_image.is_empty() {
            return;
        }
        match backend.write(address, pre_image) {
            Ok(written) if written == pre_image.len() => {
                debug!(%address, len = written, "rolled back partial write");
            }
            Ok(written) => {
                warn!(%address, written, expected = pre_image.len(), "rollback was short");
            }
            Err(err) => warn!(%address, error = %err, "rollback failed"),
        }
    }

    pub(crate) fn release(&self) {
        let taken = self.lock().take();
        if let Some(mut backend) = taken {
            backend.close();
            info!(pid = self.pid(), name = %self.info.name, "process released");
        }
    }

    fn is_released(&self) -> bool {
        self.lock().is_none()
    }

    fn is_alive(&self) -> bool {
        self.lock().as_ref().map_or(false, |b| b.is_alive())
    }
}

fn check_range(address: Address, len: usize) -> MemoryResult<()> {
    match address.range_end(len) {
        Some(_) => Ok(()),
        None => Err(MemoryError::access(
            address,
            format!("range of {} bytes wraps the address space", len),
        )),
    }
}

/// Exclusive handle to an attached process
///
/// Pointers created from a handle hold a weak reference to it; once the handle
/// is released or dropped every pointer operation fails with a state error.
pub struct ProcessHandle {
    shared: Arc<HandleShared>,
}

impl ProcessHandle {
    /// Attaches to a process by pid or exact executable name
    pub fn attach(identifier: impl Into<ProcessIdentifier>) -> MemoryResult<Self> {
        Self::attach_with(identifier, HandleOptions::default())
    }

    pub fn attach_with(
        identifier: impl Into<ProcessIdentifier>,
        options: HandleOptions,
    ) -> MemoryResult<Self> {
        let identifier = identifier.into();
        let backend = backend::open_platform(&identifier)?;
        Self::from_backend_with(backend, options)
    }

    /// Wraps an already opened backend and takes the first module snapshot
    pub fn from_backend(backend: Box<dyn ProcessBackend>) -> MemoryResult<Self> {
        Self::from_backend_with(backend, HandleOptions::default())
    }

    pub fn from_backend_with(
        backend: Box<dyn ProcessBackend>,
        options: HandleOptions,
    ) -> MemoryResult<Self> {
        let info = backend.info().clone();
        let handle = ProcessHandle {
            shared: Arc::new(HandleShared {
                info,
                options,
                backend: Mutex::new(Some(backend)),
                modules: RwLock::new(Arc::new(ModuleTable::empty())),
            }),
        };
        handle.refresh_modules()?;
        info!(
            pid = handle.pid(),
            name = %handle.name(),
            architecture = ?handle.architecture(),
            "attached to process"
        );
        Ok(handle)
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.shared.info
    }

    pub fn pid(&self) -> u32 {
        self.shared.pid()
    }

    pub fn name(&self) -> &str {
        &self.shared.info.name
    }

    pub fn architecture(&self) -> ProcessArchitecture {
        self.shared.architecture()
    }

    pub fn options(&self) -> HandleOptions {
        self.shared.options
    }

    pub fn read_bytes(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        self.shared.read_bytes(address, len)
    }

    pub fn write_bytes(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        self.shared.write_bytes(address, data)
    }

    /// Liveness probe; a `true` answer does not guarantee the next call succeeds
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    pub fn is_released(&self) -> bool {
        self.shared.is_released()
    }

    /// Closes the underlying process handle. Safe to call more than once.
    pub fn release(&self) {
        self.shared.release();
    }

    /// Re-enumerates modules and swaps in the new snapshot
    pub fn refresh_modules(&self) -> MemoryResult<Arc<ModuleTable>> {
        self.shared.refresh_modules()
    }

    /// Latest module snapshot
    pub fn modules(&self) -> Arc<ModuleTable> {
        self.shared.modules()
    }

    /// Module of the process executable, if present in the snapshot
    pub fn main_module(&self) -> Option<ProcessModule> {
        self.modules().resolve(self.name()).ok().cloned()
    }

    /// Pointer at `offset` bytes into `module`, resolved on every access
    pub fn pointer(&self, module: impl Into<String>, offset: u64) -> ProcessMemoryPointer {
        ProcessMemoryPointer::module(self.downgrade(), self.pid(), module, offset)
    }

    pub fn pointer_at(&self, address: Address) -> ProcessMemoryPointer {
        ProcessMemoryPointer::absolute(self.downgrade(), self.pid(), address)
    }

    pub fn pointer_from_spec(&self, spec: &PointerSpec) -> ProcessMemoryPointer {
        ProcessMemoryPointer::from_spec(self.downgrade(), self.pid(), spec)
    }

    fn downgrade(&self) -> Weak<HandleShared> {
        Arc::downgrade(&self.shared)
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid())
            .field("name", &self.name())
            .field("architecture", &self.architecture())
            .field("released", &self.is_released())
            .finish()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessHandle(pid={}, name={})", self.pid(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SimulatedProcess;
    use pretty_assertions::assert_eq;

    fn attached() -> (SimulatedProcess, ProcessHandle) {
        let sim = SimulatedProcess::new(42, "game.exe");
        sim.map_module("game.exe", 0x40_0000, 0x1000);
        sim.map_region(0x50_0000, 0x100, false);
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();
        (sim, handle)
    }

    #[test]
    fn test_read_write() {
        let (sim, handle) = attached();
        handle
            .write_bytes(Address::new(0x40_0010), &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(
            handle.read_bytes(Address::new(0x40_0010), 4).unwrap(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(sim.peek(0x40_0010, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unmapped_read_is_access_error() {
        let (_sim, handle) = attached();
        let err = handle.read_bytes(Address::new(0x10), 4).unwrap_err();
        assert!(err.is_access(), "{:?}", err);

        // Straddles the end of the module
        let err = handle.read_bytes(Address::new(0x40_0FFE), 4).unwrap_err();
        assert!(err.is_access(), "{:?}", err);
    }

    #[test]
    fn test_read_only_write_is_access_error() {
        let (sim, handle) = attached();
        sim.poke(0x50_0000, &[9, 9]).unwrap();
        let err = handle
            .write_bytes(Address::new(0x50_0000), &[1, 1])
            .unwrap_err();
        assert!(err.is_access());
        assert_eq!(sim.peek(0x50_0000, 2).unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_short_write_is_rolled_back() {
        let (sim, handle) = attached();
        sim.poke(0x40_0000, &[0xAA, 0xBB, 0xCC, 0xDD]).unwrap();
        sim.fail_next_write_after(2);

        let err = handle
            .write_bytes(Address::new(0x40_0000), &[1, 2, 3, 4])
            .unwrap_err();
        assert!(err.is_access());
        assert_eq!(sim.peek(0x40_0000, 4).unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_exited_process_is_state_error() {
        let (sim, handle) = attached();
        sim.terminate();
        assert!(!handle.is_alive());
        assert!(handle.read_bytes(Address::new(0x40_0000), 1).unwrap_err().is_state());
        assert!(handle
            .write_bytes(Address::new(0x40_0000), &[1])
            .unwrap_err()
            .is_state());
        assert!(handle.refresh_modules().unwrap_err().is_state());
    }

    #[test]
    fn test_release_is_idempotent() {
        let (_sim, handle) = attached();
        handle.release();
        handle.release();
        assert!(handle.is_released());
        assert!(!handle.is_alive());
        assert!(handle.read_bytes(Address::new(0x40_0000), 1).unwrap_err().is_state());
    }

    #[test]
    fn test_read_limit() {
        let sim = SimulatedProcess::new(1, "a.exe");
        sim.map_module("a.exe", 0x1000, 0x1000);
        let options = HandleOptions {
            max_read_size: 16,
            verify_writes: true,
        };
        let handle = ProcessHandle::from_backend_with(sim.backend(), options).unwrap();
        assert!(handle.read_bytes(Address::new(0x1000), 16).is_ok());
        assert!(matches!(
            handle.read_bytes(Address::new(0x1000), 17),
            Err(MemoryError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_failed_verification_read_is_rolled_back() {
        let sim = SimulatedProcess::new(42, "game.exe");
        sim.map_module("game.exe", 0x40_0000, 0x1000);
        sim.poke(0x40_0020, &[1, 2]).unwrap();
        let options = HandleOptions {
            verify_writes: true,
            ..HandleOptions::default()
        };
        let handle = ProcessHandle::from_backend_with(sim.backend(), options).unwrap();

        // pre-image read succeeds, the read-back after the write does not
        sim.fail_read_after(1);
        let err = handle
            .write_bytes(Address::new(0x40_0020), &[9, 9])
            .unwrap_err();
        assert!(err.is_access());
        assert_eq!(sim.peek(0x40_0020, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_main_module() {
        let (_sim, handle) = attached();
        let main = handle.main_module().unwrap();
        assert_eq!(main.base, Address::new(0x40_0000));
        assert_eq!(handle.to_string(), "ProcessHandle(pid=42, name=game.exe)");
    }
}
