//! Windows backend over OpenProcess / ReadProcessMemory / WriteProcessMemory

use crate::core::types::{
    Address, MemoryError, MemoryResult, ProcessArchitecture, ProcessIdentifier, ProcessInfo,
    ProcessModule,
};
use crate::process::ProcessBackend;
use crate::windows::bindings::{kernel32, psapi, toolhelp};
use crate::windows::types::Handle;
use crate::windows::utils::ErrorCode;
use std::path::PathBuf;
use tracing::{debug, warn};
use winapi::um::winnt::{
    PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

const ACCESS_RIGHTS: u32 =
    PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION;

/// A process opened with read, write and query rights
pub struct WindowsProcess {
    handle: Handle,
    info: ProcessInfo,
}

impl WindowsProcess {
    pub fn open(identifier: &ProcessIdentifier) -> MemoryResult<Self> {
        let (pid, name) = match identifier {
            ProcessIdentifier::Pid(pid) => (*pid, None),
            ProcessIdentifier::Name(name) => {
                let pid = toolhelp::find_pid_by_name(name)
                    .map_err(|code| {
                        MemoryError::ProcessNotFound(format!(
                            "process snapshot failed: {}",
                            code
                        ))
                    })?
                    .ok_or_else(|| MemoryError::ProcessNotFound(name.clone()))?;
                (pid, Some(name.clone()))
            }
        };
        Self::open_pid(pid, name)
    }

    fn open_pid(pid: u32, name: Option<String>) -> MemoryResult<Self> {
        let raw = kernel32::open_process(pid, ACCESS_RIGHTS).map_err(|code| code.attach_error(pid))?;
        let handle = Handle::new(raw);

        let architecture = match unsafe { kernel32::is_wow64_process(handle.raw()) } {
            Ok(true) => ProcessArchitecture::X86,
            Ok(false) => ProcessArchitecture::host(),
            Err(code) => {
                debug!(pid, error = %code, "IsWow64Process failed, assuming host architecture");
                ProcessArchitecture::host()
            }
        };

        let name = match name {
            Some(name) => name,
            None => main_module_name(&handle).unwrap_or_else(|| format!("pid-{}", pid)),
        };

        Ok(WindowsProcess {
            handle,
            info: ProcessInfo::new(pid, name, architecture),
        })
    }

    fn transfer_error(&self, code: ErrorCode, address: Address, operation: &str) -> MemoryError {
        if !self.is_alive() {
            MemoryError::state(self.info.pid, "process has exited")
        } else {
            code.access_error(address, operation)
        }
    }
}

fn main_module_name(handle: &Handle) -> Option<String> {
    unsafe {
        let modules = psapi::enum_process_modules(handle.raw()).ok()?;
        let first = *modules.first()?;
        psapi::get_module_base_name(handle.raw(), first).ok()
    }
}

impl ProcessBackend for WindowsProcess {
    fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn is_alive(&self) -> bool {
        if self.handle.is_null() {
            return false;
        }
        unsafe { kernel32::is_process_running(self.handle.raw()) }.unwrap_or(false)
    }

    fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        match unsafe { kernel32::read_process_memory(self.handle.raw(), address.as_u64(), buffer) } {
            Ok(read) => Ok(read),
            // short transfer; the handle classifies it and restores on writes
            Err(ErrorCode::PartialCopy) => Ok(0),
            Err(code) => Err(self.transfer_error(code, address, "ReadProcessMemory")),
        }
    }

    fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        match unsafe { kernel32::write_process_memory(self.handle.raw(), address.as_u64(), data) } {
            Ok(written) => Ok(written),
            Err(ErrorCode::PartialCopy) => Ok(0),
            Err(code) => Err(self.transfer_error(code, address, "WriteProcessMemory")),
        }
    }

    fn modules(&self) -> MemoryResult<Vec<ProcessModule>> {
        let raw = self.handle.raw();
        let handles = unsafe { psapi::enum_process_modules(raw) }.map_err(|code| {
            if self.is_alive() {
                MemoryError::ModuleNotFound(format!("EnumProcessModulesEx failed: {}", code))
            } else {
                MemoryError::state(self.info.pid, "process has exited")
            }
        })?;

        let mut modules = Vec::with_capacity(handles.len());
        for module in handles {
            let info = match unsafe { psapi::get_module_information(raw, module) } {
                Ok(info) => info,
                Err(code) => {
                    warn!(error = %code, "skipping module without information");
                    continue;
                }
            };
            let name = unsafe { psapi::get_module_base_name(raw, module) }
                .unwrap_or_else(|_| format!("module@{:X}", info.lpBaseOfDll as usize));

            let mut entry =
                ProcessModule::new(name, info.lpBaseOfDll as u64, u64::from(info.SizeOfImage));
            if let Ok(path) = unsafe { psapi::get_module_file_name(raw, module) } {
                entry = entry.with_path(PathBuf::from(path));
            }
            modules.push(entry);
        }
        Ok(modules)
    }

    fn close(&mut self) {
        self.handle = Handle::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_self() {
        let pid = std::process::id();
        let process = WindowsProcess::open(&ProcessIdentifier::Pid(pid)).unwrap();
        assert_eq!(process.info().pid, pid);
        assert!(process.is_alive());

        let value: u64 = 0x1122_3344_5566_7788;
        let mut buffer = [0u8; 8];
        let read = process
            .read(Address::new(&value as *const u64 as u64), &mut buffer)
            .unwrap();
        assert_eq!(read, 8);
        assert_eq!(u64::from_le_bytes(buffer), value);

        let modules = process.modules().unwrap();
        assert!(!modules.is_empty());
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_missing_name() {
        let err = WindowsProcess::open(&ProcessIdentifier::Name("no-such-process-memfx.exe".into()))
            .err()
            .unwrap();
        assert!(matches!(err, MemoryError::ProcessNotFound(_)));
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_closed_process_is_dead() {
        let mut process = WindowsProcess::open(&ProcessIdentifier::Pid(std::process::id())).unwrap();
        process.close();
        assert!(!process.is_alive());
    }
}
