//! Kernel32.dll bindings for process and memory operations

use crate::windows::utils::ErrorCode;
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID, LPVOID};
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::{ReadProcessMemory, WriteProcessMemory};
use winapi::um::minwinbase::STILL_ACTIVE;
use winapi::um::processthreadsapi::{GetExitCodeProcess, OpenProcess};
use winapi::um::winnt::HANDLE;
use winapi::um::wow64apiset::IsWow64Process;

/// Safe wrapper for OpenProcess
pub fn open_process(pid: u32, desired_access: DWORD) -> Result<HANDLE, ErrorCode> {
    let handle = unsafe { OpenProcess(desired_access, FALSE, pid) };
    if handle.is_null() {
        Err(ErrorCode::last_error())
    } else {
        Ok(handle)
    }
}

/// Safe wrapper for CloseHandle
///
/// # Safety
/// The handle must be a valid Windows handle that is not used afterwards
pub unsafe fn close_handle(handle: HANDLE) -> bool {
    handle.is_null() || CloseHandle(handle) != FALSE
}

fn remote_address(address: u64) -> Result<usize, ErrorCode> {
    usize::try_from(address).map_err(|_| ErrorCode::InvalidAddress)
}

/// Safe wrapper for ReadProcessMemory
///
/// # Safety
/// The handle must be a valid process handle with PROCESS_VM_READ access
pub unsafe fn read_process_memory(
    handle: HANDLE,
    address: u64,
    buffer: &mut [u8],
) -> Result<usize, ErrorCode> {
    let mut bytes_read = 0;

    let result = ReadProcessMemory(
        handle,
        remote_address(address)? as LPCVOID,
        buffer.as_mut_ptr() as LPVOID,
        buffer.len(),
        &mut bytes_read,
    );

    if result == FALSE {
        Err(ErrorCode::last_error())
    } else {
        Ok(bytes_read)
    }
}

/// Safe wrapper for WriteProcessMemory
///
/// # Safety
/// The handle must be a valid process handle with PROCESS_VM_WRITE and
/// PROCESS_VM_OPERATION access
pub unsafe fn write_process_memory(
    handle: HANDLE,
    address: u64,
    data: &[u8],
) -> Result<usize, ErrorCode> {
    let mut bytes_written = 0;

    let result = WriteProcessMemory(
        handle,
        remote_address(address)? as LPVOID,
        data.as_ptr() as LPCVOID,
        data.len(),
        &mut bytes_written,
    );

    if result == FALSE {
        Err(ErrorCode::last_error())
    } else {
        Ok(bytes_written)
    }
}

/// Whether the process behind `handle` has not exited yet
///
/// # Safety
/// The handle must be a valid process handle with query access
pub unsafe fn is_process_running(handle: HANDLE) -> Result<bool, ErrorCode> {
    let mut exit_code: DWORD = 0;
    if GetExitCodeProcess(handle, &mut exit_code) == FALSE {
        return Err(ErrorCode::last_error());
    }
    Ok(exit_code == STILL_ACTIVE)
}

/// Whether the process is a 32-bit process running under WoW64
///
/// # Safety
/// The handle must be a valid process handle with query access
pub unsafe fn is_wow64_process(handle: HANDLE) -> Result<bool, ErrorCode> {
    let mut wow64 = FALSE;
    if IsWow64Process(handle, &mut wow64) == FALSE {
        return Err(ErrorCode::last_error());
    }
    Ok(wow64 != FALSE)
}
