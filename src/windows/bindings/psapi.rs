//! PSAPI.dll bindings for module enumeration

use crate::windows::utils::{wide_to_string, ErrorCode};
use std::mem;
use std::ptr;
use winapi::shared::minwindef::{DWORD, FALSE, HMODULE, MAX_PATH};
use winapi::um::psapi::{
    EnumProcessModulesEx, GetModuleBaseNameW, GetModuleFileNameExW, GetModuleInformation,
    LIST_MODULES_ALL, MODULEINFO,
};
use winapi::um::winnt::HANDLE;

/// Safe wrapper for EnumProcessModulesEx, listing both 32 and 64-bit modules
///
/// # Safety
/// The handle must be a valid process handle with query and read access
pub unsafe fn enum_process_modules(handle: HANDLE) -> Result<Vec<HMODULE>, ErrorCode> {
    let mut modules: Vec<HMODULE> = vec![ptr::null_mut(); 1024];

    loop {
        let capacity = (modules.len() * mem::size_of::<HMODULE>()) as DWORD;
        let mut bytes_needed = 0u32;

        let result = EnumProcessModulesEx(
            handle,
            modules.as_mut_ptr(),
            capacity,
            &mut bytes_needed,
            LIST_MODULES_ALL,
        );
        if result == FALSE {
            return Err(ErrorCode::last_error());
        }

        let count = bytes_needed as usize / mem::size_of::<HMODULE>();
        if count <= modules.len() {
            modules.truncate(count);
            return Ok(modules);
        }
        modules.resize(count, ptr::null_mut());
    }
}

/// Safe wrapper for GetModuleInformation
///
/// # Safety
/// The handle must be a valid process handle and module must belong to it
pub unsafe fn get_module_information(
    handle: HANDLE,
    module: HMODULE,
) -> Result<MODULEINFO, ErrorCode> {
    let mut info: MODULEINFO = mem::zeroed();

    let result = GetModuleInformation(
        handle,
        module,
        &mut info,
        mem::size_of::<MODULEINFO>() as u32,
    );

    if result == FALSE {
        return Err(ErrorCode::last_error());
    }

    Ok(info)
}

/// Safe wrapper for GetModuleBaseNameW
///
/// # Safety
/// The handle must be a valid process handle and module must belong to it
pub unsafe fn get_module_base_name(handle: HANDLE, module: HMODULE) -> Result<String, ErrorCode> {
    let mut buffer = vec![0u16; MAX_PATH];

    let length = GetModuleBaseNameW(handle, module, buffer.as_mut_ptr(), MAX_PATH as u32);
    if length == 0 {
        return Err(ErrorCode::last_error());
    }

    Ok(wide_to_string(&buffer[..length as usize]))
}

/// Safe wrapper for GetModuleFileNameExW
///
/// # Safety
/// The handle must be a valid process handle and module must belong to it
pub unsafe fn get_module_file_name(handle: HANDLE, module: HMODULE) -> Result<String, ErrorCode> {
    let mut buffer = vec![0u16; MAX_PATH];

    let length = GetModuleFileNameExW(handle, module, buffer.as_mut_ptr(), MAX_PATH as u32);
    if length == 0 {
        return Err(ErrorCode::last_error());
    }

    Ok(wide_to_string(&buffer[..length as usize]))
}
