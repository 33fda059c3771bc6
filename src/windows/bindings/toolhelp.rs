//! Process lookup using the ToolHelp32 API

use crate::windows::types::Handle;
use crate::windows::utils::{ansi_to_string, ErrorCode};
use std::mem;
use winapi::shared::minwindef::FALSE;
use winapi::um::handleapi::INVALID_HANDLE_VALUE;
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Process32First, Process32Next, PROCESSENTRY32, TH32CS_SNAPPROCESS,
};

/// Iterator over `(pid, executable name)` of every running process
pub struct ProcessSnapshot {
    snapshot: Handle,
    first_called: bool,
}

impl ProcessSnapshot {
    pub fn new() -> Result<Self, ErrorCode> {
        let raw = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
        if raw.is_null() || raw == INVALID_HANDLE_VALUE {
            return Err(ErrorCode::last_error());
        }
        Ok(ProcessSnapshot {
            snapshot: Handle::new(raw),
            first_called: false,
        })
    }
}

impl Iterator for ProcessSnapshot {
    type Item = (u32, String);

    fn next(&mut self) -> Option<Self::Item> {
        unsafe {
            let mut entry: PROCESSENTRY32 = mem::zeroed();
            entry.dwSize = mem::size_of::<PROCESSENTRY32>() as u32;

            let success = if !self.first_called {
                self.first_called = true;
                Process32First(self.snapshot.raw(), &mut entry)
            } else {
                Process32Next(self.snapshot.raw(), &mut entry)
            };

            if success == FALSE {
                return None;
            }

            Some((entry.th32ProcessID, ansi_to_string(&entry.szExeFile)))
        }
    }
}

/// First process whose executable name is exactly `name`
pub fn find_pid_by_name(name: &str) -> Result<Option<u32>, ErrorCode> {
    Ok(ProcessSnapshot::new()?
        .find(|(_, exe)| exe == name)
        .map(|(pid, _)| pid))
}
