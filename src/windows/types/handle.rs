//! Owned process HANDLE for the Windows backend
//!
//! `WindowsProcess` keeps one of these for the lifetime of an attachment;
//! `ProcessBackend::close` swaps it for `Handle::null()` so the kernel handle
//! is closed exactly once, on release or on drop.

use crate::windows::bindings::kernel32;
use std::ptr;
use winapi::um::winnt::HANDLE;

/// Owned Windows HANDLE, closed on drop
///
/// A null handle is inert: dropping it makes no kernel call.
pub struct Handle {
    handle: HANDLE,
}

impl Handle {
    /// Takes ownership of a raw handle returned by `OpenProcess`
    pub fn new(handle: HANDLE) -> Self {
        Handle { handle }
    }

    pub fn null() -> Self {
        Handle {
            handle: ptr::null_mut(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.handle.is_null()
    }

    pub fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                kernel32::close_handle(self.handle);
            }
            self.handle = ptr::null_mut();
        }
    }
}

// Process handles are plain kernel object references, usable from any thread
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}
