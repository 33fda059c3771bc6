//! Windows API bindings
//!
//! Low-level FFI wrappers over Windows system libraries.

pub mod kernel32;
pub mod psapi;
pub mod toolhelp;
