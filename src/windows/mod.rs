//! Windows backend
//!
//! All unsafe FFI calls are contained within this module. Everything above
//! it talks to the process through [`WindowsProcess`] and the
//! [`ProcessBackend`](crate::process::ProcessBackend) trait.

pub mod bindings;
pub mod process;
pub mod types;
pub mod utils;

pub use process::WindowsProcess;
pub use types::Handle;
pub use utils::ErrorCode;
