//! Core type definitions
//!
//! Address wrapper, module and process descriptors, and the error taxonomy
//! shared by every layer of the crate.

mod address;
mod error;
mod module;
mod process_info;

pub use address::Address;
pub use error::{ErrorKind, MemoryError, MemoryResult};
pub use module::ProcessModule;
pub use process_info::{ProcessArchitecture, ProcessIdentifier, ProcessInfo};

pub type ProcessId = u32;
