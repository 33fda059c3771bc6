//! Process attachment and raw memory access
//!
//! A [`ProcessHandle`] owns one attached process through a platform
//! [`ProcessBackend`] and keeps the current [`ModuleTable`] snapshot.

pub mod backend;
pub mod handle;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod modules;
pub mod simulated;

pub use backend::{open_platform, ProcessBackend};
pub use handle::{HandleOptions, ProcessHandle};
pub use modules::ModuleTable;
pub use simulated::SimulatedProcess;

pub(crate) use handle::HandleShared;
