//! memfx: reversible memory effects for a running process
//!
//! Attach to a process with [`ProcessHandle`], address its memory through
//! [`ProcessMemoryPointer`], and apply [`Effect`]s that remember what they
//! overwrote so they can put it back.

pub mod config;
pub mod core;
pub mod effect;
pub mod memory;
pub mod process;
pub mod session;
#[cfg(target_os = "windows")]
pub mod windows;

pub use core::types::{
    Address, ErrorKind, MemoryError, MemoryResult, ProcessArchitecture, ProcessId,
    ProcessIdentifier, ProcessInfo, ProcessModule,
};
pub use core::{AUTHORS, VERSION};
pub use effect::{
    Effect, EffectFactory, EffectId, EffectRegistry, EffectState, PatchEffect, ReapplyPolicy,
    ToggleEffect,
};
pub use memory::{PointerSpec, Primitive, ProcessMemoryPointer};
pub use process::{HandleOptions, ModuleTable, ProcessBackend, ProcessHandle, SimulatedProcess};
pub use session::{DetachReport, EnableOutcome, Session};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constants() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
        assert_eq!(AUTHORS, env!("CARGO_PKG_AUTHORS"));
    }

    #[test]
    fn test_root_reexports() {
        let sim = SimulatedProcess::new(7, "game.exe");
        sim.map_module("game.exe", 0x40_0000, 0x1000);
        let process = ProcessHandle::from_backend(sim.backend()).unwrap();

        let pointer = process.pointer("game.exe", 0x10);
        pointer.write::<u32>(5).unwrap();
        assert_eq!(pointer.read::<u32>().unwrap(), 5);
        assert_eq!(process.info().architecture, ProcessArchitecture::X64);

        let err = MemoryError::ModuleNotFound("x.dll".into());
        assert_eq!(err.kind(), ErrorKind::Module);
    }
}
