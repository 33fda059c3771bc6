//! In-memory process backend
//!
//! Models a target process as a set of mapped regions and a module list.
//! Clones share the same state, so a test can keep one clone to inspect and
//! mutate the "remote" memory while a [`ProcessHandle`](super::ProcessHandle)
//! owns another.

use super::backend::ProcessBackend;
use crate::core::types::{
    Address, MemoryError, MemoryResult, ProcessArchitecture, ProcessInfo, ProcessModule,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Region {
    data: Vec<u8>,
    writable: bool,
}

#[derive(Debug, Default)]
struct SimState {
    alive: bool,
    regions: BTreeMap<u64, Region>,
    modules: Vec<ProcessModule>,
    write_limit: Option<usize>,
    read_failure: Option<usize>,
    writes: usize,
    closed: bool,
}

impl SimState {
    /// Region holding `address`, with the byte index inside it
    fn locate(&self, address: u64) -> Option<(u64, usize)> {
        let (&base, region) = self.regions.range(..=address).next_back()?;
        let index = usize::try_from(address - base).ok()?;
        (index < region.data.len()).then_some((base, index))
    }

    fn byte(&self, address: u64) -> Option<u8> {
        let (base, index) = self.locate(address)?;
        self.regions.get(&base).map(|r| r.data[index])
    }

    fn byte_mut(&mut self, address: u64, honor_protection: bool) -> Option<&mut u8> {
        let (base, index) = self.locate(address)?;
        let region = self.regions.get_mut(&base)?;
        if honor_protection && !region.writable {
            return None;
        }
        region.data.get_mut(index)
    }
}

/// Simulated target process
#[derive(Debug, Clone)]
pub struct SimulatedProcess {
    info: ProcessInfo,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedProcess {
    /// Creates a live, empty 64-bit process
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        SimulatedProcess {
            info: ProcessInfo::new(pid, name, ProcessArchitecture::X64),
            state: Arc::new(Mutex::new(SimState {
                alive: true,
                ..SimState::default()
            })),
        }
    }

    pub fn with_architecture(mut self, architecture: ProcessArchitecture) -> Self {
        self.info.architecture = architecture;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Boxed clone to hand to a [`ProcessHandle`](super::ProcessHandle)
    pub fn backend(&self) -> Box<dyn ProcessBackend> {
        Box::new(self.clone())
    }

    /// Maps `size` zeroed bytes at `base`, replacing any region starting there
    pub fn map_region(&self, base: u64, size: usize, writable: bool) {
        self.lock().regions.insert(
            base,
            Region {
                data: vec![0; size],
                writable,
            },
        );
    }

    /// Maps a writable region and registers it as a module
    pub fn map_module(&self, name: &str, base: u64, size: usize) {
        self.map_region(base, size, true);
        let mut state = self.lock();
        state.modules.retain(|m| m.name != name);
        state
            .modules
            .push(ProcessModule::new(name, base, size as u64));
    }

    /// Removes a module and its memory
    pub fn unload_module(&self, name: &str) {
        let mut state = self.lock();
        let removed: Vec<_> = state
            .modules
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.base.as_u64())
            .collect();
        state.modules.retain(|m| m.name != name);
        for base in removed {
            state.regions.remove(&base);
        }
    }

    /// Moves a module and its contents to `new_base`
    pub fn relocate_module(&self, name: &str, new_base: u64) -> MemoryResult<()> {
        let mut state = self.lock();
        let module = state
            .modules
            .iter_mut()
            .find(|m| m.name == name)
            .ok_or_else(|| MemoryError::ModuleNotFound(name.to_string()))?;
        let old_base = module.base.as_u64();
        module.base = Address::new(new_base);
        if let Some(region) = state.regions.remove(&old_base) {
            state.regions.insert(new_base, region);
        }
        Ok(())
    }

    /// Writes directly into simulated memory, ignoring protection
    pub fn poke(&self, address: u64, bytes: &[u8]) -> MemoryResult<()> {
        let mut state = self.lock();
        for (i, &value) in bytes.iter().enumerate() {
            let at = address + i as u64;
            let slot = state
                .byte_mut(at, false)
                .ok_or_else(|| MemoryError::access(at, "unmapped"))?;
            *slot = value;
        }
        Ok(())
    }

    pub fn peek(&self, address: u64, len: usize) -> MemoryResult<Vec<u8>> {
        let state = self.lock();
        (0..len as u64)
            .map(|i| {
                state
                    .byte(address + i)
                    .ok_or_else(|| MemoryError::access(address + i, "unmapped"))
            })
            .collect()
    }

    /// Marks the process as exited
    pub fn terminate(&self) {
        self.lock().alive = false;
    }

    /// Makes the next backend write stop after `bytes` bytes
    pub fn fail_next_write_after(&self, bytes: usize) {
        self.lock().write_limit = Some(bytes);
    }

    /// Lets `reads` more backend reads succeed, then fails the one after
    pub fn fail_read_after(&self, reads: usize) {
        self.lock().read_failure = Some(reads);
    }

    /// Number of backend writes performed so far
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl ProcessBackend for SimulatedProcess {
    fn info(&self) -> &ProcessInfo {
        &self.info
    }

    fn is_alive(&self) -> bool {
        self.lock().alive
    }

    fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        let mut state = self.lock();
        if !state.alive {
            return Err(MemoryError::state(self.info.pid, "process has exited"));
        }
        match state.read_failure {
            Some(0) => {
                state.read_failure = None;
                return Err(MemoryError::access(address, "page protection changed"));
            }
            Some(left) => state.read_failure = Some(left - 1),
            None => {}
        }
        for (i, slot) in buffer.iter_mut().enumerate() {
            match state.byte(address.as_u64() + i as u64) {
                Some(value) => *slot = value,
                None if i == 0 => return Err(MemoryError::access(address, "unmapped")),
                None => return Ok(i),
            }
        }
        Ok(buffer.len())
    }

    fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        let mut state = self.lock();
        if !state.alive {
            return Err(MemoryError::state(self.info.pid, "process has exited"));
        }
        state.writes += 1;
        let limit = state.write_limit.take().unwrap_or(data.len()).min(data.len());
        for (i, &value) in data[..limit].iter().enumerate() {
            match state.byte_mut(address.as_u64() + i as u64, true) {
                Some(slot) => *slot = value,
                None if i == 0 => {
                    return Err(MemoryError::access(address, "unmapped or read-only"))
                }
                None => return Ok(i),
            }
        }
        Ok(limit)
    }

    fn modules(&self) -> MemoryResult<Vec<ProcessModule>> {
        let state = self.lock();
        if !state.alive {
            return Err(MemoryError::state(self.info.pid, "process has exited"));
        }
        Ok(state.modules.clone())
    }

    fn close(&mut self) {
        self.lock().closed = true;
    }
}
