//! Typed pointers into the target process

use super::primitive::Primitive;
use crate::core::types::{Address, MemoryError, MemoryResult};
use crate::process::HandleShared;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// Where a pointer starts before any chain is followed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PointerTarget {
    Absolute(Address),
    Module { module: String, offset: u64 },
}

impl fmt::Display for PointerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerTarget::Absolute(address) => write!(f, "{}", address),
            PointerTarget::Module { module, offset } => write!(f, "{}+0x{:X}", module, offset),
        }
    }
}

/// Parsed pointer expression
///
/// Syntax is `module+0xOFFSET` or an absolute address, optionally followed by
/// comma separated chain offsets: `dxhr.exe+0x15DE1A8,0x14,0x140`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerSpec {
    pub target: PointerTarget,
    pub chain: Vec<i64>,
}

impl FromStr for PointerSpec {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(',').map(str::trim);
        let head = parts
            .next()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MemoryError::InvalidAddress(s.to_string()))?;

        let target = match head.rsplit_once('+') {
            Some((module, offset)) if !module.is_empty() => PointerTarget::Module {
                module: module.trim().to_string(),
                offset: parse_offset(offset)
                    .and_then(|o| u64::try_from(o).ok())
                    .ok_or_else(|| MemoryError::InvalidAddress(s.to_string()))?,
            },
            _ => PointerTarget::Absolute(head.parse()?),
        };

        let chain = parts
            .map(|part| parse_offset(part).ok_or_else(|| MemoryError::InvalidAddress(s.to_string())))
            .collect::<MemoryResult<Vec<_>>>()?;

        Ok(PointerSpec { target, chain })
    }
}

fn parse_offset(s: &str) -> Option<i64> {
    let s = s.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Typed cursor over one location in the target process
///
/// The location is resolved on every read and write: module-relative
/// pointers consult the handle's current module snapshot and deep pointers
/// walk their chain again, so a relocated module or a moved heap object is
/// always followed. A pointer only holds a weak reference to its handle.
#[derive(Clone)]
pub struct ProcessMemoryPointer {
    handle: Weak<HandleShared>,
    pid: u32,
    target: PointerTarget,
    chain: Vec<i64>,
}

impl ProcessMemoryPointer {
    pub(crate) fn absolute(handle: Weak<HandleShared>, pid: u32, address: Address) -> Self {
        ProcessMemoryPointer {
            handle,
            pid,
            target: PointerTarget::Absolute(address),
            chain: Vec::new(),
        }
    }

    pub(crate) fn module(
        handle: Weak<HandleShared>,
        pid: u32,
        module: impl Into<String>,
        offset: u64,
    ) -> Self {
        ProcessMemoryPointer {
            handle,
            pid,
            target: PointerTarget::Module {
                module: module.into(),
                offset,
            },
            chain: Vec::new(),
        }
    }

    pub(crate) fn from_spec(handle: Weak<HandleShared>, pid: u32, spec: &PointerSpec) -> Self {
        ProcessMemoryPointer {
            handle,
            pid,
            target: spec.target.clone(),
            chain: spec.chain.clone(),
        }
    }

    /// Adds chain offsets: each one dereferences the current address and
    /// adds the offset to the pointer found there
    pub fn deep(mut self, offsets: impl IntoIterator<Item = i64>) -> Self {
        self.chain.extend(offsets);
        self
    }

    pub fn is_deep(&self) -> bool {
        !self.chain.is_empty()
    }

    pub fn target(&self) -> &PointerTarget {
        &self.target
    }

    pub fn chain(&self) -> &[i64] {
        &self.chain
    }

    /// Pointer to the location `delta` bytes past this one
    pub fn offset(&self, delta: i64) -> MemoryResult<Self> {
        let overflow = || MemoryError::InvalidAddress(format!("{} {:+}", self, delta));
        let mut shifted = self.clone();
        if let Some(last) = shifted.chain.last_mut() {
            *last = last.checked_add(delta).ok_or_else(overflow)?;
            return Ok(shifted);
        }
        shifted.target = match &self.target {
            PointerTarget::Absolute(address) => {
                PointerTarget::Absolute(address.checked_offset(delta).ok_or_else(overflow)?)
            }
            PointerTarget::Module { module, offset } => PointerTarget::Module {
                module: module.clone(),
                offset: offset.checked_add_signed(delta).ok_or_else(overflow)?,
            },
        };
        Ok(shifted)
    }

    fn shared(&self) -> MemoryResult<Arc<HandleShared>> {
        self.handle
            .upgrade()
            .ok_or_else(|| MemoryError::state(self.pid, "process handle was dropped"))
    }

    /// Current absolute address of the pointed-to value
    pub fn resolve(&self) -> MemoryResult<Address> {
        let shared = self.shared()?;
        self.resolve_with(&shared)
    }

    fn resolve_with(&self, shared: &HandleShared) -> MemoryResult<Address> {
        // A dead process is reported before anything about stale modules
        shared.ensure_usable()?;

        let mut address = match &self.target {
            PointerTarget::Absolute(address) => *address,
            PointerTarget::Module { module, offset } => {
                let modules = shared.modules();
                let base = modules.resolve(module)?.base;
                base.checked_add(*offset).ok_or_else(|| {
                    MemoryError::InvalidAddress(format!("{} overflows", self.target))
                })?
            }
        };

        for (level, &offset) in self.chain.iter().enumerate() {
            let next = shared.read_pointer(address).map_err(|err| {
                if err.is_access() {
                    MemoryError::pointer_chain_broken(level, address, err.to_string())
                } else {
                    err
                }
            })?;
            if next.is_null() {
                return Err(MemoryError::pointer_chain_broken(
                    level,
                    address,
                    "null pointer",
                ));
            }
            address = next.checked_offset(offset).ok_or_else(|| {
                MemoryError::pointer_chain_broken(level, next, "offset overflows")
            })?;
        }

        Ok(address)
    }

    pub fn read_bytes(&self, len: usize) -> MemoryResult<Vec<u8>> {
        let shared = self.shared()?;
        let address = self.resolve_with(&shared)?;
        shared.read_bytes(address, len)
    }

    /// Writes all of `data` or nothing
    pub fn write_bytes(&self, data: &[u8]) -> MemoryResult<()> {
        let shared = self.shared()?;
        let address = self.resolve_with(&shared)?;
        shared.write_bytes(address, data)
    }

    pub fn read<T: Primitive>(&self) -> MemoryResult<T> {
        let shared = self.shared()?;
        let address = self.resolve_with(&shared)?;
        let bytes = shared.read_bytes(address, T::SIZE)?;
        T::decode(&bytes).ok_or_else(|| MemoryError::access(address, "short read"))
    }

    pub fn write<T: Primitive>(&self, value: T) -> MemoryResult<()> {
        self.write_bytes(&value.encode())
    }

    pub fn read_byte(&self) -> MemoryResult<u8> {
        self.read()
    }

    pub fn read_short(&self) -> MemoryResult<i16> {
        self.read()
    }

    pub fn read_int(&self) -> MemoryResult<i32> {
        self.read()
    }

    pub fn read_long(&self) -> MemoryResult<i64> {
        self.read()
    }

    pub fn read_float(&self) -> MemoryResult<f32> {
        self.read()
    }

    pub fn read_double(&self) -> MemoryResult<f64> {
        self.read()
    }

    pub fn write_byte(&self, value: u8) -> MemoryResult<()> {
        self.write(value)
    }

    pub fn write_short(&self, value: i16) -> MemoryResult<()> {
        self.write(value)
    }

    pub fn write_int(&self, value: i32) -> MemoryResult<()> {
        self.write(value)
    }

    pub fn write_long(&self, value: i64) -> MemoryResult<()> {
        self.write(value)
    }

    pub fn write_float(&self, value: f32) -> MemoryResult<()> {
        self.write(value)
    }

    pub fn write_double(&self, value: f64) -> MemoryResult<()> {
        self.write(value)
    }

    /// Reads up to `max_len` bytes and stops at the first NUL
    pub fn read_string(&self, max_len: usize) -> MemoryResult<String> {
        let bytes = self.read_bytes(max_len)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Whether `len` bytes can currently be read, without raising
    pub fn is_readable(&self, len: usize) -> bool {
        self.read_bytes(len).is_ok()
    }
}

impl fmt::Display for ProcessMemoryPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)?;
        for offset in &self.chain {
            if *offset < 0 {
                write!(f, " -> -0x{:X}", offset.unsigned_abs())?;
            } else {
                write!(f, " -> 0x{:X}", offset)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ProcessMemoryPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessMemoryPointer")
            .field("pid", &self.pid)
            .field("target", &self.target)
            .field("chain", &self.chain)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProcessArchitecture;
    use crate::process::{ProcessHandle, SimulatedProcess};
    use pretty_assertions::assert_eq;

    const BASE: u64 = 0x1000_0000;

    fn attached() -> (SimulatedProcess, ProcessHandle) {
        let sim = SimulatedProcess::new(7, "dxhr.exe");
        sim.map_module("dxhr.exe", BASE, 0x1000);
        sim.map_region(0x2000_0000, 0x1000, true);
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();
        (sim, handle)
    }

    #[test]
    fn test_pointer_expression_parsing() {
        let spec: PointerSpec = "dxhr.exe+0x15DE1A8,0x14, 0x140".parse().unwrap();
        assert_eq!(
            spec.target,
            PointerTarget::Module {
                module: "dxhr.exe".to_string(),
                offset: 0x15DE1A8
            }
        );
        assert_eq!(spec.chain, vec![0x14, 0x140]);

        let spec: PointerSpec = "0x7FF0,-0x8".parse().unwrap();
        assert_eq!(spec.target, PointerTarget::Absolute(Address::new(0x7FF0)));
        assert_eq!(spec.chain, vec![-8]);

        let spec: PointerSpec = "libstdc++.so.6+16".parse().unwrap();
        assert!(matches!(spec.target, PointerTarget::Module { ref module, offset: 16 } if module == "libstdc++.so.6"));

        assert!("".parse::<PointerSpec>().is_err());
        assert!("game+zz".parse::<PointerSpec>().is_err());
        assert!("game+-0x10".parse::<PointerSpec>().is_err());
    }

    #[test]
    fn test_little_endian_reads() {
        let (sim, handle) = attached();
        sim.poke(BASE + 0x10, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08])
            .unwrap();
        let pointer = handle.pointer("dxhr.exe", 0x10);
        assert_eq!(pointer.read_byte().unwrap(), 0x01);
        assert_eq!(pointer.read_short().unwrap(), 0x0201);
        assert_eq!(pointer.read_int().unwrap(), 0x0403_0201);
        assert_eq!(pointer.read_long().unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn test_typed_writes() {
        let (sim, handle) = attached();
        let pointer = handle.pointer("dxhr.exe", 0x20);
        pointer.write_int(-2).unwrap();
        assert_eq!(sim.peek(BASE + 0x20, 4).unwrap(), vec![0xFE, 0xFF, 0xFF, 0xFF]);
        pointer.write_float(1.5).unwrap();
        assert_eq!(pointer.read_float().unwrap(), 1.5);
        pointer.write_double(-0.25).unwrap();
        assert_eq!(pointer.read_double().unwrap(), -0.25);
        pointer.write_short(0x1234).unwrap();
        assert_eq!(pointer.read_bytes(2).unwrap(), vec![0x34, 0x12]);
    }

    #[test]
    fn test_resolution_follows_relocation() {
        let (sim, handle) = attached();
        let pointer = handle.pointer("dxhr.exe", 0x40);
        assert_eq!(pointer.resolve().unwrap(), Address::new(BASE + 0x40));

        sim.relocate_module("dxhr.exe", 0x3000_0000).unwrap();
        sim.poke(0x3000_0040, &[0xAB]).unwrap();
        // The old snapshot still points at the old base, which is now unmapped
        assert!(pointer.read_byte().unwrap_err().is_access());

        handle.refresh_modules().unwrap();
        assert_eq!(pointer.resolve().unwrap(), Address::new(0x3000_0040));
        assert_eq!(pointer.read_byte().unwrap(), 0xAB);
    }

    #[test]
    fn test_unknown_module() {
        let (_sim, handle) = attached();
        let err = handle.pointer("dxhr", 0).read_byte().unwrap_err();
        assert_eq!(err, MemoryError::ModuleNotFound("dxhr".to_string()));
    }

    #[test]
    fn test_deep_pointer() {
        let (sim, handle) = attached();
        sim.poke(BASE + 0x100, &0x2000_0000u64.to_le_bytes()).unwrap();
        sim.poke(0x2000_0014, &0x2000_0800u64.to_le_bytes()).unwrap();
        sim.poke(0x2000_0940, &[99]).unwrap();

        let pointer = handle.pointer("dxhr.exe", 0x100).deep([0x14, 0x140]);
        assert!(pointer.is_deep());
        assert_eq!(pointer.resolve().unwrap(), Address::new(0x2000_0940));
        assert_eq!(pointer.read_byte().unwrap(), 99);
        assert_eq!(pointer.to_string(), "dxhr.exe+0x100 -> 0x14 -> 0x140");

        // Chain is walked again on every access
        sim.poke(0x2000_0014, &0x2000_0000u64.to_le_bytes()).unwrap();
        assert_eq!(pointer.resolve().unwrap(), Address::new(0x2000_0140));
    }

    #[test]
    fn test_deep_pointer_32bit() {
        let sim = SimulatedProcess::new(9, "dxhr.exe").with_architecture(ProcessArchitecture::X86);
        sim.map_module("dxhr.exe", BASE, 0x1000);
        sim.poke(BASE + 0x8, &(BASE as u32 + 0x200).to_le_bytes()).unwrap();
        sim.poke(BASE + 0x210, &[5]).unwrap();
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();

        let pointer = handle.pointer("dxhr.exe", 0x8).deep([0x10]);
        assert_eq!(pointer.read_byte().unwrap(), 5);
    }

    #[test]
    fn test_broken_chain() {
        let (_sim, handle) = attached();
        let err = handle
            .pointer("dxhr.exe", 0x100)
            .deep([0x14])
            .read_byte()
            .unwrap_err();
        assert!(matches!(err, MemoryError::PointerChainBroken { level: 0, .. }));
        assert!(err.is_access());

        let err = handle
            .pointer_at(Address::new(0x10))
            .deep([0])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, MemoryError::PointerChainBroken { level: 0, .. }));
    }

    #[test]
    fn test_offset() {
        let (_sim, handle) = attached();
        let pointer = handle.pointer("dxhr.exe", 0x10).offset(0x4).unwrap();
        assert_eq!(pointer.resolve().unwrap(), Address::new(BASE + 0x14));
        assert!(handle.pointer("dxhr.exe", 0).offset(-1).is_err());

        let deep = handle.pointer_at(Address::new(1)).deep([0x10]).offset(-0x20).unwrap();
        assert_eq!(deep.chain(), &[-0x10]);
    }

    #[test]
    fn test_strings_and_probe() {
        let (sim, handle) = attached();
        sim.poke(BASE + 0x30, b"Adam Jensen\0junk").unwrap();
        let pointer = handle.pointer("dxhr.exe", 0x30);
        assert_eq!(pointer.read_string(16).unwrap(), "Adam Jensen");
        assert!(pointer.is_readable(16));
        assert!(!handle.pointer_at(Address::new(0x10)).is_readable(1));
    }

    #[test]
    fn test_dropped_handle_is_state_error() {
        let (_sim, handle) = attached();
        let pointer = handle.pointer("dxhr.exe", 0);
        drop(handle);
        assert!(pointer.read_byte().unwrap_err().is_state());
    }

    #[test]
    fn test_exit_beats_stale_snapshot() {
        let (sim, handle) = attached();
        let pointer = handle.pointer("gone.dll", 0);
        sim.terminate();
        assert!(pointer.read_byte().unwrap_err().is_state());
        assert!(pointer.write_byte(1).unwrap_err().is_state());
    }
}
