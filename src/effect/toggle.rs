//! Byte flag toggle

use super::{Effect, EffectId, EffectState, PatchEffect, ReapplyPolicy};
use crate::core::types::MemoryResult;
use crate::memory::ProcessMemoryPointer;

/// Flips a one-byte boolean flag (`1` is set, anything else is clear)
///
/// Applying reads the flag and writes its opposite; reverting writes back the
/// exact byte that was read.
#[derive(Debug)]
pub struct ToggleEffect {
    inner: PatchEffect<u8>,
}

impl ToggleEffect {
    pub fn new(id: EffectId, pointer: ProcessMemoryPointer, policy: ReapplyPolicy) -> Self {
        ToggleEffect {
            inner: PatchEffect::new(id, policy)
                .with_slot(pointer, |flag| if flag == 1 { 0 } else { 1 }),
        }
    }

    /// Whether the flag was set before this effect took hold
    ///
    /// While applied this is the captured prior, so a re-apply that reads
    /// back the patched byte does not change it. Once reverted it falls back
    /// to the byte the latest `apply` read.
    pub fn enabled(&self) -> bool {
        self.inner.prior(0).or_else(|| self.inner.last_observed(0)) == Some(1)
    }

    pub fn pointer(&self) -> Option<&ProcessMemoryPointer> {
        self.inner.pointer(0)
    }

    pub fn prior(&self) -> Option<u8> {
        self.inner.prior(0)
    }
}

impl Effect for ToggleEffect {
    fn id(&self) -> EffectId {
        self.inner.id()
    }

    fn apply(&mut self) -> MemoryResult<()> {
        self.inner.apply()
    }

    fn revert(&mut self) -> MemoryResult<()> {
        self.inner.revert()
    }

    fn state(&self) -> EffectState {
        self.inner.state()
    }

    fn reapply_policy(&self) -> ReapplyPolicy {
        self.inner.reapply_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessHandle, SimulatedProcess};

    #[test]
    fn test_toggle_from_set() {
        let sim = SimulatedProcess::new(1, "game.exe");
        sim.map_module("game.exe", 0x1000, 0x10);
        sim.poke(0x1000, &[1]).unwrap();
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();

        let mut effect = ToggleEffect::new(3, handle.pointer("game.exe", 0), ReapplyPolicy::Refresh);
        assert!(!effect.enabled());
        effect.apply().unwrap();
        assert!(effect.enabled());
        assert_eq!(effect.prior(), Some(1));
        assert_eq!(sim.peek(0x1000, 1).unwrap(), vec![0]);

        effect.revert().unwrap();
        assert_eq!(sim.peek(0x1000, 1).unwrap(), vec![1]);
        assert_eq!(effect.prior(), None);
    }

    #[test]
    fn test_non_boolean_byte_counts_as_clear() {
        let sim = SimulatedProcess::new(1, "game.exe");
        sim.map_module("game.exe", 0x1000, 0x10);
        sim.poke(0x1000, &[7]).unwrap();
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();

        let mut effect = ToggleEffect::new(3, handle.pointer("game.exe", 0), ReapplyPolicy::Refresh);
        effect.apply().unwrap();
        assert!(!effect.enabled());
        assert_eq!(sim.peek(0x1000, 1).unwrap(), vec![1]);
        effect.revert().unwrap();
        assert_eq!(sim.peek(0x1000, 1).unwrap(), vec![7]);
    }

    #[test]
    fn test_enabled_survives_refresh_reapply() {
        let sim = SimulatedProcess::new(1, "game.exe");
        sim.map_module("game.exe", 0x1000, 0x10);
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();

        let mut effect = ToggleEffect::new(3, handle.pointer("game.exe", 0), ReapplyPolicy::Refresh);
        effect.apply().unwrap();
        effect.apply().unwrap();
        assert_eq!(effect.prior(), Some(0));
        assert!(!effect.enabled());
        assert_eq!(sim.peek(0x1000, 1).unwrap(), vec![1]);
    }
}
