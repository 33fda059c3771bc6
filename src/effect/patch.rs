//! Read-modify-write effects over one or more memory slots

use super::{Effect, EffectId, EffectState, ReapplyPolicy};
use crate::core::types::MemoryResult;
use crate::memory::{Primitive, ProcessMemoryPointer};
use std::fmt;
use tracing::{debug, warn};

type Transform<T> = Box<dyn Fn(T) -> T + Send + Sync>;

struct PatchSlot<T> {
    pointer: ProcessMemoryPointer,
    transform: Transform<T>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Captured<T> {
    prior: T,
    applied: T,
}

/// Effect that maps the current value of each slot to a patched value
///
/// Applying is atomic across slots: every prior value is read before the
/// first write, and if a later write fails the slots already written are
/// restored before the error is returned.
pub struct PatchEffect<T: Primitive> {
    id: EffectId,
    policy: ReapplyPolicy,
    slots: Vec<PatchSlot<T>>,
    snapshot: Option<Vec<Captured<T>>>,
    last_observed: Vec<Option<T>>,
}

impl<T: Primitive> PatchEffect<T> {
    /// Effect with no slots yet; add them with [`PatchEffect::with_slot`]
    pub fn new(id: EffectId, policy: ReapplyPolicy) -> Self {
        PatchEffect {
            id,
            policy,
            slots: Vec::new(),
            snapshot: None,
            last_observed: Vec::new(),
        }
    }

    pub fn with_slot(
        mut self,
        pointer: ProcessMemoryPointer,
        transform: impl Fn(T) -> T + Send + Sync + 'static,
    ) -> Self {
        self.slots.push(PatchSlot {
            pointer,
            transform: Box::new(transform),
        });
        self.last_observed.push(None);
        self
    }

    /// Single-slot effect writing a constant
    pub fn set(id: EffectId, policy: ReapplyPolicy, pointer: ProcessMemoryPointer, value: T) -> Self {
        Self::new(id, policy).with_slot(pointer, move |_| value)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn pointer(&self, slot: usize) -> Option<&ProcessMemoryPointer> {
        self.slots.get(slot).map(|s| &s.pointer)
    }

    /// Value captured before the patch was written, while applied
    pub fn prior(&self, slot: usize) -> Option<T> {
        self.snapshot.as_ref()?.get(slot).map(|c| c.prior)
    }

    /// Most recent value read from a slot by `apply`
    pub fn last_observed(&self, slot: usize) -> Option<T> {
        self.last_observed.get(slot).copied().flatten()
    }

    fn read_all(&mut self) -> MemoryResult<Vec<T>> {
        let mut values = Vec::with_capacity(self.slots.len());
        for (slot, observed) in self.slots.iter().zip(self.last_observed.iter_mut()) {
            let value = slot.pointer.read::<T>()?;
            *observed = Some(value);
            values.push(value);
        }
        Ok(values)
    }

    /// Writes the applied value of every slot in `indices`, undoing earlier
    /// writes if one fails
    fn write_slots(&self, indices: &[usize], captured: &[Captured<T>]) -> MemoryResult<()> {
        for (n, &index) in indices.iter().enumerate() {
            if let Err(err) = self.slots[index].pointer.write(captured[index].applied) {
                for &done in indices[..n].iter().rev() {
                    let slot = &self.slots[done];
                    if let Err(rollback) = slot.pointer.write(captured[done].prior) {
                        warn!(effect = self.id, pointer = %slot.pointer, error = %rollback, "rollback failed");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    fn apply_fresh(&mut self) -> MemoryResult<()> {
        let priors = self.read_all()?;
        let captured: Vec<_> = self
            .slots
            .iter()
            .zip(priors)
            .map(|(slot, prior)| Captured {
                prior,
                applied: (slot.transform)(prior),
            })
            .collect();

        let all: Vec<usize> = (0..self.slots.len()).collect();
        self.write_slots(&all, &captured)?;
        debug!(effect = self.id, snapshot = ?captured, "effect applied");
        self.snapshot = Some(captured);
        Ok(())
    }

    fn refresh(&mut self) -> MemoryResult<()> {
        let current = self.read_all()?;
        let Some(snapshot) = self.snapshot.as_ref() else {
            return self.apply_fresh();
        };

        let mut updated = snapshot.clone();
        let mut changed = Vec::new();
        for (index, (slot, now)) in self.slots.iter().zip(current).enumerate() {
            if now != updated[index].applied {
                updated[index] = Captured {
                    prior: now,
                    applied: (slot.transform)(now),
                };
                changed.push(index);
            }
        }
        if changed.is_empty() {
            return Ok(());
        }

        self.write_slots(&changed, &updated)?;
        debug!(effect = self.id, slots = ?changed, "target overwrote patch, re-applied");
        self.snapshot = Some(updated);
        Ok(())
    }
}

impl<T: Primitive> Effect for PatchEffect<T> {
    fn id(&self) -> EffectId {
        self.id
    }

    fn apply(&mut self) -> MemoryResult<()> {
        match (self.snapshot.is_some(), self.policy) {
            (false, _) => self.apply_fresh(),
            (true, ReapplyPolicy::KeepSnapshot) => Ok(()),
            (true, ReapplyPolicy::Refresh) => self.refresh(),
        }
    }

    fn revert(&mut self) -> MemoryResult<()> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(());
        };
        for (slot, captured) in self.slots.iter().zip(snapshot).rev() {
            slot.pointer.write(captured.prior)?;
        }
        debug!(effect = self.id, "effect reverted");
        self.snapshot = None;
        Ok(())
    }

    fn state(&self) -> EffectState {
        if self.snapshot.is_some() {
            EffectState::Applied
        } else {
            EffectState::Idle
        }
    }

    fn reapply_policy(&self) -> ReapplyPolicy {
        self.policy
    }
}

impl<T: Primitive> fmt::Debug for PatchEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchEffect")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field(
                "slots",
                &self.slots.iter().map(|s| s.pointer.to_string()).collect::<Vec<_>>(),
            )
            .field("state", &self.state())
            .finish()
    }
}

impl PatchEffect<f32> {
    /// Single-slot effect multiplying a float by `factor`
    pub fn scale(id: EffectId, pointer: ProcessMemoryPointer, factor: f32) -> Self {
        Self::new(id, ReapplyPolicy::KeepSnapshot).with_slot(pointer, move |v| v * factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessHandle, SimulatedProcess};
    use pretty_assertions::assert_eq;

    const BASE: u64 = 0x40_0000;

    fn attached() -> (SimulatedProcess, ProcessHandle) {
        let sim = SimulatedProcess::new(1, "game.exe");
        sim.map_module("game.exe", BASE, 0x100);
        sim.map_region(0x50_0000, 0x10, false);
        let handle = ProcessHandle::from_backend(sim.backend()).unwrap();
        (sim, handle)
    }

    #[test]
    fn test_set_round_trip() {
        let (sim, handle) = attached();
        sim.poke(BASE + 4, &70i32.to_le_bytes()).unwrap();
        let mut effect = PatchEffect::set(5, ReapplyPolicy::Refresh, handle.pointer("game.exe", 4), 179i32);

        effect.apply().unwrap();
        assert_eq!(effect.state(), EffectState::Applied);
        assert_eq!(effect.prior(0), Some(70));
        assert_eq!(sim.peek(BASE + 4, 4).unwrap(), 179i32.to_le_bytes().to_vec());

        effect.revert().unwrap();
        assert_eq!(effect.state(), EffectState::Idle);
        assert_eq!(sim.peek(BASE + 4, 4).unwrap(), 70i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_keep_snapshot_ignores_reapply() {
        let (sim, handle) = attached();
        sim.poke(BASE, &[3]).unwrap();
        let mut effect = PatchEffect::set(1, ReapplyPolicy::KeepSnapshot, handle.pointer("game.exe", 0), 9u8);
        effect.apply().unwrap();

        sim.poke(BASE, &[4]).unwrap();
        let writes = sim.write_count();
        effect.apply().unwrap();
        assert_eq!(sim.write_count(), writes);
        assert_eq!(effect.prior(0), Some(3));
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![4]);

        effect.revert().unwrap();
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![3]);
    }

    #[test]
    fn test_refresh_recaptures_after_reset() {
        let (sim, handle) = attached();
        sim.poke(BASE, &[3]).unwrap();
        let mut effect = PatchEffect::set(1, ReapplyPolicy::Refresh, handle.pointer("game.exe", 0), 9u8);
        effect.apply().unwrap();

        // Unchanged target: nothing is written
        let writes = sim.write_count();
        effect.apply().unwrap();
        assert_eq!(sim.write_count(), writes);

        // The process reset the value
        sim.poke(BASE, &[5]).unwrap();
        effect.apply().unwrap();
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![9]);
        assert_eq!(effect.prior(0), Some(5));

        effect.revert().unwrap();
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![5]);
    }

    #[test]
    fn test_scale() {
        let (sim, handle) = attached();
        sim.poke(BASE + 8, &2.0f32.to_le_bytes()).unwrap();
        let mut effect = PatchEffect::scale(7, handle.pointer("game.exe", 8), 0.25);
        effect.apply().unwrap();
        effect.apply().unwrap();
        assert_eq!(handle.pointer("game.exe", 8).read_float().unwrap(), 0.5);
        effect.revert().unwrap();
        assert_eq!(handle.pointer("game.exe", 8).read_float().unwrap(), 2.0);
    }

    #[test]
    fn test_multi_slot_apply_is_atomic() {
        let (sim, handle) = attached();
        sim.poke(BASE, &[1]).unwrap();
        sim.poke(0x50_0000, &[2]).unwrap();
        let mut effect = PatchEffect::new(0, ReapplyPolicy::KeepSnapshot)
            .with_slot(handle.pointer("game.exe", 0), |_| 127u8)
            .with_slot(handle.pointer_at(0x50_0000u64.into()), |_| 127u8);

        let err = effect.apply().unwrap_err();
        assert!(err.is_access());
        assert_eq!(effect.state(), EffectState::Idle);
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![1]);
        assert_eq!(sim.peek(0x50_0000, 1).unwrap(), vec![2]);
    }

    #[test]
    fn test_failed_read_leaves_effect_idle() {
        let (sim, handle) = attached();
        let mut effect = PatchEffect::set(1, ReapplyPolicy::KeepSnapshot, handle.pointer("missing.dll", 0), 1u8);
        assert!(effect.apply().is_err());
        assert_eq!(effect.state(), EffectState::Idle);
        assert_eq!(sim.write_count(), 0);
    }

    #[test]
    fn test_failed_revert_keeps_snapshot() {
        let (sim, handle) = attached();
        let mut effect = PatchEffect::set(1, ReapplyPolicy::KeepSnapshot, handle.pointer("game.exe", 0), 1u8);
        effect.apply().unwrap();

        sim.fail_next_write_after(0);
        assert!(effect.revert().is_err());
        assert_eq!(effect.state(), EffectState::Applied);
        assert_eq!(effect.prior(0), Some(0));

        effect.revert().unwrap();
        assert_eq!(sim.peek(BASE, 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_revert_while_idle_is_noop() {
        let (sim, handle) = attached();
        let mut effect = PatchEffect::set(1, ReapplyPolicy::KeepSnapshot, handle.pointer("game.exe", 0), 1u8);
        effect.revert().unwrap();
        assert_eq!(sim.write_count(), 0);
    }
}
