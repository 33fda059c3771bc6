//! Orchestration of effects over one attached process

use crate::core::types::{MemoryError, MemoryResult, ProcessIdentifier};
use crate::effect::{Effect, EffectFactory, EffectId, EffectRegistry};
use crate::process::{HandleOptions, ModuleTable, ProcessHandle};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of [`Session::enable`] when nothing went critically wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnableOutcome {
    Enabled,
    AlreadyActive,
    /// The factory's probe rejected the process
    Incompatible,
    /// An active effect of the same conflict group
    Conflict(EffectId),
    /// Apply failed for a non-critical effect; nothing was changed
    Failed(MemoryError),
}

impl EnableOutcome {
    pub fn is_enabled(&self) -> bool {
        matches!(self, EnableOutcome::Enabled)
    }
}

/// What happened to each active effect on detach
#[derive(Debug, Default)]
pub struct DetachReport {
    pub reverted: Vec<EffectId>,
    pub failed: Vec<(EffectId, MemoryError)>,
}

impl DetachReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct ActiveEffect {
    factory: Arc<dyn EffectFactory>,
    effect: Box<dyn Effect>,
}

/// Owns an attached process and the effects applied to it
///
/// Active effects are kept in enable order and reverted in reverse order.
/// Dropping a session reverts whatever is still active.
pub struct Session {
    process: ProcessHandle,
    registry: EffectRegistry,
    critical: HashSet<EffectId>,
    active: Vec<ActiveEffect>,
}

impl Session {
    pub fn new(process: ProcessHandle, registry: EffectRegistry) -> Self {
        Session {
            process,
            registry,
            critical: HashSet::new(),
            active: Vec::new(),
        }
    }

    pub fn attach(
        identifier: impl Into<ProcessIdentifier>,
        registry: EffectRegistry,
        options: HandleOptions,
    ) -> MemoryResult<Self> {
        let process = ProcessHandle::attach_with(identifier, options)?;
        Ok(Self::new(process, registry))
    }

    /// Effects whose failure to apply is reported as an error
    pub fn with_critical(mut self, ids: impl IntoIterator<Item = EffectId>) -> Self {
        self.critical.extend(ids);
        self
    }

    pub fn process(&self) -> &ProcessHandle {
        &self.process
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn refresh_modules(&self) -> MemoryResult<Arc<ModuleTable>> {
        self.process.refresh_modules()
    }

    fn factory(&self, id: EffectId) -> MemoryResult<Arc<dyn EffectFactory>> {
        self.registry
            .get(id)
            .ok_or_else(|| MemoryError::InvalidConfiguration(format!("unknown effect id {}", id)))
    }

    /// Builds a detached effect instance; the session does not track it
    pub fn build_effect(&self, id: EffectId) -> MemoryResult<Box<dyn Effect>> {
        self.factory(id)?.build(&self.process)
    }

    pub fn is_active(&self, id: EffectId) -> bool {
        self.active.iter().any(|a| a.factory.effect_id() == id)
    }

    /// Ids of active effects in enable order
    pub fn active_ids(&self) -> Vec<EffectId> {
        self.active.iter().map(|a| a.factory.effect_id()).collect()
    }

    /// Builds and applies an effect
    ///
    /// Unknown ids are always an error. Apply failures are an error only for
    /// critical effects; otherwise they are logged and returned as
    /// [`EnableOutcome::Failed`].
    pub fn enable(&mut self, id: EffectId) -> MemoryResult<EnableOutcome> {
        let factory = self.factory(id)?;
        let name = factory.name().to_string();

        if !factory.may_stack() && self.is_active(id) {
            return Ok(EnableOutcome::AlreadyActive);
        }
        if !factory.is_compatible_with(&self.process) {
            warn!(effect = id, %name, "effect is not compatible with the process, skipped");
            return Ok(EnableOutcome::Incompatible);
        }
        if let Some(other) = self
            .active
            .iter()
            .find(|a| factory.conflicts_with(a.factory.as_ref()))
        {
            let other_id = other.factory.effect_id();
            warn!(effect = id, %name, conflicts_with = other_id, "conflicting effect is active, skipped");
            return Ok(EnableOutcome::Conflict(other_id));
        }

        let result = factory.build(&self.process).and_then(|mut effect| {
            effect.apply()?;
            Ok(effect)
        });

        match result {
            Ok(effect) => {
                info!(effect = id, %name, "effect enabled");
                self.active.push(ActiveEffect { factory, effect });
                Ok(EnableOutcome::Enabled)
            }
            Err(err) if self.critical.contains(&id) => Err(err),
            Err(err) => {
                warn!(effect = id, %name, error = %err, "effect failed to apply, skipped");
                Ok(EnableOutcome::Failed(err))
            }
        }
    }

    /// Reverts and forgets the most recently enabled instance of `id`
    ///
    /// Returns `false` if it was not active. On failure the effect stays
    /// active so the call can be retried.
    pub fn disable(&mut self, id: EffectId) -> MemoryResult<bool> {
        let Some(index) = self
            .active
            .iter()
            .rposition(|a| a.factory.effect_id() == id)
        else {
            return Ok(false);
        };

        self.active[index].effect.revert()?;
        let removed = self.active.remove(index);
        info!(effect = id, name = %removed.factory.name(), "effect disabled");
        Ok(true)
    }

    /// Re-applies every active effect according to its reapply policy
    pub fn tick(&mut self) -> Vec<(EffectId, MemoryError)> {
        let mut failures = Vec::new();
        for active in &mut self.active {
            if let Err(err) = active.effect.apply() {
                let id = active.factory.effect_id();
                warn!(effect = id, error = %err, "re-apply failed");
                failures.push((id, err));
            }
        }
        failures
    }

    fn revert_all(&mut self) -> DetachReport {
        let mut report = DetachReport::default();
        while let Some(mut active) = self.active.pop() {
            let id = active.factory.effect_id();
            match active.effect.revert() {
                Ok(()) => report.reverted.push(id),
                Err(err) => {
                    warn!(effect = id, error = %err, "revert failed during detach");
                    report.failed.push((id, err));
                }
            }
        }
        report
    }

    /// Reverts every active effect, newest first, then releases the process
    pub fn detach(mut self) -> DetachReport {
        let report = self.revert_all();
        self.process.release();
        info!(
            pid = self.process.pid(),
            reverted = report.reverted.len(),
            failed = report.failed.len(),
            "session detached"
        );
        report
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.active.is_empty() {
            let report = self.revert_all();
            if !report.is_clean() {
                warn!(failed = report.failed.len(), "effects left applied on drop");
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("process", &self.process)
            .field("active", &self.active_ids())
            .field("critical", &self.critical)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::dxhr;
    use crate::process::SimulatedProcess;

    const BASE: u64 = 0x1000_0000;

    fn session() -> (SimulatedProcess, Session) {
        let sim = SimulatedProcess::new(10, "dxhr.exe");
        sim.map_module("dxhr.exe", BASE, 0x200_0000);
        let process = ProcessHandle::from_backend(sim.backend()).unwrap();
        (sim, Session::new(process, EffectRegistry::dxhr().unwrap()))
    }

    #[test]
    fn test_enable_disable() {
        let (sim, mut session) = session();
        assert_eq!(session.enable(dxhr::RETICLE).unwrap(), EnableOutcome::Enabled);
        assert_eq!(session.active_ids(), vec![dxhr::RETICLE]);
        assert_eq!(sim.peek(BASE + dxhr::RETICLE_OFFSET, 1).unwrap(), vec![1]);

        assert!(session.disable(dxhr::RETICLE).unwrap());
        assert!(!session.disable(dxhr::RETICLE).unwrap());
        assert_eq!(sim.peek(BASE + dxhr::RETICLE_OFFSET, 1).unwrap(), vec![0]);
    }

    #[test]
    fn test_unknown_id() {
        let (_sim, mut session) = session();
        assert!(matches!(
            session.enable(999),
            Err(MemoryError::InvalidConfiguration(_))
        ));
        assert!(session.build_effect(999).is_err());
    }

    #[test]
    fn test_stacking_and_conflicts() {
        let (_sim, mut session) = session();
        assert!(session.enable(dxhr::DIFFICULTY_EASY).unwrap().is_enabled());
        assert_eq!(
            session.enable(dxhr::DIFFICULTY_EASY).unwrap(),
            EnableOutcome::AlreadyActive
        );
        assert_eq!(
            session.enable(dxhr::DIFFICULTY_HARD).unwrap(),
            EnableOutcome::Conflict(dxhr::DIFFICULTY_EASY)
        );
    }

    #[test]
    fn test_incompatible_effect_is_skipped() {
        let (_sim, mut session) = session();
        assert_eq!(
            session.enable(dxhr::BULLETS_FULL).unwrap(),
            EnableOutcome::Incompatible
        );
        assert!(session.active_ids().is_empty());
    }
}
