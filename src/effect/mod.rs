//! Reversible modifications of a target process
//!
//! An [`Effect`] is a small state machine:
//!
//! ```text
//! Idle --apply--> Applied --revert--> Idle
//!                 Applied --apply---> Applied   (see ReapplyPolicy)
//! ```
//!
//! Effects are produced by an [`EffectFactory`] bound to one process. The
//! factory never touches memory while building; all reads and writes happen
//! in `apply` and `revert`. A failed `apply` or `revert` returns the error and
//! leaves the effect's state and captured prior values untouched, so the same
//! call can simply be retried.

pub mod dxhr;
pub mod patch;
pub mod registry;
pub mod toggle;

pub use patch::PatchEffect;
pub use registry::{EffectDescriptor, EffectRegistry};
pub use toggle::ToggleEffect;

use crate::core::types::MemoryResult;
use crate::process::ProcessHandle;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric identifier of an effect kind
pub type EffectId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectState {
    Idle,
    Applied,
}

impl fmt::Display for EffectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectState::Idle => f.write_str("idle"),
            EffectState::Applied => f.write_str("applied"),
        }
    }
}

/// What `apply` does when the effect is already applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReapplyPolicy {
    /// Nothing; the first captured prior state stays authoritative
    KeepSnapshot,
    /// Re-read the target. If the process overwrote the patched value, the
    /// new value becomes the prior state and the patch is written again.
    Refresh,
}

/// A reversible modification bound to one process
pub trait Effect: Send {
    fn id(&self) -> EffectId;

    /// Captures the prior state and writes the modification
    fn apply(&mut self) -> MemoryResult<()>;

    /// Writes the captured prior state back. A no-op while idle.
    fn revert(&mut self) -> MemoryResult<()>;

    fn state(&self) -> EffectState;

    fn reapply_policy(&self) -> ReapplyPolicy;

    fn is_applied(&self) -> bool {
        self.state() == EffectState::Applied
    }
}

/// Builds effects of one kind and describes how they combine with others
pub trait EffectFactory: Send + Sync {
    /// Never reassigned between releases
    fn effect_id(&self) -> EffectId;

    fn name(&self) -> &str;

    /// Binds a new effect to `process` without reading or writing its memory
    fn build(&self, process: &ProcessHandle) -> MemoryResult<Box<dyn Effect>>;

    /// Cheap probe deciding whether the effect can work on `process`
    fn is_compatible_with(&self, _process: &ProcessHandle) -> bool {
        true
    }

    /// Effects sharing a group are mutually exclusive
    fn conflict_group(&self) -> Option<&str> {
        None
    }

    fn conflicts_with(&self, other: &dyn EffectFactory) -> bool {
        match (self.conflict_group(), other.conflict_group()) {
            (Some(a), Some(b)) => a == b && self.effect_id() != other.effect_id(),
            _ => false,
        }
    }

    /// Whether more than one instance may be active at once
    fn may_stack(&self) -> bool {
        false
    }
}
