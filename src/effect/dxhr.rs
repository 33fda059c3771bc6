//! Effect catalog for Deus Ex: Human Revolution
//!
//! All locations are relative to the game executable. Offsets target the
//! Director's Cut build of `dxhr.exe`.

use super::{Effect, EffectFactory, EffectId, PatchEffect, ReapplyPolicy, ToggleEffect};
use super::registry::EffectRegistry;
use crate::core::types::MemoryResult;
use crate::memory::ProcessMemoryPointer;
use crate::process::ProcessHandle;

/// Executable module names, in lookup order
pub const MODULE_NAMES: &[&str] = &["dxhr.exe", "DXHR.exe"];

pub const BULLETS_EMPTY: EffectId = 0;
pub const BULLETS_FULL: EffectId = 1;
pub const DIFFICULTY_EASY: EffectId = 2;
pub const DIFFICULTY_HARD: EffectId = 3;
pub const DIFFICULTY_MEDIUM: EffectId = 4;
pub const FIELD_OF_VIEW_HIGH: EffectId = 5;
pub const FIELD_OF_VIEW_LOW: EffectId = 6;
pub const MOUSE_X_HIGH: EffectId = 7;
pub const MOUSE_X_INVERT: EffectId = 8;
pub const MOUSE_X_LOW: EffectId = 9;
pub const MOUSE_Y_HIGH: EffectId = 10;
pub const MOUSE_Y_INVERT: EffectId = 11;
pub const MOUSE_Y_LOW: EffectId = 12;
pub const OBJECTIVE_LOCATOR: EffectId = 13;
pub const PRAXIS_HIGH: EffectId = 14;
pub const PRAXIS_LOW: EffectId = 15;
pub const RETICLE: EffectId = 16;

pub const RETICLE_OFFSET: u64 = 0x185593C;
pub const OBJECTIVE_LOCATOR_OFFSET: u64 = 0x1855919;
pub const DIFFICULTY_OFFSET: u64 = 0x1855950;
pub const FIELD_OF_VIEW_OFFSET: u64 = 0x1855954;
pub const MOUSE_X_OFFSET: u64 = 0x709E38;
pub const MOUSE_Y_OFFSET: u64 = 0x709E3C;
pub const PRAXIS_OFFSET: u64 = 0x15DE1A8;
pub const PRAXIS_CHAIN: [i64; 2] = [0x14, 0x140];
pub const BULLETS_OFFSET: u64 = 0x1858238;
pub const BULLETS_LOADED_CHAIN: [i64; 2] = [0x70, 0x14];
pub const BULLETS_INVENTORY_CHAIN: [i64; 2] = [0x70, 0x2E];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Recipe {
    Toggle { offset: u64 },
    Byte { offset: u64, chain: &'static [i64], value: u8 },
    Int { offset: u64, value: i32 },
    Scale { offset: u64, factor: f32 },
    Bullets { loaded: u8, inventory: u8 },
}

/// One entry of the catalog
#[derive(Debug, Clone)]
pub struct DxhrEffect {
    id: EffectId,
    name: &'static str,
    group: Option<&'static str>,
    policy: ReapplyPolicy,
    recipe: Recipe,
}

impl DxhrEffect {
    const fn new(
        id: EffectId,
        name: &'static str,
        group: Option<&'static str>,
        policy: ReapplyPolicy,
        recipe: Recipe,
    ) -> Self {
        DxhrEffect {
            id,
            name,
            group,
            policy,
            recipe,
        }
    }

    pub fn policy(&self) -> ReapplyPolicy {
        self.policy
    }

    fn module_name(process: &ProcessHandle) -> String {
        process
            .modules()
            .resolve_any(MODULE_NAMES)
            .map(|m| m.name.clone())
            .unwrap_or_else(|_| MODULE_NAMES[0].to_string())
    }

    fn bullet_pointers(process: &ProcessHandle) -> (ProcessMemoryPointer, ProcessMemoryPointer) {
        let module = Self::module_name(process);
        let base = process.pointer(module, BULLETS_OFFSET);
        (
            base.clone().deep(BULLETS_LOADED_CHAIN),
            base.deep(BULLETS_INVENTORY_CHAIN),
        )
    }
}

impl EffectFactory for DxhrEffect {
    fn effect_id(&self) -> EffectId {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn build(&self, process: &ProcessHandle) -> MemoryResult<Box<dyn Effect>> {
        let module = Self::module_name(process);
        let effect: Box<dyn Effect> = match self.recipe {
            Recipe::Toggle { offset } => Box::new(ToggleEffect::new(
                self.id,
                process.pointer(module, offset),
                self.policy,
            )),
            Recipe::Byte {
                offset,
                chain,
                value,
            } => Box::new(PatchEffect::set(
                self.id,
                self.policy,
                process.pointer(module, offset).deep(chain.iter().copied()),
                value,
            )),
            Recipe::Int { offset, value } => Box::new(PatchEffect::set(
                self.id,
                self.policy,
                process.pointer(module, offset),
                value,
            )),
            Recipe::Scale { offset, factor } => Box::new(PatchEffect::scale(
                self.id,
                process.pointer(module, offset),
                factor,
            )),
            Recipe::Bullets { loaded, inventory } => {
                let (loaded_ptr, inventory_ptr) = Self::bullet_pointers(process);
                Box::new(
                    PatchEffect::new(self.id, self.policy)
                        .with_slot(loaded_ptr, move |_| loaded)
                        .with_slot(inventory_ptr, move |_| inventory),
                )
            }
        };
        Ok(effect)
    }

    fn is_compatible_with(&self, process: &ProcessHandle) -> bool {
        if process.modules().resolve_any(MODULE_NAMES).is_err() {
            return false;
        }
        match self.recipe {
            // The weapon structure only exists once a weapon is equipped
            Recipe::Bullets { .. } => Self::bullet_pointers(process).0.is_readable(1),
            _ => true,
        }
    }

    fn conflict_group(&self) -> Option<&str> {
        self.group
    }
}

/// Every effect of the catalog, ordered by id
#[rustfmt::skip]
pub fn catalog() -> Vec<DxhrEffect> {
    use ReapplyPolicy::{KeepSnapshot, Refresh};

    let bullets = Some("bullets");
    let difficulty = Some("difficulty");
    let fov = Some("field-of-view");
    let mouse_x = Some("mouse-sensitivity-x");
    let mouse_y = Some("mouse-sensitivity-y");
    let praxis = Some("praxis");

    vec![
        DxhrEffect::new(BULLETS_EMPTY, "Bullets: empty", bullets, KeepSnapshot, Recipe::Bullets { loaded: 1, inventory: 0 }),
        DxhrEffect::new(BULLETS_FULL, "Bullets: full", bullets, KeepSnapshot, Recipe::Bullets { loaded: 127, inventory: 127 }),
        DxhrEffect::new(DIFFICULTY_EASY, "Difficulty: easy", difficulty, KeepSnapshot, Recipe::Byte { offset: DIFFICULTY_OFFSET, chain: &[], value: 0 }),
        DxhrEffect::new(DIFFICULTY_HARD, "Difficulty: hard", difficulty, KeepSnapshot, Recipe::Byte { offset: DIFFICULTY_OFFSET, chain: &[], value: 2 }),
        DxhrEffect::new(DIFFICULTY_MEDIUM, "Difficulty: medium", difficulty, KeepSnapshot, Recipe::Byte { offset: DIFFICULTY_OFFSET, chain: &[], value: 1 }),
        DxhrEffect::new(FIELD_OF_VIEW_HIGH, "Field of view: high", fov, Refresh, Recipe::Int { offset: FIELD_OF_VIEW_OFFSET, value: 179 }),
        DxhrEffect::new(FIELD_OF_VIEW_LOW, "Field of view: low", fov, Refresh, Recipe::Int { offset: FIELD_OF_VIEW_OFFSET, value: 20 }),
        DxhrEffect::new(MOUSE_X_HIGH, "Mouse X sensitivity: high", mouse_x, KeepSnapshot, Recipe::Scale { offset: MOUSE_X_OFFSET, factor: 4.0 }),
        DxhrEffect::new(MOUSE_X_INVERT, "Mouse X: inverted", mouse_x, KeepSnapshot, Recipe::Scale { offset: MOUSE_X_OFFSET, factor: -1.0 }),
        DxhrEffect::new(MOUSE_X_LOW, "Mouse X sensitivity: low", mouse_x, KeepSnapshot, Recipe::Scale { offset: MOUSE_X_OFFSET, factor: 0.25 }),
        DxhrEffect::new(MOUSE_Y_HIGH, "Mouse Y sensitivity: high", mouse_y, KeepSnapshot, Recipe::Scale { offset: MOUSE_Y_OFFSET, factor: 4.0 }),
        DxhrEffect::new(MOUSE_Y_INVERT, "Mouse Y: inverted", mouse_y, KeepSnapshot, Recipe::Scale { offset: MOUSE_Y_OFFSET, factor: -1.0 }),
        DxhrEffect::new(MOUSE_Y_LOW, "Mouse Y sensitivity: low", mouse_y, KeepSnapshot, Recipe::Scale { offset: MOUSE_Y_OFFSET, factor: 0.25 }),
        DxhrEffect::new(OBJECTIVE_LOCATOR, "Objective locator", None, Refresh, Recipe::Toggle { offset: OBJECTIVE_LOCATOR_OFFSET }),
        DxhrEffect::new(PRAXIS_HIGH, "Praxis points: high", praxis, KeepSnapshot, Recipe::Byte { offset: PRAXIS_OFFSET, chain: &PRAXIS_CHAIN, value: 127 }),
        DxhrEffect::new(PRAXIS_LOW, "Praxis points: none", praxis, KeepSnapshot, Recipe::Byte { offset: PRAXIS_OFFSET, chain: &PRAXIS_CHAIN, value: 0 }),
        DxhrEffect::new(RETICLE, "Reticle", None, Refresh, Recipe::Toggle { offset: RETICLE_OFFSET }),
    ]
}

pub fn register(registry: &mut EffectRegistry) -> MemoryResult<()> {
    for effect in catalog() {
        registry.register(effect)?;
    }
    Ok(())
}
