//! Effect factories keyed by their stable id

use super::{EffectFactory, EffectId};
use crate::core::types::{MemoryError, MemoryResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Serializable summary of a registered effect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectDescriptor {
    pub id: EffectId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict_group: Option<String>,
    pub may_stack: bool,
}

#[derive(Clone, Default)]
pub struct EffectRegistry {
    factories: BTreeMap<EffectId, Arc<dyn EffectFactory>>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the Deus Ex: Human Revolution catalog
    pub fn dxhr() -> MemoryResult<Self> {
        let mut registry = Self::new();
        super::dxhr::register(&mut registry)?;
        Ok(registry)
    }

    /// Adds a factory; ids must be unique
    pub fn register(&mut self, factory: impl EffectFactory + 'static) -> MemoryResult<()> {
        self.register_shared(Arc::new(factory))
    }

    pub fn register_shared(&mut self, factory: Arc<dyn EffectFactory>) -> MemoryResult<()> {
        let id = factory.effect_id();
        if let Some(existing) = self.factories.get(&id) {
            return Err(MemoryError::InvalidConfiguration(format!(
                "effect id {} is already registered to {}",
                id,
                existing.name()
            )));
        }
        self.factories.insert(id, factory);
        Ok(())
    }

    pub fn get(&self, id: EffectId) -> Option<Arc<dyn EffectFactory>> {
        self.factories.get(&id).cloned()
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.factories.contains_key(&id)
    }

    /// Factories in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn EffectFactory>> {
        self.factories.values()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn describe(&self) -> Vec<EffectDescriptor> {
        self.iter()
            .map(|factory| EffectDescriptor {
                id: factory.effect_id(),
                name: factory.name().to_string(),
                conflict_group: factory.conflict_group().map(str::to_string),
                may_stack: factory.may_stack(),
            })
            .collect()
    }
}

impl std::fmt::Debug for EffectRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.factories.iter().map(|(id, factory)| (id, factory.name())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{Effect, ReapplyPolicy, ToggleEffect};
    use crate::process::ProcessHandle;

    struct Flag(EffectId);

    impl EffectFactory for Flag {
        fn effect_id(&self) -> EffectId {
            self.0
        }

        fn name(&self) -> &str {
            "flag"
        }

        fn build(&self, process: &ProcessHandle) -> MemoryResult<Box<dyn Effect>> {
            Ok(Box::new(ToggleEffect::new(
                self.0,
                process.pointer("game.exe", 0),
                ReapplyPolicy::Refresh,
            )))
        }
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = EffectRegistry::new();
        registry.register(Flag(1)).unwrap();
        registry.register(Flag(2)).unwrap();
        assert!(matches!(
            registry.register(Flag(1)),
            Err(MemoryError::InvalidConfiguration(_))
        ));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_and_describe() {
        let mut registry = EffectRegistry::new();
        registry.register(Flag(9)).unwrap();
        registry.register(Flag(4)).unwrap();
        assert!(registry.contains(9));
        assert_eq!(registry.get(4).map(|f| f.effect_id()), Some(4));
        assert!(registry.get(5).is_none());

        let ids: Vec<_> = registry.describe().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![4, 9]);
    }

    #[test]
    fn test_dxhr_catalog_registers() {
        let registry = EffectRegistry::dxhr().unwrap();
        assert_eq!(registry.len(), 17);
        assert!((0..=16).all(|id| registry.contains(id)));
    }
}
