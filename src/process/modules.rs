//! Immutable snapshot of a process's loaded modules

use crate::core::types::{Address, MemoryError, MemoryResult, ProcessModule};
use std::collections::BTreeMap;
use tracing::debug;

/// Module name to module mapping, frozen at the time it was built
///
/// Lookups are exact and case sensitive. A table is never mutated; a refresh
/// builds a new one and swaps it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleTable {
    // Sorted by base address
    modules: Vec<ProcessModule>,
    by_name: BTreeMap<String, usize>,
}

impl ModuleTable {
    /// Builds a table from an enumeration result
    ///
    /// When two modules share a name the lowest-addressed one wins. Modules
    /// whose ranges overlap make the enumeration inconsistent and are
    /// rejected.
    pub fn new(mut modules: Vec<ProcessModule>) -> MemoryResult<Self> {
        modules.sort_by_key(|m| m.base);

        for pair in modules.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(MemoryError::InvalidConfiguration(format!(
                    "modules {} ({}) and {} ({}) overlap",
                    pair[0].name, pair[0].base, pair[1].name, pair[1].base
                )));
            }
        }

        let mut by_name = BTreeMap::new();
        for (index, module) in modules.iter().enumerate() {
            if by_name.contains_key(&module.name) {
                debug!(name = %module.name, base = %module.base, "duplicate module name ignored");
                continue;
            }
            by_name.insert(module.name.clone(), index);
        }

        Ok(ModuleTable { modules, by_name })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> MemoryResult<&ProcessModule> {
        self.by_name
            .get(name)
            .map(|&index| &self.modules[index])
            .ok_or_else(|| MemoryError::ModuleNotFound(name.to_string()))
    }

    /// Resolves the first name in `names` that is present
    pub fn resolve_any(&self, names: &[&str]) -> MemoryResult<&ProcessModule> {
        names
            .iter()
            .find_map(|name| self.resolve(name).ok())
            .ok_or_else(|| MemoryError::ModuleNotFound(names.join(" | ")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn module_containing(&self, address: Address) -> Option<&ProcessModule> {
        let index = self.modules.partition_point(|m| m.base <= address);
        index
            .checked_sub(1)
            .map(|i| &self.modules[i])
            .filter(|m| m.contains(address))
    }

    /// Modules in ascending base address order
    pub fn iter(&self) -> impl Iterator<Item = &ProcessModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ModuleTable {
        ModuleTable::new(vec![
            ProcessModule::new("kernel32.dll", 0x7000_0000u64, 0x10_0000),
            ProcessModule::new("dxhr.exe", 0x1000_0000u64, 0x200_0000),
        ])
        .unwrap()
    }

    #[test]
    fn test_exact_match_only() {
        let table = table();
        assert_eq!(
            table.resolve("dxhr.exe").unwrap().base,
            Address::new(0x1000_0000)
        );
        assert!(matches!(
            table.resolve("dxhr"),
            Err(MemoryError::ModuleNotFound(name)) if name == "dxhr"
        ));
        assert!(table.resolve("DXHR.EXE").is_err());
        assert!(table.resolve("dxhr.exe ").is_err());
    }

    #[test]
    fn test_resolve_any() {
        let table = table();
        let module = table.resolve_any(&["dxhr", "dxhr.exe"]).unwrap();
        assert_eq!(module.name, "dxhr.exe");
        assert!(table.resolve_any(&["a", "b"]).is_err());
    }

    #[test]
    fn test_iteration_is_address_ordered() {
        let names: Vec<_> = table().iter().map(|m| m.name.clone()).collect();
        assert_eq!(names, vec!["dxhr.exe", "kernel32.dll"]);
    }

    #[test]
    fn test_module_containing() {
        let table = table();
        assert_eq!(
            table
                .module_containing(Address::new(0x1185_593C))
                .map(|m| m.name.as_str()),
            Some("dxhr.exe")
        );
        assert!(table.module_containing(Address::new(0x0FFF_FFFF)).is_none());
        assert!(table.module_containing(Address::new(0x1200_0000)).is_none());
    }

    #[test]
    fn test_overlap_rejected() {
        let result = ModuleTable::new(vec![
            ProcessModule::new("a", 0x1000u64, 0x1000),
            ProcessModule::new("b", 0x1800u64, 0x1000),
        ]);
        assert!(matches!(result, Err(MemoryError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_duplicate_name_keeps_lowest_base() {
        let table = ModuleTable::new(vec![
            ProcessModule::new("libc.so.6", 0x9000u64, 0x100),
            ProcessModule::new("libc.so.6", 0x1000u64, 0x100),
        ])
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("libc.so.6").unwrap().base, Address::new(0x1000));
    }
}
