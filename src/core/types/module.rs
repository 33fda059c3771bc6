//! Loaded module descriptor

use super::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A module (executable or shared library) mapped into the target process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessModule {
    pub name: String,
    pub base: Address,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl ProcessModule {
    pub fn new(name: impl Into<String>, base: impl Into<Address>, size: u64) -> Self {
        ProcessModule {
            name: name.into(),
            base: base.into(),
            size,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// First address past the module, saturating at the top of the address space
    pub fn end(&self) -> Address {
        Address::new(self.base.as_u64().saturating_add(self.size))
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn overlaps(&self, other: &ProcessModule) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}
