//! Process identification types

use super::ProcessId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a caller names the process to attach to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessIdentifier {
    Pid(ProcessId),
    /// Exact executable name, e.g. `dxhr.exe`
    Name(String),
}

impl FromStr for ProcessIdentifier {
    type Err = std::convert::Infallible;

    /// All-digit input is a pid, anything else an executable name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.parse::<ProcessId>() {
            Ok(pid) => Ok(ProcessIdentifier::Pid(pid)),
            Err(_) => Ok(ProcessIdentifier::Name(s.to_string())),
        }
    }
}

impl From<ProcessId> for ProcessIdentifier {
    fn from(pid: ProcessId) -> Self {
        ProcessIdentifier::Pid(pid)
    }
}

impl From<&str> for ProcessIdentifier {
    fn from(name: &str) -> Self {
        ProcessIdentifier::Name(name.to_string())
    }
}

impl fmt::Display for ProcessIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessIdentifier::Pid(pid) => write!(f, "pid {}", pid),
            ProcessIdentifier::Name(name) => f.write_str(name),
        }
    }
}

/// Basic facts about an attached process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: ProcessId,
    pub name: String,
    pub architecture: ProcessArchitecture,
}

impl ProcessInfo {
    pub fn new(pid: ProcessId, name: impl Into<String>, architecture: ProcessArchitecture) -> Self {
        ProcessInfo {
            pid,
            name: name.into(),
            architecture,
        }
    }
}

/// Process architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessArchitecture {
    X86,
    X64,
    ARM,
    ARM64,
    Unknown,
}

impl ProcessArchitecture {
    /// Width in bytes of a pointer stored in the target's memory
    pub fn pointer_size(&self) -> usize {
        match self {
            ProcessArchitecture::X86 | ProcessArchitecture::ARM => 4,
            ProcessArchitecture::X64 | ProcessArchitecture::ARM64 => 8,
            ProcessArchitecture::Unknown => std::mem::size_of::<usize>(),
        }
    }

    pub fn is_64bit(&self) -> bool {
        matches!(self, ProcessArchitecture::X64 | ProcessArchitecture::ARM64)
    }

    /// Architecture the current binary was compiled for
    pub fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            ProcessArchitecture::X64
        } else if cfg!(target_arch = "x86") {
            ProcessArchitecture::X86
        } else if cfg!(target_arch = "aarch64") {
            ProcessArchitecture::ARM64
        } else if cfg!(target_arch = "arm") {
            ProcessArchitecture::ARM
        } else {
            ProcessArchitecture::Unknown
        }
    }
}
