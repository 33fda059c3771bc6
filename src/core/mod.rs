//! Core module containing the fundamental types used throughout memfx

pub mod types;

pub use types::{
    Address, ErrorKind, MemoryError, MemoryResult, ProcessArchitecture, ProcessIdentifier,
    ProcessInfo, ProcessModule,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
