//! Typed access to target process memory

pub mod pointer;
pub mod primitive;

pub use pointer::{PointerSpec, PointerTarget, ProcessMemoryPointer};
pub use primitive::Primitive;
