//! Membrane ABI shared between the host boundary and guest modules.
//!
//! # Contract
//!
//! A guest module imports host capabilities from the [`HOST_MODULE`]
//! namespace and exports:
//! - `memory`: linear memory
//! - `alloc(size) → ptr` / `free(ptr, size)`: module-owned allocator
//! - `__indirect_function_table`: funcref table used for closure dispatch
//! - any number of entry points (`render`, `start`, …)
//!
//! Host values never cross the boundary directly. The module sees them as
//! [`Handle`]s, strings travel as `(ptr, len)` pairs of UTF-8 bytes, and
//! host exceptions are reported through an exception slot (see [`layout`]).

pub mod capability;
mod handle;
pub mod layout;

pub use capability::{AbiType, Capability, MemberKind, CATALOG};
pub use handle::Handle;

/// Import namespace for every host capability.
pub const HOST_MODULE: &str = "membrane";

/// Name of the exported linear memory.
pub const EXPORT_MEMORY: &str = "memory";
/// `alloc(size: i32) -> i32`
pub const EXPORT_ALLOC: &str = "alloc";
/// `free(ptr: i32, size: i32)`
pub const EXPORT_FREE: &str = "free";
/// Exported funcref table holding closure invoke shims and destructors.
pub const EXPORT_TABLE: &str = "__indirect_function_table";
