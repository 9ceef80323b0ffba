//! The membrane boundary layer.
//!
//! Connects a WASM module to a [`membrane_host::Realm`]. The module sees
//! host values only as integer handles, exchanges text as `(ptr, len)`
//! slices of its own memory, receives host exceptions through a two-word
//! slot, and hands the host closures built from its function table.
//!
//! # Pieces
//!
//! - [`heap`]: handle table with a free list
//! - [`memory`] / [`codec`]: bounds-checked memory views and UTF-8 strings
//! - [`closure`]: closure records with reference counts and single-fire state
//! - [`exception`]: the exception slot
//! - [`adapter`]: one shim per capability of the catalogue
//! - [`loader`]: compile, link, instantiate; [`BoundModule`] entry calls
//! - [`scheduler`]: microtasks, tasks, timers and animation frames
//!
//! # Example
//!
//! ```no_run
//! use membrane_runtime::{BoundaryConfig, Loader};
//!
//! let bytes = std::fs::read("app.wasm").unwrap();
//! let loader = Loader::new(BoundaryConfig::default());
//! let mut module = loader.load(bytes).unwrap();
//! module.call("render").unwrap();
//! module.run_until_idle().unwrap();
//! let body = module.realm().body();
//! println!("{}", module.realm().outer_html(body));
//! ```

pub mod adapter;
pub mod closure;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod exception;
pub mod heap;
pub mod invoke;
pub mod loader;
pub mod memory;
pub mod scheduler;

pub use closure::{ClosureState, ClosureTable, ClosureVariant};
pub use codec::WasmSlice;
pub use config::BoundaryConfig;
pub use context::{Boundary, BoundaryCx};
pub use error::{BoundaryError, BoundaryResult, ContractViolation, LoadError};
pub use exception::{ExceptionSlot, SlotState};
pub use heap::HandleTable;
pub use loader::{BoundModule, Loader, ModuleSource};
