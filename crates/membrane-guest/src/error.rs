//! Guest builder error types.

use thiserror::Error;

/// Errors that can occur while assembling a guest module.
#[derive(Debug, Error)]
pub enum GuestError {
    /// A body called a capability the module never imported.
    #[error("capability not imported: {0}")]
    UnknownImport(String),

    /// Imports must all be declared before the first function.
    #[error("import `{0}` declared after function definitions")]
    ImportAfterFunction(String),

    /// String constants exceeded the static data region.
    #[error("static data overflow: need {needed} bytes, {available} available")]
    DataOverflow { needed: u32, available: u32 },

    /// A table slot referenced a function index that does not exist.
    #[error("unknown function index: {0}")]
    UnknownFunction(u32),

    /// The generated WASM module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),
}

/// Guest builder result type alias.
pub type GuestResult<T> = Result<T, GuestError>;
