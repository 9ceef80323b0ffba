//! Boundary error types.

use membrane_abi::Handle;
use membrane_host::ClosureKey;
use thiserror::Error;

/// Failure to compile, link or instantiate a module.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The bytes are not a valid WASM module.
    #[error("compile failed: {0}")]
    Compile(String),

    /// A shim could not be registered or a module import has no definition.
    #[error("link failed: {0}")]
    Link(String),

    /// The start function trapped or the store rejected the instance.
    #[error("instantiation failed: {0}")]
    Instantiate(String),

    /// A required export (`memory`, `alloc`, `free`) is missing.
    #[error("missing export: {0}")]
    MissingExport(String),

    /// A required export has the wrong signature.
    #[error("export `{0}` has the wrong signature")]
    ExportSignature(String),

    /// A precompiled module belongs to a different engine.
    #[error("module was compiled by a different engine")]
    EngineMismatch,

    #[error("failed to read module: {0}")]
    Io(#[from] std::io::Error),
}

/// Misuse of the boundary contract by module code.
///
/// Contract violations are never reported to the module: the shim that
/// detects one traps, and the outermost entry call returns it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("stale handle {0}")]
    StaleHandle(Handle),

    #[error("handle {0} dropped twice")]
    DoubleDrop(Handle),

    /// A single-fire closure was invoked a second time.
    #[error("closure {0:?} already consumed")]
    ClosureConsumed(ClosureKey),

    /// A persistent closure was invoked while already running.
    #[error("closure {0:?} re-entered while running")]
    ClosureReentered(ClosureKey),

    /// A running closure was released past the reference its call holds.
    #[error("closure {0:?} released more times than it was retained")]
    ClosureOverReleased(ClosureKey),

    #[error("closure {0:?} used after destruction")]
    ClosureDestroyed(ClosureKey),

    #[error("handle {0} is not a closure")]
    NotAClosure(Handle),

    #[error("memory access out of bounds: {len} bytes at {ptr} (memory size {size})")]
    OutOfBounds { ptr: u32, len: u32, size: usize },

    #[error("no function at table index {0}")]
    UnknownTableEntry(u32),

    #[error("table entry {index} has the wrong signature")]
    SignatureMismatch { index: u32 },

    #[error("module failed to allocate {size} bytes")]
    AllocationFailed { size: u32 },
}

/// Error returned from a call into module code.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    /// Module text is not valid UTF-8.
    #[error("invalid UTF-8 from module: {0}")]
    Encoding(String),

    /// A host exception was raised by a shim that has no exception slot.
    #[error("uncaught exception: {message}")]
    UncaughtException { message: String },

    /// The module called `throw`/`rethrow` and nothing caught it.
    #[error("module threw: {message}")]
    ModuleThrew { message: String },

    #[error("module trapped: {0}")]
    Trap(String),

    #[error("module ran out of fuel")]
    OutOfFuel,

    /// The module's exports have not been captured yet.
    #[error("module is not loaded")]
    NotLoaded,

    #[error("no entry point named `{0}` with the expected signature")]
    MissingEntry(String),
}

/// Result alias for boundary operations.
pub type BoundaryResult<T> = Result<T, BoundaryError>;
