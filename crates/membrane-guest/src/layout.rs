//! Fixed memory layout of generated guest modules.
//!
//! ```text
//! 0      .. 16     : unused (keeps 0 an invalid pointer)
//! 16     .. 24     : exception slot
//! 32     .. 48     : return area (string ptr/len or f64)
//! 64     .. 256    : scratch words for test fixtures
//! 256    .. 8192   : interned string constants
//! 8192   ..        : bump-allocated heap
//! ```

/// Address of the module's exception slot pair.
pub const EXN_SLOT: u32 = 16;
/// Address of the module's return area.
pub const RET_AREA: u32 = 32;
/// First scratch word; `scratch(n)` addresses are `SCRATCH + 4 * n`.
pub const SCRATCH: u32 = 64;
/// Number of scratch words.
pub const SCRATCH_WORDS: u32 = 48;
/// Start of the interned string region.
pub const DATA_START: u32 = 256;
/// First byte handed out by `alloc`.
pub const HEAP_START: u32 = 8192;

/// Address of scratch word `n`.
pub const fn scratch(n: u32) -> u32 {
    SCRATCH + 4 * n
}

// ── Global variable indices ──────────────────────────────────────────────────

/// Bump pointer: next free heap byte.
pub const GLOBAL_HEAP_PTR: u32 = 0;
/// Total bytes released through `free`.
pub const GLOBAL_FREED: u32 = 1;

// ── Built-in function offsets (relative to the import count) ─────────────────

/// `alloc(size: i32) -> i32`
pub const BUILTIN_ALLOC: u32 = 0;
/// `free(ptr: i32, size: i32)`
pub const BUILTIN_FREE: u32 = 1;
/// `freed_bytes() -> i32`
pub const BUILTIN_FREED_BYTES: u32 = 2;
/// Number of built-in functions emitted ahead of user functions.
pub const BUILTIN_COUNT: u32 = 3;
