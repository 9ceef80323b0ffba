//! Memory layout of the out-of-band areas shared by host and module.
//!
//! ```text
//! exception slot (8 bytes, caller supplied)
//!   +0 : i32 : flag (0 = no exception, 1 = exception pending)
//!   +4 : i32 : handle of the thrown value (valid only when flag = 1)
//!
//! string return area (8 bytes, caller supplied)
//!   +0 : i32 : pointer to module-owned UTF-8 bytes
//!   +4 : i32 : byte length
//!
//! number return area (8 bytes, caller supplied)
//!   +0 : f64 : little-endian
//! ```
//!
//! All words are little-endian, matching wasm memory.

/// Size of a memory word.
pub const WORD: u32 = 4;

/// Size of an exception slot pair in bytes.
pub const EXCEPTION_SLOT_SIZE: u32 = 8;
/// Offset of the flag word inside an exception slot.
pub const EXCEPTION_FLAG_OFFSET: u32 = 0;
/// Offset of the thrown-value handle inside an exception slot.
pub const EXCEPTION_VALUE_OFFSET: u32 = 4;

/// Size of a string return area (`ptr`, `len`).
pub const STRING_RET_SIZE: u32 = 8;
/// Size of a number return area (one `f64`).
pub const NUMBER_RET_SIZE: u32 = 8;

/// wasm page size.
pub const PAGE_SIZE: u32 = 65_536;
