//! Guest module builder for the membrane host ABI.
//!
//! Produces self-contained `.wasm` modules that import host capabilities
//! from the [`membrane_abi::CATALOG`] and export the boundary contract:
//!
//! - `memory`: one page initially, growable
//! - `alloc(size) → ptr`: 8-byte aligned bump allocator; grows memory
//! - `free(ptr, size)`: releases nothing but counts freed bytes
//! - `freed_bytes() → i32`: total bytes passed to `free`
//! - `__indirect_function_table`: funcref table for closure dispatch
//!
//! Every module reserves a fixed scratch area at the bottom of memory (see
//! [`layout`]) holding one exception slot and one return area, so generated
//! code can pass constant pointers to throwing capabilities.
//!
//! # Example
//!
//! ```
//! use membrane_abi::capability::{DOCUMENT_GET_ELEMENT_BY_ID, GLOBAL_DOCUMENT, OBJECT_DROP_REF};
//! use membrane_guest::GuestBuilder;
//!
//! let mut guest = GuestBuilder::new();
//! guest.import_all(&[GLOBAL_DOCUMENT, DOCUMENT_GET_ELEMENT_BY_ID, OBJECT_DROP_REF]).unwrap();
//! guest
//!     .function(Some("render"), &[], &[], &[], |f| {
//!         f.call_import(&GLOBAL_DOCUMENT);
//!         f.str("app");
//!         f.call_import(&DOCUMENT_GET_ELEMENT_BY_ID);
//!         f.call_import(&OBJECT_DROP_REF);
//!     })
//!     .unwrap();
//! let wasm = guest.finish().unwrap();
//! assert_eq!(&wasm[0..4], b"\0asm");
//! ```

pub mod builder;
pub mod error;
pub mod layout;

pub use builder::{FuncBody, GuestBuilder};
pub use error::{GuestError, GuestResult};
pub use wasm_encoder::{BlockType, Instruction, ValType};
