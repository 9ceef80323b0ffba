//! UTF-8 strings across the boundary.
//!
//! Module text arrives as a `(ptr, len)` byte range and is decoded strictly.
//! Host text is copied into memory the module allocates with its own
//! `alloc` export; the module owns those bytes unless the host hands them
//! back with [`release`].

use tracing::trace;

use crate::context::BoundaryCx;
use crate::error::{BoundaryError, BoundaryResult, ContractViolation};
use crate::invoke;
use crate::memory;

/// A byte range in module memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WasmSlice {
    pub ptr: u32,
    pub len: u32,
}

impl WasmSlice {
    pub fn from_abi(ptr: i32, len: i32) -> Self {
        Self {
            ptr: ptr as u32,
            len: len as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Read module text.
pub fn decode<C: BoundaryCx>(cx: &mut C, slice: WasmSlice) -> BoundaryResult<String> {
    if slice.is_empty() {
        return Ok(String::new());
    }
    let bytes = memory::read_bytes(cx, slice.ptr, slice.len)?;
    String::from_utf8(bytes).map_err(|e| BoundaryError::Encoding(e.to_string()))
}

/// Copy host text into freshly allocated module memory.
pub fn encode<C: BoundaryCx>(cx: &mut C, text: &str) -> BoundaryResult<WasmSlice> {
    if text.is_empty() {
        return Ok(WasmSlice::default());
    }
    let len = text.len() as u32;
    let alloc = cx.boundary().exports()?.alloc;
    let alloc = alloc
        .typed::<i32, i32>(&*cx)
        .map_err(|_| ContractViolation::AllocationFailed { size: len })?;
    let ptr = match alloc.call(&mut *cx, len as i32) {
        Ok(ptr) if ptr > 0 => ptr as u32,
        Ok(_) => return Err(ContractViolation::AllocationFailed { size: len }.into()),
        Err(error) => return Err(invoke::into_boundary_error(cx, error)),
    };
    memory::write_bytes(cx, ptr, text.as_bytes())?;
    trace!(ptr, len, "encode string");
    Ok(WasmSlice { ptr, len })
}

/// Give a byte range back to the module's `free`.
pub fn release<C: BoundaryCx>(cx: &mut C, slice: WasmSlice) -> BoundaryResult<()> {
    if slice.is_empty() {
        return Ok(());
    }
    let free = cx.boundary().exports()?.free;
    let free = free
        .typed::<(i32, i32), ()>(&*cx)
        .map_err(|e| BoundaryError::Trap(e.to_string()))?;
    free.call(&mut *cx, (slice.ptr as i32, slice.len as i32))
        .map_err(|error| invoke::into_boundary_error(cx, error))
}
