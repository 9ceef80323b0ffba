//! The exception slot: how host exceptions reach module control flow.
//!
//! A throwing shim takes a pointer to two words as its last argument and
//! writes them on every call: `{0, 0}` on success, `{1, handle}` when the
//! host operation threw. Nothing unwinds across the boundary.

use membrane_abi::layout::{EXCEPTION_FLAG_OFFSET, EXCEPTION_VALUE_OFFSET, WORD};
use membrane_abi::Handle;
use tracing::debug;

use crate::context::BoundaryCx;
use crate::error::BoundaryResult;
use crate::memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Clear,
    /// An exception is pending; the handle owns the thrown value.
    Pending(Handle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionSlot {
    ptr: u32,
}

impl ExceptionSlot {
    pub fn at(ptr: i32) -> Self {
        Self { ptr: ptr as u32 }
    }

    pub fn read<C: BoundaryCx>(&self, cx: &mut C) -> BoundaryResult<SlotState> {
        let words = memory::read_words(cx, self.ptr, 2)?;
        let flag = words[(EXCEPTION_FLAG_OFFSET / WORD) as usize];
        let handle = words[(EXCEPTION_VALUE_OFFSET / WORD) as usize];
        Ok(match flag {
            0 => SlotState::Clear,
            _ => SlotState::Pending(Handle(handle)),
        })
    }

    pub fn clear<C: BoundaryCx>(&self, cx: &mut C) -> BoundaryResult<()> {
        self.write(cx, 0, Handle::NULL)
    }

    pub fn raise<C: BoundaryCx>(&self, cx: &mut C, handle: Handle) -> BoundaryResult<()> {
        debug!(slot = self.ptr, %handle, "raise exception");
        self.write(cx, 1, handle)
    }

    fn write<C: BoundaryCx>(&self, cx: &mut C, flag: u32, handle: Handle) -> BoundaryResult<()> {
        let mut words = [0u8; 8];
        words[..4].copy_from_slice(&flag.to_le_bytes());
        words[4..].copy_from_slice(&handle.0.to_le_bytes());
        memory::write_bytes(cx, self.ptr, &words)
    }
}
