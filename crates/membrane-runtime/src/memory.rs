//! Views over the module's linear memory.
//!
//! Memory can grow during any call into the module, and growth may move the
//! backing storage. Views are therefore never cached across calls: every
//! accessor re-derives the slice from the store. The observed base address
//! is recorded, and a change bumps the view generation.

use membrane_abi::layout::WORD;
use tracing::debug;
use wasmi::Memory;

use crate::context::BoundaryCx;
use crate::error::{BoundaryResult, ContractViolation};

#[derive(Debug)]
pub struct LinearMemory {
    memory: Memory,
    base: usize,
    generation: u64,
}

impl LinearMemory {
    pub fn new(memory: Memory, base: usize) -> Self {
        Self {
            memory,
            base,
            generation: 0,
        }
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Number of times the backing storage was seen at a new address.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// The module's memory, revalidated against the current backing storage.
fn current<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<Memory> {
    let memory = cx.boundary().exports()?.memory.memory;
    let base = memory.data(&*cx).as_ptr() as usize;
    let linear = &mut cx.boundary_mut().exports_mut()?.memory;
    if linear.base != base {
        linear.base = base;
        linear.generation += 1;
        debug!(generation = linear.generation, "memory moved");
    }
    Ok(memory)
}

fn range(ptr: u32, len: u32, size: usize) -> Result<std::ops::Range<usize>, ContractViolation> {
    let start = ptr as usize;
    match start.checked_add(len as usize) {
        Some(end) if end <= size => Ok(start..end),
        _ => Err(ContractViolation::OutOfBounds { ptr, len, size }),
    }
}

pub fn byte_view<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<&[u8]> {
    let memory = current(cx)?;
    Ok(memory.data(&*cx))
}

pub fn byte_view_mut<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<&mut [u8]> {
    let memory = current(cx)?;
    Ok(memory.data_mut(&mut *cx))
}

pub fn generation<C: BoundaryCx>(cx: &mut C) -> BoundaryResult<u64> {
    current(cx)?;
    Ok(cx.boundary().exports()?.memory.generation)
}

pub fn read_bytes<C: BoundaryCx>(cx: &mut C, ptr: u32, len: u32) -> BoundaryResult<Vec<u8>> {
    let bytes = byte_view(cx)?;
    let range = range(ptr, len, bytes.len())?;
    Ok(bytes[range].to_vec())
}

pub fn write_bytes<C: BoundaryCx>(cx: &mut C, ptr: u32, data: &[u8]) -> BoundaryResult<()> {
    let bytes = byte_view_mut(cx)?;
    let range = range(ptr, data.len() as u32, bytes.len())?;
    bytes[range].copy_from_slice(data);
    Ok(())
}

pub fn read_u32<C: BoundaryCx>(cx: &mut C, ptr: u32) -> BoundaryResult<u32> {
    let bytes = byte_view(cx)?;
    let range = range(ptr, WORD, bytes.len())?;
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[range]);
    Ok(u32::from_le_bytes(word))
}

pub fn write_u32<C: BoundaryCx>(cx: &mut C, ptr: u32, value: u32) -> BoundaryResult<()> {
    write_bytes(cx, ptr, &value.to_le_bytes())
}

/// `count` consecutive words starting at `ptr`.
pub fn read_words<C: BoundaryCx>(cx: &mut C, ptr: u32, count: u32) -> BoundaryResult<Vec<u32>> {
    let len = count.checked_mul(WORD).unwrap_or(u32::MAX);
    let bytes = read_bytes(cx, ptr, len)?;
    Ok(bytes
        .chunks_exact(WORD as usize)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

pub fn read_f64<C: BoundaryCx>(cx: &mut C, ptr: u32) -> BoundaryResult<f64> {
    let bytes = byte_view(cx)?;
    let range = range(ptr, 8, bytes.len())?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[range]);
    Ok(f64::from_le_bytes(raw))
}

pub fn write_f64<C: BoundaryCx>(cx: &mut C, ptr: u32, value: f64) -> BoundaryResult<()> {
    write_bytes(cx, ptr, &value.to_le_bytes())
}
