//! Handle table: small integers standing for host values.
//!
//! Slots are either live or free. Free slots form a LIFO list threaded
//! through the table, so the most recently dropped handle is the next one
//! handed out. A free slot stays a tombstone until reused, which is what
//! lets a second drop of the same handle be detected.

use membrane_abi::Handle;
use membrane_host::HostValue;
use tracing::trace;

use crate::error::ContractViolation;

#[derive(Debug)]
enum Slot {
    Live(HostValue),
    Free { next: Option<u32> },
}

#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    live: usize,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl HandleTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(Handle::RESERVED as usize));
        slots.push(Slot::Live(HostValue::Null));
        slots.push(Slot::Live(HostValue::Undefined));
        slots.push(Slot::Live(HostValue::Bool(true)));
        slots.push(Slot::Live(HostValue::Bool(false)));
        Self {
            slots,
            free_head: None,
            live: 0,
        }
    }

    /// Store a value in a fresh slot.
    pub fn add(&mut self, value: HostValue) -> Handle {
        self.live += 1;
        if let Some(index) = self.free_head {
            let slot = std::mem::replace(&mut self.slots[index as usize], Slot::Live(value));
            self.free_head = match slot {
                Slot::Free { next } => next,
                Slot::Live(_) => unreachable!("free list points at a live slot"),
            };
            trace!(handle = index, "reuse handle");
            return Handle(index);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Live(value));
        trace!(handle = index, "add handle");
        Handle(index)
    }

    /// Like [`HandleTable::add`], but `null`, `undefined` and booleans map to
    /// their reserved sentinels.
    pub fn handle_for(&mut self, value: HostValue) -> Handle {
        match value {
            HostValue::Null => Handle::NULL,
            HostValue::Undefined => Handle::UNDEFINED,
            HostValue::Bool(b) => Handle::from_bool(b),
            other => self.add(other),
        }
    }

    /// The value behind a live handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle is out of range or has been dropped.
    pub fn get(&self, handle: Handle) -> &HostValue {
        match self.try_get(handle) {
            Ok(value) => value,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_get(&self, handle: Handle) -> Result<&HostValue, ContractViolation> {
        match self.slots.get(handle.index()) {
            Some(Slot::Live(value)) => Ok(value),
            _ => Err(ContractViolation::StaleHandle(handle)),
        }
    }

    /// Release a handle. Reserved handles are never released.
    pub fn drop_handle(&mut self, handle: Handle) -> Result<(), ContractViolation> {
        if handle.is_reserved() {
            return Ok(());
        }
        match self.slots.get(handle.index()) {
            Some(Slot::Live(_)) => {}
            Some(Slot::Free { .. }) => return Err(ContractViolation::DoubleDrop(handle)),
            None => return Err(ContractViolation::StaleHandle(handle)),
        }
        self.slots[handle.index()] = Slot::Free {
            next: self.free_head,
        };
        self.free_head = Some(handle.0);
        self.live -= 1;
        trace!(%handle, "drop handle");
        Ok(())
    }

    /// Get the value and release the handle.
    pub fn take(&mut self, handle: Handle) -> Result<HostValue, ContractViolation> {
        let value = self.try_get(handle)?.clone();
        self.drop_handle(handle)?;
        Ok(value)
    }

    /// A second reference to the same value: the handle itself.
    pub fn clone_ref(&self, handle: Handle) -> Result<Handle, ContractViolation> {
        self.try_get(handle)?;
        Ok(handle)
    }

    /// Number of live handles, sentinels excluded.
    pub fn live_count(&self) -> usize {
        self.live
    }
}
