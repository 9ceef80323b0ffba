//! Closure bridge records.
//!
//! A module closure is a function-table index (the invoke shim) plus a
//! captured environment pair `(a, b)`. The host sees it as a function
//! object of kind [`FunctionKind::Closure`](membrane_host::FunctionKind)
//! whose key indexes this table. Records are reference counted: the module
//! holds the first reference, and the host takes one more for every place
//! it stores the callback. A destroyed record frees its slot for reuse; the
//! slot's generation is bumped so old keys keep failing.

use membrane_host::ClosureKey;
use tracing::debug;

use crate::error::ContractViolation;

/// How many times a closure may be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureVariant {
    Persistent,
    /// The first invocation moves the environment out.
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureState {
    Idle,
    Running,
    Consumed,
    Destroyed,
}

/// Destructor call owed to the module: `dtor(a, b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destructor {
    pub dtor: u32,
    pub a: i32,
    pub b: i32,
}

/// What an invocation needs: `invoke(a, b, arg)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureCall {
    pub invoke: u32,
    pub a: i32,
    pub b: i32,
}

/// Outcome of releasing a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    Retained,
    /// The record was destroyed. The destructor is absent when a single-fire
    /// closure already gave its environment to its invocation.
    Destroyed(Option<Destructor>),
}

#[derive(Debug)]
struct ClosureRecord {
    invoke: u32,
    dtor: u32,
    env: Option<(i32, i32)>,
    refs: u32,
    variant: ClosureVariant,
    state: ClosureState,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    record: Option<ClosureRecord>,
}

/// Every live closure created by the module.
#[derive(Debug, Default)]
pub struct ClosureTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ClosureTable {
    pub fn create(&mut self, invoke: u32, a: i32, b: i32, dtor: u32, variant: ClosureVariant) -> ClosureKey {
        let record = ClosureRecord {
            invoke,
            dtor,
            env: Some((a, b)),
            refs: 1,
            variant,
            state: ClosureState::Idle,
        };
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.record = Some(record);
                ClosureKey::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: Some(record),
                });
                ClosureKey::new((self.slots.len() - 1) as u32, 0)
            }
        };
        self.live += 1;
        debug!(?key, invoke, dtor, ?variant, "create closure");
        key
    }

    fn record(&mut self, key: ClosureKey) -> Result<&mut ClosureRecord, ContractViolation> {
        match self.slots.get_mut(key.index as usize) {
            Some(Slot {
                generation,
                record: Some(record),
            }) if *generation == key.generation => Ok(record),
            _ => Err(ContractViolation::ClosureDestroyed(key)),
        }
    }

    fn live_record(&self, key: ClosureKey) -> Option<&ClosureRecord> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.record.as_ref()
    }

    /// Free the slot of a live record and invalidate its key.
    fn destroy(&mut self, key: ClosureKey) {
        if let Some(slot) = self.slots.get_mut(key.index as usize) {
            slot.record = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(key.index);
            self.live -= 1;
            debug!(?key, "destroy closure");
        }
    }

    /// State of the closure behind `key`. A key whose record is gone reports
    /// `Destroyed`; a key this table never issued reports nothing.
    pub fn state(&self, key: ClosureKey) -> Option<ClosureState> {
        if key.index as usize >= self.slots.len() {
            return None;
        }
        Some(
            self.live_record(key)
                .map_or(ClosureState::Destroyed, |r| r.state),
        )
    }

    pub fn ref_count(&self, key: ClosureKey) -> Option<u32> {
        self.live_record(key).map(|r| r.refs)
    }

    pub fn retain(&mut self, key: ClosureKey) -> Result<(), ContractViolation> {
        let record = self.record(key)?;
        record.refs += 1;
        debug!(?key, refs = record.refs, "retain closure");
        Ok(())
    }

    /// Drop one reference. The destructor is handed back exactly once, when
    /// the count reaches zero.
    ///
    /// A running persistent closure holds one reference for the call itself;
    /// releasing that one too is an over-release.
    pub fn release(&mut self, key: ClosureKey) -> Result<Release, ContractViolation> {
        let record = self.record(key)?;
        if record.state == ClosureState::Running && record.refs <= 1 {
            return Err(ContractViolation::ClosureOverReleased(key));
        }
        record.refs -= 1;
        debug!(?key, refs = record.refs, "release closure");
        if record.refs > 0 {
            return Ok(Release::Retained);
        }
        let destructor = match record.state {
            ClosureState::Idle => record.env.map(|(a, b)| Destructor {
                dtor: record.dtor,
                a,
                b,
            }),
            _ => None,
        };
        self.destroy(key);
        Ok(Release::Destroyed(destructor))
    }

    /// Start an invocation.
    ///
    /// A persistent closure holds an extra reference while it runs, so
    /// releasing it from inside its own call cannot destroy it mid-call.
    pub fn begin_call(&mut self, key: ClosureKey) -> Result<ClosureCall, ContractViolation> {
        let record = self.record(key)?;
        match (record.state, record.variant) {
            (ClosureState::Consumed, _) => Err(ContractViolation::ClosureConsumed(key)),
            (ClosureState::Running, _) => Err(ContractViolation::ClosureReentered(key)),
            (_, variant) => {
                let (a, b) = record.env.take().unwrap_or_default();
                match variant {
                    ClosureVariant::Persistent => {
                        record.refs += 1;
                        record.state = ClosureState::Running;
                    }
                    ClosureVariant::Once => record.state = ClosureState::Consumed,
                }
                Ok(ClosureCall {
                    invoke: record.invoke,
                    a,
                    b,
                })
            }
        }
    }

    /// Finish an invocation started by [`ClosureTable::begin_call`]. Returns
    /// the destructor if the call held the last reference.
    pub fn end_call(&mut self, key: ClosureKey, call: &ClosureCall) -> Option<Destructor> {
        let record = self.record(key).ok()?;
        if record.state != ClosureState::Running {
            return None;
        }
        record.refs -= 1;
        if record.refs > 0 {
            record.env = Some((call.a, call.b));
            record.state = ClosureState::Idle;
            return None;
        }
        let dtor = record.dtor;
        self.destroy(key);
        Some(Destructor {
            dtor,
            a: call.a,
            b: call.b,
        })
    }

    /// Records not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Slots allocated so far, live or free.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destructor_runs_once_on_last_release() {
        let mut table = ClosureTable::default();
        let key = table.create(3, 10, 20, 4, ClosureVariant::Persistent);
        table.retain(key).unwrap();
        table.retain(key).unwrap();
        assert_eq!(table.release(key), Ok(Release::Retained));
        assert_eq!(table.release(key), Ok(Release::Retained));
        assert_eq!(
            table.release(key),
            Ok(Release::Destroyed(Some(Destructor {
                dtor: 4,
                a: 10,
                b: 20
            })))
        );
        assert_eq!(table.release(key), Err(ContractViolation::ClosureDestroyed(key)));
        assert_eq!(table.live_count(), 0);
    }

    #[test]
    fn persistent_call_restores_environment() {
        let mut table = ClosureTable::default();
        let key = table.create(1, 7, 8, 2, ClosureVariant::Persistent);
        let call = table.begin_call(key).unwrap();
        assert_eq!((call.a, call.b), (7, 8));
        assert_eq!(table.state(key), Some(ClosureState::Running));
        assert_eq!(table.ref_count(key), Some(2));
        assert_eq!(
            table.begin_call(key),
            Err(ContractViolation::ClosureReentered(key))
        );
        assert_eq!(table.end_call(key, &call), None);
        assert_eq!(table.state(key), Some(ClosureState::Idle));
        assert_eq!(table.begin_call(key).map(|c| (c.a, c.b)), Ok((7, 8)));
    }

    #[test]
    fn release_during_call_defers_destructor() {
        let mut table = ClosureTable::default();
        let key = table.create(1, 7, 8, 2, ClosureVariant::Persistent);
        let call = table.begin_call(key).unwrap();
        assert_eq!(table.release(key), Ok(Release::Retained));
        assert_eq!(
            table.end_call(key, &call),
            Some(Destructor { dtor: 2, a: 7, b: 8 })
        );
        assert_eq!(table.state(key), Some(ClosureState::Destroyed));
        assert_eq!(
            table.begin_call(key),
            Err(ContractViolation::ClosureDestroyed(key))
        );
    }

    #[test]
    fn once_closure_is_consumed_by_first_call() {
        let mut table = ClosureTable::default();
        let key = table.create(1, 5, 6, 2, ClosureVariant::Once);
        let call = table.begin_call(key).unwrap();
        assert_eq!((call.a, call.b), (5, 6));
        assert_eq!(table.end_call(key, &call), None);
        assert_eq!(table.state(key), Some(ClosureState::Consumed));
        assert_eq!(
            table.begin_call(key),
            Err(ContractViolation::ClosureConsumed(key))
        );
        // The environment went to the invocation; no destructor is owed.
        assert_eq!(table.release(key), Ok(Release::Destroyed(None)));
    }

    #[test]
    fn unused_once_closure_still_gets_destructor() {
        let mut table = ClosureTable::default();
        let key = table.create(1, 5, 6, 2, ClosureVariant::Once);
        assert_eq!(
            table.release(key),
            Ok(Release::Destroyed(Some(Destructor { dtor: 2, a: 5, b: 6 })))
        );
    }

    #[test]
    fn destroyed_slot_is_reused_under_a_new_key() {
        let mut table = ClosureTable::default();
        let first = table.create(1, 0, 0, 2, ClosureVariant::Persistent);
        assert!(matches!(table.release(first), Ok(Release::Destroyed(_))));
        let second = table.create(1, 0, 0, 2, ClosureVariant::Persistent);
        assert_eq!(second.index, first.index);
        assert_ne!(second, first);
        assert_eq!(table.slot_count(), 1);
        assert_eq!(table.state(first), Some(ClosureState::Destroyed));
        assert_eq!(table.state(second), Some(ClosureState::Idle));
        assert_eq!(
            table.retain(first),
            Err(ContractViolation::ClosureDestroyed(first))
        );
        assert_eq!(table.ref_count(second), Some(1));
    }

    #[test]
    fn over_release_while_running_is_rejected() {
        let mut table = ClosureTable::default();
        let key = table.create(1, 7, 8, 2, ClosureVariant::Persistent);
        let call = table.begin_call(key).unwrap();
        assert_eq!(table.release(key), Ok(Release::Retained));
        assert_eq!(
            table.release(key),
            Err(ContractViolation::ClosureOverReleased(key))
        );
        assert_eq!(table.ref_count(key), Some(1));
        assert_eq!(
            table.end_call(key, &call),
            Some(Destructor { dtor: 2, a: 7, b: 8 })
        );
        assert_eq!(table.live_count(), 0);
    }
}
