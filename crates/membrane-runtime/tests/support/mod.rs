//! Shared fixtures for the boundary integration tests.

#![allow(dead_code)]

use membrane_abi::capability::{CLOSURE_NEW, OBJECT_DROP_REF};
use membrane_abi::{Capability, Handle};
use membrane_guest::layout::scratch;
use membrane_guest::{FuncBody, GuestBuilder, ValType};
use membrane_host::{ClosureKey, ObjectId};
use membrane_runtime::codec::{self, WasmSlice};
use membrane_runtime::{memory, BoundModule, BoundaryConfig, Loader};

pub const I32: ValType = ValType::I32;

/// Scratch word counting closure invocations.
pub const CALLS: u32 = 0;
/// Scratch word counting destructor runs.
pub const DESTROYED: u32 = 1;

/// A builder with `caps` imported, plus `object_drop_ref` and
/// `closure_new`, which the closure fixtures need.
pub fn guest(caps: &[Capability]) -> GuestBuilder {
    let mut guest = GuestBuilder::new();
    guest.import_all(&[OBJECT_DROP_REF, CLOSURE_NEW]).unwrap();
    guest.import_all(caps).unwrap();
    guest
}

/// Table slots of a counting closure: `invoke` bumps the `CALLS` word,
/// drops its argument and returns `undefined`; `dtor` bumps `DESTROYED`.
#[derive(Debug, Clone, Copy)]
pub struct CountingClosure {
    pub invoke: i32,
    pub dtor: i32,
}

impl CountingClosure {
    pub fn define(guest: &mut GuestBuilder) -> Self {
        let invoke = guest
            .function(None, &[I32, I32, I32], &[I32], &[], |f| {
                f.increment_i32(scratch(CALLS), 1);
                f.local_get(2).call_import(&OBJECT_DROP_REF);
                f.i32(Handle::UNDEFINED.to_abi());
            })
            .unwrap();
        let dtor = guest
            .function(None, &[I32, I32], &[], &[], |f| {
                f.increment_i32(scratch(DESTROYED), 1);
            })
            .unwrap();
        Self {
            invoke: guest.table_slot(invoke).unwrap() as i32,
            dtor: guest.table_slot(dtor).unwrap() as i32,
        }
    }

    /// Push a new closure handle.
    pub fn create(self, f: &mut FuncBody<'_>, once: bool) {
        f.i32(self.invoke)
            .i32(0)
            .i32(0)
            .i32(self.dtor)
            .i32(once as i32)
            .call_import(&CLOSURE_NEW);
    }
}

pub fn load(wasm: Vec<u8>) -> BoundModule {
    Loader::default().load(wasm).expect("module loads")
}

pub fn load_with(config: BoundaryConfig, wasm: Vec<u8>) -> BoundModule {
    Loader::new(config).load(wasm).expect("module loads")
}

pub fn read_i32(module: &mut BoundModule, addr: u32) -> i32 {
    memory::read_u32(module.store_mut(), addr).unwrap() as i32
}

pub fn scratch_word(module: &mut BoundModule, n: u32) -> i32 {
    read_i32(module, scratch(n))
}

/// Decode the `(ptr, len)` pair a capability wrote at `addr`.
pub fn read_string(module: &mut BoundModule, addr: u32) -> String {
    let ptr = read_i32(module, addr);
    let len = read_i32(module, addr + 4);
    codec::decode(module.store_mut(), WasmSlice::from_abi(ptr, len)).unwrap()
}

pub fn object(module: &BoundModule, handle: i32) -> ObjectId {
    module
        .heap()
        .get(Handle::from_abi(handle))
        .as_object()
        .expect("handle holds an object")
}

pub fn closure_key(module: &BoundModule, handle: i32) -> ClosureKey {
    let value = module.heap().get(Handle::from_abi(handle));
    module.closure_key(value).expect("handle holds a closure")
}

pub fn freed_bytes(module: &mut BoundModule) -> i32 {
    let func = module
        .instance()
        .get_typed_func::<(), i32>(module.store(), "freed_bytes")
        .unwrap();
    func.call(module.store_mut(), ()).unwrap()
}
