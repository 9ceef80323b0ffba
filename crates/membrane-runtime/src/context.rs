//! The boundary context stored in every `wasmi::Store`.

use membrane_host::{HostValue, Realm};
use wasmi::{AsContextMut, Caller, Func, Store, Table};

use crate::closure::ClosureTable;
use crate::config::BoundaryConfig;
use crate::error::{BoundaryError, BoundaryResult};
use crate::heap::HandleTable;
use crate::memory::LinearMemory;

/// Exports captured after instantiation.
#[derive(Debug)]
pub struct ModuleExports {
    pub memory: LinearMemory,
    pub alloc: Func,
    pub free: Func,
    pub table: Option<Table>,
}

/// Everything the boundary owns for one module instance.
///
/// Shims reach it through [`Caller::data_mut`]; host-initiated calls reach it
/// through [`Store::data_mut`]. There is no global state.
#[derive(Debug)]
pub struct Boundary {
    pub(crate) config: BoundaryConfig,
    pub(crate) realm: Realm,
    pub(crate) heap: HandleTable,
    pub(crate) closures: ClosureTable,
    pub(crate) exports: Option<ModuleExports>,
    /// Contract violation or other fatal error raised by a shim, waiting for
    /// the trap it caused to reach the host.
    pub(crate) fatal: Option<BoundaryError>,
    /// Value thrown by module code through `throw`/`rethrow`.
    pub(crate) pending_throw: Option<HostValue>,
    /// Number of module calls on the stack.
    pub(crate) depth: u32,
}

impl Boundary {
    pub fn new(config: BoundaryConfig, realm: Realm) -> Self {
        let heap = HandleTable::with_capacity(config.heap_capacity);
        Self {
            config,
            realm,
            heap,
            closures: ClosureTable::default(),
            exports: None,
            fatal: None,
            pending_throw: None,
            depth: 0,
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub fn realm_mut(&mut self) -> &mut Realm {
        &mut self.realm
    }

    pub fn heap(&self) -> &HandleTable {
        &self.heap
    }

    pub fn closures(&self) -> &ClosureTable {
        &self.closures
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn exports(&self) -> BoundaryResult<&ModuleExports> {
        self.exports.as_ref().ok_or(BoundaryError::NotLoaded)
    }

    pub(crate) fn exports_mut(&mut self) -> BoundaryResult<&mut ModuleExports> {
        self.exports.as_mut().ok_or(BoundaryError::NotLoaded)
    }
}

/// A store context carrying a [`Boundary`]: the store itself, or the
/// [`Caller`] handed to a shim.
pub trait BoundaryCx: AsContextMut<Data = Boundary> {
    fn boundary(&self) -> &Boundary;
    fn boundary_mut(&mut self) -> &mut Boundary;
}

impl BoundaryCx for Store<Boundary> {
    fn boundary(&self) -> &Boundary {
        self.data()
    }

    fn boundary_mut(&mut self) -> &mut Boundary {
        self.data_mut()
    }
}

impl BoundaryCx for Caller<'_, Boundary> {
    fn boundary(&self) -> &Boundary {
        self.data()
    }

    fn boundary_mut(&mut self) -> &mut Boundary {
        self.data_mut()
    }
}
