//! Module loading and the host-facing entry API.
//!
//! [`Loader`] compiles a module, links every catalogue capability under the
//! configured namespace, instantiates it and captures its exports. The
//! result is a [`BoundModule`]: the only handle the embedder holds on a
//! running module and its realm.

use std::io::Read;

use membrane_abi::{Handle, EXPORT_ALLOC, EXPORT_FREE, EXPORT_MEMORY, EXPORT_TABLE};
use membrane_host::{ClosureKey, FunctionKind, HostValue, ObjectId, Realm};
use tracing::{debug, info};
use wasmi::{Config, Engine, Instance, Linker, Module, Store, WasmParams, WasmResults};

use crate::adapter;
use crate::closure::ClosureTable;
use crate::codec;
use crate::config::BoundaryConfig;
use crate::context::{Boundary, ModuleExports};
use crate::error::{BoundaryError, BoundaryResult, LoadError};
use crate::heap::HandleTable;
use crate::invoke;
use crate::memory::{self, LinearMemory};
use crate::scheduler;

/// Where module code comes from.
pub enum ModuleSource {
    /// Already compiled by this loader's engine.
    Compiled(Module),
    Bytes(Vec<u8>),
    /// Read to the end; compiled while reading when streaming is enabled.
    Stream(Box<dyn Read>),
}

impl std::fmt::Debug for ModuleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compiled(_) => f.write_str("Compiled"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Module> for ModuleSource {
    fn from(module: Module) -> Self {
        Self::Compiled(module)
    }
}

/// Compiles and instantiates modules against the capability catalogue.
#[derive(Debug)]
pub struct Loader {
    config: BoundaryConfig,
    engine: Engine,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(BoundaryConfig::default())
    }
}

impl Loader {
    pub fn new(config: BoundaryConfig) -> Self {
        let mut engine_config = Config::default();
        engine_config.consume_fuel(config.fuel.is_some());
        Self {
            engine: Engine::new(&engine_config),
            config,
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Compile module bytes for later instantiation.
    pub fn compile(&self, bytes: &[u8]) -> Result<Module, LoadError> {
        Module::new(&self.engine, bytes).map_err(|e| LoadError::Compile(e.to_string()))
    }

    fn compile_source(&self, source: ModuleSource) -> Result<Module, LoadError> {
        match source {
            ModuleSource::Compiled(module) => {
                if Engine::same(module.engine(), &self.engine) {
                    Ok(module)
                } else {
                    Err(LoadError::EngineMismatch)
                }
            }
            ModuleSource::Bytes(bytes) => self.compile(&bytes),
            ModuleSource::Stream(stream) if self.config.streaming_compilation => {
                debug!("streaming compilation");
                Module::new_streaming(&self.engine, stream)
                    .map_err(|e| LoadError::Compile(e.to_string()))
            }
            ModuleSource::Stream(mut stream) => {
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes)?;
                self.compile(&bytes)
            }
        }
    }

    /// Instantiate with a fresh realm built from the configuration.
    pub fn load(&self, source: impl Into<ModuleSource>) -> Result<BoundModule, LoadError> {
        self.instantiate(source.into(), Realm::new(self.config.realm.clone()))
    }

    /// Compile `source`, link it and instantiate it against `realm`.
    pub fn instantiate(&self, source: ModuleSource, realm: Realm) -> Result<BoundModule, LoadError> {
        let module = self.compile_source(source)?;

        let mut store = Store::new(&self.engine, Boundary::new(self.config.clone(), realm));
        if let Some(fuel) = self.config.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| LoadError::Instantiate(e.to_string()))?;
        }

        let mut linker = Linker::<Boundary>::new(&self.engine);
        adapter::link(&mut linker, &self.config.import_module)?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| LoadError::Link(e.to_string()))?
            .start(&mut store)
            .map_err(|e| LoadError::Instantiate(e.to_string()))?;

        let exports = capture_exports(&store, &instance)?;
        let imports = module.imports().count();
        store.data_mut().exports = Some(exports);
        info!(
            namespace = %self.config.import_module,
            imports,
            "module loaded"
        );
        Ok(BoundModule { store, instance })
    }
}

fn capture_exports(store: &Store<Boundary>, instance: &Instance) -> Result<ModuleExports, LoadError> {
    let missing = |name: &str| LoadError::MissingExport(name.to_string());
    let memory = instance
        .get_memory(store, EXPORT_MEMORY)
        .ok_or_else(|| missing(EXPORT_MEMORY))?;
    let alloc = instance
        .get_func(store, EXPORT_ALLOC)
        .ok_or_else(|| missing(EXPORT_ALLOC))?;
    alloc
        .typed::<i32, i32>(store)
        .map_err(|_| LoadError::ExportSignature(EXPORT_ALLOC.into()))?;
    let free = instance
        .get_func(store, EXPORT_FREE)
        .ok_or_else(|| missing(EXPORT_FREE))?;
    free.typed::<(i32, i32), ()>(store)
        .map_err(|_| LoadError::ExportSignature(EXPORT_FREE.into()))?;
    let table = instance.get_table(store, EXPORT_TABLE);

    let base = memory.data(store).as_ptr() as usize;
    Ok(ModuleExports {
        memory: LinearMemory::new(memory, base),
        alloc,
        free,
        table,
    })
}

/// A module instance bound to its realm.
pub struct BoundModule {
    store: Store<Boundary>,
    instance: Instance,
}

impl std::fmt::Debug for BoundModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundModule")
            .field("instance", &self.instance)
            .field("live_handles", &self.heap().live_count())
            .field("live_closures", &self.closures().live_count())
            .finish()
    }
}

impl BoundModule {
    /// Run an exported entry point as an outermost call, then run the
    /// microtask checkpoint.
    fn enter<P, R>(&mut self, entry: &str, params: P) -> BoundaryResult<R>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self
            .instance
            .get_typed_func::<P, R>(&self.store, entry)
            .map_err(|_| BoundaryError::MissingEntry(entry.to_string()))?;
        debug!(entry, "enter module");
        let store = &mut self.store;
        store.data_mut().depth += 1;
        let result = func.call(&mut *store, params);
        store.data_mut().depth -= 1;
        let result = result.map_err(|error| invoke::into_boundary_error(store, error))?;
        scheduler::microtask_checkpoint(store)?;
        Ok(result)
    }

    /// Call `entry: () -> ()`.
    pub fn call(&mut self, entry: &str) -> BoundaryResult<()> {
        self.enter::<(), ()>(entry, ())
    }

    /// Call `entry: (handle) -> handle` with `value`. The module owns the
    /// argument handle; the result handle is taken back by the host.
    pub fn call_with_value(&mut self, entry: &str, value: HostValue) -> BoundaryResult<HostValue> {
        let argument = self.store.data_mut().heap.handle_for(value);
        let result = self.enter::<i32, i32>(entry, argument.to_abi())?;
        let value = self
            .store
            .data_mut()
            .heap
            .take(Handle::from_abi(result))?;
        Ok(value)
    }

    /// Call `entry: (ptr, len) -> ()` with `text` encoded into module memory.
    /// The bytes are freed after the call returns.
    pub fn call_with_str(&mut self, entry: &str, text: &str) -> BoundaryResult<()> {
        let slice = codec::encode(&mut self.store, text)?;
        let result = self.enter::<(i32, i32), ()>(entry, (slice.ptr as i32, slice.len as i32));
        codec::release(&mut self.store, slice)?;
        result
    }

    /// Dispatch a bubbling, cancelable event at `target`. Returns `false`
    /// when a listener prevented the default action.
    pub fn dispatch_event(&mut self, target: ObjectId, event_type: &str) -> BoundaryResult<bool> {
        scheduler::dispatch_event(&mut self.store, target, event_type)
    }

    /// Run microtasks and tasks until both queues are empty.
    pub fn run_until_idle(&mut self) -> BoundaryResult<()> {
        scheduler::run_until_idle(&mut self.store)
    }

    /// Move the virtual clock forward, firing due timers.
    pub fn advance_time(&mut self, ms: u64) -> BoundaryResult<()> {
        scheduler::advance_time(&mut self.store, ms)
    }

    /// Run pending animation frame callbacks.
    pub fn animation_frame(&mut self, timestamp: f64) -> BoundaryResult<()> {
        scheduler::animation_frame(&mut self.store, timestamp)
    }

    pub fn realm(&self) -> &Realm {
        &self.store.data().realm
    }

    pub fn realm_mut(&mut self) -> &mut Realm {
        &mut self.store.data_mut().realm
    }

    pub fn heap(&self) -> &HandleTable {
        &self.store.data().heap
    }

    pub fn closures(&self) -> &ClosureTable {
        &self.store.data().closures
    }

    /// Closure key of a function object created by `closure_new`.
    pub fn closure_key(&self, value: &HostValue) -> Option<ClosureKey> {
        match self.realm().function_kind(value) {
            Some(FunctionKind::Closure(key)) => Some(key),
            None => None,
        }
    }

    pub fn store(&self) -> &Store<Boundary> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store<Boundary> {
        &mut self.store
    }

    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Number of times linear memory was observed to move.
    pub fn memory_generation(&mut self) -> BoundaryResult<u64> {
        memory::generation(&mut self.store)
    }

    /// Remaining fuel, when metering is enabled.
    pub fn fuel(&self) -> Option<u64> {
        self.store.get_fuel().ok()
    }
}
