//! The call adapter: one host shim per catalogue capability.
//!
//! A shim turns module-native arguments (handles, numbers, `(ptr, len)`
//! strings) into host values, runs the host operation and boxes the result.
//! Host exceptions go through the exception slot when the capability has
//! one. Without a slot they are fatal, as are contract violations: the shim
//! records the error in the [`Boundary`] and traps, and the outermost entry
//! call returns it.

mod dom;
mod intrinsics;
mod web;

use std::collections::BTreeSet;

use membrane_abi::{Capability, Handle, CATALOG};
use membrane_host::{HostValue, Interface, ObjectId, Thrown};
use tracing::error;
use wasmi::{IntoFunc, Linker};

use crate::codec::{self, WasmSlice};
use crate::context::{Boundary, BoundaryCx};
use crate::error::{BoundaryError, ContractViolation, LoadError};
use crate::exception::ExceptionSlot;
use crate::memory;

/// Why a shim body stopped.
pub(crate) enum ShimError {
    /// Recoverable host exception.
    Thrown(Thrown),
    Fatal(BoundaryError),
}

impl From<Thrown> for ShimError {
    fn from(thrown: Thrown) -> Self {
        Self::Thrown(thrown)
    }
}

impl From<BoundaryError> for ShimError {
    fn from(error: BoundaryError) -> Self {
        Self::Fatal(error)
    }
}

impl From<ContractViolation> for ShimError {
    fn from(violation: ContractViolation) -> Self {
        Self::Fatal(violation.into())
    }
}

pub(crate) type ShimResult<T> = Result<T, ShimError>;

/// Record a fatal error and produce the trap that carries it out of the
/// module. The first error recorded wins.
pub(crate) fn fatal<C: BoundaryCx>(cx: &mut C, error: BoundaryError) -> wasmi::Error {
    let message = error.to_string();
    error!(%message, "fatal boundary error");
    cx.boundary_mut().fatal.get_or_insert(error);
    wasmi::Error::new(message)
}

/// Run the body of a shim that has an exception slot at `exn`.
pub(crate) fn fallible<C, R>(
    cx: &mut C,
    exn: i32,
    body: impl FnOnce(&mut C) -> ShimResult<R>,
) -> Result<R, wasmi::Error>
where
    C: BoundaryCx,
    R: Default,
{
    let slot = ExceptionSlot::at(exn);
    let (result, written) = match body(cx) {
        Ok(value) => {
            let written = slot.clear(cx);
            (value, written)
        }
        Err(ShimError::Thrown(thrown)) => {
            let handle = cx.boundary_mut().heap.add(thrown.into_value());
            (R::default(), slot.raise(cx, handle))
        }
        Err(ShimError::Fatal(error)) => return Err(fatal(cx, error)),
    };
    match written {
        Ok(()) => Ok(result),
        Err(error) => Err(fatal(cx, error)),
    }
}

/// Run the body of a shim without an exception slot.
pub(crate) fn infallible<C, R>(
    cx: &mut C,
    body: impl FnOnce(&mut C) -> ShimResult<R>,
) -> Result<R, wasmi::Error>
where
    C: BoundaryCx,
{
    match body(cx) {
        Ok(value) => Ok(value),
        Err(ShimError::Thrown(thrown)) => {
            let message = cx.boundary().realm.display_string(thrown.value());
            Err(fatal(cx, BoundaryError::UncaughtException { message }))
        }
        Err(ShimError::Fatal(error)) => Err(fatal(cx, error)),
    }
}

// ── Argument conversion ─────────────────────────────────────────────────────

pub(crate) fn value<C: BoundaryCx>(cx: &C, raw: i32) -> ShimResult<HostValue> {
    Ok(cx.boundary().heap.try_get(Handle::from_abi(raw))?.clone())
}

/// The receiver of a member, which must implement `iface`.
pub(crate) fn receiver<C: BoundaryCx>(cx: &mut C, raw: i32, iface: Interface) -> ShimResult<ObjectId> {
    let value = value(cx, raw)?;
    let realm = &mut cx.boundary_mut().realm;
    match value.as_object() {
        Some(id) if realm.instance_of(&value, iface) => Ok(id),
        _ => Err(realm.type_error("Illegal invocation").into()),
    }
}

/// An object argument of a method, which must implement `iface`.
pub(crate) fn object_arg<C: BoundaryCx>(
    cx: &mut C,
    raw: i32,
    iface: Interface,
    context: &str,
) -> ShimResult<ObjectId> {
    let value = value(cx, raw)?;
    let realm = &mut cx.boundary_mut().realm;
    match value.as_object() {
        Some(id) if realm.instance_of(&value, iface) => Ok(id),
        _ => {
            let message = format!("{context}: parameter is not of type '{}'.", iface.name());
            Err(realm.type_error(&message).into())
        }
    }
}

/// A nullable object argument; `null` and `undefined` are absent.
pub(crate) fn optional_object<C: BoundaryCx>(
    cx: &mut C,
    raw: i32,
    iface: Interface,
    context: &str,
) -> ShimResult<Option<ObjectId>> {
    if value(cx, raw)?.is_nullish() {
        return Ok(None);
    }
    object_arg(cx, raw, iface, context).map(Some)
}

pub(crate) fn string_arg<C: BoundaryCx>(cx: &mut C, ptr: i32, len: i32) -> ShimResult<String> {
    Ok(codec::decode(cx, WasmSlice::from_abi(ptr, len))?)
}

// ── Result conversion ───────────────────────────────────────────────────────

/// A new handle for a result value.
pub(crate) fn boxed<C: BoundaryCx>(cx: &mut C, value: impl Into<HostValue>) -> i32 {
    cx.boundary_mut().heap.handle_for(value.into()).to_abi()
}

/// Write an optional string into the return area at `ret`. Returns 1 when
/// a string was written; an absent string writes `(0, 0)` and returns 0.
pub(crate) fn write_string<C: BoundaryCx>(cx: &mut C, ret: i32, text: Option<String>) -> ShimResult<i32> {
    let (slice, present) = match text {
        Some(text) => (codec::encode(cx, &text)?, 1),
        None => (WasmSlice::default(), 0),
    };
    memory::write_u32(cx, ret as u32, slice.ptr)?;
    memory::write_u32(cx, (ret as u32).wrapping_add(4), slice.len)?;
    Ok(present)
}

// ── Linking ─────────────────────────────────────────────────────────────────

/// Registers shims and tracks which capabilities have one.
pub(crate) struct Registrar<'a> {
    linker: &'a mut Linker<Boundary>,
    namespace: &'a str,
    linked: BTreeSet<String>,
}

impl<'a> Registrar<'a> {
    fn new(linker: &'a mut Linker<Boundary>, namespace: &'a str) -> Self {
        Self {
            linker,
            namespace,
            linked: BTreeSet::new(),
        }
    }

    pub(crate) fn shim<Params, Results>(
        &mut self,
        cap: &Capability,
        func: impl IntoFunc<Boundary, Params, Results>,
    ) -> Result<(), LoadError> {
        let name = cap.import_name();
        self.linker
            .func_wrap(self.namespace, &name, func)
            .map_err(|e| LoadError::Link(format!("{name}: {e}")))?;
        self.linked.insert(name);
        Ok(())
    }

    fn finish(self) -> Result<(), LoadError> {
        let missing: Vec<String> = CATALOG
            .iter()
            .map(Capability::import_name)
            .filter(|name| !self.linked.contains(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(LoadError::Link(format!("no shim for {}", missing.join(", "))))
        }
    }
}

/// Register every capability of the catalogue under `namespace`.
pub fn link(linker: &mut Linker<Boundary>, namespace: &str) -> Result<(), LoadError> {
    let mut registrar = Registrar::new(linker, namespace);
    intrinsics::register(&mut registrar)?;
    web::register(&mut registrar)?;
    dom::register(&mut registrar)?;
    registrar.finish()
}
