//! Boundary intrinsics: handles, primitives, throwing and closures.

use membrane_abi::capability::*;
use membrane_abi::Handle;
use membrane_host::{ClosureKey, FunctionKind, HostValue, Realm};
use tracing::debug;
use wasmi::Caller;

use super::{boxed, infallible, string_arg, value, write_string, Registrar, ShimResult};
use crate::closure::{ClosureVariant, Release};
use crate::codec::{self, WasmSlice};
use crate::context::{Boundary, BoundaryCx};
use crate::error::{ContractViolation, LoadError};
use crate::invoke;
use crate::memory;

type Cx<'a> = Caller<'a, Boundary>;

/// Abort the current module call with a thrown value. The call's caller
/// finds the value in the boundary when the trap reaches it.
fn throw<C: BoundaryCx>(cx: &mut C, value: HostValue) -> wasmi::Error {
    let message = cx.boundary().realm.display_string(&value);
    debug!(%message, "module throw");
    cx.boundary_mut().pending_throw = Some(value);
    wasmi::Error::new(format!("module threw: {message}"))
}

fn closure_of<C: BoundaryCx>(cx: &C, raw: i32) -> ShimResult<ClosureKey> {
    let value = value(cx, raw)?;
    match cx.boundary().realm.function_kind(&value) {
        Some(FunctionKind::Closure(key)) => Ok(key),
        None => Err(ContractViolation::NotAClosure(Handle::from_abi(raw)).into()),
    }
}

fn debug_string(realm: &Realm, value: &HostValue) -> String {
    match value {
        HostValue::String(s) => format!("{s:?}"),
        HostValue::Object(id) if realm.error_parts(value).is_none() => {
            let iface = realm.object(*id).interface();
            format!("{}({id})", iface.name())
        }
        other => realm.display_string(other),
    }
}

fn predicate<C: BoundaryCx>(cx: &mut C, raw: i32, test: impl FnOnce(&Realm, &HostValue) -> bool) -> ShimResult<i32> {
    let value = value(cx, raw)?;
    Ok(test(&cx.boundary().realm, &value) as i32)
}

pub(super) fn register(r: &mut Registrar<'_>) -> Result<(), LoadError> {
    // ── Handles ─────────────────────────────────────────────────────────────
    r.shim(&OBJECT_DROP_REF, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            Ok(cx.boundary_mut().heap.drop_handle(Handle::from_abi(h))?)
        })
    })?;
    r.shim(&OBJECT_CLONE_REF, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            Ok(cx.boundary().heap.clone_ref(Handle::from_abi(h))?.to_abi())
        })
    })?;

    // ── Primitives ──────────────────────────────────────────────────────────
    r.shim(&STRING_NEW, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| {
            let text = string_arg(cx, ptr, len)?;
            Ok(boxed(cx, text))
        })
    })?;
    r.shim(&STRING_CONSUME, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| {
            let text = string_arg(cx, ptr, len)?;
            codec::release(cx, WasmSlice::from_abi(ptr, len))?;
            Ok(boxed(cx, text))
        })
    })?;
    r.shim(&STRING_GET, |mut caller: Cx<'_>, h: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let text = value(cx, h)?.as_str().map(str::to_string);
            write_string(cx, ret, text)
        })
    })?;
    r.shim(&NUMBER_NEW, |mut caller: Cx<'_>, n: f64| {
        infallible(&mut caller, |cx| Ok(boxed(cx, n)))
    })?;
    r.shim(&NUMBER_GET, |mut caller: Cx<'_>, h: i32, ret: i32| {
        infallible(&mut caller, |cx| match value(cx, h)?.as_number() {
            Some(n) => {
                memory::write_f64(cx, ret as u32, n)?;
                Ok(1)
            }
            None => Ok(0),
        })
    })?;
    r.shim(&BOOLEAN_GET, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            Ok(value(cx, h)?.as_bool().map_or(2, i32::from))
        })
    })?;
    r.shim(&IS_NULL, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            predicate(cx, h, |_, v| matches!(v, HostValue::Null))
        })
    })?;
    r.shim(&IS_UNDEFINED, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            predicate(cx, h, |_, v| matches!(v, HostValue::Undefined))
        })
    })?;
    r.shim(&IS_OBJECT, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            predicate(cx, h, |realm, v| v.as_object().is_some() && !realm.is_function(v))
        })
    })?;
    r.shim(&IS_FUNCTION, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| predicate(cx, h, Realm::is_function))
    })?;
    r.shim(&IS_STRING, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| predicate(cx, h, |_, v| v.as_str().is_some()))
    })?;
    r.shim(&JSVAL_EQ, |mut caller: Cx<'_>, a: i32, b: i32| {
        infallible(&mut caller, |cx| {
            let other = value(cx, b)?;
            predicate(cx, a, |_, v| v.strict_eq(&other))
        })
    })?;
    r.shim(&DEBUG_STRING, |mut caller: Cx<'_>, h: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let text = debug_string(&cx.boundary().realm, &value(cx, h)?);
            write_string(cx, ret, Some(text)).map(drop)
        })
    })?;

    // ── Throwing ────────────────────────────────────────────────────────────
    r.shim(&THROW, |mut caller: Cx<'_>, ptr: i32, len: i32| -> Result<(), wasmi::Error> {
        let message = infallible(&mut caller, |cx| string_arg(cx, ptr, len))?;
        let error = caller.boundary_mut().realm.new_error("Error", &message);
        Err(throw(&mut caller, error.into()))
    })?;
    r.shim(&RETHROW, |mut caller: Cx<'_>, h: i32| -> Result<(), wasmi::Error> {
        let thrown = infallible(&mut caller, |cx| {
            Ok(cx.boundary_mut().heap.take(Handle::from_abi(h))?)
        })?;
        Err(throw(&mut caller, thrown))
    })?;

    // ── Closures ────────────────────────────────────────────────────────────
    r.shim(
        &CLOSURE_NEW,
        |mut caller: Cx<'_>, invoke: i32, a: i32, b: i32, dtor: i32, once: i32| {
            infallible(&mut caller, |cx| {
                invoke::table_func(cx, invoke as u32)?;
                invoke::table_func(cx, dtor as u32)?;
                let variant = match once {
                    0 => ClosureVariant::Persistent,
                    _ => ClosureVariant::Once,
                };
                let boundary = cx.boundary_mut();
                let key = boundary
                    .closures
                    .create(invoke as u32, a, b, dtor as u32, variant);
                let function = boundary.realm.new_function(FunctionKind::Closure(key));
                Ok(boxed(cx, function))
            })
        },
    )?;
    r.shim(&CLOSURE_RETAIN, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            let key = closure_of(cx, h)?;
            Ok(cx.boundary_mut().closures.retain(key)?)
        })
    })?;
    r.shim(&CLOSURE_DROP, |mut caller: Cx<'_>, h: i32| {
        infallible(&mut caller, |cx| {
            let key = closure_of(cx, h)?;
            cx.boundary_mut().heap.drop_handle(Handle::from_abi(h))?;
            let release = cx.boundary_mut().closures.release(key)?;
            match release {
                Release::Retained => Ok(0),
                Release::Destroyed(destructor) => {
                    if let Some(destructor) = destructor {
                        invoke::run_destructor(cx, destructor)?;
                    }
                    Ok(1)
                }
            }
        })
    })?;

    // ── Globals ─────────────────────────────────────────────────────────────
    r.shim(&GLOBAL_WINDOW, |mut caller: Cx<'_>| {
        infallible(&mut caller, |cx| {
            let window = cx.boundary().realm.window();
            Ok(boxed(cx, window))
        })
    })?;
    r.shim(&GLOBAL_DOCUMENT, |mut caller: Cx<'_>| {
        infallible(&mut caller, |cx| {
            let document = cx.boundary().realm.document();
            Ok(boxed(cx, document))
        })
    })?;
    Ok(())
}
