//! Calling module closures from the host.

use membrane_abi::Handle;
use membrane_host::{
    ClosureKey, Completion, ConsoleLevel, FunctionKind, HostValue, ObjectId, Thrown,
};
use tracing::{debug, warn};
use wasmi::core::TrapCode;
use wasmi::{Func, Val};

use crate::closure::{ClosureCall, Destructor, Release};
use crate::context::BoundaryCx;
use crate::error::{BoundaryError, BoundaryResult, ContractViolation};

/// Why a call into the module did not return normally.
#[derive(Debug)]
pub(crate) enum Abrupt {
    /// Module code threw a host value.
    Threw(HostValue),
    Fatal(BoundaryError),
}

/// Work out what a failed module call means. A shim that trapped left its
/// reason in the boundary; anything else is a genuine trap.
pub(crate) fn classify<C: BoundaryCx>(cx: &mut C, error: wasmi::Error) -> Abrupt {
    let boundary = cx.boundary_mut();
    if let Some(fatal) = boundary.fatal.take() {
        return Abrupt::Fatal(fatal);
    }
    if let Some(value) = boundary.pending_throw.take() {
        return Abrupt::Threw(value);
    }
    if error.as_trap_code() == Some(TrapCode::OutOfFuel) {
        return Abrupt::Fatal(BoundaryError::OutOfFuel);
    }
    Abrupt::Fatal(BoundaryError::Trap(error.to_string()))
}

/// [`classify`], with a module throw reported as [`BoundaryError::ModuleThrew`].
pub(crate) fn into_boundary_error<C: BoundaryCx>(cx: &mut C, error: wasmi::Error) -> BoundaryError {
    match classify(cx, error) {
        Abrupt::Threw(value) => BoundaryError::ModuleThrew {
            message: cx.boundary().realm.display_string(&value),
        },
        Abrupt::Fatal(error) => error,
    }
}

/// The function stored at `index` in the module's exported table.
pub(crate) fn table_func<C: BoundaryCx>(cx: &mut C, index: u32) -> BoundaryResult<Func> {
    let missing = || ContractViolation::UnknownTableEntry(index);
    let table = cx.boundary().exports()?.table.ok_or_else(missing)?;
    match table.get(&*cx, index.into()) {
        Some(Val::FuncRef(func)) => func
            .func()
            .copied()
            .ok_or_else(|| BoundaryError::from(missing())),
        _ => Err(missing().into()),
    }
}

fn closure_key<C: BoundaryCx>(cx: &C, callee: ObjectId) -> Option<ClosureKey> {
    match cx.boundary().realm.function_kind(&HostValue::Object(callee)) {
        Some(FunctionKind::Closure(key)) => Some(key),
        None => None,
    }
}

/// Call a host function object with one argument.
///
/// Returns the callee's result, or the value it threw. Contract violations
/// and traps are errors. The argument handle is given to the callee; the
/// result handle is taken back by the host.
pub fn call_function<C: BoundaryCx>(
    cx: &mut C,
    callee: &HostValue,
    argument: HostValue,
) -> BoundaryResult<Completion<HostValue>> {
    let key = callee.as_object().and_then(|id| closure_key(cx, id));
    let Some(key) = key else {
        let message = format!("{} is not a function", cx.boundary().realm.display_string(callee));
        return Ok(Err(cx.boundary_mut().realm.type_error(&message)));
    };
    let call = cx.boundary_mut().closures.begin_call(key)?;
    let outcome = invoke_closure(cx, &call, argument);
    if let Some(destructor) = cx.boundary_mut().closures.end_call(key, &call) {
        run_destructor(cx, destructor)?;
    }
    outcome
}

fn invoke_closure<C: BoundaryCx>(
    cx: &mut C,
    call: &ClosureCall,
    argument: HostValue,
) -> BoundaryResult<Completion<HostValue>> {
    let func = table_func(cx, call.invoke)?;
    let invoke = func
        .typed::<(i32, i32, i32), i32>(&*cx)
        .map_err(|_| ContractViolation::SignatureMismatch { index: call.invoke })?;
    let argument = cx.boundary_mut().heap.handle_for(argument);
    cx.boundary_mut().depth += 1;
    let result = invoke.call(&mut *cx, (call.a, call.b, argument.to_abi()));
    cx.boundary_mut().depth -= 1;
    match result {
        Ok(raw) => Ok(Ok(cx.boundary_mut().heap.take(Handle::from_abi(raw))?)),
        Err(error) => match classify(cx, error) {
            Abrupt::Threw(value) => Ok(Err(Thrown(value))),
            Abrupt::Fatal(error) => Err(error),
        },
    }
}

/// Run `dtor(a, b)` for a destroyed closure.
pub(crate) fn run_destructor<C: BoundaryCx>(cx: &mut C, destructor: Destructor) -> BoundaryResult<()> {
    debug!(dtor = destructor.dtor, "run closure destructor");
    let func = table_func(cx, destructor.dtor)?;
    let dtor = func
        .typed::<(i32, i32), ()>(&*cx)
        .map_err(|_| ContractViolation::SignatureMismatch {
            index: destructor.dtor,
        })?;
    cx.boundary_mut().depth += 1;
    let result = dtor.call(&mut *cx, (destructor.a, destructor.b));
    cx.boundary_mut().depth -= 1;
    result.map_err(|error| match classify(cx, error) {
        Abrupt::Threw(value) => BoundaryError::UncaughtException {
            message: cx.boundary().realm.display_string(&value),
        },
        Abrupt::Fatal(error) => error,
    })
}

/// Take a host reference to a callback stored by the host.
pub(crate) fn retain_callback<C: BoundaryCx>(cx: &mut C, callback: ObjectId) -> BoundaryResult<()> {
    if let Some(key) = closure_key(cx, callback) {
        cx.boundary_mut().closures.retain(key)?;
    }
    Ok(())
}

/// Drop a host reference taken by [`retain_callback`], running the
/// destructor if it was the last one.
pub(crate) fn release_callback<C: BoundaryCx>(cx: &mut C, callback: ObjectId) -> BoundaryResult<()> {
    let Some(key) = closure_key(cx, callback) else {
        return Ok(());
    };
    if let Release::Destroyed(Some(destructor)) = cx.boundary_mut().closures.release(key)? {
        run_destructor(cx, destructor)?;
    }
    Ok(())
}

/// Report an exception escaping a host-invoked callback. The caller carries
/// on with the next callback.
pub(crate) fn report_exception<C: BoundaryCx>(cx: &mut C, thrown: &Thrown) {
    let realm = &mut cx.boundary_mut().realm;
    let message = realm.display_string(thrown.value());
    warn!(%message, "uncaught exception in callback");
    realm
        .console_mut()
        .write(ConsoleLevel::Error, format!("Uncaught {message}"));
}

/// Dispatch `event` at `target`, calling module listeners synchronously.
///
/// Listeners are snapshotted per node; one removed by an earlier listener
/// is skipped. A throwing listener is reported and the dispatch continues.
/// Returns `false` when the default action was prevented.
pub fn dispatch<C: BoundaryCx>(
    cx: &mut C,
    event: ObjectId,
    target: ObjectId,
) -> BoundaryResult<Completion<bool>> {
    let path = match cx.boundary_mut().realm.begin_dispatch(event, target) {
        Ok(path) => path,
        Err(thrown) => return Ok(Err(thrown)),
    };
    let realm = &cx.boundary().realm;
    let event_type = realm
        .event(event)
        .map(|e| e.event_type.clone())
        .unwrap_or_default();
    debug!(%event, %target, %event_type, "dispatch event");

    let mut outcome = Ok(());
    'path: for node in path {
        let listeners = cx.boundary().realm.listeners_for(node, &event_type);
        for listener in listeners {
            let realm = &mut cx.boundary_mut().realm;
            if !realm.has_listener(node, &event_type, listener.callback) {
                continue;
            }
            let consumed = realm.consume_once_listener(node, &listener);
            let result = call_function(cx, &HostValue::Object(listener.callback), event.into());
            let result = match result {
                Ok(completion) if consumed => {
                    release_callback(cx, listener.callback).map(|_| completion)
                }
                other => other,
            };
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(thrown)) => report_exception(cx, &thrown),
                Err(error) => {
                    outcome = Err(error);
                    break 'path;
                }
            }
        }
    }
    let not_cancelled = cx.boundary_mut().realm.end_dispatch(event);
    outcome?;
    Ok(Ok(not_cancelled))
}
