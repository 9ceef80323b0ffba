//! Window-level capabilities: console, JSON, objects, timers, fetch,
//! storage and promises.

use membrane_abi::capability::*;
use membrane_host::{Completion, ConsoleLevel, Interface, ObjectId, Realm};
use wasmi::Caller;

use super::{
    boxed, fallible, infallible, object_arg, receiver, string_arg, value, write_string, Registrar,
    ShimResult,
};
use crate::context::{Boundary, BoundaryCx};
use crate::error::LoadError;
use crate::invoke;

type Cx<'a> = Caller<'a, Boundary>;

fn console<C: BoundaryCx>(cx: &mut C, level: ConsoleLevel, ptr: i32, len: i32) -> ShimResult<()> {
    let message = string_arg(cx, ptr, len)?;
    cx.boundary_mut().realm.console_mut().write(level, message);
    Ok(())
}

/// A callback argument, retained by the host on success.
fn callback<C: BoundaryCx>(cx: &mut C, raw: i32, context: &str) -> ShimResult<ObjectId> {
    let callback = object_arg(cx, raw, Interface::Function, context)?;
    invoke::retain_callback(cx, callback)?;
    Ok(callback)
}

/// A `then` handler: functions are kept, anything else is ignored.
fn handler<C: BoundaryCx>(cx: &mut C, raw: i32) -> ShimResult<Option<ObjectId>> {
    let value = value(cx, raw)?;
    if !cx.boundary().realm.is_function(&value) {
        return Ok(None);
    }
    let id = value.as_object();
    if let Some(id) = id {
        invoke::retain_callback(cx, id)?;
    }
    Ok(id)
}

fn storage<C: BoundaryCx>(
    cx: &mut C,
    window: i32,
    getter: fn(&mut Realm) -> Completion<ObjectId>,
) -> ShimResult<i32> {
    receiver(cx, window, Interface::Window)?;
    let area = getter(&mut cx.boundary_mut().realm)?;
    Ok(boxed(cx, area))
}

pub(super) fn register(r: &mut Registrar<'_>) -> Result<(), LoadError> {
    // ── console ─────────────────────────────────────────────────────────────
    r.shim(&CONSOLE_LOG, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| console(cx, ConsoleLevel::Log, ptr, len))
    })?;
    r.shim(&CONSOLE_WARN, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| console(cx, ConsoleLevel::Warn, ptr, len))
    })?;
    r.shim(&CONSOLE_ERROR, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| console(cx, ConsoleLevel::Error, ptr, len))
    })?;

    // ── JSON / Object / Reflect / Error ─────────────────────────────────────
    r.shim(&JSON_PARSE, |mut caller: Cx<'_>, ptr: i32, len: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let text = string_arg(cx, ptr, len)?;
            let parsed = cx.boundary_mut().realm.json_parse(&text)?;
            Ok(boxed(cx, parsed))
        })
    })?;
    r.shim(&JSON_STRINGIFY, |mut caller: Cx<'_>, h: i32, ret: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let value = value(cx, h)?;
            let text = cx.boundary_mut().realm.json_stringify(&value)?;
            write_string(cx, ret, text)
        })
    })?;
    r.shim(&OBJECT_NEW, |mut caller: Cx<'_>| {
        infallible(&mut caller, |cx| {
            let object = cx.boundary_mut().realm.new_object();
            Ok(boxed(cx, object))
        })
    })?;
    r.shim(
        &REFLECT_GET,
        |mut caller: Cx<'_>, target: i32, ptr: i32, len: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let target = value(cx, target)?;
                let key = string_arg(cx, ptr, len)?;
                let result = cx.boundary_mut().realm.get_property(&target, &key)?;
                Ok(boxed(cx, result))
            })
        },
    )?;
    r.shim(
        &REFLECT_SET,
        |mut caller: Cx<'_>, target: i32, ptr: i32, len: i32, v: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let target = value(cx, target)?;
                let key = string_arg(cx, ptr, len)?;
                let v = value(cx, v)?;
                Ok(cx.boundary_mut().realm.set_property(&target, &key, v)? as i32)
            })
        },
    )?;
    r.shim(&ERROR_NEW, |mut caller: Cx<'_>, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| {
            let message = string_arg(cx, ptr, len)?;
            let error = cx.boundary_mut().realm.new_error("Error", &message);
            Ok(boxed(cx, error))
        })
    })?;

    // ── Window ──────────────────────────────────────────────────────────────
    r.shim(&WINDOW_DOCUMENT, |mut caller: Cx<'_>, window: i32| {
        infallible(&mut caller, |cx| {
            receiver(cx, window, Interface::Window)?;
            let document = cx.boundary().realm.document();
            Ok(boxed(cx, document))
        })
    })?;
    r.shim(&WINDOW_LOCAL_STORAGE, |mut caller: Cx<'_>, window: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| storage(cx, window, Realm::local_storage))
    })?;
    r.shim(&WINDOW_SESSION_STORAGE, |mut caller: Cx<'_>, window: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| storage(cx, window, Realm::session_storage))
    })?;
    r.shim(
        &WINDOW_SET_TIMEOUT,
        |mut caller: Cx<'_>, window: i32, cb: i32, delay: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                receiver(cx, window, Interface::Window)?;
                let cb = callback(cx, cb, "Failed to execute 'setTimeout' on 'Window'")?;
                let id = cx.boundary_mut().realm.event_loop_mut().set_timeout(cb, delay);
                Ok(id as i32)
            })
        },
    )?;
    r.shim(&WINDOW_CLEAR_TIMEOUT, |mut caller: Cx<'_>, window: i32, id: i32| {
        infallible(&mut caller, |cx| {
            receiver(cx, window, Interface::Window)?;
            let timer = cx.boundary_mut().realm.event_loop_mut().clear_timeout(id as u32);
            if let Some(timer) = timer {
                invoke::release_callback(cx, timer.callback)?;
            }
            Ok(())
        })
    })?;
    r.shim(
        &WINDOW_REQUEST_ANIMATION_FRAME,
        |mut caller: Cx<'_>, window: i32, cb: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                receiver(cx, window, Interface::Window)?;
                let cb = callback(
                    cx,
                    cb,
                    "Failed to execute 'requestAnimationFrame' on 'Window'",
                )?;
                let id = cx
                    .boundary_mut()
                    .realm
                    .event_loop_mut()
                    .request_animation_frame(cb);
                Ok(id as i32)
            })
        },
    )?;
    r.shim(
        &WINDOW_CANCEL_ANIMATION_FRAME,
        |mut caller: Cx<'_>, window: i32, id: i32| {
            infallible(&mut caller, |cx| {
                receiver(cx, window, Interface::Window)?;
                let cancelled = cx
                    .boundary_mut()
                    .realm
                    .event_loop_mut()
                    .cancel_animation_frame(id as u32);
                if let Some(callback) = cancelled {
                    invoke::release_callback(cx, callback)?;
                }
                Ok(())
            })
        },
    )?;
    r.shim(&WINDOW_FETCH, |mut caller: Cx<'_>, window: i32, ptr: i32, len: i32| {
        infallible(&mut caller, |cx| {
            receiver(cx, window, Interface::Window)?;
            let url = string_arg(cx, ptr, len)?;
            let promise = cx.boundary_mut().realm.fetch(&url);
            Ok(boxed(cx, promise))
        })
    })?;

    // ── Storage ─────────────────────────────────────────────────────────────
    r.shim(
        &STORAGE_GET_ITEM,
        |mut caller: Cx<'_>, s: i32, ptr: i32, len: i32, ret: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let s = receiver(cx, s, Interface::Storage)?;
                let key = string_arg(cx, ptr, len)?;
                let item = cx.boundary_mut().realm.storage_get_item(s, &key)?;
                write_string(cx, ret, item)
            })
        },
    )?;
    r.shim(
        &STORAGE_SET_ITEM,
        |mut caller: Cx<'_>, s: i32, kp: i32, kl: i32, vp: i32, vl: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let s = receiver(cx, s, Interface::Storage)?;
                let key = string_arg(cx, kp, kl)?;
                let item = string_arg(cx, vp, vl)?;
                Ok(cx.boundary_mut().realm.storage_set_item(s, &key, &item)?)
            })
        },
    )?;
    r.shim(
        &STORAGE_REMOVE_ITEM,
        |mut caller: Cx<'_>, s: i32, ptr: i32, len: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let s = receiver(cx, s, Interface::Storage)?;
                let key = string_arg(cx, ptr, len)?;
                Ok(cx.boundary_mut().realm.storage_remove_item(s, &key)?)
            })
        },
    )?;
    r.shim(&STORAGE_CLEAR, |mut caller: Cx<'_>, s: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let s = receiver(cx, s, Interface::Storage)?;
            Ok(cx.boundary_mut().realm.storage_clear(s)?)
        })
    })?;
    r.shim(&STORAGE_LENGTH, |mut caller: Cx<'_>, s: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let s = receiver(cx, s, Interface::Storage)?;
            Ok(cx.boundary_mut().realm.storage_length(s)? as i32)
        })
    })?;

    // ── Promise / Response ──────────────────────────────────────────────────
    r.shim(&PROMISE_RESOLVE, |mut caller: Cx<'_>, v: i32| {
        infallible(&mut caller, |cx| {
            let v = value(cx, v)?;
            let promise = cx.boundary_mut().realm.promise_resolve(v);
            Ok(boxed(cx, promise))
        })
    })?;
    r.shim(&PROMISE_REJECT, |mut caller: Cx<'_>, v: i32| {
        infallible(&mut caller, |cx| {
            let v = value(cx, v)?;
            let promise = cx.boundary_mut().realm.promise_reject(v);
            Ok(boxed(cx, promise))
        })
    })?;
    r.shim(
        &PROMISE_THEN,
        |mut caller: Cx<'_>, p: i32, on_fulfilled: i32, on_rejected: i32| {
            infallible(&mut caller, |cx| {
                let p = receiver(cx, p, Interface::Promise)?;
                let on_fulfilled = handler(cx, on_fulfilled)?;
                let on_rejected = handler(cx, on_rejected)?;
                let derived = cx
                    .boundary_mut()
                    .realm
                    .promise_then(p, on_fulfilled, on_rejected);
                Ok(boxed(cx, derived))
            })
        },
    )?;
    r.shim(&RESPONSE_STATUS, |mut caller: Cx<'_>, response: i32| {
        infallible(&mut caller, |cx| {
            let response = receiver(cx, response, Interface::Response)?;
            let realm = &cx.boundary().realm;
            Ok(realm.response(response).map_or(0, |r| i32::from(r.status)))
        })
    })?;
    r.shim(&RESPONSE_OK, |mut caller: Cx<'_>, response: i32| {
        infallible(&mut caller, |cx| {
            let response = receiver(cx, response, Interface::Response)?;
            let realm = &cx.boundary().realm;
            Ok(realm.response(response).is_some_and(|r| r.ok()) as i32)
        })
    })?;
    r.shim(&RESPONSE_TEXT, |mut caller: Cx<'_>, response: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let response = receiver(cx, response, Interface::Response)?;
            let promise = cx.boundary_mut().realm.response_text(response);
            Ok(boxed(cx, promise))
        })
    })?;
    r.shim(&RESPONSE_JSON, |mut caller: Cx<'_>, response: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let response = receiver(cx, response, Interface::Response)?;
            let promise = cx.boundary_mut().realm.response_json(response);
            Ok(boxed(cx, promise))
        })
    })?;
    Ok(())
}
