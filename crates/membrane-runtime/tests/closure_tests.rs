//! Integration tests for closures and the event loop.
//!
//! Tests validate:
//! - Listeners are retained by the host and destroyed exactly once
//! - A persistent closure cannot re-enter itself
//! - A single-fire closure rejects a second invocation
//! - Promise reactions, timers and animation frames call back into the module
//! - A throwing callback is reported without stopping dispatch

mod support;

use membrane_abi::capability::*;
use membrane_abi::Handle;
use membrane_guest::layout::scratch;
use membrane_guest::{GuestBuilder, Instruction};
use membrane_host::ConsoleLevel;
use membrane_runtime::{BoundaryError, ClosureState, ContractViolation};
use support::{load, scratch_word, CountingClosure, CALLS, DESTROYED, I32};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Scratch word holding the listener target.
const TARGET: u32 = 2;
/// Scratch word holding the closure handle.
const CLOSURE: u32 = 3;

/// `setup()` creates a `<button>` in the body and listens for `click` with
/// a closure built from `closure`.
fn define_button_setup(guest: &mut GuestBuilder, closure: CountingClosure, once: bool) {
    guest
        .function(Some("setup"), &[], &[], &[I32, I32, I32, I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT).local_set(0);
            f.local_get(0).call_import(&DOCUMENT_BODY).local_set(1);
            f.local_get(0)
                .str("button")
                .exn()
                .call_import(&DOCUMENT_CREATE_ELEMENT)
                .local_set(2);
            f.trap_on_exception();
            f.local_get(1)
                .local_get(2)
                .exn()
                .call_import(&NODE_APPEND_CHILD)
                .call_import(&OBJECT_DROP_REF);
            f.trap_on_exception();
            closure.create(f, once);
            f.local_set(3);
            f.local_get(2)
                .str("click")
                .local_get(3)
                .exn()
                .call_import(&EVENT_TARGET_ADD_EVENT_LISTENER);
            f.trap_on_exception();
            f.store_i32(scratch(TARGET), |f| {
                f.local_get(2);
            });
            f.store_i32(scratch(CLOSURE), |f| {
                f.local_get(3);
            });
            for local in [1, 0] {
                f.local_get(local).call_import(&OBJECT_DROP_REF);
            }
        })
        .unwrap();
}

const BUTTON_CAPS: &[Capability] = &[
    GLOBAL_DOCUMENT,
    DOCUMENT_BODY,
    DOCUMENT_CREATE_ELEMENT,
    NODE_APPEND_CHILD,
    EVENT_TARGET_ADD_EVENT_LISTENER,
    EVENT_TARGET_REMOVE_EVENT_LISTENER,
    HTML_ELEMENT_CLICK,
    CLOSURE_DROP,
    THROW,
];

// ══════════════════════════════════════════════════════════════════════════════
// Listeners
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn click_listener_runs_and_is_destroyed_once() {
    let mut guest = support::guest(BUTTON_CAPS);
    let closure = CountingClosure::define(&mut guest);
    define_button_setup(&mut guest, closure, false);
    guest
        .function(Some("click"), &[], &[], &[], |f| {
            f.load_i32(scratch(TARGET)).call_import(&HTML_ELEMENT_CLICK);
        })
        .unwrap();
    guest
        .function(Some("teardown"), &[], &[], &[], |f| {
            f.load_i32(scratch(TARGET))
                .str("click")
                .load_i32(scratch(CLOSURE))
                .exn()
                .call_import(&EVENT_TARGET_REMOVE_EVENT_LISTENER);
            f.trap_on_exception();
            f.store_i32(scratch(4), |f| {
                f.load_i32(scratch(CLOSURE)).call_import(&CLOSURE_DROP);
            });
            f.load_i32(scratch(TARGET)).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    module.call("setup").unwrap();
    let handle = scratch_word(&mut module, CLOSURE);
    let key = support::closure_key(&module, handle);
    assert_eq!(module.closures().ref_count(key), Some(2), "module and listener");

    module.call("click").unwrap();
    module.call("click").unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 2);

    let target = scratch_word(&mut module, TARGET);
    let button = support::object(&module, target);
    assert!(module.dispatch_event(button, "click").unwrap());
    assert_eq!(scratch_word(&mut module, CALLS), 3);
    assert_eq!(scratch_word(&mut module, DESTROYED), 0);

    module.call("teardown").unwrap();
    assert_eq!(scratch_word(&mut module, 4), 1, "last reference destroyed it");
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);
    assert_eq!(module.closures().state(key), Some(ClosureState::Destroyed));
    assert_eq!(module.closures().live_count(), 0);
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn listener_clicking_its_own_target_is_reentry() {
    let mut guest = support::guest(BUTTON_CAPS);
    let counting = CountingClosure::define(&mut guest);
    let invoke = guest
        .function(None, &[I32, I32, I32], &[I32], &[], |f| {
            f.load_i32(scratch(TARGET)).call_import(&HTML_ELEMENT_CLICK);
            f.local_get(2).call_import(&OBJECT_DROP_REF);
            f.i32(Handle::UNDEFINED.to_abi());
        })
        .unwrap();
    let reentrant = CountingClosure {
        invoke: guest.table_slot(invoke).unwrap() as i32,
        dtor: counting.dtor,
    };
    define_button_setup(&mut guest, reentrant, false);
    guest
        .function(Some("click"), &[], &[], &[], |f| {
            f.load_i32(scratch(TARGET)).call_import(&HTML_ELEMENT_CLICK);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    module.call("setup").unwrap();
    let handle = scratch_word(&mut module, CLOSURE);
    let key = support::closure_key(&module, handle);
    match module.call("click") {
        Err(BoundaryError::Contract(violation)) => {
            assert_eq!(violation, ContractViolation::ClosureReentered(key));
        }
        other => panic!("expected re-entry violation, got {other:?}"),
    }
    assert_eq!(module.closures().state(key), Some(ClosureState::Idle));
    assert_eq!(module.store().data().depth(), 0);
}

#[test]
fn once_closure_rejects_second_invocation() {
    let mut guest = support::guest(BUTTON_CAPS);
    let closure = CountingClosure::define(&mut guest);
    define_button_setup(&mut guest, closure, true);
    let mut module = load(guest.finish().unwrap());

    module.call("setup").unwrap();
    let handle = scratch_word(&mut module, CLOSURE);
    let key = support::closure_key(&module, handle);
    let target = scratch_word(&mut module, TARGET);
    let button = support::object(&module, target);

    assert!(module.dispatch_event(button, "click").unwrap());
    assert_eq!(scratch_word(&mut module, CALLS), 1);
    assert_eq!(module.closures().state(key), Some(ClosureState::Consumed));

    match module.dispatch_event(button, "click") {
        Err(BoundaryError::Contract(violation)) => {
            assert_eq!(violation, ContractViolation::ClosureConsumed(key));
        }
        other => panic!("expected consumed closure, got {other:?}"),
    }
    assert_eq!(scratch_word(&mut module, CALLS), 1);
    assert_eq!(scratch_word(&mut module, DESTROYED), 0);
}

#[test]
fn throwing_listener_is_reported_and_dispatch_continues() {
    let mut guest = support::guest(BUTTON_CAPS);
    let counting = CountingClosure::define(&mut guest);
    let invoke = guest
        .function(None, &[I32, I32, I32], &[I32], &[], |f| {
            f.str("boom").call_import(&THROW);
            f.instr(&Instruction::Unreachable);
        })
        .unwrap();
    let throwing = CountingClosure {
        invoke: guest.table_slot(invoke).unwrap() as i32,
        dtor: counting.dtor,
    };
    define_button_setup(&mut guest, throwing, false);
    guest
        .function(Some("listen_again"), &[], &[], &[I32], |f| {
            counting.create(f, false);
            f.local_set(0);
            f.load_i32(scratch(TARGET))
                .str("click")
                .local_get(0)
                .exn()
                .call_import(&EVENT_TARGET_ADD_EVENT_LISTENER);
            f.trap_on_exception();
            f.local_get(0).call_import(&CLOSURE_DROP).discard();
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    module.call("setup").unwrap();
    module.call("listen_again").unwrap();
    let target = scratch_word(&mut module, TARGET);
    let button = support::object(&module, target);

    assert!(module.dispatch_event(button, "click").unwrap());
    assert_eq!(
        module.realm().console().messages(ConsoleLevel::Error),
        vec!["Uncaught Error: boom"]
    );
    assert_eq!(scratch_word(&mut module, CALLS), 1, "second listener still ran");
}

// ══════════════════════════════════════════════════════════════════════════════
// Event loop
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn fetch_reaction_receives_response() {
    let mut guest = support::guest(&[
        GLOBAL_WINDOW,
        WINDOW_FETCH,
        PROMISE_THEN,
        RESPONSE_STATUS,
        CLOSURE_DROP,
    ]);
    let counting = CountingClosure::define(&mut guest);
    let invoke = guest
        .function(None, &[I32, I32, I32], &[I32], &[], |f| {
            f.increment_i32(scratch(CALLS), 1);
            f.store_i32(scratch(2), |f| {
                f.local_get(2).call_import(&RESPONSE_STATUS);
            });
            f.local_get(2).call_import(&OBJECT_DROP_REF);
            f.i32(Handle::UNDEFINED.to_abi());
        })
        .unwrap();
    let on_response = CountingClosure {
        invoke: guest.table_slot(invoke).unwrap() as i32,
        dtor: counting.dtor,
    };
    guest
        .function(Some("start"), &[], &[], &[I32, I32, I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            f.local_get(0)
                .str("/api/items")
                .call_import(&WINDOW_FETCH)
                .local_set(1);
            on_response.create(f, false);
            f.local_set(2);
            f.local_get(1)
                .local_get(2)
                .i32(Handle::NULL.to_abi())
                .call_import(&PROMISE_THEN)
                .call_import(&OBJECT_DROP_REF);
            f.local_get(2).call_import(&CLOSURE_DROP).discard();
            for local in [1, 0] {
                f.local_get(local).call_import(&OBJECT_DROP_REF);
            }
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module
        .realm_mut()
        .network_mut()
        .route("http://localhost/api/items", 201, "[]");

    module.call("start").unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 0, "fetch settles on a task");
    assert_eq!(module.realm().event_loop().pending_tasks(), 1);

    module.run_until_idle().unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 1);
    assert_eq!(scratch_word(&mut module, 2), 201);
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);
    assert_eq!(module.closures().live_count(), 0);
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn reactions_wait_for_outermost_call() {
    let mut guest = support::guest(&[PROMISE_RESOLVE, PROMISE_THEN, CLOSURE_DROP]);
    let closure = CountingClosure::define(&mut guest);
    guest
        .function(Some("run"), &[], &[], &[I32, I32], |f| {
            f.i32(Handle::UNDEFINED.to_abi())
                .call_import(&PROMISE_RESOLVE)
                .local_set(0);
            closure.create(f, false);
            f.local_set(1);
            f.local_get(0)
                .local_get(1)
                .i32(Handle::NULL.to_abi())
                .call_import(&PROMISE_THEN)
                .call_import(&OBJECT_DROP_REF);
            f.store_i32(scratch(2), |f| {
                f.load_i32(scratch(CALLS));
            });
            f.local_get(1).call_import(&CLOSURE_DROP).discard();
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("run").unwrap();
    assert_eq!(scratch_word(&mut module, 2), 0, "not run during the call");
    assert_eq!(scratch_word(&mut module, CALLS), 1, "run at the checkpoint");
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);
}

fn timer_module() -> GuestBuilder {
    let mut guest = support::guest(&[
        GLOBAL_WINDOW,
        WINDOW_SET_TIMEOUT,
        WINDOW_CLEAR_TIMEOUT,
        WINDOW_REQUEST_ANIMATION_FRAME,
        CLOSURE_DROP,
    ]);
    let closure = CountingClosure::define(&mut guest);
    guest
        .function(Some("schedule"), &[], &[], &[I32, I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            closure.create(f, false);
            f.local_set(1);
            f.store_i32(scratch(2), |f| {
                f.local_get(0)
                    .local_get(1)
                    .i32(100)
                    .exn()
                    .call_import(&WINDOW_SET_TIMEOUT);
            });
            f.trap_on_exception();
            f.local_get(1).call_import(&CLOSURE_DROP).discard();
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    guest
        .function(Some("cancel"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            f.local_get(0)
                .load_i32(scratch(2))
                .call_import(&WINDOW_CLEAR_TIMEOUT);
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    guest
        .function(Some("next_frame"), &[], &[], &[I32, I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            closure.create(f, false);
            f.local_set(1);
            f.local_get(0)
                .local_get(1)
                .exn()
                .call_import(&WINDOW_REQUEST_ANIMATION_FRAME)
                .discard();
            f.trap_on_exception();
            f.local_get(1).call_import(&CLOSURE_DROP).discard();
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    guest
}

#[test]
fn timeout_fires_when_due() {
    let mut module = load(timer_module().finish().unwrap());
    module.call("schedule").unwrap();
    assert_eq!(scratch_word(&mut module, 2), 1, "first timer id");

    module.advance_time(99).unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 0);
    module.advance_time(1).unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 1);
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);
    assert_eq!(module.realm().event_loop().pending_timers(), 0);
    assert_eq!(module.closures().live_count(), 0);
}

#[test]
fn cleared_timeout_releases_callback() {
    let mut module = load(timer_module().finish().unwrap());
    module.call("schedule").unwrap();
    module.call("cancel").unwrap();
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);

    module.advance_time(1_000).unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 0);
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn animation_frame_fires_once() {
    let mut module = load(timer_module().finish().unwrap());
    module.call("next_frame").unwrap();
    module.animation_frame(16.0).unwrap();
    module.animation_frame(32.0).unwrap();
    assert_eq!(scratch_word(&mut module, CALLS), 1);
    assert_eq!(scratch_word(&mut module, DESTROYED), 1);
    assert_eq!(module.heap().live_count(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Lifecycle
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn destroyed_closures_free_their_slots() {
    let mut guest = support::guest(&[CLOSURE_DROP]);
    let closure = CountingClosure::define(&mut guest);
    guest
        .function(Some("churn"), &[], &[], &[], |f| {
            closure.create(f, false);
            f.call_import(&CLOSURE_DROP).discard();
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    for _ in 0..1_000 {
        module.call("churn").unwrap();
    }
    assert_eq!(scratch_word(&mut module, DESTROYED), 1_000);
    assert_eq!(module.closures().live_count(), 0);
    assert_eq!(module.closures().slot_count(), 1);
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn dropping_a_closure_handle_twice_keeps_the_count() {
    let mut guest = support::guest(&[CLOSURE_RETAIN, CLOSURE_DROP]);
    let closure = CountingClosure::define(&mut guest);
    guest
        .function(Some("setup"), &[], &[], &[I32], |f| {
            closure.create(f, false);
            f.local_tee(0).call_import(&CLOSURE_RETAIN);
            f.store_i32(scratch(CLOSURE), |f| {
                f.local_get(0);
            });
        })
        .unwrap();
    guest
        .function(Some("drop"), &[], &[], &[], |f| {
            f.store_i32(scratch(4), |f| {
                f.load_i32(scratch(CLOSURE)).call_import(&CLOSURE_DROP);
            });
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    module.call("setup").unwrap();
    let handle = scratch_word(&mut module, CLOSURE);
    let key = support::closure_key(&module, handle);
    assert_eq!(module.closures().ref_count(key), Some(2));

    module.call("drop").unwrap();
    assert_eq!(scratch_word(&mut module, 4), 0, "still retained");
    match module.call("drop") {
        Err(BoundaryError::Contract(violation)) => {
            assert_eq!(violation, ContractViolation::StaleHandle(Handle::from_abi(handle)));
        }
        other => panic!("expected stale handle, got {other:?}"),
    }
    assert_eq!(module.closures().ref_count(key), Some(1));
    assert_eq!(scratch_word(&mut module, DESTROYED), 0);
}
