//! Integration tests for the call adapter and the exception channel.
//!
//! Tests validate:
//! - A render entry point builds DOM through handles and leaves no live ones
//! - Host exceptions land in the module's exception slot without trapping
//! - Shims without a slot turn host exceptions into fatal errors
//! - Storage, JSON and property access round-trip through module memory
//! - Handle misuse and module throws surface as structured errors

mod support;

use membrane_abi::capability::*;
use membrane_abi::Handle;
use membrane_guest::layout::{scratch, RET_AREA};
use membrane_host::{HostValue, RealmConfig};
use membrane_runtime::{memory, BoundaryConfig, BoundaryError, ContractViolation};
use support::{load, load_with, read_string, scratch_word, I32};

// ══════════════════════════════════════════════════════════════════════════════
// DOM rendering
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn render_builds_dom_through_handles() {
    let mut guest = support::guest(&[
        GLOBAL_DOCUMENT,
        DOCUMENT_GET_ELEMENT_BY_ID,
        ELEMENT_SET_ATTRIBUTE,
        DOCUMENT_CREATE_TEXT_NODE,
        NODE_APPEND_CHILD,
    ]);
    guest
        .function(Some("render"), &[], &[], &[I32, I32, I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT).local_set(0);
            f.local_get(0)
                .str("app")
                .call_import(&DOCUMENT_GET_ELEMENT_BY_ID)
                .local_set(1);
            f.store_i32(scratch(0), |f| {
                f.local_get(1);
            });
            f.local_get(1)
                .str("class")
                .str("ready")
                .exn()
                .call_import(&ELEMENT_SET_ATTRIBUTE);
            f.store_i32(scratch(1), |f| {
                f.exception_flag();
            });
            f.local_get(0)
                .str("hello")
                .call_import(&DOCUMENT_CREATE_TEXT_NODE)
                .local_set(2);
            f.local_get(1)
                .local_get(2)
                .exn()
                .call_import(&NODE_APPEND_CHILD)
                .call_import(&OBJECT_DROP_REF);
            f.trap_on_exception();
            for local in [2, 1, 0] {
                f.local_get(local).call_import(&OBJECT_DROP_REF);
            }
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());

    let realm = module.realm_mut();
    let app = realm.create_element("div").unwrap();
    realm.set_attribute(app, "id", "app").unwrap();
    let body = realm.body();
    realm.append_child(body, app).unwrap();

    module.call("render").unwrap();

    assert_eq!(scratch_word(&mut module, 0), 5, "#app is the second handle");
    assert_eq!(scratch_word(&mut module, 1), 0, "setAttribute succeeded");
    assert_eq!(
        module.realm().outer_html(app),
        r#"<div id="app" class="ready">hello</div>"#
    );
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn missing_element_is_null_handle() {
    let mut guest = support::guest(&[GLOBAL_DOCUMENT, DOCUMENT_GET_ELEMENT_BY_ID]);
    guest
        .function(Some("find"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT).local_set(0);
            f.store_i32(scratch(0), |f| {
                f.local_get(0)
                    .str("nowhere")
                    .call_import(&DOCUMENT_GET_ELEMENT_BY_ID);
            });
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("find").unwrap();
    assert_eq!(scratch_word(&mut module, 0), Handle::NULL.to_abi());
}

// ══════════════════════════════════════════════════════════════════════════════
// Exception channel
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn wrong_receiver_reports_type_error_through_slot() {
    let mut guest = support::guest(&[GLOBAL_DOCUMENT, ELEMENT_SET_ATTRIBUTE]);
    guest
        .function(Some("probe"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT).local_set(0);
            f.local_get(0)
                .str("class")
                .str("x")
                .exn()
                .call_import(&ELEMENT_SET_ATTRIBUTE);
            f.store_i32(scratch(0), |f| {
                f.exception_flag();
            });
            f.store_i32(scratch(1), |f| {
                f.exception_value();
            });
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("probe").unwrap();

    assert_eq!(scratch_word(&mut module, 0), 1);
    let thrown = scratch_word(&mut module, 1);
    assert_eq!(thrown, 5);
    let value = module.heap().get(Handle::from_abi(thrown)).clone();
    assert_eq!(
        module.realm().error_parts(&value),
        Some(("TypeError", "Illegal invocation"))
    );
    assert_eq!(module.heap().live_count(), 1, "only the thrown value is live");
}

#[test]
fn successful_call_clears_previous_exception() {
    let mut guest = support::guest(&[GLOBAL_DOCUMENT, DOCUMENT_CREATE_ELEMENT]);
    guest
        .function(Some("run"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT).local_set(0);
            f.local_get(0)
                .str("not a tag")
                .exn()
                .call_import(&DOCUMENT_CREATE_ELEMENT)
                .discard();
            f.store_i32(scratch(0), |f| {
                f.exception_flag();
            });
            f.exception_value().call_import(&OBJECT_DROP_REF);
            f.local_get(0)
                .str("p")
                .exn()
                .call_import(&DOCUMENT_CREATE_ELEMENT)
                .call_import(&OBJECT_DROP_REF);
            f.store_i32(scratch(1), |f| {
                f.exception_flag();
            });
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("run").unwrap();
    assert_eq!(scratch_word(&mut module, 0), 1, "invalid tag name throws");
    assert_eq!(scratch_word(&mut module, 1), 0, "next call overwrites the slot");
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn exception_without_slot_is_fatal() {
    let mut guest = support::guest(&[
        GLOBAL_DOCUMENT,
        DOCUMENT_CREATE_ELEMENT,
        HTML_SELECT_ELEMENT_SET_VALUE,
    ]);
    guest
        .function(Some("run"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_DOCUMENT)
                .str("input")
                .exn()
                .call_import(&DOCUMENT_CREATE_ELEMENT)
                .local_set(0);
            f.trap_on_exception();
            f.local_get(0)
                .str("x")
                .call_import(&HTML_SELECT_ELEMENT_SET_VALUE);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    match module.call("run") {
        Err(BoundaryError::UncaughtException { message }) => {
            assert_eq!(message, "TypeError: Illegal invocation");
        }
        other => panic!("expected uncaught exception, got {other:?}"),
    }
}

#[test]
fn module_throw_surfaces_from_entry() {
    let mut guest = support::guest(&[THROW]);
    guest
        .function(Some("fail"), &[], &[], &[], |f| {
            f.str("boom").call_import(&THROW);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    match module.call("fail") {
        Err(BoundaryError::ModuleThrew { message }) => assert_eq!(message, "Error: boom"),
        other => panic!("expected module throw, got {other:?}"),
    }
    assert_eq!(module.store().data().depth(), 0);
}

// ══════════════════════════════════════════════════════════════════════════════
// Values through memory
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn storage_items_round_trip_through_return_area() {
    let mut guest = support::guest(&[
        GLOBAL_WINDOW,
        WINDOW_LOCAL_STORAGE,
        STORAGE_SET_ITEM,
        STORAGE_GET_ITEM,
    ]);
    guest
        .function(Some("run"), &[], &[], &[I32, I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            f.local_get(0)
                .exn()
                .call_import(&WINDOW_LOCAL_STORAGE)
                .local_set(1);
            f.trap_on_exception();
            f.local_get(1)
                .str("theme")
                .str("dark")
                .exn()
                .call_import(&STORAGE_SET_ITEM);
            f.trap_on_exception();
            f.store_i32(scratch(0), |f| {
                f.local_get(1)
                    .str("theme")
                    .ret_area()
                    .exn()
                    .call_import(&STORAGE_GET_ITEM);
            });
            f.store_i32(scratch(1), |f| {
                f.local_get(1)
                    .str("missing")
                    .i32(scratch(2) as i32)
                    .exn()
                    .call_import(&STORAGE_GET_ITEM);
            });
            for local in [1, 0] {
                f.local_get(local).call_import(&OBJECT_DROP_REF);
            }
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("run").unwrap();

    assert_eq!(scratch_word(&mut module, 0), 1);
    assert_eq!(read_string(&mut module, RET_AREA), "dark");
    assert_eq!(scratch_word(&mut module, 1), 0);
    assert_eq!(scratch_word(&mut module, 2), 0);
    assert_eq!(scratch_word(&mut module, 3), 0);

    let realm = module.realm_mut();
    let storage = realm.local_storage().unwrap();
    assert_eq!(
        realm.storage_get_item(storage, "theme").unwrap().as_deref(),
        Some("dark")
    );
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn storage_quota_raises_dom_exception() {
    let mut guest = support::guest(&[GLOBAL_WINDOW, WINDOW_LOCAL_STORAGE, STORAGE_SET_ITEM]);
    guest
        .function(Some("run"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_WINDOW)
                .exn()
                .call_import(&WINDOW_LOCAL_STORAGE)
                .local_set(0);
            f.trap_on_exception();
            f.local_get(0)
                .str("theme")
                .str("dark-mode-on")
                .exn()
                .call_import(&STORAGE_SET_ITEM);
            f.store_i32(scratch(0), |f| {
                f.exception_flag();
            });
            f.store_i32(scratch(1), |f| {
                f.exception_value();
            });
        })
        .unwrap();
    let config = BoundaryConfig {
        realm: RealmConfig {
            storage_quota_bytes: 8,
            ..RealmConfig::default()
        },
        ..BoundaryConfig::default()
    };
    let mut module = load_with(config, guest.finish().unwrap());
    module.call("run").unwrap();

    assert_eq!(scratch_word(&mut module, 0), 1);
    let thrown = scratch_word(&mut module, 1);
    let value = module.heap().get(Handle::from_abi(thrown)).clone();
    assert_eq!(
        module.realm().error_parts(&value).map(|e| e.0),
        Some("QuotaExceededError")
    );
}

#[test]
fn json_and_reflect_share_host_objects() {
    let mut guest = support::guest(&[
        JSON_PARSE,
        JSON_STRINGIFY,
        REFLECT_GET,
        REFLECT_SET,
        NUMBER_GET,
    ]);
    guest
        .function(Some("run"), &[], &[], &[I32, I32], |f| {
            f.str(r#"{"n":2,"s":"x"}"#)
                .exn()
                .call_import(&JSON_PARSE)
                .local_set(0);
            f.trap_on_exception();
            f.local_get(0)
                .str("n")
                .exn()
                .call_import(&REFLECT_GET)
                .local_set(1);
            f.trap_on_exception();
            f.store_i32(scratch(0), |f| {
                f.local_get(1)
                    .i32(scratch(4) as i32)
                    .call_import(&NUMBER_GET);
            });
            f.local_get(1).call_import(&OBJECT_DROP_REF);
            f.local_get(0)
                .str("k")
                .i32(Handle::TRUE.to_abi())
                .exn()
                .call_import(&REFLECT_SET)
                .discard();
            f.trap_on_exception();
            f.store_i32(scratch(1), |f| {
                f.local_get(0)
                    .ret_area()
                    .exn()
                    .call_import(&JSON_STRINGIFY);
            });
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call("run").unwrap();

    assert_eq!(scratch_word(&mut module, 0), 1, "n is a number");
    let n = memory::read_f64(module.store_mut(), scratch(4)).unwrap();
    assert_eq!(n, 2.0);
    assert_eq!(scratch_word(&mut module, 1), 1);
    assert_eq!(
        read_string(&mut module, RET_AREA),
        r#"{"n":2,"s":"x","k":true}"#
    );
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn entry_takes_and_returns_values() {
    let mut guest = support::guest(&[STRING_GET, STRING_NEW]);
    guest
        .function(Some("echo"), &[I32], &[I32], &[], |f| {
            f.local_get(0).ret_area().call_import(&STRING_GET).discard();
            f.local_get(0).call_import(&OBJECT_DROP_REF);
            f.load_i32(RET_AREA)
                .load_i32(RET_AREA + 4)
                .call_import(&STRING_NEW);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    let result = module
        .call_with_value("echo", HostValue::string("héllo"))
        .unwrap();
    assert_eq!(result, HostValue::string("héllo"));
    assert_eq!(module.heap().live_count(), 0);
}

#[test]
fn string_entry_sees_host_text() {
    let mut guest = support::guest(&[CONSOLE_LOG]);
    guest
        .function(Some("log"), &[I32, I32], &[], &[], |f| {
            f.local_get(0).local_get(1).call_import(&CONSOLE_LOG);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    module.call_with_str("log", "from the host").unwrap();
    assert_eq!(
        module
            .realm()
            .console()
            .messages(membrane_host::ConsoleLevel::Log),
        vec!["from the host"]
    );
    assert_eq!(support::freed_bytes(&mut module), "from the host".len() as i32);
}

// ══════════════════════════════════════════════════════════════════════════════
// Contract violations
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn stale_handle_is_contract_violation() {
    let mut guest = support::guest(&[]);
    guest
        .function(Some("run"), &[], &[], &[], |f| {
            f.i32(77).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    match module.call("run") {
        Err(BoundaryError::Contract(violation)) => {
            assert_eq!(violation, ContractViolation::StaleHandle(Handle(77)));
        }
        other => panic!("expected contract violation, got {other:?}"),
    }
}

#[test]
fn double_drop_is_contract_violation() {
    let mut guest = support::guest(&[GLOBAL_WINDOW]);
    guest
        .function(Some("run"), &[], &[], &[I32], |f| {
            f.call_import(&GLOBAL_WINDOW).local_set(0);
            f.local_get(0).call_import(&OBJECT_DROP_REF);
            f.local_get(0).call_import(&OBJECT_DROP_REF);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    match module.call("run") {
        Err(BoundaryError::Contract(violation)) => {
            assert_eq!(violation, ContractViolation::DoubleDrop(Handle(4)));
        }
        other => panic!("expected contract violation, got {other:?}"),
    }
}

#[test]
fn out_of_bounds_string_is_contract_violation() {
    let mut guest = support::guest(&[CONSOLE_LOG]);
    guest
        .function(Some("run"), &[], &[], &[], |f| {
            f.i32(0x7fff_0000).i32(16).call_import(&CONSOLE_LOG);
        })
        .unwrap();
    let mut module = load(guest.finish().unwrap());
    assert!(matches!(
        module.call("run"),
        Err(BoundaryError::Contract(ContractViolation::OutOfBounds { .. }))
    ));
}

#[test]
fn fuel_bounds_runaway_module() {
    let mut guest = support::guest(&[]);
    guest
        .function(Some("spin"), &[], &[], &[], |f| {
            f.instr(&membrane_guest::Instruction::Loop(membrane_guest::BlockType::Empty))
                .instr(&membrane_guest::Instruction::Br(0))
                .instr(&membrane_guest::Instruction::End);
        })
        .unwrap();
    let config = BoundaryConfig {
        fuel: Some(10_000),
        ..BoundaryConfig::default()
    };
    let mut module = load_with(config, guest.finish().unwrap());
    assert!(matches!(module.call("spin"), Err(BoundaryError::OutOfFuel)));
}

#[test]
fn unknown_entry_is_reported() {
    let mut module = load(support::guest(&[]).finish().unwrap());
    assert!(matches!(
        module.call("absent"),
        Err(BoundaryError::MissingEntry(name)) if name == "absent"
    ));
}
