//! DOM capabilities: document, nodes, elements, form controls and events.

use membrane_abi::capability::*;
use membrane_abi::Handle;
use membrane_host::{Interface, ObjectId};
use wasmi::Caller;

use super::{
    boxed, fallible, infallible, object_arg, optional_object, receiver, string_arg, value,
    write_string, Registrar, ShimResult,
};
use crate::context::{Boundary, BoundaryCx};
use crate::error::LoadError;
use crate::invoke;

type Cx<'a> = Caller<'a, Boundary>;

fn control_value<C: BoundaryCx>(cx: &mut C, raw: i32, iface: Interface, ret: i32) -> ShimResult<()> {
    let id = receiver(cx, raw, iface)?;
    let text = cx.boundary().realm.control_value(id);
    write_string(cx, ret, text).map(drop)
}

fn set_control_value<C: BoundaryCx>(
    cx: &mut C,
    raw: i32,
    iface: Interface,
    ptr: i32,
    len: i32,
) -> ShimResult<()> {
    let id = receiver(cx, raw, iface)?;
    let text = string_arg(cx, ptr, len)?;
    cx.boundary_mut().realm.set_control_value(id, &text);
    Ok(())
}

fn instance_of<C: BoundaryCx>(cx: &mut C, raw: i32, iface: Interface) -> ShimResult<i32> {
    let value = value(cx, raw)?;
    Ok(cx.boundary().realm.instance_of(&value, iface) as i32)
}

/// A new handle for an optional object; absent is the null handle.
fn boxed_or_null<C: BoundaryCx>(cx: &mut C, object: Option<ObjectId>) -> i32 {
    object.map_or(Handle::NULL.to_abi(), |id| boxed(cx, id))
}

pub(super) fn register(r: &mut Registrar<'_>) -> Result<(), LoadError> {
    // ── Document ────────────────────────────────────────────────────────────
    r.shim(
        &DOCUMENT_GET_ELEMENT_BY_ID,
        |mut caller: Cx<'_>, d: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                receiver(cx, d, Interface::Document)?;
                let element_id = string_arg(cx, ptr, len)?;
                let found = cx.boundary().realm.get_element_by_id(&element_id);
                Ok(boxed_or_null(cx, found))
            })
        },
    )?;
    r.shim(
        &DOCUMENT_CREATE_ELEMENT,
        |mut caller: Cx<'_>, d: i32, ptr: i32, len: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                receiver(cx, d, Interface::Document)?;
                let tag = string_arg(cx, ptr, len)?;
                let element = cx.boundary_mut().realm.create_element(&tag)?;
                Ok(boxed(cx, element))
            })
        },
    )?;
    r.shim(
        &DOCUMENT_CREATE_TEXT_NODE,
        |mut caller: Cx<'_>, d: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                receiver(cx, d, Interface::Document)?;
                let text = string_arg(cx, ptr, len)?;
                let node = cx.boundary_mut().realm.create_text_node(&text);
                Ok(boxed(cx, node))
            })
        },
    )?;
    r.shim(&DOCUMENT_BODY, |mut caller: Cx<'_>, d: i32| {
        infallible(&mut caller, |cx| {
            receiver(cx, d, Interface::Document)?;
            let body = cx.boundary().realm.body();
            Ok(boxed(cx, body))
        })
    })?;

    // ── Node ────────────────────────────────────────────────────────────────
    r.shim(&NODE_APPEND_CHILD, |mut caller: Cx<'_>, parent: i32, child: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let parent = receiver(cx, parent, Interface::Node)?;
            let child = object_arg(
                cx,
                child,
                Interface::Node,
                "Failed to execute 'appendChild' on 'Node'",
            )?;
            let appended = cx.boundary_mut().realm.append_child(parent, child)?;
            Ok(boxed(cx, appended))
        })
    })?;
    r.shim(&NODE_REMOVE_CHILD, |mut caller: Cx<'_>, parent: i32, child: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let parent = receiver(cx, parent, Interface::Node)?;
            let child = object_arg(
                cx,
                child,
                Interface::Node,
                "Failed to execute 'removeChild' on 'Node'",
            )?;
            let removed = cx.boundary_mut().realm.remove_child(parent, child)?;
            Ok(boxed(cx, removed))
        })
    })?;
    r.shim(
        &NODE_INSERT_BEFORE,
        |mut caller: Cx<'_>, parent: i32, node: i32, reference: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                const CONTEXT: &str = "Failed to execute 'insertBefore' on 'Node'";
                let parent = receiver(cx, parent, Interface::Node)?;
                let node = object_arg(cx, node, Interface::Node, CONTEXT)?;
                let reference = optional_object(cx, reference, Interface::Node, CONTEXT)?;
                let inserted = cx
                    .boundary_mut()
                    .realm
                    .insert_before(parent, node, reference)?;
                Ok(boxed(cx, inserted))
            })
        },
    )?;
    r.shim(&NODE_GET_TEXT_CONTENT, |mut caller: Cx<'_>, node: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let node = receiver(cx, node, Interface::Node)?;
            let text = cx.boundary().realm.text_content(node);
            write_string(cx, ret, text)
        })
    })?;
    r.shim(
        &NODE_SET_TEXT_CONTENT,
        |mut caller: Cx<'_>, node: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                let node = receiver(cx, node, Interface::Node)?;
                let text = string_arg(cx, ptr, len)?;
                cx.boundary_mut().realm.set_text_content(node, &text);
                Ok(())
            })
        },
    )?;
    r.shim(&NODE_PARENT_NODE, |mut caller: Cx<'_>, node: i32| {
        infallible(&mut caller, |cx| {
            let node = receiver(cx, node, Interface::Node)?;
            let parent = cx.boundary().realm.parent_node(node);
            Ok(boxed_or_null(cx, parent))
        })
    })?;
    r.shim(&NODE_FIRST_CHILD, |mut caller: Cx<'_>, node: i32| {
        infallible(&mut caller, |cx| {
            let node = receiver(cx, node, Interface::Node)?;
            let child = cx.boundary().realm.first_child(node);
            Ok(boxed_or_null(cx, child))
        })
    })?;

    // ── Element ─────────────────────────────────────────────────────────────
    r.shim(
        &ELEMENT_SET_ATTRIBUTE,
        |mut caller: Cx<'_>, el: i32, np: i32, nl: i32, vp: i32, vl: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let el = receiver(cx, el, Interface::Element)?;
                let name = string_arg(cx, np, nl)?;
                let value = string_arg(cx, vp, vl)?;
                Ok(cx.boundary_mut().realm.set_attribute(el, &name, &value)?)
            })
        },
    )?;
    r.shim(
        &ELEMENT_GET_ATTRIBUTE,
        |mut caller: Cx<'_>, el: i32, ptr: i32, len: i32, ret: i32| {
            infallible(&mut caller, |cx| {
                let el = receiver(cx, el, Interface::Element)?;
                let name = string_arg(cx, ptr, len)?;
                let value = cx.boundary().realm.get_attribute(el, &name);
                write_string(cx, ret, value)
            })
        },
    )?;
    r.shim(
        &ELEMENT_REMOVE_ATTRIBUTE,
        |mut caller: Cx<'_>, el: i32, ptr: i32, len: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let el = receiver(cx, el, Interface::Element)?;
                let name = string_arg(cx, ptr, len)?;
                Ok(cx.boundary_mut().realm.remove_attribute(el, &name)?)
            })
        },
    )?;
    r.shim(&ELEMENT_ID, |mut caller: Cx<'_>, el: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let el = receiver(cx, el, Interface::Element)?;
            let element_id = cx.boundary().realm.element_id(el);
            write_string(cx, ret, Some(element_id)).map(drop)
        })
    })?;
    r.shim(&ELEMENT_TAG_NAME, |mut caller: Cx<'_>, el: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let el = receiver(cx, el, Interface::Element)?;
            let tag = cx.boundary().realm.tag_name(el);
            write_string(cx, ret, tag).map(drop)
        })
    })?;
    r.shim(&HTML_ELEMENT_CLICK, |mut caller: Cx<'_>, el: i32| {
        infallible(&mut caller, |cx| {
            let el = receiver(cx, el, Interface::HTMLElement)?;
            let realm = &mut cx.boundary_mut().realm;
            realm.click_activation(el);
            let event = realm.create_event("click", true, true);
            invoke::dispatch(cx, event, el)??;
            Ok(())
        })
    })?;

    // ── Form controls ───────────────────────────────────────────────────────
    r.shim(&HTML_INPUT_ELEMENT_GET_VALUE, |mut caller: Cx<'_>, el: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            control_value(cx, el, Interface::HTMLInputElement, ret)
        })
    })?;
    r.shim(
        &HTML_INPUT_ELEMENT_SET_VALUE,
        |mut caller: Cx<'_>, el: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                set_control_value(cx, el, Interface::HTMLInputElement, ptr, len)
            })
        },
    )?;
    r.shim(&HTML_INPUT_ELEMENT_GET_CHECKED, |mut caller: Cx<'_>, el: i32| {
        infallible(&mut caller, |cx| {
            let el = receiver(cx, el, Interface::HTMLInputElement)?;
            Ok(cx.boundary().realm.checked(el) as i32)
        })
    })?;
    r.shim(
        &HTML_INPUT_ELEMENT_SET_CHECKED,
        |mut caller: Cx<'_>, el: i32, checked: i32| {
            infallible(&mut caller, |cx| {
                let el = receiver(cx, el, Interface::HTMLInputElement)?;
                cx.boundary_mut().realm.set_checked(el, checked != 0);
                Ok(())
            })
        },
    )?;
    r.shim(&HTML_SELECT_ELEMENT_GET_VALUE, |mut caller: Cx<'_>, el: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            control_value(cx, el, Interface::HTMLSelectElement, ret)
        })
    })?;
    r.shim(
        &HTML_SELECT_ELEMENT_SET_VALUE,
        |mut caller: Cx<'_>, el: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                set_control_value(cx, el, Interface::HTMLSelectElement, ptr, len)
            })
        },
    )?;
    r.shim(
        &HTML_TEXT_AREA_ELEMENT_GET_VALUE,
        |mut caller: Cx<'_>, el: i32, ret: i32| {
            infallible(&mut caller, |cx| {
                control_value(cx, el, Interface::HTMLTextAreaElement, ret)
            })
        },
    )?;
    r.shim(
        &HTML_TEXT_AREA_ELEMENT_SET_VALUE,
        |mut caller: Cx<'_>, el: i32, ptr: i32, len: i32| {
            infallible(&mut caller, |cx| {
                set_control_value(cx, el, Interface::HTMLTextAreaElement, ptr, len)
            })
        },
    )?;

    // ── Events ──────────────────────────────────────────────────────────────
    r.shim(
        &EVENT_TARGET_ADD_EVENT_LISTENER,
        |mut caller: Cx<'_>, target: i32, ptr: i32, len: i32, cb: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let target = receiver(cx, target, Interface::EventTarget)?;
                let event_type = string_arg(cx, ptr, len)?;
                let cb = object_arg(
                    cx,
                    cb,
                    Interface::Function,
                    "Failed to execute 'addEventListener' on 'EventTarget'",
                )?;
                let added = cx
                    .boundary_mut()
                    .realm
                    .add_event_listener(target, &event_type, cb, false)?;
                if added {
                    invoke::retain_callback(cx, cb)?;
                }
                Ok(())
            })
        },
    )?;
    r.shim(
        &EVENT_TARGET_REMOVE_EVENT_LISTENER,
        |mut caller: Cx<'_>, target: i32, ptr: i32, len: i32, cb: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let target = receiver(cx, target, Interface::EventTarget)?;
                let event_type = string_arg(cx, ptr, len)?;
                let Some(cb) = value(cx, cb)?.as_object() else {
                    return Ok(());
                };
                let removed = cx
                    .boundary_mut()
                    .realm
                    .remove_event_listener(target, &event_type, cb)?;
                if removed {
                    invoke::release_callback(cx, cb)?;
                }
                Ok(())
            })
        },
    )?;
    r.shim(
        &EVENT_TARGET_DISPATCH_EVENT,
        |mut caller: Cx<'_>, target: i32, event: i32, exn: i32| {
            fallible(&mut caller, exn, |cx| {
                let target = receiver(cx, target, Interface::EventTarget)?;
                let event = object_arg(
                    cx,
                    event,
                    Interface::Event,
                    "Failed to execute 'dispatchEvent' on 'EventTarget'",
                )?;
                let not_cancelled = invoke::dispatch(cx, event, target)??;
                Ok(not_cancelled as i32)
            })
        },
    )?;
    r.shim(&EVENT_NEW, |mut caller: Cx<'_>, ptr: i32, len: i32, exn: i32| {
        fallible(&mut caller, exn, |cx| {
            let event_type = string_arg(cx, ptr, len)?;
            let event = cx
                .boundary_mut()
                .realm
                .create_event(&event_type, false, false);
            Ok(boxed(cx, event))
        })
    })?;
    r.shim(&EVENT_TYPE, |mut caller: Cx<'_>, event: i32, ret: i32| {
        infallible(&mut caller, |cx| {
            let event = receiver(cx, event, Interface::Event)?;
            let event_type = cx
                .boundary()
                .realm
                .event(event)
                .map(|e| e.event_type.clone());
            write_string(cx, ret, event_type).map(drop)
        })
    })?;
    r.shim(&EVENT_TARGET, |mut caller: Cx<'_>, event: i32| {
        infallible(&mut caller, |cx| {
            let event = receiver(cx, event, Interface::Event)?;
            let target = cx.boundary().realm.event(event).and_then(|e| e.target);
            Ok(boxed_or_null(cx, target))
        })
    })?;
    r.shim(&EVENT_PREVENT_DEFAULT, |mut caller: Cx<'_>, event: i32| {
        infallible(&mut caller, |cx| {
            let event = receiver(cx, event, Interface::Event)?;
            cx.boundary_mut().realm.prevent_default(event);
            Ok(())
        })
    })?;
    r.shim(&EVENT_DEFAULT_PREVENTED, |mut caller: Cx<'_>, event: i32| {
        infallible(&mut caller, |cx| {
            let event = receiver(cx, event, Interface::Event)?;
            let realm = &cx.boundary().realm;
            Ok(realm.event(event).is_some_and(|e| e.default_prevented) as i32)
        })
    })?;

    // ── instanceof ──────────────────────────────────────────────────────────
    let checks = [
        (&ELEMENT_INSTANCEOF, Interface::Element),
        (&HTML_INPUT_ELEMENT_INSTANCEOF, Interface::HTMLInputElement),
        (&HTML_SELECT_ELEMENT_INSTANCEOF, Interface::HTMLSelectElement),
        (&HTML_TEXT_AREA_ELEMENT_INSTANCEOF, Interface::HTMLTextAreaElement),
        (&EVENT_INSTANCEOF, Interface::Event),
        (&ERROR_INSTANCEOF, Interface::Error),
        (&PROMISE_INSTANCEOF, Interface::Promise),
    ];
    for (cap, iface) in checks {
        r.shim(cap, move |mut caller: Cx<'_>, h: i32| {
            infallible(&mut caller, |cx| instance_of(cx, h, iface))
        })?;
    }
    Ok(())
}
