//! The host capability catalogue.
//!
//! Every host operation a module may invoke is one [`Capability`]: a
//! `(interface, member, kind)` triple with a fixed numeric signature. The
//! import name is derived from the triple, so two interfaces exposing a
//! member of the same name (`value` on `HTMLInputElement` and on
//! `HTMLSelectElement`) are bound to independent imports.
//!
//! # Argument conventions
//!
//! - receivers and object arguments are handles (`i32`)
//! - strings are two arguments: `ptr, len`
//! - string results are written to a return area (`ret`) as `ptr, len`;
//!   the shim returns 1 when a string was written and 0 when absent
//! - capabilities that can throw take the exception slot pointer as their
//!   last argument (marked `; exn` below)

/// A wasm value type used in capability signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiType {
    I32,
    F64,
}

/// What kind of host member a capability binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Boundary intrinsic, not tied to a host interface.
    Intrinsic,
    /// Interface-level function with no receiver (`JSON.parse`).
    Static,
    /// Instance method; first argument is the receiver.
    Method,
    /// Property read; first argument is the receiver.
    Getter,
    /// Property write; first argument is the receiver.
    Setter,
    /// `new Interface(...)`.
    Constructor,
    /// `value instanceof Interface`.
    InstanceOf,
}

/// One importable host capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub interface: &'static str,
    pub member: &'static str,
    pub kind: MemberKind,
    pub params: &'static [AbiType],
    pub result: Option<AbiType>,
    /// Takes an exception slot pointer as its last argument.
    pub throws: bool,
}

impl Capability {
    /// The import name under [`crate::HOST_MODULE`].
    pub fn import_name(&self) -> String {
        match self.kind {
            MemberKind::Intrinsic => format!("__membrane_{}", self.member),
            MemberKind::Static | MemberKind::Method => {
                format!("{}_{}", self.interface, self.member)
            }
            MemberKind::Getter => format!("{}_get_{}", self.interface, self.member),
            MemberKind::Setter => format!("{}_set_{}", self.interface, self.member),
            MemberKind::Constructor => format!("{}_new", self.interface),
            MemberKind::InstanceOf => format!("{}_instanceof", self.interface),
        }
    }

    /// Look up a capability by import name.
    pub fn by_import_name(name: &str) -> Option<&'static Capability> {
        CATALOG.iter().find(|c| c.import_name() == name)
    }
}

macro_rules! capabilities {
    (@exn exn) => { AbiType::I32 };
    (@ret) => { None };
    (@ret $ret:ident) => { Some(AbiType::$ret) };
    (@throws) => { false };
    (@throws exn) => { true };
    ($(
        $(#[$doc:meta])*
        $name:ident: $kind:ident($iface:literal, $member:literal)
            ($($param:ident),* $(; $exn:ident)?) $(-> $ret:ident)?;
    )*) => {
        $(
            $(#[$doc])*
            pub const $name: Capability = Capability {
                interface: $iface,
                member: $member,
                kind: MemberKind::$kind,
                params: &[$(AbiType::$param,)* $(capabilities!(@exn $exn))?],
                result: capabilities!(@ret $($ret)?),
                throws: capabilities!(@throws $($exn)?),
            };
        )*

        /// Every capability, in declaration order.
        pub const CATALOG: &[Capability] = &[$($name),*];
    };
}

capabilities! {
    // ── Intrinsics ──────────────────────────────────────────────────────────
    /// `(h)`: release the module's reference to a handle.
    OBJECT_DROP_REF: Intrinsic("__membrane", "object_drop_ref") (I32);
    /// `(h) -> h`: hand out the same value again (same handle).
    OBJECT_CLONE_REF: Intrinsic("__membrane", "object_clone_ref") (I32) -> I32;
    /// `(ptr, len) -> h`: copy module text into a host string.
    STRING_NEW: Intrinsic("__membrane", "string_new") (I32, I32) -> I32;
    /// `(ptr, len) -> h`: like `string_new`, then frees the bytes.
    STRING_CONSUME: Intrinsic("__membrane", "string_consume") (I32, I32) -> I32;
    /// `(h, ret) -> present`
    STRING_GET: Intrinsic("__membrane", "string_get") (I32, I32) -> I32;
    NUMBER_NEW: Intrinsic("__membrane", "number_new") (F64) -> I32;
    /// `(h, ret) -> present`: writes an f64 into `ret`.
    NUMBER_GET: Intrinsic("__membrane", "number_get") (I32, I32) -> I32;
    /// `(h) -> 0 | 1 | 2`: 2 when the value is not a boolean.
    BOOLEAN_GET: Intrinsic("__membrane", "boolean_get") (I32) -> I32;
    IS_NULL: Intrinsic("__membrane", "is_null") (I32) -> I32;
    IS_UNDEFINED: Intrinsic("__membrane", "is_undefined") (I32) -> I32;
    IS_OBJECT: Intrinsic("__membrane", "is_object") (I32) -> I32;
    IS_FUNCTION: Intrinsic("__membrane", "is_function") (I32) -> I32;
    IS_STRING: Intrinsic("__membrane", "is_string") (I32) -> I32;
    /// `(a, b) -> bool`: strict equality.
    JSVAL_EQ: Intrinsic("__membrane", "jsval_eq") (I32, I32) -> I32;
    /// `(h, ret)`
    DEBUG_STRING: Intrinsic("__membrane", "debug_string") (I32, I32);
    /// `(ptr, len)`: abort the current call with a message. Never returns.
    THROW: Intrinsic("__membrane", "throw") (I32, I32);
    /// `(h)`: abort the current call with a host value. Never returns.
    RETHROW: Intrinsic("__membrane", "rethrow") (I32);
    /// `(invoke, a, b, dtor, once) -> h`
    CLOSURE_NEW: Intrinsic("__membrane", "closure_new") (I32, I32, I32, I32, I32) -> I32;
    /// `(h)`: one more host-side owner of the closure.
    CLOSURE_RETAIN: Intrinsic("__membrane", "closure_retain") (I32);
    /// `(h) -> destroyed`
    CLOSURE_DROP: Intrinsic("__membrane", "closure_drop") (I32) -> I32;
    GLOBAL_WINDOW: Intrinsic("__membrane", "global_window") () -> I32;
    GLOBAL_DOCUMENT: Intrinsic("__membrane", "global_document") () -> I32;

    // ── console / JSON / Object / Reflect / Error ────────────────────────────
    CONSOLE_LOG: Static("console", "log") (I32, I32);
    CONSOLE_WARN: Static("console", "warn") (I32, I32);
    CONSOLE_ERROR: Static("console", "error") (I32, I32);
    JSON_PARSE: Static("JSON", "parse") (I32, I32; exn) -> I32;
    /// `(h, ret; exn) -> present`: absent for `undefined` and functions.
    JSON_STRINGIFY: Static("JSON", "stringify") (I32, I32; exn) -> I32;
    OBJECT_NEW: Constructor("Object", "Object") () -> I32;
    /// `(target, key_ptr, key_len; exn) -> h`
    REFLECT_GET: Static("Reflect", "get") (I32, I32, I32; exn) -> I32;
    /// `(target, key_ptr, key_len, value; exn) -> bool`
    REFLECT_SET: Static("Reflect", "set") (I32, I32, I32, I32; exn) -> I32;
    ERROR_NEW: Constructor("Error", "Error") (I32, I32) -> I32;

    // ── Window ──────────────────────────────────────────────────────────────
    WINDOW_DOCUMENT: Getter("Window", "document") (I32) -> I32;
    WINDOW_LOCAL_STORAGE: Getter("Window", "localStorage") (I32; exn) -> I32;
    WINDOW_SESSION_STORAGE: Getter("Window", "sessionStorage") (I32; exn) -> I32;
    /// `(window, callback, delay_ms; exn) -> timer id`
    WINDOW_SET_TIMEOUT: Method("Window", "setTimeout") (I32, I32, I32; exn) -> I32;
    WINDOW_CLEAR_TIMEOUT: Method("Window", "clearTimeout") (I32, I32);
    WINDOW_REQUEST_ANIMATION_FRAME: Method("Window", "requestAnimationFrame") (I32, I32; exn) -> I32;
    WINDOW_CANCEL_ANIMATION_FRAME: Method("Window", "cancelAnimationFrame") (I32, I32);
    /// `(window, url_ptr, url_len) -> promise`
    WINDOW_FETCH: Method("Window", "fetch") (I32, I32, I32) -> I32;

    // ── Document ────────────────────────────────────────────────────────────
    /// `(document, id_ptr, id_len) -> element | 0`
    DOCUMENT_GET_ELEMENT_BY_ID: Method("Document", "getElementById") (I32, I32, I32) -> I32;
    DOCUMENT_CREATE_ELEMENT: Method("Document", "createElement") (I32, I32, I32; exn) -> I32;
    DOCUMENT_CREATE_TEXT_NODE: Method("Document", "createTextNode") (I32, I32, I32) -> I32;
    DOCUMENT_BODY: Getter("Document", "body") (I32) -> I32;

    // ── Node ────────────────────────────────────────────────────────────────
    NODE_APPEND_CHILD: Method("Node", "appendChild") (I32, I32; exn) -> I32;
    NODE_REMOVE_CHILD: Method("Node", "removeChild") (I32, I32; exn) -> I32;
    /// `(parent, node, reference | 0; exn) -> node`
    NODE_INSERT_BEFORE: Method("Node", "insertBefore") (I32, I32, I32; exn) -> I32;
    NODE_GET_TEXT_CONTENT: Getter("Node", "textContent") (I32, I32) -> I32;
    NODE_SET_TEXT_CONTENT: Setter("Node", "textContent") (I32, I32, I32);
    NODE_PARENT_NODE: Getter("Node", "parentNode") (I32) -> I32;
    NODE_FIRST_CHILD: Getter("Node", "firstChild") (I32) -> I32;

    // ── Element ─────────────────────────────────────────────────────────────
    /// `(element, name_ptr, name_len, value_ptr, value_len; exn)`
    ELEMENT_SET_ATTRIBUTE: Method("Element", "setAttribute") (I32, I32, I32, I32, I32; exn);
    ELEMENT_GET_ATTRIBUTE: Method("Element", "getAttribute") (I32, I32, I32, I32) -> I32;
    ELEMENT_REMOVE_ATTRIBUTE: Method("Element", "removeAttribute") (I32, I32, I32; exn);
    ELEMENT_ID: Getter("Element", "id") (I32, I32);
    ELEMENT_TAG_NAME: Getter("Element", "tagName") (I32, I32);
    HTML_ELEMENT_CLICK: Method("HTMLElement", "click") (I32);

    // ── Form controls ───────────────────────────────────────────────────────
    HTML_INPUT_ELEMENT_GET_VALUE: Getter("HTMLInputElement", "value") (I32, I32);
    HTML_INPUT_ELEMENT_SET_VALUE: Setter("HTMLInputElement", "value") (I32, I32, I32);
    HTML_INPUT_ELEMENT_GET_CHECKED: Getter("HTMLInputElement", "checked") (I32) -> I32;
    HTML_INPUT_ELEMENT_SET_CHECKED: Setter("HTMLInputElement", "checked") (I32, I32);
    HTML_SELECT_ELEMENT_GET_VALUE: Getter("HTMLSelectElement", "value") (I32, I32);
    HTML_SELECT_ELEMENT_SET_VALUE: Setter("HTMLSelectElement", "value") (I32, I32, I32);
    HTML_TEXT_AREA_ELEMENT_GET_VALUE: Getter("HTMLTextAreaElement", "value") (I32, I32);
    HTML_TEXT_AREA_ELEMENT_SET_VALUE: Setter("HTMLTextAreaElement", "value") (I32, I32, I32);

    // ── Events ──────────────────────────────────────────────────────────────
    /// `(target, type_ptr, type_len, callback; exn)`
    EVENT_TARGET_ADD_EVENT_LISTENER: Method("EventTarget", "addEventListener") (I32, I32, I32, I32; exn);
    EVENT_TARGET_REMOVE_EVENT_LISTENER: Method("EventTarget", "removeEventListener") (I32, I32, I32, I32; exn);
    /// `(target, event; exn) -> not cancelled`
    EVENT_TARGET_DISPATCH_EVENT: Method("EventTarget", "dispatchEvent") (I32, I32; exn) -> I32;
    EVENT_NEW: Constructor("Event", "Event") (I32, I32; exn) -> I32;
    EVENT_TYPE: Getter("Event", "type") (I32, I32);
    EVENT_TARGET: Getter("Event", "target") (I32) -> I32;
    EVENT_PREVENT_DEFAULT: Method("Event", "preventDefault") (I32);
    EVENT_DEFAULT_PREVENTED: Getter("Event", "defaultPrevented") (I32) -> I32;

    // ── Storage ─────────────────────────────────────────────────────────────
    /// `(storage, key_ptr, key_len, ret; exn) -> present`
    STORAGE_GET_ITEM: Method("Storage", "getItem") (I32, I32, I32, I32; exn) -> I32;
    STORAGE_SET_ITEM: Method("Storage", "setItem") (I32, I32, I32, I32, I32; exn);
    STORAGE_REMOVE_ITEM: Method("Storage", "removeItem") (I32, I32, I32; exn);
    STORAGE_CLEAR: Method("Storage", "clear") (I32; exn);
    STORAGE_LENGTH: Getter("Storage", "length") (I32; exn) -> I32;

    // ── Promise / Response ──────────────────────────────────────────────────
    PROMISE_RESOLVE: Static("Promise", "resolve") (I32) -> I32;
    PROMISE_REJECT: Static("Promise", "reject") (I32) -> I32;
    /// `(promise, on_fulfilled | 0, on_rejected | 0) -> promise`
    PROMISE_THEN: Method("Promise", "then") (I32, I32, I32) -> I32;
    RESPONSE_STATUS: Getter("Response", "status") (I32) -> I32;
    RESPONSE_OK: Getter("Response", "ok") (I32) -> I32;
    RESPONSE_TEXT: Method("Response", "text") (I32; exn) -> I32;
    RESPONSE_JSON: Method("Response", "json") (I32; exn) -> I32;

    // ── instanceof ──────────────────────────────────────────────────────────
    ELEMENT_INSTANCEOF: InstanceOf("Element", "") (I32) -> I32;
    HTML_INPUT_ELEMENT_INSTANCEOF: InstanceOf("HTMLInputElement", "") (I32) -> I32;
    HTML_SELECT_ELEMENT_INSTANCEOF: InstanceOf("HTMLSelectElement", "") (I32) -> I32;
    HTML_TEXT_AREA_ELEMENT_INSTANCEOF: InstanceOf("HTMLTextAreaElement", "") (I32) -> I32;
    EVENT_INSTANCEOF: InstanceOf("Event", "") (I32) -> I32;
    ERROR_INSTANCEOF: InstanceOf("Error", "") (I32) -> I32;
    PROMISE_INSTANCEOF: InstanceOf("Promise", "") (I32) -> I32;
}
