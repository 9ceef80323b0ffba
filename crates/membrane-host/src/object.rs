//! Host objects and the interface hierarchy.

use crate::promise::PromiseState;
use crate::value::{HostValue, ObjectId};

/// Identifies a module closure registered with the boundary.
///
/// Slots are reused once a closure is destroyed; the generation tells a
/// stale key from the slot's current occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClosureKey {
    pub index: u32,
    pub generation: u32,
}

impl ClosureKey {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// What a function object does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// A module function-table entry wrapped by the closure bridge.
    Closure(ClosureKey),
}

/// An event listener registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub event_type: String,
    pub callback: ObjectId,
    pub once: bool,
}

/// Per-node tree data.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub parent: Option<ObjectId>,
    pub children: Vec<ObjectId>,
    pub data: NodeData,
}

#[derive(Debug, Clone, Default)]
pub enum NodeData {
    #[default]
    Document,
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct ElementData {
    /// Lower-case local name.
    pub tag: String,
    /// Attributes in insertion order.
    pub attributes: Vec<(String, String)>,
    /// Current value of a form control.
    pub value: String,
    pub checked: bool,
}

impl ElementData {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventData {
    pub event_type: String,
    pub target: Option<ObjectId>,
    pub bubbles: bool,
    pub cancelable: bool,
    pub default_prevented: bool,
    pub dispatching: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    pub url: String,
    pub status: u16,
    pub body: String,
    pub body_used: bool,
}

impl ResponseData {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Session,
}

/// Key/value pairs of one web storage area, in insertion order.
#[derive(Debug, Clone)]
pub struct StorageArea {
    pub kind: StorageKind,
    pub items: Vec<(String, String)>,
    pub quota_bytes: usize,
}

/// The variant part of a host object.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    Plain,
    Array(Vec<HostValue>),
    Function(FunctionKind),
    Error { name: String, message: String },
    Window,
    Node(Node),
    Event(EventData),
    Storage(StorageArea),
    Promise(PromiseState),
    Response(ResponseData),
}

/// One object in the realm arena.
#[derive(Debug, Clone)]
pub struct Object {
    pub kind: ObjectKind,
    /// Own string-keyed properties, in insertion order.
    pub properties: Vec<(String, HostValue)>,
    pub listeners: Vec<Listener>,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            properties: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&HostValue> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn set_property(&mut self, key: &str, value: HostValue) {
        match self.properties.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.properties.push((key.to_string(), value)),
        }
    }

    pub fn node(&self) -> Option<&Node> {
        match &self.kind {
            ObjectKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn node_mut(&mut self) -> Option<&mut Node> {
        match &mut self.kind {
            ObjectKind::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            ObjectKind::Node(Node {
                data: NodeData::Element(el),
                ..
            }) => Some(el),
            _ => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            ObjectKind::Node(Node {
                data: NodeData::Element(el),
                ..
            }) => Some(el),
            _ => None,
        }
    }

    /// The most derived interface this object implements.
    pub fn interface(&self) -> Interface {
        match &self.kind {
            ObjectKind::Plain => Interface::Object,
            ObjectKind::Array(_) => Interface::Array,
            ObjectKind::Function(_) => Interface::Function,
            ObjectKind::Error { name, .. } if name == "TypeError" => Interface::TypeError,
            ObjectKind::Error { name, .. } if name == "SyntaxError" => Interface::SyntaxError,
            ObjectKind::Error { name, .. } if is_dom_exception_name(name) => {
                Interface::DOMException
            }
            ObjectKind::Error { .. } => Interface::Error,
            ObjectKind::Window => Interface::Window,
            ObjectKind::Node(node) => match &node.data {
                NodeData::Document => Interface::Document,
                NodeData::Text(_) => Interface::Text,
                NodeData::Element(el) => Interface::for_tag(&el.tag),
            },
            ObjectKind::Event(_) => Interface::Event,
            ObjectKind::Storage(_) => Interface::Storage,
            ObjectKind::Promise(_) => Interface::Promise,
            ObjectKind::Response(_) => Interface::Response,
        }
    }
}

/// Names of the `DOMException` variants the host raises.
pub const DOM_EXCEPTION_NAMES: &[&str] = &[
    "InvalidCharacterError",
    "NotFoundError",
    "HierarchyRequestError",
    "QuotaExceededError",
    "SecurityError",
    "InvalidStateError",
];

fn is_dom_exception_name(name: &str) -> bool {
    DOM_EXCEPTION_NAMES.contains(&name)
}

/// Host interfaces, arranged in a single-inheritance hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    Object,
    Array,
    Function,
    Error,
    TypeError,
    SyntaxError,
    DOMException,
    EventTarget,
    Window,
    Node,
    Document,
    Text,
    Element,
    HTMLElement,
    HTMLInputElement,
    HTMLSelectElement,
    HTMLTextAreaElement,
    Event,
    Storage,
    Promise,
    Response,
}

impl Interface {
    pub fn parent(self) -> Option<Interface> {
        use Interface::*;
        match self {
            Object => None,
            Array | Function | Error | EventTarget | Event | Storage | Promise | Response => {
                Some(Object)
            }
            TypeError | SyntaxError | DOMException => Some(Error),
            Window | Node => Some(EventTarget),
            Document | Text | Element => Some(Node),
            HTMLElement => Some(Element),
            HTMLInputElement | HTMLSelectElement | HTMLTextAreaElement => Some(HTMLElement),
        }
    }

    /// Whether `self` is `ancestor` or derives from it.
    pub fn is_a(self, ancestor: Interface) -> bool {
        let mut current = Some(self);
        while let Some(iface) = current {
            if iface == ancestor {
                return true;
            }
            current = iface.parent();
        }
        false
    }

    /// Element interface for a lower-case tag name.
    pub fn for_tag(tag: &str) -> Interface {
        match tag {
            "input" => Interface::HTMLInputElement,
            "select" => Interface::HTMLSelectElement,
            "textarea" => Interface::HTMLTextAreaElement,
            _ => Interface::HTMLElement,
        }
    }

    pub fn name(self) -> &'static str {
        use Interface::*;
        match self {
            Object => "Object",
            Array => "Array",
            Function => "Function",
            Error => "Error",
            TypeError => "TypeError",
            SyntaxError => "SyntaxError",
            DOMException => "DOMException",
            EventTarget => "EventTarget",
            Window => "Window",
            Node => "Node",
            Document => "Document",
            Text => "Text",
            Element => "Element",
            HTMLElement => "HTMLElement",
            HTMLInputElement => "HTMLInputElement",
            HTMLSelectElement => "HTMLSelectElement",
            HTMLTextAreaElement => "HTMLTextAreaElement",
            Event => "Event",
            Storage => "Storage",
            Promise => "Promise",
            Response => "Response",
        }
    }

    pub fn from_name(name: &str) -> Option<Interface> {
        use Interface::*;
        const ALL: &[Interface] = &[
            Object,
            Array,
            Function,
            Error,
            TypeError,
            SyntaxError,
            DOMException,
            EventTarget,
            Window,
            Node,
            Document,
            Text,
            Element,
            HTMLElement,
            HTMLInputElement,
            HTMLSelectElement,
            HTMLTextAreaElement,
            Event,
            Storage,
            Promise,
            Response,
        ];
        ALL.iter().copied().find(|i| i.name() == name)
    }
}
