//! The realm: object arena, global objects and generic object operations.

use tracing::trace;

use crate::config::RealmConfig;
use crate::console::Console;
use crate::error::{Completion, Thrown};
use crate::event_loop::EventLoop;
use crate::network::Network;
use crate::object::{
    ElementData, FunctionKind, Interface, Node, NodeData, Object, ObjectKind, StorageArea,
    StorageKind,
};
use crate::value::{format_number, HostValue, ObjectId};

/// A complete host environment.
///
/// Objects are allocated in an arena and never freed; an [`ObjectId`] stays
/// valid for the life of the realm.
#[derive(Debug)]
pub struct Realm {
    config: RealmConfig,
    objects: Vec<Object>,
    window: ObjectId,
    document: ObjectId,
    document_element: ObjectId,
    body: ObjectId,
    local_storage: ObjectId,
    session_storage: ObjectId,
    event_loop: EventLoop,
    network: Network,
    console: Console,
}

impl Default for Realm {
    fn default() -> Self {
        Self::new(RealmConfig::default())
    }
}

impl Realm {
    pub fn new(config: RealmConfig) -> Self {
        let mut realm = Self {
            config,
            objects: Vec::new(),
            window: ObjectId(0),
            document: ObjectId(0),
            document_element: ObjectId(0),
            body: ObjectId(0),
            local_storage: ObjectId(0),
            session_storage: ObjectId(0),
            event_loop: EventLoop::default(),
            network: Network::default(),
            console: Console::default(),
        };
        realm.window = realm.alloc(ObjectKind::Window);
        realm.document = realm.alloc(ObjectKind::Node(Node::default()));
        realm.document_element = realm.alloc_element("html");
        realm.body = realm.alloc_element("body");
        realm.link(realm.document, realm.document_element);
        realm.link(realm.document_element, realm.body);
        let quota = realm.config.storage_quota_bytes;
        realm.local_storage = realm.alloc(ObjectKind::Storage(StorageArea {
            kind: StorageKind::Local,
            items: Vec::new(),
            quota_bytes: quota,
        }));
        realm.session_storage = realm.alloc(ObjectKind::Storage(StorageArea {
            kind: StorageKind::Session,
            items: Vec::new(),
            quota_bytes: quota,
        }));
        realm
    }

    fn alloc_element(&mut self, tag: &str) -> ObjectId {
        self.alloc(ObjectKind::Node(Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: tag.to_string(),
                ..ElementData::default()
            }),
        }))
    }

    fn link(&mut self, parent: ObjectId, child: ObjectId) {
        if let Some(node) = self.object_mut(parent).node_mut() {
            node.children.push(child);
        }
        if let Some(node) = self.object_mut(child).node_mut() {
            node.parent = Some(parent);
        }
    }

    // ── Arena ───────────────────────────────────────────────────────────────

    /// Add an object to the arena. Objects are never collected, so ids are
    /// never reused.
    pub fn alloc(&mut self, kind: ObjectKind) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object::new(kind));
        trace!(%id, "alloc object");
        id
    }

    pub fn object(&self, id: ObjectId) -> &Object {
        &self.objects[id.index()]
    }

    pub fn object_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.objects[id.index()]
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ── Globals and subsystems ──────────────────────────────────────────────

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    pub fn window(&self) -> ObjectId {
        self.window
    }

    pub fn document(&self) -> ObjectId {
        self.document
    }

    /// The `<html>` element.
    pub fn document_element(&self) -> ObjectId {
        self.document_element
    }

    pub fn body(&self) -> ObjectId {
        self.body
    }

    /// `window.localStorage`; throws `SecurityError` when storage is disabled.
    pub fn local_storage(&mut self) -> Completion<ObjectId> {
        self.storage_getter(self.local_storage)
    }

    /// `window.sessionStorage`; throws `SecurityError` when storage is disabled.
    pub fn session_storage(&mut self) -> Completion<ObjectId> {
        self.storage_getter(self.session_storage)
    }

    fn storage_getter(&mut self, storage: ObjectId) -> Completion<ObjectId> {
        if self.config.storage_enabled {
            Ok(storage)
        } else {
            Err(self.dom_exception(
                "SecurityError",
                "Access is denied for this document.",
            ))
        }
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn event_loop_mut(&mut self) -> &mut EventLoop {
        &mut self.event_loop
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    // ── Type queries ────────────────────────────────────────────────────────

    pub fn interface_of(&self, value: &HostValue) -> Option<Interface> {
        value.as_object().map(|id| self.object(id).interface())
    }

    /// `value instanceof iface`. Primitives are never instances.
    pub fn instance_of(&self, value: &HostValue, iface: Interface) -> bool {
        self.interface_of(value).is_some_and(|i| i.is_a(iface))
    }

    pub fn is_function(&self, value: &HostValue) -> bool {
        self.function_kind(value).is_some()
    }

    pub fn function_kind(&self, value: &HostValue) -> Option<FunctionKind> {
        match &self.object(value.as_object()?).kind {
            ObjectKind::Function(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn new_function(&mut self, kind: FunctionKind) -> ObjectId {
        self.alloc(ObjectKind::Function(kind))
    }

    // ── Errors ──────────────────────────────────────────────────────────────

    pub fn new_error(&mut self, name: &str, message: &str) -> ObjectId {
        self.alloc(ObjectKind::Error {
            name: name.to_string(),
            message: message.to_string(),
        })
    }

    pub fn type_error(&mut self, message: &str) -> Thrown {
        Thrown(self.new_error("TypeError", message).into())
    }

    pub fn syntax_error(&mut self, message: &str) -> Thrown {
        Thrown(self.new_error("SyntaxError", message).into())
    }

    /// A `DOMException` such as `NotFoundError`.
    pub fn dom_exception(&mut self, name: &str, message: &str) -> Thrown {
        Thrown(self.new_error(name, message).into())
    }

    /// `(name, message)` of an error object.
    pub fn error_parts(&self, value: &HostValue) -> Option<(&str, &str)> {
        match &self.object(value.as_object()?).kind {
            ObjectKind::Error { name, message } => Some((name, message)),
            _ => None,
        }
    }

    // ── Plain objects and properties ────────────────────────────────────────

    pub fn new_object(&mut self) -> ObjectId {
        self.alloc(ObjectKind::Plain)
    }

    pub fn new_array(&mut self, items: Vec<HostValue>) -> ObjectId {
        self.alloc(ObjectKind::Array(items))
    }

    /// `Reflect.get(target, key)`.
    pub fn get_property(&mut self, target: &HostValue, key: &str) -> Completion<HostValue> {
        let Some(id) = target.as_object() else {
            return Err(self.type_error("Reflect.get called on non-object"));
        };
        let object = self.object(id);
        let value = match (&object.kind, key) {
            (ObjectKind::Array(items), "length") => HostValue::Number(items.len() as f64),
            (ObjectKind::Array(items), _) => match key.parse::<usize>() {
                Ok(index) => items.get(index).cloned().unwrap_or_default(),
                Err(_) => object.property(key).cloned().unwrap_or_default(),
            },
            (ObjectKind::Error { name, .. }, "name") => HostValue::string(name.clone()),
            (ObjectKind::Error { message, .. }, "message") => HostValue::string(message.clone()),
            _ => object.property(key).cloned().unwrap_or_default(),
        };
        Ok(value)
    }

    /// `Reflect.set(target, key, value)`.
    pub fn set_property(
        &mut self,
        target: &HostValue,
        key: &str,
        value: HostValue,
    ) -> Completion<bool> {
        let Some(id) = target.as_object() else {
            return Err(self.type_error("Reflect.set called on non-object"));
        };
        let message_text = match key {
            "message" => Some(self.display_string(&value)),
            _ => None,
        };
        match &mut self.object_mut(id).kind {
            ObjectKind::Array(items) => {
                if let Ok(index) = key.parse::<usize>() {
                    if index >= items.len() {
                        items.resize(index + 1, HostValue::Undefined);
                    }
                    items[index] = value;
                    return Ok(true);
                }
                if key == "length" {
                    return Ok(false);
                }
            }
            ObjectKind::Error { message, .. } => {
                if let Some(text) = message_text {
                    *message = text;
                    return Ok(true);
                }
            }
            _ => {}
        }
        self.object_mut(id).set_property(key, value);
        Ok(true)
    }

    /// `String(value)`.
    pub fn display_string(&self, value: &HostValue) -> String {
        match value {
            HostValue::Undefined => "undefined".to_string(),
            HostValue::Null => "null".to_string(),
            HostValue::Bool(b) => b.to_string(),
            HostValue::Number(n) => format_number(*n),
            HostValue::String(s) => s.clone(),
            HostValue::Object(id) => {
                let object = self.object(*id);
                match &object.kind {
                    ObjectKind::Error { name, message } if message.is_empty() => name.clone(),
                    ObjectKind::Error { name, message } => format!("{name}: {message}"),
                    ObjectKind::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            HostValue::Undefined | HostValue::Null => String::new(),
                            other => self.display_string(other),
                        })
                        .collect::<Vec<_>>()
                        .join(","),
                    ObjectKind::Function(_) => "function () { [native code] }".to_string(),
                    _ => format!("[object {}]", object.interface().name()),
                }
            }
        }
    }
}
