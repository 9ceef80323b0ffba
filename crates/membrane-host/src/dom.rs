//! DOM operations: tree edits, attributes, form controls, events.

use tracing::trace;

use crate::error::Completion;
use crate::object::{
    ElementData, EventData, Interface, Listener, Node, NodeData, ObjectKind,
};
use crate::realm::Realm;
use crate::value::{HostValue, ObjectId};

/// Whether `name` is usable as a tag or attribute name.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.'))
}

impl Realm {
    fn illegal_invocation<T>(&mut self) -> Completion<T> {
        Err(self.type_error("Illegal invocation"))
    }

    fn node(&self, id: ObjectId) -> Option<&Node> {
        self.object(id).node()
    }

    pub fn element(&self, id: ObjectId) -> Option<&ElementData> {
        self.object(id).element()
    }

    fn element_or_throw(&mut self, id: ObjectId) -> Completion<&mut ElementData> {
        if self.element(id).is_none() {
            return self.illegal_invocation();
        }
        match self.object_mut(id).element_mut() {
            Some(el) => Ok(el),
            None => unreachable!("checked above"),
        }
    }

    // ── Tree queries ────────────────────────────────────────────────────────

    pub fn parent_node(&self, id: ObjectId) -> Option<ObjectId> {
        self.node(id)?.parent
    }

    pub fn first_child(&self, id: ObjectId) -> Option<ObjectId> {
        self.node(id)?.children.first().copied()
    }

    pub fn children(&self, id: ObjectId) -> &[ObjectId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: ObjectId, node: ObjectId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent_node(id);
        }
        false
    }

    /// Preorder walk of the subtree rooted at `root`, root included.
    pub fn descendants(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<ObjectId> {
        self.descendants(self.document())
            .into_iter()
            .find(|id| self.element(*id).and_then(|el| el.attribute("id")) == Some(element_id))
    }

    // ── Node creation ───────────────────────────────────────────────────────

    /// `document.createElement(tag)`; invalid names throw
    /// `InvalidCharacterError`.
    pub fn create_element(&mut self, tag: &str) -> Completion<ObjectId> {
        if !is_valid_name(tag) {
            let message = format!("The tag name provided ('{tag}') is not a valid name.");
            return Err(self.dom_exception("InvalidCharacterError", &message));
        }
        Ok(self.alloc(ObjectKind::Node(Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Element(ElementData {
                tag: tag.to_ascii_lowercase(),
                ..ElementData::default()
            }),
        })))
    }

    pub fn create_text_node(&mut self, text: &str) -> ObjectId {
        self.alloc(ObjectKind::Node(Node {
            parent: None,
            children: Vec::new(),
            data: NodeData::Text(text.to_string()),
        }))
    }

    // ── Tree edits ──────────────────────────────────────────────────────────

    fn detach(&mut self, child: ObjectId) {
        if let Some(parent) = self.parent_node(child) {
            if let Some(node) = self.object_mut(parent).node_mut() {
                node.children.retain(|c| *c != child);
            }
            if let Some(node) = self.object_mut(child).node_mut() {
                node.parent = None;
            }
        }
    }

    fn check_insertion(&mut self, parent: ObjectId, child: ObjectId) -> Completion<()> {
        let parent_ok = matches!(
            self.node(parent).map(|n| &n.data),
            Some(NodeData::Document | NodeData::Element(_))
        );
        let child_ok = matches!(
            self.node(child).map(|n| &n.data),
            Some(NodeData::Element(_) | NodeData::Text(_))
        );
        if self.node(parent).is_none() || self.node(child).is_none() {
            return self.illegal_invocation();
        }
        if !parent_ok || !child_ok {
            return Err(self.dom_exception(
                "HierarchyRequestError",
                "This node type does not support this method.",
            ));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(self.dom_exception(
                "HierarchyRequestError",
                "The new child element contains the parent.",
            ));
        }
        Ok(())
    }

    /// `parent.appendChild(child)`: moves `child` if it already has a parent.
    pub fn append_child(&mut self, parent: ObjectId, child: ObjectId) -> Completion<ObjectId> {
        self.check_insertion(parent, child)?;
        self.detach(child);
        if let Some(node) = self.object_mut(parent).node_mut() {
            node.children.push(child);
        }
        if let Some(node) = self.object_mut(child).node_mut() {
            node.parent = Some(parent);
        }
        trace!(%parent, %child, "append child");
        Ok(child)
    }

    /// `parent.insertBefore(node, reference)`; a `None` reference appends.
    pub fn insert_before(
        &mut self,
        parent: ObjectId,
        node: ObjectId,
        reference: Option<ObjectId>,
    ) -> Completion<ObjectId> {
        let Some(mut reference) = reference else {
            return self.append_child(parent, node);
        };
        self.check_insertion(parent, node)?;
        if self.parent_node(reference) != Some(parent) {
            return Err(self.dom_exception(
                "NotFoundError",
                "The node before which the new node is to be inserted is not a child of this node.",
            ));
        }
        if reference == node {
            let siblings = self.children(parent);
            let pos = siblings.iter().position(|c| *c == node);
            match pos.and_then(|p| siblings.get(p + 1)).copied() {
                Some(next) => reference = next,
                None => return self.append_child(parent, node),
            }
        }
        self.detach(node);
        if let Some(p) = self.object_mut(parent).node_mut() {
            let index = p
                .children
                .iter()
                .position(|c| *c == reference)
                .unwrap_or(p.children.len());
            p.children.insert(index, node);
        }
        if let Some(n) = self.object_mut(node).node_mut() {
            n.parent = Some(parent);
        }
        Ok(node)
    }

    /// `parent.removeChild(child)`; throws `NotFoundError` when `child` is not
    /// a child of `parent`.
    pub fn remove_child(&mut self, parent: ObjectId, child: ObjectId) -> Completion<ObjectId> {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return self.illegal_invocation();
        }
        if self.parent_node(child) != Some(parent) {
            return Err(self.dom_exception(
                "NotFoundError",
                "The node to be removed is not a child of this node.",
            ));
        }
        self.detach(child);
        Ok(child)
    }

    // ── Text ────────────────────────────────────────────────────────────────

    /// `node.textContent`; `None` for the document.
    pub fn text_content(&self, id: ObjectId) -> Option<String> {
        match &self.node(id)?.data {
            NodeData::Document => None,
            NodeData::Text(text) => Some(text.clone()),
            NodeData::Element(_) => Some(
                self.descendants(id)
                    .into_iter()
                    .filter_map(|d| match &self.node(d)?.data {
                        NodeData::Text(text) => Some(text.as_str()),
                        _ => None,
                    })
                    .collect(),
            ),
        }
    }

    /// `node.textContent = text`: an element's children are replaced by one
    /// text node (none for empty text).
    pub fn set_text_content(&mut self, id: ObjectId, text: &str) {
        let is_element = match self.object_mut(id).node_mut().map(|n| &mut n.data) {
            Some(NodeData::Text(data)) => {
                *data = text.to_string();
                return;
            }
            Some(NodeData::Element(_)) => true,
            _ => false,
        };
        if !is_element {
            return;
        }
        for child in self.children(id).to_vec() {
            self.detach(child);
        }
        if !text.is_empty() {
            let node = self.create_text_node(text);
            if let Some(n) = self.object_mut(id).node_mut() {
                n.children.push(node);
            }
            if let Some(n) = self.object_mut(node).node_mut() {
                n.parent = Some(id);
            }
        }
    }

    // ── Attributes ──────────────────────────────────────────────────────────

    pub fn set_attribute(&mut self, id: ObjectId, name: &str, value: &str) -> Completion<()> {
        if self.element(id).is_some() && !is_valid_name(name) {
            let message = format!("'{name}' is not a valid attribute name.");
            return Err(self.dom_exception("InvalidCharacterError", &message));
        }
        let name = name.to_ascii_lowercase();
        let el = self.element_or_throw(id)?;
        match el.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => el.attributes.push((name, value.to_string())),
        }
        Ok(())
    }

    pub fn get_attribute(&self, id: ObjectId, name: &str) -> Option<String> {
        let name = name.to_ascii_lowercase();
        self.element(id)?.attribute(&name).map(str::to_string)
    }

    pub fn remove_attribute(&mut self, id: ObjectId, name: &str) -> Completion<()> {
        let name = name.to_ascii_lowercase();
        self.element_or_throw(id)?.attributes.retain(|(n, _)| *n != name);
        Ok(())
    }

    /// `element.id`.
    pub fn element_id(&self, id: ObjectId) -> String {
        self.get_attribute(id, "id").unwrap_or_default()
    }

    /// `element.tagName` (upper case).
    pub fn tag_name(&self, id: ObjectId) -> Option<String> {
        self.element(id).map(|el| el.tag.to_ascii_uppercase())
    }

    // ── Form controls ───────────────────────────────────────────────────────

    pub fn control_value(&self, id: ObjectId) -> Option<String> {
        self.element(id).map(|el| el.value.clone())
    }

    pub fn set_control_value(&mut self, id: ObjectId, value: &str) {
        if let Some(el) = self.object_mut(id).element_mut() {
            el.value = value.to_string();
        }
    }

    pub fn checked(&self, id: ObjectId) -> bool {
        self.element(id).is_some_and(|el| el.checked)
    }

    pub fn set_checked(&mut self, id: ObjectId, checked: bool) {
        if let Some(el) = self.object_mut(id).element_mut() {
            el.checked = checked;
        }
    }

    // ── Events ──────────────────────────────────────────────────────────────

    pub fn create_event(&mut self, event_type: &str, bubbles: bool, cancelable: bool) -> ObjectId {
        self.alloc(ObjectKind::Event(EventData {
            event_type: event_type.to_string(),
            target: None,
            bubbles,
            cancelable,
            default_prevented: false,
            dispatching: false,
        }))
    }

    pub fn event(&self, id: ObjectId) -> Option<&EventData> {
        match &self.object(id).kind {
            ObjectKind::Event(ev) => Some(ev),
            _ => None,
        }
    }

    fn event_mut(&mut self, id: ObjectId) -> Option<&mut EventData> {
        match &mut self.object_mut(id).kind {
            ObjectKind::Event(ev) => Some(ev),
            _ => None,
        }
    }

    /// `event.preventDefault()`; ignored for non-cancelable events.
    pub fn prevent_default(&mut self, id: ObjectId) {
        if let Some(ev) = self.event_mut(id) {
            if ev.cancelable {
                ev.default_prevented = true;
            }
        }
    }

    fn check_event_target(&mut self, target: ObjectId) -> Completion<()> {
        if self.object(target).interface().is_a(Interface::EventTarget) {
            Ok(())
        } else {
            self.illegal_invocation()
        }
    }

    /// `addEventListener`. Registering the same (type, callback) pair twice
    /// keeps one listener; returns whether a listener was added.
    pub fn add_event_listener(
        &mut self,
        target: ObjectId,
        event_type: &str,
        callback: ObjectId,
        once: bool,
    ) -> Completion<bool> {
        self.check_event_target(target)?;
        if !self.is_function(&HostValue::Object(callback)) {
            return Err(self.type_error(
                "Failed to execute 'addEventListener': parameter 2 is not of type 'Function'.",
            ));
        }
        let listeners = &mut self.object_mut(target).listeners;
        if listeners
            .iter()
            .any(|l| l.event_type == event_type && l.callback == callback)
        {
            return Ok(false);
        }
        listeners.push(Listener {
            event_type: event_type.to_string(),
            callback,
            once,
        });
        Ok(true)
    }

    /// `removeEventListener`; returns whether a listener was removed.
    pub fn remove_event_listener(
        &mut self,
        target: ObjectId,
        event_type: &str,
        callback: ObjectId,
    ) -> Completion<bool> {
        self.check_event_target(target)?;
        let listeners = &mut self.object_mut(target).listeners;
        let before = listeners.len();
        listeners.retain(|l| !(l.event_type == event_type && l.callback == callback));
        Ok(listeners.len() != before)
    }

    pub fn has_listener(&self, target: ObjectId, event_type: &str, callback: ObjectId) -> bool {
        self.object(target)
            .listeners
            .iter()
            .any(|l| l.event_type == event_type && l.callback == callback)
    }

    /// Snapshot of the listeners of `target` for `event_type`.
    pub fn listeners_for(&self, target: ObjectId, event_type: &str) -> Vec<Listener> {
        self.object(target)
            .listeners
            .iter()
            .filter(|l| l.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Start dispatching `event` at `target`. Returns the propagation path:
    /// the target, then (for bubbling events) its ancestors and the window.
    pub fn begin_dispatch(&mut self, event: ObjectId, target: ObjectId) -> Completion<Vec<ObjectId>> {
        self.check_event_target(target)?;
        let Some(ev) = self.event(event) else {
            return Err(self.type_error(
                "Failed to execute 'dispatchEvent': parameter 1 is not of type 'Event'.",
            ));
        };
        if ev.dispatching {
            return Err(self.dom_exception(
                "InvalidStateError",
                "The event is already being dispatched.",
            ));
        }
        let bubbles = ev.bubbles;
        if let Some(ev) = self.event_mut(event) {
            ev.dispatching = true;
            ev.target = Some(target);
        }
        let mut path = vec![target];
        if bubbles {
            let mut current = self.parent_node(target);
            while let Some(id) = current {
                path.push(id);
                current = self.parent_node(id);
            }
            if path.last() == Some(&self.document()) {
                path.push(self.window());
            }
        }
        Ok(path)
    }

    /// Remove a `once` listener before it is invoked. Returns whether it was
    /// removed.
    pub fn consume_once_listener(&mut self, target: ObjectId, listener: &Listener) -> bool {
        if !listener.once {
            return false;
        }
        let listeners = &mut self.object_mut(target).listeners;
        let before = listeners.len();
        listeners.retain(|l| {
            !(l.event_type == listener.event_type && l.callback == listener.callback)
        });
        listeners.len() != before
    }

    /// Finish a dispatch. Returns `false` when the default was prevented.
    pub fn end_dispatch(&mut self, event: ObjectId) -> bool {
        match self.event_mut(event) {
            Some(ev) => {
                ev.dispatching = false;
                !ev.default_prevented
            }
            None => true,
        }
    }

    /// Activation behaviour run by `click()` before dispatch: checkboxes
    /// toggle.
    pub fn click_activation(&mut self, id: ObjectId) {
        let is_checkbox = self
            .element(id)
            .is_some_and(|el| el.tag == "input" && el.attribute("type") == Some("checkbox"));
        if is_checkbox {
            let checked = self.checked(id);
            self.set_checked(id, !checked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ClosureKey, FunctionKind};

    fn thrown_name(realm: &Realm, thrown: &crate::error::Thrown) -> String {
        realm
            .error_parts(thrown.value())
            .map(|(n, _)| n.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn append_moves_existing_child() {
        let mut realm = Realm::default();
        let a = realm.create_element("div").unwrap();
        let b = realm.create_element("div").unwrap();
        let t = realm.create_text_node("x");
        realm.append_child(a, t).unwrap();
        realm.append_child(b, t).unwrap();
        assert!(realm.children(a).is_empty());
        assert_eq!(realm.children(b), &[t]);
        assert_eq!(realm.parent_node(t), Some(b));
    }

    #[test]
    fn cycles_are_rejected() {
        let mut realm = Realm::default();
        let a = realm.create_element("div").unwrap();
        let b = realm.create_element("div").unwrap();
        realm.append_child(a, b).unwrap();
        let err = realm.append_child(b, a).unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "HierarchyRequestError");
        let err = realm.append_child(a, a).unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "HierarchyRequestError");
    }

    #[test]
    fn remove_non_child_is_not_found() {
        let mut realm = Realm::default();
        let a = realm.create_element("div").unwrap();
        let b = realm.create_element("div").unwrap();
        let err = realm.remove_child(a, b).unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "NotFoundError");
    }

    #[test]
    fn insert_before_orders_children() {
        let mut realm = Realm::default();
        let list = realm.create_element("ul").unwrap();
        let one = realm.create_element("li").unwrap();
        let two = realm.create_element("li").unwrap();
        let three = realm.create_element("li").unwrap();
        realm.append_child(list, three).unwrap();
        realm.insert_before(list, one, Some(three)).unwrap();
        realm.insert_before(list, two, Some(three)).unwrap();
        assert_eq!(realm.children(list), &[one, two, three]);
        realm.insert_before(list, one, Some(one)).unwrap();
        assert_eq!(realm.children(list), &[one, two, three]);
        realm.insert_before(list, three, None).unwrap();
        assert_eq!(realm.children(list), &[one, two, three]);
    }

    #[test]
    fn invalid_tag_name() {
        let mut realm = Realm::default();
        let err = realm.create_element("1div").unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "InvalidCharacterError");
        assert_eq!(
            realm.create_element("DIV").map(|id| realm.tag_name(id)),
            Ok(Some("DIV".to_string()))
        );
    }

    #[test]
    fn text_content_round_trip() {
        let mut realm = Realm::default();
        let p = realm.create_element("p").unwrap();
        let a = realm.create_text_node("a");
        let b = realm.create_element("b").unwrap();
        let c = realm.create_text_node("c");
        realm.append_child(p, a).unwrap();
        realm.append_child(p, b).unwrap();
        realm.append_child(b, c).unwrap();
        assert_eq!(realm.text_content(p).as_deref(), Some("ac"));
        realm.set_text_content(p, "z");
        assert_eq!(realm.text_content(p).as_deref(), Some("z"));
        assert_eq!(realm.children(p).len(), 1);
        assert_eq!(realm.parent_node(b), None);
        assert_eq!(realm.text_content(realm.document()), None);
    }

    #[test]
    fn attributes_and_lookup_by_id() {
        let mut realm = Realm::default();
        let div = realm.create_element("div").unwrap();
        realm.set_attribute(div, "ID", "app").unwrap();
        let body = realm.body();
        realm.append_child(body, div).unwrap();
        assert_eq!(realm.get_element_by_id("app"), Some(div));
        assert_eq!(realm.element_id(div), "app");
        realm.remove_attribute(div, "id").unwrap();
        assert_eq!(realm.get_element_by_id("app"), None);
        let text = realm.create_text_node("t");
        let err = realm.set_attribute(text, "a", "b").unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "TypeError");
    }

    #[test]
    fn listeners_deduplicate_and_bubble_path() {
        let mut realm = Realm::default();
        let f = realm.new_function(FunctionKind::Closure(ClosureKey::new(0, 0)));
        let button = realm.create_element("button").unwrap();
        let body = realm.body();
        realm.append_child(body, button).unwrap();
        assert!(realm.add_event_listener(button, "click", f, false).unwrap());
        assert!(!realm.add_event_listener(button, "click", f, true).unwrap());
        assert_eq!(realm.listeners_for(button, "click").len(), 1);

        let ev = realm.create_event("click", true, true);
        let path = realm.begin_dispatch(ev, button).unwrap();
        assert_eq!(
            path,
            vec![
                button,
                body,
                realm.document_element(),
                realm.document(),
                realm.window()
            ]
        );
        let err = realm.begin_dispatch(ev, button).unwrap_err();
        assert_eq!(thrown_name(&realm, &err), "InvalidStateError");
        realm.prevent_default(ev);
        assert!(!realm.end_dispatch(ev));
    }

    #[test]
    fn non_cancelable_event_ignores_prevent_default() {
        let mut realm = Realm::default();
        let ev = realm.create_event("custom", false, false);
        realm.prevent_default(ev);
        assert!(!realm.event(ev).is_some_and(|e| e.default_prevented));
    }
}
