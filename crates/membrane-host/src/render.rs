//! HTML serialization of the DOM.

use crate::object::NodeData;
use crate::realm::Realm;
use crate::value::ObjectId;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attribute(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

impl Realm {
    /// `element.outerHTML`; for the document, the serialized children.
    pub fn outer_html(&self, id: ObjectId) -> String {
        let mut out = String::new();
        self.serialize(id, &mut out);
        out
    }

    /// `element.innerHTML`.
    pub fn inner_html(&self, id: ObjectId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.serialize(*child, &mut out);
        }
        out
    }

    fn serialize(&self, id: ObjectId, out: &mut String) {
        let Some(node) = self.object(id).node() else {
            return;
        };
        match &node.data {
            NodeData::Document => {
                for child in &node.children {
                    self.serialize(*child, out);
                }
            }
            NodeData::Text(text) => escape_text(text, out),
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attribute(value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for child in &node.children {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_nested_tree() {
        let mut realm = Realm::default();
        let div = realm.create_element("div").unwrap();
        realm.set_attribute(div, "class", "a \"b\"").unwrap();
        let input = realm.create_element("input").unwrap();
        let text = realm.create_text_node("1 < 2 & 3");
        realm.append_child(div, input).unwrap();
        realm.append_child(div, text).unwrap();
        let body = realm.body();
        realm.append_child(body, div).unwrap();
        assert_eq!(
            realm.outer_html(div),
            r#"<div class="a &quot;b&quot;"><input>1 &lt; 2 &amp; 3</div>"#
        );
        assert_eq!(
            realm.outer_html(realm.document()),
            format!("<html><body>{}</body></html>", realm.outer_html(div))
        );
        assert_eq!(realm.inner_html(body), realm.outer_html(div));
    }
}
