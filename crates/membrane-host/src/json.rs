//! `JSON.parse` / `JSON.stringify` over host values, via `serde_json`.

use serde_json::{Map, Number, Value};

use crate::error::Completion;
use crate::object::ObjectKind;
use crate::realm::Realm;
use crate::value::{HostValue, ObjectId};

/// Integral numbers serialize without a fraction; non-finite ones as `null`.
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl Realm {
    /// `JSON.parse(text)`; malformed input throws `SyntaxError`.
    pub fn json_parse(&mut self, text: &str) -> Completion<HostValue> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Ok(self.json_to_host(value)),
            Err(e) => Err(self.syntax_error(&format!("JSON.parse: {e}"))),
        }
    }

    /// Convert a JSON document into host values.
    pub fn json_to_host(&mut self, value: Value) -> HostValue {
        match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => HostValue::String(s),
            Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(|item| self.json_to_host(item))
                    .collect();
                HostValue::Object(self.new_array(items))
            }
            Value::Object(map) => {
                let id = self.new_object();
                for (key, item) in map {
                    let item = self.json_to_host(item);
                    self.object_mut(id).set_property(&key, item);
                }
                HostValue::Object(id)
            }
        }
    }

    /// `JSON.stringify(value)`; `None` for `undefined` and functions. Cycles
    /// throw `TypeError`.
    pub fn json_stringify(&mut self, value: &HostValue) -> Completion<Option<String>> {
        let mut stack = Vec::new();
        match self.to_json_value(value, &mut stack) {
            Ok(Some(json)) => Ok(Some(json.to_string())),
            Ok(None) => Ok(None),
            Err(()) => Err(self.type_error("Converting circular structure to JSON")),
        }
    }

    fn to_json_value(
        &self,
        value: &HostValue,
        stack: &mut Vec<ObjectId>,
    ) -> Result<Option<Value>, ()> {
        let json = match value {
            HostValue::Undefined => return Ok(None),
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Number(n) => number_to_json(*n),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::Object(id) => {
                if stack.contains(id) {
                    return Err(());
                }
                stack.push(*id);
                let object = self.object(*id);
                let json = match &object.kind {
                    ObjectKind::Function(_) => {
                        stack.pop();
                        return Ok(None);
                    }
                    ObjectKind::Array(items) => {
                        let mut out = Vec::with_capacity(items.len());
                        for item in items {
                            out.push(self.to_json_value(item, stack)?.unwrap_or(Value::Null));
                        }
                        Value::Array(out)
                    }
                    _ => {
                        let mut map = Map::new();
                        for (key, item) in &object.properties {
                            if let Some(v) = self.to_json_value(item, stack)? {
                                map.insert(key.clone(), v);
                            }
                        }
                        Value::Object(map)
                    }
                };
                stack.pop();
                json
            }
        };
        Ok(Some(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_then_stringify_keeps_key_order() {
        let mut realm = Realm::default();
        let v = realm.json_parse(r#"{"b":1,"a":[true,null,"x"]}"#).unwrap();
        assert_eq!(
            realm.json_stringify(&v).unwrap().as_deref(),
            Some(r#"{"b":1,"a":[true,null,"x"]}"#)
        );
    }

    #[test]
    fn malformed_json_is_syntax_error() {
        let mut realm = Realm::default();
        let thrown = realm.json_parse("{").unwrap_err();
        assert_eq!(realm.error_parts(thrown.value()).map(|e| e.0), Some("SyntaxError"));
    }

    #[test]
    fn undefined_and_cycles() {
        let mut realm = Realm::default();
        assert_eq!(realm.json_stringify(&HostValue::Undefined), Ok(None));
        let obj = realm.new_object();
        realm.object_mut(obj).set_property("self", obj.into());
        assert!(realm.json_stringify(&obj.into()).is_err());
    }

    #[test]
    fn nan_becomes_null() {
        let mut realm = Realm::default();
        assert_eq!(
            realm.json_stringify(&HostValue::Number(f64::NAN)),
            Ok(Some("null".to_string()))
        );
    }
}
