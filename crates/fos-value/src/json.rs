//! JSON interop
//!
//! `undefined`, non-finite numbers and containers nested inside themselves
//! have no JSON form and become `null`.

use crate::{Array, Nested, Object, Value};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect::<Array>())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect::<Object>(),
            ),
        }
    }
}

impl Value {
    /// Parse a JSON document
    pub fn from_json_str(text: &str) -> Result<Value, serde_json::Error> {
        serde_json::from_str::<serde_json::Value>(text).map(Value::from)
    }

    /// Convert to a JSON tree
    pub fn to_json(&self) -> serde_json::Value {
        Nested::top(self).to_json()
    }
}

impl Nested<'_> {
    fn to_json(&self) -> serde_json::Value {
        if self.is_cycle() {
            return serde_json::Value::Null;
        }
        match self.value {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => json_number(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Array(a) => serde_json::Value::Array(
                a.to_vec().iter().map(|item| self.inner(item).to_json()).collect(),
            ),
            Value::Object(o) => serde_json::Value::Object(
                o.entries().iter().map(|(k, v)| (k.clone(), self.inner(v).to_json())).collect(),
            ),
        }
    }
}

fn json_number(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Nested::top(self).serialize(serializer)
    }
}

impl Serialize for Nested<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_cycle() {
            return serializer.serialize_unit();
        }
        match self.value {
            Value::Undefined | Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if !n.is_finite() => serializer.serialize_unit(),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(a) => {
                let items = a.to_vec();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in &items {
                    seq.serialize_element(&self.inner(item))?;
                }
                seq.end()
            }
            Value::Object(o) => {
                let entries = o.entries();
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in &entries {
                    map.serialize_entry(key, &self.inner(item))?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document() {
        let value = Value::from_json_str(r#"{"name": "Jane", "tags": [1, 2.5, null]}"#).unwrap();
        let record = value.as_object().unwrap();
        assert_eq!(record.get("name").as_str(), Some("Jane"));
        assert_eq!(record.get("tags"), Value::array([Value::from(1), Value::from(2.5), Value::Null]));
    }

    #[test]
    fn test_non_finite_becomes_null() {
        let value = Value::array([Value::Number(f64::NAN), Value::Undefined, Value::from(2)]);
        assert_eq!(value.to_json().to_string(), "[null,null,2]");
        assert_eq!(serde_json::to_string(&value).unwrap(), "[null,null,2]");
    }

    #[test]
    fn test_serialize_record() {
        let value = Value::object([("b", Value::from(true)), ("a", Value::from("x"))]);
        assert_eq!(serde_json::to_string(&value).unwrap(), r#"{"a":"x","b":true}"#);
    }

    #[test]
    fn test_deserialize_through_serde() {
        let value: Value = serde_json::from_str("[1, {\"k\": \"v\"}]").unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
    }
}
