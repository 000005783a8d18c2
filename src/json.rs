//! Conversion between `serde_json` documents and [`Value`].
//!
//! Input documents are converted once per expansion. Output is written
//! through `Serialize`, so key order is exactly the order the expander
//! produced. Whole numbers are written without a fractional part.

use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::ast::value::{Traits, Value};

/// Largest integer an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::map(map.iter().map(|(k, v)| (k.as_str(), Value::from(v))))
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from(&json)
    }
}

impl Value {
    /// Convert into a `serde_json` document.
    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Value::Object(obj) if obj.descriptor().has(Traits::ITERABLE | Traits::INDEXER) => {
                let mut out = serializer.serialize_map(Some(obj.size()))?;
                for key in obj.keys() {
                    let Value::String(key) = key else {
                        return Err(S::Error::custom(format!(
                            "{} yielded a non-string key",
                            obj.descriptor().name
                        )));
                    };
                    let value = obj.get(&key).map_err(S::Error::custom)?;
                    out.serialize_entry(&key, &value)?;
                }
                out.end()
            }
            Value::Object(obj) => serializer.serialize_str(obj.descriptor().name),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::template::OrderedObject;

    #[test]
    fn test_from_json_keeps_key_order() {
        let value = Value::from(json!({"z": 1, "a": [true, null], "m": "s"}));
        let keys: Vec<&String> = value.as_map().unwrap().keys().collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn test_whole_numbers_serialize_as_integers() {
        let value = Value::list([Value::Number(40.0), Value::Number(2.5), Value::Number(-3.0)]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[40,2.5,-3]");
    }

    #[test]
    fn test_ordered_object_serializes_as_object() {
        let mut obj = OrderedObject::new();
        obj.insert("second", Value::from("b"));
        obj.insert("first", Value::from("a"));
        let value = Value::from(obj);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"second":"b","first":"a"}"#
        );
        assert_eq!(value.to_json().unwrap(), json!({"second": "b", "first": "a"}));
    }
}
