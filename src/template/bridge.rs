//! Ordered object output, exposed to expressions as an extension value.
//!
//! Every JSON object the expander produces is an [`OrderedObject`]. Because
//! it is also an [`ObjectValue`], a fragment result can be used directly in
//! the enclosing expression: `fragment('person', data).Name`,
//! `'Name' in fragment('person', data)`, `size(fragment('person', data))`.

use std::any::Any;

use crate::ast::value::{ObjectValue, Traits, TypeDescriptor, Value, ValueMap};
use crate::error::EvalError;

/// Descriptor registered in every template and fragment environment.
pub static ORDERED_OBJECT_TYPE: TypeDescriptor = TypeDescriptor::new(
    "OrderedObject",
    Traits::INDEXER
        .union(Traits::ITERABLE)
        .union(Traits::SIZER)
        .union(Traits::CONTAINER),
);

/// String-keyed entries in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderedObject {
    entries: ValueMap,
}

impl OrderedObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: ValueMap::with_capacity(capacity),
        }
    }

    /// Insert or replace an entry. A replaced key keeps its position.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    pub fn entries(&self) -> &ValueMap {
        &self.entries
    }

    pub fn into_entries(self) -> ValueMap {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

impl ObjectValue for OrderedObject {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &ORDERED_OBJECT_TYPE
    }

    fn get(&self, key: &str) -> Result<Value, EvalError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| EvalError::no_such_key(key))
    }

    fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn keys(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        Box::new(self.entries.keys().map(|k| Value::String(k.clone())))
    }

    fn size(&self) -> usize {
        self.entries.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FromIterator<(String, Value)> for OrderedObject {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<OrderedObject> for Value {
    fn from(object: OrderedObject) -> Self {
        Value::object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvalErrorKind;

    fn sample() -> OrderedObject {
        [
            ("b".to_string(), Value::from(1i64)),
            ("a".to_string(), Value::from("x")),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_lookup() {
        let obj = sample();
        assert_eq!(ObjectValue::get(&obj, "a").unwrap(), Value::from("x"));
        let err = ObjectValue::get(&obj, "zzz").unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::NoSuchKey);
        assert!(obj.contains_key("b"));
        assert!(!obj.contains_key("c"));
    }

    #[test]
    fn test_keys_keep_insertion_order_and_restart() {
        let obj = sample();
        let first: Vec<Value> = obj.keys().collect();
        let second: Vec<Value> = obj.keys().collect();
        assert_eq!(first, vec![Value::from("b"), Value::from("a")]);
        assert_eq!(first, second);
        assert_eq!(obj.size(), 2);
    }

    #[test]
    fn test_equality_is_identity() {
        let one = Value::from(sample());
        let same = one.clone();
        let other = Value::from(sample());
        assert_eq!(one, same);
        assert_ne!(one, other);
    }

    #[test]
    fn test_descriptor() {
        let value = Value::from(sample());
        assert_eq!(value.type_name(), "OrderedObject");
        assert!(ORDERED_OBJECT_TYPE.has(Traits::INDEXER | Traits::CONTAINER));
        assert!(value.downcast_object::<OrderedObject>().is_some());
    }
}
