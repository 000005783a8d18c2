use std::any::Any;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;

use crate::error::EvalError;

/// Ordered string-keyed map backing [`Value::Map`].
pub type ValueMap = IndexMap<String, Value>;

/// The set of runtime value types.
///
/// Input documents, reference data, expression results and expanded
/// template output are all `Value`s. Lists and maps are reference-counted
/// so that resolving `data.person` does not copy the input document.
///
/// Conversion from common Rust types is provided via `From` impls:
///
/// ```rust
/// use weaver_json::Value;
///
/// let s: Value = "hello".into();
/// let n: Value = 42i64.into();
/// let b: Value = true.into();
/// let l: Value = vec!["a", "b"].into();
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// JSON `null`.
    Null,
    Bool(bool),
    /// All numbers are 64-bit floats. Whole numbers serialize without a
    /// fractional part.
    Number(f64),
    String(String),
    List(Arc<Vec<Value>>),
    /// A native map, produced by input documents and map literals.
    Map(Arc<ValueMap>),
    /// A host-defined extension value, e.g. an expanded template object.
    Object(Arc<dyn ObjectValue>),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn object(object: impl ObjectValue) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Type name for diagnostic messages and the `type()` function
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Object(obj) => obj.descriptor().name,
        }
    }

    /// Convert this value to its plain string form.
    ///
    /// - `String` — returned as-is
    /// - `Number` — formatted without trailing `.0` for whole numbers
    /// - `Bool` — `"true"` or `"false"`
    /// - `Null` — `"null"`
    /// - `List` / `Map` — a bracketed rendering of the elements
    /// - `Object` — the extension type name
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::List(items) => format!(
                "[{}]",
                items
                    .iter()
                    .map(|v| v.to_output_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Map(map) => format!(
                "{{{}}}",
                map.iter()
                    .map(|(k, v)| format!("{k}: {}", v.to_output_string()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Object(obj) => obj.descriptor().name.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ValueMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&dyn ObjectValue> {
        match self {
            Value::Object(obj) => Some(obj.as_ref()),
            _ => None,
        }
    }

    /// Downcast an extension value to its concrete host type.
    pub fn downcast_object<T: ObjectValue>(&self) -> Option<&T> {
        self.as_object()?.as_any().downcast_ref::<T>()
    }
}

/// Whole numbers print without a fractional part so that `string(42)` is
/// `"42"`, not `"42.0"`.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same_instance(b.as_ref()),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_output_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map))
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ── Extension types ─────────────────────────────────────────────────────

bitflags! {
    /// Capabilities an extension type offers to expressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Traits: u8 {
        /// `obj.key` and `obj['key']`
        const INDEXER = 1;
        /// Comprehension macros walk the keys.
        const ITERABLE = 1 << 1;
        /// `size(obj)`
        const SIZER = 1 << 2;
        /// `'key' in obj` and `has(obj.key)`
        const CONTAINER = 1 << 3;
    }
}

/// Static description of an extension type, registered with
/// [`Env::register_type`](crate::Env::register_type).
///
/// A registered type's name can be used as an identifier inside
/// expressions and compares equal to `type(value)` for its instances.
#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub traits: Traits,
}

impl TypeDescriptor {
    pub const fn new(name: &'static str, traits: Traits) -> Self {
        Self { name, traits }
    }

    pub fn has(&self, traits: Traits) -> bool {
        self.traits.contains(traits)
    }
}

/// A host-defined value usable inside expressions.
///
/// The evaluator only calls the operations whose [`Traits`] the type's
/// descriptor advertises. Equality between extension values is identity:
/// two values are equal only when they are the same instance.
///
/// Extension values do not convert to native values. `string()` yields
/// the type name and `dyn()` yields the value itself; every other
/// conversion fails.
pub trait ObjectValue: fmt::Debug + Send + Sync + 'static {
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// Look up `key`. An absent key must report
    /// [`EvalErrorKind::NoSuchKey`](crate::EvalErrorKind::NoSuchKey).
    fn get(&self, key: &str) -> Result<Value, EvalError>;

    fn contains_key(&self, key: &str) -> bool;

    /// A fresh iterator over the keys, in the type's natural order.
    fn keys(&self) -> Box<dyn Iterator<Item = Value> + '_>;

    fn size(&self) -> usize;

    fn as_any(&self) -> &dyn Any;

    fn same_instance(&self, other: &dyn ObjectValue) -> bool {
        std::ptr::addr_eq(self as *const Self, other as *const dyn ObjectValue)
    }
}
