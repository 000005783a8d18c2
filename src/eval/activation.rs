use std::collections::HashMap;

use crate::ast::value::Value;

/// Supplies the values of free identifiers to an evaluating [`Program`](super::Program).
///
/// Comprehension variables are managed internally by the evaluator and do
/// not pass through this trait. Returning `None` makes the reference fail
/// with [`UndeclaredReference`](crate::EvalErrorKind::UndeclaredReference).
pub trait EvalContext {
    fn resolve(&self, name: &str) -> Option<Value>;
}

/// A minimal [`EvalContext`] backed by an in-memory map.
///
/// The template expander builds one per expansion (`data`, `ref`) and one
/// per fragment call (`args`, `ref`).
///
/// ```rust
/// use weaver_json::{Activation, Value};
///
/// let activation = Activation::new()
///     .with("data", Value::map([("name", Value::from("Ada"))]))
///     .with("limit", 3i64);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Activation {
    bindings: HashMap<String, Value>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`bind`](Activation::bind).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Bind a name. Accepts any type that implements `Into<Value>`.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

impl EvalContext for Activation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }
}
