//! JSON document templates.
//!
//! A template is a JSON object or array whose string leaves are
//! expressions. [`Template::with_options`] compiles it once; each call to
//! [`Template::expand`] evaluates the expressions against new input and
//! produces a document of the same shape.
//!
//! Inside a template the following are available:
//!
//! - `data`: the input document passed to `expand`;
//! - `ref`: the reference data given in [`TemplateOptions::reference`],
//!   an empty map when none was given;
//! - `remove_property()`: omits the entry it appears in;
//! - `fragment(name, args...)`: expands a named fragment, see
//!   [`fragment`](self::fragment).
//!
//! Fragments see `ref` and `args` instead of `data`.

use std::sync::Arc;

use tracing::debug;

use crate::ast::value::{Value, ValueMap};
use crate::error::{CompileError, EvalError, TemplateError};
use crate::eval::Activation;
use crate::registry::{Env, ValueType};

mod bridge;
mod compiler;
mod expander;
pub mod fragment;
mod node;
mod options;

pub use bridge::{ORDERED_OBJECT_TYPE, OrderedObject};
pub use compiler::{compile, compile_document};
pub use expander::{ErrorPolicy, expand};
pub use fragment::{FRAGMENT_FUNCTION, Fragments, MAX_FRAGMENT_ARGS, compile_fragments};
pub use node::CompiledNode;
pub use options::TemplateOptions;

use expander::RemoveProperty;
use fragment::FragmentFunction;

/// A compiled JSON template.
///
/// Immutable once built and safe to share between threads. Expanding does
/// not carry any state from one call to the next.
///
/// ```rust
/// use serde_json::json;
/// use weaver_json::{Template, TemplateOptions};
///
/// let text =
///     r#"{"id": "data.id", "status": "ref.status[data.status]", "x": "remove_property()"}"#;
/// let options = TemplateOptions::new().reference(json!({"status": {"1": "active"}}));
/// let template = Template::with_options(text, options).unwrap();
///
/// let out = template.expand(&json!({"id": 7, "status": 1})).unwrap();
/// assert_eq!(out, r#"{"id":7,"status":"active"}"#);
/// ```
#[derive(Debug)]
pub struct Template {
    root: CompiledNode,
    fragments: Arc<Fragments>,
    base: Activation,
    policy: ErrorPolicy,
}

impl Template {
    /// Compile a template with default options.
    pub fn new(text: &str) -> Result<Self, CompileError> {
        Self::with_options(text, TemplateOptions::default())
    }

    /// Compile a template and its fragments.
    pub fn with_options(text: &str, options: TemplateOptions) -> Result<Self, CompileError> {
        let policy = options.policy();
        let base = base_activation(&options);

        let mut fragment_env = shared_env(&options);
        fragment_env.declare_variable("args", ValueType::List);
        let fragments = Arc::new(compile_fragments(&options.fragments, &fragment_env)?);

        let mut env = shared_env(&options);
        env.declare_variable("data", ValueType::Any);
        env.register_function(FragmentFunction::new(
            Arc::clone(&fragments),
            base.clone(),
            policy,
        ));
        let root = compile(text, &env)?;

        debug!(
            expressions = root.expression_count(),
            fragments = ?fragments.names().collect::<Vec<_>>(),
            missing_key_errors = policy.missing_keys,
            strict_errors = policy.all,
            "template compiled"
        );

        Ok(Self {
            root,
            fragments,
            base,
            policy,
        })
    }

    pub fn root(&self) -> &CompiledNode {
        &self.root
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    /// Expand against `data`, returning the output as a [`Value`].
    /// Objects in the output are [`OrderedObject`]s.
    pub fn expand_value(&self, data: impl Into<Value>) -> Result<Value, EvalError> {
        let activation = self.base.clone().with("data", data);
        expand(&self.root, &activation, self.policy)
    }

    /// Expand against `data`, returning a `serde_json` document.
    pub fn expand_to_json(
        &self,
        data: &serde_json::Value,
    ) -> Result<serde_json::Value, TemplateError> {
        Ok(self.expand_value(data)?.to_json()?)
    }

    /// Expand against `data`, returning compact JSON text.
    pub fn expand(&self, data: &serde_json::Value) -> Result<String, TemplateError> {
        let value = self.expand_value(data)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Expand against raw JSON input text.
    pub fn expand_str(&self, data: &str) -> Result<String, TemplateError> {
        let data: serde_json::Value = serde_json::from_str(data)?;
        self.expand(&data)
    }
}

/// Declarations shared by the template and its fragments.
fn shared_env(options: &TemplateOptions) -> Env {
    let mut env = Env::new();
    env.declare_variable("ref", ValueType::Any)
        .register_function(RemoveProperty)
        .register_type(&ORDERED_OBJECT_TYPE)
        .reject_undeclared(options.strict_errors);
    for name in options.variables.keys() {
        env.declare_variable(name.as_str(), ValueType::Any);
    }
    for function in &options.functions {
        env.register_shared_function(Arc::clone(function));
    }
    env
}

fn base_activation(options: &TemplateOptions) -> Activation {
    let mut activation = Activation::new();
    for (name, value) in &options.variables {
        activation.bind(name.as_str(), value.clone());
    }
    let reference = options
        .reference
        .clone()
        .unwrap_or_else(|| Value::from(ValueMap::new()));
    activation.bind("ref", reference);
    activation
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_template_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
    }

    #[test]
    fn test_user_function_replaces_standard_one() {
        use crate::registry::ClosureFunction;

        let options = TemplateOptions::new().function(ClosureFunction::new("size", |_, _| {
            Ok(Value::from("custom"))
        }));
        let template = Template::with_options(r#"{"s": "size([1])"}"#, options).unwrap();
        assert_eq!(template.expand(&json!({})).unwrap(), r#"{"s":"custom"}"#);
    }

    #[test]
    fn test_variables_visible_everywhere() {
        let options = TemplateOptions::new()
            .variable("tenant", "acme")
            .fragment("f", r#"{"t": "tenant"}"#);
        let template =
            Template::with_options(r#"{"t": "tenant", "f": "fragment('f')"}"#, options).unwrap();
        assert_eq!(
            template.expand(&json!({})).unwrap(),
            r#"{"t":"acme","f":{"t":"acme"}}"#
        );
    }

    #[test]
    fn test_data_takes_precedence_over_variable() {
        let options = TemplateOptions::new().variable("data", "shadowed");
        let template = Template::with_options(r#"{"d": "data.x"}"#, options).unwrap();
        assert_eq!(template.expand(&json!({"x": 1})).unwrap(), r#"{"d":1}"#);
    }

    #[test]
    fn test_fragment_compile_error_aborts_template() {
        let options = TemplateOptions::new().fragment("bad", r#"{"x": "nope("}"#);
        let err = Template::with_options(r#"{"a": "1"}"#, options).unwrap_err();
        assert!(matches!(err, CompileError::Fragment { ref name, .. } if name == "bad"));
    }
}
