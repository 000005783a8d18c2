use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::expander::ErrorPolicy;
use crate::ast::value::Value;
use crate::registry::Function;

/// Configuration for building a [`Template`](super::Template).
///
/// All options have sensible defaults: no reference data, no fragments,
/// and every evaluation failure drops the entry that produced it.
///
/// ```rust
/// use serde_json::json;
/// use weaver_json::TemplateOptions;
///
/// let opts = TemplateOptions::new()
///     .reference(json!({"status": {"1": "active"}}))
///     .missing_key_errors(true)
///     .fragment("person", r#"{"Name": "args[0].name"}"#);
/// ```
#[derive(Clone, Default)]
pub struct TemplateOptions {
    /// Static data bound to `ref` in the template and in every fragment.
    /// Without it `ref` is an empty map.
    pub reference: Option<Value>,

    /// When `true`, a missing key or attribute aborts the expansion
    /// instead of dropping the entry.
    pub missing_key_errors: bool,

    /// When `true`, every evaluation failure aborts the expansion, and a
    /// reference to an undeclared identifier fails to compile.
    pub strict_errors: bool,

    /// Host functions available to the template and to fragments.
    pub functions: Vec<Arc<dyn Function>>,

    /// Host constants, declared and bound in the template and in fragments.
    /// `data`, `ref` and `args` take precedence over a constant of the same
    /// name.
    pub variables: IndexMap<String, Value>,

    /// Fragment template texts by name.
    pub fragments: IndexMap<String, String>,
}

impl TemplateOptions {
    /// Create a new `TemplateOptions` with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reference data bound to `ref`.
    pub fn reference(mut self, reference: impl Into<Value>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn missing_key_errors(mut self, enabled: bool) -> Self {
        self.missing_key_errors = enabled;
        self
    }

    pub fn strict_errors(mut self, enabled: bool) -> Self {
        self.strict_errors = enabled;
        self
    }

    /// Register a host function. A later function with the same name
    /// replaces an earlier one, including standard functions.
    pub fn function(mut self, function: impl Function + 'static) -> Self {
        self.functions.push(Arc::new(function));
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Add a named fragment. Fragments are compiled when the template is
    /// built; a later fragment with the same name replaces an earlier one.
    pub fn fragment(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fragments.insert(name.into(), text.into());
        self
    }

    pub fn fragments<N, T>(mut self, fragments: impl IntoIterator<Item = (N, T)>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        self.fragments
            .extend(fragments.into_iter().map(|(n, t)| (n.into(), t.into())));
        self
    }

    pub(crate) fn policy(&self) -> ErrorPolicy {
        ErrorPolicy {
            missing_keys: self.missing_key_errors,
            all: self.strict_errors,
        }
    }
}

impl fmt::Debug for TemplateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let functions: Vec<String> = self
            .functions
            .iter()
            .map(|func| func.signature().name)
            .collect();
        f.debug_struct("TemplateOptions")
            .field("reference", &self.reference.is_some())
            .field("missing_key_errors", &self.missing_key_errors)
            .field("strict_errors", &self.strict_errors)
            .field("functions", &functions)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("fragments", &self.fragments.keys().collect::<Vec<_>>())
            .finish()
    }
}
