//! # weaver-json
//!
//! JSON document templates with embedded expressions. A template is an
//! ordinary JSON object or array whose string leaves are expressions;
//! expanding it against input data produces a document of the same shape
//! with every expression replaced by its value.
//!
//! The crate is split into two layers:
//!
//! - **The expression language** (parsing, checking, evaluation) lives in
//!   [`ast`], [`eval`] and [`registry`]. It knows nothing about templates.
//! - **The template engine** ([`template`]) compiles template documents,
//!   expands them, and exposes fragments and ordered output objects to the
//!   expression language through [`Function`] and [`ObjectValue`].
//!
//! ## Quick start
//!
//! ```rust
//! use serde_json::json;
//!
//! let out = weaver_json::render(
//!     r#"{"name": "data.name", "secret": "remove_property()", "tags": ["'a'", "missing"]}"#,
//!     &json!({"name": "Ada"}),
//! )
//! .unwrap();
//! assert_eq!(out, r#"{"name":"Ada","tags":["a"]}"#);
//! ```
//!
//! ## Fragments
//!
//! Fragments are named sub-templates, expanded with `fragment(name, args...)`
//! or once per list element with `list.fragment(name, args...)`. Their
//! result is an ordinary value the calling expression can keep working on:
//!
//! ```rust
//! use serde_json::json;
//! use weaver_json::{Template, TemplateOptions};
//!
//! let options = TemplateOptions::new()
//!     .fragment("person", r#"{"Name": "args[0].name", "Colour": "args[1]"}"#);
//! let template = Template::with_options(
//!     r#"{
//!         "owner": "fragment('person', data.owner, 'blue')",
//!         "ownerName": "fragment('person', data.owner, 'red').Name",
//!         "pets": "data.pets.fragment('person', 'green')"
//!     }"#,
//!     options,
//! )
//! .unwrap();
//!
//! let out = template
//!     .expand(&json!({"owner": {"name": "Ada"}, "pets": [{"name": "Rex"}]}))
//!     .unwrap();
//! assert_eq!(
//!     out,
//!     r#"{"owner":{"Name":"Ada","Colour":"blue"},"ownerName":"Ada","pets":[{"Name":"Rex","Colour":"green"}]}"#
//! );
//! ```
//!
//! ## Failures
//!
//! By default an expression that fails to evaluate drops the entry it
//! belongs to. [`TemplateOptions::missing_key_errors`] makes missing keys
//! abort the expansion instead, and [`TemplateOptions::strict_errors`] does
//! the same for every failure.
//!
//! ```rust
//! use serde_json::json;
//! use weaver_json::{EvalErrorKind, Template, TemplateError, TemplateOptions};
//!
//! let text = r#"{"a": "data.missing", "b": "'kept'"}"#;
//!
//! let lenient = Template::new(text).unwrap();
//! assert_eq!(lenient.expand(&json!({})).unwrap(), r#"{"b":"kept"}"#);
//!
//! let options = TemplateOptions::new().missing_key_errors(true);
//! let strict = Template::with_options(text, options).unwrap();
//! match strict.expand(&json!({})) {
//!     Err(TemplateError::Eval(e)) => assert_eq!(e.kind, EvalErrorKind::NoSuchKey),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

pub mod ast;
pub mod error;
pub mod eval;
mod json;
mod parser;
pub mod registry;
pub mod template;

pub use ast::span::{Span, Spanned};
pub use ast::value::{ObjectValue, Traits, TypeDescriptor, Value, ValueMap};
pub use error::{CompileError, EvalError, EvalErrorKind, ParseError, TemplateError};
pub use eval::{Activation, EvalContext, Interrupt, Program};
pub use parser::parse_expr;
pub use registry::{
    CallStyle, ClosureFunction, Env, Function, FunctionSignature, OverloadDef, ParamDef, Registry,
    ValueType,
};
pub use template::{CompiledNode, ErrorPolicy, OrderedObject, Template, TemplateOptions};

/// Compile a template and expand it once with default options.
///
/// For repeated expansion of the same template, build a [`Template`] once
/// to avoid recompiling.
pub fn render(template: &str, data: &serde_json::Value) -> Result<String, TemplateError> {
    Ok(Template::new(template)?.expand(data)?)
}

/// Compile a template with `options` and expand it once.
pub fn render_with_options(
    template: &str,
    options: TemplateOptions,
    data: &serde_json::Value,
) -> Result<String, TemplateError> {
    Ok(Template::with_options(template, options)?.expand(data)?)
}
