//! Abstract syntax tree and value types for the expression language.
//!
//! Every string leaf of a JSON template is an expression. The parser turns
//! it into an [`Expr`] tree, which [`Env::compile`](crate::Env::compile)
//! checks and wraps in a [`Program`](crate::Program).
//!
//! - **Expression layer** ([`expr`]): operators, selections, calls and
//!   comprehension macros, each carrying a [`Span`] into the source text.
//! - **Value layer** ([`value`]): the runtime [`Value`] produced by
//!   evaluation and by template expansion, including host-defined
//!   extension objects ([`ObjectValue`]).

pub mod expr;
pub mod span;
pub mod value;

// Convenience re-exports
pub use expr::*;
pub use span::{Span, Spanned};
pub use value::{ObjectValue, Traits, TypeDescriptor, Value, ValueMap};
