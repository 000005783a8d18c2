//! Walks a [`CompiledNode`] tree against an activation.
//!
//! Each expression leaf ends in one of three ways:
//!
//! - a value, written to the output;
//! - [`Interrupt::Remove`], the entry or element is omitted;
//! - a failure, the entry or element is omitted unless the
//!   [`ErrorPolicy`] says the failure must abort the expansion.

use tracing::trace;

use super::bridge::OrderedObject;
use super::node::CompiledNode;
use crate::ast::value::Value;
use crate::error::EvalError;
use crate::eval::{EvalContext, Interrupt};
use crate::registry::{Function, FunctionSignature, OverloadDef};

/// Which evaluation failures abort an expansion instead of dropping the
/// entry that produced them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// Abort on missing keys.
    pub missing_keys: bool,
    /// Abort on every failure.
    pub all: bool,
}

impl ErrorPolicy {
    pub fn raises(&self, error: &EvalError) -> bool {
        self.all || (self.missing_keys && error.is_missing_key())
    }
}

/// Expand `node`. Objects become [`OrderedObject`]s, lists become lists.
pub fn expand(
    node: &CompiledNode,
    ctx: &impl EvalContext,
    policy: ErrorPolicy,
) -> Result<Value, EvalError> {
    Ok(expand_node(node, ctx, policy)?.unwrap_or(Value::Null))
}

/// `Ok(None)` means the node produced nothing and must be omitted.
fn expand_node(
    node: &CompiledNode,
    ctx: &impl EvalContext,
    policy: ErrorPolicy,
) -> Result<Option<Value>, EvalError> {
    match node {
        CompiledNode::Literal(value) => Ok(Some(value.clone())),
        CompiledNode::Object(entries) => {
            let mut out = OrderedObject::with_capacity(entries.len());
            for (key, child) in entries {
                match expand_node(child, ctx, policy)? {
                    Some(value) => out.insert(key.as_str(), value),
                    None => trace!(key = %key, "entry omitted"),
                }
            }
            Ok(Some(Value::from(out)))
        }
        CompiledNode::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (index, child) in items.iter().enumerate() {
                match expand_node(child, ctx, policy)? {
                    Some(value) => out.push(value),
                    None => trace!(index, "element omitted"),
                }
            }
            Ok(Some(Value::list(out)))
        }
        CompiledNode::Expression(program) => match program.eval(ctx) {
            Ok(value) => Ok(Some(value)),
            Err(Interrupt::Remove) => {
                trace!(expression = program.source(), "removed");
                Ok(None)
            }
            Err(Interrupt::Failed(error)) if policy.raises(&error) => Err(error),
            Err(Interrupt::Failed(error)) => {
                trace!(expression = program.source(), error = %error, "evaluation failed");
                Ok(None)
            }
        },
    }
}

/// `remove_property()`: omit the current entry from the output.
pub(crate) struct RemoveProperty;

impl Function for RemoveProperty {
    fn call(&self, _receiver: Option<Value>, _args: Vec<Value>) -> Result<Value, Interrupt> {
        Err(Interrupt::Remove)
    }

    fn signature(&self) -> FunctionSignature {
        FunctionSignature::new("remove_property").overload(OverloadDef::global([]))
    }
}
