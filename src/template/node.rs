use indexmap::IndexMap;

use crate::ast::value::Value;
use crate::eval::Program;

/// A compiled template tree.
///
/// Mirrors the template document: objects keep their declaration order,
/// lists keep their element order, and every string leaf is a compiled
/// expression.
#[derive(Debug, Clone)]
pub enum CompiledNode {
    /// A boolean, number or `null` copied verbatim to the output.
    Literal(Value),
    Expression(Program),
    Object(IndexMap<String, CompiledNode>),
    List(Vec<CompiledNode>),
}

impl CompiledNode {
    pub fn kind_name(&self) -> &'static str {
        match self {
            CompiledNode::Literal(_) => "literal",
            CompiledNode::Expression(_) => "expression",
            CompiledNode::Object(_) => "object",
            CompiledNode::List(_) => "list",
        }
    }

    /// Number of expression leaves in this subtree.
    pub fn expression_count(&self) -> usize {
        match self {
            CompiledNode::Literal(_) => 0,
            CompiledNode::Expression(_) => 1,
            CompiledNode::Object(entries) => {
                entries.values().map(CompiledNode::expression_count).sum()
            }
            CompiledNode::List(items) => items.iter().map(CompiledNode::expression_count).sum(),
        }
    }
}
