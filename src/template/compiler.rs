//! JSON template text to [`CompiledNode`] tree.

use indexmap::IndexMap;
use tracing::trace;

use super::node::CompiledNode;
use crate::ast::value::Value;
use crate::error::CompileError;
use crate::registry::Env;

/// Compile template text against `env`.
///
/// The root must be an object or a list. Every string leaf is compiled as
/// an expression; the first leaf that fails aborts the whole compile.
pub fn compile(text: &str, env: &Env) -> Result<CompiledNode, CompileError> {
    let document: serde_json::Value = serde_json::from_str(text)?;
    compile_document(&document, env)
}

/// Compile an already parsed template document.
pub fn compile_document(
    document: &serde_json::Value,
    env: &Env,
) -> Result<CompiledNode, CompileError> {
    match document {
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            compile_node(document, env, "")
        }
        other => Err(CompileError::InvalidRoot {
            found: json_kind(other),
        }),
    }
}

fn compile_node(
    value: &serde_json::Value,
    env: &Env,
    path: &str,
) -> Result<CompiledNode, CompileError> {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries = IndexMap::with_capacity(map.len());
            for (key, child) in map {
                let child_path = format!("{path}/{}", escape_pointer(key));
                entries.insert(key.clone(), compile_node(child, env, &child_path)?);
            }
            Ok(CompiledNode::Object(entries))
        }
        serde_json::Value::Array(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for (i, child) in items.iter().enumerate() {
                nodes.push(compile_node(child, env, &format!("{path}/{i}"))?);
            }
            Ok(CompiledNode::List(nodes))
        }
        serde_json::Value::String(source) => {
            trace!(path, expression = %source, "compiling expression");
            env.compile(source)
                .map(CompiledNode::Expression)
                .map_err(|errors| CompileError::Expression {
                    path: if path.is_empty() { "/".to_string() } else { path.to_string() },
                    expression: source.clone(),
                    errors,
                })
        }
        serde_json::Value::Bool(b) => Ok(CompiledNode::Literal(Value::Bool(*b))),
        serde_json::Value::Number(n) => Ok(CompiledNode::Literal(
            n.as_f64().map_or(Value::Null, Value::Number),
        )),
        serde_json::Value::Null => Ok(CompiledNode::Literal(Value::Null)),
    }
}

/// RFC 6901 escaping for a single pointer segment.
fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
