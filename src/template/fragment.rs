//! Named sub-templates and the `fragment()` function that expands them.
//!
//! Fragments compile in their own environment: `ref` and `args` are
//! declared, `data` is not, and `fragment` itself is not registered, so a
//! fragment cannot call another fragment.
//!
//! ```text
//! fragment('person', data.owner)            -> expanded fragment
//! fragment('person', data.owner).Name       -> a field of it
//! data.owners.fragment('person', 'extra')   -> one expansion per element
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use super::compiler::compile;
use super::expander::{ErrorPolicy, expand};
use super::node::CompiledNode;
use crate::ast::value::Value;
use crate::error::{CompileError, EvalError};
use crate::eval::{Activation, Interrupt};
use crate::registry::{Env, Function, FunctionSignature, OverloadDef, ParamDef, ValueType};

/// Name under which the fragment function is registered.
pub const FRAGMENT_FUNCTION: &str = "fragment";

/// Most positional arguments a direct call can pass after the name.
pub const MAX_FRAGMENT_ARGS: usize = 5;

/// Compiled fragments by name.
#[derive(Debug, Clone, Default)]
pub struct Fragments {
    nodes: IndexMap<String, CompiledNode>,
}

impl Fragments {
    pub fn get(&self, name: &str) -> Option<&CompiledNode> {
        self.nodes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Compile every fragment against `env`. The first failure aborts and
/// names the fragment.
pub fn compile_fragments<'a>(
    sources: impl IntoIterator<Item = (&'a String, &'a String)>,
    env: &Env,
) -> Result<Fragments, CompileError> {
    let mut nodes = IndexMap::new();
    for (name, text) in sources {
        let node = compile(text, env).map_err(|source| CompileError::Fragment {
            name: name.clone(),
            source: Box::new(source),
        })?;
        nodes.insert(name.clone(), node);
    }
    Ok(Fragments { nodes })
}

/// The `fragment` function.
///
/// `base` carries the bindings every fragment sees (`ref` and host
/// variables); each call adds `args`.
pub(crate) struct FragmentFunction {
    fragments: Arc<Fragments>,
    base: Activation,
    policy: ErrorPolicy,
}

impl FragmentFunction {
    pub(crate) fn new(fragments: Arc<Fragments>, base: Activation, policy: ErrorPolicy) -> Self {
        Self {
            fragments,
            base,
            policy,
        }
    }

    fn invoke(
        &self,
        name: &str,
        node: &CompiledNode,
        args: Vec<Value>,
    ) -> Result<Value, EvalError> {
        debug!(fragment = name, args = args.len(), "expanding fragment");
        let activation = self.base.clone().with("args", Value::list(args));
        expand(node, &activation, self.policy)
    }
}

impl Function for FragmentFunction {
    fn call(&self, receiver: Option<Value>, args: Vec<Value>) -> Result<Value, Interrupt> {
        let mut args = args.into_iter();
        let name = match args.next() {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(EvalError::type_error("fragment name", other.type_name()).into());
            }
            None => return Err(EvalError::type_error("fragment name", "nothing").into()),
        };
        let node = self
            .fragments
            .get(&name)
            .ok_or_else(|| EvalError::fragment_not_found(&name))?;
        let extra: Vec<Value> = args.collect();

        match receiver {
            None => Ok(self.invoke(&name, node, extra)?),
            Some(Value::List(items)) => {
                let mut results = Vec::with_capacity(items.len());
                for item in items.iter() {
                    let mut call_args = Vec::with_capacity(extra.len() + 1);
                    call_args.push(item.clone());
                    call_args.extend(extra.iter().cloned());
                    results.push(self.invoke(&name, node, call_args)?);
                }
                Ok(Value::list(results))
            }
            Some(other) => Err(EvalError::type_error("list", other.type_name()).into()),
        }
    }

    fn signature(&self) -> FunctionSignature {
        let params = || {
            std::iter::once(ParamDef::required("name", ValueType::String)).chain(
                (1..=MAX_FRAGMENT_ARGS)
                    .map(|i| ParamDef::optional(format!("arg{i}"), ValueType::Any)),
            )
        };
        FunctionSignature::new(FRAGMENT_FUNCTION)
            .overload(OverloadDef::global(params()))
            .overload(OverloadDef::member(ValueType::List, params()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EvalErrorKind;

    fn sources(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn fragment_env() -> Env {
        let mut env = Env::new();
        env.declare_variable("ref", ValueType::Any);
        env.declare_variable("args", ValueType::List);
        env
    }

    fn function(pairs: &[(&str, &str)]) -> FragmentFunction {
        let fragments = compile_fragments(&sources(pairs), &fragment_env()).unwrap();
        FragmentFunction::new(Arc::new(fragments), Activation::new(), ErrorPolicy::default())
    }

    #[test]
    fn test_compile_failure_names_fragment() {
        let pairs = [("ok", r#"{"a": "1"}"#), ("broken", r#"{"a": "("}"#)];
        let err = compile_fragments(&sources(&pairs), &fragment_env()).unwrap_err();
        match err {
            CompileError::Fragment { name, .. } => assert_eq!(name, "broken"),
            other => panic!("expected fragment error, got {other:?}"),
        }
    }

    #[test]
    fn test_fragments_cannot_call_fragments() {
        let pairs = [("f", r#"{"a": "fragment('g')"}"#)];
        let err = compile_fragments(&sources(&pairs), &fragment_env()).unwrap_err();
        assert!(err.to_string().contains("fragment"));
    }

    #[test]
    fn test_direct_call_binds_args() {
        let f = function(&[("f", r#"{"first": "args[0]", "count": "size(args)"}"#)]);
        let out = f
            .call(None, vec![Value::from("f"), Value::from("blue"), Value::from(2i64)])
            .unwrap();
        assert_eq!(serde_json::to_string(&out).unwrap(), r#"{"first":"blue","count":2}"#);
    }

    #[test]
    fn test_unknown_fragment() {
        let f = function(&[]);
        match f.call(None, vec![Value::from("nope")]) {
            Err(Interrupt::Failed(e)) => {
                assert_eq!(e.kind, EvalErrorKind::FragmentNotFound);
                assert_eq!(e.message, "fragment not found: nope");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_list_receiver_maps_elements_in_order() {
        let f = function(&[("f", r#"{"v": "args[0]", "extra": "args[1]"}"#)]);
        let out = f
            .call(
                Some(Value::from(vec!["a", "b", "c"])),
                vec![Value::from("f"), Value::from("x")],
            )
            .unwrap();
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"[{"v":"a","extra":"x"},{"v":"b","extra":"x"},{"v":"c","extra":"x"}]"#
        );
    }

    #[test]
    fn test_signature_covers_five_trailing_args() {
        let sig = function(&[]).signature();
        assert_eq!(sig.overloads.len(), 2);
        assert!(sig.overloads.iter().all(|o| o.params.len() == MAX_FRAGMENT_ARGS + 1));
    }
}
