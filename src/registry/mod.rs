//! Function, variable and extension-type registration.
//!
//! An [`Env`] describes everything an expression may refer to: declared
//! variables, callable [`Function`]s and registered extension types.
//! [`Env::compile`] parses an expression and checks every call against the
//! declared signatures, producing a [`Program`] that can be evaluated any
//! number of times.
//!
//! There are two ways to provide a function:
//!
//! - **Closure-based**: use [`ClosureFunction`] for simple cases where a
//!   full trait implementation would be boilerplate.
//! - **Trait-based**: implement [`Function`] directly for more control. The
//!   `#[weaver_function]` macro in the `weaver_json_macros` crate generates
//!   an implementation from a typed Rust function.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::ast::expr::*;
use crate::ast::span::Span;
use crate::ast::value::{TypeDescriptor, Value};
use crate::error::{EvalError, ParseError};
use crate::eval::{Interrupt, Program};
use crate::parser::parse_expr;

mod stdlib;

// ── Trait definitions ───────────────────────────────────────────────────

/// A callable function, invoked as `name(args)` or `receiver.name(args)`.
///
/// Arguments arrive already evaluated. The dispatcher only calls a
/// function after one of its overloads accepted the argument types, so an
/// implementation may rely on the shapes its signature declares.
///
/// Returning [`Interrupt::Remove`] asks the template expander to drop the
/// entry currently being produced.
pub trait Function: Send + Sync {
    fn call(&self, receiver: Option<Value>, args: Vec<Value>) -> Result<Value, Interrupt>;

    /// Declare this function's name and accepted call shapes.
    fn signature(&self) -> FunctionSignature;
}

// ── Signatures ──────────────────────────────────────────────────────────

/// Describes a function's name and the call shapes it accepts.
///
/// A signature with no overloads accepts any call.
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub name: String,
    pub overloads: Vec<OverloadDef>,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn overload(mut self, overload: OverloadDef) -> Self {
        self.overloads.push(overload);
        self
    }

    /// Whether some overload accepts a call with these runtime values.
    pub fn accepts(&self, receiver: Option<&Value>, args: &[Value]) -> bool {
        self.overloads.is_empty()
            || self.overloads.iter().any(|o| {
                o.accepts_shape(receiver.is_some(), args.len())
                    && receiver.is_none_or(|r| o.receiver_type().is_none_or(|t| t.matches(r)))
                    && args
                        .iter()
                        .zip(&o.params)
                        .all(|(v, p)| p.expected_type.matches(v))
            })
    }
}

/// How a function is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    /// `name(args)`
    Global,
    /// `receiver.name(args)`
    Member { receiver: ValueType },
}

/// One accepted call shape of a function.
#[derive(Debug, Clone)]
pub struct OverloadDef {
    pub style: CallStyle,
    pub params: Vec<ParamDef>,
}

impl OverloadDef {
    pub fn global(params: impl IntoIterator<Item = ParamDef>) -> Self {
        Self {
            style: CallStyle::Global,
            params: params.into_iter().collect(),
        }
    }

    pub fn member(receiver: ValueType, params: impl IntoIterator<Item = ParamDef>) -> Self {
        Self {
            style: CallStyle::Member { receiver },
            params: params.into_iter().collect(),
        }
    }

    fn receiver_type(&self) -> Option<ValueType> {
        match self.style {
            CallStyle::Global => None,
            CallStyle::Member { receiver } => Some(receiver),
        }
    }

    /// Check call style and argument count (receiver excluded).
    fn accepts_shape(&self, member: bool, argc: usize) -> bool {
        let required = self.params.iter().filter(|p| p.required).count();
        member == matches!(self.style, CallStyle::Member { .. })
            && argc >= required
            && argc <= self.params.len()
    }
}

/// A positional parameter definition.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub expected_type: ValueType,
    pub required: bool,
}

impl ParamDef {
    pub fn required(name: impl Into<String>, expected_type: ValueType) -> Self {
        Self {
            name: name.into(),
            expected_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, expected_type: ValueType) -> Self {
        Self {
            name: name.into(),
            expected_type,
            required: false,
        }
    }
}

/// Type tag used in signatures and variable declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Bool,
    List,
    Map,
    /// Any host extension value.
    Object,
    Null,
    /// Accepts any value type.
    Any,
}

impl ValueType {
    /// Check whether a runtime [`Value`] matches this type expectation.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            ValueType::String => matches!(value, Value::String(_)),
            ValueType::Number => matches!(value, Value::Number(_)),
            ValueType::Bool => matches!(value, Value::Bool(_)),
            ValueType::List => matches!(value, Value::List(_)),
            ValueType::Map => matches!(value, Value::Map(_)),
            ValueType::Object => matches!(value, Value::Object(_)),
            ValueType::Null => matches!(value, Value::Null),
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────

/// The declarations an [`Env`] compiles against. Shared by every
/// [`Program`] compiled from that environment.
#[derive(Clone, Default)]
pub struct Registry {
    variables: HashMap<String, ValueType>,
    functions: HashMap<String, Arc<dyn Function>>,
    types: HashMap<&'static str, &'static TypeDescriptor>,
    reject_undeclared: bool,
}

impl Registry {
    pub fn function(&self, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<ValueType> {
        self.variables.get(name).copied()
    }

    pub fn type_descriptor(&self, name: &str) -> Option<&'static TypeDescriptor> {
        self.types.get(name).copied()
    }

    /// Dispatch a call. Fails with a `NoSuchOverload` error when the
    /// function is unknown or no overload accepts the runtime values.
    pub fn call(
        &self,
        name: &str,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        let Some(function) = self.functions.get(name) else {
            return Err(overload_error(name, receiver.as_ref(), &args).into());
        };
        if !function.signature().accepts(receiver.as_ref(), &args) {
            return Err(overload_error(name, receiver.as_ref(), &args).into());
        }
        function.call(receiver, args)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        f.debug_struct("Registry")
            .field("variables", &self.variables)
            .field("functions", &functions)
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("reject_undeclared", &self.reject_undeclared)
            .finish()
    }
}

fn overload_error(name: &str, receiver: Option<&Value>, args: &[Value]) -> EvalError {
    let types: Vec<&str> = receiver
        .into_iter()
        .chain(args)
        .map(Value::type_name)
        .collect();
    EvalError::no_such_overload(name, &types)
}

// ── Env ─────────────────────────────────────────────────────────────────

/// A compilation environment.
///
/// `Env::new()` starts with the standard library installed. Cloning an
/// `Env` is cheap; declarations made on a clone do not affect the
/// original or any program already compiled.
///
/// ```rust
/// use weaver_json::{Activation, ClosureFunction, Env, Value, ValueType};
///
/// let mut env = Env::new();
/// env.declare_variable("name", ValueType::String);
/// env.register_function(ClosureFunction::new("greet", |_, args| {
///     Ok(Value::String(format!("Hello, {}!", args[0])))
/// }));
///
/// let program = env.compile("greet(name)").unwrap();
/// let activation = Activation::new().with("name", "Ada");
/// assert_eq!(program.eval(&activation).unwrap(), Value::from("Hello, Ada!"));
/// ```
#[derive(Clone, Debug)]
pub struct Env {
    registry: Arc<Registry>,
}

impl Env {
    /// An environment with the standard library installed.
    pub fn new() -> Self {
        let mut env = Self::empty();
        stdlib::install(&mut env);
        env
    }

    /// An environment with no functions at all.
    pub fn empty() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Declare a variable the expressions may reference.
    pub fn declare_variable(&mut self, name: impl Into<String>, ty: ValueType) -> &mut Self {
        Arc::make_mut(&mut self.registry)
            .variables
            .insert(name.into(), ty);
        self
    }

    /// Register a function. A function with the same name is replaced.
    pub fn register_function(&mut self, function: impl Function + 'static) -> &mut Self {
        self.register_shared_function(Arc::new(function))
    }

    /// Register a function that is shared with other environments.
    pub fn register_shared_function(&mut self, function: Arc<dyn Function>) -> &mut Self {
        let name = function.signature().name;
        Arc::make_mut(&mut self.registry)
            .functions
            .insert(name, function);
        self
    }

    /// Register an extension type. Its name becomes usable as an
    /// identifier that evaluates to the type name.
    pub fn register_type(&mut self, descriptor: &'static TypeDescriptor) -> &mut Self {
        Arc::make_mut(&mut self.registry)
            .types
            .insert(descriptor.name, descriptor);
        self
    }

    /// Make references to undeclared identifiers compile errors. By
    /// default they compile and fail when evaluated.
    pub fn reject_undeclared(&mut self, enabled: bool) -> &mut Self {
        Arc::make_mut(&mut self.registry).reject_undeclared = enabled;
        self
    }

    /// Parse and check an expression.
    pub fn compile(&self, source: &str) -> Result<Program, Vec<ParseError>> {
        let mut expr = parse_expr(source)?;
        let mut checker = Checker {
            registry: &self.registry,
            bound: Vec::new(),
            errors: Vec::new(),
        };
        checker.check(&mut expr);
        if !checker.errors.is_empty() {
            return Err(checker.errors);
        }
        Ok(Program::new(expr, source, Arc::clone(&self.registry)))
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

// ── Checking ────────────────────────────────────────────────────────────

struct Checker<'a> {
    registry: &'a Registry,
    /// Comprehension variables in scope.
    bound: Vec<String>,
    errors: Vec<ParseError>,
}

impl Checker<'_> {
    fn check(&mut self, expr: &mut Expr) {
        let span = expr.span;
        match &mut expr.node {
            ExprKind::Literal(_) => {}
            ExprKind::List(items) => items.iter_mut().for_each(|e| self.check(e)),
            ExprKind::Map(entries) => {
                for entry in entries {
                    self.check(&mut entry.key);
                    self.check(&mut entry.value);
                }
            }
            ExprKind::Ident(name) => {
                if self.bound.iter().any(|b| b == name) || self.registry.variable(name).is_some()
                {
                    return;
                }
                if let Some(descriptor) = self.registry.type_descriptor(name) {
                    expr.node = ExprKind::Literal(Value::String(descriptor.name.to_string()));
                    return;
                }
                if self.registry.reject_undeclared {
                    self.errors.push(
                        ParseError::new(span, format!("undeclared reference to '{name}'"))
                            .with_hint("declare it or bind it as a template variable"),
                    );
                } else {
                    debug!(identifier = %name, "reference to undeclared identifier");
                }
            }
            ExprKind::Select { operand, .. } | ExprKind::Has { operand, .. } => {
                self.check(operand)
            }
            ExprKind::Index { operand, index } => {
                self.check(operand);
                self.check(index);
            }
            ExprKind::Call(call) => {
                if let Some(target) = &mut call.target {
                    self.check(target);
                }
                call.args.iter_mut().for_each(|e| self.check(e));
                self.check_call(call, span);
            }
            ExprKind::Comprehension(c) => {
                self.check(&mut c.range);
                self.bound.push(c.variable.clone());
                if let Some(predicate) = &mut c.predicate {
                    self.check(predicate);
                }
                if let Some(transform) = &mut c.transform {
                    self.check(transform);
                }
                self.bound.pop();
            }
            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                self.check(condition);
                self.check(then_branch);
                self.check(else_branch);
            }
            ExprKind::BinaryOp { left, right, .. } => {
                self.check(left);
                self.check(right);
            }
            ExprKind::UnaryOp { operand, .. } => self.check(operand),
        }
    }

    fn check_call(&mut self, call: &Call, span: Span) {
        let Some(function) = self.registry.function(&call.function) else {
            self.errors.push(
                ParseError::new(
                    span,
                    format!("undeclared reference to function '{}'", call.function),
                )
                .with_hint("only registered functions can be called"),
            );
            return;
        };

        let signature = function.signature();
        if signature.overloads.is_empty() {
            return;
        }

        let receiver = call.target.as_deref().and_then(literal_of);
        let args: Vec<Option<&Value>> = call.args.iter().map(literal_of).collect();
        let found = signature.overloads.iter().any(|o| {
            o.accepts_shape(call.target.is_some(), args.len())
                && receiver.is_none_or(|r| o.receiver_type().is_none_or(|t| t.matches(r)))
                && args
                    .iter()
                    .zip(&o.params)
                    .all(|(a, p)| a.is_none_or(|v| p.expected_type.matches(v)))
        });

        if !found {
            let described: Vec<&str> = call
                .target
                .as_deref()
                .into_iter()
                .chain(&call.args)
                .map(|e| literal_of(e).map_or("dyn", Value::type_name))
                .collect();
            let shape = if call.target.is_some() {
                format!("{}.{}", described[0], call.function)
            } else {
                call.function.clone()
            };
            let params = if call.target.is_some() {
                &described[1..]
            } else {
                &described[..]
            };
            self.errors.push(ParseError::new(
                span,
                format!(
                    "found no matching overload for '{shape}' applied to ({})",
                    params.join(", ")
                ),
            ));
        }
    }
}

fn literal_of(expr: &Expr) -> Option<&Value> {
    match &expr.node {
        ExprKind::Literal(v) => Some(v),
        _ => None,
    }
}

// ── Closure-based convenience wrapper ───────────────────────────────────

/// A [`Function`] implementation backed by a closure.
///
/// Without declared overloads the closure accepts any call; add
/// [`OverloadDef`]s to have calls checked at compile time.
///
/// ```rust
/// use weaver_json::{ClosureFunction, OverloadDef, ParamDef, Value, ValueType};
///
/// let shout = ClosureFunction::new("shout", |_, args| {
///     let text = args[0].as_str().unwrap_or_default();
///     Ok(Value::String(text.to_uppercase()))
/// })
/// .overload(OverloadDef::global([ParamDef::required("text", ValueType::String)]));
/// ```
pub struct ClosureFunction<F>
where
    F: Fn(Option<Value>, Vec<Value>) -> Result<Value, Interrupt> + Send + Sync,
{
    sig: FunctionSignature,
    func: F,
}

impl<F> ClosureFunction<F>
where
    F: Fn(Option<Value>, Vec<Value>) -> Result<Value, Interrupt> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            sig: FunctionSignature::new(name),
            func,
        }
    }

    pub fn overload(mut self, overload: OverloadDef) -> Self {
        self.sig.overloads.push(overload);
        self
    }
}

impl<F> Function for ClosureFunction<F>
where
    F: Fn(Option<Value>, Vec<Value>) -> Result<Value, Interrupt> + Send + Sync,
{
    fn call(&self, receiver: Option<Value>, args: Vec<Value>) -> Result<Value, Interrupt> {
        (self.func)(receiver, args)
    }

    fn signature(&self) -> FunctionSignature {
        self.sig.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Activation;

    fn env_with_shout() -> Env {
        let mut env = Env::new();
        env.register_function(
            ClosureFunction::new("shout", |_, args| {
                Ok(Value::String(
                    args[0].as_str().unwrap_or_default().to_uppercase(),
                ))
            })
            .overload(OverloadDef::global([ParamDef::required(
                "text",
                ValueType::String,
            )])),
        );
        env
    }

    #[test]
    fn test_unknown_function_fails_to_compile() {
        let errs = Env::new().compile("nope(1)").unwrap_err();
        assert!(errs[0].message.contains("nope"));
    }

    #[test]
    fn test_wrong_arity_fails_to_compile() {
        let errs = env_with_shout().compile("shout('a', 'b')").unwrap_err();
        assert!(errs[0].message.contains("no matching overload"));
    }

    #[test]
    fn test_literal_argument_type_is_checked() {
        let errs = env_with_shout().compile("shout(42)").unwrap_err();
        assert!(errs[0].message.contains("(number)"));
    }

    #[test]
    fn test_member_style_must_be_declared() {
        assert!(env_with_shout().compile("'a'.shout()").is_err());
    }

    #[test]
    fn test_runtime_dispatch_checks_types() {
        let mut env = env_with_shout();
        env.declare_variable("x", ValueType::Any);
        let program = env.compile("shout(x)").unwrap();
        let activation = Activation::new().with("x", 1i64);
        match program.eval(&activation) {
            Err(Interrupt::Failed(e)) => {
                assert_eq!(e.kind, crate::EvalErrorKind::NoSuchOverload);
                assert!(e.message.contains("shout(number)"));
            }
            other => panic!("expected overload failure, got {other:?}"),
        }
    }

    #[test]
    fn test_closure_without_overloads_accepts_anything() {
        let mut env = Env::empty();
        env.register_function(ClosureFunction::new("count", |receiver, args| {
            Ok(Value::from((args.len() + usize::from(receiver.is_some())) as i64))
        }));
        let program = env.compile("'x'.count(1, 2)").unwrap();
        assert_eq!(program.eval(&Activation::new()).unwrap(), Value::Number(3.0));
    }

    #[test]
    fn test_registered_type_name_is_an_identifier() {
        static THING: TypeDescriptor =
            TypeDescriptor::new("Thing", crate::ast::value::Traits::empty());
        let mut env = Env::new();
        env.register_type(&THING);
        let program = env.compile("Thing").unwrap();
        assert_eq!(program.eval(&Activation::new()).unwrap(), Value::from("Thing"));
    }

    #[test]
    fn test_undeclared_identifier_policy() {
        let mut env = Env::new();
        env.declare_variable("data", ValueType::Any);
        assert!(env.compile("missing").is_ok());

        env.reject_undeclared(true);
        let errs = env.compile("data.x + missing").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].message, "undeclared reference to 'missing'");
        assert!(env.compile("data.items.map(i, i + 1)").is_ok());
    }

    #[test]
    fn test_declarations_on_clone_are_independent() {
        let base = Env::new();
        let mut derived = base.clone();
        derived.declare_variable("data", ValueType::Map);
        assert!(derived.registry().variable("data").is_some());
        assert!(base.registry().variable("data").is_none());
    }
}
