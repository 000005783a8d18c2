//! Expression evaluation engine.
//!
//! The evaluator walks a checked [`Expr`] tree and produces a [`Value`]. It
//! resolves free identifiers through the provided [`EvalContext`] and
//! dispatches calls through the [`Registry`] the program was compiled
//! against.
//!
//! Comprehension variables (`list.map(e, ...)`) live on an internal scope
//! stack and shadow names from the context.
//!
//! Evaluation ends in one of three ways: a value, a failure
//! ([`Interrupt::Failed`]), or a request to drop the entry being produced
//! ([`Interrupt::Remove`]). The last is consumed by the template expander.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::ast::expr::*;
use crate::ast::span::Span;
use crate::ast::value::{Traits, Value, ValueMap, format_number};
use crate::error::{EvalError, EvalErrorKind};
use crate::registry::Registry;

mod activation;

pub use activation::{Activation, EvalContext};

/// Non-value outcome of evaluating a [`Program`].
#[derive(Debug, Clone, Error)]
pub enum Interrupt {
    /// `remove_property()` was called: the entry being produced must be
    /// omitted from the output.
    #[error("entry removed")]
    Remove,
    /// Evaluation failed.
    #[error(transparent)]
    Failed(#[from] EvalError),
}

/// A compiled expression.
///
/// Immutable and cheap to clone. Evaluate it with [`eval`](Program::eval)
/// as many times as needed; no state is carried between calls.
///
/// # Examples
///
/// ```rust
/// use weaver_json::{Activation, Env, Value, ValueType};
///
/// let mut env = Env::new();
/// env.declare_variable("data", ValueType::Map);
/// let program = env.compile("data.items.filter(i, i > 1).size()").unwrap();
///
/// let data = Value::map([("items", Value::from(vec![1i64, 2, 3]))]);
/// let activation = Activation::new().with("data", data);
/// assert_eq!(program.eval(&activation).unwrap(), Value::Number(2.0));
/// ```
#[derive(Clone)]
pub struct Program {
    expr: Arc<Expr>,
    source: Arc<str>,
    registry: Arc<Registry>,
}

impl Program {
    pub(crate) fn new(expr: Expr, source: &str, registry: Arc<Registry>) -> Self {
        Self {
            expr: Arc::new(expr),
            source: Arc::from(source),
            registry,
        }
    }

    /// The expression text this program was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The part of the source text a failure points at.
    pub fn excerpt(&self, error: &EvalError) -> Option<&str> {
        error.span.and_then(|span: Span| span.slice(&self.source))
    }

    /// Evaluate against `ctx`. Failures carry the span of the innermost
    /// sub-expression that failed.
    pub fn eval(&self, ctx: &impl EvalContext) -> Result<Value, Interrupt> {
        let mut evaluator = Evaluator::new(&self.registry, ctx);
        evaluator.eval_expr(&self.expr)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Program").field(&self.source).finish()
    }
}

// ── Lexical scope stack ─────────────────────────────────────────────────

struct ScopeFrame {
    bindings: HashMap<String, Value>,
}

impl ScopeFrame {
    fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    fn set(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }
}

struct Evaluator<'a> {
    registry: &'a Registry,
    ctx: &'a dyn EvalContext,
    scopes: Vec<ScopeFrame>,
}

impl<'a> Evaluator<'a> {
    fn new(registry: &'a Registry, ctx: &'a dyn EvalContext) -> Self {
        Self {
            registry,
            ctx,
            scopes: Vec::new(),
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(ScopeFrame::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.set(name, value);
        }
    }

    fn resolve(&self, name: &str) -> Result<Value, EvalError> {
        for frame in self.scopes.iter().rev() {
            if let Some(val) = frame.get(name) {
                return Ok(val.clone());
            }
        }
        self.ctx
            .resolve(name)
            .ok_or_else(|| EvalError::undeclared_reference(name))
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn eval_expr(&mut self, expr: &Expr) -> Result<Value, Interrupt> {
        self.eval_expr_kind(&expr.node).map_err(|interrupt| match interrupt {
            Interrupt::Failed(e) => Interrupt::Failed(e.or_span(expr.span)),
            remove => remove,
        })
    }

    fn eval_expr_kind(&mut self, kind: &ExprKind) -> Result<Value, Interrupt> {
        match kind {
            ExprKind::Literal(val) => Ok(val.clone()),

            ExprKind::List(elements) => {
                let mut values = Vec::with_capacity(elements.len());
                for elem in elements {
                    values.push(self.eval_expr(elem)?);
                }
                Ok(Value::list(values))
            }

            ExprKind::Map(entries) => {
                let mut map = ValueMap::with_capacity(entries.len());
                for entry in entries {
                    let key = map_key(&self.eval_expr(&entry.key)?)?;
                    let value = self.eval_expr(&entry.value)?;
                    map.insert(key, value);
                }
                Ok(Value::from(map))
            }

            ExprKind::Ident(name) => Ok(self.resolve(name)?),

            ExprKind::Select { operand, field } => {
                let value = self.eval_expr(operand)?;
                Ok(select(&value, field)?)
            }

            ExprKind::Index { operand, index } => {
                let value = self.eval_expr(operand)?;
                let index = self.eval_expr(index)?;
                Ok(index_value(&value, &index)?)
            }

            ExprKind::Call(call) => {
                let receiver = match &call.target {
                    Some(target) => Some(self.eval_expr(target)?),
                    None => None,
                };
                let mut args = Vec::with_capacity(call.args.len());
                for arg in &call.args {
                    args.push(self.eval_expr(arg)?);
                }
                self.registry.call(&call.function, receiver, args)
            }

            ExprKind::Has { operand, field } => {
                let value = self.eval_expr(operand)?;
                Ok(Value::Bool(has_field(&value, field)?))
            }

            ExprKind::Comprehension(comprehension) => self.eval_comprehension(comprehension),

            ExprKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_bool(condition)? {
                    self.eval_expr(then_branch)
                } else {
                    self.eval_expr(else_branch)
                }
            }

            ExprKind::BinaryOp {
                left,
                op: op @ (BinOp::And | BinOp::Or),
                right,
            } => self.eval_logical(left, *op, right),

            ExprKind::BinaryOp { left, op, right } => {
                let left_val = self.eval_expr(left)?;
                let right_val = self.eval_expr(right)?;
                Ok(eval_binary_op(&left_val, *op, &right_val)?)
            }

            ExprKind::UnaryOp { op, operand } => {
                let val = self.eval_expr(operand)?;
                Ok(eval_unary_op(*op, &val)?)
            }
        }
    }

    fn eval_bool(&mut self, expr: &Expr) -> Result<bool, Interrupt> {
        match self.eval_expr(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::type_error("bool", other.type_name())
                .with_span(expr.span)
                .into()),
        }
    }

    /// `&&` and `||` are commutative with respect to failures: a decisive
    /// operand wins even when the other side fails.
    fn eval_logical(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Result<Value, Interrupt> {
        let decisive = op == BinOp::Or;

        let left_val = self.eval_bool(left);
        if matches!(left_val, Ok(b) if b == decisive) {
            return Ok(Value::Bool(decisive));
        }
        let right_val = self.eval_bool(right);
        if matches!(right_val, Ok(b) if b == decisive) {
            return Ok(Value::Bool(decisive));
        }
        left_val?;
        right_val?;
        Ok(Value::Bool(!decisive))
    }

    // ── Comprehensions ──────────────────────────────────────────────────

    fn eval_comprehension(&mut self, c: &Comprehension) -> Result<Value, Interrupt> {
        let range = self.eval_expr(&c.range)?;
        let items = range_items(&range).map_err(|e| e.with_span(c.range.span))?;

        self.push_scope();
        let result = self.run_comprehension(c, items);
        self.pop_scope();
        result
    }

    fn run_comprehension(
        &mut self,
        c: &Comprehension,
        items: Vec<Value>,
    ) -> Result<Value, Interrupt> {
        match c.kind {
            ComprehensionKind::Map => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.bind(&c.variable, item);
                    if !self.eval_predicate(c)? {
                        continue;
                    }
                    if let Some(transform) = &c.transform {
                        out.push(self.eval_expr(transform)?);
                    }
                }
                Ok(Value::list(out))
            }

            ComprehensionKind::Filter => {
                let mut out = Vec::new();
                for item in items {
                    self.bind(&c.variable, item.clone());
                    if self.eval_predicate(c)? {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }

            ComprehensionKind::All | ComprehensionKind::Exists => {
                let decisive = c.kind == ComprehensionKind::Exists;
                let mut first_failure = None;
                for item in items {
                    self.bind(&c.variable, item);
                    match self.eval_predicate(c) {
                        Ok(b) if b == decisive => return Ok(Value::Bool(decisive)),
                        Ok(_) => {}
                        Err(Interrupt::Remove) => return Err(Interrupt::Remove),
                        Err(failure) => {
                            first_failure.get_or_insert(failure);
                        }
                    }
                }
                match first_failure {
                    Some(failure) => Err(failure),
                    None => Ok(Value::Bool(!decisive)),
                }
            }

            ComprehensionKind::ExistsOne => {
                let mut count = 0usize;
                for item in items {
                    self.bind(&c.variable, item);
                    if self.eval_predicate(c)? {
                        count += 1;
                    }
                }
                Ok(Value::Bool(count == 1))
            }
        }
    }

    fn eval_predicate(&mut self, c: &Comprehension) -> Result<bool, Interrupt> {
        match &c.predicate {
            Some(predicate) => self.eval_bool(predicate),
            None => Ok(true),
        }
    }
}

// ── Pure helpers ────────────────────────────────────────────────────────

/// Map keys are strings. Whole numbers and booleans are accepted and match
/// their decimal/literal string form, so `ref.status[1]` finds `"1"`.
fn map_key(value: &Value) -> Result<String, EvalError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.fract() == 0.0 => Ok(format_number(*n)),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(EvalError::type_error("string key", other.type_name())),
    }
}

fn select(value: &Value, field: &str) -> Result<Value, EvalError> {
    match value {
        Value::Map(map) => map
            .get(field)
            .cloned()
            .ok_or_else(|| EvalError::no_such_key(field)),
        Value::Object(obj) if obj.descriptor().has(Traits::INDEXER) => obj.get(field),
        other => Err(EvalError::type_error("map or object", other.type_name())),
    }
}

fn index_value(value: &Value, index: &Value) -> Result<Value, EvalError> {
    match value {
        Value::List(items) => {
            let n = index
                .as_number()
                .ok_or_else(|| EvalError::type_error("number index", index.type_name()))?;
            if n.fract() != 0.0 {
                return Err(EvalError::type_error("integer index", &format_number(n)));
            }
            if n < 0.0 || n >= items.len() as f64 {
                return Err(EvalError::index_out_of_range(n, items.len()));
            }
            Ok(items[n as usize].clone())
        }
        Value::Map(map) => {
            let key = map_key(index)?;
            map.get(&key)
                .cloned()
                .ok_or_else(|| EvalError::no_such_key(&key))
        }
        Value::Object(obj) if obj.descriptor().has(Traits::INDEXER) => obj.get(&map_key(index)?),
        other => Err(EvalError::type_error("list, map or object", other.type_name())),
    }
}

fn has_field(value: &Value, field: &str) -> Result<bool, EvalError> {
    match value {
        Value::Map(map) => Ok(map.contains_key(field)),
        Value::Object(obj) if obj.descriptor().has(Traits::CONTAINER) => {
            Ok(obj.contains_key(field))
        }
        other => Err(EvalError::no_such_overload("has", &[other.type_name()])),
    }
}

fn range_items(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) => Ok(items.to_vec()),
        Value::Map(map) => Ok(map.keys().map(|k| Value::String(k.clone())).collect()),
        Value::Object(obj) if obj.descriptor().has(Traits::ITERABLE) => Ok(obj.keys().collect()),
        other => Err(EvalError::type_error(
            "list, map or iterable object",
            other.type_name(),
        )),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::List(items) => Ok(items.contains(item)),
        Value::Map(map) => Ok(map.contains_key(&map_key(item)?)),
        Value::Object(obj) if obj.descriptor().has(Traits::CONTAINER) => {
            Ok(obj.contains_key(&map_key(item)?))
        }
        other => Err(operator_error(BinOp::In, item, other)),
    }
}

fn operator_error(op: BinOp, left: &Value, right: &Value) -> EvalError {
    EvalError::no_such_overload(
        &format!("_{}_", op.symbol()),
        &[left.type_name(), right.type_name()],
    )
}

fn eval_binary_op(left: &Value, op: BinOp, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::NotEq => Ok(Value::Bool(left != right)),
        BinOp::In => Ok(Value::Bool(contains(right, left)?)),

        BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
            let ordering = match (left, right) {
                (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
                (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
                (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
                _ => return Err(operator_error(op, left, right)),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            let result = match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Gt => ordering.is_gt(),
                BinOp::LtEq => ordering.is_le(),
                BinOp::GtEq => ordering.is_ge(),
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }

        BinOp::Add => match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
            (Value::String(l), Value::String(r)) => Ok(Value::String(format!("{l}{r}"))),
            (Value::List(l), Value::List(r)) => {
                Ok(Value::list(l.iter().chain(r.iter()).cloned()))
            }
            _ => Err(operator_error(op, left, right)),
        },

        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => {
            let (Value::Number(l), Value::Number(r)) = (left, right) else {
                return Err(operator_error(op, left, right));
            };
            let result = match op {
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div | BinOp::Rem if *r == 0.0 => {
                    let what = if op == BinOp::Div { "division" } else { "modulus" };
                    return Err(EvalError::new(
                        EvalErrorKind::ArithmeticError,
                        format!("{what} by zero"),
                    ));
                }
                BinOp::Div => l / r,
                BinOp::Rem => l % r,
                _ => unreachable!(),
            };
            Ok(Value::Number(result))
        }

        BinOp::And | BinOp::Or => unreachable!("logical operators short-circuit"),
    }
}

fn eval_unary_op(op: UnaryOp, val: &Value) -> Result<Value, EvalError> {
    match (op, val) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, other) => Err(EvalError::no_such_overload("!_", &[other.type_name()])),
        (UnaryOp::Neg, other) => Err(EvalError::no_such_overload("-_", &[other.type_name()])),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
