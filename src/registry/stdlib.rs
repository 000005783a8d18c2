//! Standard functions installed by [`Env::new`](super::Env::new).

use crate::ast::value::{Traits, Value, format_number};
use crate::error::{EvalError, EvalErrorKind};
use crate::eval::Interrupt;

use super::{ClosureFunction, Env, OverloadDef, ParamDef, ValueType};

type Outcome = Result<Value, Interrupt>;

pub(super) fn install(env: &mut Env) {
    // Functions callable both as `f(x)` and `x.f()`.
    for (name, func) in [
        ("size", size as fn(Option<Value>, Vec<Value>) -> Outcome),
        ("string", string),
        ("int", int),
        ("double", double),
        ("bool", boolean),
        ("type", type_of),
        ("dyn", dyn_of),
    ] {
        env.register_function(
            ClosureFunction::new(name, func)
                .overload(OverloadDef::global([ParamDef::required("value", ValueType::Any)]))
                .overload(OverloadDef::member(ValueType::Any, [])),
        );
    }

    for (name, func) in [
        ("contains", contains as fn(Option<Value>, Vec<Value>) -> Outcome),
        ("startsWith", starts_with),
        ("endsWith", ends_with),
        ("split", split),
    ] {
        env.register_function(ClosureFunction::new(name, func).overload(OverloadDef::member(
            ValueType::String,
            [ParamDef::required("text", ValueType::String)],
        )));
    }

    for (name, func) in [
        ("lowerAscii", lower_ascii as fn(Option<Value>, Vec<Value>) -> Outcome),
        ("upperAscii", upper_ascii),
        ("trim", trim),
    ] {
        env.register_function(
            ClosureFunction::new(name, func).overload(OverloadDef::member(ValueType::String, [])),
        );
    }

    env.register_function(ClosureFunction::new("join", join).overload(OverloadDef::member(
        ValueType::List,
        [ParamDef::optional("separator", ValueType::String)],
    )));
    env.register_function(ClosureFunction::new("slice", slice).overload(OverloadDef::member(
        ValueType::List,
        [
            ParamDef::required("start", ValueType::Number),
            ParamDef::required("end", ValueType::Number),
        ],
    )));
    env.register_function(ClosureFunction::new("flatten", flatten).overload(OverloadDef::member(
        ValueType::List,
        [ParamDef::optional("depth", ValueType::Number)],
    )));
}

/// The value a unary function works on: the receiver, or the first argument.
fn operand(receiver: Option<Value>, args: Vec<Value>) -> Value {
    receiver
        .or_else(|| args.into_iter().next())
        .unwrap_or(Value::Null)
}

fn receiver_str(receiver: Option<Value>) -> Result<String, EvalError> {
    match receiver {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EvalError::type_error("string", other.type_name())),
        None => Err(EvalError::type_error("string", "null")),
    }
}

fn receiver_list(receiver: Option<Value>) -> Result<std::sync::Arc<Vec<Value>>, EvalError> {
    match receiver {
        Some(Value::List(items)) => Ok(items),
        Some(other) => Err(EvalError::type_error("list", other.type_name())),
        None => Err(EvalError::type_error("list", "null")),
    }
}

fn string_arg(args: &[Value], index: usize) -> Result<&str, EvalError> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(EvalError::type_error("string", other.type_name())),
        None => Err(EvalError::new(
            EvalErrorKind::TypeError,
            format!("missing required argument at position {index}"),
        )),
    }
}

/// A whole, non-negative number usable as a position.
fn position(value: Option<&Value>) -> Result<usize, EvalError> {
    match value {
        Some(Value::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => Ok(*n as usize),
        Some(other) => Err(EvalError::type_error("non-negative integer", other.type_name())),
        None => Err(EvalError::type_error("non-negative integer", "null")),
    }
}

// ── Conversions ─────────────────────────────────────────────────────────

fn size(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let value = operand(receiver, args);
    let n = match &value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        Value::Object(obj) if obj.descriptor().has(Traits::SIZER) => obj.size(),
        other => return Err(EvalError::no_such_overload("size", &[other.type_name()]).into()),
    };
    Ok(Value::Number(n as f64))
}

fn string(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    match operand(receiver, args) {
        s @ Value::String(_) => Ok(s),
        Value::Number(n) => Ok(Value::String(format_number(n))),
        Value::Bool(b) => Ok(Value::String(b.to_string())),
        Value::Null => Ok(Value::String("null".to_string())),
        Value::Object(obj) => Ok(Value::String(obj.descriptor().name.to_string())),
        other => Err(EvalError::conversion(other.type_name(), "string").into()),
    }
}

fn int(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    match operand(receiver, args) {
        Value::Number(n) if n.is_finite() => Ok(Value::Number(n.trunc())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|e| EvalError::conversion("string", "int").with_source(e).into()),
        other => Err(EvalError::conversion(other.type_name(), "int").into()),
    }
}

fn double(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    match operand(receiver, args) {
        n @ Value::Number(_) => Ok(n),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|e| EvalError::conversion("string", "double").with_source(e).into()),
        other => Err(EvalError::conversion(other.type_name(), "double").into()),
    }
}

fn boolean(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    match operand(receiver, args) {
        b @ Value::Bool(_) => Ok(b),
        Value::String(s) if s == "true" => Ok(Value::Bool(true)),
        Value::String(s) if s == "false" => Ok(Value::Bool(false)),
        other => Err(EvalError::conversion(other.type_name(), "bool").into()),
    }
}

fn type_of(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    Ok(Value::String(operand(receiver, args).type_name().to_string()))
}

fn dyn_of(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    Ok(operand(receiver, args))
}

// ── Strings ─────────────────────────────────────────────────────────────

fn contains(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let s = receiver_str(receiver)?;
    Ok(Value::Bool(s.contains(string_arg(&args, 0)?)))
}

fn starts_with(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let s = receiver_str(receiver)?;
    Ok(Value::Bool(s.starts_with(string_arg(&args, 0)?)))
}

fn ends_with(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let s = receiver_str(receiver)?;
    Ok(Value::Bool(s.ends_with(string_arg(&args, 0)?)))
}

fn split(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let s = receiver_str(receiver)?;
    let separator = string_arg(&args, 0)?;
    Ok(Value::list(s.split(separator).map(Value::from)))
}

fn lower_ascii(receiver: Option<Value>, _args: Vec<Value>) -> Outcome {
    Ok(Value::String(receiver_str(receiver)?.to_ascii_lowercase()))
}

fn upper_ascii(receiver: Option<Value>, _args: Vec<Value>) -> Outcome {
    Ok(Value::String(receiver_str(receiver)?.to_ascii_uppercase()))
}

fn trim(receiver: Option<Value>, _args: Vec<Value>) -> Outcome {
    Ok(Value::String(receiver_str(receiver)?.trim().to_string()))
}

// ── Lists ───────────────────────────────────────────────────────────────

fn join(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let items = receiver_list(receiver)?;
    let separator = if args.is_empty() {
        ""
    } else {
        string_arg(&args, 0)?
    };
    let parts = items
        .iter()
        .map(|v| match v {
            Value::String(s) => Ok(s.as_str()),
            other => Err(EvalError::type_error("list of strings", other.type_name())),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::String(parts.join(separator)))
}

fn slice(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let items = receiver_list(receiver)?;
    let start = position(args.first())?;
    let end = position(args.get(1))?;
    if start > end || end > items.len() {
        return Err(EvalError::new(
            EvalErrorKind::IndexOutOfRange,
            format!("cannot slice({start}, {end}) a list of length {}", items.len()),
        )
        .into());
    }
    Ok(Value::list(items[start..end].iter().cloned()))
}

fn flatten(receiver: Option<Value>, args: Vec<Value>) -> Outcome {
    let items = receiver_list(receiver)?;
    let depth = match args.first() {
        Some(v) => position(Some(v))?,
        None => 1,
    };
    let mut out = Vec::new();
    flatten_into(&items, depth, &mut out);
    Ok(Value::list(out))
}

fn flatten_into(items: &[Value], depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::List(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}
