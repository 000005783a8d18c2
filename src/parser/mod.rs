//! Expression parser, built on [pest](https://pest.rs/).
//!
//! The grammar is defined in `expr.pest`. This module converts pest's
//! parse tree into the typed AST defined in [`crate::ast`], resolving
//! operator precedence with a Pratt parser and expanding the `has()` and
//! comprehension macros (`map`, `filter`, `all`, `exists`, `exists_one`)
//! into dedicated AST nodes.
//!
//! Use [`parse_expr`] to convert a single expression into an [`Expr`].
//! [`Env::compile`](crate::Env::compile) parses and then checks the tree
//! against the declared functions.

use std::sync::LazyLock;

use pest::Parser;
use pest::iterators::Pair;
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::ast::expr::*;
use crate::ast::span::{Span, Spanned};
use crate::ast::value::Value;
use crate::error::ParseError;

#[derive(Parser)]
#[grammar = "parser/expr.pest"]
struct ExprParser;

// Lowest precedence first, as pest expects.
static PRATT: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))
        .op(Op::infix(Rule::and, Assoc::Left))
        .op(Op::infix(Rule::eq, Assoc::Left)
            | Op::infix(Rule::ne, Assoc::Left)
            | Op::infix(Rule::lt, Assoc::Left)
            | Op::infix(Rule::le, Assoc::Left)
            | Op::infix(Rule::gt, Assoc::Left)
            | Op::infix(Rule::ge, Assoc::Left)
            | Op::infix(Rule::in_op, Assoc::Left))
        .op(Op::infix(Rule::add, Assoc::Left) | Op::infix(Rule::sub, Assoc::Left))
        .op(Op::infix(Rule::mul, Assoc::Left)
            | Op::infix(Rule::div, Assoc::Left)
            | Op::infix(Rule::rem, Assoc::Left))
});

type ParseResult<T> = Result<T, Vec<ParseError>>;

/// Parse a single expression into an [`Expr`] AST.
///
/// Returns a list of [`ParseError`]s if the source contains invalid syntax
/// or a malformed macro call. Each error carries a source [`Span`].
pub fn parse_expr(source: &str) -> ParseResult<Expr> {
    let mut pairs = ExprParser::parse(Rule::expression, source).map_err(|e| {
        let span = pest_span_to_span(&e);
        vec![ParseError::new(
            span,
            format!("syntax error: {}", e.variant.message()),
        )]
    })?;

    // expression = { SOI ~ conditional ~ EOI }
    let expression = pairs.next().unwrap();
    let conditional = expression.into_inner().next().unwrap();
    build_conditional(conditional)
}

fn pest_span_to_span(e: &pest::error::Error<Rule>) -> Span {
    match &e.location {
        pest::error::InputLocation::Pos(p) => Span::new(*p, *p + 1),
        pest::error::InputLocation::Span((s, e)) => Span::new(*s, *e),
    }
}

fn pair_span(pair: &Pair<Rule>) -> Span {
    let s = pair.as_span();
    Span::new(s.start(), s.end())
}

// -- Operators -----------------------------------------------------------

fn build_conditional(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = pair_span(&pair);
    let mut inner = pair.into_inner();

    let condition = build_binary(inner.next().unwrap())?;
    match (inner.next(), inner.next()) {
        (Some(then_pair), Some(else_pair)) => {
            let then_branch = build_conditional(then_pair)?;
            let else_branch = build_conditional(else_pair)?;
            Ok(Spanned::new(
                ExprKind::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                span,
            ))
        }
        _ => Ok(condition),
    }
}

fn build_binary(pair: Pair<Rule>) -> ParseResult<Expr> {
    PRATT
        .map_primary(build_unary)
        .map_infix(|left, op, right| {
            let left = left?;
            let right = right?;
            let span = left.span.merge(right.span);
            Ok(Spanned::new(
                ExprKind::BinaryOp {
                    left: Box::new(left),
                    op: parse_bin_op(op.as_rule()),
                    right: Box::new(right),
                },
                span,
            ))
        })
        .parse(pair.into_inner())
}

fn parse_bin_op(rule: Rule) -> BinOp {
    match rule {
        Rule::or => BinOp::Or,
        Rule::and => BinOp::And,
        Rule::eq => BinOp::Eq,
        Rule::ne => BinOp::NotEq,
        Rule::lt => BinOp::Lt,
        Rule::le => BinOp::LtEq,
        Rule::gt => BinOp::Gt,
        Rule::ge => BinOp::GtEq,
        Rule::in_op => BinOp::In,
        Rule::add => BinOp::Add,
        Rule::sub => BinOp::Sub,
        Rule::mul => BinOp::Mul,
        Rule::div => BinOp::Div,
        Rule::rem => BinOp::Rem,
        _ => unreachable!("unknown operator rule: {rule:?}"),
    }
}

fn build_unary(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = pair_span(&pair);
    let mut ops = Vec::new();
    let mut operand = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::prefix_op => ops.push(match inner.as_str() {
                "!" => UnaryOp::Not,
                "-" => UnaryOp::Neg,
                _ => unreachable!(),
            }),
            _ => operand = Some(build_member(inner)?),
        }
    }

    let mut expr = operand.unwrap();
    // The operator closest to the operand applies first.
    for op in ops.into_iter().rev() {
        expr = match (op, expr.node) {
            (UnaryOp::Neg, ExprKind::Literal(Value::Number(n))) => {
                Spanned::new(ExprKind::Literal(Value::Number(-n)), span)
            }
            (op, node) => Spanned::new(
                ExprKind::UnaryOp {
                    op,
                    operand: Box::new(Spanned::new(node, expr.span)),
                },
                span,
            ),
        };
    }
    Ok(expr)
}

// -- Member chains -------------------------------------------------------

fn build_member(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = build_primary(inner.next().unwrap())?;

    for postfix in inner {
        let span = expr.span.merge(pair_span(&postfix));
        expr = match postfix.as_rule() {
            Rule::field => {
                let field = postfix.into_inner().next().unwrap().as_str().to_string();
                Spanned::new(
                    ExprKind::Select {
                        operand: Box::new(expr),
                        field,
                    },
                    span,
                )
            }
            Rule::index => {
                let index = build_conditional(postfix.into_inner().next().unwrap())?;
                Spanned::new(
                    ExprKind::Index {
                        operand: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                )
            }
            Rule::member_call => {
                let mut parts = postfix.into_inner();
                let function = parts.next().unwrap().as_str().to_string();
                let args = build_args(parts.next())?;
                build_call(Some(expr), function, args, span)?
            }
            other => unreachable!("unexpected postfix rule: {other:?}"),
        };
    }

    Ok(expr)
}

fn build_primary(pair: Pair<Rule>) -> ParseResult<Expr> {
    let span = pair_span(&pair);

    match pair.as_rule() {
        Rule::conditional => build_conditional(pair),
        Rule::number => {
            let n: f64 = pair.as_str().parse().map_err(|_| {
                vec![ParseError::new(
                    span,
                    format!("invalid number: {}", pair.as_str()),
                )]
            })?;
            Ok(Spanned::new(ExprKind::Literal(Value::Number(n)), span))
        }
        Rule::string => {
            let s = extract_string_content(pair);
            Ok(Spanned::new(ExprKind::Literal(Value::String(s)), span))
        }
        Rule::bool_literal => {
            let b = pair.as_str() == "true";
            Ok(Spanned::new(ExprKind::Literal(Value::Bool(b)), span))
        }
        Rule::null_literal => Ok(Spanned::new(ExprKind::Literal(Value::Null), span)),
        Rule::list_literal => {
            let mut elements = Vec::new();
            for inner in pair.into_inner() {
                elements.push(build_conditional(inner)?);
            }
            Ok(Spanned::new(ExprKind::List(elements), span))
        }
        Rule::map_literal => {
            let mut entries = Vec::new();
            for entry in pair.into_inner() {
                let mut kv = entry.into_inner();
                let key = build_conditional(kv.next().unwrap())?;
                let value = build_conditional(kv.next().unwrap())?;
                entries.push(MapEntry { key, value });
            }
            Ok(Spanned::new(ExprKind::Map(entries), span))
        }
        Rule::global_call => {
            let mut parts = pair.into_inner();
            let function = parts.next().unwrap().as_str().to_string();
            let args = build_args(parts.next())?;
            build_call(None, function, args, span)
        }
        Rule::ident => Ok(Spanned::new(
            ExprKind::Ident(pair.as_str().to_string()),
            span,
        )),
        rule => Err(vec![ParseError::new(
            span,
            format!("unexpected rule in primary position: {rule:?}"),
        )]),
    }
}

fn build_args(pair: Option<Pair<Rule>>) -> ParseResult<Vec<Expr>> {
    let mut args = Vec::new();
    if let Some(arg_list) = pair {
        for arg in arg_list.into_inner() {
            args.push(build_conditional(arg)?);
        }
    }
    Ok(args)
}

// -- Macros --------------------------------------------------------------

/// Build a call node, expanding `has()` and the comprehension macros.
fn build_call(
    target: Option<Expr>,
    function: String,
    mut args: Vec<Expr>,
    span: Span,
) -> ParseResult<Expr> {
    match target {
        None if function == "has" => match (args.pop(), args.is_empty()) {
            (
                Some(Spanned {
                    node: ExprKind::Select { operand, field },
                    ..
                }),
                true,
            ) => Ok(Spanned::new(ExprKind::Has { operand, field }, span)),
            _ => Err(vec![
                ParseError::new(span, "invalid argument to has() macro")
                    .with_hint("has() expects a field selection such as has(data.name)"),
            ]),
        },
        Some(range) => match ComprehensionKind::from_name(&function) {
            Some(kind) => build_comprehension(kind, range, &function, args, span),
            None => Ok(call_expr(Some(range), function, args, span)),
        },
        None => Ok(call_expr(None, function, args, span)),
    }
}

fn call_expr(target: Option<Expr>, function: String, args: Vec<Expr>, span: Span) -> Expr {
    Spanned::new(
        ExprKind::Call(Call {
            target: target.map(Box::new),
            function,
            args,
        }),
        span,
    )
}

fn build_comprehension(
    kind: ComprehensionKind,
    range: Expr,
    name: &str,
    args: Vec<Expr>,
    span: Span,
) -> ParseResult<Expr> {
    let expected = match kind {
        ComprehensionKind::Map => "2 or 3",
        _ => "2",
    };
    let arity_ok = match kind {
        ComprehensionKind::Map => args.len() == 2 || args.len() == 3,
        _ => args.len() == 2,
    };
    if !arity_ok {
        return Err(vec![ParseError::new(
            span,
            format!("{name}() macro expects {expected} arguments, got {}", args.len()),
        )]);
    }

    let mut args = args.into_iter();
    let binding = args.next().unwrap();
    let variable = match binding.node {
        ExprKind::Ident(name) => name,
        _ => {
            return Err(vec![
                ParseError::new(binding.span, format!("invalid variable in {name}() macro"))
                    .with_hint("the first argument must be a simple name, e.g. list.map(e, e * 2)"),
            ]);
        }
    };

    let rest: Vec<Expr> = args.collect();
    let (predicate, transform) = match (kind, rest.len()) {
        (ComprehensionKind::Map, 1) => (None, rest.into_iter().next()),
        (ComprehensionKind::Map, _) => {
            let mut it = rest.into_iter();
            (it.next(), it.next())
        }
        _ => (rest.into_iter().next(), None),
    };

    Ok(Spanned::new(
        ExprKind::Comprehension(Comprehension {
            kind,
            range: Box::new(range),
            variable,
            predicate: predicate.map(Box::new),
            transform: transform.map(Box::new),
        }),
        span,
    ))
}

// -- Helpers -------------------------------------------------------------

fn extract_string_content(pair: Pair<Rule>) -> String {
    // string = ${ "'" ~ single_inner ~ "'" | "\"" ~ double_inner ~ "\"" }
    let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");

    // Process escape sequences
    let mut result = String::new();
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('r') => result.push('\r'),
                Some('"') => result.push('"'),
                Some('\'') => result.push('\''),
                Some('\\') => result.push('\\'),
                Some('u') => {
                    let hex: String = chars.by_ref().take(4).collect();
                    match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                        Some(c) => result.push(c),
                        None => {
                            result.push_str("\\u");
                            result.push_str(&hex);
                        }
                    }
                }
                Some(c) => {
                    result.push('\\');
                    result.push(c);
                }
                None => result.push('\\'),
            }
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse_expr(source).unwrap_or_else(|e| panic!("parse of {source:?} failed: {e:?}"))
    }

    #[test]
    fn test_string_literal() {
        let expr = parse_ok("'lit'");
        match expr.node {
            ExprKind::Literal(Value::String(s)) => assert_eq!(s, "lit"),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn test_double_quoted_string_with_escapes() {
        let expr = parse_ok(r#""a\"b\nA""#);
        match expr.node {
            ExprKind::Literal(Value::String(s)) => assert_eq!(s, "a\"b\nA"),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn test_field_selection_chain() {
        let expr = parse_ok("data.person.Name");
        match expr.node {
            ExprKind::Select { operand, field } => {
                assert_eq!(field, "Name");
                match operand.node {
                    ExprKind::Select { operand, field } => {
                        assert_eq!(field, "person");
                        assert!(matches!(operand.node, ExprKind::Ident(ref n) if n == "data"));
                    }
                    other => panic!("expected select, got {other:?}"),
                }
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_multiplication_binds_tighter() {
        let expr = parse_ok("1 + 2 * 3");
        match expr.node {
            ExprKind::BinaryOp { left, op, right } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(left.node, ExprKind::Literal(Value::Number(n)) if n == 1.0));
                assert!(matches!(right.node, ExprKind::BinaryOp { op: BinOp::Mul, .. }));
            }
            other => panic!("expected binary op, got {other:?}"),
        }
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_ok("a || b && c");
        match expr.node {
            ExprKind::BinaryOp { op, right, .. } => {
                assert_eq!(op, BinOp::Or);
                assert!(matches!(right.node, ExprKind::BinaryOp { op: BinOp::And, .. }));
            }
            other => panic!("expected binary op, got {other:?}"),
        }
    }

    #[test]
    fn test_ternary() {
        let expr = parse_ok("has(data.sub1) ? data.sub1 : ref.sub1Default");
        match expr.node {
            ExprKind::Conditional { condition, .. } => {
                assert!(
                    matches!(condition.node, ExprKind::Has { ref field, .. } if field == "sub1")
                );
            }
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn test_has_requires_selection() {
        let errs = parse_expr("has(data)").unwrap_err();
        assert!(errs[0].message.contains("has()"));
        assert!(errs[0].hint.is_some());
    }

    #[test]
    fn test_map_macro() {
        let expr = parse_ok("data.list1.map(e, 'value' + string(e))");
        match expr.node {
            ExprKind::Comprehension(c) => {
                assert_eq!(c.kind, ComprehensionKind::Map);
                assert_eq!(c.variable, "e");
                assert!(c.predicate.is_none());
                assert!(c.transform.is_some());
            }
            other => panic!("expected comprehension, got {other:?}"),
        }
    }

    #[test]
    fn test_map_macro_with_filter() {
        let expr = parse_ok("[1, 2, 3].map(x, x > 1, x * 10)");
        match expr.node {
            ExprKind::Comprehension(c) => {
                assert!(c.predicate.is_some());
                assert!(c.transform.is_some());
            }
            other => panic!("expected comprehension, got {other:?}"),
        }
    }

    #[test]
    fn test_macro_variable_must_be_ident() {
        let errs = parse_expr("data.list.exists(1, true)").unwrap_err();
        assert!(errs[0].message.contains("exists()"));
    }

    #[test]
    fn test_global_and_member_calls() {
        let expr = parse_ok("fragment('frag1', 'blue', data.person.Name)");
        match expr.node {
            ExprKind::Call(call) => {
                assert!(call.target.is_none());
                assert_eq!(call.function, "fragment");
                assert_eq!(call.args.len(), 3);
                assert_eq!(call.arity(), 3);
            }
            other => panic!("expected call, got {other:?}"),
        }

        let expr = parse_ok("data.list1.fragment('frag1')");
        match expr.node {
            ExprKind::Call(call) => {
                assert!(call.target.is_some());
                assert_eq!(call.arity(), 2);
            }
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn test_index_and_select_after_call() {
        let expr = parse_ok("fragment('x', v).Field[0]");
        match expr.node {
            ExprKind::Index { operand, .. } => {
                assert!(
                    matches!(operand.node, ExprKind::Select { ref field, .. } if field == "Field")
                );
            }
            other => panic!("expected index, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_literal_is_folded() {
        let expr = parse_ok("-4");
        assert!(matches!(expr.node, ExprKind::Literal(Value::Number(n)) if n == -4.0));
    }

    #[test]
    fn test_in_operator_and_identifiers_starting_with_in() {
        let expr = parse_ok("'a' in data.items");
        assert!(matches!(expr.node, ExprKind::BinaryOp { op: BinOp::In, .. }));

        let expr = parse_ok("index");
        assert!(matches!(expr.node, ExprKind::Ident(ref n) if n == "index"));
    }

    #[test]
    fn test_list_and_map_literals() {
        let expr = parse_ok("{'a': [1, 2,], 'b': null}");
        match expr.node {
            ExprKind::Map(entries) => {
                assert_eq!(entries.len(), 2);
                assert!(
                    matches!(entries[0].value.node, ExprKind::List(ref items) if items.len() == 2)
                );
            }
            other => panic!("expected map literal, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_has_span() {
        let errs = parse_expr("data.(name").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].message.starts_with("syntax error"));
        assert_eq!(errs[0].span.start, 5);
    }
}
