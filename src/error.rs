//! Error types for compilation and evaluation.
//!
//! [`ParseError`] is produced while compiling a single expression and
//! carries a source span for diagnostic formatting. [`CompileError`] is
//! produced while compiling a whole template or fragment and points at the
//! JSON location of the failing leaf. [`EvalError`] is produced during
//! evaluation and can originate from the evaluator, a registered function,
//! or an extension value.

use crate::ast::span::Span;
use std::sync::Arc;
use thiserror::Error;

// ── Parse errors ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with source context for display
    pub fn format_with_source(&self, source: &str, location: Option<&str>) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let source_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

        let location = if let Some(name) = location {
            format!(" --> {name}:{line}:{col}")
        } else {
            format!(" --> {line}:{col}")
        };

        let pointer = " ".repeat(col.saturating_sub(1)) + &"^".repeat(self.span.len().max(1));

        let mut output = format!(
            "Error: {}\n{location}\n  |\n{line:>3} | {source_line}\n    | {pointer}",
            self.message
        );

        if let Some(hint) = &self.hint {
            output.push_str(&format!("\n  = hint: {hint}"));
        }

        output
    }
}

fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

// ── Compile errors ──────────────────────────────────────────────────────

/// A template or fragment failed to compile. Always fatal: no
/// [`Template`](crate::Template) is produced.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The template text is not valid JSON.
    #[error("invalid template JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The template root is a scalar.
    #[error("template root must be a JSON object or array, got {found}")]
    InvalidRoot { found: &'static str },

    /// A string leaf failed to compile as an expression.
    #[error("cannot compile expression at {path}: {}", summarize(.errors))]
    Expression {
        /// JSON-pointer style location of the leaf, e.g. `/sub2/name`.
        path: String,
        /// The expression text.
        expression: String,
        errors: Vec<ParseError>,
    },

    /// A named fragment failed to compile.
    #[error("fragment `{name}`: {source}")]
    Fragment {
        name: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    /// Render every expression diagnostic with a caret pointing into the
    /// failing expression. Other variants fall back to `Display`.
    pub fn to_diagnostic(&self) -> String {
        match self {
            CompileError::Expression {
                path,
                expression,
                errors,
            } => errors
                .iter()
                .map(|e| e.format_with_source(expression, Some(path)))
                .collect::<Vec<_>>()
                .join("\n"),
            CompileError::Fragment { name, source } => {
                format!("in fragment `{name}`:\n{}", source.to_diagnostic())
            }
            other => other.to_string(),
        }
    }
}

fn summarize(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Eval errors ─────────────────────────────────────────────────────────

/// An error that occurs while evaluating an expression or expanding a
/// template.
///
/// Carries a structured [`EvalErrorKind`], a human-readable message,
/// an optional source [`Span`], and an optional underlying error cause.
///
/// # Error chaining
///
/// A registered function that fails because of an underlying error can
/// keep the original chain with [`with_source`](EvalError::with_source):
///
/// ```rust
/// use weaver_json::EvalError;
///
/// fn example() -> Result<(), EvalError> {
///     let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
///     Err(EvalError::host_error("failed to load lookup table").with_source(io_err))
/// }
/// ```
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub span: Option<Span>,
    pub message: String,
    /// The underlying error that caused this evaluation error, if any.
    ///
    /// Wrapped in `Arc` so that `EvalError` remains `Clone`.
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

/// Marker used by the textual missing-key check.
const NO_SUCH_KEY: &str = "no such key";

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach the span only if none is set yet.
    pub fn or_span(self, span: Span) -> Self {
        if self.span.is_none() {
            self.with_span(span)
        } else {
            self
        }
    }

    /// Attach an underlying error cause to this evaluation error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Whether this failure means a key or attribute could not be resolved.
    ///
    /// The structured kind is authoritative. A message containing
    /// `no such key` is also accepted so that host functions which only
    /// report the condition textually are classified the same way.
    pub fn is_missing_key(&self) -> bool {
        self.kind == EvalErrorKind::NoSuchKey || self.message.contains(NO_SUCH_KEY)
    }

    // Convenience constructors for common error types

    pub fn no_such_key(key: &str) -> Self {
        Self::new(EvalErrorKind::NoSuchKey, format!("{NO_SUCH_KEY}: {key}"))
    }

    pub fn undeclared_reference(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UndeclaredReference,
            format!("undeclared reference to '{name}'"),
        )
    }

    pub fn no_such_overload(function: &str, types: &[&str]) -> Self {
        Self::new(
            EvalErrorKind::NoSuchOverload,
            format!("no such overload: {function}({})", types.join(", ")),
        )
    }

    pub fn type_error(expected: &str, got: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeError,
            format!("expected {expected}, got {got}"),
        )
    }

    pub fn index_out_of_range(index: f64, len: usize) -> Self {
        Self::new(
            EvalErrorKind::IndexOutOfRange,
            format!("index out of range: {index} (length {len})"),
        )
    }

    pub fn conversion(from: &str, to: &str) -> Self {
        Self::new(
            EvalErrorKind::Conversion,
            format!("type conversion error from '{from}' to '{to}'"),
        )
    }

    pub fn fragment_not_found(name: &str) -> Self {
        Self::new(
            EvalErrorKind::FragmentNotFound,
            format!("fragment not found: {name}"),
        )
    }

    pub fn host_error(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::HostError, message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    /// A map or object key, or a selected field, does not exist.
    NoSuchKey,
    /// An identifier is not bound in the activation.
    UndeclaredReference,
    /// No operator or function implementation accepts the argument types.
    NoSuchOverload,
    TypeError,
    IndexOutOfRange,
    ArithmeticError,
    /// A value cannot be converted to the requested type.
    Conversion,
    /// `fragment()` named a fragment that was never registered.
    FragmentNotFound,
    /// Raised by a registered host function.
    HostError,
}

// ── Combined error ──────────────────────────────────────────────────────

/// Combined error type returned by the one-shot helpers
/// ([`render`](crate::render), [`Template::expand_str`](crate::Template::expand_str)).
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template or one of its fragments failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Expansion was aborted.
    #[error(transparent)]
    Eval(#[from] EvalError),
    /// Input could not be parsed, or output could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
