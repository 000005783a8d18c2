use super::{span::Spanned, value::Value};

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Literal value: 'hello', 42, true, null
    Literal(Value),

    /// List literal: [1, 2, 'three']
    List(Vec<Expr>),

    /// Map literal: {'a': 1, 'b': data.x}
    Map(Vec<MapEntry>),

    /// Bare identifier: data, ref, args, or a comprehension variable
    Ident(String),

    /// Field selection: operand.field
    Select { operand: Box<Expr>, field: String },

    /// Index access: operand[index]
    Index { operand: Box<Expr>, index: Box<Expr> },

    /// Function call, either global `f(a)` or member-style `x.f(a)`
    Call(Call),

    /// Presence test produced by the `has(operand.field)` macro
    Has { operand: Box<Expr>, field: String },

    /// Produced by the `map`, `filter`, `all`, `exists` and `exists_one`
    /// macros
    Comprehension(Comprehension),

    /// Ternary: condition ? a : b
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// Binary operation: a == b, a + b, a in b
    BinaryOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// Unary operation: !condition, -number
    UnaryOp { op: UnaryOp, operand: Box<Expr> },
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Call {
    /// Receiver of a member-style call. `None` for global calls.
    pub target: Option<Box<Expr>>,
    pub function: String,
    pub args: Vec<Expr>,
}

impl Call {
    /// Number of arguments the bound function receives, counting the
    /// receiver of a member-style call.
    pub fn arity(&self) -> usize {
        self.args.len() + usize::from(self.target.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    /// The list, map or iterable object being walked.
    pub range: Box<Expr>,
    /// Name bound to each element (each key for maps and objects).
    pub variable: String,
    /// Filter or test applied to each element.
    pub predicate: Option<Box<Expr>>,
    /// Projection applied by `map`.
    pub transform: Option<Box<Expr>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    Map,
    Filter,
    All,
    Exists,
    ExistsOne,
}

impl ComprehensionKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "map" => Some(Self::Map),
            "filter" => Some(Self::Filter),
            "all" => Some(Self::All),
            "exists" => Some(Self::Exists),
            "exists_one" => Some(Self::ExistsOne),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Comparison
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    In,

    // Logical
    And,
    Or,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "<=",
            BinOp::GtEq => ">=",
            BinOp::In => "in",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}
