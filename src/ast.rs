use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    NumberLit(f64),
    StringLit(String),
    BoolLit(bool),
    Null,
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Var(String),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo['bar'], foo[0]
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>), // cond ? a : b
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    For,
    If,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::For => f.write_str("for"),
            BlockKind::If => f.write_str("if"),
        }
    }
}

/// Block tree node. Expressions are kept as source text and evaluated per
/// render so that a broken expression only degrades its own directive.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Var(String),
    For {
        target: String,   // e.g., "item"
        iterable: String, // e.g., "items", "3", "[1, 2]"
        body: Vec<Node>,
    },
    If {
        condition: String,
        body: Vec<Node>,
    },
    /// Plain include directive. Resolved after rendering, in the frame it was
    /// rendered in.
    Include {
        directive: String,
        args: String,
    },
}

pub type Template = Vec<Node>;
