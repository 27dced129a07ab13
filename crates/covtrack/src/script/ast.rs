//! Syntax tree produced by the parser

use super::token::{Span, Token};
use std::sync::Arc;

/// A parsed source file
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Top-level statements
    pub block: Block,
    /// Full token stream, comments included
    pub tokens: Vec<Token>,
    /// Number of lines in the source text
    pub line_count: u32,
    /// Bodies carrying an [`Block::id`]
    pub body_count: u32,
}

/// Statement list with its own scope
#[derive(Debug, Clone)]
pub struct Block {
    /// Statements in order
    pub stmts: Vec<Stmt>,
    /// Source range of the statements
    pub span: Span,
    /// Pre-order index of function, loop and `if` arm bodies; `None` for
    /// `do` blocks and the chunk itself
    pub id: Option<u32>,
    /// Byte offset just past the token that opens the body
    pub open: usize,
}

/// A statement and where it starts
#[derive(Debug, Clone)]
pub struct Stmt {
    /// What the statement does
    pub kind: StmtKind,
    /// Start line is the line execution is reported on
    pub span: Span,
}

/// Statement forms
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `local a, b = ...`
    Local {
        /// Declared names
        names: Vec<String>,
        /// Initializers, possibly fewer than names
        values: Vec<Expr>,
    },
    /// `local function f() ... end`
    LocalFunction {
        /// Declared name
        name: String,
        /// Parameters and body
        func: Arc<FuncBody>,
    },
    /// `function a.b:c() ... end`
    Function {
        /// Target path
        name: FuncName,
        /// Parameters and body
        func: Arc<FuncBody>,
    },
    /// `a, t[k] = ...`
    Assign {
        /// Names or index expressions
        targets: Vec<Expr>,
        /// Assigned values
        values: Vec<Expr>,
    },
    /// Call used as a statement
    Call(Expr),
    /// `if` with optional `elseif` and `else` arms
    If {
        /// `if` arm first, then each `elseif`
        arms: Vec<CondArm>,
        /// Trailing `else`
        else_arm: Option<ElseArm>,
    },
    /// `while cond do ... end`
    While {
        /// Checked before every iteration
        cond: Expr,
        /// Loop body
        body: Block,
    },
    /// `for i = start, limit, step do ... end`
    NumericFor {
        /// Loop variable
        var: String,
        /// Initial value
        start: Expr,
        /// Inclusive bound
        limit: Expr,
        /// Increment, 1 when absent
        step: Option<Expr>,
        /// Loop body
        body: Block,
    },
    /// `for k, v in iter do ... end`
    GenericFor {
        /// Loop variables
        names: Vec<String>,
        /// Iterator, state and initial control value
        exprs: Vec<Expr>,
        /// Loop body
        body: Block,
    },
    /// `do ... end`
    Do(Block),
    /// `return ...`
    Return(Vec<Expr>),
    /// `break`
    Break,
}

/// An `if` or `elseif` arm
#[derive(Debug, Clone)]
pub struct CondArm {
    /// Arm condition
    pub cond: Expr,
    /// Taken when `cond` is truthy
    pub block: Block,
    /// Line of the `if` / `elseif` keyword
    pub line: u32,
}

/// The `else` arm of an `if`
#[derive(Debug, Clone)]
pub struct ElseArm {
    /// Taken when no condition held
    pub block: Block,
    /// Line of the `else` keyword
    pub line: u32,
}

/// `a.b.c` or `a.b:c` in a `function` statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncName {
    /// Dotted segments
    pub path: Vec<String>,
    /// Name after `:`
    pub method: Option<String>,
}

impl FuncName {
    /// Dotted display form, `M.f` or `M:g`
    #[must_use]
    pub fn display(&self) -> String {
        let mut name = self.path.join(".");
        if let Some(method) = &self.method {
            name.push(':');
            name.push_str(method);
        }
        name
    }
}

/// Parameters and body shared by every closure created from it
#[derive(Debug)]
pub struct FuncBody {
    /// Parameter names, `self` first for methods
    pub params: Vec<String>,
    /// Takes `...`
    pub is_variadic: bool,
    /// Function body
    pub body: Block,
    /// From the `function` keyword through `end`
    pub span: Span,
}

/// An expression and its source range
#[derive(Debug, Clone)]
pub struct Expr {
    /// Expression form
    pub kind: ExprKind,
    /// Source range
    pub span: Span,
}

/// Expression forms
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Numeric literal
    Number(f64),
    /// String literal, escapes resolved
    Str(Arc<str>),
    /// `...`
    Vararg,
    /// `function() ... end`
    Function(Arc<FuncBody>),
    /// Variable reference
    Name(String),
    /// `obj[key]` or `obj.key`
    Index {
        /// Indexed value
        obj: Box<Expr>,
        /// Key expression
        key: Box<Expr>,
    },
    /// `callee(args)`
    Call {
        /// Called value
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `obj:name(args)`
    Method {
        /// Receiver, passed as `self`
        obj: Box<Expr>,
        /// Method name
        name: String,
        /// Arguments after `self`
        args: Vec<Expr>,
    },
    /// `{ ... }`
    Table(Vec<TableField>),
    /// `lhs op rhs`
    Binary {
        /// Operator
        op: BinOp,
        /// Left operand
        lhs: Box<Expr>,
        /// Right operand
        rhs: Box<Expr>,
    },
    /// `op operand`
    Unary {
        /// Operator
        op: UnOp,
        /// Operand
        operand: Box<Expr>,
    },
    /// `(expr)`, truncates to one value
    Paren(Box<Expr>),
}

impl ExprKind {
    /// Calls and `...` can produce several values
    #[must_use]
    pub const fn is_multi(&self) -> bool {
        matches!(self, Self::Call { .. } | Self::Method { .. } | Self::Vararg)
    }
}

/// One entry of a table constructor
#[derive(Debug, Clone)]
pub enum TableField {
    /// `value`, stored at the next array index
    Positional(Expr),
    /// `name = value`
    Named(String, Expr),
    /// `[key] = value`
    Keyed(Expr, Expr),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `or`
    Or,
    /// `and`
    And,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `~=`
    NotEq,
    /// `..`
    Concat,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    IDiv,
    /// `%`
    Mod,
    /// `^`
    Pow,
}

impl BinOp {
    /// Left and right binding priorities
    #[must_use]
    pub const fn priority(self) -> (u8, u8) {
        match self {
            Self::Or => (1, 1),
            Self::And => (2, 2),
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Eq | Self::NotEq => (3, 3),
            Self::Concat => (9, 8),
            Self::Add | Self::Sub => (10, 10),
            Self::Mul | Self::Div | Self::IDiv | Self::Mod => (11, 11),
            Self::Pow => (14, 13),
        }
    }
}

/// Priority of unary operators
pub const UNARY_PRIORITY: u8 = 12;

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// `-`
    Neg,
    /// `not`
    Not,
    /// `#`
    Len,
}
