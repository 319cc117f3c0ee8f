//! Abstract‑syntax‑tree node definitions.
//!
//! Lifetime `'a` ties nodes that contain token references back to the
//! borrowed token slice held by the parser; the token buffer (and therefore
//! the AST) must stay alive for the whole program run because every
//! function value keeps a shared handle to its declaration.
//!
//! `Variable`, `Assign`, `This` and `Super` nodes carry a parser‑issued
//! `id` that is unique per occurrence.  The resolver records lexical
//! distances against these ids so the interpreter can do O(1) environment
//! hops instead of dynamic name search.

use std::rc::Rc;

use crate::token::Token;

/// A **literal constant** that appears directly in the source code.
///
/// These variants are the *terminal leaves* of the expression tree and
/// therefore do **not** retain a reference to the originating [`Token`].
/// The parser copies (or converts) the value at parse‑time.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// Numeric literal ‑ stored as IEEE‑754 `f64`.
    /// Integral lexemes such as `"3"` are still parsed as `3.0`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    /// The boolean constant `true`.
    True,

    /// The boolean constant `false`.
    False,

    /// The `nil` literal (Lox's `null`).
    Nil,
}

/// A function or method declaration.
///
/// Stored behind `Rc` so that every function value created from the
/// declaration shares the same parameter list and body statements instead
/// of cloning them per call‑site.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl<'a> {
    pub name: &'a Token<'a>,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<&'a Token<'a>>,

    /// Body executed when the function is called.  Shared, not owned
    /// exclusively: closures keep it alive after the AST walk moved on.
    pub body: Rc<[Stmt<'a>]>,
}

/// **Abstract‑Syntax‑Tree node** representing every kind of *expression*.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'a> {
    /// A literal constant: number, string, `true`, `false`, or `nil`.
    Literal(LiteralValue),

    /// Prefix unary operator expression, e.g. `!isReady` or `-42`.
    Unary {
        /// The operator token (`!` or `-`).
        operator: &'a Token<'a>,
        /// Operand to which the operator is applied.
        right: Box<Expr<'a>>,
    },

    /// Infix binary operator expression, e.g. `a + b`, `x <= y`.
    Binary {
        left: Box<Expr<'a>>,
        /// Operator token such as `+`, `*`, `==`, …
        operator: &'a Token<'a>,
        right: Box<Expr<'a>>,
    },

    /// Short‑circuiting logical operators `and` / `or`.
    Logical {
        left: Box<Expr<'a>>,
        operator: &'a Token<'a>,
        right: Box<Expr<'a>>,
    },

    /// Parenthesised sub‑expression: `"(" expression ")"`.
    Grouping(Box<Expr<'a>>),

    /// Variable access ‑ resolves to the identifier's current value.
    Variable { name: &'a Token<'a>, id: usize },

    /// Assignment expression: `identifier "=" expression`.
    Assign {
        name: &'a Token<'a>,
        value: Box<Expr<'a>>,
        id: usize,
    },

    /// Function‑ or method‑call expression, e.g. `clock()` or `add(1, 2)`.
    Call {
        /// Expression that evaluates to a callable (variable, property, etc.).
        callee: Box<Expr<'a>>,
        /// The closing `)` token ‑ retained for error reporting.
        paren: &'a Token<'a>,
        /// Argument list (may be empty).
        arguments: Vec<Expr<'a>>,
    },

    /// Property read: `object.property`.
    Get {
        object: Box<Expr<'a>>,
        name: &'a Token<'a>,
    },

    /// Property write: `object.property = value`.
    Set {
        object: Box<Expr<'a>>,
        name: &'a Token<'a>,
        value: Box<Expr<'a>>,
    },

    /// The `this` keyword inside a method body.
    This { keyword: &'a Token<'a>, id: usize },

    /// `super.method` inside a subclass method body.
    Super {
        keyword: &'a Token<'a>,
        method: &'a Token<'a>,
        id: usize,
    },
}

impl<'a> Expr<'a> {
    /// Source line of the token anchoring this expression, for diagnostics.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,
            Expr::Unary { operator, .. } => operator.line,
            Expr::Binary { operator, .. } => operator.line,
            Expr::Logical { operator, .. } => operator.line,
            Expr::Grouping(inner) => inner.line(),
            Expr::Variable { name, .. } => name.line,
            Expr::Assign { name, .. } => name.line,
            Expr::Call { paren, .. } => paren.line,
            Expr::Get { name, .. } => name.line,
            Expr::Set { name, .. } => name.line,
            Expr::This { keyword, .. } => keyword.line,
            Expr::Super { keyword, .. } => keyword.line,
        }
    }
}

/// **Abstract‑Syntax‑Tree node** for *statements* (complete executable
/// constructs).  A program is a sequence of these nodes returned by
/// `Parser::parse`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'a> {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr<'a>),

    /// `print` statement used for output.
    Print(Expr<'a>),

    /// Variable declaration: `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: &'a Token<'a>,
        initializer: Option<Expr<'a>>,
    },

    /// Braced scope containing zero or more declarations/statements.
    Block(Vec<Stmt<'a>>),

    /// `if` / `else` conditional.
    If {
        condition: Expr<'a>,
        then_branch: Box<Stmt<'a>>,
        else_branch: Option<Box<Stmt<'a>>>,
    },

    /// `while` loop.  `for` loops are desugared to this plus a `Block`.
    While {
        condition: Expr<'a>,
        body: Box<Stmt<'a>>,
    },

    /// Function declaration ‑ becomes a first‑class callable value.
    Function(Rc<FunctionDecl<'a>>),

    /// `return` statement inside a function body.
    Return {
        /// The `return` keyword token (for error locations).
        keyword: &'a Token<'a>,

        /// Optional expression to return.  Absent ⇒ `nil` is returned.
        value: Option<Expr<'a>>,
    },

    /// Class declaration with optional superclass clause.
    Class {
        name: &'a Token<'a>,

        /// `< Super` clause; always an `Expr::Variable` when present.
        superclass: Option<Expr<'a>>,

        methods: Vec<Rc<FunctionDecl<'a>>>,
    },
}
