use std::rc::Rc;

use serde::Serialize;

use crate::ast::ExprId;
use crate::stmt::FunctionDecl;
use crate::token::Token;

/// A **literal constant** that appears directly in the source code.
///
/// The parser copies the value out of the token so the tree does not depend
/// on the token buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiteralValue {
    /// Numeric literal stored as IEEE‑754 `f64`.
    Number(f64),

    /// String literal without surrounding quotes.
    Str(String),

    True,

    False,

    Nil,
}

/// Expression node. Variants that the resolver binds (`Variable`, `Assign`,
/// `This`, `Super`) carry an [`ExprId`] so the binding table can key on node
/// identity rather than content.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralValue),

    /// Prefix operator: `!ready`, `-42`.
    Unary {
        operator: Token,
        right: Box<Expr>,
    },

    /// Infix arithmetic, comparison or equality operator.
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    /// Short‑circuiting `and` / `or`.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },

    Grouping(Box<Expr>),

    Variable {
        id: ExprId,
        name: Token,
    },

    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },

    Call {
        callee: Box<Expr>,
        /// Closing `)`, kept for error locations.
        paren: Token,
        arguments: Vec<Expr>,
    },

    /// Anonymous `fun (params) { ... }` / `fun (params): expr`.
    Lambda(Rc<FunctionDecl>),

    /// object.property
    Get {
        object: Box<Expr>,
        name: Token,
    },

    /// object.property = value
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },

    This {
        id: ExprId,
        keyword: Token,
    },

    /// `super.method`
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

impl Expr {
    /// Best line to blame for this expression.
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal(_) => 0,

            Expr::Unary { operator, .. } => operator.line,

            Expr::Binary { operator, .. } | Expr::Logical { operator, .. } => operator.line,

            Expr::Grouping(expr) => expr.line(),

            Expr::Variable { name, .. } | Expr::Assign { name, .. } => name.line,

            Expr::Call { paren, .. } => paren.line,

            Expr::Lambda(decl) => decl.keyword.line,

            Expr::Get { name, .. } | Expr::Set { name, .. } => name.line,

            Expr::This { keyword, .. } | Expr::Super { keyword, .. } => keyword.line,
        }
    }
}
