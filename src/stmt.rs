use std::rc::Rc;

use crate::expr::Expr;
use crate::token::Token;

/// Shared body of a function, method or lambda. Held behind `Rc` so closures
/// keep it alive after the statement list that declared it is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// `None` for lambdas.
    pub name: Option<Token>,

    /// Token that introduced the function (`fun` or the method name); used
    /// for error lines when `name` is absent.
    pub keyword: Token,

    /// Parameter name tokens (arity ≤ 255).
    pub params: Vec<Token>,

    pub body: Vec<Stmt>,

    /// Declared without a parameter list; runs on property access.
    pub is_getter: bool,
}

impl FunctionDecl {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Declared name, or `lambda` for anonymous functions.
    pub fn display_name(&self) -> &str {
        match &self.name {
            Some(token) => &token.lexeme,
            None => "lambda",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Stand‑alone expression terminated by a semicolon.
    Expression(Expr),

    Print(Expr),

    /// `"var" IDENT ("=" initializer)? ";"`.
    Var {
        name: Token,
        initializer: Option<Expr>,
    },

    Block(Vec<Stmt>),

    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `while` loop. `for` loops are desugared into this.
    While {
        condition: Expr,
        body: Box<Stmt>,
    },

    Function(Rc<FunctionDecl>),

    Return {
        /// The `return` keyword (or `:` of an expression body).
        keyword: Token,

        /// Absent ⇒ `nil` is returned.
        value: Option<Expr>,
    },

    Break {
        keyword: Token,
    },

    Class {
        name: Token,
        /// Always an `Expr::Variable` when present.
        superclass: Option<Expr>,
        methods: Vec<Rc<FunctionDecl>>,
        /// Methods declared with a leading `class`.
        class_methods: Vec<Rc<FunctionDecl>>,
    },
}
