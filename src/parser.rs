/*!
Recursive‑descent parser for Rox.

Time & Space
------------
Each token is consumed once via `advance()`; error recovery
(`synchronize()`) only discards tokens up to the next statement boundary, so
the whole pass is **Θ(n)** in the number of tokens. Call‑stack depth grows
with syntactic nesting.

### Logging Policy

| Location                     | Level  | Purpose                                   |
|------------------------------|--------|-------------------------------------------|
| `Parser::new`, `parse`       | `info` | Lifecycle milestones.                     |
| `declaration`, `statement`   | `debug`| High‑level descent into grammar branches. |
| Error paths (`synchronize`)  | `debug`| Context before resuming.                  |

--------------------------------------------------------------------------------
Grammar (EBNF, condensed)
--------------------------------------------------------

```text
program        → declaration* EOF ;
declaration    → classDecl | funDecl | varDecl | statement ;
classDecl      → "class" IDENT ( ":" IDENT )? "{" ( "class"? method )* "}" ;
funDecl        → "fun" IDENT "(" parameters? ")" body ;
method         → IDENT ( "(" parameters? ")" )? body ;
body           → block | ":" expression ";" ;
varDecl        → "var" IDENT ( "=" expression )? ";" ;
statement      → exprStmt | forStmt | ifStmt | printStmt | returnStmt
               | breakStmt | whileStmt | block ;
forStmt        → "for" "(" ( varDecl | exprStmt | ";" )
                 expression? ";" expression? ")" statement ;
returnStmt     → "return" expression? ";" ;
breakStmt      → "break" ";" ;
block          → "{" declaration* "}" ;
expression     → assignment ;
assignment     → ( call "." )? IDENT ( "=" | "+=" | "-=" | "*=" | "/=" | "%=" )
                 assignment | logic_or ;
logic_or       → logic_and ( "or" logic_and )* ;
logic_and      → equality  ( "and" equality )* ;
equality       → comparison ( ( "!=" | "==" ) comparison )* ;
comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
term           → factor ( ( "-" | "+" ) factor )* ;
factor         → unary ( ( "/" | "*" | "%" ) unary )* ;
unary          → ( "!" | "-" | "++" | "--" ) unary | call ;
call           → primary ( "(" arguments? ")" | "." IDENT )* ;
primary        → NUMBER | STRING | "true" | "false" | "nil" | "this"
               | "super" "." IDENT | IDENT | "(" expression ")"
               | "fun" "(" parameters? ")" ( block | ":" expression ) ;
```

`for` loops, compound assignment and prefix `++`/`--` never reach the
interpreter: they are rewritten here into `while`, `=` and binary nodes.
*/

use std::fmt;
use std::rc::Rc;

use crate::ast::{Expr, ExprId, FunctionDecl, LiteralValue, NodeIds, Stmt};
use crate::error::{ErrorSink, LoxError, Result};
use crate::token::{Token, TokenType};

use log::{debug, info};

const MAX_ARITY: usize = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionKind {
    Function,
    Method,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKind::Function => write!(f, "function"),
            FunctionKind::Method => write!(f, "method"),
        }
    }
}

/// Top‑level parser over a scanned token vector.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    ids: NodeIds,
    errors: Vec<LoxError>,
}

impl Parser {
    /// Construct a new parser with a fresh id allocator.
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::with_ids(tokens, NodeIds::new())
    }

    /// Construct a parser that continues numbering from `ids`.
    pub fn with_ids(mut tokens: Vec<Token>, ids: NodeIds) -> Self {
        info!("Parser created with {} tokens", tokens.len());

        if tokens.last().map(|t| t.token_type != TokenType::EOF).unwrap_or(true) {
            let line: usize = tokens.last().map(|t| t.line).unwrap_or(1);
            tokens.push(Token::new(TokenType::EOF, "", line));
        }

        Self {
            tokens,
            current: 0,
            ids,
            errors: Vec::new(),
        }
    }

    /// Hand the id allocator back so the next run can continue from it.
    pub fn into_ids(self) -> NodeIds {
        self.ids
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse an entire program. Every syntax error is pushed to `sink`; the
    /// statements that did parse are returned regardless.
    pub fn parse(&mut self, sink: &mut dyn ErrorSink) -> Vec<Stmt> {
        info!("Beginning parse phase");

        let mut statements: Vec<Stmt> = Vec::new();

        while !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        self.flush(sink);

        statements
    }

    /// Parse a single expression followed by EOF (used by `rox parse`).
    pub fn parse_expression(&mut self, sink: &mut dyn ErrorSink) -> Option<Expr> {
        let result = self.expression().and_then(|expr| {
            if self.is_at_end() {
                Ok(expr)
            } else {
                Err(LoxError::parse(self.peek(), "Expect end of expression."))
            }
        });

        let expr = match result {
            Ok(expr) => Some(expr),
            Err(e) => {
                self.errors.push(e);
                None
            }
        };

        self.flush(sink);

        expr
    }

    fn flush(&mut self, sink: &mut dyn ErrorSink) {
        info!("Parse finished with {} error(s)", self.errors.len());

        for e in self.errors.drain(..) {
            sink.error(e);
        }
    }

    // ──────────────────────── declaration rules ───────────────────

    fn declaration(&mut self) -> Option<Stmt> {
        debug!("Entering declaration at line {}", self.peek().line);

        let result = if self.matches(TokenType::CLASS) {
            self.class_declaration()
        } else if self.check(TokenType::FUN) && self.check_next(TokenType::IDENTIFIER) {
            self.advance();
            self.function(FunctionKind::Function).map(Stmt::Function)
        } else if self.matches(TokenType::VAR) {
            self.var_declaration()
        } else {
            self.statement()
        };

        match result {
            Ok(stmt) => Some(stmt),
            Err(e) => {
                debug!("Parse error, synchronizing: {}", e);
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }

    fn class_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect class name.")?.clone();

        let superclass: Option<Expr> = if self.matches(TokenType::COLON) {
            let super_name: Token = self
                .consume(TokenType::IDENTIFIER, "Expect superclass name.")?
                .clone();

            Some(Expr::Variable {
                id: self.next_id(),
                name: super_name,
            })
        } else {
            None
        };

        self.consume(TokenType::LEFT_BRACE, "Expect '{' before class body.")?;

        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();
        let mut class_methods: Vec<Rc<FunctionDecl>> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            if self.matches(TokenType::CLASS) {
                class_methods.push(self.function(FunctionKind::Method)?);
            } else {
                methods.push(self.function(FunctionKind::Method)?);
            }
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after class body.")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
            class_methods,
        })
    }

    /// Named function or method. A method whose name is not followed by `(`
    /// is a getter.
    fn function(&mut self, kind: FunctionKind) -> Result<Rc<FunctionDecl>> {
        let name: Token = self
            .consume(TokenType::IDENTIFIER, &format!("Expect {} name.", kind))?
            .clone();

        let is_getter: bool = kind == FunctionKind::Method && !self.check(TokenType::LEFT_PAREN);

        let params: Vec<Token> = if is_getter {
            Vec::new()
        } else {
            self.consume(
                TokenType::LEFT_PAREN,
                &format!("Expect '(' after {} name.", kind),
            )?;
            self.parameters()?
        };

        let body: Vec<Stmt> = self.function_body(true)?;

        debug!(
            "Parsed {} '{}' with {} parameter(s)",
            kind,
            name.lexeme,
            params.len()
        );

        Ok(Rc::new(FunctionDecl {
            name: Some(name.clone()),
            keyword: name,
            params,
            body,
            is_getter,
        }))
    }

    /// Parameter list after the opening `(`, consuming the closing `)`.
    fn parameters(&mut self) -> Result<Vec<Token>> {
        let mut params: Vec<Token> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= MAX_ARITY {
                    let e = LoxError::parse(self.peek(), "Can't have more than 255 parameters.");
                    self.errors.push(e);
                }

                params.push(
                    self.consume(TokenType::IDENTIFIER, "Expect parameter name.")?
                        .clone(),
                );

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after parameters.")?;

        Ok(params)
    }

    /// `{ ... }` or `: expression`. Named functions terminate the expression
    /// form with `;`; lambdas do not, so they can sit inside larger
    /// expressions.
    fn function_body(&mut self, terminated: bool) -> Result<Vec<Stmt>> {
        if self.matches(TokenType::LEFT_BRACE) {
            return self.block();
        }

        if self.matches(TokenType::COLON) {
            let keyword: Token = self.previous().clone();
            let value: Expr = self.expression()?;

            if terminated {
                self.consume(TokenType::SEMICOLON, "Expect ';' after expression body.")?;
            }

            return Ok(vec![Stmt::Return {
                keyword,
                value: Some(value),
            }]);
        }

        Err(LoxError::parse(
            self.peek(),
            "Expect '{' or ':' before function body.",
        ))
    }

    fn var_declaration(&mut self) -> Result<Stmt> {
        let name: Token = self.consume(TokenType::IDENTIFIER, "Expect variable name.")?.clone();

        let initializer: Option<Expr> = if self.matches(TokenType::EQUAL) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::SEMICOLON,
            "Expect ';' after variable declaration.",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // ───────────────────────── statement rules ────────────────────

    fn statement(&mut self) -> Result<Stmt> {
        debug!("Entering statement at line {}", self.peek().line);

        if self.matches(TokenType::FOR) {
            self.for_statement()
        } else if self.matches(TokenType::IF) {
            self.if_statement()
        } else if self.matches(TokenType::WHILE) {
            self.while_statement()
        } else if self.matches(TokenType::RETURN) {
            self.return_statement()
        } else if self.matches(TokenType::BREAK) {
            self.break_statement()
        } else if self.matches(TokenType::LEFT_BRACE) {
            Ok(Stmt::Block(self.block()?))
        } else if self.matches(TokenType::PRINT) {
            self.print_statement()
        } else {
            self.expression_statement()
        }
    }

    /// `for (init; cond; incr) body` becomes
    /// `{ init; while (cond) { body; incr; } }`.
    fn for_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'for'.")?;

        let initializer: Option<Stmt> = if self.matches(TokenType::SEMICOLON) {
            None
        } else if self.matches(TokenType::VAR) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition: Option<Expr> = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::SEMICOLON, "Expect ';' after loop condition.")?;

        let increment: Option<Expr> = if !self.check(TokenType::RIGHT_PAREN) {
            Some(self.expression()?)
        } else {
            None
        };
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after for clauses.")?;

        let mut body: Stmt = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        body = Stmt::While {
            condition: condition.unwrap_or(Expr::Literal(LiteralValue::True)),
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn print_statement(&mut self) -> Result<Stmt> {
        let value: Expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expect ';' after value.")?;

        Ok(Stmt::Print(value))
    }

    fn expression_statement(&mut self) -> Result<Stmt> {
        let expr: Expr = self.expression()?;
        self.consume(TokenType::SEMICOLON, "Expect ';' after expression.")?;
        Ok(Stmt::Expression(expr))
    }

    fn if_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'if'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after if condition.")?;

        let then_branch: Box<Stmt> = Box::new(self.statement()?);
        let else_branch: Option<Box<Stmt>> = if self.matches(TokenType::ELSE) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt> {
        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'while'.")?;
        let condition: Expr = self.expression()?;
        self.consume(TokenType::RIGHT_PAREN, "Expect ')' after condition.")?;
        let body: Box<Stmt> = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    fn return_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();
        let value: Option<Expr> = if !self.check(TokenType::SEMICOLON) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(TokenType::SEMICOLON, "Expect ';' after return value.")?;
        Ok(Stmt::Return { keyword, value })
    }

    fn break_statement(&mut self) -> Result<Stmt> {
        let keyword: Token = self.previous().clone();
        self.consume(TokenType::SEMICOLON, "Expect ';' after 'break'.")?;
        Ok(Stmt::Break { keyword })
    }

    /// Statements up to the closing `}`. Errors inside are recorded and
    /// recovered from per declaration.
    fn block(&mut self) -> Result<Vec<Stmt>> {
        let mut statements: Vec<Stmt> = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            if let Some(stmt) = self.declaration() {
                statements.push(stmt);
            }
        }

        self.consume(TokenType::RIGHT_BRACE, "Expect '}' after block.")?;
        Ok(statements)
    }

    // ─────────────────────── expression rules ─────────────────────
    fn expression(&mut self) -> Result<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr> {
        let expr: Expr = self.logical_or()?;

        if self.matches(TokenType::EQUAL) {
            let equals: Token = self.previous().clone();
            let value: Expr = self.assignment()?;

            return Ok(self.assign_to(expr, value, &equals, "Invalid assignment target."));
        }

        if self.match_any(&[
            TokenType::PLUS_EQUAL,
            TokenType::MINUS_EQUAL,
            TokenType::STAR_EQUAL,
            TokenType::SLASH_EQUAL,
            TokenType::PERCENT_EQUAL,
        ]) {
            let compound: Token = self.previous().clone();
            let operator: Token = compound_operator(&compound);
            let rhs: Expr = self.assignment()?;

            let current: Expr = self.reread(&expr);
            let value = Expr::Binary {
                left: Box::new(current),
                operator,
                right: Box::new(rhs),
            };

            return Ok(self.assign_to(expr, value, &compound, "Invalid assignment target."));
        }

        Ok(expr)
    }

    /// Turn `target` into an assignment of `value`. Anything other than a
    /// variable or property is reported and returned unchanged, without
    /// entering panic mode.
    fn assign_to(&mut self, target: Expr, value: Expr, token: &Token, message: &str) -> Expr {
        match target {
            Expr::Variable { name, .. } => Expr::Assign {
                id: self.next_id(),
                name,
                value: Box::new(value),
            },

            Expr::Get { object, name } => Expr::Set {
                object,
                name,
                value: Box::new(value),
            },

            other => {
                self.errors.push(LoxError::parse(token, message));
                other
            }
        }
    }

    /// A read of the same place an assignment will write, for desugaring
    /// `x += 1` into `x = x + 1`. The read is a copy of `target` with every
    /// bindable node renumbered, so the two sides never share an id.
    fn reread(&mut self, target: &Expr) -> Expr {
        self.renumber(target)
    }

    /// Deep copy of `expr` with fresh ids throughout, lambda bodies included.
    fn renumber(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Literal(literal) => Expr::Literal(literal.clone()),

            Expr::Unary { operator, right } => Expr::Unary {
                operator: operator.clone(),
                right: Box::new(self.renumber(right)),
            },

            Expr::Binary {
                left,
                operator,
                right,
            } => Expr::Binary {
                left: Box::new(self.renumber(left)),
                operator: operator.clone(),
                right: Box::new(self.renumber(right)),
            },

            Expr::Logical {
                left,
                operator,
                right,
            } => Expr::Logical {
                left: Box::new(self.renumber(left)),
                operator: operator.clone(),
                right: Box::new(self.renumber(right)),
            },

            Expr::Grouping(inner) => Expr::Grouping(Box::new(self.renumber(inner))),

            Expr::Variable { name, .. } => Expr::Variable {
                id: self.next_id(),
                name: name.clone(),
            },

            Expr::Assign { name, value, .. } => {
                let value: Expr = self.renumber(value);
                Expr::Assign {
                    id: self.next_id(),
                    name: name.clone(),
                    value: Box::new(value),
                }
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => Expr::Call {
                callee: Box::new(self.renumber(callee)),
                paren: paren.clone(),
                arguments: arguments.iter().map(|arg| self.renumber(arg)).collect(),
            },

            Expr::Lambda(decl) => Expr::Lambda(self.renumber_function(decl)),

            Expr::Get { object, name } => Expr::Get {
                object: Box::new(self.renumber(object)),
                name: name.clone(),
            },

            Expr::Set {
                object,
                name,
                value,
            } => Expr::Set {
                object: Box::new(self.renumber(object)),
                name: name.clone(),
                value: Box::new(self.renumber(value)),
            },

            Expr::This { keyword, .. } => Expr::This {
                id: self.next_id(),
                keyword: keyword.clone(),
            },

            Expr::Super {
                keyword, method, ..
            } => Expr::Super {
                id: self.next_id(),
                keyword: keyword.clone(),
                method: method.clone(),
            },
        }
    }

    fn renumber_function(&mut self, decl: &FunctionDecl) -> Rc<FunctionDecl> {
        Rc::new(FunctionDecl {
            name: decl.name.clone(),
            keyword: decl.keyword.clone(),
            params: decl.params.clone(),
            body: decl.body.iter().map(|stmt| self.renumber_stmt(stmt)).collect(),
            is_getter: decl.is_getter,
        })
    }

    fn renumber_stmt(&mut self, stmt: &Stmt) -> Stmt {
        match stmt {
            Stmt::Expression(expr) => Stmt::Expression(self.renumber(expr)),

            Stmt::Print(expr) => Stmt::Print(self.renumber(expr)),

            Stmt::Var { name, initializer } => Stmt::Var {
                name: name.clone(),
                initializer: initializer.as_ref().map(|expr| self.renumber(expr)),
            },

            Stmt::Block(statements) => {
                Stmt::Block(statements.iter().map(|s| self.renumber_stmt(s)).collect())
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => Stmt::If {
                condition: self.renumber(condition),
                then_branch: Box::new(self.renumber_stmt(then_branch)),
                else_branch: else_branch
                    .as_ref()
                    .map(|branch| Box::new(self.renumber_stmt(branch))),
            },

            Stmt::While { condition, body } => Stmt::While {
                condition: self.renumber(condition),
                body: Box::new(self.renumber_stmt(body)),
            },

            Stmt::Function(decl) => Stmt::Function(self.renumber_function(decl)),

            Stmt::Return { keyword, value } => Stmt::Return {
                keyword: keyword.clone(),
                value: value.as_ref().map(|expr| self.renumber(expr)),
            },

            Stmt::Break { keyword } => Stmt::Break {
                keyword: keyword.clone(),
            },

            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
            } => Stmt::Class {
                name: name.clone(),
                superclass: superclass.as_ref().map(|expr| self.renumber(expr)),
                methods: methods.iter().map(|m| self.renumber_function(m)).collect(),
                class_methods: class_methods
                    .iter()
                    .map(|m| self.renumber_function(m))
                    .collect(),
            },
        }
    }

    fn logical_or(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.logical_and()?;

        while self.matches(TokenType::OR) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.logical_and()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logical_and(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.equality()?;

        while self.matches(TokenType::AND) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.equality()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    /// Shared loop for the left‑associative binary levels.
    fn binary_level(
        &mut self,
        operators: &[TokenType],
        operand: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut expr: Expr = operand(self)?;

        while self.match_any(operators) {
            let operator: Token = self.previous().clone();
            let right: Expr = operand(self)?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_level(
            &[TokenType::BANG_EQUAL, TokenType::EQUAL_EQUAL],
            Self::comparison,
        )
    }

    fn comparison(&mut self) -> Result<Expr> {
        self.binary_level(
            &[
                TokenType::GREATER,
                TokenType::GREATER_EQUAL,
                TokenType::LESS,
                TokenType::LESS_EQUAL,
            ],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_level(&[TokenType::MINUS, TokenType::PLUS], Self::factor)
    }

    fn factor(&mut self) -> Result<Expr> {
        self.binary_level(
            &[TokenType::STAR, TokenType::SLASH, TokenType::PERCENT],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.match_any(&[TokenType::BANG, TokenType::MINUS]) {
            let operator: Token = self.previous().clone();
            let right: Expr = self.unary()?;
            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        if self.match_any(&[TokenType::PLUS_PLUS, TokenType::MINUS_MINUS]) {
            let step: Token = self.previous().clone();
            let target: Expr = self.unary()?;

            let operator: Token = compound_operator(&step);
            let current: Expr = self.reread(&target);
            let value = Expr::Binary {
                left: Box::new(current),
                operator,
                right: Box::new(Expr::Literal(LiteralValue::Number(1.0))),
            };

            return Ok(self.assign_to(target, value, &step, "Invalid increment target."));
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr> {
        let mut expr: Expr = self.primary()?;

        loop {
            if self.matches(TokenType::LEFT_PAREN) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::DOT) {
                let name: Token = self
                    .consume(TokenType::IDENTIFIER, "Expect property name after '.'.")?
                    .clone();

                expr = Expr::Get {
                    object: Box::new(expr),
                    name,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr> {
        let mut arguments: Vec<Expr> = Vec::new();
        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    let e = LoxError::parse(self.peek(), "Can't have more than 255 arguments.");
                    self.errors.push(e);
                }

                arguments.push(self.expression()?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren: Token = self
            .consume(TokenType::RIGHT_PAREN, "Expect ')' after arguments.")?
            .clone();

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr> {
        if self.matches(TokenType::FALSE) {
            return Ok(Expr::Literal(LiteralValue::False));
        }
        if self.matches(TokenType::TRUE) {
            return Ok(Expr::Literal(LiteralValue::True));
        }
        if self.matches(TokenType::NIL) {
            return Ok(Expr::Literal(LiteralValue::Nil));
        }

        if let TokenType::NUMBER(n) = self.peek().token_type {
            self.advance();
            return Ok(Expr::Literal(LiteralValue::Number(n)));
        }

        if let TokenType::STRING(ref s) = self.peek().token_type {
            let s: String = s.clone();
            self.advance();
            return Ok(Expr::Literal(LiteralValue::Str(s)));
        }

        if self.matches(TokenType::THIS) {
            let keyword: Token = self.previous().clone();
            return Ok(Expr::This {
                id: self.next_id(),
                keyword,
            });
        }

        if self.matches(TokenType::SUPER) {
            let keyword: Token = self.previous().clone();
            self.consume(TokenType::DOT, "Expect '.' after 'super'.")?;
            let method: Token = self
                .consume(TokenType::IDENTIFIER, "Expect superclass method name.")?
                .clone();

            return Ok(Expr::Super {
                id: self.next_id(),
                keyword,
                method,
            });
        }

        if self.matches(TokenType::IDENTIFIER) {
            let name: Token = self.previous().clone();
            return Ok(Expr::Variable {
                id: self.next_id(),
                name,
            });
        }

        if self.matches(TokenType::LEFT_PAREN) {
            let expr: Expr = self.expression()?;

            self.consume(TokenType::RIGHT_PAREN, "Expect ')' after expression.")?;

            return Ok(Expr::Grouping(Box::new(expr)));
        }

        if self.matches(TokenType::FUN) {
            return self.lambda();
        }

        Err(LoxError::parse(self.peek(), "Expect expression."))
    }

    fn lambda(&mut self) -> Result<Expr> {
        let keyword: Token = self.previous().clone();

        self.consume(TokenType::LEFT_PAREN, "Expect '(' after 'fun'.")?;
        let params: Vec<Token> = self.parameters()?;
        let body: Vec<Stmt> = self.function_body(false)?;

        Ok(Expr::Lambda(Rc::new(FunctionDecl {
            name: None,
            keyword,
            params,
            body,
            is_getter: false,
        })))
    }

    // ────────────────────── utility helpers ───────────────────────

    #[inline(always)]
    fn next_id(&mut self) -> ExprId {
        self.ids.next_id()
    }

    #[inline(always)]
    fn matches(&mut self, ttype: TokenType) -> bool {
        if self.check(ttype) {
            self.advance();

            return true;
        }

        false
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        types.iter().cloned().any(|ttype| self.matches(ttype))
    }

    #[inline(always)]
    fn consume(&mut self, ttype: TokenType, message: &str) -> Result<&Token> {
        if self.check(ttype) {
            return Ok(self.advance());
        }

        Err(LoxError::parse(self.peek(), message))
    }

    #[inline(always)]
    fn check(&self, ttype: TokenType) -> bool {
        if self.is_at_end() {
            return false;
        }

        self.peek().token_type == ttype
    }

    fn check_next(&self, ttype: TokenType) -> bool {
        match self.tokens.get(self.current + 1) {
            Some(token) => token.token_type == ttype,
            None => false,
        }
    }

    #[inline(always)]
    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }

        self.previous()
    }

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        matches!(self.peek().token_type, TokenType::EOF)
    }

    #[inline(always)]
    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    #[inline(always)]
    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    /// Discards tokens until it thinks it is at a statement boundary.
    fn synchronize(&mut self) {
        self.advance(); // skip the token that caused the error

        while !self.is_at_end() {
            if matches!(self.previous().token_type, TokenType::SEMICOLON) {
                return;
            }

            match self.peek().token_type {
                TokenType::CLASS
                | TokenType::FUN
                | TokenType::VAR
                | TokenType::FOR
                | TokenType::IF
                | TokenType::WHILE
                | TokenType::PRINT
                | TokenType::RETURN => return,
                _ => {}
            }

            self.advance();
        }
    }
}

/// Binary operator token implied by `+=`, `++`, etc., positioned on the same
/// line as the compound token.
fn compound_operator(compound: &Token) -> Token {
    let (ttype, lexeme) = match compound.token_type {
        TokenType::PLUS_EQUAL | TokenType::PLUS_PLUS => (TokenType::PLUS, "+"),
        TokenType::MINUS_EQUAL | TokenType::MINUS_MINUS => (TokenType::MINUS, "-"),
        TokenType::STAR_EQUAL => (TokenType::STAR, "*"),
        TokenType::SLASH_EQUAL => (TokenType::SLASH, "/"),
        _ => (TokenType::PERCENT, "%"),
    };

    Token::new(ttype, lexeme, compound.line)
}
