//! Static resolver pass for the **Rox** interpreter.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of maps tracking declared/defined/accessed).
//! 2. Report static errors (redeclaration, forward‑read in initializer,
//!    misplaced `return`/`break`/`this`/`super`, self‑inheritance) and
//!    unused‑local warnings.
//! 3. Tell the interpreter, for *each* variable occurrence, whether it is a
//!    local (and at what depth) or a global, through the [`BindingTable`].
//!
//! The pass never stops early: every problem goes to the [`ErrorSink`] and the
//! walk continues, so one run surfaces all of them.

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::{ErrorSink, LoxError, Warning};
use crate::token::Token;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Side table produced by the resolver: bindable expression → number of
/// environment links to climb. Absent entries are globals.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BindingTable {
    locals: HashMap<ExprId, usize>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ExprId, depth: usize) {
        self.locals.insert(id, depth);
    }

    pub fn get(&self, id: ExprId) -> Option<usize> {
        self.locals.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Fold another run's table into this one.
    pub fn merge(&mut self, other: BindingTable) {
        self.locals.extend(other.locals);
    }
}

/// Kind of function body being resolved; drives `return` validation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LoopType {
    None,
    Loop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum BindingState {
    Declared,
    Defined,
}

#[derive(Debug, Clone)]
struct Binding {
    state: BindingState,
    accessed: bool,
    line: usize,
}

impl Binding {
    /// `this` / `super`: always defined and never reported as unused.
    fn implicit() -> Self {
        Self {
            state: BindingState::Defined,
            accessed: true,
            line: 0,
        }
    }
}

/// Resolver: tracks scopes, enforces static rules, and records binding
/// distances.
pub struct Resolver<'s> {
    sink: &'s mut dyn ErrorSink,
    scopes: Vec<HashMap<String, Binding>>,
    bindings: BindingTable,
    current_function: FunctionType,
    current_class: ClassType,
    current_loop: LoopType,
    in_static_method: bool,
    /// Rendered diagnostics already sent. `a.f += 1` reads its target through
    /// a renumbered copy, so the same finding can come up twice.
    reported: HashSet<String>,
}

impl<'s> Resolver<'s> {
    pub fn new(sink: &'s mut dyn ErrorSink) -> Self {
        info!("Resolver instantiated");
        Resolver {
            sink,
            scopes: Vec::new(),
            bindings: BindingTable::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
            current_loop: LoopType::None,
            in_static_method: false,
            reported: HashSet::new(),
        }
    }

    /// Walk all top‑level statements and hand back the binding table.
    pub fn resolve(mut self, statements: &[Stmt]) -> BindingTable {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        self.resolve_stmts(statements);

        info!("Resolved {} local binding(s)", self.bindings.len());

        self.bindings
    }

    fn resolve_stmts(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            self.resolve_stmt(stmt);
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        let error: LoxError = LoxError::resolve(token, message);
        if self.reported.insert(error.to_string()) {
            self.sink.error(error);
        }
    }

    fn warning(&mut self, warning: Warning) {
        if self.reported.insert(warning.to_string()) {
            self.sink.warning(warning);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();
                self.resolve_stmts(statements);
                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define
                self.declare(name);
                if let Some(expr) = initializer {
                    self.resolve_expr(expr);
                }
                self.define(name);
            }

            Stmt::Function(decl) => {
                // The name is visible inside its own body (recursion).
                if let Some(name) = &decl.name {
                    self.declare(name);
                    self.define(name);
                }
                self.resolve_function(decl, FunctionType::Function);
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(eb) = else_branch.as_deref() {
                    self.resolve_stmt(eb);
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition);

                let enclosing = self.current_loop;
                self.current_loop = LoopType::Loop;
                self.resolve_stmt(body);
                self.current_loop = enclosing;
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(expr);
                }
            }

            Stmt::Break { keyword } => {
                if self.current_loop == LoopType::None {
                    self.error(keyword, "Can't use 'break' outside of a loop.");
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
            } => self.resolve_class(name, superclass.as_ref(), methods, class_methods),
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) {
        let enclosing_class = self.current_class;
        let enclosing_static = self.in_static_method;
        self.current_class = ClassType::Class;
        self.in_static_method = false;

        self.declare(name);
        self.define(name);

        if let Some(superclass) = superclass {
            if let Expr::Variable { name: super_name, .. } = superclass {
                if super_name.lexeme == name.lexeme {
                    self.error(super_name, "A class can't inherit from itself.");
                }
            }

            self.current_class = ClassType::Subclass;
            self.resolve_expr(superclass);

            self.begin_scope();
            self.define_implicit("super");
        }

        // Static methods share the `super` scope (so binding distances line up
        // with the runtime closure) but never see `this`.
        self.in_static_method = true;
        for method in class_methods {
            self.resolve_function(method, FunctionType::Method);
        }
        self.in_static_method = false;

        self.begin_scope();
        self.define_implicit("this");

        for method in methods {
            let kind = if method.display_name() == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, kind);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
        self.in_static_method = enclosing_static;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => self.resolve_expr(inner),

            Expr::Unary { right, .. } => self.resolve_expr(right),

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }

            Expr::Variable { id, name } => {
                let in_own_initializer = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(&name.lexeme))
                    .map(|binding| binding.state == BindingState::Declared)
                    .unwrap_or(false);

                if in_own_initializer {
                    self.error(name, "Can't read local variable in its own initializer.");
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { id, name, value } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for arg in arguments {
                    self.resolve_expr(arg);
                }
            }

            Expr::Lambda(decl) => self.resolve_function(decl, FunctionType::Function),

            Expr::Get { object, .. } => self.resolve_expr(object),

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(value);
            }

            Expr::This { id, keyword } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                } else if self.in_static_method {
                    self.error(keyword, "Can't use 'this' in a static method.");
                } else {
                    self.resolve_local(*id, keyword);
                }
            }

            Expr::Super { id, keyword, .. } => match self.current_class {
                ClassType::None => {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                }
                ClassType::Class => {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                ClassType::Subclass if self.in_static_method => {
                    self.error(keyword, "Can't use 'super' in a static method.");
                }
                ClassType::Subclass => self.resolve_local(*id, keyword),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Enter a fresh scope for a function's parameters + body. Loops do not
    /// extend into nested functions.
    fn resolve_function(&mut self, decl: &FunctionDecl, kind: FunctionType) {
        let enclosing_function = self.current_function;
        let enclosing_loop = self.current_loop;
        self.current_function = kind;
        self.current_loop = LoopType::None;

        self.begin_scope();
        for param in &decl.params {
            self.declare(param);
            self.define(param);
        }
        self.resolve_stmts(&decl.body);
        self.end_scope();

        self.current_function = enclosing_function;
        self.current_loop = enclosing_loop;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope, warning about locals nobody read or wrote.
    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };

        let mut unused: Vec<(usize, String)> = scope
            .into_iter()
            .filter(|(_, binding)| !binding.accessed)
            .map(|(name, binding)| (binding.line, name))
            .collect();
        unused.sort();

        for (line, name) in unused {
            debug!("Unused local '{}' declared on line {}", name, line);
            self.warning(Warning::new(
                line,
                format!("Local variable '{}' is never used.", name),
            ));
        }
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        let duplicate = scope.contains_key(&name.lexeme);

        scope.insert(
            name.lexeme.clone(),
            Binding {
                state: BindingState::Declared,
                accessed: duplicate,
                line: name.line,
            },
        );

        if duplicate {
            self.error(name, "Already a variable with this name in this scope.");
        }
    }

    fn define(&mut self, name: &Token) {
        if let Some(binding) = self
            .scopes
            .last_mut()
            .and_then(|scope| scope.get_mut(&name.lexeme))
        {
            binding.state = BindingState::Defined;
        }
    }

    fn define_implicit(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding::implicit());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────────

    /// Record this occurrence as a local at depth `d`, or leave it unbound
    /// (global) if no scope declares the name.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (depth, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(binding) = scope.get_mut(&name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);
                binding.accessed = true;
                self.bindings.insert(id, depth);
                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}

/// Run the resolver over `statements`, reporting into `sink`.
pub fn resolve(statements: &[Stmt], sink: &mut dyn ErrorSink) -> BindingTable {
    Resolver::new(sink).resolve(statements)
}
