//! Tree-walking evaluator.
//!
//! The interpreter owns the global environment, a pointer to the environment
//! currently in scope, and the binding table accumulated from every resolver
//! pass it has been handed. Resolved names are read at an exact distance from
//! the current environment; unresolved names fall back to the globals.
//!
//! Non-local exits (`return`, `break`) are not errors. Every statement
//! executor returns a [`Flow`] and the enclosing block, loop or call decides
//! what to do with it. Runtime errors travel as `Err(LoxError::Runtime)` and
//! abort the current [`Interpreter::interpret`] call only.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::rc::Rc;

use log::{debug, info};

use crate::ast::ExprId;
use crate::environment::{self, EnvRef, Environment};
use crate::error::{LoxError, Result};
use crate::expr::{Expr, LiteralValue};
use crate::resolver::BindingTable;
use crate::stmt::{FunctionDecl, Stmt};
use crate::token::{Token, TokenType};
use crate::value::{
    BoundMethod, Callable, Instance, LoxClass, LoxFunction, NativeFn, NativeFunction, Value,
};

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Completed,
    Returned(Value),
    Broke,
}

pub struct Interpreter {
    globals: EnvRef,
    environment: EnvRef,
    locals: BindingTable,
    output: Box<dyn Write>,
    input: Box<dyn BufRead>,
    /// Lox calls currently on the stack.
    depth: usize,
}

/// Deepest chain of nested Lox calls before `Stack overflow.` is raised.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Grow the native stack when less than this remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each additional stack segment.
const STACK_GROWTH: usize = 2 * 1024 * 1024;

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter wired to the process's stdout and stdin.
    pub fn new() -> Self {
        Self::with_io(
            Box::new(io::stdout()),
            Box::new(BufReader::new(io::stdin())),
        )
    }

    /// Interpreter printing to `output` and reading `read()` lines from
    /// `input`.
    pub fn with_io(output: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Rc::new(RefCell::new(Environment::new()));

        {
            let mut env = globals.borrow_mut();
            for (name, arity, func) in NATIVES {
                debug!("Defining native function '{}'", name);
                env.insert(
                    name,
                    Value::Callable(Callable::Native(Rc::new(NativeFunction {
                        name: *name,
                        arity: *arity,
                        func: *func,
                    }))),
                );
            }
        }

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: BindingTable::new(),
            output,
            input,
            depth: 0,
        }
    }

    /// Run one program (or REPL line). `bindings` is the resolver output for
    /// exactly these statements; it is kept so closures created here can be
    /// called from later runs.
    pub fn interpret(&mut self, statements: &[Stmt], bindings: BindingTable) -> Result<()> {
        info!(
            "Interpreting {} statement(s) with {} new binding(s)",
            statements.len(),
            bindings.len()
        );

        self.locals.merge(bindings);

        for stmt in statements {
            if let Err(error) = self.execute(stmt) {
                info!("Run aborted: {}", error);
                self.output.flush()?;
                return Err(error);
            }
        }

        self.output.flush()?;

        info!("Interpretation completed successfully");
        Ok(())
    }

    /// Value bound to a global name, including built-ins the grammar cannot
    /// name directly (`print`).
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
                Ok(Flow::Completed)
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                writeln!(self.output, "{}", value)?;
                debug!("Printed value: {}", value);
                Ok(Flow::Completed)
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                self.define(name, value)?;
                Ok(Flow::Completed)
            }

            Stmt::Block(statements) => {
                let env: EnvRef = Environment::child_of(&self.environment);
                self.execute_block(statements, env)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Completed)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    match self.execute(body)? {
                        Flow::Completed => {}
                        Flow::Broke => break,
                        returned @ Flow::Returned(_) => return Ok(returned),
                    }
                }
                Ok(Flow::Completed)
            }

            Stmt::Function(decl) => {
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                let name: &Token = decl.name.as_ref().unwrap_or(&decl.keyword);
                debug!("Defining function '{}'", function.name());
                self.define(name, Value::Callable(Callable::Function(Rc::new(function))))?;
                Ok(Flow::Completed)
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };
                Ok(Flow::Returned(value))
            }

            Stmt::Break { .. } => Ok(Flow::Broke),

            Stmt::Class {
                name,
                superclass,
                methods,
                class_methods,
            } => self.execute_class(name, superclass.as_ref(), methods, class_methods),
        }
    }

    /// Run `statements` with `env` as the current environment, restoring the
    /// previous one afterwards whatever the outcome.
    pub fn execute_block(&mut self, statements: &[Stmt], env: EnvRef) -> Result<Flow> {
        let previous: EnvRef = std::mem::replace(&mut self.environment, env);

        let mut result: Result<Flow> = Ok(Flow::Completed);
        for stmt in statements {
            match self.execute(stmt) {
                Ok(Flow::Completed) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        class_methods: &[Rc<FunctionDecl>],
    ) -> Result<Flow> {
        let superclass: Option<Rc<LoxClass>> = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Callable(Callable::Class(class)) => Some(class),
                _ => return Err(LoxError::runtime(expr.line(), "Superclass must be a class.")),
            },
            None => None,
        };

        self.define(name, Value::Nil)?;

        // Methods close over an extra scope holding `super` when there is one.
        let class_env: EnvRef = match &superclass {
            Some(parent) => {
                let env = Environment::child_of(&self.environment);
                env.borrow_mut()
                    .insert("super", Value::Callable(Callable::Class(Rc::clone(parent))));
                env
            }
            None => Rc::clone(&self.environment),
        };

        let table = |decls: &[Rc<FunctionDecl>], allow_init: bool| -> HashMap<String, Rc<LoxFunction>> {
            decls
                .iter()
                .map(|decl| {
                    let method_name: String = decl.display_name().to_string();
                    let is_initializer: bool = allow_init && method_name == "init";
                    let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&class_env), is_initializer);
                    (method_name, Rc::new(function))
                })
                .collect()
        };

        let class = LoxClass {
            name: name.lexeme.clone(),
            superclass,
            methods: table(methods, true),
            statics: table(class_methods, false),
        };

        info!(
            "Class '{}' defined with {} method(s), {} static",
            class.name,
            class.methods.len(),
            class.statics.len()
        );

        self.environment
            .borrow_mut()
            .assign(&name.lexeme, Value::Callable(Callable::Class(Rc::new(class))))
            .map_err(|message| LoxError::runtime(name.line, message))?;

        Ok(Flow::Completed)
    }

    fn define(&mut self, name: &Token, value: Value) -> Result<()> {
        self.environment
            .borrow_mut()
            .define(&name.lexeme, value)
            .map_err(|message| LoxError::runtime(name.line, message))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(match literal {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::string(s),
                LiteralValue::True => Value::Bool(true),
                LiteralValue::False => Value::Bool(false),
                LiteralValue::Nil => Value::Nil,
            }),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => {
                let right: Value = self.evaluate(right)?;
                match operator.token_type {
                    TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),
                    TokenType::MINUS => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        _ => Err(LoxError::runtime(operator.line, "Operand must be a number.")),
                    },
                    _ => Err(LoxError::runtime(operator.line, "Invalid unary operator.")),
                }
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;
                let right: Value = self.evaluate(right)?;
                binary(operator, left, right)
            }

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left: Value = self.evaluate(left)?;
                let short_circuit: bool = if operator.token_type == TokenType::OR {
                    left.is_truthy()
                } else {
                    !left.is_truthy()
                };

                if short_circuit {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Variable { id, name } => self.look_up(*id, name),

            Expr::This { id, keyword } => self.look_up(*id, keyword),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;

                match self.locals.get(*id) {
                    Some(distance) => {
                        if !environment::assign_at(&self.environment, distance, &name.lexeme, value.clone()) {
                            return Err(undefined_variable(name));
                        }
                    }
                    None => self
                        .globals
                        .borrow_mut()
                        .assign(&name.lexeme, value.clone())
                        .map_err(|message| LoxError::runtime(name.line, message))?,
                }

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee: Value = self.evaluate(callee)?;

                let mut values: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument)?);
                }

                self.call(&callee, values, paren.line)
            }

            Expr::Lambda(decl) => {
                let function = LoxFunction::new(Rc::clone(decl), Rc::clone(&self.environment), false);
                Ok(Value::Callable(Callable::Function(Rc::new(function))))
            }

            Expr::Get { object, name } => {
                let object: Value = self.evaluate(object)?;
                self.get_property(&object, name)
            }

            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object)? else {
                    return Err(LoxError::runtime(name.line, "Only instances have fields."));
                };

                let value: Value = self.evaluate(value)?;
                instance.borrow_mut().set(&name.lexeme, value.clone());
                Ok(value)
            }

            Expr::Super {
                id,
                keyword,
                method,
            } => self.super_method(*id, keyword, method),
        }
    }

    fn look_up(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.locals.get(id) {
            Some(distance) => environment::get_at(&self.environment, distance, &name.lexeme)
                .ok_or_else(|| undefined_variable(name)),
            None => self
                .globals
                .borrow()
                .get(&name.lexeme)
                .map_err(|message| LoxError::runtime(name.line, message)),
        }
    }

    fn get_property(&mut self, object: &Value, name: &Token) -> Result<Value> {
        match object {
            Value::Instance(instance) => {
                let field: Option<Value> = instance.borrow().field(&name.lexeme);
                if let Some(value) = field {
                    return Ok(value);
                }

                let class: Rc<LoxClass> = Rc::clone(&instance.borrow().class);
                let method: Rc<LoxFunction> = class
                    .find_method(&name.lexeme)
                    .ok_or_else(|| undefined_property(name))?;

                self.bind_method(&method, instance, name.line)
            }

            Value::Callable(Callable::Class(class)) => {
                let method: Rc<LoxFunction> = class
                    .find_static(&name.lexeme)
                    .ok_or_else(|| undefined_property(name))?;

                if method.is_getter() {
                    self.call_function(&method, Vec::new(), name.line)
                } else {
                    Ok(Value::Callable(Callable::Function(method)))
                }
            }

            _ => Err(LoxError::runtime(name.line, "Only instances have properties.")),
        }
    }

    /// Bind `method` to `instance`; getters run straight away.
    fn bind_method(
        &mut self,
        method: &LoxFunction,
        instance: &Rc<RefCell<Instance>>,
        line: usize,
    ) -> Result<Value> {
        let bound: LoxFunction = method.bind(instance);

        if bound.is_getter() {
            debug!("Invoking getter '{}'", bound.name());
            return self.call_function(&bound, Vec::new(), line);
        }

        Ok(Value::Callable(Callable::BoundMethod(Rc::new(BoundMethod {
            receiver: Rc::clone(instance),
            method: bound,
        }))))
    }

    fn super_method(&mut self, id: ExprId, keyword: &Token, method: &Token) -> Result<Value> {
        let distance: usize = self
            .locals
            .get(id)
            .ok_or_else(|| LoxError::runtime(keyword.line, "Unresolved 'super'."))?;

        let superclass: Rc<LoxClass> = match environment::get_at(&self.environment, distance, "super") {
            Some(Value::Callable(Callable::Class(class))) => class,
            _ => return Err(LoxError::runtime(keyword.line, "Unresolved 'super'.")),
        };

        // `this` always lives one scope inside `super`.
        let instance: Rc<RefCell<Instance>> =
            match distance
                .checked_sub(1)
                .and_then(|d| environment::get_at(&self.environment, d, "this"))
            {
                Some(Value::Instance(instance)) => instance,
                _ => return Err(LoxError::runtime(keyword.line, "Unresolved 'this'.")),
            };

        let found: Rc<LoxFunction> = superclass
            .find_method(&method.lexeme)
            .ok_or_else(|| undefined_property(method))?;

        self.bind_method(&found, &instance, method.line)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Calls
    // ─────────────────────────────────────────────────────────────────────────

    /// Invoke any callable value. Arity is checked before anything runs.
    pub fn call(&mut self, callee: &Value, arguments: Vec<Value>, line: usize) -> Result<Value> {
        let Value::Callable(callable) = callee else {
            return Err(LoxError::runtime(line, "Can only call functions and classes."));
        };

        if arguments.len() != callable.arity() {
            return Err(LoxError::runtime(
                line,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    arguments.len()
                ),
            ));
        }

        match callable {
            Callable::Native(native) => {
                debug!("Calling native function '{}'", native.name);
                (native.func)(self, &arguments).map_err(|message| LoxError::runtime(line, message))
            }

            Callable::Function(function) => self.call_function(function, arguments, line),

            Callable::BoundMethod(bound) => self.call_function(&bound.method, arguments, line),

            Callable::Class(class) => {
                let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(class))));

                if let Some(init) = class.find_method("init") {
                    self.call_function(&init.bind(&instance), arguments, line)?;
                }

                Ok(Value::Instance(instance))
            }
        }
    }

    fn call_function(&mut self, function: &LoxFunction, arguments: Vec<Value>, line: usize) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            info!("Call depth limit reached in '{}'", function.name());
            return Err(LoxError::runtime(line, "Stack overflow."));
        }

        self.depth += 1;
        let result: Result<Value> =
            stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || self.invoke(function, arguments));
        self.depth -= 1;

        result
    }

    fn invoke(&mut self, function: &LoxFunction, arguments: Vec<Value>) -> Result<Value> {
        debug!("Calling function '{}'", function.name());

        let env: EnvRef = Environment::child_of(&function.closure);
        {
            let mut frame = env.borrow_mut();
            for (param, argument) in function.decl.params.iter().zip(arguments) {
                frame.insert(&param.lexeme, argument);
            }
        }

        let flow: Flow = self.execute_block(&function.decl.body, env)?;

        if function.is_initializer {
            return environment::get_at(&function.closure, 0, "this")
                .ok_or_else(|| LoxError::runtime(function.decl.keyword.line, "Unresolved 'this'."));
        }

        match flow {
            Flow::Returned(value) => Ok(value),
            Flow::Completed | Flow::Broke => Ok(Value::Nil),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operators
// ─────────────────────────────────────────────────────────────────────────────

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    let line: usize = operator.line;

    match operator.token_type {
        TokenType::EQUAL_EQUAL => return Ok(Value::Bool(left == right)),
        TokenType::BANG_EQUAL => return Ok(Value::Bool(left != right)),
        TokenType::PLUS => {
            return match (&left, &right) {
                (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                (Value::String(a), Value::String(b)) => {
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(a);
                    joined.push_str(b);
                    Ok(Value::string(joined))
                }
                _ => Err(LoxError::runtime(
                    line,
                    "Operands must be two numbers or two strings.",
                )),
            };
        }
        _ => {}
    }

    let (Value::Number(a), Value::Number(b)) = (left, right) else {
        return Err(LoxError::runtime(line, "Operands must be numbers."));
    };

    match operator.token_type {
        TokenType::MINUS => Ok(Value::Number(a - b)),
        TokenType::STAR => Ok(Value::Number(a * b)),
        TokenType::SLASH | TokenType::PERCENT if b == 0.0 => {
            Err(LoxError::runtime(line, "Division by zero."))
        }
        TokenType::SLASH => Ok(Value::Number(a / b)),
        TokenType::PERCENT => Ok(Value::Number(a % b)),
        TokenType::GREATER => Ok(Value::Bool(a > b)),
        TokenType::GREATER_EQUAL => Ok(Value::Bool(a >= b)),
        TokenType::LESS => Ok(Value::Bool(a < b)),
        TokenType::LESS_EQUAL => Ok(Value::Bool(a <= b)),
        _ => Err(LoxError::runtime(line, "Invalid binary operator.")),
    }
}

fn undefined_variable(name: &Token) -> LoxError {
    LoxError::runtime(name.line, format!("Undefined variable '{}'.", name.lexeme))
}

fn undefined_property(name: &Token) -> LoxError {
    LoxError::runtime(name.line, format!("Undefined property '{}'.", name.lexeme))
}

// ─────────────────────────────────────────────────────────────────────────────
// Built-ins
// ─────────────────────────────────────────────────────────────────────────────

const NATIVES: &[(&str, usize, NativeFn)] = &[
    ("clock", 0, native_clock),
    ("read", 0, native_read),
    ("print", 1, native_print),
    ("breakpoint", 0, native_breakpoint),
];

/// Seconds since the Unix epoch, with millisecond resolution.
fn native_clock(_: &mut Interpreter, _: &[Value]) -> std::result::Result<Value, String> {
    let millis: i64 = chrono::Utc::now().timestamp_millis();
    Ok(Value::Number(millis as f64 / 1000.0))
}

/// One line of input without its line terminator; `nil` at end of input.
fn native_read(interpreter: &mut Interpreter, _: &[Value]) -> std::result::Result<Value, String> {
    let mut line = String::new();
    let read: usize = interpreter
        .input
        .read_line(&mut line)
        .map_err(|e| format!("Could not read input: {}", e))?;

    if read == 0 {
        return Ok(Value::Nil);
    }

    let trimmed: &str = line.trim_end_matches(['\n', '\r']);
    Ok(Value::string(trimmed))
}

fn native_print(interpreter: &mut Interpreter, args: &[Value]) -> std::result::Result<Value, String> {
    if let Some(value) = args.first() {
        writeln!(interpreter.output, "{}", value).map_err(|e| format!("Could not write output: {}", e))?;
    }
    Ok(Value::Nil)
}

fn native_breakpoint(interpreter: &mut Interpreter, _: &[Value]) -> std::result::Result<Value, String> {
    if cfg!(debug_assertions) {
        let names: Vec<String> = interpreter.globals.borrow().names();
        debug!("breakpoint: globals = [{}]", names.join(", "));
    }
    Ok(Value::Nil)
}
