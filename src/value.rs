//! Runtime values.
//!
//! Scalars (`nil`, booleans, numbers, strings) are copied or cheaply
//! refcounted. Everything with identity (functions, classes, instances) sits
//! behind an `Rc`, and equality on those kinds is pointer identity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::environment::{EnvRef, Environment};
use crate::interpreter::Interpreter;
use crate::stmt::FunctionDecl;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Callable(Callable),
    Instance(Rc<RefCell<Instance>>),
}

impl Value {
    /// `nil` and `false` are falsey; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn string<S: AsRef<str>>(s: S) -> Self {
        Value::String(Rc::from(s.as_ref()))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => a == b,
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => {
                if n.fract() == 0.0 {
                    write!(f, "{:.0}", n)
                } else {
                    write!(f, "{}", n)
                }
            }

            Value::String(s) => write!(f, "{}", s),

            Value::Callable(callable) => write!(f, "{}", callable),

            Value::Instance(instance) => match instance.try_borrow() {
                Ok(instance) => write!(f, "<{} instance>", instance.class.name),
                Err(_) => write!(f, "<instance>"),
            },
        }
    }
}

/// Anything that can appear in callee position.
#[derive(Debug, Clone)]
pub enum Callable {
    Native(Rc<NativeFunction>),
    Function(Rc<LoxFunction>),
    Class(Rc<LoxClass>),
    BoundMethod(Rc<BoundMethod>),
}

impl Callable {
    pub fn arity(&self) -> usize {
        match self {
            Callable::Native(native) => native.arity,
            Callable::Function(function) => function.arity(),
            Callable::Class(class) => class.arity(),
            Callable::BoundMethod(bound) => bound.method.arity(),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Native(a), Callable::Native(b)) => Rc::ptr_eq(a, b),
            (Callable::Function(a), Callable::Function(b)) => Rc::ptr_eq(a, b),
            (Callable::Class(a), Callable::Class(b)) => Rc::ptr_eq(a, b),
            (Callable::BoundMethod(a), Callable::BoundMethod(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Native(native) => write!(f, "<native fn {}>", native.name),
            Callable::Function(function) => write!(f, "<fn {}>", function.name()),
            Callable::Class(class) => write!(f, "<class {}>", class.name),
            Callable::BoundMethod(bound) => write!(
                f,
                "<bound method {}.{}>",
                bound.class_name(),
                bound.method.name()
            ),
        }
    }
}

/// Host-provided function. Gets the interpreter so it can reach the I/O
/// streams and globals.
pub type NativeFn = fn(&mut Interpreter, &[Value]) -> Result<Value, String>;

pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// User function, method or lambda together with its defining environment.
pub struct LoxFunction {
    pub decl: Rc<FunctionDecl>,
    pub closure: EnvRef,
    /// `init` methods always yield `this`, even on a bare `return;`.
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(decl: Rc<FunctionDecl>, closure: EnvRef, is_initializer: bool) -> Self {
        Self {
            decl,
            closure,
            is_initializer,
        }
    }

    pub fn name(&self) -> &str {
        self.decl.display_name()
    }

    pub fn arity(&self) -> usize {
        self.decl.arity()
    }

    pub fn is_getter(&self) -> bool {
        self.decl.is_getter
    }

    /// Copy of this method whose closure is a fresh environment binding
    /// `this` to `instance`, enclosed by the original closure.
    pub fn bind(&self, instance: &Rc<RefCell<Instance>>) -> LoxFunction {
        let env: EnvRef = Environment::child_of(&self.closure);
        env.borrow_mut()
            .insert("this", Value::Instance(Rc::clone(instance)));

        LoxFunction {
            decl: Rc::clone(&self.decl),
            closure: env,
            is_initializer: self.is_initializer,
        }
    }
}

// The closure usually reaches back to an environment holding this very
// function, so it stays out of the debug output.
impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

/// A method looked up on an instance, already bound to it.
#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Rc<RefCell<Instance>>,
    pub method: LoxFunction,
}

impl BoundMethod {
    fn class_name(&self) -> String {
        match self.receiver.try_borrow() {
            Ok(instance) => instance.class.name.clone(),
            Err(_) => String::from("?"),
        }
    }
}

#[derive(Debug)]
pub struct LoxClass {
    pub name: String,
    pub superclass: Option<Rc<LoxClass>>,
    pub methods: HashMap<String, Rc<LoxFunction>>,
    pub statics: HashMap<String, Rc<LoxFunction>>,
}

impl LoxClass {
    /// Instance method by name, searching this class then each ancestor.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }

        self.superclass.as_ref()?.find_method(name)
    }

    /// Static method by name, inherited along the same chain.
    pub fn find_static(&self, name: &str) -> Option<Rc<LoxFunction>> {
        if let Some(method) = self.statics.get(name) {
            return Some(Rc::clone(method));
        }

        self.superclass.as_ref()?.find_static(name)
    }

    /// Calling a class takes as many arguments as its `init`.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
}

pub struct Instance {
    pub class: Rc<LoxClass>,
    pub fields: HashMap<String, Value>,
}

impl Instance {
    pub fn new(class: Rc<LoxClass>) -> Self {
        Self {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}

// Fields may point back at the instance itself.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort();

        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &names)
            .finish()
    }
}
