use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle to an environment. Closures, child scopes and active calls
/// all hold one; the record lives as long as any of them does.
pub type EnvRef = Rc<RefCell<Environment>>;

#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<EnvRef>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: EnvRef) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Wrap a fresh child of `enclosing` in a shared handle.
    pub fn child_of(enclosing: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(enclosing))))
    }

    /// Bind `name` in *this* environment. A second declaration of the same
    /// name in the same environment is rejected; shadowing an outer binding
    /// is fine.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), String> {
        if self.values.contains_key(name) {
            return Err(format!("Variable '{}' is already defined in this scope.", name));
        }

        debug!("Defining '{}' = {}", name, value);
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Unconditional binding for names the interpreter injects itself
    /// (`this`, `super`, parameters).
    pub fn insert(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    /// Lookup walking the enclosing chain (used for globals only).
    pub fn get(&self, name: &str) -> Result<Value, String> {
        if let Some(value) = self.values.get(name) {
            Ok(value.clone())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow().get(name)
        } else {
            Err(format!("Undefined variable '{}'.", name))
        }
    }

    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), String> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            Ok(())
        } else if let Some(enclosing) = &self.enclosing {
            enclosing.borrow_mut().assign(name, value)
        } else {
            Err(format!("Undefined variable '{}'.", name))
        }
    }

    /// Names bound directly in this environment, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Environment exactly `distance` links above `env`.
pub fn ancestor(env: &EnvRef, distance: usize) -> Option<EnvRef> {
    let mut current: EnvRef = Rc::clone(env);

    for _ in 0..distance {
        let next: EnvRef = current.borrow().enclosing.clone()?;
        current = next;
    }

    Some(current)
}

/// Read `name` directly from the environment `distance` links up, without
/// searching further.
pub fn get_at(env: &EnvRef, distance: usize, name: &str) -> Option<Value> {
    let target: EnvRef = ancestor(env, distance)?;
    let value = target.borrow().values.get(name).cloned();
    value
}

/// Overwrite `name` in the environment `distance` links up. Returns `false`
/// if that environment does not bind it.
pub fn assign_at(env: &EnvRef, distance: usize, name: &str, value: Value) -> bool {
    let Some(target) = ancestor(env, distance) else {
        return false;
    };

    let mut target = target.borrow_mut();
    match target.values.get_mut(name) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}
