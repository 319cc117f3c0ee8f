//! Lexical environment chain.
//!
//! One `Environment` per entered scope, linked to its enclosing scope via a
//! shared handle.  Closures clone that handle, so a scope outlives its block
//! for exactly as long as something still captures it, and a write through
//! one alias is visible through every other alias to the same scope.
//!
//! After the resolver pass, variable access takes an explicit hop count
//! (distance); only the global environment is ever searched dynamically,
//! because globals are late‑bound to support forward references and
//! REPL‑style incremental declarations.

use crate::value::Value;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct Environment<'s> {
    values: HashMap<&'s str, Value<'s>>,
    enclosing: Option<Rc<RefCell<Environment<'s>>>>,
}

impl<'s> Environment<'s> {
    /// A root environment with no enclosing link (the global scope).
    pub fn new() -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    /// A fresh environment chained to `enclosing`.
    pub fn with_enclosing(enclosing: Rc<RefCell<Environment<'s>>>) -> Self {
        Environment {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Create or overwrite a binding in *this* scope.
    pub fn define(&mut self, name: &'s str, value: Value<'s>) {
        debug!("Defining '{}' = {}", name, value);

        self.values.insert(name, value);
    }

    /// Drop a binding from *this* scope.  Used by the function self‑binding
    /// bookkeeping when the outermost activation returns.
    pub fn remove(&mut self, name: &str) -> Option<Value<'s>> {
        self.values.remove(name)
    }

    /// Does *this* scope (not the chain) bind `name`?
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Read a binding from *this* scope only.  The interpreter calls this on
    /// the global environment when the resolver recorded no distance.
    pub fn get_local(&self, name: &str) -> Result<Value<'s>, String> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| format!("Undefined variable '{}'.", name))
    }

    /// Write to an existing binding in *this* scope only.  Assigning to a
    /// name that was never declared is an error, not a silent create.
    pub fn assign_local(&mut self, name: &str, value: Value<'s>) -> Result<(), String> {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            Ok(())
        } else {
            Err(format!("Undefined variable '{}'.", name))
        }
    }

    /// Walk exactly `distance` enclosing links from `env`.
    ///
    /// The resolver guarantees the chain is deep enough; a short chain means
    /// resolution and execution disagree about scope shape, which is an
    /// internal fault rather than a user error.
    fn ancestor(
        env: &Rc<RefCell<Environment<'s>>>,
        distance: usize,
    ) -> Rc<RefCell<Environment<'s>>> {
        let mut current = Rc::clone(env);

        for _ in 0..distance {
            let next = current
                .borrow()
                .enclosing
                .as_ref()
                .map(Rc::clone)
                .expect("resolver recorded a distance deeper than the environment chain");

            current = next;
        }

        current
    }

    /// Read `name` at exactly `distance` hops from `env`.
    pub fn get_at(
        env: &Rc<RefCell<Environment<'s>>>,
        distance: usize,
        name: &str,
    ) -> Result<Value<'s>, String> {
        Environment::ancestor(env, distance).borrow().get_local(name)
    }

    /// Assign `name` at exactly `distance` hops from `env`.
    pub fn assign_at(
        env: &Rc<RefCell<Environment<'s>>>,
        distance: usize,
        name: &str,
        value: Value<'s>,
    ) -> Result<(), String> {
        Environment::ancestor(env, distance)
            .borrow_mut()
            .assign_local(name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_walks_exact_hops() {
        let global = Rc::new(RefCell::new(Environment::new()));
        global.borrow_mut().define("a", Value::Number(1.0));

        let middle = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &global,
        ))));
        middle.borrow_mut().define("a", Value::Number(2.0));

        let inner = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &middle,
        ))));

        assert_eq!(
            Environment::get_at(&inner, 1, "a").unwrap(),
            Value::Number(2.0)
        );
        assert_eq!(
            Environment::get_at(&inner, 2, "a").unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn writes_are_visible_through_aliases() {
        let shared = Rc::new(RefCell::new(Environment::new()));
        shared.borrow_mut().define("i", Value::Number(0.0));

        let alias = Rc::clone(&shared);
        alias
            .borrow_mut()
            .assign_local("i", Value::Number(5.0))
            .unwrap();

        assert_eq!(shared.borrow().get_local("i").unwrap(), Value::Number(5.0));
    }

    #[test]
    fn assigning_undeclared_is_an_error() {
        let env = Rc::new(RefCell::new(Environment::new()));

        assert!(env
            .borrow_mut()
            .assign_local("ghost", Value::Nil)
            .is_err());
    }
}
