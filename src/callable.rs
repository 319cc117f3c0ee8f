//! The callable / class / instance object model.
//!
//! Everything that can appear on the left of `(` implements [`Callable`]:
//! native functions, user functions (closures) and classes used as
//! constructors.  All three are handed around as `Rc` handles inside
//! [`Value`]; the handle graph *is* the lifetime model.  An instance keeps
//! its class alive, a subclass keeps its superclass alive, and a closure
//! keeps its defining environment alive, so the destruction‑order
//! invariants hold by construction instead of by counter bookkeeping.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::interpreter::{Flow, Interpreter};
use crate::value::Value;

/// Uniform invocation contract.  The interpreter checks arity before
/// calling `invoke`, so implementations may assume `args.len() == arity()`.
pub trait Callable<'s> {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter<'s>,
        args: Vec<Value<'s>>,
    ) -> Result<Value<'s>>;
}

/// A function implemented by the host runtime rather than in Lox source.
pub struct NativeFn<'s> {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&mut Interpreter<'s>, &[Value<'s>]) -> std::result::Result<Value<'s>, String>,
}

impl<'s> Callable<'s> for NativeFn<'s> {
    fn name(&self) -> &str {
        self.name
    }

    fn arity(&self) -> usize {
        self.arity
    }

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter<'s>,
        args: Vec<Value<'s>>,
    ) -> Result<Value<'s>> {
        debug!("Calling native function '{}'", self.name);

        (self.func)(interpreter, &args).map_err(LoxError::runtime_msg)
    }
}

/// A user‑defined function paired with the environment that was current at
/// its declaration (its closure).  Parameter list and body are shared with
/// the declaration node, never copied.
pub struct LoxFunction<'s> {
    decl: Rc<FunctionDecl<'s>>,
    closure: Rc<RefCell<Environment<'s>>>,
    is_initializer: bool,

    /// Number of currently live activations of *this* function object.
    /// Nested and recursive calls share one self‑binding (below), installed
    /// by the outermost activation and removed when it returns.
    active_calls: Cell<usize>,

    /// Whether the outermost activation installed the self‑binding (it is
    /// skipped when the closure already binds the function's name, the
    /// common case for declared functions).
    self_bound: Cell<bool>,
}

impl<'s> LoxFunction<'s> {
    pub fn new(
        decl: Rc<FunctionDecl<'s>>,
        closure: Rc<RefCell<Environment<'s>>>,
        is_initializer: bool,
    ) -> Self {
        LoxFunction {
            decl,
            closure,
            is_initializer,
            active_calls: Cell::new(0),
            self_bound: Cell::new(false),
        }
    }

    pub fn name(&self) -> &'s str {
        self.decl.name.lexeme
    }

    /// Produce a fresh function whose closure is a new environment chained
    /// to this method's defining closure with `this` bound in it.  This is
    /// what makes `obj.method` usable as a detached value: the receiver
    /// travels with the closure, not with the call site.
    pub fn bind(&self, instance: Value<'s>) -> LoxFunction<'s> {
        let env = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &self.closure,
        ))));

        env.borrow_mut().define("this", instance);

        LoxFunction::new(Rc::clone(&self.decl), env, self.is_initializer)
    }
}

impl<'s> Callable<'s> for LoxFunction<'s> {
    fn name(&self) -> &str {
        self.decl.name.lexeme
    }

    fn arity(&self) -> usize {
        self.decl.params.len()
    }

    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter<'s>,
        args: Vec<Value<'s>>,
    ) -> Result<Value<'s>> {
        let name = self.decl.name.lexeme;

        debug!("Calling function '{}'", name);

        // Outermost activation: publish the function under its own name in
        // its closure so recursive references keep resolving to this exact
        // object even if the outer binding is shadowed mid‑call.
        if self.active_calls.get() == 0 && !self.closure.borrow().contains(name) {
            self.closure
                .borrow_mut()
                .define(name, Value::Function(Rc::clone(&self)));

            self.self_bound.set(true);
        }

        self.active_calls.set(self.active_calls.get() + 1);

        // The call frame chains to the *defining* environment, never to the
        // caller's current environment.
        let frame = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
            &self.closure,
        ))));

        for (param, arg) in self.decl.params.iter().zip(args) {
            frame.borrow_mut().define(param.lexeme, arg);
        }

        let outcome = interpreter.execute_block(&self.decl.body, frame);

        self.active_calls.set(self.active_calls.get() - 1);

        if self.active_calls.get() == 0 && self.self_bound.get() {
            self.closure.borrow_mut().remove(name);

            self.self_bound.set(false);
        }

        // An initializer yields the bound `this` no matter how its body
        // finished; everything else yields the returned value or nil.
        match outcome? {
            _ if self.is_initializer => {
                Environment::get_at(&self.closure, 0, "this").map_err(LoxError::runtime_msg)
            }

            Flow::Return(value) => Ok(value),

            Flow::Normal => Ok(Value::Nil),
        }
    }
}

/// A class: a name, an optional superclass link, and a method table.
pub struct LoxClass<'s> {
    name: &'s str,
    superclass: Option<Rc<LoxClass<'s>>>,
    methods: HashMap<&'s str, Rc<LoxFunction<'s>>>,
}

impl<'s> LoxClass<'s> {
    pub fn new(
        name: &'s str,
        superclass: Option<Rc<LoxClass<'s>>>,
        methods: HashMap<&'s str, Rc<LoxFunction<'s>>>,
    ) -> Self {
        LoxClass {
            name,
            superclass,
            methods,
        }
    }

    pub fn name(&self) -> &'s str {
        self.name
    }

    /// Search the method table, delegating up the superclass chain.
    pub fn find_method(&self, name: &str) -> Option<Rc<LoxFunction<'s>>> {
        if let Some(method) = self.methods.get(name) {
            return Some(Rc::clone(method));
        }

        self.superclass
            .as_ref()
            .and_then(|superclass| superclass.find_method(name))
    }
}

impl<'s> Callable<'s> for LoxClass<'s> {
    fn name(&self) -> &str {
        self.name
    }

    /// A class's call arity is its initializer's arity; a class without an
    /// `init` anywhere in its chain takes no constructor arguments.
    fn arity(&self) -> usize {
        self.find_method("init")
            .map(|init| init.arity())
            .unwrap_or(0)
    }

    /// Calling a class constructs an instance, running `init` bound to the
    /// new instance when the class (or an ancestor) defines one.
    fn invoke(
        self: Rc<Self>,
        interpreter: &mut Interpreter<'s>,
        args: Vec<Value<'s>>,
    ) -> Result<Value<'s>> {
        debug!("Constructing instance of '{}'", self.name);

        let instance = Rc::new(RefCell::new(LoxInstance::new(Rc::clone(&self))));

        if let Some(init) = self.find_method("init") {
            let bound = Rc::new(init.bind(Value::Instance(Rc::clone(&instance))));

            bound.invoke(interpreter, args)?;
        }

        Ok(Value::Instance(instance))
    }
}

/// An instance: a strong back‑reference to its class plus its own property
/// map.  The strong link is what makes it impossible to free a class while
/// any of its instances is reachable.
pub struct LoxInstance<'s> {
    class: Rc<LoxClass<'s>>,
    fields: HashMap<&'s str, Value<'s>>,
}

impl<'s> LoxInstance<'s> {
    pub fn new(class: Rc<LoxClass<'s>>) -> Self {
        LoxInstance {
            class,
            fields: HashMap::new(),
        }
    }

    pub fn class_name(&self) -> &'s str {
        self.class.name()
    }

    /// Property lookup: own fields first, then the class's method table
    /// (walking the superclass chain), binding `this` freshly per lookup.
    pub fn get(
        instance: &Rc<RefCell<LoxInstance<'s>>>,
        name: &'s str,
    ) -> std::result::Result<Value<'s>, String> {
        if let Some(value) = instance.borrow().fields.get(name) {
            return Ok(value.clone());
        }

        let class = Rc::clone(&instance.borrow().class);

        if let Some(method) = class.find_method(name) {
            let bound = method.bind(Value::Instance(Rc::clone(instance)));

            return Ok(Value::Function(Rc::new(bound)));
        }

        Err(format!("Undefined property '{}'.", name))
    }

    /// Property write; always creates the field when absent.
    pub fn set(&mut self, name: &'s str, value: Value<'s>) {
        self.fields.insert(name, value);
    }
}
