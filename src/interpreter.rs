//! The evaluation engine: a tree walk over the parsed statements.
//!
//! Statement execution yields a [`Flow`] signal rather than a value:
//! `Flow::Return` carries an in‑flight `return` up to the nearest function
//! call boundary, where [`crate::callable::LoxFunction::invoke`] absorbs
//! it.  Runtime errors travel on the ordinary `Err` channel and unwind to
//! the top‑level driver, aborting only the current submission.
//!
//! Variable access uses the distances recorded by the resolver
//! ([`Interpreter::note_local`]); references without a recorded distance
//! fall back to a direct lookup in the global environment, which is what
//! makes forward‑declared globals and incremental REPL input work.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use log::{debug, info};

use crate::ast::{Expr, LiteralValue, Stmt};
use crate::callable::{Callable, LoxClass, LoxFunction, LoxInstance, NativeFn};
use crate::environment::Environment;
use crate::error::{LoxError, Result};
use crate::resolver::Resolver;
use crate::token::{Token, TokenType};
use crate::value::Value;

/// Ceiling on nested call activations.  Exceeding it is a runtime error
/// rather than a native stack fault.
pub const MAX_CALL_DEPTH: usize = 256;

/// How a statement finished: fell through normally, or produced a `return`
/// that is still looking for its enclosing function call.
#[derive(Debug)]
pub enum Flow<'s> {
    Normal,
    Return(Value<'s>),
}

/// Outcome of one whole program submission, for the CLI / REPL driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunResult {
    /// Every statement executed.
    Success,

    /// The resolver rejected the program; nothing executed.
    StaticRejected,

    /// Execution started and hit a runtime error.
    RuntimeFailed,
}

pub struct Interpreter<'s> {
    globals: Rc<RefCell<Environment<'s>>>,

    /// The "current environment" cursor; swapped on block/call entry and
    /// restored on every exit path.
    environment: Rc<RefCell<Environment<'s>>>,

    /// Resolver output: expression id → enclosing‑environment hop count.
    /// Entries live as long as the interpreter (closures from earlier
    /// submissions keep using theirs), so ids must be unique across every
    /// program this interpreter runs.
    locals: HashMap<usize, usize>,

    call_depth: usize,

    started: Instant,

    /// Where `print` output goes.  Stdout by default; tests inject a
    /// capturing sink.
    out: Box<dyn Write>,
}

impl<'s> Default for Interpreter<'s> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> Interpreter<'s> {
    /// Create an interpreter printing to stdout, with the native `clock`
    /// function registered in the global environment.
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Create an interpreter whose `print` statements write to `out`.
    pub fn with_output(out: Box<dyn Write>) -> Self {
        info!("Initializing Interpreter");

        let globals = Rc::new(RefCell::new(Environment::new()));

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Native(Rc::new(NativeFn {
                name: "clock",
                arity: 0,
                func: |interpreter, _args| Ok(Value::Number(interpreter.elapsed_seconds())),
            })),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
            call_depth: 0,
            started: Instant::now(),
            out,
        }
    }

    /// Seconds since this interpreter was constructed.
    pub fn elapsed_seconds(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Resolver callback: the reference with this id lives `depth` hops
    /// from its use site.  References never noted here are globals.
    pub fn note_local(&mut self, id: usize, depth: usize) {
        self.locals.insert(id, depth);
    }

    /// Resolve then run one program submission.  Resolution failure rejects
    /// the submission wholesale; nothing executes.
    pub fn resolve_and_run(&mut self, statements: &[Stmt<'s>]) -> RunResult {
        if let Err(e) = Resolver::new(self).resolve(statements) {
            eprintln!("{}", e);

            return RunResult::StaticRejected;
        }

        match self.interpret(statements) {
            Ok(()) => RunResult::Success,

            Err(e) => {
                eprintln!("{}", e);

                RunResult::RuntimeFailed
            }
        }
    }

    /// Interprets a list of statements (a "program").  Assumes the resolver
    /// already ran over them.
    pub fn interpret(&mut self, statements: &[Stmt<'s>]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        for stmt in statements {
            match self.execute(stmt)? {
                Flow::Normal => {}

                // The resolver rejects top-level returns, so a Return
                // escaping here means the signal leaked past a call
                // boundary.
                Flow::Return(_) => {
                    return Err(LoxError::runtime_msg("Unexpected 'return' at top level."));
                }
            }
        }

        info!("Interpretation completed successfully");

        Ok(())
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt<'s>) -> Result<Flow<'s>> {
        match stmt {
            Stmt::Expression(expr) => {
                let _ = self.evaluate(expr)?;

                Ok(Flow::Normal)
            }

            Stmt::Print(expr) => {
                let value = self.evaluate(expr)?;

                writeln!(self.out, "{}", value)?;

                Ok(Flow::Normal)
            }

            Stmt::Var { name, initializer } => {
                debug!("Defining variable '{}'", name.lexeme);

                let value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                self.environment.borrow_mut().define(name.lexeme, value);

                Ok(Flow::Normal)
            }

            Stmt::Block(statements) => {
                let scope = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));

                self.execute_block(statements, scope)
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_stmt) = else_branch {
                    self.execute(else_stmt)
                } else {
                    Ok(Flow::Normal)
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }

                Ok(Flow::Normal)
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                // The closure is the environment current at declaration
                // time, not whatever is current when the call happens.
                let function = LoxFunction::new(
                    Rc::clone(decl),
                    Rc::clone(&self.environment),
                    false,
                );

                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme, Value::Function(Rc::new(function)));

                Ok(Flow::Normal)
            }

            Stmt::Return { keyword: _, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                Ok(Flow::Return(value))
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods),
        }
    }

    /// Run `statements` with `scope` installed as the current environment,
    /// restoring the previous cursor on every exit path.  The scope itself
    /// survives the restore if a closure captured it.
    pub fn execute_block(
        &mut self,
        statements: &[Stmt<'s>],
        scope: Rc<RefCell<Environment<'s>>>,
    ) -> Result<Flow<'s>> {
        let previous = std::mem::replace(&mut self.environment, scope);

        let result = self.run_sequence(statements);

        self.environment = previous;

        result
    }

    fn run_sequence(&mut self, statements: &[Stmt<'s>]) -> Result<Flow<'s>> {
        for stmt in statements {
            if let Flow::Return(value) = self.execute(stmt)? {
                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &'s Token<'s>,
        superclass: Option<&Expr<'s>>,
        methods: &[Rc<crate::ast::FunctionDecl<'s>>],
    ) -> Result<Flow<'s>> {
        debug!("Declaring class '{}'", name.lexeme);

        let superclass = match superclass {
            Some(expr) => {
                if let Expr::Variable { name: super_name, .. } = expr {
                    if super_name.lexeme == name.lexeme {
                        return Err(LoxError::runtime(
                            name.line,
                            "A class cannot be its own superclass.",
                        ));
                    }
                }

                match self.evaluate(expr)? {
                    Value::Class(class) => Some(class),

                    _ => {
                        return Err(LoxError::runtime(
                            expr.line(),
                            "Superclass must be a class.",
                        ));
                    }
                }
            }

            None => None,
        };

        // Methods of a subclass close over a transient scope binding
        // `super`; the class name itself is bound in the enclosing
        // environment once that scope is popped.
        let method_closure = match &superclass {
            Some(class) => {
                let scope = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));

                scope
                    .borrow_mut()
                    .define("super", Value::Class(Rc::clone(class)));

                scope
            }

            None => Rc::clone(&self.environment),
        };

        let mut table = HashMap::new();

        for decl in methods {
            let is_initializer = decl.name.lexeme == "init";

            let method = LoxFunction::new(
                Rc::clone(decl),
                Rc::clone(&method_closure),
                is_initializer,
            );

            table.insert(decl.name.lexeme, Rc::new(method));
        }

        let class = LoxClass::new(name.lexeme, superclass, table);

        self.environment
            .borrow_mut()
            .define(name.lexeme, Value::Class(Rc::new(class)));

        Ok(Flow::Normal)
    }

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr<'s>) -> Result<Value<'s>> {
        match expr {
            Expr::Literal(literal) => Ok(Self::evaluate_literal(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Unary { operator, right } => self.evaluate_unary(operator, right),

            Expr::Binary {
                left,
                operator,
                right,
            } => self.evaluate_binary(left, operator, right),

            Expr::Logical {
                left,
                operator,
                right,
            } => self.evaluate_logical(left, operator, right),

            Expr::Variable { name, id } => self.lookup_variable(name, *id),

            Expr::Assign { name, value, id } => {
                let value = self.evaluate(value)?;

                match self.locals.get(id) {
                    Some(&distance) => Environment::assign_at(
                        &self.environment,
                        distance,
                        name.lexeme,
                        value.clone(),
                    ),

                    None => self
                        .globals
                        .borrow_mut()
                        .assign_local(name.lexeme, value.clone()),
                }
                .map_err(|msg| LoxError::runtime(name.line, msg))?;

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;

                let mut args = Vec::with_capacity(arguments.len());

                for arg in arguments {
                    args.push(self.evaluate(arg)?);
                }

                self.invoke_callable(callee, paren, args)
            }

            Expr::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => LoxInstance::get(&instance, name.lexeme)
                    .map_err(|msg| LoxError::runtime(name.line, msg)),

                _ => Err(LoxError::runtime(
                    name.line,
                    "Only instances have properties.",
                )),
            },

            Expr::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;

                    instance.borrow_mut().set(name.lexeme, value.clone());

                    Ok(value)
                }

                _ => Err(LoxError::runtime(
                    name.line,
                    "Only instances have fields.",
                )),
            },

            Expr::This { keyword, id } => self.lookup_variable(keyword, *id),

            Expr::Super {
                keyword,
                method,
                id,
            } => self.evaluate_super(keyword, method, *id),
        }
    }

    fn evaluate_literal(literal: &LiteralValue) -> Value<'s> {
        match literal {
            LiteralValue::Number(n) => Value::Number(*n),
            LiteralValue::Str(s) => Value::String(s.clone()),
            LiteralValue::True => Value::Bool(true),
            LiteralValue::False => Value::Bool(false),
            LiteralValue::Nil => Value::Nil,
        }
    }

    fn evaluate_unary(&mut self, operator: &Token<'s>, right: &Expr<'s>) -> Result<Value<'s>> {
        let right = self.evaluate(right)?;

        match operator.token_type {
            TokenType::MINUS => match right {
                Value::Number(n) => Ok(Value::Number(-n)),

                _ => Err(LoxError::runtime(
                    operator.line,
                    "Operand must be a number.",
                )),
            },

            TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),

            _ => Err(LoxError::runtime(operator.line, "Invalid unary operator.")),
        }
    }

    fn evaluate_binary(
        &mut self,
        left: &Expr<'s>,
        operator: &Token<'s>,
        right: &Expr<'s>,
    ) -> Result<Value<'s>> {
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        let line = operator.line;

        match operator.token_type {
            TokenType::EQUAL_EQUAL => Ok(Value::Bool(left.loose_eq(&right))),

            TokenType::BANG_EQUAL => Ok(Value::Bool(!left.loose_eq(&right))),

            TokenType::PLUS => match Value::coerced(&left, &right) {
                Some((Value::Number(a), Value::Number(b))) => Ok(Value::Number(a + b)),

                Some((Value::String(a), Value::String(b))) => Ok(Value::String(a + &b)),

                _ => Err(LoxError::runtime(
                    line,
                    "Operands must be two numbers or two strings.",
                )),
            },

            TokenType::MINUS => match Value::coerced(&left, &right) {
                Some((Value::Number(a), Value::Number(b))) => Ok(Value::Number(a - b)),

                _ => Err(LoxError::runtime(line, "Operands must be numbers.")),
            },

            TokenType::STAR => match Value::coerced(&left, &right) {
                Some((Value::Number(a), Value::Number(b))) => Ok(Value::Number(a * b)),

                _ => Err(LoxError::runtime(line, "Operands must be numbers.")),
            },

            TokenType::SLASH => match Value::coerced(&left, &right) {
                Some((Value::Number(a), Value::Number(b))) => {
                    if b == 0.0 {
                        Err(LoxError::runtime(line, "Division by zero."))
                    } else {
                        Ok(Value::Number(a / b))
                    }
                }

                _ => Err(LoxError::runtime(line, "Operands must be numbers.")),
            },

            TokenType::LESS
            | TokenType::LESS_EQUAL
            | TokenType::GREATER
            | TokenType::GREATER_EQUAL => {
                let ordered = match Value::coerced(&left, &right) {
                    Some((Value::Number(a), Value::Number(b))) => match operator.token_type {
                        TokenType::LESS => a < b,
                        TokenType::LESS_EQUAL => a <= b,
                        TokenType::GREATER => a > b,
                        _ => a >= b,
                    },

                    Some((Value::String(a), Value::String(b))) => match operator.token_type {
                        TokenType::LESS => a < b,
                        TokenType::LESS_EQUAL => a <= b,
                        TokenType::GREATER => a > b,
                        _ => a >= b,
                    },

                    // Nil and Bool are not well-ordered, even between
                    // themselves.
                    _ => {
                        return Err(LoxError::runtime(
                            line,
                            "Operands must be two numbers or two strings.",
                        ));
                    }
                };

                Ok(Value::Bool(ordered))
            }

            _ => Err(LoxError::runtime(line, "Invalid binary operator.")),
        }
    }

    /// `and` / `or` short-circuit and yield the *truthiness* of the
    /// deciding operand as a Bool, never the operand itself.
    fn evaluate_logical(
        &mut self,
        left: &Expr<'s>,
        operator: &Token<'s>,
        right: &Expr<'s>,
    ) -> Result<Value<'s>> {
        let left = self.evaluate(left)?;

        match operator.token_type {
            TokenType::OR => {
                if left.is_truthy() {
                    Ok(Value::Bool(true))
                } else {
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
            }

            TokenType::AND => {
                if !left.is_truthy() {
                    Ok(Value::Bool(false))
                } else {
                    Ok(Value::Bool(self.evaluate(right)?.is_truthy()))
                }
            }

            _ => Err(LoxError::runtime(
                operator.line,
                "Invalid logical operator.",
            )),
        }
    }

    fn lookup_variable(&self, name: &Token<'s>, id: usize) -> Result<Value<'s>> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, name.lexeme),

            None => self.globals.borrow().get_local(name.lexeme),
        }
        .map_err(|msg| LoxError::runtime(name.line, msg))
    }

    fn evaluate_super(
        &mut self,
        keyword: &Token<'s>,
        method: &Token<'s>,
        id: usize,
    ) -> Result<Value<'s>> {
        let distance = *self.locals.get(&id).ok_or_else(|| {
            LoxError::runtime(keyword.line, "'super' was not resolved to a scope.")
        })?;

        let superclass = match Environment::get_at(&self.environment, distance, "super")
            .map_err(|msg| LoxError::runtime(keyword.line, msg))?
        {
            Value::Class(class) => class,

            _ => {
                return Err(LoxError::runtime(
                    keyword.line,
                    "'super' does not name a class.",
                ));
            }
        };

        // `this` lives one scope inside the one binding `super`.
        let instance = Environment::get_at(&self.environment, distance - 1, "this")
            .map_err(|msg| LoxError::runtime(keyword.line, msg))?;

        let resolved = superclass.find_method(method.lexeme).ok_or_else(|| {
            LoxError::runtime(
                method.line,
                format!("Undefined property '{}'.", method.lexeme),
            )
        })?;

        Ok(Value::Function(Rc::new(resolved.bind(instance))))
    }

    /// Invokes a callable (native function, user function, or class used as
    /// a constructor) with the arity and depth checks shared by all three.
    fn invoke_callable(
        &mut self,
        callee: Value<'s>,
        paren: &Token<'s>,
        args: Vec<Value<'s>>,
    ) -> Result<Value<'s>> {
        let callable: Rc<dyn Callable<'s> + 's> = match callee {
            Value::Native(native) => native,
            Value::Function(function) => function,
            Value::Class(class) => class,

            _ => {
                return Err(LoxError::runtime(
                    paren.line,
                    "Can only call functions and classes.",
                ));
            }
        };

        if args.len() != callable.arity() {
            return Err(LoxError::runtime(
                paren.line,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    args.len()
                ),
            ));
        }

        self.call_depth += 1;

        if self.call_depth > MAX_CALL_DEPTH {
            self.call_depth -= 1;

            return Err(LoxError::runtime(
                paren.line,
                "Maximum call depth reached.",
            ));
        }

        let result = callable.invoke(self, args);

        self.call_depth -= 1;

        result
    }
}
