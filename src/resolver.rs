//! Static resolver pass.
//!
//! This resolver does three things in one AST walk:
//! 1. Build lexical scopes (stack of `HashMap<&str, bool>` tracking
//!    declared/defined).
//! 2. Reject the static error set (redeclaration, self‑referential
//!    initializer, invalid `return`, and `this`/`super` misuse) before any
//!    statement executes — resolution is fail‑fast, one error rejects the
//!    whole submission.
//! 3. Tell the interpreter, for *each* variable occurrence, whether it's a
//!    local (and at what depth) or a global, so execution never falls back
//!    to a dynamic lookup that could see a later shadowing local.

use crate::ast::{Expr, FunctionDecl, Stmt};
use crate::error::{LoxError, Result};
use crate::interpreter::Interpreter;
use crate::token::Token;
use log::{debug, info};
use std::collections::HashMap;
use std::rc::Rc;

/// What kind of function body are we inside?  Used to validate `return`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

/// What kind of class body are we inside?  Used to validate `this`/`super`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Resolver: tracks scopes, enforces static rules, and *records* binding
/// distances (locals vs. globals) by calling back into the interpreter.
pub struct Resolver<'s, 'interp> {
    interpreter: &'interp mut Interpreter<'s>,
    scopes: Vec<HashMap<&'s str, bool>>, // false=declared, true=defined
    current_function: FunctionType,
    current_class: ClassType,
}

impl<'s, 'interp> Resolver<'s, 'interp> {
    /// Create a new resolver bound to the given interpreter.
    pub fn new(interpreter: &'interp mut Interpreter<'s>) -> Self {
        info!("Resolver instantiated");

        Resolver {
            interpreter,
            scopes: Vec::new(),
            current_function: FunctionType::None,
            current_class: ClassType::None,
        }
    }

    /// Walk all top‑level statements.
    pub fn resolve(&mut self, statements: &[Stmt<'s>]) -> Result<()> {
        info!(
            "Beginning resolve pass over {} statement(s)",
            statements.len()
        );

        for stmt in statements {
            self.resolve_stmt(stmt)?;
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Statement resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_stmt(&mut self, stmt: &Stmt<'s>) -> Result<()> {
        match stmt {
            Stmt::Block(statements) => {
                self.begin_scope();

                for s in statements {
                    self.resolve_stmt(s)?;
                }

                self.end_scope();
            }

            Stmt::Var { name, initializer } => {
                // declare → resolve initializer → define, so that the
                // initializer cannot read the variable it is defining.
                self.declare(name)?;

                if let Some(expr) = initializer {
                    self.resolve_expr(expr)?;
                }

                self.define(name);
            }

            Stmt::Function(decl) => {
                // The name is visible inside its own body (recursion).
                self.declare(decl.name)?;
                self.define(decl.name);

                self.resolve_function(decl, FunctionType::Function)?;
            }

            Stmt::Expression(expr) | Stmt::Print(expr) => {
                self.resolve_expr(expr)?;
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(then_branch)?;

                if let Some(else_branch) = else_branch.as_deref() {
                    self.resolve_stmt(else_branch)?;
                }
            }

            Stmt::While { condition, body } => {
                self.resolve_expr(condition)?;
                self.resolve_stmt(body)?;
            }

            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot return from top-level code.",
                    ));
                }

                if let Some(expr) = value {
                    if self.current_function == FunctionType::Initializer {
                        return Err(LoxError::resolve(
                            keyword.line,
                            "Cannot return a value from an initializer.",
                        ));
                    }

                    self.resolve_expr(expr)?;
                }
            }

            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.resolve_class(name, superclass.as_ref(), methods)?;
            }
        }

        Ok(())
    }

    fn resolve_class(
        &mut self,
        name: &'s Token<'s>,
        superclass: Option<&Expr<'s>>,
        methods: &[Rc<FunctionDecl<'s>>],
    ) -> Result<()> {
        self.declare(name)?;
        self.define(name);

        let enclosing = self.current_class;
        self.current_class = ClassType::Class;

        // A subclass body gets an extra scope binding `super` around the
        // scope binding `this`; the interpreter mirrors this exact shape.
        if let Some(expr) = superclass {
            self.current_class = ClassType::Subclass;

            self.resolve_expr(expr)?;

            self.begin_scope();
            self.scopes.last_mut().unwrap().insert("super", true);
        }

        self.begin_scope();
        self.scopes.last_mut().unwrap().insert("this", true);

        for method in methods {
            let declaration = if method.name.lexeme == "init" {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };

            self.resolve_function(method, declaration)?;
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Expression resolution
    // ─────────────────────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &Expr<'s>) -> Result<()> {
        match expr {
            Expr::Literal(_) => {}

            Expr::Grouping(inner) => {
                self.resolve_expr(inner)?;
            }

            Expr::Unary { right, .. } => {
                self.resolve_expr(right)?;
            }

            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left)?;
                self.resolve_expr(right)?;
            }

            Expr::Variable { name, id } => {
                // A binding that is declared but not yet defined in the
                // innermost scope means the initializer references itself.
                if let Some(scope) = self.scopes.last() {
                    if scope.get(name.lexeme) == Some(&false) {
                        return Err(LoxError::resolve(
                            name.line,
                            "Cannot read local variable in its own initializer.",
                        ));
                    }
                }

                self.resolve_local(*id, name);
            }

            Expr::Assign { name, value, id } => {
                // First resolve RHS, then bind LHS.
                self.resolve_expr(value)?;

                self.resolve_local(*id, name);
            }

            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee)?;

                for arg in arguments {
                    self.resolve_expr(arg)?;
                }
            }

            Expr::Get { object, .. } => self.resolve_expr(object)?,

            Expr::Set { object, value, .. } => {
                self.resolve_expr(object)?;
                self.resolve_expr(value)?;
            }

            Expr::This { keyword, id } => {
                if self.current_class == ClassType::None {
                    return Err(LoxError::resolve(
                        keyword.line,
                        "Cannot use 'this' outside of a class.",
                    ));
                }

                self.resolve_local(*id, keyword);
            }

            Expr::Super { keyword, id, .. } => {
                match self.current_class {
                    ClassType::None => {
                        return Err(LoxError::resolve(
                            keyword.line,
                            "Cannot use 'super' outside of a class.",
                        ));
                    }

                    ClassType::Class => {
                        return Err(LoxError::resolve(
                            keyword.line,
                            "Cannot use 'super' in a class with no superclass.",
                        ));
                    }

                    ClassType::Subclass => {}
                }

                self.resolve_local(*id, keyword);
            }
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Function helper
    // ─────────────────────────────────────────────────────────────────────

    /// One fresh scope covers a function's parameters *and* its body
    /// statements; the interpreter allocates exactly one call frame for
    /// both, so the depths line up.
    fn resolve_function(
        &mut self,
        decl: &FunctionDecl<'s>,
        function_type: FunctionType,
    ) -> Result<()> {
        let enclosing = self.current_function;
        self.current_function = function_type;

        self.begin_scope();

        for param in &decl.params {
            self.declare(param)?;
            self.define(param);
        }

        for stmt in decl.body.iter() {
            self.resolve_stmt(stmt)?;
        }

        self.end_scope();

        self.current_function = enclosing;

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Scope management
    // ─────────────────────────────────────────────────────────────────────

    #[inline]
    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    #[inline]
    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &'s Token<'s>) -> Result<()> {
        if let Some(scope) = self.scopes.last_mut() {
            if scope.contains_key(name.lexeme) {
                return Err(LoxError::resolve(
                    name.line,
                    format!("Variable '{}' was already declared in this scope.", name.lexeme),
                ));
            }

            scope.insert(name.lexeme, false);
        }

        Ok(())
    }

    fn define(&mut self, name: &'s Token<'s>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme, true);
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Binding‑distance helper
    // ─────────────────────────────────────────────────────────────────────

    /// Record this occurrence as either a local at some depth, or — when no
    /// enclosing scope binds the name — a global left for dynamic lookup.
    fn resolve_local(&mut self, id: usize, name: &Token<'s>) {
        for (depth, scope) in self.scopes.iter().rev().enumerate() {
            if scope.contains_key(name.lexeme) {
                debug!("Resolved '{}' at depth {}", name.lexeme, depth);

                self.interpreter.note_local(id, depth);

                return;
            }
        }

        debug!("Resolved '{}' as global", name.lexeme);
    }
}
