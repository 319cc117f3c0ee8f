/*!
Recursive‑descent parser over an immutable token slice.

Grammar (EBNF — condensed, Crafting Interpreters dialect)
---------------------------------------------------------

```text
program        → declaration* EOF ;
declaration    → classDecl | funDecl | varDecl | statement ;
classDecl      → "class" IDENT ( "<" IDENT )? "{" function* "}" ;
funDecl        → "fun" function ;
function       → IDENT "(" parameters? ")" block ;
varDecl        → "var" IDENT ( "=" expression )? ";" ;
statement      → exprStmt | printStmt | returnStmt | whileStmt
               | forStmt | ifStmt | block ;
exprStmt       → expression ";" ;
printStmt      → "print" expression ";" ;
returnStmt     → "return" expression? ";" ;
whileStmt      → "while" "(" expression ")" statement ;
forStmt        → "for" "(" ( varDecl | exprStmt | ";" )
                 expression? ";" expression? ")" statement ;
ifStmt         → "if" "(" expression ")" statement ( "else" statement )? ;
block          → "{" declaration* "}" ;
parameters     → IDENT ( "," IDENT )* ;
expression     → assignment ;
assignment     → ( call "." )? IDENT "=" assignment | logic_or ;
logic_or       → logic_and ( "or" logic_and )* ;
logic_and      → equality  ( "and" equality )* ;
equality       → comparison ( ( "!=" | "==" ) comparison )* ;
comparison     → term ( ( ">" | ">=" | "<" | "<=" ) term )* ;
term           → factor ( ( "-" | "+" ) factor )* ;
factor         → unary ( ( "/" | "*" ) unary )* ;
unary          → ( "!" | "-" ) unary | call ;
call           → primary ( "(" arguments? ")" | "." IDENT )* ;
arguments      → expression ( "," expression )* ;
primary        → NUMBER | STRING | "true" | "false" | "nil" | "this"
               | "super" "." IDENT | IDENT | "(" expression ")" ;
```

`for` has no AST node of its own: it is desugared at parse time into an
initializer block wrapping a `while` whose body appends the increment.

The parser also stamps every `Variable`/`Assign`/`This`/`Super` node with
a unique id; the resolver records lexical distances against these ids.
Because an interpreter keeps those distances for as long as it lives,
ids must stay unique across every program handed to one interpreter: a
session feeding it several submissions chains parsers with
[`Parser::with_first_id`] and [`Parser::next_id`].
*/

use std::rc::Rc;

use crate::ast::{Expr, FunctionDecl, LiteralValue, Stmt};
use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};

use log::{debug, info};

/// Hard ceiling on parameters and call arguments.
const MAX_ARITY: usize = 255;

/// Stand-in token when the parser is handed an empty slice; lets `peek`
/// behave as if the input ended immediately instead of indexing past it.
const EOF_FALLBACK: Token<'static> = Token {
    token_type: TokenType::EOF,
    lexeme: "",
    line: 0,
};

/// Top‑level parser over an immutable slice of tokens.
pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    current: usize,
    next_id: usize,
}

impl<'a> Parser<'a> {
    /// Construct a new parser stamping ids from zero.
    pub fn new(tokens: &'a [Token<'a>]) -> Self {
        Self::with_first_id(tokens, 0)
    }

    /// Construct a parser whose id stamping resumes after `first_id`.
    /// Required when several programs feed one interpreter: its recorded
    /// binding distances are keyed by id, so a later submission reusing an
    /// id would inherit a stale distance from an earlier one.
    pub fn with_first_id(tokens: &'a [Token<'a>], first_id: usize) -> Self {
        info!(
            "Parser created with {} tokens, ids from {}",
            tokens.len(),
            first_id
        );

        Self {
            tokens,
            current: 0,
            next_id: first_id,
        }
    }

    /// High-water mark of issued ids; pass it to [`Parser::with_first_id`]
    /// for the next submission in the same session.
    pub fn next_id(&self) -> usize {
        self.next_id
    }

    // ───────────────────────── public API ─────────────────────────

    /// Parse an entire program and return its statement list.
    pub fn parse(&mut self) -> Result<Vec<Stmt<'a>>> {
        info!("Beginning parse phase");

        let mut statements: Vec<Stmt<'a>> = Vec::new();

        while !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        Ok(statements)
    }

    /// Parse a single expression (used by the `parse` CLI subcommand).
    pub fn parse_expression(&mut self) -> Result<Expr<'a>> {
        self.expression()
    }

    // ──────────────────────── declaration rules ───────────────────

    fn declaration(&mut self) -> Result<Stmt<'a>> {
        debug!("Entering declaration");

        let result = if self.matches(TokenType::CLASS) {
            self.class_declaration()
        } else if self.matches(TokenType::FUN) {
            self.function("function").map(Stmt::Function)
        } else if self.matches(TokenType::VAR) {
            self.var_declaration()
        } else {
            self.statement()
        };

        if result.is_err() {
            self.synchronize();
        }

        result
    }

    fn class_declaration(&mut self) -> Result<Stmt<'a>> {
        let name = self.consume(TokenType::IDENTIFIER, "Expected class name")?;

        let superclass = if self.matches(TokenType::LESS) {
            let super_name = self.consume(TokenType::IDENTIFIER, "Expected superclass name")?;

            Some(Expr::Variable {
                name: super_name,
                id: self.fresh_id(),
            })
        } else {
            None
        };

        self.consume(TokenType::LEFT_BRACE, "Expected '{' before class body")?;

        let mut methods = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            methods.push(self.function("method")?);
        }

        self.consume(TokenType::RIGHT_BRACE, "Expected '}' after class body")?;

        Ok(Stmt::Class {
            name,
            superclass,
            methods,
        })
    }

    /// Shared by `fun` declarations and class methods:
    /// `IDENT "(" parameters? ")" block`.
    fn function(&mut self, kind: &str) -> Result<Rc<FunctionDecl<'a>>> {
        let name = self.consume(TokenType::IDENTIFIER, format!("Expected {} name", kind))?;

        self.consume(
            TokenType::LEFT_PAREN,
            format!("Expected '(' after {} name", kind),
        )?;

        let mut params: Vec<&'a Token<'a>> = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if params.len() >= MAX_ARITY {
                    return Err(LoxError::parse(
                        name.line,
                        format!("Cannot have more than {} parameters", MAX_ARITY),
                    ));
                }

                params.push(self.consume(TokenType::IDENTIFIER, "Expected parameter name")?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after parameters")?;
        self.consume(
            TokenType::LEFT_BRACE,
            format!("Expected '{{' before {} body", kind),
        )?;

        let body = self.block_statements()?;

        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body: body.into(),
        }))
    }

    fn var_declaration(&mut self) -> Result<Stmt<'a>> {
        let name = self.consume(TokenType::IDENTIFIER, "Expected variable name")?;

        let initializer = if self.matches(TokenType::EQUAL) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::SEMICOLON,
            "Expected ';' after variable declaration",
        )?;

        Ok(Stmt::Var { name, initializer })
    }

    // ──────────────────────── statement rules ─────────────────────

    fn statement(&mut self) -> Result<Stmt<'a>> {
        debug!("Entering statement");

        if self.matches(TokenType::PRINT) {
            return self.print_statement();
        }

        if self.matches(TokenType::RETURN) {
            return self.return_statement();
        }

        if self.matches(TokenType::WHILE) {
            return self.while_statement();
        }

        if self.matches(TokenType::FOR) {
            return self.for_statement();
        }

        if self.matches(TokenType::IF) {
            return self.if_statement();
        }

        if self.matches(TokenType::LEFT_BRACE) {
            return Ok(Stmt::Block(self.block_statements()?));
        }

        self.expression_statement()
    }

    fn print_statement(&mut self) -> Result<Stmt<'a>> {
        let value = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expected ';' after value")?;

        Ok(Stmt::Print(value))
    }

    fn return_statement(&mut self) -> Result<Stmt<'a>> {
        let keyword = self.previous();

        let value = if self.check(TokenType::SEMICOLON) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(TokenType::SEMICOLON, "Expected ';' after return value")?;

        Ok(Stmt::Return { keyword, value })
    }

    fn while_statement(&mut self) -> Result<Stmt<'a>> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'while'")?;

        let condition = self.expression()?;

        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after condition")?;

        let body = Box::new(self.statement()?);

        Ok(Stmt::While { condition, body })
    }

    /// `for` desugars into `{ init; while (cond) { body; incr; } }`.
    fn for_statement(&mut self) -> Result<Stmt<'a>> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'for'")?;

        let initializer = if self.matches(TokenType::SEMICOLON) {
            None
        } else if self.matches(TokenType::VAR) {
            Some(self.var_declaration()?)
        } else {
            Some(self.expression_statement()?)
        };

        let condition = if self.check(TokenType::SEMICOLON) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(TokenType::SEMICOLON, "Expected ';' after loop condition")?;

        let increment = if self.check(TokenType::RIGHT_PAREN) {
            None
        } else {
            Some(self.expression()?)
        };

        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after for clauses")?;

        let mut body = self.statement()?;

        if let Some(increment) = increment {
            body = Stmt::Block(vec![body, Stmt::Expression(increment)]);
        }

        let condition = condition.unwrap_or(Expr::Literal(LiteralValue::True));

        body = Stmt::While {
            condition,
            body: Box::new(body),
        };

        if let Some(initializer) = initializer {
            body = Stmt::Block(vec![initializer, body]);
        }

        Ok(body)
    }

    fn if_statement(&mut self) -> Result<Stmt<'a>> {
        self.consume(TokenType::LEFT_PAREN, "Expected '(' after 'if'")?;

        let condition = self.expression()?;

        self.consume(TokenType::RIGHT_PAREN, "Expected ')' after if condition")?;

        let then_branch = Box::new(self.statement()?);

        let else_branch = if self.matches(TokenType::ELSE) {
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

    /// The statements of a `{ … }` block, with the `{` already consumed.
    fn block_statements(&mut self) -> Result<Vec<Stmt<'a>>> {
        let mut statements = Vec::new();

        while !self.check(TokenType::RIGHT_BRACE) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RIGHT_BRACE, "Expected '}' after block")?;

        Ok(statements)
    }

    fn expression_statement(&mut self) -> Result<Stmt<'a>> {
        let expr = self.expression()?;

        self.consume(TokenType::SEMICOLON, "Expected ';' after expression")?;

        Ok(Stmt::Expression(expr))
    }

    // ──────────────────────── expression rules ────────────────────

    fn expression(&mut self) -> Result<Expr<'a>> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr<'a>> {
        let expr = self.logic_or()?;

        if self.matches(TokenType::EQUAL) {
            let equals = self.previous();
            let value = Box::new(self.assignment()?);

            return match expr {
                Expr::Variable { name, .. } => Ok(Expr::Assign {
                    name,
                    value,
                    id: self.fresh_id(),
                }),

                Expr::Get { object, name } => Ok(Expr::Set {
                    object,
                    name,
                    value,
                }),

                _ => Err(LoxError::parse(equals.line, "Invalid assignment target")),
            };
        }

        Ok(expr)
    }

    fn logic_or(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.logic_and()?;

        while self.matches(TokenType::OR) {
            let operator = self.previous();
            let right = self.logic_and()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn logic_and(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.equality()?;

        while self.matches(TokenType::AND) {
            let operator = self.previous();
            let right = self.equality()?;

            expr = Expr::Logical {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn equality(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.comparison()?;

        while self.matches(TokenType::BANG_EQUAL) || self.matches(TokenType::EQUAL_EQUAL) {
            let operator = self.previous();
            let right = self.comparison()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.term()?;

        while self.matches(TokenType::GREATER)
            || self.matches(TokenType::GREATER_EQUAL)
            || self.matches(TokenType::LESS)
            || self.matches(TokenType::LESS_EQUAL)
        {
            let operator = self.previous();
            let right = self.term()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.factor()?;

        while self.matches(TokenType::MINUS) || self.matches(TokenType::PLUS) {
            let operator = self.previous();
            let right = self.factor()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn factor(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.unary()?;

        while self.matches(TokenType::SLASH) || self.matches(TokenType::STAR) {
            let operator = self.previous();
            let right = self.unary()?;

            expr = Expr::Binary {
                left: Box::new(expr),
                operator,
                right: Box::new(right),
            };
        }

        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr<'a>> {
        if self.matches(TokenType::BANG) || self.matches(TokenType::MINUS) {
            let operator = self.previous();
            let right = self.unary()?;

            return Ok(Expr::Unary {
                operator,
                right: Box::new(right),
            });
        }

        self.call()
    }

    fn call(&mut self) -> Result<Expr<'a>> {
        let mut expr = self.primary()?;

        loop {
            if self.matches(TokenType::LEFT_PAREN) {
                expr = self.finish_call(expr)?;
            } else if self.matches(TokenType::DOT) {
                let name =
                    self.consume(TokenType::IDENTIFIER, "Expected property name after '.'")?;

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

    fn finish_call(&mut self, callee: Expr<'a>) -> Result<Expr<'a>> {
        let mut arguments = Vec::new();

        if !self.check(TokenType::RIGHT_PAREN) {
            loop {
                if arguments.len() >= MAX_ARITY {
                    return Err(LoxError::parse(
                        self.peek().line,
                        format!("Cannot have more than {} arguments", MAX_ARITY),
                    ));
                }

                arguments.push(self.expression()?);

                if !self.matches(TokenType::COMMA) {
                    break;
                }
            }
        }

        let paren = self.consume(TokenType::RIGHT_PAREN, "Expected ')' after arguments")?;

        Ok(Expr::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }

    fn primary(&mut self) -> Result<Expr<'a>> {
        let token = self.advance();

        match &token.token_type {
            TokenType::NUMBER(n) => Ok(Expr::Literal(LiteralValue::Number(*n))),

            TokenType::STRING(s) => Ok(Expr::Literal(LiteralValue::Str(s.clone()))),

            TokenType::TRUE => Ok(Expr::Literal(LiteralValue::True)),

            TokenType::FALSE => Ok(Expr::Literal(LiteralValue::False)),

            TokenType::NIL => Ok(Expr::Literal(LiteralValue::Nil)),

            TokenType::THIS => Ok(Expr::This {
                keyword: token,
                id: self.fresh_id(),
            }),

            TokenType::SUPER => {
                self.consume(TokenType::DOT, "Expected '.' after 'super'")?;

                let method =
                    self.consume(TokenType::IDENTIFIER, "Expected superclass method name")?;

                Ok(Expr::Super {
                    keyword: token,
                    method,
                    id: self.fresh_id(),
                })
            }

            TokenType::IDENTIFIER => Ok(Expr::Variable {
                name: token,
                id: self.fresh_id(),
            }),

            TokenType::LEFT_PAREN => {
                let expr = self.expression()?;

                self.consume(TokenType::RIGHT_PAREN, "Expected ')' after expression")?;

                Ok(Expr::Grouping(Box::new(expr)))
            }

            _ => Err(LoxError::parse(
                token.line,
                format!("Expected expression, found '{}'", token.lexeme),
            )),
        }
    }

    // ───────────────────────── token helpers ──────────────────────

    /// Stamp the next unique expression id.
    fn fresh_id(&mut self) -> usize {
        self.next_id += 1;

        self.next_id
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::EOF
    }

    /// The token at the cursor, clamped to the final (EOF) token.
    fn peek(&self) -> &'a Token<'a> {
        self.tokens
            .get(self.current)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF_FALLBACK)
    }

    fn previous(&self) -> &'a Token<'a> {
        &self.tokens[self.current - 1]
    }

    fn advance(&mut self) -> &'a Token<'a> {
        let token = self.peek();

        if !self.is_at_end() {
            self.current += 1;
        }

        token
    }

    fn check(&self, tt: TokenType) -> bool {
        self.peek().token_type == tt
    }

    fn matches(&mut self, tt: TokenType) -> bool {
        if self.check(tt) {
            self.advance();

            true
        } else {
            false
        }
    }

    fn consume<S: Into<String>>(&mut self, tt: TokenType, msg: S) -> Result<&'a Token<'a>> {
        if self.check(tt) {
            Ok(self.advance())
        } else {
            debug!("Consume failed at token {:?}", self.peek());

            Err(LoxError::parse(self.peek().line, msg.into()))
        }
    }

    /// Panic‑mode recovery: discard tokens up to the next statement
    /// boundary so one syntax error does not cascade.
    fn synchronize(&mut self) {
        while !self.is_at_end() {
            if self.previous_is(TokenType::SEMICOLON) {
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

                _ => {
                    self.advance();
                }
            }
        }
    }

    fn previous_is(&self, tt: TokenType) -> bool {
        self.current > 0 && self.previous().token_type == tt
    }
}
