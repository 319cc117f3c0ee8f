//! One‑pass streaming lexer.
//!
//! Transforms a byte slice into a sequence of [`Token`]s, skipping
//! whitespace and `//` comments, and emitting exactly one `EOF` token at
//! the end.  Implemented as a `FusedIterator` yielding
//! `Result<Token, LoxError>`, so the driver can report every lex error in
//! a file while still collecting the valid tokens around them.
//!
//! Tokens borrow their lexemes from the source buffer (zero copies); the
//! buffer must outlive every token, and — because the AST borrows tokens —
//! the whole program run.

use crate::error::{LoxError, Result};
use crate::token::{Token, TokenType};
use log::debug;
use memchr::memchr;
use phf::phf_map;
use std::iter::FusedIterator;

// Compile‑time perfect hash over the reserved words.
static KEYWORDS: phf::Map<&'static [u8], TokenType> = phf_map! {
    b"and"    => TokenType::AND,
    b"class"  => TokenType::CLASS,
    b"else"   => TokenType::ELSE,
    b"false"  => TokenType::FALSE,
    b"fun"    => TokenType::FUN,
    b"for"    => TokenType::FOR,
    b"if"     => TokenType::IF,
    b"nil"    => TokenType::NIL,
    b"or"     => TokenType::OR,
    b"print"  => TokenType::PRINT,
    b"return" => TokenType::RETURN,
    b"super"  => TokenType::SUPER,
    b"this"   => TokenType::THIS,
    b"true"   => TokenType::TRUE,
    b"var"    => TokenType::VAR,
    b"while"  => TokenType::WHILE,
};

/// A single‑pass **scanner / lexer**.  The lifetime `'a` ties every emitted
/// token's `lexeme` slice back to the original source buffer.
pub struct Scanner<'a> {
    src: &'a [u8],
    start: usize, // index of the *first* byte of the current lexeme
    curr: usize,  // index *one past* the last byte examined
    line: usize,  // 1‑based line counter (\n increments)
}

impl<'a> Scanner<'a> {
    /// Create a new lexer over `src`.  The buffer must be valid UTF‑8.
    #[inline]
    pub fn new(src: &'a [u8]) -> Self {
        debug!("Scanner created over {} bytes", src.len());

        Self {
            src,
            start: 0,
            curr: 0,
            line: 1,
        }
    }

    // ───────────────────────── primitive helpers ────────────────────────

    #[inline(always)]
    fn is_at_end(&self) -> bool {
        self.curr >= self.src.len()
    }

    /// Advance one byte and return it.  Callers guard with [`is_at_end`].
    #[inline(always)]
    fn advance(&mut self) -> u8 {
        let b = self.src[self.curr];
        self.curr += 1;
        b
    }

    /// Peek at the current byte without consuming it.  Returns `0` past
    /// EOF to avoid branching at call sites.
    #[inline(always)]
    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.src[self.curr]
        }
    }

    /// Peek one byte beyond [`peek`].  Safe at EOF.
    #[inline(always)]
    fn peek_next(&self) -> u8 {
        if self.curr + 1 >= self.src.len() {
            0
        } else {
            self.src[self.curr + 1]
        }
    }

    /// Conditionally consume a byte **iff** it matches `expected`.
    #[inline(always)]
    fn match_byte(&mut self, expected: u8) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    /// The current lexeme as a `&str` slice of the source.
    #[inline(always)]
    fn lexeme(&self) -> &'a str {
        // SAFETY: the source buffer is valid UTF-8 (guaranteed by the
        // caller of `new`) and lexeme boundaries fall on ASCII bytes.
        unsafe { std::str::from_utf8_unchecked(&self.src[self.start..self.curr]) }
    }

    // ──────────────────────────── core lexing ───────────────────────────

    /// Scan a *single* lexeme starting at `self.curr`.  `Ok(Some(kind))`
    /// for a real token, `Ok(None)` for whitespace/comments.
    fn scan_token(&mut self) -> Result<Option<TokenType>> {
        let b = self.advance();

        let tt = match b {
            b'(' => TokenType::LEFT_PAREN,
            b')' => TokenType::RIGHT_PAREN,
            b'{' => TokenType::LEFT_BRACE,
            b'}' => TokenType::RIGHT_BRACE,
            b',' => TokenType::COMMA,
            b'.' => TokenType::DOT,
            b'-' => TokenType::MINUS,
            b'+' => TokenType::PLUS,
            b';' => TokenType::SEMICOLON,
            b'*' => TokenType::STAR,

            b'!' => {
                if self.match_byte(b'=') {
                    TokenType::BANG_EQUAL
                } else {
                    TokenType::BANG
                }
            }

            b'=' => {
                if self.match_byte(b'=') {
                    TokenType::EQUAL_EQUAL
                } else {
                    TokenType::EQUAL
                }
            }

            b'<' => {
                if self.match_byte(b'=') {
                    TokenType::LESS_EQUAL
                } else {
                    TokenType::LESS
                }
            }

            b'>' => {
                if self.match_byte(b'=') {
                    TokenType::GREATER_EQUAL
                } else {
                    TokenType::GREATER
                }
            }

            b' ' | b'\r' | b'\t' => return Ok(None),

            b'\n' => {
                self.line += 1;

                return Ok(None);
            }

            b'/' => {
                if self.match_byte(b'/') {
                    // Bulk-skip the comment to the next newline.
                    if let Some(pos) = memchr(b'\n', &self.src[self.curr..]) {
                        self.curr += pos;
                    } else {
                        self.curr = self.src.len();
                    }

                    return Ok(None);
                }

                TokenType::SLASH
            }

            b'"' => self.scan_string()?,

            b'0'..=b'9' => self.scan_number(),

            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.scan_identifier(),

            _ => {
                return Err(LoxError::lex(
                    self.line,
                    format!("Unexpected character: {}", b as char),
                ));
            }
        };

        Ok(Some(tt))
    }

    /// Double‑quoted string literal; multi‑line strings are allowed.
    fn scan_string(&mut self) -> Result<TokenType> {
        while !self.is_at_end() && self.peek() != b'"' {
            if self.advance() == b'\n' {
                self.line += 1;
            }
        }

        if self.is_at_end() {
            return Err(LoxError::lex(self.line, "Unterminated string."));
        }

        self.advance(); // closing quote

        let slice = &self.src[self.start + 1..self.curr - 1];

        // SAFETY: sub-slice of the UTF-8 source, delimited by ASCII quotes.
        let s = unsafe { std::str::from_utf8_unchecked(slice) };

        Ok(TokenType::STRING(s.to_owned()))
    }

    /// Numeric literal (`123`, `3.14`).  Fractions are optional.
    fn scan_number(&mut self) -> TokenType {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        if self.peek() == b'.' && self.peek_next().is_ascii_digit() {
            self.advance(); // consume "."

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        // Never fails: the lexeme is all checked digits.
        let n: f64 = self.lexeme().parse::<f64>().unwrap_or(0.0);

        TokenType::NUMBER(n)
    }

    /// Identifier or reserved word.
    fn scan_identifier(&mut self) -> TokenType {
        while {
            let c = self.peek();
            c.is_ascii_alphanumeric() || c == b'_'
        } {
            self.advance();
        }

        KEYWORDS
            .get(&self.src[self.start..self.curr])
            .cloned()
            .unwrap_or(TokenType::IDENTIFIER)
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.curr <= self.src.len() {
            // EOF guard – emit exactly one EOF then terminate.
            if self.curr == self.src.len() {
                self.curr += 1; // ensure fused semantics

                return Some(Ok(Token::new(TokenType::EOF, "", self.line)));
            }

            self.start = self.curr;

            match self.scan_token() {
                Err(e) => return Some(Err(e)),

                Ok(Some(tt)) => {
                    debug!("Scanned token ({:?}) on line {}", tt, self.line);

                    return Some(Ok(Token::new(tt, self.lexeme(), self.line)));
                }

                // Whitespace / comment → keep scanning.
                Ok(None) => {}
            }
        }

        None // already yielded EOF
    }
}

impl<'a> FusedIterator for Scanner<'a> {}
