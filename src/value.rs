//! Runtime value representation and the coercion rules shared by every
//! operator in the interpreter.
//!
//! Values form a ladder of variant tags (`nil < bool < number < string <
//! callable < class < instance`).  When a binary operation meets two
//! different variants, the lower‑tagged operand is promoted *toward* the
//! higher‑tagged operand's type and the operation is retried on the
//! same‑variant pair.  Promotion is partial: where no promotion exists the
//! operands are simply unequal (for `==`) or the operation is a type error.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callable::{LoxClass, LoxFunction, LoxInstance, NativeFn};

/// Position of a variant on the coercion ladder.  Native and user functions
/// share the `Callable` rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tag {
    Nil = 0,
    Bool = 1,
    Number = 2,
    String = 3,
    Callable = 4,
    Class = 5,
    Instance = 6,
}

/// A first‑class Lox value.
///
/// Heap objects (functions, classes, instances) are held by `Rc`; cloning a
/// `Value` never deep‑copies an object, it only bumps a reference count.
/// The longest‑lived holder of a handle determines when the object dies.
#[derive(Clone)]
pub enum Value<'s> {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Native(Rc<NativeFn<'s>>),
    Function(Rc<LoxFunction<'s>>),
    Class(Rc<LoxClass<'s>>),
    Instance(Rc<RefCell<LoxInstance<'s>>>),
}

impl<'s> Value<'s> {
    pub fn tag(&self) -> Tag {
        match self {
            Value::Nil => Tag::Nil,
            Value::Bool(_) => Tag::Bool,
            Value::Number(_) => Tag::Number,
            Value::String(_) => Tag::String,
            Value::Native(_) | Value::Function(_) => Tag::Callable,
            Value::Class(_) => Tag::Class,
            Value::Instance(_) => Tag::Instance,
        }
    }

    /// Truthiness: `nil` is false, booleans are themselves, `0` and the
    /// empty string are false, every object is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Promote `self` to the variant designated by `target`, if such a
    /// promotion exists.  Only upward promotions are defined:
    /// bool → number, bool → string, number → string.
    fn promote(&self, target: Tag) -> Option<Value<'s>> {
        if self.tag() == target {
            return Some(self.clone());
        }

        match (self, target) {
            (Value::Bool(b), Tag::Number) => Some(Value::Number(if *b { 1.0 } else { 0.0 })),

            (Value::Bool(b), Tag::String) => Some(Value::String(b.to_string())),

            (Value::Number(n), Tag::String) => Some(Value::String(number_text(*n))),

            _ => None,
        }
    }

    /// Bring two operands onto the same ladder rung, promoting the lower
    /// one toward the higher.  `None` when no promotion is defined.
    pub fn coerced(a: &Value<'s>, b: &Value<'s>) -> Option<(Value<'s>, Value<'s>)> {
        if a.tag() == b.tag() {
            return Some((a.clone(), b.clone()));
        }

        if a.tag() < b.tag() {
            a.promote(b.tag()).map(|a| (a, b.clone()))
        } else {
            b.promote(a.tag()).map(|b| (a.clone(), b))
        }
    }

    /// Language‑level equality: structural within a variant, coercing
    /// across variants where a promotion exists, `false` otherwise.
    /// Commutative by construction (coercion direction depends only on
    /// the tag order, never on operand position).
    pub fn loose_eq(&self, other: &Value<'s>) -> bool {
        match Value::coerced(self, other) {
            Some((a, b)) => a == b,
            None => false,
        }
    }
}

/// Strict same‑variant equality.  Scalars compare structurally; heap
/// objects compare by identity (two handles to the same object).
impl<'s> PartialEq for Value<'s> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Canonical text form of a Lox number: integral values drop the
/// fractional part (`3`, not `3.0`), everything else uses the shortest
/// round‑trippable decimal.
pub fn number_text(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let mut buf: itoa::Buffer = itoa::Buffer::new();

        buf.format(n as i64).to_owned()
    } else {
        n.to_string()
    }
}

impl<'s> fmt::Display for Value<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),

            Value::Bool(b) => write!(f, "{}", b),

            Value::Number(n) => write!(f, "{}", number_text(*n)),

            Value::String(s) => write!(f, "{}", s),

            Value::Native(n) => write!(f, "<fun {}>", n.name),

            Value::Function(fun) => write!(f, "<fun {}>", fun.name()),

            Value::Class(c) => write!(f, "<class {}>", c.name()),

            Value::Instance(i) => write!(f, "<instance {}>", i.borrow().class_name()),
        }
    }
}

/// Shallow `Debug`: instances can reference themselves through their own
/// fields, so the derived recursive form would never terminate.
impl<'s> fmt::Debug for Value<'s> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_table() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(Value::Number(-2.5).is_truthy());
        assert!(!Value::String(String::new()).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
    }

    #[test]
    fn bool_promotes_to_number() {
        assert!(Value::Bool(true).loose_eq(&Value::Number(1.0)));
        assert!(!Value::Bool(true).loose_eq(&Value::Number(2.0)));
        assert!(Value::Bool(false).loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn number_promotes_to_string() {
        assert!(Value::Number(3.0).loose_eq(&Value::String("3".into())));
        assert!(Value::Number(3.14).loose_eq(&Value::String("3.14".into())));
        assert!(!Value::Number(3.0).loose_eq(&Value::String("3.5".into())));
    }

    #[test]
    fn nil_never_coerces() {
        assert!(!Value::Nil.loose_eq(&Value::Number(0.0)));
        assert!(!Value::Nil.loose_eq(&Value::Bool(false)));
        assert!(!Value::Nil.loose_eq(&Value::String(String::new())));
        assert!(Value::Nil.loose_eq(&Value::Nil));
    }

    #[test]
    fn loose_eq_is_commutative() {
        let samples: Vec<Value> = vec![
            Value::Nil,
            Value::Bool(true),
            Value::Bool(false),
            Value::Number(0.0),
            Value::Number(1.0),
            Value::Number(3.14),
            Value::String(String::new()),
            Value::String("true".into()),
            Value::String("1".into()),
        ];

        for a in &samples {
            for b in &samples {
                assert_eq!(
                    a.loose_eq(b),
                    b.loose_eq(a),
                    "loose_eq not commutative for {:?} and {:?}",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn number_text_forms() {
        assert_eq!(number_text(3.0), "3");
        assert_eq!(number_text(-3.0), "-3");
        assert_eq!(number_text(3.25), "3.25");
    }
}
