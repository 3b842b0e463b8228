//! Guest values.
//!
//! Immediates (nil, booleans, integers, floats, symbols) are stored inline;
//! everything else is a reference-counted heap object with interior
//! mutability, so copies of a `Value` alias the same object.

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;

use super::object::{Class, Object, Proc};

#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Symbol(Rc<str>),
    Str(Rc<StrObject>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashObject>>),
    Range(Rc<RangeObject>),
    Regexp(Rc<RegexpObject>),
    Proc(Rc<Proc>),
    Object(Rc<Object>),
    Class(Rc<Class>),
}

pub struct StrObject {
    pub value: RefCell<String>,
    pub frozen: Cell<bool>,
}

/// Insertion-ordered hash table keyed by [`Value::eql`].
#[derive(Default)]
pub struct HashObject {
    entries: Vec<(Value, Value)>,
    pub frozen: bool,
    /// Returned by `[]` for missing keys (`Hash.new(0)`).
    pub default: Option<Value>,
    /// Called with the hash and the key for missing keys (`Hash.new { ... }`).
    pub default_proc: Option<Rc<Proc>>,
}

pub struct RangeObject {
    pub start: Value,
    pub end: Value,
    pub exclude_end: bool,
}

pub struct RegexpObject {
    pub source: String,
    pub options: u32,
}

impl Value {
    pub fn string(value: impl Into<String>) -> Value {
        Value::Str(Rc::new(StrObject {
            value: RefCell::new(value.into()),
            frozen: Cell::new(false),
        }))
    }

    pub fn frozen_string(value: impl Into<String>) -> Value {
        let string = Value::string(value);
        if let Value::Str(object) = &string {
            object.frozen.set(true);
        }
        string
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(hash: HashObject) -> Value {
        Value::Hash(Rc::new(RefCell::new(hash)))
    }

    pub fn range(start: Value, end: Value, exclude_end: bool) -> Value {
        Value::Range(Rc::new(RangeObject {
            start,
            end,
            exclude_end,
        }))
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Same object (or same immediate).
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => Rc::ptr_eq(a, b),
            (Value::Regexp(a), Value::Regexp(b)) => Rc::ptr_eq(a, b),
            (Value::Proc(a), Value::Proc(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Hash-key equality: same type and same contents, objects by identity.
    pub fn eql(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => *a.value.borrow() == *b.value.borrow(),
            (Value::Array(a), Value::Array(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eql(y))
            }
            (Value::Hash(a), Value::Hash(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| other.eql(v)))
            }
            (Value::Range(a), Value::Range(b)) => {
                a.exclude_end == b.exclude_end && a.start.eql(&b.start) && a.end.eql(&b.end)
            }
            _ => self.identical(other),
        }
    }

    /// Contents of a string value.
    pub fn as_str(&self) -> Option<String> {
        match self {
            Value::Str(string) => Some(string.value.borrow().clone()),
            _ => None,
        }
    }
}

/// Structural equality, as used by tests and assertions.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.eql(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Symbol(name) => write!(f, ":{}", name),
            Value::Str(string) => write!(f, "{:?}", string.value.borrow()),
            Value::Array(elements) => f.debug_list().entries(elements.borrow().iter()).finish(),
            Value::Hash(hash) => f
                .debug_map()
                .entries(hash.borrow().iter().map(|(k, v)| (k.clone(), v.clone())))
                .finish(),
            Value::Range(range) => {
                let dots = if range.exclude_end { "..." } else { ".." };
                write!(f, "{:?}{}{:?}", range.start, dots, range.end)
            }
            Value::Regexp(regexp) => write!(f, "/{}/", regexp.source),
            Value::Proc(proc) => {
                f.write_str(if proc.is_lambda { "#<Proc (lambda)>" } else { "#<Proc>" })
            }
            Value::Object(object) => write!(f, "#<{}>", object.class.name),
            Value::Class(class) => f.write_str(&class.name),
        }
    }
}

impl HashObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty table answering missing keys with `default` or `default_proc`.
    pub fn with_defaults(default: Option<Value>, default_proc: Option<Rc<Proc>>) -> Self {
        Self {
            default,
            default_proc,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.eql(key))
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| k.eql(&key)) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k.eql(key))?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }
}

impl FromIterator<(Value, Value)> for HashObject {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut hash = HashObject::new();
        for (key, value) in iter {
            hash.insert(key, value);
        }
        hash
    }
}

pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "NaN".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{:.1}", x)
    } else {
        format!("{}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Nil.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(Value::Int(0).truthy());
        assert!(Value::string("").truthy());
    }

    #[test]
    fn test_eql_is_type_strict() {
        assert!(Value::Int(1).eql(&Value::Int(1)));
        assert!(!Value::Int(1).eql(&Value::Float(1.0)));
        assert!(Value::string("a").eql(&Value::string("a")));
        assert!(!Value::string("a").identical(&Value::string("a")));
    }

    #[test]
    fn test_hash_keys_by_contents() {
        let mut hash = HashObject::new();
        hash.insert(Value::string("k"), Value::Int(1));
        hash.insert(Value::string("k"), Value::Int(2));
        hash.insert(Value::symbol("k"), Value::Int(3));
        assert_eq!(hash.len(), 2);
        assert_eq!(hash.get(&Value::string("k")), Some(&Value::Int(2)));
        assert_eq!(hash.remove(&Value::symbol("k")), Some(Value::Int(3)));
        assert_eq!(hash.remove(&Value::symbol("k")), None);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(f64::INFINITY), "Infinity");
    }
}
