//! Methods implemented by the machine itself.
//!
//! Builtins are the fallback of method dispatch: a user method with the same
//! name, anywhere in the receiver's ancestors, always wins. Each receiver
//! kind has its own table; whatever it does not handle falls through to the
//! `Kernel` methods every object has.

use std::rc::Rc;

use super::error::Unwind;
use super::frame::Args;
use super::machine::Machine;
use super::object::Proc;
use super::value::{HashObject, Value};

mod collections;
mod format;
mod kernel;
mod numeric;
mod string;

pub(super) use format::{inspect, to_s};

#[cfg(test)]
mod builtins_test;

/// Run builtin `name`; `Ok(None)` when the receiver has no such builtin.
pub(super) fn call(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    args: Args,
    block: Option<Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let values = args.positional(false);
    let block = block.as_ref();
    let found = match receiver {
        Value::Nil => kernel::nil_method(m, name, &values)?,
        Value::Bool(b) => kernel::bool_method(*b, name, &values),
        Value::Int(_) | Value::Float(_) => numeric::call(m, receiver, name, &values, block)?,
        Value::Str(_) | Value::Symbol(_) => string::call(m, receiver, name, &values, block)?,
        Value::Array(array) => collections::array_method(m, receiver, array, name, &values, block)?,
        Value::Hash(hash) => collections::hash_method(m, receiver, hash, name, &values, block)?,
        Value::Range(_) => collections::range_method(m, receiver, name, &values, block)?,
        Value::Proc(proc) => kernel::proc_method(m, proc, name, &args)?,
        Value::Class(class) => kernel::class_method(m, class, name, &values, &args, block)?,
        Value::Object(_) => kernel::object_method(m, receiver, name, &values)?,
        Value::Regexp(_) => None,
    };
    match found {
        Some(value) => Ok(Some(value)),
        None => kernel::call(m, receiver, name, &values, &args, block),
    }
}

/// Whether [`call`] would handle `name` for `receiver`.
pub(super) fn has_builtin(m: &Machine<'_>, receiver: &Value, name: &str) -> bool {
    let own: &[&str] = match receiver {
        Value::Nil => kernel::NIL_METHODS,
        Value::Bool(_) => kernel::BOOL_METHODS,
        Value::Int(_) | Value::Float(_) => numeric::METHODS,
        Value::Str(_) => string::STRING_METHODS,
        Value::Symbol(_) => string::SYMBOL_METHODS,
        Value::Array(_) => collections::ARRAY_METHODS,
        Value::Hash(_) => collections::HASH_METHODS,
        Value::Range(_) => collections::RANGE_METHODS,
        Value::Proc(_) => kernel::PROC_METHODS,
        Value::Class(_) => kernel::CLASS_METHODS,
        Value::Object(_) => {
            if kernel::is_exception(m, receiver) {
                kernel::EXCEPTION_METHODS
            } else if kernel::is_comparable(m, receiver) {
                kernel::COMPARABLE_METHODS
            } else {
                &[]
            }
        }
        Value::Regexp(_) => &[],
    };
    own.contains(&name)
        || (collections::is_enumerable(receiver) && collections::ENUMERABLE_METHODS.contains(&name))
        || kernel::KERNEL_METHODS.contains(&name)
}

// === Helpers shared by the tables ===

/// Raise `ArgumentError` unless `min <= values.len() <= max`.
fn arity(m: &Machine<'_>, values: &[Value], min: usize, max: usize) -> Result<(), Unwind> {
    let given = values.len();
    if given >= min && given <= max {
        return Ok(());
    }
    let expected = if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("{}+", min)
    } else {
        format!("{}..{}", min, max)
    };
    Err(m.argument_count_error(given, &expected))
}

fn require_block<'b>(m: &Machine<'_>, block: Option<&'b Rc<Proc>>, name: &str) -> Result<&'b Rc<Proc>, Unwind> {
    block.ok_or_else(|| {
        m.raise(
            &m.core.local_jump_error,
            format!("no block given ({})", name),
        )
    })
}

fn int_arg(m: &Machine<'_>, value: &Value) -> Result<i64, Unwind> {
    match value {
        Value::Int(n) => Ok(*n),
        Value::Float(x) => Ok(*x as i64),
        other => {
            let class = m.core.class_of(other).name.clone();
            Err(m.type_error(format!("no implicit conversion of {} into Integer", class)))
        }
    }
}

/// A method name given as a symbol or string.
fn name_arg(m: &Machine<'_>, value: &Value) -> Result<String, Unwind> {
    match value {
        Value::Symbol(name) => Ok(name.to_string()),
        Value::Str(string) => Ok(string.value.borrow().clone()),
        other => Err(m.type_error(format!("{:?} is not a symbol nor a string", other))),
    }
}

pub(super) fn ivar_get(receiver: &Value, name: &str) -> Value {
    let found = match receiver {
        Value::Object(object) => object.ivars.borrow().get(name).cloned(),
        Value::Class(class) => class.ivars.borrow().get(name).cloned(),
        _ => None,
    };
    found.unwrap_or(Value::Nil)
}

pub(super) fn ivar_set(m: &mut Machine<'_>, receiver: &Value, name: &str, value: Value) -> Result<(), Unwind> {
    match receiver {
        Value::Object(object) if object.frozen.get() => {
            let description = inspect(m, receiver)?;
            Err(m.raise(
                &m.core.frozen_error,
                format!("can't modify frozen {}: {}", object.class.name, description),
            ))
        }
        Value::Object(object) => {
            object.ivars.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        Value::Class(class) => {
            class.ivars.borrow_mut().insert(name.to_string(), value);
            Ok(())
        }
        other => {
            let class = m.core.class_of(other).name.clone();
            Err(m.raise(
                &m.core.frozen_error,
                format!("can't modify frozen {}", class),
            ))
        }
    }
}

/// `dup`: a new unfrozen container with the same elements.
pub(super) fn shallow_copy(value: &Value) -> Value {
    match value {
        Value::Str(string) => Value::string(string.value.borrow().clone()),
        Value::Array(elements) => Value::array(elements.borrow().clone()),
        Value::Hash(hash) => {
            let copy: HashObject = hash.borrow().iter().cloned().collect();
            Value::hash(copy)
        }
        Value::Object(object) => {
            let copy = super::object::Object::new(object.class.clone());
            *copy.ivars.borrow_mut() = object.ivars.borrow().clone();
            Value::Object(copy)
        }
        other => other.clone(),
    }
}

/// The elements of an integer range.
pub(super) fn range_values(m: &mut Machine<'_>, range: &Value) -> Result<Vec<Value>, Unwind> {
    let Value::Range(range) = range else {
        return Ok(vec![range.clone()]);
    };
    match (&range.start, &range.end) {
        (Value::Int(start), Value::Int(end)) => {
            let end = if range.exclude_end { *end } else { end.saturating_add(1) };
            Ok((*start..end).map(Value::Int).collect())
        }
        (Value::Str(start), Value::Str(end)) => {
            let (start, end) = (start.value.borrow().clone(), end.value.borrow().clone());
            let mut out = Vec::new();
            let mut current = start;
            while current.len() <= end.len() {
                if current == end {
                    if !range.exclude_end {
                        out.push(Value::string(current.clone()));
                    }
                    break;
                }
                out.push(Value::string(current.clone()));
                current = string::successor(&current);
                m.tick()?;
            }
            Ok(out)
        }
        (start, _) => {
            let class = m.core.class_of(start).name.clone();
            Err(m.type_error(format!("can't iterate from {}", class)))
        }
    }
}

/// `==` with user overrides honored for objects.
fn equal(m: &mut Machine<'_>, a: &Value, b: &Value) -> Result<bool, Unwind> {
    match (a, b) {
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => Ok(*x as f64 == *y),
        (Value::Float(x), Value::Float(y)) => Ok(x == y),
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (x, y) in x.iter().zip(y.iter()) {
                if !equal(m, x, y)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Object(_), _) => {
            let class = m.core.dispatch_class(a);
            if class.find_method("==").is_some() {
                let result = m.send(a.clone(), "==", Args::new([b.clone()]), None)?;
                Ok(result.truthy())
            } else {
                Ok(a.identical(b))
            }
        }
        _ => Ok(a.eql(b)),
    }
}

/// `<=>` as an ordering; `None` when the values are not comparable.
fn compare(m: &mut Machine<'_>, a: &Value, b: &Value) -> Result<Option<core::cmp::Ordering>, Unwind> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            Ok(numeric::as_f64(a).partial_cmp(&numeric::as_f64(b)))
        }
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.value.borrow().cmp(&*y.value.borrow()))),
        (Value::Array(x), Value::Array(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            for (x, y) in x.iter().zip(y.iter()) {
                match compare(m, x, y)? {
                    Some(core::cmp::Ordering::Equal) => {}
                    other => return Ok(other),
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => {
            if !m.responds_to(a, "<=>") || matches!(a, Value::Symbol(_) | Value::Nil | Value::Bool(_)) {
                return Ok(None);
            }
            let result = m.send(a.clone(), "<=>", Args::new([b.clone()]), None)?;
            Ok(match result {
                Value::Int(n) => Some(n.cmp(&0)),
                _ => None,
            })
        }
    }
}

/// `compare`, raising `ArgumentError` when the values are not comparable.
fn compare_strict(m: &mut Machine<'_>, a: &Value, b: &Value) -> Result<core::cmp::Ordering, Unwind> {
    match compare(m, a, b)? {
        Some(ordering) => Ok(ordering),
        None => {
            let (left, right) = (m.core.class_of(a).name.clone(), m.core.class_of(b).name.clone());
            Err(m.raise(
                &m.core.argument_error,
                format!("comparison of {} with {} failed", left, right),
            ))
        }
    }
}

/// Stable merge sort with a comparison that may raise.
fn sort_values<F>(m: &mut Machine<'_>, values: Vec<Value>, less_or_equal: &mut F) -> Result<Vec<Value>, Unwind>
where
    F: FnMut(&mut Machine<'_>, &Value, &Value) -> Result<bool, Unwind>,
{
    if values.len() <= 1 {
        return Ok(values);
    }
    let mut left = values;
    let right = left.split_off(left.len() / 2);
    let left = sort_values(m, left, less_or_equal)?;
    let right = sort_values(m, right, less_or_equal)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        if less_or_equal(m, a, b)? {
            merged.extend(left.next());
        } else {
            merged.extend(right.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    Ok(merged)
}
