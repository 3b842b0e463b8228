//! `Array`, `Hash`, `Range` and the `Enumerable` methods they share.
//!
//! Iteration always works on a snapshot of the receiver: blocks may mutate
//! the collection they are iterating without invalidating a borrow.

use core::cell::RefCell;
use core::cmp::Ordering;
use std::rc::Rc;

use super::super::error::Unwind;
use super::super::frame::Args;
use super::super::machine::Machine;
use super::super::object::Proc;
use super::super::value::{HashObject, RangeObject, Value};
use super::{
    arity, compare, compare_strict, equal, inspect, int_arg, range_values, require_block, sort_values, to_s,
};

pub(super) const ENUMERABLE_METHODS: &[&str] = &[
    "map", "collect", "flat_map", "collect_concat", "select", "filter", "reject", "filter_map", "find",
    "detect", "find_index", "any?", "all?", "none?", "one?", "count", "reduce", "inject", "sum", "min", "max",
    "minmax", "min_by", "max_by", "sort", "sort_by", "group_by", "partition", "each_with_index",
    "each_with_object", "each_slice", "each_cons", "zip", "take", "drop", "take_while", "drop_while",
    "include?", "member?", "to_a", "entries", "first", "uniq", "tally", "to_h", "chunk_while",
];

pub(super) const ARRAY_METHODS: &[&str] = &[
    "size", "length", "empty?", "[]", "slice", "[]=", "at", "dig", "fetch", "last", "push", "append", "<<",
    "pop", "shift", "unshift", "prepend", "insert", "concat", "delete", "delete_at", "delete_if", "clear",
    "replace", "+", "-", "*", "&", "|", "==", "eql?", "<=>", "index", "rindex", "join", "reverse", "rotate",
    "compact", "flatten", "inspect", "to_s", "each", "each_index", "reverse_each", "values_at", "transpose",
    "sort!", "map!", "select!", "reject!", "uniq!", "compact!", "reverse!", "hash", "frozen?",
];

pub(super) const HASH_METHODS: &[&str] = &[
    "[]", "[]=", "store", "fetch", "key?", "has_key?", "include?", "member?", "value?", "has_value?", "key",
    "delete", "delete_if", "size", "length", "empty?", "keys", "values", "values_at", "each", "each_pair",
    "each_key", "each_value", "select", "filter", "reject", "merge", "merge!", "update", "transform_values",
    "transform_keys", "==", "inspect", "to_s", "dig", "invert", "default", "default=", "clear", "compact",
    "slice", "except", "sort", "any?", "count", "to_h", "to_a", "min_by", "max_by", "sum", "find",
];

pub(super) const RANGE_METHODS: &[&str] = &[
    "each", "reverse_each", "to_a", "entries", "first", "last", "min", "max", "size", "count", "include?",
    "member?", "cover?", "===", "begin", "end", "exclude_end?", "step", "inspect", "to_s", "==", "sum",
];

pub(super) fn is_enumerable(receiver: &Value) -> bool {
    matches!(receiver, Value::Array(_) | Value::Hash(_) | Value::Range(_))
}

fn yield1(m: &mut Machine<'_>, block: &Rc<Proc>, value: &Value) -> Result<Value, Unwind> {
    m.yield_values(block, vec![value.clone()])
}

fn pair(key: &Value, value: &Value) -> Value {
    Value::array(vec![key.clone(), value.clone()])
}

fn hash_pairs(hash: &RefCell<HashObject>) -> Vec<(Value, Value)> {
    hash.borrow().iter().cloned().collect()
}

fn snapshot(array: &RefCell<Vec<Value>>) -> Vec<Value> {
    array.borrow().clone()
}

/// Resolve a possibly negative index against `len`.
fn normalize(index: i64, len: usize) -> Option<usize> {
    let index = if index < 0 { index + len as i64 } else { index };
    (index >= 0).then_some(index as usize)
}

// === Enumerable ===

/// Methods every collection gets from its element list.
fn enumerable(
    m: &mut Machine<'_>,
    elements: Vec<Value>,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "map" | "collect" | "flat_map" | "collect_concat" => {
            let block = require_block(m, block, name)?;
            let mut out = Vec::with_capacity(elements.len());
            for element in &elements {
                let mapped = yield1(m, block, element)?;
                match (&mapped, name) {
                    (Value::Array(inner), "flat_map" | "collect_concat") => out.extend(snapshot(inner)),
                    _ => out.push(mapped),
                }
            }
            Value::array(out)
        }
        "select" | "filter" | "reject" => {
            let block = require_block(m, block, name)?;
            let keep = name != "reject";
            let mut out = Vec::new();
            for element in elements {
                if yield1(m, block, &element)?.truthy() == keep {
                    out.push(element);
                }
            }
            Value::array(out)
        }
        "filter_map" => {
            let block = require_block(m, block, name)?;
            let mut out = Vec::new();
            for element in &elements {
                let mapped = yield1(m, block, element)?;
                if mapped.truthy() {
                    out.push(mapped);
                }
            }
            Value::array(out)
        }
        "find" | "detect" => {
            let block = require_block(m, block, name)?;
            for element in elements {
                if yield1(m, block, &element)?.truthy() {
                    return Ok(Some(element));
                }
            }
            Value::Nil
        }
        "find_index" => {
            for (i, element) in elements.iter().enumerate() {
                let found = match (values.first(), block) {
                    (Some(target), _) => equal(m, element, target)?,
                    (None, Some(block)) => yield1(m, block, element)?.truthy(),
                    (None, None) => return Err(m.argument_count_error(0, "1")),
                };
                if found {
                    return Ok(Some(Value::Int(i as i64)));
                }
            }
            Value::Nil
        }
        "any?" | "all?" | "none?" | "one?" => {
            let mut hits = 0usize;
            for element in &elements {
                let hit = match (values.first(), block) {
                    (Some(pattern), _) => {
                        m.send(pattern.clone(), "===", Args::new([element.clone()]), None)?.truthy()
                    }
                    (None, Some(block)) => yield1(m, block, element)?.truthy(),
                    (None, None) => element.truthy(),
                };
                if hit {
                    hits += 1;
                }
                let decided = match name {
                    "any?" => hit,
                    "all?" => !hit,
                    "none?" => hit,
                    _ => hits > 1,
                };
                if decided {
                    break;
                }
            }
            Value::Bool(match name {
                "any?" => hits > 0,
                "all?" => hits == elements.len(),
                "none?" => hits == 0,
                _ => hits == 1,
            })
        }
        "count" => {
            let mut count = 0i64;
            for element in &elements {
                let counted = match (values.first(), block) {
                    (Some(target), _) => equal(m, element, target)?,
                    (None, Some(block)) => yield1(m, block, element)?.truthy(),
                    (None, None) => true,
                };
                if counted {
                    count += 1;
                }
            }
            Value::Int(count)
        }
        "reduce" | "inject" => reduce(m, elements, values, block)?,
        "sum" => {
            arity(m, values, 0, 1)?;
            let mut total = values.first().cloned().unwrap_or(Value::Int(0));
            for element in &elements {
                let term = match block {
                    Some(block) => yield1(m, block, element)?,
                    None => element.clone(),
                };
                total = m.send(total, "+", Args::new([term]), None)?;
            }
            total
        }
        "min" | "max" => {
            let wanted = if name == "min" { Ordering::Less } else { Ordering::Greater };
            let sorted = sort_with(m, elements, block)?;
            let picked = if wanted == Ordering::Less { sorted.first() } else { sorted.last() };
            match values.first() {
                Some(count) => {
                    let count = int_arg(m, count)?.max(0) as usize;
                    let taken: Vec<Value> = if wanted == Ordering::Less {
                        sorted.iter().take(count).cloned().collect()
                    } else {
                        sorted.iter().rev().take(count).cloned().collect()
                    };
                    Value::array(taken)
                }
                None => picked.cloned().unwrap_or(Value::Nil),
            }
        }
        "minmax" => {
            let sorted = sort_with(m, elements, block)?;
            let first = sorted.first().cloned().unwrap_or(Value::Nil);
            let last = sorted.last().cloned().unwrap_or(Value::Nil);
            Value::array(vec![first, last])
        }
        "sort" => Value::array(sort_with(m, elements, block)?),
        "sort_by" | "min_by" | "max_by" => {
            let block = require_block(m, block, name)?;
            let mut keyed = Vec::with_capacity(elements.len());
            for element in elements {
                let key = yield1(m, block, &element)?;
                keyed.push(Value::array(vec![key, element]));
            }
            let sorted = sort_values(m, keyed, &mut |m, a, b| {
                let (a, b) = (first_of(a), first_of(b));
                Ok(compare_strict(m, &a, &b)? != Ordering::Greater)
            })?;
            let mut sorted: Vec<Value> = sorted.iter().map(second_of).collect();
            match name {
                "sort_by" => Value::array(sorted),
                "min_by" => {
                    sorted.truncate(1);
                    sorted.pop().unwrap_or(Value::Nil)
                }
                _ => sorted.pop().unwrap_or(Value::Nil),
            }
        }
        "group_by" | "partition" | "tally" => {
            let mut groups = HashObject::new();
            for element in &elements {
                let key = match (name, block) {
                    ("tally", _) => element.clone(),
                    ("partition", Some(block)) => Value::Bool(yield1(m, block, element)?.truthy()),
                    (_, block) => {
                        let block = require_block(m, block, name)?;
                        yield1(m, block, element)?
                    }
                };
                if name == "tally" {
                    let count = match groups.get(&key) {
                        Some(Value::Int(n)) => n + 1,
                        _ => 1,
                    };
                    groups.insert(key, Value::Int(count));
                } else {
                    match groups.get(&key) {
                        Some(Value::Array(group)) => group.borrow_mut().push(element.clone()),
                        _ => groups.insert(key, Value::array(vec![element.clone()])),
                    }
                }
            }
            if name == "partition" {
                let side = |key: bool| groups.get(&Value::Bool(key)).cloned().unwrap_or_else(|| Value::array(Vec::new()));
                Value::array(vec![side(true), side(false)])
            } else {
                Value::hash(groups)
            }
        }
        "each_with_index" => match block {
            Some(block) => {
                for (i, element) in elements.iter().enumerate() {
                    m.yield_values(block, vec![element.clone(), Value::Int(i as i64)])?;
                }
                return Ok(None);
            }
            None => Value::array(
                elements
                    .iter()
                    .enumerate()
                    .map(|(i, element)| pair(element, &Value::Int(i as i64)))
                    .collect(),
            ),
        },
        "each_with_object" => {
            arity(m, values, 1, 1)?;
            let block = require_block(m, block, name)?;
            let memo = values[0].clone();
            for element in &elements {
                m.yield_values(block, vec![element.clone(), memo.clone()])?;
            }
            memo
        }
        "each_slice" | "each_cons" => {
            arity(m, values, 1, 1)?;
            let size = int_arg(m, &values[0])?;
            if size <= 0 {
                return Err(m.raise(&m.core.argument_error, "invalid size"));
            }
            let size = size as usize;
            let groups: Vec<Value> = if name == "each_slice" {
                elements.chunks(size).map(|chunk| Value::array(chunk.to_vec())).collect()
            } else {
                elements.windows(size).map(|window| Value::array(window.to_vec())).collect()
            };
            match block {
                Some(block) => {
                    for group in &groups {
                        yield1(m, block, group)?;
                    }
                    Value::Nil
                }
                None => Value::array(groups),
            }
        }
        "chunk_while" => {
            let block = require_block(m, block, name)?;
            let mut chunks: Vec<Vec<Value>> = Vec::new();
            for element in elements {
                let extend = match chunks.last().and_then(|chunk| chunk.last()) {
                    Some(previous) => m.yield_values(block, vec![previous.clone(), element.clone()])?.truthy(),
                    None => false,
                };
                match chunks.last_mut() {
                    Some(chunk) if extend => chunk.push(element),
                    _ => chunks.push(vec![element]),
                }
            }
            Value::array(chunks.into_iter().map(Value::array).collect())
        }
        "zip" => {
            let others: Vec<Vec<Value>> = values
                .iter()
                .map(|other| match other {
                    Value::Array(other) => snapshot(other),
                    _ => Vec::new(),
                })
                .collect();
            let zipped = elements
                .iter()
                .enumerate()
                .map(|(i, element)| {
                    let mut row = vec![element.clone()];
                    row.extend(others.iter().map(|other| other.get(i).cloned().unwrap_or(Value::Nil)));
                    Value::array(row)
                })
                .collect();
            Value::array(zipped)
        }
        "take" | "drop" => {
            arity(m, values, 1, 1)?;
            let count = int_arg(m, &values[0])?;
            if count < 0 {
                return Err(m.raise(&m.core.argument_error, format!("attempt to {} negative size", name)));
            }
            let count = (count as usize).min(elements.len());
            Value::array(if name == "take" { elements[..count].to_vec() } else { elements[count..].to_vec() })
        }
        "take_while" | "drop_while" => {
            let block = require_block(m, block, name)?;
            let mut split = elements.len();
            for (i, element) in elements.iter().enumerate() {
                if !yield1(m, block, element)?.truthy() {
                    split = i;
                    break;
                }
            }
            Value::array(if name == "take_while" { elements[..split].to_vec() } else { elements[split..].to_vec() })
        }
        "include?" | "member?" => {
            arity(m, values, 1, 1)?;
            let mut found = false;
            for element in &elements {
                if equal(m, element, &values[0])? {
                    found = true;
                    break;
                }
            }
            Value::Bool(found)
        }
        "to_a" | "entries" => Value::array(elements),
        "first" => match values.first() {
            Some(count) => {
                let count = int_arg(m, count)?.max(0) as usize;
                Value::array(elements.into_iter().take(count).collect())
            }
            None => elements.into_iter().next().unwrap_or(Value::Nil),
        },
        "uniq" => {
            let mut seen = HashObject::new();
            let mut out = Vec::new();
            for element in elements {
                let key = match block {
                    Some(block) => yield1(m, block, &element)?,
                    None => element.clone(),
                };
                if !seen.contains_key(&key) {
                    seen.insert(key, Value::Nil);
                    out.push(element);
                }
            }
            Value::array(out)
        }
        "to_h" => {
            let mut hash = HashObject::new();
            for element in &elements {
                let entry = match block {
                    Some(block) => yield1(m, block, element)?,
                    None => element.clone(),
                };
                let Value::Array(entry) = &entry else {
                    let class = m.core.class_of(&entry).name.clone();
                    return Err(m.type_error(format!("wrong element type {} (expected array)", class)));
                };
                let entry = snapshot(entry);
                if entry.len() != 2 {
                    return Err(m.raise(
                        &m.core.argument_error,
                        format!("wrong array length (expected 2, was {})", entry.len()),
                    ));
                }
                hash.insert(entry[0].clone(), entry[1].clone());
            }
            Value::hash(hash)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn first_of(value: &Value) -> Value {
    match value {
        Value::Array(elements) => elements.borrow().first().cloned().unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

fn second_of(value: &Value) -> Value {
    match value {
        Value::Array(elements) => elements.borrow().get(1).cloned().unwrap_or(Value::Nil),
        _ => Value::Nil,
    }
}

/// Sort by `<=>`, or by a comparator block returning an integer.
fn sort_with(m: &mut Machine<'_>, elements: Vec<Value>, block: Option<&Rc<Proc>>) -> Result<Vec<Value>, Unwind> {
    match block {
        Some(block) => sort_values(m, elements, &mut |m, a, b| {
            let order = m.yield_values(block, vec![a.clone(), b.clone()])?;
            match order {
                Value::Int(n) => Ok(n <= 0),
                other => {
                    let class = m.core.class_of(&other).name.clone();
                    Err(m.raise(&m.core.argument_error, format!("comparison of {} with 0 failed", class)))
                }
            }
        }),
        None => sort_values(m, elements, &mut |m, a, b| Ok(compare_strict(m, a, b)? != Ordering::Greater)),
    }
}

fn reduce(
    m: &mut Machine<'_>,
    elements: Vec<Value>,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Value, Unwind> {
    arity(m, values, 0, 2)?;
    let (initial, operator) = match (values, block) {
        ([], _) => (None, None),
        ([Value::Symbol(op)], None) => (None, Some(op.to_string())),
        ([initial], _) => (Some(initial.clone()), None),
        ([initial, Value::Symbol(op)], _) => (Some(initial.clone()), Some(op.to_string())),
        ([_, other], _) => {
            let class = m.core.class_of(other).name.clone();
            return Err(m.type_error(format!("{} is not a symbol nor a string", class)));
        }
        _ => return Err(m.argument_count_error(values.len(), "0..2")),
    };
    let mut elements = elements.into_iter();
    let Some(mut accumulator) = initial.or_else(|| elements.next()) else {
        return Ok(Value::Nil);
    };
    for element in elements {
        accumulator = match (&operator, block) {
            (Some(op), _) => m.send(accumulator, op, Args::new([element]), None)?,
            (None, Some(block)) => m.yield_values(block, vec![accumulator, element])?,
            (None, None) => return Err(m.raise(&m.core.local_jump_error, "no block given")),
        };
    }
    Ok(accumulator)
}

// === Array ===

pub(super) fn array_method(
    m: &mut Machine<'_>,
    receiver: &Value,
    array: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let len = array.borrow().len();
    let value = match name {
        "size" | "length" => Value::Int(len as i64),
        "empty?" => Value::Bool(len == 0),
        "[]" | "slice" => array_slice(m, &snapshot(array), values)?,
        "at" => {
            arity(m, values, 1, 1)?;
            let index = int_arg(m, &values[0])?;
            element_at(array, index)
        }
        "[]=" => {
            arity(m, values, 2, 2)?;
            let index = int_arg(m, &values[0])?;
            let Some(index) = normalize(index, len) else {
                return Err(m.raise(
                    &m.core.index_error,
                    format!("index {} too small for array; minimum: -{}", index, len),
                ));
            };
            let mut elements = array.borrow_mut();
            if index >= elements.len() {
                elements.resize(index + 1, Value::Nil);
            }
            elements[index] = values[1].clone();
            values[1].clone()
        }
        "fetch" => {
            arity(m, values, 1, 2)?;
            let index = int_arg(m, &values[0])?;
            match normalize(index, len).filter(|i| *i < len) {
                Some(i) => array.borrow()[i].clone(),
                None => match (values.get(1), block) {
                    (Some(default), _) => default.clone(),
                    (None, Some(block)) => yield1(m, block, &values[0])?,
                    (None, None) => {
                        return Err(m.raise(
                            &m.core.index_error,
                            format!("index {} outside of array bounds: {}...{}", index, -(len as i64), len),
                        ));
                    }
                },
            }
        }
        "dig" => {
            if values.is_empty() {
                return Err(m.argument_count_error(0, "1+"));
            }
            let index = int_arg(m, &values[0])?;
            let found = element_at(array, index);
            dig_rest(m, found, &values[1..])?
        }
        "last" => match values.first() {
            Some(count) => {
                let count = (int_arg(m, count)?.max(0) as usize).min(len);
                Value::array(array.borrow()[len - count..].to_vec())
            }
            None => array.borrow().last().cloned().unwrap_or(Value::Nil),
        },
        "push" | "append" | "<<" => {
            if name == "<<" {
                arity(m, values, 1, 1)?;
            }
            array.borrow_mut().extend(values.iter().cloned());
            receiver.clone()
        }
        "pop" | "shift" => {
            let mut elements = array.borrow_mut();
            match values.first() {
                Some(count) => {
                    let count = (int_arg(m, count)?.max(0) as usize).min(elements.len());
                    let taken: Vec<Value> = if name == "pop" {
                        let at = elements.len() - count;
                        elements.split_off(at)
                    } else {
                        elements.drain(..count).collect()
                    };
                    Value::array(taken)
                }
                None if elements.is_empty() => Value::Nil,
                None if name == "pop" => elements.pop().unwrap_or(Value::Nil),
                None => elements.remove(0),
            }
        }
        "unshift" | "prepend" => {
            array.borrow_mut().splice(0..0, values.iter().cloned());
            receiver.clone()
        }
        "insert" => {
            if values.is_empty() {
                return Err(m.argument_count_error(0, "1+"));
            }
            let index = int_arg(m, &values[0])?;
            let at = if index < 0 { normalize(index + 1, len) } else { Some(index as usize) };
            let Some(at) = at else {
                return Err(m.raise(&m.core.index_error, format!("index {} too small for array", index)));
            };
            let mut elements = array.borrow_mut();
            if at > elements.len() {
                elements.resize(at, Value::Nil);
            }
            elements.splice(at..at, values[1..].iter().cloned());
            receiver.clone()
        }
        "concat" => {
            for other in values {
                let Value::Array(other) = other else {
                    return Err(m.type_error("no implicit conversion into Array"));
                };
                let other = snapshot(other);
                array.borrow_mut().extend(other);
            }
            receiver.clone()
        }
        "replace" => {
            arity(m, values, 1, 1)?;
            let Value::Array(other) = &values[0] else {
                return Err(m.type_error("no implicit conversion into Array"));
            };
            let other = snapshot(other);
            *array.borrow_mut() = other;
            receiver.clone()
        }
        "delete" => {
            arity(m, values, 1, 1)?;
            let mut kept = Vec::with_capacity(len);
            let mut found = None;
            for element in snapshot(array) {
                if equal(m, &element, &values[0])? {
                    found = Some(element);
                } else {
                    kept.push(element);
                }
            }
            *array.borrow_mut() = kept;
            found.unwrap_or(Value::Nil)
        }
        "delete_at" => {
            arity(m, values, 1, 1)?;
            let index = int_arg(m, &values[0])?;
            match normalize(index, len).filter(|i| *i < len) {
                Some(i) => array.borrow_mut().remove(i),
                None => Value::Nil,
            }
        }
        "delete_if" | "reject!" | "select!" => {
            let block = require_block(m, block, name)?;
            let keep_truthy = name == "select!";
            let mut kept = Vec::with_capacity(len);
            for element in snapshot(array) {
                if yield1(m, block, &element)?.truthy() == keep_truthy {
                    kept.push(element);
                }
            }
            let changed = kept.len() != len;
            *array.borrow_mut() = kept;
            if changed || name == "delete_if" { receiver.clone() } else { Value::Nil }
        }
        "clear" => {
            array.borrow_mut().clear();
            receiver.clone()
        }
        "+" => {
            arity(m, values, 1, 1)?;
            let Value::Array(other) = &values[0] else {
                let class = m.core.class_of(&values[0]).name.clone();
                return Err(m.type_error(format!("no implicit conversion of {} into Array", class)));
            };
            let mut joined = snapshot(array);
            joined.extend(snapshot(other));
            Value::array(joined)
        }
        "-" | "&" | "|" => {
            arity(m, values, 1, 1)?;
            let Value::Array(other) = &values[0] else {
                let class = m.core.class_of(&values[0]).name.clone();
                return Err(m.type_error(format!("no implicit conversion of {} into Array", class)));
            };
            let other = snapshot(other);
            let mut index = HashObject::new();
            for element in &other {
                index.insert(element.clone(), Value::Nil);
            }
            let elements = snapshot(array);
            let out: Vec<Value> = match name {
                "-" => elements.into_iter().filter(|e| !index.contains_key(e)).collect(),
                "&" => dedupe(elements.into_iter().filter(|e| index.contains_key(e))),
                _ => dedupe(elements.into_iter().chain(other)),
            };
            Value::array(out)
        }
        "*" => {
            arity(m, values, 1, 1)?;
            match &values[0] {
                Value::Str(_) => return array_method(m, receiver, array, "join", values, block),
                count => {
                    let count = int_arg(m, count)?;
                    if count < 0 {
                        return Err(m.raise(&m.core.argument_error, "negative argument"));
                    }
                    let items = snapshot(array);
                    let mut out = Vec::new();
                    for _ in 0..count {
                        out.extend(items.iter().cloned());
                    }
                    Value::array(out)
                }
            }
        }
        "==" | "eql?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(matches!(&values[0], Value::Array(_)) && equal(m, receiver, &values[0])?)
        }
        "<=>" => {
            arity(m, values, 1, 1)?;
            match compare(m, receiver, &values[0])? {
                Some(ordering) => Value::Int(ordering as i64),
                None => Value::Nil,
            }
        }
        "index" | "rindex" => {
            let mut elements: Vec<(usize, Value)> = snapshot(array).into_iter().enumerate().collect();
            if name == "rindex" {
                elements.reverse();
            }
            let mut found = Value::Nil;
            for (i, element) in elements {
                let hit = match (values.first(), block) {
                    (Some(target), _) => equal(m, &element, target)?,
                    (None, Some(block)) => yield1(m, block, &element)?.truthy(),
                    (None, None) => return Err(m.argument_count_error(0, "1")),
                };
                if hit {
                    found = Value::Int(i as i64);
                    break;
                }
            }
            found
        }
        "join" => {
            arity(m, values, 0, 1)?;
            let separator = match values.first() {
                Some(Value::Nil) | None => String::new(),
                Some(separator) => to_s(m, separator)?,
            };
            Value::string(join(m, &snapshot(array), &separator, 0)?)
        }
        "reverse" => Value::array(snapshot(array).into_iter().rev().collect()),
        "reverse!" => {
            array.borrow_mut().reverse();
            receiver.clone()
        }
        "rotate" => {
            arity(m, values, 0, 1)?;
            let count = match values.first() {
                Some(count) => int_arg(m, count)?,
                None => 1,
            };
            let mut elements = snapshot(array);
            if !elements.is_empty() {
                let shift = count.rem_euclid(elements.len() as i64) as usize;
                elements.rotate_left(shift);
            }
            Value::array(elements)
        }
        "compact" => Value::array(snapshot(array).into_iter().filter(|e| !e.is_nil()).collect()),
        "compact!" => {
            array.borrow_mut().retain(|e| !e.is_nil());
            if array.borrow().len() == len { Value::Nil } else { receiver.clone() }
        }
        "flatten" => {
            arity(m, values, 0, 1)?;
            let depth = match values.first() {
                Some(depth) => int_arg(m, depth)?,
                None => -1,
            };
            let mut out = Vec::with_capacity(len);
            flatten_into(&snapshot(array), depth, &mut out);
            Value::array(out)
        }
        "inspect" | "to_s" => Value::string(inspect(m, receiver)?),
        "hash" => Value::Int(len as i64),
        "each" => {
            let Some(block) = block else {
                return Ok(Some(receiver.clone()));
            };
            let mut i = 0;
            loop {
                let Some(element) = array.borrow().get(i).cloned() else {
                    break;
                };
                yield1(m, block, &element)?;
                i += 1;
            }
            receiver.clone()
        }
        "each_index" | "reverse_each" => {
            let block = require_block(m, block, name)?;
            let elements = snapshot(array);
            if name == "each_index" {
                for i in 0..elements.len() {
                    yield1(m, block, &Value::Int(i as i64))?;
                }
            } else {
                for element in elements.iter().rev() {
                    yield1(m, block, element)?;
                }
            }
            receiver.clone()
        }
        "each_with_index" => {
            let elements = snapshot(array);
            match enumerable(m, elements, name, values, block)? {
                Some(value) => value,
                None => receiver.clone(),
            }
        }
        "values_at" => {
            let mut out = Vec::with_capacity(values.len());
            for index in values {
                let index = int_arg(m, index)?;
                out.push(element_at(array, index));
            }
            Value::array(out)
        }
        "transpose" => {
            let rows: Vec<Vec<Value>> = snapshot(array)
                .iter()
                .map(|row| match row {
                    Value::Array(row) => snapshot(row),
                    _ => Vec::new(),
                })
                .collect();
            let width = rows.first().map_or(0, Vec::len);
            if rows.iter().any(|row| row.len() != width) {
                return Err(m.raise(&m.core.index_error, "element size differs"));
            }
            let columns = (0..width)
                .map(|column| Value::array(rows.iter().map(|row| row[column].clone()).collect()))
                .collect();
            Value::array(columns)
        }
        "sort!" | "map!" | "uniq!" => {
            let plain = name.trim_end_matches('!');
            let Some(result) = enumerable(m, snapshot(array), plain, values, block)? else {
                return Ok(None);
            };
            if let Value::Array(result) = result {
                let result = snapshot(&result);
                *array.borrow_mut() = result;
            }
            receiver.clone()
        }
        _ => return enumerable(m, snapshot(array), name, values, block),
    };
    Ok(Some(value))
}

fn element_at(array: &RefCell<Vec<Value>>, index: i64) -> Value {
    let elements = array.borrow();
    normalize(index, elements.len())
        .and_then(|i| elements.get(i).cloned())
        .unwrap_or(Value::Nil)
}

fn array_slice(m: &Machine<'_>, elements: &[Value], values: &[Value]) -> Result<Value, Unwind> {
    arity(m, values, 1, 2)?;
    let len = elements.len();
    let window = |start: i64, count: i64| -> Value {
        match normalize(start, len) {
            Some(start) if start <= len && count >= 0 => {
                let end = (start + count as usize).min(len);
                Value::array(elements[start..end].to_vec())
            }
            _ => Value::Nil,
        }
    };
    Ok(match (&values[0], values.get(1)) {
        (Value::Range(range), None) => {
            let start = match &range.start {
                Value::Nil => 0,
                other => int_arg(m, other)?,
            };
            let end = match &range.end {
                Value::Nil => len as i64,
                other => {
                    let end = int_arg(m, other)?;
                    let end = if end < 0 { end + len as i64 } else { end };
                    if range.exclude_end { end } else { end + 1 }
                }
            };
            let start_index = if start < 0 { start + len as i64 } else { start };
            window(start, (end - start_index).max(0))
        }
        (index, None) => {
            let index = int_arg(m, index)?;
            normalize(index, len)
                .and_then(|i| elements.get(i).cloned())
                .unwrap_or(Value::Nil)
        }
        (start, Some(count)) => {
            let (start, count) = (int_arg(m, start)?, int_arg(m, count)?);
            window(start, count)
        }
    })
}

fn dedupe(elements: impl Iterator<Item = Value>) -> Vec<Value> {
    let mut seen = HashObject::new();
    let mut out = Vec::new();
    for element in elements {
        if !seen.contains_key(&element) {
            seen.insert(element.clone(), Value::Nil);
            out.push(element);
        }
    }
    out
}

fn flatten_into(elements: &[Value], depth: i64, out: &mut Vec<Value>) {
    for element in elements {
        match element {
            Value::Array(inner) if depth != 0 => flatten_into(&snapshot(inner), depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

fn join(m: &mut Machine<'_>, elements: &[Value], separator: &str, depth: usize) -> Result<String, Unwind> {
    if depth > 64 {
        return Err(m.raise(&m.core.argument_error, "recursive array join"));
    }
    let mut parts = Vec::with_capacity(elements.len());
    for element in elements {
        parts.push(match element {
            Value::Array(inner) => join(m, &snapshot(inner), separator, depth + 1)?,
            other => to_s(m, other)?,
        });
    }
    Ok(parts.join(separator))
}

/// Continue `dig` into whatever `found` is.
fn dig_rest(m: &mut Machine<'_>, found: Value, rest: &[Value]) -> Result<Value, Unwind> {
    if rest.is_empty() || found.is_nil() {
        return Ok(found);
    }
    m.send(found, "dig", Args::new(rest.iter().cloned()), None)
}

// === Hash ===

fn check_hash_frozen(m: &mut Machine<'_>, receiver: &Value, hash: &RefCell<HashObject>) -> Result<(), Unwind> {
    if hash.borrow().frozen {
        let description = inspect(m, receiver)?;
        return Err(m.raise(
            &m.core.frozen_error,
            format!("can't modify frozen Hash: {}", description),
        ));
    }
    Ok(())
}

/// `Hash#[]`: the stored value, else the default (or the default proc's
/// result).
fn hash_lookup(m: &mut Machine<'_>, receiver: &Value, hash: &RefCell<HashObject>, key: &Value) -> Result<Value, Unwind> {
    let (found, default, default_proc) = {
        let hash = hash.borrow();
        (hash.get(key).cloned(), hash.default.clone(), hash.default_proc.clone())
    };
    match (found, default_proc) {
        (Some(value), _) => Ok(value),
        (None, Some(proc)) => m.yield_values(&proc, vec![receiver.clone(), key.clone()]),
        (None, None) => Ok(default.unwrap_or(Value::Nil)),
    }
}

pub(super) fn hash_method(
    m: &mut Machine<'_>,
    receiver: &Value,
    hash: &Rc<RefCell<HashObject>>,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "[]" => {
            arity(m, values, 1, 1)?;
            hash_lookup(m, receiver, hash, &values[0])?
        }
        "[]=" | "store" => {
            arity(m, values, 2, 2)?;
            check_hash_frozen(m, receiver, hash)?;
            let key = match &values[0] {
                Value::Str(string) if !string.frozen.get() => {
                    Value::frozen_string(string.value.borrow().clone())
                }
                key => key.clone(),
            };
            hash.borrow_mut().insert(key, values[1].clone());
            values[1].clone()
        }
        "fetch" => {
            arity(m, values, 1, 2)?;
            let found = hash.borrow().get(&values[0]).cloned();
            match (found, values.get(1), block) {
                (Some(value), _, _) => value,
                (None, Some(default), _) => default.clone(),
                (None, None, Some(block)) => yield1(m, block, &values[0])?,
                (None, None, None) => {
                    let key = inspect(m, &values[0])?;
                    return Err(m.raise(&m.core.key_error, format!("key not found: {}", key)));
                }
            }
        }
        "key?" | "has_key?" | "include?" | "member?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(hash.borrow().contains_key(&values[0]))
        }
        "value?" | "has_value?" => {
            arity(m, values, 1, 1)?;
            let mut found = false;
            for (_, value) in hash_pairs(hash) {
                if equal(m, &value, &values[0])? {
                    found = true;
                    break;
                }
            }
            Value::Bool(found)
        }
        "key" => {
            arity(m, values, 1, 1)?;
            let mut found = Value::Nil;
            for (key, value) in hash_pairs(hash) {
                if equal(m, &value, &values[0])? {
                    found = key;
                    break;
                }
            }
            found
        }
        "delete" => {
            arity(m, values, 1, 1)?;
            check_hash_frozen(m, receiver, hash)?;
            let removed = hash.borrow_mut().remove(&values[0]);
            match (removed, block) {
                (Some(value), _) => value,
                (None, Some(block)) => yield1(m, block, &values[0])?,
                (None, None) => Value::Nil,
            }
        }
        "delete_if" => {
            let block = require_block(m, block, name)?;
            check_hash_frozen(m, receiver, hash)?;
            for (key, value) in hash_pairs(hash) {
                if m.yield_values(block, vec![key.clone(), value])?.truthy() {
                    hash.borrow_mut().remove(&key);
                }
            }
            receiver.clone()
        }
        "size" | "length" => Value::Int(hash.borrow().len() as i64),
        "count" if values.is_empty() && block.is_none() => Value::Int(hash.borrow().len() as i64),
        "empty?" => Value::Bool(hash.borrow().is_empty()),
        "keys" => Value::array(hash.borrow().keys().cloned().collect()),
        "values" => Value::array(hash.borrow().iter().map(|(_, v)| v.clone()).collect()),
        "values_at" => {
            let mut out = Vec::with_capacity(values.len());
            for key in values {
                out.push(hash_lookup(m, receiver, hash, key)?);
            }
            Value::array(out)
        }
        "each" | "each_pair" => {
            let Some(block) = block else {
                return Ok(Some(receiver.clone()));
            };
            for (key, value) in hash_pairs(hash) {
                yield1(m, block, &pair(&key, &value))?;
            }
            receiver.clone()
        }
        "each_key" | "each_value" => {
            let block = require_block(m, block, name)?;
            for (key, value) in hash_pairs(hash) {
                yield1(m, block, if name == "each_key" { &key } else { &value })?;
            }
            receiver.clone()
        }
        "select" | "filter" | "reject" => {
            let block = require_block(m, block, name)?;
            let keep = name != "reject";
            let mut out = HashObject::new();
            for (key, value) in hash_pairs(hash) {
                if m.yield_values(block, vec![key.clone(), value.clone()])?.truthy() == keep {
                    out.insert(key, value);
                }
            }
            Value::hash(out)
        }
        "merge" | "merge!" | "update" => {
            let in_place = name != "merge";
            if in_place {
                check_hash_frozen(m, receiver, hash)?;
            }
            let mut merged: HashObject = hash_pairs(hash).into_iter().collect();
            for other in values {
                let Value::Hash(other) = other else {
                    let class = m.core.class_of(other).name.clone();
                    return Err(m.type_error(format!("no implicit conversion of {} into Hash", class)));
                };
                for (key, value) in hash_pairs(other) {
                    let value = match (merged.get(&key).cloned(), block) {
                        (Some(old), Some(block)) => m.yield_values(block, vec![key.clone(), old, value])?,
                        _ => value,
                    };
                    merged.insert(key, value);
                }
            }
            if in_place {
                let entries: Vec<(Value, Value)> = merged.iter().cloned().collect();
                let mut target = hash.borrow_mut();
                for (key, value) in entries {
                    target.insert(key, value);
                }
                receiver.clone()
            } else {
                Value::hash(merged)
            }
        }
        "transform_values" | "transform_keys" => {
            let block = require_block(m, block, name)?;
            let mut out = HashObject::new();
            for (key, value) in hash_pairs(hash) {
                if name == "transform_values" {
                    let value = yield1(m, block, &value)?;
                    out.insert(key, value);
                } else {
                    let key = yield1(m, block, &key)?;
                    out.insert(key, value);
                }
            }
            Value::hash(out)
        }
        "==" => {
            arity(m, values, 1, 1)?;
            let Value::Hash(other) = &values[0] else {
                return Ok(Some(Value::Bool(false)));
            };
            let (mine, theirs) = (hash_pairs(hash), other.borrow().len());
            let mut same = mine.len() == theirs;
            for (key, value) in mine {
                if !same {
                    break;
                }
                let counterpart = other.borrow().get(&key).cloned();
                same = match counterpart {
                    Some(counterpart) => equal(m, &value, &counterpart)?,
                    None => false,
                };
            }
            Value::Bool(same)
        }
        "inspect" | "to_s" => Value::string(inspect(m, receiver)?),
        "dig" => {
            if values.is_empty() {
                return Err(m.argument_count_error(0, "1+"));
            }
            let found = hash_lookup(m, receiver, hash, &values[0])?;
            dig_rest(m, found, &values[1..])?
        }
        "invert" => Value::hash(hash_pairs(hash).into_iter().map(|(k, v)| (v, k)).collect()),
        "default" => hash.borrow().default.clone().unwrap_or(Value::Nil),
        "default=" => {
            arity(m, values, 1, 1)?;
            hash.borrow_mut().default = Some(values[0].clone());
            values[0].clone()
        }
        "clear" => {
            check_hash_frozen(m, receiver, hash)?;
            let mut target = hash.borrow_mut();
            let (default, default_proc) = (target.default.take(), target.default_proc.take());
            *target = HashObject::with_defaults(default, default_proc);
            drop(target);
            receiver.clone()
        }
        "compact" => Value::hash(hash_pairs(hash).into_iter().filter(|(_, v)| !v.is_nil()).collect()),
        "slice" | "except" => {
            let keep = name == "slice";
            let selected: HashObject = hash_pairs(hash)
                .into_iter()
                .filter(|(key, _)| values.iter().any(|wanted| wanted.eql(key)) == keep)
                .collect();
            Value::hash(selected)
        }
        "to_h" if block.is_none() => Value::hash(hash_pairs(hash).into_iter().collect()),
        "to_a" => Value::array(hash_pairs(hash).iter().map(|(k, v)| pair(k, v)).collect()),
        "any?" if values.is_empty() && block.is_none() => Value::Bool(!hash.borrow().is_empty()),
        _ => {
            let pairs = hash_pairs(hash).iter().map(|(k, v)| pair(k, v)).collect();
            return enumerable(m, pairs, name, values, block).map(|found| match (found, name) {
                (None, "each_with_index") => Some(receiver.clone()),
                (found, _) => found,
            });
        }
    };
    Ok(Some(value))
}

// === Range ===

pub(super) fn range_method(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let Value::Range(range) = receiver else {
        return Ok(None);
    };
    let value = match name {
        "begin" => range.start.clone(),
        "end" => range.end.clone(),
        "exclude_end?" => Value::Bool(range.exclude_end),
        "==" => {
            arity(m, values, 1, 1)?;
            Value::Bool(receiver.eql(&values[0]))
        }
        "inspect" => Value::string(inspect(m, receiver)?),
        "to_s" => Value::string(to_s(m, receiver)?),
        "include?" | "member?" | "cover?" | "===" => {
            arity(m, values, 1, 1)?;
            Value::Bool(covers(m, range, &values[0])?)
        }
        "each" => {
            let Some(block) = block else {
                return Ok(Some(receiver.clone()));
            };
            match (&range.start, &range.end) {
                (Value::Int(start), Value::Nil) => {
                    let mut i = *start;
                    loop {
                        m.tick()?;
                        yield1(m, block, &Value::Int(i))?;
                        i = i.saturating_add(1);
                    }
                }
                _ => {
                    for element in range_values(m, receiver)? {
                        m.tick()?;
                        yield1(m, block, &element)?;
                    }
                }
            }
            receiver.clone()
        }
        "reverse_each" => {
            let block = require_block(m, block, name)?;
            for element in range_values(m, receiver)?.iter().rev() {
                yield1(m, block, element)?;
            }
            receiver.clone()
        }
        "step" => {
            arity(m, values, 1, 1)?;
            let step = int_arg(m, &values[0])?;
            if step <= 0 {
                return Err(m.raise(&m.core.argument_error, "step can't be negative or zero"));
            }
            let stepped: Vec<Value> = range_values(m, receiver)?.into_iter().step_by(step as usize).collect();
            match block {
                Some(block) => {
                    for element in &stepped {
                        yield1(m, block, element)?;
                    }
                    receiver.clone()
                }
                None => Value::array(stepped),
            }
        }
        "first" => match (values.first(), &range.start) {
            (None, start) => start.clone(),
            (Some(count), Value::Int(start)) if range.end.is_nil() => {
                let count = int_arg(m, count)?.max(0);
                Value::array((0..count).map(|i| Value::Int(start.saturating_add(i))).collect())
            }
            (Some(_), _) => {
                let elements = range_values(m, receiver)?;
                return enumerable(m, elements, name, values, block);
            }
        },
        "last" => match values.first() {
            None => range.end.clone(),
            Some(count) => {
                let count = int_arg(m, count)?.max(0) as usize;
                let elements = range_values(m, receiver)?;
                let skip = elements.len().saturating_sub(count);
                Value::array(elements[skip..].to_vec())
            }
        },
        "min" | "max" if block.is_none() && values.is_empty() => match (&range.start, &range.end) {
            (Value::Int(start), Value::Int(end)) => {
                let end = if range.exclude_end { end - 1 } else { *end };
                if end < *start {
                    Value::Nil
                } else if name == "min" {
                    Value::Int(*start)
                } else {
                    Value::Int(end)
                }
            }
            _ => {
                let elements = range_values(m, receiver)?;
                return enumerable(m, elements, name, values, block);
            }
        },
        "size" | "count" if block.is_none() && values.is_empty() => match (&range.start, &range.end) {
            (Value::Int(start), Value::Int(end)) => {
                let end = if range.exclude_end { *end } else { end.saturating_add(1) };
                Value::Int((end - start).max(0))
            }
            (Value::Int(_), Value::Nil) => Value::Float(f64::INFINITY),
            _ if name == "count" => Value::Int(range_values(m, receiver)?.len() as i64),
            _ => Value::Nil,
        },
        "sum" if block.is_none() && values.is_empty() => match (&range.start, &range.end) {
            (Value::Int(start), Value::Int(end)) => {
                let end = if range.exclude_end { end - 1 } else { *end };
                if end < *start {
                    Value::Int(0)
                } else {
                    let (start, end) = (i128::from(*start), i128::from(end));
                    let total = (start + end) * (end - start + 1) / 2;
                    match i64::try_from(total) {
                        Ok(total) => Value::Int(total),
                        Err(_) => Value::Float(total as f64),
                    }
                }
            }
            _ => {
                let elements = range_values(m, receiver)?;
                return enumerable(m, elements, name, values, block);
            }
        },
        _ => {
            if range.end.is_nil() {
                return Err(m.raise(&m.core.range_error, "cannot convert endless range to an array"));
            }
            let elements = range_values(m, receiver)?;
            return enumerable(m, elements, name, values, block)
                .map(|found| found.or_else(|| (name == "each_with_index").then(|| receiver.clone())));
        }
    };
    Ok(Some(value))
}

/// `Range#===`: bounds checks without enumerating.
fn covers(m: &mut Machine<'_>, range: &RangeObject, value: &Value) -> Result<bool, Unwind> {
    if !range.start.is_nil() {
        match compare(m, &range.start, value)? {
            Some(Ordering::Less | Ordering::Equal) => {}
            _ => return Ok(false),
        }
    }
    if !range.end.is_nil() {
        match compare(m, value, &range.end)? {
            Some(Ordering::Less) => {}
            Some(Ordering::Equal) if !range.exclude_end => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_negative_indices() {
        assert_eq!(normalize(-1, 3), Some(2));
        assert_eq!(normalize(-4, 3), None);
        assert_eq!(normalize(5, 3), Some(5));
    }

    #[test]
    fn test_flatten_depth() {
        let nested = vec![
            Value::Int(1),
            Value::array(vec![Value::Int(2), Value::array(vec![Value::Int(3)])]),
        ];
        let mut all = Vec::new();
        flatten_into(&nested, -1, &mut all);
        assert_eq!(all, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let mut one = Vec::new();
        flatten_into(&nested, 1, &mut one);
        assert_eq!(one, vec![Value::Int(1), Value::Int(2), Value::array(vec![Value::Int(3)])]);
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let elements = vec![Value::Int(2), Value::Int(1), Value::Int(2), Value::string("a"), Value::string("a")];
        assert_eq!(
            dedupe(elements.into_iter()),
            vec![Value::Int(2), Value::Int(1), Value::string("a")]
        );
    }
}
