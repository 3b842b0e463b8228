//! `String` and `Symbol`.

use core::cmp::Ordering;
use std::rc::Rc;

use super::super::error::Unwind;
use super::super::machine::Machine;
use super::super::object::Proc;
use super::super::value::{StrObject, Value};
use super::format::quote;
use super::{arity, inspect, int_arg, require_block, to_s};

pub(super) const STRING_METHODS: &[&str] = &[
    "+", "*", "%", "==", "eql?", "<=>", "<", ">", "<=", ">=", "<<", "concat", "[]", "slice", "size", "length",
    "empty?", "include?", "start_with?", "end_with?", "index", "upcase", "downcase", "capitalize", "swapcase",
    "reverse", "strip", "lstrip", "rstrip", "chomp", "chop", "chars", "bytes", "lines", "split", "to_sym",
    "intern", "to_i", "to_f", "to_s", "to_str", "inspect", "each_char", "ljust", "rjust", "center", "sub",
    "gsub", "replace", "count", "ord", "succ", "next", "between?", "upcase!", "downcase!",
];

pub(super) const SYMBOL_METHODS: &[&str] = &[
    "to_s", "id2name", "name", "to_sym", "inspect", "size", "length", "<=>", "==", "upcase", "downcase", "empty?",
];

/// Ruby's `String#succ`: increment the rightmost alphanumeric run, carrying
/// to the left.
pub(super) fn successor(text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if !chars.iter().any(char::is_ascii_alphanumeric) {
        if let Some(last) = chars.last_mut() {
            *last = char::from_u32(*last as u32 + 1).unwrap_or(*last);
        }
        return chars.into_iter().collect();
    }

    let mut i = chars.len();
    let mut carry_at = 0;
    while i > 0 {
        i -= 1;
        let c = chars[i];
        if !c.is_ascii_alphanumeric() {
            continue;
        }
        carry_at = i;
        let (next, wrapped) = match c {
            'z' => ('a', true),
            'Z' => ('A', true),
            '9' => ('0', true),
            c => ((c as u8 + 1) as char, false),
        };
        chars[i] = next;
        if !wrapped {
            return chars.into_iter().collect();
        }
    }
    let extra = match chars[carry_at] {
        'a' => 'a',
        'A' => 'A',
        _ => '1',
    };
    chars.insert(carry_at, extra);
    chars.into_iter().collect()
}

pub(super) fn call(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    match receiver {
        Value::Str(string) => string_method(m, receiver, string, name, values, block),
        Value::Symbol(symbol) => symbol_method(m, symbol, name, values),
        _ => Ok(None),
    }
}

fn symbol_method(m: &mut Machine<'_>, symbol: &Rc<str>, name: &str, values: &[Value]) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "to_s" | "id2name" | "name" => Value::string(symbol.as_ref()),
        "to_sym" => Value::Symbol(symbol.clone()),
        "inspect" => Value::string(inspect(m, &Value::Symbol(symbol.clone()))?),
        "size" | "length" => Value::Int(symbol.chars().count() as i64),
        "empty?" => Value::Bool(symbol.is_empty()),
        "upcase" => Value::symbol(&symbol.to_uppercase()),
        "downcase" => Value::symbol(&symbol.to_lowercase()),
        "==" => {
            arity(m, values, 1, 1)?;
            Value::Bool(matches!(&values[0], Value::Symbol(other) if other == symbol))
        }
        "<=>" => {
            arity(m, values, 1, 1)?;
            match &values[0] {
                Value::Symbol(other) => Value::Int(symbol.cmp(other) as i64),
                _ => Value::Nil,
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// The string argument of a string method.
fn str_arg(m: &Machine<'_>, value: &Value) -> Result<String, Unwind> {
    match value {
        Value::Str(string) => Ok(string.value.borrow().clone()),
        other => {
            let class = m.core.class_of(other).name.clone();
            Err(m.type_error(format!("no implicit conversion of {} into String", class)))
        }
    }
}

fn check_frozen(m: &Machine<'_>, string: &StrObject) -> Result<(), Unwind> {
    if string.frozen.get() {
        return Err(m.raise(
            &m.core.frozen_error,
            format!("can't modify frozen String: {}", quote(&string.value.borrow())),
        ));
    }
    Ok(())
}

/// Resolve a possibly negative index against `len`.
fn index_in(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..=len).contains(&index).then_some(index as usize)
}

fn string_method(
    m: &mut Machine<'_>,
    receiver: &Value,
    string: &Rc<StrObject>,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let text = string.value.borrow().clone();
    let value = match name {
        "+" => {
            arity(m, values, 1, 1)?;
            let other = str_arg(m, &values[0])?;
            Value::string(text + &other)
        }
        "*" => {
            arity(m, values, 1, 1)?;
            let count = int_arg(m, &values[0])?;
            if count < 0 {
                return Err(m.raise(&m.core.argument_error, "negative argument"));
            }
            Value::string(text.repeat(count as usize))
        }
        "%" => {
            arity(m, values, 1, 1)?;
            let arguments = match &values[0] {
                Value::Array(elements) => elements.borrow().clone(),
                other => vec![other.clone()],
            };
            Value::string(format_percent(m, &text, &arguments)?)
        }
        "==" | "eql?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(matches!(&values[0], Value::Str(other) if *other.value.borrow() == text))
        }
        "<=>" => {
            arity(m, values, 1, 1)?;
            match &values[0] {
                Value::Str(other) => Value::Int(text.as_str().cmp(other.value.borrow().as_str()) as i64),
                _ => Value::Nil,
            }
        }
        "<" | ">" | "<=" | ">=" => {
            arity(m, values, 1, 1)?;
            let Value::Str(other) = &values[0] else {
                let class = m.core.class_of(&values[0]).name.clone();
                return Err(m.raise(
                    &m.core.argument_error,
                    format!("comparison of String with {} failed", class),
                ));
            };
            let ordering = text.as_str().cmp(other.value.borrow().as_str());
            Value::Bool(match name {
                "<" => ordering == Ordering::Less,
                ">" => ordering == Ordering::Greater,
                "<=" => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        "<<" | "concat" => {
            check_frozen(m, string)?;
            for value in values {
                let piece = match value {
                    Value::Int(n) => u32::try_from(*n)
                        .ok()
                        .and_then(char::from_u32)
                        .map(String::from)
                        .unwrap_or_default(),
                    other => str_arg(m, other)?,
                };
                string.value.borrow_mut().push_str(&piece);
            }
            receiver.clone()
        }
        "replace" => {
            arity(m, values, 1, 1)?;
            check_frozen(m, string)?;
            let other = str_arg(m, &values[0])?;
            *string.value.borrow_mut() = other;
            receiver.clone()
        }
        "upcase!" | "downcase!" => {
            check_frozen(m, string)?;
            let changed = if name == "upcase!" { text.to_uppercase() } else { text.to_lowercase() };
            if changed == text {
                Value::Nil
            } else {
                *string.value.borrow_mut() = changed;
                receiver.clone()
            }
        }
        "[]" | "slice" => slice(m, &text, values)?,
        "size" | "length" => Value::Int(text.chars().count() as i64),
        "empty?" => Value::Bool(text.is_empty()),
        "include?" => {
            arity(m, values, 1, 1)?;
            let needle = str_arg(m, &values[0])?;
            Value::Bool(text.contains(&needle))
        }
        "start_with?" | "end_with?" => {
            let mut found = false;
            for value in values {
                let affix = str_arg(m, value)?;
                found |= if name == "start_with?" { text.starts_with(&affix) } else { text.ends_with(&affix) };
            }
            Value::Bool(found)
        }
        "index" => {
            arity(m, values, 1, 1)?;
            let needle = str_arg(m, &values[0])?;
            match text.find(&needle) {
                Some(byte) => Value::Int(text[..byte].chars().count() as i64),
                None => Value::Nil,
            }
        }
        "count" => {
            arity(m, values, 1, 1)?;
            let set = str_arg(m, &values[0])?;
            Value::Int(text.chars().filter(|c| set.contains(*c)).count() as i64)
        }
        "upcase" => Value::string(text.to_uppercase()),
        "downcase" => Value::string(text.to_lowercase()),
        "swapcase" => Value::string(
            text.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect::<String>(),
        ),
        "capitalize" => {
            let mut chars = text.chars();
            Value::string(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            })
        }
        "reverse" => Value::string(text.chars().rev().collect::<String>()),
        "strip" => Value::string(text.trim()),
        "lstrip" => Value::string(text.trim_start()),
        "rstrip" => Value::string(text.trim_end()),
        "chomp" => Value::string(
            text.strip_suffix("\r\n")
                .or_else(|| text.strip_suffix('\n'))
                .unwrap_or(&text),
        ),
        "chop" => {
            let mut chars = text.chars();
            chars.next_back();
            Value::string(chars.as_str())
        }
        "chars" => Value::array(text.chars().map(|c| Value::string(c.to_string())).collect()),
        "bytes" => Value::array(text.bytes().map(|b| Value::Int(i64::from(b))).collect()),
        "lines" => Value::array(text.split_inclusive('\n').map(Value::string).collect()),
        "split" => {
            arity(m, values, 0, 1)?;
            let pieces: Vec<Value> = match values.first() {
                None | Some(Value::Nil) => text.split_whitespace().map(Value::string).collect(),
                Some(separator) => {
                    let separator = str_arg(m, separator)?;
                    if separator == " " {
                        text.split_whitespace().map(Value::string).collect()
                    } else if separator.is_empty() {
                        text.chars().map(|c| Value::string(c.to_string())).collect()
                    } else {
                        let mut pieces: Vec<&str> = text.split(separator.as_str()).collect();
                        while pieces.last().is_some_and(|piece| piece.is_empty()) {
                            pieces.pop();
                        }
                        pieces.into_iter().map(Value::string).collect()
                    }
                }
            };
            Value::array(pieces)
        }
        "each_char" => {
            let block = require_block(m, block, "each_char")?;
            for c in text.chars() {
                m.yield_values(block, vec![Value::string(c.to_string())])?;
            }
            receiver.clone()
        }
        "sub" | "gsub" => {
            arity(m, values, 1, 2)?;
            let pattern = str_arg(m, &values[0])?;
            let mut out = String::with_capacity(text.len());
            let mut rest = text.as_str();
            while let Some(at) = rest.find(&pattern).filter(|_| !pattern.is_empty()) {
                out.push_str(&rest[..at]);
                let replacement = match (values.get(1), block) {
                    (Some(replacement), _) => str_arg(m, replacement)?,
                    (None, Some(block)) => {
                        let result = m.yield_values(block, vec![Value::string(pattern.as_str())])?;
                        to_s(m, &result)?
                    }
                    (None, None) => return Err(m.argument_count_error(1, "2")),
                };
                out.push_str(&replacement);
                rest = &rest[at + pattern.len()..];
                if name == "sub" {
                    break;
                }
            }
            out.push_str(rest);
            Value::string(out)
        }
        "ljust" | "rjust" | "center" => {
            arity(m, values, 1, 2)?;
            let width = int_arg(m, &values[0])?.max(0) as usize;
            let pad = match values.get(1) {
                Some(pad) => str_arg(m, pad)?,
                None => " ".to_string(),
            };
            Value::string(justify(&text, name, width, &pad))
        }
        "to_sym" | "intern" => Value::symbol(&text),
        "to_i" => Value::Int(parse_leading_int(&text)),
        "to_f" => Value::Float(parse_leading_float(&text)),
        "to_s" | "to_str" => receiver.clone(),
        "inspect" => Value::string(quote(&text)),
        "ord" => match text.chars().next() {
            Some(c) => Value::Int(i64::from(c as u32)),
            None => return Err(m.raise(&m.core.argument_error, "empty string")),
        },
        "succ" | "next" => Value::string(successor(&text)),
        "between?" => {
            arity(m, values, 2, 2)?;
            let (low, high) = (str_arg(m, &values[0])?, str_arg(m, &values[1])?);
            Value::Bool(low <= text && text <= high)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn slice(m: &Machine<'_>, text: &str, values: &[Value]) -> Result<Value, Unwind> {
    arity(m, values, 1, 2)?;
    let chars: Vec<char> = text.chars().collect();
    let substring = |start: usize, len: usize| -> Value {
        let end = (start + len).min(chars.len());
        Value::string(chars[start..end].iter().collect::<String>())
    };
    Ok(match (&values[0], values.get(1)) {
        (Value::Int(index), None) => match index_in(*index, chars.len()) {
            Some(i) if i < chars.len() => substring(i, 1),
            _ => Value::Nil,
        },
        (Value::Int(start), Some(len)) => {
            let len = int_arg(m, len)?;
            match index_in(*start, chars.len()) {
                Some(i) if len >= 0 => substring(i, len as usize),
                _ => Value::Nil,
            }
        }
        (Value::Range(range), None) => {
            let start = match &range.start {
                Value::Nil => 0,
                other => int_arg(m, other)?,
            };
            let Some(start) = index_in(start, chars.len()) else {
                return Ok(Value::Nil);
            };
            let end = match &range.end {
                Value::Nil => chars.len() as i64,
                other => {
                    let end = int_arg(m, other)?;
                    let end = if end < 0 { end + chars.len() as i64 } else { end };
                    if range.exclude_end { end } else { end + 1 }
                }
            };
            let len = (end - start as i64).max(0) as usize;
            substring(start, len)
        }
        (Value::Str(needle), None) => {
            let needle = needle.value.borrow().clone();
            if text.contains(&needle) { Value::string(needle) } else { Value::Nil }
        }
        (other, _) => {
            let class = m.core.class_of(other).name.clone();
            return Err(m.type_error(format!("no implicit conversion of {} into Integer", class)));
        }
    })
}

fn justify(text: &str, how: &str, width: usize, pad: &str) -> String {
    let len = text.chars().count();
    if width <= len || pad.is_empty() {
        return text.to_string();
    }
    let fill = |n: usize| pad.chars().cycle().take(n).collect::<String>();
    let missing = width - len;
    match how {
        "ljust" => format!("{}{}", text, fill(missing)),
        "rjust" => format!("{}{}", fill(missing), text),
        _ => {
            let left = missing / 2;
            format!("{}{}{}", fill(left), text, fill(missing - left))
        }
    }
}

/// `String#to_i`: leading whitespace, an optional sign and digits
/// (underscores allowed between them); anything else ends the number.
fn parse_leading_int(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let mut value: i64 = 0;
    let mut previous_underscore = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => {
                value = value.saturating_mul(10).saturating_add(i64::from(c as u8 - b'0'));
                previous_underscore = false;
            }
            '_' if !previous_underscore => previous_underscore = true,
            _ => break,
        }
    }
    if negative { -value } else { value }
}

fn parse_leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exponent = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b'+' | b'-' if end == 0 || matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exponent => seen_dot = true,
            b'e' | b'E' if !seen_exponent && end > 0 => seen_exponent = true,
            _ => break,
        }
        end += 1;
    }
    // Back off over a dangling exponent, sign or dot.
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() && candidate.parse::<f64>().is_err() {
        candidate = &candidate[..candidate.len() - 1];
    }
    candidate.parse().unwrap_or(0.0)
}

/// `format`-style `%` with the common directives.
fn format_percent(m: &mut Machine<'_>, template: &str, arguments: &[Value]) -> Result<String, Unwind> {
    let mut out = String::with_capacity(template.len());
    let mut arguments = arguments.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut flags = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+') {
                flags.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let Some(directive) = chars.next() else {
            out.push('%');
            break;
        };
        if directive == '%' {
            out.push('%');
            continue;
        }
        let Some(argument) = arguments.next() else {
            return Err(m.raise(&m.core.argument_error, "too few arguments"));
        };
        let left = flags.starts_with('-');
        let zero = flags.trim_start_matches('-').starts_with('0');
        let (width, precision) = match flags.trim_start_matches(['-', '+']).split_once('.') {
            Some((width, precision)) => (width.parse().unwrap_or(0), precision.parse::<usize>().ok()),
            None => (flags.trim_start_matches(['-', '+']).parse().unwrap_or(0), None),
        };
        let body = match directive {
            'd' | 'i' => match argument {
                Value::Float(x) => format!("{}", x.floor() as i64),
                other => format!("{}", int_arg(m, other)?),
            },
            'f' => {
                let x = super::numeric::as_f64(argument);
                format!("{:.*}", precision.unwrap_or(6), x)
            }
            's' => to_s(m, argument)?,
            'p' => inspect(m, argument)?,
            'x' => format!("{:x}", int_arg(m, argument)?),
            'o' => format!("{:o}", int_arg(m, argument)?),
            'b' => format!("{:b}", int_arg(m, argument)?),
            other => {
                return Err(m.raise(
                    &m.core.argument_error,
                    format!("malformed format string - %{}", other),
                ));
            }
        };
        let len = body.chars().count();
        if len >= width {
            out.push_str(&body);
        } else if left {
            out.push_str(&body);
            out.push_str(&" ".repeat(width - len));
        } else if zero && directive != 's' {
            let (sign, digits) = match body.strip_prefix('-') {
                Some(digits) => ("-", digits),
                None => ("", body.as_str()),
            };
            out.push_str(sign);
            out.push_str(&"0".repeat(width - len));
            out.push_str(digits);
        } else {
            out.push_str(&" ".repeat(width - len));
            out.push_str(&body);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_successor() {
        assert_eq!(successor("a"), "b");
        assert_eq!(successor("az"), "ba");
        assert_eq!(successor("zz"), "aaa");
        assert_eq!(successor("a9"), "b0");
        assert_eq!(successor("Zz"), "AAa");
        assert_eq!(successor("1.9"), "2.0");
    }

    #[test]
    fn test_leading_numbers() {
        assert_eq!(parse_leading_int("  42abc"), 42);
        assert_eq!(parse_leading_int("-1_000"), -1000);
        assert_eq!(parse_leading_int("abc"), 0);
        assert_eq!(parse_leading_float("3.5kg"), 3.5);
        assert_eq!(parse_leading_float("1e3"), 1000.0);
        assert_eq!(parse_leading_float("2."), 2.0);
    }

    #[test]
    fn test_justify() {
        assert_eq!(justify("ab", "ljust", 5, "."), "ab...");
        assert_eq!(justify("ab", "rjust", 5, "12"), "121ab");
        assert_eq!(justify("ab", "center", 6, " "), "  ab  ");
        assert_eq!(justify("abc", "center", 2, " "), "abc");
    }
}
