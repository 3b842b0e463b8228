//! `to_s` and `inspect`.

use super::super::error::Unwind;
use super::super::machine::{Machine, exception_message};
use super::super::value::{Value, format_float};

/// The string form used by `puts` and interpolation.
pub(in crate::vm) fn to_s(m: &mut Machine<'_>, value: &Value) -> Result<String, Unwind> {
    match user_override(m, value, "to_s")? {
        Some(text) => Ok(text),
        None => default_to_s(m, value),
    }
}

/// The developer-facing form used by `p` and `inspect`.
pub(in crate::vm) fn inspect(m: &mut Machine<'_>, value: &Value) -> Result<String, Unwind> {
    match user_override(m, value, "inspect")? {
        Some(text) => Ok(text),
        None => default_inspect(m, value),
    }
}

/// `to_s` ignoring user overrides of the receiver itself.
pub(super) fn default_to_s(m: &mut Machine<'_>, value: &Value) -> Result<String, Unwind> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::Str(string) => string.value.borrow().clone(),
        Value::Symbol(name) => name.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(x) => format_float(*x),
        Value::Bool(b) => b.to_string(),
        Value::Class(class) => class.name.clone(),
        Value::Range(range) => {
            let start = to_s(m, &range.start)?;
            let end = to_s(m, &range.end)?;
            format!("{}{}{}", start, if range.exclude_end { "..." } else { ".." }, end)
        }
        Value::Object(_) if super::kernel::is_exception(m, value) => exception_message(value),
        Value::Object(object) => format!("#<{}>", object.class.name),
        _ => inspect(m, value)?,
    })
}

pub(super) fn default_inspect(m: &mut Machine<'_>, value: &Value) -> Result<String, Unwind> {
    Ok(match value {
        Value::Nil => "nil".to_string(),
        Value::Str(string) => quote(&string.value.borrow()),
        Value::Symbol(name) => inspect_symbol(name),
        Value::Array(elements) => {
            let elements = elements.borrow().clone();
            let mut parts = Vec::with_capacity(elements.len());
            for element in &elements {
                parts.push(inspect(m, element)?);
            }
            format!("[{}]", parts.join(", "))
        }
        Value::Hash(hash) => {
            let entries: Vec<(Value, Value)> = hash.borrow().iter().cloned().collect();
            if entries.is_empty() {
                return Ok("{}".to_string());
            }
            let mut parts = Vec::with_capacity(entries.len());
            for (key, value) in &entries {
                let value = inspect(m, value)?;
                match key {
                    Value::Symbol(name) if is_plain_symbol(name) => {
                        parts.push(format!("{}: {}", name, value));
                    }
                    _ => parts.push(format!("{} => {}", inspect(m, key)?, value)),
                }
            }
            format!("{{{}}}", parts.join(", "))
        }
        Value::Range(range) => {
            let start = if range.start.is_nil() { String::new() } else { inspect(m, &range.start)? };
            let end = if range.end.is_nil() { String::new() } else { inspect(m, &range.end)? };
            format!("{}{}{}", start, if range.exclude_end { "..." } else { ".." }, end)
        }
        Value::Object(object) if super::kernel::is_exception(m, value) => {
            let message = exception_message(value);
            if message.is_empty() {
                object.class.name.clone()
            } else {
                format!("#<{}: {}>", object.class.name, message)
            }
        }
        Value::Object(object) => {
            let mut ivars: Vec<(String, Value)> = object
                .ivars
                .borrow()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            ivars.sort_by(|a, b| a.0.cmp(&b.0));
            if ivars.is_empty() {
                format!("#<{}>", object.class.name)
            } else {
                let mut parts = Vec::with_capacity(ivars.len());
                for (name, value) in &ivars {
                    parts.push(format!("{}={}", name, inspect(m, value)?));
                }
                format!("#<{} {}>", object.class.name, parts.join(", "))
            }
        }
        other => format!("{:?}", other),
    })
}

/// Result of a user-defined `to_s`/`inspect`, if the receiver has one.
fn user_override(m: &mut Machine<'_>, value: &Value, name: &str) -> Result<Option<String>, Unwind> {
    let class = m.core.dispatch_class(value);
    if class.find_method(name).is_none() {
        return Ok(None);
    }
    let result = m.send0(value.clone(), name)?;
    Ok(Some(match &result {
        Value::Str(string) => string.value.borrow().clone(),
        other => format!("{:?}", other),
    }))
}

pub(super) fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{1b}' => out.push_str("\\e"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_plain_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && name
            .trim_end_matches(['?', '!', '='])
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_')
}

fn inspect_symbol(name: &str) -> String {
    const OPERATORS: &[&str] = &[
        "+", "-", "*", "/", "%", "**", "==", "!=", "<", "<=", ">", ">=", "<=>", "===", "[]", "[]=",
        "<<", ">>", "!", "=~", "-@", "+@", "&", "|", "^", "~",
    ];
    if is_plain_symbol(name) || OPERATORS.contains(&name) || name.starts_with('@') || name.starts_with('$') {
        format!(":{}", name)
    } else {
        format!(":{}", quote(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("a\"b\n"), "\"a\\\"b\\n\"");
        assert_eq!(quote("tab\there"), "\"tab\\there\"");
    }

    #[test]
    fn test_symbol_forms() {
        assert_eq!(inspect_symbol("name"), ":name");
        assert_eq!(inspect_symbol("empty?"), ":empty?");
        assert_eq!(inspect_symbol("<=>"), ":<=>");
        assert_eq!(inspect_symbol("two words"), ":\"two words\"");
    }
}
