//! `Integer` and `Float`.

use core::cmp::Ordering;
use std::rc::Rc;

use super::super::error::Unwind;
use super::super::machine::Machine;
use super::super::object::Proc;
use super::super::value::{Value, format_float};
use super::{arity, compare_strict, int_arg, require_block};

pub(super) const METHODS: &[&str] = &[
    "+", "-", "*", "/", "%", "modulo", "**", "pow", "-@", "+@", "==", "<", "<=", ">", ">=", "<=>", "to_s",
    "inspect", "to_i", "to_int", "to_f", "abs", "zero?", "even?", "odd?", "succ", "next", "pred", "round",
    "floor", "ceil", "divmod", "div", "fdiv", "integer?", "positive?", "negative?", "between?", "clamp",
    "times", "upto", "downto", "step", "nan?", "infinite?", "finite?", "chr", "ord", "digits", "gcd", "lcm",
];

pub(super) fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        _ => f64::NAN,
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

pub(super) fn call(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "+" | "-" | "*" | "/" | "%" | "modulo" | "**" | "pow" | "div" => {
            arity(m, values, 1, 1)?;
            let other = &values[0];
            if !is_numeric(other) {
                let given = m.core.class_of(other).name.clone();
                let own = m.core.class_of(receiver).name.clone();
                return Err(m.type_error(format!("{} can't be coerced into {}", given, own)));
            }
            let result = arithmetic(m, name, receiver, other)?;
            if name == "div" {
                match result {
                    Value::Float(x) => Value::Int(x.floor() as i64),
                    other => other,
                }
            } else {
                result
            }
        }
        "fdiv" => {
            arity(m, values, 1, 1)?;
            Value::Float(as_f64(receiver) / as_f64(&values[0]))
        }
        "-@" => match receiver {
            Value::Int(n) => match n.checked_neg() {
                Some(n) => Value::Int(n),
                None => Value::Float(-(*n as f64)),
            },
            _ => Value::Float(-as_f64(receiver)),
        },
        "+@" => receiver.clone(),
        "==" => {
            arity(m, values, 1, 1)?;
            Value::Bool(is_numeric(&values[0]) && as_f64(receiver) == as_f64(&values[0]) && same_int(receiver, &values[0]))
        }
        "<" | "<=" | ">" | ">=" => {
            arity(m, values, 1, 1)?;
            if !is_numeric(&values[0]) {
                let given = m.core.class_of(&values[0]).name.clone();
                let own = m.core.class_of(receiver).name.clone();
                return Err(m.raise(
                    &m.core.argument_error,
                    format!("comparison of {} with {} failed", own, given),
                ));
            }
            let ordering = compare_strict(m, receiver, &values[0])?;
            Value::Bool(match name {
                "<" => ordering == Ordering::Less,
                "<=" => ordering != Ordering::Greater,
                ">" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        "<=>" => {
            arity(m, values, 1, 1)?;
            if is_numeric(&values[0]) {
                match compare_strict(m, receiver, &values[0]) {
                    Ok(ordering) => Value::Int(ordering as i64),
                    Err(_) => Value::Nil,
                }
            } else {
                Value::Nil
            }
        }
        "between?" | "clamp" => {
            arity(m, values, 2, 2)?;
            let low = compare_strict(m, receiver, &values[0])?;
            let high = compare_strict(m, receiver, &values[1])?;
            if name == "between?" {
                Value::Bool(low != Ordering::Less && high != Ordering::Greater)
            } else if low == Ordering::Less {
                values[0].clone()
            } else if high == Ordering::Greater {
                values[1].clone()
            } else {
                receiver.clone()
            }
        }
        "to_s" | "inspect" => match receiver {
            Value::Int(n) => match values.first() {
                Some(base) => {
                    let base = int_arg(m, base)?;
                    if !(2..=36).contains(&base) {
                        return Err(m.raise(&m.core.argument_error, format!("invalid radix {}", base)));
                    }
                    Value::string(to_radix(*n, base as u32))
                }
                None => Value::string(n.to_string()),
            },
            _ => Value::string(format_float(as_f64(receiver))),
        },
        "to_i" | "to_int" => match receiver {
            Value::Int(_) => receiver.clone(),
            _ => float_to_int(m, as_f64(receiver).trunc())?,
        },
        "to_f" => Value::Float(as_f64(receiver)),
        "abs" => match receiver {
            Value::Int(n) => match n.checked_abs() {
                Some(n) => Value::Int(n),
                None => Value::Float((*n as f64).abs()),
            },
            _ => Value::Float(as_f64(receiver).abs()),
        },
        "zero?" => Value::Bool(as_f64(receiver) == 0.0),
        "positive?" => Value::Bool(as_f64(receiver) > 0.0),
        "negative?" => Value::Bool(as_f64(receiver) < 0.0),
        "integer?" => Value::Bool(matches!(receiver, Value::Int(_))),
        "nan?" => Value::Bool(as_f64(receiver).is_nan()),
        "infinite?" => {
            let x = as_f64(receiver);
            if x.is_infinite() {
                Value::Int(if x > 0.0 { 1 } else { -1 })
            } else {
                Value::Nil
            }
        }
        "finite?" => Value::Bool(as_f64(receiver).is_finite()),
        "floor" | "ceil" | "round" => round(m, receiver, name, values)?,
        "divmod" => {
            arity(m, values, 1, 1)?;
            let quotient = arithmetic(m, "/", receiver, &values[0])?;
            let quotient = match quotient {
                Value::Float(x) => Value::Float(x.floor()),
                other => other,
            };
            let remainder = arithmetic(m, "%", receiver, &values[0])?;
            Value::array(vec![quotient, remainder])
        }
        _ => match receiver {
            Value::Int(n) => return integer_method(m, *n, name, values, block),
            _ => return Ok(None),
        },
    };
    Ok(Some(value))
}

/// `Integer`-only methods.
fn integer_method(
    m: &mut Machine<'_>,
    n: i64,
    name: &str,
    values: &[Value],
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "even?" => Value::Bool(n % 2 == 0),
        "odd?" => Value::Bool(n % 2 != 0),
        "succ" | "next" => checked(n.checked_add(1), n as f64 + 1.0),
        "pred" => checked(n.checked_sub(1), n as f64 - 1.0),
        "chr" => match u32::try_from(n).ok().and_then(char::from_u32) {
            Some(c) => Value::string(c.to_string()),
            None => return Err(m.raise(&m.core.argument_error, format!("{} out of char range", n))),
        },
        "ord" => Value::Int(n),
        "digits" => {
            if n < 0 {
                return Err(m.raise(&m.core.argument_error, "out of domain"));
            }
            let digits = n.to_string().chars().rev().map(|c| Value::Int(i64::from(c as u8 - b'0'))).collect();
            Value::array(digits)
        }
        "gcd" | "lcm" => {
            arity(m, values, 1, 1)?;
            let other = int_arg(m, &values[0])?;
            let gcd = gcd(n, other);
            if name == "gcd" {
                Value::Int(gcd)
            } else if gcd == 0 {
                Value::Int(0)
            } else {
                Value::Int((n / gcd * other).abs())
            }
        }
        "times" => {
            let block = require_block(m, block, "times")?;
            for i in 0..n.max(0) {
                m.tick()?;
                m.yield_values(block, vec![Value::Int(i)])?;
            }
            Value::Int(n)
        }
        "upto" | "downto" => {
            arity(m, values, 1, 1)?;
            let limit = int_arg(m, &values[0])?;
            let block = require_block(m, block, name)?;
            let mut i = n;
            while (name == "upto" && i <= limit) || (name == "downto" && i >= limit) {
                m.tick()?;
                m.yield_values(block, vec![Value::Int(i)])?;
                i = if name == "upto" { i + 1 } else { i - 1 };
            }
            Value::Int(n)
        }
        "step" => {
            arity(m, values, 1, 2)?;
            let limit = int_arg(m, &values[0])?;
            let step = match values.get(1) {
                Some(step) => int_arg(m, step)?,
                None => 1,
            };
            if step == 0 {
                return Err(m.raise(&m.core.argument_error, "step can't be 0"));
            }
            let block = require_block(m, block, "step")?;
            let mut i = n;
            while (step > 0 && i <= limit) || (step < 0 && i >= limit) {
                m.tick()?;
                m.yield_values(block, vec![Value::Int(i)])?;
                i += step;
            }
            Value::Int(n)
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// Integer results that overflow continue as floats.
fn checked(result: Option<i64>, fallback: f64) -> Value {
    match result {
        Some(n) => Value::Int(n),
        None => Value::Float(fallback),
    }
}

fn same_int(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        _ => true,
    }
}

fn arithmetic(m: &Machine<'_>, op: &str, a: &Value, b: &Value) -> Result<Value, Unwind> {
    if let (Value::Int(x), Value::Int(y)) = (a, b) {
        let (x, y) = (*x, *y);
        return Ok(match op {
            "+" => checked(x.checked_add(y), x as f64 + y as f64),
            "-" => checked(x.checked_sub(y), x as f64 - y as f64),
            "*" => checked(x.checked_mul(y), x as f64 * y as f64),
            "/" | "div" => {
                if y == 0 {
                    return Err(m.raise(&m.core.zero_division_error, "divided by 0"));
                }
                checked(floor_div(x, y), (x as f64 / y as f64).floor())
            }
            "%" | "modulo" => {
                if y == 0 {
                    return Err(m.raise(&m.core.zero_division_error, "divided by 0"));
                }
                let r = x.checked_rem_euclid(y).unwrap_or(0);
                Value::Int(if y < 0 && r != 0 { r + y } else { r })
            }
            _ => {
                if y < 0 {
                    Value::Float((x as f64).powf(y as f64))
                } else {
                    let exponent = u32::try_from(y).unwrap_or(u32::MAX);
                    checked(x.checked_pow(exponent), (x as f64).powf(y as f64))
                }
            }
        });
    }

    let (x, y) = (as_f64(a), as_f64(b));
    Ok(Value::Float(match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "div" => {
            if y == 0.0 {
                return Err(m.raise(&m.core.zero_division_error, "divided by 0"));
            }
            (x / y).floor()
        }
        "%" | "modulo" => {
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) { r + y } else { r }
        }
        _ => x.powf(y),
    }))
}

/// Division rounding toward negative infinity.
fn floor_div(x: i64, y: i64) -> Option<i64> {
    let q = x.checked_div(y)?;
    if (x % y != 0) && ((x < 0) != (y < 0)) { q.checked_sub(1) } else { Some(q) }
}

fn float_to_int(m: &Machine<'_>, x: f64) -> Result<Value, Unwind> {
    if !x.is_finite() {
        return Err(m.raise(&m.core.argument_error, format_float(x)));
    }
    Ok(Value::Int(x as i64))
}

fn round(m: &Machine<'_>, receiver: &Value, name: &str, values: &[Value]) -> Result<Value, Unwind> {
    arity(m, values, 0, 1)?;
    let digits = match values.first() {
        Some(digits) => int_arg(m, digits)?,
        None => 0,
    };
    let apply = |x: f64| match name {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        _ => x.round(),
    };
    match receiver {
        Value::Int(n) if digits >= 0 => Ok(Value::Int(*n)),
        Value::Int(n) => {
            let scale = 10f64.powi(-digits as i32);
            float_to_int(m, apply(*n as f64 / scale) * scale)
        }
        _ if digits > 0 => {
            let scale = 10f64.powi(digits as i32);
            Ok(Value::Float(apply(as_f64(receiver) * scale) / scale))
        }
        _ => float_to_int(m, apply(as_f64(receiver))),
    }
}

fn to_radix(n: i64, base: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    let mut rest = n.unsigned_abs();
    while rest > 0 {
        let digit = (rest % u64::from(base)) as u32;
        digits.extend(char::from_digit(digit, base));
        rest /= u64::from(base);
    }
    if n < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_floor_division() {
        assert_eq!(floor_div(7, 2), Some(3));
        assert_eq!(floor_div(-7, 2), Some(-4));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(i64::MIN, -1), None);
    }

    #[test]
    fn test_radix() {
        assert_eq!(to_radix(255, 16), "ff");
        assert_eq!(to_radix(-5, 2), "-101");
        assert_eq!(to_radix(0, 8), "0");
    }

    #[test]
    fn test_gcd() {
        assert_eq!(gcd(12, 18), 6);
        assert_eq!(gcd(-4, 6), 2);
    }
}
