//! `Kernel`, plus the small tables for nil, booleans, procs, classes and
//! exception objects.

use std::rc::Rc;

use super::super::error::Unwind;
use super::super::frame::Args;
use super::super::machine::{Machine, exception_message};
use super::super::object::{Class, Method, Object, Proc};
use super::super::value::{HashObject, Value};
use super::format::{default_inspect, default_to_s};
use super::{
    arity, compare, compare_strict, equal, inspect, int_arg, ivar_get, ivar_set, name_arg, require_block,
    shallow_copy, to_s,
};

pub(super) const KERNEL_METHODS: &[&str] = &[
    "puts", "print", "p", "pp", "raise", "fail", "lambda", "proc", "loop", "Integer", "Float", "String",
    "Array", "class", "singleton_class", "is_a?", "kind_of?", "instance_of?", "nil?", "==", "!=", "!",
    "equal?", "eql?", "===", "<=>", "to_s", "inspect", "respond_to?", "send", "__send__", "public_send",
    "freeze", "frozen?", "dup", "clone", "tap", "then", "yield_self", "itself", "instance_variable_get",
    "instance_variable_set", "instance_variable_defined?", "instance_variables", "object_id", "extend",
    "initialize", "private", "public", "protected", "module_function", "private_constant",
];

pub(super) const NIL_METHODS: &[&str] = &["to_s", "to_a", "to_i", "to_f", "to_h", "inspect", "&", "|"];

pub(super) const BOOL_METHODS: &[&str] = &["&", "|", "^", "to_s", "inspect"];

pub(super) const PROC_METHODS: &[&str] = &["call", "()", "yield", "[]", "===", "arity", "lambda?", "to_proc"];

pub(super) const CLASS_METHODS: &[&str] = &[
    "new", "allocate", "name", "to_s", "inspect", "superclass", "ancestors", "attr_accessor", "attr_reader",
    "attr_writer", "attr", "include", "include?", "===", "<", "<=", "instance_methods",
    "public_instance_methods", "method_defined?", "public_method_defined?", "define_method", "alias_method",
    "remove_method", "undef_method", "const_get", "const_set", "const_defined?", "constants",
    "class_variable_get", "class_variable_set", "class_variable_defined?",
];

pub(super) const EXCEPTION_METHODS: &[&str] = &["message", "to_s", "full_message", "backtrace", "exception", "cause"];

pub(super) const COMPARABLE_METHODS: &[&str] = &["<", "<=", ">", ">=", "==", "between?", "clamp"];

pub(super) fn is_exception(m: &Machine<'_>, value: &Value) -> bool {
    match value {
        Value::Object(object) => object.class.is_subclass_of(&m.core.exception),
        _ => false,
    }
}

pub(super) fn is_comparable(m: &Machine<'_>, value: &Value) -> bool {
    matches!(value, Value::Object(_)) && m.core.dispatch_class(value).is_subclass_of(&m.core.comparable)
}

/// The class whose ancestors `is_a?` checks.
fn ancestry_class(m: &Machine<'_>, value: &Value) -> Rc<Class> {
    match value {
        Value::Class(_) => m.core.class_of(value),
        _ => m.core.dispatch_class(value),
    }
}

pub(super) fn call(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    values: &[Value],
    args: &Args,
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "puts" => {
            if values.is_empty() {
                m.output.push('\n');
            }
            for value in values {
                puts_value(m, value)?;
            }
            Value::Nil
        }
        "print" => {
            for value in values {
                let text = to_s(m, value)?;
                m.output.push_str(&text);
            }
            Value::Nil
        }
        "p" | "pp" => {
            for value in values {
                let text = inspect(m, value)?;
                m.output.push_str(&text);
                m.output.push('\n');
            }
            match values {
                [] => Value::Nil,
                [single] => single.clone(),
                many => Value::array(many.to_vec()),
            }
        }
        "raise" | "fail" => return Err(raise(m, values)?),
        "lambda" | "proc" => match block {
            Some(block) => Value::Proc(block.clone()),
            None => {
                return Err(m.raise(
                    &m.core.argument_error,
                    "tried to create Proc object without a block",
                ));
            }
        },
        "loop" => {
            let block = require_block(m, block, "loop")?;
            loop {
                m.tick()?;
                m.yield_values(block, Vec::new())?;
            }
        }
        "Integer" => {
            arity(m, values, 1, 2)?;
            to_integer(m, &values[0])?
        }
        "Float" => {
            arity(m, values, 1, 1)?;
            to_float(m, &values[0])?
        }
        "String" => {
            arity(m, values, 1, 1)?;
            Value::string(to_s(m, &values[0])?)
        }
        "Array" => {
            arity(m, values, 1, 1)?;
            match &values[0] {
                Value::Nil => Value::array(Vec::new()),
                Value::Array(_) => values[0].clone(),
                Value::Hash(hash) => Value::array(
                    hash.borrow()
                        .iter()
                        .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                        .collect(),
                ),
                other => Value::array(vec![other.clone()]),
            }
        }
        "class" => Value::Class(m.core.class_of(receiver)),
        "singleton_class" => match receiver {
            Value::Object(object) => Value::Class(object.singleton_class()),
            Value::Class(class) => Value::Class(class.singleton_class()),
            _ => return Err(m.type_error("can't define singleton")),
        },
        "is_a?" | "kind_of?" | "instance_of?" => {
            arity(m, values, 1, 1)?;
            let Value::Class(class) = &values[0] else {
                return Err(m.type_error("class or module required"));
            };
            if name == "instance_of?" {
                Value::Bool(Rc::ptr_eq(&m.core.class_of(receiver), class))
            } else {
                Value::Bool(ancestry_class(m, receiver).is_subclass_of(class))
            }
        }
        "nil?" => Value::Bool(receiver.is_nil()),
        "==" => {
            arity(m, values, 1, 1)?;
            Value::Bool(equal(m, receiver, &values[0])?)
        }
        "equal?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(receiver.identical(&values[0]))
        }
        "eql?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(receiver.eql(&values[0]))
        }
        "!=" => {
            arity(m, values, 1, 1)?;
            let same = m.send(receiver.clone(), "==", Args::new([values[0].clone()]), None)?;
            Value::Bool(!same.truthy())
        }
        "!" => Value::Bool(!receiver.truthy()),
        "===" => {
            arity(m, values, 1, 1)?;
            let same = m.send(receiver.clone(), "==", Args::new([values[0].clone()]), None)?;
            Value::Bool(same.truthy())
        }
        "<=>" => {
            arity(m, values, 1, 1)?;
            if equal(m, receiver, &values[0])? {
                Value::Int(0)
            } else {
                Value::Nil
            }
        }
        "to_s" => Value::string(default_to_s(m, receiver)?),
        "inspect" => Value::string(default_inspect(m, receiver)?),
        "respond_to?" => {
            arity(m, values, 1, 2)?;
            let name = name_arg(m, &values[0])?;
            Value::Bool(m.responds_to(receiver, &name))
        }
        "send" | "__send__" | "public_send" => {
            if args.values.is_empty() {
                return Err(m.argument_count_error(0, "1+"));
            }
            let name = name_arg(m, &args.values[0])?;
            let mut forwarded = args.clone();
            forwarded.values.remove(0);
            m.send(receiver.clone(), &name, forwarded, block.cloned())?
        }
        "freeze" => {
            match receiver {
                Value::Str(string) => string.frozen.set(true),
                Value::Object(object) => object.frozen.set(true),
                Value::Hash(hash) => hash.borrow_mut().frozen = true,
                _ => {}
            }
            receiver.clone()
        }
        "frozen?" => Value::Bool(match receiver {
            Value::Str(string) => string.frozen.get(),
            Value::Object(object) => object.frozen.get(),
            Value::Hash(hash) => hash.borrow().frozen,
            Value::Array(_) | Value::Proc(_) | Value::Class(_) => false,
            _ => true,
        }),
        "dup" | "clone" => shallow_copy(receiver),
        "tap" => {
            let block = require_block(m, block, "tap")?;
            m.yield_values(block, vec![receiver.clone()])?;
            receiver.clone()
        }
        "then" | "yield_self" => {
            let block = require_block(m, block, name)?;
            m.yield_values(block, vec![receiver.clone()])?
        }
        "itself" => receiver.clone(),
        "instance_variable_get" => {
            arity(m, values, 1, 1)?;
            let name = name_arg(m, &values[0])?;
            ivar_get(receiver, &name)
        }
        "instance_variable_set" => {
            arity(m, values, 2, 2)?;
            let name = name_arg(m, &values[0])?;
            ivar_set(m, receiver, &name, values[1].clone())?;
            values[1].clone()
        }
        "instance_variable_defined?" => {
            arity(m, values, 1, 1)?;
            let name = name_arg(m, &values[0])?;
            Value::Bool(match receiver {
                Value::Object(object) => object.ivars.borrow().contains_key(name.as_str()),
                Value::Class(class) => class.ivars.borrow().contains_key(name.as_str()),
                _ => false,
            })
        }
        "instance_variables" => {
            let mut names: Vec<String> = match receiver {
                Value::Object(object) => object.ivars.borrow().keys().cloned().collect(),
                Value::Class(class) => class.ivars.borrow().keys().cloned().collect(),
                _ => Vec::new(),
            };
            names.sort();
            Value::array(names.iter().map(|name| Value::symbol(name)).collect())
        }
        "object_id" => Value::Int(object_id(receiver)),
        "extend" => {
            let singleton = match receiver {
                Value::Object(object) => object.singleton_class(),
                Value::Class(class) => class.singleton_class(),
                _ => return Err(m.type_error("can't define singleton")),
            };
            for module in values {
                match module {
                    Value::Class(module) if module.is_module => include_module(&singleton, module),
                    _ => return Err(m.type_error("wrong argument type (expected Module)")),
                }
            }
            receiver.clone()
        }
        "initialize" => {
            if is_exception(m, receiver) {
                arity(m, values, 0, 1)?;
                let message = values.first().cloned().unwrap_or(Value::Nil);
                ivar_set(m, receiver, "@message", message)?;
            } else {
                arity(m, values, 0, 0)?;
            }
            Value::Nil
        }
        "private" | "public" | "protected" | "module_function" | "private_constant" => match values {
            [] => Value::Nil,
            [single] => single.clone(),
            many => Value::array(many.to_vec()),
        },
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn puts_value(m: &mut Machine<'_>, value: &Value) -> Result<(), Unwind> {
    if let Value::Array(elements) = value {
        let elements = elements.borrow().clone();
        if elements.is_empty() {
            m.output.push('\n');
        }
        for element in &elements {
            puts_value(m, element)?;
        }
        return Ok(());
    }
    let text = to_s(m, value)?;
    m.output.push_str(&text);
    if !text.ends_with('\n') {
        m.output.push('\n');
    }
    Ok(())
}

/// Build the signal `raise` sends. `Err` when the arguments themselves are
/// wrong.
fn raise(m: &mut Machine<'_>, values: &[Value]) -> Result<Unwind, Unwind> {
    match values {
        [] => Ok(match m.globals.get("$!") {
            Some(exception) if !exception.is_nil() => Unwind::Raise(exception.clone()),
            _ => m.raise(&m.core.runtime_error, "unhandled exception"),
        }),
        [Value::Str(message)] => {
            let message = message.value.borrow().clone();
            Ok(m.raise(&m.core.runtime_error, message))
        }
        [Value::Class(class), rest @ ..] if rest.len() <= 1 => {
            if !class.is_subclass_of(&m.core.exception) {
                return Err(m.type_error("exception class/object expected"));
            }
            let exception = m.send(
                Value::Class(class.clone()),
                "new",
                Args::new(rest.iter().cloned()),
                None,
            )?;
            Ok(Unwind::Raise(exception))
        }
        [exception, rest @ ..] if rest.len() <= 1 && is_exception(m, exception) => {
            if let [message] = rest {
                ivar_set(m, exception, "@message", message.clone())?;
            }
            Ok(Unwind::Raise(exception.clone()))
        }
        [_] | [_, _] => Err(m.type_error("exception class/object expected")),
        _ => Err(m.argument_count_error(values.len(), "0..2")),
    }
}

fn to_integer(m: &Machine<'_>, value: &Value) -> Result<Value, Unwind> {
    match value {
        Value::Int(_) => Ok(value.clone()),
        Value::Float(x) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
        Value::Str(string) => {
            let text = string.value.borrow().trim().replace('_', "");
            text.parse::<i64>().map(Value::Int).map_err(|_| {
                m.raise(
                    &m.core.argument_error,
                    format!("invalid value for Integer(): {:?}", string.value.borrow()),
                )
            })
        }
        other => {
            let class = m.core.class_of(other).name.clone();
            Err(m.type_error(format!("can't convert {} into Integer", class)))
        }
    }
}

fn to_float(m: &Machine<'_>, value: &Value) -> Result<Value, Unwind> {
    match value {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(_) => Ok(value.clone()),
        Value::Str(string) => {
            let text = string.value.borrow().trim().replace('_', "");
            text.parse::<f64>().map(Value::Float).map_err(|_| {
                m.raise(
                    &m.core.argument_error,
                    format!("invalid value for Float(): {:?}", string.value.borrow()),
                )
            })
        }
        other => {
            let class = m.core.class_of(other).name.clone();
            Err(m.type_error(format!("can't convert {} into Float", class)))
        }
    }
}

fn object_id(value: &Value) -> i64 {
    let address = |pointer: *const ()| (pointer as usize >> 3) as i64;
    match value {
        Value::Nil => 8,
        Value::Bool(true) => 20,
        Value::Bool(false) => 0,
        Value::Int(n) => n.wrapping_mul(2).wrapping_add(1),
        Value::Float(x) => x.to_bits() as i64,
        Value::Symbol(name) => address(name.as_ptr() as *const ()),
        Value::Str(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Array(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Hash(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Range(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Regexp(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Proc(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Object(object) => address(Rc::as_ptr(object) as *const ()),
        Value::Class(object) => address(Rc::as_ptr(object) as *const ()),
    }
}

fn include_module(class: &Rc<Class>, module: &Rc<Class>) {
    let mut includes = class.includes.borrow_mut();
    if !includes.iter().any(|included| Rc::ptr_eq(included, module)) {
        includes.push(module.clone());
    }
}

// === nil and booleans ===

pub(super) fn nil_method(m: &mut Machine<'_>, name: &str, values: &[Value]) -> Result<Option<Value>, Unwind> {
    Ok(Some(match name {
        "to_s" => Value::string(""),
        "to_a" => Value::array(Vec::new()),
        "to_h" => Value::hash(HashObject::new()),
        "to_i" => Value::Int(0),
        "to_f" => Value::Float(0.0),
        "inspect" => Value::string("nil"),
        "&" => {
            arity(m, values, 1, 1)?;
            Value::Bool(false)
        }
        "|" => {
            arity(m, values, 1, 1)?;
            Value::Bool(values[0].truthy())
        }
        _ => return Ok(None),
    }))
}

pub(super) fn bool_method(b: bool, name: &str, values: &[Value]) -> Option<Value> {
    let other = values.first().map(Value::truthy);
    Some(match (name, other) {
        ("&", Some(other)) => Value::Bool(b && other),
        ("|", Some(other)) => Value::Bool(b || other),
        ("^", Some(other)) => Value::Bool(b != other),
        ("to_s" | "inspect", None) => Value::string(b.to_string()),
        _ => return None,
    })
}

// === Procs ===

pub(super) fn proc_method(m: &mut Machine<'_>, proc: &Rc<Proc>, name: &str, args: &Args) -> Result<Option<Value>, Unwind> {
    Ok(Some(match name {
        "call" | "()" | "yield" | "[]" | "===" => m.call_block(proc, args.clone())?,
        "arity" => Value::Int(i64::from(proc.arity)),
        "lambda?" => Value::Bool(proc.is_lambda),
        "to_proc" => Value::Proc(proc.clone()),
        _ => return Ok(None),
    }))
}

// === Classes and modules ===

pub(super) fn class_method(
    m: &mut Machine<'_>,
    class: &Rc<Class>,
    name: &str,
    values: &[Value],
    args: &Args,
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let value = match name {
        "new" => return instantiate(m, class, values, args, block),
        "allocate" if !class.is_module => Value::Object(Object::new(class.clone())),
        "name" | "to_s" | "inspect" => Value::string(class.name.as_str()),
        "superclass" => match &class.superclass {
            Some(superclass) => Value::Class(superclass.clone()),
            None => Value::Nil,
        },
        "ancestors" => Value::array(class.ancestors().into_iter().map(Value::Class).collect()),
        "attr_accessor" | "attr_reader" | "attr_writer" | "attr" => {
            let mut defined = Vec::with_capacity(values.len());
            for value in values {
                let attribute = name_arg(m, value)?;
                let ivar: Rc<str> = Rc::from(format!("@{}", attribute));
                if name != "attr_writer" {
                    class.define_method(&attribute, Method::AttrReader(ivar.clone()));
                    defined.push(Value::symbol(&attribute));
                }
                if name == "attr_writer" || name == "attr_accessor" {
                    let setter = format!("{}=", attribute);
                    class.define_method(&setter, Method::AttrWriter(ivar));
                    defined.push(Value::symbol(&setter));
                }
            }
            Value::array(defined)
        }
        "include" => {
            for module in values {
                match module {
                    Value::Class(module) if module.is_module => include_module(class, module),
                    other => {
                        let given = m.core.class_of(other).name.clone();
                        return Err(m.type_error(format!("wrong argument type {} (expected Module)", given)));
                    }
                }
            }
            Value::Class(class.clone())
        }
        "include?" => {
            arity(m, values, 1, 1)?;
            Value::Bool(match &values[0] {
                Value::Class(module) => {
                    module.is_module && !Rc::ptr_eq(class, module) && class.is_subclass_of(module)
                }
                _ => false,
            })
        }
        "===" => {
            arity(m, values, 1, 1)?;
            Value::Bool(ancestry_class(m, &values[0]).is_subclass_of(class))
        }
        "<" | "<=" => {
            arity(m, values, 1, 1)?;
            let Value::Class(other) = &values[0] else {
                return Err(m.type_error("compared with non class/module"));
            };
            if Rc::ptr_eq(class, other) {
                Value::Bool(name == "<=")
            } else if class.is_subclass_of(other) {
                Value::Bool(true)
            } else if other.is_subclass_of(class) {
                Value::Bool(false)
            } else {
                Value::Nil
            }
        }
        "instance_methods" | "public_instance_methods" => {
            let inherited = values.first().is_none_or(Value::truthy);
            let owners = if inherited { class.ancestors() } else { vec![class.clone()] };
            let mut names: Vec<String> = Vec::new();
            for owner in owners {
                for (method, body) in owner.methods.borrow().iter() {
                    if !matches!(body, Method::Undefined) && !names.contains(method) {
                        names.push(method.clone());
                    }
                }
            }
            names.sort();
            Value::array(names.iter().map(|name| Value::symbol(name)).collect())
        }
        "method_defined?" | "public_method_defined?" => {
            arity(m, values, 1, 2)?;
            let method = name_arg(m, &values[0])?;
            Value::Bool(class.find_method(&method).is_some())
        }
        "define_method" => {
            arity(m, values, 1, 2)?;
            let method = name_arg(m, &values[0])?;
            let body = match (values.get(1), block) {
                (Some(Value::Proc(body)), _) => body.clone(),
                (None, Some(block)) => block.clone(),
                _ => return Err(m.raise(&m.core.argument_error, "tried to create Proc object without a block")),
            };
            class.define_method(&method, Method::Block(body));
            Value::symbol(&method)
        }
        "alias_method" => {
            arity(m, values, 2, 2)?;
            let new = name_arg(m, &values[0])?;
            let old = name_arg(m, &values[1])?;
            let Some((method, _)) = class.find_method(&old) else {
                return Err(m.raise(
                    &m.core.name_error,
                    format!("undefined method '{}' for class '{}'", old, class.name),
                ));
            };
            class.define_method(&new, method);
            Value::symbol(&new)
        }
        "remove_method" | "undef_method" => {
            for value in values {
                let method = name_arg(m, value)?;
                if name == "undef_method" {
                    class.define_method(&method, Method::Undefined);
                } else {
                    class.methods.borrow_mut().remove(&method);
                }
            }
            Value::Class(class.clone())
        }
        "const_get" => {
            arity(m, values, 1, 2)?;
            let constant = name_arg(m, &values[0])?;
            match class.find_constant(&constant) {
                Some(value) => value,
                None => {
                    return Err(m.raise(
                        &m.core.name_error,
                        format!("uninitialized constant {}::{}", class.name, constant),
                    ));
                }
            }
        }
        "const_set" => {
            arity(m, values, 2, 2)?;
            let constant = name_arg(m, &values[0])?;
            class.constants.borrow_mut().insert(constant, values[1].clone());
            values[1].clone()
        }
        "const_defined?" => {
            arity(m, values, 1, 2)?;
            let constant = name_arg(m, &values[0])?;
            Value::Bool(class.find_constant(&constant).is_some())
        }
        "constants" => {
            let mut names: Vec<String> = class.constants.borrow().keys().cloned().collect();
            names.sort();
            Value::array(names.iter().map(|name| Value::symbol(name)).collect())
        }
        "class_variable_get" => {
            arity(m, values, 1, 1)?;
            let variable = name_arg(m, &values[0])?;
            let found = class
                .class_var_owner(&variable)
                .and_then(|owner| owner.class_vars.borrow().get(&variable).cloned());
            match found {
                Some(value) => value,
                None => {
                    return Err(m.raise(
                        &m.core.name_error,
                        format!("uninitialized class variable {} in {}", variable, class.name),
                    ));
                }
            }
        }
        "class_variable_set" => {
            arity(m, values, 2, 2)?;
            let variable = name_arg(m, &values[0])?;
            let owner = class.class_var_owner(&variable).unwrap_or_else(|| class.clone());
            owner.class_vars.borrow_mut().insert(variable, values[1].clone());
            values[1].clone()
        }
        "class_variable_defined?" => {
            arity(m, values, 1, 1)?;
            let variable = name_arg(m, &values[0])?;
            Value::Bool(class.class_var_owner(&variable).is_some())
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

/// `Class#new`. Core value classes build their values directly; everything
/// else gets a fresh object and an `initialize` call.
fn instantiate(
    m: &mut Machine<'_>,
    class: &Rc<Class>,
    values: &[Value],
    args: &Args,
    block: Option<&Rc<Proc>>,
) -> Result<Option<Value>, Unwind> {
    let core = &m.core;
    let immediate = [&core.integer, &core.float, &core.symbol, &core.nil, &core.true_class, &core.false_class];
    let value_class = |c: &Rc<Class>| Rc::ptr_eq(class, c);
    if class.is_module || class.is_singleton || immediate.iter().any(|c| Rc::ptr_eq(class, c)) {
        return Ok(None);
    }
    if value_class(&m.core.array) {
        arity(m, values, 0, 2)?;
        let size = match values.first() {
            Some(size) => int_arg(m, size)?,
            None => 0,
        };
        if size < 0 {
            return Err(m.raise(&m.core.argument_error, "negative array size"));
        }
        let mut elements = Vec::with_capacity(size as usize);
        for i in 0..size {
            elements.push(match block {
                Some(block) => m.yield_values(block, vec![Value::Int(i)])?,
                None => values.get(1).cloned().unwrap_or(Value::Nil),
            });
        }
        return Ok(Some(Value::array(elements)));
    }
    if value_class(&m.core.hash) {
        arity(m, values, 0, 1)?;
        let hash = HashObject::with_defaults(values.first().cloned(), block.cloned());
        return Ok(Some(Value::hash(hash)));
    }
    if value_class(&m.core.string) {
        arity(m, values, 0, 1)?;
        let text = match values.first() {
            Some(value) => to_s(m, value)?,
            None => String::new(),
        };
        return Ok(Some(Value::string(text)));
    }
    if value_class(&m.core.range) {
        arity(m, values, 2, 3)?;
        let exclude_end = values.get(2).is_some_and(Value::truthy);
        return Ok(Some(Value::range(values[0].clone(), values[1].clone(), exclude_end)));
    }
    if value_class(&m.core.proc_class) {
        let block = require_block(m, block, "Proc.new")?;
        return Ok(Some(Value::Proc(block.clone())));
    }

    let object = Value::Object(Object::new(class.clone()));
    m.send(object.clone(), "initialize", args.clone(), block.cloned())?;
    Ok(Some(object))
}

// === Objects: exceptions and Comparable ===

pub(super) fn object_method(
    m: &mut Machine<'_>,
    receiver: &Value,
    name: &str,
    values: &[Value],
) -> Result<Option<Value>, Unwind> {
    if is_exception(m, receiver) {
        let value = match name {
            "message" => Value::string(to_s(m, receiver)?),
            "to_s" => Value::string(exception_message(receiver)),
            "full_message" => {
                let class = m.core.class_of(receiver).name.clone();
                Value::string(format!("{} ({})", to_s(m, receiver)?, class))
            }
            "backtrace" | "cause" => Value::Nil,
            "exception" => match values {
                [] => receiver.clone(),
                [message] => {
                    let copy = shallow_copy(receiver);
                    ivar_set(m, &copy, "@message", message.clone())?;
                    copy
                }
                _ => return Err(m.argument_count_error(values.len(), "0..1")),
            },
            _ => return Ok(None),
        };
        return Ok(Some(value));
    }

    if is_comparable(m, receiver) && COMPARABLE_METHODS.contains(&name) {
        use core::cmp::Ordering;
        let value = match name {
            "between?" => {
                arity(m, values, 2, 2)?;
                let low = compare_strict(m, receiver, &values[0])?;
                let high = compare_strict(m, receiver, &values[1])?;
                Value::Bool(low != Ordering::Less && high != Ordering::Greater)
            }
            "clamp" => {
                arity(m, values, 2, 2)?;
                if compare_strict(m, receiver, &values[0])? == Ordering::Less {
                    values[0].clone()
                } else if compare_strict(m, receiver, &values[1])? == Ordering::Greater {
                    values[1].clone()
                } else {
                    receiver.clone()
                }
            }
            "==" => {
                arity(m, values, 1, 1)?;
                Value::Bool(receiver.identical(&values[0]) || compare(m, receiver, &values[0])? == Some(Ordering::Equal))
            }
            _ => {
                arity(m, values, 1, 1)?;
                let ordering = compare_strict(m, receiver, &values[0])?;
                Value::Bool(match name {
                    "<" => ordering == Ordering::Less,
                    "<=" => ordering != Ordering::Greater,
                    ">" => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                })
            }
        };
        return Ok(Some(value));
    }
    Ok(None)
}
