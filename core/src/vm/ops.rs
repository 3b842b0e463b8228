//! Instruction semantics.
//!
//! `step` only routes; each group of operations lives in its own method so
//! the dispatch loop, which recurses for every guest call, stays small.

use std::rc::Rc;

use super::builtins;
use super::error::{ExecutionError, Unwind};
use super::frame::{Args, Frame, Handler};
use super::machine::{Jump, Machine};
use super::object::{Class, CompiledMethod, Method, Proc};
use super::value::{HashObject, RegexpObject, Value};
use crate::error::StructuralError;
use crate::instructions::{BreakPoint, CallSite, Label, Op};

impl Machine<'_> {
    pub(super) fn step(&mut self, frame: &mut Frame, index: usize) -> Result<(), Unwind> {
        let ir = self.ir;
        let op = &ir.instructions[index].op;
        match op {
            Op::PushNil => self.push(Value::Nil),
            Op::PushTrue => self.push(Value::Bool(true)),
            Op::PushFalse => self.push(Value::Bool(false)),
            Op::PushSelf => self.push(frame.context.self_value.clone()),
            Op::PushInt(n) => self.push(Value::Int(*n)),
            Op::PushFloat(x) => self.push(Value::Float(*x)),
            Op::PushString { value, frozen } => self.push(if *frozen {
                Value::frozen_string(value.as_str())
            } else {
                Value::string(value.as_str())
            }),
            Op::PushSymbol(name) => self.push(Value::symbol(name)),
            Op::PushRegexp { source, options } => self.push(Value::Regexp(Rc::new(RegexpObject {
                source: source.clone(),
                options: *options,
            }))),
            Op::PushRange { exclude_end } => {
                let end = self.pop(index)?;
                let start = self.pop(index)?;
                self.push(Value::range(start, end, *exclude_end));
            }

            Op::PushArgc(n) => self.push(Value::Int(i64::from(*n))),
            Op::PushArgs {
                for_block,
                min_count,
                max_count,
                spread,
                keyword_args,
            } => self.push_args(frame, *for_block, *min_count, *max_count, *spread, *keyword_args)?,
            Op::PushArg { index: position, nil_default } => {
                let values = frame.args.positional(false);
                match values.get(*position as usize) {
                    Some(value) => self.push(value.clone()),
                    None if *nil_default => self.push(Value::Nil),
                    None => return Err(self.argument_count_error(values.len(), &(position + 1).to_string())),
                }
            }
            Op::PushBlock => self.push(match &frame.context.block {
                Some(block) => Value::Proc(block.clone()),
                None => Value::Nil,
            }),
            Op::PopKeywordArgs => self.push(frame.args.keyword_hash()),
            Op::CheckRequiredKeywords(names) => self.check_required_keywords(index, names)?,
            Op::CheckExtraKeywords => self.check_extra_keywords(index)?,

            Op::Pop => {
                self.pop(index)?;
            }
            Op::Dup => {
                let top = self.peek(index)?;
                self.push(top);
            }
            Op::DupObject => {
                let top = self.peek(index)?;
                self.push(builtins::shallow_copy(&top));
            }
            Op::DupRel(n) => {
                let n = *n as usize;
                if self.stack.len() <= self.base + n || !self.stack.dup_at(n) {
                    return Err(ExecutionError::StackUnderflow { index }.into());
                }
            }
            Op::MoveRel(n) => {
                let n = *n as usize;
                if self.stack.len() <= self.base + n || !self.stack.sink(n) {
                    return Err(ExecutionError::StackUnderflow { index }.into());
                }
            }
            Op::Swap => {
                if self.stack.len() < self.base + 2 || !self.stack.swap() {
                    return Err(ExecutionError::StackUnderflow { index }.into());
                }
            }
            Op::Not => {
                let value = self.pop(index)?;
                self.push(Value::Bool(!value.truthy()));
            }
            Op::IsNil => {
                let value = self.pop(index)?;
                self.push(Value::Bool(value.is_nil()));
            }

            Op::CreateArray(_)
            | Op::ArrayConcat
            | Op::ArrayPush
            | Op::ArrayShift
            | Op::ArrayShiftWithDefault
            | Op::ArrayPop
            | Op::ArrayPopWithDefault
            | Op::ArrayWrap
            | Op::ArrayIsEmpty
            | Op::ToArray => self.array_op(index, op)?,

            Op::CreateHash { .. }
            | Op::HashPut
            | Op::HashMerge
            | Op::HashDelete(_)
            | Op::HashDeleteWithDefault(_)
            | Op::StringAppend => self.hash_or_string_op(index, op)?,

            Op::VariableDeclare(_) => {}
            Op::VariableGet { name, default_to_nil } => {
                let value = self.variable_get(frame, index, name, *default_to_nil)?;
                self.push(value);
            }
            Op::VariableSet { name, .. } => {
                let value = self.pop(index)?;
                self.variable_set(frame, index, name, value)?;
            }
            Op::InstanceVariableGet(_)
            | Op::InstanceVariableSet(_)
            | Op::InstanceVariableDefined(_)
            | Op::GlobalVariableGet(_)
            | Op::GlobalVariableSet(_)
            | Op::GlobalVariableDefined(_)
            | Op::ClassVariableGet(_)
            | Op::ClassVariableSet(_) => self.named_variable_op(frame, index, op)?,
            Op::ConstFind { name, strict } => {
                let namespace = self.pop(index)?;
                let value = self.const_find(frame, &namespace, name, *strict)?;
                self.push(value);
            }
            Op::ConstSet(name) => {
                let namespace = self.pop(index)?;
                let value = self.pop(index)?;
                let container = self.container(frame, &namespace);
                container
                    .constants
                    .borrow_mut()
                    .insert(name.clone(), value);
            }

            Op::Send(call) => self.exec_send(index, call)?,
            Op::Super {
                args_array_on_stack,
                with_block,
                has_keyword_hash,
                forward_args,
                break_point,
            } => {
                let block = if *with_block { self.pop_block(index)? } else { None };
                let args = if *forward_args {
                    None
                } else {
                    Some(self.pop_args(index, *args_array_on_stack, *has_keyword_hash)?)
                };
                let result = self.exec_super(frame, args, block, *with_block);
                let value = catch_break(result, *break_point)?;
                self.push(value);
            }
            Op::Yield {
                args_array_on_stack,
                has_keyword_hash,
            } => {
                let args = self.pop_args(index, *args_array_on_stack, *has_keyword_hash)?;
                let Some(block) = frame.context.block.clone() else {
                    return Err(self.raise(&self.core.local_jump_error, "no block given (yield)"));
                };
                let value = self.call_block(&block, args)?;
                self.push(value);
            }
            Op::CreateLambda {
                break_point,
                return_point,
            } => match self.pop(index)? {
                Value::Proc(block) => {
                    let lambda = block.to_lambda(*break_point, *return_point);
                    self.push(Value::Proc(Rc::new(lambda)));
                }
                other => return Err(self.type_error(format!("expected a block, got {:?}", other))),
            },

            Op::If
            | Op::Else(_)
            | Op::End(_)
            | Op::While { .. }
            | Op::WhileBody
            | Op::Try { .. }
            | Op::Catch
            | Op::Reraise
            | Op::MatchException => self.control_op(frame, index, op)?,

            Op::Break { break_point } => {
                let value = self.pop(index)?;
                return Err(Unwind::Break {
                    id: *break_point,
                    value,
                });
            }
            Op::Next => return Err(Unwind::Next(self.pop(index)?)),
            Op::Redo => return Err(Unwind::Redo),
            Op::Retry(id) => return Err(Unwind::Retry(*id)),
            Op::Return { return_point } => {
                let value = self.pop(index)?;
                return Err(Unwind::Return {
                    id: *return_point,
                    value,
                });
            }

            Op::DefineMethod { .. }
            | Op::DefineBlock { .. }
            | Op::DefineClass { .. }
            | Op::DefineModule { .. }
            | Op::WithSingleton
            | Op::AliasMethod
            | Op::AliasGlobal { .. }
            | Op::UndefineMethod(_) => self.definition_op(frame, index, op)?,
        }
        Ok(())
    }

    // === Arguments ===

    fn push_args(
        &mut self,
        frame: &Frame,
        for_block: bool,
        min: u32,
        max: Option<u32>,
        spread: bool,
        keyword_args: bool,
    ) -> Result<(), Unwind> {
        let mut values = frame.args.positional(keyword_args);
        if spread && values.len() == 1 {
            if let Value::Array(elements) = &values[0] {
                let elements = elements.borrow().clone();
                values = elements;
            }
        }
        if !for_block {
            let given = values.len();
            let too_few = given < min as usize;
            let too_many = max.is_some_and(|max| given > max as usize);
            if too_few || too_many {
                let expected = match max {
                    Some(max) if max == min => min.to_string(),
                    Some(max) => format!("{}..{}", min, max),
                    None => format!("{}+", min),
                };
                return Err(self.argument_count_error(given, &expected));
            }
        }
        self.push(Value::array(values));
        Ok(())
    }

    fn check_required_keywords(&mut self, index: usize, names: &[String]) -> Result<(), Unwind> {
        let Value::Hash(hash) = self.peek(index)? else {
            return Err(self.type_error("keyword arguments must be a hash"));
        };
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !hash.borrow().contains_key(&Value::symbol(name)))
            .map(|name| format!(":{}", name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let noun = if missing.len() == 1 { "keyword" } else { "keywords" };
        Err(self.raise(
            &self.core.argument_error,
            format!("missing {}: {}", noun, missing.join(", ")),
        ))
    }

    fn check_extra_keywords(&mut self, index: usize) -> Result<(), Unwind> {
        let Value::Hash(hash) = self.peek(index)? else {
            return Err(self.type_error("keyword arguments must be a hash"));
        };
        let extra: Vec<String> = hash
            .borrow()
            .keys()
            .map(|key| match key {
                Value::Symbol(name) => format!(":{}", name),
                other => format!("{:?}", other),
            })
            .collect();
        if extra.is_empty() {
            return Ok(());
        }
        let noun = if extra.len() == 1 { "keyword" } else { "keywords" };
        Err(self.raise(
            &self.core.argument_error,
            format!("unknown {}: {}", noun, extra.join(", ")),
        ))
    }

    // === Collections ===

    fn top_array(&mut self, index: usize) -> Result<Rc<core::cell::RefCell<Vec<Value>>>, Unwind> {
        match self.peek(index)? {
            Value::Array(array) => Ok(array),
            other => Err(self.type_error(format!("expected an array, got {:?}", other))),
        }
    }

    fn top_hash(&mut self, index: usize) -> Result<Rc<core::cell::RefCell<HashObject>>, Unwind> {
        match self.peek(index)? {
            Value::Hash(hash) => Ok(hash),
            other => Err(self.type_error(format!("expected a hash, got {:?}", other))),
        }
    }

    fn array_op(&mut self, index: usize, op: &Op) -> Result<(), Unwind> {
        match op {
            Op::CreateArray(n) => {
                let elements = self.pop_n(*n as usize, index)?;
                self.push(Value::array(elements));
            }
            Op::ArrayConcat => {
                let other = self.pop(index)?;
                let array = self.top_array(index)?;
                match &other {
                    Value::Array(elements) => {
                        let elements = elements.borrow().clone();
                        array.borrow_mut().extend(elements);
                    }
                    _ => array.borrow_mut().push(other.clone()),
                }
            }
            Op::ArrayPush => {
                let value = self.pop(index)?;
                self.top_array(index)?.borrow_mut().push(value);
            }
            Op::ArrayShift | Op::ArrayShiftWithDefault => {
                let default = match op {
                    Op::ArrayShiftWithDefault => self.pop(index)?,
                    _ => Value::Nil,
                };
                let array = self.top_array(index)?;
                let mut elements = array.borrow_mut();
                let value = if elements.is_empty() {
                    default
                } else {
                    elements.remove(0)
                };
                drop(elements);
                self.push(value);
            }
            Op::ArrayPop | Op::ArrayPopWithDefault => {
                let default = match op {
                    Op::ArrayPopWithDefault => self.pop(index)?,
                    _ => Value::Nil,
                };
                let array = self.top_array(index)?;
                let value = array.borrow_mut().pop().unwrap_or(default);
                self.push(value);
            }
            Op::ArrayWrap => {
                let value = self.pop(index)?;
                let elements = match &value {
                    Value::Array(elements) => elements.borrow().clone(),
                    Value::Nil => Vec::new(),
                    Value::Hash(hash) => hash
                        .borrow()
                        .iter()
                        .map(|(k, v)| Value::array(vec![k.clone(), v.clone()]))
                        .collect(),
                    Value::Range(_) => builtins::range_values(self, &value)?,
                    _ => vec![value.clone()],
                };
                self.push(Value::array(elements));
            }
            Op::ArrayIsEmpty => {
                let empty = self.top_array(index)?.borrow().is_empty();
                self.push(Value::Bool(empty));
            }
            Op::ToArray => {
                let value = self.pop(index)?;
                let elements = match &value {
                    Value::Array(elements) => elements.borrow().clone(),
                    _ => vec![value.clone()],
                };
                self.push(Value::array(elements));
            }
            _ => return Err(StructuralError::UnknownNode(op.name()).into()),
        }
        Ok(())
    }

    fn hash_or_string_op(&mut self, index: usize, op: &Op) -> Result<(), Unwind> {
        match op {
            Op::CreateHash { count, .. } => {
                let flat = self.pop_n(*count as usize * 2, index)?;
                let mut hash = HashObject::new();
                let mut items = flat.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    hash.insert(key, value);
                }
                self.push(Value::hash(hash));
            }
            Op::HashPut => {
                let value = self.pop(index)?;
                let key = self.pop(index)?;
                self.top_hash(index)?.borrow_mut().insert(key, value);
            }
            Op::HashMerge => {
                let other = self.pop(index)?;
                let hash = self.top_hash(index)?;
                match &other {
                    Value::Hash(other) => {
                        let entries: Vec<(Value, Value)> = other.borrow().iter().cloned().collect();
                        let mut hash = hash.borrow_mut();
                        for (key, value) in entries {
                            hash.insert(key, value);
                        }
                    }
                    Value::Nil => {}
                    other => {
                        let class = self.core.class_of(other).name.clone();
                        return Err(self.type_error(format!("no implicit conversion of {} into Hash", class)));
                    }
                }
            }
            Op::HashDelete(name) | Op::HashDeleteWithDefault(name) => {
                let default = match op {
                    Op::HashDeleteWithDefault(_) => self.pop(index)?,
                    _ => Value::Nil,
                };
                let hash = self.top_hash(index)?;
                let value = hash.borrow_mut().remove(&Value::symbol(name)).unwrap_or(default);
                self.push(value);
            }
            Op::StringAppend => {
                let value = self.pop(index)?;
                let text = builtins::to_s(self, &value)?;
                match self.peek(index)? {
                    Value::Str(string) if !string.frozen.get() => string.value.borrow_mut().push_str(&text),
                    Value::Str(string) => {
                        let message = format!("can't modify frozen String: {:?}", string.value.borrow());
                        return Err(self.raise(&self.core.frozen_error, message));
                    }
                    other => return Err(self.type_error(format!("expected a string, got {:?}", other))),
                }
            }
            _ => return Err(StructuralError::UnknownNode(op.name()).into()),
        }
        Ok(())
    }

    // === Variables and constants ===

    fn variable_get(&mut self, frame: &Frame, index: usize, name: &str, default_to_nil: bool) -> Result<Value, Unwind> {
        let scope = self.scope_of(index)?;
        match self.ir.scopes.resolve(scope, name) {
            Some(found) => Ok(frame
                .env
                .get(found.depth, found.slot.index)
                .unwrap_or(Value::Nil)),
            None if default_to_nil => Ok(Value::Nil),
            None => Err(self.raise(
                &self.core.name_error,
                format!("undefined local variable or method '{}'", name),
            )),
        }
    }

    fn variable_set(&mut self, frame: &Frame, index: usize, name: &str, value: Value) -> Result<(), Unwind> {
        let scope = self.scope_of(index)?;
        let Some(found) = self.ir.scopes.resolve(scope, name) else {
            return Err(StructuralError::Unscoped { index }.into());
        };
        if !frame.env.set(found.depth, found.slot.index, value) {
            return Err(StructuralError::Unscoped { index }.into());
        }
        Ok(())
    }

    fn named_variable_op(&mut self, frame: &Frame, index: usize, op: &Op) -> Result<(), Unwind> {
        let self_value = frame.context.self_value.clone();
        match op {
            Op::InstanceVariableGet(name) => {
                let value = builtins::ivar_get(&self_value, name);
                self.push(value);
            }
            Op::InstanceVariableSet(name) => {
                let value = self.pop(index)?;
                builtins::ivar_set(self, &self_value, name, value)?;
            }
            Op::InstanceVariableDefined(name) => {
                let defined = match &self_value {
                    Value::Object(object) => object.ivars.borrow().contains_key(name.as_str()),
                    Value::Class(class) => class.ivars.borrow().contains_key(name.as_str()),
                    _ => false,
                };
                self.push(defined_as(defined, "instance-variable"));
            }
            Op::GlobalVariableGet(name) => {
                let name = self.global_name(name);
                let value = self.globals.get(&name).cloned().unwrap_or(Value::Nil);
                self.push(value);
            }
            Op::GlobalVariableSet(name) => {
                let value = self.pop(index)?;
                let name = self.global_name(name);
                self.globals.insert(name, value);
            }
            Op::GlobalVariableDefined(name) => {
                let name = self.global_name(name);
                let defined = self.globals.contains_key(&name);
                self.push(defined_as(defined, "global-variable"));
            }
            Op::ClassVariableGet(name) => {
                let class = frame.context.cref.clone();
                let value = class
                    .class_var_owner(name)
                    .and_then(|owner| owner.class_vars.borrow().get(name.as_str()).cloned());
                match value {
                    Some(value) => self.push(value),
                    None => {
                        return Err(self.raise(
                            &self.core.name_error,
                            format!("uninitialized class variable {} in {}", name, class.name),
                        ));
                    }
                }
            }
            Op::ClassVariableSet(name) => {
                let value = self.pop(index)?;
                let class = frame.context.cref.clone();
                let owner = class.class_var_owner(name).unwrap_or(class);
                owner.class_vars.borrow_mut().insert(name.clone(), value);
            }
            _ => return Err(StructuralError::UnknownNode(op.name()).into()),
        }
        Ok(())
    }

    /// Follow `alias $new $old` chains.
    fn global_name(&self, name: &str) -> String {
        let mut current = name;
        for _ in 0..self.global_aliases.len() {
            match self.global_aliases.get(current) {
                Some(target) => current = target,
                None => break,
            }
        }
        current.to_string()
    }

    /// The class a definition or constant assignment lands in.
    fn container(&self, frame: &Frame, namespace: &Value) -> Rc<Class> {
        match namespace {
            Value::Class(class) => class.clone(),
            _ => frame.context.cref.clone(),
        }
    }

    fn const_find(&mut self, frame: &Frame, namespace: &Value, name: &str, strict: bool) -> Result<Value, Unwind> {
        if strict {
            let Value::Class(class) = namespace else {
                return Err(self.type_error(format!("{:?} is not a class/module", namespace)));
            };
            return class.find_constant(name).ok_or_else(|| {
                self.raise(
                    &self.core.name_error,
                    format!("uninitialized constant {}::{}", class.name, name),
                )
            });
        }

        let cref = self.container(frame, namespace);
        let mut lexical = Some(cref.clone());
        while let Some(class) = lexical {
            if let Some(value) = class.constants.borrow().get(name) {
                return Ok(value.clone());
            }
            lexical = class.lexical_parent();
        }
        cref.find_constant(name)
            .or_else(|| self.core.object.find_constant(name))
            .ok_or_else(|| {
                self.raise(
                    &self.core.name_error,
                    format!("uninitialized constant {}", name),
                )
            })
    }

    // === Calls ===

    pub(super) fn pop_block(&mut self, index: usize) -> Result<Option<Rc<Proc>>, Unwind> {
        match self.pop(index)? {
            Value::Nil => Ok(None),
            Value::Proc(block) => Ok(Some(block)),
            other => {
                let class = self.core.class_of(&other).name.clone();
                Err(self.type_error(format!("wrong argument type {} (expected Proc)", class)))
            }
        }
    }

    pub(super) fn pop_args(&mut self, index: usize, array_on_stack: bool, has_keyword_hash: bool) -> Result<Args, Unwind> {
        let mut values = if array_on_stack {
            match self.pop(index)? {
                Value::Array(elements) => elements.borrow().clone(),
                other => vec![other],
            }
        } else {
            let argc = match self.pop(index)? {
                Value::Int(n) if n >= 0 => n as usize,
                other => return Err(self.type_error(format!("expected an argument count, got {:?}", other))),
            };
            self.pop_n(argc, index)?
        };
        let mut args = Args::default();
        if has_keyword_hash {
            match values.pop() {
                Some(Value::Hash(hash)) if hash.borrow().is_empty() => {}
                Some(hash @ Value::Hash(_)) => args.keywords = Some(hash),
                Some(other) => values.push(other),
                None => {}
            }
        }
        args.values = values.into_iter().collect();
        Ok(args)
    }

    fn exec_send(&mut self, index: usize, call: &CallSite) -> Result<(), Unwind> {
        let block = if call.with_block { self.pop_block(index)? } else { None };
        let args = self.pop_args(index, call.args_array_on_stack, call.has_keyword_hash)?;
        let receiver = self.pop(index)?;
        let result = self.send(receiver, &call.message, args, block);
        let value = catch_break(result, call.break_point)?;
        self.push(value);
        Ok(())
    }

    fn exec_super(&mut self, frame: &Frame, args: Option<Args>, block: Option<Rc<Proc>>, with_block: bool) -> Result<Value, Unwind> {
        let Some(current) = frame.context.method.as_ref() else {
            return Err(self.raise(&self.core.runtime_error, "super called outside of method"));
        };
        let name = current.method.name.clone();
        let args = args.unwrap_or_else(|| current.args.clone());
        let block = if with_block { block } else { frame.context.block.clone() };
        let receiver = frame.context.self_value.clone();
        let class = self.core.dispatch_class(&receiver);
        if let Some((method, owner)) = class.find_super_method(&current.owner, &name) {
            return self.call_method(receiver, &name, method, owner, args, block);
        }
        match builtins::call(self, &receiver, &name, args, block)? {
            Some(value) => Ok(value),
            None => Err(self.raise(
                &self.core.no_method_error,
                format!("super: no superclass method '{}'", name),
            )),
        }
    }

    // === Control flow ===

    fn control_op(&mut self, frame: &mut Frame, index: usize, op: &Op) -> Result<(), Unwind> {
        match op {
            Op::If => {
                let condition = self.pop(index)?;
                if !condition.truthy() {
                    let (middle, end) = self.region(index)?;
                    frame.ip = middle.unwrap_or(end) + 1;
                }
            }
            // Reached only at the end of the first part.
            Op::Else(_) => match self.jump(index)? {
                Jump::Middle { end, .. } => frame.ip = end + 1,
                _ => return Err(StructuralError::Unbalanced { found: Label::If, index }.into()),
            },
            Op::End(Label::While) => {
                let Jump::End { opener } = self.jump(index)? else {
                    return Err(StructuralError::Unbalanced { found: Label::While, index }.into());
                };
                frame.ip = opener + 1;
            }
            Op::End(Label::Try) => {
                frame.handlers.pop();
            }
            Op::End(_) => {}
            Op::While { pre, break_point } => {
                let (middle, end) = self.region(index)?;
                let Some(body) = middle else {
                    return Err(StructuralError::Unterminated { label: Label::While, start: index }.into());
                };
                frame.handlers.push(Handler::Loop {
                    opener: index,
                    body,
                    end,
                    depth: self.stack.len(),
                    break_point: *break_point,
                });
                if !pre {
                    frame.ip = body + 1;
                }
            }
            Op::WhileBody => {
                let condition = self.pop(index)?;
                let Jump::Middle { opener, end } = self.jump(index)? else {
                    return Err(StructuralError::Unbalanced { found: Label::While, index }.into());
                };
                if condition.truthy() {
                    self.tick()?;
                } else {
                    if let Some(Handler::Loop { opener: open, .. }) = frame.handlers.last() {
                        if *open == opener {
                            frame.handlers.pop();
                        }
                    }
                    self.push(Value::Nil);
                    frame.ip = end + 1;
                }
            }
            Op::Try { ensure, retry_point } => {
                let (middle, end) = self.region(index)?;
                let Some(catch) = middle else {
                    return Err(StructuralError::Unterminated { label: Label::Try, start: index }.into());
                };
                frame.handlers.push(Handler::Try {
                    opener: index,
                    catch,
                    end,
                    depth: self.stack.len(),
                    ensure: *ensure,
                    retry_point: *retry_point,
                    pending: None,
                });
            }
            // The body finished normally: skip the handler part.
            Op::Catch => {
                let Jump::Middle { end, .. } = self.jump(index)? else {
                    return Err(StructuralError::Unbalanced { found: Label::Try, index }.into());
                };
                frame.handlers.pop();
                frame.ip = end + 1;
            }
            Op::Reraise => {
                let pending = frame.handlers.iter().rev().find_map(|handler| match handler {
                    Handler::Try {
                        pending: Some(unwind),
                        ..
                    } => Some(unwind.clone()),
                    _ => None,
                });
                return Err(match pending {
                    Some(unwind) => unwind,
                    None => match self.globals.get("$!") {
                        Some(exception) if !exception.is_nil() => Unwind::Raise(exception.clone()),
                        _ => self.raise(&self.core.runtime_error, "unhandled exception"),
                    },
                });
            }
            Op::MatchException => {
                let classes = self.pop(index)?;
                let exception = frame
                    .current_exception()
                    .or_else(|| self.globals.get("$!").cloned())
                    .unwrap_or(Value::Nil);
                let class = self.core.class_of(&exception);
                let candidates = match &classes {
                    Value::Array(elements) => elements.borrow().clone(),
                    other => vec![other.clone()],
                };
                let matched = candidates.iter().any(|candidate| match candidate {
                    Value::Class(candidate) => class.is_subclass_of(candidate),
                    _ => false,
                });
                self.push(Value::Bool(matched));
            }
            _ => return Err(StructuralError::UnknownNode(op.name()).into()),
        }
        Ok(())
    }

    // === Definitions ===

    fn definition_op(&mut self, frame: &mut Frame, index: usize, op: &Op) -> Result<(), Unwind> {
        match op {
            Op::DefineMethod {
                name,
                arity,
                return_point,
            } => {
                let (_, end) = self.region(index)?;
                let method = CompiledMethod {
                    name: name.clone(),
                    opener: index,
                    scope: self.opened_scope(index)?,
                    arity: *arity,
                    return_point: *return_point,
                    cref: frame.context.cref.clone(),
                };
                frame
                    .context
                    .cref
                    .define_method(name, Method::Compiled(Rc::new(method)));
                frame.ip = end + 1;
                self.push(Value::symbol(name));
            }
            Op::DefineBlock { arity, is_lambda } => {
                let (_, end) = self.region(index)?;
                let block = Proc {
                    opener: index,
                    scope: self.opened_scope(index)?,
                    arity: *arity,
                    env: frame.env.clone(),
                    context: frame.context.clone(),
                    is_lambda: *is_lambda,
                    break_point: None,
                    return_point: None,
                };
                frame.ip = end + 1;
                self.push(Value::Proc(Rc::new(block)));
            }
            Op::DefineClass { name, has_superclass } => {
                let superclass = if *has_superclass {
                    match self.pop(index)? {
                        Value::Class(class) if !class.is_module => Some(class),
                        other => {
                            return Err(self.type_error(format!("superclass must be a Class ({:?} given)", other)));
                        }
                    }
                } else {
                    None
                };
                let namespace = self.pop(index)?;
                let container = self.container(frame, &namespace);
                let class = self.open_class(&container, name, superclass)?;
                self.enter_body(frame, index, class)?;
            }
            Op::DefineModule { name } => {
                let namespace = self.pop(index)?;
                let container = self.container(frame, &namespace);
                let existing = container.constants.borrow().get(name.as_str()).cloned();
                let module = match existing {
                    Some(Value::Class(module)) if module.is_module => module,
                    Some(_) => return Err(self.type_error(format!("{} is not a module", name))),
                    None => {
                        let module = Class::module(qualified(&container, name, &self.core.object), Some(&container));
                        container
                            .constants
                            .borrow_mut()
                            .insert(name.clone(), Value::Class(module.clone()));
                        module
                    }
                };
                self.enter_body(frame, index, module)?;
            }
            Op::WithSingleton => {
                let object = self.pop(index)?;
                let singleton = match &object {
                    Value::Object(object) => object.singleton_class(),
                    Value::Class(class) => class.singleton_class(),
                    other => {
                        let class = self.core.class_of(other).name.clone();
                        return Err(self.type_error(format!("can't define singleton for {}", class)));
                    }
                };
                self.enter_body(frame, index, singleton)?;
            }
            Op::AliasMethod => {
                let old = self.pop(index)?;
                let new = self.pop(index)?;
                let (Value::Symbol(new), Value::Symbol(old)) = (new, old) else {
                    return Err(self.type_error("alias names must be symbols"));
                };
                let class = frame.context.cref.clone();
                let method = match class.find_method(&old) {
                    Some((method, _)) => method,
                    None => return Err(self.raise(
                        &self.core.name_error,
                        format!("undefined method '{}' for class '{}'", old, class.name),
                    )),
                };
                class.define_method(&new, method);
                self.push(Value::Nil);
            }
            Op::AliasGlobal { new_name, old_name } => {
                self.global_aliases.insert(new_name.clone(), old_name.clone());
                self.push(Value::Nil);
            }
            Op::UndefineMethod(name) => {
                frame.context.cref.define_method(name, Method::Undefined);
                self.push(Value::Nil);
            }
            _ => return Err(StructuralError::UnknownNode(op.name()).into()),
        }
        Ok(())
    }

    fn open_class(&self, container: &Rc<Class>, name: &str, superclass: Option<Rc<Class>>) -> Result<Rc<Class>, Unwind> {
        let existing = container.constants.borrow().get(name).cloned();
        match existing {
            Some(Value::Class(class)) if !class.is_module => {
                if let Some(superclass) = &superclass {
                    let same = class
                        .superclass
                        .as_ref()
                        .is_some_and(|current| Rc::ptr_eq(current, superclass));
                    if !same {
                        return Err(self.type_error(format!("superclass mismatch for class {}", name)));
                    }
                }
                Ok(class)
            }
            Some(_) => Err(self.type_error(format!("{} is not a class", name))),
            None => {
                let superclass = superclass.unwrap_or_else(|| self.core.object.clone());
                let class = Class::nested(qualified(container, name, &self.core.object), Some(superclass), container);
                container
                    .constants
                    .borrow_mut()
                    .insert(name.to_string(), Value::Class(class.clone()));
                Ok(class)
            }
        }
    }

    /// Run the body region at `index` with `class` as `self` and push its value.
    fn enter_body(&mut self, frame: &mut Frame, index: usize, class: Rc<Class>) -> Result<(), Unwind> {
        let (_, end) = self.region(index)?;
        let value = self.run_body(index, class.clone(), Value::Class(class))?;
        frame.ip = end + 1;
        self.push(value);
        Ok(())
    }
}

/// A call carrying a break point absorbs breaks aimed at it.
fn catch_break(result: Result<Value, Unwind>, break_point: Option<BreakPoint>) -> Result<Value, Unwind> {
    match result {
        Err(Unwind::Break { id: Some(id), value }) if break_point == Some(id) => Ok(value),
        other => other,
    }
}

fn defined_as(defined: bool, description: &str) -> Value {
    if defined {
        Value::frozen_string(description)
    } else {
        Value::Nil
    }
}

fn qualified(container: &Rc<Class>, name: &str, object: &Rc<Class>) -> String {
    if Rc::ptr_eq(container, object) {
        name.to_string()
    } else {
        format!("{}::{}", container.name, name)
    }
}
