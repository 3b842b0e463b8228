//! Per-operation emission.

use super::EmitError;
use super::transform::{Branch, FunctionKind, LoopLabels, Operand, Transform, local_name, quote};
use crate::env::{Resolution, ScopeId};
use crate::error::StructuralError;
use crate::instructions::{BreakPoint, Label, Op, Until};

impl Transform<'_> {
    pub(super) fn transform_op(&mut self, index: usize) -> Result<(), EmitError> {
        let ir = self.ir;
        match &ir.instructions[index].op {
            // ================================================================
            // Literals
            // ================================================================
            Op::PushNil => self.push("Qnil"),
            Op::PushTrue => self.push("Qtrue"),
            Op::PushFalse => self.push("Qfalse"),
            Op::PushSelf => self.push("self"),
            Op::PushInt(n) => self.push(int_literal(*n)),
            Op::PushFloat(x) => self.push(float_literal(*x)),
            Op::PushString { value, frozen } => match *frozen {
                true => self.push(format!("frozen_string({})", quote(value))),
                false => self.exec_push("s", format!("string_new({})", quote(value))),
            },
            Op::PushSymbol(name) => self.push(format!("symbol({})", quote(name))),
            Op::PushRegexp { source, options } => {
                self.exec_push("t", format!("regexp_new({}, {})", quote(source), options))
            }
            Op::PushRange { exclude_end } => {
                let last = self.pop()?;
                let first = self.pop()?;
                self.exec_push("t", format!("range_new({}, {}, {})", first, last, exclude_end));
            }

            // ================================================================
            // Argument plumbing
            // ================================================================
            Op::PushArgc(argc) => self.push_argc(*argc),
            Op::PushArgs {
                for_block,
                min_count,
                max_count,
                spread,
                keyword_args,
            } => {
                let max = max_count.map_or(-1, i64::from);
                self.exec_push(
                    "a",
                    format!(
                        "args_collect(args, {}, {}, {}, {}, {})",
                        min_count, max, for_block, spread, keyword_args
                    ),
                );
            }
            Op::PushArg { index, nil_default } => {
                let accessor = if *nil_default { "at_or_nil" } else { "at" };
                self.exec_push("t", format!("args.{}({})", accessor, index));
            }
            Op::PushBlock => self.exec_push("t", "block_value(block)"),
            Op::PopKeywordArgs => self.exec_push("h", "args.keywords()"),
            Op::CheckRequiredKeywords(names) => {
                let hash = self.peek()?;
                let names: Vec<String> = names.iter().map(|n| quote(n)).collect();
                self.exec(format!(
                    "check_required_keywords({}, {{{}}});",
                    hash,
                    names.join(", ")
                ));
            }
            Op::CheckExtraKeywords => {
                let hash = self.peek()?;
                self.exec(format!("check_extra_keywords({});", hash));
            }

            // ================================================================
            // Stack shuffles and logic
            // ================================================================
            Op::Pop => {
                self.pop()?;
            }
            Op::Dup => {
                let value = self.peek()?;
                self.push(value);
            }
            Op::DupObject => {
                let value = self.peek()?;
                self.exec_push("t", format!("dup_object({})", value));
            }
            Op::DupRel(depth) => {
                let value = self.peek_at(*depth as usize)?;
                self.push(value);
            }
            Op::MoveRel(depth) => {
                let top = self.pop()?;
                let below = self.pop_n(*depth as usize)?;
                self.push(top);
                for value in below {
                    self.push(value);
                }
            }
            Op::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
            }
            Op::Not => {
                let value = self.pop()?;
                self.exec_push("t", format!("bool_value(!truthy({}))", value));
            }
            Op::IsNil => {
                let value = self.pop()?;
                self.exec_push("t", format!("bool_value(is_nil({}))", value));
            }

            // ================================================================
            // Arrays, hashes and strings
            // ================================================================
            Op::CreateArray(count) => {
                let elements = self.pop_n(*count as usize)?;
                self.exec_push("a", format!("array_new({{{}}})", elements.join(", ")));
            }
            Op::ArrayConcat => {
                let other = self.pop()?;
                let array = self.peek()?;
                self.exec(format!("array_concat({}, {});", array, other));
            }
            Op::ArrayPush => {
                let value = self.pop()?;
                let array = self.peek()?;
                self.exec(format!("array_push({}, {});", array, value));
            }
            Op::ArrayShift => {
                let array = self.peek()?;
                self.exec_push("t", format!("array_shift({})", array));
            }
            Op::ArrayShiftWithDefault => {
                let default = self.pop()?;
                let array = self.peek()?;
                self.exec_push("t", format!("array_shift_or({}, {})", array, default));
            }
            Op::ArrayPop => {
                let array = self.peek()?;
                self.exec_push("t", format!("array_pop({})", array));
            }
            Op::ArrayPopWithDefault => {
                let default = self.pop()?;
                let array = self.peek()?;
                self.exec_push("t", format!("array_pop_or({}, {})", array, default));
            }
            Op::ArrayWrap => {
                let value = self.pop()?;
                self.exec_push("a", format!("array_wrap({})", value));
            }
            Op::ArrayIsEmpty => {
                let array = self.peek()?;
                self.exec_push("t", format!("bool_value(array_empty({}))", array));
            }
            Op::ToArray => {
                let value = self.pop()?;
                self.exec_push("a", format!("to_array({})", value));
            }
            Op::CreateHash { count, bare } => {
                let items = self.pop_n(*count as usize * 2)?;
                let pairs: Vec<String> = items
                    .chunks(2)
                    .map(|pair| format!("{{{}, {}}}", pair[0], pair[1]))
                    .collect();
                self.exec_push("h", format!("hash_new({{{}}}, {})", pairs.join(", "), bare));
            }
            Op::HashPut => {
                let value = self.pop()?;
                let key = self.pop()?;
                let hash = self.peek()?;
                self.exec(format!("hash_put({}, {}, {});", hash, key, value));
            }
            Op::HashMerge => {
                let other = self.pop()?;
                let hash = self.peek()?;
                self.exec(format!("hash_merge({}, {});", hash, other));
            }
            Op::HashDelete(name) => {
                let hash = self.peek()?;
                self.exec_push(
                    "t",
                    format!("hash_delete({}, symbol({}))", hash, quote(name)),
                );
            }
            Op::HashDeleteWithDefault(name) => {
                let default = self.pop()?;
                let hash = self.peek()?;
                self.exec_push(
                    "t",
                    format!("hash_delete_or({}, symbol({}), {})", hash, quote(name), default),
                );
            }
            Op::StringAppend => {
                let value = self.pop()?;
                let string = self.peek()?;
                self.exec(format!("string_append({}, {});", string, value));
            }

            // ================================================================
            // Variables and constants
            // ================================================================
            Op::VariableDeclare(name) => {
                let found = self.variable(index, name)?;
                if !found.slot.captured {
                    self.declare_local(name, found.slot.index);
                }
            }
            Op::VariableGet { name, .. } => {
                let found = self.variable(index, name)?;
                if found.slot.captured {
                    self.exec_push(
                        "t",
                        format!("env_get(env, {}, {})", found.depth, found.slot.index),
                    );
                } else {
                    let local = self.declare_local(name, found.slot.index);
                    self.exec_push("t", local);
                }
            }
            Op::VariableSet { name, .. } => {
                let value = self.pop()?;
                let found = self.variable(index, name)?;
                if found.slot.captured {
                    self.exec(format!(
                        "env_set(env, {}, {}, {});",
                        found.depth, found.slot.index, value
                    ));
                } else {
                    let local = local_name(name, found.slot.index);
                    match self.function.declared.insert(local.clone()) {
                        true => self.exec(format!("Value {} = {};", local, value)),
                        false => self.exec(format!("{} = {};", local, value)),
                    }
                }
            }
            Op::InstanceVariableGet(name) => {
                self.exec_push("t", format!("ivar_get(self, {})", quote(name)))
            }
            Op::InstanceVariableSet(name) => {
                let value = self.pop()?;
                self.exec(format!("ivar_set(self, {}, {});", quote(name), value));
            }
            Op::InstanceVariableDefined(name) => {
                self.exec_push("t", format!("ivar_defined(self, {})", quote(name)))
            }
            Op::GlobalVariableGet(name) => self.exec_push("t", format!("gvar_get({})", quote(name))),
            Op::GlobalVariableSet(name) => {
                let value = self.pop()?;
                self.exec(format!("gvar_set({}, {});", quote(name), value));
            }
            Op::GlobalVariableDefined(name) => {
                self.exec_push("t", format!("gvar_defined({})", quote(name)))
            }
            Op::ClassVariableGet(name) => {
                self.exec_push("t", format!("cvar_get(self, {})", quote(name)))
            }
            Op::ClassVariableSet(name) => {
                let value = self.pop()?;
                self.exec(format!("cvar_set(self, {}, {});", quote(name), value));
            }
            Op::ConstFind { name, strict } => {
                let namespace = self.pop()?;
                let lookup = if *strict { "const_find_strict" } else { "const_find" };
                self.exec_push("c", format!("{}({}, {})", lookup, namespace, quote(name)));
            }
            Op::ConstSet(name) => {
                let namespace = self.pop()?;
                let value = self.pop()?;
                self.exec(format!("const_set({}, {}, {});", namespace, quote(name), value));
            }

            // ================================================================
            // Dispatch
            // ================================================================
            Op::Send(call) => {
                let block = self.pop_block(call.with_block)?;
                let args = self.pop_args(call.args_array_on_stack, call.has_keyword_hash)?;
                let receiver = self.pop()?;
                let function = if call.receiver_is_self { "send_self" } else { "send" };
                let expr = format!(
                    "{}({}, {}, {}, {})",
                    function,
                    receiver,
                    quote(&call.message),
                    args,
                    block
                );
                self.exec_push("t", guard_break(call.break_point, expr));
            }
            Op::Super {
                args_array_on_stack,
                with_block,
                has_keyword_hash,
                forward_args,
                break_point,
            } => {
                let expr = if *forward_args {
                    let block = match *with_block {
                        true => self.pop()?,
                        false => "block".to_string(),
                    };
                    format!("super_forward(self, args, {})", block)
                } else {
                    let block = self.pop_block(*with_block)?;
                    let args = self.pop_args(*args_array_on_stack, *has_keyword_hash)?;
                    format!("super_send(self, {}, {})", args, block)
                };
                self.exec_push("t", guard_break(*break_point, expr));
            }
            Op::Yield {
                args_array_on_stack,
                has_keyword_hash,
            } => {
                let args = self.pop_args(*args_array_on_stack, *has_keyword_hash)?;
                self.exec_push("t", format!("yield(block, {})", args));
            }
            Op::CreateLambda {
                break_point,
                return_point,
            } => {
                let block = self.pop()?;
                self.exec_push(
                    "l",
                    format!(
                        "lambda_new({}, {}, {})",
                        block,
                        point(*break_point),
                        point(*return_point)
                    ),
                );
            }

            // ================================================================
            // Control flow
            // ================================================================
            Op::If => {
                let condition = self.pop()?;
                let (then_start, then_end) = self.fetch_block(&[Until::Else, Until::End], Label::If)?;
                let (else_start, else_end) = match ir.instructions[then_end].op {
                    Op::Else(_) => self.fetch_block(&[Until::End], Label::If)?,
                    _ => (then_end, then_end),
                };
                let then = self.with_same_scope(then_start, then_end)?;
                let otherwise = self.with_same_scope(else_start, else_end)?;
                let parts = vec![
                    (format!("if (truthy({})) {{", condition), then),
                    ("} else {".to_string(), otherwise),
                ];
                self.emit_region(index, parts, "}")?;
            }
            Op::While { pre, break_point } => self.emit_while(index, *pre, *break_point)?,
            Op::Try {
                ensure,
                retry_point,
            } => {
                let (body_start, body_end) = self.fetch_block(&[Until::Catch], Label::Try)?;
                let (handler_start, handler_end) = self.fetch_block(&[Until::End], Label::Try)?;
                let body = self.with_same_scope(body_start, body_end)?;
                let handler = self.with_same_scope(handler_start, handler_end)?;
                let head = match *ensure {
                    true => "GARNET_TRY_ENSURE {".to_string(),
                    false => format!("GARNET_TRY({}) {{", point(*retry_point)),
                };
                let parts = vec![(head, body), ("} GARNET_CATCH {".to_string(), handler)];
                self.emit_region(index, parts, "} GARNET_END_TRY;")?;
            }
            Op::Else(label) | Op::End(label) => {
                return Err(StructuralError::Unbalanced {
                    found: *label,
                    index,
                }
                .into());
            }
            Op::WhileBody => {
                return Err(StructuralError::Unbalanced {
                    found: Label::While,
                    index,
                }
                .into());
            }
            Op::Catch => {
                return Err(StructuralError::Unbalanced {
                    found: Label::Try,
                    index,
                }
                .into());
            }
            Op::Reraise => self.exec("reraise();"),
            Op::MatchException => {
                let classes = self.pop()?;
                self.exec_push("t", format!("bool_value(match_exception({}))", classes));
            }
            Op::Break { break_point } => {
                let value = self.pop()?;
                match self.enclosing_loop(index)? {
                    Some(labels) if labels.break_point == *break_point => {
                        self.exec(format!("{} = {}; break;", labels.result, value))
                    }
                    _ => self.exec(format!("throw_break({}, {});", point(*break_point), value)),
                }
            }
            Op::Next => {
                let value = self.pop()?;
                match self.enclosing_loop(index)? {
                    Some(labels) => self.exec(format!("goto next_{};", labels.id)),
                    None => self.exec(format!("return {};", value)),
                }
            }
            Op::Redo => match self.enclosing_loop(index)? {
                Some(labels) => self.exec(format!("goto redo_{};", labels.id)),
                None => self.exec("goto redo;"),
            },
            Op::Retry(id) => self.exec(format!("throw_retry({});", id)),
            Op::Return { return_point } => {
                let value = self.pop()?;
                match return_point {
                    Some(id) => self.exec(format!("throw_return({}, {});", id, value)),
                    None => self.exec(format!("return {};", value)),
                }
            }

            // ================================================================
            // Definitions
            // ================================================================
            Op::DefineMethod {
                name,
                arity,
                return_point,
            } => {
                let (start, end) = self.fetch_block(&[Until::End], Label::DefineMethod)?;
                let scope = self.opened_scope(index)?;
                let function =
                    self.with_new_scope(FunctionKind::Method, "method_", start, end, scope, *return_point)?;
                self.exec(format!(
                    "define_method(self, {}, {}, {});",
                    quote(name),
                    function,
                    arity
                ));
                self.push(format!("symbol({})", quote(name)));
            }
            Op::DefineBlock { arity, is_lambda } => {
                let (start, end) = self.fetch_block(&[Until::End], Label::DefineBlock)?;
                let scope = self.opened_scope(index)?;
                let function = self.with_new_scope(FunctionKind::Block, "block_", start, end, scope, None)?;
                self.exec_push(
                    "blk",
                    format!("block_new(env, {}, {}, {})", function, arity, is_lambda),
                );
            }
            Op::DefineClass {
                name,
                has_superclass,
            } => {
                let superclass = match *has_superclass {
                    true => self.pop()?,
                    false => "Qnil".to_string(),
                };
                let namespace = self.pop()?;
                let function = self.body_function(index, Label::DefineClass)?;
                self.exec_push(
                    "t",
                    format!(
                        "define_class({}, {}, {}, {})",
                        namespace,
                        quote(name),
                        superclass,
                        function
                    ),
                );
            }
            Op::DefineModule { name } => {
                let namespace = self.pop()?;
                let function = self.body_function(index, Label::DefineModule)?;
                self.exec_push(
                    "t",
                    format!("define_module({}, {}, {})", namespace, quote(name), function),
                );
            }
            Op::WithSingleton => {
                let object = self.pop()?;
                let function = self.body_function(index, Label::WithSingleton)?;
                self.exec_push("t", format!("with_singleton({}, {})", object, function));
            }
            Op::AliasMethod => {
                let old_name = self.pop()?;
                let new_name = self.pop()?;
                self.exec(format!("alias_method(self, {}, {});", new_name, old_name));
                self.push("Qnil");
            }
            Op::AliasGlobal { new_name, old_name } => {
                self.exec(format!("alias_global({}, {});", quote(new_name), quote(old_name)));
                self.push("Qnil");
            }
            Op::UndefineMethod(name) => {
                self.exec(format!("undefine_method(self, {});", quote(name)));
                self.push("Qnil");
            }
        }
        Ok(())
    }

    fn emit_while(
        &mut self,
        index: usize,
        pre: bool,
        break_point: Option<BreakPoint>,
    ) -> Result<(), EmitError> {
        let (cond_start, cond_end) = self.fetch_block(&[Until::WhileBody], Label::While)?;
        let (body_start, body_end) = self.fetch_block(&[Until::End], Label::While)?;
        let entry = self.function.stack.len();
        let id = self.next_id();
        let result = format!("loop_{}", id);
        self.function.loops.push(LoopLabels {
            break_point,
            result: result.clone(),
            id,
        });
        let condition = self.with_same_scope(cond_start, cond_end);
        self.function.indent += 1;
        let body = self.with_same_scope(body_start, body_end);
        self.function.indent -= 1;
        self.function.loops.pop();
        let (condition, body) = (condition?, body?);

        let balanced = |part: &Branch, depth: usize| part.stack.len() == depth && part.low_water >= entry;
        if !balanced(&condition, entry + 1) || !balanced(&body, entry) {
            return Err(EmitError::UnbalancedBranches { index });
        }
        let test = match condition.stack.last() {
            Some(Operand::Value(expr)) => expr.clone(),
            _ => return Err(EmitError::ExpectedValue { index }),
        };

        self.exec(format!("Value {} = Qnil;", result));
        self.exec("while (true) {");
        self.function.indent += 1;
        if pre {
            self.function.out.extend(condition.lines.iter().cloned());
            self.exec(format!("if (!truthy({})) break;", test));
        }
        self.exec(format!("redo_{}: {{", id));
        self.function.out.extend(body.lines);
        self.exec("}");
        self.exec(format!("next_{}: ;", id));
        if !pre {
            self.function.out.extend(condition.lines);
            self.exec(format!("if (!truthy({})) break;", test));
        }
        self.function.indent -= 1;
        self.exec("}");
        self.push(result);
        Ok(())
    }

    /// Emit the body of a class, module or singleton region as a function.
    fn body_function(&mut self, opener: usize, label: Label) -> Result<String, EmitError> {
        let (start, end) = self.fetch_block(&[Until::End], label)?;
        let scope = self.opened_scope(opener)?;
        self.with_new_scope(FunctionKind::Body, "body_", start, end, scope, None)
    }

    fn opened_scope(&self, opener: usize) -> Result<ScopeId, EmitError> {
        self.ir
            .scopes
            .opened_by(opener)
            .ok_or_else(|| StructuralError::Unscoped { index: opener }.into())
    }

    fn variable(&self, index: usize, name: &str) -> Result<Resolution, EmitError> {
        let env = self.scope_of(index)?;
        self.ir
            .scopes
            .resolve(env, name)
            .ok_or_else(|| EmitError::UnresolvedVariable {
                name: name.to_string(),
                index,
            })
    }

    /// Declare a plain local as nil on first sight; returns its C++ name.
    fn declare_local(&mut self, name: &str, slot: u32) -> String {
        let local = local_name(name, slot);
        if self.function.declared.insert(local.clone()) {
            self.exec(format!("Value {} = Qnil;", local));
        }
        local
    }

    /// The loop a jump at `index` targets, when that loop is emitted in the
    /// current function.
    fn enclosing_loop(&self, index: usize) -> Result<Option<LoopLabels>, EmitError> {
        if !self.in_loop(index)? {
            return Ok(None);
        }
        Ok(self.function.loops.last().cloned())
    }

    fn pop_block(&mut self, with_block: bool) -> Result<String, EmitError> {
        match with_block {
            true => self.pop(),
            false => Ok("nullptr".to_string()),
        }
    }

    fn pop_args(&mut self, array_on_stack: bool, keyword_hash: bool) -> Result<String, EmitError> {
        if array_on_stack {
            let array = self.pop()?;
            return Ok(format!("Args::splat({}, {})", array, keyword_hash));
        }
        let argc = self.pop_argc()?;
        let values = self.pop_n(argc as usize)?;
        Ok(format!("Args{{{{{}}}, {}}}", values.join(", "), keyword_hash))
    }
}

fn guard_break(break_point: Option<BreakPoint>, expr: String) -> String {
    match break_point {
        Some(id) => format!("guard_break({}, [&]() {{ return {}; }})", id, expr),
        None => expr,
    }
}

fn point(id: Option<BreakPoint>) -> String {
    id.map_or_else(|| "0".to_string(), |id| id.to_string())
}

fn int_literal(n: i64) -> String {
    match n {
        i64::MIN => "int_value(INT64_MIN)".to_string(),
        n => format!("int_value({}LL)", n),
    }
}

fn float_literal(x: f64) -> String {
    if x.is_nan() {
        "float_value(NAN)".to_string()
    } else if x.is_infinite() {
        let sign = if x < 0.0 { "-" } else { "" };
        format!("float_value({}INFINITY)", sign)
    } else {
        format!("float_value({:?})", x)
    }
}
