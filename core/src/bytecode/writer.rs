use super::integer::{write_ber, write_compact};
use super::rodata::Rodata;
use super::{MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::instructions::{BreakPoint, Label, Op};

/// Accumulates the opcode stream and the constant pool it references.
#[derive(Debug, Default)]
pub struct Writer {
    code: Vec<u8>,
    rodata: Rodata,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, op: &Op) {
        self.code.push(op.opcode() as u8);
        match op {
            Op::PushInt(value) => self.compact(*value),
            Op::PushFloat(value) => self.code.extend_from_slice(&value.to_be_bytes()),
            Op::PushString { value, frozen } => {
                self.string(value);
                self.bool(*frozen);
            }
            Op::PushRegexp { source, options } => {
                self.string(source);
                self.ber(u64::from(*options));
            }
            Op::PushRange { exclude_end } => self.bool(*exclude_end),
            Op::PushArgc(n) | Op::CreateArray(n) | Op::DupRel(n) | Op::MoveRel(n) => {
                self.ber(u64::from(*n))
            }
            Op::PushArgs {
                for_block,
                min_count,
                max_count,
                spread,
                keyword_args,
            } => {
                self.bool(*for_block);
                self.ber(u64::from(*min_count));
                self.option(max_count.map(u64::from));
                self.bool(*spread);
                self.bool(*keyword_args);
            }
            Op::PushArg { index, nil_default } => {
                self.ber(u64::from(*index));
                self.bool(*nil_default);
            }
            Op::CheckRequiredKeywords(names) => {
                self.ber(names.len() as u64);
                for name in names {
                    self.string(name);
                }
            }
            Op::CreateHash { count, bare } => {
                self.ber(u64::from(*count));
                self.bool(*bare);
            }
            Op::PushSymbol(name)
            | Op::HashDelete(name)
            | Op::HashDeleteWithDefault(name)
            | Op::VariableDeclare(name)
            | Op::InstanceVariableGet(name)
            | Op::InstanceVariableSet(name)
            | Op::InstanceVariableDefined(name)
            | Op::GlobalVariableGet(name)
            | Op::GlobalVariableSet(name)
            | Op::GlobalVariableDefined(name)
            | Op::ClassVariableGet(name)
            | Op::ClassVariableSet(name)
            | Op::ConstSet(name)
            | Op::DefineModule { name }
            | Op::UndefineMethod(name) => self.string(name),
            Op::VariableGet {
                name,
                default_to_nil: flag,
            }
            | Op::VariableSet {
                name,
                local_only: flag,
            }
            | Op::ConstFind { name, strict: flag }
            | Op::DefineClass {
                name,
                has_superclass: flag,
            } => {
                self.string(name);
                self.bool(*flag);
            }
            Op::Send(call) => {
                self.string(&call.message);
                self.bool(call.receiver_is_self);
                self.bool(call.with_block);
                self.bool(call.args_array_on_stack);
                self.bool(call.has_keyword_hash);
                self.point(call.break_point);
            }
            Op::Super {
                args_array_on_stack,
                with_block,
                has_keyword_hash,
                forward_args,
                break_point,
            } => {
                self.bool(*args_array_on_stack);
                self.bool(*with_block);
                self.bool(*has_keyword_hash);
                self.bool(*forward_args);
                self.point(*break_point);
            }
            Op::Yield {
                args_array_on_stack,
                has_keyword_hash,
            } => {
                self.bool(*args_array_on_stack);
                self.bool(*has_keyword_hash);
            }
            Op::CreateLambda {
                break_point,
                return_point,
            } => {
                self.point(*break_point);
                self.point(*return_point);
            }
            Op::Else(label) | Op::End(label) => self.label(*label),
            Op::While { pre: flag, break_point }
            | Op::Try {
                ensure: flag,
                retry_point: break_point,
            } => {
                self.bool(*flag);
                self.point(*break_point);
            }
            Op::Break { break_point: point } | Op::Return { return_point: point } => {
                self.point(*point)
            }
            Op::Retry(id) => self.ber(id.0),
            Op::DefineMethod {
                name,
                arity,
                return_point,
            } => {
                self.string(name);
                self.compact(i64::from(*arity));
                self.point(*return_point);
            }
            Op::DefineBlock { arity, is_lambda } => {
                self.compact(i64::from(*arity));
                self.bool(*is_lambda);
            }
            Op::AliasGlobal { new_name, old_name } => {
                self.string(new_name);
                self.string(old_name);
            }
            Op::PushNil
            | Op::PushTrue
            | Op::PushFalse
            | Op::PushSelf
            | Op::PushBlock
            | Op::PopKeywordArgs
            | Op::CheckExtraKeywords
            | Op::Pop
            | Op::Dup
            | Op::DupObject
            | Op::Swap
            | Op::Not
            | Op::IsNil
            | Op::ArrayConcat
            | Op::ArrayPush
            | Op::ArrayShift
            | Op::ArrayShiftWithDefault
            | Op::ArrayPop
            | Op::ArrayPopWithDefault
            | Op::ArrayWrap
            | Op::ArrayIsEmpty
            | Op::ToArray
            | Op::HashPut
            | Op::HashMerge
            | Op::StringAppend
            | Op::If
            | Op::WhileBody
            | Op::Catch
            | Op::Reraise
            | Op::MatchException
            | Op::Next
            | Op::Redo
            | Op::WithSingleton
            | Op::AliasMethod => {}
        }
    }

    /// Header, pool and stream.
    pub fn finish(self) -> Vec<u8> {
        let pool = self.rodata.as_bytes();
        let mut out = Vec::with_capacity(MAGIC.len() + 2 + 5 + pool.len() + self.code.len());
        out.extend_from_slice(MAGIC);
        out.push(MAJOR_VERSION);
        out.push(MINOR_VERSION);
        write_ber(&mut out, pool.len() as u64);
        out.extend_from_slice(pool);
        out.extend_from_slice(&self.code);
        out
    }

    // === Operands ===

    fn bool(&mut self, value: bool) {
        self.code.push(u8::from(value));
    }

    fn ber(&mut self, value: u64) {
        write_ber(&mut self.code, value);
    }

    fn compact(&mut self, value: i64) {
        write_compact(&mut self.code, value);
    }

    fn option(&mut self, value: Option<u64>) {
        self.ber(value.map_or(0, |n| n + 1));
    }

    fn point(&mut self, point: Option<BreakPoint>) {
        self.option(point.map(|id| id.0));
    }

    fn string(&mut self, value: &str) {
        let offset = self.rodata.intern(value);
        self.ber(offset);
    }

    fn label(&mut self, label: Label) {
        self.code.push(label as u8);
    }
}
