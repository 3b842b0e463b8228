use super::integer::{read_ber, read_compact};
use super::rodata::RodataView;
use super::{BytecodeError, MAGIC, MAJOR_VERSION, MINOR_VERSION};
use crate::instructions::{BreakPoint, CallSite, Label, Op, Opcode};

/// Decodes the opcode stream of a bytecode file one operation at a time.
pub struct Reader<'b> {
    bytes: &'b [u8],
    rodata: RodataView<'b>,
    position: usize,
}

impl<'b> Reader<'b> {
    /// Check the header and locate the constant pool.
    pub fn new(bytes: &'b [u8]) -> Result<Self, BytecodeError> {
        if bytes.len() < MAGIC.len() || &bytes[..MAGIC.len()] != MAGIC {
            return Err(BytecodeError::BadMagic);
        }
        let (major, minor) = match bytes.get(MAGIC.len()..MAGIC.len() + 2) {
            Some(&[major, minor]) => (major, minor),
            _ => {
                return Err(BytecodeError::Truncated {
                    offset: bytes.len(),
                });
            }
        };
        if major != MAJOR_VERSION || minor > MINOR_VERSION {
            return Err(BytecodeError::UnsupportedVersion { major, minor });
        }

        let mut reader = Self {
            bytes,
            rodata: RodataView::new(&[]),
            position: MAGIC.len() + 2,
        };
        let pool_len = usize::try_from(reader.ber()?).map_err(|_| BytecodeError::Overflow {
            offset: reader.position,
        })?;
        let pool_end = reader
            .position
            .checked_add(pool_len)
            .filter(|&end| end <= bytes.len())
            .ok_or(BytecodeError::Truncated {
                offset: bytes.len(),
            })?;
        reader.rodata = RodataView::new(&bytes[reader.position..pool_end]);
        reader.position = pool_end;
        Ok(reader)
    }

    /// The next operation, or `None` at the end of the stream.
    pub fn next_op(&mut self) -> Result<Option<Op>, BytecodeError> {
        let Some(&byte) = self.bytes.get(self.position) else {
            return Ok(None);
        };
        let opcode = Opcode::from_u8(byte).ok_or(BytecodeError::UnknownOpcode {
            byte,
            offset: self.position,
        })?;
        self.position += 1;

        let op = match opcode {
            Opcode::PushNil => Op::PushNil,
            Opcode::PushTrue => Op::PushTrue,
            Opcode::PushFalse => Op::PushFalse,
            Opcode::PushSelf => Op::PushSelf,
            Opcode::PushInt => Op::PushInt(self.compact()?),
            Opcode::PushFloat => Op::PushFloat(self.float()?),
            Opcode::PushString => Op::PushString {
                value: self.string()?,
                frozen: self.bool()?,
            },
            Opcode::PushSymbol => Op::PushSymbol(self.string()?),
            Opcode::PushRegexp => Op::PushRegexp {
                source: self.string()?,
                options: self.u32()?,
            },
            Opcode::PushRange => Op::PushRange {
                exclude_end: self.bool()?,
            },
            Opcode::PushArgc => Op::PushArgc(self.u32()?),
            Opcode::PushArgs => Op::PushArgs {
                for_block: self.bool()?,
                min_count: self.u32()?,
                max_count: self.option_u32()?,
                spread: self.bool()?,
                keyword_args: self.bool()?,
            },
            Opcode::PushArg => Op::PushArg {
                index: self.u32()?,
                nil_default: self.bool()?,
            },
            Opcode::PushBlock => Op::PushBlock,
            Opcode::PopKeywordArgs => Op::PopKeywordArgs,
            Opcode::CheckRequiredKeywords => {
                let count = self.u32()?;
                let mut names = Vec::with_capacity(count.min(64) as usize);
                for _ in 0..count {
                    names.push(self.string()?);
                }
                Op::CheckRequiredKeywords(names)
            }
            Opcode::CheckExtraKeywords => Op::CheckExtraKeywords,
            Opcode::Pop => Op::Pop,
            Opcode::Dup => Op::Dup,
            Opcode::DupObject => Op::DupObject,
            Opcode::DupRel => Op::DupRel(self.u32()?),
            Opcode::MoveRel => Op::MoveRel(self.u32()?),
            Opcode::Swap => Op::Swap,
            Opcode::Not => Op::Not,
            Opcode::IsNil => Op::IsNil,
            Opcode::CreateArray => Op::CreateArray(self.u32()?),
            Opcode::ArrayConcat => Op::ArrayConcat,
            Opcode::ArrayPush => Op::ArrayPush,
            Opcode::ArrayShift => Op::ArrayShift,
            Opcode::ArrayShiftWithDefault => Op::ArrayShiftWithDefault,
            Opcode::ArrayPop => Op::ArrayPop,
            Opcode::ArrayPopWithDefault => Op::ArrayPopWithDefault,
            Opcode::ArrayWrap => Op::ArrayWrap,
            Opcode::ArrayIsEmpty => Op::ArrayIsEmpty,
            Opcode::ToArray => Op::ToArray,
            Opcode::CreateHash => Op::CreateHash {
                count: self.u32()?,
                bare: self.bool()?,
            },
            Opcode::HashPut => Op::HashPut,
            Opcode::HashMerge => Op::HashMerge,
            Opcode::HashDelete => Op::HashDelete(self.string()?),
            Opcode::HashDeleteWithDefault => Op::HashDeleteWithDefault(self.string()?),
            Opcode::StringAppend => Op::StringAppend,
            Opcode::VariableDeclare => Op::VariableDeclare(self.string()?),
            Opcode::VariableGet => Op::VariableGet {
                name: self.string()?,
                default_to_nil: self.bool()?,
            },
            Opcode::VariableSet => Op::VariableSet {
                name: self.string()?,
                local_only: self.bool()?,
            },
            Opcode::InstanceVariableGet => Op::InstanceVariableGet(self.string()?),
            Opcode::InstanceVariableSet => Op::InstanceVariableSet(self.string()?),
            Opcode::InstanceVariableDefined => Op::InstanceVariableDefined(self.string()?),
            Opcode::GlobalVariableGet => Op::GlobalVariableGet(self.string()?),
            Opcode::GlobalVariableSet => Op::GlobalVariableSet(self.string()?),
            Opcode::GlobalVariableDefined => Op::GlobalVariableDefined(self.string()?),
            Opcode::ClassVariableGet => Op::ClassVariableGet(self.string()?),
            Opcode::ClassVariableSet => Op::ClassVariableSet(self.string()?),
            Opcode::ConstFind => Op::ConstFind {
                name: self.string()?,
                strict: self.bool()?,
            },
            Opcode::ConstSet => Op::ConstSet(self.string()?),
            Opcode::Send => Op::Send(CallSite {
                message: self.string()?,
                receiver_is_self: self.bool()?,
                with_block: self.bool()?,
                args_array_on_stack: self.bool()?,
                has_keyword_hash: self.bool()?,
                break_point: self.point()?,
            }),
            Opcode::Super => Op::Super {
                args_array_on_stack: self.bool()?,
                with_block: self.bool()?,
                has_keyword_hash: self.bool()?,
                forward_args: self.bool()?,
                break_point: self.point()?,
            },
            Opcode::Yield => Op::Yield {
                args_array_on_stack: self.bool()?,
                has_keyword_hash: self.bool()?,
            },
            Opcode::CreateLambda => Op::CreateLambda {
                break_point: self.point()?,
                return_point: self.point()?,
            },
            Opcode::If => Op::If,
            Opcode::Else => Op::Else(self.label()?),
            Opcode::End => Op::End(self.label()?),
            Opcode::While => Op::While {
                pre: self.bool()?,
                break_point: self.point()?,
            },
            Opcode::WhileBody => Op::WhileBody,
            Opcode::Try => Op::Try {
                ensure: self.bool()?,
                retry_point: self.point()?,
            },
            Opcode::Catch => Op::Catch,
            Opcode::Reraise => Op::Reraise,
            Opcode::MatchException => Op::MatchException,
            Opcode::Break => Op::Break {
                break_point: self.point()?,
            },
            Opcode::Next => Op::Next,
            Opcode::Redo => Op::Redo,
            Opcode::Retry => Op::Retry(BreakPoint(self.ber()?)),
            Opcode::Return => Op::Return {
                return_point: self.point()?,
            },
            Opcode::DefineMethod => Op::DefineMethod {
                name: self.string()?,
                arity: self.i32()?,
                return_point: self.point()?,
            },
            Opcode::DefineBlock => Op::DefineBlock {
                arity: self.i32()?,
                is_lambda: self.bool()?,
            },
            Opcode::DefineClass => Op::DefineClass {
                name: self.string()?,
                has_superclass: self.bool()?,
            },
            Opcode::DefineModule => Op::DefineModule {
                name: self.string()?,
            },
            Opcode::WithSingleton => Op::WithSingleton,
            Opcode::AliasMethod => Op::AliasMethod,
            Opcode::AliasGlobal => Op::AliasGlobal {
                new_name: self.string()?,
                old_name: self.string()?,
            },
            Opcode::UndefineMethod => Op::UndefineMethod(self.string()?),
        };
        Ok(Some(op))
    }

    // === Operands ===

    fn truncated(&self) -> BytecodeError {
        BytecodeError::Truncated {
            offset: self.position,
        }
    }

    fn byte(&mut self) -> Result<u8, BytecodeError> {
        let byte = *self.bytes.get(self.position).ok_or_else(|| self.truncated())?;
        self.position += 1;
        Ok(byte)
    }

    fn bool(&mut self) -> Result<bool, BytecodeError> {
        let offset = self.position;
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            byte => Err(BytecodeError::InvalidBool { byte, offset }),
        }
    }

    fn ber(&mut self) -> Result<u64, BytecodeError> {
        let (value, read) = read_ber(&self.bytes[self.position..]).ok_or_else(|| self.truncated())?;
        self.position += read;
        Ok(value)
    }

    fn u32(&mut self) -> Result<u32, BytecodeError> {
        let offset = self.position;
        u32::try_from(self.ber()?).map_err(|_| BytecodeError::Overflow { offset })
    }

    fn compact(&mut self) -> Result<i64, BytecodeError> {
        let (value, read) =
            read_compact(&self.bytes[self.position..]).ok_or_else(|| self.truncated())?;
        self.position += read;
        Ok(value)
    }

    fn i32(&mut self) -> Result<i32, BytecodeError> {
        let offset = self.position;
        i32::try_from(self.compact()?).map_err(|_| BytecodeError::Overflow { offset })
    }

    fn float(&mut self) -> Result<f64, BytecodeError> {
        let end = self.position + 8;
        let bytes: [u8; 8] = self
            .bytes
            .get(self.position..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or_else(|| self.truncated())?;
        self.position = end;
        Ok(f64::from_be_bytes(bytes))
    }

    fn option(&mut self) -> Result<Option<u64>, BytecodeError> {
        Ok(self.ber()?.checked_sub(1))
    }

    fn option_u32(&mut self) -> Result<Option<u32>, BytecodeError> {
        let offset = self.position;
        self.option()?
            .map(|n| u32::try_from(n).map_err(|_| BytecodeError::Overflow { offset }))
            .transpose()
    }

    fn point(&mut self) -> Result<Option<BreakPoint>, BytecodeError> {
        Ok(self.option()?.map(BreakPoint))
    }

    fn string(&mut self) -> Result<String, BytecodeError> {
        let offset = self.ber()?;
        Ok(self.rodata.get(offset)?.to_string())
    }

    fn label(&mut self) -> Result<Label, BytecodeError> {
        let offset = self.position;
        let byte = self.byte()?;
        Label::from_u8(byte).ok_or(BytecodeError::UnknownLabel { byte, offset })
    }
}
