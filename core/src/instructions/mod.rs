//! Garnet IR instructions.
//!
//! The IR is a flat list of [`Instruction`]s for a stack machine. Structured
//! control flow is expressed with *regions*: an opener (`If`, `While`, `Try`,
//! `DefineMethod`, `DefineBlock`, `DefineClass`, `DefineModule`,
//! `WithSingleton`) paired with an `End` carrying the same [`Label`], with
//! optional intermediate terminators (`Else`, `WhileBody`, `Catch`).
//!
//! # Stack Discipline
//!
//! Stack effect notation: `[..., operand1, operand2] -> [..., result]`.
//! Region bodies are stack transparent: every path through a region leaves
//! the same net effect. Instructions marked *diverges* never fall through.
//!
//! # Calls
//!
//! A call pushes its receiver first, then its arguments, then either the
//! argument count (`PushArgc`) or a single argument array, and finally the
//! block when the call has one:
//!
//! ```text
//! 5 + 3   =>   push_int 5; push_int 3; push_argc 1; send :+
//! ```
//!
//! A block literal (`DefineBlock ... End`) always sits immediately before
//! the `Send`, `Super` or `CreateLambda` consuming it.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::env::ScopeId;

mod listing;
mod opcode;

pub use listing::Listing;
pub use opcode::Opcode;

static NEXT_BREAK_POINT: AtomicU64 = AtomicU64::new(1);

/// Identity of a non-local exit target.
///
/// Minted from a process-wide counter, so ids never repeat within a process.
/// The same type tags break targets, return targets and retry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakPoint(pub u64);

impl BreakPoint {
    pub fn next() -> Self {
        BreakPoint(NEXT_BREAK_POINT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BreakPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of region an opener starts; carried by `Else` and `End`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    If = 0,
    While = 1,
    Try = 2,
    DefineMethod = 3,
    DefineBlock = 4,
    DefineClass = 5,
    DefineModule = 6,
    WithSingleton = 7,
}

impl Label {
    pub fn from_u8(byte: u8) -> Option<Label> {
        Some(match byte {
            0 => Label::If,
            1 => Label::While,
            2 => Label::Try,
            3 => Label::DefineMethod,
            4 => Label::DefineBlock,
            5 => Label::DefineClass,
            6 => Label::DefineModule,
            7 => Label::WithSingleton,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::If => "if",
            Label::While => "while",
            Label::Try => "try",
            Label::DefineMethod => "define_method",
            Label::DefineBlock => "define_block",
            Label::DefineClass => "define_class",
            Label::DefineModule => "define_module",
            Label::WithSingleton => "with_singleton",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The terminator kinds a structural scan can stop at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Until {
    Else,
    WhileBody,
    Catch,
    End,
}

/// One IR instruction: an operation, the lexical scope it executes in
/// (attached by the scope builder) and its source line.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub env: Option<ScopeId>,
    pub line: u32,
}

impl Instruction {
    pub fn new(op: Op, line: u32) -> Self {
        Self { op, env: None, line }
    }
}

impl From<Op> for Instruction {
    fn from(op: Op) -> Self {
        Instruction::new(op, 0)
    }
}

/// A call site: message plus how its arguments sit on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub message: String,
    /// Receiver is implicit `self`; private methods are callable.
    pub receiver_is_self: bool,
    pub with_block: bool,
    /// Arguments were collected into one array instead of `PushArgc`.
    pub args_array_on_stack: bool,
    /// The last argument is a keyword hash.
    pub has_keyword_hash: bool,
    /// Set by break-point wiring: the call absorbs breaks with this id.
    pub break_point: Option<BreakPoint>,
}

impl CallSite {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            receiver_is_self: false,
            with_block: false,
            args_array_on_stack: false,
            has_keyword_hash: false,
            break_point: None,
        }
    }
}

/// The closed set of IR operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // ========================================================================
    // Literals
    // ========================================================================
    /// Stack: [...] -> [..., nil]
    PushNil,
    /// Stack: [...] -> [..., true]
    PushTrue,
    /// Stack: [...] -> [..., false]
    PushFalse,
    /// Stack: [...] -> [..., self]
    PushSelf,
    /// Stack: [...] -> [..., int]
    PushInt(i64),
    /// Stack: [...] -> [..., float]
    PushFloat(f64),
    /// Stack: [...] -> [..., string]
    ///
    /// A fresh string object each time unless `frozen`.
    PushString { value: String, frozen: bool },
    /// Stack: [...] -> [..., symbol]
    PushSymbol(String),
    /// Stack: [...] -> [..., regexp]
    PushRegexp { source: String, options: u32 },
    /// Stack: [..., begin, end] -> [..., range]
    PushRange { exclude_end: bool },

    // ========================================================================
    // Argument plumbing
    // ========================================================================
    /// Stack: [...] -> [..., argc]
    PushArgc(u32),
    /// Collect the current frame's positional arguments into a new array,
    /// checking arity unless `for_block`. `spread` auto-splats a lone array
    /// argument (block semantics); `keyword_args` leaves a trailing keyword
    /// hash out of the array.
    ///
    /// Stack: [...] -> [..., array]
    PushArgs {
        for_block: bool,
        min_count: u32,
        max_count: Option<u32>,
        spread: bool,
        keyword_args: bool,
    },
    /// Push one positional argument of the current frame.
    ///
    /// Stack: [...] -> [..., arg]
    PushArg { index: u32, nil_default: bool },
    /// Push the current frame's block, or nil.
    ///
    /// Stack: [...] -> [..., block]
    PushBlock,
    /// Push a copy of the keyword hash passed to the current frame, or an
    /// empty hash.
    ///
    /// Stack: [...] -> [..., hash]
    PopKeywordArgs,
    /// Raise `ArgumentError` listing the names missing from the hash.
    ///
    /// Stack: [..., hash] -> [..., hash]
    CheckRequiredKeywords(Vec<String>),
    /// Raise `ArgumentError` if the hash still has entries.
    ///
    /// Stack: [..., hash] -> [..., hash]
    CheckExtraKeywords,

    // ========================================================================
    // Stack shuffles and logic
    // ========================================================================
    /// Stack: [..., a] -> [...]
    Pop,
    /// Stack: [..., a] -> [..., a, a]
    Dup,
    /// Shallow copy of the top object.
    ///
    /// Stack: [..., a] -> [..., a, copy]
    DupObject,
    /// Duplicate the value at depth N (top is N=0).
    ///
    /// Stack: [..., aN, ..., a0] -> [..., aN, ..., a0, aN]
    DupRel(u32),
    /// Move the top value below the N values beneath it.
    ///
    /// Stack: [..., aN, ..., a1, top] -> [..., top, aN, ..., a1]
    MoveRel(u32),
    /// Stack: [..., a, b] -> [..., b, a]
    Swap,
    /// Stack: [..., a] -> [..., !a]
    Not,
    /// Stack: [..., a] -> [..., a.nil?]
    IsNil,

    // ========================================================================
    // Arrays
    // ========================================================================
    /// Stack: [..., a1, ..., aN] -> [..., array]
    CreateArray(u32),
    /// Append the elements of `other` to `array`.
    ///
    /// Stack: [..., array, other] -> [..., array]
    ArrayConcat,
    /// Stack: [..., array, value] -> [..., array]
    ArrayPush,
    /// Remove the first element (nil when empty).
    ///
    /// Stack: [..., array] -> [..., array, first]
    ArrayShift,
    /// Stack: [..., array, default] -> [..., array, first_or_default]
    ArrayShiftWithDefault,
    /// Remove the last element (nil when empty).
    ///
    /// Stack: [..., array] -> [..., array, last]
    ArrayPop,
    /// Stack: [..., array, default] -> [..., array, last_or_default]
    ArrayPopWithDefault,
    /// Splat conversion: a copy of an array, `[]` for nil, else `[value]`.
    ///
    /// Stack: [..., value] -> [..., array]
    ArrayWrap,
    /// Stack: [..., array] -> [..., array, array.empty?]
    ArrayIsEmpty,
    /// Destructuring conversion: a copy of an array, else `[value]`.
    ///
    /// Stack: [..., value] -> [..., array]
    ToArray,

    // ========================================================================
    // Hashes and strings
    // ========================================================================
    /// Stack: [..., k1, v1, ..., kN, vN] -> [..., hash]
    CreateHash { count: u32, bare: bool },
    /// Stack: [..., hash, key, value] -> [..., hash]
    HashPut,
    /// Stack: [..., hash, other] -> [..., hash]
    HashMerge,
    /// Remove the symbol key `name` (nil when absent).
    ///
    /// Stack: [..., hash] -> [..., hash, value]
    HashDelete(String),
    /// Stack: [..., hash, default] -> [..., hash, value_or_default]
    HashDeleteWithDefault(String),
    /// Append the string form of `value`.
    ///
    /// Stack: [..., string, value] -> [..., string]
    StringAppend,

    // ========================================================================
    // Variables and constants
    // ========================================================================
    /// Declare a local (as nil) in the current scope ahead of a hoisting region.
    ///
    /// Stack: [...] -> [...]
    VariableDeclare(String),
    /// Stack: [...] -> [..., value]
    VariableGet { name: String, default_to_nil: bool },
    /// `local_only` defines the name in the innermost environment instead of
    /// assigning an outer one.
    ///
    /// Stack: [..., value] -> [...]
    VariableSet { name: String, local_only: bool },
    /// Stack: [...] -> [..., value]
    InstanceVariableGet(String),
    /// Stack: [..., value] -> [...]
    InstanceVariableSet(String),
    /// Stack: [...] -> [..., "instance-variable" | nil]
    InstanceVariableDefined(String),
    /// Stack: [...] -> [..., value]
    GlobalVariableGet(String),
    /// Stack: [..., value] -> [...]
    GlobalVariableSet(String),
    /// Stack: [...] -> [..., "global-variable" | nil]
    GlobalVariableDefined(String),
    /// Stack: [...] -> [..., value]
    ClassVariableGet(String),
    /// Stack: [..., value] -> [...]
    ClassVariableSet(String),
    /// Look up a constant; `strict` searches only `namespace` (`A::B`),
    /// otherwise lexical parents and ancestors too.
    ///
    /// Stack: [..., namespace] -> [..., value]
    ConstFind { name: String, strict: bool },
    /// Stack: [..., value, namespace] -> [...]
    ConstSet(String),

    // ========================================================================
    // Dispatch
    // ========================================================================
    /// Stack: [..., receiver, a1, ..., aN, argc, block?] -> [..., result]
    ///
    /// With `args_array_on_stack`: [..., receiver, args, block?] -> [..., result]
    Send(CallSite),
    /// Call the same-named method of the superclass; `forward_args` passes
    /// the current frame's arguments (argument-less `super`).
    ///
    /// Stack: [..., a1, ..., aN, argc, block?] -> [..., result]
    Super {
        args_array_on_stack: bool,
        with_block: bool,
        has_keyword_hash: bool,
        forward_args: bool,
        break_point: Option<BreakPoint>,
    },
    /// Stack: [..., a1, ..., aN, argc] -> [..., result]
    Yield {
        args_array_on_stack: bool,
        has_keyword_hash: bool,
    },
    /// Stack: [..., block] -> [..., lambda]
    CreateLambda {
        break_point: Option<BreakPoint>,
        return_point: Option<BreakPoint>,
    },

    // ========================================================================
    // Control flow
    // ========================================================================
    /// Opens a region; runs it when the condition is truthy, else the `Else`
    /// part (if any).
    ///
    /// Stack: [..., cond] -> [...]
    If,
    /// Separates the two parts of a region.
    Else(Label),
    /// Closes a region.
    End(Label),
    /// Opens a loop region: condition, `WhileBody`, body, `End`. With
    /// `pre == false` the body runs once before the first test.
    ///
    /// Stack: [...] -> [..., result] (after `End`)
    While {
        pre: bool,
        break_point: Option<BreakPoint>,
    },
    /// Stack: [..., cond] -> [...]
    WhileBody,
    /// Opens an exception region: body, `Catch`, handler. Each part leaves one
    /// value. An `ensure` region also catches non-local exits.
    Try {
        ensure: bool,
        retry_point: Option<BreakPoint>,
    },
    Catch,
    /// Re-raise whatever the innermost handler caught. Diverges.
    Reraise,
    /// Whether the in-flight exception is an instance of one of the classes.
    ///
    /// Stack: [..., classes] -> [..., bool]
    MatchException,
    /// Stack: [..., value] -> diverges
    Break { break_point: Option<BreakPoint> },
    /// Stack: [..., value] -> diverges
    Next,
    /// Diverges.
    Redo,
    /// Re-enter the `Try` carrying this retry point. Diverges.
    Retry(BreakPoint),
    /// A tagged return unwinds to the frame owning `return_point`.
    ///
    /// Stack: [..., value] -> diverges
    Return { return_point: Option<BreakPoint> },

    // ========================================================================
    // Definitions
    // ========================================================================
    /// Opens a method body region.
    ///
    /// Stack: [...] -> [..., name_symbol] (after `End`)
    DefineMethod {
        name: String,
        arity: i32,
        return_point: Option<BreakPoint>,
    },
    /// Opens a block body region.
    ///
    /// Stack: [...] -> [..., block] (after `End`)
    DefineBlock { arity: i32, is_lambda: bool },
    /// Opens (or reopens) a class and runs the body with it as `self`.
    ///
    /// Stack: [..., namespace, superclass?] -> [..., body_result]
    DefineClass { name: String, has_superclass: bool },
    /// Stack: [..., namespace] -> [..., body_result]
    DefineModule { name: String },
    /// Runs the body with the singleton class of the object as `self`.
    ///
    /// Stack: [..., object] -> [..., body_result]
    WithSingleton,
    /// Stack: [..., new_name, old_name] -> [..., nil]
    AliasMethod,
    /// Stack: [...] -> [..., nil]
    AliasGlobal { new_name: String, old_name: String },
    /// Stack: [...] -> [..., nil]
    UndefineMethod(String),
}

impl Op {
    /// The label of the region this instruction opens.
    pub fn opens(&self) -> Option<Label> {
        match self {
            Op::If => Some(Label::If),
            Op::While { .. } => Some(Label::While),
            Op::Try { .. } => Some(Label::Try),
            Op::DefineMethod { .. } => Some(Label::DefineMethod),
            Op::DefineBlock { .. } => Some(Label::DefineBlock),
            Op::DefineClass { .. } => Some(Label::DefineClass),
            Op::DefineModule { .. } => Some(Label::DefineModule),
            Op::WithSingleton => Some(Label::WithSingleton),
            _ => None,
        }
    }

    /// Terminator kind and the label of the region it belongs to.
    pub fn terminates(&self) -> Option<(Until, Label)> {
        match self {
            Op::Else(label) => Some((Until::Else, *label)),
            Op::WhileBody => Some((Until::WhileBody, Label::While)),
            Op::Catch => Some((Until::Catch, Label::Try)),
            Op::End(label) => Some((Until::End, *label)),
            _ => None,
        }
    }

    /// Control never falls through to the next instruction.
    pub fn diverges(&self) -> bool {
        matches!(
            self,
            Op::Break { .. }
                | Op::Next
                | Op::Redo
                | Op::Retry(_)
                | Op::Return { .. }
                | Op::Reraise
        )
    }

    /// Consumes the block value pushed right before it.
    pub fn consumes_block(&self) -> bool {
        match self {
            Op::Send(call) => call.with_block,
            Op::Super { with_block, .. } => *with_block,
            Op::CreateLambda { .. } => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.opcode().name()
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        match self {
            Op::PushInt(n) => write!(f, " {}", n),
            Op::PushFloat(x) => write!(f, " {:?}", x),
            Op::PushString { value, frozen } => {
                write!(f, " {:?}", value)?;
                if *frozen {
                    f.write_str(" (frozen)")?;
                }
                Ok(())
            }
            Op::PushSymbol(name) => write!(f, " :{}", name),
            Op::PushRegexp { source, options } => write!(f, " /{}/ {}", source, options),
            Op::PushRange { exclude_end } => {
                f.write_str(if *exclude_end { " ..." } else { " .." })
            }
            Op::PushArgc(n) | Op::CreateArray(n) | Op::DupRel(n) | Op::MoveRel(n) => {
                write!(f, " {}", n)
            }
            Op::PushArgs {
                for_block,
                min_count,
                max_count,
                spread,
                keyword_args,
            } => {
                write!(f, " {}..", min_count)?;
                if let Some(max) = max_count {
                    write!(f, "{}", max)?;
                }
                let flags = [
                    (*for_block, "block"),
                    (*spread, "spread"),
                    (*keyword_args, "kwargs"),
                ];
                write_flags(f, &flags)
            }
            Op::PushArg { index, nil_default } => {
                write!(f, " {}", index)?;
                write_flags(f, &[(*nil_default, "nil_default")])
            }
            Op::CheckRequiredKeywords(names) => write!(f, " {}", names.join(", ")),
            Op::CreateHash { count, bare } => {
                write!(f, " {}", count)?;
                write_flags(f, &[(*bare, "bare")])
            }
            Op::HashDelete(name)
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
            | Op::UndefineMethod(name) => write!(f, " {}", name),
            Op::VariableGet {
                name,
                default_to_nil,
            } => {
                write!(f, " {}", name)?;
                write_flags(f, &[(*default_to_nil, "default_to_nil")])
            }
            Op::VariableSet { name, local_only } => {
                write!(f, " {}", name)?;
                write_flags(f, &[(*local_only, "local")])
            }
            Op::ConstFind { name, strict } => {
                write!(f, " {}", name)?;
                write_flags(f, &[(*strict, "strict")])
            }
            Op::Send(call) => {
                write!(f, " :{}", call.message)?;
                write_flags(
                    f,
                    &[
                        (call.receiver_is_self, "self"),
                        (call.args_array_on_stack, "args_array"),
                        (call.has_keyword_hash, "kwargs"),
                        (call.with_block, "block"),
                    ],
                )?;
                write_point(f, "break", call.break_point)
            }
            Op::Super {
                args_array_on_stack,
                with_block,
                has_keyword_hash,
                forward_args,
                break_point,
            } => {
                write_flags(
                    f,
                    &[
                        (*forward_args, "zsuper"),
                        (*args_array_on_stack, "args_array"),
                        (*has_keyword_hash, "kwargs"),
                        (*with_block, "block"),
                    ],
                )?;
                write_point(f, "break", *break_point)
            }
            Op::Yield {
                args_array_on_stack,
                has_keyword_hash,
            } => write_flags(
                f,
                &[
                    (*args_array_on_stack, "args_array"),
                    (*has_keyword_hash, "kwargs"),
                ],
            ),
            Op::CreateLambda {
                break_point,
                return_point,
            } => {
                write_point(f, "break", *break_point)?;
                write_point(f, "return", *return_point)
            }
            Op::Else(label) | Op::End(label) => write!(f, " {}", label),
            Op::While { pre, break_point } => {
                write_flags(f, &[(!*pre, "post")])?;
                write_point(f, "break", *break_point)
            }
            Op::Try {
                ensure,
                retry_point,
            } => {
                write_flags(f, &[(*ensure, "ensure")])?;
                write_point(f, "retry", *retry_point)
            }
            Op::Break { break_point } => write_point(f, "break", *break_point),
            Op::Retry(id) => write!(f, " {}", id),
            Op::Return { return_point } => write_point(f, "return", *return_point),
            Op::DefineMethod {
                name,
                arity,
                return_point,
            } => {
                write!(f, " {} arity={}", name, arity)?;
                write_point(f, "return", *return_point)
            }
            Op::DefineBlock { arity, is_lambda } => {
                write!(f, " arity={}", arity)?;
                write_flags(f, &[(*is_lambda, "lambda")])
            }
            Op::DefineClass {
                name,
                has_superclass,
            } => {
                write!(f, " {}", name)?;
                write_flags(f, &[(*has_superclass, "superclass")])
            }
            Op::DefineModule { name } => write!(f, " {}", name),
            Op::AliasGlobal { new_name, old_name } => write!(f, " {} {}", new_name, old_name),
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
            | Op::AliasMethod => Ok(()),
        }
    }
}

fn write_flags(f: &mut fmt::Formatter<'_>, flags: &[(bool, &str)]) -> fmt::Result {
    for (set, name) in flags {
        if *set {
            write!(f, " +{}", name)?;
        }
    }
    Ok(())
}

fn write_point(f: &mut fmt::Formatter<'_>, what: &str, point: Option<BreakPoint>) -> fmt::Result {
    match point {
        Some(id) => write!(f, " {}={}", what, id),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_break_points_are_unique() {
        let a = BreakPoint::next();
        let b = BreakPoint::next();
        assert!(b > a);
    }

    #[test]
    fn test_region_classification() {
        assert_eq!(Op::If.opens(), Some(Label::If));
        assert_eq!(
            Op::DefineBlock {
                arity: 0,
                is_lambda: false
            }
            .opens(),
            Some(Label::DefineBlock)
        );
        assert_eq!(Op::Catch.terminates(), Some((Until::Catch, Label::Try)));
        assert_eq!(
            Op::End(Label::While).terminates(),
            Some((Until::End, Label::While))
        );
        assert_eq!(Op::Pop.opens(), None);
        assert!(Op::Redo.diverges());
        assert!(!Op::Dup.diverges());
    }

    #[test]
    fn test_label_bytes() {
        for byte in 0..8 {
            let label = Label::from_u8(byte).unwrap();
            assert_eq!(label as u8, byte);
        }
        assert_eq!(Label::from_u8(8), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Op::PushInt(5).to_string(), "push_int 5");
        let mut call = CallSite::new("each");
        call.with_block = true;
        call.break_point = Some(BreakPoint(3));
        assert_eq!(Op::Send(call).to_string(), "send :each +block break=3");
        assert_eq!(
            Op::VariableSet {
                name: "x".into(),
                local_only: true
            }
            .to_string(),
            "variable_set x +local"
        );
        assert_eq!(Op::End(Label::If).to_string(), "end if");
    }
}
