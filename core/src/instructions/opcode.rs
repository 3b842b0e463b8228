//! Stable opcode numbers.
//!
//! Codes are hand-assigned and append-only: bytecode written by an older
//! compiler must keep decoding. Never renumber an existing entry.

use hashbrown::HashMap;
use lazy_static::lazy_static;

use super::Op;

macro_rules! opcodes {
    ($($variant:ident = $code:literal => $name:literal,)*) => {
        /// Opcode of an [`Op`] in the bytecode stream.
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant = $code,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn from_u8(byte: u8) -> Option<Opcode> {
                match byte {
                    $($code => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            /// The snake_case name used in listings.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }
        }
    };
}

opcodes! {
    PushNil = 0 => "push_nil",
    PushTrue = 1 => "push_true",
    PushFalse = 2 => "push_false",
    PushSelf = 3 => "push_self",
    PushInt = 4 => "push_int",
    PushFloat = 5 => "push_float",
    PushString = 6 => "push_string",
    PushSymbol = 7 => "push_symbol",
    PushRegexp = 8 => "push_regexp",
    PushRange = 9 => "push_range",
    PushArgc = 10 => "push_argc",
    PushArgs = 11 => "push_args",
    PushArg = 12 => "push_arg",
    PushBlock = 13 => "push_block",
    PopKeywordArgs = 14 => "pop_keyword_args",
    CheckRequiredKeywords = 15 => "check_required_keywords",
    CheckExtraKeywords = 16 => "check_extra_keywords",
    Pop = 17 => "pop",
    Dup = 18 => "dup",
    DupObject = 19 => "dup_object",
    DupRel = 20 => "dup_rel",
    MoveRel = 21 => "move_rel",
    Swap = 22 => "swap",
    Not = 23 => "not",
    IsNil = 24 => "is_nil",
    CreateArray = 25 => "create_array",
    ArrayConcat = 26 => "array_concat",
    ArrayPush = 27 => "array_push",
    ArrayShift = 28 => "array_shift",
    ArrayShiftWithDefault = 29 => "array_shift_with_default",
    ArrayPop = 30 => "array_pop",
    ArrayPopWithDefault = 31 => "array_pop_with_default",
    ArrayWrap = 32 => "array_wrap",
    ArrayIsEmpty = 33 => "array_is_empty",
    ToArray = 34 => "to_array",
    CreateHash = 35 => "create_hash",
    HashPut = 36 => "hash_put",
    HashMerge = 37 => "hash_merge",
    HashDelete = 38 => "hash_delete",
    HashDeleteWithDefault = 39 => "hash_delete_with_default",
    StringAppend = 40 => "string_append",
    VariableDeclare = 41 => "variable_declare",
    VariableGet = 42 => "variable_get",
    VariableSet = 43 => "variable_set",
    InstanceVariableGet = 44 => "instance_variable_get",
    InstanceVariableSet = 45 => "instance_variable_set",
    InstanceVariableDefined = 46 => "instance_variable_defined",
    GlobalVariableGet = 47 => "global_variable_get",
    GlobalVariableSet = 48 => "global_variable_set",
    GlobalVariableDefined = 49 => "global_variable_defined",
    ClassVariableGet = 50 => "class_variable_get",
    ClassVariableSet = 51 => "class_variable_set",
    ConstFind = 52 => "const_find",
    ConstSet = 53 => "const_set",
    Send = 54 => "send",
    Super = 55 => "super",
    Yield = 56 => "yield",
    CreateLambda = 57 => "create_lambda",
    If = 58 => "if",
    Else = 59 => "else",
    End = 60 => "end",
    While = 61 => "while",
    WhileBody = 62 => "while_body",
    Try = 63 => "try",
    Catch = 64 => "catch",
    Reraise = 65 => "reraise",
    MatchException = 66 => "match_exception",
    Break = 67 => "break",
    Next = 68 => "next",
    Redo = 69 => "redo",
    Retry = 70 => "retry",
    Return = 71 => "return",
    DefineMethod = 72 => "define_method",
    DefineBlock = 73 => "define_block",
    DefineClass = 74 => "define_class",
    DefineModule = 75 => "define_module",
    WithSingleton = 76 => "with_singleton",
    AliasMethod = 77 => "alias_method",
    AliasGlobal = 78 => "alias_global",
    UndefineMethod = 79 => "undefine_method",
}

static_assertions::assert_eq_size!(Opcode, u8);

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, Opcode> =
        Opcode::ALL.iter().map(|op| (op.name(), *op)).collect();
}

impl Opcode {
    pub fn from_name(name: &str) -> Option<Opcode> {
        BY_NAME.get(name).copied()
    }
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::PushNil => Opcode::PushNil,
            Op::PushTrue => Opcode::PushTrue,
            Op::PushFalse => Opcode::PushFalse,
            Op::PushSelf => Opcode::PushSelf,
            Op::PushInt(_) => Opcode::PushInt,
            Op::PushFloat(_) => Opcode::PushFloat,
            Op::PushString { .. } => Opcode::PushString,
            Op::PushSymbol(_) => Opcode::PushSymbol,
            Op::PushRegexp { .. } => Opcode::PushRegexp,
            Op::PushRange { .. } => Opcode::PushRange,
            Op::PushArgc(_) => Opcode::PushArgc,
            Op::PushArgs { .. } => Opcode::PushArgs,
            Op::PushArg { .. } => Opcode::PushArg,
            Op::PushBlock => Opcode::PushBlock,
            Op::PopKeywordArgs => Opcode::PopKeywordArgs,
            Op::CheckRequiredKeywords(_) => Opcode::CheckRequiredKeywords,
            Op::CheckExtraKeywords => Opcode::CheckExtraKeywords,
            Op::Pop => Opcode::Pop,
            Op::Dup => Opcode::Dup,
            Op::DupObject => Opcode::DupObject,
            Op::DupRel(_) => Opcode::DupRel,
            Op::MoveRel(_) => Opcode::MoveRel,
            Op::Swap => Opcode::Swap,
            Op::Not => Opcode::Not,
            Op::IsNil => Opcode::IsNil,
            Op::CreateArray(_) => Opcode::CreateArray,
            Op::ArrayConcat => Opcode::ArrayConcat,
            Op::ArrayPush => Opcode::ArrayPush,
            Op::ArrayShift => Opcode::ArrayShift,
            Op::ArrayShiftWithDefault => Opcode::ArrayShiftWithDefault,
            Op::ArrayPop => Opcode::ArrayPop,
            Op::ArrayPopWithDefault => Opcode::ArrayPopWithDefault,
            Op::ArrayWrap => Opcode::ArrayWrap,
            Op::ArrayIsEmpty => Opcode::ArrayIsEmpty,
            Op::ToArray => Opcode::ToArray,
            Op::CreateHash { .. } => Opcode::CreateHash,
            Op::HashPut => Opcode::HashPut,
            Op::HashMerge => Opcode::HashMerge,
            Op::HashDelete(_) => Opcode::HashDelete,
            Op::HashDeleteWithDefault(_) => Opcode::HashDeleteWithDefault,
            Op::StringAppend => Opcode::StringAppend,
            Op::VariableDeclare(_) => Opcode::VariableDeclare,
            Op::VariableGet { .. } => Opcode::VariableGet,
            Op::VariableSet { .. } => Opcode::VariableSet,
            Op::InstanceVariableGet(_) => Opcode::InstanceVariableGet,
            Op::InstanceVariableSet(_) => Opcode::InstanceVariableSet,
            Op::InstanceVariableDefined(_) => Opcode::InstanceVariableDefined,
            Op::GlobalVariableGet(_) => Opcode::GlobalVariableGet,
            Op::GlobalVariableSet(_) => Opcode::GlobalVariableSet,
            Op::GlobalVariableDefined(_) => Opcode::GlobalVariableDefined,
            Op::ClassVariableGet(_) => Opcode::ClassVariableGet,
            Op::ClassVariableSet(_) => Opcode::ClassVariableSet,
            Op::ConstFind { .. } => Opcode::ConstFind,
            Op::ConstSet(_) => Opcode::ConstSet,
            Op::Send(_) => Opcode::Send,
            Op::Super { .. } => Opcode::Super,
            Op::Yield { .. } => Opcode::Yield,
            Op::CreateLambda { .. } => Opcode::CreateLambda,
            Op::If => Opcode::If,
            Op::Else(_) => Opcode::Else,
            Op::End(_) => Opcode::End,
            Op::While { .. } => Opcode::While,
            Op::WhileBody => Opcode::WhileBody,
            Op::Try { .. } => Opcode::Try,
            Op::Catch => Opcode::Catch,
            Op::Reraise => Opcode::Reraise,
            Op::MatchException => Opcode::MatchException,
            Op::Break { .. } => Opcode::Break,
            Op::Next => Opcode::Next,
            Op::Redo => Opcode::Redo,
            Op::Retry(_) => Opcode::Retry,
            Op::Return { .. } => Opcode::Return,
            Op::DefineMethod { .. } => Opcode::DefineMethod,
            Op::DefineBlock { .. } => Opcode::DefineBlock,
            Op::DefineClass { .. } => Opcode::DefineClass,
            Op::DefineModule { .. } => Opcode::DefineModule,
            Op::WithSingleton => Opcode::WithSingleton,
            Op::AliasMethod => Opcode::AliasMethod,
            Op::AliasGlobal { .. } => Opcode::AliasGlobal,
            Op::UndefineMethod(_) => Opcode::UndefineMethod,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_codes_are_dense_and_stable() {
        for (index, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(*op as u8 as usize, index);
            assert_eq!(Opcode::from_u8(*op as u8), Some(*op));
        }
        assert_eq!(Opcode::Send as u8, 54);
        assert_eq!(Opcode::UndefineMethod as u8, 79);
        assert_eq!(Opcode::from_u8(80), None);
    }

    #[test]
    fn test_name_lookup() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_name(op.name()), Some(*op));
        }
        assert_eq!(Opcode::from_name("halt"), None);
    }
}
