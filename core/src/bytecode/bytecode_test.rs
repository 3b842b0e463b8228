use bumpalo::Bump;
use garnet_ast::AstBuilder;
use pretty_assertions::assert_eq;

use super::*;
use crate::instructions::{BreakPoint, CallSite, Label, Op, Opcode};
use crate::options::CompilerOptions;
use crate::passes::compile;

fn ops(instructions: &[Instruction]) -> Vec<Op> {
    instructions.iter().map(|i| i.op.clone()).collect()
}

fn program(ops: &[Op]) -> Vec<Instruction> {
    ops.iter().cloned().map(Instruction::from).collect()
}

#[test]
fn test_exact_layout_of_addition() {
    let code = program(&[
        Op::PushInt(5),
        Op::PushInt(3),
        Op::PushArgc(1),
        Op::Send(CallSite::new("+")),
    ]);

    let bytes = encode(&code);

    #[rustfmt::skip]
    let expected: Vec<u8> = vec![
        b'G', b'R', b'N', b'T', 0, 1,
        // pool: one entry, "+"
        2, 1, b'+',
        4, 10,         // push_int 5
        4, 8,          // push_int 3
        10, 1,         // push_argc 1
        54, 0, 0, 0, 0, 0, 0, // send :+
    ];
    assert_eq!(bytes, expected);
    assert_eq!(ops(&decode(&bytes).unwrap()), ops(&code));
}

#[test]
fn test_operands_survive_encoding() {
    let mut call = CallSite::new("each");
    call.with_block = true;
    call.receiver_is_self = true;
    call.break_point = Some(BreakPoint(41));
    let code = program(&[
        Op::PushInt(-124),
        Op::PushInt(1 << 30),
        Op::PushInt(i64::MIN),
        Op::PushFloat(2.5),
        Op::PushString {
            value: "héllo".into(),
            frozen: true,
        },
        Op::PushSymbol("each".into()),
        Op::PushArgs {
            for_block: true,
            min_count: 1,
            max_count: None,
            spread: true,
            keyword_args: false,
        },
        Op::CheckRequiredKeywords(vec!["a".into(), "b".into()]),
        Op::DefineBlock {
            arity: -2,
            is_lambda: false,
        },
        Op::Try {
            ensure: false,
            retry_point: Some(BreakPoint(7)),
        },
        Op::Retry(BreakPoint(7)),
        Op::Catch,
        Op::End(Label::Try),
        Op::End(Label::DefineBlock),
        Op::Send(call),
        Op::DefineMethod {
            name: "f".into(),
            arity: 3,
            return_point: Some(BreakPoint(0)),
        },
        Op::Return { return_point: None },
        Op::End(Label::DefineMethod),
        Op::AliasGlobal {
            new_name: "$new".into(),
            old_name: "$old".into(),
        },
    ]);

    let decoded = decode(&encode(&code)).unwrap();

    assert_eq!(ops(&decoded), ops(&code));
    assert!(decoded.iter().all(|i| i.env.is_none() && i.line == 0));
}

/// One op of every kind, with operands away from their defaults.
fn every_kind() -> Vec<Op> {
    let mut call = CallSite::new("[]=");
    call.args_array_on_stack = true;
    call.has_keyword_hash = true;
    call.break_point = Some(BreakPoint(1 << 31));
    vec![
        Op::PushNil,
        Op::PushTrue,
        Op::PushFalse,
        Op::PushSelf,
        Op::PushInt(-123),
        Op::PushFloat(-0.125),
        Op::PushString {
            value: "tab\there".into(),
            frozen: false,
        },
        Op::PushSymbol("empty?".into()),
        Op::PushRegexp {
            source: "a+b".into(),
            options: 5,
        },
        Op::PushRange { exclude_end: true },
        Op::PushArgc(300),
        Op::PushArgs {
            for_block: false,
            min_count: 2,
            max_count: Some(4),
            spread: false,
            keyword_args: true,
        },
        Op::PushArg {
            index: 3,
            nil_default: true,
        },
        Op::PushBlock,
        Op::PopKeywordArgs,
        Op::CheckRequiredKeywords(vec!["name".into()]),
        Op::CheckExtraKeywords,
        Op::Pop,
        Op::Dup,
        Op::DupObject,
        Op::DupRel(2),
        Op::MoveRel(129),
        Op::Swap,
        Op::Not,
        Op::IsNil,
        Op::CreateArray(17),
        Op::ArrayConcat,
        Op::ArrayPush,
        Op::ArrayShift,
        Op::ArrayShiftWithDefault,
        Op::ArrayPop,
        Op::ArrayPopWithDefault,
        Op::ArrayWrap,
        Op::ArrayIsEmpty,
        Op::ToArray,
        Op::CreateHash { count: 3, bare: true },
        Op::HashPut,
        Op::HashMerge,
        Op::HashDelete("key".into()),
        Op::HashDeleteWithDefault("other".into()),
        Op::StringAppend,
        Op::VariableDeclare("x".into()),
        Op::VariableGet {
            name: "x".into(),
            default_to_nil: true,
        },
        Op::VariableSet {
            name: "y".into(),
            local_only: true,
        },
        Op::InstanceVariableGet("@a".into()),
        Op::InstanceVariableSet("@b".into()),
        Op::InstanceVariableDefined("@c".into()),
        Op::GlobalVariableGet("$a".into()),
        Op::GlobalVariableSet("$b".into()),
        Op::GlobalVariableDefined("$c".into()),
        Op::ClassVariableGet("@@a".into()),
        Op::ClassVariableSet("@@b".into()),
        Op::ConstFind {
            name: "Foo".into(),
            strict: true,
        },
        Op::ConstSet("Bar".into()),
        Op::Send(call),
        Op::Super {
            args_array_on_stack: true,
            with_block: true,
            has_keyword_hash: false,
            forward_args: true,
            break_point: Some(BreakPoint(9)),
        },
        Op::Yield {
            args_array_on_stack: false,
            has_keyword_hash: true,
        },
        Op::CreateLambda {
            break_point: Some(BreakPoint(10)),
            return_point: Some(BreakPoint(11)),
        },
        Op::If,
        Op::Else(Label::If),
        Op::End(Label::WithSingleton),
        Op::While {
            pre: false,
            break_point: Some(BreakPoint(12)),
        },
        Op::WhileBody,
        Op::Try {
            ensure: true,
            retry_point: None,
        },
        Op::Catch,
        Op::Reraise,
        Op::MatchException,
        Op::Break {
            break_point: Some(BreakPoint(13)),
        },
        Op::Next,
        Op::Redo,
        Op::Retry(BreakPoint(14)),
        Op::Return {
            return_point: Some(BreakPoint(15)),
        },
        Op::DefineMethod {
            name: "initialize".into(),
            arity: -1,
            return_point: None,
        },
        Op::DefineBlock {
            arity: 2,
            is_lambda: true,
        },
        Op::DefineClass {
            name: "Point".into(),
            has_superclass: true,
        },
        Op::DefineModule { name: "Shape".into() },
        Op::WithSingleton,
        Op::AliasMethod,
        Op::AliasGlobal {
            new_name: "$x".into(),
            old_name: "$y".into(),
        },
        Op::UndefineMethod("to_s".into()),
    ]
}

#[test]
fn test_every_kind_survives_encoding() {
    let table = every_kind();
    for opcode in Opcode::ALL {
        assert!(
            table.iter().any(|op| op.opcode() == *opcode),
            "no {} in the table",
            opcode.name()
        );
    }

    let code = program(&table);
    let decoded = decode(&encode(&code)).unwrap();

    assert_eq!(ops(&decoded), table);
}

#[test]
fn test_compiled_program_round_trips() {
    let arena = Bump::new();
    let b = AstBuilder::new(&arena);
    let block = b.block(Some(b.required_params(&["x"])), &[b.break_(Some(b.lvar("x")))]);
    let source = b.program(&[
        b.lasgn("total", b.int(0)),
        b.call_with_block(Some(b.array(&[b.int(1), b.int(2)])), "each", &[], block),
        b.if_(b.lvar("total"), &[b.string("yes")], Some(b.statements(&[b.nil()]))),
    ]);
    let ir = compile(source, &CompilerOptions::default()).unwrap();

    let decoded = decode(&encode(&ir.instructions)).unwrap();

    assert_eq!(ops(&decoded), ops(&ir.instructions));
}

#[test]
fn test_header_is_checked() {
    assert_eq!(decode(b""), Err(BytecodeError::BadMagic));
    assert_eq!(decode(b"RUBY\x00\x01\x00"), Err(BytecodeError::BadMagic));
    assert_eq!(
        decode(b"GRNT\x01\x00\x00"),
        Err(BytecodeError::UnsupportedVersion { major: 1, minor: 0 })
    );
    assert_eq!(
        decode(b"GRNT\x00\x02\x00"),
        Err(BytecodeError::UnsupportedVersion { major: 0, minor: 2 })
    );
    assert_eq!(decode(b"GRNT\x00"), Err(BytecodeError::Truncated { offset: 5 }));
    assert_eq!(decode(b"GRNT\x00\x01\x00"), Ok(vec![]));
}

#[test]
fn test_malformed_streams_are_rejected() {
    // Pool claims more bytes than there are.
    assert_eq!(
        decode(b"GRNT\x00\x01\x09ab"),
        Err(BytecodeError::Truncated { offset: 9 })
    );
    // Opcode past the last one.
    assert_eq!(
        decode(b"GRNT\x00\x01\x00\x00\xc8"),
        Err(BytecodeError::UnknownOpcode {
            byte: 0xc8,
            offset: 8
        })
    );
    // `end` with a label byte nobody defines.
    assert_eq!(
        decode(b"GRNT\x00\x01\x00\x3c\x09"),
        Err(BytecodeError::UnknownLabel { byte: 9, offset: 8 })
    );
    // push_range with a flag byte that is neither 0 nor 1.
    assert_eq!(
        decode(b"GRNT\x00\x01\x00\x09\x02"),
        Err(BytecodeError::InvalidBool { byte: 2, offset: 8 })
    );
    // push_int with its operand cut off.
    assert_eq!(
        decode(b"GRNT\x00\x01\x00\x04\x03\x01"),
        Err(BytecodeError::Truncated { offset: 8 })
    );
    // push_symbol pointing outside the pool.
    assert_eq!(
        decode(b"GRNT\x00\x01\x02\x01x\x07\x05"),
        Err(BytecodeError::BadPoolOffset { offset: 5 })
    );
}
