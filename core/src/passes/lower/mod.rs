//! Lowering: syntax tree to flat IR.
//!
//! Every translation takes a `used` flag saying whether the surrounding code
//! consumes the node's value. When it does not, the translation leaves the
//! stack as it found it (either by not pushing at all or by popping).
//!
//! The lowerer tracks the operand stack depth as it emits, the same way a
//! bytecode compiler does, so region bodies can be checked for stack
//! transparency in debug builds.

use garnet_ast::{Node, NodeKind, NodeRef};
use tracing::debug;

use crate::error::{CompileError, LoweringError, StructuralError};
use crate::instructions::{BreakPoint, Instruction, Label, Op};
use crate::options::CompilerOptions;

mod args;
mod assignment;
mod calls;
mod control_flow;
mod definitions;
mod expressions;
mod multiple_assignment;
mod patterns;
mod rescue;

#[cfg(test)]
mod lower_test;

pub(crate) type Result<T = ()> = core::result::Result<T, CompileError>;

/// Lower a `Program` node (or any expression) to IR.
///
/// The program's value is left on the stack.
pub fn lower(program: &Node<'_>, options: &CompilerOptions) -> Result<Lowered> {
    let mut lowerer = Lowerer::new();
    let root = match program.kind {
        NodeKind::Program(statements) => statements,
        _ => program,
    };
    lowerer.transform(root, true)?;
    debug!(
        file = %options.file_name,
        instructions = lowerer.instructions.len(),
        max_stack_size = lowerer.max_stack_size,
        "lowered program"
    );
    Ok(Lowered {
        instructions: lowerer.instructions,
        max_stack_size: lowerer.max_stack_size,
    })
}

/// Output of the lowering pass.
#[derive(Debug, Clone)]
pub struct Lowered {
    pub instructions: Vec<Instruction>,
    /// Deepest operand stack any single frame reaches.
    pub max_stack_size: usize,
}

/// What encloses the code being lowered; decides where `next`, `redo` and
/// `retry` may appear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Top,
    Method,
    Block,
    Loop,
    Class,
}

/// Stack depth bookkeeping for one open region.
struct Region {
    label: Label,
    /// Depth when the region body started.
    entry: usize,
    /// Depth the first part ended with, once an `Else`/`Catch` is seen.
    first_part: Option<usize>,
    /// Frame regions run in a fresh frame; the outer depth to restore.
    outer: Option<usize>,
}

pub(crate) struct Lowerer {
    instructions: Vec<Instruction>,
    line: u32,

    /// Current stack depth during lowering
    current_stack_depth: usize,

    /// Maximum stack depth observed
    max_stack_size: usize,

    regions: Vec<Region>,
    context: Vec<Context>,

    /// Retry points of the `rescue` clauses being lowered, innermost last.
    retry_points: Vec<BreakPoint>,
}

impl Lowerer {
    fn new() -> Self {
        Self {
            instructions: Vec::new(),
            line: 0,
            current_stack_depth: 0,
            max_stack_size: 0,
            regions: Vec::new(),
            context: vec![Context::Top],
            retry_points: Vec::new(),
        }
    }

    // === Stack Management ===

    fn push_stack(&mut self) {
        self.current_stack_depth += 1;
        if self.current_stack_depth > self.max_stack_size {
            self.max_stack_size = self.current_stack_depth;
        }
    }

    fn pop_stack(&mut self) {
        debug_assert!(self.current_stack_depth > 0, "Stack underflow");
        self.current_stack_depth -= 1;
    }

    fn pop_stack_n(&mut self, n: usize) {
        debug_assert!(
            self.current_stack_depth >= n,
            "Stack underflow: trying to pop {} but depth is {}",
            n,
            self.current_stack_depth
        );
        self.current_stack_depth -= n;
    }

    // === Instruction Emission ===

    /// Emit a non-region instruction, applying its stack effect.
    ///
    /// For `Send`, `Super` and `Yield` only the receiver, argument-count and
    /// block slots are accounted; callers pop the individual arguments.
    fn emit(&mut self, op: Op) {
        let (pops, pushes) = stack_effect(&op);
        self.pop_stack_n(pops);
        for _ in 0..pushes {
            self.push_stack();
        }
        self.instructions.push(Instruction::new(op, self.line));
    }

    /// Emit a `Pop` unless the value is consumed.
    fn discard_unless(&mut self, used: bool) {
        if !used {
            self.emit(Op::Pop);
        }
    }

    /// Open a region. Frame regions (definitions) start from an empty stack.
    fn open(&mut self, op: Op) {
        let label = op
            .opens()
            .expect("open() is only called with region openers");
        let pops = match &op {
            Op::If | Op::WithSingleton | Op::DefineModule { .. } => 1,
            Op::DefineClass { has_superclass, .. } => 1 + *has_superclass as usize,
            _ => 0,
        };
        self.pop_stack_n(pops);
        let outer = match label {
            Label::If | Label::While | Label::Try => None,
            _ => Some(core::mem::replace(&mut self.current_stack_depth, 0)),
        };
        self.regions.push(Region {
            label,
            entry: self.current_stack_depth,
            first_part: None,
            outer,
        });
        self.instructions.push(Instruction::new(op, self.line));
    }

    /// Emit an intermediate terminator of the innermost region.
    fn middle(&mut self, op: Op) {
        match op {
            Op::WhileBody => self.pop_stack(),
            _ => {
                let depth = self.current_stack_depth;
                if let Some(region) = self.regions.last_mut() {
                    region.first_part = Some(depth);
                    self.current_stack_depth = region.entry;
                }
            }
        }
        self.instructions.push(Instruction::new(op, self.line));
    }

    /// Close the innermost region.
    fn close(&mut self, label: Label) {
        let region = self
            .regions
            .pop()
            .expect("close() matches an earlier open()");
        debug_assert_eq!(region.label, label, "Mismatched region");
        if let Some(first) = region.first_part {
            debug_assert_eq!(
                first, self.current_stack_depth,
                "Region parts leave different stack depths"
            );
        }
        match region.outer {
            Some(outer) => {
                debug_assert_eq!(self.current_stack_depth, 1, "Body must leave one value");
                self.current_stack_depth = outer;
                self.push_stack();
            }
            None if label == Label::While => {
                self.current_stack_depth = region.entry;
                self.push_stack();
            }
            None => {}
        }
        self.instructions.push(Instruction::new(Op::End(label), self.line));
    }

    /// After a diverging instruction: keep the stack shape the surrounding
    /// code expects with an unreachable filler value.
    fn filler(&mut self, used: bool) {
        if used {
            self.emit(Op::PushNil);
        }
    }

    fn with_context<T>(&mut self, context: Context, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.context.push(context);
        let result = f(self);
        self.context.pop();
        result
    }

    /// Innermost enclosing context.
    fn innermost(&self) -> Context {
        *self.context.last().unwrap_or(&Context::Top)
    }

    fn unsupported(&self, construct: impl Into<String>) -> CompileError {
        LoweringError::Unsupported {
            construct: construct.into(),
            line: self.line,
        }
        .into()
    }

    // === Dispatch ===

    pub(crate) fn transform(&mut self, node: NodeRef<'_>, used: bool) -> Result {
        let saved_line = self.line;
        if node.line > 0 {
            self.line = node.line;
        }
        let result = self.transform_kind(node, used);
        self.line = saved_line;
        result
    }

    /// Lower an optional body, pushing nil for a missing one.
    fn transform_body(&mut self, body: Option<NodeRef<'_>>, used: bool) -> Result {
        match body {
            Some(node) => self.transform(node, used),
            None => {
                self.filler(used);
                Ok(())
            }
        }
    }

    fn transform_kind(&mut self, node: NodeRef<'_>, used: bool) -> Result {
        match node.kind {
            NodeKind::Program(statements) => self.transform(statements, used),
            NodeKind::Statements(statements) => self.transform_statements(statements, used),
            NodeKind::Parentheses(body) => self.transform_body(body, used),

            NodeKind::Nil
            | NodeKind::True
            | NodeKind::False
            | NodeKind::SelfNode
            | NodeKind::Integer(_)
            | NodeKind::Float(_)
            | NodeKind::String(_)
            | NodeKind::Symbol(_)
            | NodeKind::Regexp { .. } => self.transform_literal(node, used),
            NodeKind::InterpolatedString(parts) => self.transform_interpolated_string(parts, used),
            NodeKind::Array(elements) => self.transform_array(elements, used),
            NodeKind::Hash(elements) => self.transform_hash(elements, false, used),
            NodeKind::KeywordHash(elements) => self.transform_hash(elements, true, used),
            NodeKind::Range {
                left,
                right,
                exclude_end,
            } => self.transform_range(left, right, exclude_end, used),

            NodeKind::LocalVariableRead(name) => {
                if used {
                    self.emit(Op::VariableGet {
                        name: name.to_string(),
                        default_to_nil: false,
                    });
                }
                Ok(())
            }
            NodeKind::LocalVariableWrite { name, value } => self.transform_local_write(name, value, used),
            NodeKind::InstanceVariableRead(name) => {
                self.emit(Op::InstanceVariableGet(name.to_string()));
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::InstanceVariableWrite { name, value } => {
                self.transform_simple_write(Op::InstanceVariableSet(name.to_string()), value, used)
            }
            NodeKind::GlobalVariableRead(name) => {
                self.emit(Op::GlobalVariableGet(name.to_string()));
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::GlobalVariableWrite { name, value } => {
                self.transform_simple_write(Op::GlobalVariableSet(name.to_string()), value, used)
            }
            NodeKind::ClassVariableRead(name) => {
                self.emit(Op::ClassVariableGet(name.to_string()));
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::ClassVariableWrite { name, value } => {
                self.transform_simple_write(Op::ClassVariableSet(name.to_string()), value, used)
            }
            NodeKind::ConstantRead(_) | NodeKind::ConstantPath { .. } => {
                self.transform_constant(node)?;
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::ConstantWrite { target, value } => self.transform_constant_write(target, value, used),

            NodeKind::MultiWrite {
                lefts,
                rest,
                rights,
                value,
            } => self.transform_multi_write(lefts, rest, rights, value, used),
            NodeKind::OperatorWrite {
                target,
                operator,
                value,
            } => self.transform_operator_write(target, operator, value, used),
            NodeKind::OrWrite { target, value } => self.transform_logical_write(target, value, true, used),
            NodeKind::AndWrite { target, value } => self.transform_logical_write(target, value, false, used),

            NodeKind::Call {
                receiver,
                name,
                arguments,
                block,
                safe_navigation,
            } => self.transform_call(receiver, name, arguments, block, safe_navigation, used),
            NodeKind::Lambda { parameters, body } => self.transform_lambda(parameters, body, used),
            NodeKind::Yield(arguments) => self.transform_yield(arguments, used),
            NodeKind::Super { arguments, block } => self.transform_super(Some(arguments), block, used),
            NodeKind::ForwardingSuper { block } => self.transform_super(None, block, used),

            NodeKind::And { left, right } => self.transform_and_or(left, right, true, used),
            NodeKind::Or { left, right } => self.transform_and_or(left, right, false, used),
            NodeKind::Not(value) => {
                self.transform(value, true)?;
                self.emit(Op::Not);
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::Defined(expression) => self.transform_defined(expression, used),

            NodeKind::If {
                predicate,
                statements,
                subsequent,
            } => self.transform_if(predicate, statements, subsequent, used),
            NodeKind::Unless {
                predicate,
                statements,
                else_clause,
            } => self.transform_if(predicate, else_clause, statements, used),
            NodeKind::While {
                predicate,
                statements,
                do_while,
            } => self.transform_while(predicate, statements, do_while, false, used),
            NodeKind::Until {
                predicate,
                statements,
                do_while,
            } => self.transform_while(predicate, statements, do_while, true, used),
            NodeKind::Case {
                predicate,
                conditions,
                else_clause,
            } => self.transform_case(predicate, conditions, else_clause, used),
            NodeKind::CaseMatch {
                predicate,
                conditions,
                else_clause,
            } => self.transform_case_match(predicate, conditions, else_clause, used),
            NodeKind::Begin {
                statements,
                rescue,
                else_clause,
                ensure,
            } => self.transform_begin(statements, rescue, else_clause, ensure, used),
            NodeKind::Return(value) => self.transform_return(value, used),
            NodeKind::Break(value) => self.transform_break(value, used),
            NodeKind::Next(value) => self.transform_next(value, used),
            NodeKind::Redo => self.transform_redo(used),
            NodeKind::Retry => self.transform_retry(used),

            NodeKind::Def {
                name,
                receiver,
                parameters,
                body,
            } => self.transform_def(name, receiver, parameters, body, used),
            NodeKind::Class {
                path,
                superclass,
                body,
            } => self.transform_class(path, superclass, body, used),
            NodeKind::Module { path, body } => self.transform_module(path, body, used),
            NodeKind::SingletonClass { expression, body } => {
                self.transform_singleton_class(expression, body, used)
            }
            NodeKind::Alias { new_name, old_name } => {
                self.emit(Op::PushSymbol(new_name.to_string()));
                self.emit(Op::PushSymbol(old_name.to_string()));
                self.emit(Op::AliasMethod);
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::GlobalAlias { new_name, old_name } => {
                self.emit(Op::AliasGlobal {
                    new_name: new_name.to_string(),
                    old_name: old_name.to_string(),
                });
                self.discard_unless(used);
                Ok(())
            }
            NodeKind::Undef(names) => self.transform_undef(names, used),

            NodeKind::Assoc { .. }
            | NodeKind::AssocSplat(_)
            | NodeKind::Splat(_)
            | NodeKind::BlockArgument(_)
            | NodeKind::Block { .. }
            | NodeKind::LocalVariableTarget(_)
            | NodeKind::InstanceVariableTarget(_)
            | NodeKind::GlobalVariableTarget(_)
            | NodeKind::ClassVariableTarget(_)
            | NodeKind::ConstantTarget(_)
            | NodeKind::IndexTarget { .. }
            | NodeKind::CallTarget { .. }
            | NodeKind::MultiTarget { .. }
            | NodeKind::SplatAnonymous
            | NodeKind::When { .. }
            | NodeKind::In { .. }
            | NodeKind::Rescue { .. }
            | NodeKind::ArrayPattern { .. }
            | NodeKind::HashPattern { .. }
            | NodeKind::PatternPair { .. }
            | NodeKind::NoKeywordsPattern
            | NodeKind::AlternationPattern { .. }
            | NodeKind::CapturePattern { .. }
            | NodeKind::PinnedVariable(_)
            | NodeKind::PinnedExpression(_) => Err(StructuralError::UnknownNode(node.kind.name()).into()),
        }
    }

    fn transform_statements(&mut self, statements: &[NodeRef<'_>], used: bool) -> Result {
        let Some((last, init)) = statements.split_last() else {
            self.filler(used);
            return Ok(());
        };
        for statement in init {
            self.transform(statement, false)?;
        }
        self.transform(last, used)
    }
}

/// Fixed stack effect `(pops, pushes)` of a non-region instruction.
fn stack_effect(op: &Op) -> (usize, usize) {
    match op {
        Op::PushNil
        | Op::PushTrue
        | Op::PushFalse
        | Op::PushSelf
        | Op::PushInt(_)
        | Op::PushFloat(_)
        | Op::PushString { .. }
        | Op::PushSymbol(_)
        | Op::PushRegexp { .. }
        | Op::PushArgc(_)
        | Op::PushArgs { .. }
        | Op::PushArg { .. }
        | Op::PushBlock
        | Op::PopKeywordArgs
        | Op::VariableGet { .. }
        | Op::InstanceVariableGet(_)
        | Op::InstanceVariableDefined(_)
        | Op::GlobalVariableGet(_)
        | Op::GlobalVariableDefined(_)
        | Op::ClassVariableGet(_)
        | Op::AliasGlobal { .. }
        | Op::UndefineMethod(_) => (0, 1),
        Op::PushRange { .. } => (2, 1),
        Op::CheckRequiredKeywords(_)
        | Op::CheckExtraKeywords
        | Op::Not
        | Op::IsNil
        | Op::ArrayWrap
        | Op::ToArray
        | Op::ConstFind { .. }
        | Op::CreateLambda { .. }
        | Op::MatchException => (1, 1),
        Op::Pop
        | Op::VariableSet { .. }
        | Op::InstanceVariableSet(_)
        | Op::GlobalVariableSet(_)
        | Op::ClassVariableSet(_)
        | Op::Break { .. }
        | Op::Next
        | Op::Return { .. } => (1, 0),
        Op::Dup | Op::DupObject | Op::ArrayShift | Op::ArrayPop | Op::ArrayIsEmpty | Op::HashDelete(_) => {
            (1, 2)
        }
        Op::DupRel(n) => (*n as usize + 1, *n as usize + 2),
        Op::MoveRel(n) => (*n as usize + 1, *n as usize + 1),
        Op::Swap | Op::ArrayShiftWithDefault | Op::ArrayPopWithDefault | Op::HashDeleteWithDefault(_) => {
            (2, 2)
        }
        Op::CreateArray(n) => (*n as usize, 1),
        Op::CreateHash { count, .. } => (2 * *count as usize, 1),
        Op::ArrayConcat | Op::ArrayPush | Op::HashMerge | Op::StringAppend | Op::AliasMethod => (2, 1),
        Op::HashPut => (3, 1),
        Op::ConstSet(_) => (2, 0),
        Op::VariableDeclare(_) | Op::Redo | Op::Retry(_) | Op::Reraise => (0, 0),
        Op::Send(call) => (2 + call.with_block as usize, 1),
        Op::Super {
            with_block,
            forward_args,
            ..
        } => ((!*forward_args) as usize + *with_block as usize, 1),
        Op::Yield { .. } => (1, 1),
        Op::If
        | Op::Else(_)
        | Op::End(_)
        | Op::While { .. }
        | Op::WhileBody
        | Op::Try { .. }
        | Op::Catch
        | Op::DefineMethod { .. }
        | Op::DefineBlock { .. }
        | Op::DefineClass { .. }
        | Op::DefineModule { .. }
        | Op::WithSingleton => (0, 0),
    }
}
