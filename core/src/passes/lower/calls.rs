use garnet_ast::{NodeKind, NodeRef, Parameters};

use super::args::Binding;
use super::{Context, Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::{CallSite, Label, Op};

/// How a call's arguments were laid out on the stack.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct ArgumentLayout {
    /// Individual argument slots; zero when collected into one array.
    pub count: usize,
    pub array: bool,
    pub keyword_hash: bool,
}

impl Lowerer {
    pub(super) fn transform_call(
        &mut self,
        receiver: Option<NodeRef<'_>>,
        name: &str,
        arguments: &[NodeRef<'_>],
        block: Option<NodeRef<'_>>,
        safe_navigation: bool,
        used: bool,
    ) -> Result {
        if receiver.is_none() && arguments.is_empty() {
            match (name, block.map(|b| b.kind)) {
                ("block_given?", None) => {
                    self.emit(Op::PushBlock);
                    self.emit(Op::IsNil);
                    self.emit(Op::Not);
                    self.discard_unless(used);
                    return Ok(());
                }
                ("lambda", Some(NodeKind::Block { parameters, body })) => {
                    return self.transform_lambda(parameters, body, used);
                }
                _ => {}
            }
        }

        match receiver {
            Some(receiver) if safe_navigation => {
                self.transform(receiver, true)?;
                self.emit(Op::Dup);
                self.emit(Op::IsNil);
                self.open(Op::If);
                self.emit(Op::Pop);
                self.emit(Op::PushNil);
                self.middle(Op::Else(Label::If));
                self.finish_call(false, name, arguments, block, used)?;
                self.close(Label::If);
            }
            Some(receiver) => {
                self.transform(receiver, true)?;
                let explicit_self = matches!(receiver.kind, NodeKind::SelfNode);
                self.finish_call(explicit_self, name, arguments, block, used)?;
            }
            None => {
                self.emit(Op::PushSelf);
                self.finish_call(true, name, arguments, block, used)?;
            }
        }
        self.discard_unless(used);
        Ok(())
    }

    /// With the receiver on the stack: arguments, block and the send. Leaves
    /// one value, the assigned value for a used attribute assignment.
    fn finish_call(
        &mut self,
        receiver_is_self: bool,
        name: &str,
        arguments: &[NodeRef<'_>],
        block: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let (arguments, block) = split_block(arguments, block);
        let layout = self.push_arguments(arguments)?;
        let keep_value = used && is_attribute_assignment(name) && !layout.array && layout.count > 0;
        if keep_value {
            self.emit(Op::Dup);
            self.emit(Op::MoveRel(layout.count as u32 + 1));
        }
        if !layout.array {
            self.emit(Op::PushArgc(layout.count as u32));
        }
        if let Some(block) = block {
            self.push_block(block)?;
        }

        let mut call = CallSite::new(name);
        call.receiver_is_self = receiver_is_self;
        self.send(call, layout, block.is_some());
        if keep_value {
            self.emit(Op::Pop);
        }
        Ok(())
    }

    pub(super) fn send(&mut self, mut call: CallSite, layout: ArgumentLayout, with_block: bool) {
        call.args_array_on_stack = layout.array;
        call.has_keyword_hash = layout.keyword_hash;
        call.with_block = with_block;
        self.pop_stack_n(layout.count);
        self.emit(Op::Send(call));
    }

    /// Send `message` to the value below `argc` already-pushed arguments.
    pub(super) fn send_simple(&mut self, message: &str, argc: usize) {
        self.emit(Op::PushArgc(argc as u32));
        let layout = ArgumentLayout {
            count: argc,
            ..ArgumentLayout::default()
        };
        self.send(CallSite::new(message), layout, false);
    }

    /// Push the positional and keyword arguments, without the count.
    ///
    /// Any splat collects everything into a single array.
    pub(super) fn push_arguments(&mut self, arguments: &[NodeRef<'_>]) -> Result<ArgumentLayout> {
        let keyword_hash = matches!(arguments.last().map(|a| a.kind), Some(NodeKind::KeywordHash(_)));
        if arguments.iter().any(|a| matches!(a.kind, NodeKind::Splat(_))) {
            self.push_array(arguments)?;
            return Ok(ArgumentLayout {
                count: 0,
                array: true,
                keyword_hash,
            });
        }
        for argument in arguments {
            self.transform(argument, true)?;
        }
        Ok(ArgumentLayout {
            count: arguments.len(),
            array: false,
            keyword_hash,
        })
    }

    fn push_block(&mut self, block: NodeRef<'_>) -> Result {
        match block.kind {
            NodeKind::Block { parameters, body } => self.transform_block_literal(parameters, body, false),
            NodeKind::BlockArgument(Some(value)) => self.transform(value, true),
            NodeKind::BlockArgument(None) => {
                self.emit(Op::PushBlock);
                Ok(())
            }
            _ => Err(StructuralError::UnknownNode(block.kind.name()).into()),
        }
    }

    /// `DefineBlock ... End`, leaving the block value.
    fn transform_block_literal(
        &mut self,
        parameters: Option<&Parameters<'_>>,
        body: Option<NodeRef<'_>>,
        is_lambda: bool,
    ) -> Result {
        let arity = parameters.map_or(0, |p| p.arity());
        self.open(Op::DefineBlock { arity, is_lambda });
        self.with_context(Context::Block, |this| {
            let binding = if is_lambda { Binding::Lambda } else { Binding::Block };
            this.bind_parameters(parameters, binding)?;
            this.transform_body(body, true)
        })?;
        self.close(Label::DefineBlock);
        Ok(())
    }

    pub(super) fn transform_lambda(
        &mut self,
        parameters: Option<&Parameters<'_>>,
        body: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        self.transform_block_literal(parameters, body, true)?;
        self.emit(Op::CreateLambda {
            break_point: None,
            return_point: None,
        });
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_yield(&mut self, arguments: &[NodeRef<'_>], used: bool) -> Result {
        let layout = self.push_arguments(arguments)?;
        if !layout.array {
            self.emit(Op::PushArgc(layout.count as u32));
        }
        self.pop_stack_n(layout.count);
        self.emit(Op::Yield {
            args_array_on_stack: layout.array,
            has_keyword_hash: layout.keyword_hash,
        });
        self.discard_unless(used);
        Ok(())
    }

    /// `super(...)`, or argument-forwarding `super` when `arguments` is None.
    pub(super) fn transform_super(
        &mut self,
        arguments: Option<&[NodeRef<'_>]>,
        block: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let op = match arguments {
            Some(arguments) => {
                let (arguments, block) = split_block(arguments, block);
                let layout = self.push_arguments(arguments)?;
                if !layout.array {
                    self.emit(Op::PushArgc(layout.count as u32));
                }
                if let Some(block) = block {
                    self.push_block(block)?;
                }
                self.pop_stack_n(layout.count);
                Op::Super {
                    args_array_on_stack: layout.array,
                    with_block: block.is_some(),
                    has_keyword_hash: layout.keyword_hash,
                    forward_args: false,
                    break_point: None,
                }
            }
            None => {
                if let Some(block) = block {
                    self.push_block(block)?;
                }
                Op::Super {
                    args_array_on_stack: false,
                    with_block: block.is_some(),
                    has_keyword_hash: false,
                    forward_args: true,
                    break_point: None,
                }
            }
        };
        self.emit(op);
        self.discard_unless(used);
        Ok(())
    }
}

/// Separate a trailing `&block` argument from the positional ones.
fn split_block<'n, 'a>(
    arguments: &'n [NodeRef<'a>],
    block: Option<NodeRef<'a>>,
) -> (&'n [NodeRef<'a>], Option<NodeRef<'a>>) {
    if block.is_some() {
        return (arguments, block);
    }
    match arguments.split_last() {
        Some((last, init)) if matches!(last.kind, NodeKind::BlockArgument(_)) => (init, Some(*last)),
        _ => (arguments, None),
    }
}

pub(super) fn is_attribute_assignment(name: &str) -> bool {
    name.ends_with('=') && !matches!(name, "==" | "!=" | "<=" | ">=" | "===")
}
