use garnet_ast::{NodeKind, NodeRef};

use super::{Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::{CallSite, Label, Op};

impl Lowerer {
    pub(super) fn transform_literal(&mut self, node: NodeRef<'_>, used: bool) -> Result {
        if !used {
            return Ok(());
        }
        let op = match node.kind {
            NodeKind::Nil => Op::PushNil,
            NodeKind::True => Op::PushTrue,
            NodeKind::False => Op::PushFalse,
            NodeKind::SelfNode => Op::PushSelf,
            NodeKind::Integer(value) => Op::PushInt(value),
            NodeKind::Float(value) => Op::PushFloat(value),
            NodeKind::String(value) => Op::PushString {
                value: value.to_string(),
                frozen: false,
            },
            NodeKind::Symbol(name) => Op::PushSymbol(name.to_string()),
            NodeKind::Regexp { source, options } => Op::PushRegexp {
                source: source.to_string(),
                options,
            },
            _ => return Err(StructuralError::UnknownNode(node.kind.name()).into()),
        };
        self.emit(op);
        Ok(())
    }

    pub(super) fn transform_interpolated_string(&mut self, parts: &[NodeRef<'_>], used: bool) -> Result {
        self.emit(Op::PushString {
            value: String::new(),
            frozen: false,
        });
        for part in parts {
            self.transform(part, true)?;
            self.emit(Op::StringAppend);
        }
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_array(&mut self, elements: &[NodeRef<'_>], used: bool) -> Result {
        self.push_array(elements)?;
        self.discard_unless(used);
        Ok(())
    }

    /// Push a new array holding `elements`, expanding splats.
    pub(super) fn push_array(&mut self, elements: &[NodeRef<'_>]) -> Result {
        let leading = elements
            .iter()
            .take_while(|e| !matches!(e.kind, NodeKind::Splat(_)))
            .count();
        for element in &elements[..leading] {
            self.transform(element, true)?;
        }
        self.emit(Op::CreateArray(leading as u32));
        for element in &elements[leading..] {
            match element.kind {
                NodeKind::Splat(value) => {
                    self.transform(value, true)?;
                    self.emit(Op::ArrayWrap);
                    self.emit(Op::ArrayConcat);
                }
                _ => {
                    self.transform(element, true)?;
                    self.emit(Op::ArrayPush);
                }
            }
        }
        Ok(())
    }

    pub(super) fn transform_hash(&mut self, elements: &[NodeRef<'_>], bare: bool, used: bool) -> Result {
        let leading = elements
            .iter()
            .take_while(|e| matches!(e.kind, NodeKind::Assoc { .. }))
            .count();
        for element in &elements[..leading] {
            if let NodeKind::Assoc { key, value } = element.kind {
                self.transform(key, true)?;
                self.transform(value, true)?;
            }
        }
        self.emit(Op::CreateHash {
            count: leading as u32,
            bare,
        });
        for element in &elements[leading..] {
            match element.kind {
                NodeKind::AssocSplat(other) => {
                    self.transform(other, true)?;
                    self.emit(Op::HashMerge);
                }
                NodeKind::Assoc { key, value } => {
                    self.transform(key, true)?;
                    self.transform(value, true)?;
                    self.emit(Op::HashPut);
                }
                _ => return Err(StructuralError::UnknownNode(element.kind.name()).into()),
            }
        }
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_range(
        &mut self,
        left: Option<NodeRef<'_>>,
        right: Option<NodeRef<'_>>,
        exclude_end: bool,
        used: bool,
    ) -> Result {
        self.transform_body(left, true)?;
        self.transform_body(right, true)?;
        self.emit(Op::PushRange { exclude_end });
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_local_write(&mut self, name: &str, value: NodeRef<'_>, used: bool) -> Result {
        self.transform(value, true)?;
        if used {
            self.emit(Op::Dup);
        }
        self.emit(Op::VariableSet {
            name: name.to_string(),
            local_only: false,
        });
        Ok(())
    }

    /// Assignment whose store instruction pops exactly the value.
    pub(super) fn transform_simple_write(&mut self, store: Op, value: NodeRef<'_>, used: bool) -> Result {
        self.transform(value, true)?;
        if used {
            self.emit(Op::Dup);
        }
        self.emit(store);
        Ok(())
    }

    // === Constants ===

    /// Push the value of a `ConstantRead` / `ConstantPath`.
    pub(super) fn transform_constant(&mut self, node: NodeRef<'_>) -> Result {
        match node.kind {
            NodeKind::ConstantRead(name) => {
                self.emit(Op::PushSelf);
                self.emit(Op::ConstFind {
                    name: name.to_string(),
                    strict: false,
                });
            }
            NodeKind::ConstantPath { parent, name } => {
                match parent {
                    Some(parent) => self.transform(parent, true)?,
                    None => self.push_object_class(),
                }
                self.emit(Op::ConstFind {
                    name: name.to_string(),
                    strict: true,
                });
            }
            _ => return Err(StructuralError::UnknownNode(node.kind.name()).into()),
        }
        Ok(())
    }

    pub(super) fn push_object_class(&mut self) {
        self.emit(Op::PushSelf);
        self.emit(Op::ConstFind {
            name: "Object".to_string(),
            strict: false,
        });
    }

    /// Push the namespace a constant path defines into and return the final
    /// name. A bare name defines into `self`.
    pub(super) fn transform_namespace<'a>(&mut self, path: NodeRef<'a>) -> Result<&'a str> {
        match path.kind {
            NodeKind::ConstantRead(name) | NodeKind::ConstantTarget(name) => {
                self.emit(Op::PushSelf);
                Ok(name)
            }
            NodeKind::ConstantPath {
                parent: Some(parent),
                name,
            } => {
                self.transform(parent, true)?;
                Ok(name)
            }
            NodeKind::ConstantPath { parent: None, name } => {
                self.push_object_class();
                Ok(name)
            }
            _ => Err(StructuralError::UnknownNode(path.kind.name()).into()),
        }
    }

    pub(super) fn transform_constant_write(&mut self, target: NodeRef<'_>, value: NodeRef<'_>, used: bool) -> Result {
        self.transform(value, true)?;
        if used {
            self.emit(Op::Dup);
        }
        let name = self.transform_namespace(target)?;
        self.emit(Op::ConstSet(name.to_string()));
        Ok(())
    }

    // === Operators ===

    /// `a && b` / `a || b`: keep the left value unless the right one decides.
    pub(super) fn transform_and_or(&mut self, left: NodeRef<'_>, right: NodeRef<'_>, is_and: bool, used: bool) -> Result {
        self.transform(left, true)?;
        self.emit(Op::Dup);
        self.open(Op::If);
        if is_and {
            self.emit(Op::Pop);
            self.transform(right, true)?;
            self.middle(Op::Else(Label::If));
        } else {
            self.middle(Op::Else(Label::If));
            self.emit(Op::Pop);
            self.transform(right, true)?;
        }
        self.close(Label::If);
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_defined(&mut self, expression: NodeRef<'_>, used: bool) -> Result {
        match expression.kind {
            NodeKind::LocalVariableRead(_) => self.push_frozen("local-variable"),
            NodeKind::InstanceVariableRead(name) => self.emit(Op::InstanceVariableDefined(name.to_string())),
            NodeKind::GlobalVariableRead(name) => self.emit(Op::GlobalVariableDefined(name.to_string())),
            NodeKind::SelfNode => self.push_frozen("self"),
            NodeKind::Nil | NodeKind::True | NodeKind::False => self.push_frozen("expression"),
            NodeKind::LocalVariableWrite { .. }
            | NodeKind::InstanceVariableWrite { .. }
            | NodeKind::GlobalVariableWrite { .. }
            | NodeKind::ClassVariableWrite { .. }
            | NodeKind::ConstantWrite { .. }
            | NodeKind::OperatorWrite { .. }
            | NodeKind::OrWrite { .. }
            | NodeKind::AndWrite { .. }
            | NodeKind::MultiWrite { .. } => self.push_frozen("assignment"),
            NodeKind::ConstantRead(_) | NodeKind::ConstantPath { .. } => {
                self.guarded(|this| {
                    this.transform_constant(expression)?;
                    this.emit(Op::Pop);
                    this.push_frozen("constant");
                    Ok(())
                })?;
            }
            NodeKind::ClassVariableRead(name) => {
                self.guarded(|this| {
                    this.emit(Op::ClassVariableGet(name.to_string()));
                    this.emit(Op::Pop);
                    this.push_frozen("class variable");
                    Ok(())
                })?;
            }
            NodeKind::Call { receiver: None, name, .. } => {
                self.emit(Op::PushSelf);
                self.emit(Op::PushSymbol(name.to_string()));
                self.emit(Op::PushTrue);
                self.emit(Op::PushArgc(2));
                self.pop_stack_n(2);
                let mut call = CallSite::new("respond_to?");
                call.receiver_is_self = true;
                self.emit(Op::Send(call));
                self.push_if_truthy("method");
            }
            NodeKind::Call {
                receiver: Some(receiver),
                name,
                ..
            } => {
                self.guarded(|this| {
                    this.transform(receiver, true)?;
                    this.emit(Op::PushSymbol(name.to_string()));
                    this.emit(Op::PushArgc(1));
                    this.pop_stack_n(1);
                    this.emit(Op::Send(CallSite::new("respond_to?")));
                    this.push_if_truthy("method");
                    Ok(())
                })?;
            }
            NodeKind::Yield(_) => {
                self.emit(Op::PushBlock);
                self.emit(Op::IsNil);
                self.open(Op::If);
                self.emit(Op::PushNil);
                self.middle(Op::Else(Label::If));
                self.push_frozen("yield");
                self.close(Label::If);
            }
            NodeKind::Super { .. } | NodeKind::ForwardingSuper { .. } => {
                return Err(self.unsupported("defined?(super)"));
            }
            _ => self.push_frozen("expression"),
        }
        self.discard_unless(used);
        Ok(())
    }

    fn push_frozen(&mut self, value: &str) {
        self.emit(Op::PushString {
            value: value.to_string(),
            frozen: true,
        });
    }

    /// Replace the boolean on top with `description` or nil.
    fn push_if_truthy(&mut self, description: &str) {
        self.open(Op::If);
        self.push_frozen(description);
        self.middle(Op::Else(Label::If));
        self.emit(Op::PushNil);
        self.close(Label::If);
    }

    /// Run `body` (which pushes one value) under a rescue-all; any exception
    /// yields nil instead.
    fn guarded(&mut self, body: impl FnOnce(&mut Self) -> Result) -> Result {
        self.open(Op::Try {
            ensure: false,
            retry_point: None,
        });
        body(self)?;
        self.middle(Op::Catch);
        self.emit(Op::PushNil);
        self.close(Label::Try);
        Ok(())
    }
}
