use garnet_ast::{NodeKind, NodeRef};

use super::{Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::Op;

impl Lowerer {
    /// `a, (b, *c), d = value`
    pub(super) fn transform_multi_write(
        &mut self,
        lefts: &[NodeRef<'_>],
        rest: Option<NodeRef<'_>>,
        rights: &[NodeRef<'_>],
        value: NodeRef<'_>,
        used: bool,
    ) -> Result {
        self.transform(value, true)?;
        if used {
            self.emit(Op::Dup);
        }
        self.emit(Op::ToArray);
        self.destructure(lefts, rest, rights, false)?;
        self.emit(Op::Pop);
        Ok(())
    }

    /// `[array] -> [array]`, binding the targets from the array's elements.
    /// Targets after a splat are taken from the right.
    pub(super) fn destructure(
        &mut self,
        lefts: &[NodeRef<'_>],
        rest: Option<NodeRef<'_>>,
        rights: &[NodeRef<'_>],
        local_only: bool,
    ) -> Result {
        for target in lefts {
            self.emit(Op::ArrayShift);
            self.bind_target(target, local_only)?;
        }
        let Some(rest) = rest else {
            for target in rights {
                self.emit(Op::ArrayShift);
                self.bind_target(target, local_only)?;
            }
            return Ok(());
        };
        for target in rights.iter().rev() {
            self.emit(Op::ArrayPop);
            self.bind_target(target, local_only)?;
        }
        match rest.kind {
            NodeKind::Splat(target) => {
                self.emit(Op::Dup);
                self.bind_target(target, local_only)
            }
            NodeKind::SplatAnonymous => Ok(()),
            _ => Err(StructuralError::UnknownNode(rest.kind.name()).into()),
        }
    }

    /// Store the value on top of the stack into an assignment target.
    ///
    /// Stack: [..., value] -> [...]
    pub(super) fn bind_target(&mut self, target: NodeRef<'_>, local_only: bool) -> Result {
        match target.kind {
            NodeKind::LocalVariableTarget(name) => self.emit(Op::VariableSet {
                name: name.to_string(),
                local_only,
            }),
            NodeKind::InstanceVariableTarget(name) => self.emit(Op::InstanceVariableSet(name.to_string())),
            NodeKind::GlobalVariableTarget(name) => self.emit(Op::GlobalVariableSet(name.to_string())),
            NodeKind::ClassVariableTarget(name) => self.emit(Op::ClassVariableSet(name.to_string())),
            NodeKind::ConstantTarget(_) | NodeKind::ConstantPath { .. } => {
                let name = self.transform_namespace(target)?;
                self.emit(Op::ConstSet(name.to_string()));
            }
            NodeKind::IndexTarget { receiver, arguments } => {
                if arguments.iter().any(|a| matches!(a.kind, NodeKind::Splat(_))) {
                    return Err(self.unsupported("splat in index assignment target"));
                }
                let n = arguments.len();
                self.transform(receiver, true)?;
                for argument in arguments {
                    self.transform(argument, true)?;
                }
                self.emit(Op::DupRel(n as u32 + 1));
                self.send_simple("[]=", n + 1);
                self.emit(Op::Pop);
                self.emit(Op::Pop);
            }
            NodeKind::CallTarget { receiver, name } => {
                self.transform(receiver, true)?;
                self.emit(Op::DupRel(1));
                self.send_simple(&format!("{name}="), 1);
                self.emit(Op::Pop);
                self.emit(Op::Pop);
            }
            NodeKind::MultiTarget { lefts, rest, rights } => {
                self.emit(Op::ToArray);
                self.destructure(lefts, rest, rights, local_only)?;
                self.emit(Op::Pop);
            }
            _ => return Err(StructuralError::UnknownNode(target.kind.name()).into()),
        }
        Ok(())
    }
}
