//! Compound assignment: `x op= v`, `x ||= v`, `x &&= v`.
//!
//! Index and attribute targets evaluate their receiver and arguments once;
//! the copies needed for the read and the write are made with `DupRel`.

use garnet_ast::{NodeKind, NodeRef};

use super::{Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::{Label, Op};

impl Lowerer {
    pub(super) fn transform_operator_write(
        &mut self,
        target: NodeRef<'_>,
        operator: &str,
        value: NodeRef<'_>,
        used: bool,
    ) -> Result {
        match target.kind {
            NodeKind::IndexTarget { receiver, arguments } => {
                let n = self.push_index_operands(receiver, arguments)?;
                for _ in 0..=n {
                    self.emit(Op::DupRel(n as u32));
                }
                self.send_simple("[]", n);
                self.transform(value, true)?;
                self.send_simple(operator, 1);
                if used {
                    self.emit(Op::Dup);
                    self.emit(Op::MoveRel(n as u32 + 2));
                }
                self.send_simple("[]=", n + 1);
                self.emit(Op::Pop);
            }
            NodeKind::CallTarget { receiver, name } => {
                self.transform(receiver, true)?;
                self.emit(Op::Dup);
                self.send_simple(name, 0);
                self.transform(value, true)?;
                self.send_simple(operator, 1);
                if used {
                    self.emit(Op::Dup);
                    self.emit(Op::MoveRel(2));
                }
                self.send_simple(&format!("{name}="), 1);
                self.emit(Op::Pop);
            }
            _ => {
                self.read_target(target)?;
                self.transform(value, true)?;
                self.send_simple(operator, 1);
                if used {
                    self.emit(Op::Dup);
                }
                self.bind_target(target, false)?;
            }
        }
        Ok(())
    }

    /// `target ||= value` (`is_or`) or `target &&= value`.
    pub(super) fn transform_logical_write(
        &mut self,
        target: NodeRef<'_>,
        value: NodeRef<'_>,
        is_or: bool,
        used: bool,
    ) -> Result {
        match target.kind {
            NodeKind::ConstantTarget(_) | NodeKind::ConstantPath { .. } | NodeKind::ClassVariableTarget(_) => {
                let operator = if is_or { "||=" } else { "&&=" };
                return Err(self.unsupported(format!("{operator} on {}", target.kind.name())));
            }
            NodeKind::IndexTarget { receiver, arguments } => {
                let n = self.push_index_operands(receiver, arguments)?;
                for _ in 0..=n {
                    self.emit(Op::DupRel(n as u32));
                }
                self.send_simple("[]", n);
                self.keep_or_assign(
                    is_or,
                    |this| {
                        this.emit(Op::MoveRel(n as u32 + 1));
                        for _ in 0..=n {
                            this.emit(Op::Pop);
                        }
                        Ok(())
                    },
                    |this| {
                        this.emit(Op::Pop);
                        this.transform(value, true)?;
                        this.emit(Op::Dup);
                        this.emit(Op::MoveRel(n as u32 + 2));
                        this.send_simple("[]=", n + 1);
                        this.emit(Op::Pop);
                        Ok(())
                    },
                )?;
            }
            NodeKind::CallTarget { receiver, name } => {
                self.transform(receiver, true)?;
                self.emit(Op::Dup);
                self.send_simple(name, 0);
                self.keep_or_assign(
                    is_or,
                    |this| {
                        this.emit(Op::Swap);
                        this.emit(Op::Pop);
                        Ok(())
                    },
                    |this| {
                        this.emit(Op::Pop);
                        this.transform(value, true)?;
                        this.emit(Op::Dup);
                        this.emit(Op::MoveRel(2));
                        this.send_simple(&format!("{name}="), 1);
                        this.emit(Op::Pop);
                        Ok(())
                    },
                )?;
            }
            _ => {
                self.read_target(target)?;
                self.keep_or_assign(
                    is_or,
                    |_| Ok(()),
                    |this| {
                        this.emit(Op::Pop);
                        this.transform(value, true)?;
                        this.emit(Op::Dup);
                        this.bind_target(target, false)
                    },
                )?;
            }
        }
        self.discard_unless(used);
        Ok(())
    }

    /// With the current value on top: branch on its truthiness. `keep` and
    /// `assign` both start from the operands plus the current value and
    /// must leave just the result.
    fn keep_or_assign(
        &mut self,
        is_or: bool,
        keep: impl FnOnce(&mut Self) -> Result,
        assign: impl FnOnce(&mut Self) -> Result,
    ) -> Result {
        self.emit(Op::Dup);
        self.open(Op::If);
        if is_or {
            keep(self)?;
            self.middle(Op::Else(Label::If));
            assign(self)?;
        } else {
            assign(self)?;
            self.middle(Op::Else(Label::If));
            keep(self)?;
        }
        self.close(Label::If);
        Ok(())
    }

    fn push_index_operands(&mut self, receiver: NodeRef<'_>, arguments: &[NodeRef<'_>]) -> Result<usize> {
        if arguments.iter().any(|a| matches!(a.kind, NodeKind::Splat(_))) {
            return Err(self.unsupported("splat in index assignment target"));
        }
        self.transform(receiver, true)?;
        for argument in arguments {
            self.transform(argument, true)?;
        }
        Ok(arguments.len())
    }

    /// Push the current value of a variable or constant target. An unset
    /// local reads as nil.
    fn read_target(&mut self, target: NodeRef<'_>) -> Result {
        match target.kind {
            NodeKind::LocalVariableTarget(name) => self.emit(Op::VariableGet {
                name: name.to_string(),
                default_to_nil: true,
            }),
            NodeKind::InstanceVariableTarget(name) => self.emit(Op::InstanceVariableGet(name.to_string())),
            NodeKind::GlobalVariableTarget(name) => self.emit(Op::GlobalVariableGet(name.to_string())),
            NodeKind::ClassVariableTarget(name) => self.emit(Op::ClassVariableGet(name.to_string())),
            NodeKind::ConstantTarget(name) => {
                self.emit(Op::PushSelf);
                self.emit(Op::ConstFind {
                    name: name.to_string(),
                    strict: false,
                });
            }
            NodeKind::ConstantPath { .. } => self.transform_constant(target)?,
            _ => return Err(StructuralError::UnknownNode(target.kind.name()).into()),
        }
        Ok(())
    }
}
