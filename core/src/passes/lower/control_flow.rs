use garnet_ast::{NodeKind, NodeRef};

use super::{Context, Lowerer, Result};
use crate::error::{LoweringError, StructuralError};
use crate::instructions::{Label, Op};

impl Lowerer {
    pub(super) fn transform_if(
        &mut self,
        predicate: NodeRef<'_>,
        then: Option<NodeRef<'_>>,
        otherwise: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        self.transform(predicate, true)?;
        self.open(Op::If);
        self.transform_body(then, used)?;
        if used || otherwise.is_some() {
            self.middle(Op::Else(Label::If));
            self.transform_body(otherwise, used)?;
        }
        self.close(Label::If);
        Ok(())
    }

    /// `while` / `until` loops; `negate` flips the condition.
    pub(super) fn transform_while(
        &mut self,
        predicate: NodeRef<'_>,
        statements: Option<NodeRef<'_>>,
        do_while: bool,
        negate: bool,
        used: bool,
    ) -> Result {
        self.with_context(Context::Loop, |this| {
            this.open(Op::While {
                pre: !do_while,
                break_point: None,
            });
            this.transform(predicate, true)?;
            if negate {
                this.emit(Op::Not);
            }
            this.middle(Op::WhileBody);
            this.transform_body(statements, false)?;
            this.close(Label::While);
            Ok(())
        })?;
        self.discard_unless(used);
        Ok(())
    }

    // === case / when ===

    pub(super) fn transform_case(
        &mut self,
        subject: Option<NodeRef<'_>>,
        conditions: &[NodeRef<'_>],
        else_clause: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        match subject {
            Some(subject) => {
                self.transform(subject, true)?;
                self.when_chain(true, conditions, else_clause, used)
            }
            None => self.when_chain(false, conditions, else_clause, used),
        }
    }

    /// One `when` clause and, in its `Else`, the rest. With a subject the
    /// subject stays on the stack until a clause is taken.
    fn when_chain(
        &mut self,
        with_subject: bool,
        clauses: &[NodeRef<'_>],
        else_clause: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let Some((clause, rest)) = clauses.split_first() else {
            if with_subject {
                self.emit(Op::Pop);
            }
            return self.transform_body(else_clause, used);
        };
        let NodeKind::When { conditions, statements } = clause.kind else {
            return Err(StructuralError::UnknownNode(clause.kind.name()).into());
        };

        for (i, condition) in conditions.iter().enumerate() {
            if i > 0 {
                // OR with the previous test.
                self.emit(Op::Dup);
                self.open(Op::If);
                self.middle(Op::Else(Label::If));
                self.emit(Op::Pop);
            }
            self.when_test(with_subject, condition)?;
            if i > 0 {
                self.close(Label::If);
            }
        }

        self.open(Op::If);
        if with_subject {
            self.emit(Op::Pop);
        }
        self.transform_body(statements, used)?;
        self.middle(Op::Else(Label::If));
        self.when_chain(with_subject, rest, else_clause, used)?;
        self.close(Label::If);
        Ok(())
    }

    /// Push whether `condition` matches: `condition === subject`.
    fn when_test(&mut self, with_subject: bool, condition: NodeRef<'_>) -> Result {
        if matches!(condition.kind, NodeKind::Splat(_)) {
            return Err(self.unsupported("splat in when clause"));
        }
        if !with_subject {
            return self.transform(condition, true);
        }
        self.emit(Op::Dup);
        self.transform(condition, true)?;
        self.emit(Op::Swap);
        self.send_simple("===", 1);
        Ok(())
    }

    // === Jumps ===

    pub(super) fn transform_return(&mut self, value: Option<NodeRef<'_>>, used: bool) -> Result {
        self.transform_body(value, true)?;
        self.emit(Op::Return { return_point: None });
        self.filler(used);
        Ok(())
    }

    pub(super) fn transform_break(&mut self, value: Option<NodeRef<'_>>, used: bool) -> Result {
        self.transform_body(value, true)?;
        self.emit(Op::Break { break_point: None });
        self.filler(used);
        Ok(())
    }

    pub(super) fn transform_next(&mut self, value: Option<NodeRef<'_>>, used: bool) -> Result {
        if !matches!(self.innermost(), Context::Block | Context::Loop) {
            return Err(LoweringError::InvalidNext { line: self.line }.into());
        }
        self.transform_body(value, true)?;
        self.emit(Op::Next);
        self.filler(used);
        Ok(())
    }

    pub(super) fn transform_redo(&mut self, used: bool) -> Result {
        if !matches!(self.innermost(), Context::Block | Context::Loop) {
            return Err(LoweringError::InvalidRedo { line: self.line }.into());
        }
        self.emit(Op::Redo);
        self.filler(used);
        Ok(())
    }

    pub(super) fn transform_retry(&mut self, used: bool) -> Result {
        let Some(&retry_point) = self.retry_points.last() else {
            return Err(LoweringError::InvalidRetry { line: self.line }.into());
        };
        self.emit(Op::Retry(retry_point));
        self.filler(used);
        Ok(())
    }
}
