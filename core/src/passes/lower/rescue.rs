use garnet_ast::{NodeKind, NodeRef};

use super::{Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::{BreakPoint, Label, Op};

impl Lowerer {
    /// `begin; body; rescue ...; else ...; ensure ...; end`
    pub(super) fn transform_begin(
        &mut self,
        statements: Option<NodeRef<'_>>,
        rescue: Option<NodeRef<'_>>,
        else_clause: Option<NodeRef<'_>>,
        ensure: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let Some(ensure) = ensure else {
            return self.transform_rescue(statements, rescue, else_clause, used);
        };
        self.open(Op::Try {
            ensure: true,
            retry_point: None,
        });
        self.transform_rescue(statements, rescue, else_clause, true)?;
        self.middle(Op::Catch);
        self.transform(ensure, false)?;
        self.emit(Op::Reraise);
        self.filler(true);
        self.close(Label::Try);
        self.transform(ensure, false)?;
        self.discard_unless(used);
        Ok(())
    }

    fn transform_rescue(
        &mut self,
        statements: Option<NodeRef<'_>>,
        rescue: Option<NodeRef<'_>>,
        else_clause: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let Some(rescue) = rescue else {
            if let Some(else_clause) = else_clause {
                self.transform_body(statements, false)?;
                return self.transform(else_clause, used);
            }
            return self.transform_body(statements, used);
        };

        let retry_point = BreakPoint::next();
        self.open(Op::Try {
            ensure: false,
            retry_point: Some(retry_point),
        });
        match else_clause {
            // The else clause runs outside the handlers: the body leaves
            // false, a handler leaves its value wrapped in an array.
            Some(_) => {
                self.transform_body(statements, false)?;
                self.emit(Op::PushFalse);
            }
            None => self.transform_body(statements, true)?,
        }
        self.middle(Op::Catch);
        self.retry_points.push(retry_point);
        let handled = self.rescue_clause(rescue);
        self.retry_points.pop();
        handled?;
        if else_clause.is_some() {
            self.emit(Op::CreateArray(1));
        }
        self.close(Label::Try);

        if let Some(else_clause) = else_clause {
            self.emit(Op::Dup);
            self.open(Op::If);
            self.emit(Op::PushInt(0));
            self.send_simple("[]", 1);
            self.middle(Op::Else(Label::If));
            self.emit(Op::Pop);
            self.transform(else_clause, true)?;
            self.close(Label::If);
        }
        self.discard_unless(used);
        Ok(())
    }

    /// One `rescue` clause and, in its `Else`, the following ones. No match
    /// re-raises.
    fn rescue_clause(&mut self, clause: NodeRef<'_>) -> Result {
        let NodeKind::Rescue {
            exceptions,
            reference,
            statements,
            subsequent,
        } = clause.kind
        else {
            return Err(StructuralError::UnknownNode(clause.kind.name()).into());
        };

        if exceptions.is_empty() {
            self.emit(Op::PushSelf);
            self.emit(Op::ConstFind {
                name: "StandardError".to_string(),
                strict: false,
            });
            self.emit(Op::CreateArray(1));
        } else {
            self.push_array(exceptions)?;
        }
        self.emit(Op::MatchException);
        self.open(Op::If);
        if let Some(reference) = reference {
            self.emit(Op::GlobalVariableGet("$!".to_string()));
            self.bind_target(reference, false)?;
        }
        self.transform_body(statements, true)?;
        self.middle(Op::Else(Label::If));
        match subsequent {
            Some(next) => self.rescue_clause(next)?,
            None => {
                self.emit(Op::Reraise);
                self.filler(true);
            }
        }
        self.close(Label::If);
        Ok(())
    }
}
