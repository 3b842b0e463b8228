//! `case ... in` pattern matching.
//!
//! Every pattern compiles to a test with the shape `[value] -> [bool]`,
//! binding variables as a side effect. Structural patterns nest one `If`
//! per check so a failed check short-circuits the rest.

use garnet_ast::{NodeKind, NodeRef};

use super::{Lowerer, Result};
use crate::error::StructuralError;
use crate::instructions::{CallSite, Label, Op};

/// One check of an array pattern, in match order.
enum ArrayStep<'a> {
    Element(i64, NodeRef<'a>),
    Rest { name: &'a str, from: i64, to: i64 },
}

impl Lowerer {
    pub(super) fn transform_case_match(
        &mut self,
        subject: NodeRef<'_>,
        clauses: &[NodeRef<'_>],
        else_clause: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        self.transform(subject, true)?;
        self.in_chain(clauses, else_clause, used)
    }

    fn in_chain(&mut self, clauses: &[NodeRef<'_>], else_clause: Option<NodeRef<'_>>, used: bool) -> Result {
        let Some((clause, rest)) = clauses.split_first() else {
            return self.no_match(else_clause, used);
        };
        let NodeKind::In { pattern, statements } = clause.kind else {
            return Err(StructuralError::UnknownNode(clause.kind.name()).into());
        };
        self.emit(Op::Dup);
        self.pattern_test(pattern)?;
        self.open(Op::If);
        self.emit(Op::Pop);
        self.transform_body(statements, used)?;
        self.middle(Op::Else(Label::If));
        self.in_chain(rest, else_clause, used)?;
        self.close(Label::If);
        Ok(())
    }

    /// Subject on the stack, nothing matched: the else clause, or raise
    /// `NoMatchingPatternError` with the inspected subject.
    fn no_match(&mut self, else_clause: Option<NodeRef<'_>>, used: bool) -> Result {
        if let Some(else_clause) = else_clause {
            self.emit(Op::Pop);
            return self.transform(else_clause, used);
        }
        self.emit(Op::PushSelf);
        self.emit(Op::Swap);
        self.emit(Op::PushSelf);
        self.emit(Op::ConstFind {
            name: "NoMatchingPatternError".to_string(),
            strict: false,
        });
        self.emit(Op::Swap);
        self.send_simple("inspect", 0);
        self.emit(Op::PushArgc(2));
        self.pop_stack_n(2);
        let mut call = CallSite::new("raise");
        call.receiver_is_self = true;
        self.emit(Op::Send(call));
        self.discard_unless(used);
        Ok(())
    }

    /// Stack: [value] -> [matched?]
    fn pattern_test(&mut self, pattern: NodeRef<'_>) -> Result {
        match pattern.kind {
            NodeKind::LocalVariableTarget(name) => {
                self.bind_pattern_variable(name);
                self.emit(Op::PushTrue);
            }
            NodeKind::PinnedVariable(name) => {
                self.emit(Op::VariableGet {
                    name: name.to_string(),
                    default_to_nil: false,
                });
                self.case_equal()
            }
            NodeKind::PinnedExpression(expression) => {
                self.transform(expression, true)?;
                self.case_equal()
            }
            NodeKind::AlternationPattern { left, right } => {
                self.emit(Op::Dup);
                self.pattern_test(left)?;
                self.open(Op::If);
                self.emit(Op::Pop);
                self.emit(Op::PushTrue);
                self.middle(Op::Else(Label::If));
                self.pattern_test(right)?;
                self.close(Label::If);
            }
            NodeKind::CapturePattern { value, target } => {
                self.emit(Op::Dup);
                self.pattern_test(value)?;
                self.open(Op::If);
                self.bind_pattern_variable(target);
                self.emit(Op::PushTrue);
                self.middle(Op::Else(Label::If));
                self.emit(Op::Pop);
                self.emit(Op::PushFalse);
                self.close(Label::If);
            }
            NodeKind::ArrayPattern {
                constant,
                requireds,
                rest,
                posts,
            } => self.array_pattern(constant, requireds, rest, posts)?,
            NodeKind::HashPattern {
                constant,
                elements,
                rest,
            } => self.hash_pattern(constant, elements, rest)?,
            _ => {
                self.transform(pattern, true)?;
                self.case_equal();
            }
        }
        Ok(())
    }

    /// Stack: [value, pattern] -> [pattern === value]
    fn case_equal(&mut self) {
        self.emit(Op::Swap);
        self.send_simple("===", 1);
    }

    fn bind_pattern_variable(&mut self, name: &str) {
        self.emit(Op::VariableSet {
            name: name.to_string(),
            local_only: false,
        });
    }

    /// `test` goes `[x] -> [x, bool]`; on success `rest` goes `[x] -> [bool]`,
    /// on failure `x` is dropped for false.
    fn check_then(
        &mut self,
        test: impl FnOnce(&mut Self) -> Result,
        rest: impl FnOnce(&mut Self) -> Result,
    ) -> Result {
        test(self)?;
        self.open(Op::If);
        rest(self)?;
        self.middle(Op::Else(Label::If));
        self.emit(Op::Pop);
        self.emit(Op::PushFalse);
        self.close(Label::If);
        Ok(())
    }

    /// `[x] -> [x, bool]`: `Constant === x`, defaulting to `default`.
    fn type_check(&mut self, constant: Option<NodeRef<'_>>, default: &str) -> Result {
        self.emit(Op::Dup);
        match constant {
            Some(constant) => self.transform(constant, true)?,
            None => {
                self.emit(Op::PushSelf);
                self.emit(Op::ConstFind {
                    name: default.to_string(),
                    strict: false,
                });
            }
        }
        self.case_equal();
        Ok(())
    }

    fn array_pattern(
        &mut self,
        constant: Option<NodeRef<'_>>,
        requireds: &[NodeRef<'_>],
        rest: Option<NodeRef<'_>>,
        posts: &[NodeRef<'_>],
    ) -> Result {
        let mut steps = Vec::with_capacity(requireds.len() + posts.len() + 1);
        for (i, element) in requireds.iter().enumerate() {
            steps.push(ArrayStep::Element(i as i64, *element));
        }
        if let Some(rest) = rest {
            match rest.kind {
                NodeKind::Splat(target) => match target.kind {
                    NodeKind::LocalVariableTarget(name) => steps.push(ArrayStep::Rest {
                        name,
                        from: requireds.len() as i64,
                        to: -(posts.len() as i64) - 1,
                    }),
                    _ => return Err(StructuralError::UnknownNode(target.kind.name()).into()),
                },
                NodeKind::SplatAnonymous => {}
                _ => return Err(StructuralError::UnknownNode(rest.kind.name()).into()),
            }
        }
        let count = posts.len() as i64;
        for (i, element) in posts.iter().enumerate() {
            steps.push(ArrayStep::Element(i as i64 - count, *element));
        }

        let size = (requireds.len() + posts.len()) as i64;
        let exact = rest.is_none();
        self.check_then(
            |this| this.type_check(constant, "Array"),
            |this| {
                this.emit(Op::ToArray);
                this.check_then(
                    |this| {
                        this.emit(Op::Dup);
                        this.send_simple("size", 0);
                        this.emit(Op::PushInt(size));
                        this.send_simple(if exact { "==" } else { ">=" }, 1);
                        Ok(())
                    },
                    |this| this.array_steps(&steps),
                )
            },
        )
    }

    /// Stack: [array] -> [bool]
    fn array_steps(&mut self, steps: &[ArrayStep<'_>]) -> Result {
        let Some((step, tail)) = steps.split_first() else {
            self.emit(Op::Pop);
            self.emit(Op::PushTrue);
            return Ok(());
        };
        match step {
            ArrayStep::Element(index, pattern) => {
                let index = *index;
                let pattern = *pattern;
                self.check_then(
                    |this| {
                        this.emit(Op::Dup);
                        this.emit(Op::PushInt(index));
                        this.send_simple("[]", 1);
                        this.pattern_test(pattern)
                    },
                    |this| this.array_steps(tail),
                )
            }
            ArrayStep::Rest { name, from, to } => {
                self.emit(Op::Dup);
                self.emit(Op::PushInt(*from));
                self.emit(Op::PushInt(*to));
                self.emit(Op::PushRange { exclude_end: false });
                self.send_simple("[]", 1);
                self.bind_pattern_variable(name);
                self.array_steps(tail)
            }
        }
    }

    fn hash_pattern(
        &mut self,
        constant: Option<NodeRef<'_>>,
        elements: &[NodeRef<'_>],
        rest: Option<NodeRef<'_>>,
    ) -> Result {
        let mut pairs = Vec::with_capacity(elements.len());
        for element in elements {
            match element.kind {
                NodeKind::PatternPair { key, value } => pairs.push((key, value)),
                _ => return Err(StructuralError::UnknownNode(element.kind.name()).into()),
            }
        }
        self.check_then(
            |this| this.type_check(constant, "Hash"),
            |this| this.hash_pairs(&pairs, &pairs, rest),
        )
    }

    /// Stack: [hash] -> [bool]
    fn hash_pairs(
        &mut self,
        remaining: &[(&str, Option<NodeRef<'_>>)],
        all: &[(&str, Option<NodeRef<'_>>)],
        rest: Option<NodeRef<'_>>,
    ) -> Result {
        let Some(((key, value), tail)) = remaining.split_first() else {
            return self.hash_rest(all, rest);
        };
        let key = *key;
        let value = *value;
        self.check_then(
            |this| {
                this.emit(Op::Dup);
                this.emit(Op::PushSymbol(key.to_string()));
                this.send_simple("key?", 1);
                Ok(())
            },
            |this| {
                this.check_then(
                    |this| {
                        this.emit(Op::Dup);
                        this.emit(Op::PushSymbol(key.to_string()));
                        this.send_simple("[]", 1);
                        match value {
                            Some(pattern) => this.pattern_test(pattern),
                            None => {
                                this.bind_pattern_variable(key);
                                this.emit(Op::PushTrue);
                                Ok(())
                            }
                        }
                    },
                    |this| this.hash_pairs(tail, all, rest),
                )
            },
        )
    }

    /// Stack: [hash] -> [bool], after every listed key matched.
    fn hash_rest(&mut self, pairs: &[(&str, Option<NodeRef<'_>>)], rest: Option<NodeRef<'_>>) -> Result {
        let Some(rest) = rest else {
            self.emit(Op::Pop);
            self.emit(Op::PushTrue);
            return Ok(());
        };
        match rest.kind {
            NodeKind::NoKeywordsPattern => {
                self.send_simple("size", 0);
                self.emit(Op::PushInt(pairs.len() as i64));
                self.send_simple("==", 1);
            }
            NodeKind::AssocSplat(target) => {
                let NodeKind::LocalVariableTarget(name) = target.kind else {
                    return Err(StructuralError::UnknownNode(target.kind.name()).into());
                };
                self.emit(Op::DupObject);
                for (key, _) in pairs {
                    self.emit(Op::HashDelete(key.to_string()));
                    self.emit(Op::Pop);
                }
                self.bind_pattern_variable(name);
                self.emit(Op::Pop);
                self.emit(Op::PushTrue);
            }
            NodeKind::SplatAnonymous => {
                self.emit(Op::Pop);
                self.emit(Op::PushTrue);
            }
            _ => return Err(StructuralError::UnknownNode(rest.kind.name()).into()),
        }
        Ok(())
    }
}
