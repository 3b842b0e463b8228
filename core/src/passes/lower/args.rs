//! Parameter binding.
//!
//! Positional parameters are consumed from an array of the incoming
//! arguments. Required parameters are peeled from the left until an optional
//! one is reached; an optional parameter may only take a value once every
//! later required parameter has one, so consumption flips to the right to
//! satisfy those first and flips back for the optionals.

use garnet_ast::{KeywordParameter, NodeKind, NodeRef, Parameters};

use super::{Lowerer, Result};
use crate::instructions::{Label, Op};

/// What kind of frame the parameters belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Binding {
    Method,
    /// Lenient arity; a lone array argument is spread over the parameters.
    Block,
    Lambda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FromSide {
    Left,
    Right,
}

impl FromSide {
    fn take(self) -> Op {
        match self {
            FromSide::Left => Op::ArrayShift,
            FromSide::Right => Op::ArrayPop,
        }
    }
}

impl Lowerer {
    pub(super) fn bind_parameters(&mut self, parameters: Option<&Parameters<'_>>, binding: Binding) -> Result {
        let empty = Parameters::default();
        let parameters = parameters.unwrap_or(&empty);
        if parameters.is_empty() {
            if binding != Binding::Block {
                self.emit(Op::PushArgs {
                    for_block: false,
                    min_count: 0,
                    max_count: Some(0),
                    spread: false,
                    keyword_args: false,
                });
                self.emit(Op::Pop);
            }
            return Ok(());
        }

        let has_keywords = !parameters.keywords.is_empty() || parameters.keyword_rest.is_some();

        let single = match parameters.requireds {
            [only] if parameters.positional_count() == 1 && parameters.rest.is_none() => match only.kind {
                NodeKind::LocalVariableTarget(name) => Some(name),
                _ => None,
            },
            _ => None,
        };
        match single {
            Some(name) if binding == Binding::Block && !has_keywords => {
                self.emit(Op::PushArg {
                    index: 0,
                    nil_default: true,
                });
                self.set_local(name);
            }
            _ => self.bind_positionals(parameters, binding, has_keywords)?,
        }

        // Keyword defaults may read any positional parameter.
        if has_keywords {
            self.bind_keywords(parameters.keywords, parameters.keyword_rest)?;
        }

        if let Some(name) = parameters.block {
            self.emit(Op::PushBlock);
            self.set_local(name);
        }
        Ok(())
    }

    fn bind_positionals(&mut self, parameters: &Parameters<'_>, binding: Binding, has_keywords: bool) -> Result {
        let positional = parameters.positional_count();
        if positional == 0 && parameters.rest.is_none() && binding == Binding::Block {
            return Ok(());
        }
        let for_block = binding == Binding::Block;
        let has_rest = parameters.rest.is_some();
        self.emit(Op::PushArgs {
            for_block,
            min_count: (parameters.requireds.len() + parameters.posts.len()) as u32,
            max_count: (!has_rest).then_some(positional as u32),
            spread: for_block && (positional > 1 || (has_rest && positional > 0)),
            keyword_args: has_keywords,
        });

        let mut side = FromSide::Left;
        for required in parameters.requireds {
            self.take_into(side, required)?;
        }

        // Trailing requireds claim their values before any optional does.
        let mut posts_bound = false;
        if !parameters.optionals.is_empty() {
            side = FromSide::Right;
            for post in parameters.posts.iter().rev() {
                self.take_into(side, post)?;
            }
            posts_bound = true;
            side = FromSide::Left;
            for optional in parameters.optionals {
                if is_literal(optional.value) {
                    self.transform(optional.value, true)?;
                    self.emit(Op::ArrayShiftWithDefault);
                } else {
                    self.emit(Op::ArrayIsEmpty);
                    self.open(Op::If);
                    self.transform(optional.value, true)?;
                    self.middle(Op::Else(Label::If));
                    self.emit(Op::ArrayShift);
                    self.close(Label::If);
                }
                self.set_local(optional.name);
            }
        }

        if let Some(rest) = parameters.rest {
            if !posts_bound {
                for post in parameters.posts.iter().rev() {
                    self.take_into(FromSide::Right, post)?;
                }
                posts_bound = true;
            }
            if let Some(name) = rest {
                self.emit(Op::Dup);
                self.set_local(name);
            }
        }

        if !posts_bound {
            for post in parameters.posts {
                self.take_into(side, post)?;
            }
        }
        self.emit(Op::Pop);
        Ok(())
    }

    /// `[array] -> [array]`, binding one element to `target`.
    fn take_into(&mut self, side: FromSide, target: NodeRef<'_>) -> Result {
        self.emit(side.take());
        self.bind_target(target, true)
    }

    fn bind_keywords(&mut self, keywords: &[KeywordParameter<'_>], rest: Option<Option<&str>>) -> Result {
        self.emit(Op::PopKeywordArgs);
        let required: Vec<String> = keywords
            .iter()
            .filter(|k| k.value.is_none())
            .map(|k| k.name.to_string())
            .collect();
        if !required.is_empty() {
            self.emit(Op::CheckRequiredKeywords(required));
        }

        for keyword in keywords {
            let name = keyword.name.to_string();
            match keyword.value {
                None => self.emit(Op::HashDelete(name)),
                Some(default) if is_literal(default) => {
                    self.transform(default, true)?;
                    self.emit(Op::HashDeleteWithDefault(name));
                }
                Some(default) => {
                    self.emit(Op::Dup);
                    self.emit(Op::PushSymbol(name.clone()));
                    self.send_simple("key?", 1);
                    self.open(Op::If);
                    self.emit(Op::HashDelete(name));
                    self.middle(Op::Else(Label::If));
                    self.transform(default, true)?;
                    self.close(Label::If);
                }
            }
            self.set_local(keyword.name);
        }

        match rest {
            Some(Some(name)) => {
                self.emit(Op::Dup);
                self.set_local(name);
            }
            Some(None) => {}
            None => self.emit(Op::CheckExtraKeywords),
        }
        self.emit(Op::Pop);
        Ok(())
    }

    fn set_local(&mut self, name: &str) {
        self.emit(Op::VariableSet {
            name: name.to_string(),
            local_only: true,
        });
    }
}

/// Defaults that can be evaluated eagerly without observable effects.
fn is_literal(node: NodeRef<'_>) -> bool {
    matches!(
        node.kind,
        NodeKind::Nil
            | NodeKind::True
            | NodeKind::False
            | NodeKind::Integer(_)
            | NodeKind::Float(_)
            | NodeKind::Symbol(_)
    )
}
