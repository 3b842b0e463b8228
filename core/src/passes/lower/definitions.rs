use garnet_ast::{NodeRef, Parameters};

use super::args::Binding;
use super::{Context, Lowerer, Result};
use crate::instructions::{Label, Op};

impl Lowerer {
    pub(super) fn transform_def(
        &mut self,
        name: &str,
        receiver: Option<NodeRef<'_>>,
        parameters: Option<&Parameters<'_>>,
        body: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        if let Some(receiver) = receiver {
            self.transform(receiver, true)?;
            self.open(Op::WithSingleton);
        }
        self.open(Op::DefineMethod {
            name: name.to_string(),
            arity: parameters.map_or(0, |p| p.arity()),
            return_point: None,
        });
        self.in_definition(Context::Method, |this| {
            this.bind_parameters(parameters, Binding::Method)?;
            this.transform_body(body, true)
        })?;
        self.close(Label::DefineMethod);
        if receiver.is_some() {
            self.close(Label::WithSingleton);
        }
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_class(
        &mut self,
        path: NodeRef<'_>,
        superclass: Option<NodeRef<'_>>,
        body: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        let name = self.transform_namespace(path)?;
        if let Some(superclass) = superclass {
            self.transform(superclass, true)?;
        }
        self.open(Op::DefineClass {
            name: name.to_string(),
            has_superclass: superclass.is_some(),
        });
        self.in_definition(Context::Class, |this| this.transform_body(body, true))?;
        self.close(Label::DefineClass);
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_module(&mut self, path: NodeRef<'_>, body: Option<NodeRef<'_>>, used: bool) -> Result {
        let name = self.transform_namespace(path)?;
        self.open(Op::DefineModule {
            name: name.to_string(),
        });
        self.in_definition(Context::Class, |this| this.transform_body(body, true))?;
        self.close(Label::DefineModule);
        self.discard_unless(used);
        Ok(())
    }

    /// `class << expression; body; end`
    pub(super) fn transform_singleton_class(
        &mut self,
        expression: NodeRef<'_>,
        body: Option<NodeRef<'_>>,
        used: bool,
    ) -> Result {
        self.transform(expression, true)?;
        self.open(Op::WithSingleton);
        self.in_definition(Context::Class, |this| this.transform_body(body, true))?;
        self.close(Label::WithSingleton);
        self.discard_unless(used);
        Ok(())
    }

    pub(super) fn transform_undef(&mut self, names: &[&str], used: bool) -> Result {
        let Some((last, init)) = names.split_last() else {
            self.filler(used);
            return Ok(());
        };
        for name in init {
            self.emit(Op::UndefineMethod(name.to_string()));
            self.emit(Op::Pop);
        }
        self.emit(Op::UndefineMethod(last.to_string()));
        self.discard_unless(used);
        Ok(())
    }

    /// Lower a definition body: `retry` cannot reach a handler outside it.
    fn in_definition(&mut self, context: Context, f: impl FnOnce(&mut Self) -> Result) -> Result {
        let retry_points = core::mem::take(&mut self.retry_points);
        let result = self.with_context(context, f);
        self.retry_points = retry_points;
        result
    }
}
