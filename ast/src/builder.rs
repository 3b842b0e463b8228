use bumpalo::Bump;

use crate::node::{KeywordParameter, Node, NodeKind, NodeRef, OptionalParameter, Parameters};

/// Allocates syntax nodes in a `Bump` arena.
///
/// The builder is `Copy`; [`AstBuilder::at_line`] returns a builder stamping a
/// different source line on the nodes it creates.
///
/// ```
/// use bumpalo::Bump;
/// use garnet_ast::AstBuilder;
///
/// let arena = Bump::new();
/// let b = AstBuilder::new(&arena);
/// let sum = b.call(Some(b.int(5)), "+", &[b.int(3)]);
/// let program = b.program(&[sum]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AstBuilder<'a> {
    arena: &'a Bump,
    line: u32,
}

// Two builders are equal when they allocate into the same arena.
impl PartialEq for AstBuilder<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.arena, other.arena) && self.line == other.line
    }
}

impl Eq for AstBuilder<'_> {}

impl<'a> AstBuilder<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        Self { arena, line: 1 }
    }

    pub fn at_line(self, line: u32) -> Self {
        Self { line, ..self }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn arena(&self) -> &'a Bump {
        self.arena
    }

    // === Allocation primitives ===

    pub fn node(&self, kind: NodeKind<'a>) -> NodeRef<'a> {
        self.arena.alloc(Node::new(kind, self.line))
    }

    pub fn str(&self, s: &str) -> &'a str {
        self.arena.alloc_str(s)
    }

    pub fn list(&self, nodes: &[NodeRef<'a>]) -> &'a [NodeRef<'a>] {
        self.arena.alloc_slice_copy(nodes)
    }

    pub fn names(&self, names: &[&str]) -> &'a [&'a str] {
        let names: Vec<&'a str> = names.iter().map(|n| self.str(n)).collect();
        self.arena.alloc_slice_copy(&names)
    }

    pub fn parameters(&self, parameters: Parameters<'a>) -> &'a Parameters<'a> {
        self.arena.alloc(parameters)
    }

    // === Literals ===

    pub fn nil(&self) -> NodeRef<'a> {
        self.node(NodeKind::Nil)
    }

    pub fn true_(&self) -> NodeRef<'a> {
        self.node(NodeKind::True)
    }

    pub fn false_(&self) -> NodeRef<'a> {
        self.node(NodeKind::False)
    }

    pub fn self_(&self) -> NodeRef<'a> {
        self.node(NodeKind::SelfNode)
    }

    pub fn int(&self, value: i64) -> NodeRef<'a> {
        self.node(NodeKind::Integer(value))
    }

    pub fn float(&self, value: f64) -> NodeRef<'a> {
        self.node(NodeKind::Float(value))
    }

    pub fn string(&self, value: &str) -> NodeRef<'a> {
        self.node(NodeKind::String(self.str(value)))
    }

    pub fn symbol(&self, value: &str) -> NodeRef<'a> {
        self.node(NodeKind::Symbol(self.str(value)))
    }

    pub fn array(&self, elements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Array(self.list(elements)))
    }

    pub fn hash(&self, elements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Hash(self.list(elements)))
    }

    pub fn keyword_hash(&self, elements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::KeywordHash(self.list(elements)))
    }

    pub fn assoc(&self, key: NodeRef<'a>, value: NodeRef<'a>) -> NodeRef<'a> {
        self.node(NodeKind::Assoc { key, value })
    }

    pub fn range(&self, left: NodeRef<'a>, right: NodeRef<'a>, exclude_end: bool) -> NodeRef<'a> {
        self.node(NodeKind::Range {
            left: Some(left),
            right: Some(right),
            exclude_end,
        })
    }

    pub fn splat(&self, value: NodeRef<'a>) -> NodeRef<'a> {
        self.node(NodeKind::Splat(value))
    }

    // === Variables ===

    pub fn lvar(&self, name: &str) -> NodeRef<'a> {
        self.node(NodeKind::LocalVariableRead(self.str(name)))
    }

    pub fn lasgn(&self, name: &str, value: NodeRef<'a>) -> NodeRef<'a> {
        self.node(NodeKind::LocalVariableWrite {
            name: self.str(name),
            value,
        })
    }

    pub fn ltarget(&self, name: &str) -> NodeRef<'a> {
        self.node(NodeKind::LocalVariableTarget(self.str(name)))
    }

    pub fn ivar(&self, name: &str) -> NodeRef<'a> {
        self.node(NodeKind::InstanceVariableRead(self.str(name)))
    }

    pub fn iasgn(&self, name: &str, value: NodeRef<'a>) -> NodeRef<'a> {
        self.node(NodeKind::InstanceVariableWrite {
            name: self.str(name),
            value,
        })
    }

    pub fn gvar(&self, name: &str) -> NodeRef<'a> {
        self.node(NodeKind::GlobalVariableRead(self.str(name)))
    }

    pub fn constant(&self, name: &str) -> NodeRef<'a> {
        self.node(NodeKind::ConstantRead(self.str(name)))
    }

    // === Calls ===

    pub fn call(
        &self,
        receiver: Option<NodeRef<'a>>,
        name: &str,
        arguments: &[NodeRef<'a>],
    ) -> NodeRef<'a> {
        self.node(NodeKind::Call {
            receiver,
            name: self.str(name),
            arguments: self.list(arguments),
            block: None,
            safe_navigation: false,
        })
    }

    /// Receiver-less call, `name(arguments)`.
    pub fn fcall(&self, name: &str, arguments: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.call(None, name, arguments)
    }

    pub fn call_with_block(
        &self,
        receiver: Option<NodeRef<'a>>,
        name: &str,
        arguments: &[NodeRef<'a>],
        block: NodeRef<'a>,
    ) -> NodeRef<'a> {
        self.node(NodeKind::Call {
            receiver,
            name: self.str(name),
            arguments: self.list(arguments),
            block: Some(block),
            safe_navigation: false,
        })
    }

    pub fn block(&self, parameters: Option<&'a Parameters<'a>>, body: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Block {
            parameters,
            body: self.body(body),
        })
    }

    pub fn lambda(&self, parameters: Option<&'a Parameters<'a>>, body: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Lambda {
            parameters,
            body: self.body(body),
        })
    }

    pub fn yield_(&self, arguments: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Yield(self.list(arguments)))
    }

    // === Control flow ===

    pub fn statements(&self, statements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Statements(self.list(statements)))
    }

    pub fn program(&self, statements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Program(self.statements(statements)))
    }

    pub fn if_(
        &self,
        predicate: NodeRef<'a>,
        statements: &[NodeRef<'a>],
        subsequent: Option<NodeRef<'a>>,
    ) -> NodeRef<'a> {
        self.node(NodeKind::If {
            predicate,
            statements: self.body(statements),
            subsequent,
        })
    }

    pub fn while_(&self, predicate: NodeRef<'a>, statements: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::While {
            predicate,
            statements: self.body(statements),
            do_while: false,
        })
    }

    pub fn return_(&self, value: Option<NodeRef<'a>>) -> NodeRef<'a> {
        self.node(NodeKind::Return(value))
    }

    pub fn break_(&self, value: Option<NodeRef<'a>>) -> NodeRef<'a> {
        self.node(NodeKind::Break(value))
    }

    pub fn next(&self, value: Option<NodeRef<'a>>) -> NodeRef<'a> {
        self.node(NodeKind::Next(value))
    }

    pub fn rescue(
        &self,
        exceptions: &[NodeRef<'a>],
        reference: Option<&str>,
        statements: &[NodeRef<'a>],
    ) -> NodeRef<'a> {
        self.node(NodeKind::Rescue {
            exceptions: self.list(exceptions),
            reference: reference.map(|name| self.ltarget(name)),
            statements: self.body(statements),
            subsequent: None,
        })
    }

    pub fn begin(
        &self,
        statements: &[NodeRef<'a>],
        rescue: Option<NodeRef<'a>>,
        ensure: Option<&[NodeRef<'a>]>,
    ) -> NodeRef<'a> {
        self.node(NodeKind::Begin {
            statements: self.body(statements),
            rescue,
            else_clause: None,
            ensure: ensure.and_then(|e| self.body(e)),
        })
    }

    // === Definitions ===

    pub fn def(
        &self,
        name: &str,
        parameters: Option<&'a Parameters<'a>>,
        body: &[NodeRef<'a>],
    ) -> NodeRef<'a> {
        self.node(NodeKind::Def {
            name: self.str(name),
            receiver: None,
            parameters,
            body: self.body(body),
        })
    }

    pub fn class(&self, name: &str, superclass: Option<NodeRef<'a>>, body: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Class {
            path: self.constant(name),
            superclass,
            body: self.body(body),
        })
    }

    pub fn module(&self, name: &str, body: &[NodeRef<'a>]) -> NodeRef<'a> {
        self.node(NodeKind::Module {
            path: self.constant(name),
            body: self.body(body),
        })
    }

    /// Parameters made only of plain required names.
    pub fn required_params(&self, names: &[&str]) -> &'a Parameters<'a> {
        let requireds: Vec<NodeRef<'a>> = names.iter().map(|n| self.ltarget(n)).collect();
        self.parameters(Parameters {
            requireds: self.list(&requireds),
            ..Parameters::default()
        })
    }

    pub fn optional_param(&self, name: &str, value: NodeRef<'a>) -> OptionalParameter<'a> {
        OptionalParameter {
            name: self.str(name),
            value,
        }
    }

    pub fn keyword_param(&self, name: &str, value: Option<NodeRef<'a>>) -> KeywordParameter<'a> {
        KeywordParameter {
            name: self.str(name),
            value,
        }
    }

    pub fn optionals(&self, optionals: &[OptionalParameter<'a>]) -> &'a [OptionalParameter<'a>] {
        self.arena.alloc_slice_copy(optionals)
    }

    pub fn keywords(&self, keywords: &[KeywordParameter<'a>]) -> &'a [KeywordParameter<'a>] {
        self.arena.alloc_slice_copy(keywords)
    }

    fn body(&self, statements: &[NodeRef<'a>]) -> Option<NodeRef<'a>> {
        if statements.is_empty() {
            None
        } else {
            Some(self.statements(statements))
        }
    }
}
