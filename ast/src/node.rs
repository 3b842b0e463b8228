pub type NodeRef<'a> = &'a Node<'a>;

/// A syntax node: what it is plus the source line it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node<'a> {
    pub kind: NodeKind<'a>,
    pub line: u32,
}

impl<'a> Node<'a> {
    pub fn new(kind: NodeKind<'a>, line: u32) -> Self {
        Self { kind, line }
    }
}

/// Every construct of the source language the lowering pass understands.
///
/// Names follow the surface syntax. Nodes that only make sense in a specific
/// position (`When`, `In`, `Assoc`, targets, patterns, ...) are ordinary
/// variants; the lowering pass rejects them anywhere else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind<'a> {
    // === Program structure ===
    Program(NodeRef<'a>),
    Statements(&'a [NodeRef<'a>]),
    Parentheses(Option<NodeRef<'a>>),

    // === Literals ===
    Nil,
    True,
    False,
    SelfNode,
    Integer(i64),
    Float(f64),
    String(&'a str),
    InterpolatedString(&'a [NodeRef<'a>]),
    Symbol(&'a str),
    Regexp {
        source: &'a str,
        options: u32,
    },
    Array(&'a [NodeRef<'a>]),
    /// `{ k => v, **other }`; elements are `Assoc` and `AssocSplat` nodes.
    Hash(&'a [NodeRef<'a>]),
    /// Brace-less hash in argument position, `f(a: 1)`.
    KeywordHash(&'a [NodeRef<'a>]),
    Assoc {
        key: NodeRef<'a>,
        value: NodeRef<'a>,
    },
    AssocSplat(NodeRef<'a>),
    Range {
        left: Option<NodeRef<'a>>,
        right: Option<NodeRef<'a>>,
        exclude_end: bool,
    },
    /// `*expr` in an array literal or argument list.
    Splat(NodeRef<'a>),
    /// `&expr` in an argument list; `None` forwards the anonymous block.
    BlockArgument(Option<NodeRef<'a>>),

    // === Variables and constants ===
    LocalVariableRead(&'a str),
    LocalVariableWrite {
        name: &'a str,
        value: NodeRef<'a>,
    },
    InstanceVariableRead(&'a str),
    InstanceVariableWrite {
        name: &'a str,
        value: NodeRef<'a>,
    },
    GlobalVariableRead(&'a str),
    GlobalVariableWrite {
        name: &'a str,
        value: NodeRef<'a>,
    },
    ClassVariableRead(&'a str),
    ClassVariableWrite {
        name: &'a str,
        value: NodeRef<'a>,
    },
    ConstantRead(&'a str),
    /// `Parent::Name`; a `None` parent is the top-level `::Name`.
    ConstantPath {
        parent: Option<NodeRef<'a>>,
        name: &'a str,
    },
    /// `target` is a `ConstantRead` or `ConstantPath`.
    ConstantWrite {
        target: NodeRef<'a>,
        value: NodeRef<'a>,
    },

    // === Assignment targets ===
    LocalVariableTarget(&'a str),
    InstanceVariableTarget(&'a str),
    GlobalVariableTarget(&'a str),
    ClassVariableTarget(&'a str),
    ConstantTarget(&'a str),
    IndexTarget {
        receiver: NodeRef<'a>,
        arguments: &'a [NodeRef<'a>],
    },
    /// `recv.name = ...`; `name` excludes the trailing `=`.
    CallTarget {
        receiver: NodeRef<'a>,
        name: &'a str,
    },
    /// A parenthesised destructuring target. `rest` is a `Splat` wrapping a
    /// target, or `SplatAnonymous`.
    MultiTarget {
        lefts: &'a [NodeRef<'a>],
        rest: Option<NodeRef<'a>>,
        rights: &'a [NodeRef<'a>],
    },
    /// A bare `*` in a destructuring list.
    SplatAnonymous,
    MultiWrite {
        lefts: &'a [NodeRef<'a>],
        rest: Option<NodeRef<'a>>,
        rights: &'a [NodeRef<'a>],
        value: NodeRef<'a>,
    },
    OperatorWrite {
        target: NodeRef<'a>,
        operator: &'a str,
        value: NodeRef<'a>,
    },
    OrWrite {
        target: NodeRef<'a>,
        value: NodeRef<'a>,
    },
    AndWrite {
        target: NodeRef<'a>,
        value: NodeRef<'a>,
    },

    // === Calls ===
    Call {
        receiver: Option<NodeRef<'a>>,
        name: &'a str,
        arguments: &'a [NodeRef<'a>],
        block: Option<NodeRef<'a>>,
        safe_navigation: bool,
    },
    /// A `{ |params| body }` / `do ... end` literal attached to a call.
    Block {
        parameters: Option<&'a Parameters<'a>>,
        body: Option<NodeRef<'a>>,
    },
    /// `->(params) { body }`.
    Lambda {
        parameters: Option<&'a Parameters<'a>>,
        body: Option<NodeRef<'a>>,
    },
    Yield(&'a [NodeRef<'a>]),
    Super {
        arguments: &'a [NodeRef<'a>],
        block: Option<NodeRef<'a>>,
    },
    /// Argument-less `super`, forwarding the current arguments.
    ForwardingSuper {
        block: Option<NodeRef<'a>>,
    },

    // === Operators ===
    And {
        left: NodeRef<'a>,
        right: NodeRef<'a>,
    },
    Or {
        left: NodeRef<'a>,
        right: NodeRef<'a>,
    },
    Not(NodeRef<'a>),
    Defined(NodeRef<'a>),

    // === Control flow ===
    If {
        predicate: NodeRef<'a>,
        statements: Option<NodeRef<'a>>,
        subsequent: Option<NodeRef<'a>>,
    },
    Unless {
        predicate: NodeRef<'a>,
        statements: Option<NodeRef<'a>>,
        else_clause: Option<NodeRef<'a>>,
    },
    While {
        predicate: NodeRef<'a>,
        statements: Option<NodeRef<'a>>,
        do_while: bool,
    },
    Until {
        predicate: NodeRef<'a>,
        statements: Option<NodeRef<'a>>,
        do_while: bool,
    },
    Case {
        predicate: Option<NodeRef<'a>>,
        conditions: &'a [NodeRef<'a>],
        else_clause: Option<NodeRef<'a>>,
    },
    When {
        conditions: &'a [NodeRef<'a>],
        statements: Option<NodeRef<'a>>,
    },
    CaseMatch {
        predicate: NodeRef<'a>,
        conditions: &'a [NodeRef<'a>],
        else_clause: Option<NodeRef<'a>>,
    },
    In {
        pattern: NodeRef<'a>,
        statements: Option<NodeRef<'a>>,
    },
    Begin {
        statements: Option<NodeRef<'a>>,
        rescue: Option<NodeRef<'a>>,
        else_clause: Option<NodeRef<'a>>,
        ensure: Option<NodeRef<'a>>,
    },
    /// One `rescue` clause; `subsequent` chains the next clause.
    Rescue {
        exceptions: &'a [NodeRef<'a>],
        reference: Option<NodeRef<'a>>,
        statements: Option<NodeRef<'a>>,
        subsequent: Option<NodeRef<'a>>,
    },
    Return(Option<NodeRef<'a>>),
    Break(Option<NodeRef<'a>>),
    Next(Option<NodeRef<'a>>),
    Redo,
    Retry,

    // === Patterns (`case ... in`) ===
    ArrayPattern {
        constant: Option<NodeRef<'a>>,
        requireds: &'a [NodeRef<'a>],
        rest: Option<NodeRef<'a>>,
        posts: &'a [NodeRef<'a>],
    },
    HashPattern {
        constant: Option<NodeRef<'a>>,
        elements: &'a [NodeRef<'a>],
        rest: Option<NodeRef<'a>>,
    },
    /// `key:` or `key: pattern` inside a hash pattern.
    PatternPair {
        key: &'a str,
        value: Option<NodeRef<'a>>,
    },
    /// `**nil` inside a hash pattern.
    NoKeywordsPattern,
    AlternationPattern {
        left: NodeRef<'a>,
        right: NodeRef<'a>,
    },
    CapturePattern {
        value: NodeRef<'a>,
        target: &'a str,
    },
    PinnedVariable(&'a str),
    PinnedExpression(NodeRef<'a>),

    // === Definitions ===
    Def {
        name: &'a str,
        receiver: Option<NodeRef<'a>>,
        parameters: Option<&'a Parameters<'a>>,
        body: Option<NodeRef<'a>>,
    },
    Class {
        path: NodeRef<'a>,
        superclass: Option<NodeRef<'a>>,
        body: Option<NodeRef<'a>>,
    },
    Module {
        path: NodeRef<'a>,
        body: Option<NodeRef<'a>>,
    },
    SingletonClass {
        expression: NodeRef<'a>,
        body: Option<NodeRef<'a>>,
    },
    Alias {
        new_name: &'a str,
        old_name: &'a str,
    },
    GlobalAlias {
        new_name: &'a str,
        old_name: &'a str,
    },
    Undef(&'a [&'a str]),
}

impl NodeKind<'_> {
    /// Short node name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Program(_) => "program",
            NodeKind::Statements(_) => "statements",
            NodeKind::Parentheses(_) => "parentheses",
            NodeKind::Nil => "nil",
            NodeKind::True => "true",
            NodeKind::False => "false",
            NodeKind::SelfNode => "self",
            NodeKind::Integer(_) => "integer",
            NodeKind::Float(_) => "float",
            NodeKind::String(_) => "string",
            NodeKind::InterpolatedString(_) => "interpolated string",
            NodeKind::Symbol(_) => "symbol",
            NodeKind::Regexp { .. } => "regexp",
            NodeKind::Array(_) => "array",
            NodeKind::Hash(_) => "hash",
            NodeKind::KeywordHash(_) => "keyword hash",
            NodeKind::Assoc { .. } => "assoc",
            NodeKind::AssocSplat(_) => "assoc splat",
            NodeKind::Range { .. } => "range",
            NodeKind::Splat(_) => "splat",
            NodeKind::BlockArgument(_) => "block argument",
            NodeKind::LocalVariableRead(_) => "local variable read",
            NodeKind::LocalVariableWrite { .. } => "local variable write",
            NodeKind::InstanceVariableRead(_) => "instance variable read",
            NodeKind::InstanceVariableWrite { .. } => "instance variable write",
            NodeKind::GlobalVariableRead(_) => "global variable read",
            NodeKind::GlobalVariableWrite { .. } => "global variable write",
            NodeKind::ClassVariableRead(_) => "class variable read",
            NodeKind::ClassVariableWrite { .. } => "class variable write",
            NodeKind::ConstantRead(_) => "constant read",
            NodeKind::ConstantPath { .. } => "constant path",
            NodeKind::ConstantWrite { .. } => "constant write",
            NodeKind::LocalVariableTarget(_) => "local variable target",
            NodeKind::InstanceVariableTarget(_) => "instance variable target",
            NodeKind::GlobalVariableTarget(_) => "global variable target",
            NodeKind::ClassVariableTarget(_) => "class variable target",
            NodeKind::ConstantTarget(_) => "constant target",
            NodeKind::IndexTarget { .. } => "index target",
            NodeKind::CallTarget { .. } => "call target",
            NodeKind::MultiTarget { .. } => "multi target",
            NodeKind::SplatAnonymous => "anonymous splat",
            NodeKind::MultiWrite { .. } => "multiple assignment",
            NodeKind::OperatorWrite { .. } => "operator assignment",
            NodeKind::OrWrite { .. } => "or assignment",
            NodeKind::AndWrite { .. } => "and assignment",
            NodeKind::Call { .. } => "call",
            NodeKind::Block { .. } => "block",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Yield(_) => "yield",
            NodeKind::Super { .. } => "super",
            NodeKind::ForwardingSuper { .. } => "zsuper",
            NodeKind::And { .. } => "and",
            NodeKind::Or { .. } => "or",
            NodeKind::Not(_) => "not",
            NodeKind::Defined(_) => "defined?",
            NodeKind::If { .. } => "if",
            NodeKind::Unless { .. } => "unless",
            NodeKind::While { .. } => "while",
            NodeKind::Until { .. } => "until",
            NodeKind::Case { .. } => "case",
            NodeKind::When { .. } => "when",
            NodeKind::CaseMatch { .. } => "case/in",
            NodeKind::In { .. } => "in",
            NodeKind::Begin { .. } => "begin",
            NodeKind::Rescue { .. } => "rescue",
            NodeKind::Return(_) => "return",
            NodeKind::Break(_) => "break",
            NodeKind::Next(_) => "next",
            NodeKind::Redo => "redo",
            NodeKind::Retry => "retry",
            NodeKind::ArrayPattern { .. } => "array pattern",
            NodeKind::HashPattern { .. } => "hash pattern",
            NodeKind::PatternPair { .. } => "pattern pair",
            NodeKind::NoKeywordsPattern => "**nil pattern",
            NodeKind::AlternationPattern { .. } => "alternation pattern",
            NodeKind::CapturePattern { .. } => "capture pattern",
            NodeKind::PinnedVariable(_) => "pinned variable",
            NodeKind::PinnedExpression(_) => "pinned expression",
            NodeKind::Def { .. } => "def",
            NodeKind::Class { .. } => "class",
            NodeKind::Module { .. } => "module",
            NodeKind::SingletonClass { .. } => "singleton class",
            NodeKind::Alias { .. } => "alias",
            NodeKind::GlobalAlias { .. } => "global alias",
            NodeKind::Undef(_) => "undef",
        }
    }
}

/// Parameter list of a method, block or lambda, in declaration order
/// groups: `requireds`, `optionals`, `rest`, `posts`, keywords, `**kwrest`,
/// `&block`.
///
/// Positional entries in `requireds` / `posts` are `LocalVariableTarget`
/// nodes, or `MultiTarget` nodes for destructured parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Parameters<'a> {
    pub requireds: &'a [NodeRef<'a>],
    pub optionals: &'a [OptionalParameter<'a>],
    /// `Some(None)` is an anonymous `*`.
    pub rest: Option<Option<&'a str>>,
    pub posts: &'a [NodeRef<'a>],
    pub keywords: &'a [KeywordParameter<'a>],
    /// `Some(None)` is an anonymous `**`.
    pub keyword_rest: Option<Option<&'a str>>,
    pub block: Option<&'a str>,
}

impl Parameters<'_> {
    pub fn is_empty(&self) -> bool {
        self.requireds.is_empty()
            && self.optionals.is_empty()
            && self.rest.is_none()
            && self.posts.is_empty()
            && self.keywords.is_empty()
            && self.keyword_rest.is_none()
            && self.block.is_none()
    }

    /// Count of positional parameters, rest excluded.
    pub fn positional_count(&self) -> usize {
        self.requireds.len() + self.optionals.len() + self.posts.len()
    }

    /// Arity in the usual convention: the required count, or `-(required + 1)`
    /// when optional, rest or optional keyword arguments make it variable.
    pub fn arity(&self) -> i32 {
        let required = (self.requireds.len() + self.posts.len()) as i32;
        let required_keywords = self.keywords.iter().any(|k| k.value.is_none());
        let required = if required_keywords { required + 1 } else { required };
        let variable = !self.optionals.is_empty()
            || self.rest.is_some()
            || (!required_keywords
                && (self.keywords.iter().any(|k| k.value.is_some())
                    || matches!(self.keyword_rest, Some(Some(_)))));
        if variable { -(required + 1) } else { required }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionalParameter<'a> {
    pub name: &'a str,
    pub value: NodeRef<'a>,
}

/// `name:` (required) or `name: value` (optional).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordParameter<'a> {
    pub name: &'a str,
    pub value: Option<NodeRef<'a>>,
}
