//! Call frames and their environments.

use core::cell::RefCell;
use std::rc::Rc;

use smallvec::SmallVec;

use super::error::Unwind;
use super::object::{Class, CompiledMethod, Proc};
use super::value::{HashObject, Value};
use crate::instructions::BreakPoint;

/// Variable slots of one owner scope activation.
///
/// Block activations link to the environment they were created in; a
/// variable resolved `depth` block boundaries out lives `depth` links up.
#[derive(Debug)]
pub struct Env {
    slots: RefCell<Vec<Value>>,
    outer: Option<Rc<Env>>,
}

impl Env {
    pub fn new(size: usize, outer: Option<Rc<Env>>) -> Rc<Env> {
        Rc::new(Env {
            slots: RefCell::new(vec![Value::Nil; size]),
            outer,
        })
    }

    fn at_depth(&self, depth: u32) -> Option<&Env> {
        let mut env = self;
        for _ in 0..depth {
            env = env.outer.as_deref()?;
        }
        Some(env)
    }

    pub fn get(&self, depth: u32, index: u32) -> Option<Value> {
        let env = self.at_depth(depth)?;
        let slots = env.slots.borrow();
        Some(slots.get(index as usize).cloned().unwrap_or(Value::Nil))
    }

    /// Returns `false` when the chain is shorter than `depth`.
    pub fn set(&self, depth: u32, index: u32, value: Value) -> bool {
        let Some(env) = self.at_depth(depth) else {
            return false;
        };
        let mut slots = env.slots.borrow_mut();
        let index = index as usize;
        if index >= slots.len() {
            slots.resize(index + 1, Value::Nil);
        }
        slots[index] = value;
        true
    }
}

/// Arguments passed to a frame.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub values: SmallVec<[Value; 4]>,
    /// The trailing keyword hash, split off by the caller.
    pub keywords: Option<Value>,
}

impl Args {
    pub fn new(values: impl IntoIterator<Item = Value>) -> Self {
        Args {
            values: values.into_iter().collect(),
            keywords: None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Positional view: the keyword hash counts as a last argument for
    /// frames that take no keywords.
    pub fn positional(&self, with_keywords: bool) -> Vec<Value> {
        let mut values: Vec<Value> = self.values.iter().cloned().collect();
        if !with_keywords {
            if let Some(keywords) = &self.keywords {
                values.push(keywords.clone());
            }
        }
        values
    }

    /// A copy of the keyword hash, or an empty one.
    pub fn keyword_hash(&self) -> Value {
        match &self.keywords {
            Some(Value::Hash(hash)) => {
                let copy: HashObject = hash.borrow().iter().cloned().collect();
                Value::hash(copy)
            }
            _ => Value::hash(HashObject::new()),
        }
    }
}

/// What a block inherits from the method (or body) frame that created it.
#[derive(Debug)]
pub struct Context {
    pub self_value: Value,
    pub block: Option<Rc<Proc>>,
    /// Method being executed, for `super`.
    pub method: Option<MethodContext>,
    /// Lexical class for constant lookup and `def`.
    pub cref: Rc<Class>,
}

#[derive(Clone)]
pub struct MethodContext {
    pub method: Rc<CompiledMethod>,
    /// Class the method was found in.
    pub owner: Rc<Class>,
    /// The arguments the method was called with, for argument-less `super`.
    pub args: Args,
}

impl core::fmt::Debug for MethodContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MethodContext")
            .field("name", &self.method.name)
            .field("owner", &self.owner.name)
            .finish()
    }
}

impl core::fmt::Debug for Proc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Proc")
            .field("opener", &self.opener)
            .field("is_lambda", &self.is_lambda)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Top,
    Method,
    Block,
    /// Class, module and singleton class bodies.
    Body,
}

/// A region of the current frame that absorbs unwind signals.
#[derive(Debug)]
pub enum Handler {
    Loop {
        /// Index of the `While` opener.
        opener: usize,
        /// Index of the `WhileBody` separator.
        body: usize,
        /// Index of the closing `End`.
        end: usize,
        /// Stack height at entry.
        depth: usize,
        break_point: Option<BreakPoint>,
    },
    Try {
        opener: usize,
        /// Index of the `Catch` separator.
        catch: usize,
        end: usize,
        depth: usize,
        ensure: bool,
        retry_point: Option<BreakPoint>,
        /// Set while the handler part runs: what it is handling.
        pending: Option<Unwind>,
    },
}

/// One activation: a method, block, class body or the program itself.
pub struct Frame {
    pub kind: FrameKind,
    pub context: Rc<Context>,
    pub env: Rc<Env>,
    pub args: Args,
    /// First instruction of the body.
    pub start: usize,
    /// Index one past the body (the closing `End`, or the program length).
    pub end: usize,
    pub ip: usize,
    /// Operand stack height at entry.
    pub base: usize,
    pub handlers: Vec<Handler>,
    /// Tagged returns with this id end this frame.
    pub return_point: Option<BreakPoint>,
    /// Set for lambdas: breaks with this id end the frame.
    pub break_point: Option<BreakPoint>,
    pub is_lambda: bool,
}

impl Frame {
    /// The exception the innermost running handler part is handling.
    pub fn current_exception(&self) -> Option<Value> {
        self.handlers.iter().rev().find_map(|handler| match handler {
            Handler::Try {
                pending: Some(Unwind::Raise(exception)),
                ..
            } => Some(exception.clone()),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_env_depth_walk() {
        let outer = Env::new(2, None);
        let inner = Env::new(1, Some(outer.clone()));
        assert!(inner.set(1, 1, Value::Int(7)));
        assert_eq!(outer.get(0, 1), Some(Value::Int(7)));
        assert_eq!(inner.get(1, 1), Some(Value::Int(7)));
        assert_eq!(inner.get(0, 0), Some(Value::Nil));
        assert_eq!(inner.get(2, 0), None);
        assert!(!inner.set(2, 0, Value::Nil));
    }

    #[test]
    fn test_keywords_join_positionals_when_not_taken() {
        let mut args = Args::new([Value::Int(1)]);
        args.keywords = Some(Value::hash(HashObject::new()));
        assert_eq!(args.positional(true).len(), 1);
        assert_eq!(args.positional(false).len(), 2);
    }
}
