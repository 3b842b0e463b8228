//! The interpreter: frames, region handlers and dispatch.

use std::rc::Rc;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, trace};

use super::builtins;
use super::error::{ExecutionError, GuestError, ResourceExceededError, Unwind};
use super::frame::{Args, Context, Env, Frame, FrameKind, Handler, MethodContext};
use super::object::{Class, CoreClasses, Method, Object, Proc};
use super::stack::Stack;
use super::value::Value;
use crate::env::ScopeId;
use crate::error::StructuralError;
use crate::instructions::{BreakPoint, Instruction, Op, Until};
use crate::manager::skip_block;
use crate::options::ExecutionOptions;
use crate::passes::Ir;

/// Where control goes from a region instruction.
#[derive(Debug, Clone, Copy)]
pub(super) enum Jump {
    Opener { middle: Option<usize>, end: usize },
    Middle { opener: usize, end: usize },
    End { opener: usize },
}

pub struct Machine<'ir> {
    pub(super) ir: &'ir Ir,
    options: ExecutionOptions,
    jumps: HashMap<usize, Jump>,
    /// Scope opened by each definition opener.
    opened: HashMap<usize, ScopeId>,
    /// Return points owned by methods and lambdas. Any other tagged return
    /// belongs to the top frame.
    owned_returns: HashSet<BreakPoint>,
    pub(super) stack: Stack<Value>,
    /// Stack height of the running frame; pops never go below it.
    pub(super) base: usize,
    depth: usize,
    iterations: usize,
    pub(super) core: CoreClasses,
    pub(super) globals: HashMap<String, Value>,
    pub(super) global_aliases: HashMap<String, String>,
    main: Value,
    pub(super) output: String,
}

impl<'ir> Machine<'ir> {
    pub fn new(ir: &'ir Ir, options: ExecutionOptions) -> Result<Self, ExecutionError> {
        let jumps = build_jumps(&ir.instructions)?;
        let opened = ir
            .scopes
            .iter()
            .filter_map(|(id, scope)| scope.opener.map(|opener| (opener, id)))
            .collect();
        let owned_returns = ir
            .instructions
            .iter()
            .filter_map(|instruction| match &instruction.op {
                Op::DefineMethod { return_point, .. } | Op::CreateLambda { return_point, .. } => {
                    *return_point
                }
                _ => None,
            })
            .collect();
        let core = CoreClasses::new();
        let main = Value::Object(Object::new(core.object.clone()));
        let capacity = (ir.max_stack_size + 64).saturating_mul(options.max_depth + 1);

        Ok(Self {
            ir,
            jumps,
            opened,
            owned_returns,
            stack: Stack::new(capacity),
            base: 0,
            depth: 0,
            iterations: 0,
            core,
            globals: HashMap::new(),
            global_aliases: HashMap::new(),
            main,
            output: String::new(),
            options,
        })
    }

    /// Run the program and return the value of its last expression.
    pub fn run(&mut self) -> Result<Value, ExecutionError> {
        let (var_count, return_point) = if self.ir.scopes.is_empty() {
            (0, None)
        } else {
            let top = self.ir.scopes.get(ScopeId(0));
            (top.var_count(), top.return_point)
        };
        let context = Rc::new(Context {
            self_value: self.main.clone(),
            block: None,
            method: None,
            cref: self.core.object.clone(),
        });
        let frame = Frame {
            kind: FrameKind::Top,
            context,
            env: Env::new(var_count, None),
            args: Args::default(),
            start: 0,
            end: self.ir.instructions.len(),
            ip: 0,
            base: self.stack.len(),
            handlers: Vec::new(),
            return_point,
            break_point: None,
            is_lambda: false,
        };
        debug!(
            instructions = self.ir.instructions.len(),
            max_depth = self.options.max_depth,
            "Executing program"
        );
        self.run_frame(frame).map_err(|unwind| self.escaped(unwind))
    }

    /// Everything `puts`, `print` and `p` wrote so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Turn a signal that left the top frame into an error.
    fn escaped(&self, unwind: Unwind) -> ExecutionError {
        match unwind {
            Unwind::Fatal(error) => error,
            Unwind::Raise(exception) => GuestError {
                class: self.core.class_of(&exception).name.clone(),
                message: exception_message(&exception),
            }
            .into(),
            other => GuestError {
                class: self.core.local_jump_error.name.clone(),
                message: format!("unexpected {}", other.kind()),
            }
            .into(),
        }
    }

    // === Frames ===

    pub(super) fn run_frame(&mut self, mut frame: Frame) -> Result<Value, Unwind> {
        if self.depth >= self.options.max_depth {
            return Err(ResourceExceededError::StackOverflow {
                depth: self.depth + 1,
                max_depth: self.options.max_depth,
            }
            .into());
        }
        self.depth += 1;
        let saved_base = self.base;
        self.base = frame.base;
        trace!(kind = ?frame.kind, start = frame.start, depth = self.depth, "Entering frame");

        let result = self.execute(&mut frame);

        self.stack.truncate(frame.base);
        self.base = saved_base;
        self.depth -= 1;
        trace!(kind = ?frame.kind, ok = result.is_ok(), "Leaving frame");
        result
    }

    fn execute(&mut self, frame: &mut Frame) -> Result<Value, Unwind> {
        loop {
            if frame.ip >= frame.end {
                let value = if self.stack.len() > frame.base {
                    self.stack.pop().unwrap_or(Value::Nil)
                } else {
                    Value::Nil
                };
                return Ok(value);
            }
            let index = frame.ip;
            frame.ip += 1;
            let Err(unwind) = self.step(frame, index) else {
                continue;
            };
            if let Err(unwind) = self.unwind_regions(frame, unwind) {
                if let Some(value) = self.absorb(frame, unwind)? {
                    return Ok(value);
                }
            }
        }
    }

    /// Offer a signal to the frame's open regions, innermost first. `Ok`
    /// means a region took it and `frame.ip` now points at its landing site.
    fn unwind_regions(&mut self, frame: &mut Frame, unwind: Unwind) -> Result<(), Unwind> {
        while let Some(handler) = frame.handlers.pop() {
            match handler {
                Handler::Loop {
                    opener,
                    body,
                    end,
                    depth,
                    break_point,
                } => match &unwind {
                    Unwind::Break { id: Some(id), value } if break_point == Some(*id) => {
                        let value = value.clone();
                        self.stack.truncate(depth);
                        self.stack.push(value);
                        frame.ip = end + 1;
                        return Ok(());
                    }
                    Unwind::Next(_) => {
                        self.stack.truncate(depth);
                        frame.ip = opener + 1;
                        frame.handlers.push(handler);
                        return Ok(());
                    }
                    Unwind::Redo => {
                        self.stack.truncate(depth);
                        frame.ip = body + 1;
                        frame.handlers.push(handler);
                        return Ok(());
                    }
                    _ => {}
                },
                Handler::Try {
                    opener,
                    catch,
                    end,
                    depth,
                    ensure,
                    retry_point,
                    pending: None,
                } => {
                    let catches = if ensure {
                        unwind.runs_ensure()
                    } else {
                        matches!(unwind, Unwind::Raise(_))
                    };
                    if catches {
                        trace!(opener, signal = unwind.kind(), "Entering handler");
                        self.stack.truncate(depth);
                        if let Unwind::Raise(exception) = &unwind {
                            self.globals.insert("$!".to_string(), exception.clone());
                        }
                        frame.ip = catch + 1;
                        frame.handlers.push(Handler::Try {
                            opener,
                            catch,
                            end,
                            depth,
                            ensure,
                            retry_point,
                            pending: Some(unwind),
                        });
                        return Ok(());
                    }
                }
                Handler::Try {
                    opener,
                    catch,
                    end,
                    depth,
                    ensure,
                    retry_point,
                    pending: Some(_),
                } => {
                    if let Unwind::Retry(id) = &unwind {
                        if retry_point == Some(*id) {
                            self.stack.truncate(depth);
                            frame.ip = opener + 1;
                            frame.handlers.push(Handler::Try {
                                opener,
                                catch,
                                end,
                                depth,
                                ensure,
                                retry_point,
                                pending: None,
                            });
                            return Ok(());
                        }
                    }
                }
            }
        }
        Err(unwind)
    }

    /// Signals that end (or restart) the frame itself. `Ok(None)` means the
    /// frame restarted and keeps running.
    fn absorb(&mut self, frame: &mut Frame, unwind: Unwind) -> Result<Option<Value>, Unwind> {
        match unwind {
            Unwind::Return { id: None, value } => Ok(Some(value)),
            Unwind::Return { id: Some(id), value } if self.returns_here(frame, id) => {
                Ok(Some(value))
            }
            Unwind::Break { id: Some(id), value }
                if frame.is_lambda && frame.break_point == Some(id) =>
            {
                Ok(Some(value))
            }
            Unwind::Next(value) if frame.kind == FrameKind::Block => Ok(Some(value)),
            Unwind::Redo if frame.kind == FrameKind::Block => {
                self.stack.truncate(frame.base);
                frame.handlers.clear();
                frame.ip = frame.start;
                Ok(None)
            }
            other => Err(other),
        }
    }

    fn returns_here(&self, frame: &Frame, id: BreakPoint) -> bool {
        frame.return_point == Some(id)
            || (frame.kind == FrameKind::Top && !self.owned_returns.contains(&id))
    }

    // === Regions ===

    pub(super) fn jump(&self, index: usize) -> Result<Jump, Unwind> {
        self.jumps.get(&index).copied().ok_or_else(|| {
            let label = self.ir.instructions[index]
                .op
                .terminates()
                .map(|(_, label)| label)
                .or_else(|| self.ir.instructions[index].op.opens());
            match label {
                Some(label) => Unwind::from(StructuralError::Unterminated {
                    label,
                    start: index,
                }),
                None => Unwind::from(StructuralError::UnknownNode("region")),
            }
        })
    }

    /// The middle terminator (if any) and `End` of the region opened at `index`.
    pub(super) fn region(&self, index: usize) -> Result<(Option<usize>, usize), Unwind> {
        match self.jump(index)? {
            Jump::Opener { middle, end } => Ok((middle, end)),
            _ => Err(StructuralError::UnknownNode("region opener").into()),
        }
    }

    pub(super) fn opened_scope(&self, index: usize) -> Result<ScopeId, Unwind> {
        self.opened
            .get(&index)
            .copied()
            .ok_or_else(|| StructuralError::Unscoped { index }.into())
    }

    pub(super) fn scope_of(&self, index: usize) -> Result<ScopeId, Unwind> {
        self.ir.instructions[index]
            .env
            .ok_or_else(|| StructuralError::Unscoped { index }.into())
    }

    pub(super) fn var_count(&self, scope: ScopeId) -> usize {
        self.ir.scopes.get(scope).var_count()
    }

    /// Count one loop iteration against the configured limit.
    pub(super) fn tick(&mut self) -> Result<(), Unwind> {
        self.iterations += 1;
        match self.options.max_iterations {
            Some(max) if self.iterations > max => {
                Err(ResourceExceededError::IterationLimit { max }.into())
            }
            _ => Ok(()),
        }
    }

    // === Operand stack ===

    pub(super) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(super) fn pop(&mut self, index: usize) -> Result<Value, Unwind> {
        if self.stack.len() <= self.base {
            return Err(ExecutionError::StackUnderflow { index }.into());
        }
        self.stack
            .pop()
            .ok_or_else(|| ExecutionError::StackUnderflow { index }.into())
    }

    pub(super) fn pop_n(&mut self, n: usize, index: usize) -> Result<Vec<Value>, Unwind> {
        if self.stack.len() < self.base + n {
            return Err(ExecutionError::StackUnderflow { index }.into());
        }
        self.stack
            .pop_n(n)
            .ok_or_else(|| ExecutionError::StackUnderflow { index }.into())
    }

    pub(super) fn peek(&self, index: usize) -> Result<Value, Unwind> {
        if self.stack.len() <= self.base {
            return Err(ExecutionError::StackUnderflow { index }.into());
        }
        self.stack
            .peek()
            .cloned()
            .ok_or_else(|| ExecutionError::StackUnderflow { index }.into())
    }

    // === Dispatch ===

    /// Call `name` on `receiver`: user methods first, then builtins.
    pub(super) fn send(
        &mut self,
        receiver: Value,
        name: &str,
        args: Args,
        block: Option<Rc<Proc>>,
    ) -> Result<Value, Unwind> {
        let class = self.core.dispatch_class(&receiver);
        if let Some((method, owner)) = class.find_method(name) {
            return self.call_method(receiver, name, method, owner, args, block);
        }
        if self.undefined_above(&class, name) {
            return Err(self.no_method_error(&receiver, name));
        }
        match builtins::call(self, &receiver, name, args, block)? {
            Some(value) => Ok(value),
            None => Err(self.no_method_error(&receiver, name)),
        }
    }

    /// Send with no arguments.
    pub(super) fn send0(&mut self, receiver: Value, name: &str) -> Result<Value, Unwind> {
        self.send(receiver, name, Args::default(), None)
    }

    /// `undef_method` somewhere in the ancestors hides builtins too.
    fn undefined_above(&self, class: &Rc<Class>, name: &str) -> bool {
        class
            .ancestors()
            .iter()
            .any(|ancestor| matches!(ancestor.methods.borrow().get(name), Some(Method::Undefined)))
    }

    pub(super) fn call_method(
        &mut self,
        receiver: Value,
        name: &str,
        method: Method,
        owner: Rc<Class>,
        args: Args,
        block: Option<Rc<Proc>>,
    ) -> Result<Value, Unwind> {
        match method {
            Method::Compiled(method) => {
                let (_, end) = self.region(method.opener)?;
                let context = Rc::new(Context {
                    self_value: receiver,
                    block,
                    method: Some(MethodContext {
                        method: method.clone(),
                        owner,
                        args: args.clone(),
                    }),
                    cref: method.cref.clone(),
                });
                let frame = Frame {
                    kind: FrameKind::Method,
                    context,
                    env: Env::new(self.var_count(method.scope), None),
                    args,
                    start: method.opener + 1,
                    end,
                    ip: method.opener + 1,
                    base: self.stack.len(),
                    handlers: Vec::new(),
                    return_point: method.return_point,
                    break_point: None,
                    is_lambda: false,
                };
                self.run_frame(frame)
            }
            Method::AttrReader(ivar) => {
                if !args.is_empty() {
                    return Err(self.argument_count_error(args.len(), "0"));
                }
                Ok(builtins::ivar_get(&receiver, &ivar))
            }
            Method::AttrWriter(ivar) => {
                let mut values = args.positional(false);
                if values.len() != 1 {
                    return Err(self.argument_count_error(values.len(), "1"));
                }
                let value = values.remove(0);
                builtins::ivar_set(self, &receiver, &ivar, value.clone())?;
                Ok(value)
            }
            Method::Block(body) => {
                let (_, end) = self.region(body.opener)?;
                let context = Rc::new(Context {
                    self_value: receiver,
                    block,
                    method: None,
                    cref: body.context.cref.clone(),
                });
                let frame = Frame {
                    kind: FrameKind::Block,
                    context,
                    env: Env::new(self.var_count(body.scope), Some(body.env.clone())),
                    args,
                    start: body.opener + 1,
                    end,
                    ip: body.opener + 1,
                    base: self.stack.len(),
                    handlers: Vec::new(),
                    return_point: body.return_point,
                    break_point: body.break_point,
                    is_lambda: true,
                };
                self.run_frame(frame)
            }
            Method::Undefined => Err(self.no_method_error(&receiver, name)),
        }
    }

    /// Run a block or lambda body with `args`.
    pub(super) fn call_block(&mut self, proc: &Rc<Proc>, args: Args) -> Result<Value, Unwind> {
        let (_, end) = self.region(proc.opener)?;
        let frame = Frame {
            kind: FrameKind::Block,
            context: proc.context.clone(),
            env: Env::new(self.var_count(proc.scope), Some(proc.env.clone())),
            args,
            start: proc.opener + 1,
            end,
            ip: proc.opener + 1,
            base: self.stack.len(),
            handlers: Vec::new(),
            return_point: if proc.is_lambda { proc.return_point } else { None },
            break_point: if proc.is_lambda { proc.break_point } else { None },
            is_lambda: proc.is_lambda,
        };
        self.run_frame(frame)
    }

    pub(super) fn yield_values(&mut self, proc: &Rc<Proc>, values: Vec<Value>) -> Result<Value, Unwind> {
        self.call_block(proc, Args::new(values))
    }

    /// Run a class, module or singleton body with `class` as `self`.
    pub(super) fn run_body(&mut self, index: usize, class: Rc<Class>, self_value: Value) -> Result<Value, Unwind> {
        let (_, end) = self.region(index)?;
        let scope = self.opened_scope(index)?;
        let context = Rc::new(Context {
            self_value,
            block: None,
            method: None,
            cref: class,
        });
        let frame = Frame {
            kind: FrameKind::Body,
            context,
            env: Env::new(self.var_count(scope), None),
            args: Args::default(),
            start: index + 1,
            end,
            ip: index + 1,
            base: self.stack.len(),
            handlers: Vec::new(),
            return_point: None,
            break_point: None,
            is_lambda: false,
        };
        self.run_frame(frame)
    }

    pub(super) fn responds_to(&self, receiver: &Value, name: &str) -> bool {
        let class = self.core.dispatch_class(receiver);
        class.find_method(name).is_some()
            || (!self.undefined_above(&class, name) && builtins::has_builtin(self, receiver, name))
    }

    // === Exceptions ===

    pub(super) fn new_exception(&self, class: &Rc<Class>, message: impl Into<String>) -> Value {
        let object = Object::new(class.clone());
        object
            .ivars
            .borrow_mut()
            .insert("@message".to_string(), Value::string(message));
        Value::Object(object)
    }

    pub(super) fn raise(&self, class: &Rc<Class>, message: impl Into<String>) -> Unwind {
        Unwind::Raise(self.new_exception(class, message))
    }

    pub(super) fn argument_count_error(&self, given: usize, expected: &str) -> Unwind {
        self.raise(
            &self.core.argument_error,
            format!("wrong number of arguments (given {}, expected {})", given, expected),
        )
    }

    pub(super) fn type_error(&self, message: impl Into<String>) -> Unwind {
        self.raise(&self.core.type_error, message)
    }

    pub(super) fn no_method_error(&self, receiver: &Value, name: &str) -> Unwind {
        let description = match receiver {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Class(class) => format!("class {}", class.name),
            other => format!("an instance of {}", self.core.class_of(other).name),
        };
        self.raise(
            &self.core.no_method_error,
            format!("undefined method '{}' for {}", name, description),
        )
    }
}

/// The message of an exception object without running guest code.
pub(super) fn exception_message(exception: &Value) -> String {
    match exception {
        Value::Object(object) => match object.ivars.borrow().get("@message") {
            Some(Value::Str(message)) => message.value.borrow().clone(),
            Some(Value::Nil) | None => object.class.name.clone(),
            Some(other) => format!("{:?}", other),
        },
        other => format!("{:?}", other),
    }
}

/// Precompute the targets of every region instruction.
fn build_jumps(instructions: &[Instruction]) -> Result<HashMap<usize, Jump>, StructuralError> {
    let mut jumps = HashMap::new();
    for (index, instruction) in instructions.iter().enumerate() {
        let Some(label) = instruction.op.opens() else {
            continue;
        };
        let first = skip_block(
            instructions,
            index + 1,
            &[Until::Else, Until::WhileBody, Until::Catch, Until::End],
            label,
        )?;
        let (middle, end) = match instructions[first].op {
            Op::End(_) => (None, first),
            _ => (
                Some(first),
                skip_block(instructions, first + 1, &[Until::End], label)?,
            ),
        };
        jumps.insert(index, Jump::Opener { middle, end });
        if let Some(middle) = middle {
            jumps.insert(middle, Jump::Middle { opener: index, end });
        }
        jumps.insert(end, Jump::End { opener: index });
    }
    Ok(jumps)
}
