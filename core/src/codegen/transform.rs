use core::mem;

use hashbrown::HashSet;

use super::EmitError;
use crate::env::{ScopeId, ScopeKind};
use crate::error::StructuralError;
use crate::instructions::{BreakPoint, Label, Until};
use crate::manager::skip_block;
use crate::passes::Ir;

const INDENT: &str = "    ";

/// One abstract stack slot.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum Operand {
    /// A side-effect free C++ expression: a literal or a temporary.
    Value(String),
    /// Pushed by `PushArgc`, consumed by the next call.
    Argc(u32),
}

/// A `while` being emitted in the current function.
#[derive(Debug, Clone)]
pub(super) struct LoopLabels {
    pub break_point: Option<BreakPoint>,
    /// Temporary holding the loop result.
    pub result: String,
    /// Suffix of the loop's `next_`/`redo_` labels.
    pub id: usize,
}

/// What a new function is emitted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FunctionKind {
    Top,
    Method,
    Block,
    /// Class, module and singleton class bodies.
    Body,
}

/// Emission state of the function being written.
#[derive(Default)]
pub(super) struct Function {
    pub out: Vec<String>,
    pub stack: Vec<Operand>,
    /// Lowest stack depth reached since the current region part started.
    pub low_water: usize,
    pub indent: usize,
    /// Plain (uncaptured) locals already declared.
    pub declared: HashSet<String>,
    pub loops: Vec<LoopLabels>,
    pub kind: Option<FunctionKind>,
}

/// The lines and final stack of one part of a region.
pub(super) struct Branch {
    pub lines: Vec<String>,
    pub stack: Vec<Operand>,
    pub low_water: usize,
}

/// Emission context.
///
/// Walks an instruction range with a cursor, running the operand stack
/// abstractly. Regions are handled by the operation that opens them: it
/// fetches each part with [`Transform::fetch_block`] and emits it with
/// [`Transform::with_same_scope`] (same C++ function) or
/// [`Transform::with_new_scope`] (a new function).
pub struct Transform<'ir> {
    pub(super) ir: &'ir Ir,
    ip: usize,
    end: usize,
    /// Index of the instruction being transformed.
    pub(super) current: usize,
    pub(super) function: Function,
    functions: Vec<String>,
    counter: usize,
}

impl<'ir> Transform<'ir> {
    pub fn new(ir: &'ir Ir) -> Self {
        Self {
            ir,
            ip: 0,
            end: 0,
            current: 0,
            function: Function::default(),
            functions: Vec::new(),
            counter: 0,
        }
    }

    /// Emit the whole program as a translation unit.
    pub fn emit_program(mut self, file_name: &str) -> Result<String, EmitError> {
        let top = ScopeId(0);
        let return_point = match self.ir.scopes.is_empty() {
            true => None,
            false => self.ir.scopes.get(top).return_point,
        };
        self.with_new_scope(
            FunctionKind::Top,
            "garnet_main",
            0,
            self.ir.instructions.len(),
            top,
            return_point,
        )?;

        let mut source = String::new();
        source.push_str(&format!("// {}: generated by garnet\n", file_name));
        source.push_str("#include \"garnet/runtime.hpp\"\n\nusing namespace garnet;\n");
        for function in &self.functions {
            source.push('\n');
            source.push_str(function);
        }
        Ok(source)
    }

    // === Stack ===

    pub(super) fn push(&mut self, expr: impl Into<String>) {
        self.function.stack.push(Operand::Value(expr.into()));
    }

    pub(super) fn push_argc(&mut self, argc: u32) {
        self.function.stack.push(Operand::Argc(argc));
    }

    fn pop_operand(&mut self) -> Result<Operand, EmitError> {
        let operand = self.function.stack.pop().ok_or(EmitError::StackUnderflow {
            index: self.current,
        })?;
        let depth = self.function.stack.len();
        if depth < self.function.low_water {
            self.function.low_water = depth;
        }
        Ok(operand)
    }

    pub(super) fn pop(&mut self) -> Result<String, EmitError> {
        match self.pop_operand()? {
            Operand::Value(expr) => Ok(expr),
            Operand::Argc(_) => Err(EmitError::ExpectedValue {
                index: self.current,
            }),
        }
    }

    pub(super) fn pop_argc(&mut self) -> Result<u32, EmitError> {
        match self.pop_operand()? {
            Operand::Argc(argc) => Ok(argc),
            Operand::Value(_) => Err(EmitError::ExpectedArgc {
                index: self.current,
            }),
        }
    }

    /// Pop `n` values, returned bottom first.
    pub(super) fn pop_n(&mut self, n: usize) -> Result<Vec<String>, EmitError> {
        let mut values = Vec::with_capacity(n);
        for _ in 0..n {
            values.push(self.pop()?);
        }
        values.reverse();
        Ok(values)
    }

    /// The value `depth` slots below the top (0 is the top).
    pub(super) fn peek_at(&self, depth: usize) -> Result<String, EmitError> {
        let len = self.function.stack.len();
        let underflow = EmitError::StackUnderflow {
            index: self.current,
        };
        match len.checked_sub(depth + 1).map(|i| &self.function.stack[i]) {
            Some(Operand::Value(expr)) => Ok(expr.clone()),
            Some(Operand::Argc(_)) => Err(EmitError::ExpectedValue {
                index: self.current,
            }),
            None => Err(underflow),
        }
    }

    pub(super) fn peek(&self) -> Result<String, EmitError> {
        self.peek_at(0)
    }

    // === Output ===

    /// Append one statement to the current function.
    pub(super) fn exec(&mut self, statement: impl AsRef<str>) {
        let line = format!("{}{}", INDENT.repeat(self.function.indent), statement.as_ref());
        self.function.out.push(line);
    }

    /// Evaluate `expr` once into a fresh temporary and push the temporary.
    pub(super) fn exec_push(&mut self, prefix: &str, expr: impl AsRef<str>) {
        let temp = self.temp(prefix);
        self.exec(format!("Value {} = {};", temp, expr.as_ref()));
        self.push(temp);
    }

    pub(super) fn temp(&mut self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id())
    }

    pub(super) fn next_id(&mut self) -> usize {
        self.counter += 1;
        self.counter
    }

    // === Regions ===

    /// Range of the region part starting at the cursor, up to its terminator
    /// of `label` in `until`. The cursor moves past the terminator.
    pub(super) fn fetch_block(
        &mut self,
        until: &[Until],
        label: Label,
    ) -> Result<(usize, usize), EmitError> {
        let end = skip_block(&self.ir.instructions, self.ip, until, label)?;
        let start = self.ip;
        self.ip = end + 1;
        Ok((start, end))
    }

    /// Emit `start..end` inside the current function, one level deeper,
    /// starting from a copy of the current stack.
    pub(super) fn with_same_scope(&mut self, start: usize, end: usize) -> Result<Branch, EmitError> {
        let entry = self.function.stack.clone();
        let saved_out = mem::take(&mut self.function.out);
        let saved_low = mem::replace(&mut self.function.low_water, entry.len());
        let saved_range = (self.ip, self.end, self.current);
        self.function.indent += 1;
        self.ip = start;
        self.end = end;

        let result = self.run();

        self.function.indent -= 1;
        (self.ip, self.end, self.current) = saved_range;
        let branch = Branch {
            lines: mem::replace(&mut self.function.out, saved_out),
            stack: mem::replace(&mut self.function.stack, entry),
            low_water: mem::replace(&mut self.function.low_water, saved_low),
        };
        result?;
        Ok(branch)
    }

    /// Emit `start..end` as a new function named after `prefix`; returns the
    /// function's name.
    pub(super) fn with_new_scope(
        &mut self,
        kind: FunctionKind,
        prefix: &str,
        start: usize,
        end: usize,
        scope: ScopeId,
        return_point: Option<BreakPoint>,
    ) -> Result<String, EmitError> {
        let name = match kind {
            FunctionKind::Top => prefix.to_string(),
            _ => self.temp(prefix),
        };
        let fresh = Function {
            indent: if return_point.is_some() { 2 } else { 1 },
            kind: Some(kind),
            ..Function::default()
        };
        let saved = mem::replace(&mut self.function, fresh);
        let saved_range = (self.ip, self.end, self.current);
        self.ip = start;
        self.end = end;

        let result = self.run().and_then(|()| {
            if self.function.stack.is_empty() {
                Ok("Qnil".to_string())
            } else {
                self.pop()
            }
        });

        let mut function = mem::replace(&mut self.function, saved);
        (self.ip, self.end, self.current) = saved_range;
        let value = result?;
        let indent = INDENT.repeat(function.indent);
        function.out.push(format!("{}return {};", indent, value));
        let text = self.render_function(&name, kind, scope, return_point, function.out);
        self.functions.push(text);
        Ok(name)
    }

    fn render_function(
        &self,
        name: &str,
        kind: FunctionKind,
        scope: ScopeId,
        return_point: Option<BreakPoint>,
        body: Vec<String>,
    ) -> String {
        let slots = match self.ir.scopes.is_empty() {
            true => 0,
            false => self.ir.scopes.get(scope).var_count(),
        };
        let outer = match kind {
            FunctionKind::Top | FunctionKind::Block => "outer_env",
            FunctionKind::Method | FunctionKind::Body => "nullptr",
        };
        let storage = match kind {
            FunctionKind::Top => "",
            _ => "static ",
        };

        let mut lines = vec![
            format!(
                "{}Value {}(Env *outer_env, Value self, Args args, Block *block) {{",
                storage, name
            ),
            format!("{}Env *env = env_new({}, {});", INDENT, outer, slots),
        ];
        if kind == FunctionKind::Block {
            lines.push("redo:".to_string());
        }
        match return_point {
            Some(id) => {
                lines.push(format!("{}try {{", INDENT));
                lines.extend(body);
                lines.push(format!("{}}} catch (ReturnSignal &signal) {{", INDENT));
                lines.push(format!("{0}{0}if (signal.id != {1}) throw;", INDENT, id));
                lines.push(format!("{0}{0}return signal.value;", INDENT));
                lines.push(format!("{}}}", INDENT));
            }
            None => lines.extend(body),
        }
        lines.push("}".to_string());
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }

    /// Emit a region whose parts were produced by [`Self::with_same_scope`].
    ///
    /// Stack slots any part rewrote become result temporaries declared
    /// before the region and assigned at the end of every part.
    pub(super) fn emit_region(
        &mut self,
        opener: usize,
        parts: Vec<(String, Branch)>,
        closing: &str,
    ) -> Result<(), EmitError> {
        let Some(len) = parts.first().map(|(_, part)| part.stack.len()) else {
            return Ok(());
        };
        if parts.iter().any(|(_, part)| part.stack.len() != len) {
            return Err(EmitError::UnbalancedBranches { index: opener });
        }
        let low = parts
            .iter()
            .map(|(_, part)| part.low_water)
            .min()
            .unwrap_or(len)
            .min(len)
            .min(self.function.stack.len());

        let outputs: Vec<String> = (low..len).map(|_| self.temp("r")).collect();
        for output in &outputs {
            self.exec(format!("Value {} = Qnil;", output));
        }
        for (head, part) in parts {
            self.exec(head);
            self.function.out.extend(part.lines);
            self.function.indent += 1;
            for (output, operand) in outputs.iter().zip(&part.stack[low..]) {
                match operand {
                    Operand::Value(expr) => self.exec(format!("{} = {};", output, expr)),
                    Operand::Argc(_) => {
                        self.function.indent -= 1;
                        return Err(EmitError::ExpectedValue { index: opener });
                    }
                }
            }
            self.function.indent -= 1;
        }
        self.exec(closing);

        self.function.stack.truncate(low);
        if low < self.function.low_water {
            self.function.low_water = low;
        }
        for output in outputs {
            self.push(output);
        }
        Ok(())
    }

    fn run(&mut self) -> Result<(), EmitError> {
        while self.ip < self.end {
            let index = self.ip;
            self.ip += 1;
            self.current = index;
            self.transform_op(index)?;
        }
        Ok(())
    }

    // === Scopes ===

    pub(super) fn scope_of(&self, index: usize) -> Result<ScopeId, EmitError> {
        self.ir.instructions[index]
            .env
            .ok_or_else(|| StructuralError::Unscoped { index }.into())
    }

    /// Whether a `next`/`redo` at `index` targets a loop (rather than the
    /// enclosing block).
    pub(super) fn in_loop(&self, index: usize) -> Result<bool, EmitError> {
        let mut current = self.scope_of(index)?;
        loop {
            let scope = self.ir.scopes.get(current);
            match scope.kind {
                ScopeKind::Loop => return Ok(true),
                ScopeKind::Conditional => match scope.outer {
                    Some(outer) => current = outer,
                    None => return Ok(false),
                },
                _ => return Ok(false),
            }
        }
    }
}

/// C++ name of a plain local.
pub(super) fn local_name(name: &str, index: u32) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("v{}_{}", index, sanitized)
}

/// A string literal in C++ syntax.
pub(super) fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
