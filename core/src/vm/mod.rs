//! A reference interpreter for compiled programs.
//!
//! The machine walks the flat instruction list of an [`Ir`] directly. Region
//! instructions (`If`, `While`, `Try`, definitions) are matched to their
//! `Else`/`Catch`/`End` partners once, up front, so every jump is a table
//! lookup. Non-local exits travel as unwind signals that the frame or region
//! carrying the matching break point absorbs.
//!
//! Guest values follow Ruby semantics closely enough to run the programs the
//! lowering produces: classes and modules with singleton classes, blocks and
//! lambdas closing over captured variables, exceptions with `rescue`,
//! `ensure` and `retry`, and the core library methods in `builtins`.
//!
//! # Example
//!
//! ```
//! use bumpalo::Bump;
//! use garnet_ast::AstBuilder;
//! use garnet_core::passes::compile;
//! use garnet_core::vm::{self, Value};
//! use garnet_core::{CompilerOptions, ExecutionOptions};
//!
//! let arena = Bump::new();
//! let b = AstBuilder::new(&arena);
//! let program = b.program(&[
//!     b.fcall("puts", &[b.string("hi")]),
//!     b.call(Some(b.int(5)), "+", &[b.int(3)]),
//! ]);
//! let ir = compile(program, &CompilerOptions::default()).unwrap();
//!
//! let execution = vm::execute(&ir, ExecutionOptions::default()).unwrap();
//! assert_eq!(execution.value, Value::Int(8));
//! assert_eq!(execution.output, "hi\n");
//! ```

mod builtins;
mod error;
mod frame;
mod machine;
mod object;
mod ops;
mod stack;
mod value;

#[cfg(test)]
mod vm_test;

pub use error::{ExecutionError, GuestError, ResourceExceededError};
pub use machine::Machine;
pub use object::{Class, CoreClasses, Object};
pub use value::{HashObject, Value, format_float};

pub use stack::Stack;

use crate::options::ExecutionOptions;
use crate::passes::Ir;

/// The result of running a program to completion.
#[derive(Debug)]
pub struct Execution {
    /// Value of the program's last expression.
    pub value: Value,
    /// Everything the program printed.
    pub output: String,
}

/// Run `ir` on a fresh machine.
pub fn execute(ir: &Ir, options: ExecutionOptions) -> Result<Execution, ExecutionError> {
    let mut machine = Machine::new(ir, options)?;
    let value = machine.run()?;
    Ok(Execution {
        value,
        output: machine.take_output(),
    })
}
