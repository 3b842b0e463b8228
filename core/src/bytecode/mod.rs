//! Binary bytecode format.
//!
//! ```text
//! +--------+-------+-------+----------------+-----------+------------------+
//! | "GRNT" | major | minor | pool len (BER) | pool      | instructions ... |
//! +--------+-------+-------+----------------+-----------+------------------+
//! ```
//!
//! Each instruction is its [`Opcode`](crate::Opcode) byte followed by its
//! operands. The stream runs to the end of the input; there is no
//! instruction count. Scopes and source lines are not stored: a decoded
//! program goes through the scope builder and the later passes again.

use thiserror::Error;

use crate::instructions::Instruction;

mod integer;
mod reader;
mod rodata;
mod writer;

#[cfg(test)]
mod bytecode_test;

pub use integer::{read_ber, read_compact, write_ber, write_compact};
pub use reader::Reader;
pub use rodata::{Rodata, RodataView};
pub use writer::Writer;

pub const MAGIC: &[u8; 4] = b"GRNT";
pub const MAJOR_VERSION: u8 = 0;
pub const MINOR_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    #[error("not a garnet bytecode file (bad magic)")]
    BadMagic,

    #[error("unsupported bytecode version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("bytecode truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("unknown opcode {byte:#04x} at byte {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("unknown region label {byte} at byte {offset}")]
    UnknownLabel { byte: u8, offset: usize },

    #[error("constant pool offset {offset} is out of range")]
    BadPoolOffset { offset: u64 },

    #[error("constant pool entry at {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: u64 },

    #[error("operand at byte {offset} does not fit its type")]
    Overflow { offset: usize },

    #[error("invalid boolean {byte} at byte {offset}")]
    InvalidBool { byte: u8, offset: usize },
}

/// Encode a program.
pub fn encode(instructions: &[Instruction]) -> Vec<u8> {
    let mut writer = Writer::new();
    for instruction in instructions {
        writer.write(&instruction.op);
    }
    writer.finish()
}

/// Decode a program; every instruction comes back unscoped, on line 0.
pub fn decode(bytes: &[u8]) -> Result<Vec<Instruction>, BytecodeError> {
    let mut reader = Reader::new(bytes)?;
    let mut instructions = Vec::new();
    while let Some(op) = reader.next_op()? {
        instructions.push(Instruction::from(op));
    }
    tracing::debug!(
        bytes = bytes.len(),
        instructions = instructions.len(),
        "decoded bytecode"
    );
    Ok(instructions)
}
