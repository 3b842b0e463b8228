//! The constant pool: every string operand of a program, interned once.
//!
//! Entries are BER length-prefixed UTF-8 and are addressed by the byte
//! offset of their length prefix.

use hashbrown::HashMap;

use super::BytecodeError;
use super::integer::{read_ber, write_ber};

#[derive(Debug, Default)]
pub struct Rodata {
    bytes: Vec<u8>,
    offsets: HashMap<String, u64>,
}

impl Rodata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `value`, appending it on first use.
    pub fn intern(&mut self, value: &str) -> u64 {
        if let Some(&offset) = self.offsets.get(value) {
            return offset;
        }
        let offset = self.bytes.len() as u64;
        write_ber(&mut self.bytes, value.len() as u64);
        self.bytes.extend_from_slice(value.as_bytes());
        self.offsets.insert(value.to_string(), offset);
        offset
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Read-only view of a decoded pool.
pub struct RodataView<'b> {
    bytes: &'b [u8],
}

impl<'b> RodataView<'b> {
    pub fn new(bytes: &'b [u8]) -> Self {
        Self { bytes }
    }

    pub fn get(&self, offset: u64) -> Result<&'b str, BytecodeError> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start < self.bytes.len())
            .ok_or(BytecodeError::BadPoolOffset { offset })?;
        let (len, read) =
            read_ber(&self.bytes[start..]).ok_or(BytecodeError::BadPoolOffset { offset })?;
        let begin = start + read;
        let end = usize::try_from(len)
            .ok()
            .and_then(|len| begin.checked_add(len))
            .filter(|&end| end <= self.bytes.len())
            .ok_or(BytecodeError::BadPoolOffset { offset })?;
        core::str::from_utf8(&self.bytes[begin..end]).map_err(|_| BytecodeError::InvalidUtf8 { offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interning_reuses_offsets() {
        let mut pool = Rodata::new();
        let a = pool.intern("each");
        let b = pool.intern("puts");
        assert_eq!(pool.intern("each"), a);
        assert_eq!((a, b), (0, 5));
        assert_eq!(pool.as_bytes(), b"\x04each\x04puts");

        let view = RodataView::new(pool.as_bytes());
        assert_eq!(view.get(b), Ok("puts"));
        assert_eq!(view.get(99), Err(BytecodeError::BadPoolOffset { offset: 99 }));
    }

    #[test]
    fn test_entry_running_past_the_pool() {
        let view = RodataView::new(b"\x09abc");
        assert_eq!(view.get(0), Err(BytecodeError::BadPoolOffset { offset: 0 }));
        let view = RodataView::new(b"\x02\xff\xfe");
        assert_eq!(view.get(0), Err(BytecodeError::InvalidUtf8 { offset: 0 }));
    }
}
