use core::fmt;

use super::{Instruction, Op};

/// Human readable disassembly of an instruction list.
///
/// One line per instruction: index, region-indented operation and, when the
/// scope builder has run, the scope id.
///
/// ```text
///    0  push_int 1
///    1  if                      @0
///    2    push_int 2            @1
///    3  else if                 @1
/// ```
pub struct Listing<'a>(pub &'a [Instruction]);

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut depth: usize = 0;
        for (index, instruction) in self.0.iter().enumerate() {
            // Terminators sit at the level of their opener.
            let indent = match instruction.op {
                Op::Else(_) | Op::WhileBody | Op::Catch | Op::End(_) => depth.saturating_sub(1),
                _ => depth,
            };
            let text = format!("{}{}", "  ".repeat(indent), instruction.op);
            match instruction.env {
                Some(env) => writeln!(f, "{:>4}  {:<28} @{}", index, text, env.0)?,
                None => writeln!(f, "{:>4}  {}", index, text)?,
            }
            if instruction.op.opens().is_some() {
                depth += 1;
            } else if matches!(instruction.op, Op::End(_)) {
                depth = depth.saturating_sub(1);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Label;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_listing_indents_regions() {
        let code: Vec<Instruction> = vec![
            Op::PushTrue.into(),
            Op::If.into(),
            Op::PushInt(1).into(),
            Op::Else(Label::If).into(),
            Op::PushInt(2).into(),
            Op::End(Label::If).into(),
        ];

        let expected = [
            "   0  push_true",
            "   1  if",
            "   2    push_int 1",
            "   3  else if",
            "   4    push_int 2",
            "   5  end if",
        ];
        let listing = Listing(&code).to_string();
        assert_eq!(listing.lines().collect::<Vec<_>>(), expected);
    }
}
