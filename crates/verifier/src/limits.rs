//! Limits checking for Tessera frames.
//!
//! Operands are 16-bit signed, so a frame can span at most `i16::MAX`
//! instructions and registers.

use crate::error::{FrameId, VerifyError};
use tessera_common::{Opcode, StaticFrame};

/// Maximum instructions in one frame.
pub const MAX_FRAME_INSTRUCTIONS: usize = i16::MAX as usize;

/// Maximum registers in one frame.
pub const MAX_FRAME_REGISTERS: usize = i16::MAX as usize;

/// Maximum values popped by one POPN.
pub const MAX_POP_COUNT: i16 = 32;

/// Run the limits check on one frame.
pub fn check_limits(id: FrameId, frame: &StaticFrame) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    let size = frame.instructions().len();
    if size > MAX_FRAME_INSTRUCTIONS {
        errors.push(VerifyError::FrameTooLarge { frame: id, size });
    }
    let count = frame.register_count();
    if count > MAX_FRAME_REGISTERS {
        errors.push(VerifyError::TooManyRegisters { frame: id, count });
    }

    for (at, instr) in frame.instructions().iter().enumerate() {
        if instr.opcode == Opcode::PopN && !(0..=MAX_POP_COUNT).contains(&instr.a) {
            errors.push(VerifyError::PopCountOutOfRange {
                frame: id,
                at,
                count: instr.a,
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Instruction, Symbol, TypeId, TypeTable};

    fn frame(code: Vec<Instruction>, registers: usize) -> StaticFrame {
        let symbols = (0..registers)
            .map(|i| Symbol::new(format!("r{i}"), TypeId::INT))
            .collect();
        StaticFrame::new(&TypeTable::new(), code, symbols, 0).unwrap()
    }

    #[test]
    fn small_frame_passes() {
        let f = frame(
            vec![
                Instruction::new(Opcode::PopN, 32, 0, 0),
                Instruction::bare(Opcode::Stop),
            ],
            2,
        );
        assert!(check_limits(FrameId::Globals, &f).is_empty());
    }

    #[test]
    fn pop_count_out_of_range() {
        let f = frame(
            vec![
                Instruction::new(Opcode::PopN, 33, 0, 0),
                Instruction::new(Opcode::PopN, -1, 0, 0),
                Instruction::bare(Opcode::Stop),
            ],
            0,
        );
        let errors = check_limits(FrameId::Function(0), &f);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::PopCountOutOfRange { at: 0, count: 33, .. })));
    }

    #[test]
    fn too_many_registers() {
        let f = frame(vec![Instruction::bare(Opcode::Stop)], MAX_FRAME_REGISTERS + 1);
        let errors = check_limits(FrameId::Globals, &f);
        assert!(matches!(
            errors.as_slice(),
            [VerifyError::TooManyRegisters { count, .. }] if *count == MAX_FRAME_REGISTERS + 1
        ));
    }

    #[test]
    fn frame_too_large() {
        let mut code = vec![Instruction::bare(Opcode::Nop); MAX_FRAME_INSTRUCTIONS];
        code.push(Instruction::bare(Opcode::Stop));
        let f = frame(code, 0);
        let errors = check_limits(FrameId::Globals, &f);
        assert!(matches!(
            errors.as_slice(),
            [VerifyError::FrameTooLarge { .. }]
        ));
    }
}
