//! Branch target validation.
//!
//! A branch at index `at` with offset `k` continues at `at + k`; the target
//! must be an instruction of the same frame. Offset zero is a valid
//! self-loop.

use crate::error::{FrameId, VerifyError};
use tessera_common::StaticFrame;

/// Run the branch pass on one frame.
pub fn check_branches(id: FrameId, frame: &StaticFrame) -> Vec<VerifyError> {
    let len = frame.instructions().len() as i64;
    let mut errors = Vec::new();

    for (at, instr) in frame.instructions().iter().enumerate() {
        let Some(field) = instr.opcode.branch_offset_field() else {
            continue;
        };
        let target = at as i64 + i64::from(instr.operands()[field]);
        if !(0..len).contains(&target) {
            errors.push(VerifyError::BranchOutOfRange {
                frame: id,
                at,
                target,
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Instruction, Opcode, Symbol, TypeId, TypeTable};

    fn frame(code: Vec<Instruction>) -> StaticFrame {
        let symbols = vec![Symbol::new("n", TypeId::INT), Symbol::new("m", TypeId::INT)];
        StaticFrame::new(&TypeTable::new(), code, symbols, 0).unwrap()
    }

    #[test]
    fn forward_and_backward_in_range() {
        let f = frame(vec![
            Instruction::new(Opcode::BranchZeroInt, 0, 3, 0),
            Instruction::new(Opcode::SubtractInt, 0, 0, 1),
            Instruction::new(Opcode::BranchAlways, -2, 0, 0),
            Instruction::bare(Opcode::Stop),
        ]);
        assert!(check_branches(FrameId::Globals, &f).is_empty());
    }

    #[test]
    fn self_loop_is_in_range() {
        let f = frame(vec![
            Instruction::new(Opcode::BranchSmallerInt, 0, 1, 0),
            Instruction::bare(Opcode::Stop),
        ]);
        assert!(check_branches(FrameId::Globals, &f).is_empty());
    }

    #[test]
    fn targets_outside_the_frame() {
        let f = frame(vec![
            Instruction::new(Opcode::BranchAlways, -1, 0, 0),
            Instruction::new(Opcode::BranchTrueBool, 0, 2, 0),
            Instruction::new(Opcode::BranchSmallerOrEqualInt, 0, 1, 5),
            Instruction::bare(Opcode::Stop),
        ]);
        let errors = check_branches(FrameId::Function(2), &f);
        let targets: Vec<i64> = errors
            .iter()
            .map(|e| match e {
                VerifyError::BranchOutOfRange { target, .. } => *target,
                other => panic!("unexpected error: {other}"),
            })
            .collect();
        assert_eq!(targets, vec![-1, 7]);
    }

    #[test]
    fn branch_may_target_the_terminator() {
        let f = frame(vec![
            Instruction::new(Opcode::BranchAlways, 1, 0, 0),
            Instruction::bare(Opcode::Stop),
        ]);
        assert!(check_branches(FrameId::Globals, &f).is_empty());
    }
}
