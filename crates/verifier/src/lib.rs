//! Tessera verifier: static checks for programs before execution.
//!
//! The VM treats malformed bytecode as an internal defect and panics. The
//! verifier is the gate in front of it: it inspects a `Program` and
//! collects ALL errors (not just the first) so a loader can reject the
//! program as a whole.
//!
//! # Usage
//!
//! ```
//! use tessera_common::{
//!     FunctionDefinition, Instruction, Opcode, Program, StaticFrame, Symbol, TypeId, TypeTable,
//! };
//! use tessera_verifier::verify;
//!
//! let mut types = TypeTable::new();
//! let sig = types.function_of(TypeId::INT, vec![TypeId::INT]);
//! let double = StaticFrame::new(
//!     &types,
//!     vec![
//!         Instruction::new(Opcode::AddInt, 1, 0, 0),
//!         Instruction::new(Opcode::Return, 1, 0, 0),
//!     ],
//!     vec![Symbol::new("x", TypeId::INT), Symbol::new("y", TypeId::INT)],
//!     1,
//! )
//! .unwrap();
//! let globals = StaticFrame::new(&types, vec![Instruction::bare(Opcode::Stop)], vec![], 0).unwrap();
//! let program = Program::new(types, globals, vec![FunctionDefinition::bytecode("double", sig, double)]);
//!
//! assert!(verify(&program).is_ok());
//! ```
//!
//! # Passes
//!
//! 1. **Limits**: frame size, register count, POPN count
//! 2. **Structural**: signatures against frames, host-only dynamic parameters
//! 3. **Operands**: register ranges, classifications and types, immediates
//! 4. **Branches**: targets inside the frame

pub mod branches;
pub mod error;
pub mod limits;
pub mod operands;
pub mod structural;

pub use error::{FrameId, VerifyError};

use tessera_common::{Program, StaticFrame};

/// Every bytecode frame of `program`, globals first.
fn frames(program: &Program) -> impl Iterator<Item = (FrameId, &StaticFrame)> {
    let functions = program
        .functions
        .iter()
        .enumerate()
        .filter_map(|(index, def)| def.frame().map(|frame| (FrameId::Function(index), frame)));
    std::iter::once((FrameId::Globals, &program.globals)).chain(functions)
}

/// Verify a program for correctness.
///
/// Returns `Ok(())` if the program passes all checks, or
/// `Err(Vec<VerifyError>)` with all errors found.
///
/// Operand and branch checks are skipped for a frame that breaks its
/// limits, since its indices cannot be trusted to fit an operand.
pub fn verify(program: &Program) -> Result<(), Vec<VerifyError>> {
    let mut all_errors = Vec::new();

    all_errors.extend(structural::check_structural(program));

    for (id, frame) in frames(program) {
        let limit_errors = limits::check_limits(id, frame);
        let oversized = limit_errors.iter().any(|e| {
            matches!(
                e,
                VerifyError::FrameTooLarge { .. } | VerifyError::TooManyRegisters { .. }
            )
        });
        all_errors.extend(limit_errors);
        if oversized {
            continue;
        }
        all_errors.extend(operands::check_operands(program, id, frame));
        all_errors.extend(branches::check_branches(id, frame));
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors)
    }
}
