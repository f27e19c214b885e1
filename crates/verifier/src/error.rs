//! Verification errors for the Tessera verifier.
//!
//! Every error names the frame it was found in and, where it concerns one
//! instruction, that instruction's index (`at`). The verifier collects ALL
//! errors, not just the first.

use std::fmt;

use tessera_common::{Encoding, TypeId};
use thiserror::Error;

/// Identifies a static frame within a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameId {
    Globals,
    /// Frame of the function with this index.
    Function(usize),
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameId::Globals => f.write_str("globals"),
            FrameId::Function(index) => write!(f, "function #{index}"),
        }
    }
}

/// Errors found during static verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    // --- Limits ---
    /// Frame has more instructions than a branch offset can span.
    #[error("{frame}: {size} instructions exceeds the frame limit")]
    FrameTooLarge { frame: FrameId, size: usize },

    /// Frame has more registers than an operand can address.
    #[error("{frame}: {count} registers exceeds the register limit")]
    TooManyRegisters { frame: FrameId, count: usize },

    /// POPN count outside `0..=32`.
    #[error("{frame}: POPN count {count} out of range at instruction {at}")]
    PopCountOutOfRange { frame: FrameId, at: usize, count: i16 },

    // --- Structural ---
    /// The global frame declares arguments.
    #[error("global frame declares {count} arguments")]
    GlobalArguments { count: usize },

    /// A function's signature is not a function type.
    #[error("function #{function}: signature {ty} is not a function type")]
    NotAFunctionType { function: usize, ty: TypeId },

    /// Frame argument count differs from the signature's parameter count.
    #[error("function #{function}: frame takes {found} arguments, signature declares {expected}")]
    ArgumentCountMismatch {
        function: usize,
        expected: usize,
        found: usize,
    },

    /// Argument register typed differently from its parameter.
    #[error("function #{function}: argument r{register} has type {found}, signature declares {expected}")]
    ArgumentTypeMismatch {
        function: usize,
        register: usize,
        expected: TypeId,
        found: TypeId,
    },

    /// Dynamic (`any`) parameters are only allowed on host functions.
    #[error("function #{function}: bytecode frame with a dynamic parameter")]
    DynamicParameterInBytecode { function: usize },

    // --- Operands ---
    /// Field that the opcode's shape leaves unused is nonzero.
    #[error("{frame}: non-zero unused field at instruction {at}")]
    NonZeroUnusedField { frame: FrameId, at: usize },

    /// Register operand outside the frame.
    #[error("{frame}: register r{register} out of range at instruction {at}")]
    RegisterOutOfRange {
        frame: FrameId,
        at: usize,
        register: i16,
    },

    /// Register classification disagrees with the opcode.
    #[error("{frame}: r{register} is {found:?}, opcode expects {expected:?} at instruction {at}")]
    EncodingMismatch {
        frame: FrameId,
        at: usize,
        register: i16,
        expected: Encoding,
        found: Encoding,
    },

    /// Inline/heap opcode variant disagrees with the collection's elements.
    #[error("{frame}: {found:?} element opcode on {expected:?} elements at instruction {at}")]
    ElementKindMismatch {
        frame: FrameId,
        at: usize,
        expected: Encoding,
        found: Encoding,
    },

    /// Operand does not have the kind of type the opcode needs.
    #[error("{frame}: operand of type {found} is not a {expected} at instruction {at}")]
    WrongOperandType {
        frame: FrameId,
        at: usize,
        expected: &'static str,
        found: TypeId,
    },

    /// Register has a different type than the operation needs.
    #[error("{frame}: r{register} has type {found}, expected {expected} at instruction {at}")]
    RegisterTypeMismatch {
        frame: FrameId,
        at: usize,
        register: i16,
        expected: TypeId,
        found: TypeId,
    },

    /// Immediate does not name a type in the type table.
    #[error("{frame}: #{operand} is not a type id at instruction {at}")]
    InvalidTypeOperand {
        frame: FrameId,
        at: usize,
        operand: i16,
    },

    /// Immediate does not name a global register, or names one of the
    /// wrong encoding.
    #[error("{frame}: invalid global #{index} at instruction {at}")]
    InvalidGlobal { frame: FrameId, at: usize, index: i16 },

    /// Struct member index outside the struct.
    #[error("{frame}: member #{member} out of range at instruction {at}")]
    InvalidMember {
        frame: FrameId,
        at: usize,
        member: i16,
    },

    /// Argument or member count immediate disagrees with the type.
    #[error("{frame}: count #{found} where {expected} is required at instruction {at}")]
    CountMismatch {
        frame: FrameId,
        at: usize,
        expected: usize,
        found: i16,
    },

    /// Negative element count immediate.
    #[error("{frame}: negative count #{count} at instruction {at}")]
    NegativeCount { frame: FrameId, at: usize, count: i16 },

    /// POPN heap bitmap marks cells beyond its count.
    #[error("{frame}: POPN bitmap marks cells beyond its count at instruction {at}")]
    PopBitmapOverflow { frame: FrameId, at: usize },

    // --- Branches ---
    /// Branch target outside the frame.
    #[error("{frame}: branch at instruction {at} targets {target}, outside the frame")]
    BranchOutOfRange {
        frame: FrameId,
        at: usize,
        target: i64,
    },
}
