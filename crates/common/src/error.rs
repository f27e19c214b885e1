//! Decode and construction errors for Tessera programs.

use crate::types::TypeId;
use thiserror::Error;

/// Errors that occur while decoding instruction byte streams.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Opcode 0x00 is illegal and always rejected.
    #[error("illegal opcode 0x00")]
    IllegalOpcode,

    /// Opcode byte is not assigned to any instruction.
    #[error("reserved opcode: {0:#04x}")]
    ReservedOpcode(u8),

    /// The reserved second byte of an instruction is not zero.
    #[error("non-zero reserved byte: {0:#04x}")]
    NonZeroReserved(u8),

    /// Base type byte in reserved range.
    #[error("reserved base type: {0:#04x}")]
    ReservedBaseType(u8),

    /// Byte stream length is not a multiple of 8.
    #[error("invalid byte stream length: {0} (must be multiple of 8)")]
    InvalidLength(usize),
}

/// Errors raised while assembling static frames and programs.
///
/// These come from the code generator handing over malformed structures,
/// before any instruction runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgramError {
    /// A frame must contain at least one instruction.
    #[error("static frame has no instructions")]
    EmptyFrame,

    /// The last instruction must be RETURN or STOP.
    #[error("static frame does not end with RETURN or STOP (last: {last})")]
    MissingTerminator { last: &'static str },

    /// More arguments declared than symbols available.
    #[error("argument count {arg_count} exceeds symbol count {symbols}")]
    ArgumentCountTooLarge { arg_count: usize, symbols: usize },

    /// A symbol references a type that is not in the type table.
    #[error("symbol '{name}' has unknown type id {ty}")]
    UnknownSymbolType { name: String, ty: TypeId },

    /// A constant's runtime type differs from its symbol's declared type.
    #[error("constant for symbol '{name}' has type {found}, declared {declared}")]
    ConstantTypeMismatch {
        name: String,
        declared: TypeId,
        found: TypeId,
    },

    /// An argument slot was given a constant initializer.
    #[error("argument symbol '{name}' cannot carry a constant")]
    ConstantArgument { name: String },
}
