//! Instruction encoding and decoding for the Tessera instruction set.
//!
//! Every instruction is exactly 64 bits (8 bytes), encoded little-endian:
//! ```text
//! Byte 0:    opcode (u8)
//! Byte 1:    reserved, must be zero
//! Bytes 2-3: A (i16, little-endian)
//! Bytes 4-5: B (i16, little-endian)
//! Bytes 6-7: C (i16, little-endian)
//! ```

use std::fmt;

use crate::error::DecodeError;
use crate::opcode::{OperandRole, Opcode};

/// A single 64-bit Tessera instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    /// The operation to perform.
    pub opcode: Opcode,
    /// First operand. Role depends on the opcode's shape.
    pub a: i16,
    /// Second operand.
    pub b: i16,
    /// Third operand.
    pub c: i16,
}

impl Instruction {
    pub fn new(opcode: Opcode, a: i16, b: i16, c: i16) -> Self {
        Self { opcode, a, b, c }
    }

    /// Instruction with all operand fields zero.
    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, 0, 0, 0)
    }

    /// Operand fields in A, B, C order.
    pub fn operands(&self) -> [i16; 3] {
        [self.a, self.b, self.c]
    }

    /// Encode this instruction to 8 bytes (little-endian).
    pub fn encode(&self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = self.opcode as u8;
        bytes[2..4].copy_from_slice(&self.a.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.b.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.c.to_le_bytes());
        bytes
    }

    /// Decode 8 bytes into an instruction (little-endian).
    pub fn decode(bytes: [u8; 8]) -> Result<Self, DecodeError> {
        let opcode = Opcode::try_from(bytes[0])?;
        if bytes[1] != 0 {
            return Err(DecodeError::NonZeroReserved(bytes[1]));
        }
        Ok(Self {
            opcode,
            a: i16::from_le_bytes([bytes[2], bytes[3]]),
            b: i16::from_le_bytes([bytes[4], bytes[5]]),
            c: i16::from_le_bytes([bytes[6], bytes[7]]),
        })
    }
}

/// Encode a sequence of instructions back to back.
pub fn encode_stream(instructions: &[Instruction]) -> Vec<u8> {
    instructions.iter().flat_map(|i| i.encode()).collect()
}

/// Decode a byte stream whose length is a multiple of 8.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    if !bytes.len().is_multiple_of(8) {
        return Err(DecodeError::InvalidLength(bytes.len()));
    }
    bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            Instruction::decode(word)
        })
        .collect()
}

impl fmt::Display for Instruction {
    /// Disassembly text: registers as `r<n>`, immediates as `#<n>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.opcode.mnemonic())?;
        let mut first = true;
        for (role, value) in self.opcode.shape().roles().iter().zip(self.operands()) {
            let prefix = match role {
                OperandRole::Unused => continue,
                OperandRole::Register => 'r',
                OperandRole::Immediate => '#',
            };
            let sep = if first { " " } else { ", " };
            first = false;
            write!(f, "{sep}{prefix}{value}")?;
        }
        Ok(())
    }
}
