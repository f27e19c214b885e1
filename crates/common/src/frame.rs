//! Static frames: the immutable compiled form of one function body.
//!
//! A frame owns its instruction list and a symbol table with one entry per
//! register. The first `arg_count` symbols are the arguments, the rest are
//! locals. The parallel encoding vector classifies every register as inline
//! or heap; register accesses must agree with it.

use crate::error::ProgramError;
use crate::instruction::{encode_stream, Instruction};
use crate::types::{Encoding, TypeId, TypeTable};
use crate::value::Value;

/// One register slot of a static frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub ty: TypeId,
    /// Literal laid down by the frame prologue. Locals without one start
    /// at their type's default value.
    pub constant: Option<Value>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
            constant: None,
        }
    }

    pub fn constant(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            ty: value.ty(),
            constant: Some(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticFrame {
    instructions: Vec<Instruction>,
    symbols: Vec<Symbol>,
    encodings: Vec<Encoding>,
    arg_count: usize,
}

impl StaticFrame {
    /// Validate and assemble a frame.
    pub fn new(
        types: &TypeTable,
        instructions: Vec<Instruction>,
        symbols: Vec<Symbol>,
        arg_count: usize,
    ) -> Result<Self, ProgramError> {
        let last = instructions.last().ok_or(ProgramError::EmptyFrame)?;
        if !last.opcode.is_terminator() {
            return Err(ProgramError::MissingTerminator {
                last: last.opcode.mnemonic(),
            });
        }
        if arg_count > symbols.len() {
            return Err(ProgramError::ArgumentCountTooLarge {
                arg_count,
                symbols: symbols.len(),
            });
        }

        let mut encodings = Vec::with_capacity(symbols.len());
        for (index, symbol) in symbols.iter().enumerate() {
            if !types.contains(symbol.ty) {
                return Err(ProgramError::UnknownSymbolType {
                    name: symbol.name.clone(),
                    ty: symbol.ty,
                });
            }
            if let Some(constant) = &symbol.constant {
                if index < arg_count {
                    return Err(ProgramError::ConstantArgument {
                        name: symbol.name.clone(),
                    });
                }
                if constant.ty() != symbol.ty {
                    return Err(ProgramError::ConstantTypeMismatch {
                        name: symbol.name.clone(),
                        declared: symbol.ty,
                        found: constant.ty(),
                    });
                }
            }
            encodings.push(types.encoding(symbol.ty));
        }

        Ok(Self {
            instructions,
            symbols,
            encodings,
            arg_count,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn symbol(&self, register: usize) -> Option<&Symbol> {
        self.symbols.get(register)
    }

    pub fn encodings(&self) -> &[Encoding] {
        &self.encodings
    }

    pub fn encoding(&self, register: usize) -> Option<Encoding> {
        self.encodings.get(register).copied()
    }

    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    pub fn local_count(&self) -> usize {
        self.symbols.len() - self.arg_count
    }

    pub fn register_count(&self) -> usize {
        self.symbols.len()
    }

    /// Register index of the symbol called `name`.
    pub fn find_symbol(&self, name: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s.name == name)
    }

    /// 48-bit truncated blake3 hash of the encoded instruction stream.
    pub fn fingerprint(&self) -> u64 {
        let hash = blake3::hash(&encode_stream(&self.instructions));
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&hash.as_bytes()[..6]);
        u64::from_le_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn ret(reg: i16) -> Instruction {
        Instruction::new(Opcode::Return, reg, 0, 0)
    }

    #[test]
    fn counts_and_encodings() {
        let types = TypeTable::new();
        let frame = StaticFrame::new(
            &types,
            vec![ret(0)],
            vec![
                Symbol::new("a", TypeId::INT),
                Symbol::new("s", TypeId::STRING),
                Symbol::constant("k", Value::double(2.5)),
            ],
            2,
        )
        .unwrap();
        assert_eq!(frame.arg_count(), 2);
        assert_eq!(frame.local_count(), 1);
        assert_eq!(frame.arg_count() + frame.local_count(), frame.symbols().len());
        assert_eq!(
            frame.encodings(),
            &[Encoding::Inline, Encoding::Heap, Encoding::Inline]
        );
        assert_eq!(frame.find_symbol("k"), Some(2));
    }

    #[test]
    fn rejects_empty_frame() {
        let types = TypeTable::new();
        assert_eq!(
            StaticFrame::new(&types, vec![], vec![], 0),
            Err(ProgramError::EmptyFrame)
        );
    }

    #[test]
    fn rejects_missing_terminator() {
        let types = TypeTable::new();
        assert_eq!(
            StaticFrame::new(&types, vec![Instruction::bare(Opcode::Nop)], vec![], 0),
            Err(ProgramError::MissingTerminator { last: "NOP" })
        );
    }

    #[test]
    fn rejects_bad_symbols() {
        let types = TypeTable::new();
        let stop = vec![Instruction::bare(Opcode::Stop)];
        assert!(matches!(
            StaticFrame::new(&types, stop.clone(), vec![], 1),
            Err(ProgramError::ArgumentCountTooLarge { arg_count: 1, symbols: 0 })
        ));
        assert!(matches!(
            StaticFrame::new(&types, stop.clone(), vec![Symbol::new("x", TypeId(500))], 0),
            Err(ProgramError::UnknownSymbolType { .. })
        ));
        let mut mismatched = Symbol::constant("x", Value::int(1));
        mismatched.ty = TypeId::DOUBLE;
        assert!(matches!(
            StaticFrame::new(&types, stop.clone(), vec![mismatched], 0),
            Err(ProgramError::ConstantTypeMismatch { .. })
        ));
        assert!(matches!(
            StaticFrame::new(&types, stop, vec![Symbol::constant("x", Value::int(1))], 1),
            Err(ProgramError::ConstantArgument { .. })
        ));
    }

    #[test]
    fn fingerprint_is_48_bits_and_tracks_code() {
        let types = TypeTable::new();
        let a = StaticFrame::new(&types, vec![ret(0)], vec![Symbol::new("x", TypeId::INT)], 0)
            .unwrap();
        let b = StaticFrame::new(&types, vec![ret(0)], vec![Symbol::new("y", TypeId::INT)], 0)
            .unwrap();
        let c = StaticFrame::new(
            &types,
            vec![Instruction::bare(Opcode::Nop), ret(0)],
            vec![Symbol::new("x", TypeId::INT)],
            0,
        )
        .unwrap();
        assert!(a.fingerprint() < 1 << 48);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
