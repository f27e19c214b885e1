//! Opcode definitions and encoding shapes for the Tessera instruction set.
//!
//! Every opcode declares one of ten [`Shape`]s describing which of its three
//! operand fields are registers, immediates, or unused. Generic machinery
//! (verifier, debug-build operand checks, disassembly) reasons about operands
//! through the shape instead of special-casing opcodes.

use crate::error::DecodeError;
use crate::types::Encoding;

/// Role of one operand field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandRole {
    /// Field is not used and must be zero.
    Unused,
    /// Field names a frame-relative register.
    Register,
    /// Field is an immediate constant.
    Immediate,
}

/// Operand layout of an instruction: roles of fields A, B and C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Empty,
    Imm,
    Reg,
    RegReg,
    RegRegReg,
    RegRegImm,
    RegImm,
    RegImmImm,
    ImmReg,
    ImmImmImm,
}

/// All shapes, in definition order.
pub const ALL_SHAPES: [Shape; 10] = [
    Shape::Empty,
    Shape::Imm,
    Shape::Reg,
    Shape::RegReg,
    Shape::RegRegReg,
    Shape::RegRegImm,
    Shape::RegImm,
    Shape::RegImmImm,
    Shape::ImmReg,
    Shape::ImmImmImm,
];

impl Shape {
    /// Returns the roles of fields A, B and C.
    pub fn roles(self) -> [OperandRole; 3] {
        use OperandRole::{Immediate as I, Register as R, Unused as U};
        match self {
            Shape::Empty => [U, U, U],
            Shape::Imm => [I, U, U],
            Shape::Reg => [R, U, U],
            Shape::RegReg => [R, R, U],
            Shape::RegRegReg => [R, R, R],
            Shape::RegRegImm => [R, R, I],
            Shape::RegImm => [R, I, U],
            Shape::RegImmImm => [R, I, I],
            Shape::ImmReg => [I, R, U],
            Shape::ImmImmImm => [I, I, I],
        }
    }
}

/// Identifies the operation to perform.
///
/// The `#[repr(u8)]` attribute gives each variant a stable byte value.
/// Opcodes are grouped by purpose into hex ranges.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Register and global access
    Nop = 0x01,
    LoadGlobalInline = 0x02,
    LoadGlobalHeap = 0x03,
    StoreGlobalInline = 0x04,
    StoreGlobalHeap = 0x05,
    CopyRegInline = 0x06,
    CopyRegHeap = 0x07,

    // Member and element lookup
    GetStructMember = 0x10,
    LookupElementString = 0x11,
    LookupElementJson = 0x12,
    LookupElementVectorInline = 0x13,
    LookupElementVectorHeap = 0x14,
    LookupElementDictInline = 0x15,
    LookupElementDictHeap = 0x16,
    ExistsDict = 0x17,

    // Size
    GetSizeString = 0x20,
    GetSizeJson = 0x21,
    GetSizeVectorInline = 0x22,
    GetSizeVectorHeap = 0x23,
    GetSizeDictInline = 0x24,
    GetSizeDictHeap = 0x25,

    // Persistent push-back and update. Update opcodes read the key from
    // register C and the new value from register C + 1.
    PushbackString = 0x28,
    PushbackVectorInline = 0x29,
    PushbackVectorHeap = 0x2A,
    UpdateString = 0x2B,
    UpdateVectorInline = 0x2C,
    UpdateVectorHeap = 0x2D,
    UpdateDictInline = 0x2E,
    UpdateDictHeap = 0x2F,
    UpdateStruct = 0x30,
    EraseDict = 0x31,

    // Calls
    Call = 0x38,

    // Arithmetic
    AddBool = 0x40,
    AddInt = 0x41,
    AddDouble = 0x42,
    ConcatStrings = 0x43,
    ConcatVectorsInline = 0x44,
    ConcatVectorsHeap = 0x45,
    SubtractDouble = 0x46,
    SubtractInt = 0x47,
    MultiplyDouble = 0x48,
    MultiplyInt = 0x49,
    DivideDouble = 0x4A,
    DivideInt = 0x4B,
    RemainderInt = 0x4C,
    LogicalAndBool = 0x4D,
    LogicalAndInt = 0x4E,
    LogicalAndDouble = 0x4F,
    LogicalOrBool = 0x50,
    LogicalOrInt = 0x51,
    LogicalOrDouble = 0x52,

    // Comparison
    ComparisonSmallerOrEqual = 0x58,
    ComparisonSmallerOrEqualInt = 0x59,
    ComparisonSmaller = 0x5A,
    ComparisonSmallerInt = 0x5B,
    LogicalEqual = 0x5C,
    LogicalEqualInt = 0x5D,
    LogicalNonequal = 0x5E,
    LogicalNonequalInt = 0x5F,

    // Construction from stack arguments
    New1 = 0x60,
    NewVectorInline = 0x61,
    NewVectorHeap = 0x62,
    NewDictInline = 0x63,
    NewDictHeap = 0x64,
    NewStruct = 0x65,

    // Frames and the value stack
    Return = 0x70,
    Stop = 0x71,
    PushFramePtr = 0x72,
    PopFramePtr = 0x73,
    PushInline = 0x74,
    PushHeap = 0x75,
    PushTypeId = 0x76,
    PopN = 0x77,

    // Branches. Offsets are relative to the branch instruction itself.
    BranchFalseBool = 0x80,
    BranchTrueBool = 0x81,
    BranchZeroInt = 0x82,
    BranchNotZeroInt = 0x83,
    BranchSmallerInt = 0x84,
    BranchSmallerOrEqualInt = 0x85,
    BranchAlways = 0x86,
}

/// All valid opcodes, in definition order. Useful for exhaustive testing.
pub const ALL_OPCODES: [Opcode; 80] = [
    Opcode::Nop,
    Opcode::LoadGlobalInline,
    Opcode::LoadGlobalHeap,
    Opcode::StoreGlobalInline,
    Opcode::StoreGlobalHeap,
    Opcode::CopyRegInline,
    Opcode::CopyRegHeap,
    Opcode::GetStructMember,
    Opcode::LookupElementString,
    Opcode::LookupElementJson,
    Opcode::LookupElementVectorInline,
    Opcode::LookupElementVectorHeap,
    Opcode::LookupElementDictInline,
    Opcode::LookupElementDictHeap,
    Opcode::ExistsDict,
    Opcode::GetSizeString,
    Opcode::GetSizeJson,
    Opcode::GetSizeVectorInline,
    Opcode::GetSizeVectorHeap,
    Opcode::GetSizeDictInline,
    Opcode::GetSizeDictHeap,
    Opcode::PushbackString,
    Opcode::PushbackVectorInline,
    Opcode::PushbackVectorHeap,
    Opcode::UpdateString,
    Opcode::UpdateVectorInline,
    Opcode::UpdateVectorHeap,
    Opcode::UpdateDictInline,
    Opcode::UpdateDictHeap,
    Opcode::UpdateStruct,
    Opcode::EraseDict,
    Opcode::Call,
    Opcode::AddBool,
    Opcode::AddInt,
    Opcode::AddDouble,
    Opcode::ConcatStrings,
    Opcode::ConcatVectorsInline,
    Opcode::ConcatVectorsHeap,
    Opcode::SubtractDouble,
    Opcode::SubtractInt,
    Opcode::MultiplyDouble,
    Opcode::MultiplyInt,
    Opcode::DivideDouble,
    Opcode::DivideInt,
    Opcode::RemainderInt,
    Opcode::LogicalAndBool,
    Opcode::LogicalAndInt,
    Opcode::LogicalAndDouble,
    Opcode::LogicalOrBool,
    Opcode::LogicalOrInt,
    Opcode::LogicalOrDouble,
    Opcode::ComparisonSmallerOrEqual,
    Opcode::ComparisonSmallerOrEqualInt,
    Opcode::ComparisonSmaller,
    Opcode::ComparisonSmallerInt,
    Opcode::LogicalEqual,
    Opcode::LogicalEqualInt,
    Opcode::LogicalNonequal,
    Opcode::LogicalNonequalInt,
    Opcode::New1,
    Opcode::NewVectorInline,
    Opcode::NewVectorHeap,
    Opcode::NewDictInline,
    Opcode::NewDictHeap,
    Opcode::NewStruct,
    Opcode::Return,
    Opcode::Stop,
    Opcode::PushFramePtr,
    Opcode::PopFramePtr,
    Opcode::PushInline,
    Opcode::PushHeap,
    Opcode::PushTypeId,
    Opcode::PopN,
    Opcode::BranchFalseBool,
    Opcode::BranchTrueBool,
    Opcode::BranchZeroInt,
    Opcode::BranchNotZeroInt,
    Opcode::BranchSmallerInt,
    Opcode::BranchSmallerOrEqualInt,
    Opcode::BranchAlways,
];

impl TryFrom<u8> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == 0x00 {
            return Err(DecodeError::IllegalOpcode);
        }
        // The table is small enough that a scan keeps the byte map in one place.
        ALL_OPCODES
            .iter()
            .copied()
            .find(|op| *op as u8 == value)
            .ok_or(DecodeError::ReservedOpcode(value))
    }
}

impl Opcode {
    /// Returns the assembly mnemonic for this opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::LoadGlobalInline => "LOAD_GLOBAL_INLINE",
            Opcode::LoadGlobalHeap => "LOAD_GLOBAL_HEAP",
            Opcode::StoreGlobalInline => "STORE_GLOBAL_INLINE",
            Opcode::StoreGlobalHeap => "STORE_GLOBAL_HEAP",
            Opcode::CopyRegInline => "COPY_REG_INLINE",
            Opcode::CopyRegHeap => "COPY_REG_HEAP",
            Opcode::GetStructMember => "GET_STRUCT_MEMBER",
            Opcode::LookupElementString => "LOOKUP_ELEMENT_STRING",
            Opcode::LookupElementJson => "LOOKUP_ELEMENT_JSON",
            Opcode::LookupElementVectorInline => "LOOKUP_ELEMENT_VECTOR_INLINE",
            Opcode::LookupElementVectorHeap => "LOOKUP_ELEMENT_VECTOR_HEAP",
            Opcode::LookupElementDictInline => "LOOKUP_ELEMENT_DICT_INLINE",
            Opcode::LookupElementDictHeap => "LOOKUP_ELEMENT_DICT_HEAP",
            Opcode::ExistsDict => "EXISTS_DICT",
            Opcode::GetSizeString => "GET_SIZE_STRING",
            Opcode::GetSizeJson => "GET_SIZE_JSON",
            Opcode::GetSizeVectorInline => "GET_SIZE_VECTOR_INLINE",
            Opcode::GetSizeVectorHeap => "GET_SIZE_VECTOR_HEAP",
            Opcode::GetSizeDictInline => "GET_SIZE_DICT_INLINE",
            Opcode::GetSizeDictHeap => "GET_SIZE_DICT_HEAP",
            Opcode::PushbackString => "PUSHBACK_STRING",
            Opcode::PushbackVectorInline => "PUSHBACK_VECTOR_INLINE",
            Opcode::PushbackVectorHeap => "PUSHBACK_VECTOR_HEAP",
            Opcode::UpdateString => "UPDATE_STRING",
            Opcode::UpdateVectorInline => "UPDATE_VECTOR_INLINE",
            Opcode::UpdateVectorHeap => "UPDATE_VECTOR_HEAP",
            Opcode::UpdateDictInline => "UPDATE_DICT_INLINE",
            Opcode::UpdateDictHeap => "UPDATE_DICT_HEAP",
            Opcode::UpdateStruct => "UPDATE_STRUCT",
            Opcode::EraseDict => "ERASE_DICT",
            Opcode::Call => "CALL",
            Opcode::AddBool => "ADD_BOOL",
            Opcode::AddInt => "ADD_INT",
            Opcode::AddDouble => "ADD_DOUBLE",
            Opcode::ConcatStrings => "CONCAT_STRINGS",
            Opcode::ConcatVectorsInline => "CONCAT_VECTORS_INLINE",
            Opcode::ConcatVectorsHeap => "CONCAT_VECTORS_HEAP",
            Opcode::SubtractDouble => "SUBTRACT_DOUBLE",
            Opcode::SubtractInt => "SUBTRACT_INT",
            Opcode::MultiplyDouble => "MULTIPLY_DOUBLE",
            Opcode::MultiplyInt => "MULTIPLY_INT",
            Opcode::DivideDouble => "DIVIDE_DOUBLE",
            Opcode::DivideInt => "DIVIDE_INT",
            Opcode::RemainderInt => "REMAINDER_INT",
            Opcode::LogicalAndBool => "LOGICAL_AND_BOOL",
            Opcode::LogicalAndInt => "LOGICAL_AND_INT",
            Opcode::LogicalAndDouble => "LOGICAL_AND_DOUBLE",
            Opcode::LogicalOrBool => "LOGICAL_OR_BOOL",
            Opcode::LogicalOrInt => "LOGICAL_OR_INT",
            Opcode::LogicalOrDouble => "LOGICAL_OR_DOUBLE",
            Opcode::ComparisonSmallerOrEqual => "COMPARISON_SMALLER_OR_EQUAL",
            Opcode::ComparisonSmallerOrEqualInt => "COMPARISON_SMALLER_OR_EQUAL_INT",
            Opcode::ComparisonSmaller => "COMPARISON_SMALLER",
            Opcode::ComparisonSmallerInt => "COMPARISON_SMALLER_INT",
            Opcode::LogicalEqual => "LOGICAL_EQUAL",
            Opcode::LogicalEqualInt => "LOGICAL_EQUAL_INT",
            Opcode::LogicalNonequal => "LOGICAL_NONEQUAL",
            Opcode::LogicalNonequalInt => "LOGICAL_NONEQUAL_INT",
            Opcode::New1 => "NEW_1",
            Opcode::NewVectorInline => "NEW_VECTOR_INLINE",
            Opcode::NewVectorHeap => "NEW_VECTOR_HEAP",
            Opcode::NewDictInline => "NEW_DICT_INLINE",
            Opcode::NewDictHeap => "NEW_DICT_HEAP",
            Opcode::NewStruct => "NEW_STRUCT",
            Opcode::Return => "RETURN",
            Opcode::Stop => "STOP",
            Opcode::PushFramePtr => "PUSH_FRAME_PTR",
            Opcode::PopFramePtr => "POP_FRAME_PTR",
            Opcode::PushInline => "PUSH_INLINE",
            Opcode::PushHeap => "PUSH_HEAP",
            Opcode::PushTypeId => "PUSH_TYPE_ID",
            Opcode::PopN => "POPN",
            Opcode::BranchFalseBool => "BRANCH_FALSE_BOOL",
            Opcode::BranchTrueBool => "BRANCH_TRUE_BOOL",
            Opcode::BranchZeroInt => "BRANCH_ZERO_INT",
            Opcode::BranchNotZeroInt => "BRANCH_NOTZERO_INT",
            Opcode::BranchSmallerInt => "BRANCH_SMALLER_INT",
            Opcode::BranchSmallerOrEqualInt => "BRANCH_SMALLER_OR_EQUAL_INT",
            Opcode::BranchAlways => "BRANCH_ALWAYS",
        }
    }

    /// Returns the operand layout of this opcode.
    pub fn shape(&self) -> Shape {
        use Opcode::*;
        match self {
            Nop | Stop | PushFramePtr | PopFramePtr => Shape::Empty,
            PushTypeId | BranchAlways => Shape::Imm,
            Return | PushInline | PushHeap => Shape::Reg,
            CopyRegInline | CopyRegHeap | GetSizeString | GetSizeJson | GetSizeVectorInline
            | GetSizeVectorHeap | GetSizeDictInline | GetSizeDictHeap => Shape::RegReg,
            GetStructMember | Call | New1 | BranchSmallerInt | BranchSmallerOrEqualInt => {
                Shape::RegRegImm
            }
            LoadGlobalInline | LoadGlobalHeap | BranchFalseBool | BranchTrueBool
            | BranchZeroInt | BranchNotZeroInt => Shape::RegImm,
            NewVectorInline | NewVectorHeap | NewDictInline | NewDictHeap | NewStruct => {
                Shape::RegImmImm
            }
            StoreGlobalInline | StoreGlobalHeap => Shape::ImmReg,
            PopN => Shape::ImmImmImm,
            _ => Shape::RegRegReg,
        }
    }

    /// Expected encoding of each register operand, where the opcode fixes it.
    ///
    /// `None` means the field is not a register or accepts either encoding.
    pub fn register_encodings(&self) -> [Option<Encoding>; 3] {
        use Opcode::*;
        const I: Option<Encoding> = Some(Encoding::Inline);
        const H: Option<Encoding> = Some(Encoding::Heap);
        const X: Option<Encoding> = None;
        match self {
            LoadGlobalInline | PushInline => [I, X, X],
            LoadGlobalHeap | PushHeap => [H, X, X],
            StoreGlobalInline => [X, I, X],
            StoreGlobalHeap => [X, H, X],
            CopyRegInline => [I, I, X],
            CopyRegHeap => [H, H, X],
            GetStructMember => [X, H, X],
            LookupElementString | LookupElementVectorInline => [I, H, I],
            LookupElementVectorHeap => [H, H, I],
            LookupElementJson => [H, H, X],
            LookupElementDictInline | ExistsDict => [I, H, H],
            LookupElementDictHeap => [H, H, H],
            GetSizeString | GetSizeJson | GetSizeVectorInline | GetSizeVectorHeap
            | GetSizeDictInline | GetSizeDictHeap => [I, H, X],
            PushbackString | PushbackVectorInline | UpdateString | UpdateVectorInline
            | UpdateVectorHeap => [H, H, I],
            PushbackVectorHeap | UpdateDictInline | UpdateDictHeap | UpdateStruct | EraseDict
            | ConcatStrings | ConcatVectorsInline | ConcatVectorsHeap => [H, H, H],
            Call => [X, I, X],
            AddBool | AddInt | AddDouble | SubtractDouble | SubtractInt | MultiplyDouble
            | MultiplyInt | DivideDouble | DivideInt | RemainderInt | LogicalAndBool
            | LogicalAndInt | LogicalAndDouble | LogicalOrBool | LogicalOrInt
            | LogicalOrDouble | ComparisonSmallerOrEqualInt | ComparisonSmallerInt
            | LogicalEqualInt | LogicalNonequalInt => [I, I, I],
            ComparisonSmallerOrEqual | ComparisonSmaller | LogicalEqual | LogicalNonequal => {
                [I, X, X]
            }
            NewVectorInline | NewVectorHeap | NewDictInline | NewDictHeap | NewStruct => {
                [H, X, X]
            }
            BranchFalseBool | BranchTrueBool | BranchZeroInt | BranchNotZeroInt => [I, X, X],
            BranchSmallerInt | BranchSmallerOrEqualInt => [I, I, X],
            Nop | New1 | Return | Stop | PushFramePtr | PopFramePtr | PushTypeId | PopN
            | BranchAlways => [X, X, X],
        }
    }

    /// Element encoding carried by collection opcodes that come in
    /// inline/heap pairs.
    pub fn element_kind(&self) -> Option<Encoding> {
        use Opcode::*;
        match self {
            LookupElementVectorInline | LookupElementDictInline | GetSizeVectorInline
            | GetSizeDictInline | PushbackVectorInline | UpdateVectorInline
            | UpdateDictInline | ConcatVectorsInline | NewVectorInline | NewDictInline => {
                Some(Encoding::Inline)
            }
            LookupElementVectorHeap | LookupElementDictHeap | GetSizeVectorHeap
            | GetSizeDictHeap | PushbackVectorHeap | UpdateVectorHeap | UpdateDictHeap
            | ConcatVectorsHeap | NewVectorHeap | NewDictHeap => Some(Encoding::Heap),
            _ => None,
        }
    }

    /// Returns true for opcodes that read their new value from register C + 1.
    pub fn reads_next_register(&self) -> bool {
        matches!(
            self,
            Opcode::UpdateString
                | Opcode::UpdateVectorInline
                | Opcode::UpdateVectorHeap
                | Opcode::UpdateDictInline
                | Opcode::UpdateDictHeap
                | Opcode::UpdateStruct
        )
    }

    /// Returns the operand field holding the branch offset, if this is a branch.
    pub fn branch_offset_field(&self) -> Option<usize> {
        match self {
            Opcode::BranchAlways => Some(0),
            Opcode::BranchFalseBool
            | Opcode::BranchTrueBool
            | Opcode::BranchZeroInt
            | Opcode::BranchNotZeroInt => Some(1),
            Opcode::BranchSmallerInt | Opcode::BranchSmallerOrEqualInt => Some(2),
            _ => None,
        }
    }

    /// Returns true if this opcode ends the execution of a frame.
    pub fn is_terminator(&self) -> bool {
        matches!(self, Opcode::Return | Opcode::Stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    #[test]
    fn all_opcodes_count() {
        assert_eq!(ALL_OPCODES.len(), 80);
    }

    #[test]
    fn roundtrip_all_valid_opcodes() {
        for &opcode in &ALL_OPCODES {
            let byte = opcode as u8;
            let decoded = Opcode::try_from(byte).unwrap();
            assert_eq!(
                opcode, decoded,
                "roundtrip failed for {opcode:?} ({byte:#04x})"
            );
        }
    }

    #[test]
    fn illegal_opcode_zero() {
        assert_eq!(Opcode::try_from(0x00), Err(DecodeError::IllegalOpcode));
    }

    #[test]
    fn unassigned_bytes_are_reserved() {
        for byte in [0x08u8, 0x18, 0x26, 0x32, 0x39, 0x53, 0x66, 0x78, 0x87, 0xFF] {
            assert_eq!(
                Opcode::try_from(byte),
                Err(DecodeError::ReservedOpcode(byte)),
                "byte {byte:#04x} should be reserved"
            );
        }
    }

    #[test]
    fn every_byte_value_resolves() {
        for byte in 0..=255u8 {
            match Opcode::try_from(byte) {
                Ok(_) | Err(DecodeError::IllegalOpcode) | Err(DecodeError::ReservedOpcode(_)) => {}
                other => panic!("unexpected result for byte {byte:#04x}: {other:?}"),
            }
        }
    }

    #[test]
    fn mnemonics_are_unique_and_uppercase() {
        let mut seen = std::collections::HashSet::new();
        for &opcode in &ALL_OPCODES {
            let m = opcode.mnemonic();
            assert_eq!(m, m.to_uppercase(), "mnemonic should be uppercase: {m}");
            assert!(seen.insert(m), "duplicate mnemonic {m}");
        }
    }

    #[test]
    fn every_shape_is_used() {
        for shape in ALL_SHAPES {
            assert!(
                ALL_OPCODES.iter().any(|op| op.shape() == shape),
                "shape {shape:?} has no opcode"
            );
        }
    }

    #[test]
    fn register_encodings_only_on_register_fields() {
        for &opcode in &ALL_OPCODES {
            let roles = opcode.shape().roles();
            for (field, encoding) in opcode.register_encodings().iter().enumerate() {
                if encoding.is_some() {
                    assert_eq!(
                        roles[field],
                        OperandRole::Register,
                        "{opcode:?} field {field} has an encoding but is not a register"
                    );
                }
            }
        }
    }

    #[test]
    fn branch_offsets_are_immediates() {
        for &opcode in &ALL_OPCODES {
            if let Some(field) = opcode.branch_offset_field() {
                assert_eq!(opcode.shape().roles()[field], OperandRole::Immediate);
            }
        }
    }

    #[test]
    fn element_kinds_come_in_pairs() {
        let inline = ALL_OPCODES
            .iter()
            .filter(|op| op.element_kind() == Some(Encoding::Inline))
            .count();
        let heap = ALL_OPCODES
            .iter()
            .filter(|op| op.element_kind() == Some(Encoding::Heap))
            .count();
        assert_eq!(inline, heap);
    }
}
