//! Operand validation pass.
//!
//! For every instruction: unused fields are zero, registers exist and have
//! the classification and type the opcode needs, and immediates name valid
//! globals, types, members and counts. Anything this pass accepts can no
//! longer trip a VM defect through a bad operand.

use crate::error::{FrameId, VerifyError};
use crate::limits::MAX_POP_COUNT;
use tessera_common::{
    Encoding, Instruction, OperandRole, Opcode, Program, StaticFrame, TypeDesc, TypeId, TypeTable,
};

/// Collection family an opcode operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Vector,
    Dict,
}

impl Family {
    fn name(self) -> &'static str {
        match self {
            Family::Vector => "vector",
            Family::Dict => "dict",
        }
    }

    fn of(self, desc: &TypeDesc) -> Option<TypeId> {
        match (self, desc) {
            (Family::Vector, TypeDesc::Vector(element)) | (Family::Dict, TypeDesc::Dict(element)) => {
                Some(*element)
            }
            _ => None,
        }
    }
}

fn family(op: Opcode) -> Option<Family> {
    use Opcode::*;
    match op {
        LookupElementVectorInline | LookupElementVectorHeap | GetSizeVectorInline
        | GetSizeVectorHeap | PushbackVectorInline | PushbackVectorHeap | UpdateVectorInline
        | UpdateVectorHeap | ConcatVectorsInline | ConcatVectorsHeap | NewVectorInline
        | NewVectorHeap => Some(Family::Vector),
        LookupElementDictInline | LookupElementDictHeap | GetSizeDictInline | GetSizeDictHeap
        | UpdateDictInline | UpdateDictHeap | NewDictInline | NewDictHeap | ExistsDict
        | EraseDict => Some(Family::Dict),
        _ => None,
    }
}

/// Fixed scalar types of fields A, B and C, where the opcode fixes them.
fn scalar_operands(op: Opcode) -> [Option<TypeId>; 3] {
    use Opcode::*;
    const B: Option<TypeId> = Some(TypeId::BOOL);
    const I: Option<TypeId> = Some(TypeId::INT);
    const D: Option<TypeId> = Some(TypeId::DOUBLE);
    const S: Option<TypeId> = Some(TypeId::STRING);
    const J: Option<TypeId> = Some(TypeId::JSON);
    const X: Option<TypeId> = None;
    match op {
        AddInt | SubtractInt | MultiplyInt | DivideInt | RemainderInt => [I, I, I],
        AddDouble | SubtractDouble | MultiplyDouble | DivideDouble => [D, D, D],
        AddBool | LogicalAndBool | LogicalOrBool => [B, B, B],
        LogicalAndInt | LogicalOrInt | ComparisonSmallerOrEqualInt | ComparisonSmallerInt
        | LogicalEqualInt | LogicalNonequalInt => [B, I, I],
        LogicalAndDouble | LogicalOrDouble => [B, D, D],
        ComparisonSmallerOrEqual | ComparisonSmaller | LogicalEqual | LogicalNonequal => [B, X, X],
        ConcatStrings => [S, S, S],
        LookupElementString => [I, S, I],
        LookupElementJson => [J, J, X],
        LookupElementVectorInline | LookupElementVectorHeap => [X, X, I],
        LookupElementDictInline | LookupElementDictHeap | EraseDict => [X, X, S],
        UpdateVectorInline | UpdateVectorHeap => [X, X, I],
        UpdateDictInline | UpdateDictHeap | UpdateStruct => [X, X, S],
        ExistsDict => [B, X, S],
        GetSizeString => [I, S, X],
        GetSizeJson => [I, J, X],
        GetSizeVectorInline | GetSizeVectorHeap | GetSizeDictInline | GetSizeDictHeap => {
            [I, X, X]
        }
        PushbackString | UpdateString => [S, S, I],
        BranchFalseBool | BranchTrueBool => [B, X, X],
        BranchZeroInt | BranchNotZeroInt => [I, X, X],
        BranchSmallerInt | BranchSmallerOrEqualInt => [I, I, X],
        _ => [X, X, X],
    }
}

struct FrameCheck<'a> {
    types: &'a TypeTable,
    globals: &'a StaticFrame,
    frame: &'a StaticFrame,
    id: FrameId,
    errors: Vec<VerifyError>,
}

impl FrameCheck<'_> {
    /// Type of register `r`, or `None` after recording it as out of range.
    fn register(&mut self, at: usize, r: i16) -> Option<TypeId> {
        let symbol = usize::try_from(r).ok().and_then(|i| self.frame.symbol(i));
        if symbol.is_none() {
            self.errors.push(VerifyError::RegisterOutOfRange {
                frame: self.id,
                at,
                register: r,
            });
        }
        symbol.map(|s| s.ty)
    }

    /// Type of register `r` without reporting; range errors are reported
    /// once by the register sweep.
    fn reg_type(&self, r: i16) -> Option<TypeId> {
        usize::try_from(r)
            .ok()
            .and_then(|i| self.frame.symbol(i))
            .map(|s| s.ty)
    }

    fn expect_type(&mut self, at: usize, r: i16, expected: TypeId) {
        if let Some(found) = self.reg_type(r) {
            if found != expected {
                self.errors.push(VerifyError::RegisterTypeMismatch {
                    frame: self.id,
                    at,
                    register: r,
                    expected,
                    found,
                });
            }
        }
    }

    fn wrong_kind(&mut self, at: usize, expected: &'static str, found: TypeId) {
        self.errors.push(VerifyError::WrongOperandType {
            frame: self.id,
            at,
            expected,
            found,
        });
    }

    fn type_operand(&mut self, at: usize, operand: i16) -> Option<TypeId> {
        let ty = TypeId::from_operand(operand).filter(|t| self.types.contains(*t));
        if ty.is_none() {
            self.errors.push(VerifyError::InvalidTypeOperand {
                frame: self.id,
                at,
                operand,
            });
        }
        ty
    }

    fn count(&mut self, at: usize, count: i16) -> Option<usize> {
        let n = usize::try_from(count).ok();
        if n.is_none() {
            self.errors.push(VerifyError::NegativeCount {
                frame: self.id,
                at,
                count,
            });
        }
        n
    }

    /// Global register `index`, which must hold `encoding` values.
    fn global(&mut self, at: usize, index: i16, encoding: Option<Encoding>) -> Option<TypeId> {
        let found = usize::try_from(index)
            .ok()
            .and_then(|i| Some((self.globals.symbol(i)?.ty, self.globals.encoding(i)?)));
        match found {
            Some((ty, actual)) if encoding.is_none() || encoding == Some(actual) => Some(ty),
            _ => {
                self.errors.push(VerifyError::InvalidGlobal {
                    frame: self.id,
                    at,
                    index,
                });
                None
            }
        }
    }

    fn check(&mut self, at: usize, instr: &Instruction) {
        let op = instr.opcode;
        let operands = instr.operands();
        let roles = op.shape().roles();

        if roles
            .iter()
            .zip(operands)
            .any(|(role, value)| *role == OperandRole::Unused && value != 0)
        {
            self.errors.push(VerifyError::NonZeroUnusedField { frame: self.id, at });
        }

        let encodings = op.register_encodings();
        let scalars = scalar_operands(op);
        for field in 0..3 {
            if roles[field] != OperandRole::Register {
                continue;
            }
            let r = operands[field];
            if self.register(at, r).is_none() {
                continue;
            }
            let actual = usize::try_from(r).ok().and_then(|i| self.frame.encoding(i));
            if let (Some(expected), Some(found)) = (encodings[field], actual) {
                if expected != found {
                    self.errors.push(VerifyError::EncodingMismatch {
                        frame: self.id,
                        at,
                        register: r,
                        expected,
                        found,
                    });
                }
            }
            if let Some(expected) = scalars[field] {
                self.expect_type(at, r, expected);
            }
        }
        if op.reads_next_register() {
            match instr.c.checked_add(1) {
                Some(next) => {
                    self.register(at, next);
                }
                None => self.errors.push(VerifyError::RegisterOutOfRange {
                    frame: self.id,
                    at,
                    register: instr.c,
                }),
            }
            if op == Opcode::UpdateString {
                if let Some(next) = instr.c.checked_add(1) {
                    self.expect_type(at, next, TypeId::INT);
                }
            }
        }

        self.check_specific(at, instr);
    }

    fn check_specific(&mut self, at: usize, instr: &Instruction) {
        use Opcode::*;
        let (a, b, c) = (instr.a, instr.b, instr.c);
        match instr.opcode {
            LoadGlobalInline | LoadGlobalHeap => {
                let encoding = instr.opcode.register_encodings()[0];
                if let Some(ty) = self.global(at, b, encoding) {
                    self.expect_type(at, a, ty);
                }
            }
            StoreGlobalInline | StoreGlobalHeap => {
                let encoding = instr.opcode.register_encodings()[1];
                if let Some(ty) = self.global(at, a, encoding) {
                    self.expect_type(at, b, ty);
                }
            }
            CopyRegInline | CopyRegHeap => {
                if let Some(ty) = self.reg_type(b) {
                    self.expect_type(at, a, ty);
                }
            }
            GetStructMember => self.check_member(at, a, b, c),
            UpdateStruct => {
                if let Some(ty) = self.reg_type(b) {
                    if self.types.struct_def(ty).is_none() {
                        self.wrong_kind(at, "struct", ty);
                    }
                    self.expect_type(at, a, ty);
                }
            }
            Call => self.check_call(at, a, b, c),
            New1 => {
                if let Some(ty) = self.type_operand(at, c) {
                    self.expect_type(at, a, ty);
                }
            }
            NewStruct => {
                let Some(ty) = self.type_operand(at, b) else {
                    return;
                };
                self.expect_type(at, a, ty);
                let Some(def) = self.types.struct_def(ty) else {
                    self.wrong_kind(at, "struct", ty);
                    return;
                };
                let expected = def.members.len();
                if self.count(at, c).is_some_and(|n| n != expected) {
                    self.errors.push(VerifyError::CountMismatch {
                        frame: self.id,
                        at,
                        expected,
                        found: c,
                    });
                }
            }
            PushTypeId => {
                self.type_operand(at, a);
            }
            PopN => {
                let bitmap = u32::from(b as u16) | (u32::from(c as u16) << 16);
                if (0..MAX_POP_COUNT).contains(&a) && bitmap >> a != 0 {
                    self.errors.push(VerifyError::PopBitmapOverflow { frame: self.id, at });
                }
            }
            op => {
                if let Some(family) = family(op) {
                    self.check_collection(at, instr, family);
                }
            }
        }
    }

    fn check_member(&mut self, at: usize, a: i16, b: i16, c: i16) {
        let Some(ty) = self.reg_type(b) else {
            return;
        };
        let Some(def) = self.types.struct_def(ty) else {
            self.wrong_kind(at, "struct", ty);
            return;
        };
        match usize::try_from(c).ok().and_then(|m| def.members.get(m)) {
            Some(member) => {
                let member_ty = member.ty;
                self.expect_type(at, a, member_ty);
            }
            None => self.errors.push(VerifyError::InvalidMember {
                frame: self.id,
                at,
                member: c,
            }),
        }
    }

    fn check_call(&mut self, at: usize, a: i16, b: i16, c: i16) {
        let Some(ty) = self.reg_type(b) else {
            return;
        };
        let Some(signature) = self.types.function_type(ty) else {
            self.wrong_kind(at, "function", ty);
            return;
        };
        let expected = signature.params.len();
        if usize::try_from(c).ok() != Some(expected) {
            self.errors.push(VerifyError::CountMismatch {
                frame: self.id,
                at,
                expected,
                found: c,
            });
        }
        if signature.ret != TypeId::VOID {
            let ret = signature.ret;
            self.expect_type(at, a, ret);
        }
    }

    fn check_collection(&mut self, at: usize, instr: &Instruction, family: Family) {
        use Opcode::*;
        let op = instr.opcode;
        let constructs = matches!(op, NewVectorInline | NewVectorHeap | NewDictInline | NewDictHeap);
        let collection = if constructs {
            let count = instr.c;
            let ty = self.type_operand(at, instr.b);
            self.count(at, count);
            ty
        } else {
            self.reg_type(instr.b)
        };
        let Some(collection) = collection else {
            return;
        };
        let Some(element) = family.of(self.types.desc(collection)) else {
            self.wrong_kind(at, family.name(), collection);
            return;
        };

        if let Some(kind) = op.element_kind() {
            let expected = self.types.encoding(element);
            if kind != expected {
                self.errors.push(VerifyError::ElementKindMismatch {
                    frame: self.id,
                    at,
                    expected,
                    found: kind,
                });
            }
        }

        match op {
            LookupElementVectorInline | LookupElementVectorHeap | LookupElementDictInline
            | LookupElementDictHeap => self.expect_type(at, instr.a, element),
            PushbackVectorInline | PushbackVectorHeap => {
                self.expect_type(at, instr.a, collection);
                self.expect_type(at, instr.c, element);
            }
            UpdateVectorInline | UpdateVectorHeap | UpdateDictInline | UpdateDictHeap => {
                self.expect_type(at, instr.a, collection);
                if let Some(next) = instr.c.checked_add(1) {
                    self.expect_type(at, next, element);
                }
            }
            ConcatVectorsInline | ConcatVectorsHeap => {
                self.expect_type(at, instr.a, collection);
                self.expect_type(at, instr.c, collection);
            }
            EraseDict | NewVectorInline | NewVectorHeap | NewDictInline | NewDictHeap => {
                self.expect_type(at, instr.a, collection);
            }
            _ => {}
        }
    }
}

/// Run the operand pass on one frame of `program`.
pub fn check_operands(program: &Program, id: FrameId, frame: &StaticFrame) -> Vec<VerifyError> {
    let mut check = FrameCheck {
        types: &program.types,
        globals: &program.globals,
        frame,
        id,
        errors: Vec::new(),
    };
    for (at, instr) in frame.instructions().iter().enumerate() {
        check.check(at, instr);
    }
    check.errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Symbol, Value};

    fn check(types: &TypeTable, symbols: Vec<Symbol>, code: Vec<Instruction>) -> Vec<VerifyError> {
        let globals =
            StaticFrame::new(types, vec![Instruction::bare(Opcode::Stop)], vec![], 0).unwrap();
        let frame = StaticFrame::new(types, code, symbols, 0).unwrap();
        let program = Program::new(types.clone(), globals, vec![]);
        check_operands(&program, FrameId::Function(0), &frame)
    }

    fn ints(n: usize) -> Vec<Symbol> {
        (0..n).map(|i| Symbol::new(format!("i{i}"), TypeId::INT)).collect()
    }

    #[test]
    fn well_formed_arithmetic_passes() {
        let code = vec![
            Instruction::new(Opcode::AddInt, 0, 1, 2),
            Instruction::new(Opcode::Return, 0, 0, 0),
        ];
        assert!(check(&TypeTable::new(), ints(3), code).is_empty());
    }

    #[test]
    fn register_out_of_range() {
        let code = vec![
            Instruction::new(Opcode::AddInt, 0, 1, 7),
            Instruction::new(Opcode::Return, -1, 0, 0),
        ];
        let errors = check(&TypeTable::new(), ints(2), code);
        assert_eq!(
            errors,
            vec![
                VerifyError::RegisterOutOfRange {
                    frame: FrameId::Function(0),
                    at: 0,
                    register: 7
                },
                VerifyError::RegisterOutOfRange {
                    frame: FrameId::Function(0),
                    at: 1,
                    register: -1
                },
            ]
        );
    }

    #[test]
    fn unused_fields_must_be_zero() {
        let code = vec![Instruction::new(Opcode::Return, 0, 5, 0)];
        let errors = check(&TypeTable::new(), ints(1), code);
        assert_eq!(
            errors,
            vec![VerifyError::NonZeroUnusedField {
                frame: FrameId::Function(0),
                at: 0
            }]
        );
    }

    #[test]
    fn classification_and_type_mismatch() {
        let symbols = vec![
            Symbol::new("s", TypeId::STRING),
            Symbol::new("i", TypeId::INT),
        ];
        let code = vec![
            Instruction::new(Opcode::CopyRegInline, 0, 1, 0),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&TypeTable::new(), symbols, code);
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::EncodingMismatch { register: 0, .. })));
        assert!(errors
            .iter()
            .any(|e| matches!(e, VerifyError::RegisterTypeMismatch { register: 0, .. })));
    }

    #[test]
    fn element_kind_must_match_collection() {
        let mut types = TypeTable::new();
        let strings = types.vector_of(TypeId::STRING);
        let symbols = vec![
            Symbol::new("v", strings),
            Symbol::new("i", TypeId::INT),
            Symbol::new("out", TypeId::STRING),
        ];
        let code = vec![
            Instruction::new(Opcode::LookupElementVectorInline, 2, 0, 1),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&types, symbols, code);
        assert!(errors.iter().any(|e| matches!(
            e,
            VerifyError::ElementKindMismatch {
                expected: Encoding::Heap,
                found: Encoding::Inline,
                ..
            }
        )));
    }

    #[test]
    fn dict_opcode_on_vector() {
        let mut types = TypeTable::new();
        let vec_ty = types.vector_of(TypeId::INT);
        let symbols = vec![
            Symbol::new("v", vec_ty),
            Symbol::new("n", TypeId::INT),
        ];
        let code = vec![
            Instruction::new(Opcode::GetSizeDictInline, 1, 0, 0),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&types, symbols, code);
        assert_eq!(
            errors,
            vec![VerifyError::WrongOperandType {
                frame: FrameId::Function(0),
                at: 0,
                expected: "dict",
                found: vec_ty
            }]
        );
    }

    #[test]
    fn struct_member_and_count() {
        let mut types = TypeTable::new();
        let pair = types.struct_of(
            "Pair",
            vec![
                tessera_common::Member::new("a", TypeId::INT),
                tessera_common::Member::new("b", TypeId::INT),
            ],
        );
        let symbols = vec![Symbol::new("p", pair), Symbol::new("x", TypeId::INT)];
        let code = vec![
            Instruction::new(Opcode::GetStructMember, 1, 0, 2),
            Instruction::new(Opcode::NewStruct, 0, pair.as_operand(), 3),
            Instruction::new(Opcode::NewStruct, 0, 999, 2),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&types, symbols, code);
        assert_eq!(
            errors,
            vec![
                VerifyError::InvalidMember {
                    frame: FrameId::Function(0),
                    at: 0,
                    member: 2
                },
                VerifyError::CountMismatch {
                    frame: FrameId::Function(0),
                    at: 1,
                    expected: 2,
                    found: 3
                },
                VerifyError::InvalidTypeOperand {
                    frame: FrameId::Function(0),
                    at: 2,
                    operand: 999
                },
            ]
        );
    }

    #[test]
    fn call_argument_count() {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::INT, vec![TypeId::INT]);
        let symbols = vec![
            Symbol::new("out", TypeId::INT),
            Symbol::constant("f", Value::function(sig, tessera_common::FunctionId(0))),
        ];
        let code = vec![
            Instruction::new(Opcode::Call, 0, 1, 1),
            Instruction::new(Opcode::Call, 0, 1, 2),
            Instruction::new(Opcode::Call, 0, 0, 0),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&types, symbols, code);
        assert_eq!(
            errors,
            vec![
                VerifyError::CountMismatch {
                    frame: FrameId::Function(0),
                    at: 1,
                    expected: 1,
                    found: 2
                },
                VerifyError::WrongOperandType {
                    frame: FrameId::Function(0),
                    at: 2,
                    expected: "function",
                    found: TypeId::INT
                },
            ]
        );
    }

    #[test]
    fn pop_bitmap_beyond_count() {
        let code = vec![
            Instruction::new(Opcode::PopN, 2, 0b11, 0),
            Instruction::new(Opcode::PopN, 2, 0b100, 0),
            Instruction::new(Opcode::PopN, 17, 0, 1),
            Instruction::new(Opcode::PopN, 16, 0, 1),
            Instruction::bare(Opcode::Stop),
        ];
        let errors = check(&TypeTable::new(), vec![], code);
        assert_eq!(
            errors,
            vec![
                VerifyError::PopBitmapOverflow {
                    frame: FrameId::Function(0),
                    at: 1
                },
                VerifyError::PopBitmapOverflow {
                    frame: FrameId::Function(0),
                    at: 3
                },
            ]
        );
    }

    #[test]
    fn globals_must_exist_with_matching_encoding() {
        let types = TypeTable::new();
        let globals = StaticFrame::new(
            &types,
            vec![Instruction::bare(Opcode::Stop)],
            vec![Symbol::new("g", TypeId::INT)],
            0,
        )
        .unwrap();
        let frame = StaticFrame::new(
            &types,
            vec![
                Instruction::new(Opcode::LoadGlobalInline, 0, 0, 0),
                Instruction::new(Opcode::LoadGlobalInline, 0, 1, 0),
                Instruction::new(Opcode::StoreGlobalHeap, 0, 1, 0),
                Instruction::bare(Opcode::Stop),
            ],
            vec![Symbol::new("x", TypeId::INT), Symbol::new("s", TypeId::STRING)],
            0,
        )
        .unwrap();
        let program = Program::new(types, globals, vec![]);
        let errors = check_operands(&program, FrameId::Function(0), &frame);
        assert_eq!(
            errors,
            vec![
                VerifyError::InvalidGlobal {
                    frame: FrameId::Function(0),
                    at: 1,
                    index: 1
                },
                VerifyError::InvalidGlobal {
                    frame: FrameId::Function(0),
                    at: 2,
                    index: 0
                },
            ]
        );
    }
}
