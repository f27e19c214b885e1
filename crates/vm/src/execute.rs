//! Main execution loop and opcode dispatch for the Tessera VM.
//!
//! Inline/heap opcode pairs are decoded once per instruction into an
//! operation family plus an element [`Encoding`]; one handler serves both
//! kinds and checks the kind against the collection's element type.

use serde_json::Value as Json;
use tessera_common::{
    compare_values, value_to_json, values_equal, Encoding, Instruction, OperandRole, Opcode,
    Payload, PersistentMap, PersistentVector, StaticFrame, TypeDesc, TypeId, Value,
};
use tracing::trace;

use crate::convention;
use crate::error::RuntimeError;
use crate::machine::Interpreter;

/// Largest POPN count.
pub const MAX_POPN: usize = 32;

/// Outcome of one instruction.
enum Flow {
    Next,
    /// Branch taken with this offset.
    Jump(i16),
    /// Frame finished with this result.
    Exit(Value),
}

/// Program counter after executing the instruction at `pc`.
///
/// A taken branch sets `pc + offset - 1` and the uniform increment follows,
/// so the target is `pc + offset` and offset 0 re-executes the branch.
pub fn next_pc(pc: usize, taken: Option<i16>) -> usize {
    let pc = match taken {
        Some(offset) => pc.wrapping_add_signed(isize::from(offset) - 1),
        None => pc,
    };
    pc.wrapping_add(1)
}

/// Debug-build check that every register operand agrees with the frame's
/// inline/heap classification.
fn check_operand_encodings(frame: &StaticFrame, instr: &Instruction) {
    let roles = instr.opcode.shape().roles();
    let expected = instr.opcode.register_encodings();
    for field in 0..3 {
        if roles[field] != OperandRole::Register {
            continue;
        }
        let register = instr.operands()[field];
        let actual = usize::try_from(register)
            .ok()
            .and_then(|r| frame.encoding(r));
        match (actual, expected[field]) {
            (None, _) => defect!("{instr}: register r{register} outside frame"),
            (Some(actual), Some(expected)) if actual != expected => defect!(
                "{instr}: r{register} is {} but the opcode expects {}",
                actual.name(),
                expected.name()
            ),
            _ => {}
        }
    }
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "json null",
        Json::Bool(_) => "json bool",
        Json::Number(_) => "json number",
        Json::String(_) => "json string",
        Json::Array(_) => "json array",
        Json::Object(_) => "json object",
    }
}

fn char_from(code: i64, at: usize) -> Result<char, RuntimeError> {
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .ok_or(RuntimeError::InvalidCharacter { at, code })
}

fn next_register(r: i16) -> i16 {
    match r.checked_add(1) {
        Some(next) => next,
        None => defect!("register r{r} has no successor"),
    }
}

fn index_in(index: i64, len: usize) -> Option<usize> {
    usize::try_from(index).ok().filter(|&i| i < len)
}

/// Split a struct update path `member(.member)*`.
fn parse_path(path: &str, at: usize) -> Result<Vec<&str>, RuntimeError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty() || s.contains(char::is_whitespace)) {
        return Err(RuntimeError::MalformedUpdatePath {
            at,
            path: path.to_string(),
        });
    }
    Ok(segments)
}

impl<'p> Interpreter<'p> {
    /// Run the current frame from its first instruction until RETURN or STOP.
    ///
    /// Each nested bytecode call adds one `run_frame -> call -> invoke ->
    /// call_frame` chain to the native stack. CALL is dispatched here, never
    /// through `step`, so nested calls do not stack `step` frames.
    pub(crate) fn run_frame(&mut self) -> Result<Value, RuntimeError> {
        let frame = self.stack.frame();
        let code = frame.instructions();
        let mut pc = 0;
        loop {
            let Some(instr) = code.get(pc) else {
                defect!("pc {pc} outside frame of {} instructions", code.len());
            };
            if self.config.trace_instructions {
                self.trace_step(pc, instr);
            }
            if cfg!(debug_assertions) {
                check_operand_encodings(frame, instr);
            }
            let flow = if instr.opcode == Opcode::Call {
                self.call(instr)?;
                Flow::Next
            } else {
                self.step(instr, pc)?
            };
            let taken = match flow {
                Flow::Next => None,
                Flow::Jump(offset) => Some(offset),
                Flow::Exit(value) => return Ok(value),
            };
            pc = next_pc(pc, taken);
        }
    }

    #[inline(never)]
    fn trace_step(&self, pc: usize, instr: &Instruction) {
        trace!(pc, depth = self.depth, %instr, "step");
    }

    #[inline(never)]
    fn step(&mut self, i: &Instruction, at: usize) -> Result<Flow, RuntimeError> {
        use Opcode::*;
        let kind = i.opcode.element_kind();
        match i.opcode {
            Nop => {}

            // Register and global access
            LoadGlobalInline | LoadGlobalHeap => {
                let program = self.program;
                let value = self.stack.global(i.b, &program.globals).clone();
                self.stack.set(i.a, value);
            }
            StoreGlobalInline | StoreGlobalHeap => {
                let program = self.program;
                let value = self.reg(i.b).clone();
                self.stack.set_global(i.a, &program.globals, value);
            }
            CopyRegInline | CopyRegHeap => {
                let value = self.reg(i.b).clone();
                self.stack.set(i.a, value);
            }

            // Member and element lookup
            GetStructMember => {
                let members = self.struct_at(i.b);
                let Some(member) = usize::try_from(i.c).ok().and_then(|m| members.get(m)) else {
                    defect!("member #{} outside struct of {} members", i.c, members.len());
                };
                let value = member.clone();
                self.stack.set(i.a, value);
            }
            LookupElementString => self.lookup_string(i, at)?,
            LookupElementJson => self.lookup_json(i, at)?,
            LookupElementVectorInline | LookupElementVectorHeap => self.lookup_vector(i, kind, at)?,
            LookupElementDictInline | LookupElementDictHeap => self.lookup_dict(i, kind, at)?,
            ExistsDict => {
                let found = self.dict_at(i.b).0.contains_key(self.str_at(i.c));
                self.stack.set(i.a, Value::bool(found));
            }

            // Size
            GetSizeString => {
                let len = self.str_at(i.b).chars().count();
                self.set_len(i.a, len);
            }
            GetSizeJson => self.size_json(i, at)?,
            GetSizeVectorInline | GetSizeVectorHeap => {
                let (items, ty) = self.vector_at(i.b);
                self.element_type(ty, kind);
                let len = items.len();
                self.set_len(i.a, len);
            }
            GetSizeDictInline | GetSizeDictHeap => {
                let (entries, ty) = self.dict_at(i.b);
                self.element_type(ty, kind);
                let len = entries.len();
                self.set_len(i.a, len);
            }

            // Persistent push-back and update
            PushbackString => {
                let ch = char_from(self.int(i.c), at)?;
                let mut text = self.str_at(i.b).to_string();
                text.push(ch);
                self.stack.set(i.a, Value::string(text));
            }
            PushbackVectorInline | PushbackVectorHeap => {
                let (items, ty) = self.vector_at(i.b);
                self.element_type(ty, kind);
                let pushed = items.push_back(self.reg(i.c).payload().clone());
                self.stack.set(i.a, Value::vector(ty, pushed));
            }
            UpdateString => self.update_string(i, at)?,
            UpdateVectorInline | UpdateVectorHeap => self.update_vector(i, kind, at)?,
            UpdateDictInline | UpdateDictHeap => {
                let (entries, ty) = self.dict_at(i.b);
                self.element_type(ty, kind);
                let value = self.reg(next_register(i.c)).payload().clone();
                let updated = entries.insert(self.str_at(i.c), value);
                self.stack.set(i.a, Value::dict(ty, updated));
            }
            UpdateStruct => self.update_struct(i, at)?,
            EraseDict => {
                let (entries, ty) = self.dict_at(i.b);
                let erased = entries.remove(self.str_at(i.c));
                self.stack.set(i.a, Value::dict(ty, erased));
            }

            Call => defect!("CALL reached step at pc {at}"),

            // Arithmetic
            AddBool => {
                let result = self.bool_at(i.b) || self.bool_at(i.c);
                self.stack.set(i.a, Value::bool(result));
            }
            AddInt => self.int_op(i, i64::wrapping_add),
            AddDouble => self.double_op(i, |a, b| a + b),
            ConcatStrings => {
                let joined = [self.str_at(i.b), self.str_at(i.c)].concat();
                self.stack.set(i.a, Value::string(joined));
            }
            ConcatVectorsInline | ConcatVectorsHeap => {
                let (left, ty) = self.vector_at(i.b);
                self.element_type(ty, kind);
                let joined = left.concat(self.vector_at(i.c).0);
                self.stack.set(i.a, Value::vector(ty, joined));
            }
            SubtractDouble => self.double_op(i, |a, b| a - b),
            SubtractInt => self.int_op(i, i64::wrapping_sub),
            MultiplyDouble => self.double_op(i, |a, b| a * b),
            MultiplyInt => self.int_op(i, i64::wrapping_mul),
            DivideDouble => {
                if self.double(i.c) == 0.0 {
                    return Err(RuntimeError::DivisionByZero { at });
                }
                self.double_op(i, |a, b| a / b);
            }
            DivideInt => {
                if self.int(i.c) == 0 {
                    return Err(RuntimeError::DivisionByZero { at });
                }
                self.int_op(i, i64::wrapping_div);
            }
            RemainderInt => {
                if self.int(i.c) == 0 {
                    return Err(RuntimeError::DivisionByZero { at });
                }
                self.int_op(i, i64::wrapping_rem);
            }
            LogicalAndBool | LogicalAndInt | LogicalAndDouble => {
                let result = self.reg(i.b).is_truthy() && self.reg(i.c).is_truthy();
                self.stack.set(i.a, Value::bool(result));
            }
            LogicalOrBool | LogicalOrInt | LogicalOrDouble => {
                let result = self.reg(i.b).is_truthy() || self.reg(i.c).is_truthy();
                self.stack.set(i.a, Value::bool(result));
            }

            // Comparison
            ComparisonSmallerOrEqual => {
                let result = compare_values(self.reg(i.b), self.reg(i.c)).is_le();
                self.stack.set(i.a, Value::bool(result));
            }
            ComparisonSmallerOrEqualInt => {
                let result = self.int(i.b) <= self.int(i.c);
                self.stack.set(i.a, Value::bool(result));
            }
            ComparisonSmaller => {
                let result = compare_values(self.reg(i.b), self.reg(i.c)).is_lt();
                self.stack.set(i.a, Value::bool(result));
            }
            ComparisonSmallerInt => {
                let result = self.int(i.b) < self.int(i.c);
                self.stack.set(i.a, Value::bool(result));
            }
            LogicalEqual => {
                let result = values_equal(self.reg(i.b), self.reg(i.c));
                self.stack.set(i.a, Value::bool(result));
            }
            LogicalEqualInt => {
                let result = self.int(i.b) == self.int(i.c);
                self.stack.set(i.a, Value::bool(result));
            }
            LogicalNonequal => {
                let result = !values_equal(self.reg(i.b), self.reg(i.c));
                self.stack.set(i.a, Value::bool(result));
            }
            LogicalNonequalInt => {
                let result = self.int(i.b) != self.int(i.c);
                self.stack.set(i.a, Value::bool(result));
            }

            // Construction
            New1 => self.new_1(i, at)?,
            NewVectorInline | NewVectorHeap => self.new_vector(i, kind, at)?,
            NewDictInline | NewDictHeap => self.new_dict(i, kind, at)?,
            NewStruct => self.new_struct(i, at)?,

            // Frames and the value stack
            Return => return Ok(Flow::Exit(self.reg(i.a).clone())),
            Stop => return Ok(Flow::Exit(Value::void())),
            PushFramePtr => self.stack.push_linkage(),
            PopFramePtr => self.stack.pop_linkage(),
            PushInline | PushHeap => {
                let value = self.reg(i.a).clone();
                self.stack.push(value)?;
            }
            PushTypeId => {
                let ty = self.type_operand(i.a);
                self.stack.push(convention::type_id_cell(ty))?;
            }
            PopN => self.pop_n(i),

            // Branches
            BranchFalseBool => return Ok(branch(!self.bool_at(i.a), i.b)),
            BranchTrueBool => return Ok(branch(self.bool_at(i.a), i.b)),
            BranchZeroInt => return Ok(branch(self.int(i.a) == 0, i.b)),
            BranchNotZeroInt => return Ok(branch(self.int(i.a) != 0, i.b)),
            BranchSmallerInt => return Ok(branch(self.int(i.a) < self.int(i.b), i.c)),
            BranchSmallerOrEqualInt => return Ok(branch(self.int(i.a) <= self.int(i.b), i.c)),
            BranchAlways => return Ok(Flow::Jump(i.a)),
        }
        Ok(Flow::Next)
    }

    // ---- operand access -------------------------------------------------

    fn reg(&self, r: i16) -> &Value {
        self.stack.reg(r)
    }

    fn operand_defect(&self, r: i16, expected: &str) -> ! {
        let found = self.program.types.name(self.reg(r).ty());
        defect!("r{r} holds {found}, expected {expected}")
    }

    fn int(&self, r: i16) -> i64 {
        match self.reg(r).as_int() {
            Some(n) => n,
            None => self.operand_defect(r, "int"),
        }
    }

    fn double(&self, r: i16) -> f64 {
        match self.reg(r).as_double() {
            Some(d) => d,
            None => self.operand_defect(r, "double"),
        }
    }

    fn bool_at(&self, r: i16) -> bool {
        match self.reg(r).as_bool() {
            Some(b) => b,
            None => self.operand_defect(r, "bool"),
        }
    }

    fn str_at(&self, r: i16) -> &str {
        match self.reg(r).as_str() {
            Some(s) => s,
            None => self.operand_defect(r, "string"),
        }
    }

    fn json_at(&self, r: i16) -> &Json {
        match self.reg(r).as_json() {
            Some(j) => j,
            None => self.operand_defect(r, "json"),
        }
    }

    fn struct_at(&self, r: i16) -> &[Value] {
        match self.reg(r).as_struct() {
            Some(members) => members,
            None => self.operand_defect(r, "struct"),
        }
    }

    fn vector_at(&self, r: i16) -> (&PersistentVector<Payload>, TypeId) {
        let value = self.reg(r);
        match value.as_vector() {
            Some(items) => (items, value.ty()),
            None => self.operand_defect(r, "vector"),
        }
    }

    fn dict_at(&self, r: i16) -> (&PersistentMap<Payload>, TypeId) {
        let value = self.reg(r);
        match value.as_dict() {
            Some(entries) => (entries, value.ty()),
            None => self.operand_defect(r, "dict"),
        }
    }

    /// Element type of `collection`, checked against the opcode's kind.
    fn element_type(&self, collection: TypeId, kind: Option<Encoding>) -> TypeId {
        let types = &self.program.types;
        let Some(element) = types.element_type(collection) else {
            defect!("{} is not a collection type", types.name(collection));
        };
        let encoding = types.encoding(element);
        if kind != Some(encoding) {
            defect!(
                "{:?} element opcode on {} with {} elements",
                kind,
                types.name(collection),
                encoding.name()
            );
        }
        element
    }

    /// Type named by an immediate operand.
    fn type_operand(&self, operand: i16) -> TypeId {
        match TypeId::from_operand(operand) {
            Some(ty) if self.program.types.contains(ty) => ty,
            _ => defect!("immediate #{operand} is not a type id"),
        }
    }

    fn set_len(&mut self, r: i16, len: usize) {
        self.stack.set(r, Value::int(len as i64));
    }

    fn int_op(&mut self, i: &Instruction, op: impl FnOnce(i64, i64) -> i64) {
        let result = op(self.int(i.b), self.int(i.c));
        self.stack.set(i.a, Value::int(result));
    }

    fn double_op(&mut self, i: &Instruction, op: impl FnOnce(f64, f64) -> f64) {
        let result = op(self.double(i.b), self.double(i.c));
        self.stack.set(i.a, Value::double(result));
    }

    // ---- lookup ---------------------------------------------------------

    fn lookup_string(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let text = self.str_at(i.b);
        let index = self.int(i.c);
        let found = usize::try_from(index).ok().and_then(|n| text.chars().nth(n));
        let Some(ch) = found else {
            return Err(RuntimeError::IndexOutOfBounds {
                at,
                index,
                len: text.chars().count(),
            });
        };
        self.stack.set(i.a, Value::int(i64::from(u32::from(ch))));
        Ok(())
    }

    fn lookup_json(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let json = self.json_at(i.b);
        let key = self.reg(i.c);
        let element = match (json, key.as_int(), key.as_str()) {
            (Json::Array(items), Some(index), _) => index_in(index, items.len())
                .map(|n| &items[n])
                .ok_or(RuntimeError::IndexOutOfBounds {
                    at,
                    index,
                    len: items.len(),
                })?,
            (Json::Object(map), _, Some(name)) => {
                map.get(name).ok_or_else(|| RuntimeError::MissingKey {
                    at,
                    key: name.to_string(),
                })?
            }
            (other, index, _) => {
                let expected = if index.is_some() { "json array" } else { "json object" };
                return Err(RuntimeError::TypeMismatch {
                    at,
                    expected: expected.to_string(),
                    found: json_kind(other).to_string(),
                });
            }
        };
        let value = Value::json(element.clone());
        self.stack.set(i.a, value);
        Ok(())
    }

    fn lookup_vector(
        &mut self,
        i: &Instruction,
        kind: Option<Encoding>,
        at: usize,
    ) -> Result<(), RuntimeError> {
        let (items, ty) = self.vector_at(i.b);
        let element = self.element_type(ty, kind);
        let index = self.int(i.c);
        let Some(payload) = index_in(index, items.len()).and_then(|n| items.get(n)) else {
            return Err(RuntimeError::IndexOutOfBounds {
                at,
                index,
                len: items.len(),
            });
        };
        let value = Value::from_payload(element, payload.clone());
        self.stack.set(i.a, value);
        Ok(())
    }

    fn lookup_dict(
        &mut self,
        i: &Instruction,
        kind: Option<Encoding>,
        at: usize,
    ) -> Result<(), RuntimeError> {
        let (entries, ty) = self.dict_at(i.b);
        let element = self.element_type(ty, kind);
        let key = self.str_at(i.c);
        let Some(payload) = entries.get(key) else {
            return Err(RuntimeError::MissingKey {
                at,
                key: key.to_string(),
            });
        };
        let value = Value::from_payload(element, payload.clone());
        self.stack.set(i.a, value);
        Ok(())
    }

    fn size_json(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let len = match self.json_at(i.b) {
            Json::Array(items) => items.len(),
            Json::Object(map) => map.len(),
            Json::String(s) => s.chars().count(),
            other => {
                return Err(RuntimeError::TypeMismatch {
                    at,
                    expected: "json array, object or string".to_string(),
                    found: json_kind(other).to_string(),
                })
            }
        };
        self.set_len(i.a, len);
        Ok(())
    }

    // ---- update ---------------------------------------------------------

    fn update_string(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let index = self.int(i.c);
        let ch = char_from(self.int(next_register(i.c)), at)?;
        let mut chars: Vec<char> = self.str_at(i.b).chars().collect();
        let Some(n) = index_in(index, chars.len()) else {
            return Err(RuntimeError::IndexOutOfBounds {
                at,
                index,
                len: chars.len(),
            });
        };
        chars[n] = ch;
        self.stack.set(i.a, Value::string(chars.into_iter().collect::<String>()));
        Ok(())
    }

    fn update_vector(
        &mut self,
        i: &Instruction,
        kind: Option<Encoding>,
        at: usize,
    ) -> Result<(), RuntimeError> {
        let (items, ty) = self.vector_at(i.b);
        self.element_type(ty, kind);
        let index = self.int(i.c);
        let payload = self.reg(next_register(i.c)).payload().clone();
        let Some(updated) = index_in(index, items.len()).and_then(|n| items.set(n, payload)) else {
            return Err(RuntimeError::IndexOutOfBounds {
                at,
                index,
                len: items.len(),
            });
        };
        self.stack.set(i.a, Value::vector(ty, updated));
        Ok(())
    }

    fn update_struct(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let path = self.str_at(i.c);
        let segments = parse_path(path, at)?;
        let value = self.reg(next_register(i.c)).clone();
        let updated = self.replace_member(self.reg(i.b), &segments, value, at)?;
        self.stack.set(i.a, updated);
        Ok(())
    }

    /// Copy of `target` with the member at `path` replaced. Only the
    /// structs along the path are rebuilt; other members are shared.
    fn replace_member(
        &self,
        target: &Value,
        path: &[&str],
        value: Value,
        at: usize,
    ) -> Result<Value, RuntimeError> {
        let types = &self.program.types;
        let (Some(def), Some(members)) = (types.struct_def(target.ty()), target.as_struct()) else {
            return Err(RuntimeError::TypeMismatch {
                at,
                expected: "struct".to_string(),
                found: types.name(target.ty()),
            });
        };
        let Some((first, rest)) = path.split_first() else {
            defect!("empty update path");
        };
        let index = def
            .member_index(first)
            .ok_or_else(|| RuntimeError::UnknownMember {
                at,
                member: first.to_string(),
            })?;
        let replacement = if rest.is_empty() {
            let declared = def.members[index].ty;
            if value.ty() != declared {
                return Err(RuntimeError::TypeMismatch {
                    at,
                    expected: types.name(declared),
                    found: types.name(value.ty()),
                });
            }
            value
        } else {
            self.replace_member(&members[index], rest, value, at)?
        };
        let mut members = members.to_vec();
        members[index] = replacement;
        Ok(Value::new_struct(target.ty(), members))
    }

    // ---- calls ----------------------------------------------------------

    fn call(&mut self, i: &Instruction) -> Result<(), RuntimeError> {
        let program = self.program;
        let callee = self.reg(i.b);
        let Some(id) = callee.as_function() else {
            return Err(RuntimeError::UnlinkedFunction {
                name: format!("<unset {}>", program.types.name(callee.ty())),
            });
        };
        let Some(signature) = program.signature(id) else {
            defect!("CALL of function #{} without a signature", id.0);
        };
        if usize::try_from(i.c).ok() != Some(signature.params.len()) {
            defect!(
                "CALL declares {} arguments, signature has {}",
                i.c,
                signature.params.len()
            );
        }
        let result = self.invoke(id)?;
        if signature.ret != TypeId::VOID {
            self.stack.set(i.a, result);
        }
        Ok(())
    }

    // ---- construction ---------------------------------------------------

    fn new_1(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let types = &self.program.types;
        let target = self.type_operand(i.c);
        let source = self.reg(i.b);
        let converted = if source.ty() == target {
            source.clone()
        } else {
            match (types.desc(target), source.payload(), source.as_json()) {
                (TypeDesc::Json, _, _) => Value::json(value_to_json(types, source)),
                (TypeDesc::Double, Payload::Int(n), _) => Value::double(*n as f64),
                (TypeDesc::Int, Payload::Double(d), _) => Value::int(*d as i64),
                (TypeDesc::String, _, Some(Json::String(s))) => Value::string(s.clone()),
                (TypeDesc::TypeId, _, _) => Value::type_id(source.ty()),
                _ => {
                    return Err(RuntimeError::TypeMismatch {
                        at,
                        expected: types.name(target),
                        found: types.name(source.ty()),
                    })
                }
            }
        };
        self.stack.set(i.a, converted);
        Ok(())
    }

    fn count_operand(&self, operand: i16) -> usize {
        match usize::try_from(operand) {
            Ok(n) => n,
            Err(_) => defect!("negative count #{operand}"),
        }
    }

    fn check_type(&self, value: &Value, expected: TypeId, at: usize) -> Result<(), RuntimeError> {
        if value.ty() == expected {
            return Ok(());
        }
        let types = &self.program.types;
        Err(RuntimeError::TypeMismatch {
            at,
            expected: types.name(expected),
            found: types.name(value.ty()),
        })
    }

    fn new_vector(
        &mut self,
        i: &Instruction,
        kind: Option<Encoding>,
        at: usize,
    ) -> Result<(), RuntimeError> {
        let ty = self.type_operand(i.b);
        let element = self.element_type(ty, kind);
        let args = self.stack.top(self.count_operand(i.c));
        let mut items = PersistentVector::new();
        for arg in args {
            self.check_type(arg, element, at)?;
            items = items.push_back(arg.payload().clone());
        }
        self.stack.set(i.a, Value::vector(ty, items));
        Ok(())
    }

    fn new_dict(
        &mut self,
        i: &Instruction,
        kind: Option<Encoding>,
        at: usize,
    ) -> Result<(), RuntimeError> {
        let ty = self.type_operand(i.b);
        let element = self.element_type(ty, kind);
        let args = self.stack.top(2 * self.count_operand(i.c));
        let mut entries = PersistentMap::new();
        for pair in args.chunks_exact(2) {
            self.check_type(&pair[0], TypeId::STRING, at)?;
            self.check_type(&pair[1], element, at)?;
            let Some(key) = pair[0].as_str() else {
                defect!("string-typed dictionary key without string payload");
            };
            entries = entries.insert(key, pair[1].payload().clone());
        }
        self.stack.set(i.a, Value::dict(ty, entries));
        Ok(())
    }

    fn new_struct(&mut self, i: &Instruction, at: usize) -> Result<(), RuntimeError> {
        let ty = self.type_operand(i.b);
        let Some(def) = self.program.types.struct_def(ty) else {
            defect!("NEW_STRUCT of non-struct type {ty}");
        };
        let count = self.count_operand(i.c);
        if count != def.members.len() {
            defect!(
                "NEW_STRUCT with {count} values for {} members",
                def.members.len()
            );
        }
        let args = self.stack.top(count);
        for (arg, member) in args.iter().zip(&def.members) {
            self.check_type(arg, member.ty, at)?;
        }
        let value = Value::new_struct(ty, args.to_vec());
        self.stack.set(i.a, value);
        Ok(())
    }

    // ---- stack ----------------------------------------------------------

    /// POPN: the bitmap marks, from the top of the stack down, which popped
    /// cells hold heap values.
    fn pop_n(&mut self, i: &Instruction) {
        let count = self.count_operand(i.a);
        if count > MAX_POPN {
            defect!("POPN count {count} exceeds {MAX_POPN}");
        }
        let bitmap = u32::from(i.b as u16) | (u32::from(i.c as u16) << 16);
        for bit in 0..count {
            let value = self.stack.pop();
            let marked_heap = (bitmap >> bit) & 1 == 1;
            if marked_heap != (value.encoding() == Encoding::Heap) {
                defect!(
                    "POPN bit {bit} says {} but cell holds a {} value",
                    if marked_heap { "heap" } else { "inline" },
                    value.encoding().name()
                );
            }
        }
    }
}

fn branch(taken: bool, offset: i16) -> Flow {
    if taken {
        Flow::Jump(offset)
    } else {
        Flow::Next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untaken_and_plain_instructions_advance_by_one() {
        assert_eq!(next_pc(0, None), 1);
        assert_eq!(next_pc(41, None), 42);
    }

    #[test]
    fn branch_offset_is_relative_to_the_branch() {
        assert_eq!(next_pc(10, Some(3)), 13);
        assert_eq!(next_pc(10, Some(-4)), 6);
        assert_eq!(next_pc(10, Some(1)), 11);
    }

    #[test]
    fn zero_offset_reexecutes_the_branch() {
        let mut pc = 7;
        for _ in 0..1000 {
            pc = next_pc(pc, Some(0));
        }
        assert_eq!(pc, 7);
        assert_eq!(next_pc(0, Some(0)), 0);
    }

    #[test]
    fn update_paths() {
        assert_eq!(parse_path("a", 0).unwrap(), vec!["a"]);
        assert_eq!(parse_path("a.b.c", 0).unwrap(), vec!["a", "b", "c"]);
        for bad in ["", ".a", "a.", "a..b", "a b"] {
            assert!(matches!(
                parse_path(bad, 3),
                Err(RuntimeError::MalformedUpdatePath { at: 3, .. })
            ));
        }
    }

    #[test]
    fn character_codes() {
        assert_eq!(char_from(65, 0), Ok('A'));
        assert!(char_from(0xD800, 0).is_err());
        assert!(char_from(-1, 0).is_err());
    }
}
