//! Runtime value representation for the Tessera VM.
//!
//! A [`Value`] is a type id plus a [`Payload`]. Inline payloads are plain
//! scalars. Heap payloads are an [`Rc`] handle to a [`HeapBlock`]: cloning a
//! value bumps the block's count, dropping it releases one reference, and the
//! block (with every child it owns) is freed when the last handle goes.

use std::rc::{Rc, Weak};

use crate::persistent::{PersistentMap, PersistentVector};
use crate::program::FunctionId;
use crate::types::{Encoding, TypeDesc, TypeId, TypeTable};

/// Shared handle to a heap block.
pub type HeapRef = Rc<HeapBlock>;

/// The 8-byte register payload.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Placeholder for undefined/void and unset function slots.
    Undefined,
    Bool(bool),
    Int(i64),
    Double(f64),
    Function(FunctionId),
    Handle(HeapRef),
}

// Doubles compare by bit pattern so Payload stays reflexive. Ordering and
// language-level equality go through `compare`, not this impl.
impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Payload::Undefined, Payload::Undefined) => true,
            (Payload::Bool(a), Payload::Bool(b)) => a == b,
            (Payload::Int(a), Payload::Int(b)) => a == b,
            (Payload::Double(a), Payload::Double(b)) => a.to_bits() == b.to_bits(),
            (Payload::Function(a), Payload::Function(b)) => a == b,
            (Payload::Handle(a), Payload::Handle(b)) => Rc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Payload {
    pub fn encoding(&self) -> Encoding {
        match self {
            Payload::Handle(_) => Encoding::Heap,
            _ => Encoding::Inline,
        }
    }

    pub fn as_heap(&self) -> Option<&HeapBlock> {
        match self {
            Payload::Handle(block) => Some(&**block),
            _ => None,
        }
    }
}

/// Heap-allocated payload of a non-scalar value.
///
/// Collections hold bare payloads; the element type comes from the
/// collection's own type.
#[derive(Debug, PartialEq)]
pub enum HeapBlock {
    String(String),
    Json(serde_json::Value),
    TypeId(TypeId),
    Struct(Vec<Value>),
    Vector(PersistentVector<Payload>),
    Dict(PersistentMap<Payload>),
}

impl HeapBlock {
    pub fn kind(&self) -> &'static str {
        match self {
            HeapBlock::String(_) => "string",
            HeapBlock::Json(_) => "json",
            HeapBlock::TypeId(_) => "typeid",
            HeapBlock::Struct(_) => "struct",
            HeapBlock::Vector(_) => "vector",
            HeapBlock::Dict(_) => "dict",
        }
    }
}

/// A typed runtime value. The type never changes after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    ty: TypeId,
    payload: Payload,
}

impl Value {
    pub fn from_payload(ty: TypeId, payload: Payload) -> Self {
        Self { ty, payload }
    }

    pub fn heap(ty: TypeId, block: HeapBlock) -> Self {
        Self::from_payload(ty, Payload::Handle(Rc::new(block)))
    }

    pub fn undefined() -> Self {
        Self::from_payload(TypeId::UNDEFINED, Payload::Undefined)
    }

    pub fn void() -> Self {
        Self::from_payload(TypeId::VOID, Payload::Undefined)
    }

    pub fn bool(b: bool) -> Self {
        Self::from_payload(TypeId::BOOL, Payload::Bool(b))
    }

    pub fn int(i: i64) -> Self {
        Self::from_payload(TypeId::INT, Payload::Int(i))
    }

    pub fn double(d: f64) -> Self {
        Self::from_payload(TypeId::DOUBLE, Payload::Double(d))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::heap(TypeId::STRING, HeapBlock::String(s.into()))
    }

    pub fn json(j: serde_json::Value) -> Self {
        Self::heap(TypeId::JSON, HeapBlock::Json(j))
    }

    pub fn type_id(t: TypeId) -> Self {
        Self::heap(TypeId::TYPEID, HeapBlock::TypeId(t))
    }

    /// Function value of signature type `ty`.
    pub fn function(ty: TypeId, id: FunctionId) -> Self {
        Self::from_payload(ty, Payload::Function(id))
    }

    pub fn new_struct(ty: TypeId, members: Vec<Value>) -> Self {
        Self::heap(ty, HeapBlock::Struct(members))
    }

    pub fn vector(ty: TypeId, elements: PersistentVector<Payload>) -> Self {
        Self::heap(ty, HeapBlock::Vector(elements))
    }

    pub fn dict(ty: TypeId, entries: PersistentMap<Payload>) -> Self {
        Self::heap(ty, HeapBlock::Dict(entries))
    }

    /// Placeholder value for a register of type `ty` that has not been
    /// written yet.
    pub fn default_of(types: &TypeTable, ty: TypeId) -> Self {
        match types.desc(ty) {
            TypeDesc::Undefined | TypeDesc::Any | TypeDesc::Void | TypeDesc::Function(_) => {
                Self::from_payload(ty, Payload::Undefined)
            }
            TypeDesc::Bool => Self::bool(false),
            TypeDesc::Int => Self::int(0),
            TypeDesc::Double => Self::double(0.0),
            TypeDesc::String => Self::string(""),
            TypeDesc::Json => Self::json(serde_json::Value::Null),
            TypeDesc::TypeId => Self::type_id(TypeId::UNDEFINED),
            TypeDesc::Struct(def) => {
                let members = def
                    .members
                    .iter()
                    .map(|m| Self::default_of(types, m.ty))
                    .collect();
                Self::new_struct(ty, members)
            }
            TypeDesc::Vector(_) => Self::vector(ty, PersistentVector::new()),
            TypeDesc::Dict(_) => Self::dict(ty, PersistentMap::new()),
        }
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn encoding(&self) -> Encoding {
        self.payload.encoding()
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.payload {
            Payload::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.payload {
            Payload::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self.payload {
            Payload::Double(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionId> {
        match self.payload {
            Payload::Function(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_heap(&self) -> Option<&HeapBlock> {
        self.payload.as_heap()
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.as_heap()? {
            HeapBlock::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self.as_heap()? {
            HeapBlock::Json(j) => Some(j),
            _ => None,
        }
    }

    pub fn as_type_id(&self) -> Option<TypeId> {
        match self.as_heap()? {
            HeapBlock::TypeId(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&[Value]> {
        match self.as_heap()? {
            HeapBlock::Struct(members) => Some(members.as_slice()),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&PersistentVector<Payload>> {
        match self.as_heap()? {
            HeapBlock::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PersistentMap<Payload>> {
        match self.as_heap()? {
            HeapBlock::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Truthiness used by the logical opcodes.
    pub fn is_truthy(&self) -> bool {
        match self.payload {
            Payload::Bool(b) => b,
            Payload::Int(i) => i != 0,
            Payload::Double(d) => d != 0.0,
            Payload::Function(_) | Payload::Handle(_) => true,
            Payload::Undefined => false,
        }
    }

    /// Number of live handles to this value's heap block, or `None` for
    /// inline values.
    pub fn ref_count(&self) -> Option<usize> {
        match &self.payload {
            Payload::Handle(block) => Some(Rc::strong_count(block)),
            _ => None,
        }
    }

    /// Weak reference to the heap block, for observing deallocation.
    pub fn downgrade(&self) -> Option<Weak<HeapBlock>> {
        match &self.payload {
            Payload::Handle(block) => Some(Rc::downgrade(block)),
            _ => None,
        }
    }

    /// Returns true if both values hold the same heap block.
    pub fn shares_block_with(&self, other: &Value) -> bool {
        match (&self.payload, &other.payload) {
            (Payload::Handle(a), Payload::Handle(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}
