//! Type descriptors and the program type table.
//!
//! Every runtime value carries a [`TypeId`] into the program's [`TypeTable`].
//! Whether a type is stored inline in a register or behind a reference-counted
//! heap block is a pure function of the type, see [`TypeTable::encoding`].

use std::collections::HashMap;
use std::fmt;

use crate::error::DecodeError;

/// Byte-level discriminator of a type descriptor.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    /// No value / not yet known.
    Undefined = 0x00,
    /// Catch-all dynamic type. Only valid as a host parameter type.
    Any = 0x01,
    /// Return type of functions without a result.
    Void = 0x02,
    Bool = 0x03,
    Int = 0x04,
    Double = 0x05,
    String = 0x06,
    Json = 0x07,
    /// A type descriptor used as a value.
    TypeId = 0x08,
    Struct = 0x09,
    Vector = 0x0A,
    Dict = 0x0B,
    Function = 0x0C,
}

/// All base types, in definition order.
pub const ALL_BASE_TYPES: [BaseType; 13] = [
    BaseType::Undefined,
    BaseType::Any,
    BaseType::Void,
    BaseType::Bool,
    BaseType::Int,
    BaseType::Double,
    BaseType::String,
    BaseType::Json,
    BaseType::TypeId,
    BaseType::Struct,
    BaseType::Vector,
    BaseType::Dict,
    BaseType::Function,
];

impl TryFrom<u8> for BaseType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ALL_BASE_TYPES
            .get(value as usize)
            .copied()
            .ok_or(DecodeError::ReservedBaseType(value))
    }
}

impl BaseType {
    /// Returns the canonical lower-case name of this base type.
    pub fn name(&self) -> &'static str {
        match self {
            BaseType::Undefined => "undefined",
            BaseType::Any => "any",
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::Double => "double",
            BaseType::String => "string",
            BaseType::Json => "json",
            BaseType::TypeId => "typeid",
            BaseType::Struct => "struct",
            BaseType::Vector => "vector",
            BaseType::Dict => "dict",
            BaseType::Function => "function",
        }
    }

    /// Returns true for scalar types that fit the inline payload.
    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            BaseType::Undefined
                | BaseType::Void
                | BaseType::Bool
                | BaseType::Int
                | BaseType::Double
                | BaseType::Function
        )
    }
}

/// How a value of some type is held in a register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Full representation fits the payload, copies are bitwise.
    Inline,
    /// Payload is a handle to a reference-counted heap block.
    Heap,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Inline => "inline",
            Encoding::Heap => "heap",
        }
    }
}

/// Index of a type in the program's [`TypeTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u16);

impl TypeId {
    pub const UNDEFINED: TypeId = TypeId(0);
    pub const ANY: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    pub const BOOL: TypeId = TypeId(3);
    pub const INT: TypeId = TypeId(4);
    pub const DOUBLE: TypeId = TypeId(5);
    pub const STRING: TypeId = TypeId(6);
    pub const JSON: TypeId = TypeId(7);
    pub const TYPEID: TypeId = TypeId(8);

    /// Returns the index as an instruction immediate.
    pub fn as_operand(self) -> i16 {
        self.0 as i16
    }

    /// Interprets an instruction immediate as a type id.
    pub fn from_operand(operand: i16) -> Option<TypeId> {
        u16::try_from(operand).ok().map(TypeId)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One named member of a struct type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: String,
    pub ty: TypeId,
}

impl Member {
    pub fn new(name: impl Into<String>, ty: TypeId) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Struct type: a name and ordered members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<Member>,
}

impl StructDef {
    /// Returns the position of the member called `name`.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

/// Resolved signature of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub ret: TypeId,
    pub params: Vec<TypeId>,
}

impl FunctionType {
    /// Returns true if any parameter is the dynamic catch-all type.
    pub fn has_dynamic_params(&self) -> bool {
        self.params.contains(&TypeId::ANY)
    }
}

/// A fully resolved type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Undefined,
    Any,
    Void,
    Bool,
    Int,
    Double,
    String,
    Json,
    TypeId,
    Struct(StructDef),
    /// Vector with the given element type.
    Vector(TypeId),
    /// Dictionary from string keys to the given value type.
    Dict(TypeId),
    Function(FunctionType),
}

impl TypeDesc {
    pub fn base(&self) -> BaseType {
        match self {
            TypeDesc::Undefined => BaseType::Undefined,
            TypeDesc::Any => BaseType::Any,
            TypeDesc::Void => BaseType::Void,
            TypeDesc::Bool => BaseType::Bool,
            TypeDesc::Int => BaseType::Int,
            TypeDesc::Double => BaseType::Double,
            TypeDesc::String => BaseType::String,
            TypeDesc::Json => BaseType::Json,
            TypeDesc::TypeId => BaseType::TypeId,
            TypeDesc::Struct(_) => BaseType::Struct,
            TypeDesc::Vector(_) => BaseType::Vector,
            TypeDesc::Dict(_) => BaseType::Dict,
            TypeDesc::Function(_) => BaseType::Function,
        }
    }
}

/// The program's type table. Entries are immutable once interned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTable {
    types: Vec<TypeDesc>,
    index: HashMap<TypeDesc, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    /// Create a table holding the reserved built-in types.
    pub fn new() -> Self {
        let types = vec![
                TypeDesc::Undefined,
                TypeDesc::Any,
                TypeDesc::Void,
                TypeDesc::Bool,
                TypeDesc::Int,
                TypeDesc::Double,
                TypeDesc::String,
                TypeDesc::Json,
                TypeDesc::TypeId,
        ];
        let index = types
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), TypeId(i as u16)))
            .collect();
        Self { types, index }
    }

    /// Return the id of `desc`, adding it if it is not in the table yet.
    ///
    /// # Panics
    ///
    /// Panics if the table already holds `u16::MAX + 1` entries.
    pub fn intern(&mut self, desc: TypeDesc) -> TypeId {
        if let Some(id) = self.index.get(&desc) {
            return *id;
        }
        let id = match u16::try_from(self.types.len()) {
            Ok(index) => TypeId(index),
            Err(_) => panic!("VM defect: type table full at {} entries", self.types.len()),
        };
        self.types.push(desc.clone());
        self.index.insert(desc, id);
        id
    }

    pub fn vector_of(&mut self, element: TypeId) -> TypeId {
        self.intern(TypeDesc::Vector(element))
    }

    pub fn dict_of(&mut self, value: TypeId) -> TypeId {
        self.intern(TypeDesc::Dict(value))
    }

    pub fn struct_of(&mut self, name: impl Into<String>, members: Vec<Member>) -> TypeId {
        self.intern(TypeDesc::Struct(StructDef {
            name: name.into(),
            members,
        }))
    }

    pub fn function_of(&mut self, ret: TypeId, params: Vec<TypeId>) -> TypeId {
        self.intern(TypeDesc::Function(FunctionType { ret, params }))
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDesc> {
        self.types.get(id.0 as usize)
    }

    pub fn contains(&self, id: TypeId) -> bool {
        (id.0 as usize) < self.types.len()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDesc)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u16), t))
    }

    /// Looks up a type the caller already knows is valid.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in the table; programs are validated before
    /// their type ids reach this point.
    pub fn desc(&self, id: TypeId) -> &TypeDesc {
        match self.get(id) {
            Some(desc) => desc,
            None => panic!("VM defect: type id {id} not in type table"),
        }
    }

    pub fn base(&self, id: TypeId) -> BaseType {
        self.desc(id).base()
    }

    /// Returns how values of this type are held in registers.
    pub fn encoding(&self, id: TypeId) -> Encoding {
        if self.base(id).is_inline() {
            Encoding::Inline
        } else {
            Encoding::Heap
        }
    }

    /// Element type of a vector, or value type of a dictionary.
    pub fn element_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id)? {
            TypeDesc::Vector(element) | TypeDesc::Dict(element) => Some(*element),
            _ => None,
        }
    }

    pub fn struct_def(&self, id: TypeId) -> Option<&StructDef> {
        match self.get(id)? {
            TypeDesc::Struct(def) => Some(def),
            _ => None,
        }
    }

    pub fn function_type(&self, id: TypeId) -> Option<&FunctionType> {
        match self.get(id)? {
            TypeDesc::Function(sig) => Some(sig),
            _ => None,
        }
    }

    /// Renders a type for dumps and error messages, e.g. `[string:int]`.
    pub fn name(&self, id: TypeId) -> String {
        let Some(desc) = self.get(id) else {
            return format!("<invalid {id}>");
        };
        match desc {
            TypeDesc::Struct(def) => format!("struct {}", def.name),
            TypeDesc::Vector(element) => format!("[{}]", self.name(*element)),
            TypeDesc::Dict(value) => format!("[string:{}]", self.name(*value)),
            TypeDesc::Function(sig) => {
                let params: Vec<String> = sig.params.iter().map(|p| self.name(*p)).collect();
                format!("func {}({})", self.name(sig.ret), params.join(", "))
            }
            other => other.base().name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_match_table() {
        let types = TypeTable::new();
        assert_eq!(types.base(TypeId::UNDEFINED), BaseType::Undefined);
        assert_eq!(types.base(TypeId::ANY), BaseType::Any);
        assert_eq!(types.base(TypeId::VOID), BaseType::Void);
        assert_eq!(types.base(TypeId::BOOL), BaseType::Bool);
        assert_eq!(types.base(TypeId::INT), BaseType::Int);
        assert_eq!(types.base(TypeId::DOUBLE), BaseType::Double);
        assert_eq!(types.base(TypeId::STRING), BaseType::String);
        assert_eq!(types.base(TypeId::JSON), BaseType::Json);
        assert_eq!(types.base(TypeId::TYPEID), BaseType::TypeId);
    }

    #[test]
    fn base_type_byte_roundtrip() {
        for &base in &ALL_BASE_TYPES {
            assert_eq!(BaseType::try_from(base as u8), Ok(base));
        }
        assert_eq!(
            BaseType::try_from(0x0D),
            Err(DecodeError::ReservedBaseType(0x0D))
        );
    }

    #[test]
    fn intern_deduplicates() {
        let mut types = TypeTable::new();
        let a = types.vector_of(TypeId::INT);
        let b = types.vector_of(TypeId::INT);
        let c = types.vector_of(TypeId::STRING);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    fn fill_to_capacity(types: &mut TypeTable) -> TypeId {
        let mut last = TypeId::INT;
        while types.len() <= usize::from(u16::MAX) {
            last = types.vector_of(last);
        }
        last
    }

    #[test]
    fn last_id_is_u16_max() {
        let mut types = TypeTable::new();
        let last = fill_to_capacity(&mut types);
        assert_eq!(last, TypeId(u16::MAX));
        assert_eq!(types.vector_of(TypeId::INT), TypeId(9));
    }

    #[test]
    #[should_panic(expected = "VM defect: type table full")]
    fn full_table_does_not_wrap() {
        let mut types = TypeTable::new();
        let last = fill_to_capacity(&mut types);
        types.vector_of(last);
    }

    #[test]
    fn encoding_is_a_function_of_type() {
        let mut types = TypeTable::new();
        let ints = types.vector_of(TypeId::INT);
        let point = types.struct_of("point", vec![Member::new("x", TypeId::INT)]);
        let f = types.function_of(TypeId::INT, vec![TypeId::INT]);

        assert_eq!(types.encoding(TypeId::BOOL), Encoding::Inline);
        assert_eq!(types.encoding(TypeId::INT), Encoding::Inline);
        assert_eq!(types.encoding(TypeId::DOUBLE), Encoding::Inline);
        assert_eq!(types.encoding(f), Encoding::Inline);
        assert_eq!(types.encoding(TypeId::STRING), Encoding::Heap);
        assert_eq!(types.encoding(TypeId::JSON), Encoding::Heap);
        assert_eq!(types.encoding(TypeId::TYPEID), Encoding::Heap);
        assert_eq!(types.encoding(ints), Encoding::Heap);
        assert_eq!(types.encoding(point), Encoding::Heap);
    }

    #[test]
    fn names() {
        let mut types = TypeTable::new();
        let ints = types.vector_of(TypeId::INT);
        let dict = types.dict_of(ints);
        let f = types.function_of(TypeId::VOID, vec![TypeId::ANY, TypeId::STRING]);
        assert_eq!(types.name(ints), "[int]");
        assert_eq!(types.name(dict), "[string:[int]]");
        assert_eq!(types.name(f), "func void(any, string)");
        assert_eq!(types.name(TypeId(999)), "<invalid #999>");
    }

    #[test]
    fn member_lookup() {
        let def = StructDef {
            name: "pixel".into(),
            members: vec![
                Member::new("red", TypeId::INT),
                Member::new("green", TypeId::INT),
            ],
        };
        assert_eq!(def.member_index("green"), Some(1));
        assert_eq!(def.member_index("blue"), None);
    }
}
