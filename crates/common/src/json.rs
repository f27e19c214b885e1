//! Conversion of runtime values into generic JSON trees.
//!
//! Used by introspection dumps and by the `NEW_1` conversion to `json`.

use serde_json::{Map, Number, Value as Json};

use crate::types::{TypeDesc, TypeId, TypeTable};
use crate::value::{HeapBlock, Payload, Value};

/// Render `value` as JSON. Structs become objects keyed by member name.
pub fn value_to_json(types: &TypeTable, value: &Value) -> Json {
    payload_to_json(types, value.ty(), value.payload())
}

fn payload_to_json(types: &TypeTable, ty: TypeId, payload: &Payload) -> Json {
    match payload {
        Payload::Undefined => Json::Null,
        Payload::Bool(b) => Json::Bool(*b),
        Payload::Int(i) => Json::from(*i),
        Payload::Double(d) => Number::from_f64(*d).map_or(Json::Null, Json::Number),
        Payload::Function(id) => Json::String(format!("<function {}>", id.0)),
        Payload::Handle(_) => heap_to_json(types, ty, payload),
    }
}

fn heap_to_json(types: &TypeTable, ty: TypeId, payload: &Payload) -> Json {
    let Some(block) = payload.as_heap() else {
        return Json::Null;
    };
    match block {
        HeapBlock::String(s) => Json::String(s.clone()),
        HeapBlock::Json(j) => j.clone(),
        HeapBlock::TypeId(t) => Json::String(types.name(*t)),
        HeapBlock::Struct(members) => {
            let mut object = Map::new();
            match types.get(ty) {
                Some(TypeDesc::Struct(def)) => {
                    for (member, value) in def.members.iter().zip(members) {
                        object.insert(member.name.clone(), value_to_json(types, value));
                    }
                }
                _ => {
                    for (i, value) in members.iter().enumerate() {
                        object.insert(i.to_string(), value_to_json(types, value));
                    }
                }
            }
            Json::Object(object)
        }
        HeapBlock::Vector(items) => {
            let element = types.element_type(ty).unwrap_or(TypeId::UNDEFINED);
            Json::Array(
                items
                    .iter()
                    .map(|p| payload_to_json(types, element, p))
                    .collect(),
            )
        }
        HeapBlock::Dict(entries) => {
            let element = types.element_type(ty).unwrap_or(TypeId::UNDEFINED);
            Json::Object(
                entries
                    .iter()
                    .map(|(k, p)| (k.to_string(), payload_to_json(types, element, p)))
                    .collect(),
            )
        }
    }
}
