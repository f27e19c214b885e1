//! Deep comparison of runtime values.
//!
//! One recursive ordering serves both the comparison opcodes and equality:
//! two values are equal iff [`compare_values`] returns `Equal`, whether or
//! not they share a heap block.
//!
//! Sequences (strings, vectors, dictionaries, JSON arrays and objects)
//! compare element-wise; when one is a prefix of the other the shorter one
//! sorts first. Unordered doubles (NaN) compare equal.

use std::cmp::Ordering;

use crate::value::{HeapBlock, Payload, Value};

pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    compare_payloads(a.payload(), b.payload())
}

pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Payloads are self-describing at this level: heap blocks carry their own
/// variant, collection elements share one type.
pub fn compare_payloads(a: &Payload, b: &Payload) -> Ordering {
    match (a, b) {
        (Payload::Undefined, Payload::Undefined) => Ordering::Equal,
        (Payload::Bool(x), Payload::Bool(y)) => x.cmp(y),
        (Payload::Int(x), Payload::Int(y)) => x.cmp(y),
        (Payload::Double(x), Payload::Double(y)) => compare_doubles(*x, *y),
        (Payload::Function(x), Payload::Function(y)) => x.cmp(y),
        (Payload::Handle(x), Payload::Handle(y)) => {
            if std::rc::Rc::ptr_eq(x, y) {
                Ordering::Equal
            } else {
                compare_blocks(x, y)
            }
        }
        _ => payload_rank(a).cmp(&payload_rank(b)),
    }
}

fn compare_doubles(x: f64, y: f64) -> Ordering {
    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
}

fn payload_rank(p: &Payload) -> u8 {
    match p {
        Payload::Undefined => 0,
        Payload::Bool(_) => 1,
        Payload::Int(_) => 2,
        Payload::Double(_) => 3,
        Payload::Function(_) => 4,
        Payload::Handle(_) => 5,
    }
}

fn compare_blocks(a: &HeapBlock, b: &HeapBlock) -> Ordering {
    match (a, b) {
        (HeapBlock::String(x), HeapBlock::String(y)) => x.cmp(y),
        (HeapBlock::Json(x), HeapBlock::Json(y)) => compare_json(x, y),
        (HeapBlock::TypeId(x), HeapBlock::TypeId(y)) => x.cmp(y),
        (HeapBlock::Struct(x), HeapBlock::Struct(y)) => {
            compare_sequences(x.iter().zip(y.iter()), x.len(), y.len(), |(m, n)| {
                compare_values(m, n)
            })
        }
        (HeapBlock::Vector(x), HeapBlock::Vector(y)) => {
            compare_sequences(x.iter().zip(y.iter()), x.len(), y.len(), |(m, n)| {
                compare_payloads(m, n)
            })
        }
        (HeapBlock::Dict(x), HeapBlock::Dict(y)) => compare_sequences(
            x.iter().zip(y.iter()),
            x.len(),
            y.len(),
            |((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_payloads(va, vb)),
        ),
        _ => block_rank(a).cmp(&block_rank(b)),
    }
}

fn block_rank(b: &HeapBlock) -> u8 {
    match b {
        HeapBlock::String(_) => 0,
        HeapBlock::Json(_) => 1,
        HeapBlock::TypeId(_) => 2,
        HeapBlock::Struct(_) => 3,
        HeapBlock::Vector(_) => 4,
        HeapBlock::Dict(_) => 5,
    }
}

/// First non-equal pair decides; otherwise the shorter sequence is smaller.
fn compare_sequences<I, F>(pairs: I, len_a: usize, len_b: usize, mut cmp: F) -> Ordering
where
    I: Iterator,
    F: FnMut(I::Item) -> Ordering,
{
    for pair in pairs {
        let ord = cmp(pair);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    len_a.cmp(&len_b)
}

fn json_rank(v: &serde_json::Value) -> u8 {
    use serde_json::Value as J;
    match v {
        J::Null => 0,
        J::Bool(_) => 1,
        J::Number(_) => 2,
        J::String(_) => 3,
        J::Array(_) => 4,
        J::Object(_) => 5,
    }
}

/// JSON orders by kind (null < bool < number < string < array < object),
/// then by content.
pub fn compare_json(a: &serde_json::Value, b: &serde_json::Value) -> Ordering {
    use serde_json::Value as J;
    match (a, b) {
        (J::Null, J::Null) => Ordering::Equal,
        (J::Bool(x), J::Bool(y)) => x.cmp(y),
        (J::Number(x), J::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i.cmp(&j),
            _ => compare_doubles(
                x.as_f64().unwrap_or(f64::NAN),
                y.as_f64().unwrap_or(f64::NAN),
            ),
        },
        (J::String(x), J::String(y)) => x.cmp(y),
        (J::Array(x), J::Array(y)) => {
            compare_sequences(x.iter().zip(y.iter()), x.len(), y.len(), |(m, n)| {
                compare_json(m, n)
            })
        }
        (J::Object(x), J::Object(y)) => compare_sequences(
            x.iter().zip(y.iter()),
            x.len(),
            y.len(),
            |((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_json(va, vb)),
        ),
        _ => json_rank(a).cmp(&json_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistent::{PersistentMap, PersistentVector};
    use crate::types::{Member, TypeId, TypeTable};
    use proptest::prelude::*;
    use serde_json::json;

    fn int_vector(types: &mut TypeTable, items: &[i64]) -> Value {
        let ty = types.vector_of(TypeId::INT);
        Value::vector(ty, items.iter().map(|&i| Payload::Int(i)).collect())
    }

    fn int_dict(types: &mut TypeTable, items: &[(&str, i64)]) -> Value {
        let ty = types.dict_of(TypeId::INT);
        let entries: PersistentMap<Payload> =
            items.iter().map(|&(k, v)| (k, Payload::Int(v))).collect();
        Value::dict(ty, entries)
    }

    #[test]
    fn scalars() {
        assert_eq!(compare_values(&Value::int(1), &Value::int(2)), Ordering::Less);
        assert_eq!(compare_values(&Value::bool(true), &Value::bool(false)), Ordering::Greater);
        assert_eq!(
            compare_values(&Value::double(f64::NAN), &Value::double(1.0)),
            Ordering::Equal
        );
        assert_eq!(
            compare_values(&Value::string("abc"), &Value::string("abd")),
            Ordering::Less
        );
    }

    #[test]
    fn nested_structs_equal_across_allocations() {
        let mut types = TypeTable::new();
        let inner = types.struct_of("inner", vec![Member::new("name", TypeId::STRING)]);
        let outer = types.struct_of(
            "outer",
            vec![Member::new("id", TypeId::INT), Member::new("inner", inner)],
        );
        let build = |name: &str| {
            Value::new_struct(
                outer,
                vec![
                    Value::int(1),
                    Value::new_struct(inner, vec![Value::string(name)]),
                ],
            )
        };
        let a = build("x");
        let b = build("x");
        assert!(!a.shares_block_with(&b));
        assert!(values_equal(&a, &b));
        assert_eq!(compare_values(&a, &build("y")), Ordering::Less);
    }

    #[test]
    fn vectors_prefix_sorts_first() {
        let mut types = TypeTable::new();
        let short = int_vector(&mut types, &[1, 2]);
        let long = int_vector(&mut types, &[1, 2, 3]);
        let bigger = int_vector(&mut types, &[2]);
        assert_eq!(compare_values(&short, &long), Ordering::Less);
        assert_eq!(compare_values(&long, &bigger), Ordering::Less);
    }

    #[test]
    fn dicts_prefix_sorts_first() {
        let mut types = TypeTable::new();
        let short = int_dict(&mut types, &[("a", 1)]);
        let long = int_dict(&mut types, &[("a", 1), ("b", 2)]);
        let other = int_dict(&mut types, &[("a", 2)]);
        assert_eq!(compare_values(&short, &long), Ordering::Less);
        assert_eq!(compare_values(&long, &other), Ordering::Less);
        assert!(values_equal(&long, &int_dict(&mut types, &[("b", 2), ("a", 1)])));
    }

    #[test]
    fn vectors_of_heap_elements() {
        let mut types = TypeTable::new();
        let ty = types.vector_of(TypeId::STRING);
        let build = |items: &[&str]| {
            let v: PersistentVector<Payload> = items
                .iter()
                .map(|s| Value::string(*s).into_payload())
                .collect();
            Value::vector(ty, v)
        };
        assert!(values_equal(&build(&["a", "b"]), &build(&["a", "b"])));
        assert_eq!(
            compare_values(&build(&["a", "b"]), &build(&["a", "c"])),
            Ordering::Less
        );
    }

    #[test]
    fn json_orders_by_kind_then_content() {
        assert_eq!(compare_json(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_json(&json!(true), &json!(0)), Ordering::Less);
        assert_eq!(compare_json(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_json(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_json(&json!("z"), &json!([])), Ordering::Less);
        assert_eq!(compare_json(&json!([1]), &json!([1, 0])), Ordering::Less);
        assert_eq!(
            compare_json(&json!({"a": 1}), &json!({"a": 1})),
            Ordering::Equal
        );
    }

    proptest! {
        #[test]
        fn antisymmetric(a in prop::collection::vec(-3i64..3, 0..5), b in prop::collection::vec(-3i64..3, 0..5)) {
            let mut types = TypeTable::new();
            let va = int_vector(&mut types, &a);
            let vb = int_vector(&mut types, &b);
            prop_assert_eq!(compare_values(&va, &vb), compare_values(&vb, &va).reverse());
            prop_assert_eq!(compare_values(&va, &vb), a.cmp(&b));
        }
    }
}
