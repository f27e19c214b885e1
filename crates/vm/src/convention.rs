//! Calling convention shared by the CALL opcode, the embedding API and
//! host trampolines.
//!
//! Each argument occupies one stack cell, except parameters of the dynamic
//! type `any`: those take a type-id cell (an int holding the argument's
//! concrete type index) followed by the value cell.

use tessera_common::{FunctionType, Payload, TypeId, Value};

use crate::error::RuntimeError;
use crate::stack::ValueStack;

/// Stack cells occupied by the arguments of `signature`.
pub fn arg_cells(signature: &FunctionType) -> usize {
    signature
        .params
        .iter()
        .map(|p| if *p == TypeId::ANY { 2 } else { 1 })
        .sum()
}

/// The cell pushed by PUSH_TYPE_ID ahead of a dynamic argument.
pub fn type_id_cell(ty: TypeId) -> Value {
    Value::int(i64::from(ty.0))
}

/// Push `args` for a call to `signature`.
pub fn push_args(
    stack: &mut ValueStack<'_>,
    signature: &FunctionType,
    args: &[Value],
) -> Result<(), RuntimeError> {
    for (param, arg) in signature.params.iter().zip(args) {
        if *param == TypeId::ANY {
            stack.push(type_id_cell(arg.ty()))?;
        }
        stack.push(arg.clone())?;
    }
    Ok(())
}

/// Rebuild the argument list from the cells on top of the stack.
///
/// Dynamic arguments come back as the value alone; it already carries its
/// concrete type, which must agree with the preceding type-id cell.
pub fn unpack_args(signature: &FunctionType, cells: &[Value]) -> Vec<Value> {
    let mut args = Vec::with_capacity(signature.params.len());
    let mut cells = cells.iter();
    for param in &signature.params {
        if *param == TypeId::ANY {
            let declared = match cells.next().map(Value::payload) {
                Some(Payload::Int(index)) => *index,
                other => defect!("dynamic argument without type-id cell: {other:?}"),
            };
            let value = next_cell(&mut cells);
            if i64::from(value.ty().0) != declared {
                defect!(
                    "dynamic argument tagged #{declared} but holds {}",
                    value.ty()
                );
            }
            args.push(value.clone());
        } else {
            args.push(next_cell(&mut cells).clone());
        }
    }
    if cells.next().is_some() {
        defect!("more argument cells than parameters");
    }
    args
}

fn next_cell<'a>(cells: &mut std::slice::Iter<'a, Value>) -> &'a Value {
    match cells.next() {
        Some(value) => value,
        None => defect!("fewer argument cells than parameters"),
    }
}

/// Check values passed through the embedding API against `signature`.
pub fn check_args(name: &str, signature: &FunctionType, args: &[Value]) -> Result<(), RuntimeError> {
    if args.len() != signature.params.len() {
        return Err(RuntimeError::BadArguments {
            function: name.to_string(),
            message: format!(
                "expected {} arguments, got {}",
                signature.params.len(),
                args.len()
            ),
        });
    }
    for (i, (param, arg)) in signature.params.iter().zip(args).enumerate() {
        if *param != TypeId::ANY && *param != arg.ty() {
            return Err(RuntimeError::BadArguments {
                function: name.to_string(),
                message: format!("argument {i} has type {}, expected {}", arg.ty(), param),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Instruction, Opcode, StaticFrame, TypeTable};

    fn dyn_sig() -> FunctionType {
        FunctionType {
            ret: TypeId::VOID,
            params: vec![TypeId::INT, TypeId::ANY],
        }
    }

    #[test]
    fn dynamic_params_take_two_cells() {
        assert_eq!(arg_cells(&dyn_sig()), 3);
    }

    #[test]
    fn pack_then_unpack() {
        let types = TypeTable::new();
        let globals =
            StaticFrame::new(&types, vec![Instruction::bare(Opcode::Stop)], vec![], 0).unwrap();
        let mut stack = ValueStack::new(8, &globals);
        let args = vec![Value::int(1), Value::string("dyn")];
        push_args(&mut stack, &dyn_sig(), &args).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.values()[1], type_id_cell(TypeId::STRING));
        let unpacked = unpack_args(&dyn_sig(), stack.top(3));
        assert_eq!(unpacked, args);
        assert_eq!(unpacked[1].ty(), TypeId::STRING);
    }

    #[test]
    #[should_panic(expected = "VM defect")]
    fn mismatched_type_cell_is_a_defect() {
        let cells = vec![Value::int(1), type_id_cell(TypeId::INT), Value::string("x")];
        unpack_args(&dyn_sig(), &cells);
    }

    #[test]
    fn check_args_reports_count_and_type() {
        assert!(check_args("f", &dyn_sig(), &[Value::int(1), Value::bool(true)]).is_ok());
        assert!(matches!(
            check_args("f", &dyn_sig(), &[Value::int(1)]),
            Err(RuntimeError::BadArguments { .. })
        ));
        assert!(matches!(
            check_args("f", &dyn_sig(), &[Value::double(1.0), Value::int(1)]),
            Err(RuntimeError::BadArguments { .. })
        ));
    }
}
