//! Structural validation of a program's function table.
//!
//! Checks that signatures are function types and that every bytecode frame
//! agrees with its signature. Frame termination is already guaranteed by
//! `StaticFrame::new`.

use crate::error::VerifyError;
use tessera_common::{FunctionBody, Program, TypeId};

/// Run the structural pass.
pub fn check_structural(program: &Program) -> Vec<VerifyError> {
    let mut errors = Vec::new();

    let count = program.globals.arg_count();
    if count != 0 {
        errors.push(VerifyError::GlobalArguments { count });
    }

    for (function, def) in program.functions.iter().enumerate() {
        let Some(signature) = program.types.function_type(def.signature) else {
            errors.push(VerifyError::NotAFunctionType {
                function,
                ty: def.signature,
            });
            continue;
        };
        let FunctionBody::Frame(frame) = &def.body else {
            continue;
        };

        if signature.params.contains(&TypeId::ANY) {
            errors.push(VerifyError::DynamicParameterInBytecode { function });
        }
        if frame.arg_count() != signature.params.len() {
            errors.push(VerifyError::ArgumentCountMismatch {
                function,
                expected: signature.params.len(),
                found: frame.arg_count(),
            });
            continue;
        }
        for (register, (param, symbol)) in signature.params.iter().zip(frame.symbols()).enumerate() {
            if *param != TypeId::ANY && *param != symbol.ty {
                errors.push(VerifyError::ArgumentTypeMismatch {
                    function,
                    register,
                    expected: *param,
                    found: symbol.ty,
                });
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{
        FunctionDefinition, HostId, Instruction, Opcode, StaticFrame, Symbol, TypeTable,
    };

    fn stop(types: &TypeTable, symbols: Vec<Symbol>, args: usize) -> StaticFrame {
        StaticFrame::new(types, vec![Instruction::bare(Opcode::Stop)], symbols, args).unwrap()
    }

    #[test]
    fn matching_frame_passes() {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::VOID, vec![TypeId::INT]);
        let f = stop(&types, vec![Symbol::new("x", TypeId::INT)], 1);
        let globals = stop(&types, vec![], 0);
        let program = Program::new(types, globals, vec![FunctionDefinition::bytecode("f", sig, f)]);
        assert!(check_structural(&program).is_empty());
    }

    #[test]
    fn signature_must_be_a_function_type() {
        let types = TypeTable::new();
        let globals = stop(&types, vec![], 0);
        let program = Program::new(
            types,
            globals,
            vec![FunctionDefinition::unlinked("f", TypeId::INT)],
        );
        assert_eq!(
            check_structural(&program),
            vec![VerifyError::NotAFunctionType {
                function: 0,
                ty: TypeId::INT
            }]
        );
    }

    #[test]
    fn arguments_must_match_the_signature() {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::VOID, vec![TypeId::INT, TypeId::STRING]);
        let wrong_count = stop(&types, vec![Symbol::new("x", TypeId::INT)], 1);
        let wrong_type = stop(
            &types,
            vec![
                Symbol::new("x", TypeId::INT),
                Symbol::new("y", TypeId::DOUBLE),
            ],
            2,
        );
        let globals = stop(&types, vec![], 0);
        let program = Program::new(
            types,
            globals,
            vec![
                FunctionDefinition::bytecode("a", sig, wrong_count),
                FunctionDefinition::bytecode("b", sig, wrong_type),
            ],
        );
        assert_eq!(
            check_structural(&program),
            vec![
                VerifyError::ArgumentCountMismatch {
                    function: 0,
                    expected: 2,
                    found: 1
                },
                VerifyError::ArgumentTypeMismatch {
                    function: 1,
                    register: 1,
                    expected: TypeId::STRING,
                    found: TypeId::DOUBLE
                },
            ]
        );
    }

    #[test]
    fn dynamic_parameters_are_host_only() {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::VOID, vec![TypeId::ANY]);
        let f = stop(&types, vec![Symbol::new("x", TypeId::ANY)], 1);
        let globals = stop(&types, vec![], 0);
        let program = Program::new(
            types,
            globals,
            vec![
                FunctionDefinition::bytecode("f", sig, f),
                FunctionDefinition::host("g", sig, HostId(0)),
            ],
        );
        assert_eq!(
            check_structural(&program),
            vec![VerifyError::DynamicParameterInBytecode { function: 0 }]
        );
    }

    #[test]
    fn globals_take_no_arguments() {
        let types = TypeTable::new();
        let globals = stop(&types, vec![Symbol::new("g", TypeId::INT)], 1);
        let program = Program::new(types, globals, vec![]);
        assert_eq!(
            check_structural(&program),
            vec![VerifyError::GlobalArguments { count: 1 }]
        );
    }
}
