//! Tessera virtual machine: executes register-based bytecode programs.
//!
//! The VM runs a [`Program`] built by a front end:
//! - One flat value stack; each active call owns a window of registers
//!   addressed from its base offset
//! - Frame linkage kept on a separate stack of frame records
//! - Heap values shared by reference count and persistent collections
//! - Host functions bound by name through a [`HostRegistry`]
//!
//! # Usage
//!
//! ```
//! use tessera_common::{FunctionDefinition, Instruction, Opcode, Program, StaticFrame, Symbol,
//!     TypeId, TypeTable, Value};
//! use tessera_vm::{run, HostRegistry};
//!
//! let mut types = TypeTable::new();
//! let sig = types.function_of(TypeId::INT, vec![TypeId::INT]);
//! let globals = StaticFrame::new(&types, vec![Instruction::bare(Opcode::Stop)], vec![], 0).unwrap();
//! let double = StaticFrame::new(
//!     &types,
//!     vec![
//!         Instruction::new(Opcode::AddInt, 1, 0, 0),
//!         Instruction::new(Opcode::Return, 1, 0, 0),
//!     ],
//!     vec![Symbol::new("x", TypeId::INT), Symbol::new("sum", TypeId::INT)],
//!     1,
//! )
//! .unwrap();
//! let program = Program::new(types, globals, vec![FunctionDefinition::bytecode("double", sig, double)]);
//!
//! let result = run(&program, &HostRegistry::new(), "double", &[Value::int(21)]).unwrap();
//! assert_eq!(result, Value::int(42));
//! ```

/// Abort on a broken VM invariant. Defects are never runtime errors.
macro_rules! defect {
    ($($arg:tt)*) => {
        panic!("VM defect: {}", format_args!($($arg)*))
    };
}

pub mod config;
pub mod convention;
pub mod error;
pub mod execute;
pub mod host;
pub mod introspect;
pub mod link;
pub mod machine;
pub mod stack;

pub use config::InterpreterConfig;
pub use error::{ErrorKind, RuntimeError};
pub use execute::next_pc;
pub use host::{HostFunction, HostRegistry, MessageHandler};
pub use introspect::dump_program;
pub use machine::Interpreter;

use tessera_common::{Program, Value};

/// Execute `program`'s global initializer, then call `entry` with `args`.
///
/// Uses the default [`InterpreterConfig`]. Build an [`Interpreter`]
/// directly to configure it, install a message handler or make several
/// calls against the same globals.
///
/// # Errors
///
/// Returns [`RuntimeError`] if the initializer or the call fails, or if
/// `entry` names no function.
pub fn run(
    program: &Program,
    registry: &HostRegistry,
    entry: &str,
    args: &[Value],
) -> Result<Value, RuntimeError> {
    let mut interpreter = Interpreter::new(program, registry, InterpreterConfig::default())?;
    interpreter.call_by_name(entry, args)
}
