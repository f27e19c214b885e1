//! Binding a program's function table to host functions and bytecode frames.

use std::fmt;

use tessera_common::{FunctionBody, HostId, Program, StaticFrame};
use tracing::debug;

use crate::host::{HostFunction, HostRegistry};

/// A resolved call target.
#[derive(Clone, Copy)]
pub enum Callable<'p> {
    Host { id: HostId, function: HostFunction },
    Frame(&'p StaticFrame),
}

impl fmt::Debug for Callable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Host { id, .. } => f.debug_struct("Host").field("id", id).finish(),
            Callable::Frame(frame) => f
                .debug_struct("Frame")
                .field("fingerprint", &frame.fingerprint())
                .finish(),
        }
    }
}

/// Resolve every function definition, indexed by `FunctionId`.
///
/// A registry entry with the function's name wins. Otherwise a `Host` body
/// resolves by id and a `Frame` body runs as bytecode. Anything left is
/// `None` and calling it raises `UnlinkedFunction`.
pub fn link<'p>(program: &'p Program, registry: &HostRegistry) -> Vec<Option<Callable<'p>>> {
    let (mut hosts, mut frames, mut dropped) = (0usize, 0usize, 0usize);
    let linked: Vec<Option<Callable<'p>>> = program
        .functions
        .iter()
        .map(|def| {
            let by_name = registry
                .find(&def.name)
                .and_then(|id| registry.get(id).map(|function| (id, function)));
            let by_body = match &def.body {
                FunctionBody::Host(id) => registry.get(*id).map(|function| (*id, function)),
                _ => None,
            };
            let callable = match (by_name.or(by_body), &def.body) {
                (Some((id, function)), _) => Some(Callable::Host { id, function }),
                (None, FunctionBody::Frame(frame)) => Some(Callable::Frame(frame)),
                (None, _) => None,
            };
            match callable {
                Some(Callable::Host { .. }) => hosts += 1,
                Some(Callable::Frame(_)) => frames += 1,
                None => {
                    dropped += 1;
                    debug!(function = %def.name, "function left unlinked");
                }
            }
            callable
        })
        .collect();
    debug!(hosts, frames, dropped, "program linked");
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use crate::machine::Interpreter;
    use tessera_common::{FunctionDefinition, Instruction, Opcode, TypeId, TypeTable, Value};

    fn native(_: &mut Interpreter<'_>, _: &[Value]) -> Result<Value, RuntimeError> {
        Ok(Value::void())
    }

    fn program() -> Program {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::VOID, vec![]);
        let stop = || {
            StaticFrame::new(&types, vec![Instruction::bare(Opcode::Stop)], vec![], 0).unwrap()
        };
        let globals = stop();
        let functions = vec![
            FunctionDefinition::bytecode("print", sig, stop()),
            FunctionDefinition::bytecode("main", sig, stop()),
            FunctionDefinition::host("clock", sig, HostId(0)),
            FunctionDefinition::unlinked("missing", sig),
            FunctionDefinition::host("stale", sig, HostId(42)),
        ];
        Program::new(types, globals, functions)
    }

    #[test]
    fn resolution_order() {
        let program = program();
        let mut registry = HostRegistry::new();
        let clock = registry.register("clock_impl", native);
        let print = registry.register("print", native);
        let linked = link(&program, &registry);

        assert!(matches!(linked[0], Some(Callable::Host { id, .. }) if id == print));
        assert!(matches!(linked[1], Some(Callable::Frame(_))));
        assert!(matches!(linked[2], Some(Callable::Host { id, .. }) if id == clock));
        assert!(linked[3].is_none());
        assert!(linked[4].is_none());
    }
}
