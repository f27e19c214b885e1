//! The compiled program: type table, global frame and function table.
//!
//! Programs are built once by the code generator and never mutated by the
//! VM.

use crate::frame::StaticFrame;
use crate::types::{FunctionType, TypeId, TypeTable};

/// Index into [`Program::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into a host function registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(pub u32);

/// How a function is implemented. Never both host and bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// Bound to a native function by registry id.
    Host(HostId),
    /// Compiled bytecode.
    Frame(StaticFrame),
    /// Declared but not implemented. Resolved by name at link time or
    /// dropped from the callable set.
    Unlinked,
}

impl FunctionBody {
    pub fn kind(&self) -> &'static str {
        match self {
            FunctionBody::Host(_) => "host",
            FunctionBody::Frame(_) => "bytecode",
            FunctionBody::Unlinked => "unlinked",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    /// Function type id in the program's type table.
    pub signature: TypeId,
    pub body: FunctionBody,
}

impl FunctionDefinition {
    pub fn bytecode(name: impl Into<String>, signature: TypeId, frame: StaticFrame) -> Self {
        Self {
            name: name.into(),
            signature,
            body: FunctionBody::Frame(frame),
        }
    }

    pub fn host(name: impl Into<String>, signature: TypeId, id: HostId) -> Self {
        Self {
            name: name.into(),
            signature,
            body: FunctionBody::Host(id),
        }
    }

    pub fn unlinked(name: impl Into<String>, signature: TypeId) -> Self {
        Self {
            name: name.into(),
            signature,
            body: FunctionBody::Unlinked,
        }
    }

    pub fn frame(&self) -> Option<&StaticFrame> {
        match &self.body {
            FunctionBody::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub types: TypeTable,
    /// Frame whose registers are the program's globals. Its instruction
    /// stream initializes them and ends with STOP.
    pub globals: StaticFrame,
    pub functions: Vec<FunctionDefinition>,
}

impl Program {
    pub fn new(types: TypeTable, globals: StaticFrame, functions: Vec<FunctionDefinition>) -> Self {
        Self {
            types,
            globals,
            functions,
        }
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDefinition> {
        self.functions.get(id.index())
    }

    pub fn function_id(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId(i as u32))
    }

    pub fn signature(&self, id: FunctionId) -> Option<&FunctionType> {
        self.types.function_type(self.function(id)?.signature)
    }

    /// Register index of the global called `name`.
    pub fn global_index(&self, name: &str) -> Option<usize> {
        self.globals.find_symbol(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Symbol;
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;

    fn sample() -> Program {
        let mut types = TypeTable::new();
        let sig = types.function_of(TypeId::INT, vec![TypeId::INT]);
        let body = StaticFrame::new(
            &types,
            vec![Instruction::new(Opcode::Return, 0, 0, 0)],
            vec![Symbol::new("x", TypeId::INT)],
            1,
        )
        .unwrap();
        let globals = StaticFrame::new(
            &types,
            vec![Instruction::bare(Opcode::Stop)],
            vec![Symbol::new("counter", TypeId::INT)],
            0,
        )
        .unwrap();
        Program::new(
            types,
            globals,
            vec![
                FunctionDefinition::bytecode("id", sig, body),
                FunctionDefinition::unlinked("print", sig),
            ],
        )
    }

    #[test]
    fn lookup_by_name() {
        let program = sample();
        assert_eq!(program.function_id("print"), Some(FunctionId(1)));
        assert_eq!(program.function_id("nope"), None);
        assert_eq!(program.global_index("counter"), Some(0));
    }

    #[test]
    fn signatures_resolve() {
        let program = sample();
        let sig = program.signature(FunctionId(0)).unwrap();
        assert_eq!(sig.ret, TypeId::INT);
        assert_eq!(sig.params, vec![TypeId::INT]);
        assert_eq!(program.functions[0].body.kind(), "bytecode");
        assert_eq!(program.functions[1].body.kind(), "unlinked");
        assert!(program.functions[1].frame().is_none());
    }
}
