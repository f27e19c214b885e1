//! Interpreter configuration.

use serde::{Deserialize, Serialize};

/// Default value stack capacity, in values.
pub const DEFAULT_STACK_CAPACITY: usize = 4096;

/// Default limit on nested bytecode calls.
///
/// Every bytecode call recurses into the dispatch loop on the native stack.
/// The default fits a 4 MiB thread stack in unoptimized builds; a thread
/// with less native stack must lower `max_call_depth` to match. Raising it
/// needs a proportionally larger stack, or the process aborts on native
/// stack overflow before `CallDepthExceeded` is reached.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Fixed size of the value stack. Never grows after construction.
    pub stack_capacity: usize,
    /// Nested bytecode calls allowed before `CallDepthExceeded`.
    pub max_call_depth: usize,
    /// Emit a `trace!` event for every executed instruction.
    pub trace_instructions: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            stack_capacity: DEFAULT_STACK_CAPACITY,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_instructions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_uses_defaults() {
        let config: InterpreterConfig =
            serde_json::from_str(r#"{"max_call_depth": 64}"#).unwrap();
        assert_eq!(config.max_call_depth, 64);
        assert_eq!(config.stack_capacity, DEFAULT_STACK_CAPACITY);
        assert!(!config.trace_instructions);
    }

    #[test]
    fn roundtrips_through_json() {
        let config = InterpreterConfig {
            stack_capacity: 128,
            max_call_depth: 8,
            trace_instructions: true,
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<InterpreterConfig>(&text).unwrap(), config);
    }
}
