//! Runtime errors for the Tessera VM.
//!
//! These are user-triggerable failures. They unwind out of any number of
//! nested frames to the caller of `run`/`call_function`. Internal invariant
//! violations are not errors: they panic through `defect!`.
//!
//! Errors raised by an opcode carry the instruction index (`at`) within the
//! frame that raised it.

use thiserror::Error;

/// Errors that occur during program execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Integer or float division, or integer remainder, by zero.
    #[error("division by zero at instruction {at}")]
    DivisionByZero { at: usize },

    /// String, vector or JSON array index outside `0..len`.
    #[error("index {index} out of bounds (length {len}) at instruction {at}")]
    IndexOutOfBounds { at: usize, index: i64, len: usize },

    /// Dictionary or JSON object lookup of an absent key.
    #[error("missing key '{key}' at instruction {at}")]
    MissingKey { at: usize, key: String },

    /// Struct update path names a member the struct does not have.
    #[error("unknown member '{member}' at instruction {at}")]
    UnknownMember { at: usize, member: String },

    /// Struct update path is not of the form `member(.member)*`.
    #[error("malformed update path '{path}' at instruction {at}")]
    MalformedUpdatePath { at: usize, path: String },

    /// A value of the wrong type reached an instruction.
    #[error("type mismatch at instruction {at}: expected {expected}, found {found}")]
    TypeMismatch {
        at: usize,
        expected: String,
        found: String,
    },

    /// Integer is not a valid Unicode scalar value.
    #[error("invalid character code {code} at instruction {at}")]
    InvalidCharacter { at: usize, code: i64 },

    /// The value stack is full.
    #[error("stack overflow (capacity {capacity})")]
    StackOverflow { capacity: usize },

    /// Too many nested bytecode calls.
    #[error("call depth exceeded limit {limit}")]
    CallDepthExceeded { limit: usize },

    /// The function has neither a host binding nor a bytecode body.
    #[error("function '{name}' is not linked")]
    UnlinkedFunction { name: String },

    /// No function with this name or id exists.
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    /// Arguments passed through the embedding API do not fit the signature.
    #[error("bad arguments for '{function}': {message}")]
    BadArguments { function: String, message: String },

    /// Failure reported by a host function.
    #[error("host function '{function}' failed: {message}")]
    Host { function: String, message: String },
}

/// Stable discriminator of [`RuntimeError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DivisionByZero,
    IndexOutOfBounds,
    MissingKey,
    UnknownMember,
    MalformedUpdatePath,
    TypeMismatch,
    InvalidCharacter,
    StackOverflow,
    CallDepthExceeded,
    UnlinkedFunction,
    UnknownFunction,
    BadArguments,
    Host,
}

impl RuntimeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
            RuntimeError::IndexOutOfBounds { .. } => ErrorKind::IndexOutOfBounds,
            RuntimeError::MissingKey { .. } => ErrorKind::MissingKey,
            RuntimeError::UnknownMember { .. } => ErrorKind::UnknownMember,
            RuntimeError::MalformedUpdatePath { .. } => ErrorKind::MalformedUpdatePath,
            RuntimeError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            RuntimeError::InvalidCharacter { .. } => ErrorKind::InvalidCharacter,
            RuntimeError::StackOverflow { .. } => ErrorKind::StackOverflow,
            RuntimeError::CallDepthExceeded { .. } => ErrorKind::CallDepthExceeded,
            RuntimeError::UnlinkedFunction { .. } => ErrorKind::UnlinkedFunction,
            RuntimeError::UnknownFunction { .. } => ErrorKind::UnknownFunction,
            RuntimeError::BadArguments { .. } => ErrorKind::BadArguments,
            RuntimeError::Host { .. } => ErrorKind::Host,
        }
    }

    /// Error for host functions to return.
    pub fn host(function: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Host {
            function: function.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formats() {
        assert_eq!(
            RuntimeError::DivisionByZero { at: 5 }.to_string(),
            "division by zero at instruction 5"
        );
        assert_eq!(
            RuntimeError::IndexOutOfBounds {
                at: 2,
                index: -1,
                len: 3
            }
            .to_string(),
            "index -1 out of bounds (length 3) at instruction 2"
        );
        assert_eq!(
            RuntimeError::host("print", "closed").to_string(),
            "host function 'print' failed: closed"
        );
    }

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            RuntimeError::DivisionByZero { at: 0 }.kind(),
            ErrorKind::DivisionByZero
        );
        assert_eq!(
            RuntimeError::MissingKey {
                at: 0,
                key: "k".into()
            }
            .kind(),
            ErrorKind::MissingKey
        );
    }
}
