//! Tessera common types and instruction encoding.
//!
//! This crate provides the data structures shared by the VM and the
//! verifier:
//!
//! - [`Opcode`] and [`Shape`]: the instruction set and operand layouts
//! - [`Instruction`]: the 64-bit instruction record with encode/decode
//! - [`TypeTable`], [`TypeId`], [`TypeDesc`]: resolved program types
//! - [`Value`], [`Payload`], [`HeapBlock`]: runtime values with
//!   reference-counted heap blocks
//! - [`PersistentVector`], [`PersistentMap`]: structural-sharing collections
//! - [`compare_values`]: deep comparison used for ordering and equality
//! - [`StaticFrame`], [`FunctionDefinition`], [`Program`]: compiled programs
//! - [`DecodeError`], [`ProgramError`]

pub mod compare;
pub mod error;
pub mod frame;
pub mod instruction;
pub mod json;
pub mod opcode;
pub mod persistent;
pub mod program;
pub mod types;
pub mod value;

// Re-export commonly used types at the crate root.
pub use compare::{compare_values, values_equal};
pub use error::{DecodeError, ProgramError};
pub use frame::{StaticFrame, Symbol};
pub use instruction::{decode_stream, encode_stream, Instruction};
pub use json::value_to_json;
pub use opcode::{OperandRole, Opcode, Shape};
pub use persistent::{PersistentMap, PersistentVector};
pub use program::{FunctionBody, FunctionDefinition, FunctionId, HostId, Program};
pub use types::{BaseType, Encoding, FunctionType, Member, StructDef, TypeDesc, TypeId, TypeTable};
pub use value::{HeapBlock, HeapRef, Payload, Value};
