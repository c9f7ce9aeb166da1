//! Tether binding bytecode
//!
//! This crate defines the compiled form of declarative bindings.
//!
//! ## Design Principles
//!
//! - **Fixed width**: every instruction encodes to exactly eight bytes
//! - **Register based**: up to 32 working registers per evaluation
//! - **One program per document**: all committed bindings share one
//!   immutable [`Program`], entered through a per-binding jump table
//! - **Process local**: the serialized blob carries no version and is only
//!   exchanged within one engine instance

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod dump;
pub mod error;
pub mod instruction;
pub mod operand;
pub mod program;
pub mod signal;

pub use error::{BytecodeError, Result};
pub use instruction::{Instruction, Opcode};
pub use operand::{ExceptionId, Reg, SubscriptionIndex};
pub use program::{HEADER_SIZE, Program, ProgramHeader, ProgramParts};
pub use signal::SignalTable;

/// Number of working registers available to one evaluation
pub const REGISTER_COUNT: usize = 32;

/// Size of one encoded instruction in bytes
pub const INSTRUCTION_SIZE: usize = 8;
