//! Bytecode errors

use thiserror::Error;

/// Bytecode errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BytecodeError {
    /// Unknown opcode byte
    #[error("Invalid opcode: 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Register operand outside the register file
    #[error("Invalid register operand {operand} in {opcode}")]
    InvalidRegister {
        /// Opcode name
        opcode: &'static str,
        /// Raw operand value
        operand: i8,
    },

    /// Blob ended early
    #[error("Unexpected end of program: needed {needed} bytes, {available} available")]
    UnexpectedEnd {
        /// Bytes needed
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Header describes a layout that does not fit the blob
    #[error("Invalid program layout: {0}")]
    InvalidLayout(String),

    /// Literal or identifier text is not valid UTF-8
    #[error("Invalid string data at offset {0}")]
    InvalidString(u32),

    /// Program limit exceeded
    #[error("Program limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
