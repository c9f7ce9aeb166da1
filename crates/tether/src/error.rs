//! Engine errors

use tether_bytecode::BytecodeError;
use tether_compiler::CompileError;
use tether_vm::VmError;
use thiserror::Error;

/// Failure to build or instantiate a document.
///
/// A single rejected binding is not an error; see
/// [`DocumentBuilder::compile`](crate::DocumentBuilder::compile).
#[derive(Debug, Error)]
pub enum TetherError {
    /// Program assembly failed
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// A serialized program could not be loaded
    #[error("Bytecode error: {0}")]
    Bytecode(#[from] BytecodeError),

    /// Instantiation or configuration failed
    #[error("Runtime error: {0}")]
    Vm(#[from] VmError),
}

/// Result type for engine operations
pub type TetherResult<T> = std::result::Result<T, TetherError>;
