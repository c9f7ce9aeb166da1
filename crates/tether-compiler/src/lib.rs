//! # Tether Compiler
//!
//! Compiles binding expressions to Tether bytecode.
//!
//! ## Pipeline
//!
//! 1. Resolve each name against the compile scope and the type registry
//! 2. Walk the expression tree, allocating registers and emitting instructions
//! 3. Commit accepted bindings to a shared accumulator
//! 4. Assemble one [`Program`](tether_bytecode::Program) with a jump table,
//!    data region, signal table and exception table
//!
//! Any construct the compiler cannot prove correct is rejected with a
//! [`CompileError`]; the caller then evaluates that binding another way.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod ast;
pub mod codegen;
pub mod committed;
pub mod compiler;
pub mod error;
pub mod options;
pub mod scope;

pub use ast::{BinaryOp, Node, NodeKind, SourceLocation};
pub use codegen::{Cleanup, RegisterAllocator};
pub use committed::{Committed, RegisteredString};
pub use compiler::BindingCompiler;
pub use error::{CompileError, CompileResult};
pub use options::{CompilerOptions, DuplicateSubscriptions, PropertyRule};
pub use scope::{CompileScope, Destination, DocumentObject, IdObject, ObjectKey};
