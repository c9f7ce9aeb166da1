//! Tether binding runtime
//!
//! Executes compiled binding programs and keeps their results current.
//!
//! ## Overview
//!
//! - [`Interpreter`]: evaluates one binding over a 32-register file, with
//!   either per-step decoding or a predecoded instruction table
//! - [`BindingManager`]: per-instance state for one shared
//!   [`Program`](tether_bytecode::Program): subscription slots, interned
//!   identifiers and one slot per binding
//! - [`Context`]: the name-resolution tree dynamic lookups walk
//!
//! Evaluation is single threaded. Change notifications are delivered
//! synchronously and may re-enter the manager; a binding that re-enters
//! its own update is reported as a binding loop and skipped.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bindings;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod options;
pub mod register;
pub mod state;
pub mod subscription;

pub use bindings::{
    AbstractBinding, BindingManager, CompiledBinding, DestroyMode, DisconnectMode, PropertyTarget,
};
pub use context::{Context, ContextName};
pub use error::{BindingError, DelayedError, Diagnostics, ErrorKind, ErrorLocation, VmError, VmResult};
pub use interpreter::{Interpreter, Invocation};
pub use options::{DispatchMode, RoundingPolicy, VmOptions};
pub use register::{Register, RegisterFile};
pub use state::{Identifiers, ProgramState};
pub use subscription::{Subscription, Subscriptions};
