//! Runtime errors and the error sink

use std::cell::{Cell, RefCell};
use std::fmt;

use tether_bytecode::BytecodeError;
use thiserror::Error;
use url::Url;

/// What went wrong while evaluating a binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// An instruction needed an object and found undefined
    #[error("TypeError: Result of expression is not an object")]
    NotAnObject,

    /// `Store` of an undefined value
    #[error("Unable to assign undefined value")]
    UndefinedAssignment,

    /// A binding re-entered its own update
    #[error("Binding loop detected for property \"{0}\"")]
    BindingLoop(String),
}

/// Where an error was raised
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLocation {
    /// Document the binding belongs to
    pub url: Option<Url>,
    /// Source line, when the exception table has one
    pub line: Option<u32>,
    /// Source column, when the exception table has one
    pub column: Option<u32>,
}

impl fmt::Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{url}")?,
            None => f.write_str("<Unknown File>")?,
        }
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        Ok(())
    }
}

/// A runtime error reported for one binding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {kind}")]
pub struct BindingError {
    /// Error kind
    pub kind: ErrorKind,
    /// Source position
    pub location: ErrorLocation,
}

impl BindingError {
    /// Human readable description without the location
    pub fn description(&self) -> String {
        self.kind.to_string()
    }
}

/// Manager-level failures
#[derive(Debug, Error)]
pub enum VmError {
    /// Binding index past the program's jump table
    #[error("Binding {index} out of range, program has {count}")]
    UnknownBinding {
        /// Requested binding
        index: u32,
        /// Bindings in the program
        count: u32,
    },

    /// Value-type index not registered
    #[error("Unknown value type {0}")]
    UnknownValueType(u32),

    /// Program failed to load
    #[error("Program error: {0}")]
    Program(#[from] BytecodeError),
}

/// Result type for manager operations
pub type VmResult<T> = std::result::Result<T, VmError>;

/// Last error recorded for one binding, cleared on every evaluation
#[derive(Debug, Default)]
pub struct DelayedError(RefCell<Option<BindingError>>);

impl DelayedError {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous error
    pub fn clear(&self) {
        self.0.borrow_mut().take();
    }

    /// Record an error
    pub fn set(&self, error: BindingError) {
        *self.0.borrow_mut() = Some(error);
    }

    /// The recorded error
    pub fn get(&self) -> Option<BindingError> {
        self.0.borrow().clone()
    }

    /// Whether an error is recorded
    pub fn is_set(&self) -> bool {
        self.0.borrow().is_some()
    }
}

/// Engine error sink: queues errors while collecting, warns otherwise
#[derive(Debug, Default)]
pub struct Diagnostics {
    collecting: Cell<bool>,
    queue: RefCell<Vec<BindingError>>,
}

impl Diagnostics {
    /// Sink that logs every error as a warning
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that queues errors until [`Diagnostics::take`]
    pub fn collecting() -> Self {
        Self {
            collecting: Cell::new(true),
            queue: RefCell::default(),
        }
    }

    /// Switch between queueing and warning
    pub fn set_collecting(&self, collecting: bool) {
        self.collecting.set(collecting);
    }

    /// Whether errors are queued
    pub fn is_collecting(&self) -> bool {
        self.collecting.get()
    }

    /// Deliver an error
    pub fn report(&self, error: BindingError) {
        if self.collecting.get() {
            self.queue.borrow_mut().push(error);
        } else {
            tracing::warn!(target: "tether::vm", "{error}");
        }
    }

    /// Drain queued errors
    pub fn take(&self) -> Vec<BindingError> {
        std::mem::take(&mut *self.queue.borrow_mut())
    }

    /// Number of queued errors
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }
}
