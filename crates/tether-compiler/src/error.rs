//! Compilation errors
//!
//! A rejected binding is not a failure of the document: the caller falls
//! back to the general-purpose evaluator. The variants exist so the reason
//! can be logged and tested.

use thiserror::Error;

use crate::options::PropertyRule;

/// Why a binding was not compiled
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The optimizer is turned off
    #[error("binding optimizer disabled")]
    Disabled,

    /// Syntax outside the supported grammar
    #[error("unsupported expression: {0}")]
    Unsupported(String),

    /// A call other than the supported math helpers
    #[error("unsupported call: {0}")]
    UnsupportedCall(String),

    /// A name that resolves to nothing in scope
    #[error("unknown name '{0}'")]
    UnknownName(String),

    /// A property missing on a statically known object
    #[error("'{object}' has no property '{property}'")]
    UnknownProperty {
        /// Type name of the object
        object: String,
        /// Property name
        property: String,
    },

    /// Member access on a value that is not an object
    #[error("'{0}' is not an object")]
    NotAnObject(String),

    /// A signal-handler name such as `onClicked`
    #[error("signal handler '{0}' used as a value")]
    SignalProperty(String),

    /// A type name used where a value is required
    #[error("type name '{0}' used as a value")]
    TypeAsValue(String),

    /// A type name importable from more than one place
    #[error("type name '{0}' is ambiguous")]
    AmbiguousType(String),

    /// A type that provides no attached properties
    #[error("type '{0}' has no attached properties")]
    NotAttachable(String),

    /// Operand or result types that do not fit together
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Required type
        expected: String,
        /// Actual type
        found: String,
    },

    /// A property whose type cannot be held in a register
    #[error("property '{property}' has unsupported type {ty}")]
    UnsupportedPropertyType {
        /// Property name
        property: String,
        /// Its type
        ty: String,
    },

    /// The destination property type cannot be written by compiled code
    #[error("destination type {0} is not supported")]
    UnsupportedDestination(String),

    /// A numeric literal that single precision cannot hold exactly
    #[error("numeric literal {0} is not exactly representable")]
    LiteralPrecision(f64),

    /// A string literal longer than 65535 bytes
    #[error("string literal of {0} bytes is too long")]
    LiteralTooLong(usize),

    /// All working registers are live
    #[error("register file exhausted")]
    RegistersExhausted,

    /// The subscription index space is full
    #[error("too many subscriptions")]
    TooManySubscriptions,

    /// The identifier index space is full
    #[error("too many identifier strings")]
    TooManyStrings,

    /// The program would exceed the instruction index space
    #[error("too many instructions")]
    TooManyInstructions,

    /// The same subscription appears twice in one binding
    #[error("duplicate subscription '{0}'")]
    DuplicateSubscription(String),

    /// Conditional branches produce different types or registers
    #[error("conditional branches disagree: {0}")]
    BranchMismatch(String),

    /// Conditional branches subscribe to different names
    #[error("conditional branches subscribe differently: {0}")]
    NonNeutralConditional(String),

    /// Dynamic lookup without the experimental flag
    #[error("{0} requires experimental mode")]
    RequiresExperimental(&'static str),

    /// A configured property rule refused the binding
    #[error("rejected by rule {0:?}")]
    Rule(PropertyRule),

    /// Program assembly failed
    #[error(transparent)]
    Program(#[from] tether_bytecode::BytecodeError),
}

impl CompileError {
    /// Type mismatch from anything displayable
    pub fn mismatch(expected: impl ToString, found: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = std::result::Result<T, CompileError>;
