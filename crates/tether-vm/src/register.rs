//! VM registers
//!
//! A [`Register`] is a tagged value cell. Owned payloads (text, URLs, dynamic
//! values) are constructed by explicit instructions and destroyed by the
//! matching cleanup instruction; the compiler places one cleanup on every
//! path. Dropping the frame frees anything left over, and debug builds report
//! such leftovers as a compiler bug.

use std::fmt;

use tether_bytecode::{REGISTER_COUNT, Reg};
use tether_object::{ObjectRef, Variant};
use url::Url;

/// One VM register
#[derive(Clone, Default)]
pub enum Register {
    /// No value
    #[default]
    Undefined,
    /// A value exists but its type is not known
    UnknownDynamic,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// Double precision real
    Real(f64),
    /// Object reference, possibly null
    Object(Option<ObjectRef>),
    /// Owned text
    String(String),
    /// Owned URL; `None` is the empty URL
    Url(Option<Url>),
    /// Owned dynamic value
    Dynamic(Variant),
}

impl Register {
    /// Reset to undefined
    #[inline]
    pub fn set_undefined(&mut self) {
        *self = Self::Undefined;
    }

    /// Mark as holding a value of unknown type
    #[inline]
    pub fn set_unknown_dynamic(&mut self) {
        *self = Self::UnknownDynamic;
    }

    /// Real not-a-number, the result of arithmetic on undefined operands
    #[inline]
    pub fn set_nan(&mut self) {
        *self = Self::Real(f64::NAN);
    }

    /// Store a boolean
    #[inline]
    pub fn set_bool(&mut self, value: bool) {
        *self = Self::Bool(value);
    }

    /// Store an integer
    #[inline]
    pub fn set_int(&mut self, value: i32) {
        *self = Self::Int(value);
    }

    /// Store a real
    #[inline]
    pub fn set_real(&mut self, value: f64) {
        *self = Self::Real(value);
    }

    /// Store an object reference
    #[inline]
    pub fn set_object(&mut self, value: Option<ObjectRef>) {
        *self = Self::Object(value);
    }

    /// Whether the register holds no value
    #[inline]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Boolean payload; anything else reads as false
    #[inline]
    pub fn get_bool(&self) -> bool {
        matches!(self, Self::Bool(true))
    }

    /// Integer payload; anything else reads as 0
    #[inline]
    pub fn get_int(&self) -> i32 {
        match self {
            Self::Int(i) => *i,
            _ => 0,
        }
    }

    /// Real payload; anything else reads as 0
    #[inline]
    pub fn get_real(&self) -> f64 {
        match self {
            Self::Real(r) => *r,
            _ => 0.0,
        }
    }

    /// Object payload; anything else reads as null
    #[inline]
    pub fn get_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => o.as_ref(),
            _ => None,
        }
    }

    /// Text payload; anything else reads as empty
    #[inline]
    pub fn get_string(&self) -> &str {
        match self {
            Self::String(s) => s,
            _ => "",
        }
    }

    /// Kind name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::UnknownDynamic => "unknown",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Object(_) => "object",
            Self::String(_) => "string",
            Self::Url(_) => "url",
            Self::Dynamic(_) => "dynamic",
        }
    }

    /// Whether the payload needs a cleanup instruction
    #[inline]
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::String(_) | Self::Url(_) | Self::Dynamic(_))
    }

    /// Convert a property value read into this register.
    ///
    /// An invalid read leaves a constructed string or URL empty rather than
    /// undefined, the same as reading into pre-constructed storage.
    pub fn load(&mut self, value: Variant) {
        *self = match value {
            Variant::Bool(b) => Self::Bool(b),
            Variant::Int(i) => Self::Int(i),
            Variant::Real(r) => Self::Real(r),
            Variant::String(s) => Self::String(s),
            Variant::Bytes(b) => Self::String(String::from_utf8_lossy(&b).into_owned()),
            Variant::Url(u) => Self::Url(Some(u)),
            Variant::Object(o) => Self::Object(o),
            Variant::Invalid => match self {
                Self::String(_) => Self::String(String::new()),
                Self::Url(_) => Self::Url(None),
                _ => Self::Undefined,
            },
            value @ Variant::Value(_) => Self::Dynamic(value),
        };
    }

    /// Value written to a property by `Store`; `None` when undefined
    pub fn to_variant(&self) -> Option<Variant> {
        Some(match self {
            Self::Undefined => return None,
            Self::UnknownDynamic => Variant::Invalid,
            Self::Bool(b) => Variant::Bool(*b),
            Self::Int(i) => Variant::Int(*i),
            Self::Real(r) => Variant::Real(*r),
            Self::Object(o) => Variant::Object(o.clone()),
            Self::String(s) => Variant::String(s.clone()),
            Self::Url(Some(u)) => Variant::Url(u.clone()),
            Self::Url(None) => Variant::Invalid,
            Self::Dynamic(v) => v.clone(),
        })
    }
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("Undefined"),
            Self::UnknownDynamic => f.write_str("UnknownDynamic"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Real(r) => write!(f, "Real({r})"),
            Self::Object(o) => write!(f, "{:?}", Variant::Object(o.clone())),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Url(Some(u)) => write!(f, "Url({u})"),
            Self::Url(None) => f.write_str("Url()"),
            Self::Dynamic(v) => write!(f, "Dynamic({v:?})"),
        }
    }
}

/// Registers of one evaluation
pub struct RegisterFile {
    regs: [Register; REGISTER_COUNT],
}

impl RegisterFile {
    /// All registers undefined
    pub fn new() -> Self {
        Self {
            regs: std::array::from_fn(|_| Register::Undefined),
        }
    }

    /// Register by operand
    #[inline]
    pub fn get(&self, reg: Reg) -> &Register {
        &self.regs[reg.index()]
    }

    /// Mutable register by operand
    #[inline]
    pub fn get_mut(&mut self, reg: Reg) -> &mut Register {
        &mut self.regs[reg.index()]
    }

    /// Registers still holding an owned payload
    pub fn leaked(&self) -> impl Iterator<Item = (usize, &Register)> {
        self.regs.iter().enumerate().filter(|(_, r)| r.is_owned())
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
