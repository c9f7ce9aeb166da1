//! Dynamic values
//!
//! [`Variant`] is what crosses the reflective property interface. Its
//! conversions follow the host scripting engine's coercion rules, so a value
//! reaching a binding through a dynamic lookup converts the same way it would
//! in an uncompiled expression.

use std::fmt;
use std::rc::Rc;

use url::Url;

use crate::object::ObjectRef;

/// A dynamically typed property value
#[derive(Clone, Default)]
pub enum Variant {
    /// No value
    #[default]
    Invalid,
    /// Boolean
    Bool(bool),
    /// 32-bit integer
    Int(i32),
    /// Double precision real
    Real(f64),
    /// Text
    String(String),
    /// Raw bytes (UTF-8 text in practice)
    Bytes(Vec<u8>),
    /// Resource locator
    Url(Url),
    /// Object reference, possibly null
    Object(Option<ObjectRef>),
    /// Structured value type, fields in property order
    Value(Vec<Variant>),
}

impl Variant {
    /// Whether this holds a value
    #[inline]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Coerce to a real; non-numeric text converts to 0
    pub fn to_real(&self) -> f64 {
        match self {
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Int(i) => f64::from(*i),
            Self::Real(r) => *r,
            Self::String(s) => s.trim().parse().unwrap_or(0.0),
            Self::Bytes(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Coerce to a boolean
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Real(r) => *r != 0.0,
            Self::String(s) => text_to_bool(s),
            Self::Bytes(b) => std::str::from_utf8(b).is_ok_and(text_to_bool),
            Self::Url(_) => false,
            Self::Object(o) => o.is_some(),
            Self::Invalid | Self::Value(_) => false,
        }
    }

    /// Coerce to text; objects and value types have no text form
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Real(r) => format_real(*r),
            Self::String(s) => s.clone(),
            Self::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Url(u) => u.to_string(),
            Self::Invalid | Self::Object(_) | Self::Value(_) => String::new(),
        }
    }

    /// The object reference if this holds one
    pub fn to_object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(o) => o.clone(),
            _ => None,
        }
    }
}

fn text_to_bool(s: &str) -> bool {
    !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
}

/// Format a real the way the scripting engine prints numbers
pub fn format_real(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl PartialEq for Variant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Invalid, Self::Invalid) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Url(a), Self::Url(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => match (a, b) {
                (Some(a), Some(b)) => Rc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            },
            (Self::Value(a), Self::Value(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("Invalid"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Real(r) => write!(f, "Real({r})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Bytes(b) => write!(f, "Bytes({b:?})"),
            Self::Url(u) => write!(f, "Url({u})"),
            Self::Object(Some(o)) => write!(f, "Object({})", o.meta_object().name()),
            Self::Object(None) => f.write_str("Object(null)"),
            Self::Value(fields) => f.debug_tuple("Value").field(fields).finish(),
        }
    }
}

impl From<bool> for Variant {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Variant {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for Variant {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Url> for Variant {
    fn from(value: Url) -> Self {
        Self::Url(value)
    }
}

impl From<ObjectRef> for Variant {
    fn from(value: ObjectRef) -> Self {
        Self::Object(Some(value))
    }
}
