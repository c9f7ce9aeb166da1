//! Bytecode operands

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::REGISTER_COUNT;

/// Working register (0-31)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Reg(pub u8);

impl Reg {
    /// Create a new register operand
    #[inline]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Register index
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Decode a raw operand; negative and out-of-range values are not registers
    #[inline]
    pub const fn from_raw(raw: i8) -> Option<Self> {
        if raw >= 0 && (raw as usize) < REGISTER_COUNT {
            Some(Self(raw as u8))
        } else {
            None
        }
    }

    /// Raw operand byte
    #[inline]
    pub const fn to_raw(self) -> i8 {
        self.0 as i8
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Index into a manager's subscription array
pub type SubscriptionIndex = u16;

/// Slot in the program's exception table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ExceptionId(pub u8);

impl ExceptionId {
    /// Sentinel for "no source location"
    pub const NONE: Self = Self(0xFF);

    /// Maximum number of real exception slots per program
    pub const MAX_ENTRIES: usize = 0xFF;

    /// Table index, unless this is the sentinel
    #[inline]
    pub const fn index(self) -> Option<usize> {
        if self.0 == Self::NONE.0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

impl fmt::Display for ExceptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index() {
            Some(idx) => write!(f, "e{idx}"),
            None => f.write_str("e-"),
        }
    }
}
