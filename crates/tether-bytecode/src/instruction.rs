//! Bytecode instructions
//!
//! Every instruction encodes to eight little-endian bytes. Byte 0 is the
//! opcode; the remaining seven bytes hold the operands at fixed positions per
//! operand shape:
//!
//! | shape      | 1      | 2      | 3         | 4..8                        |
//! |------------|--------|--------|-----------|-----------------------------|
//! | binary     | output | lhs    | rhs       |                             |
//! | unary      | output | src    |           |                             |
//! | fetch      | output | object | exception | index                       |
//! | subscribe  | reg    | subscription (2..4) || index                     |
//! | find       | reg    | src    | exception | name (4..6), subscription (6..8) |
//! | literal    | reg    | length / bool (2..4) || immediate / offset       |
//! | skip       | reg    |        |           | count                       |

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};
use crate::operand::{ExceptionId, Reg, SubscriptionIndex};

/// Encoded "no subscription" marker in dynamic lookups
pub const NO_SUBSCRIPTION: u16 = 0xFFFF;

/// Bytecode opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Control ====================
    /// No operation
    Noop = 0x00,
    /// Source position marker emitted when dumping bindings
    BindingId = 0x01,
    /// End of a binding
    Done = 0x02,
    /// Skip forward `count` instructions unless the register holds true
    Skip = 0x03,

    // ==================== Subscription ====================
    /// Connect an object's notify signal to a subscription slot
    Subscribe = 0x10,
    /// Connect a document id to a subscription slot
    SubscribeId = 0x11,
    /// Read through a fast accessor and subscribe to its notifier
    FetchAndSubscribe = 0x12,

    // ==================== Loads ====================
    /// Load the object bound to a document id
    LoadId = 0x18,
    /// Load the scope object
    LoadScope = 0x19,
    /// Load the component root object
    LoadRoot = 0x1A,
    /// Load an attached property object
    LoadAttached = 0x1B,

    // ==================== Conversions ====================
    /// int -> real
    ConvertIntToReal = 0x20,
    /// real -> int (rounded)
    ConvertRealToInt = 0x21,
    /// dynamic -> real
    ConvertGenericToReal = 0x22,
    /// dynamic -> bool
    ConvertGenericToBool = 0x23,
    /// dynamic -> string
    ConvertGenericToString = 0x24,
    /// dynamic -> url
    ConvertGenericToUrl = 0x25,

    // ==================== Literals ====================
    /// Real immediate (32-bit float)
    Real = 0x30,
    /// Int immediate
    Int = 0x31,
    /// Bool immediate
    Bool = 0x32,
    /// Literal string from the data blob
    String = 0x33,
    /// Intern an identifier from the data blob
    InitString = 0x34,

    // ==================== Construction ====================
    /// Construct an empty string
    NewString = 0x38,
    /// Construct an empty url
    NewUrl = 0x39,
    /// Destroy a string register
    CleanupString = 0x3A,
    /// Destroy a url register
    CleanupUrl = 0x3B,
    /// Destroy whatever a dynamic register holds
    CleanupGeneric = 0x3C,

    // ==================== Arithmetic / Comparison ====================
    /// output = lhs + rhs (real)
    AddReal = 0x40,
    /// output = lhs + rhs (int)
    AddInt = 0x41,
    /// output = lhs + rhs (string concatenation)
    AddString = 0x42,
    /// output = lhs - rhs (real)
    MinusReal = 0x43,
    /// output = lhs - rhs (int)
    MinusInt = 0x44,
    /// output = lhs == rhs (real)
    CompareReal = 0x45,
    /// output = lhs == rhs (string)
    CompareString = 0x46,
    /// output = lhs != rhs (real)
    NotCompareReal = 0x47,
    /// output = lhs != rhs (string)
    NotCompareString = 0x48,
    /// output = lhs > rhs (real)
    GreaterThanReal = 0x49,
    /// output = max(lhs, rhs)
    MaxReal = 0x4A,
    /// output = min(lhs, rhs)
    MinReal = 0x4B,

    // ==================== Property Access ====================
    /// Read a property by index
    Fetch = 0x50,
    /// Write the binding's target property
    Store = 0x51,
    /// Register to register copy
    Copy = 0x52,

    // ==================== Dynamic Resolution ====================
    /// Look a name up along the context chain
    FindGeneric = 0x58,
    /// Same, final path segment
    FindGenericTerminal = 0x59,
    /// Look a name up on an object
    FindProperty = 0x5A,
    /// Same, final path segment
    FindPropertyTerminal = 0x5B,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Noop),
            0x01 => Some(Self::BindingId),
            0x02 => Some(Self::Done),
            0x03 => Some(Self::Skip),

            0x10 => Some(Self::Subscribe),
            0x11 => Some(Self::SubscribeId),
            0x12 => Some(Self::FetchAndSubscribe),

            0x18 => Some(Self::LoadId),
            0x19 => Some(Self::LoadScope),
            0x1A => Some(Self::LoadRoot),
            0x1B => Some(Self::LoadAttached),

            0x20 => Some(Self::ConvertIntToReal),
            0x21 => Some(Self::ConvertRealToInt),
            0x22 => Some(Self::ConvertGenericToReal),
            0x23 => Some(Self::ConvertGenericToBool),
            0x24 => Some(Self::ConvertGenericToString),
            0x25 => Some(Self::ConvertGenericToUrl),

            0x30 => Some(Self::Real),
            0x31 => Some(Self::Int),
            0x32 => Some(Self::Bool),
            0x33 => Some(Self::String),
            0x34 => Some(Self::InitString),

            0x38 => Some(Self::NewString),
            0x39 => Some(Self::NewUrl),
            0x3A => Some(Self::CleanupString),
            0x3B => Some(Self::CleanupUrl),
            0x3C => Some(Self::CleanupGeneric),

            0x40 => Some(Self::AddReal),
            0x41 => Some(Self::AddInt),
            0x42 => Some(Self::AddString),
            0x43 => Some(Self::MinusReal),
            0x44 => Some(Self::MinusInt),
            0x45 => Some(Self::CompareReal),
            0x46 => Some(Self::CompareString),
            0x47 => Some(Self::NotCompareReal),
            0x48 => Some(Self::NotCompareString),
            0x49 => Some(Self::GreaterThanReal),
            0x4A => Some(Self::MaxReal),
            0x4B => Some(Self::MinReal),

            0x50 => Some(Self::Fetch),
            0x51 => Some(Self::Store),
            0x52 => Some(Self::Copy),

            0x58 => Some(Self::FindGeneric),
            0x59 => Some(Self::FindGenericTerminal),
            0x5A => Some(Self::FindProperty),
            0x5B => Some(Self::FindPropertyTerminal),

            _ => None,
        }
    }

    /// Opcode byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Name used in disassembly
    pub const fn name(self) -> &'static str {
        match self {
            Self::Noop => "Noop",
            Self::BindingId => "BindingId",
            Self::Done => "Done",
            Self::Skip => "Skip",
            Self::Subscribe => "Subscribe",
            Self::SubscribeId => "SubscribeId",
            Self::FetchAndSubscribe => "FetchAndSubscribe",
            Self::LoadId => "LoadId",
            Self::LoadScope => "LoadScope",
            Self::LoadRoot => "LoadRoot",
            Self::LoadAttached => "LoadAttached",
            Self::ConvertIntToReal => "ConvertIntToReal",
            Self::ConvertRealToInt => "ConvertRealToInt",
            Self::ConvertGenericToReal => "ConvertGenericToReal",
            Self::ConvertGenericToBool => "ConvertGenericToBool",
            Self::ConvertGenericToString => "ConvertGenericToString",
            Self::ConvertGenericToUrl => "ConvertGenericToUrl",
            Self::Real => "Real",
            Self::Int => "Int",
            Self::Bool => "Bool",
            Self::String => "String",
            Self::InitString => "InitString",
            Self::NewString => "NewString",
            Self::NewUrl => "NewUrl",
            Self::CleanupString => "CleanupString",
            Self::CleanupUrl => "CleanupUrl",
            Self::CleanupGeneric => "CleanupGeneric",
            Self::AddReal => "AddReal",
            Self::AddInt => "AddInt",
            Self::AddString => "AddString",
            Self::MinusReal => "MinusReal",
            Self::MinusInt => "MinusInt",
            Self::CompareReal => "CompareReal",
            Self::CompareString => "CompareString",
            Self::NotCompareReal => "NotCompareReal",
            Self::NotCompareString => "NotCompareString",
            Self::GreaterThanReal => "GreaterThanReal",
            Self::MaxReal => "MaxReal",
            Self::MinReal => "MinReal",
            Self::Fetch => "Fetch",
            Self::Store => "Store",
            Self::Copy => "Copy",
            Self::FindGeneric => "FindGeneric",
            Self::FindGenericTerminal => "FindGenericTerminal",
            Self::FindProperty => "FindProperty",
            Self::FindPropertyTerminal => "FindPropertyTerminal",
        }
    }
}

/// Decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    // ==================== Control ====================
    /// No operation
    Noop,
    /// Source position of the binding that follows
    BindingId {
        /// Source line
        line: u32,
        /// Source column
        column: u16,
    },
    /// End of a binding
    Done,
    /// Skip `count` instructions when `reg` is absent (always) or not true
    Skip {
        /// Condition register, `None` for an unconditional skip
        reg: Option<Reg>,
        /// Instructions to skip
        count: u32,
    },

    // ==================== Subscription ====================
    /// Subscribe to `notify` on the object in `reg`
    Subscribe {
        /// Object register
        reg: Reg,
        /// Subscription slot
        subscription: SubscriptionIndex,
        /// Notify signal
        notify: u32,
    },
    /// Subscribe to changes of document id `id`
    SubscribeId {
        /// Subscription slot
        subscription: SubscriptionIndex,
        /// Id index in the context
        id: u32,
    },
    /// Fast accessor read plus subscription
    FetchAndSubscribe {
        /// Destination
        output: Reg,
        /// Object register
        object: Reg,
        /// Exception slot
        exception: ExceptionId,
        /// Subscription slot
        subscription: SubscriptionIndex,
        /// Fast accessor index
        accessor: u16,
    },

    // ==================== Loads ====================
    /// reg = document id object
    LoadId {
        /// Destination
        reg: Reg,
        /// Id index in the context
        id: u32,
    },
    /// reg = scope object
    LoadScope {
        /// Destination
        reg: Reg,
    },
    /// reg = component root object
    LoadRoot {
        /// Destination
        reg: Reg,
    },
    /// output = attached object of type `id` for the object in `object`
    LoadAttached {
        /// Destination
        output: Reg,
        /// Owner object register
        object: Reg,
        /// Exception slot
        exception: ExceptionId,
        /// Attached type id
        id: u32,
    },

    // ==================== Conversions ====================
    /// output = real(src)
    ConvertIntToReal {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },
    /// output = round(src)
    ConvertRealToInt {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },
    /// output = dynamic src as real
    ConvertGenericToReal {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },
    /// output = dynamic src as bool
    ConvertGenericToBool {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },
    /// output = dynamic src as string
    ConvertGenericToString {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },
    /// output = dynamic src as url
    ConvertGenericToUrl {
        /// Destination
        output: Reg,
        /// Source
        src: Reg,
    },

    // ==================== Literals ====================
    /// reg = real immediate
    Real {
        /// Destination
        reg: Reg,
        /// Value
        value: f32,
    },
    /// reg = int immediate
    Int {
        /// Destination
        reg: Reg,
        /// Value
        value: i32,
    },
    /// reg = bool immediate
    Bool {
        /// Destination
        reg: Reg,
        /// Value
        value: bool,
    },
    /// reg = literal string at data\[offset..offset + length\]
    String {
        /// Destination
        reg: Reg,
        /// Byte offset into the data blob
        offset: u32,
        /// Byte length
        length: u16,
    },
    /// Intern identifier `identifier` from the length-prefixed text at data\[offset\]
    InitString {
        /// Identifier table index
        identifier: u16,
        /// Byte offset into the data blob
        offset: u32,
    },

    // ==================== Construction ====================
    /// reg = ""
    NewString {
        /// Destination
        reg: Reg,
    },
    /// reg = empty url
    NewUrl {
        /// Destination
        reg: Reg,
    },
    /// Destroy the string in reg
    CleanupString {
        /// Register
        reg: Reg,
    },
    /// Destroy the url in reg
    CleanupUrl {
        /// Register
        reg: Reg,
    },
    /// Destroy whatever reg holds
    CleanupGeneric {
        /// Register
        reg: Reg,
    },

    // ==================== Arithmetic / Comparison ====================
    /// output = lhs + rhs
    AddReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs + rhs
    AddInt {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs + rhs
    AddString {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs - rhs
    MinusReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs - rhs
    MinusInt {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs == rhs
    CompareReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs == rhs
    CompareString {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs != rhs
    NotCompareReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs != rhs
    NotCompareString {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = lhs > rhs
    GreaterThanReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = max(lhs, rhs)
    MaxReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },
    /// output = min(lhs, rhs)
    MinReal {
        /// Destination
        output: Reg,
        /// Left operand
        lhs: Reg,
        /// Right operand
        rhs: Reg,
    },

    // ==================== Property Access ====================
    /// output = object.property\[index\]
    Fetch {
        /// Destination
        output: Reg,
        /// Object register
        object: Reg,
        /// Exception slot
        exception: ExceptionId,
        /// Property index
        index: u32,
    },
    /// target.property\[index\] = reg
    Store {
        /// Value register
        reg: Reg,
        /// Exception slot
        exception: ExceptionId,
        /// Property index on the target
        index: u32,
    },
    /// reg = src
    Copy {
        /// Destination
        reg: Reg,
        /// Source
        src: Reg,
    },

    // ==================== Dynamic Resolution ====================
    /// reg = lookup of identifier `name` along the context chain
    FindGeneric {
        /// Destination
        reg: Reg,
        /// Identifier table index
        name: u16,
        /// Subscription slot, if the lookup is tracked
        subscription: Option<SubscriptionIndex>,
        /// Exception slot
        exception: ExceptionId,
        /// Last path segment
        terminal: bool,
    },
    /// reg = lookup of identifier `name` on the object in `src`
    FindProperty {
        /// Destination
        reg: Reg,
        /// Object register
        src: Reg,
        /// Identifier table index
        name: u16,
        /// Subscription slot, if the lookup is tracked
        subscription: Option<SubscriptionIndex>,
        /// Exception slot
        exception: ExceptionId,
        /// Last path segment
        terminal: bool,
    },
}

struct Word([u8; 8]);

impl Word {
    fn new(op: Opcode) -> Self {
        let mut bytes = [0u8; 8];
        bytes[0] = op.to_byte();
        Self(bytes)
    }

    fn u8(&mut self, at: usize, v: u8) {
        self.0[at] = v;
    }

    fn reg(&mut self, at: usize, reg: Reg) {
        self.0[at] = reg.to_raw() as u8;
    }

    fn u16(&mut self, at: usize, v: u16) {
        self.0[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, at: usize, v: u32) {
        self.0[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8; 8],
    op: Opcode,
}

impl Reader<'_> {
    fn u8(&self, at: usize) -> u8 {
        self.bytes[at]
    }

    fn raw_reg(&self, at: usize) -> i8 {
        self.bytes[at] as i8
    }

    fn reg(&self, at: usize) -> Result<Reg> {
        let raw = self.raw_reg(at);
        Reg::from_raw(raw).ok_or(BytecodeError::InvalidRegister {
            opcode: self.op.name(),
            operand: raw,
        })
    }

    fn u16(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.bytes[at], self.bytes[at + 1]])
    }

    fn u32(&self, at: usize) -> u32 {
        u32::from_le_bytes([
            self.bytes[at],
            self.bytes[at + 1],
            self.bytes[at + 2],
            self.bytes[at + 3],
        ])
    }

    fn exception(&self, at: usize) -> ExceptionId {
        ExceptionId(self.u8(at))
    }

    fn subscription(&self, at: usize) -> Option<SubscriptionIndex> {
        match self.u16(at) {
            NO_SUBSCRIPTION => None,
            idx => Some(idx),
        }
    }
}

impl Instruction {
    /// Opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Noop => Opcode::Noop,
            Self::BindingId { .. } => Opcode::BindingId,
            Self::Done => Opcode::Done,
            Self::Skip { .. } => Opcode::Skip,
            Self::Subscribe { .. } => Opcode::Subscribe,
            Self::SubscribeId { .. } => Opcode::SubscribeId,
            Self::FetchAndSubscribe { .. } => Opcode::FetchAndSubscribe,
            Self::LoadId { .. } => Opcode::LoadId,
            Self::LoadScope { .. } => Opcode::LoadScope,
            Self::LoadRoot { .. } => Opcode::LoadRoot,
            Self::LoadAttached { .. } => Opcode::LoadAttached,
            Self::ConvertIntToReal { .. } => Opcode::ConvertIntToReal,
            Self::ConvertRealToInt { .. } => Opcode::ConvertRealToInt,
            Self::ConvertGenericToReal { .. } => Opcode::ConvertGenericToReal,
            Self::ConvertGenericToBool { .. } => Opcode::ConvertGenericToBool,
            Self::ConvertGenericToString { .. } => Opcode::ConvertGenericToString,
            Self::ConvertGenericToUrl { .. } => Opcode::ConvertGenericToUrl,
            Self::Real { .. } => Opcode::Real,
            Self::Int { .. } => Opcode::Int,
            Self::Bool { .. } => Opcode::Bool,
            Self::String { .. } => Opcode::String,
            Self::InitString { .. } => Opcode::InitString,
            Self::NewString { .. } => Opcode::NewString,
            Self::NewUrl { .. } => Opcode::NewUrl,
            Self::CleanupString { .. } => Opcode::CleanupString,
            Self::CleanupUrl { .. } => Opcode::CleanupUrl,
            Self::CleanupGeneric { .. } => Opcode::CleanupGeneric,
            Self::AddReal { .. } => Opcode::AddReal,
            Self::AddInt { .. } => Opcode::AddInt,
            Self::AddString { .. } => Opcode::AddString,
            Self::MinusReal { .. } => Opcode::MinusReal,
            Self::MinusInt { .. } => Opcode::MinusInt,
            Self::CompareReal { .. } => Opcode::CompareReal,
            Self::CompareString { .. } => Opcode::CompareString,
            Self::NotCompareReal { .. } => Opcode::NotCompareReal,
            Self::NotCompareString { .. } => Opcode::NotCompareString,
            Self::GreaterThanReal { .. } => Opcode::GreaterThanReal,
            Self::MaxReal { .. } => Opcode::MaxReal,
            Self::MinReal { .. } => Opcode::MinReal,
            Self::Fetch { .. } => Opcode::Fetch,
            Self::Store { .. } => Opcode::Store,
            Self::Copy { .. } => Opcode::Copy,
            Self::FindGeneric { terminal: false, .. } => Opcode::FindGeneric,
            Self::FindGeneric { terminal: true, .. } => Opcode::FindGenericTerminal,
            Self::FindProperty { terminal: false, .. } => Opcode::FindProperty,
            Self::FindProperty { terminal: true, .. } => Opcode::FindPropertyTerminal,
        }
    }

    /// Register whose construction this instruction destroys, if it is a cleanup
    pub fn cleanup_register(&self) -> Option<Reg> {
        match *self {
            Self::CleanupString { reg } | Self::CleanupUrl { reg } | Self::CleanupGeneric { reg } => {
                Some(reg)
            }
            _ => None,
        }
    }

    /// Encode to eight bytes
    pub fn encode(&self) -> [u8; 8] {
        let mut w = Word::new(self.opcode());
        match *self {
            Self::Noop | Self::Done => {}
            Self::BindingId { line, column } => {
                w.u16(2, column);
                w.u32(4, line);
            }
            Self::Skip { reg, count } => {
                w.u8(1, reg.map_or(-1, Reg::to_raw) as u8);
                w.u32(4, count);
            }
            Self::Subscribe {
                reg,
                subscription,
                notify,
            } => {
                w.reg(1, reg);
                w.u16(2, subscription);
                w.u32(4, notify);
            }
            Self::SubscribeId { subscription, id } => {
                w.u16(2, subscription);
                w.u32(4, id);
            }
            Self::FetchAndSubscribe {
                output,
                object,
                exception,
                subscription,
                accessor,
            } => {
                w.reg(1, output);
                w.reg(2, object);
                w.u8(3, exception.0);
                w.u16(4, subscription);
                w.u16(6, accessor);
            }
            Self::LoadId { reg, id } => {
                w.reg(1, reg);
                w.u32(4, id);
            }
            Self::LoadScope { reg }
            | Self::LoadRoot { reg }
            | Self::NewString { reg }
            | Self::NewUrl { reg }
            | Self::CleanupString { reg }
            | Self::CleanupUrl { reg }
            | Self::CleanupGeneric { reg } => w.reg(1, reg),
            Self::LoadAttached {
                output,
                object,
                exception,
                id: index,
            }
            | Self::Fetch {
                output,
                object,
                exception,
                index,
            } => {
                w.reg(1, output);
                w.reg(2, object);
                w.u8(3, exception.0);
                w.u32(4, index);
            }
            Self::ConvertIntToReal { output, src }
            | Self::ConvertRealToInt { output, src }
            | Self::ConvertGenericToReal { output, src }
            | Self::ConvertGenericToBool { output, src }
            | Self::ConvertGenericToString { output, src }
            | Self::ConvertGenericToUrl { output, src }
            | Self::Copy { reg: output, src } => {
                w.reg(1, output);
                w.reg(2, src);
            }
            Self::Real { reg, value } => {
                w.reg(1, reg);
                w.u32(4, value.to_bits());
            }
            Self::Int { reg, value } => {
                w.reg(1, reg);
                w.u32(4, value as u32);
            }
            Self::Bool { reg, value } => {
                w.reg(1, reg);
                w.u8(2, u8::from(value));
            }
            Self::String { reg, offset, length } => {
                w.reg(1, reg);
                w.u16(2, length);
                w.u32(4, offset);
            }
            Self::InitString { identifier, offset } => {
                w.u16(2, identifier);
                w.u32(4, offset);
            }
            Self::AddReal { output, lhs, rhs }
            | Self::AddInt { output, lhs, rhs }
            | Self::AddString { output, lhs, rhs }
            | Self::MinusReal { output, lhs, rhs }
            | Self::MinusInt { output, lhs, rhs }
            | Self::CompareReal { output, lhs, rhs }
            | Self::CompareString { output, lhs, rhs }
            | Self::NotCompareReal { output, lhs, rhs }
            | Self::NotCompareString { output, lhs, rhs }
            | Self::GreaterThanReal { output, lhs, rhs }
            | Self::MaxReal { output, lhs, rhs }
            | Self::MinReal { output, lhs, rhs } => {
                w.reg(1, output);
                w.reg(2, lhs);
                w.reg(3, rhs);
            }
            Self::Store {
                reg,
                exception,
                index,
            } => {
                w.reg(2, reg);
                w.u8(3, exception.0);
                w.u32(4, index);
            }
            Self::FindGeneric {
                reg,
                name,
                subscription,
                exception,
                ..
            } => {
                w.reg(1, reg);
                w.u8(2, 0xFF);
                w.u8(3, exception.0);
                w.u16(4, name);
                w.u16(6, subscription.unwrap_or(NO_SUBSCRIPTION));
            }
            Self::FindProperty {
                reg,
                src,
                name,
                subscription,
                exception,
                ..
            } => {
                w.reg(1, reg);
                w.reg(2, src);
                w.u8(3, exception.0);
                w.u16(4, name);
                w.u16(6, subscription.unwrap_or(NO_SUBSCRIPTION));
            }
        }
        w.0
    }

    /// Decode eight bytes
    pub fn decode(bytes: &[u8; 8]) -> Result<Self> {
        let op = Opcode::from_byte(bytes[0]).ok_or(BytecodeError::InvalidOpcode(bytes[0]))?;
        let r = Reader { bytes, op };

        let unary = |r: &Reader<'_>| -> Result<(Reg, Reg)> { Ok((r.reg(1)?, r.reg(2)?)) };
        let binary = |r: &Reader<'_>| -> Result<(Reg, Reg, Reg)> {
            Ok((r.reg(1)?, r.reg(2)?, r.reg(3)?))
        };

        Ok(match op {
            Opcode::Noop => Self::Noop,
            Opcode::Done => Self::Done,
            Opcode::BindingId => Self::BindingId {
                line: r.u32(4),
                column: r.u16(2),
            },
            Opcode::Skip => Self::Skip {
                reg: match r.raw_reg(1) {
                    -1 => None,
                    _ => Some(r.reg(1)?),
                },
                count: r.u32(4),
            },
            Opcode::Subscribe => Self::Subscribe {
                reg: r.reg(1)?,
                subscription: r.u16(2),
                notify: r.u32(4),
            },
            Opcode::SubscribeId => Self::SubscribeId {
                subscription: r.u16(2),
                id: r.u32(4),
            },
            Opcode::FetchAndSubscribe => Self::FetchAndSubscribe {
                output: r.reg(1)?,
                object: r.reg(2)?,
                exception: r.exception(3),
                subscription: r.u16(4),
                accessor: r.u16(6),
            },
            Opcode::LoadId => Self::LoadId {
                reg: r.reg(1)?,
                id: r.u32(4),
            },
            Opcode::LoadScope => Self::LoadScope { reg: r.reg(1)? },
            Opcode::LoadRoot => Self::LoadRoot { reg: r.reg(1)? },
            Opcode::LoadAttached => Self::LoadAttached {
                output: r.reg(1)?,
                object: r.reg(2)?,
                exception: r.exception(3),
                id: r.u32(4),
            },
            Opcode::ConvertIntToReal => {
                let (output, src) = unary(&r)?;
                Self::ConvertIntToReal { output, src }
            }
            Opcode::ConvertRealToInt => {
                let (output, src) = unary(&r)?;
                Self::ConvertRealToInt { output, src }
            }
            Opcode::ConvertGenericToReal => {
                let (output, src) = unary(&r)?;
                Self::ConvertGenericToReal { output, src }
            }
            Opcode::ConvertGenericToBool => {
                let (output, src) = unary(&r)?;
                Self::ConvertGenericToBool { output, src }
            }
            Opcode::ConvertGenericToString => {
                let (output, src) = unary(&r)?;
                Self::ConvertGenericToString { output, src }
            }
            Opcode::ConvertGenericToUrl => {
                let (output, src) = unary(&r)?;
                Self::ConvertGenericToUrl { output, src }
            }
            Opcode::Real => Self::Real {
                reg: r.reg(1)?,
                value: f32::from_bits(r.u32(4)),
            },
            Opcode::Int => Self::Int {
                reg: r.reg(1)?,
                value: r.u32(4) as i32,
            },
            Opcode::Bool => Self::Bool {
                reg: r.reg(1)?,
                value: r.u8(2) != 0,
            },
            Opcode::String => Self::String {
                reg: r.reg(1)?,
                offset: r.u32(4),
                length: r.u16(2),
            },
            Opcode::InitString => Self::InitString {
                identifier: r.u16(2),
                offset: r.u32(4),
            },
            Opcode::NewString => Self::NewString { reg: r.reg(1)? },
            Opcode::NewUrl => Self::NewUrl { reg: r.reg(1)? },
            Opcode::CleanupString => Self::CleanupString { reg: r.reg(1)? },
            Opcode::CleanupUrl => Self::CleanupUrl { reg: r.reg(1)? },
            Opcode::CleanupGeneric => Self::CleanupGeneric { reg: r.reg(1)? },
            Opcode::AddReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::AddReal { output, lhs, rhs }
            }
            Opcode::AddInt => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::AddInt { output, lhs, rhs }
            }
            Opcode::AddString => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::AddString { output, lhs, rhs }
            }
            Opcode::MinusReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::MinusReal { output, lhs, rhs }
            }
            Opcode::MinusInt => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::MinusInt { output, lhs, rhs }
            }
            Opcode::CompareReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::CompareReal { output, lhs, rhs }
            }
            Opcode::CompareString => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::CompareString { output, lhs, rhs }
            }
            Opcode::NotCompareReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::NotCompareReal { output, lhs, rhs }
            }
            Opcode::NotCompareString => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::NotCompareString { output, lhs, rhs }
            }
            Opcode::GreaterThanReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::GreaterThanReal { output, lhs, rhs }
            }
            Opcode::MaxReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::MaxReal { output, lhs, rhs }
            }
            Opcode::MinReal => {
                let (output, lhs, rhs) = binary(&r)?;
                Self::MinReal { output, lhs, rhs }
            }
            Opcode::Fetch => Self::Fetch {
                output: r.reg(1)?,
                object: r.reg(2)?,
                exception: r.exception(3),
                index: r.u32(4),
            },
            Opcode::Store => Self::Store {
                reg: r.reg(2)?,
                exception: r.exception(3),
                index: r.u32(4),
            },
            Opcode::Copy => {
                let (reg, src) = unary(&r)?;
                Self::Copy { reg, src }
            }
            Opcode::FindGeneric | Opcode::FindGenericTerminal => Self::FindGeneric {
                reg: r.reg(1)?,
                name: r.u16(4),
                subscription: r.subscription(6),
                exception: r.exception(3),
                terminal: op == Opcode::FindGenericTerminal,
            },
            Opcode::FindProperty | Opcode::FindPropertyTerminal => Self::FindProperty {
                reg: r.reg(1)?,
                src: r.reg(2)?,
                name: r.u16(4),
                subscription: r.subscription(6),
                exception: r.exception(3),
                terminal: op == Opcode::FindPropertyTerminal,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op.to_byte(), byte);
            }
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert_eq!(
            Instruction::decode(&[0xEE, 0, 0, 0, 0, 0, 0, 0]),
            Err(BytecodeError::InvalidOpcode(0xEE))
        );
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::FetchAndSubscribe.name(), "FetchAndSubscribe");
        assert_eq!(Opcode::FindPropertyTerminal.name(), "FindPropertyTerminal");
    }

    #[test]
    fn test_skip_sentinel_encoding() {
        let always = Instruction::Skip {
            reg: None,
            count: 3,
        };
        let bytes = always.encode();
        assert_eq!(bytes, [0x03, 0xFF, 0, 0, 3, 0, 0, 0]);
        assert_eq!(Instruction::decode(&bytes), Ok(always));

        let cond = Instruction::Skip {
            reg: Some(Reg(2)),
            count: 1,
        };
        assert_eq!(Instruction::decode(&cond.encode()), Ok(cond));
    }

    #[test]
    fn test_find_encoding_marks_terminal_in_opcode() {
        let find = Instruction::FindProperty {
            reg: Reg(1),
            src: Reg(1),
            name: 2,
            subscription: None,
            exception: ExceptionId(0),
            terminal: true,
        };
        let bytes = find.encode();
        assert_eq!(bytes[0], Opcode::FindPropertyTerminal.to_byte());
        assert_eq!(&bytes[6..8], &[0xFF, 0xFF]);
        assert_eq!(Instruction::decode(&bytes), Ok(find));
    }

    #[test]
    fn test_real_immediate_bits() {
        let real = Instruction::Real {
            reg: Reg(0),
            value: 1.5,
        };
        let bytes = real.encode();
        assert_eq!(&bytes[4..8], &1.5f32.to_le_bytes());
        assert_eq!(Instruction::decode(&bytes), Ok(real));
    }

    #[test]
    fn test_bad_register_rejected() {
        let mut bytes = Instruction::LoadScope { reg: Reg(0) }.encode();
        bytes[1] = 40;
        assert!(matches!(
            Instruction::decode(&bytes),
            Err(BytecodeError::InvalidRegister { operand: 40, .. })
        ));
    }

    #[test]
    fn test_cleanup_register() {
        assert_eq!(
            Instruction::CleanupUrl { reg: Reg(4) }.cleanup_register(),
            Some(Reg(4))
        );
        assert_eq!(Instruction::Done.cleanup_register(), None);
    }
}
