//! Compiled binding program
//!
//! Serialized layout (little-endian):
//!
//! ```text
//! header (24 bytes)
//!   u32 bindings, u32 data_length, u32 signal_table_offset, u32 exception_data_offset,
//!   u16 subscriptions, u16 identifiers, u16 instruction_count, u16 prepared
//! data (data_length bytes)
//!   literal strings and interned identifiers, signal table, exception table
//! instructions (instruction_count x 8 bytes)
//! ```
//!
//! The first `bindings` instructions form a jump table: instruction `i` is an
//! unconditional skip to the first instruction of binding `i`.

use std::sync::OnceLock;

use serde::Serialize;

use crate::INSTRUCTION_SIZE;
use crate::error::{BytecodeError, Result};
use crate::instruction::Instruction;
use crate::operand::ExceptionId;
use crate::signal::SignalTable;

/// Size of the serialized header
pub const HEADER_SIZE: usize = 24;

/// Program header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramHeader {
    /// Committed bindings
    pub bindings: u32,
    /// Length of the data blob
    pub data_length: u32,
    /// Byte offset of the signal table within the data blob
    pub signal_table_offset: u32,
    /// Byte offset of the exception table within the data blob
    pub exception_data_offset: u32,
    /// Distinct subscriptions
    pub subscriptions: u16,
    /// Interned identifiers
    pub identifiers: u16,
    /// Instructions including the jump table
    pub instruction_count: u16,
    /// Non-zero once the predecoded dispatch table has been built
    pub prepared: u16,
}

impl ProgramHeader {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.bindings.to_le_bytes());
        out.extend_from_slice(&self.data_length.to_le_bytes());
        out.extend_from_slice(&self.signal_table_offset.to_le_bytes());
        out.extend_from_slice(&self.exception_data_offset.to_le_bytes());
        out.extend_from_slice(&self.subscriptions.to_le_bytes());
        out.extend_from_slice(&self.identifiers.to_le_bytes());
        out.extend_from_slice(&self.instruction_count.to_le_bytes());
        out.extend_from_slice(&self.prepared.to_le_bytes());
    }

    fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(BytecodeError::UnexpectedEnd {
                needed: HEADER_SIZE,
                available: bytes.len(),
            });
        }
        let u32_at = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let u16_at = |at: usize| u16::from_le_bytes([bytes[at], bytes[at + 1]]);
        Ok(Self {
            bindings: u32_at(0),
            data_length: u32_at(4),
            signal_table_offset: u32_at(8),
            exception_data_offset: u32_at(12),
            subscriptions: u16_at(16),
            identifiers: u16_at(18),
            instruction_count: u16_at(20),
            prepared: u16_at(22),
        })
    }
}

/// Everything a compiler hands over to build a [`Program`]
#[derive(Debug, Clone, Default)]
pub struct ProgramParts {
    /// Number of committed bindings
    pub bindings: u32,
    /// Literal strings and interned identifier text
    pub data: Vec<u8>,
    /// Subscription to binding table
    pub signal_table: SignalTable,
    /// Source locations, `line << 32 | column`
    pub exceptions: Vec<u64>,
    /// Interned identifiers
    pub identifiers: u16,
    /// Jump table followed by binding code
    pub instructions: Vec<Instruction>,
}

/// An immutable compiled program shared by every manager instantiated from it
#[derive(Debug)]
pub struct Program {
    header: ProgramHeader,
    data: Box<[u8]>,
    code: Box<[[u8; INSTRUCTION_SIZE]]>,
    signals: SignalTable,
    prepared: OnceLock<Box<[Instruction]>>,
}

impl Program {
    /// Lay out a program from compiler output
    pub fn assemble(parts: ProgramParts) -> Result<Self> {
        let instruction_count = u16::try_from(parts.instructions.len())
            .map_err(|_| BytecodeError::LimitExceeded("more than 65535 instructions"))?;
        let subscriptions = u16::try_from(parts.signal_table.subscription_count())
            .map_err(|_| BytecodeError::LimitExceeded("more than 65535 subscriptions"))?;
        if parts.exceptions.len() > ExceptionId::MAX_ENTRIES {
            return Err(BytecodeError::LimitExceeded("more than 255 exception sites"));
        }

        let mut data = parts.data;
        let signal_table_offset = data.len();
        parts.signal_table.write_to(&mut data);
        let exception_data_offset = data.len();
        for location in &parts.exceptions {
            data.extend_from_slice(&location.to_le_bytes());
        }
        let data_length = u32::try_from(data.len())
            .map_err(|_| BytecodeError::LimitExceeded("data blob larger than 4 GiB"))?;

        let header = ProgramHeader {
            bindings: parts.bindings,
            data_length,
            signal_table_offset: signal_table_offset as u32,
            exception_data_offset: exception_data_offset as u32,
            subscriptions,
            identifiers: parts.identifiers,
            instruction_count,
            prepared: 0,
        };
        let code = parts.instructions.iter().map(Instruction::encode).collect();

        Ok(Self {
            header,
            data: data.into_boxed_slice(),
            code,
            signals: parts.signal_table,
            prepared: OnceLock::new(),
        })
    }

    /// Load a serialized program; the loaded copy starts unprepared
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut header = ProgramHeader::read(bytes)?;
        header.prepared = 0;

        let data_end = HEADER_SIZE + header.data_length as usize;
        let code_end = data_end + header.instruction_count as usize * INSTRUCTION_SIZE;
        if bytes.len() < code_end {
            return Err(BytecodeError::UnexpectedEnd {
                needed: code_end,
                available: bytes.len(),
            });
        }

        let signal_start = header.signal_table_offset as usize;
        let exception_start = header.exception_data_offset as usize;
        let data_len = header.data_length as usize;
        if signal_start > exception_start || exception_start > data_len {
            return Err(BytecodeError::InvalidLayout(format!(
                "table offsets {signal_start}/{exception_start} outside data of {data_len} bytes"
            )));
        }
        if (data_len - exception_start) % 8 != 0
            || (data_len - exception_start) / 8 > ExceptionId::MAX_ENTRIES
        {
            return Err(BytecodeError::InvalidLayout("malformed exception table".into()));
        }
        if header.instruction_count < header.bindings.min(u16::MAX as u32) as u16 {
            return Err(BytecodeError::InvalidLayout(
                "fewer instructions than jump table entries".into(),
            ));
        }

        let data: Box<[u8]> = bytes[HEADER_SIZE..data_end].into();
        let signals = SignalTable::parse(
            &data[signal_start..exception_start],
            header.subscriptions as usize,
            header.bindings,
        )?;
        let code = bytes[data_end..code_end]
            .chunks_exact(INSTRUCTION_SIZE)
            .map(|c| {
                let mut word = [0u8; INSTRUCTION_SIZE];
                word.copy_from_slice(c);
                word
            })
            .collect();

        Ok(Self {
            header,
            data,
            code,
            signals,
            prepared: OnceLock::new(),
        })
    }

    /// Serialize to the blob layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(HEADER_SIZE + self.data.len() + self.code.len() * INSTRUCTION_SIZE);
        self.header().write_to(&mut out);
        out.extend_from_slice(&self.data);
        for word in self.code.iter() {
            out.extend_from_slice(word);
        }
        out
    }

    /// Header with the current prepared state
    pub fn header(&self) -> ProgramHeader {
        ProgramHeader {
            prepared: u16::from(self.is_prepared()),
            ..self.header
        }
    }

    /// Committed bindings
    #[inline]
    pub fn binding_count(&self) -> u32 {
        self.header.bindings
    }

    /// Distinct subscriptions
    #[inline]
    pub fn subscription_count(&self) -> u16 {
        self.header.subscriptions
    }

    /// Interned identifiers
    #[inline]
    pub fn identifier_count(&self) -> u16 {
        self.header.identifiers
    }

    /// Instructions including the jump table
    #[inline]
    pub fn instruction_count(&self) -> usize {
        self.code.len()
    }

    /// Data blob
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Subscription to binding table
    #[inline]
    pub fn signals(&self) -> &SignalTable {
        &self.signals
    }

    /// Encoded instruction
    #[inline]
    pub fn raw_instruction(&self, index: usize) -> Option<&[u8; INSTRUCTION_SIZE]> {
        self.code.get(index)
    }

    /// Decode one instruction
    pub fn decode(&self, index: usize) -> Result<Instruction> {
        let word = self.code.get(index).ok_or(BytecodeError::UnexpectedEnd {
            needed: (index + 1) * INSTRUCTION_SIZE,
            available: self.code.len() * INSTRUCTION_SIZE,
        })?;
        Instruction::decode(word)
    }

    /// Decoded instruction table, built on first use
    pub fn prepare(&self) -> Result<&[Instruction]> {
        if let Some(decoded) = self.prepared.get() {
            return Ok(decoded);
        }
        let decoded = self
            .code
            .iter()
            .map(Instruction::decode)
            .collect::<Result<Box<[Instruction]>>>()?;
        Ok(self.prepared.get_or_init(|| decoded))
    }

    /// Whether [`Program::prepare`] has run
    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared.get().is_some()
    }

    /// Literal string stored at `offset`
    pub fn literal(&self, offset: u32, length: u16) -> Result<&str> {
        let start = offset as usize;
        let bytes = self
            .data
            .get(start..start + length as usize)
            .ok_or(BytecodeError::InvalidString(offset))?;
        std::str::from_utf8(bytes).map_err(|_| BytecodeError::InvalidString(offset))
    }

    /// Length-prefixed identifier text stored at `offset`
    pub fn identifier(&self, offset: u32) -> Result<&str> {
        let start = offset as usize;
        let len = self
            .data
            .get(start..start + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .ok_or(BytecodeError::InvalidString(offset))?;
        let bytes = self
            .data
            .get(start + 4..start + 4 + len)
            .ok_or(BytecodeError::InvalidString(offset))?;
        std::str::from_utf8(bytes).map_err(|_| BytecodeError::InvalidString(offset))
    }

    /// Source `(line, column)` recorded for an exception slot
    pub fn exception_location(&self, id: ExceptionId) -> Option<(u32, u32)> {
        let idx = id.index()?;
        let start = self.header.exception_data_offset as usize + idx * 8;
        let bytes = self.data.get(start..start + 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(bytes);
        let packed = u64::from_le_bytes(word);
        Some(((packed >> 32) as u32, packed as u32))
    }
}
