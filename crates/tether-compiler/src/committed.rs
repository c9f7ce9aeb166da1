//! Committed bindings and program assembly

use rustc_hash::FxHashMap;
use tether_bytecode::{Instruction, Program, ProgramParts, SignalTable};

use crate::codegen::PendingBinding;
use crate::error::{CompileError, CompileResult};

/// Interned identifier: table index and data offset of its length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisteredString {
    /// Identifier index
    pub index: u16,
    /// Offset of the length-prefixed bytes in the data region
    pub offset: u32,
}

/// Everything accepted so far for one document
#[derive(Debug, Default)]
pub struct Committed {
    data: Vec<u8>,
    exceptions: Vec<u64>,
    subscription_ids: FxHashMap<String, u16>,
    strings: FxHashMap<String, RegisteredString>,
    offsets: Vec<u32>,
    dependencies: Vec<Vec<u16>>,
    bytecode: Vec<Instruction>,
}

impl Committed {
    pub(crate) fn commit(&mut self, pending: PendingBinding) -> CompileResult<u32> {
        // One jump-table entry per binding precedes all bodies.
        let total = self.offsets.len() + 1 + self.bytecode.len() + pending.code.len();
        if total > u16::MAX as usize {
            return Err(CompileError::TooManyInstructions);
        }

        let index = self.offsets.len() as u32;
        self.offsets.push(self.bytecode.len() as u32);
        self.dependencies.push(pending.dependencies);
        self.bytecode.extend(pending.code);
        self.data.extend(pending.data);
        self.exceptions.extend(pending.exceptions);
        self.subscription_ids.extend(pending.subscriptions);
        self.strings.extend(pending.strings);
        Ok(index)
    }

    /// Assemble the program: jump table, bodies, data, signal and exception tables
    pub fn assemble(&self) -> CompileResult<Program> {
        let count = self.offsets.len();
        let mut instructions = Vec::with_capacity(count + self.bytecode.len());
        for (ii, &offset) in self.offsets.iter().enumerate() {
            instructions.push(Instruction::Skip {
                reg: None,
                count: (count - ii - 1) as u32 + offset,
            });
        }
        instructions.extend_from_slice(&self.bytecode);

        let program = Program::assemble(ProgramParts {
            bindings: count as u32,
            data: self.data.clone(),
            signal_table: SignalTable::build(self.subscription_ids.len(), &self.dependencies),
            exceptions: self.exceptions.clone(),
            identifiers: self.strings.len() as u16,
            instructions,
        })?;
        Ok(program)
    }

    /// Number of committed bindings
    pub fn binding_count(&self) -> u32 {
        self.offsets.len() as u32
    }

    /// Bytes in the data region
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Distinct subscriptions across all bindings
    pub fn subscription_count(&self) -> usize {
        self.subscription_ids.len()
    }

    /// Interned identifiers
    pub fn identifier_count(&self) -> usize {
        self.strings.len()
    }

    /// Exception-table entries
    pub fn exception_count(&self) -> usize {
        self.exceptions.len()
    }

    /// Body instructions, excluding the jump table
    pub fn instruction_count(&self) -> usize {
        self.bytecode.len()
    }

    /// Index of a canonical subscription name
    pub fn subscription_id(&self, name: &str) -> Option<u16> {
        self.subscription_ids.get(name).copied()
    }

    /// Interned identifier by text
    pub fn string(&self, name: &str) -> Option<RegisteredString> {
        self.strings.get(name).copied()
    }

    /// Body of binding `index`
    pub fn binding_code(&self, index: u32) -> Option<&[Instruction]> {
        let start = *self.offsets.get(index as usize)? as usize;
        let end = self
            .offsets
            .get(index as usize + 1)
            .map_or(self.bytecode.len(), |&o| o as usize);
        self.bytecode.get(start..end)
    }

    /// Subscriptions binding `index` depends on, ascending
    pub fn dependencies(&self, index: u32) -> Option<&[u16]> {
        self.dependencies.get(index as usize).map(Vec::as_slice)
    }
}
