//! Per-binding code generation state
//!
//! A [`CodeGen`] holds everything one binding appends to the program. Shared
//! tables (data, identifiers, subscriptions, exceptions) are read through the
//! committed accumulator and extended only in local deltas, so a rejected
//! binding leaves nothing behind.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};
use tether_bytecode::{ExceptionId, Instruction, REGISTER_COUNT, Reg};

use crate::ast::SourceLocation;
use crate::committed::{Committed, RegisteredString};
use crate::error::{CompileError, CompileResult};

/// Destruction a register needs once its value is consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cleanup {
    /// Owned text
    String,
    /// Owned URL
    Url,
    /// Dynamic payload
    Generic,
}

impl Cleanup {
    /// Instruction that performs this cleanup on `reg`
    pub fn instruction(self, reg: Reg) -> Instruction {
        match self {
            Self::String => Instruction::CleanupString { reg },
            Self::Url => Instruction::CleanupUrl { reg },
            Self::Generic => Instruction::CleanupGeneric { reg },
        }
    }
}

/// Register allocator with pending cleanups
#[derive(Debug)]
pub struct RegisterAllocator {
    /// Bit per live register
    live: u32,
    /// Cleanup owed by each live register
    cleanups: [Option<Cleanup>; REGISTER_COUNT],
    /// Highest number of registers live at once
    max: usize,
}

impl RegisterAllocator {
    /// Create an allocator with every register free
    pub fn new() -> Self {
        Self {
            live: 0,
            cleanups: [None; REGISTER_COUNT],
            max: 0,
        }
    }

    /// Acquire the lowest free register
    pub fn acquire(&mut self, cleanup: Option<Cleanup>) -> CompileResult<Reg> {
        let index = (!self.live).trailing_zeros() as usize;
        if index >= REGISTER_COUNT {
            return Err(CompileError::RegistersExhausted);
        }
        self.live |= 1 << index;
        self.cleanups[index] = cleanup;
        self.max = self.max.max(self.live.count_ones() as usize);
        Ok(Reg(index as u8))
    }

    /// Replace the cleanup owed by a live register
    pub fn set_cleanup(&mut self, reg: Reg, cleanup: Option<Cleanup>) {
        debug_assert!(self.is_live(reg), "cleanup set on free register {reg}");
        self.cleanups[reg.index()] = cleanup;
    }

    /// Cleanup owed by `reg`
    pub fn cleanup(&self, reg: Reg) -> Option<Cleanup> {
        self.cleanups[reg.index()]
    }

    /// Free `reg`, returning the cleanup instruction to emit
    #[must_use]
    pub fn release(&mut self, reg: Reg) -> Option<Instruction> {
        debug_assert!(self.is_live(reg), "release of free register {reg}");
        self.forget(reg).map(|c| c.instruction(reg))
    }

    /// Free `reg` without emitting its cleanup, handing the cleanup back.
    ///
    /// Used where another code path takes over ownership of the value.
    pub fn forget(&mut self, reg: Reg) -> Option<Cleanup> {
        self.live &= !(1 << reg.index());
        self.cleanups[reg.index()].take()
    }

    /// Whether `reg` is acquired
    #[inline]
    pub fn is_live(&self, reg: Reg) -> bool {
        self.live & (1 << reg.index()) != 0
    }

    /// Number of live registers
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live.count_ones() as usize
    }

    /// Highest number of registers live at once
    #[inline]
    pub fn max_used(&self) -> usize {
        self.max
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Output of one successful binding compile, not yet committed
#[derive(Debug, Default)]
pub(crate) struct PendingBinding {
    pub code: Vec<Instruction>,
    pub data: Vec<u8>,
    pub exceptions: Vec<u64>,
    pub subscriptions: Vec<(String, u16)>,
    pub strings: Vec<(String, RegisteredString)>,
    pub dependencies: Vec<u16>,
    pub registers: usize,
}

/// Code generator for one binding
pub(crate) struct CodeGen<'c> {
    committed: &'c Committed,
    pub registers: RegisterAllocator,
    code: Vec<Instruction>,
    data: Vec<u8>,
    exceptions: Vec<u64>,
    subscription_ids: FxHashMap<String, u16>,
    subscription_order: Vec<String>,
    strings: FxHashMap<String, RegisteredString>,
    string_order: Vec<String>,
    used_subscriptions: BTreeSet<u16>,
    subscribed: FxHashSet<String>,
}

impl<'c> CodeGen<'c> {
    pub fn new(committed: &'c Committed) -> Self {
        Self {
            committed,
            registers: RegisterAllocator::new(),
            code: Vec::new(),
            data: Vec::new(),
            exceptions: Vec::new(),
            subscription_ids: FxHashMap::default(),
            subscription_order: Vec::new(),
            strings: FxHashMap::default(),
            string_order: Vec::new(),
            used_subscriptions: BTreeSet::new(),
            subscribed: FxHashSet::default(),
        }
    }

    /// Emit an instruction, returning its index
    pub fn emit(&mut self, instruction: Instruction) -> usize {
        let index = self.code.len();
        self.code.push(instruction);
        index
    }

    /// Free a register, emitting its cleanup
    pub fn release(&mut self, reg: Reg) {
        if let Some(cleanup) = self.registers.release(reg) {
            self.emit(cleanup);
        }
    }

    /// Point the skip at `index` to the next instruction to be emitted
    pub fn patch_skip(&mut self, index: usize) {
        let target = self.code.len();
        match &mut self.code[index] {
            Instruction::Skip { count, .. } => *count = (target - index - 1) as u32,
            other => unreachable!("patch_skip on {other:?}"),
        }
    }

    /// Exception-table entry for `loc`; the sentinel once the table is full
    pub fn exception_id(&mut self, loc: SourceLocation) -> ExceptionId {
        let index = self.committed.exception_count() + self.exceptions.len();
        if index >= ExceptionId::MAX_ENTRIES {
            return ExceptionId::NONE;
        }
        self.exceptions.push(loc.packed());
        ExceptionId(index as u8)
    }

    /// Record `name` in this binding's subscription set; false if already there
    pub fn mark_subscribed(&mut self, name: &str) -> bool {
        if self.subscribed.contains(name) {
            return false;
        }
        self.subscribed.insert(name.to_string())
    }

    pub fn subscribed(&self) -> &FxHashSet<String> {
        &self.subscribed
    }

    pub fn set_subscribed(&mut self, subscribed: FxHashSet<String>) {
        self.subscribed = subscribed;
    }

    /// Program-wide index of a canonical subscription name, marked as used
    pub fn subscription_index(&mut self, name: &str) -> CompileResult<u16> {
        let index = match self
            .committed
            .subscription_id(name)
            .or_else(|| self.subscription_ids.get(name).copied())
        {
            Some(index) => index,
            None => {
                let next = self.committed.subscription_count() + self.subscription_order.len();
                if next >= u16::MAX as usize {
                    return Err(CompileError::TooManySubscriptions);
                }
                let index = next as u16;
                self.subscription_ids.insert(name.to_string(), index);
                self.subscription_order.push(name.to_string());
                index
            }
        };
        self.used_subscriptions.insert(index);
        Ok(index)
    }

    /// Intern an identifier and emit its `InitString`
    pub fn identifier(&mut self, name: &str) -> CompileResult<u16> {
        let registered = match self
            .committed
            .string(name)
            .or_else(|| self.strings.get(name).copied())
        {
            Some(registered) => registered,
            None => {
                let next = self.committed.identifier_count() + self.string_order.len();
                if next >= u16::MAX as usize {
                    return Err(CompileError::TooManyStrings);
                }
                let offset = self.append_data(&(name.len() as u32).to_le_bytes())?;
                self.data.extend_from_slice(name.as_bytes());
                let registered = RegisteredString {
                    index: next as u16,
                    offset,
                };
                self.strings.insert(name.to_string(), registered);
                self.string_order.push(name.to_string());
                registered
            }
        };
        self.emit(Instruction::InitString {
            identifier: registered.index,
            offset: registered.offset,
        });
        Ok(registered.index)
    }

    /// Append a literal's UTF-8 bytes, returning `(offset, length)`
    pub fn literal(&mut self, text: &str) -> CompileResult<(u32, u16)> {
        let length =
            u16::try_from(text.len()).map_err(|_| CompileError::LiteralTooLong(text.len()))?;
        let offset = self.append_data(text.as_bytes())?;
        Ok((offset, length))
    }

    fn append_data(&mut self, bytes: &[u8]) -> CompileResult<u32> {
        let offset = u32::try_from(self.committed.data_len() + self.data.len())
            .map_err(|_| CompileError::TooManyStrings)?;
        self.data.extend_from_slice(bytes);
        Ok(offset)
    }

    pub fn finish(self) -> PendingBinding {
        let Self {
            code,
            data,
            exceptions,
            mut subscription_ids,
            subscription_order,
            mut strings,
            string_order,
            used_subscriptions,
            registers,
            ..
        } = self;
        PendingBinding {
            code,
            data,
            exceptions,
            subscriptions: subscription_order
                .into_iter()
                .filter_map(|name| subscription_ids.remove(&name).map(|id| (name, id)))
                .collect(),
            strings: string_order
                .into_iter()
                .filter_map(|name| strings.remove(&name).map(|s| (name, s)))
                .collect(),
            dependencies: used_subscriptions.into_iter().collect(),
            registers: registers.max_used(),
        }
    }
}
