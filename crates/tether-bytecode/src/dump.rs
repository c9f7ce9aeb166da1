//! Disassembly

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::instruction::Instruction;
use crate::program::{Program, ProgramHeader};

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.opcode().name();
        match *self {
            Self::Noop | Self::Done => f.write_str(name),
            Self::BindingId { line, column } => write!(f, "{name}\t{line}:{column}"),
            Self::Skip { reg, count } => match reg {
                Some(reg) => write!(f, "{name}\t{reg}\t+{count}"),
                None => write!(f, "{name}\t-\t+{count}"),
            },
            Self::Subscribe {
                reg,
                subscription,
                notify,
            } => write!(f, "{name}\t{reg}\ts{subscription}\tsignal {notify}"),
            Self::SubscribeId { subscription, id } => {
                write!(f, "{name}\ts{subscription}\tid {id}")
            }
            Self::FetchAndSubscribe {
                output,
                object,
                exception,
                subscription,
                accessor,
            } => write!(
                f,
                "{name}\t{output}\t{object}\ts{subscription}\taccessor {accessor}\t{exception}"
            ),
            Self::LoadId { reg, id } => write!(f, "{name}\t{reg}\tid {id}"),
            Self::LoadScope { reg }
            | Self::LoadRoot { reg }
            | Self::NewString { reg }
            | Self::NewUrl { reg }
            | Self::CleanupString { reg }
            | Self::CleanupUrl { reg }
            | Self::CleanupGeneric { reg } => write!(f, "{name}\t{reg}"),
            Self::LoadAttached {
                output,
                object,
                exception,
                id,
            } => write!(f, "{name}\t{output}\t{object}\tattached {id}\t{exception}"),
            Self::ConvertIntToReal { output, src }
            | Self::ConvertRealToInt { output, src }
            | Self::ConvertGenericToReal { output, src }
            | Self::ConvertGenericToBool { output, src }
            | Self::ConvertGenericToString { output, src }
            | Self::ConvertGenericToUrl { output, src }
            | Self::Copy { reg: output, src } => write!(f, "{name}\t{output}\t{src}"),
            Self::Real { reg, value } => write!(f, "{name}\t{reg}\t{value}"),
            Self::Int { reg, value } => write!(f, "{name}\t{reg}\t{value}"),
            Self::Bool { reg, value } => write!(f, "{name}\t{reg}\t{value}"),
            Self::String {
                reg,
                offset,
                length,
            } => write!(f, "{name}\t{reg}\t@{offset}\t{length}"),
            Self::InitString { identifier, offset } => {
                write!(f, "{name}\t#{identifier}\t@{offset}")
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
            | Self::MinReal { output, lhs, rhs } => write!(f, "{name}\t{output}\t{lhs}\t{rhs}"),
            Self::Fetch {
                output,
                object,
                exception,
                index,
            } => write!(f, "{name}\t{output}\t{object}\tproperty {index}\t{exception}"),
            Self::Store {
                reg,
                exception,
                index,
            } => write!(f, "{name}\t{reg}\tproperty {index}\t{exception}"),
            Self::FindGeneric {
                reg,
                name: ident,
                subscription,
                exception,
                ..
            } => {
                write!(f, "{name}\t{reg}\t#{ident}")?;
                write_subscription(f, subscription)?;
                write!(f, "\t{exception}")
            }
            Self::FindProperty {
                reg,
                src,
                name: ident,
                subscription,
                exception,
                ..
            } => {
                write!(f, "{name}\t{reg}\t{src}\t#{ident}")?;
                write_subscription(f, subscription)?;
                write!(f, "\t{exception}")
            }
        }
    }
}

fn write_subscription(f: &mut fmt::Formatter<'_>, subscription: Option<u16>) -> fmt::Result {
    match subscription {
        Some(sub) => write!(f, "\ts{sub}"),
        None => f.write_str("\ts-"),
    }
}

#[derive(Serialize)]
struct DumpEntry {
    index: usize,
    opcode: &'static str,
    instruction: Option<Instruction>,
}

#[derive(Serialize)]
struct Dump<'a> {
    header: ProgramHeader,
    instructions: Vec<DumpEntry>,
    signals: Vec<&'a [u32]>,
}

impl Program {
    /// Text listing of every instruction followed by the signal table
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let header = self.header();
        let _ = writeln!(
            out,
            "Program: {} bindings, {} subscriptions, {} identifiers, {} instructions",
            header.bindings, header.subscriptions, header.identifiers, header.instruction_count
        );
        for index in 0..self.instruction_count() {
            match self.decode(index) {
                Ok(instr) => {
                    let _ = writeln!(out, "{index:>5}\t{instr}");
                }
                Err(err) => {
                    let _ = writeln!(out, "{index:>5}\t<{err}>");
                }
            }
        }
        for sub in 0..header.subscriptions {
            let _ = writeln!(out, "  s{sub} -> {:?}", self.signals().bindings(sub));
        }
        out
    }

    /// The same listing as JSON
    pub fn dump_json(&self) -> serde_json::Result<String> {
        let instructions = (0..self.instruction_count())
            .map(|index| {
                let instruction = self.decode(index).ok();
                DumpEntry {
                    index,
                    opcode: instruction.map_or("?", |i| i.opcode().name()),
                    instruction,
                }
            })
            .collect();
        let signals = (0..self.subscription_count())
            .map(|sub| self.signals().bindings(sub))
            .collect();
        serde_json::to_string_pretty(&Dump {
            header: self.header(),
            instructions,
            signals,
        })
    }
}
