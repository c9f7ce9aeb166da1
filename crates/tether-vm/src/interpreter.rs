//! Bytecode interpreter
//!
//! Runs one binding from its jump-table entry to `Done`, or to the first
//! instruction that raises a runtime error. Errors are recorded on the
//! binding's [`DelayedError`] and delivered to the engine's [`Diagnostics`];
//! the caller always returns normally.
//!
//! A malformed program (an undecodable instruction, a jump past the end, a
//! literal outside the data blob) means the compiler and runtime disagree.
//! That is not recoverable and panics.

use std::fmt;
use std::rc::Rc;

use tether_bytecode::instruction::NO_SUBSCRIPTION;
use tether_bytecode::{ExceptionId, Instruction, Program, Reg};
use tether_object::{
    FastProperties, Object, ObjectRef, PropertyType, TypeRegistry, Variant, WriteFlags,
};
use url::Url;

use crate::context::{Context, ContextName};
use crate::error::{BindingError, DelayedError, Diagnostics, ErrorKind, ErrorLocation};
use crate::options::{DispatchMode, VmOptions};
use crate::register::{Register, RegisterFile};
use crate::state::ProgramState;

/// Objects one evaluation runs against
pub struct Invocation<'a> {
    /// Evaluating context
    pub context: &'a Context,
    /// Error slot of the binding
    pub error: &'a DelayedError,
    /// Scope object
    pub scope: Option<&'a ObjectRef>,
    /// Object `Store` writes to
    pub output: &'a dyn Object,
    /// Flags passed to `Store`
    pub flags: WriteFlags,
}

/// Result of executing one instruction
enum Step {
    Next,
    Skip(u32),
    Done,
    Throw(ExceptionId, ErrorKind),
}

/// The binding interpreter and the engine services it reads through
pub struct Interpreter {
    types: Rc<TypeRegistry>,
    fast: Rc<FastProperties>,
    diagnostics: Rc<Diagnostics>,
    options: VmOptions,
}

impl Interpreter {
    /// Create an interpreter
    pub fn new(
        types: Rc<TypeRegistry>,
        fast: Rc<FastProperties>,
        diagnostics: Rc<Diagnostics>,
        options: VmOptions,
    ) -> Self {
        Self {
            types,
            fast,
            diagnostics,
            options,
        }
    }

    /// Runtime options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Type registry
    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    /// Error sink
    pub fn diagnostics(&self) -> &Rc<Diagnostics> {
        &self.diagnostics
    }

    /// Evaluate binding `binding` of `program`.
    ///
    /// Does nothing when the context has been torn down. Otherwise clears the
    /// binding's previous error first.
    pub fn evaluate(
        &self,
        program: &Program,
        state: &ProgramState,
        binding: u32,
        call: Invocation<'_>,
    ) {
        if !call.context.is_valid() {
            return;
        }
        call.error.clear();

        let mut frame = Frame {
            interpreter: self,
            program,
            state,
            call: &call,
            regs: RegisterFile::new(),
        };
        let entry = binding as usize;
        let thrown = match self.options.dispatch {
            DispatchMode::Switch => frame.run(entry, |pc| match program.raw_instruction(pc) {
                Some(word) => Instruction::decode(word).unwrap_or_else(|err| malformed(pc, err)),
                None => malformed(pc, "ran past the end of the program"),
            }),
            DispatchMode::Threaded => {
                let code = program.prepare().unwrap_or_else(|err| malformed(entry, err));
                frame.run(entry, |pc| match code.get(pc) {
                    Some(instruction) => *instruction,
                    None => malformed(pc, "ran past the end of the program"),
                })
            }
        };

        if let Some((exception, kind)) = thrown {
            self.throw(program, &call, exception, kind);
        }
    }

    fn throw(&self, program: &Program, call: &Invocation<'_>, exception: ExceptionId, kind: ErrorKind) {
        let (line, column) = match program.exception_location(exception) {
            Some((line, column)) => (Some(line), Some(column)),
            None => (None, None),
        };
        let error = BindingError {
            kind,
            location: ErrorLocation {
                url: call.context.url().cloned(),
                line,
                column,
            },
        };
        call.error.set(error.clone());
        self.diagnostics.report(error);
    }
}

#[cold]
fn malformed(pc: usize, reason: impl fmt::Display) -> ! {
    panic!("malformed binding program at instruction {pc}: {reason}")
}

struct Frame<'a> {
    interpreter: &'a Interpreter,
    program: &'a Program,
    state: &'a ProgramState,
    call: &'a Invocation<'a>,
    regs: RegisterFile,
}

impl Frame<'_> {
    fn run(
        &mut self,
        mut pc: usize,
        fetch: impl Fn(usize) -> Instruction,
    ) -> Option<(ExceptionId, ErrorKind)> {
        loop {
            let instruction = fetch(pc);
            match self.execute(pc, &instruction) {
                Step::Next => pc += 1,
                Step::Skip(count) => pc += count as usize + 1,
                Step::Done => {
                    self.finish();
                    return None;
                }
                Step::Throw(exception, kind) => return Some((exception, kind)),
            }
        }
    }

    fn finish(&self) {
        if cfg!(debug_assertions) {
            for (index, reg) in self.regs.leaked() {
                tracing::warn!(
                    target: "tether::vm",
                    register = index,
                    kind = reg.kind(),
                    "register leaked at end of binding"
                );
            }
        }
    }

    fn execute(&mut self, pc: usize, instruction: &Instruction) -> Step {
        match *instruction {
            // ==================== Control ====================
            Instruction::Noop | Instruction::BindingId { .. } => {}
            Instruction::Done => return Step::Done,
            Instruction::Skip { reg, count } => {
                if reg.is_none_or(|r| !self.regs.get(r).get_bool()) {
                    return Step::Skip(count);
                }
            }

            // ==================== Subscription ====================
            Instruction::Subscribe {
                reg,
                subscription,
                notify,
            } => {
                let notifier = self
                    .regs
                    .get(reg)
                    .get_object()
                    .and_then(|object| object.notifier(notify));
                self.state.subscriptions.subscribe(subscription, notifier);
            }
            Instruction::SubscribeId { subscription, id } => {
                let notifier = self.call.context.id_notifier(id);
                self.state.subscriptions.subscribe(subscription, notifier);
            }
            Instruction::FetchAndSubscribe {
                output,
                object,
                exception,
                subscription,
                accessor,
            } => {
                let input = self.regs.get(object);
                if input.is_undefined() {
                    return Step::Throw(exception, ErrorKind::NotAnObject);
                }
                let Some(object) = input.get_object().cloned() else {
                    self.regs.get_mut(output).set_undefined();
                    return Step::Next;
                };
                let Some(accessor) = self.interpreter.fast.accessor(accessor) else {
                    malformed(pc, format_args!("no fast accessor {accessor}"));
                };
                self.regs.get_mut(output).load(accessor.read(&*object));
                if subscription != NO_SUBSCRIPTION {
                    let notifier = accessor.notify().and_then(|n| object.notifier(n));
                    self.state.subscriptions.subscribe(subscription, notifier);
                }
            }

            // ==================== Loads ====================
            Instruction::LoadId { reg, id } => {
                let object = self.call.context.id_object(id);
                self.regs.get_mut(reg).set_object(object);
            }
            Instruction::LoadScope { reg } => {
                let scope = self.call.scope.cloned();
                self.regs.get_mut(reg).set_object(scope);
            }
            Instruction::LoadRoot { reg } => {
                let root = self.call.context.context_object();
                self.regs.get_mut(reg).set_object(root);
            }
            Instruction::LoadAttached {
                output,
                object,
                exception,
                id,
            } => {
                let input = self.regs.get(object);
                if input.is_undefined() {
                    return Step::Throw(exception, ErrorKind::NotAnObject);
                }
                let attached = match input.get_object() {
                    Some(owner) => match self.interpreter.types.attached_object(id, owner) {
                        Some(attached) => Some(attached),
                        None => malformed(pc, format_args!("attached type {id} is not registered")),
                    },
                    None => None,
                };
                match attached {
                    Some(attached) => self.regs.get_mut(output).set_object(Some(attached)),
                    None => self.regs.get_mut(output).set_undefined(),
                }
            }

            // ==================== Conversions ====================
            Instruction::ConvertIntToReal { output, src } => {
                let input = self.regs.get(src);
                if input.is_undefined() {
                    self.regs.get_mut(output).set_undefined();
                } else {
                    let value = f64::from(input.get_int());
                    self.regs.get_mut(output).set_real(value);
                }
            }
            Instruction::ConvertRealToInt { output, src } => {
                let input = self.regs.get(src);
                if input.is_undefined() {
                    self.regs.get_mut(output).set_undefined();
                } else {
                    let value = self.interpreter.options.rounding.round(input.get_real());
                    self.regs.get_mut(output).set_int(value);
                }
            }
            Instruction::ConvertGenericToReal { output, src } => {
                let value = match self.regs.get(src) {
                    Register::Real(r) => Register::Real(*r),
                    Register::Int(i) => Register::Real(f64::from(*i)),
                    Register::Dynamic(v) => Register::Real(v.to_real()),
                    _ => Register::Undefined,
                };
                *self.regs.get_mut(output) = value;
            }
            Instruction::ConvertGenericToBool { output, src } => {
                let value = match self.regs.get(src) {
                    Register::Bool(b) => Register::Bool(*b),
                    Register::Dynamic(v) => Register::Bool(v.to_bool()),
                    _ => Register::Undefined,
                };
                *self.regs.get_mut(output) = value;
            }
            Instruction::ConvertGenericToString { output, src } => {
                let value = match self.regs.get(src) {
                    Register::Real(r) => Register::String(tether_object::variant::format_real(*r)),
                    Register::Int(i) => Register::String(i.to_string()),
                    Register::String(s) => Register::String(s.clone()),
                    Register::Dynamic(v) => Register::String(v.to_text()),
                    _ => Register::Undefined,
                };
                *self.regs.get_mut(output) = value;
            }
            Instruction::ConvertGenericToUrl { output, src } => {
                let value = match self.to_url(self.regs.get(src)) {
                    Some(url) => Register::Url(url),
                    None => Register::Undefined,
                };
                *self.regs.get_mut(output) = value;
            }

            // ==================== Literals ====================
            Instruction::Real { reg, value } => self.regs.get_mut(reg).set_real(f64::from(value)),
            Instruction::Int { reg, value } => self.regs.get_mut(reg).set_int(value),
            Instruction::Bool { reg, value } => self.regs.get_mut(reg).set_bool(value),
            Instruction::String {
                reg,
                offset,
                length,
            } => {
                let text = self
                    .program
                    .literal(offset, length)
                    .unwrap_or_else(|err| malformed(pc, err));
                *self.regs.get_mut(reg) = Register::String(text.to_string());
            }
            Instruction::InitString { identifier, offset } => {
                let program = self.program;
                self.state.identifiers.init(identifier, || {
                    Rc::from(program.identifier(offset).unwrap_or_else(|err| malformed(pc, err)))
                });
            }

            // ==================== Construction ====================
            Instruction::NewString { reg } => *self.regs.get_mut(reg) = Register::String(String::new()),
            Instruction::NewUrl { reg } => *self.regs.get_mut(reg) = Register::Url(None),
            Instruction::CleanupString { reg }
            | Instruction::CleanupUrl { reg }
            | Instruction::CleanupGeneric { reg } => self.regs.get_mut(reg).set_undefined(),

            // ==================== Arithmetic / Comparison ====================
            Instruction::AddReal { output, lhs, rhs } => self.real_op(output, lhs, rhs, |a, b| a + b),
            Instruction::MinusReal { output, lhs, rhs } => self.real_op(output, lhs, rhs, |a, b| a - b),
            Instruction::MaxReal { output, lhs, rhs } => self.real_op(output, lhs, rhs, js_max),
            Instruction::MinReal { output, lhs, rhs } => self.real_op(output, lhs, rhs, js_min),
            Instruction::AddInt { output, lhs, rhs } => {
                self.int_op(output, lhs, rhs, i32::wrapping_add)
            }
            Instruction::MinusInt { output, lhs, rhs } => {
                self.int_op(output, lhs, rhs, i32::wrapping_sub)
            }
            Instruction::AddString { output, lhs, rhs } => {
                let (l, r) = (self.regs.get(lhs), self.regs.get(rhs));
                let value = match (l.is_undefined(), r.is_undefined()) {
                    (true, true) => Register::Real(f64::NAN),
                    (true, false) => Register::String(format!("undefined{}", r.get_string())),
                    (false, true) => Register::String(format!("{}undefined", l.get_string())),
                    (false, false) => Register::String(format!("{}{}", l.get_string(), r.get_string())),
                };
                *self.regs.get_mut(output) = value;
            }
            Instruction::CompareReal { output, lhs, rhs } => {
                self.compare(output, lhs, rhs, false, |l, r| l.get_real() == r.get_real())
            }
            Instruction::NotCompareReal { output, lhs, rhs } => {
                self.compare(output, lhs, rhs, true, |l, r| l.get_real() == r.get_real())
            }
            Instruction::CompareString { output, lhs, rhs } => {
                self.compare(output, lhs, rhs, false, |l, r| l.get_string() == r.get_string())
            }
            Instruction::NotCompareString { output, lhs, rhs } => {
                self.compare(output, lhs, rhs, true, |l, r| l.get_string() == r.get_string())
            }
            Instruction::GreaterThanReal { output, lhs, rhs } => {
                let (l, r) = (self.regs.get(lhs), self.regs.get(rhs));
                let value = !l.is_undefined() && !r.is_undefined() && l.get_real() > r.get_real();
                self.regs.get_mut(output).set_bool(value);
            }

            // ==================== Property Access ====================
            Instruction::Fetch {
                output,
                object,
                exception,
                index,
            } => {
                let input = self.regs.get(object);
                if input.is_undefined() {
                    return Step::Throw(exception, ErrorKind::NotAnObject);
                }
                match input.get_object().cloned() {
                    Some(object) => {
                        let value = object.read_property(index);
                        self.regs.get_mut(output).load(value);
                    }
                    None => self.regs.get_mut(output).set_undefined(),
                }
            }
            Instruction::Store {
                reg,
                exception,
                index,
            } => match self.regs.get(reg).to_variant() {
                Some(value) => {
                    self.call.output.write_property(index, value, self.call.flags);
                }
                None => return Step::Throw(exception, ErrorKind::UndefinedAssignment),
            },
            Instruction::Copy { reg, src } => {
                let value = self.regs.get(src).clone();
                *self.regs.get_mut(reg) = value;
            }

            // ==================== Dynamic Resolution ====================
            Instruction::FindGeneric {
                reg,
                name,
                subscription,
                terminal,
                ..
            } => {
                let name = self.identifier(pc, name);
                // Names of the evaluating context were resolved statically.
                let value = self.find_generic(self.call.context.parent(), &name, subscription, terminal);
                *self.regs.get_mut(reg) = value;
            }
            Instruction::FindProperty {
                reg,
                src,
                name,
                subscription,
                exception,
                terminal,
            } => {
                let input = self.regs.get(src);
                if input.is_undefined() {
                    return Step::Throw(exception, ErrorKind::NotAnObject);
                }
                let object = input.get_object().cloned();
                let name = self.identifier(pc, name);
                let value = object
                    .and_then(|object| self.find_property(&object, &name, subscription, terminal))
                    .unwrap_or_default();
                *self.regs.get_mut(reg) = value;
            }
        }
        Step::Next
    }

    fn real_op(&mut self, output: Reg, lhs: Reg, rhs: Reg, op: impl Fn(f64, f64) -> f64) {
        let (l, r) = (self.regs.get(lhs), self.regs.get(rhs));
        if l.is_undefined() || r.is_undefined() {
            self.regs.get_mut(output).set_nan();
        } else {
            let value = op(l.get_real(), r.get_real());
            self.regs.get_mut(output).set_real(value);
        }
    }

    fn int_op(&mut self, output: Reg, lhs: Reg, rhs: Reg, op: impl Fn(i32, i32) -> i32) {
        let (l, r) = (self.regs.get(lhs), self.regs.get(rhs));
        if l.is_undefined() || r.is_undefined() {
            self.regs.get_mut(output).set_nan();
        } else {
            let value = op(l.get_int(), r.get_int());
            self.regs.get_mut(output).set_int(value);
        }
    }

    /// Equality that, with an undefined operand, only compares definedness
    fn compare(
        &mut self,
        output: Reg,
        lhs: Reg,
        rhs: Reg,
        negate: bool,
        equal: impl Fn(&Register, &Register) -> bool,
    ) {
        let (l, r) = (self.regs.get(lhs), self.regs.get(rhs));
        let result = if l.is_undefined() || r.is_undefined() {
            l.is_undefined() == r.is_undefined()
        } else {
            equal(l, r)
        };
        self.regs.get_mut(output).set_bool(result != negate);
    }

    fn identifier(&self, pc: usize, index: u16) -> Rc<str> {
        match self.state.identifiers.get(index) {
            Some(name) => name,
            None => malformed(pc, format_args!("identifier {index} used before InitString")),
        }
    }

    /// `Some(None)` is the empty URL; `None` means the value has no URL form
    fn to_url(&self, input: &Register) -> Option<Option<Url>> {
        let text = match input {
            Register::Url(url) => return Some(url.clone()),
            Register::Dynamic(Variant::Url(url)) => return Some(Some(url.clone())),
            Register::String(s) | Register::Dynamic(Variant::String(s)) => s.clone(),
            Register::Dynamic(Variant::Bytes(b)) => String::from_utf8_lossy(b).into_owned(),
            _ => return None,
        };
        if text.is_empty() {
            return Some(None);
        }
        match Url::parse(&text) {
            Ok(url) => Some(Some(url)),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.call.context.url()?;
                base.join(&text).ok().map(Some)
            }
            Err(_) => None,
        }
    }

    fn find_generic(
        &self,
        start: Option<&Rc<Context>>,
        name: &str,
        subscription: Option<u16>,
        terminal: bool,
    ) -> Register {
        let mut current = start.cloned();
        while let Some(context) = current {
            match context.lookup(name) {
                Some(ContextName::Id(index)) => {
                    if let Some(sub) = subscription {
                        self.state
                            .subscriptions
                            .subscribe(sub, context.id_notifier(index));
                    }
                    return Register::Object(context.id_object(index));
                }
                Some(ContextName::Property(index)) => {
                    if let Some(sub) = subscription {
                        self.state
                            .subscriptions
                            .subscribe(sub, context.property_notifier(index));
                    }
                    let value = context.property_value(index);
                    return if terminal {
                        Register::Dynamic(value)
                    } else {
                        object_or_undefined(value)
                    };
                }
                None => {}
            }
            if let Some(object) = context.context_object() {
                if let Some(found) = self.find_property(&object, name, subscription, terminal) {
                    return found;
                }
            }
            current = context.parent().cloned();
        }
        Register::Undefined
    }

    /// Look `name` up on `object`; `None` when it has no such property
    fn find_property(
        &self,
        object: &ObjectRef,
        name: &str,
        subscription: Option<u16>,
        terminal: bool,
    ) -> Option<Register> {
        let meta = object.meta_object();
        let (index, ty, notify) = {
            let property = meta.property(name)?;
            (property.index, property.ty, property.notify)
        };
        if let (Some(sub), Some(notify)) = (subscription, notify) {
            self.state
                .subscriptions
                .subscribe(sub, object.notifier(notify));
        }

        let value = object.read_property(index);
        Some(match ty {
            PropertyType::Object(_) => Register::Object(value.to_object()),
            PropertyType::Variant if terminal => Register::Dynamic(value),
            PropertyType::Variant => object_or_undefined(value),
            _ if !terminal => Register::Undefined,
            PropertyType::Bool | PropertyType::Int | PropertyType::Real => {
                let mut reg = Register::Undefined;
                reg.load(value);
                reg
            }
            PropertyType::String => {
                let mut reg = Register::String(String::new());
                reg.load(value);
                reg
            }
            _ => Register::Dynamic(value),
        })
    }
}

fn object_or_undefined(value: Variant) -> Register {
    match value {
        Variant::Object(object) => Register::Object(object),
        _ => Register::Undefined,
    }
}

fn js_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
}

fn js_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
}
