//! Expression tree to bytecode
//!
//! One [`BindingCompiler`] accumulates the bindings of one document. Each
//! [`compile`](BindingCompiler::compile) call walks one expression, either
//! committing it whole or rejecting it without touching committed state.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;
use tether_bytecode::{Instruction, Program, Reg};
use tether_object::{
    AttachedInfo, AttachedLookup, FastProperties, PropertyInfo, PropertyType, TypeId,
    TypeResolver,
};

use crate::ast::{BinaryOp, Node, NodeKind, SourceLocation};
use crate::codegen::{Cleanup, CodeGen, PendingBinding};
use crate::committed::Committed;
use crate::error::{CompileError, CompileResult};
use crate::options::{CompilerOptions, DuplicateSubscriptions};
use crate::scope::{CompileScope, Destination};

/// Static type of an intermediate result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueType {
    Known(PropertyType),
    /// Only known at run time
    Dynamic,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(ty) => ty.fmt(f),
            Self::Dynamic => f.write_str("dynamic"),
        }
    }
}

/// Register holding a sub-expression result
#[derive(Debug, Clone)]
struct Value {
    reg: Reg,
    ty: ValueType,
    /// Canonical names subscribed while computing this value
    subscriptions: BTreeSet<String>,
}

impl Value {
    fn new(reg: Reg, ty: ValueType) -> Self {
        Self {
            reg,
            ty,
            subscriptions: BTreeSet::new(),
        }
    }

    fn is(&self, ty: PropertyType) -> bool {
        self.ty == ValueType::Known(ty)
    }

    fn is_numeric(&self) -> bool {
        matches!(self.ty, ValueType::Known(ty) if ty.is_numeric())
    }

    fn is_dynamic(&self) -> bool {
        self.ty == ValueType::Dynamic
    }
}

/// Compiles bindings of one document into a shared program
pub struct BindingCompiler {
    options: CompilerOptions,
    types: Rc<dyn TypeResolver>,
    fast: Rc<FastProperties>,
    committed: Committed,
}

impl BindingCompiler {
    /// Create a compiler over the given type and accessor tables
    pub fn new(
        options: CompilerOptions,
        types: Rc<dyn TypeResolver>,
        fast: Rc<FastProperties>,
    ) -> Self {
        Self {
            options,
            types,
            fast,
            committed: Committed::default(),
        }
    }

    /// Active options
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Committed state
    pub fn committed(&self) -> &Committed {
        &self.committed
    }

    /// Number of committed bindings
    pub fn binding_count(&self) -> u32 {
        self.committed.binding_count()
    }

    /// Whether nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.committed.binding_count() == 0
    }

    /// Compile one binding, returning its index in the eventual program.
    ///
    /// On error nothing is committed and the caller should evaluate the
    /// expression some other way.
    pub fn compile(
        &mut self,
        expression: &Node,
        destination: Destination,
        scope: &CompileScope,
    ) -> CompileResult<u32> {
        let result = self.try_compile(expression, destination, scope);
        match &result {
            Ok(index) => tracing::debug!(
                target: "tether::compiler",
                binding = index,
                line = expression.loc.line,
                column = expression.loc.column,
                "binding compiled"
            ),
            Err(err) => tracing::debug!(
                target: "tether::compiler",
                line = expression.loc.line,
                column = expression.loc.column,
                reason = %err,
                "binding rejected"
            ),
        }
        result
    }

    fn try_compile(
        &mut self,
        expression: &Node,
        destination: Destination,
        scope: &CompileScope,
    ) -> CompileResult<u32> {
        if self.options.disable_optimizer {
            return Err(CompileError::Disabled);
        }
        if matches!(
            destination.ty,
            PropertyType::Unknown | PropertyType::ValueType(_)
        ) {
            return Err(CompileError::UnsupportedDestination(
                destination.ty.to_string(),
            ));
        }
        if let Some(rule) = self
            .options
            .property_rules
            .iter()
            .copied()
            .find(|rule| rule.rejects_destination(&destination, self.options.experimental))
        {
            return Err(CompileError::Rule(rule));
        }

        let pending = ExpressionCompiler {
            options: &self.options,
            types: self.types.as_ref(),
            fast: self.fast.as_ref(),
            scope,
            context_name: scope.context_name(),
            code: CodeGen::new(&self.committed),
        }
        .compile(expression, &destination)?;
        tracing::trace!(
            target: "tether::compiler",
            instructions = pending.code.len(),
            registers = pending.registers,
            "binding generated"
        );
        self.committed.commit(pending)
    }

    /// Assemble everything committed so far
    pub fn program(&self) -> CompileResult<Program> {
        let program = self.committed.assemble()?;
        if self.options.bindings_dump {
            tracing::trace!(target: "tether::compiler", "\n{}", program.dump());
        }
        Ok(program)
    }
}

/// Segment name and location of a dotted name chain
type Segments<'n> = SmallVec<[(&'n str, SourceLocation); 4]>;

fn name_segments(node: &Node) -> CompileResult<Segments<'_>> {
    let mut segments = Segments::new();
    collect_segments(node, &mut segments)?;
    Ok(segments)
}

fn collect_segments<'n>(node: &'n Node, out: &mut Segments<'n>) -> CompileResult<()> {
    match &node.kind {
        NodeKind::Identifier(name) => out.push((name.as_str(), node.loc)),
        NodeKind::FieldMember { base, name } => {
            collect_segments(base, out)?;
            out.push((name.as_str(), node.loc));
        }
        _ => {
            return Err(CompileError::Unsupported(
                "member access on a computed value".into(),
            ));
        }
    }
    Ok(())
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// `onSomething` names a signal handler, not a property
fn is_signal_name(name: &str) -> bool {
    name.strip_prefix("on").is_some_and(starts_uppercase)
}

/// Progress through a dotted name
#[derive(Default)]
struct NameChain {
    path: Vec<String>,
    /// The current object is a document id
    absolute: bool,
    /// The previous segment was an attached type
    was_attached: bool,
}

struct ExpressionCompiler<'a> {
    options: &'a CompilerOptions,
    types: &'a dyn TypeResolver,
    fast: &'a FastProperties,
    scope: &'a CompileScope,
    context_name: String,
    code: CodeGen<'a>,
}

impl ExpressionCompiler<'_> {
    fn compile(mut self, node: &Node, destination: &Destination) -> CompileResult<PendingBinding> {
        if self.options.bindings_dump {
            self.code.emit(Instruction::BindingId {
                line: node.loc.line,
                column: node.loc.column.min(u16::MAX as u32) as u16,
            });
        }

        let value = self.expression(node)?;
        let exception = self.code.exception_id(node.loc);
        let index = destination.index;

        match value.ty {
            ValueType::Dynamic if destination.ty == PropertyType::Variant => {
                self.code.emit(Instruction::Store {
                    reg: value.reg,
                    exception,
                    index,
                });
                self.code.release(value.reg);
            }
            ValueType::Dynamic => {
                self.require_experimental("dynamic result")?;
                let cleanup = match destination.ty {
                    PropertyType::Real | PropertyType::Bool => None,
                    PropertyType::String => Some(Cleanup::String),
                    PropertyType::Url => Some(Cleanup::Url),
                    other => return Err(CompileError::mismatch(other, value.ty)),
                };
                let output = self.code.registers.acquire(cleanup)?;
                let src = value.reg;
                self.code.emit(match destination.ty {
                    PropertyType::Real => Instruction::ConvertGenericToReal { output, src },
                    PropertyType::Bool => Instruction::ConvertGenericToBool { output, src },
                    PropertyType::String => Instruction::ConvertGenericToString { output, src },
                    _ => Instruction::ConvertGenericToUrl { output, src },
                });
                self.code.release(src);
                self.code.emit(Instruction::Store {
                    reg: output,
                    exception,
                    index,
                });
                self.code.release(output);
            }
            ValueType::Known(ty) => {
                let reg = value.reg;
                match (ty, destination.ty) {
                    (from, to) if from == to => {}
                    (_, PropertyType::Variant) => {}
                    (PropertyType::Int, PropertyType::Real) => {
                        self.code.emit(Instruction::ConvertIntToReal {
                            output: reg,
                            src: reg,
                        });
                    }
                    (PropertyType::Real, PropertyType::Int) => {
                        self.code.emit(Instruction::ConvertRealToInt {
                            output: reg,
                            src: reg,
                        });
                    }
                    (PropertyType::Object(from), PropertyType::Object(to))
                        if self.types.inherits(from, to) => {}
                    (found, expected) => return Err(CompileError::mismatch(expected, found)),
                }
                self.code.emit(Instruction::Store {
                    reg,
                    exception,
                    index,
                });
                self.code.release(reg);
            }
        }
        self.code.emit(Instruction::Done);
        debug_assert_eq!(self.code.registers.live_count(), 0);
        Ok(self.code.finish())
    }

    fn require_experimental(&self, what: &'static str) -> CompileResult<()> {
        if self.options.experimental {
            Ok(())
        } else {
            Err(CompileError::RequiresExperimental(what))
        }
    }

    fn expression(&mut self, node: &Node) -> CompileResult<Value> {
        match &node.kind {
            NodeKind::Nested(inner) => self.expression(inner),
            NodeKind::Identifier(_) | NodeKind::FieldMember { .. } => self.name(node),
            NodeKind::Binary { op, lhs, rhs } => match op {
                BinaryOp::Add | BinaryOp::Sub => self.arith(*op, lhs, rhs),
                BinaryOp::Gt | BinaryOp::Equal | BinaryOp::NotEqual => self.logic(*op, lhs, rhs),
                other => Err(CompileError::Unsupported(format!(
                    "operator '{}'",
                    other.symbol()
                ))),
            },
            NodeKind::Conditional { test, ok, ko } => self.conditional(test, ok, ko),
            NodeKind::True => self.boolean(true),
            NodeKind::False => self.boolean(false),
            NodeKind::Numeric(value) => self.number(*value),
            NodeKind::StringLiteral(text) => self.string(text),
            NodeKind::Call { callee, args } => self.method(callee, args),
            NodeKind::Unsupported(kind) => Err(CompileError::Unsupported(kind.clone())),
        }
    }

    // ========================================================================
    // Names
    // ========================================================================

    fn name(&mut self, node: &Node) -> CompileResult<Value> {
        let segments = name_segments(node)?;
        let reg = self.code.registers.acquire(None)?;
        let mut value = Value::new(reg, ValueType::Known(PropertyType::Unknown));
        let mut chain = NameChain::default();
        let last = segments.len() - 1;

        for (ii, &(name, loc)) in segments.iter().enumerate() {
            if is_signal_name(name) {
                return Err(CompileError::SignalProperty(name.to_string()));
            }

            if starts_uppercase(name) {
                let attached = self.attached(name, segments.get(ii + 1).map(|s| s.0))?;
                if ii == 0 {
                    self.code.emit(Instruction::LoadScope { reg });
                    chain.path.push(self.context_name.clone());
                }
                let exception = self.code.exception_id(loc);
                self.code.emit(Instruction::LoadAttached {
                    output: reg,
                    object: reg,
                    exception,
                    id: attached.id,
                });
                chain.path.push(format!("$$$ATTACH_{name}"));
                value.ty = ValueType::Known(PropertyType::Object(attached.attached));
                chain.absolute = false;
                chain.was_attached = true;
                continue;
            }

            if ii == 0 {
                self.first_segment(name, loc, ii == last, &mut value, &mut chain)?;
            } else {
                self.member_segment(name, loc, ii == last, &mut value, &mut chain)?;
            }
        }
        Ok(value)
    }

    fn attached(&self, name: &str, next: Option<&str>) -> CompileResult<AttachedInfo> {
        let Some(next) = next else {
            return Err(CompileError::TypeAsValue(name.to_string()));
        };
        if starts_uppercase(next) {
            return Err(CompileError::Unsupported(format!(
                "nested type reference '{name}.{next}'"
            )));
        }
        match self.types.resolve_attached(name) {
            AttachedLookup::Found(info) => Ok(info),
            AttachedLookup::NotFound => Err(CompileError::UnknownName(name.to_string())),
            AttachedLookup::Ambiguous => Err(CompileError::AmbiguousType(name.to_string())),
            AttachedLookup::NotAttachable => Err(CompileError::NotAttachable(name.to_string())),
        }
    }

    fn property(&self, ty: TypeId, name: &str) -> Option<PropertyInfo> {
        self.types.meta_object(ty)?.property(name).cloned()
    }

    fn first_segment(
        &mut self,
        name: &str,
        loc: SourceLocation,
        terminal: bool,
        value: &mut Value,
        chain: &mut NameChain,
    ) -> CompileResult<()> {
        let reg = value.reg;
        let scope = self.scope;

        if let Some(id) = scope.ids.get(name).copied() {
            value.ty = ValueType::Known(PropertyType::Object(id.object.ty));
            chain.absolute = true;
            if id.object.key == scope.root.key {
                self.code.emit(Instruction::LoadRoot { reg });
                chain.path.push("$$$ROOT".into());
            } else if id.object.key == scope.scope.key {
                self.code.emit(Instruction::LoadScope { reg });
                chain.path.push(self.context_name.clone());
            } else {
                self.code.emit(Instruction::LoadId { reg, id: id.index });
                chain.path.push(format!("$$$ID_{name}"));
                if let Some(subscription) = self.subscription(&chain.path, value)? {
                    self.code.emit(Instruction::SubscribeId {
                        subscription,
                        id: id.index,
                    });
                }
            }
            return Ok(());
        }

        let on_scope = if scope.scope_is_root() {
            None
        } else {
            self.property(scope.scope.ty, name)
        };
        if let Some(prop) = on_scope {
            self.code.emit(Instruction::LoadScope { reg });
            chain.path.push(self.context_name.clone());
            chain.path.push(name.to_string());
            value.ty = self.fetch(scope.scope.ty, &prop, &chain.path, loc, value)?;
            return Ok(());
        }
        if let Some(prop) = self.property(scope.root.ty, name) {
            self.code.emit(Instruction::LoadRoot { reg });
            chain.path.push("$$$ROOT".into());
            chain.path.push(name.to_string());
            value.ty = self.fetch(scope.root.ty, &prop, &chain.path, loc, value)?;
            return Ok(());
        }

        if !self.options.experimental {
            return Err(CompileError::UnknownName(name.to_string()));
        }
        let identifier = self.code.identifier(name)?;
        chain.path.push(format!("$$$Generic_{name}"));
        let subscription = self.subscription(&chain.path, value)?;
        let exception = self.code.exception_id(loc);
        self.code.emit(Instruction::FindGeneric {
            reg,
            name: identifier,
            subscription,
            exception,
            terminal,
        });
        if terminal {
            self.code.registers.set_cleanup(reg, Some(Cleanup::Generic));
        }
        value.ty = ValueType::Dynamic;
        Ok(())
    }

    fn member_segment(
        &mut self,
        name: &str,
        loc: SourceLocation,
        terminal: bool,
        value: &mut Value,
        chain: &mut NameChain,
    ) -> CompileResult<()> {
        let reg = value.reg;
        let absolute = std::mem::take(&mut chain.absolute);
        let was_attached = std::mem::take(&mut chain.was_attached);
        chain.path.push(name.to_string());

        if let ValueType::Known(ty) = value.ty {
            let Some(object_ty) = ty.object_type() else {
                return Err(CompileError::NotAnObject(name.to_string()));
            };
            match self.property(object_ty, name) {
                Some(prop) if absolute || was_attached || prop.is_final => {
                    value.ty = self.fetch(object_ty, &prop, &chain.path, loc, value)?;
                    return Ok(());
                }
                None if absolute => {
                    let object = self
                        .types
                        .meta_object(object_ty)
                        .map_or_else(|| ty.to_string(), |m| m.name().to_string());
                    return Err(CompileError::UnknownProperty {
                        object,
                        property: name.to_string(),
                    });
                }
                _ => {}
            }
        }

        self.require_experimental("dynamic property lookup")?;
        let identifier = self.code.identifier(name)?;
        let subscription = self.subscription(&chain.path, value)?;
        let exception = self.code.exception_id(loc);
        self.code.emit(Instruction::FindProperty {
            reg,
            src: reg,
            name: identifier,
            subscription,
            exception,
            terminal,
        });
        if terminal {
            self.code.registers.set_cleanup(reg, Some(Cleanup::Generic));
        }
        value.ty = ValueType::Dynamic;
        Ok(())
    }

    /// Read `prop` from the object in `value.reg` into the same register
    fn fetch(
        &mut self,
        object_ty: TypeId,
        prop: &PropertyInfo,
        path: &[String],
        loc: SourceLocation,
        value: &mut Value,
    ) -> CompileResult<ValueType> {
        let reg = value.reg;
        if let Some(rule) = self
            .options
            .property_rules
            .iter()
            .copied()
            .find(|rule| rule.rejects_fetch(prop))
        {
            return Err(CompileError::Rule(rule));
        }
        if !matches!(
            prop.ty,
            PropertyType::Bool
                | PropertyType::Int
                | PropertyType::Real
                | PropertyType::String
                | PropertyType::Url
                | PropertyType::Object(_)
        ) {
            return Err(CompileError::UnsupportedPropertyType {
                property: prop.name.to_string(),
                ty: prop.ty.to_string(),
            });
        }

        let exception = self.code.exception_id(loc);
        let fresh = self.note_subscription(path, value)?;
        let accessor = if self.options.disable_fast_properties {
            None
        } else {
            self.fast.lookup(self.types, object_ty, prop.index)
        };

        let mut fetch = match accessor {
            Some(accessor) => {
                let subscription = self.code.subscription_index(&path.join("."))?;
                Instruction::FetchAndSubscribe {
                    output: reg,
                    object: reg,
                    exception,
                    subscription,
                    accessor,
                }
            }
            None => {
                if fresh {
                    if let Some(notify) = prop.notify {
                        let subscription = self.code.subscription_index(&path.join("."))?;
                        self.code.emit(Instruction::Subscribe {
                            reg,
                            subscription,
                            notify,
                        });
                    }
                }
                Instruction::Fetch {
                    output: reg,
                    object: reg,
                    exception,
                    index: prop.index,
                }
            }
        };

        let construct = match prop.ty {
            PropertyType::String => Some((Instruction::NewString { reg }, Cleanup::String)),
            PropertyType::Url => Some((Instruction::NewUrl { reg }, Cleanup::Url)),
            _ => None,
        };
        if let Some((construct, cleanup)) = construct {
            // The output register is constructed in place, so the object moves aside first.
            let tmp = self.code.registers.acquire(None)?;
            self.code.emit(Instruction::Copy { reg: tmp, src: reg });
            self.code.release(tmp);
            if let Instruction::Fetch { object, .. } | Instruction::FetchAndSubscribe { object, .. } =
                &mut fetch
            {
                *object = tmp;
            }
            self.code.emit(construct);
            self.code.registers.set_cleanup(reg, Some(cleanup));
        }
        self.code.emit(fetch);
        Ok(ValueType::Known(prop.ty))
    }

    /// Add a canonical name to the binding's subscription set.
    ///
    /// Returns whether it was new.
    fn note_subscription(&mut self, path: &[String], value: &mut Value) -> CompileResult<bool> {
        let name = path.join(".");
        value.subscriptions.insert(name.clone());
        if self.code.mark_subscribed(&name) {
            return Ok(true);
        }
        match self.options.duplicate_subscriptions {
            DuplicateSubscriptions::Reject => Err(CompileError::DuplicateSubscription(name)),
            DuplicateSubscriptions::Share => Ok(false),
        }
    }

    /// Subscription index to emit, if this name is new to the binding
    fn subscription(&mut self, path: &[String], value: &mut Value) -> CompileResult<Option<u16>> {
        if self.note_subscription(path, value)? {
            Ok(Some(self.code.subscription_index(&path.join("."))?))
        } else {
            Ok(None)
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn arith(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> CompileResult<Value> {
        let output = self.code.registers.acquire(None)?;
        let lhs = self.expression(lhs)?;
        let rhs = self.expression(rhs)?;

        let numeric_or_dynamic = |v: &Value| v.is_numeric() || v.is_dynamic();
        let text_or_dynamic = |v: &Value| v.is(PropertyType::String) || v.is_dynamic();

        if (lhs.is_numeric() && rhs.is_numeric())
            || (op == BinaryOp::Sub && numeric_or_dynamic(&lhs) && numeric_or_dynamic(&rhs))
        {
            self.number_arith(output, op, lhs, rhs)
        } else if op == BinaryOp::Add
            && text_or_dynamic(&lhs)
            && text_or_dynamic(&rhs)
            && (lhs.is(PropertyType::String) || rhs.is(PropertyType::String))
        {
            self.string_arith(output, lhs, rhs)
        } else {
            Err(CompileError::mismatch(
                format!("operands of '{}'", op.symbol()),
                format!("{} and {}", lhs.ty, rhs.ty),
            ))
        }
    }

    fn number_arith(
        &mut self,
        output: Reg,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    ) -> CompileResult<Value> {
        let real = |v: &Value| v.is(PropertyType::Real) || v.is_dynamic();
        let use_real = real(&lhs) || real(&rhs);
        let mut temps: SmallVec<[Reg; 2]> = SmallVec::new();

        let (l, r) = if use_real {
            (
                self.as_real(&lhs, &mut temps)?,
                self.as_real(&rhs, &mut temps)?,
            )
        } else {
            (lhs.reg, rhs.reg)
        };
        self.code.emit(match (op, use_real) {
            (BinaryOp::Add, true) => Instruction::AddReal {
                output,
                lhs: l,
                rhs: r,
            },
            (BinaryOp::Add, false) => Instruction::AddInt {
                output,
                lhs: l,
                rhs: r,
            },
            (_, true) => Instruction::MinusReal {
                output,
                lhs: l,
                rhs: r,
            },
            (_, false) => Instruction::MinusInt {
                output,
                lhs: l,
                rhs: r,
            },
        });

        for tmp in temps {
            self.code.release(tmp);
        }
        self.code.release(lhs.reg);
        self.code.release(rhs.reg);

        let ty = if use_real {
            PropertyType::Real
        } else {
            PropertyType::Int
        };
        let mut value = Value::new(output, ValueType::Known(ty));
        value.subscriptions = lhs.subscriptions;
        value.subscriptions.extend(rhs.subscriptions);
        Ok(value)
    }

    fn as_real(&mut self, value: &Value, temps: &mut SmallVec<[Reg; 2]>) -> CompileResult<Reg> {
        match value.ty {
            ValueType::Known(PropertyType::Int) => {
                self.code.emit(Instruction::ConvertIntToReal {
                    output: value.reg,
                    src: value.reg,
                });
                Ok(value.reg)
            }
            ValueType::Dynamic => {
                self.require_experimental("generic arithmetic")?;
                let tmp = self.code.registers.acquire(None)?;
                self.code.emit(Instruction::ConvertGenericToReal {
                    output: tmp,
                    src: value.reg,
                });
                temps.push(tmp);
                Ok(tmp)
            }
            _ => Ok(value.reg),
        }
    }

    fn string_arith(&mut self, output: Reg, lhs: Value, rhs: Value) -> CompileResult<Value> {
        let mut temps: SmallVec<[Reg; 2]> = SmallVec::new();
        let l = self.as_string(&lhs, &mut temps)?;
        let r = self.as_string(&rhs, &mut temps)?;

        self.code
            .registers
            .set_cleanup(output, Some(Cleanup::String));
        self.code.emit(Instruction::AddString {
            output,
            lhs: l,
            rhs: r,
        });

        for tmp in temps {
            self.code.release(tmp);
        }
        self.code.release(lhs.reg);
        self.code.release(rhs.reg);

        let mut value = Value::new(output, ValueType::Known(PropertyType::String));
        value.subscriptions = lhs.subscriptions;
        value.subscriptions.extend(rhs.subscriptions);
        Ok(value)
    }

    fn as_string(&mut self, value: &Value, temps: &mut SmallVec<[Reg; 2]>) -> CompileResult<Reg> {
        if !value.is_dynamic() {
            return Ok(value.reg);
        }
        self.require_experimental("generic string concatenation")?;
        let tmp = self.code.registers.acquire(Some(Cleanup::String))?;
        self.code.emit(Instruction::ConvertGenericToString {
            output: tmp,
            src: value.reg,
        });
        temps.push(tmp);
        Ok(tmp)
    }

    fn logic(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node) -> CompileResult<Value> {
        let lhs = self.expression(lhs)?;
        let rhs = self.expression(rhs)?;

        let strings = match (lhs.ty, rhs.ty) {
            (ValueType::Known(PropertyType::Real), ValueType::Known(PropertyType::Real)) => false,
            (ValueType::Known(PropertyType::String), ValueType::Known(PropertyType::String))
                if op != BinaryOp::Gt =>
            {
                true
            }
            (l, r) => {
                return Err(CompileError::mismatch(
                    format!("operands of '{}'", op.symbol()),
                    format!("{l} and {r}"),
                ));
            }
        };

        let output = self.code.registers.acquire(None)?;
        let (l, r) = (lhs.reg, rhs.reg);
        self.code.emit(match (op, strings) {
            (BinaryOp::Gt, _) => Instruction::GreaterThanReal {
                output,
                lhs: l,
                rhs: r,
            },
            (BinaryOp::Equal, false) => Instruction::CompareReal {
                output,
                lhs: l,
                rhs: r,
            },
            (BinaryOp::Equal, true) => Instruction::CompareString {
                output,
                lhs: l,
                rhs: r,
            },
            (_, false) => Instruction::NotCompareReal {
                output,
                lhs: l,
                rhs: r,
            },
            (_, true) => Instruction::NotCompareString {
                output,
                lhs: l,
                rhs: r,
            },
        });
        self.code.release(l);
        self.code.release(r);

        let mut value = Value::new(output, ValueType::Known(PropertyType::Bool));
        value.subscriptions = lhs.subscriptions;
        value.subscriptions.extend(rhs.subscriptions);
        Ok(value)
    }

    fn conditional(&mut self, test: &Node, ok: &Node, ko: &Node) -> CompileResult<Value> {
        let test = self.expression(test)?;
        if !test.is(PropertyType::Bool) {
            return Err(CompileError::mismatch(PropertyType::Bool, test.ty));
        }
        let skip_ok = self.code.emit(Instruction::Skip {
            reg: Some(test.reg),
            count: 0,
        });
        self.code.release(test.reg);

        let before = self.code.subscribed().clone();

        let then = self.expression(ok)?;
        if then.is_dynamic() {
            return Err(CompileError::BranchMismatch("dynamic branch".into()));
        }
        let skip_ko = self.code.emit(Instruction::Skip { reg: None, count: 0 });
        // The else branch builds into the same register and owns its cleanup.
        let then_cleanup = self.code.registers.forget(then.reg);
        self.code.patch_skip(skip_ok);

        self.code.set_subscribed(before.clone());
        let other = self.expression(ko)?;
        if other.is_dynamic() {
            return Err(CompileError::BranchMismatch("dynamic branch".into()));
        }
        self.code.patch_skip(skip_ko);

        if then.ty != other.ty {
            return Err(CompileError::BranchMismatch(format!(
                "{} and {}",
                then.ty, other.ty
            )));
        }
        if then.reg != other.reg {
            return Err(CompileError::BranchMismatch(format!(
                "registers {} and {}",
                then.reg, other.reg
            )));
        }
        if then_cleanup != self.code.registers.cleanup(other.reg) {
            return Err(CompileError::BranchMismatch("cleanup".into()));
        }

        let uneven: Vec<&str> = then
            .subscriptions
            .symmetric_difference(&other.subscriptions)
            .filter(|name| !before.contains(*name))
            .map(String::as_str)
            .collect();
        if !uneven.is_empty() {
            return Err(CompileError::NonNeutralConditional(uneven.join(", ")));
        }

        let mut subscribed = before;
        subscribed.extend(then.subscriptions.iter().cloned());
        self.code.set_subscribed(subscribed);

        let mut value = Value::new(other.reg, other.ty);
        value.subscriptions = test.subscriptions;
        value.subscriptions.extend(then.subscriptions);
        value.subscriptions.extend(other.subscriptions);
        Ok(value)
    }

    // ========================================================================
    // Constants and calls
    // ========================================================================

    fn boolean(&mut self, value: bool) -> CompileResult<Value> {
        let reg = self.code.registers.acquire(None)?;
        self.code.emit(Instruction::Bool { reg, value });
        Ok(Value::new(reg, ValueType::Known(PropertyType::Bool)))
    }

    fn number(&mut self, literal: f64) -> CompileResult<Value> {
        let value = literal as f32;
        if f64::from(value) != literal {
            return Err(CompileError::LiteralPrecision(literal));
        }
        let reg = self.code.registers.acquire(None)?;
        self.code.emit(Instruction::Real { reg, value });
        Ok(Value::new(reg, ValueType::Known(PropertyType::Real)))
    }

    fn string(&mut self, text: &str) -> CompileResult<Value> {
        let (offset, length) = self.code.literal(text)?;
        let reg = self.code.registers.acquire(Some(Cleanup::String))?;
        self.code.emit(Instruction::String {
            reg,
            offset,
            length,
        });
        Ok(Value::new(reg, ValueType::Known(PropertyType::String)))
    }

    fn method(&mut self, callee: &Node, args: &[Node]) -> CompileResult<Value> {
        let segments = name_segments(callee)
            .map_err(|_| CompileError::UnsupportedCall("computed callee".into()))?;
        let names: SmallVec<[&str; 4]> = segments.iter().map(|s| s.0).collect();
        let max = match names.as_slice() {
            ["Math", "max"] => true,
            ["Math", "min"] => false,
            other => return Err(CompileError::UnsupportedCall(other.join("."))),
        };
        let [a, b] = args else {
            return Err(CompileError::UnsupportedCall(format!(
                "{} with {} arguments",
                names.join("."),
                args.len()
            )));
        };

        let a = self.expression(a)?;
        let b = self.expression(b)?;
        if !a.is(PropertyType::Real) || !b.is(PropertyType::Real) {
            return Err(CompileError::mismatch(
                "real arguments",
                format!("{} and {}", a.ty, b.ty),
            ));
        }
        self.code.release(a.reg);
        self.code.release(b.reg);
        let output = self.code.registers.acquire(None)?;
        self.code.emit(if max {
            Instruction::MaxReal {
                output,
                lhs: a.reg,
                rhs: b.reg,
            }
        } else {
            Instruction::MinReal {
                output,
                lhs: a.reg,
                rhs: b.reg,
            }
        });

        let mut value = Value::new(output, ValueType::Known(PropertyType::Real));
        value.subscriptions = a.subscriptions;
        value.subscriptions.extend(b.subscriptions);
        Ok(value)
    }
}
