//! Binding instances
//!
//! A [`BindingManager`] ties one compiled [`Program`] to one document
//! instance: it owns the subscription slots and identifier table, and one
//! [`BindingSlot`] per compiled binding. Callers configure a slot with its
//! target object and property and receive a [`CompiledBinding`] handle,
//! which is what the property system holds and drives through
//! [`AbstractBinding`].
//!
//! Every live handle keeps the manager alive. Notifications arrive through
//! the manager's [`NotifyTarget`] impl and re-run the bindings the signal
//! table lists for the subscription that fired.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tether_bytecode::Program;
use tether_object::{MetaObject, Notifier, NotifyTarget, Object, ObjectRef, Variant, WriteFlags};

use crate::context::Context;
use crate::error::{BindingError, DelayedError, ErrorKind, ErrorLocation, VmError, VmResult};
use crate::interpreter::{Interpreter, Invocation};
use crate::options::DispatchMode;
use crate::state::ProgramState;

/// The property a binding writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyTarget {
    /// A property of the target object
    Plain(u32),
    /// A field of a value-type property of the target object
    ValueTypeField {
        /// Value-type property on the target
        property: u32,
        /// Value type index in the registry
        value_type: u32,
        /// Field written inside the value
        field: u32,
    },
}

/// What `destroy` does with the binding's subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyMode {
    /// Release this binding's share of its subscriptions
    DisconnectBinding,
    /// Leave subscriptions connected
    KeepBindingConnected,
}

/// Scope of [`AbstractBinding::disconnect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectMode {
    /// Every subscription of the manager
    All,
    /// Only subscriptions this binding depends on
    One,
}

/// Interface the property system drives a binding through
pub trait AbstractBinding {
    /// Enable or disable; enabling evaluates immediately
    fn set_enabled(&self, enabled: bool, flags: WriteFlags);

    /// Evaluate now
    fn update(&self, flags: WriteFlags);

    /// Detach from the target and drop the manager reference
    fn destroy(self: Box<Self>, mode: DestroyMode);

    /// Disconnect subscriptions
    fn disconnect(&self, mode: DisconnectMode);
}

#[derive(Default)]
struct BindingSlot {
    enabled: Cell<bool>,
    updating: Cell<bool>,
    /// Subscription shares already given back by `DisconnectMode::One`
    released: Cell<bool>,
    property: Cell<Option<PropertyTarget>>,
    target: RefCell<Option<ObjectRef>>,
    scope: RefCell<Option<ObjectRef>>,
    error: DelayedError,
}

/// Clears a slot's `updating` flag however evaluation exits
struct UpdateGuard<'a>(&'a Cell<bool>);

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Per-instance binding state for one program
pub struct BindingManager {
    program: Rc<Program>,
    context: Rc<Context>,
    interpreter: Rc<Interpreter>,
    state: ProgramState,
    bindings: Box<[BindingSlot]>,
}

impl BindingManager {
    /// Instantiate `program` against `context`.
    ///
    /// With threaded dispatch the program is predecoded here, so a corrupt
    /// program is rejected before any binding runs.
    pub fn new(
        program: Rc<Program>,
        context: Rc<Context>,
        interpreter: Rc<Interpreter>,
    ) -> VmResult<Rc<Self>> {
        if interpreter.options().dispatch == DispatchMode::Threaded {
            program.prepare()?;
        }
        Ok(Rc::new_cyclic(|weak: &Weak<Self>| {
            let target: Weak<dyn NotifyTarget> = weak.clone();
            Self {
                state: ProgramState::new(&program, target),
                bindings: (0..program.binding_count())
                    .map(|_| BindingSlot::default())
                    .collect(),
                program,
                context,
                interpreter,
            }
        }))
    }

    /// The shared program
    pub fn program(&self) -> &Rc<Program> {
        &self.program
    }

    /// The evaluating context
    pub fn context(&self) -> &Rc<Context> {
        &self.context
    }

    /// Runtime state, exposed for inspection
    pub fn state(&self) -> &ProgramState {
        &self.state
    }

    /// Number of binding slots
    pub fn binding_count(&self) -> u32 {
        self.bindings.len() as u32
    }

    /// Bind slot `index` to `property` of `target` and hand out its handle.
    ///
    /// The binding starts disabled.
    pub fn configure(
        self: &Rc<Self>,
        index: u32,
        target: ObjectRef,
        scope: Option<ObjectRef>,
        property: PropertyTarget,
    ) -> VmResult<CompiledBinding> {
        let slot = self.slot(index).ok_or_else(|| VmError::UnknownBinding {
            index,
            count: self.binding_count(),
        })?;
        if let PropertyTarget::ValueTypeField { value_type, .. } = property {
            if self.interpreter.types().value_type(value_type).is_none() {
                return Err(VmError::UnknownValueType(value_type));
            }
        }
        slot.property.set(Some(property));
        *slot.target.borrow_mut() = Some(target);
        *slot.scope.borrow_mut() = scope;
        Ok(CompiledBinding {
            manager: Rc::clone(self),
            index,
        })
    }

    /// Re-run every binding depending on `subscription`, in signal-table order
    pub fn dispatch(&self, subscription: u16) {
        for &binding in self.program.signals().bindings(subscription) {
            self.run(binding, WriteFlags::DONT_REMOVE_BINDING);
        }
    }

    /// Disconnect every subscription
    pub fn disconnect_all(&self) {
        self.state.subscriptions.disconnect_all();
    }

    fn slot(&self, index: u32) -> Option<&BindingSlot> {
        self.bindings.get(index as usize)
    }

    fn run(&self, index: u32, flags: WriteFlags) {
        let Some(slot) = self.slot(index) else {
            return;
        };
        if !slot.enabled.get() || !self.context.is_valid() {
            return;
        }
        let target = slot.target.borrow().clone();
        let (Some(target), Some(property)) = (target, slot.property.get()) else {
            return;
        };
        if slot.updating.get() {
            self.report_loop(slot, &target, property);
            return;
        }
        slot.updating.set(true);
        let _guard = UpdateGuard(&slot.updating);
        if slot.released.replace(false) {
            self.for_each_subscription(index, |sub| self.state.subscriptions.retain(sub));
        }
        let scope = slot.scope.borrow().clone();

        match property {
            PropertyTarget::Plain(_) => {
                self.evaluate(index, slot, scope.as_ref(), &*target, flags);
            }
            PropertyTarget::ValueTypeField {
                property,
                value_type,
                ..
            } => {
                let Some(meta) = self.interpreter.types().value_type(value_type).cloned() else {
                    return;
                };
                let value = ValueTypeInstance::read(meta, &*target, property);
                self.evaluate(index, slot, scope.as_ref(), &value, flags);
                if value.dirty.get() {
                    target.write_property(property, value.into_variant(), flags);
                }
            }
        }
    }

    fn evaluate(
        &self,
        index: u32,
        slot: &BindingSlot,
        scope: Option<&ObjectRef>,
        output: &dyn Object,
        flags: WriteFlags,
    ) {
        self.interpreter.evaluate(
            &self.program,
            &self.state,
            index,
            Invocation {
                context: &self.context,
                error: &slot.error,
                scope,
                output,
                flags,
            },
        );
    }

    fn report_loop(&self, slot: &BindingSlot, target: &ObjectRef, property: PropertyTarget) {
        let error = BindingError {
            kind: ErrorKind::BindingLoop(self.property_name(target, property)),
            location: ErrorLocation {
                url: self.context.url().cloned(),
                line: None,
                column: None,
            },
        };
        slot.error.set(error.clone());
        self.interpreter.diagnostics().report(error);
    }

    fn property_name(&self, target: &ObjectRef, property: PropertyTarget) -> String {
        let name_of = |meta: &MetaObject, index: u32| {
            meta.property_at(index)
                .map_or_else(|| index.to_string(), |p| p.name.to_string())
        };
        match property {
            PropertyTarget::Plain(index) => name_of(&target.meta_object(), index),
            PropertyTarget::ValueTypeField {
                property,
                value_type,
                field,
            } => {
                let outer = name_of(&target.meta_object(), property);
                match self.interpreter.types().value_type(value_type) {
                    Some(meta) => format!("{outer}.{}", name_of(meta, field)),
                    None => outer,
                }
            }
        }
    }

    fn disconnect_one(&self, index: u32) {
        let Some(slot) = self.slot(index) else {
            return;
        };
        if slot.released.replace(true) {
            return;
        }
        self.for_each_subscription(index, |sub| self.state.subscriptions.release(sub));
    }

    fn for_each_subscription(&self, index: u32, mut f: impl FnMut(u16)) {
        let signals = self.program.signals();
        for sub in 0..self.program.subscription_count() {
            if signals.bindings(sub).contains(&index) {
                f(sub);
            }
        }
    }
}

impl NotifyTarget for BindingManager {
    fn notified(&self, slot: u32) {
        if let Ok(subscription) = u16::try_from(slot) {
            self.dispatch(subscription);
        }
    }
}

impl std::fmt::Debug for BindingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingManager")
            .field("bindings", &self.bindings.len())
            .field("subscriptions", &self.state.subscriptions.len())
            .field("connected", &self.state.subscriptions.connected_count())
            .finish()
    }
}

/// Handle to one configured binding
pub struct CompiledBinding {
    manager: Rc<BindingManager>,
    index: u32,
}

impl CompiledBinding {
    /// Binding index in the program
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The owning manager
    pub fn manager(&self) -> &Rc<BindingManager> {
        &self.manager
    }

    /// Whether the binding is enabled
    pub fn is_enabled(&self) -> bool {
        self.slot().enabled.get()
    }

    /// Error from the most recent evaluation
    pub fn error(&self) -> Option<BindingError> {
        self.slot().error.get()
    }

    fn slot(&self) -> &BindingSlot {
        // `configure` only hands out handles for slots that exist
        &self.manager.bindings[self.index as usize]
    }
}

impl AbstractBinding for CompiledBinding {
    fn set_enabled(&self, enabled: bool, flags: WriteFlags) {
        let was = self.slot().enabled.replace(enabled);
        if enabled && !was {
            self.update(flags);
        }
    }

    fn update(&self, flags: WriteFlags) {
        self.manager.run(self.index, flags);
    }

    fn destroy(self: Box<Self>, mode: DestroyMode) {
        if mode == DestroyMode::DisconnectBinding {
            self.disconnect(DisconnectMode::One);
        }
        let slot = self.slot();
        slot.enabled.set(false);
        slot.property.set(None);
        slot.target.borrow_mut().take();
        slot.scope.borrow_mut().take();
        slot.error.clear();
    }

    fn disconnect(&self, mode: DisconnectMode) {
        match mode {
            DisconnectMode::All => self.manager.disconnect_all(),
            DisconnectMode::One => self.manager.disconnect_one(self.index),
        }
    }
}

impl std::fmt::Debug for CompiledBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledBinding")
            .field("index", &self.index)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// Stand-in output object for a binding that writes one field of a value
/// type. Fields are copied out of the target's property, `Store` writes into
/// the copy, and the manager writes the whole value back afterwards.
struct ValueTypeInstance {
    meta: Rc<MetaObject>,
    fields: RefCell<Vec<Variant>>,
    dirty: Cell<bool>,
}

impl ValueTypeInstance {
    fn read(meta: Rc<MetaObject>, target: &dyn Object, property: u32) -> Self {
        let mut fields = match target.read_property(property) {
            Variant::Value(fields) => fields,
            _ => Vec::new(),
        };
        fields.resize(meta.property_count() as usize, Variant::Invalid);
        Self {
            meta,
            fields: RefCell::new(fields),
            dirty: Cell::new(false),
        }
    }

    fn into_variant(self) -> Variant {
        Variant::Value(self.fields.into_inner())
    }
}

impl Object for ValueTypeInstance {
    fn meta_object(&self) -> Rc<MetaObject> {
        Rc::clone(&self.meta)
    }

    fn read_property(&self, index: u32) -> Variant {
        self.fields
            .borrow()
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn write_property(&self, index: u32, value: Variant, _flags: WriteFlags) -> bool {
        match self.fields.borrow_mut().get_mut(index as usize) {
            Some(field) => {
                *field = value;
                self.dirty.set(true);
                true
            }
            None => false,
        }
    }

    fn notifier(&self, _signal: u32) -> Option<Rc<Notifier>> {
        None
    }
}
