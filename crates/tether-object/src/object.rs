//! Reflective object access

use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::meta::{MetaObject, PropertyType};
use crate::notify::Notifier;
use crate::variant::Variant;

/// Flags passed through to property writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct WriteFlags(u8);

impl WriteFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Skip value interceptors such as animations
    pub const BYPASS_INTERCEPTORS: Self = Self(1);
    /// The write replaces any binding on the property
    pub const REMOVE_BINDING: Self = Self(1 << 1);
    /// The write comes from a binding and must keep it installed
    pub const DONT_REMOVE_BINDING: Self = Self(1 << 2);

    /// Whether all bits of `other` are set
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bits
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for WriteFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// An application object reachable from bindings
pub trait Object {
    /// Type metadata
    fn meta_object(&self) -> Rc<MetaObject>;

    /// Read a property by flattened index
    fn read_property(&self, index: u32) -> Variant;

    /// Write a property by flattened index; returns false if the write was refused.
    ///
    /// Implementations must not hold internal borrows while emitting the
    /// property's notifier, since receivers re-enter synchronously.
    fn write_property(&self, index: u32, value: Variant, flags: WriteFlags) -> bool;

    /// Notifier for a notify signal
    fn notifier(&self, signal: u32) -> Option<Rc<Notifier>>;

    /// Cache of attached property objects, if the object supports them
    fn attached_objects(&self) -> Option<&AttachedObjects> {
        None
    }
}

/// Shared handle to an [`Object`]
pub type ObjectRef = Rc<dyn Object>;

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:p}", self.meta_object().name(), self as *const dyn Object)
    }
}

/// Per-object cache of attached property objects, keyed by attached type id
#[derive(Default)]
pub struct AttachedObjects(RefCell<FxHashMap<u32, ObjectRef>>);

impl AttachedObjects {
    /// Cached object for an attached type
    pub fn get(&self, id: u32) -> Option<ObjectRef> {
        self.0.borrow().get(&id).cloned()
    }

    /// Cache a freshly created attached object
    pub fn insert(&self, id: u32, object: ObjectRef) {
        self.0.borrow_mut().insert(id, object);
    }
}

/// Table-backed object with one slot per declared property
pub struct DynamicObject {
    meta: Rc<MetaObject>,
    values: RefCell<Vec<Variant>>,
    notifiers: Vec<Option<Rc<Notifier>>>,
    attached: AttachedObjects,
    writes: Cell<usize>,
}

impl DynamicObject {
    /// Create an object with default-initialized properties
    pub fn new(meta: &Rc<MetaObject>) -> Rc<Self> {
        let values = meta
            .properties()
            .iter()
            .map(|p| default_value(p.ty))
            .collect();
        let notifiers = meta
            .properties()
            .iter()
            .map(|p| p.notify.map(|_| Notifier::new()))
            .collect();
        Rc::new(Self {
            meta: Rc::clone(meta),
            values: RefCell::new(values),
            notifiers,
            attached: AttachedObjects::default(),
            writes: Cell::new(0),
        })
    }

    /// Read a property by name; unknown names read as invalid
    pub fn get(&self, name: &str) -> Variant {
        self.meta
            .property(name)
            .map(|p| self.read_property(p.index))
            .unwrap_or_default()
    }

    /// Write a property by name, notifying on change
    pub fn set(&self, name: &str, value: impl Into<Variant>) -> bool {
        match self.meta.property(name) {
            Some(p) => self.write_property(p.index, value.into(), WriteFlags::NONE),
            None => false,
        }
    }

    /// Number of accepted writes so far
    pub fn write_count(&self) -> usize {
        self.writes.get()
    }
}

fn default_value(ty: PropertyType) -> Variant {
    match ty {
        PropertyType::Bool => Variant::Bool(false),
        PropertyType::Int => Variant::Int(0),
        PropertyType::Real => Variant::Real(0.0),
        PropertyType::String => Variant::String(String::new()),
        PropertyType::Object(_) => Variant::Object(None),
        _ => Variant::Invalid,
    }
}

impl Object for DynamicObject {
    fn meta_object(&self) -> Rc<MetaObject> {
        Rc::clone(&self.meta)
    }

    fn read_property(&self, index: u32) -> Variant {
        self.values
            .borrow()
            .get(index as usize)
            .cloned()
            .unwrap_or_default()
    }

    fn write_property(&self, index: u32, value: Variant, _flags: WriteFlags) -> bool {
        let changed = {
            let mut values = self.values.borrow_mut();
            let Some(slot) = values.get_mut(index as usize) else {
                return false;
            };
            let changed = *slot != value;
            *slot = value;
            changed
        };
        self.writes.set(self.writes.get() + 1);

        if changed {
            if let Some(Some(notifier)) = self.notifiers.get(index as usize) {
                Rc::clone(notifier).notify();
            }
        }
        true
    }

    fn notifier(&self, signal: u32) -> Option<Rc<Notifier>> {
        self.notifiers.get(signal as usize).cloned().flatten()
    }

    fn attached_objects(&self) -> Option<&AttachedObjects> {
        Some(&self.attached)
    }
}
