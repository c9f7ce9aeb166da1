//! Evaluation contexts
//!
//! A [`Context`] is one level of the name-resolution tree a document creates:
//! document ids, context properties set by the embedder, a context object
//! whose properties are in scope, and the base URL relative URLs resolve
//! against. Contexts are shared and mutated through `&self`; every mutation
//! that changes a value emits the matching notifier.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tether_object::{Notifier, ObjectRef, Variant};
use url::Url;

/// What a name in a context refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextName {
    /// Document id slot
    Id(u32),
    /// Context property slot
    Property(u32),
}

struct IdSlot {
    object: Option<ObjectRef>,
    notifier: Rc<Notifier>,
}

struct PropertySlot {
    value: Variant,
    notifier: Rc<Notifier>,
}

/// One level of the context tree
pub struct Context {
    parent: Option<Rc<Context>>,
    url: Option<Url>,
    names: RefCell<FxHashMap<String, ContextName>>,
    ids: RefCell<Vec<IdSlot>>,
    properties: RefCell<Vec<PropertySlot>>,
    context_object: RefCell<Option<ObjectRef>>,
    valid: Cell<bool>,
}

impl Context {
    /// Root context of a document
    pub fn new(url: Option<Url>) -> Rc<Self> {
        Rc::new(Self::with_parent(None, url))
    }

    /// Child context inheriting the parent's base URL
    pub fn child(parent: &Rc<Context>) -> Rc<Self> {
        Rc::new(Self::with_parent(Some(Rc::clone(parent)), parent.url.clone()))
    }

    fn with_parent(parent: Option<Rc<Context>>, url: Option<Url>) -> Self {
        Self {
            parent,
            url,
            names: RefCell::default(),
            ids: RefCell::default(),
            properties: RefCell::default(),
            context_object: RefCell::default(),
            valid: Cell::new(true),
        }
    }

    /// Enclosing context
    #[inline]
    pub fn parent(&self) -> Option<&Rc<Context>> {
        self.parent.as_ref()
    }

    /// Base URL for relative URL resolution
    #[inline]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Whether the context is still alive
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    /// Mark the context as torn down; evaluations against it become no-ops
    pub fn invalidate(&self) {
        self.valid.set(false);
    }

    /// Resolve a name declared in this context
    pub fn lookup(&self, name: &str) -> Option<ContextName> {
        self.names.borrow().get(name).copied()
    }

    // ==================== Ids ====================

    /// Declare a document id, returning its slot.
    ///
    /// Slots are numbered in declaration order, matching the indices the
    /// compiler was given.
    pub fn add_id(&self, name: &str, object: Option<ObjectRef>) -> u32 {
        let mut ids = self.ids.borrow_mut();
        let index = ids.len() as u32;
        ids.push(IdSlot {
            object,
            notifier: Notifier::new(),
        });
        self.names
            .borrow_mut()
            .insert(name.to_string(), ContextName::Id(index));
        index
    }

    /// Rebind a document id and notify subscribers
    pub fn set_id(&self, index: u32, object: Option<ObjectRef>) {
        let notifier = {
            let mut ids = self.ids.borrow_mut();
            let Some(slot) = ids.get_mut(index as usize) else {
                return;
            };
            slot.object = object;
            Rc::clone(&slot.notifier)
        };
        notifier.notify();
    }

    /// Object bound to an id slot
    pub fn id_object(&self, index: u32) -> Option<ObjectRef> {
        self.ids
            .borrow()
            .get(index as usize)
            .and_then(|slot| slot.object.clone())
    }

    /// Notifier of an id slot
    pub fn id_notifier(&self, index: u32) -> Option<Rc<Notifier>> {
        self.ids
            .borrow()
            .get(index as usize)
            .map(|slot| Rc::clone(&slot.notifier))
    }

    /// Number of id slots
    pub fn id_count(&self) -> usize {
        self.ids.borrow().len()
    }

    // ==================== Context properties ====================

    /// Set a context property, declaring it on first use.
    ///
    /// Subscribers are notified when an existing value changes.
    pub fn set_property(&self, name: &str, value: impl Into<Variant>) {
        let value = value.into();
        let existing = self.lookup(name);
        let notifier = match existing {
            Some(ContextName::Property(index)) => {
                let mut properties = self.properties.borrow_mut();
                let Some(slot) = properties.get_mut(index as usize) else {
                    return;
                };
                if slot.value == value {
                    return;
                }
                slot.value = value;
                Rc::clone(&slot.notifier)
            }
            Some(ContextName::Id(_)) => {
                tracing::debug!(target: "tether::vm", name, "context property shadowed by id");
                return;
            }
            None => {
                let mut properties = self.properties.borrow_mut();
                let index = properties.len() as u32;
                properties.push(PropertySlot {
                    value,
                    notifier: Notifier::new(),
                });
                self.names
                    .borrow_mut()
                    .insert(name.to_string(), ContextName::Property(index));
                return;
            }
        };
        notifier.notify();
    }

    /// Context property value by slot
    pub fn property_value(&self, index: u32) -> Variant {
        self.properties
            .borrow()
            .get(index as usize)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    /// Context property value by name
    pub fn property(&self, name: &str) -> Option<Variant> {
        match self.lookup(name)? {
            ContextName::Property(index) => Some(self.property_value(index)),
            ContextName::Id(_) => None,
        }
    }

    /// Notifier of a context property slot
    pub fn property_notifier(&self, index: u32) -> Option<Rc<Notifier>> {
        self.properties
            .borrow()
            .get(index as usize)
            .map(|slot| Rc::clone(&slot.notifier))
    }

    // ==================== Context object ====================

    /// Object whose properties are in scope; also the component root
    pub fn context_object(&self) -> Option<ObjectRef> {
        self.context_object.borrow().clone()
    }

    /// Set the context object
    pub fn set_context_object(&self, object: Option<ObjectRef>) {
        *self.context_object.borrow_mut() = object;
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("ids", &self.id_count())
            .field("properties", &self.properties.borrow().len())
            .field("valid", &self.is_valid())
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}
