//! Document scope visible to one binding

use rustc_hash::FxHashMap;
use tether_object::{PropertyType, TypeId};

/// Identity of an object in the document being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(pub u32);

/// Object known to the compiler by identity and static type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentObject {
    /// Identity
    pub key: ObjectKey,
    /// Static type
    pub ty: TypeId,
}

impl DocumentObject {
    /// Create a document object
    pub const fn new(key: u32, ty: TypeId) -> Self {
        Self {
            key: ObjectKey(key),
            ty,
        }
    }
}

/// Object named by a document id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdObject {
    /// Slot in the context's id table
    pub index: u32,
    /// The object
    pub object: DocumentObject,
}

/// Names visible while compiling bindings on one object
#[derive(Debug, Clone)]
pub struct CompileScope {
    /// Object the bound property belongs to
    pub scope: DocumentObject,
    /// Root object of the component
    pub root: DocumentObject,
    /// Document ids
    pub ids: FxHashMap<String, IdObject>,
}

impl CompileScope {
    /// Scope with no ids
    pub fn new(scope: DocumentObject, root: DocumentObject) -> Self {
        Self {
            scope,
            root,
            ids: FxHashMap::default(),
        }
    }

    /// Register a document id
    pub fn with_id(mut self, name: &str, index: u32, object: DocumentObject) -> Self {
        self.ids.insert(name.to_string(), IdObject { index, object });
        self
    }

    /// Whether the scope object is the component root
    #[inline]
    pub fn scope_is_root(&self) -> bool {
        self.scope.key == self.root.key
    }

    /// Subscription prefix for names resolved on the scope object
    pub fn context_name(&self) -> String {
        format!("$$$SCOPE_{:x}", self.scope.key.0)
    }
}

/// Property a binding writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination {
    /// Property index on the target object
    pub index: u32,
    /// Declared type
    pub ty: PropertyType,
    /// Whether the target is a field of a value-type property
    pub value_type_sub_property: bool,
}

impl Destination {
    /// Plain property destination
    pub const fn property(index: u32, ty: PropertyType) -> Self {
        Self {
            index,
            ty,
            value_type_sub_property: false,
        }
    }

    /// Field of a value-type property
    pub const fn value_type_field(index: u32, ty: PropertyType) -> Self {
        Self {
            index,
            ty,
            value_type_sub_property: true,
        }
    }
}
