//! Fast property accessors
//!
//! Object models can register a direct reader for hot properties. When the
//! compiler finds one for a fetched property it emits a combined
//! fetch-and-subscribe that reads through the accessor instead of the
//! reflective interface.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::meta::TypeId;
use crate::object::Object;
use crate::registry::TypeResolver;
use crate::variant::Variant;

/// Direct reader for one property
#[derive(Clone)]
pub struct FastAccessor {
    read: Rc<dyn Fn(&dyn Object) -> Variant>,
    notify: Option<u32>,
}

impl FastAccessor {
    /// Read the property
    #[inline]
    pub fn read(&self, object: &dyn Object) -> Variant {
        (self.read)(object)
    }

    /// Notify signal subscribed alongside the read
    #[inline]
    pub fn notify(&self) -> Option<u32> {
        self.notify
    }
}

impl fmt::Debug for FastAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastAccessor")
            .field("notify", &self.notify)
            .finish_non_exhaustive()
    }
}

/// Accessor table shared by the compiler and runtime of one engine
#[derive(Default, Debug)]
pub struct FastProperties {
    accessors: Vec<FastAccessor>,
    by_property: FxHashMap<(TypeId, u32), u16>,
}

impl FastProperties {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader for property `index` of `ty` and its subtypes.
    ///
    /// Returns `None` once the 16-bit accessor index space is exhausted.
    pub fn register(
        &mut self,
        ty: TypeId,
        index: u32,
        notify: Option<u32>,
        read: impl Fn(&dyn Object) -> Variant + 'static,
    ) -> Option<u16> {
        let slot = u16::try_from(self.accessors.len()).ok()?;
        self.accessors.push(FastAccessor {
            read: Rc::new(read),
            notify,
        });
        self.by_property.insert((ty, index), slot);
        Some(slot)
    }

    /// Accessor index for property `index` of `ty`, searching super types
    pub fn lookup(&self, types: &dyn TypeResolver, ty: TypeId, index: u32) -> Option<u16> {
        let mut current = Some(ty);
        while let Some(id) = current {
            let meta = types.meta_object(id)?;
            if index >= meta.property_count() {
                return None;
            }
            if let Some(&slot) = self.by_property.get(&(id, index)) {
                return Some(slot);
            }
            current = meta.super_type();
        }
        None
    }

    /// Accessor by table index
    #[inline]
    pub fn accessor(&self, slot: u16) -> Option<&FastAccessor> {
        self.accessors.get(slot as usize)
    }

    /// Number of registered accessors
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Whether no accessor is registered
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}
