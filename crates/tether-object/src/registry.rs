//! Type registry
//!
//! Holds every [`MetaObject`] known to an engine, the import-visible type
//! names, attached property types and structured value types. The registry is
//! filled during engine setup and then shared read-only.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{RegistryError, Result};
use crate::meta::{MetaObject, MetaObjectBuilder, TypeId};
use crate::object::ObjectRef;

type AttachedFactory = Rc<dyn Fn(&ObjectRef) -> ObjectRef>;

struct AttachedType {
    attached: TypeId,
    factory: AttachedFactory,
}

/// An attached property type resolved from a type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachedInfo {
    /// Attached type id, as used by the attached-load instruction
    pub id: u32,
    /// Type of the attached object
    pub attached: TypeId,
}

/// Outcome of resolving a capitalized name segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachedLookup {
    /// No type with that name is visible
    NotFound,
    /// Several imports provide a type with that name
    Ambiguous,
    /// The type exists but has no attached properties
    NotAttachable,
    /// Resolved
    Found(AttachedInfo),
}

/// Static type information the binding compiler needs
pub trait TypeResolver {
    /// Metadata of a registered type
    fn meta_object(&self, ty: TypeId) -> Option<Rc<MetaObject>>;

    /// Resolve a type name to its attached property type
    fn resolve_attached(&self, name: &str) -> AttachedLookup;

    /// Whether `ty` is `base` or derives from it
    fn inherits(&self, ty: TypeId, base: TypeId) -> bool;
}

/// Registry of object types, attached types and value types
#[derive(Default)]
pub struct TypeRegistry {
    types: Vec<Rc<MetaObject>>,
    names: FxHashMap<String, Vec<TypeId>>,
    attached: Vec<AttachedType>,
    attached_by_owner: FxHashMap<TypeId, u32>,
    value_types: Vec<Rc<MetaObject>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object type under its own name
    pub fn register(&mut self, builder: MetaObjectBuilder) -> Rc<MetaObject> {
        let type_id = TypeId(self.types.len() as u32);
        let meta = Rc::new(builder.build(type_id));
        self.names
            .entry(meta.name().to_string())
            .or_default()
            .push(type_id);
        self.types.push(Rc::clone(&meta));
        meta
    }

    /// Expose a type under another name, as a second import would
    pub fn alias(&mut self, name: &str, ty: TypeId) -> Result<()> {
        if self.types.get(ty.0 as usize).is_none() {
            return Err(RegistryError::UnknownType(ty));
        }
        let ids = self.names.entry(name.to_string()).or_default();
        if !ids.contains(&ty) {
            ids.push(ty);
        }
        Ok(())
    }

    /// Give `owner` attached properties of type `attached`, created on demand by `factory`
    pub fn register_attached(
        &mut self,
        owner: TypeId,
        attached: TypeId,
        factory: impl Fn(&ObjectRef) -> ObjectRef + 'static,
    ) -> Result<u32> {
        let owner_meta = self
            .types
            .get(owner.0 as usize)
            .ok_or(RegistryError::UnknownType(owner))?;
        if self.types.get(attached.0 as usize).is_none() {
            return Err(RegistryError::UnknownType(attached));
        }
        if self.attached_by_owner.contains_key(&owner) {
            return Err(RegistryError::AlreadyAttached(owner_meta.name().to_string()));
        }

        let id = self.attached.len() as u32;
        self.attached.push(AttachedType {
            attached,
            factory: Rc::new(factory),
        });
        self.attached_by_owner.insert(owner, id);
        Ok(id)
    }

    /// Register a structured value type; its fields are the metaobject's properties
    pub fn register_value_type(&mut self, builder: MetaObjectBuilder) -> (u32, Rc<MetaObject>) {
        let meta = self.register(builder);
        let index = self.value_types.len() as u32;
        self.value_types.push(Rc::clone(&meta));
        (index, meta)
    }

    /// Metadata of a value type
    pub fn value_type(&self, index: u32) -> Option<&Rc<MetaObject>> {
        self.value_types.get(index as usize)
    }

    /// Type registered under exactly one name
    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        match self.names.get(name).map(Vec::as_slice) {
            Some([single]) => Some(*single),
            _ => None,
        }
    }

    /// Attached object of type `id` for `object`, created and cached on first use
    pub fn attached_object(&self, id: u32, object: &ObjectRef) -> Option<ObjectRef> {
        let ty = self.attached.get(id as usize)?;
        let cache = object.attached_objects();
        if let Some(existing) = cache.and_then(|c| c.get(id)) {
            return Some(existing);
        }
        let created = (ty.factory)(object);
        tracing::debug!(
            target: "tether::object",
            attached = id,
            owner = object.meta_object().name(),
            "created attached object"
        );
        if let Some(cache) = cache {
            cache.insert(id, Rc::clone(&created));
        }
        Some(created)
    }
}

impl TypeResolver for TypeRegistry {
    fn meta_object(&self, ty: TypeId) -> Option<Rc<MetaObject>> {
        self.types.get(ty.0 as usize).cloned()
    }

    fn resolve_attached(&self, name: &str) -> AttachedLookup {
        let owner = match self.names.get(name).map(Vec::as_slice) {
            None | Some([]) => return AttachedLookup::NotFound,
            Some([single]) => *single,
            Some(_) => return AttachedLookup::Ambiguous,
        };
        match self.attached_by_owner.get(&owner) {
            Some(&id) => AttachedLookup::Found(AttachedInfo {
                id,
                attached: self.attached[id as usize].attached,
            }),
            None => AttachedLookup::NotAttachable,
        }
    }

    fn inherits(&self, ty: TypeId, base: TypeId) -> bool {
        let mut current = Some(ty);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.types.get(id.0 as usize).and_then(|m| m.super_type());
        }
        false
    }
}
