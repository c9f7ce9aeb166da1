//! Static property metadata
//!
//! A [`MetaObject`] describes one object type. Property indices are flattened
//! across the inheritance chain: a derived type starts with its super type's
//! properties, so an index that is valid on a base type means the same
//! property on every subtype. Each notifying property uses its own index as
//! its notify signal.

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

/// Identifies a registered object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Create a new type id
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the registry index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Static type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Boolean
    Bool,
    /// 32-bit integer
    Int,
    /// Double precision real
    Real,
    /// Text
    String,
    /// Resource locator
    Url,
    /// Object reference of the given type or a subtype
    Object(TypeId),
    /// Opaque dynamic value
    Variant,
    /// Structured value type, by value-type index
    ValueType(u32),
    /// A type the binding engine does not handle
    Unknown,
}

impl PropertyType {
    /// Int or Real
    #[inline]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Real)
    }

    /// Object type, if this is an object reference
    #[inline]
    pub const fn object_type(self) -> Option<TypeId> {
        match self {
            Self::Object(ty) => Some(ty),
            _ => None,
        }
    }

    /// Short name used in diagnostics
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Real => "real",
            Self::String => "string",
            Self::Url => "url",
            Self::Object(_) => "object",
            Self::Variant => "variant",
            Self::ValueType(_) => "valuetype",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(ty) => write!(f, "object<{}>", ty.0),
            Self::ValueType(idx) => write!(f, "valuetype<{idx}>"),
            other => f.write_str(other.name()),
        }
    }
}

/// Metadata of one property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyInfo {
    /// Property name
    pub name: Rc<str>,
    /// Flattened property index
    pub index: u32,
    /// Static type
    pub ty: PropertyType,
    /// Notify signal, if the property announces changes
    pub notify: Option<u32>,
    /// Subtypes cannot shadow this property
    pub is_final: bool,
    /// API revision the property was introduced in (0 = unversioned)
    pub revision: u8,
}

/// Property declaration used with [`MetaObjectBuilder`]
#[derive(Debug, Clone)]
pub struct PropertyDef {
    name: Rc<str>,
    ty: PropertyType,
    notify: bool,
    is_final: bool,
    revision: u8,
}

impl PropertyDef {
    /// Notifying, non-final, unversioned property
    pub fn new(name: &str, ty: PropertyType) -> Self {
        Self {
            name: name.into(),
            ty,
            notify: true,
            is_final: false,
            revision: 0,
        }
    }

    /// Property never changes, so it has no notify signal
    pub fn constant(mut self) -> Self {
        self.notify = false;
        self
    }

    /// Mark as final
    pub fn final_(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Set the API revision
    pub fn revision(mut self, revision: u8) -> Self {
        self.revision = revision;
        self
    }
}

/// Describes the properties of one object type
#[derive(Debug)]
pub struct MetaObject {
    type_id: TypeId,
    name: Rc<str>,
    super_type: Option<TypeId>,
    properties: Vec<PropertyInfo>,
    by_name: FxHashMap<Rc<str>, u32>,
}

impl MetaObject {
    /// Start describing a type
    pub fn builder(name: &str) -> MetaObjectBuilder {
        MetaObjectBuilder {
            name: name.into(),
            super_type: None,
            defs: Vec::new(),
        }
    }

    /// Registered type id
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Direct super type
    #[inline]
    pub fn super_type(&self) -> Option<TypeId> {
        self.super_type
    }

    /// Look up a property by name (the most derived declaration wins)
    pub fn property(&self, name: &str) -> Option<&PropertyInfo> {
        self.by_name
            .get(name)
            .and_then(|&idx| self.properties.get(idx as usize))
    }

    /// Look up a property by flattened index
    #[inline]
    pub fn property_at(&self, index: u32) -> Option<&PropertyInfo> {
        self.properties.get(index as usize)
    }

    /// All properties, inherited ones first
    #[inline]
    pub fn properties(&self) -> &[PropertyInfo] {
        &self.properties
    }

    /// Number of properties including inherited ones
    #[inline]
    pub fn property_count(&self) -> u32 {
        self.properties.len() as u32
    }
}

/// Builder for [`MetaObject`]
pub struct MetaObjectBuilder {
    name: Rc<str>,
    super_type: Option<Rc<MetaObject>>,
    defs: Vec<PropertyDef>,
}

impl MetaObjectBuilder {
    /// Inherit all properties of `base`
    pub fn inherits(mut self, base: &Rc<MetaObject>) -> Self {
        self.super_type = Some(Rc::clone(base));
        self
    }

    /// Declare a property
    pub fn property(mut self, def: PropertyDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Declare a notifying property
    pub fn prop(self, name: &str, ty: PropertyType) -> Self {
        self.property(PropertyDef::new(name, ty))
    }

    pub(crate) fn build(self, type_id: TypeId) -> MetaObject {
        let mut properties = Vec::new();
        let mut by_name = FxHashMap::default();

        if let Some(base) = &self.super_type {
            properties.extend(base.properties.iter().cloned());
            by_name.extend(base.by_name.iter().map(|(k, v)| (Rc::clone(k), *v)));
        }

        for def in self.defs {
            let index = properties.len() as u32;
            by_name.insert(Rc::clone(&def.name), index);
            properties.push(PropertyInfo {
                name: def.name,
                index,
                ty: def.ty,
                notify: def.notify.then_some(index),
                is_final: def.is_final,
                revision: def.revision,
            });
        }

        MetaObject {
            type_id,
            name: self.name,
            super_type: self.super_type.map(|s| s.type_id),
            properties,
            by_name,
        }
    }
}
