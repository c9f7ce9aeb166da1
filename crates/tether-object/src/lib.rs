//! Object model for the Tether binding engine
//!
//! The binding compiler and runtime never own application objects. They reach
//! them through the interfaces defined here:
//!
//! - [`MetaObject`] and [`TypeRegistry`]: static property metadata, attached
//!   property types and structured value types
//! - [`Object`]: reflective property read and write by index
//! - [`Notifier`]: change notification endpoints
//! - [`FastProperties`]: accessor table for the compiled fetch fast path
//!
//! [`DynamicObject`] is a small table-backed implementation of [`Object`] used
//! by tests, benchmarks and embedders without an object model of their own.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod fast;
pub mod meta;
pub mod notify;
pub mod object;
pub mod registry;
pub mod variant;

pub use error::{RegistryError, Result};
pub use fast::{FastAccessor, FastProperties};
pub use meta::{MetaObject, MetaObjectBuilder, PropertyDef, PropertyInfo, PropertyType, TypeId};
pub use notify::{ConnectionId, Notifier, NotifyTarget};
pub use object::{AttachedObjects, DynamicObject, Object, ObjectRef, WriteFlags};
pub use registry::{AttachedInfo, AttachedLookup, TypeRegistry, TypeResolver};
pub use variant::Variant;
