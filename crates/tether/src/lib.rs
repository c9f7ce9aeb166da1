//! Tether
//!
//! Compiled property bindings for declarative UI documents.
//!
//! A binding such as `width: parent.height - spacing` is compiled once per
//! document into compact bytecode, then evaluated by a register machine
//! for every object instance, re-running whenever a property it read
//! changes.
//!
//! ## Example
//!
//! ```
//! use tether::{
//!     AbstractBinding, CompileScope, Destination, DocumentObject, DynamicObject, Engine,
//!     MetaObject, Node, ObjectRef, PropertyTarget, PropertyType, TypeRegistry, Variant,
//!     WriteFlags,
//! };
//!
//! let mut types = TypeRegistry::new();
//! let item = types.register(
//!     MetaObject::builder("Item")
//!         .prop("width", PropertyType::Real)
//!         .prop("height", PropertyType::Real),
//! );
//! let engine = Engine::with_types(types);
//!
//! let root = DocumentObject::new(0, item.type_id());
//! let mut builder = engine.document(None);
//! let index = builder
//!     .compile(
//!         &Node::ident("height"),
//!         Destination::property(0, PropertyType::Real),
//!         &CompileScope::new(root, root),
//!     )
//!     .unwrap();
//! let document = builder.build().unwrap();
//!
//! let object = DynamicObject::new(&item);
//! let context = document.create_context();
//! context.set_context_object(Some(object.clone() as ObjectRef));
//! let manager = document.instantiate(context).unwrap();
//! let binding = manager
//!     .configure(index, object.clone(), None, PropertyTarget::Plain(0))
//!     .unwrap();
//! binding.set_enabled(true, WriteFlags::NONE);
//!
//! object.set("height", 12.0);
//! assert_eq!(object.get("width"), Variant::Real(12.0));
//! ```
//!
//! ## Crates
//!
//! - [`object`]: meta-object model, dynamic values and change notification
//! - [`bytecode`]: instruction set and program blob
//! - [`compiler`]: expression tree to bytecode
//! - [`vm`]: interpreter and binding manager

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod document;
pub mod engine;
pub mod error;

pub use document::{Document, DocumentBuilder};
pub use engine::{Engine, EngineConfig};
pub use error::{TetherError, TetherResult};

pub use tether_bytecode as bytecode;
pub use tether_compiler as compiler;
pub use tether_object as object;
pub use tether_vm as vm;

pub use tether_bytecode::{Instruction, Opcode, Program};
pub use tether_compiler::{
    BinaryOp, CompileError, CompileScope, CompilerOptions, Destination, DocumentObject, Node,
};
pub use tether_object::{
    DynamicObject, FastProperties, MetaObject, Object, ObjectRef, PropertyDef, PropertyType,
    TypeRegistry, Variant, WriteFlags,
};
pub use tether_vm::{
    AbstractBinding, BindingError, BindingManager, CompiledBinding, Context, DestroyMode,
    DisconnectMode, DispatchMode, ErrorKind, PropertyTarget, VmOptions,
};
