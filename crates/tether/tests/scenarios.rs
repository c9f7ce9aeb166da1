//! End-to-end binding scenarios
//!
//! Each test compiles a document through the engine, instantiates it and
//! drives it through property changes, checking both the generated code
//! and the values written back.

use std::rc::Rc;

use tether::{
    AbstractBinding, BinaryOp, BindingManager, CompileError, CompileScope, CompiledBinding,
    CompilerOptions, Destination, DispatchMode, Document, DocumentObject, DynamicObject, Engine, EngineConfig,
    ErrorKind, FastProperties, Instruction, MetaObject, Node, ObjectRef, Opcode, PropertyDef,
    PropertyTarget, PropertyType, TypeRegistry, Variant, VmOptions, WriteFlags,
};
use url::Url;

// ============================================================================
// Fixture
// ============================================================================

const WIDTH: u32 = 0;
const HEIGHT: u32 = 1;
const LABEL: u32 = 4;

struct Fixture {
    engine: Engine,
    item: Rc<MetaObject>,
    point: Rc<MetaObject>,
    anchor: Rc<MetaObject>,
}

fn fixture(vm: VmOptions) -> Fixture {
    let mut types = TypeRegistry::new();
    let point = types.register(MetaObject::builder("Point").prop("x", PropertyType::Real));
    let anchor = types.register(
        MetaObject::builder("Anchor")
            .property(PropertyDef::new("margin", PropertyType::Real).final_()),
    );
    let item = types.register(
        MetaObject::builder("Item")
            .prop("width", PropertyType::Real)
            .prop("height", PropertyType::Real)
            .prop("spacing", PropertyType::Real)
            .prop("enabled", PropertyType::Bool)
            .prop("label", PropertyType::String)
            .prop("columns", PropertyType::Int)
            .prop("rows", PropertyType::Int)
            .prop("anchor", PropertyType::Object(anchor.type_id())),
    );
    let config = EngineConfig::new()
        .compiler(CompilerOptions::new())
        .vm(vm.collect_errors(true));
    Fixture {
        engine: Engine::new(types, FastProperties::new(), config),
        item,
        point,
        anchor,
    }
}

impl Fixture {
    fn root(&self) -> DocumentObject {
        DocumentObject::new(0, self.item.type_id())
    }

    fn scope(&self) -> CompileScope {
        CompileScope::new(self.root(), self.root())
    }
}

/// One instantiation with the root object as context object
struct Instance {
    manager: Rc<BindingManager>,
    root: Rc<DynamicObject>,
}

fn instantiate(fx: &Fixture, document: &Document, ids: &[(&str, ObjectRef)]) -> Instance {
    let root = DynamicObject::new(&fx.item);
    let context = document.create_context();
    context.set_context_object(Some(root.clone() as ObjectRef));
    for (name, object) in ids {
        context.add_id(name, Some(Rc::clone(object)));
    }
    Instance {
        manager: document.instantiate(context).unwrap(),
        root,
    }
}

impl Instance {
    fn bind(&self, index: u32, target: ObjectRef, property: u32) -> CompiledBinding {
        let binding = self
            .manager
            .configure(index, target, None, PropertyTarget::Plain(property))
            .unwrap();
        binding.set_enabled(true, WriteFlags::NONE);
        binding
    }

    fn bind_root(&self, index: u32, property: u32) -> CompiledBinding {
        self.bind(index, self.root.clone(), property)
    }
}

fn opcodes(document: &Document, index: u32) -> Vec<Opcode> {
    let program = document.program();
    // Jump-table entry `index` skips to the binding's first instruction.
    let mut pc = match program.decode(index as usize).unwrap() {
        Instruction::Skip { reg: None, count } => index as usize + count as usize + 1,
        other => panic!("expected jump-table entry, got {other:?}"),
    };
    let mut out = Vec::new();
    loop {
        let op = program.decode(pc).unwrap().opcode();
        out.push(op);
        if op == Opcode::Done {
            return out;
        }
        pc += 1;
    }
}

fn url() -> Option<Url> {
    Url::parse("file:///app/main.qml").ok()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_id_member_arithmetic() {
    let fx = fixture(VmOptions::new());
    let scope = fx.scope().with_id("a", 0, DocumentObject::new(1, fx.point.type_id()));
    let mut builder = fx.engine.document(url());
    let index = builder
        .compile(
            &Node::binary(BinaryOp::Add, Node::path("a.x"), Node::number(1.0)),
            Destination::property(WIDTH, PropertyType::Real),
            &scope,
        )
        .unwrap();
    let document = builder.build().unwrap();

    assert_eq!(
        opcodes(&document, index),
        vec![
            Opcode::LoadId,
            Opcode::SubscribeId,
            Opcode::Subscribe,
            Opcode::Fetch,
            Opcode::Real,
            Opcode::AddReal,
            Opcode::Store,
            Opcode::Done,
        ]
    );

    let a = DynamicObject::new(&fx.point);
    a.set("x", 2.0);
    let instance = instantiate(&fx, &document, &[("a", a.clone() as ObjectRef)]);
    let _binding = instance.bind_root(index, WIDTH);
    assert_eq!(instance.root.get("width"), Variant::Real(3.0));

    a.set("x", 5.0);
    assert_eq!(instance.root.get("width"), Variant::Real(6.0));
}

#[test]
fn test_conditional_string_literals() {
    let fx = fixture(VmOptions::new());
    let mut builder = fx.engine.document(url());
    let index = builder
        .compile(
            &Node::conditional(
                Node::ident("enabled"),
                Node::string("yes"),
                Node::string("no"),
            ),
            Destination::property(LABEL, PropertyType::String),
            &fx.scope(),
        )
        .unwrap();
    let document = builder.build().unwrap();

    let ops = opcodes(&document, index);
    assert_eq!(ops.iter().filter(|op| **op == Opcode::Skip).count(), 2);
    assert!(ops.contains(&Opcode::CleanupString));

    let instance = instantiate(&fx, &document, &[]);
    let _binding = instance.bind_root(index, LABEL);
    assert_eq!(instance.root.get("label"), Variant::from("no"));

    instance.root.set("enabled", true);
    assert_eq!(instance.root.get("label"), Variant::from("yes"));
    instance.root.set("enabled", false);
    assert_eq!(instance.root.get("label"), Variant::from("no"));
}

#[test]
fn test_int_sum_into_real() {
    let fx = fixture(VmOptions::new());
    let scope = fx.scope().with_id("root", 0, fx.root());
    let mut builder = fx.engine.document(url());
    let index = builder
        .compile(
            &Node::binary(BinaryOp::Add, Node::path("root.columns"), Node::path("root.rows")),
            Destination::property(WIDTH, PropertyType::Real),
            &scope,
        )
        .unwrap();
    let document = builder.build().unwrap();

    let ops = opcodes(&document, index);
    assert!(ops.contains(&Opcode::AddInt));
    assert!(ops.contains(&Opcode::ConvertIntToReal));
    assert_eq!(ops[0], Opcode::LoadRoot);

    let instance = instantiate(&fx, &document, &[]);
    instance.root.set("columns", 2);
    instance.root.set("rows", 3);
    let _binding = instance.bind_root(index, WIDTH);
    assert_eq!(instance.root.get("width"), Variant::Real(5.0));

    instance.root.set("rows", 10);
    assert_eq!(instance.root.get("width"), Variant::Real(12.0));

    // The sum is taken in 32-bit integers before conversion.
    instance.root.set("columns", i32::MAX);
    instance.root.set("rows", 1);
    assert_eq!(instance.root.get("width"), Variant::Real(-2147483648.0));
}

#[test]
fn test_rejections_leave_siblings_intact() {
    let fx = fixture(VmOptions::new());
    let scope = fx.scope();
    let real = Destination::property(WIDTH, PropertyType::Real);
    let mut builder = fx.engine.document(url());

    let first = builder
        .compile(&Node::ident("height"), real, &scope)
        .unwrap();
    let committed = (
        builder.committed().instruction_count(),
        builder.committed().subscription_count(),
        builder.committed().data_len(),
    );

    assert!(matches!(
        builder.compile(&Node::unsupported("ArrayLiteral"), real, &scope),
        Err(CompileError::Unsupported(_))
    ));
    let three_args = Node::call(
        Node::path("Math.max"),
        vec![Node::ident("spacing"), Node::number(1.0), Node::number(2.0)],
    );
    assert!(matches!(
        builder.compile(&three_args, real, &scope),
        Err(CompileError::UnsupportedCall(_))
    ));
    assert_eq!(
        committed,
        (
            builder.committed().instruction_count(),
            builder.committed().subscription_count(),
            builder.committed().data_len(),
        )
    );
    assert_eq!(builder.committed().subscription_id("$$$ROOT.spacing"), None);

    let second = builder
        .compile(
            &Node::ident("spacing"),
            Destination::property(HEIGHT, PropertyType::Real),
            &scope,
        )
        .unwrap();
    assert_eq!((first, second), (0, 1));
    assert_eq!(builder.rejected_count(), 2);

    let document = builder.build().unwrap();
    let instance = instantiate(&fx, &document, &[]);
    let target = DynamicObject::new(&fx.item);
    let _width = instance.bind(first, target.clone(), WIDTH);
    let _height = instance.bind(second, target.clone(), HEIGHT);
    instance.root.set("height", 7.0);
    instance.root.set("spacing", 2.0);
    assert_eq!(target.get("width"), Variant::Real(7.0));
    assert_eq!(target.get("height"), Variant::Real(2.0));
}

#[test]
fn test_undefined_store_keeps_value_and_reports() {
    let fx = fixture(VmOptions::new());
    let mut builder = fx.engine.document(url());
    let index = builder
        .compile(
            &Node::path("anchor.margin").at(4, 12),
            Destination::property(WIDTH, PropertyType::Real),
            &fx.scope(),
        )
        .unwrap();
    let document = builder.build().unwrap();

    let instance = instantiate(&fx, &document, &[]);
    instance.root.set("width", 9.0);
    let binding = instance.bind_root(index, WIDTH);

    assert_eq!(instance.root.get("width"), Variant::Real(9.0));
    let error = binding.error().unwrap();
    assert_eq!(error.kind, ErrorKind::UndefinedAssignment);
    assert_eq!(error.location.line, Some(4));
    assert_eq!(error.location.column, Some(12));
    assert_eq!(
        error.to_string(),
        "file:///app/main.qml:4:12: Unable to assign undefined value"
    );
    assert_eq!(fx.engine.diagnostics().take(), vec![error]);

    let anchor = DynamicObject::new(&fx.anchor);
    anchor.set("margin", 1.5);
    instance.root.set("anchor", anchor as ObjectRef);
    assert_eq!(instance.root.get("width"), Variant::Real(1.5));
    assert!(binding.error().is_none());
}

// ============================================================================
// Signal dispatch
// ============================================================================

fn rerun_document(fx: &Fixture) -> (Document, u32, u32) {
    let scope = fx.scope();
    let mut builder = fx.engine.document(url());
    // B1 reads height; B2 reads height and spacing.
    let b1 = builder
        .compile(
            &Node::ident("height"),
            Destination::property(WIDTH, PropertyType::Real),
            &scope,
        )
        .unwrap();
    let b2 = builder
        .compile(
            &Node::binary(BinaryOp::Sub, Node::ident("height"), Node::ident("spacing")),
            Destination::property(WIDTH, PropertyType::Real),
            &scope,
        )
        .unwrap();
    (builder.build().unwrap(), b1, b2)
}

fn check_reruns(mode: DispatchMode) {
    let fx = fixture(VmOptions::new().dispatch(mode));
    let (document, b1, b2) = rerun_document(&fx);
    let instance = instantiate(&fx, &document, &[]);
    let first = DynamicObject::new(&fx.item);
    let second = DynamicObject::new(&fx.item);
    let _b1 = instance.bind(b1, first.clone(), WIDTH);
    let _b2 = instance.bind(b2, second.clone(), WIDTH);

    instance.root.set("height", 10.0);
    assert_eq!(first.get("width"), Variant::Real(10.0));
    assert_eq!(second.get("width"), Variant::Real(10.0));

    let writes = first.write_count();
    instance.root.set("spacing", 4.0);
    assert_eq!(first.write_count(), writes);
    assert_eq!(second.get("width"), Variant::Real(6.0));

    instance.root.set("height", 20.0);
    assert_eq!(first.get("width"), Variant::Real(20.0));
    assert_eq!(second.get("width"), Variant::Real(16.0));
}

#[test]
fn test_signal_reruns_exactly_dependents() {
    check_reruns(DispatchMode::Switch);
    check_reruns(DispatchMode::Threaded);
}

#[test]
fn test_disabled_binding_ignores_changes() {
    let fx = fixture(VmOptions::new());
    let (document, b1, _) = rerun_document(&fx);
    let instance = instantiate(&fx, &document, &[]);
    let binding = instance.bind_root(b1, WIDTH);

    instance.root.set("height", 3.0);
    assert_eq!(instance.root.get("width"), Variant::Real(3.0));

    binding.set_enabled(false, WriteFlags::NONE);
    instance.root.set("height", 4.0);
    assert_eq!(instance.root.get("width"), Variant::Real(3.0));

    binding.set_enabled(true, WriteFlags::NONE);
    assert_eq!(instance.root.get("width"), Variant::Real(4.0));
}

#[test]
fn test_reloaded_program_behaves_the_same() {
    let fx = fixture(VmOptions::new());
    let (document, b1, b2) = rerun_document(&fx);
    let reloaded = fx.engine.load(&document.to_bytes(), url()).unwrap();
    assert_eq!(reloaded.binding_count(), 2);
    assert_eq!(opcodes(&reloaded, b2), opcodes(&document, b2));

    let instance = instantiate(&fx, &reloaded, &[]);
    let _b1 = instance.bind_root(b1, WIDTH);
    instance.root.set("height", 11.0);
    assert_eq!(instance.root.get("width"), Variant::Real(11.0));
}
