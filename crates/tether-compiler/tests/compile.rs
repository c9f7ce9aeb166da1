//! Binding compiler tests
//!
//! Generated code shape, rejection rules, and the ownership invariant that
//! every constructed payload is cleaned up exactly once on every path.

use std::rc::Rc;

use proptest::prelude::*;
use tether_bytecode::{ExceptionId, Instruction, Reg};
use tether_compiler::{
    BinaryOp, BindingCompiler, CompileError, CompileScope, CompilerOptions, Destination,
    DocumentObject, DuplicateSubscriptions, Node, PropertyRule,
};
use tether_object::{
    DynamicObject, FastProperties, MetaObject, Object, ObjectRef, PropertyDef, PropertyType,
    TypeId, TypeRegistry,
};

// ============================================================================
// Fixture
// ============================================================================

const WIDTH: u32 = 0;
const HEIGHT: u32 = 1;
const VISIBLE: u32 = 2;
const COUNT: u32 = 3;
const LABEL: u32 = 4;
const SOURCE: u32 = 5;
const EXTRA: u32 = 6;

struct Fixture {
    types: Rc<TypeRegistry>,
    fast: Rc<FastProperties>,
    item: TypeId,
    anchor: TypeId,
}

fn fixture() -> Fixture {
    let mut types = TypeRegistry::new();
    let anchor = types.register(
        MetaObject::builder("Anchor")
            .property(PropertyDef::new("margin", PropertyType::Real).final_())
            .prop("spacing", PropertyType::Real),
    );
    let item = types.register(
        MetaObject::builder("Item")
            .prop("width", PropertyType::Real)
            .prop("height", PropertyType::Real)
            .prop("visible", PropertyType::Bool)
            .prop("count", PropertyType::Int)
            .prop("label", PropertyType::String)
            .prop("source", PropertyType::Url)
            .prop("extra", PropertyType::Variant)
            .property(PropertyDef::new("tag", PropertyType::String).revision(1))
            .property(PropertyDef::new("size", PropertyType::Real).constant())
            .prop("anchor", PropertyType::Object(anchor.type_id())),
    );
    let keys = types.register(MetaObject::builder("Keys"));
    let keys_attached = types.register(
        MetaObject::builder("KeysAttached").prop("enabled", PropertyType::Bool),
    );
    let attached_meta = Rc::clone(&keys_attached);
    types
        .register_attached(keys.type_id(), keys_attached.type_id(), move |_| {
            DynamicObject::new(&attached_meta) as ObjectRef
        })
        .unwrap();

    Fixture {
        types: Rc::new(types),
        fast: Rc::new(FastProperties::new()),
        item: item.type_id(),
        anchor: anchor.type_id(),
    }
}

impl Fixture {
    fn compiler(&self, options: CompilerOptions) -> BindingCompiler {
        BindingCompiler::new(options, self.types.clone(), self.fast.clone())
    }

    fn root_scope(&self) -> CompileScope {
        let root = DocumentObject::new(0, self.item);
        CompileScope::new(root, root)
    }
}

fn real(index: u32) -> Destination {
    Destination::property(index, PropertyType::Real)
}

fn code(compiler: &BindingCompiler, index: u32) -> Vec<Instruction> {
    compiler.committed().binding_code(index).unwrap().to_vec()
}

fn add(l: Node, r: Node) -> Node {
    Node::binary(BinaryOp::Add, l, r)
}

// Every path through a binding body: conditional skips fork, Done ends.
fn paths(code: &[Instruction]) -> Vec<Vec<usize>> {
    let mut out = Vec::new();
    let mut pending = vec![(0usize, Vec::new())];
    while let Some((mut pc, mut trail)) = pending.pop() {
        loop {
            trail.push(pc);
            match code[pc] {
                Instruction::Done => {
                    out.push(trail);
                    break;
                }
                Instruction::Skip { reg: None, count } => pc += count as usize + 1,
                Instruction::Skip {
                    reg: Some(_),
                    count,
                } => {
                    pending.push((pc + count as usize + 1, trail.clone()));
                    pc += 1;
                }
                _ => pc += 1,
            }
        }
    }
    out
}

// [strings, urls, dynamic] constructed minus cleaned up, per path
fn ownership_balance(code: &[Instruction]) -> Vec<[i32; 3]> {
    paths(code)
        .into_iter()
        .map(|path| {
            let mut owned = [0; 3];
            for pc in path {
                match code[pc] {
                    Instruction::String { .. }
                    | Instruction::NewString { .. }
                    | Instruction::AddString { .. }
                    | Instruction::ConvertGenericToString { .. } => owned[0] += 1,
                    Instruction::CleanupString { .. } => owned[0] -= 1,
                    Instruction::NewUrl { .. } | Instruction::ConvertGenericToUrl { .. } => {
                        owned[1] += 1
                    }
                    Instruction::CleanupUrl { .. } => owned[1] -= 1,
                    Instruction::FindGeneric { terminal: true, .. }
                    | Instruction::FindProperty { terminal: true, .. } => owned[2] += 1,
                    Instruction::CleanupGeneric { .. } => owned[2] -= 1,
                    _ => {}
                }
            }
            owned
        })
        .collect()
}

// ============================================================================
// Code shape
// ============================================================================

#[test]
fn test_root_property_fetch() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let index = compiler
        .compile(&Node::ident("height"), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert_eq!(index, 0);
    let r0 = Reg(0);
    assert_eq!(
        code(&compiler, 0),
        vec![
            Instruction::LoadRoot { reg: r0 },
            Instruction::Subscribe {
                reg: r0,
                subscription: 0,
                notify: HEIGHT,
            },
            Instruction::Fetch {
                output: r0,
                object: r0,
                exception: ExceptionId(0),
                index: HEIGHT,
            },
            Instruction::Store {
                reg: r0,
                exception: ExceptionId(1),
                index: WIDTH,
            },
            Instruction::Done,
        ]
    );
    assert_eq!(compiler.committed().subscription_id("$$$ROOT.height"), Some(0));
    assert_eq!(compiler.committed().dependencies(0), Some(&[0u16][..]));
}

#[test]
fn test_fast_accessor_path() {
    let mut fx = fixture();
    let mut fast = FastProperties::new();
    fast.register(fx.item, HEIGHT, Some(HEIGHT), |o| o.read_property(HEIGHT));
    fx.fast = Rc::new(fast);

    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::ident("height"), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert!(matches!(
        code(&compiler, 0)[1],
        Instruction::FetchAndSubscribe {
            subscription: 0,
            accessor: 0,
            ..
        }
    ));

    let mut slow = fx.compiler(CompilerOptions::new().fast_properties(false));
    slow.compile(&Node::ident("height"), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert!(matches!(code(&slow, 0)[1], Instruction::Subscribe { .. }));
}

#[test]
fn test_constant_property_does_not_subscribe() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::ident("size"), real(WIDTH), &fx.root_scope())
        .unwrap();
    let body = code(&compiler, 0);
    assert!(!body.iter().any(|i| matches!(i, Instruction::Subscribe { .. })));
    assert_eq!(compiler.committed().dependencies(0), Some(&[][..]));
}

#[test]
fn test_numeric_conversions_at_store() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::ident("count"), real(WIDTH), &fx.root_scope())
        .unwrap();
    compiler
        .compile(
            &Node::ident("width"),
            Destination::property(COUNT, PropertyType::Int),
            &fx.root_scope(),
        )
        .unwrap();
    let r0 = Reg(0);
    assert!(code(&compiler, 0).contains(&Instruction::ConvertIntToReal {
        output: r0,
        src: r0
    }));
    assert!(code(&compiler, 1).contains(&Instruction::ConvertRealToInt {
        output: r0,
        src: r0
    }));
}

#[test]
fn test_string_fetch_moves_object_aside() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(
            &Node::ident("label"),
            Destination::property(LABEL, PropertyType::String),
            &fx.root_scope(),
        )
        .unwrap();
    let (r0, r1) = (Reg(0), Reg(1));
    assert_eq!(
        code(&compiler, 0)[2..],
        [
            Instruction::Copy { reg: r1, src: r0 },
            Instruction::NewString { reg: r0 },
            Instruction::Fetch {
                output: r0,
                object: r1,
                exception: ExceptionId(0),
                index: LABEL,
            },
            Instruction::Store {
                reg: r0,
                exception: ExceptionId(1),
                index: LABEL,
            },
            Instruction::CleanupString { reg: r0 },
            Instruction::Done,
        ]
    );
}

#[test]
fn test_conditional_layout() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let expr = Node::conditional(Node::ident("visible"), Node::number(1.0), Node::number(2.0));
    compiler.compile(&expr, real(WIDTH), &fx.root_scope()).unwrap();
    let r0 = Reg(0);
    assert_eq!(
        code(&compiler, 0)[3..7],
        [
            Instruction::Skip {
                reg: Some(r0),
                count: 2,
            },
            Instruction::Real { reg: r0, value: 1.0 },
            Instruction::Skip {
                reg: None,
                count: 1,
            },
            Instruction::Real { reg: r0, value: 2.0 },
        ]
    );
}

#[test]
fn test_ids_and_aliases() {
    let fx = fixture();
    let root = DocumentObject::new(0, fx.item);
    let other = DocumentObject::new(7, fx.item);
    let scope = CompileScope::new(root, root)
        .with_id("other", 3, other)
        .with_id("page", 0, root);
    let mut compiler = fx.compiler(CompilerOptions::new());

    compiler
        .compile(&Node::path("other.width"), real(HEIGHT), &scope)
        .unwrap();
    let body = code(&compiler, 0);
    assert_eq!(body[0], Instruction::LoadId { reg: Reg(0), id: 3 });
    assert_eq!(
        body[1],
        Instruction::SubscribeId {
            subscription: 0,
            id: 3
        }
    );
    assert_eq!(compiler.committed().subscription_id("$$$ID_other"), Some(0));
    assert_eq!(
        compiler.committed().subscription_id("$$$ID_other.width"),
        Some(1)
    );

    // An id naming the root shares the root's canonical names.
    compiler
        .compile(&Node::path("page.width"), real(HEIGHT), &scope)
        .unwrap();
    assert_eq!(code(&compiler, 1)[0], Instruction::LoadRoot { reg: Reg(0) });
    assert_eq!(
        compiler.committed().subscription_id("$$$ROOT.width"),
        Some(2)
    );
    assert_eq!(
        compiler.compile(
            &add(Node::path("page.width"), Node::ident("width")),
            real(HEIGHT),
            &scope
        ),
        Err(CompileError::DuplicateSubscription("$$$ROOT.width".into()))
    );
}

#[test]
fn test_scope_properties_shadow_root() {
    let fx = fixture();
    let root = DocumentObject::new(0, fx.item);
    let inner = DocumentObject::new(0x2a, fx.anchor);
    let scope = CompileScope::new(inner, root);
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::ident("spacing"), real(WIDTH), &scope)
        .unwrap();
    compiler
        .compile(&Node::ident("height"), real(WIDTH), &scope)
        .unwrap();
    assert_eq!(code(&compiler, 0)[0], Instruction::LoadScope { reg: Reg(0) });
    assert_eq!(
        compiler.committed().subscription_id("$$$SCOPE_2a.spacing"),
        Some(0)
    );
    assert_eq!(code(&compiler, 1)[0], Instruction::LoadRoot { reg: Reg(0) });
}

#[test]
fn test_attached_property() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(
            &Node::path("Keys.enabled"),
            Destination::property(VISIBLE, PropertyType::Bool),
            &fx.root_scope(),
        )
        .unwrap();
    let body = code(&compiler, 0);
    assert_eq!(body[0], Instruction::LoadScope { reg: Reg(0) });
    assert!(matches!(
        body[1],
        Instruction::LoadAttached { id: 0, .. }
    ));
    assert!(matches!(body[3], Instruction::Fetch { index: 0, .. }));
    assert_eq!(
        compiler
            .committed()
            .subscription_id("$$$SCOPE_0.$$$ATTACH_Keys.enabled"),
        Some(0)
    );
}

#[test]
fn test_final_member_is_static_and_other_members_dynamic() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::path("anchor.margin"), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert_eq!(
        compiler.compile(&Node::path("anchor.spacing"), real(WIDTH), &fx.root_scope()),
        Err(CompileError::RequiresExperimental("dynamic property lookup"))
    );

    let mut experimental = fx.compiler(CompilerOptions::experimental_mode());
    experimental
        .compile(&Node::path("anchor.spacing"), real(WIDTH), &fx.root_scope())
        .unwrap();
    let body = code(&experimental, 0);
    assert!(body.iter().any(|i| matches!(
        i,
        Instruction::FindProperty {
            terminal: true,
            ..
        }
    )));
    assert!(body.contains(&Instruction::ConvertGenericToReal {
        output: Reg(1),
        src: Reg(0)
    }));
    assert!(body.contains(&Instruction::CleanupGeneric { reg: Reg(0) }));
}

#[test]
fn test_generic_lookup_registers_identifier() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::experimental_mode());
    compiler
        .compile(
            &add(Node::ident("title"), Node::string("!")),
            Destination::property(LABEL, PropertyType::String),
            &fx.root_scope(),
        )
        .unwrap();
    let body = code(&compiler, 0);
    assert!(matches!(
        body[0],
        Instruction::InitString {
            identifier: 0,
            offset: 0
        }
    ));
    assert!(matches!(
        body[1],
        Instruction::FindGeneric {
            name: 0,
            subscription: Some(0),
            terminal: true,
            ..
        }
    ));
    assert_eq!(
        compiler.committed().subscription_id("$$$Generic_title"),
        Some(0)
    );
    assert!(compiler.committed().string("title").is_some());
}

// ============================================================================
// Rejections
// ============================================================================

fn rejects(expr: Node, dest: Destination) -> CompileError {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler.compile(&expr, dest, &fx.root_scope()).unwrap_err()
}

#[test]
fn test_conditional_rejections() {
    let mismatch = Node::conditional(
        Node::ident("visible"),
        Node::ident("width"),
        Node::ident("label"),
    );
    assert!(matches!(
        rejects(mismatch, real(WIDTH)),
        CompileError::BranchMismatch(_)
    ));

    let uneven = Node::conditional(
        Node::ident("visible"),
        Node::ident("width"),
        Node::ident("height"),
    );
    assert!(matches!(
        rejects(uneven, real(WIDTH)),
        CompileError::NonNeutralConditional(_)
    ));

    let not_bool = Node::conditional(Node::ident("width"), Node::number(1.0), Node::number(2.0));
    assert!(matches!(
        rejects(not_bool, real(WIDTH)),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_balanced_conditional_compiles() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let expr = Node::conditional(
        Node::ident("visible"),
        Node::ident("width"),
        Node::ident("width"),
    );
    compiler.compile(&expr, real(HEIGHT), &fx.root_scope()).unwrap();
}

#[test]
fn test_duplicate_subscriptions() {
    let expr = add(Node::ident("width"), Node::ident("width"));
    assert_eq!(
        rejects(expr.clone(), real(HEIGHT)),
        CompileError::DuplicateSubscription("$$$ROOT.width".into())
    );

    let fx = fixture();
    let mut compiler = fx.compiler(
        CompilerOptions::new().duplicate_subscriptions(DuplicateSubscriptions::Share),
    );
    compiler.compile(&expr, real(HEIGHT), &fx.root_scope()).unwrap();
    let subscribes = code(&compiler, 0)
        .iter()
        .filter(|i| matches!(i, Instruction::Subscribe { .. }))
        .count();
    assert_eq!(subscribes, 1);
}

#[test]
fn test_literal_rules() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    compiler
        .compile(&Node::number(0.5), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert_eq!(
        rejects(Node::number(0.1), real(WIDTH)),
        CompileError::LiteralPrecision(0.1)
    );
    assert_eq!(
        rejects(
            Node::string(&"x".repeat(70_000)),
            Destination::property(LABEL, PropertyType::String)
        ),
        CompileError::LiteralTooLong(70_000)
    );
}

#[test]
fn test_name_rejections() {
    let bool_dest = Destination::property(VISIBLE, PropertyType::Bool);
    assert_eq!(
        rejects(Node::ident("onClicked"), bool_dest),
        CompileError::SignalProperty("onClicked".into())
    );
    assert_eq!(
        rejects(Node::ident("Keys"), bool_dest),
        CompileError::TypeAsValue("Keys".into())
    );
    assert_eq!(
        rejects(Node::path("Item.visible"), bool_dest),
        CompileError::NotAttachable("Item".into())
    );
    assert_eq!(
        rejects(Node::ident("missing"), bool_dest),
        CompileError::UnknownName("missing".into())
    );
    assert_eq!(
        rejects(Node::ident("tag"), Destination::property(LABEL, PropertyType::String)),
        CompileError::Rule(PropertyRule::RevisionedProperty)
    );
    assert!(matches!(
        rejects(Node::ident("extra"), bool_dest),
        CompileError::UnsupportedPropertyType { .. }
    ));
    assert!(matches!(
        rejects(Node::path("width.x"), bool_dest),
        CompileError::NotAnObject(_)
    ));
}

#[test]
fn test_operator_and_call_rejections() {
    let mul = Node::binary(BinaryOp::Mul, Node::ident("width"), Node::number(2.0));
    assert!(matches!(
        rejects(mul, real(HEIGHT)),
        CompileError::Unsupported(_)
    ));
    let gt_strings = Node::binary(BinaryOp::Gt, Node::ident("label"), Node::string("a"));
    assert!(matches!(
        rejects(gt_strings, Destination::property(VISIBLE, PropertyType::Bool)),
        CompileError::TypeMismatch { .. }
    ));
    let minus_strings = Node::binary(BinaryOp::Sub, Node::string("a"), Node::string("b"));
    assert!(matches!(
        rejects(minus_strings, Destination::property(LABEL, PropertyType::String)),
        CompileError::TypeMismatch { .. }
    ));
    let pow = Node::call(
        Node::path("Math.pow"),
        vec![Node::ident("width"), Node::number(2.0)],
    );
    assert_eq!(
        rejects(pow, real(HEIGHT)),
        CompileError::UnsupportedCall("Math.pow".into())
    );
    let int_arg = Node::call(
        Node::path("Math.max"),
        vec![Node::ident("count"), Node::ident("width")],
    );
    assert!(matches!(
        rejects(int_arg, real(HEIGHT)),
        CompileError::TypeMismatch { .. }
    ));
}

#[test]
fn test_destination_rules() {
    let fx = fixture();
    let field = Destination::value_type_field(0, PropertyType::Real);

    let mut compiler = fx.compiler(CompilerOptions::new());
    assert_eq!(
        compiler.compile(&Node::ident("width"), field, &fx.root_scope()),
        Err(CompileError::Rule(
            PropertyRule::ValueTypeSubPropertyNeedsExperimental
        ))
    );
    assert!(matches!(
        compiler.compile(
            &Node::ident("width"),
            Destination::property(9, PropertyType::Unknown),
            &fx.root_scope()
        ),
        Err(CompileError::UnsupportedDestination(_))
    ));
    assert!(matches!(
        compiler.compile(
            &Node::ident("label"),
            real(WIDTH),
            &fx.root_scope()
        ),
        Err(CompileError::TypeMismatch { .. })
    ));

    let mut experimental = fx.compiler(CompilerOptions::experimental_mode());
    experimental
        .compile(&Node::ident("width"), field, &fx.root_scope())
        .unwrap();

    let mut disabled = fx.compiler(CompilerOptions::new().optimizer(false));
    assert_eq!(
        disabled.compile(&Node::ident("width"), real(HEIGHT), &fx.root_scope()),
        Err(CompileError::Disabled)
    );
}

// ============================================================================
// Committed state
// ============================================================================

#[test]
fn test_rejected_binding_leaves_no_residue() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let scope = fx.root_scope();
    let label = Destination::property(LABEL, PropertyType::String);

    compiler
        .compile(&Node::ident("height"), real(WIDTH), &scope)
        .unwrap();
    let before = (
        compiler.committed().data_len(),
        compiler.committed().subscription_count(),
        compiler.committed().exception_count(),
        compiler.committed().instruction_count(),
    );

    // Literal, subscription and exception entries are generated before the
    // unknown name fails the compile.
    let failing = add(add(Node::string("hello"), Node::ident("label")), Node::ident("nope"));
    assert!(compiler.compile(&failing, label, &scope).is_err());
    assert_eq!(
        before,
        (
            compiler.committed().data_len(),
            compiler.committed().subscription_count(),
            compiler.committed().exception_count(),
            compiler.committed().instruction_count(),
        )
    );
    assert_eq!(compiler.committed().subscription_id("$$$ROOT.label"), None);

    assert_eq!(compiler.compile(&Node::ident("label"), label, &scope), Ok(1));
    assert_eq!(compiler.committed().subscription_id("$$$ROOT.label"), Some(1));
}

#[test]
fn test_program_signal_table() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let scope = fx.root_scope();
    compiler
        .compile(&Node::ident("height"), real(WIDTH), &scope)
        .unwrap();
    compiler
        .compile(&Node::ident("visible"), Destination::property(2, PropertyType::Bool), &scope)
        .unwrap();
    compiler
        .compile(
            &Node::call(
                Node::path("Math.max"),
                vec![Node::ident("height"), Node::number(10.0)],
            ),
            real(WIDTH),
            &scope,
        )
        .unwrap();

    let program = compiler.program().unwrap();
    assert_eq!(program.binding_count(), 3);
    assert_eq!(program.subscription_count(), 2);
    assert_eq!(program.signals().bindings(0), &[0, 2]);
    assert_eq!(program.signals().bindings(1), &[1]);
    let code = program.prepare().unwrap();
    for binding in 0..3 {
        match code[binding] {
            Instruction::Skip { reg: None, count } => {
                let entry = binding + count as usize + 1;
                assert_eq!(code[entry], Instruction::LoadRoot { reg: Reg(0) });
            }
            other => panic!("jump table entry {binding} is {other:?}"),
        }
    }
}

#[test]
fn test_exception_table_saturates() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new());
    let scope = fx.root_scope();
    for _ in 0..130 {
        compiler
            .compile(&Node::ident("height"), real(WIDTH), &scope)
            .unwrap();
    }
    assert_eq!(compiler.committed().exception_count(), 255);
    assert!(code(&compiler, 129).contains(&Instruction::Store {
        reg: Reg(0),
        exception: ExceptionId::NONE,
        index: WIDTH,
    }));
    assert!(compiler.program().is_ok());
}

#[test]
fn test_bindings_dump_marker() {
    let fx = fixture();
    let mut compiler = fx.compiler(CompilerOptions::new().bindings_dump(true));
    compiler
        .compile(&Node::ident("height").at(4, 12), real(WIDTH), &fx.root_scope())
        .unwrap();
    assert_eq!(
        code(&compiler, 0)[0],
        Instruction::BindingId {
            line: 4,
            column: 12
        }
    );
}

// ============================================================================
// Ownership
// ============================================================================

#[test]
fn test_cleanups_balance_on_every_path() {
    let fx = fixture();
    let string = Destination::property(LABEL, PropertyType::String);
    let cases = [
        (
            Node::conditional(
                Node::ident("visible"),
                Node::ident("label"),
                add(Node::ident("label"), Node::string("b")),
            ),
            string,
        ),
        (add(Node::ident("label"), Node::string("x")), string),
        (
            add(
                Node::string("a"),
                Node::nested(Node::conditional(
                    Node::ident("visible"),
                    Node::string("b"),
                    Node::string("c"),
                )),
            ),
            string,
        ),
        (add(Node::ident("title"), Node::string("x")), string),
        (
            Node::binary(BinaryOp::Sub, Node::ident("title"), Node::number(1.0)),
            real(WIDTH),
        ),
        (Node::ident("title"), string),
        (
            Node::ident("source"),
            Destination::property(SOURCE, PropertyType::Url),
        ),
        (
            Node::ident("title"),
            Destination::property(SOURCE, PropertyType::Url),
        ),
        (
            Node::ident("title"),
            Destination::property(EXTRA, PropertyType::Variant),
        ),
    ];

    for (ii, (expr, dest)) in cases.iter().enumerate() {
        let mut compiler = fx.compiler(CompilerOptions::experimental_mode());
        compiler
            .compile(expr, *dest, &fx.root_scope())
            .unwrap_or_else(|e| panic!("case {ii}: {e}"));
        for balance in ownership_balance(&code(&compiler, 0)) {
            assert_eq!(balance, [0, 0, 0], "case {ii}");
        }
    }
}

fn leaf() -> impl Strategy<Value = Node> {
    prop_oneof![
        prop::sample::select(vec!["width", "height", "visible", "count", "label", "title"])
            .prop_map(Node::ident),
        (0u8..4).prop_map(|n| Node::number(f64::from(n))),
        prop::sample::select(vec!["a", "b"]).prop_map(Node::string),
        any::<bool>().prop_map(Node::boolean),
    ]
}

fn expression() -> impl Strategy<Value = Node> {
    leaf().prop_recursive(4, 24, 3, |inner| {
        prop_oneof![
            (
                prop::sample::select(vec![
                    BinaryOp::Add,
                    BinaryOp::Sub,
                    BinaryOp::Gt,
                    BinaryOp::Equal,
                    BinaryOp::NotEqual
                ]),
                inner.clone(),
                inner.clone()
            )
                .prop_map(|(op, l, r)| Node::binary(op, l, r)),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(t, a, b)| Node::conditional(t, a, b)),
            (inner.clone(), inner)
                .prop_map(|(a, b)| Node::call(Node::path("Math.max"), vec![a, b])),
        ]
    })
}

proptest! {
    #[test]
    fn compiled_bindings_balance_ownership(
        expr in expression(),
        dest in prop::sample::select(vec![
            PropertyType::Real,
            PropertyType::Int,
            PropertyType::Bool,
            PropertyType::String,
        ]),
    ) {
        let fx = fixture();
        let mut compiler = fx.compiler(
            CompilerOptions::experimental_mode()
                .duplicate_subscriptions(DuplicateSubscriptions::Share),
        );
        let before = compiler.committed().data_len();
        match compiler.compile(&expr, Destination::property(0, dest), &fx.root_scope()) {
            Ok(index) => {
                for balance in ownership_balance(&code(&compiler, index)) {
                    prop_assert_eq!(balance, [0, 0, 0]);
                }
                prop_assert!(compiler.program().is_ok());
            }
            Err(_) => {
                prop_assert_eq!(compiler.binding_count(), 0);
                prop_assert_eq!(compiler.committed().data_len(), before);
            }
        }
    }
}
