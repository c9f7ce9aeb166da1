//! Evaluation laws
//!
//! Properties that hold for every input: how undefined operands propagate
//! through arithmetic, comparison and concatenation, and how reals are
//! narrowed on store.

use std::rc::Rc;

use proptest::prelude::*;
use tether::{
    AbstractBinding, BinaryOp, CompileScope, CompiledBinding, Destination, DocumentObject,
    DynamicObject, Engine, MetaObject, Node, ObjectRef, PropertyDef, PropertyTarget, PropertyType,
    TypeRegistry, Variant, WriteFlags,
};

// ============================================================================
// Fixture
// ============================================================================

const WIDTH: u32 = 0;
const VISIBLE: u32 = 2;
const COUNT: u32 = 3;
const LABEL: u32 = 4;

struct Fixture {
    engine: Engine,
    item: Rc<MetaObject>,
}

fn fixture() -> Fixture {
    let mut types = TypeRegistry::new();
    let anchor = types.register(
        MetaObject::builder("Anchor")
            .property(PropertyDef::new("margin", PropertyType::Real).final_())
            .property(PropertyDef::new("name", PropertyType::String).final_()),
    );
    let item = types.register(
        MetaObject::builder("Item")
            .prop("width", PropertyType::Real)
            .prop("height", PropertyType::Real)
            .prop("visible", PropertyType::Bool)
            .prop("count", PropertyType::Int)
            .prop("label", PropertyType::String)
            .prop("anchor", PropertyType::Object(anchor.type_id())),
    );
    Fixture {
        engine: Engine::with_types(types),
        item,
    }
}

/// Compile one binding on the root object, bind it and return the root.
/// The `anchor` property is left empty.
fn evaluate(
    fx: &Fixture,
    expression: Node,
    destination: Destination,
    height: f64,
) -> (Rc<DynamicObject>, CompiledBinding) {
    let root = DocumentObject::new(0, fx.item.type_id());
    let mut builder = fx.engine.document(None);
    let index = builder
        .compile(&expression, destination, &CompileScope::new(root, root))
        .unwrap();
    let document = builder.build().unwrap();

    let object = DynamicObject::new(&fx.item);
    object.set("height", height);
    let context = document.create_context();
    context.set_context_object(Some(object.clone() as ObjectRef));
    let manager = document.instantiate(context).unwrap();
    let binding = manager
        .configure(
            index,
            object.clone(),
            None,
            PropertyTarget::Plain(destination.index),
        )
        .unwrap();
    binding.set_enabled(true, WriteFlags::NONE);
    (object, binding)
}

fn small_real() -> impl Strategy<Value = f64> {
    (-10_000i32..10_000).prop_map(|n| n as f64 / 4.0)
}

// ============================================================================
// Laws
// ============================================================================

proptest! {
    #[test]
    fn prop_undefined_operand_gives_nan(k in small_real(), swap in any::<bool>()) {
        let fx = fixture();
        for op in [BinaryOp::Add, BinaryOp::Sub] {
            let (lhs, rhs) = if swap {
                (Node::number(k), Node::path("anchor.margin"))
            } else {
                (Node::path("anchor.margin"), Node::number(k))
            };
            let (object, binding) = evaluate(
                &fx,
                Node::binary(op, lhs, rhs),
                Destination::property(WIDTH, PropertyType::Real),
                0.0,
            );
            match object.get("width") {
                Variant::Real(r) => prop_assert!(r.is_nan()),
                other => prop_assert!(false, "expected real, got {:?}", other),
            }
            prop_assert!(binding.error().is_none());
        }
    }

    #[test]
    fn prop_undefined_is_unequal_to_any_real(height in small_real()) {
        let fx = fixture();
        let visible = Destination::property(VISIBLE, PropertyType::Bool);
        for (op, expected) in [
            (BinaryOp::Equal, false),
            (BinaryOp::NotEqual, true),
            (BinaryOp::Gt, false),
        ] {
            let (object, _binding) = evaluate(
                &fx,
                Node::binary(op, Node::path("anchor.margin"), Node::ident("height")),
                visible,
                height,
            );
            prop_assert_eq!(object.get("visible"), Variant::Bool(expected));
        }
    }

    #[test]
    fn prop_undefined_string_concatenates_as_text(suffix in "[a-z ]{0,12}") {
        let fx = fixture();
        let (object, _binding) = evaluate(
            &fx,
            Node::binary(BinaryOp::Add, Node::path("anchor.name"), Node::string(&suffix)),
            Destination::property(LABEL, PropertyType::String),
            0.0,
        );
        let expected = format!("undefined{suffix}");
        prop_assert_eq!(object.get("label"), Variant::from(expected.as_str()));
    }

    #[test]
    fn prop_real_to_int_rounds_half_away_from_zero(height in small_real()) {
        let fx = fixture();
        let (object, _binding) = evaluate(
            &fx,
            Node::ident("height"),
            Destination::property(COUNT, PropertyType::Int),
            height,
        );
        prop_assert_eq!(object.get("count"), Variant::Int(height.round() as i32));
    }

    #[test]
    fn prop_comparison_matches_reals(height in small_real(), k in small_real()) {
        let fx = fixture();
        let (object, _binding) = evaluate(
            &fx,
            Node::binary(BinaryOp::Gt, Node::ident("height"), Node::number(k)),
            Destination::property(VISIBLE, PropertyType::Bool),
            height,
        );
        prop_assert_eq!(object.get("visible"), Variant::Bool(height > k));
    }
}
