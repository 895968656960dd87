//! Method binding resolution and caching.

mod common;

use std::sync::Arc;
use std::thread;

use common::{fingerprint, setup};
use nativebind::sandbox::SandboxEngine;
use nativebind::{
    BindingCache, BridgeError, MethodBind, MethodSignature, NativeCallError, Variant, VariantType, Vector2,
};

#[test]
fn resolution_queries_engine_once() {
    let (engine, bridge) = setup();
    let node = bridge.construct("Node").unwrap();
    let set_name = fingerprint(&[VariantType::String], VariantType::Nil);

    for name in ["a", "b", "c"] {
        node.call("set_name", set_name, &[Variant::from(name)]).unwrap();
    }

    assert_eq!(engine.lookups(), 1);
    assert_eq!(bridge.stats().resolutions, 1);
    assert_eq!(bridge.stats().native_calls, 3);
    let get_name = fingerprint(&[], VariantType::String);
    assert_eq!(node.call("get_name", get_name, &[]).unwrap(), Variant::from("c"));
}

#[test]
fn concurrent_first_resolution_agrees() {
    let engine = Arc::new(SandboxEngine::with_core_classes());
    let cache = Arc::new(BindingCache::new());
    let rotate = fingerprint(&[VariantType::Float], VariantType::Nil);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.resolve(&*engine, "Node2D", "rotate", rotate).unwrap())
        })
        .collect();
    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(resolved.windows(2).all(|pair| pair[0] == pair[1]));
    // racing threads may each query the engine, but only one handle is kept
    assert!(cache.resolutions() >= 1);
    assert_eq!(cache.descriptor("Node2D").resolved_count(), 1);
    // later calls never reach the engine
    let before = engine.lookups();
    cache.resolve(&*engine, "Node2D", "rotate", rotate).unwrap();
    assert_eq!(engine.lookups(), before);
}

#[test]
fn changed_signature_is_a_binding_mismatch() {
    let (engine, bridge) = setup();
    let generated = fingerprint(&[VariantType::String], VariantType::Nil);
    engine.set_method_signature(
        "Node",
        "set_name",
        MethodSignature::new(vec![VariantType::String, VariantType::Bool], VariantType::Nil),
    );

    let node = bridge.construct("Node").unwrap();
    let err = node.call("set_name", generated, &[Variant::from("x")]).unwrap_err();
    match err {
        BridgeError::BindingMismatch {
            class,
            method,
            expected,
            found,
        } => {
            assert_eq!(class, "Node");
            assert_eq!(method, "set_name");
            assert_eq!(expected, generated);
            assert_ne!(found, generated);
        }
        other => panic!("expected BindingMismatch, got {other:?}"),
    }
    assert_eq!(bridge.stats().native_calls, 0);
}

#[test]
fn mismatches_are_not_cached() {
    let (engine, bridge) = setup();
    let generated = fingerprint(&[VariantType::String], VariantType::Nil);
    let current = MethodSignature::new(vec![VariantType::String], VariantType::Nil);
    engine.set_method_signature("Node", "set_name", MethodSignature::new(vec![VariantType::Int], VariantType::Nil));

    assert!(bridge.call("Node", "set_name", generated, None, &[]).is_err());
    engine.set_method_signature("Node", "set_name", current);

    let node = bridge.construct("Node").unwrap();
    node.call("set_name", generated, &[Variant::from("ok")]).unwrap();
    assert_eq!(engine.lookups(), 2);
}

#[test]
fn compatibility_fingerprints_still_bind() {
    let (engine, bridge) = setup();
    let old = fingerprint(&[VariantType::Float], VariantType::Nil);
    engine.set_method_signature(
        "Node2D",
        "rotate",
        MethodSignature::new(vec![VariantType::Any], VariantType::Nil),
    );
    engine.add_compatible_fingerprint("Node2D", "rotate", old);

    let node = bridge.construct("Node2D").unwrap();
    node.call("rotate", old, &[Variant::Float(0.25)]).unwrap();
    let get_rotation = fingerprint(&[], VariantType::Float);
    assert_eq!(node.call("get_rotation", get_rotation, &[]).unwrap(), Variant::Float(0.25));
}

#[test]
fn unknown_method_and_class() {
    let (_engine, bridge) = setup();
    let fp = fingerprint(&[], VariantType::Nil);
    assert_eq!(
        bridge.call("Node", "explode", fp, None, &[]).unwrap_err(),
        BridgeError::UnknownMethod {
            class: "Node".into(),
            method: "explode".into(),
        }
    );
    assert_eq!(
        bridge.call("Spaceship", "fly", fp, None, &[]).unwrap_err(),
        BridgeError::UnknownClass {
            class: "Spaceship".into()
        }
    );
}

#[test]
fn engine_errors_surface_as_native_call() {
    let (_engine, bridge) = setup();
    let node = bridge.construct("Node2D").unwrap();
    let set_position = fingerprint(&[VariantType::Vector2], VariantType::Nil);
    let err = node.call("set_position", set_position, &[Variant::Int(3)]).unwrap_err();
    assert!(err.is_native());
    assert!(matches!(
        err,
        BridgeError::NativeCall(NativeCallError::Argument { index: 0, .. })
    ));

    node.call("set_position", set_position, &[Variant::from(Vector2::new(1.0, 2.0))])
        .unwrap();
}

static SET_NAME: MethodBind = MethodBind::new("Node", "set_name", &[VariantType::String], VariantType::Nil);
static GET_NAME: MethodBind = MethodBind::new("Node", "get_name", &[], VariantType::String);
static GET_CHILD_COUNT: MethodBind = MethodBind::new("Node", "get_child_count", &[], VariantType::Int);

#[test]
fn method_bind_caches_per_bridge() {
    let (engine, bridge) = setup();
    let node = bridge.construct("Node").unwrap();

    SET_NAME.call_as::<(), _>(&bridge, Some(&node), ("Hero",)).unwrap();
    SET_NAME.call_as::<(), _>(&bridge, Some(&node), ("Hero 2",)).unwrap();
    let name: String = GET_NAME.call_as(&bridge, Some(&node), ()).unwrap();
    assert_eq!(name, "Hero 2");
    assert_eq!(engine.lookups(), 2);

    // a second bridge resolves again through its own cache
    let (other_engine, other) = setup();
    let other_node = other.construct("Node").unwrap();
    let count: i64 = GET_CHILD_COUNT.call_as(&other, Some(&other_node), ()).unwrap();
    assert_eq!(count, 0);
    assert_eq!(other_engine.lookups(), 1);
}

#[test]
fn method_bind_checks_arguments_before_the_engine() {
    let (_engine, bridge) = setup();
    let node = bridge.construct("Node").unwrap();
    let err = SET_NAME.call(&bridge, Some(&node), &[Variant::Int(1)]).unwrap_err();
    assert!(err.is_marshal());
    let err = SET_NAME.call(&bridge, Some(&node), &[]).unwrap_err();
    assert!(matches!(err, BridgeError::ArityMismatch { expected: 1, got: 0, .. }));
    assert_eq!(bridge.stats().native_calls, 0);
}
