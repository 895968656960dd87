//! Reference counting, manual frees and wrapper lifetimes.

mod common;

use std::thread;

use common::{fingerprint, setup, setup_with};
use nativebind::{
    BridgeConfig, BridgeError, BridgeProperty, DiagnosticKind, NativeCallError, Origin, ReleaseOutcome, Variant,
    VariantType, Wrapper, WrapperState,
};

#[test]
fn acquire_and_release_are_balanced() {
    let (engine, bridge) = setup();
    let resource = bridge.construct("Resource").unwrap();
    let raw = resource.raw().unwrap();
    let lifetime = bridge.lifetime();

    assert_eq!(lifetime.reference_count(raw), Some(1));
    assert_eq!(lifetime.managed_refs(raw.id), 1);
    assert_eq!(lifetime.origin(raw.id), Some(Origin::Constructed));

    bridge.acquire(raw).unwrap();
    bridge.acquire(raw).unwrap();
    assert_eq!(lifetime.reference_count(raw), Some(3));
    assert_eq!(bridge.release(raw).unwrap(), ReleaseOutcome::Alive(2));
    assert_eq!(bridge.release(raw).unwrap(), ReleaseOutcome::Alive(1));

    drop(resource);
    assert!(!bridge.is_valid(raw));
    assert_eq!(engine.live_objects(), 0);
    assert_eq!(lifetime.managed_refs(raw.id), 0);
}

#[test]
fn released_handle_is_use_after_release() {
    let (_engine, bridge) = setup();
    let mut resource = bridge.construct("Resource").unwrap();
    let raw = resource.raw().unwrap();
    let get_path = fingerprint(&[], VariantType::String);

    resource.release().unwrap();
    assert!(!bridge.is_valid(raw));
    assert_eq!(bridge.release(raw).unwrap_err(), BridgeError::UseAfterRelease { id: raw.id });
    assert_eq!(bridge.acquire(raw).unwrap_err(), BridgeError::UseAfterRelease { id: raw.id });
    assert!(bridge.call("Resource", "get_path", get_path, Some(raw), &[]).unwrap_err().is_use_after_release());
    assert!(resource.call("get_path", get_path, &[]).unwrap_err().is_use_after_release());
}

#[test]
fn clones_own_their_reference() {
    let (_engine, bridge) = setup();
    let resource = bridge.construct("Resource").unwrap();
    let raw = resource.raw().unwrap();

    let clone = resource.try_clone().unwrap();
    assert_eq!(bridge.lifetime().reference_count(raw), Some(2));
    drop(resource);
    assert_eq!(bridge.lifetime().reference_count(raw), Some(1));

    let set_path = fingerprint(&[VariantType::String], VariantType::Nil);
    clone.call("set_path", set_path, &[Variant::from("res://a.tres")]).unwrap();
    drop(clone);
    assert!(!bridge.is_valid(raw));
}

#[test]
fn adopting_takes_a_reference_of_its_own() {
    let (engine, bridge) = setup();
    let raw = engine.spawn("Resource").unwrap();

    let adopted = bridge.adopt(raw).unwrap();
    assert_eq!(bridge.lifetime().reference_count(raw), Some(2));
    assert_eq!(bridge.lifetime().origin(raw.id), Some(Origin::Adopted));
    drop(adopted);

    // the engine's own reference keeps it alive
    assert_eq!(bridge.lifetime().reference_count(raw), Some(1));
    assert!(bridge.is_valid(raw));
}

#[test]
fn freeing_a_manual_object_invalidates_every_alias() {
    let (engine, bridge) = setup();
    let mut node = bridge.construct("Node").unwrap();
    let alias = node.try_clone().unwrap();
    let raw = node.raw().unwrap();

    node.free().unwrap();
    assert_eq!(node.state(), WrapperState::Released);
    assert!(!alias.is_valid());
    assert!(alias.call("get_name", fingerprint(&[], VariantType::String), &[]).is_err());
    assert_eq!(bridge.free(raw).unwrap_err(), BridgeError::UseAfterRelease { id: raw.id });
    assert_eq!(engine.live_objects(), 0);
}

#[test]
fn native_free_is_observed() {
    let (engine, bridge) = setup();
    let node = bridge.construct("Node").unwrap();
    let raw = node.raw().unwrap();

    nativebind::NativeEngine::free(&*engine, raw.id).unwrap();
    assert!(!node.is_valid());
    assert_eq!(node.id().unwrap_err(), BridgeError::UseAfterRelease { id: raw.id });
}

#[test]
fn ownership_rules_are_enforced() {
    let (engine, bridge) = setup();
    let mut resource = bridge.construct("Resource").unwrap();
    let err = resource.free().unwrap_err();
    assert!(matches!(
        err,
        BridgeError::NativeCall(NativeCallError::OwnershipViolation { operation: "free", .. })
    ));

    // releasing a Manual wrapper leaves the object alone
    let mut node = bridge.construct("Node").unwrap();
    let raw = node.raw().unwrap();
    node.release().unwrap();
    assert_eq!(bridge.release(raw).unwrap(), ReleaseOutcome::Uncounted);
    assert!(bridge.is_valid(raw));
    assert_eq!(engine.live_objects(), 2);
}

#[test]
fn wrapper_state_machine() {
    let (_engine, bridge) = setup();
    let get_path = fingerprint(&[], VariantType::String);
    let mut wrapper = Wrapper::new(&bridge, "Resource");

    assert_eq!(wrapper.state(), WrapperState::Unconstructed);
    assert_eq!(
        wrapper.call("get_path", get_path, &[]).unwrap_err(),
        BridgeError::Unconstructed {
            class: "Resource".into()
        }
    );
    assert!(wrapper.release().is_err());

    wrapper.construct().unwrap();
    assert_eq!(wrapper.state(), WrapperState::Bound);
    let id = wrapper.id().unwrap();
    // constructing twice keeps the same object
    wrapper.construct().unwrap();
    assert_eq!(wrapper.id().unwrap(), id);
    assert_eq!(wrapper.call("get_path", get_path, &[]).unwrap(), Variant::from(""));

    wrapper.release().unwrap();
    assert_eq!(wrapper.state(), WrapperState::Released);
    assert_eq!(wrapper.construct().unwrap_err(), BridgeError::UseAfterRelease { id });
    assert_eq!(wrapper.release().unwrap_err(), BridgeError::UseAfterRelease { id });
}

#[test]
fn abstract_and_unknown_classes_do_not_construct() {
    let (_engine, bridge) = setup();
    assert!(matches!(
        bridge.construct("Object"),
        Err(BridgeError::NativeCall(NativeCallError::NotInstantiable(_)))
    ));
    assert!(matches!(
        bridge.construct("Spaceship"),
        Err(BridgeError::NativeCall(NativeCallError::UnknownClass(_)))
    ));
}

#[test]
fn off_thread_drop_waits_for_flush() {
    let (_engine, bridge) = setup();
    let resource = bridge.construct("Resource").unwrap();
    let raw = resource.raw().unwrap();
    let extra = resource.handle().unwrap().try_clone().unwrap();
    assert_eq!(bridge.lifetime().reference_count(raw), Some(2));

    thread::spawn(move || drop(extra)).join().unwrap();

    assert_eq!(bridge.stats().pending_releases, 1);
    assert_eq!(bridge.lifetime().reference_count(raw), Some(2));
    assert_eq!(bridge.flush_pending().unwrap(), 1);
    assert_eq!(bridge.lifetime().reference_count(raw), Some(1));
    assert_eq!(bridge.stats().pending_releases, 0);
}

#[test]
fn main_thread_only_operations_fail_elsewhere() {
    let (_engine, bridge) = setup();
    let node = bridge.construct("Node").unwrap();
    let raw = node.raw().unwrap();

    let probe = bridge.virtual_slot("Node", "_ready").unwrap();

    let remote = bridge.clone();
    let (construct, flush, has_override, has_override_slot, valid) = thread::spawn(move || {
        (
            remote.construct("Node").map(|_| ()),
            remote.flush_pending().map(|_| ()),
            remote.has_override(raw, "_ready").map(|_| ()),
            remote.has_override_slot(raw, &probe).map(|_| ()),
            remote.is_valid(raw),
        )
    })
    .join()
    .unwrap();

    assert_eq!(construct.unwrap_err(), BridgeError::WrongThread { operation: "construct" });
    assert_eq!(flush.unwrap_err(), BridgeError::WrongThread { operation: "flush_pending" });
    assert_eq!(has_override.unwrap_err(), BridgeError::WrongThread { operation: "has_override" });
    assert_eq!(
        has_override_slot.unwrap_err(),
        BridgeError::WrongThread { operation: "has_override_slot" }
    );
    // liveness reads are allowed anywhere
    assert!(valid);
}

#[test]
fn thread_checks_can_be_disabled() {
    let config = BridgeConfig::default().with(BridgeProperty::EnforceMainThread, 0);
    let (engine, bridge) = setup_with(config);

    let remote = bridge.clone();
    let id = thread::spawn(move || remote.construct("Node").and_then(|node| node.id()))
        .join()
        .unwrap()
        .unwrap();
    assert!(bridge.is_valid(nativebind::RawHandle::manual(id)));
    assert_eq!(engine.live_objects(), 1);
}

#[test]
fn shutdown_reports_leaked_manual_objects() {
    let (engine, bridge) = setup();
    let kept = bridge.construct("Node").unwrap();
    let mut freed = bridge.construct("Node").unwrap();
    let _resource = bridge.construct("Resource").unwrap();
    let adopted = bridge.adopt(engine.spawn("Node").unwrap()).unwrap();
    freed.free().unwrap();

    let report = bridge.shutdown().unwrap();
    assert_eq!(report.leaked, vec![kept.id().unwrap()]);
    assert!(!report.is_clean());
    let warnings: Vec<_> = report
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("never freed"));
    // adopted objects are the engine's to free
    assert!(!report.leaked.contains(&adopted.id().unwrap()));
}

#[test]
fn shutdown_without_leak_reporting() {
    let config = BridgeConfig::default().with(BridgeProperty::ReportLeaksOnShutdown, 0);
    let (_engine, bridge) = setup_with(config);
    let _node = bridge.construct("Node").unwrap();
    let report = bridge.shutdown().unwrap();
    assert!(report.leaked.is_empty());
    assert!(report.is_clean());
}

#[test]
fn churn_does_not_grow_the_released_record() {
    let (engine, bridge) = setup();
    let mut last = None;
    for _ in 0..10_000 {
        let resource = bridge.construct("Resource").unwrap();
        last = Some(resource.raw().unwrap());
    }
    assert_eq!(engine.live_objects(), 0);
    assert_eq!(bridge.lifetime().released_slots(), 1);
    assert!(!bridge.is_valid(last.unwrap()));
}
