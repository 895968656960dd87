//! Virtual dispatch into managed overrides.

mod common;

use common::{Inert, Player, Sprite, setup, setup_with};
use nativebind::{BridgeConfig, BridgeError, BridgeProperty, DiagnosticSource, MarshalError, NativeEngine, Variant};

#[test]
fn has_override_answers_from_the_table() {
    let (_engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();

    assert!(bridge.has_override(raw, "_ready").unwrap());
    assert!(bridge.has_override(raw, "_process").unwrap());
    assert!(bridge.has_override(raw, "_to_string").unwrap());
    assert!(!bridge.has_override(raw, "_enter_tree").unwrap());
    assert!(!bridge.has_override(raw, "_notification").unwrap());
    assert_eq!(player.bind().unwrap().ready_calls, 0);
}

#[test]
fn empty_script_overrides_nothing() {
    let (_engine, bridge) = setup();
    let inert = bridge.construct_script(Inert).unwrap();
    let raw = inert.wrapper().raw().unwrap();
    for name in ["_ready", "_process", "_physics_process", "_enter_tree", "_exit_tree"] {
        assert!(!bridge.has_override(raw, name).unwrap(), "{name}");
    }
}

#[test]
fn unknown_virtual_is_an_error() {
    let (_engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();
    assert_eq!(
        bridge.has_override(raw, "_explode").unwrap_err(),
        BridgeError::UnknownVirtual {
            class: "Node".into(),
            method: "_explode".into(),
        }
    );

    let plain = bridge.construct("Resource").unwrap();
    assert!(matches!(
        bridge.has_override(plain.raw().unwrap(), "_ready"),
        Err(BridgeError::UnknownVirtual { .. })
    ));
}

#[test]
fn engine_runs_override_instead_of_default() {
    let (engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let id = player.id().unwrap();

    assert_eq!(engine.run_virtual(id, "_ready", &[]).unwrap(), Variant::Nil);
    engine.run_virtual(id, "_process", &[Variant::Float(0.5)]).unwrap();
    engine.run_virtual(id, "_process", &[Variant::Float(0.25)]).unwrap();

    {
        let script = player.bind().unwrap();
        assert_eq!(script.ready_calls, 1);
        assert_eq!(script.total_delta, 0.75);
    }
    // the native default of _ready never ran
    assert_eq!(engine.property(id, "ready"), None);
    assert_eq!(
        engine.run_virtual(id, "_to_string", &[]).unwrap(),
        Variant::from("Player(ready=1)")
    );
    assert_eq!(bridge.stats().virtual_dispatches, 4);
    assert!(engine.has_script_override(id, "_process"));
}

#[test]
fn non_overridden_virtual_falls_through() {
    let (engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let id = player.id().unwrap();

    engine.run_virtual(id, "_enter_tree", &[]).unwrap();
    let raw = player.wrapper().raw().unwrap();
    assert_eq!(bridge.try_invoke_virtual(raw, "_exit_tree", &[]).unwrap(), None);
    assert_eq!(bridge.stats().virtual_fallthroughs, 2);
    assert_eq!(bridge.stats().virtual_dispatches, 0);

    // objects without a managed instance always fall through
    let plain = bridge.construct("Node").unwrap();
    let text = engine.run_virtual(plain.id().unwrap(), "_to_string", &[]).unwrap();
    assert!(text.as_str().is_some_and(|s| s.starts_with("<Node#")));
}

#[test]
fn bad_arguments_are_reported_not_raised() {
    let (_engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();

    assert_eq!(bridge.invoke_virtual(raw, "_process", &[]), None);
    assert_eq!(bridge.invoke_virtual(raw, "_process", &[Variant::from("fast")]), None);
    assert_eq!(player.bind().unwrap().total_delta, 0.0);

    let diagnostics = bridge.take_diagnostics();
    assert_eq!(diagnostics.len(), 2);
    assert!(matches!(
        diagnostics[0].error,
        Some(BridgeError::ArityMismatch { expected: 1, got: 0, .. })
    ));
    assert_eq!(
        diagnostics[1].error,
        Some(BridgeError::Marshal(
            MarshalError::TypeMismatch {
                expected: "float",
                actual: "String",
            }
            .at_argument(0)
        ))
    );
    assert_eq!(
        diagnostics[1].source,
        DiagnosticSource::Virtual {
            object: raw.id,
            method: "_process".into(),
        }
    );
    let stats = bridge.stats();
    assert_eq!(stats.dropped_outbound, 2);
    assert_eq!(stats.marshal_errors, 1);
}

#[test]
fn busy_instance_is_not_reentered() {
    let (_engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();

    let guard = player.bind().unwrap();
    assert_eq!(
        bridge.try_invoke_virtual(raw, "_ready", &[]).unwrap_err(),
        BridgeError::InstanceBusy { id: raw.id }
    );
    drop(guard);
    assert_eq!(bridge.try_invoke_virtual(raw, "_ready", &[]).unwrap(), Some(Variant::Nil));
}

#[test]
fn freed_manual_object_is_use_after_release() {
    let config = BridgeConfig::default().with(BridgeProperty::ValidateManualHandles, 0);
    let (engine, bridge) = setup_with(config);
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();

    // freed natively; the engine's notification is enough even without validation
    engine.free(raw.id).unwrap();
    assert!(bridge.instance(raw.id).is_none());
    assert_eq!(
        bridge.has_override(raw, "_ready").unwrap_err(),
        BridgeError::UseAfterRelease { id: raw.id }
    );
    assert_eq!(bridge.invoke_virtual(raw, "_ready", &[]), None);
    assert!(player.bind().is_ok());
    assert!(player.id().is_err());
}

#[test]
fn probe_skips_hashing_and_short_circuits() {
    let (_engine, bridge) = setup();
    let player = bridge.construct_script(Player::default()).unwrap();
    let raw = player.wrapper().raw().unwrap();
    let plain = bridge.construct("Node").unwrap();

    let process = bridge.virtual_slot("Node", "_process").unwrap();
    let exit_tree = bridge.virtual_slot("Node", "_exit_tree").unwrap();
    assert_eq!(process.name(), "_process");
    assert_eq!(process.class(), "Node");

    assert!(bridge.has_override_slot(raw, &process).unwrap());
    assert!(!bridge.has_override_slot(raw, &exit_tree).unwrap());
    assert!(!bridge.has_override_slot(plain.raw().unwrap(), &process).unwrap());
    assert!(matches!(
        bridge.virtual_slot("Node", "_draw"),
        Err(BridgeError::UnknownVirtual { .. })
    ));
}

#[test]
fn engine_attaches_registered_scripts() {
    let (engine, bridge) = setup();
    bridge.register_script::<Sprite>().unwrap();

    let sprite = engine.spawn("Node2D").unwrap();
    assert!(engine.attach_script(sprite, "AnimatedSprite"));
    let instance = bridge.instance(sprite.id).unwrap();
    assert_eq!(instance.lock().script_name(), "AnimatedSprite");

    engine.run_virtual(sprite.id, "_draw", &[]).unwrap();
    assert_eq!(bridge.stats().virtual_dispatches, 1);
    assert!(bridge.has_override(sprite, "_draw").unwrap());
    assert!(!bridge.has_override(sprite, "_ready").unwrap());
}

#[test]
fn attach_failures_become_diagnostics() {
    let (engine, bridge) = setup();
    bridge.register_script::<Sprite>().unwrap();

    let node = engine.spawn("Node").unwrap();
    assert!(!engine.attach_script(node, "AnimatedSprite"));
    assert!(!engine.attach_script(node, "Missing"));

    let errors: Vec<_> = bridge.take_diagnostics().into_iter().filter_map(|d| d.error).collect();
    assert_eq!(
        errors,
        vec![
            BridgeError::IncompatibleScript {
                base: "Node2D".into(),
                class: "Node".into(),
            },
            BridgeError::UnknownScript {
                name: "Missing".into()
            },
        ]
    );
    assert!(bridge.instance(node.id).is_none());
}

#[test]
fn script_on_derived_class_is_seen_by_probes() {
    let (engine, bridge) = setup();
    bridge.register_script::<Player>().unwrap();

    let sprite = engine.spawn("Node2D").unwrap();
    assert!(engine.attach_script(sprite, "Player"));

    let probe = bridge.virtual_slot("Node2D", "_ready").unwrap();
    assert!(bridge.has_override_slot(sprite, &probe).unwrap());
    // _draw belongs to Node2D, which Player's table does not cover
    assert!(!bridge.has_override(sprite, "_draw").unwrap());
    assert_eq!(engine.run_virtual(sprite.id, "_draw", &[]).unwrap(), Variant::Nil);
}
