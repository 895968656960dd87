//! Integration tests for the `#[script_class]` attribute.

mod common;

use common::{Inert, Player, Sprite};
use nativebind::{BridgeError, MarshalError, ScriptClass, Variant, script_class};

/// Listens for notifications on a bare `Object`.
#[derive(Debug, Default)]
struct Watcher {
    seen: Vec<i32>,
}

#[script_class(base = "Object", name = "NotificationWatcher")]
impl Watcher {
    #[nativebind::native_virtual]
    fn _notification(&mut self, what: i32) {
        self.seen.push(what);
    }

    #[native_virtual(name = "_to_string")]
    fn describe(&self) -> String {
        format!("{} notifications", self.seen.len())
    }
}

#[test]
fn test_class_metadata() {
    assert_eq!(Player::NAME, "Player");
    assert_eq!(Player::BASE, "Node");
    assert_eq!(Player::OVERRIDES, &["_ready", "_process", "_to_string"]);

    assert_eq!(Inert::NAME, "Inert");
    assert!(Inert::OVERRIDES.is_empty());

    assert_eq!(Sprite::NAME, "AnimatedSprite");
    assert_eq!(Sprite::BASE, "Node2D");
    assert_eq!(Sprite::OVERRIDES, &["_draw"]);

    assert_eq!(Watcher::NAME, "NotificationWatcher");
    assert_eq!(Watcher::OVERRIDES, &["_notification", "_to_string"]);
}

#[test]
fn test_call_virtual_unboxes_arguments() {
    let mut player = Player::default();
    assert_eq!(player.call_virtual("_ready", &[]).unwrap(), Variant::Nil);
    player.call_virtual("_process", &[Variant::Float(1.5)]).unwrap();
    assert_eq!(player.ready_calls, 1);
    assert_eq!(player.total_delta, 1.5);
    assert_eq!(
        player.call_virtual("_to_string", &[]).unwrap(),
        Variant::from("Player(ready=1)")
    );
}

#[test]
fn test_renamed_virtual_dispatches_to_method() {
    let mut sprite = Sprite::default();
    sprite.call_virtual("_draw", &[]).unwrap();
    sprite.call_virtual("_draw", &[]).unwrap();
    assert_eq!(sprite.draws, 2);
    // the Rust method name is not a virtual
    assert!(matches!(
        sprite.call_virtual("redraw", &[]),
        Err(BridgeError::UnknownVirtual { .. })
    ));
}

#[test]
fn test_arity_is_checked() {
    let mut player = Player::default();
    assert_eq!(
        player.call_virtual("_process", &[]).unwrap_err(),
        BridgeError::ArityMismatch {
            target: "Player::_process".into(),
            expected: 1,
            got: 0,
        }
    );
    assert!(matches!(
        player.call_virtual("_ready", &[Variant::Nil]),
        Err(BridgeError::ArityMismatch { expected: 0, got: 1, .. })
    ));
}

#[test]
fn test_marshal_errors_name_the_argument() {
    let mut watcher = Watcher::default();
    let err = watcher
        .call_virtual("_notification", &[Variant::from("ready")])
        .unwrap_err();
    assert_eq!(
        err,
        BridgeError::Marshal(
            MarshalError::TypeMismatch {
                expected: "int",
                actual: "String",
            }
            .at_argument(0)
        )
    );

    let err = watcher
        .call_virtual("_notification", &[Variant::Int(i64::from(i32::MAX) + 1)])
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Marshal(MarshalError::Argument { index: 0, ref source })
            if matches!(**source, MarshalError::IntegerOverflow { .. })
    ));

    watcher.call_virtual("_notification", &[Variant::Int(13)]).unwrap();
    assert_eq!(watcher.seen, vec![13]);
    assert_eq!(
        watcher.call_virtual("_to_string", &[]).unwrap(),
        Variant::from("1 notifications")
    );
}

#[test]
fn test_unknown_virtual_names_the_base() {
    let mut player = Player::default();
    assert_eq!(
        player.call_virtual("speed", &[]).unwrap_err(),
        BridgeError::UnknownVirtual {
            class: "Node".into(),
            method: "speed".into(),
        }
    );
    // plain methods stay ordinary Rust methods
    assert_eq!(player.speed(), 2.5);
}
