//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use nativebind::sandbox::SandboxEngine;
use nativebind::{Bridge, BridgeConfig, Fingerprint, MethodSignature, VariantType, script_class};

/// A bridge over a sandbox engine with the core classes.
pub fn setup() -> (Arc<SandboxEngine>, Bridge) {
    setup_with(BridgeConfig::default())
}

pub fn setup_with(config: BridgeConfig) -> (Arc<SandboxEngine>, Bridge) {
    let engine = Arc::new(SandboxEngine::with_core_classes());
    let bridge = Bridge::with_config(Arc::clone(&engine), config);
    (engine, bridge)
}

pub fn fingerprint(params: &[VariantType], ret: VariantType) -> Fingerprint {
    MethodSignature::new(params, ret).fingerprint()
}

/// Overrides `_ready`, `_process` and `_to_string` of `Node`.
#[derive(Debug, Default)]
pub struct Player {
    pub ready_calls: u32,
    pub total_delta: f64,
}

#[script_class(base = "Node")]
impl Player {
    #[native_virtual]
    fn _ready(&mut self) {
        self.ready_calls += 1;
    }

    #[native_virtual]
    fn _process(&mut self, delta: f64) {
        self.total_delta += delta;
    }

    #[native_virtual]
    fn _to_string(&self) -> String {
        format!("Player(ready={})", self.ready_calls)
    }

    pub fn speed(&self) -> f64 {
        2.5
    }
}

/// Extends `Node` without overriding anything.
#[derive(Debug, Default)]
pub struct Inert;

#[script_class(base = "Node")]
impl Inert {}

/// Overrides `_draw` under a different method name.
#[derive(Debug, Default)]
pub struct Sprite {
    pub draws: u32,
}

#[script_class(base = "Node2D", name = "AnimatedSprite")]
impl Sprite {
    #[native_virtual(name = "_draw")]
    fn redraw(&mut self) {
        self.draws += 1;
    }
}
