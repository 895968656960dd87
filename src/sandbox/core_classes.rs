//! The core class hierarchy registered by [`SandboxEngine::with_core_classes`].
//!
//! ```text
//! Object (Manual)
//! ├── RefCounted (RefCounted)
//! │   └── Resource
//! └── Node
//!     └── Node2D
//! ```

use nativebind_core::{NativeCallError, ObjectId, Variant, VariantType, Vector2};

use super::{CallContext, ClassBuilder, SandboxEngine};

pub(super) fn register(engine: &SandboxEngine) {
    engine.register(object());
    engine.register(ref_counted());
    engine.register(node());
    engine.register(node_2d());
    engine.register(resource());
}

fn receiver_id(ctx: &CallContext<'_>) -> Result<ObjectId, NativeCallError> {
    Ok(ctx.receiver()?.id)
}

fn object() -> ClassBuilder {
    ClassBuilder::new("Object")
        .abstract_class()
        .method("get_class", &[], VariantType::String, |ctx| {
            let class = ctx.this()?.class.clone();
            ctx.set_return(class);
            Ok(())
        })
        .method("get_instance_id", &[], VariantType::Int, |ctx| {
            let id = receiver_id(ctx)?;
            ctx.set_return(id);
            Ok(())
        })
        .method("set_meta", &[VariantType::String, VariantType::Any], VariantType::Nil, |ctx| {
            let name: String = ctx.arg(0)?;
            let value = ctx.arg_slot(1)?.clone();
            ctx.this_mut()?.set(format!("meta/{name}"), value);
            Ok(())
        })
        .method("get_meta", &[VariantType::String], VariantType::Any, |ctx| {
            let name: String = ctx.arg(0)?;
            let value = ctx.this()?.get_or_nil(&format!("meta/{name}"));
            ctx.set_return_variant(value);
            Ok(())
        })
        .static_method("is_instance_id_valid", &[VariantType::Int], VariantType::Bool, |ctx| {
            let bits: i64 = ctx.arg(0)?;
            let alive = ObjectId::from_bits(bits as u64).is_some_and(|id| ctx.heap().is_alive(id));
            ctx.set_return(alive);
            Ok(())
        })
        .virtual_method("_notification", &[VariantType::Int], VariantType::Nil)
        .virtual_method("_to_string", &[], VariantType::String)
        .virtual_default("_to_string", |ctx| {
            let id = receiver_id(ctx)?;
            let class = ctx.this()?.class.clone();
            ctx.set_return(format!("<{class}#{id}>"));
            Ok(())
        })
        .signal("script_changed", &[])
}

fn ref_counted() -> ClassBuilder {
    ClassBuilder::new("RefCounted")
        .inherits("Object")
        .ref_counted()
        .method("get_reference_count", &[], VariantType::Int, |ctx| {
            let id = receiver_id(ctx)?;
            let count = ctx.heap().ref_count(id).ok_or(NativeCallError::DeadObject(id))?;
            ctx.set_return(count);
            Ok(())
        })
}

fn node() -> ClassBuilder {
    ClassBuilder::new("Node")
        .inherits("Object")
        .method("get_name", &[], VariantType::String, |ctx| {
            let name = ctx.this()?.get("name").cloned().unwrap_or_else(|| Variant::from(""));
            ctx.set_return_variant(name);
            Ok(())
        })
        .method("set_name", &[VariantType::String], VariantType::Nil, |ctx| {
            let name: String = ctx.arg(0)?;
            let node = ctx.this_mut()?;
            if node.get("name").and_then(Variant::as_str) == Some(name.as_str()) {
                return Ok(());
            }
            node.set("name", name);
            ctx.emit("renamed", Vec::new());
            Ok(())
        })
        .method("set_process", &[VariantType::Bool], VariantType::Nil, |ctx| {
            let enabled: bool = ctx.arg(0)?;
            ctx.this_mut()?.set("processing", enabled);
            Ok(())
        })
        .method("is_processing", &[], VariantType::Bool, |ctx| {
            let processing = ctx.this()?.get("processing") == Some(&Variant::Bool(true));
            ctx.set_return(processing);
            Ok(())
        })
        .method("add_child", &[VariantType::Object], VariantType::Nil, |ctx| {
            let child: nativebind_core::RawHandle = ctx.arg(0)?;
            if !ctx.heap().is_alive(child.id) {
                return Err(NativeCallError::DeadObject(child.id));
            }
            let node = ctx.this_mut()?;
            let count = match node.get("child_count") {
                Some(Variant::Int(count)) => *count,
                _ => 0,
            };
            node.set("child_count", count + 1);
            ctx.emit("child_entered_tree", vec![Variant::Object(child)]);
            Ok(())
        })
        .method("get_child_count", &[], VariantType::Int, |ctx| {
            let count = ctx.this()?.get_or_nil("child_count");
            ctx.set_return_variant(if count.is_nil() { Variant::Int(0) } else { count });
            Ok(())
        })
        .virtual_method("_ready", &[], VariantType::Nil)
        .virtual_default("_ready", |ctx| {
            ctx.this_mut()?.set("ready", true);
            ctx.emit("ready", Vec::new());
            Ok(())
        })
        .virtual_method("_process", &[VariantType::Float], VariantType::Nil)
        .virtual_method("_physics_process", &[VariantType::Float], VariantType::Nil)
        .virtual_method("_enter_tree", &[], VariantType::Nil)
        .virtual_default("_enter_tree", |ctx| {
            ctx.emit("tree_entered", Vec::new());
            Ok(())
        })
        .virtual_method("_exit_tree", &[], VariantType::Nil)
        .signal("renamed", &[])
        .signal("ready", &[])
        .signal("tree_entered", &[])
        .signal("child_entered_tree", &[VariantType::Object])
}

fn node_2d() -> ClassBuilder {
    ClassBuilder::new("Node2D")
        .inherits("Node")
        .method("set_position", &[VariantType::Vector2], VariantType::Nil, |ctx| {
            let position: Vector2 = ctx.arg(0)?;
            ctx.this_mut()?.set("position", position);
            Ok(())
        })
        .method("get_position", &[], VariantType::Vector2, |ctx| {
            let position = ctx.this()?.get("position").cloned().unwrap_or(Variant::Vector2(Vector2::ZERO));
            ctx.set_return_variant(position);
            Ok(())
        })
        .method("rotate", &[VariantType::Float], VariantType::Nil, |ctx| {
            let radians: f64 = ctx.arg(0)?;
            let node = ctx.this_mut()?;
            let current = match node.get("rotation") {
                Some(Variant::Float(current)) => *current,
                _ => 0.0,
            };
            node.set("rotation", current + radians);
            Ok(())
        })
        .method("get_rotation", &[], VariantType::Float, |ctx| {
            let rotation = match ctx.this()?.get("rotation") {
                Some(Variant::Float(rotation)) => *rotation,
                _ => 0.0,
            };
            ctx.set_return(rotation);
            Ok(())
        })
        .virtual_method("_draw", &[], VariantType::Nil)
}

fn resource() -> ClassBuilder {
    ClassBuilder::new("Resource")
        .inherits("RefCounted")
        .method("get_path", &[], VariantType::String, |ctx| {
            let path = ctx.this()?.get("path").cloned().unwrap_or_else(|| Variant::from(""));
            ctx.set_return_variant(path);
            Ok(())
        })
        .method("set_path", &[VariantType::String], VariantType::Nil, |ctx| {
            let path: String = ctx.arg(0)?;
            ctx.this_mut()?.set("path", path);
            ctx.emit("changed", Vec::new());
            Ok(())
        })
        .virtual_method("_setup_local_to_scene", &[], VariantType::Nil)
        .signal("changed", &[])
}
