//! Hot-path benchmarks for the bridge.
//!
//! Covers the paths the engine hits every frame: cached native calls,
//! override probes, virtual dispatch and signal delivery.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- --profile-time 5
//! ```

use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use nativebind::sandbox::SandboxEngine;
use nativebind::{
    BindingCache, Bridge, Callback, ConnectFlags, FromVariant, MethodBind, MethodSignature, ToVariant, Variant,
    VariantType, script_class,
};

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

#[derive(Default)]
struct Mover {
    distance: f64,
}

#[script_class(base = "Node2D")]
impl Mover {
    #[native_virtual]
    fn _process(&mut self, delta: f64) {
        self.distance += delta;
    }
}

static ROTATE: MethodBind = MethodBind::new("Node2D", "rotate", &[VariantType::Float], VariantType::Nil);

fn setup() -> (Arc<SandboxEngine>, Bridge) {
    let engine = Arc::new(SandboxEngine::with_core_classes());
    let bridge = Bridge::new(Arc::clone(&engine));
    (engine, bridge)
}

fn bench_native_calls(c: &mut Criterion) {
    setup_profiler();
    let (engine, bridge) = setup();
    let node = bridge.construct("Node2D").unwrap();
    let raw = node.raw().unwrap();
    let rotate = MethodSignature::new(&[VariantType::Float], VariantType::Nil).fingerprint();
    let args = [Variant::Float(0.01)];

    let mut group = c.benchmark_group("native_call");
    group.bench_function("bridge_call_cached", |b| {
        b.iter(|| {
            bridge
                .call("Node2D", "rotate", black_box(rotate), Some(raw), black_box(&args))
                .unwrap();
            end_profiling_frame();
        })
    });
    group.bench_function("method_bind", |b| {
        b.iter(|| {
            ROTATE.call(&bridge, Some(&node), black_box(&args)).unwrap();
        })
    });
    group.bench_function("first_resolution", |b| {
        b.iter_batched(
            BindingCache::new,
            |cache| {
                cache
                    .resolve(&*engine, "Node2D", "rotate", black_box(rotate))
                    .unwrap()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_virtual_dispatch(c: &mut Criterion) {
    let (engine, bridge) = setup();
    let mover = bridge.construct_script(Mover::default()).unwrap();
    let raw = mover.wrapper().raw().unwrap();
    let plain = bridge.construct("Node2D").unwrap().raw().unwrap();
    let probe = bridge.virtual_slot("Node2D", "_process").unwrap();
    let delta = [Variant::Float(0.016)];

    let mut group = c.benchmark_group("virtual");
    group.bench_function("has_override_by_name", |b| {
        b.iter(|| bridge.has_override(black_box(raw), black_box("_process")).unwrap())
    });
    group.bench_function("has_override_slot", |b| {
        b.iter(|| bridge.has_override_slot(black_box(raw), &probe).unwrap())
    });
    group.bench_function("has_override_slot_plain", |b| {
        b.iter(|| bridge.has_override_slot(black_box(plain), &probe).unwrap())
    });
    group.bench_function("invoke_override", |b| {
        b.iter(|| bridge.invoke_virtual(raw, "_process", black_box(&delta)))
    });
    group.bench_function("engine_round_trip", |b| {
        b.iter(|| engine.run_virtual(raw.id, "_process", black_box(&delta)).unwrap())
    });
    group.finish();
}

fn bench_signals(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_emit");
    for handlers in [1usize, 8, 64] {
        let (_engine, bridge) = setup();
        let node = bridge.construct("Node").unwrap();
        let id = node.id().unwrap();
        let hits = Arc::new(AtomicU64::new(0));
        for _ in 0..handlers {
            let sink = Arc::clone(&hits);
            let callback = Callback::new(move || {
                sink.fetch_add(1, Ordering::Relaxed);
            });
            bridge.connect(id, "renamed", callback, ConnectFlags::empty()).unwrap();
        }

        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(BenchmarkId::from_parameter(handlers), &handlers, |b, _| {
            b.iter(|| bridge.emit_signal(id, "renamed", &[]).unwrap())
        });
    }
    group.finish();
}

fn bench_marshaling(c: &mut Criterion) {
    let values: Vec<i64> = (0..256).collect();
    let boxed = values.to_variant();

    let mut group = c.benchmark_group("marshal");
    group.throughput(Throughput::Elements(values.len() as u64));
    group.bench_function("box_int_array", |b| b.iter(|| black_box(&values).to_variant()));
    group.bench_function("unbox_int_array", |b| {
        b.iter(|| Vec::<i64>::from_variant(black_box(&boxed)).unwrap())
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_native_calls,
    bench_virtual_dispatch,
    bench_signals,
    bench_marshaling
);
criterion_main!(benches);
