//! Benchmarks for calls crossing the native boundary.
//!
//! Covers method dispatch (arity, instance and argument checks plus
//! conversion), construction through the class table, collection of
//! unreachable instances and scope export.
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- dispatch
//! ```

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use stackglue::prelude::*;
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

/// Call at the end of each benchmark iteration to flush profiling data.
#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

struct Vec2 {
    x: f64,
    y: f64,
}

#[derive(Clone, Copy, Enum)]
enum Axis {
    X,
    Y,
}

fn scope() -> ScopeRegistry {
    let mut scope = ScopeRegistry::builder("bench");
    scope
        .class::<Vec2>("Vec2")
        .constructor(|x: f64, y: f64| Vec2 { x, y })
        .method("len", |this: &Vec2| this.x.hypot(this.y))
        .method("add", |this: &mut Vec2, x: f64, y: f64| {
            this.x += x;
            this.y += y;
        })
        .method("get", |this: &Vec2, axis: Axis| match axis {
            Axis::X => this.x,
            Axis::Y => this.y,
        })
        .method("dot", |this: &Vec2, other: Ptr<Vec2>| {
            other.with(|other| this.x * other.x + this.y * other.y).unwrap_or(0.0)
        })
        .build()
        .unwrap();
    scope
        .enumeration::<Axis>("Axis")
        .value("X", Axis::X)
        .value("Y", Axis::Y)
        .build()
        .unwrap();
    scope.finish().unwrap()
}

fn exported() -> (ScopeRegistry, Vm, Value) {
    let mut registry = scope();
    let mut vm = Vm::new();
    let ns = Value::Table(registry.export(&mut vm).unwrap());
    (registry, vm, ns)
}

fn dispatch_benchmarks(c: &mut Criterion) {
    setup_profiler();
    let (_registry, mut vm, ns) = exported();
    let class = vm.get_field(&ns, "Vec2").unwrap();
    let axes = vm.get_field(&ns, "Axis").unwrap();
    let axis = vm.get_field(&axes, "Y").unwrap();
    let v = vm.call(&class, vec![Value::Number(3.0), Value::Number(4.0)]).unwrap().remove(0);
    let w = vm.call(&class, vec![Value::Number(1.0), Value::Number(2.0)]).unwrap().remove(0);
    vm.set_global("v", v.clone()).unwrap();
    vm.set_global("w", w.clone()).unwrap();

    let mut group = c.benchmark_group("dispatch");

    group.bench_function("no_arguments", |b| {
        b.iter(|| black_box(vm.call_method(&v, "len", vec![]).unwrap()));
    });

    group.bench_function("scalar_arguments", |b| {
        b.iter(|| {
            let args = vec![Value::Number(black_box(0.0)), Value::Number(black_box(0.0))];
            black_box(vm.call_method(&v, "add", args).unwrap())
        });
    });

    group.bench_function("enum_argument", |b| {
        b.iter(|| black_box(vm.call_method(&v, "get", vec![axis.clone()]).unwrap()));
    });

    group.bench_function("instance_argument", |b| {
        b.iter(|| {
            let result = vm.call_method(&v, "dot", vec![w.clone()]).unwrap();
            end_profiling_frame();
            black_box(result)
        });
    });

    group.bench_function("argument_error", |b| {
        b.iter(|| black_box(vm.call_method(&v, "add", vec![Value::Nil]).unwrap_err()));
    });

    group.finish();
}

fn lifetime_benchmarks(c: &mut Criterion) {
    const BATCH: u64 = 100;

    let (_registry, mut vm, ns) = exported();
    let class = vm.get_field(&ns, "Vec2").unwrap();

    let mut group = c.benchmark_group("lifetime");
    group.throughput(Throughput::Elements(BATCH));

    group.bench_function("construct_and_collect", |b| {
        b.iter(|| {
            for i in 0..BATCH {
                let args = vec![Value::Number(i as f64), Value::Number(0.0)];
                black_box(vm.call(&class, args).unwrap());
            }
            black_box(vm.collect_garbage())
        });
    });

    group.finish();
}

fn export_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("export");

    group.bench_function("finish_scope", |b| {
        b.iter(|| black_box(scope()));
    });

    group.bench_function("export_to_fresh_runtime", |b| {
        b.iter_batched(
            || (scope(), Vm::new()),
            |(mut registry, mut vm)| {
                black_box(registry.export(&mut vm).unwrap());
                (registry, vm)
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("reexport", |b| {
        let (mut registry, mut vm, _) = exported();
        b.iter(|| {
            let ns = registry.export(&mut vm).unwrap();
            vm.collect_garbage();
            black_box(ns)
        });
    });

    group.finish();
}

criterion_group!(benches, dispatch_benchmarks, lifetime_benchmarks, export_benchmarks);
criterion_main!(benches);
