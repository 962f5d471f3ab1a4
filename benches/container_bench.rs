//! Benchmarks for the DI container

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use graph_injector::{Container, DecoratorRegistration, Lifespan, Parameter, Registration};
use std::hint::black_box;
use std::sync::Arc;

#[allow(dead_code)]
struct Config {
    value: i32,
}

#[allow(dead_code)]
struct Repository {
    config: Arc<Config>,
}

#[allow(dead_code)]
struct Service {
    repository: Arc<Repository>,
    config: Arc<Config>,
}

trait Greeter: Send + Sync {
    fn greet(&self) -> usize;
}

struct Plain;

impl Greeter for Plain {
    fn greet(&self) -> usize {
        1
    }
}

struct Counted(Arc<dyn Greeter>);

impl Greeter for Counted {
    fn greet(&self) -> usize {
        self.0.greet() + 1
    }
}

fn graph(service_lifespan: Lifespan) -> Container {
    let container = Container::new();
    container
        .register(Registration::value(Config { value: 42 }))
        .unwrap();
    container
        .register(
            Registration::factory(|args| Ok(Arc::new(Repository { config: args.get("config")? })))
                .param(Parameter::service::<Config>("config")),
        )
        .unwrap();
    container
        .register(
            Registration::factory(|args| {
                Ok(Arc::new(Service {
                    repository: args.get("repository")?,
                    config: args.get("config")?,
                }))
            })
            .params([
                Parameter::service::<Repository>("repository"),
                Parameter::service::<Config>("config"),
            ])
            .with_lifespan(service_lifespan),
        )
        .unwrap();
    container
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    group.bench_function("value", |b| {
        b.iter(|| {
            let container = Container::new();
            container.register(Registration::value(Config { value: 42 })).unwrap();
            black_box(container)
        })
    });

    group.bench_function("three_node_graph", |b| b.iter(|| black_box(graph(Lifespan::OncePerGraph))));

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let singleton = graph(Lifespan::Singleton);
    group.bench_function("cached_singleton", |b| {
        b.iter(|| black_box(singleton.resolve::<Service>().unwrap()))
    });

    let per_graph = graph(Lifespan::OncePerGraph);
    group.bench_function("three_node_graph", |b| {
        b.iter(|| black_box(per_graph.resolve::<Service>().unwrap()))
    });

    group.bench_function("not_found", |b| b.iter(|| black_box(per_graph.try_resolve::<String>())));

    let decorated = Container::new();
    decorated
        .register(Registration::instance::<dyn Greeter>(Arc::new(Plain)))
        .unwrap();
    for _ in 0..3 {
        decorated
            .register_decorator(DecoratorRegistration::wrap::<dyn Greeter, _>(|inner| Arc::new(Counted(inner))))
            .unwrap();
    }
    let transient = Container::new();
    transient
        .register(
            Registration::factory(|_| Ok(Arc::new(Config { value: 1 }) as Arc<Config>))
                .with_lifespan(Lifespan::Transient),
        )
        .unwrap();
    group.bench_function("transient", |b| {
        b.iter(|| black_box(transient.resolve::<Config>().unwrap()))
    });
    group.bench_function("decorated_singleton", |b| {
        b.iter(|| black_box(decorated.resolve::<dyn Greeter>().unwrap().greet()))
    });

    group.finish();
}

fn bench_collections(c: &mut Criterion) {
    let mut group = c.benchmark_group("collections");

    let container = Container::new();
    for value in 0..16 {
        container.register(Registration::value(Config { value })).unwrap();
    }
    group.bench_function("resolve_all_16", |b| {
        b.iter(|| black_box(container.resolve_all::<Config>().unwrap()))
    });

    group.finish();
}

fn bench_scoped(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoped");

    let root = graph(Lifespan::Scoped);

    group.bench_function("create_and_close_scope", |b| {
        b.iter(|| {
            let scope = root.new_scope().unwrap();
            scope.close().unwrap();
        })
    });

    group.bench_function("resolve_scoped_in_fresh_scope", |b| {
        b.iter(|| {
            let scope = root.new_scope().unwrap();
            black_box(scope.resolve::<Service>().unwrap());
            scope.close().unwrap();
        })
    });

    let scope = root.new_scope().unwrap();
    scope.resolve::<Service>().unwrap();
    group.bench_function("resolve_cached_scoped", |b| {
        b.iter(|| black_box(scope.resolve::<Service>().unwrap()))
    });

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");

    let container = graph(Lifespan::Singleton);
    group.bench_function("concurrent_reads_4", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let container = container.clone();
                    thread::spawn(move || {
                        for _ in 0..100 {
                            black_box(container.resolve::<Service>().unwrap());
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_registration,
    bench_resolution,
    bench_collections,
    bench_scoped,
    bench_concurrent,
);

criterion_main!(benches);
