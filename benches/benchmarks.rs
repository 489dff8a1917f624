use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tincan_bind::runtime::create_root;
use tincan_bind::{bind, bind_select_with, Store, Tracked};

#[derive(Clone, Serialize, Deserialize)]
struct Todo {
    id: usize,
    title: String,
    done: bool,
}

#[derive(Clone, Serialize, Deserialize)]
struct State {
    counter: usize,
    todos: Vec<Todo>,
}

fn todos(count: usize) -> Vec<Todo> {
    (0..count)
        .map(|id| Todo {
            id,
            title: format!("todo {id}"),
            done: false,
        })
        .collect()
}

fn tracked_creation_benchmark(c: &mut Criterion) {
    let items = todos(100);
    c.bench_function("tracked_creation", |b| {
        b.iter(|| Tracked::new(black_box(&items)).unwrap());
    });
}

fn reconcile_unchanged_benchmark(c: &mut Criterion) {
    let tracked = Tracked::new(&json!({"a": {"x": 1}, "b": [1, 2, 3]})).unwrap();
    let next = json!({"a": {"x": 1}, "b": [1, 2, 3]});

    c.bench_function("reconcile_unchanged", |b| {
        b.iter(|| tracked.reconcile_value(black_box(next.clone())));
    });
}

fn reconcile_keyed_list_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile_keyed_list");

    for count in [10, 100, 1000].iter() {
        let tracked = Tracked::new(&todos(*count)).unwrap();
        let mut reversed = todos(*count);
        reversed.reverse();
        let forward = todos(*count);

        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, _| {
            let mut flip = false;
            b.iter(|| {
                let next = if flip { &forward } else { &reversed };
                tracked.reconcile(black_box(next)).unwrap();
                flip = !flip;
            });
        });
    }
    group.finish();
}

fn store_update_benchmark(c: &mut Criterion) {
    let store = Store::new(State {
        counter: 0,
        todos: todos(10),
    });

    c.bench_function("store_update", |b| {
        let mut i = 0;
        b.iter(|| {
            store.update(|state| {
                state.counter = black_box(i);
            });
            i += 1;
        });
    });
}

fn bound_store_update_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("bound_store_update");

    for binding_count in [1, 10, 100].iter() {
        let store = Store::new(State {
            counter: 0,
            todos: todos(10),
        });

        let scope = create_root(|scope| {
            for _ in 0..*binding_count {
                let _ = bind_select_with(&store, |s: &State| s.counter, |a, b| a == b).unwrap();
            }
            scope
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(binding_count),
            binding_count,
            |b, _| {
                let mut i = 0;
                b.iter(|| {
                    store.update(|state| state.counter = black_box(i));
                    i += 1;
                });
            },
        );
        scope.dispose();
    }
    group.finish();
}

fn whole_state_binding_benchmark(c: &mut Criterion) {
    let store = Store::new(State {
        counter: 0,
        todos: todos(100),
    });
    let scope = create_root(|scope| {
        let _ = bind(&store).unwrap();
        scope
    });

    c.bench_function("whole_state_binding", |b| {
        let mut i = 0;
        b.iter(|| {
            store.replace(Arc::new(State {
                counter: black_box(i),
                todos: todos(100),
            }));
            i += 1;
        });
    });
    scope.dispose();
}

criterion_group!(
    benches,
    tracked_creation_benchmark,
    reconcile_unchanged_benchmark,
    reconcile_keyed_list_benchmark,
    store_update_benchmark,
    bound_store_update_benchmark,
    whole_state_binding_benchmark,
);
criterion_main!(benches);
