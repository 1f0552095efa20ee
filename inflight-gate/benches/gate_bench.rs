use std::ops::ControlFlow;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;
use inflight_gate::Gate;
use inflight_gate::PendingSet;
use inflight_gate::should_suppress;

fn bench_gate(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate");

    for (name, policy) in [
        ("concurrent", ActionPolicy::concurrent()),
        ("exclusive", ActionPolicy::exclusive()),
    ] {
        for pending in [0usize, 1, 16] {
            let entries: Vec<u64> = (0..pending as u64).collect();
            group.bench_with_input(
                BenchmarkId::new(name, pending),
                &entries,
                |b, entries| {
                    b.iter(|| should_suppress(black_box(&policy), black_box(entries.as_slice())))
                },
            );
        }
    }

    group.bench_function("process", |b| {
        let policy = ActionPolicy::exclusive();
        b.iter(|| matches!(black_box(&policy).process(black_box(1)), ControlFlow::Break(_)))
    });

    group.finish();
}

fn bench_pending_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_set");
    let key = ActionKey::from("query");

    for size in [1usize, 8, 64] {
        group.bench_with_input(BenchmarkId::new("push_remove", size), &size, |b, &n| {
            b.iter(|| {
                let mut set = PendingSet::new();
                for id in 0..n {
                    set.push((key.clone(), id));
                }
                // Settle from the middle out, like independent completions.
                for id in (0..n).rev().step_by(2).chain((0..n).step_by(2)) {
                    black_box(set.remove_where(|(_, entry)| *entry == id));
                }
                set
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gate, bench_pending_set);
criterion_main!(benches);
