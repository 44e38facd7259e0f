use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lattice_reactive::{batch, computed, effect, reactive, Computed, Obj, Ref};

fn bench_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Propagation");

    // One source, a chain of 100 computeds, one effect at the end
    group.bench_function("computed chain (100)", |b| {
        let source = Ref::new(0i64);
        let mut last: Computed<i64> = computed({
            let source = source.clone();
            move || source.get()
        });
        for _ in 0..100 {
            let prev = last.clone();
            last = computed(move || prev.get() + 1);
        }
        let _e = effect({
            let last = last.clone();
            move || {
                black_box(last.get());
            }
        });

        let mut n = 0;
        b.iter(|| {
            n += 1;
            source.set(n);
        });
    });

    // One source read by 1,000 effects
    group.bench_function("fan-out (1000 effects)", |b| {
        let source = Ref::new(0i64);
        let effects: Vec<_> = (0..1_000)
            .map(|_| {
                let source = source.clone();
                effect(move || {
                    black_box(source.get());
                })
            })
            .collect();

        let mut n = 0;
        b.iter(|| {
            n += 1;
            source.set(n);
        });
        drop(effects);
    });

    // Unchanged computed result: readers must not re-run
    group.bench_function("diamond with equal result", |b| {
        let source = Ref::new(0i64);
        let parity = computed({
            let source = source.clone();
            move || source.get() % 2
        });
        let _e = effect({
            let parity = parity.clone();
            move || {
                black_box(parity.get());
            }
        });

        let mut n = 0;
        b.iter(|| {
            n += 2;
            source.set(n);
        });
    });

    // Batched writes to 100 properties of a reactive object
    group.bench_function("reactive object batch (100 keys)", |b| {
        let state = reactive(&Obj::object());
        let keys: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();
        let _e = effect({
            let (state, keys) = (state.clone(), keys.clone());
            move || {
                for key in &keys {
                    black_box(state.get(key));
                }
            }
        });

        let mut n = 0;
        b.iter(|| {
            n += 1;
            batch(|| {
                for key in &keys {
                    let _ = state.set(key, n);
                }
            });
        });
    });

    group.finish();
}

criterion_group!(benches, bench_propagation);
criterion_main!(benches);
