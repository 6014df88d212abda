use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hardgas::core::{Gas, GasConfig};

fn next_collision(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_collision");
    for n in [64usize, 343, 1000] {
        let gas = match GasConfig::new(0.05, 1.0)
            .and_then(|config| Gas::generate(n, 20.0, 1.0, config, Some(42)))
        {
            Ok(gas) => gas,
            Err(e) => panic!("bench setup failed: {e}"),
        };
        group.bench_with_input(BenchmarkId::from_parameter(n), &gas, |b, gas| {
            b.iter(|| black_box(gas.next_collision()))
        });
    }
    group.finish();
}

fn step(c: &mut Criterion) {
    let mut gas = match GasConfig::new(0.05, 1.0)
        .and_then(|config| Gas::generate(343, 20.0, 1.0, config, Some(7)))
    {
        Ok(gas) => gas,
        Err(e) => panic!("bench setup failed: {e}"),
    };
    c.bench_function("step_343", |b| b.iter(|| black_box(gas.step())));
}

criterion_group!(benches, next_collision, step);
criterion_main!(benches);
