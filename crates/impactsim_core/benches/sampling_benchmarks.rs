//! Criterion benchmarks for impactsim_core sampling
//!
//! Run with: cargo bench -p impactsim_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use impactsim_core::model::{Mark, ProcessId, ProviderCandidate};
use impactsim_core::{Distribution, ValueMode, select_provider};
use rand::SeedableRng;
use rand::rngs::StdRng;

const DISTRIBUTIONS: [&str; 5] = [
    "uniform; min=0.8; max=0.95; base=0.9",
    "triangular; min=0.5; mode=0.7; max=1.2; base=0.7",
    "normal; mean=12.0; sd=1.5; base=12.0",
    "lognormal; mu=0.1; sigma=0.3; base=1.1",
    "list; 0.25,0.5,0.75,1.0; base=0.5",
];

fn create_sheet(n: usize) -> Vec<ProviderCandidate> {
    (0..n)
        .map(|i| ProviderCandidate {
            sheet: "steel".to_string(),
            process_id: Some(ProcessId::new(format!("p-{i}"))),
            name: format!("steel mill {i}"),
            location: None,
            amount: Some(1_000.0 + (i * 37 % 500) as f64),
            mark: (i == 0).then_some(Mark::Base),
            region: Some(if i % 3 == 0 { "US" } else { "CA" }.to_string()),
            skip: i % 10 == 9,
        })
        .collect()
}

fn bench_parse_distributions(c: &mut Criterion) {
    c.bench_function("parse_distributions", |b| {
        b.iter(|| {
            for spec in DISTRIBUTIONS {
                let _ = black_box(spec).parse::<Distribution>();
            }
        })
    });
}

fn bench_sample_distributions(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    let mut rng = StdRng::seed_from_u64(42);

    for spec in DISTRIBUTIONS {
        let Ok(dist) = spec.parse::<Distribution>() else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(dist.kind()), &dist, |b, dist| {
            b.iter(|| dist.resolve(black_box(ValueMode::Sample), &mut rng))
        });
    }

    group.finish();
}

fn bench_select_provider(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_provider");
    let mut rng = StdRng::seed_from_u64(42);
    let regions = vec!["US".to_string()];

    for size in [10, 100, 1_000] {
        let sheet = create_sheet(size);
        group.bench_with_input(BenchmarkId::new("all_regions", size), &sheet, |b, sheet| {
            b.iter(|| select_provider("steel", black_box(sheet), None, &mut rng))
        });
        group.bench_with_input(BenchmarkId::new("us_only", size), &sheet, |b, sheet| {
            b.iter(|| {
                select_provider(
                    "steel",
                    black_box(sheet),
                    Some(regions.as_slice()),
                    &mut rng,
                )
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_parse_distributions,
    bench_sample_distributions,
    bench_select_provider
);
criterion_main!(benches);
