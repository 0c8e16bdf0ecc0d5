use criterion::Criterion;
use snakepit::{
    random::WyRng,
    reproduce::{combine, reproduce},
    Brain, GenerationTracker,
};

fn bench_combine(bench: &mut Criterion) {
    let mut rng = WyRng::seeded(0x5eed);
    let parents = (0..4)
        .map(|i| {
            let mut brain = Brain::random(10 * i, &mut rng);
            brain.record_score(i as f64);
            brain
        })
        .collect::<Vec<_>>();
    let refs = parents.iter().collect::<Vec<_>>();
    let tracker = GenerationTracker::new();

    bench.bench_function("combine-4", |b| {
        b.iter(|| combine(&refs, &tracker, &mut rng))
    });

    let mut tracker = GenerationTracker::new();
    bench.bench_function("reproduce-4", |b| {
        b.iter(|| reproduce(&parents, &mut tracker, 0.1, &mut rng))
    });
}

pub fn benches() {
    #[cfg(not(feature = "smol_bench"))]
    let mut criterion: criterion::Criterion<_> = Criterion::default()
        .sample_size(1000)
        .significance_level(0.1);
    #[cfg(feature = "smol_bench")]
    let mut criterion: criterion::Criterion<_> = {
        use core::time::Duration;
        Criterion::default()
            .measurement_time(Duration::from_millis(1))
            .sample_size(10)
            .nresamples(1)
            .without_plots()
            .configure_from_args()
    };
    bench_combine(&mut criterion);
}

fn main() {
    benches();
    criterion::Criterion::default()
        .configure_from_args()
        .final_summary();
}
