use criterion::Criterion;
use snakepit::{
    random::WyRng,
    reproduce::{clone_brain, mutate},
    Brain,
};

fn bench_mutate(bench: &mut Criterion) {
    let mut rng = WyRng::seeded(0x5eed);
    let brain = Brain::random(20, &mut rng);

    bench.bench_function("mutate", |b| {
        b.iter(|| mutate(&mut brain.clone(), 0.1, &mut rng))
    });

    bench.bench_function("clone-brain", |b| {
        b.iter(|| clone_brain(&brain, 0.3, &mut rng))
    });
}

pub fn benches() {
    #[cfg(not(feature = "smol_bench"))]
    let mut criterion: criterion::Criterion<_> = Criterion::default()
        .sample_size(2000)
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
    bench_mutate(&mut criterion);
}

fn main() {
    benches();
    criterion::Criterion::default()
        .configure_from_args()
        .final_summary();
}
