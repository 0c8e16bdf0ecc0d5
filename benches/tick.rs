use criterion::Criterion;
use snakepit::{random::WyRng, SimConfig, Simulation};

fn bench_tick(bench: &mut Criterion) {
    let mut sim = Simulation::new(SimConfig::default(), WyRng::seeded(0x5eed)).unwrap();

    bench.bench_function("simulation-step", |b| {
        b.iter(|| {
            let report = sim.step();
            sim.drain_requests();
            report
        })
    });
}

pub fn benches() {
    #[cfg(not(feature = "smol_bench"))]
    let mut criterion: criterion::Criterion<_> = Criterion::default()
        .sample_size(500)
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
    bench_tick(&mut criterion);
}

fn main() {
    benches();
    criterion::Criterion::default()
        .configure_from_args()
        .final_summary();
}
