use criterion::Criterion;
use snakepit::{learn::Feedback, random::WyRng, Brain};

fn bench_learn(bench: &mut Criterion) {
    let mut rng = WyRng::seeded(0x5eed);
    let mut brain = Brain::random(40, &mut rng);
    let inputs = vec![0.4, -0.2, 0., 1., 0.8, 0., 1., 0.];
    let outputs = vec![0.7, 0.2, 0.1, 0.6];
    let mut now = 0;

    bench.bench_function("learn-success", |b| {
        b.iter(|| {
            now += 100;
            brain.learn_at(
                Feedback {
                    success: true,
                    inputs: &inputs,
                    outputs: &outputs,
                    reward: 3.,
                },
                now,
                &mut rng,
            )
        })
    });

    bench.bench_function("learn-replay", |b| b.iter(|| brain.replay(now, &mut rng)));
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
    bench_learn(&mut criterion);
}

fn main() {
    benches();
    criterion::Criterion::default()
        .configure_from_args()
        .final_summary();
}
