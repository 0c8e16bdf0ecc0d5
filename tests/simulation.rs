use fxhash::FxHashSet;
use snakepit::{
    collision::Event,
    persist::{brains_from_records, JsonDirStore, ModelStore, Persister},
    Brain, Cell, Direction, SimConfig, Simulation, WyRng,
};
use std::fs;

fn config() -> SimConfig {
    SimConfig {
        width: 20,
        height: 20,
        round_ticks: 30,
        respawn_delay_ms: 200,
        ..SimConfig::default()
    }
}

#[test]
fn test_snake_eats_apple_ahead() {
    let config = SimConfig {
        snakes: 1,
        ..config()
    };
    let mut sim = Simulation::new(config, WyRng::seeded(31)).unwrap();
    let grid = *sim.grid();
    let head = sim.snakes()[0].head();
    assert_eq!(sim.snakes()[0].direction, Direction::Right);
    let apple = grid.step(head, Direction::Right, 1);
    sim.apples_mut().clear();
    sim.apples_mut().insert(apple);

    let report = sim.step();
    let snake = &sim.snakes()[0];
    assert_eq!(snake.head(), apple);
    assert_eq!(snake.score, 1);
    assert_eq!(snake.len(), 4);
    assert_eq!(snake.moves_without_eating, 0);
    assert_eq!(snake.metrics.apples_eaten, 1);
    assert!(report.events.contains(&Event::Ate {
        snake: 0,
        cell: apple
    }));
    assert!(!sim.apples().contains(&apple));
    assert!(sim.apples().len() >= sim.config().min_apples);
}

#[test]
fn test_world_invariants_hold_over_rounds() {
    let mut sim = Simulation::new(config(), WyRng::seeded(32)).unwrap();
    let mut rounds = 0;
    let mut generation = sim.tracker().current_generation();
    while rounds < 3 {
        let report = sim.step();
        let grid = *sim.grid();
        let living = sim
            .snakes()
            .iter()
            .filter(|s| s.is_alive())
            .flat_map(|s| s.body.iter().copied())
            .collect::<FxHashSet<Cell>>();
        assert!(sim.apples().len() >= sim.config().min_apples);
        assert!(sim.apples().iter().all(|a| grid.contains(*a)));
        assert!(sim.apples().iter().all(|a| !living.contains(a)));
        for snake in sim.snakes().iter().filter(|s| s.is_alive()) {
            assert!(snake.body_is_valid(&grid));
        }
        assert!(sim.tracker().current_generation() >= generation);
        generation = sim.tracker().current_generation();

        if let Some(summary) = report.round_end {
            rounds += 1;
            assert_eq!(summary.round, rounds);
            assert_eq!(sim.tick(), 0);
            assert!(sim.snakes().iter().all(|s| s.is_alive() && s.score == 0));
        }
    }
    assert!(generation >= 1 + 3 * 5);
}

#[tokio::test]
async fn test_models_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut persister = Persister::spawn(JsonDirStore::open(dir.path()).unwrap(), 4096);
    let mut sim = Simulation::new(config(), WyRng::seeded(33)).unwrap();

    let mut rounds = 0;
    while rounds < 2 {
        let report = sim.step();
        for request in sim.drain_requests() {
            persister.submit(request);
        }
        for saved in persister.saved() {
            sim.apply_saved(saved);
        }
        if report.round_end.is_some() {
            rounds += 1;
        }
    }
    for request in sim.drain_requests() {
        persister.submit(request);
    }
    persister.shutdown().await;

    let mut store = JsonDirStore::open(dir.path()).unwrap();
    let records = store.load_all_models().unwrap();
    assert!(records.len() >= 4);
    assert_eq!(
        fs::read_dir(dir.path().join("models")).unwrap().count(),
        records.len()
    );
    let best = store.load_best_model().unwrap().unwrap();
    assert!(records.iter().all(|r| r.score <= best.score));

    let library = brains_from_records(&records);
    assert_eq!(library.len(), records.len());
    let floor = library.iter().map(Brain::generation).max().unwrap();
    let best = Brain::from_record(&best).unwrap();
    let restarted =
        Simulation::with_models(config(), Some(best), library, WyRng::seeded(34)).unwrap();
    assert!(restarted
        .snakes()
        .iter()
        .all(|s| s.generation().unwrap() > floor));
}
