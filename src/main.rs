use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use snakepit::{
    config::SimConfig,
    persist::{brains_from_records, FallbackStore, JsonDirStore, MemoryStore, ModelStore, Persister},
    random::{seed, WyRng},
    world::{Simulation, TickReport},
    Brain,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

#[derive(Parser)]
#[command(name = "snakepit", about = "Evolve snakes on a toroidal grid")]
struct Args {
    /// JSON config file, defaults apply to anything it leaves out
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Stop after this many rounds, run until interrupted otherwise
    #[arg(long, short)]
    rounds: Option<u64>,

    /// Seed for the simulation rng
    #[arg(long)]
    seed: Option<u64>,

    /// Directory of the local model store
    #[arg(long)]
    store_dir: Option<PathBuf>,

    #[arg(long)]
    snakes: Option<usize>,

    #[arg(long)]
    tick_interval_ms: Option<u64>,

    /// Log a JSON snapshot every N ticks (0 = never)
    #[arg(long, default_value = "0")]
    snapshot_every: u64,
}

impl Args {
    fn config(&self) -> Result<SimConfig> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_file(path)
                .with_context(|| format!("can't load config {}", path.display()))?,
            None => SimConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(dir) = &self.store_dir {
            config.store_dir = Some(dir.clone());
        }
        if let Some(snakes) = self.snakes {
            config.snakes = snakes;
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        config.validate()?;
        Ok(config)
    }
}

fn open_store(config: &SimConfig) -> Box<dyn ModelStore> {
    let Some(dir) = &config.store_dir else {
        return Box::new(MemoryStore::new());
    };
    match JsonDirStore::open(dir) {
        Ok(store) => Box::new(FallbackStore::new(store, MemoryStore::new())),
        Err(err) => {
            warn!("can't open model store {}, keeping models in memory: {err}", dir.display());
            Box::new(MemoryStore::new())
        }
    }
}

fn load_models(store: &mut dyn ModelStore) -> (Option<Brain>, Vec<Brain>) {
    let best = match store.load_best_model() {
        Ok(record) => record.and_then(|r| {
            Brain::from_record(&r)
                .map_err(|err| warn!("stored best model unusable: {err}"))
                .ok()
        }),
        Err(err) => {
            warn!("can't load best model: {err}");
            None
        }
    };
    let library = match store.load_all_models() {
        Ok(records) => brains_from_records(&records),
        Err(err) => {
            warn!("can't load stored models: {err}");
            vec![]
        }
    };
    info!(
        "loaded {} stored models{}",
        library.len(),
        if best.is_some() { " and a best model" } else { "" }
    );
    (best, library)
}

/// Hand queued storage work to the persister and stored ids back to the simulation
fn exchange(sim: &Mutex<Simulation>, persister: &mut Persister) -> Result<()> {
    let mut sim = sim.lock().map_err(|_| anyhow!("simulation lock poisoned"))?;
    for request in sim.drain_requests() {
        persister.submit(request);
    }
    for saved in persister.saved() {
        sim.apply_saved(saved);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = args.config()?;

    let mut store = open_store(&config);
    let (best, library) = load_models(store.as_mut());
    let mut persister = Persister::spawn(store, config.persist_queue);

    let rng = WyRng::seeded(config.seed.unwrap_or_else(seed));
    let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
    let snapshot_every = args.snapshot_every;
    let sim = Arc::new(Mutex::new(Simulation::with_models(config, best, library, rng)?));

    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<JoinHandle<Result<TickReport>>> = None;
    let mut rounds = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }

        if in_flight.as_ref().is_some_and(|tick| !tick.is_finished()) {
            debug!("previous tick still running, skipping");
            continue;
        }
        if let Some(tick) = in_flight.take() {
            let report = tick.await.context("tick panicked")??;
            exchange(&sim, &mut persister)?;
            if report.tick % snapshot_every.max(1) == 0 && snapshot_every > 0 {
                let sim = sim.lock().map_err(|_| anyhow!("simulation lock poisoned"))?;
                info!("{}", serde_json::to_string(&sim.snapshot())?);
            }
            if report.round_end.is_some() {
                rounds += 1;
                if args.rounds.is_some_and(|limit| rounds >= limit) {
                    break;
                }
            }
        }

        let sim = Arc::clone(&sim);
        in_flight = Some(tokio::task::spawn_blocking(move || {
            let mut sim = sim.lock().map_err(|_| anyhow!("simulation lock poisoned"))?;
            Ok(sim.step())
        }));
    }

    if let Some(tick) = in_flight.take() {
        tick.await.context("tick panicked")??;
    }
    exchange(&sim, &mut persister)?;
    let saved = persister.shutdown().await;
    info!("stored {} models before exiting", saved.len());
    Ok(())
}
