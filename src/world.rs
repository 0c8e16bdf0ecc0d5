//! The simulation: snakes and apples on a toroidal grid, advanced one tick at a time and
//! evolved from one round to the next.

use crate::{
    collision::{resolve, Event},
    config::SimConfig,
    constants::{SNAKEPIT_PURGE_PROB, SNAKEPIT_ROUND_GENERATION_STEP, SNAKEPIT_ROUND_SCORED_BONUS},
    error::Result,
    generation::GenerationTracker,
    grid::{replenish_apples, Cell, Direction, Grid},
    learn::now_millis,
    network::Brain,
    persist::{PersistRequest, SavedModel, TrainingSample},
    policy::{decide, Surroundings},
    random::{happens, WyRng},
    reproduce::{combine, reproduce, respawn_brain},
    snake::{DebugInfo, DecisionMetrics, LifeState, Snake},
};
use fxhash::FxHashSet;
use log::{debug, info};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SnakeView {
    pub id: usize,
    pub color: &'static str,
    pub body: Vec<Cell>,
    pub direction: Direction,
    pub alive: bool,
    pub state: LifeState,
    pub score: u32,
    pub generation: Option<u64>,
    pub metrics: DecisionMetrics,
    pub debug: Option<DebugInfo>,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub round: u64,
    pub tick: u64,
    pub generation: u64,
    pub snakes: Vec<SnakeView>,
    pub apples: Vec<Cell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoundSummary {
    pub round: u64,
    pub scores: Vec<u32>,
    /// Snake with the highest score, lowest id on ties
    pub winner: usize,
    /// Tracker generation once the round was wrapped up
    pub generation: u64,
    pub purged: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub events: Vec<Event>,
    pub round_end: Option<RoundSummary>,
}

pub struct Simulation {
    config: SimConfig,
    grid: Grid,
    rng: WyRng,
    tracker: GenerationTracker,
    snakes: Vec<Snake>,
    apples: FxHashSet<Cell>,
    /// Ticks into the current round
    tick: u64,
    total_ticks: u64,
    round: u64,
    /// Stored models to fall back on when the caches are empty
    library: Vec<Brain>,
    outbox: Vec<PersistRequest>,
}

impl Simulation {
    pub fn new(config: SimConfig, rng: WyRng) -> Result<Self> {
        Self::with_models(config, None, vec![], rng)
    }

    /// A simulation whose tracker starts from stored models: `best` seeds the best model
    /// cache and the combination of `library` seeds the combined model cache
    pub fn with_models(
        config: SimConfig,
        best: Option<Brain>,
        library: Vec<Brain>,
        mut rng: WyRng,
    ) -> Result<Self> {
        config.validate()?;
        let grid = Grid::new(config.width, config.height);

        let mut tracker = GenerationTracker::new();
        if let Some(best) = best.filter(Brain::is_valid) {
            info!("seeding best model at generation {}", best.generation());
            tracker.set_best_model(best);
        }
        let library = library.into_iter().filter(Brain::is_valid).collect::<Vec<_>>();
        if let Some(combined) = combine(&library.iter().collect::<Vec<_>>(), &tracker, &mut rng) {
            info!("seeding combined model from {} stored models", library.len());
            tracker.set_combined_model(combined);
        }

        let mut sim = Self {
            config,
            grid,
            rng,
            tracker,
            snakes: Vec::new(),
            apples: FxHashSet::default(),
            tick: 0,
            total_ticks: 0,
            round: 0,
            library,
            outbox: Vec::new(),
        };
        for id in 0..sim.config.snakes {
            let brain = respawn_brain(&mut sim.tracker, &sim.library, &mut sim.rng);
            sim.snakes.push(Snake::spawn(id, &sim.grid, Some(brain)));
            sim.request_save(id);
        }
        sim.replenish();
        Ok(sim)
    }

    #[inline]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[inline]
    pub fn tracker(&self) -> &GenerationTracker {
        &self.tracker
    }

    #[inline]
    pub fn tick(&self) -> u64 {
        self.tick
    }

    #[inline]
    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn snakes(&self) -> &[Snake] {
        &self.snakes
    }

    /// For staging situations from outside; bodies are checked again on the next tick
    pub fn snakes_mut(&mut self) -> &mut [Snake] {
        &mut self.snakes
    }

    pub fn apples(&self) -> &FxHashSet<Cell> {
        &self.apples
    }

    pub fn apples_mut(&mut self) -> &mut FxHashSet<Cell> {
        &mut self.apples
    }

    /// Simulated time in milliseconds, which is what experiences are stamped and aged with
    pub fn clock(&self) -> u64 {
        self.total_ticks * self.config.tick_interval_ms
    }

    fn living_cells(&self) -> FxHashSet<Cell> {
        self.snakes
            .iter()
            .filter(|s| s.is_alive())
            .flat_map(|s| s.body.iter().copied())
            .collect()
    }

    fn replenish(&mut self) {
        // provisional bodies of respawning snakes are kept clear too
        let taken = self
            .snakes
            .iter()
            .flat_map(|s| s.body.iter().copied())
            .collect::<FxHashSet<_>>();
        replenish_apples(
            &self.grid,
            &mut self.apples,
            &taken,
            self.config.min_apples,
            &mut self.rng,
        );
    }

    fn request_save(&mut self, id: usize) {
        let snake = &self.snakes[id];
        if let Some(brain) = &snake.brain {
            self.outbox.push(PersistRequest::Model {
                snake: Some(id),
                lineage: snake.lineage,
                record: brain.to_record(Some(id)),
            });
        }
    }

    fn request_sample(&mut self, id: usize, success: bool) {
        let snake = &self.snakes[id];
        let Some(model_id) = snake.brain.as_ref().and_then(|b| b.id.clone()) else {
            return;
        };
        if snake.last_inputs.is_empty() {
            return;
        }
        self.outbox.push(PersistRequest::Sample(TrainingSample {
            model_id,
            inputs: snake.last_inputs.clone(),
            outputs: snake.last_outputs.clone(),
            success,
            timestamp: now_millis(),
        }));
    }

    /// Everything waiting to be stored since the last call
    pub fn drain_requests(&mut self) -> Vec<PersistRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Put a storage id on the brain it was assigned to, unless that brain has been
    /// replaced in the meantime
    pub fn apply_saved(&mut self, saved: SavedModel) -> bool {
        let Some(snake) = saved.snake.and_then(|i| self.snakes.get_mut(i)) else {
            return false;
        };
        if snake.lineage != saved.lineage {
            debug!("snake {} moved on from the brain saved as {}", snake.id, saved.id);
            return false;
        }
        match snake.brain.as_mut() {
            Some(brain) => {
                brain.id = Some(saved.id);
                true
            }
            None => false,
        }
    }

    /// Advance the world by one tick
    pub fn step(&mut self) -> TickReport {
        self.tick += 1;
        self.total_ticks += 1;
        self.revive_ready();

        for snake in self.snakes.iter_mut().filter(|s| s.is_alive()) {
            snake.ensure_body(&self.grid);
        }
        let occupied = self.living_cells();
        let now = self.clock();
        let env = Surroundings {
            grid: &self.grid,
            apples: &self.apples,
            occupied: &occupied,
            now,
        };
        let mut moves = vec![None; self.snakes.len()];
        for (snake, mv) in self.snakes.iter_mut().zip(moves.iter_mut()) {
            if snake.is_alive() {
                *mv = Some(decide(snake, &env, &mut self.rng));
            }
        }
        for (snake, mv) in self.snakes.iter_mut().zip(moves) {
            if let Some(direction) = mv {
                snake.advance(&self.grid, direction);
            }
        }

        let resolution = resolve(&mut self.snakes, &mut self.apples, now, &mut self.rng);
        for event in resolution.events.iter() {
            match event {
                Event::Ate { snake, .. } => self.request_sample(*snake, true),
                Event::SelfCollision { snake } => self.request_sample(*snake, false),
                Event::HeadToHead { snakes } => {
                    for snake in snakes {
                        self.request_sample(*snake, false);
                    }
                }
                Event::HeadToBody { victim, .. } => self.request_sample(*victim, false),
                Event::Kill { .. } => {}
            }
        }

        let occupied = self.living_cells();
        for cell in resolution.explosion {
            if !occupied.contains(&cell) {
                self.apples.insert(cell);
            }
        }
        self.schedule_respawns(&resolution.dead);
        self.replenish();

        let round_end = (self.tick >= self.config.round_ticks).then(|| self.end_round());
        TickReport {
            tick: self.total_ticks,
            events: resolution.events,
            round_end,
        }
    }

    fn schedule_respawns(&mut self, dead: &[usize]) {
        if dead.is_empty() {
            return;
        }
        if self.snakes.iter().all(|s| !s.is_alive()) {
            let generation = self
                .tracker
                .force_generation_update(self.tracker.current_generation());
            info!("every snake died, generation forced to {generation}");
        }
        let ready_at = self.total_ticks + self.config.respawn_delay_ticks();
        for id in dead.iter().copied() {
            self.snakes[id].schedule_respawn(&self.grid, ready_at);
            debug!("snake {id} respawns at tick {ready_at}");
        }
    }

    fn revive_ready(&mut self) {
        for id in 0..self.snakes.len() {
            let LifeState::Respawning { ready_at } = self.snakes[id].state() else {
                continue;
            };
            if self.total_ticks < ready_at {
                continue;
            }
            let occupied = self.living_cells();
            if self.snakes[id].body.iter().any(|c| occupied.contains(c)) {
                debug!("spawn point of snake {id} is taken, waiting");
                continue;
            }

            let brain = respawn_brain(&mut self.tracker, &self.library, &mut self.rng);
            debug!("snake {id} is back at generation {}", brain.generation());
            self.snakes[id].revive(&self.grid, Some(brain));
            for cell in self.snakes[id].body.iter() {
                self.apples.remove(cell);
            }
            self.request_save(id);
        }
    }

    fn end_round(&mut self) -> RoundSummary {
        self.round += 1;
        let scores = self.snakes.iter().map(|s| s.score).collect::<Vec<_>>();
        let winner = scores
            .iter()
            .enumerate()
            .max_by(|(li, l), (ri, r)| l.cmp(r).then(ri.cmp(li)))
            .map_or(0, |(i, _)| i);

        let mut parents = Vec::with_capacity(self.snakes.len());
        let mut owners = Vec::with_capacity(self.snakes.len());
        for snake in self.snakes.iter_mut() {
            if let Some(brain) = snake.brain.as_mut() {
                brain.record_score(snake.score as f64);
                brain.games_played += 1;
                parents.push(brain.clone());
                owners.push(snake.id);
            }
        }
        let children = reproduce(
            &parents,
            &mut self.tracker,
            self.config.mutation_rate,
            &mut self.rng,
        );

        self.tracker.record_game();
        let scored = scores.iter().any(|s| *s >= 1);
        let generation = self.tracker.force_generation_update(
            self.tracker.current_generation()
                + SNAKEPIT_ROUND_GENERATION_STEP
                + if scored { SNAKEPIT_ROUND_SCORED_BONUS } else { 0 },
        );
        let purged = self.tracker.games_since_purge() >= self.config.purge_interval
            && happens(&mut self.rng, SNAKEPIT_PURGE_PROB);
        if purged {
            self.tracker.purge_all_model_caches();
        }

        for id in owners.iter().copied() {
            if let Some(brain) = self.snakes[id].brain.as_mut() {
                let next = brain.generation() + 1;
                brain.raise_generation(next);
            }
            self.request_save(id);
        }

        // children come ranked like reproduce ranks the parents
        let mut ranked = (0..parents.len()).collect::<Vec<_>>();
        ranked.sort_by(|l, r| parents[*r].score.total_cmp(&parents[*l].score));
        let mut next = vec![None; self.snakes.len()];
        for (child, rank) in children.into_iter().zip(ranked) {
            next[owners[rank]] = Some(child);
        }
        for id in 0..self.snakes.len() {
            let brain = match next[id].take() {
                Some(brain) => brain,
                None => respawn_brain(&mut self.tracker, &self.library, &mut self.rng),
            };
            self.snakes[id].restart(&self.grid, Some(brain));
            self.request_save(id);
        }
        self.apples.clear();
        self.replenish();
        self.tick = 0;

        info!(
            "round {} over: scores {scores:?}, snake {winner} won, generation {generation}{}",
            self.round,
            if purged { ", caches purged" } else { "" }
        );
        RoundSummary {
            round: self.round,
            scores,
            winner,
            generation: self.tracker.current_generation(),
            purged,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut apples = self.apples.iter().copied().collect::<Vec<_>>();
        apples.sort_by_key(|c| (c.y, c.x));
        Snapshot {
            round: self.round,
            tick: self.tick,
            generation: self.tracker.current_generation(),
            snakes: self
                .snakes
                .iter()
                .map(|s| SnakeView {
                    id: s.id,
                    color: s.color,
                    body: s.body.iter().copied().collect(),
                    direction: s.direction,
                    alive: s.is_alive(),
                    state: s.state(),
                    score: s.score,
                    generation: s.generation(),
                    metrics: s.metrics,
                    debug: s.debug,
                })
                .collect(),
            apples,
        }
    }
}
