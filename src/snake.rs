//! A snake: its body on the grid, the brain steering it, and what it has done so far.

use crate::{
    constants::SNAKEPIT_SPAWN_LENGTH,
    grid::{Cell, Direction, Grid},
    learn::Feedback,
    network::Brain,
};
use log::warn;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const COLORS: [&str; 4] = ["#4CAF50", "#2196F3", "#FF9800", "#E91E63"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    pub apples_eaten: u32,
    pub apples_ignored: u32,
    pub bad_directions: u32,
    pub good_directions: u32,
    pub kill_count: u32,
    pub suicides: u32,
}

/// Which rule of the movement policy picked the last direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    EatApple,
    Confident,
    Cautious,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub reason: Decision,
    pub confidence: f64,
    pub nearest_apple: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifeState {
    Alive,
    /// Died this tick, not yet scheduled for respawn
    Dead,
    /// Sitting on a provisional body at its spawn point until `ready_at`
    Respawning { ready_at: u64 },
}

#[derive(Debug, Clone)]
pub struct Snake {
    pub id: usize,
    /// Head first
    pub body: VecDeque<Cell>,
    pub direction: Direction,
    pub color: &'static str,
    pub score: u32,
    /// `None` when no usable brain could be had; the policy falls back to its heuristics
    pub brain: Option<Brain>,
    pub moves_without_eating: u32,
    pub metrics: DecisionMetrics,
    pub last_inputs: Vec<f64>,
    pub last_outputs: Vec<f64>,
    pub debug: Option<DebugInfo>,
    state: LifeState,
    pending_growth: usize,
    vacated: Option<Cell>,
    /// Set when the policy already rewarded this tick's apple
    pub(crate) rewarded: bool,
    /// Bumped whenever the brain is replaced, so late storage ids can't land on the
    /// wrong brain
    pub(crate) lineage: u64,
}

/// Where snake `id` spawns and which way it faces. Snakes start in the four quadrants.
pub fn spawn_point(id: usize, grid: &Grid) -> (Cell, Direction) {
    let (w, h) = (grid.width, grid.height);
    match id % 4 {
        0 => (Cell::new(w / 4, h / 4), Direction::Right),
        1 => (Cell::new(3 * w / 4, h / 4), Direction::Down),
        2 => (Cell::new(3 * w / 4, 3 * h / 4), Direction::Left),
        _ => (Cell::new(w / 4, 3 * h / 4), Direction::Up),
    }
}

/// A fresh body at the spawn point of snake `id`, trailing away from its direction
pub fn spawn_body(id: usize, grid: &Grid) -> (VecDeque<Cell>, Direction) {
    let (head, direction) = spawn_point(id, grid);
    let body = (0..SNAKEPIT_SPAWN_LENGTH as i32)
        .map(|i| grid.step(head, direction.reverse(), i))
        .collect();
    (body, direction)
}

impl Snake {
    pub fn spawn(id: usize, grid: &Grid, brain: Option<Brain>) -> Self {
        let (body, direction) = spawn_body(id, grid);
        let brain = brain.filter(|b| {
            let valid = b.is_valid();
            if !valid {
                warn!("snake {id} got a malformed brain, running without one");
            }
            valid
        });
        Self {
            id,
            body,
            direction,
            color: COLORS[id % COLORS.len()],
            score: 0,
            brain,
            moves_without_eating: 0,
            metrics: DecisionMetrics::default(),
            last_inputs: Vec::new(),
            last_outputs: Vec::new(),
            debug: None,
            state: LifeState::Alive,
            pending_growth: 0,
            vacated: None,
            rewarded: false,
            lineage: 0,
        }
    }

    #[inline]
    pub fn head(&self) -> Cell {
        // bodies are never empty, see Snake::ensure_body
        self.body.front().copied().unwrap_or(Cell::new(0, 0))
    }

    #[inline]
    pub fn tail(&self) -> Option<Cell> {
        self.body.back().copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.state == LifeState::Alive
    }

    #[inline]
    pub fn state(&self) -> LifeState {
        self.state
    }

    pub fn generation(&self) -> Option<u64> {
        self.brain.as_ref().map(Brain::generation)
    }

    /// Whether the body is long enough, on the grid, and made of adjacent segments
    pub fn body_is_valid(&self, grid: &Grid) -> bool {
        self.body.len() >= SNAKEPIT_SPAWN_LENGTH
            && self.body.iter().all(|c| grid.contains(*c))
            && self
                .body
                .iter()
                .zip(self.body.iter().skip(1))
                .all(|(l, r)| grid.distance(*l, *r) == 1)
    }

    /// Replace an invalid body with a fresh one at the spawn point. Returns whether the
    /// body had to be replaced.
    pub fn ensure_body(&mut self, grid: &Grid) -> bool {
        if self.body_is_valid(grid) {
            return false;
        }
        warn!(
            "snake {} had an invalid body of {} segments, regenerating",
            self.id,
            self.body.len()
        );
        (self.body, self.direction) = spawn_body(self.id, grid);
        self.pending_growth = 0;
        true
    }

    /// Move the head one cell in `direction`, dropping the tail unless growth is pending
    pub fn advance(&mut self, grid: &Grid, direction: Direction) {
        self.direction = direction;
        self.body.push_front(grid.step(self.head(), direction, 1));
        if self.pending_growth > 0 {
            self.pending_growth -= 1;
            self.vacated = None;
        } else {
            self.vacated = self.body.pop_back();
        }
    }

    /// Grow by `segments`: the tail dropped by the last move comes back right away, the
    /// rest are added over the following moves
    pub fn grow(&mut self, segments: usize) {
        let mut segments = segments;
        if segments > 0 {
            if let Some(tail) = self.vacated.take() {
                self.body.push_back(tail);
                segments -= 1;
            }
        }
        self.pending_growth += segments;
    }

    #[inline]
    pub fn pending_growth(&self) -> usize {
        self.pending_growth
    }

    /// The tail cell given up by the last move, if it didn't grow
    #[inline]
    pub fn vacated(&self) -> Option<Cell> {
        self.vacated
    }

    /// Feed an outcome back into the brain, using the inputs and outputs it last acted on.
    /// `now` is the simulation clock in milliseconds.
    pub fn learn(&mut self, success: bool, reward: f64, now: u64, rng: &mut impl Rng) -> bool {
        let Some(brain) = self.brain.as_mut() else {
            return false;
        };
        brain.learn_at(
            Feedback {
                success,
                inputs: &self.last_inputs,
                outputs: &self.last_outputs,
                reward,
            },
            now,
            rng,
        )
    }

    pub(crate) fn die(&mut self) {
        self.state = LifeState::Dead;
    }

    /// Put a dead snake on a provisional body at its spawn point until `ready_at`
    pub(crate) fn schedule_respawn(&mut self, grid: &Grid, ready_at: u64) {
        (self.body, self.direction) = spawn_body(self.id, grid);
        self.state = LifeState::Respawning { ready_at };
        self.pending_growth = 0;
        self.vacated = None;
        self.moves_without_eating = 0;
        self.last_inputs.clear();
        self.last_outputs.clear();
        self.debug = None;
    }

    /// Bring a respawning snake back with `brain`
    pub(crate) fn revive(&mut self, grid: &Grid, brain: Option<Brain>) {
        self.replace_brain(brain);
        self.ensure_body(grid);
        self.state = LifeState::Alive;
    }

    /// Start over at the spawn point with `brain`, forgetting score and metrics
    pub(crate) fn restart(&mut self, grid: &Grid, brain: Option<Brain>) {
        *self = Self {
            lineage: self.lineage + 1,
            ..Self::spawn(self.id, grid, brain)
        };
    }

    pub(crate) fn replace_brain(&mut self, brain: Option<Brain>) {
        self.brain = brain.filter(|b| b.is_valid());
        self.lineage += 1;
    }
}
