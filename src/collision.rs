//! Resolving a tick once every living snake has moved: self-collisions, head-to-head and
//! head-to-body crashes, and apples eaten. Every outcome is fed back to the brains
//! involved and reported as an [Event].

use crate::{
    constants::{SNAKEPIT_PENALTY_COLLISION, SNAKEPIT_REWARD_APPLE},
    grid::Cell,
    snake::Snake,
};
use fxhash::{FxHashMap, FxHashSet};
use log::debug;
use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Ran into itself; its body turned into apples
    SelfCollision { snake: usize },
    HeadToHead { snakes: Vec<usize> },
    HeadToBody { victim: usize, owner: usize },
    /// `owner` survived a [Event::HeadToBody] and was credited for it
    Kill { killer: usize, victim: usize, length: usize },
    Ate { snake: usize, cell: Cell },
}

#[derive(Debug, Default)]
pub struct Resolution {
    pub events: Vec<Event>,
    /// Snakes that died this tick
    pub dead: Vec<usize>,
    /// Former body cells of snakes that ran into themselves
    pub explosion: Vec<Cell>,
}

/// Score a survivor earns for a kill
pub fn kill_score(victim_length: usize) -> u32 {
    (victim_length as u32 / 2).max(1)
}

/// Segments a survivor grows by for a kill
pub fn kill_growth(victim_length: usize) -> usize {
    victim_length.min(3)
}

fn crash(snake: &mut Snake, now: u64, rng: &mut impl Rng) {
    snake.die();
    snake.learn(false, SNAKEPIT_PENALTY_COLLISION, now, rng);
}

/// Resolve collisions and apples for snakes that were alive this tick and have moved.
/// `now` is the simulation clock in milliseconds.
pub fn resolve(
    snakes: &mut [Snake],
    apples: &mut FxHashSet<Cell>,
    now: u64,
    rng: &mut impl Rng,
) -> Resolution {
    let mut resolution = Resolution::default();
    let moving = snakes
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_alive())
        .map(|(i, _)| i)
        .collect::<Vec<_>>();

    // bodies as they stand after the move, before anyone is taken off the grid
    let segments = moving
        .iter()
        .flat_map(|i| snakes[*i].body.iter().skip(1).map(move |c| (*c, *i)))
        .collect::<FxHashMap<_, _>>();
    let lengths = moving
        .iter()
        .map(|i| (*i, snakes[*i].len()))
        .collect::<FxHashMap<_, _>>();

    for i in moving.iter().copied() {
        let snake = &mut snakes[i];
        let head = snake.head();
        if snake.body.iter().skip(1).any(|c| *c == head) {
            // every segment it had before moving
            resolution
                .explosion
                .extend(snake.body.iter().skip(1).copied().chain(snake.vacated()));
            snake.metrics.suicides += 1;
            crash(snake, now, rng);
            resolution.dead.push(i);
            resolution.events.push(Event::SelfCollision { snake: i });
            debug!("snake {i} ran into itself");
        }
    }

    let mut heads: FxHashMap<Cell, Vec<usize>> = FxHashMap::default();
    for i in moving.iter().copied().filter(|i| snakes[*i].is_alive()) {
        heads.entry(snakes[i].head()).or_default().push(i);
    }
    let mut crashed = heads
        .into_values()
        .filter(|ids| ids.len() > 1)
        .collect::<Vec<_>>();
    crashed.sort();
    for ids in crashed {
        for i in ids.iter().copied() {
            snakes[i].metrics.suicides += 1;
            crash(&mut snakes[i], now, rng);
            resolution.dead.push(i);
        }
        debug!("head to head between snakes {ids:?}");
        resolution.events.push(Event::HeadToHead { snakes: ids });
    }

    // decided together, so two snakes biting each other both die
    let bitten = moving
        .iter()
        .copied()
        .filter(|i| snakes[*i].is_alive())
        .filter_map(|i| {
            segments
                .get(&snakes[i].head())
                .filter(|owner| **owner != i)
                .map(|owner| (i, *owner))
        })
        .collect::<Vec<_>>();
    for (victim, _) in bitten.iter() {
        crash(&mut snakes[*victim], now, rng);
        resolution.dead.push(*victim);
    }
    for (victim, owner) in bitten {
        resolution.events.push(Event::HeadToBody { victim, owner });
        if !snakes[owner].is_alive() {
            continue;
        }
        let length = lengths.get(&victim).copied().unwrap_or(0);
        let killer = &mut snakes[owner];
        killer.score += kill_score(length);
        killer.grow(kill_growth(length));
        killer.metrics.kill_count += 1;
        debug!("snake {owner} killed snake {victim} of length {length}");
        resolution.events.push(Event::Kill {
            killer: owner,
            victim,
            length,
        });
    }

    for i in moving {
        let snake = &mut snakes[i];
        if !snake.is_alive() || !apples.remove(&snake.head()) {
            continue;
        }
        snake.moves_without_eating = 0;
        snake.metrics.apples_eaten += 1;
        snake.score += 1;
        snake.grow(1);
        if !snake.rewarded {
            snake.learn(true, SNAKEPIT_REWARD_APPLE, now, rng);
        }
        resolution.events.push(Event::Ate {
            snake: i,
            cell: snake.head(),
        });
    }

    resolution
}
