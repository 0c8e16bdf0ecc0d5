//! Per-tick movement decisions.
//!
//! Every tick a living snake senses its surroundings into the eight predictor inputs, asks
//! its brain for a score per direction, and then picks a direction by the first rule that
//! applies:
//!
//! 1. an adjacent, unblocked apple is always taken
//! 2. with a brain, the predictor scores are shaped by reversal, obstacle, straight-line
//!    and hunger factors and the best one is taken when it leads clearly, cautiously
//!    otherwise
//! 3. without a brain, a safe apple, then any safe cell, then the least dangerous one

use crate::{
    constants::{
        SNAKEPIT_CONFIDENCE_MARGIN, SNAKEPIT_HUNGRY_AFTER, SNAKEPIT_LOOKAHEAD,
        SNAKEPIT_PENALTY_IGNORED_APPLE, SNAKEPIT_REWARD_APPLE, SNAKEPIT_SAFE_ONLY_GENERATION,
        SNAKEPIT_SCORE_HUNGRY, SNAKEPIT_SCORE_OBSTACLE, SNAKEPIT_SCORE_REVERSE,
        SNAKEPIT_SCORE_STRAIGHT,
    },
    grid::{Cell, Direction, Grid},
    snake::{DebugInfo, Decision, Snake},
};
use fxhash::FxHashSet;
use log::debug;
use rand::Rng;

/// What a snake can see when deciding
#[derive(Debug, Clone, Copy)]
pub struct Surroundings<'a> {
    pub grid: &'a Grid,
    pub apples: &'a FxHashSet<Cell>,
    /// Every segment of every living snake
    pub occupied: &'a FxHashSet<Cell>,
    /// Simulation clock in milliseconds
    pub now: u64,
}

impl Surroundings<'_> {
    /// Whether `snake` would run into something at `cell`. Its own tail doesn't count
    /// unless it is growing, otherwise it moves out of the way.
    pub fn blocked(&self, snake: &Snake, cell: Cell) -> bool {
        self.occupied.contains(&cell)
            && (snake.pending_growth() > 0 || snake.tail() != Some(cell))
    }

    /// Weighted danger of heading in `direction`, the highest of the look-ahead weights
    /// of the blocked cells up to three steps ahead. 1 means an immediate obstacle.
    pub fn danger(&self, snake: &Snake, direction: Direction) -> f64 {
        SNAKEPIT_LOOKAHEAD
            .iter()
            .enumerate()
            .filter(|(k, _)| {
                self.blocked(snake, self.grid.step(snake.head(), direction, *k as i32 + 1))
            })
            .map(|(_, w)| *w)
            .fold(0., f64::max)
    }

    pub fn nearest_apple(&self, from: Cell) -> Option<(Cell, i32)> {
        self.apples
            .iter()
            .map(|a| (*a, self.grid.distance(from, *a)))
            .min_by_key(|(a, d)| (*d, a.y, a.x))
    }
}

/// The eight predictor inputs: toroidal offset to the nearest apple normalized by half the
/// grid, immediate danger up/right/down/left, and the current heading
pub fn sense(snake: &Snake, env: &Surroundings<'_>) -> Vec<f64> {
    let head = snake.head();
    let (apple_dx, apple_dy) = env
        .nearest_apple(head)
        .map(|(apple, _)| {
            let (dx, dy) = env.grid.offset(head, apple);
            (
                dx as f64 / (env.grid.width as f64 / 2.).max(1.),
                dy as f64 / (env.grid.height as f64 / 2.).max(1.),
            )
        })
        .unwrap_or((0., 0.));
    let (dir_x, dir_y) = snake.direction.delta();

    let mut inputs = Vec::with_capacity(8);
    inputs.push(apple_dx);
    inputs.push(apple_dy);
    inputs.extend(Direction::ALL.iter().map(|d| {
        if env.blocked(snake, env.grid.step(head, *d, 1)) {
            1.
        } else {
            0.
        }
    }));
    inputs.push(dir_x as f64);
    inputs.push(dir_y as f64);
    inputs
}

/// The predictor score of `direction` shaped by the movement heuristics
pub fn shaped_score(
    snake: &Snake,
    env: &Surroundings<'_>,
    outputs: &[f64],
    direction: Direction,
) -> f64 {
    let mut score = outputs.get(direction.index()).copied().unwrap_or(0.);
    if direction == snake.direction.reverse() {
        score *= SNAKEPIT_SCORE_REVERSE;
    }
    let danger = env.danger(snake, direction);
    if danger >= 1. {
        score *= SNAKEPIT_SCORE_OBSTACLE;
    } else {
        score *= 1. - 0.5 * danger;
    }
    if direction == snake.direction {
        score *= SNAKEPIT_SCORE_STRAIGHT;
    }
    if snake.moves_without_eating > SNAKEPIT_HUNGRY_AFTER
        && approaches_apple(snake, env, direction)
    {
        score *= SNAKEPIT_SCORE_HUNGRY;
    }
    score
}

fn approaches_apple(snake: &Snake, env: &Surroundings<'_>, direction: Direction) -> bool {
    env.nearest_apple(snake.head()).is_some_and(|(apple, distance)| {
        env.grid.distance(env.grid.step(snake.head(), direction, 1), apple) < distance
    })
}

/// Pick a direction for `snake` and do the bookkeeping that goes with it: learning from an
/// apple about to be eaten or one passed by, the decision metrics, the debug overlay, and
/// the inputs and outputs remembered for the next learning signal. The snake doesn't move.
pub fn decide(snake: &mut Snake, env: &Surroundings<'_>, rng: &mut impl Rng) -> Direction {
    let head = snake.head();
    let reverse = snake.direction.reverse();
    let inputs = sense(snake, env);
    let outputs = snake
        .brain
        .as_mut()
        .map(|brain| brain.predict(&inputs, rng));

    let adjacent_apples = Direction::ALL
        .into_iter()
        .filter(|d| env.apples.contains(&env.grid.step(head, *d, 1)))
        .collect::<Vec<_>>();
    let edible = adjacent_apples
        .iter()
        .copied()
        .find(|d| *d != reverse && !env.blocked(snake, env.grid.step(head, *d, 1)));

    snake.rewarded = false;
    let (direction, reason, confidence) = if let Some(direction) = edible {
        // learns from what led here, before this tick's inputs replace them
        snake.learn(true, SNAKEPIT_REWARD_APPLE, env.now, rng);
        snake.rewarded = true;
        (direction, Decision::EatApple, 1.)
    } else {
        if !adjacent_apples.is_empty() {
            snake.metrics.apples_ignored += 1;
            snake.learn(false, SNAKEPIT_PENALTY_IGNORED_APPLE, env.now, rng);
        }
        match &outputs {
            Some(outputs) => guided(snake, env, outputs),
            None => fallback(snake, env),
        }
    };

    if env.blocked(snake, env.grid.step(head, direction, 1)) {
        snake.metrics.bad_directions += 1;
    } else {
        snake.metrics.good_directions += 1;
    }
    snake.moves_without_eating += 1;
    snake.last_inputs = inputs;
    snake.last_outputs = outputs.unwrap_or_default();
    snake.debug = Some(DebugInfo {
        reason,
        confidence,
        nearest_apple: env.nearest_apple(head).map(|(_, d)| d),
    });
    debug!(
        "snake {} goes {direction:?} ({reason:?}, confidence {confidence:.3})",
        snake.id
    );
    direction
}

fn guided(snake: &Snake, env: &Surroundings<'_>, outputs: &[f64]) -> (Direction, Decision, f64) {
    let head = snake.head();
    let reverse = snake.direction.reverse();
    let safe = |d: &Direction| !env.blocked(snake, env.grid.step(head, *d, 1));

    let mut candidates = Direction::ALL.to_vec();
    if snake.generation().unwrap_or(0) < SNAKEPIT_SAFE_ONLY_GENERATION {
        let safe_forward = candidates
            .iter()
            .copied()
            .filter(|d| *d != reverse && safe(d))
            .collect::<Vec<_>>();
        if !safe_forward.is_empty() {
            candidates = safe_forward;
        }
    }

    let mut ranked = candidates
        .into_iter()
        .map(|d| (d, shaped_score(snake, env, outputs, d)))
        .collect::<Vec<_>>();
    // stable, ties keep up/right/down/left order
    ranked.sort_by(|l, r| r.1.total_cmp(&l.1));

    let (top, top_score) = ranked[0];
    let lead = ranked.get(1).map_or(top_score, |(_, s)| top_score - s);
    if lead > SNAKEPIT_CONFIDENCE_MARGIN {
        return (top, Decision::Confident, lead);
    }

    let direction = ranked
        .iter()
        .find(|(d, _)| safe(d))
        .or_else(|| ranked.iter().find(|(d, _)| *d != reverse))
        .map_or(top, |(d, _)| *d);
    (direction, Decision::Cautious, lead)
}

fn fallback(snake: &Snake, env: &Surroundings<'_>) -> (Direction, Decision, f64) {
    let head = snake.head();
    let forward = Direction::ALL
        .into_iter()
        .filter(|d| *d != snake.direction.reverse())
        .collect::<Vec<_>>();
    let safe = forward
        .iter()
        .copied()
        .filter(|d| !env.blocked(snake, env.grid.step(head, *d, 1)))
        .collect::<Vec<_>>();

    if let Some(d) = safe
        .iter()
        .find(|d| env.apples.contains(&env.grid.step(head, **d, 1)))
    {
        return (*d, Decision::Fallback, 1.);
    }

    // without a predictor every score is 0, so closeness to food and low danger decide
    let distance = |d: Direction| {
        env.nearest_apple(head)
            .map_or(0, |(apple, _)| env.grid.distance(env.grid.step(head, d, 1), apple))
    };
    let direction = safe
        .iter()
        .copied()
        .min_by(|l, r| {
            env.danger(snake, *l)
                .total_cmp(&env.danger(snake, *r))
                .then(distance(*l).cmp(&distance(*r)))
        })
        .or_else(|| {
            forward
                .iter()
                .copied()
                .min_by(|l, r| env.danger(snake, *l).total_cmp(&env.danger(snake, *r)))
        })
        .unwrap_or(snake.direction);
    (direction, Decision::Fallback, 0.)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{network::Brain, random::WyRng};

    struct Scene {
        grid: Grid,
        apples: FxHashSet<Cell>,
        occupied: FxHashSet<Cell>,
    }

    impl Scene {
        fn new(snakes: &[&Snake], apples: &[Cell]) -> Self {
            Self {
                grid: Grid::new(20, 20),
                apples: apples.iter().copied().collect(),
                occupied: snakes.iter().flat_map(|s| s.body.iter().copied()).collect(),
            }
        }

        fn env(&self) -> Surroundings<'_> {
            Surroundings {
                grid: &self.grid,
                apples: &self.apples,
                occupied: &self.occupied,
                now: 0,
            }
        }
    }

    /// Snake 0 on a 20x20 grid: head (5, 5) facing right, body (4, 5), (3, 5)
    fn snake(brain: Option<Brain>) -> Snake {
        Snake::spawn(0, &Grid::new(20, 20), brain)
    }

    fn brain(generation: u64) -> Brain {
        Brain::random(generation, &mut WyRng::seeded(generation))
    }

    #[test]
    fn test_sense() {
        let s = snake(None);
        let scene = Scene::new(&[&s], &[Cell::new(8, 1)]);
        let inputs = sense(&s, &scene.env());
        assert_eq!(inputs.len(), 8);
        assert_eq!(inputs[0], 3. / 10.);
        assert_eq!(inputs[1], -4. / 10.);
        // only the neck behind is blocked
        assert_eq!(&inputs[2..6], &[0., 0., 0., 1.]);
        assert_eq!(&inputs[6..], &[1., 0.]);
    }

    #[test]
    fn test_danger_lookahead() {
        let s = snake(None);
        let mut scene = Scene::new(&[&s], &[]);
        assert_eq!(scene.env().danger(&s, Direction::Left), 1.);
        assert_eq!(scene.env().danger(&s, Direction::Up), 0.);

        scene.occupied.insert(Cell::new(7, 5));
        assert_eq!(scene.env().danger(&s, Direction::Right), 0.8);
        scene.occupied.insert(Cell::new(5, 2));
        assert_eq!(scene.env().danger(&s, Direction::Up), 0.6);
    }

    #[test]
    fn test_own_tail_is_not_an_obstacle() {
        let s = snake(None);
        let scene = Scene::new(&[&s], &[]);
        assert!(!scene.env().blocked(&s, Cell::new(3, 5)));
        assert!(scene.env().blocked(&s, Cell::new(4, 5)));
    }

    #[test]
    fn test_growing_tail_is_an_obstacle() {
        let mut rng = WyRng::seeded(8);
        let mut s = snake(None);
        s.body = [(5, 5), (5, 6), (6, 6), (6, 5)]
            .into_iter()
            .map(|(x, y)| Cell::new(x, y))
            .collect();
        s.direction = Direction::Up;
        s.grow(2);
        let scene = Scene::new(&[&s.clone()], &[Cell::new(9, 5)]);
        assert!(scene.env().blocked(&s, Cell::new(6, 5)));
        assert_eq!(scene.env().danger(&s, Direction::Right), 1.);

        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_ne!(direction, Direction::Right);
        s.advance(&scene.grid, direction);
        assert!(!s.body.iter().skip(1).any(|c| *c == s.head()));
    }

    #[test]
    fn test_adjacent_apple_wins() {
        let mut rng = WyRng::seeded(1);
        let mut s = snake(Some(brain(60)));
        s.last_inputs = vec![0.5; 8];
        s.last_outputs = vec![0.5; 4];
        let scene = Scene::new(&[&s.clone()], &[Cell::new(5, 6)]);

        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_eq!(direction, Direction::Down);
        assert!(s.rewarded);
        assert_eq!(s.debug.unwrap().reason, Decision::EatApple);
        assert_eq!(s.brain.as_ref().unwrap().stats().successes, 1);
        assert_eq!(s.last_inputs.len(), 8);
        assert_eq!(s.last_outputs.len(), 4);
        assert_eq!(s.moves_without_eating, 1);
    }

    #[test]
    fn test_blocked_apple_is_ignored() {
        let mut rng = WyRng::seeded(2);
        let mut s = snake(Some(brain(60)));
        s.last_inputs = vec![0.5; 8];
        s.last_outputs = vec![0.5; 4];
        let other = Snake::spawn(1, &Grid::new(20, 20), None);
        let mut scene = Scene::new(&[&s.clone(), &other], &[Cell::new(5, 4)]);
        scene.occupied.insert(Cell::new(5, 4));

        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_ne!(direction, Direction::Up);
        assert!(!s.rewarded);
        assert_eq!(s.metrics.apples_ignored, 1);
        assert_eq!(s.brain.as_ref().unwrap().stats().failures, 1);
    }

    #[test]
    fn test_guided_avoids_walls() {
        let mut rng = WyRng::seeded(3);
        for generation in [1, 60] {
            let mut s = snake(Some(brain(generation)));
            let mut scene = Scene::new(&[&s.clone()], &[]);
            scene.occupied.insert(Cell::new(6, 5));
            scene.occupied.insert(Cell::new(5, 4));
            let direction = decide(&mut s, &scene.env(), &mut rng);
            assert_eq!(direction, Direction::Down, "generation {generation}");
            assert_eq!(s.metrics.good_directions, 1);
        }
    }

    #[test]
    fn test_shaped_score() {
        let mut s = snake(None);
        let scene = Scene::new(&[&s.clone()], &[Cell::new(5, 12)]);
        let env = scene.env();
        let outputs = [1.; 4];
        assert_eq!(shaped_score(&s, &env, &outputs, Direction::Right), 1.3);
        assert_eq!(shaped_score(&s, &env, &outputs, Direction::Up), 1.);
        // reversing into the neck
        assert_eq!(
            shaped_score(&s, &env, &outputs, Direction::Left),
            SNAKEPIT_SCORE_REVERSE * SNAKEPIT_SCORE_OBSTACLE
        );

        s.moves_without_eating = SNAKEPIT_HUNGRY_AFTER + 1;
        assert_eq!(shaped_score(&s, &env, &outputs, Direction::Down), 1.4);
        assert_eq!(shaped_score(&s, &env, &outputs, Direction::Up), 1.);
    }

    /// A brain whose outputs are all 0.5, leaving the decision to the heuristics
    fn flat_brain() -> Brain {
        Brain::from_weights(&[0.; 144], 60).unwrap()
    }

    #[test]
    fn test_confident_when_clear_lead() {
        let mut rng = WyRng::seeded(4);
        let mut s = snake(Some(flat_brain()));
        let mut scene = Scene::new(&[&s.clone()], &[]);
        scene.occupied.insert(Cell::new(5, 4));
        scene.occupied.insert(Cell::new(5, 6));
        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_eq!(direction, Direction::Right);
        assert_eq!(s.debug.unwrap().reason, Decision::Confident);
    }

    #[test]
    fn test_young_brains_only_rank_safe_moves() {
        let mut rng = WyRng::seeded(9);
        for generation in [SNAKEPIT_SAFE_ONLY_GENERATION - 1, SNAKEPIT_SAFE_ONLY_GENERATION] {
            let mut s = snake(Some(Brain::from_weights(&[0.; 144], generation).unwrap()));
            let before = s.clone();
            let mut scene = Scene::new(&[&before], &[]);
            scene.occupied.insert(Cell::new(5, 4));
            scene.occupied.insert(Cell::new(5, 6));
            let env = scene.env();

            assert_eq!(decide(&mut s, &env, &mut rng), Direction::Right);
            let debug = s.debug.unwrap();
            assert_eq!(debug.reason, Decision::Confident);
            let score = |d| shaped_score(&before, &env, &s.last_outputs, d);
            if generation < SNAKEPIT_SAFE_ONLY_GENERATION {
                // right is the only candidate, so its lead is its whole score
                assert_eq!(debug.confidence, score(Direction::Right));
            } else {
                let runner_up = [Direction::Up, Direction::Down, Direction::Left]
                    .into_iter()
                    .map(score)
                    .fold(f64::MIN, f64::max);
                assert_eq!(debug.confidence, score(Direction::Right) - runner_up);
                assert!(debug.confidence < score(Direction::Right));
            }
        }
    }

    #[test]
    fn test_cautious_prefers_first_safe() {
        let mut rng = WyRng::seeded(7);
        let mut s = snake(Some(flat_brain()));
        let mut scene = Scene::new(&[&s.clone()], &[]);
        // something three cells ahead takes the shine off going straight
        scene.occupied.insert(Cell::new(8, 5));
        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_eq!(direction, Direction::Up);
        assert_eq!(s.debug.unwrap().reason, Decision::Cautious);
    }

    #[test]
    fn test_fallback_without_brain() {
        let mut rng = WyRng::seeded(5);
        let mut s = snake(None);
        let scene = Scene::new(&[&s.clone()], &[Cell::new(5, 10)]);
        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_eq!(direction, Direction::Down);
        assert_eq!(s.debug.unwrap().reason, Decision::Fallback);
        assert!(s.last_outputs.is_empty());
        assert_eq!(s.last_inputs.len(), 8);
    }

    #[test]
    fn test_fallback_boxed_in_keeps_going() {
        let mut rng = WyRng::seeded(6);
        let mut s = snake(None);
        let mut scene = Scene::new(&[&s.clone()], &[]);
        for cell in [Cell::new(6, 5), Cell::new(5, 4), Cell::new(5, 6)] {
            scene.occupied.insert(cell);
        }
        let direction = decide(&mut s, &scene.env(), &mut rng);
        assert_ne!(direction, Direction::Left);
        assert_eq!(s.metrics.bad_directions, 1);
    }
}
