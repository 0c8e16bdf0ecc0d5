//! Centralized constants for snakepit simulation and evolution parameters.
//!
//! All tunable parameters are defined here with the `SNAKEPIT_` prefix.
//! [crate::config::SimConfig] takes its defaults from the values in here.

use crate::random::percent;

// ============================================================================
// Network Topology
// ============================================================================

/// Sensory inputs per predictor
pub const SNAKEPIT_INPUT_SIZE: usize = 8;

/// Hidden units per predictor
pub const SNAKEPIT_HIDDEN_SIZE: usize = 12;

/// One output per direction, ordered up, right, down, left
pub const SNAKEPIT_OUTPUT_SIZE: usize = 4;

/// Range for random weight initialization
pub const SNAKEPIT_WEIGHT_INIT_RANGE: f64 = 1.0;

/// Generation below which predictions carry exploration noise
pub const SNAKEPIT_EXPLORATION_GENERATION: u64 = 50;

/// Noise amplitude at generation 0, shrinking by generation / 500
pub const SNAKEPIT_EXPLORATION_NOISE: f64 = 0.1;

// ============================================================================
// Learning Parameters
// ============================================================================

/// Base rate of a learning step after a success
pub const SNAKEPIT_LEARN_RATE_SUCCESS: f64 = 0.6;

/// Base rate of a learning step after a failure
pub const SNAKEPIT_LEARN_RATE_FAILURE: f64 = 0.7;

/// Rewards above this are clamped before scaling the learning rate
pub const SNAKEPIT_LEARN_REWARD_CAP: f64 = 3.5;

/// Inputs with a magnitude above this are considered strong
pub const SNAKEPIT_LEARN_STRONG_INPUT: f64 = 0.5;

pub const SNAKEPIT_LEARN_STRENGTH_STRONG: f64 = 2.5;
pub const SNAKEPIT_LEARN_STRENGTH_WEAK: f64 = 1.2;

/// Success bonus when the matching output fired above 0.5
pub const SNAKEPIT_LEARN_CONFIDENT_BONUS: f64 = 3.5;
pub const SNAKEPIT_LEARN_UNSURE_BONUS: f64 = 1.2;

/// Base L2 regularization, grown by generation / 25000
pub const SNAKEPIT_REGULARIZATION: f64 = 0.003;

/// Scale of the random drift applied to weights outside the input/output map
pub const SNAKEPIT_LEARN_DRIFT: f64 = 0.1;

/// Maximum experiences retained per brain
pub const SNAKEPIT_EXPERIENCE_CAPACITY: usize = 100;

/// Size of the rolling success window kept for display
pub const SNAKEPIT_RECENT_WINDOW: usize = 100;

/// Replay never runs on a buffer holding fewer experiences than this
pub const SNAKEPIT_REPLAY_MIN_BUFFER: usize = 10;

/// Experiences replayed per replay pass
pub const SNAKEPIT_REPLAY_BATCH: usize = 5;

/// Probability of a replay pass after a success
pub const SNAKEPIT_REPLAY_SUCCESS_PROB: u64 = percent(50);

/// Probability of a replay pass after a failure
pub const SNAKEPIT_REPLAY_FAILURE_PROB: u64 = percent(30);

/// Rewards above this always trigger a replay pass
pub const SNAKEPIT_REPLAY_FORCE_REWARD: f64 = 1.5;

// ============================================================================
// Rewards
// ============================================================================

/// Reward for eating an apple
pub const SNAKEPIT_REWARD_APPLE: f64 = 3.0;

/// Penalty for dying in any collision
pub const SNAKEPIT_PENALTY_COLLISION: f64 = 2.0;

/// Penalty for passing by a reachable-looking apple that was blocked
pub const SNAKEPIT_PENALTY_IGNORED_APPLE: f64 = 0.9;

// ============================================================================
// Lifecycle Parameters
// ============================================================================

/// Generations a clone advances past its parent
pub const SNAKEPIT_CLONE_GENERATION_STEP: u64 = 15;

/// Probability of a selected weight being jittered rather than reset
pub const SNAKEPIT_MUTATE_JITTER_PROB: u64 = percent(70);

/// Jitter scale at generation 0, shrinking by generation / 400 down to 0.3
pub const SNAKEPIT_MUTATE_JITTER_SCALE: f64 = 1.5;

/// Minimum value for a reset weight
pub const SNAKEPIT_PARAM_MUTATION_MIN: f64 = -3.0;

/// Maximum value for a reset weight
pub const SNAKEPIT_PARAM_MUTATION_MAX: f64 = 3.0;

/// Mutation pass applied to the result of a combine
pub const SNAKEPIT_COMBINE_MUTATION_RATE: f64 = 0.35;
pub const SNAKEPIT_COMBINE_MUTATION_STRENGTH: f64 = 0.4;

/// Share of the best parent score a combined model inherits
pub const SNAKEPIT_COMBINE_SCORE_RETENTION: f64 = 0.8;

/// Mutation rate used when respawning from a cached combined model
pub const SNAKEPIT_RESPAWN_COMBINED_MUTATION: f64 = 0.2;

/// Mutation rate used when respawning from a cached best model
pub const SNAKEPIT_RESPAWN_BEST_MUTATION: f64 = 0.3;

// ============================================================================
// Generation Tracking
// ============================================================================

/// Unconditional generation bump at the end of each round
pub const SNAKEPIT_ROUND_GENERATION_STEP: u64 = 5;

/// Additional bump when any snake scored this round
pub const SNAKEPIT_ROUND_SCORED_BONUS: u64 = 1;

/// Games between cache purges
pub const SNAKEPIT_PURGE_INTERVAL: u64 = 20;

/// Probability of purging once the purge interval has elapsed
pub const SNAKEPIT_PURGE_PROB: u64 = percent(70);

// ============================================================================
// Movement Policy
// ============================================================================

pub const SNAKEPIT_SCORE_REVERSE: f64 = 0.05;
pub const SNAKEPIT_SCORE_OBSTACLE: f64 = 0.01;
pub const SNAKEPIT_SCORE_STRAIGHT: f64 = 1.3;
pub const SNAKEPIT_SCORE_HUNGRY: f64 = 1.4;

/// Ticks without eating before hungry directions get boosted
pub const SNAKEPIT_HUNGRY_AFTER: u32 = 5;

/// Danger weights for obstacles one, two and three cells ahead
pub const SNAKEPIT_LOOKAHEAD: [f64; 3] = [1.0, 0.8, 0.6];

/// Below this generation only safe non-reversing moves are considered when available
pub const SNAKEPIT_SAFE_ONLY_GENERATION: u64 = 30;

/// Lead over the runner-up needed to trust the predictor outright
pub const SNAKEPIT_CONFIDENCE_MARGIN: f64 = 0.15;

// ============================================================================
// World Parameters
// ============================================================================

pub const SNAKEPIT_GRID_WIDTH: i32 = 40;
pub const SNAKEPIT_GRID_HEIGHT: i32 = 30;

/// Fixed roster size
pub const SNAKEPIT_MAX_SNAKES: usize = 4;

/// Body length of a freshly spawned snake
pub const SNAKEPIT_SPAWN_LENGTH: usize = 3;

pub const SNAKEPIT_MIN_APPLES: usize = 5;

/// Random placement attempts per apple before scanning for a free cell
pub const SNAKEPIT_APPLE_ATTEMPTS: usize = 50;

/// Ticks per round
pub const SNAKEPIT_ROUND_TICKS: u64 = 1_500;

pub const SNAKEPIT_TICK_INTERVAL_MS: u64 = 100;

pub const SNAKEPIT_RESPAWN_DELAY_MS: u64 = 1_000;

/// Base mutation rate for offspring at round end
pub const SNAKEPIT_MUTATION_RATE: f64 = 0.1;

/// Capacity of the persistence queue between the simulation and its store
pub const SNAKEPIT_PERSIST_QUEUE: usize = 256;
