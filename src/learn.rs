//! The reward-weighted learning rule and the experience replay buffer behind it.
//!
//! This is a hand-tuned heuristic rather than gradient descent: there is no loss and no
//! backpropagation. A learning step nudges the weights indexed by each `(input, output)`
//! pair in the direction of the input, scaled by reward and outcome, regularizes every
//! weight toward zero, and occasionally replays the most rewarding recent experiences.

use crate::{
    constants::{
        SNAKEPIT_EXPERIENCE_CAPACITY, SNAKEPIT_LEARN_CONFIDENT_BONUS, SNAKEPIT_LEARN_DRIFT,
        SNAKEPIT_LEARN_RATE_FAILURE, SNAKEPIT_LEARN_RATE_SUCCESS, SNAKEPIT_LEARN_REWARD_CAP,
        SNAKEPIT_LEARN_STRENGTH_STRONG, SNAKEPIT_LEARN_STRENGTH_WEAK,
        SNAKEPIT_LEARN_STRONG_INPUT, SNAKEPIT_LEARN_UNSURE_BONUS, SNAKEPIT_RECENT_WINDOW,
        SNAKEPIT_REGULARIZATION, SNAKEPIT_REPLAY_BATCH, SNAKEPIT_REPLAY_FAILURE_PROB,
        SNAKEPIT_REPLAY_FORCE_REWARD, SNAKEPIT_REPLAY_MIN_BUFFER, SNAKEPIT_REPLAY_SUCCESS_PROB,
    },
    network::Brain,
    random::happens,
};
use log::{trace, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    time::{SystemTime, UNIX_EPOCH},
};

const MILLIS_PER_MINUTE: f64 = 60_000.;

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One outcome to learn from. `inputs` and `outputs` are the predictor I/O that led to it.
#[derive(Debug, Clone, Copy)]
pub struct Feedback<'a> {
    pub success: bool,
    pub inputs: &'a [f64],
    pub outputs: &'a [f64],
    pub reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experience {
    pub inputs: Vec<f64>,
    pub outputs: Vec<f64>,
    pub success: bool,
    pub reward: f64,
    /// Unix time in milliseconds
    pub timestamp: u64,
}

impl Experience {
    fn age_minutes(&self, now: u64) -> f64 {
        now.saturating_sub(self.timestamp) as f64 / MILLIS_PER_MINUTE
    }

    /// Replay priority, favouring rewarding and recent experiences
    pub fn priority(&self, now: u64) -> f64 {
        self.reward - self.age_minutes(now) * 0.1
    }

    /// Reward to replay this experience with, decaying to half over thirty minutes
    pub fn decayed_reward(&self, now: u64) -> f64 {
        self.reward * (1. - self.age_minutes(now) / 30.).max(0.5)
    }
}

/// Experiences in arrival order, oldest evicted first once full
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayBuffer(VecDeque<Experience>);

impl ReplayBuffer {
    pub fn push(&mut self, experience: Experience) {
        self.0.push_back(experience);
        while self.0.len() > SNAKEPIT_EXPERIENCE_CAPACITY {
            self.0.pop_front();
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.0.iter()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Up to `n` experiences with the highest [Experience::priority] at `now`, best first
    pub fn prioritized(&self, now: u64, n: usize) -> Vec<Experience> {
        let mut ranked = self.0.iter().collect::<Vec<_>>();
        ranked.sort_by(|l, r| r.priority(now).total_cmp(&l.priority(now)));
        ranked.into_iter().take(n).cloned().collect()
    }
}

/// Running tallies of learning attempts, with a window of recent outcomes for display
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    recent: VecDeque<bool>,
}

impl LearningStats {
    fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.recent.push_back(success);
        if self.recent.len() > SNAKEPIT_RECENT_WINDOW {
            self.recent.pop_front();
        }
    }

    /// Share of successes among the most recent attempts, 0 when there were none
    pub fn recent_success_rate(&self) -> f64 {
        if self.recent.is_empty() {
            0.
        } else {
            self.recent.iter().filter(|s| **s).count() as f64 / self.recent.len() as f64
        }
    }
}

/// Step size of a learning update
pub fn adaptive_rate(success: bool, generation: u64, reward: f64) -> f64 {
    let base = if success {
        SNAKEPIT_LEARN_RATE_SUCCESS
    } else {
        SNAKEPIT_LEARN_RATE_FAILURE
    };
    base * (1. - generation as f64 / 150.).max(0.3) * reward.clamp(0., SNAKEPIT_LEARN_REWARD_CAP)
}

/// L2 pull toward zero applied to every weight on each update
pub fn regularization(generation: u64) -> f64 {
    SNAKEPIT_REGULARIZATION + generation as f64 / 25_000.
}

/// Apply one learning update to a flat weight vector.
///
/// The first `inputs.len() * output_size` weights are indexed as `(i / output_size,
/// i % output_size)` pairs of (input, output) and get nudged along their input; the rest
/// drift randomly by a fraction of the rate. Everything is then regularized.
pub fn update_weights(
    weights: &mut [f64],
    feedback: &Feedback<'_>,
    output_size: usize,
    rate: f64,
    regularization: f64,
    rng: &mut impl Rng,
) {
    let mapped = (feedback.inputs.len() * output_size).min(weights.len());
    let sign = if feedback.success { 1. } else { -1. };

    for (i, w) in weights.iter_mut().enumerate() {
        if i < mapped {
            let input = feedback.inputs[i / output_size];
            let strength = if input.abs() > SNAKEPIT_LEARN_STRONG_INPUT {
                SNAKEPIT_LEARN_STRENGTH_STRONG
            } else {
                SNAKEPIT_LEARN_STRENGTH_WEAK
            };
            let mut delta = input * rate * strength * sign;
            if feedback.success {
                let fired = feedback
                    .outputs
                    .get(i % output_size)
                    .is_some_and(|o| *o > 0.5);
                delta *= if fired {
                    SNAKEPIT_LEARN_CONFIDENT_BONUS
                } else {
                    SNAKEPIT_LEARN_UNSURE_BONUS
                };
            }
            *w += delta;
        } else {
            *w += (rng.random::<f64>() - 0.5) * rate * SNAKEPIT_LEARN_DRIFT;
        }
        *w -= regularization * *w;
    }
}

impl Brain {
    /// Learn from `feedback` as of now. See [Brain::learn_at].
    pub fn learn(&mut self, feedback: Feedback<'_>, rng: &mut impl Rng) -> bool {
        self.learn_at(feedback, now_millis(), rng)
    }

    /// Learn from `feedback`, timestamping the experience at `now` (unix millis). Returns
    /// false without touching anything when there are no inputs to learn from.
    pub fn learn_at(&mut self, feedback: Feedback<'_>, now: u64, rng: &mut impl Rng) -> bool {
        if !self.adjust(&feedback, rng) {
            return false;
        }

        self.experience.push(Experience {
            inputs: feedback.inputs.to_vec(),
            outputs: feedback.outputs.to_vec(),
            success: feedback.success,
            reward: feedback.reward,
            timestamp: now,
        });

        let replay = feedback.reward > SNAKEPIT_REPLAY_FORCE_REWARD
            || happens(
                rng,
                if feedback.success {
                    SNAKEPIT_REPLAY_SUCCESS_PROB
                } else {
                    SNAKEPIT_REPLAY_FAILURE_PROB
                },
            );
        if replay {
            self.replay(now, rng);
        }

        true
    }

    /// Re-apply the best few buffered experiences with decayed rewards. Replayed updates
    /// are neither buffered again nor allowed to trigger another replay.
    pub fn replay(&mut self, now: u64, rng: &mut impl Rng) -> usize {
        if self.experience.len() < SNAKEPIT_REPLAY_MIN_BUFFER {
            return 0;
        }

        let batch = self.experience.prioritized(now, SNAKEPIT_REPLAY_BATCH);
        trace!(
            "replaying {} of {} experiences at generation {}",
            batch.len(),
            self.experience.len(),
            self.generation()
        );
        for experience in batch.iter() {
            self.adjust(
                &Feedback {
                    success: experience.success,
                    inputs: &experience.inputs,
                    outputs: &experience.outputs,
                    reward: experience.decayed_reward(now),
                },
                rng,
            );
        }
        batch.len()
    }

    fn adjust(&mut self, feedback: &Feedback<'_>, rng: &mut impl Rng) -> bool {
        if feedback.inputs.is_empty() {
            return false;
        }

        self.stats.record(feedback.success);
        let rate = adaptive_rate(feedback.success, self.generation(), feedback.reward);
        let mut weights = self.weights();
        update_weights(
            &mut weights,
            feedback,
            self.output_size(),
            rate,
            regularization(self.generation()),
            rng,
        );

        if let Err(err) = self.set_weights(&weights) {
            // can't happen while the weight count is unchanged
            warn!("discarding learning update: {err}");
            return false;
        }
        trace!(
            "learned success={} reward={:.2} rate={rate:.4}",
            feedback.success,
            feedback.reward
        );
        true
    }
}
