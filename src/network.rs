//! The predictor every snake carries: a fixed 8 → 12 → 4 feed-forward network with no
//! bias, plus the evolutionary bookkeeping that travels with its weights.

use crate::{
    constants::{
        SNAKEPIT_EXPLORATION_GENERATION, SNAKEPIT_EXPLORATION_NOISE, SNAKEPIT_HIDDEN_SIZE,
        SNAKEPIT_INPUT_SIZE, SNAKEPIT_OUTPUT_SIZE, SNAKEPIT_WEIGHT_INIT_RANGE,
    },
    error::Result,
    learn::{LearningStats, ReplayBuffer},
    random::jitter,
    serialize::{deserialize_matrix, flatten, serialize_matrix, unflatten},
};
use log::warn;
use rand::Rng;
use rulinalg::{
    matrix::{BaseMatrix, Matrix},
    vector::Vector,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub mod activate {
    use core::f64::consts::E;

    pub fn sigmoid(x: f64) -> f64 {
        1. / (1. + E.powf(-x))
    }
}

/// Base rate reported for a brain at generation 0
const BASE_LEARNING_RATE: f64 = 0.1;

/// Amplitude of the uniform noise added to every pre-activation sum of a brain at this
/// generation. Zero from [SNAKEPIT_EXPLORATION_GENERATION] on.
pub fn exploration_noise(generation: u64) -> f64 {
    if generation < SNAKEPIT_EXPLORATION_GENERATION {
        (SNAKEPIT_EXPLORATION_NOISE - generation as f64 / 500.).max(0.)
    } else {
        0.
    }
}

/// Pad with zeros or truncate `inputs` to exactly `size` values
pub fn fit_inputs(inputs: &[f64], size: usize) -> Cow<'_, [f64]> {
    if inputs.len() == size {
        return Cow::Borrowed(inputs);
    }

    warn!(
        "predictor expected {size} inputs, got {}; {}",
        inputs.len(),
        if inputs.len() < size {
            "padding with zeros"
        } else {
            "truncating"
        }
    );
    let mut fitted = inputs[..inputs.len().min(size)].to_vec();
    fitted.resize(size, 0.);
    Cow::Owned(fitted)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brain {
    /// Storage id, assigned once the brain has been saved
    pub id: Option<String>,
    input_size: usize,
    hidden_size: usize,
    output_size: usize,
    /// hidden x input
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix"
    )]
    weights_input_hidden: Matrix<f64>,
    /// output x hidden
    #[serde(
        serialize_with = "serialize_matrix",
        deserialize_with = "deserialize_matrix"
    )]
    weights_hidden_output: Matrix<f64>,
    generation: u64,
    pub score: f64,
    best_score: f64,
    pub games_played: u32,
    #[serde(default)]
    pub(crate) experience: ReplayBuffer,
    #[serde(default)]
    pub(crate) stats: LearningStats,
    #[serde(skip)]
    last_predictions: Vec<f64>,
}

impl Brain {
    /// A brain of the standard shape with uniformly random weights
    pub fn random(generation: u64, rng: &mut impl Rng) -> Self {
        let (input, hidden, output) = (
            SNAKEPIT_INPUT_SIZE,
            SNAKEPIT_HIDDEN_SIZE,
            SNAKEPIT_OUTPUT_SIZE,
        );
        let mut init = |n: usize| {
            (0..n)
                .map(|_| rng.random_range(-SNAKEPIT_WEIGHT_INIT_RANGE..=SNAKEPIT_WEIGHT_INIT_RANGE))
                .collect::<Vec<f64>>()
        };
        let weights_input_hidden = Matrix::new(hidden, input, init(hidden * input));
        let weights_hidden_output = Matrix::new(output, hidden, init(output * hidden));

        Self::from_matrices(weights_input_hidden, weights_hidden_output, generation)
    }

    /// A brain of the standard shape built from a flat weight vector
    pub fn from_weights(weights: &[f64], generation: u64) -> Result<Self> {
        let (ih, ho) = unflatten(
            weights,
            SNAKEPIT_INPUT_SIZE,
            SNAKEPIT_HIDDEN_SIZE,
            SNAKEPIT_OUTPUT_SIZE,
        )?;
        Ok(Self::from_matrices(ih, ho, generation))
    }

    fn from_matrices(
        weights_input_hidden: Matrix<f64>,
        weights_hidden_output: Matrix<f64>,
        generation: u64,
    ) -> Self {
        Self {
            id: None,
            input_size: weights_input_hidden.cols(),
            hidden_size: weights_input_hidden.rows(),
            output_size: weights_hidden_output.rows(),
            weights_input_hidden,
            weights_hidden_output,
            generation: generation.max(1),
            score: 0.,
            best_score: 0.,
            games_played: 0,
            experience: ReplayBuffer::default(),
            stats: LearningStats::default(),
            last_predictions: Vec::new(),
        }
    }

    #[inline]
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    #[inline]
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    #[inline]
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Raise this brain's generation to `generation`, never lowering it
    pub fn raise_generation(&mut self, generation: u64) {
        self.generation = self.generation.max(generation);
    }

    #[inline]
    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// Set the current score, carrying it into the best score if it's an improvement
    pub fn record_score(&mut self, score: f64) {
        self.score = score;
        self.best_score = self.best_score.max(score);
    }

    pub(crate) fn set_best_score(&mut self, best_score: f64) {
        self.best_score = self.best_score.max(best_score);
    }

    /// The nominal learning rate at this brain's generation
    pub fn learning_rate(&self) -> f64 {
        BASE_LEARNING_RATE * (1. - self.generation as f64 / 150.).max(0.3)
    }

    /// Every weight as one flat vector, input→hidden first
    pub fn weights(&self) -> Vec<f64> {
        flatten(&self.weights_input_hidden, &self.weights_hidden_output)
    }

    pub fn weight_count(&self) -> usize {
        self.weights_input_hidden.data().len() + self.weights_hidden_output.data().len()
    }

    /// Replace every weight from a flat vector of the same layout as [Brain::weights]
    pub fn set_weights(&mut self, weights: &[f64]) -> Result<()> {
        let (ih, ho) = unflatten(weights, self.input_size, self.hidden_size, self.output_size)?;
        self.weights_input_hidden = ih;
        self.weights_hidden_output = ho;
        Ok(())
    }

    /// Whether this brain has the standard shape and only finite weights
    pub fn is_valid(&self) -> bool {
        self.input_size == SNAKEPIT_INPUT_SIZE
            && self.hidden_size == SNAKEPIT_HIDDEN_SIZE
            && self.output_size == SNAKEPIT_OUTPUT_SIZE
            && self.weights_input_hidden.rows() == self.hidden_size
            && self.weights_input_hidden.cols() == self.input_size
            && self.weights_hidden_output.rows() == self.output_size
            && self.weights_hidden_output.cols() == self.hidden_size
            && self
                .weights_input_hidden
                .data()
                .iter()
                .chain(self.weights_hidden_output.data())
                .all(|w| w.is_finite())
    }

    /// Forward pass without recording anything on the brain
    pub fn forward(&self, inputs: &[f64], rng: &mut impl Rng) -> Vec<f64> {
        let noise = exploration_noise(self.generation);
        let x = Vector::new(fit_inputs(inputs, self.input_size).into_owned());

        let hidden = (&self.weights_input_hidden * &x)
            .into_vec()
            .into_iter()
            .map(|sum| activate::sigmoid(sum + jitter(rng, noise)))
            .collect::<Vec<_>>();

        (&self.weights_hidden_output * &Vector::new(hidden))
            .into_vec()
            .into_iter()
            .map(|sum| activate::sigmoid(sum + jitter(rng, noise)))
            .collect()
    }

    /// Forward pass that remembers its outputs as this brain's last predictions
    pub fn predict(&mut self, inputs: &[f64], rng: &mut impl Rng) -> Vec<f64> {
        let outputs = self.forward(inputs, rng);
        self.last_predictions.clone_from(&outputs);
        outputs
    }

    pub fn last_predictions(&self) -> &[f64] {
        &self.last_predictions
    }

    pub fn stats(&self) -> &LearningStats {
        &self.stats
    }

    pub fn experience(&self) -> &ReplayBuffer {
        &self.experience
    }
}

impl PartialEq for Brain {
    fn eq(&self, other: &Self) -> bool {
        self.generation == other.generation
            && self.weights_input_hidden.data() == other.weights_input_hidden.data()
            && self.weights_hidden_output.data() == other.weights_hidden_output.data()
    }
}
