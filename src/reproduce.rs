//! Deriving new brains from existing ones: cloning, mutation, score-weighted combination,
//! and the policies that pick which of those a respawning or next-round snake gets.

use crate::{
    constants::{
        SNAKEPIT_CLONE_GENERATION_STEP, SNAKEPIT_COMBINE_MUTATION_RATE,
        SNAKEPIT_COMBINE_MUTATION_STRENGTH, SNAKEPIT_COMBINE_SCORE_RETENTION,
        SNAKEPIT_MUTATE_JITTER_PROB, SNAKEPIT_MUTATE_JITTER_SCALE, SNAKEPIT_PARAM_MUTATION_MAX,
        SNAKEPIT_PARAM_MUTATION_MIN, SNAKEPIT_RESPAWN_BEST_MUTATION,
        SNAKEPIT_RESPAWN_COMBINED_MUTATION,
    },
    generation::GenerationTracker,
    network::Brain,
    random::{box_muller, happens},
};
use log::{debug, warn};
use rand::Rng;
use rand_distr::StandardNormal;

/// Chance that any one weight is touched by [mutate] at this rate and generation
pub fn mutation_probability(mutation_rate: f64, generation: u64) -> f64 {
    mutation_rate * (1. - generation as f64 / 300.).max(0.3)
}

/// Standard deviation of the jitter [mutate] applies at this generation
pub fn jitter_scale(generation: u64) -> f64 {
    (1. - generation as f64 / 400.).max(0.3) * SNAKEPIT_MUTATE_JITTER_SCALE
}

/// Perturb weights in place. Each weight is picked with [mutation_probability]; a picked
/// weight is jittered by a gaussian most of the time, and reset uniformly within
/// `[-3, 3]` otherwise. Returns how many weights were picked.
pub fn mutate(brain: &mut Brain, mutation_rate: f64, rng: &mut impl Rng) -> usize {
    if mutation_rate <= 0. {
        return 0;
    }

    let p = mutation_probability(mutation_rate, brain.generation()).clamp(0., 1.);
    let scale = jitter_scale(brain.generation());
    let mut weights = brain.weights();
    let mut picked = 0;
    for w in weights.iter_mut() {
        if !rng.random_bool(p) {
            continue;
        }
        picked += 1;
        if happens(rng, SNAKEPIT_MUTATE_JITTER_PROB) {
            *w += box_muller(rng) * scale;
        } else {
            *w = rng.random_range(SNAKEPIT_PARAM_MUTATION_MIN..=SNAKEPIT_PARAM_MUTATION_MAX);
        }
    }

    if let Err(err) = brain.set_weights(&weights) {
        warn!("discarding mutation: {err}");
        return 0;
    }
    picked
}

/// A new brain with `brain`'s weights, advanced [SNAKEPIT_CLONE_GENERATION_STEP]
/// generations, with fresh score and play count but the same best score. Mutated when
/// `mutation_rate` is positive.
pub fn clone_brain(brain: &Brain, mutation_rate: f64, rng: &mut impl Rng) -> Brain {
    let generation = brain.generation() + SNAKEPIT_CLONE_GENERATION_STEP;
    let mut child = match Brain::from_weights(&brain.weights(), generation) {
        Ok(child) => child,
        Err(err) => {
            warn!("can't clone brain ({err}), starting from random weights");
            Brain::random(generation, rng)
        }
    };
    child.set_best_score(brain.best_score());
    if mutation_rate > 0. {
        mutate(&mut child, mutation_rate, rng);
    }
    child
}

/// Score-weighted mean of the weights of `models`, or the plain mean when no model scored.
/// Models of the wrong shape are skipped. `None` when nothing usable is left.
pub fn average_weights(models: &[&Brain]) -> Option<Vec<f64>> {
    let usable = models.iter().filter(|b| b.is_valid()).collect::<Vec<_>>();
    if usable.len() < models.len() {
        warn!(
            "skipping {} malformed models in combine",
            models.len() - usable.len()
        );
    }
    let first = usable.first()?;

    let total = usable.iter().map(|b| b.score.max(0.)).sum::<f64>();
    let uniform = 1. / usable.len() as f64;
    let mut avg = vec![0.; first.weight_count()];
    for brain in usable.iter() {
        let influence = if total > 0. {
            brain.score.max(0.) / total
        } else {
            uniform
        };
        for (a, w) in avg.iter_mut().zip(brain.weights()) {
            *a += w * influence;
        }
    }
    Some(avg)
}

/// Gaussian nudges of `strength` on a `rate` share of weights
pub fn perturb(weights: &mut [f64], rate: f64, strength: f64, rng: &mut impl Rng) {
    for w in weights.iter_mut() {
        if rng.random_bool(rate.clamp(0., 1.)) {
            *w += rng.sample::<f64, _>(StandardNormal) * strength;
        }
    }
}

/// Crossover of any number of models into one, weighting each model's weights by its share
/// of the total score. The child is one generation past both the tracker and its
/// parents, keeps most of the best parent's best score, and gets a moderate mutation pass.
pub fn combine(
    models: &[&Brain],
    tracker: &GenerationTracker,
    rng: &mut impl Rng,
) -> Option<Brain> {
    let mut ranked = models.to_vec();
    ranked.sort_by(|l, r| r.best_score().total_cmp(&l.best_score()));

    let mut weights = average_weights(&ranked)?;
    perturb(
        &mut weights,
        SNAKEPIT_COMBINE_MUTATION_RATE,
        SNAKEPIT_COMBINE_MUTATION_STRENGTH,
        rng,
    );

    let generation = ranked
        .iter()
        .map(|b| b.generation())
        .fold(tracker.current_generation(), u64::max)
        + 1;
    let mut child = match Brain::from_weights(&weights, generation) {
        Ok(child) => child,
        Err(err) => {
            warn!("combined weights unusable ({err}), starting from random weights");
            Brain::random(generation, rng)
        }
    };
    child.set_best_score(
        SNAKEPIT_COMBINE_SCORE_RETENTION
            * ranked
                .iter()
                .map(|b| b.best_score())
                .fold(0., f64::max),
    );
    debug!(
        "combined {} models into generation {generation}",
        ranked.len()
    );
    Some(child)
}

/// A brain for a snake coming back to life. Prefers a mutated clone of the cached combined
/// model, then of the cached best model, then a combination of `library`, and finally
/// random weights. The result is never behind the tracker's generation.
pub fn respawn_brain(
    tracker: &mut GenerationTracker,
    library: &[Brain],
    rng: &mut impl Rng,
) -> Brain {
    let mut brain = if let Some(combined) = tracker.combined_model() {
        debug!("respawning from combined model");
        clone_brain(combined, SNAKEPIT_RESPAWN_COMBINED_MUTATION, rng)
    } else if let Some(best) = tracker.best_model() {
        debug!("respawning from best model");
        clone_brain(best, SNAKEPIT_RESPAWN_BEST_MUTATION, rng)
    } else if let Some(combined) = combine(&library.iter().collect::<Vec<_>>(), tracker, rng) {
        debug!("respawning from {} stored models", library.len());
        let brain = clone_brain(&combined, SNAKEPIT_RESPAWN_COMBINED_MUTATION, rng);
        tracker.set_combined_model(combined);
        brain
    } else {
        debug!("respawning with random weights");
        Brain::random(tracker.current_generation(), rng)
    };
    brain.raise_generation(tracker.current_generation());
    brain
}

/// Brains for the next round from this round's `parents`, ranked by their scores. The
/// winner carries on unmutated, everyone else descends from the combination of all
/// parents with a mutation rate growing by rank. Caches the winner as the best model and
/// the combination as the combined model.
pub fn reproduce(
    parents: &[Brain],
    tracker: &mut GenerationTracker,
    mutation_rate: f64,
    rng: &mut impl Rng,
) -> Vec<Brain> {
    let mut ranked = parents.iter().collect::<Vec<_>>();
    ranked.sort_by(|l, r| r.score.total_cmp(&l.score));

    let Some(winner) = ranked.first() else {
        return vec![];
    };
    let combined = combine(&ranked, tracker, rng);
    tracker.set_best_model((*winner).clone());

    let mut children = Vec::with_capacity(ranked.len());
    children.push(clone_brain(winner, 0., rng));
    for rank in 1..ranked.len() {
        let rate = mutation_rate * (1. + rank as f64 * 0.5);
        children.push(match &combined {
            Some(combined) => clone_brain(combined, rate, rng),
            None => clone_brain(ranked[rank], rate, rng),
        });
    }

    if let Some(combined) = combined {
        tracker.set_combined_model(combined);
    }
    children
}
