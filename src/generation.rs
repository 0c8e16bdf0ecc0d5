//! Generation tracking and the reference-model caches shared by every snake of a
//! simulation.
//!
//! The generation is a ratchet: it only moves forward, except on an explicit purge which
//! resets it to 1 and drops both caches. Cached models are held to the same ratchet, so a
//! cached brain's generation is never ahead of the tracker and never falls behind it
//! when read.

use crate::network::Brain;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct GenerationTracker {
    current: AtomicU64,
    best: Option<Brain>,
    combined: Option<Brain>,
    games_played: u64,
    games_since_increment: u64,
    games_since_purge: u64,
}

impl Default for GenerationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationTracker {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(generation: u64) -> Self {
        Self {
            current: AtomicU64::new(generation.max(1)),
            best: None,
            combined: None,
            games_played: 0,
            games_since_increment: 0,
            games_since_purge: 0,
        }
    }

    #[inline]
    pub fn current_generation(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Advance by exactly one generation, returning the new generation
    pub fn increment_generation(&mut self) -> u64 {
        self.games_since_increment = 0;
        let generation = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        debug!("generation incremented to {generation}");
        generation
    }

    /// Raise the generation to `generation` if that's ahead of the current one. A lower or
    /// equal `generation` changes nothing. Returns the generation after the update.
    pub fn update_current_generation(&self, generation: u64) -> u64 {
        self.current.fetch_max(generation, Ordering::AcqRel).max(generation)
    }

    /// Raise the generation to `generation`, and by at least one regardless
    pub fn force_generation_update(&mut self, generation: u64) -> u64 {
        self.games_since_increment = 0;
        let mut current = self.current_generation();
        loop {
            let target = generation.max(current + 1);
            match self.current.compare_exchange(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    debug!("generation forced from {current} to {target}");
                    return target;
                }
                Err(seen) => current = seen,
            }
        }
    }

    /// Reset to generation 1 and forget both cached models
    pub fn purge_all_model_caches(&mut self) {
        info!(
            "purging model caches at generation {} after {} games",
            self.current_generation(),
            self.games_since_purge
        );
        self.current.store(1, Ordering::Release);
        self.best = None;
        self.combined = None;
        self.games_since_purge = 0;
        self.games_since_increment = 0;
    }

    pub fn record_game(&mut self) {
        self.games_played += 1;
        self.games_since_increment += 1;
        self.games_since_purge += 1;
    }

    #[inline]
    pub fn games_played(&self) -> u64 {
        self.games_played
    }

    #[inline]
    pub fn games_since_increment(&self) -> u64 {
        self.games_since_increment
    }

    #[inline]
    pub fn games_since_purge(&self) -> u64 {
        self.games_since_purge
    }

    fn sync(&self, brain: &mut Brain) {
        let generation = self.update_current_generation(brain.generation());
        brain.raise_generation(generation);
    }

    /// The cached best model, brought up to the current generation
    pub fn best_model(&mut self) -> Option<&Brain> {
        let current = self.current_generation();
        self.best.as_mut().map(|b| {
            b.raise_generation(current);
            &*b
        })
    }

    /// The cached combined model, brought up to the current generation
    pub fn combined_model(&mut self) -> Option<&Brain> {
        let current = self.current_generation();
        self.combined.as_mut().map(|b| {
            b.raise_generation(current);
            &*b
        })
    }

    /// Cache `brain` as the best model. The tracker is raised to its generation if it's
    /// ahead, and it to the tracker's otherwise.
    pub fn set_best_model(&mut self, mut brain: Brain) {
        self.sync(&mut brain);
        self.best = Some(brain);
    }

    /// Cache `brain` as the combined model, see [GenerationTracker::set_best_model]
    pub fn set_combined_model(&mut self, mut brain: Brain) {
        self.sync(&mut brain);
        self.combined = Some(brain);
    }
}
