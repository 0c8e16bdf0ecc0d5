use crate::{
    constants::{
        SNAKEPIT_GRID_HEIGHT, SNAKEPIT_GRID_WIDTH, SNAKEPIT_MAX_SNAKES, SNAKEPIT_MIN_APPLES,
        SNAKEPIT_MUTATION_RATE, SNAKEPIT_PERSIST_QUEUE, SNAKEPIT_PURGE_INTERVAL,
        SNAKEPIT_RESPAWN_DELAY_MS, SNAKEPIT_ROUND_TICKS, SNAKEPIT_SPAWN_LENGTH,
        SNAKEPIT_TICK_INTERVAL_MS,
    },
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf};

/// Simulation settings. Every field is optional in a config file and defaults to the
/// matching `SNAKEPIT_` constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: i32,
    pub height: i32,
    pub snakes: usize,
    pub min_apples: usize,
    /// Ticks per round
    pub round_ticks: u64,
    pub tick_interval_ms: u64,
    pub respawn_delay_ms: u64,
    /// Games after which model caches may be purged
    pub purge_interval: u64,
    /// Base mutation rate for next-round offspring
    pub mutation_rate: f64,
    pub persist_queue: usize,
    /// Seed for the simulation rng, from the OS when absent
    pub seed: Option<u64>,
    /// Directory of the local model store, models are kept in memory when absent
    pub store_dir: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: SNAKEPIT_GRID_WIDTH,
            height: SNAKEPIT_GRID_HEIGHT,
            snakes: SNAKEPIT_MAX_SNAKES,
            min_apples: SNAKEPIT_MIN_APPLES,
            round_ticks: SNAKEPIT_ROUND_TICKS,
            tick_interval_ms: SNAKEPIT_TICK_INTERVAL_MS,
            respawn_delay_ms: SNAKEPIT_RESPAWN_DELAY_MS,
            purge_interval: SNAKEPIT_PURGE_INTERVAL,
            mutation_rate: SNAKEPIT_MUTATION_RATE,
            persist_queue: SNAKEPIT_PERSIST_QUEUE,
            seed: None,
            store_dir: None,
        }
    }
}

impl SimConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let min_side = 2 * SNAKEPIT_SPAWN_LENGTH as i32;
        if self.width < min_side || self.height < min_side {
            return Err(Error::Config(format!(
                "grid must be at least {min_side}x{min_side}, got {}x{}",
                self.width, self.height
            )));
        }
        if !(1..=SNAKEPIT_MAX_SNAKES).contains(&self.snakes) {
            return Err(Error::Config(format!(
                "between 1 and {SNAKEPIT_MAX_SNAKES} snakes are supported, got {}",
                self.snakes
            )));
        }
        if self.round_ticks == 0 {
            return Err(Error::Config("rounds need at least one tick".into()));
        }
        if !(0. ..=1.).contains(&self.mutation_rate) {
            return Err(Error::Config(format!(
                "mutation rate must be within [0, 1], got {}",
                self.mutation_rate
            )));
        }
        if self.min_apples as u64 >= self.width as u64 * self.height as u64 {
            return Err(Error::Config(format!(
                "{} apples don't fit a {}x{} grid",
                self.min_apples, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Ticks a dead snake waits before coming back, at least one
    pub fn respawn_delay_ticks(&self) -> u64 {
        self.respawn_delay_ms
            .div_ceil(self.tick_interval_ms.max(1))
            .max(1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::new_t;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.respawn_delay_ticks(), 10);
    }

    #[test]
    fn test_validate() {
        assert!(new_t!(SimConfig, width = 0).validate().is_err());
        assert!(new_t!(SimConfig, height = 4).validate().is_err());
        assert!(new_t!(SimConfig, snakes = 0).validate().is_err());
        assert!(new_t!(SimConfig, snakes = 5).validate().is_err());
        assert!(new_t!(SimConfig, round_ticks = 0).validate().is_err());
        assert!(new_t!(SimConfig, mutation_rate = 1.5).validate().is_err());
        assert!(new_t!(SimConfig, width = 6, height = 6, min_apples = 36)
            .validate()
            .is_err());
        assert!(new_t!(SimConfig, snakes = 1, width = 6, height = 6)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_huge_grid() {
        let config = new_t!(SimConfig, width = i32::MAX, height = i32::MAX);
        assert!(config.validate().is_ok());
        let config = new_t!(SimConfig, width = 65_536, height = 65_536, min_apples = 1 << 33);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_respawn_delay_rounds_up() {
        assert_eq!(
            new_t!(SimConfig, respawn_delay_ms = 250, tick_interval_ms = 100).respawn_delay_ticks(),
            3
        );
        assert_eq!(
            new_t!(SimConfig, respawn_delay_ms = 0).respawn_delay_ticks(),
            1
        );
        assert_eq!(
            new_t!(SimConfig, tick_interval_ms = 0).respawn_delay_ticks(),
            1_000
        );
    }

    #[test]
    fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"width": 20, "height": 16, "seed": 7}}"#).unwrap();
        let config = SimConfig::from_file(file.path()).unwrap();
        assert_eq!((config.width, config.height), (20, 16));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.snakes, SNAKEPIT_MAX_SNAKES);
        assert_eq!(config.round_ticks, SNAKEPIT_ROUND_TICKS);
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"snakes": 9}}"#).unwrap();
        assert!(matches!(
            SimConfig::from_file(file.path()),
            Err(Error::Config(_))
        ));
    }
}
