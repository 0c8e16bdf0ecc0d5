pub mod collision;
pub mod config;
pub mod constants;
pub mod error;
pub mod generation;
pub mod grid;
pub mod learn;
mod macros;
pub mod network;
pub mod persist;
pub mod policy;
pub mod random;
pub mod reproduce;
pub mod serialize;
pub mod snake;
pub mod world;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use generation::GenerationTracker;
pub use grid::{Cell, Direction, Grid};
pub use network::{activate, Brain};
pub use persist::{FallbackStore, JsonDirStore, MemoryStore, ModelRecord, ModelStore, Persister};
pub use random::{default_rng, WyRng};
pub use snake::Snake;
pub use world::{Simulation, Snapshot};
