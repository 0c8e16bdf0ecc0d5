use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {expected} weights for a {input}x{hidden}x{output} network, got {actual}")]
    WeightCount {
        input: usize,
        hidden: usize,
        output: usize,
        expected: usize,
        actual: usize,
    },
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
