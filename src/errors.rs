use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("telemetry error: {0}")]
    Telemetry(String),
    #[error("invalid block: {0}")]
    InvalidBlock(String),
    #[error("committee error: {0}")]
    Committee(String),
    #[error("evidence rejected: {0}")]
    Evidence(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type ChainResult<T> = Result<T, ChainError>;
