use cvm_data::CoreError;
use thiserror::Error;

/// Failures that abort an execution outright. Expected outcomes of running
/// untrusted code are signals, not errors; see [`crate::signal::Signal`].
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("data: {0}")]
    Data(#[from] CoreError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
