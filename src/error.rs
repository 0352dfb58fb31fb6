use thiserror::Error;

use crate::{config::LoadError, infra::error::InfraError, replay::ReplayError};

/// Top-level failure of a barkeep command.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}
