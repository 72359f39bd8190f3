use thiserror::Error;

use crate::application::dispatch::CoordinatorError;
use crate::application::engine::EngineError;
use crate::application::repos::RepoError;
use crate::application::settings::SettingsError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

/// Top-level error for process bootstrap and CLI entry points.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
